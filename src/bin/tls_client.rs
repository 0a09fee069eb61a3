use std::{env, process};

use log::{error, info};
use tlsecho::{
    client,
    config::{self, ClientConfig, Parsed},
    exit,
    framing::MessageReader,
    logger,
    shutdown::Shutdown,
};
use tokio::{
    fs::File,
    io::{AsyncRead, BufReader},
    runtime::Runtime,
};

async fn run(config: ClientConfig) -> i32 {
    let stream = match client::connect(&config).await {
        Ok(stream) => stream,
        Err(error) => {
            error!("{}", error);
            return exit::STARTUP;
        }
    };

    let input: Box<dyn AsyncRead + Send + Unpin> = if config.input.is_empty() {
        Box::new(tokio::io::stdin())
    } else {
        match File::open(&config.input).await {
            Ok(file) => Box::new(file),
            Err(error) => {
                error!("error reading input file {}: {}", config.input, error);
                return exit::STARTUP;
            }
        }
    };
    let input = MessageReader::new(BufReader::new(input), config.framing());

    let shutdown = Shutdown::new();
    let interrupt = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("ctrl-c received, shutting down");
            interrupt.fire();
        }
    });

    match client::run(stream, input, config.pacing(), shutdown).await {
        Ok(report) => {
            info!(
                "done, {} messages ({} bytes) sent, {} bytes received",
                report.messages, report.sent, report.received
            );
            exit::OK
        }
        Err(error) => {
            error!("{}", error);
            exit::SESSION
        }
    }
}

fn main() {
    let args: Vec<String> = env::args().collect();
    let config = match config::parse_client_args(&args) {
        Ok(Parsed::Run(config)) => config,
        Ok(Parsed::Help(usage)) => {
            println!("{}", usage);
            return;
        }
        Err(error) => {
            eprintln!("{}", error);
            process::exit(exit::STARTUP);
        }
    };

    if let Err(error) = logger::init(&config.log_level) {
        eprintln!("error initializing logger: {}", error);
    }

    let rt = match Runtime::new() {
        Ok(rt) => rt,
        Err(error) => {
            error!("error creating runtime: {}", error);
            process::exit(exit::STARTUP);
        }
    };

    let code = rt.block_on(run(config));

    // A pending stdin read cannot be cancelled, don't wait for it.
    rt.shutdown_background();
    process::exit(code);
}
