use std::{env, process};

use log::{error, info};
use tlsecho::{
    config::{self, Parsed, ServerConfig},
    exit, logger, server,
};
use tokio::runtime::Runtime;

async fn run(config: ServerConfig) -> i32 {
    let acceptor = match server::listen(&config).await {
        Ok(acceptor) => acceptor,
        Err(error) => {
            error!("{}", error);
            return exit::STARTUP;
        }
    };

    tokio::select! {
        result = server::serve(acceptor) => match result {
            Ok(()) => exit::OK,
            Err(_) => exit::SESSION,
        },
        _ = tokio::signal::ctrl_c() => {
            info!("ctrl-c received, shutting down");
            exit::OK
        }
    }
}

fn main() {
    let args: Vec<String> = env::args().collect();
    let config = match config::parse_server_args(&args) {
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
    info!("starting up");

    let rt = match Runtime::new() {
        Ok(rt) => rt,
        Err(error) => {
            error!("error creating runtime: {}", error);
            process::exit(exit::STARTUP);
        }
    };

    let code = rt.block_on(run(config));
    rt.shutdown_background();
    process::exit(code);
}
