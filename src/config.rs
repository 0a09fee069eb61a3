use std::{fs, path::Path, time::Duration};

use getopts::{Matches, Options};
use log::LevelFilter;
use serde::{de::DeserializeOwned, Deserialize};

use crate::framing::{Framing, FILE_DELIMITER};

pub const DEFAULT_CERT: &str = "certs/tls.crt";
pub const DEFAULT_KEY: &str = "certs/tls.key";
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Outcome of parsing a command line.
#[derive(Debug, PartialEq)]
pub enum Parsed<T> {
    Run(T),
    Help(String),
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct ClientConfig {
    /// Address of the tls host.
    pub addr: String,
    /// Input file. Empty means stdin with line framing.
    pub input: String,
    pub cert: String,
    pub key: String,
    /// Message delimiter used when reading from a file.
    pub delimiter: u8,
    pub server_name: String,
    /// Trust anchors for the server certificate; unset disables verification.
    pub server_ca: Option<String>,
    pub pacing_ms: u64,
    pub log_level: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            addr: "127.0.0.1:8000".to_string(),
            input: String::new(),
            cert: DEFAULT_CERT.to_string(),
            key: DEFAULT_KEY.to_string(),
            delimiter: FILE_DELIMITER,
            server_name: "localhost".to_string(),
            server_ca: None,
            pacing_ms: 1000,
            log_level: DEFAULT_LOG_LEVEL.to_string(),
        }
    }
}

impl ClientConfig {
    pub fn framing(&self) -> Framing {
        if self.input.is_empty() {
            Framing::Line
        } else {
            Framing::Delimiter(self.delimiter)
        }
    }

    pub fn pacing(&self) -> Duration {
        Duration::from_millis(self.pacing_ms)
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub cert: String,
    pub key: String,
    /// Trust anchors for client certificates; set makes them mandatory.
    pub client_ca: Option<String>,
    pub log_level: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            host: "0.0.0.0".to_string(),
            port: 8000,
            cert: DEFAULT_CERT.to_string(),
            key: DEFAULT_KEY.to_string(),
            client_ca: None,
            log_level: DEFAULT_LOG_LEVEL.to_string(),
        }
    }
}

impl ServerConfig {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

pub fn load_file<T: DeserializeOwned>(path: impl AsRef<Path>) -> std::io::Result<T> {
    let path = path.as_ref();
    let content = fs::read_to_string(path)?;
    toml::from_str(&content).map_err(|error| {
        std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("{}: {}", path.display(), error),
        )
    })
}

pub fn parse_client_args(args: &[String]) -> std::io::Result<Parsed<ClientConfig>> {
    let mut opts = common_options();
    opts.optopt("a", "", "address of tls host (default 127.0.0.1:8000)", "ADDR");
    opts.optopt("i", "", "input file, stdin when empty", "FILE");
    opts.optopt("d", "", "message delimiter byte for file input (default 0x10)", "BYTE");
    opts.optopt("n", "", "tls server name (default localhost)", "NAME");
    opts.optopt("r", "", "verify the server against this ca file", "FILE");
    opts.optopt("t", "", "delay between messages in ms (default 1000)", "MS");

    let Some(matches) = parse(&opts, args)? else {
        return Ok(Parsed::Help(usage(&opts, args)));
    };

    let mut config: ClientConfig = match matches.opt_str("f") {
        Some(path) => load_file(path)?,
        None => ClientConfig::default(),
    };

    if let Some(addr) = matches.opt_str("a") {
        config.addr = addr;
    }
    if let Some(input) = matches.opt_str("i") {
        config.input = input;
    }
    if let Some(delimiter) = matches.opt_str("d") {
        config.delimiter = parse_byte(&delimiter)?;
    }
    if let Some(name) = matches.opt_str("n") {
        config.server_name = name;
    }
    if let Some(ca) = matches.opt_str("r") {
        config.server_ca = Some(ca);
    }
    if let Some(ms) = matches.opt_str("t") {
        config.pacing_ms = ms.parse().map_err(|_| invalid(format!("invalid delay: {}", ms)))?;
    }
    apply_common(&matches, &mut config.cert, &mut config.key, &mut config.log_level)?;

    Ok(Parsed::Run(config))
}

pub fn parse_server_args(args: &[String]) -> std::io::Result<Parsed<ServerConfig>> {
    let mut opts = common_options();
    opts.optopt("p", "", "port to listen on (default 8000)", "PORT");
    opts.optopt("r", "", "require client certificates signed by this ca file", "FILE");

    let Some(matches) = parse(&opts, args)? else {
        return Ok(Parsed::Help(usage(&opts, args)));
    };

    let mut config: ServerConfig = match matches.opt_str("f") {
        Some(path) => load_file(path)?,
        None => ServerConfig::default(),
    };

    if let Some(port) = matches.opt_str("p") {
        config.port = port
            .parse()
            .map_err(|_| invalid(format!("invalid port: {}", port)))?;
    }
    if let Some(ca) = matches.opt_str("r") {
        config.client_ca = Some(ca);
    }
    apply_common(&matches, &mut config.cert, &mut config.key, &mut config.log_level)?;

    Ok(Parsed::Run(config))
}

fn common_options() -> Options {
    let mut opts = Options::new();
    opts.optopt("c", "", "certificate file", "FILE");
    opts.optopt("k", "", "key file", "FILE");
    opts.optopt("f", "", "toml config file, flags override it", "FILE");
    opts.optopt("l", "", "log level (default info)", "LEVEL");
    opts.optflag("h", "", "print this help");
    opts
}

/// Returns `None` when help was requested.
fn parse(opts: &Options, args: &[String]) -> std::io::Result<Option<Matches>> {
    let matches = opts
        .parse(args.iter().skip(1))
        .map_err(|error| invalid(error.to_string()))?;

    if matches.opt_present("h") {
        return Ok(None);
    }
    if let Some(extra) = matches.free.first() {
        return Err(invalid(format!("unexpected argument: {}", extra)));
    }

    Ok(Some(matches))
}

fn apply_common(
    matches: &Matches,
    cert: &mut String,
    key: &mut String,
    level: &mut String,
) -> std::io::Result<()> {
    if let Some(value) = matches.opt_str("c") {
        *cert = value;
    }
    if let Some(value) = matches.opt_str("k") {
        *key = value;
    }
    if let Some(value) = matches.opt_str("l") {
        *level = value;
    }
    check_log_level(level)
}

/// Accepts `LEVEL` or `module=LEVEL` directives separated by commas.
fn check_log_level(value: &str) -> std::io::Result<()> {
    for directive in value.split(',').map(str::trim).filter(|d| !d.is_empty()) {
        let level = match directive.split_once('=') {
            Some((_, level)) => level,
            None => directive,
        };
        if level.parse::<LevelFilter>().is_err() {
            return Err(invalid(format!("invalid log level: {}", directive)));
        }
    }
    Ok(())
}

fn usage(opts: &Options, args: &[String]) -> String {
    let program = args.first().map(String::as_str).unwrap_or("tlsecho");
    opts.usage(&format!("Usage: {} [options]", program))
}

/// Accepts decimal (`16`) or hex (`0x10`).
fn parse_byte(value: &str) -> std::io::Result<u8> {
    let parsed = match value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        Some(hex) => u8::from_str_radix(hex, 16),
        None => value.parse(),
    };
    parsed.map_err(|_| invalid(format!("invalid delimiter byte: {}", value)))
}

fn invalid(message: String) -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::InvalidInput, message)
}
