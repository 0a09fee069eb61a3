use std::io::Write;

use chrono::prelude::*;
use log::{LevelFilter, SetLoggerError};

/// Installs the process logger. `level` uses env_logger filter syntax, and
/// `RUST_LOG` takes precedence over it when set.
pub fn init(level: &str) -> Result<(), SetLoggerError> {
    env_logger::Builder::new()
        .filter_level(LevelFilter::Info)
        .parse_filters(level)
        .parse_default_env()
        .format(|buf, record| {
            writeln!(
                buf,
                "[{}][{}][{}:{}] - {}",
                Local::now().format("%F %T%.6f"),
                record.level(),
                record.file().unwrap_or("?"),
                record.line().unwrap_or(0),
                record.args()
            )
        })
        .try_init()
}
