pub mod certgen;
pub mod client;
pub mod config;
pub mod framing;
pub mod logger;
pub mod server;
pub mod shutdown;
pub mod tlstcp;

/// Process exit codes of the binaries.
pub mod exit {
    pub const OK: i32 = 0;
    /// Configuration, credentials, connect or bind failed.
    pub const STARTUP: i32 = 1;
    /// An established session ended on an error.
    pub const SESSION: i32 = 2;
}

pub(crate) fn context(error: std::io::Error, what: &str) -> std::io::Error {
    std::io::Error::new(error.kind(), format!("{}: {}", what, error))
}
