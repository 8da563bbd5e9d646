//! Error types surfaced by the library.
//!
//! Probe failures (refused connects, silent hosts, malformed NetBIOS replies)
//! are not errors: they are folded into the probe's negative result. What
//! remains here is bad input and failures around the scan itself.
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("invalid host input '{0}'")]
    InvalidHostInput(String),

    #[error("host input '{input}' expands to more than {limit} addresses")]
    RangeTooLarge { input: String, limit: u128 },

    #[error("invalid scan options: {0}")]
    InvalidOptions(String),

    #[error("invalid configuration file: {0}")]
    Config(#[from] toml::de::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ScanError>;
