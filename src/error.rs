//! Error types for the intake daemon.

use std::path::PathBuf;
use std::time::Duration;

/// Top-level error type for the daemon.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Consumer error: {0}")]
    Consumer(#[from] ConsumerError),

    #[error("Mail fetch error: {0}")]
    MailFetch(#[from] MailFetchError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Document consumer errors.
#[derive(Debug, thiserror::Error)]
pub enum ConsumerError {
    #[error("Consumption directory {path} is missing or not a directory")]
    Misconfigured { path: PathBuf },

    #[error("Failed to drain {path}: {source}")]
    Drain {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Consume call exceeded {timeout:?}")]
    Timeout { timeout: Duration },
}

/// Mail fetcher errors.
#[derive(Debug, thiserror::Error)]
pub enum MailFetchError {
    #[error("Maildir {path} is missing or has no new/ subdirectory")]
    Misconfigured { path: PathBuf },

    #[error("Failed to read message {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to deliver attachment {name} to the intake queue: {source}")]
    Deliver {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Pull call exceeded {timeout:?}")]
    Timeout { timeout: Duration },
}

/// Result type alias for the daemon.
pub type Result<T> = std::result::Result<T, Error>;
