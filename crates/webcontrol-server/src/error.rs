//! Error types for the command server

use thiserror::Error;

/// Why a download job ended in `failed`.
#[derive(Error, Debug)]
pub enum DownloadError {
    #[error("network error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("server answered {0}")]
    Status(reqwest::StatusCode),

    #[error("write error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid filename {0:?}")]
    InvalidFilename(String),

    #[error("download cancelled")]
    Cancelled,
}

/// Server lifecycle errors
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("server is already running")]
    AlreadyRunning,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
