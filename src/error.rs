use std::path::PathBuf;

use thiserror::Error;

use crate::generation::GenerationError;
use crate::history::RecordStatus;

/// Errors that abort a pipeline run.
#[derive(Debug, Error)]
pub enum NotepressError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Generation output could not be parsed or lacked required fields.
    #[error("Content format error: {0}")]
    ContentFormat(String),

    #[error("Image download timed out: {url}")]
    DownloadTimeout { url: String },

    #[error("Image download failed for {url}: {message}")]
    Download { url: String, message: String },

    #[error("Image validation failed: {0}")]
    Validation(String),

    #[error("Confirmation failed: {0}")]
    Confirmation(String),

    #[error("Publish failed: {0}")]
    Dispatch(String),

    #[error("Generation error: {0}")]
    Generation(#[from] GenerationError),

    #[error("History error: {0}")]
    History(#[from] HistoryError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures of a single publish channel. The dispatcher absorbs these by
/// degrading to the simulated channel.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// Network-level failure that survived every retry.
    #[error("relay unreachable after {attempts} attempts: {message}")]
    RelayTransient { attempts: u32, message: String },

    /// Protocol or application-level rejection. Never retried.
    #[error("relay rejected the request: {0}")]
    RelayFatal(String),

    #[error("login not completed within {waited_secs}s")]
    LoginTimeout { waited_secs: u64 },

    #[error("browser automation failed: {0}")]
    Browser(String),
}

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("failed to access history file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("history file {path} is corrupted: {source}")]
    Corrupted {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("record {id} cannot move from {from} to {to}")]
    InvalidTransition {
        id: String,
        from: RecordStatus,
        to: RecordStatus,
    },
}
