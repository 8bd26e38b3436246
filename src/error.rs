// src/error.rs
use thiserror::Error;

/// Relay failures. Every variant collapses to "keep the original reference"
/// in the best-effort path.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("File metadata lookup failed for {file_id}: {message}")]
    Metadata { file_id: String, message: String },

    #[error("File download failed for {file_path}: {message}")]
    Download { file_path: String, message: String },

    #[error("Storage write failed: {0}")]
    Storage(#[from] StorageError),

    #[error("Not an ephemeral reference: {0}")]
    NotEphemeral(String),

    #[error("Relay cancelled")]
    Cancelled,
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Invalid storage key: {0}")]
    InvalidKey(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

#[derive(Debug, Error)]
pub enum CrmError {
    #[error("CRM request failed: {0}")]
    Transport(String),

    #[error("CRM returned status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("CRM response could not be decoded: {0}")]
    Decode(String),

    #[error("CRM rejected update for record {0}")]
    Rejected(String),
}

#[derive(Debug, Error)]
pub enum SweepError {
    #[error("A sweep is already running")]
    AlreadyRunning,

    #[error("CRM list failed at offset {offset}: {message}")]
    CrmListFailed { offset: u64, message: String },

    #[error("No CRM field mapped for {0}")]
    UnmappedField(String),

    #[error("Sweep configuration error: {0}")]
    Config(String),
}

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Cache backend unavailable: {0}")]
    Unavailable(String),

    #[error("Cache value could not be decoded: {0}")]
    Decode(String),
}
