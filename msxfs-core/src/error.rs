//! Error types for the filesystem integration.

use thiserror::Error;

/// Errors raised on the host side of the integration.
///
/// Guest-visible failures never use this type; they are reported through
/// [`GuestStatus`](crate::driver::GuestStatus) in the guest's registers.
#[derive(Error, Debug)]
pub enum FsIntError {
    #[error("Invalid volume label: {0:?}")]
    InvalidVolumeLabel(String),

    #[error("Integrated directory not found: {0}")]
    BaseDirNotFound(String),

    #[error("Invalid segment number: {0}")]
    InvalidSegment(u8),

    #[error("Image too large for a 16K page: {0} bytes")]
    ImageTooLarge(usize),

    #[error("Config error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for integration operations.
pub type FsIntResult<T> = Result<T, FsIntError>;
