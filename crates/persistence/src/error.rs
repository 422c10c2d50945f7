use std::io;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    #[error("invalid magic bytes in WAL record")]
    InvalidMagic,

    #[error("checksum mismatch: expected {expected:#010x}, found {found:#010x}")]
    ChecksumMismatch { expected: u32, found: u32 },

    #[error("corrupted data: {0}")]
    Corrupted(String),

    #[error("could not acquire file lock within {timeout_ms} ms")]
    LockTimeout { timeout_ms: u64 },

    #[error("encryption failure: {0}")]
    Crypto(String),
}

impl From<serde_json::Error> for PersistenceError {
    fn from(e: serde_json::Error) -> Self {
        PersistenceError::Corrupted(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, PersistenceError>;
