// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Engine-level error type, aggregating the kernel and persistence layers.

use dotdb_kernel::KernelError;
use dotdb_persistence::PersistenceError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("path error: {0}")]
    Path(String),

    #[error("type error: {0}")]
    Type(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("no such index `{0}`")]
    Index(String),

    #[error("lock error: {0}")]
    Lock(String),

    #[error("store is read-only under a shared lock")]
    ReadOnly,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("corrupted store: {0}")]
    Corruption(String),

    #[error("savepoint `{0}` not found")]
    TxConflict(String),

    #[error("invalid filter: {0}")]
    InvalidFilter(String),

    #[error("store is closed")]
    Closed,
}

impl From<KernelError> for DbError {
    fn from(e: KernelError) -> Self {
        match e {
            KernelError::Path { .. } => DbError::Path(e.to_string()),
            KernelError::Type { .. } => DbError::Type(e.to_string()),
            KernelError::Validation { .. } => DbError::Validation(e.to_string()),
        }
    }
}

impl From<PersistenceError> for DbError {
    fn from(e: PersistenceError) -> Self {
        match e {
            PersistenceError::Io(io) => DbError::Io(io),
            PersistenceError::LockTimeout { .. } => DbError::Lock(e.to_string()),
            PersistenceError::InvalidMagic
            | PersistenceError::ChecksumMismatch { .. }
            | PersistenceError::Corrupted(_)
            | PersistenceError::Crypto(_) => DbError::Corruption(e.to_string()),
        }
    }
}

impl From<serde_json::Error> for DbError {
    fn from(e: serde_json::Error) -> Self {
        DbError::Corruption(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, DbError>;
