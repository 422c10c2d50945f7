//! dotdb-persistence: everything that touches the filesystem.
//!
//! Binary WAL with crc32-checked records and torn-tail tolerance, atomic
//! snapshot installation, index sidecars, the multi-process advisory file
//! lock, and the optional AES-256-GCM snapshot filter.

pub mod crypto;
pub mod error;
pub mod idx;
pub mod lock;
pub mod snapshot;
pub mod wal;

pub use crypto::SnapshotCipher;
pub use error::{PersistenceError, Result};
pub use lock::{FileLock, LockMode};
pub use wal::{WalOp, WalRecord, WalScan, WalWriter};
