//! Snapshot file I/O.
//!
//! The snapshot is a JSON envelope: the root document first, then a
//! `__dotdb__` metadata key carrying the format version and the LSN
//! frontier the file reflects. A bare JSON object (no metadata key) is
//! accepted as a root at LSN 0, so a hand-written file can seed a store.
//!
//! Installation is atomic: write `<path>.tmp`, fsync, rename over the real
//! path, fsync the parent directory.

use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

use dotdb_kernel::Value;
use serde::{Deserialize, Serialize};

use crate::crypto::SnapshotCipher;
use crate::error::{PersistenceError, Result};

pub const SNAPSHOT_VERSION: u32 = 1;

/// Reserved top-level key holding snapshot metadata.
pub const META_KEY: &str = "__dotdb__";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SnapshotMeta {
    pub version: u32,
    pub checkpoint_lsn: u64,
}

#[derive(Serialize)]
struct EnvelopeOut<'a> {
    root: &'a Value,
    #[serde(rename = "__dotdb__")]
    meta: SnapshotMeta,
}

#[derive(Deserialize)]
struct EnvelopeIn {
    root: Value,
    #[serde(rename = "__dotdb__")]
    meta: SnapshotMeta,
}

/// Atomically install a snapshot of `root` at `path`.
pub fn write_atomic(
    path: &Path,
    root: &Value,
    checkpoint_lsn: u64,
    cipher: Option<&SnapshotCipher>,
) -> Result<()> {
    let envelope = EnvelopeOut {
        root,
        meta: SnapshotMeta {
            version: SNAPSHOT_VERSION,
            checkpoint_lsn,
        },
    };
    let mut bytes = serde_json::to_vec(&envelope)?;
    if let Some(cipher) = cipher {
        bytes = cipher.seal(&bytes)?.into_bytes();
    }

    let mut tmp_name = path.as_os_str().to_os_string();
    tmp_name.push(".tmp");
    let tmp = std::path::PathBuf::from(tmp_name);
    {
        let mut file = File::create(&tmp)?;
        file.write_all(&bytes)?;
        file.sync_data()?;
    }
    fs::rename(&tmp, path)?;
    if let Some(dir) = path.parent() {
        // Make the rename itself durable.
        File::open(dir)?.sync_all()?;
    }
    Ok(())
}

/// Load a snapshot. Returns the root and the checkpoint LSN it reflects.
pub fn read(path: &Path, cipher: Option<&SnapshotCipher>) -> Result<(Value, u64)> {
    let mut bytes = fs::read(path)?;
    if let Some(cipher) = cipher {
        bytes = cipher.open(&bytes)?;
    }

    if let Ok(envelope) = serde_json::from_slice::<EnvelopeIn>(&bytes) {
        if !envelope.root.is_object() {
            return Err(PersistenceError::Corrupted(
                "snapshot root is not an object".into(),
            ));
        }
        return Ok((envelope.root, envelope.meta.checkpoint_lsn));
    }

    let root: Value = serde_json::from_slice(&bytes)
        .map_err(|e| PersistenceError::Corrupted(format!("snapshot parse failure: {e}")))?;
    if !root.is_object() {
        return Err(PersistenceError::Corrupted(
            "snapshot root is not an object".into(),
        ));
    }
    Ok((root, 0))
}
