//! Index sidecar files (`<path>.<name>.idx`).
//!
//! A sidecar is the serialized form of one equality index, stamped with
//! the LSN frontier it was written at. The engine adopts a sidecar only
//! when the stamp matches the state it recovered; anything else is
//! rebuilt by scan, so a stale sidecar can never serve wrong paths.

use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{PersistenceError, Result};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SidecarEntry {
    pub key: String,
    pub paths: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IndexSidecar {
    pub name: String,
    pub collection: String,
    pub field: String,
    pub checkpoint_lsn: u64,
    pub entries: Vec<SidecarEntry>,
}

/// Sidecar path for index `name` next to the snapshot at `db_path`.
pub fn sidecar_path(db_path: &Path, name: &str) -> std::path::PathBuf {
    let mut file_name = db_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    file_name.push('.');
    file_name.push_str(name);
    file_name.push_str(".idx");
    db_path.with_file_name(file_name)
}

pub fn store(path: &Path, sidecar: &IndexSidecar) -> Result<()> {
    let bytes = serde_json::to_vec(sidecar)?;
    let tmp = path.with_extension("idx.tmp");
    {
        let mut file = File::create(&tmp)?;
        file.write_all(&bytes)?;
        file.sync_data()?;
    }
    fs::rename(&tmp, path)?;
    Ok(())
}

pub fn load(path: &Path) -> Result<IndexSidecar> {
    let bytes = fs::read(path)?;
    serde_json::from_slice(&bytes)
        .map_err(|e| PersistenceError::Corrupted(format!("index sidecar parse failure: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_store_load_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("db.email.idx");
        let sidecar = IndexSidecar {
            name: "email".to_string(),
            collection: "users".to_string(),
            field: "email".to_string(),
            checkpoint_lsn: 12,
            entries: vec![SidecarEntry {
                key: "\"a@x\"".to_string(),
                paths: vec!["users.alice".to_string()],
            }],
        };
        store(&path, &sidecar).unwrap();
        assert_eq!(load(&path).unwrap(), sidecar);
    }

    #[test]
    fn test_sidecar_path_layout() {
        let path = sidecar_path(Path::new("/data/app.db"), "email");
        assert_eq!(path, Path::new("/data/app.db.email.idx"));
    }

    #[test]
    fn test_corrupt_sidecar_surfaces() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("db.email.idx");
        std::fs::write(&path, b"{broken").unwrap();
        assert!(matches!(load(&path), Err(PersistenceError::Corrupted(_))));
    }
}
