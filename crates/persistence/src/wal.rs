//! Append-only write-ahead log.
//!
//! Record layout, all integers little-endian:
//!
//! ```text
//! magic(4) | lsn(8) | op(1) | path_len(4) | path | payload_len(4) | payload | crc32(4)
//! ```
//!
//! The crc32 covers every preceding byte of the record. Payloads are UTF-8
//! JSON (or empty for deletes and checkpoint markers). The reader tolerates
//! a torn tail: scanning stops at the first record that fails its checksum
//! or runs past end-of-file, and reports the last good byte boundary so the
//! caller can truncate.

use std::fs::{File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use byteorder::{LittleEndian, ReadBytesExt};

use crate::error::{PersistenceError, Result};

pub const RECORD_MAGIC: [u8; 4] = *b"DWAL";

/// Paths and payloads are length-prefixed with u32; cap them well below
/// that to avoid allocating garbage lengths from a corrupt tail.
const MAX_FRAME_LEN: u32 = 256 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WalOp {
    Set = 0,
    Delete = 1,
    Push = 2,
    AddNum = 3,
    Checkpoint = 4,
}

impl WalOp {
    pub fn from_u8(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(WalOp::Set),
            1 => Some(WalOp::Delete),
            2 => Some(WalOp::Push),
            3 => Some(WalOp::AddNum),
            4 => Some(WalOp::Checkpoint),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct WalRecord {
    pub lsn: u64,
    pub op: WalOp,
    pub path: String,
    pub payload: Vec<u8>,
}

impl WalRecord {
    pub fn new(lsn: u64, op: WalOp, path: impl Into<String>, payload: Vec<u8>) -> Self {
        WalRecord {
            lsn,
            op,
            path: path.into(),
            payload,
        }
    }

    pub fn checkpoint_marker(lsn: u64) -> Self {
        WalRecord::new(lsn, WalOp::Checkpoint, "", Vec::new())
    }

    pub fn encoded_len(&self) -> u64 {
        (4 + 8 + 1 + 4 + self.path.len() + 4 + self.payload.len() + 4) as u64
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.encoded_len() as usize);
        buf.extend_from_slice(&RECORD_MAGIC);
        buf.extend_from_slice(&self.lsn.to_le_bytes());
        buf.push(self.op as u8);
        buf.extend_from_slice(&(self.path.len() as u32).to_le_bytes());
        buf.extend_from_slice(self.path.as_bytes());
        buf.extend_from_slice(&(self.payload.len() as u32).to_le_bytes());
        buf.extend_from_slice(&self.payload);
        let crc = crc32fast::hash(&buf);
        buf.extend_from_slice(&crc.to_le_bytes());
        buf
    }

    /// Decode one record. Any error (including a clean EOF) is surfaced;
    /// the caller decides whether it marks a torn tail or real corruption.
    pub fn decode_from<R: Read>(reader: &mut R) -> Result<Self> {
        let mut magic = [0u8; 4];
        reader.read_exact(&mut magic)?;
        if magic != RECORD_MAGIC {
            return Err(PersistenceError::InvalidMagic);
        }

        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&magic);

        let lsn = reader.read_u64::<LittleEndian>()?;
        hasher.update(&lsn.to_le_bytes());

        let op_byte = reader.read_u8()?;
        hasher.update(&[op_byte]);
        let op = WalOp::from_u8(op_byte)
            .ok_or_else(|| PersistenceError::Corrupted(format!("unknown WAL op {op_byte}")))?;

        let path_len = reader.read_u32::<LittleEndian>()?;
        hasher.update(&path_len.to_le_bytes());
        if path_len > MAX_FRAME_LEN {
            return Err(PersistenceError::Corrupted(format!(
                "implausible path length {path_len}"
            )));
        }
        let mut path_bytes = vec![0u8; path_len as usize];
        reader.read_exact(&mut path_bytes)?;
        hasher.update(&path_bytes);
        let path = String::from_utf8(path_bytes)
            .map_err(|e| PersistenceError::Corrupted(format!("invalid UTF-8 in path: {e}")))?;

        let payload_len = reader.read_u32::<LittleEndian>()?;
        hasher.update(&payload_len.to_le_bytes());
        if payload_len > MAX_FRAME_LEN {
            return Err(PersistenceError::Corrupted(format!(
                "implausible payload length {payload_len}"
            )));
        }
        let mut payload = vec![0u8; payload_len as usize];
        reader.read_exact(&mut payload)?;
        hasher.update(&payload);

        let stored_crc = reader.read_u32::<LittleEndian>()?;
        let computed_crc = hasher.finalize();
        if stored_crc != computed_crc {
            return Err(PersistenceError::ChecksumMismatch {
                expected: stored_crc,
                found: computed_crc,
            });
        }

        Ok(WalRecord { lsn, op, path, payload })
    }
}

/// Result of a tolerant scan: every record up to the last good boundary,
/// plus whether trailing bytes had to be discarded.
#[derive(Debug)]
pub struct WalScan {
    pub records: Vec<WalRecord>,
    pub valid_len: u64,
    pub truncated: bool,
}

/// Walk the log sequentially, stopping at the first torn or corrupt record.
pub fn scan(path: &Path) -> Result<WalScan> {
    let file = File::open(path)?;
    let file_len = file.metadata()?.len();
    let mut reader = BufReader::new(file);

    let mut records = Vec::new();
    let mut valid_len = 0u64;
    loop {
        match WalRecord::decode_from(&mut reader) {
            Ok(record) => {
                valid_len += record.encoded_len();
                records.push(record);
            }
            Err(PersistenceError::Io(e)) if e.kind() == io::ErrorKind::UnexpectedEof => break,
            Err(PersistenceError::InvalidMagic)
            | Err(PersistenceError::ChecksumMismatch { .. })
            | Err(PersistenceError::Corrupted(_)) => break,
            Err(e) => return Err(e),
        }
    }

    Ok(WalScan {
        records,
        truncated: valid_len < file_len,
        valid_len,
    })
}

/// Cut a log back to `len` bytes (the last good record boundary).
pub fn truncate_file(path: &Path, len: u64) -> Result<()> {
    let file = OpenOptions::new().write(true).open(path)?;
    file.set_len(len)?;
    file.sync_data()?;
    Ok(())
}

/// Appender with an explicit flush/sync split: `append` buffers, `flush`
/// pushes to the OS, `sync` makes it durable. The engine picks which of
/// those happen per record based on the durability mode.
pub struct WalWriter {
    file: BufWriter<File>,
    path: PathBuf,
    len: u64,
}

impl WalWriter {
    pub fn open(path: &Path) -> Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let len = file.metadata()?.len();
        Ok(WalWriter {
            file: BufWriter::new(file),
            path: path.to_path_buf(),
            len,
        })
    }

    pub fn append(&mut self, record: &WalRecord) -> Result<()> {
        let bytes = record.encode();
        self.file.write_all(&bytes)?;
        self.len += bytes.len() as u64;
        Ok(())
    }

    /// Flush buffered bytes to the OS (no durability guarantee).
    pub fn flush(&mut self) -> Result<()> {
        self.file.flush()?;
        Ok(())
    }

    /// Flush and fsync.
    pub fn sync(&mut self) -> Result<()> {
        self.file.flush()?;
        self.file.get_ref().sync_data()?;
        Ok(())
    }

    /// Cut the log back to `len` bytes, discarding anything buffered
    /// beyond it. Used to drop a partially journaled batch.
    pub fn truncate_to(&mut self, len: u64) -> Result<()> {
        self.file.flush()?;
        self.file.get_ref().set_len(len)?;
        self.len = len;
        Ok(())
    }

    /// Replace the whole log content with `records` and fsync. Used by
    /// checkpointing to shrink the log to a marker plus the live tail.
    pub fn rewrite(&mut self, records: &[WalRecord]) -> Result<()> {
        self.file.flush()?;
        self.file.get_ref().set_len(0)?;
        self.len = 0;
        for record in records {
            self.append(record)?;
        }
        self.sync()
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
