// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Open-time configuration.

use dotdb_kernel::Value;
pub use dotdb_persistence::LockMode;

/// How WAL records reach stable storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Durability {
    /// WAL disabled; only `save()` (and the autosave debounce) persist.
    #[default]
    None,
    /// Append and flush to the OS; a background fsync every ~100 ms.
    Lazy,
    /// Group commit: fsync every `wal_flush_ms` or `wal_batch_size`
    /// records, whichever comes first.
    Batched,
    /// fsync after every record.
    Sync,
}

/// Background fsync cadence for [`Durability::Lazy`].
pub const LAZY_FLUSH_INTERVAL_MS: u64 = 100;

/// Declaration of one equality index: `path` is the collection whose
/// children are documents, `field` the indexed key inside each document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSpec {
    pub name: String,
    pub path: String,
    pub field: String,
}

impl IndexSpec {
    pub fn new(name: impl Into<String>, path: impl Into<String>, field: impl Into<String>) -> Self {
        IndexSpec {
            name: name.into(),
            path: path.into(),
            field: field.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct OpenOptions {
    pub indices: Vec<IndexSpec>,
    /// Convenience switch: `true` implies `Durability::Batched` and
    /// `LockMode::Exclusive` unless overridden below.
    pub wal: bool,
    pub encryption_key: Option<String>,
    /// Debounce window for non-WAL checkpoints, in milliseconds.
    pub auto_save_interval_ms: u64,
    pub lock_mode: Option<LockMode>,
    pub lock_timeout_ms: u64,
    pub durability: Option<Durability>,
    pub wal_batch_size: u64,
    pub wal_flush_ms: u64,
    /// Schema declarations keyed by path prefix.
    pub schemas: Vec<(String, Value)>,
    pub slow_query_threshold_ms: u64,
}

impl Default for OpenOptions {
    fn default() -> Self {
        OpenOptions {
            indices: Vec::new(),
            wal: false,
            encryption_key: None,
            auto_save_interval_ms: 1000,
            lock_mode: None,
            lock_timeout_ms: 0,
            durability: None,
            wal_batch_size: 1000,
            wal_flush_ms: 10,
            schemas: Vec::new(),
            slow_query_threshold_ms: 100,
        }
    }
}

impl OpenOptions {
    pub fn new() -> Self {
        OpenOptions::default()
    }

    pub fn wal(mut self, enabled: bool) -> Self {
        self.wal = enabled;
        self
    }

    pub fn durability(mut self, durability: Durability) -> Self {
        self.durability = Some(durability);
        self
    }

    pub fn lock_mode(mut self, mode: LockMode) -> Self {
        self.lock_mode = Some(mode);
        self
    }

    pub fn lock_timeout_ms(mut self, timeout: u64) -> Self {
        self.lock_timeout_ms = timeout;
        self
    }

    pub fn encryption_key(mut self, key: impl Into<String>) -> Self {
        self.encryption_key = Some(key.into());
        self
    }

    pub fn auto_save_interval_ms(mut self, interval: u64) -> Self {
        self.auto_save_interval_ms = interval;
        self
    }

    pub fn wal_batch_size(mut self, size: u64) -> Self {
        self.wal_batch_size = size;
        self
    }

    pub fn wal_flush_ms(mut self, interval: u64) -> Self {
        self.wal_flush_ms = interval;
        self
    }

    pub fn slow_query_threshold_ms(mut self, threshold: u64) -> Self {
        self.slow_query_threshold_ms = threshold;
        self
    }

    pub fn index(mut self, name: impl Into<String>, path: impl Into<String>, field: impl Into<String>) -> Self {
        self.indices.push(IndexSpec::new(name, path, field));
        self
    }

    pub fn schema(mut self, prefix: impl Into<String>, declaration: Value) -> Self {
        self.schemas.push((prefix.into(), declaration));
        self
    }

    pub(crate) fn resolved_durability(&self) -> Durability {
        self.durability.unwrap_or(if self.wal {
            Durability::Batched
        } else {
            Durability::None
        })
    }

    pub(crate) fn resolved_lock_mode(&self) -> LockMode {
        self.lock_mode.unwrap_or(if self.wal {
            LockMode::Exclusive
        } else {
            LockMode::None
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wal_flag_derives_batched_exclusive() {
        let opts = OpenOptions::new().wal(true);
        assert_eq!(opts.resolved_durability(), Durability::Batched);
        assert_eq!(opts.resolved_lock_mode(), LockMode::Exclusive);
    }

    #[test]
    fn test_defaults_are_standalone() {
        let opts = OpenOptions::default();
        assert_eq!(opts.resolved_durability(), Durability::None);
        assert_eq!(opts.resolved_lock_mode(), LockMode::None);
        assert_eq!(opts.auto_save_interval_ms, 1000);
        assert_eq!(opts.wal_batch_size, 1000);
        assert_eq!(opts.wal_flush_ms, 10);
        assert_eq!(opts.slow_query_threshold_ms, 100);
    }

    #[test]
    fn test_explicit_overrides_win() {
        let opts = OpenOptions::new()
            .wal(true)
            .durability(Durability::Sync)
            .lock_mode(LockMode::None);
        assert_eq!(opts.resolved_durability(), Durability::Sync);
        assert_eq!(opts.resolved_lock_mode(), LockMode::None);
    }
}
