// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! The storage engine: open/recovery orchestration, the serialized write
//! pipeline, the lock-free read path, checkpointing, and the public
//! operation set.
//!
//! Writes are serialized through one mutex. Each write mutates a working
//! copy-on-write root, appends its journal records, updates the indexes,
//! then publishes the new root into an `ArcSwap` that readers load
//! without locking. A reader that grabbed the previous root keeps a
//! consistent point-in-time view for as long as it holds the handle.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;
use dotdb_kernel::{tree, DotPath, Schema, Value};
use dotdb_persistence::lock::FileLock;
use dotdb_persistence::wal::{self, WalRecord, WalWriter};
use dotdb_persistence::{snapshot, LockMode, PersistenceError, SnapshotCipher, WalOp};
use parking_lot::{Condvar, Mutex, RwLock};

use crate::config::{Durability, OpenOptions, LAZY_FLUSH_INTERVAL_MS};
use crate::error::{DbError, Result};
use crate::exec::filter::{self, FilterOp};
use crate::exec::{aggregate, join, AggregateOp, Filter};
use crate::index::IndexStore;
use crate::ops::{self, apply_op, Change, WriteOp};
use crate::subscribe::{HookRegistry, Method, Pattern};
use crate::tx::Transaction;

/// WAL enablement and durable frontier, as reported by `wal_status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WalStatus {
    pub enabled: bool,
    pub durable_lsn: u64,
}

/// One operation inside a `batch` call.
#[derive(Debug, Clone)]
pub enum BatchOp {
    Set { path: String, value: Value },
    Delete { path: String },
    Push { path: String, items: Vec<Value> },
    Pull { path: String, items: Vec<Value> },
    Add { path: String, amount: f64 },
    Subtract { path: String, amount: f64 },
}

pub(crate) struct WriterState {
    pub root: Value,
    pub next_lsn: u64,
    pub checkpoint_lsn: u64,
}

pub(crate) struct WalShared {
    pub writer: Mutex<WalWriter>,
}

pub(crate) struct Config {
    pub durability: Durability,
    pub wal_batch_size: u64,
    pub wal_flush_ms: u64,
    pub auto_save_interval_ms: u64,
    pub slow_query_threshold_ms: u64,
}

pub(crate) struct Shared {
    pub config: Config,
    pub db_path: PathBuf,
    pub wal_path: PathBuf,
    pub view: ArcSwap<Value>,
    pub writer: Mutex<WriterState>,
    pub wal: Option<WalShared>,
    pub indexes: RwLock<IndexStore>,
    pub hooks: Mutex<HookRegistry>,
    pub schemas: Vec<(DotPath, Schema)>,
    pub cipher: Option<SnapshotCipher>,
    pub appended_lsn: AtomicU64,
    pub durable_lsn: AtomicU64,
    pub dirty: AtomicBool,
    pub closed: AtomicBool,
    pub control: Mutex<bool>,
    pub control_cv: Condvar,
    pub lock_guard: Mutex<Option<FileLock>>,
    /// Serializes whole checkpoints (autosave vs. explicit save vs.
    /// close); interleaved checkpoint phases could drop WAL tail records.
    pub checkpoint_lock: Mutex<()>,
    pub read_only: bool,
}

impl Shared {
    /// fsync everything appended so far and advance the durable frontier.
    fn sync_wal(&self) -> Result<()> {
        if let Some(wal) = &self.wal {
            let target = self.appended_lsn.load(Ordering::SeqCst);
            if self.durable_lsn.load(Ordering::SeqCst) >= target {
                return Ok(());
            }
            let mut writer = wal.writer.lock();
            writer.sync()?;
            self.durable_lsn.fetch_max(target, Ordering::SeqCst);
        }
        Ok(())
    }

    /// Write a fresh snapshot atomically, then shrink the WAL to a
    /// checkpoint marker plus whatever records landed while the snapshot
    /// was being serialized. Writers are only blocked for the second
    /// phase; serialization happens against a cloned root.
    pub(crate) fn checkpoint(&self) -> Result<()> {
        let _serialized = self.checkpoint_lock.lock();
        let (root, snapshot_lsn) = {
            let writer = self.writer.lock();
            (writer.root.clone(), writer.next_lsn.saturating_sub(1))
        };
        snapshot::write_atomic(&self.db_path, &root, snapshot_lsn, self.cipher.as_ref())?;

        let mut writer = self.writer.lock();
        writer.checkpoint_lsn = snapshot_lsn;
        let frontier = writer.next_lsn.saturating_sub(1);
        if let Some(wal) = &self.wal {
            let mut wal_writer = wal.writer.lock();
            wal_writer.flush()?;
            let scanned = wal::scan(&self.wal_path)?;
            let mut records = vec![WalRecord::checkpoint_marker(snapshot_lsn)];
            records.extend(
                scanned
                    .records
                    .into_iter()
                    .filter(|r| r.lsn > snapshot_lsn && r.op != WalOp::Checkpoint),
            );
            wal_writer.rewrite(&records)?;
            self.durable_lsn
                .fetch_max(self.appended_lsn.load(Ordering::SeqCst), Ordering::SeqCst);
        }
        self.indexes.read().persist(&self.db_path, frontier)?;
        drop(writer);
        self.dirty.store(false, Ordering::SeqCst);
        tracing::debug!(
            path = %self.db_path.display(),
            checkpoint_lsn = snapshot_lsn,
            "checkpoint installed"
        );
        Ok(())
    }
}

fn flusher_loop(shared: Arc<Shared>) {
    let interval = match shared.config.durability {
        Durability::Lazy => LAZY_FLUSH_INTERVAL_MS,
        Durability::Batched => shared.config.wal_flush_ms.max(1),
        _ => return,
    };
    loop {
        {
            let mut stop = shared.control.lock();
            if !*stop {
                shared
                    .control_cv
                    .wait_for(&mut stop, Duration::from_millis(interval));
            }
            if *stop {
                break;
            }
        }
        if let Err(e) = shared.sync_wal() {
            tracing::error!(error = %e, "background WAL fsync failed");
        }
    }
    let _ = shared.sync_wal();
}

fn autosave_loop(shared: Arc<Shared>) {
    let interval = shared.config.auto_save_interval_ms.max(1);
    loop {
        {
            let mut stop = shared.control.lock();
            if !*stop {
                shared
                    .control_cv
                    .wait_for(&mut stop, Duration::from_millis(interval));
            }
            if *stop {
                break;
            }
        }
        if shared.dirty.load(Ordering::SeqCst) {
            if let Err(e) = shared.checkpoint() {
                tracing::error!(error = %e, "autosave checkpoint failed");
            }
        }
    }
}

/// An open store.
pub struct Database {
    shared: Arc<Shared>,
    threads: Mutex<Vec<JoinHandle<()>>>,
}

impl Database {
    /// Open (or create) the store at `path`: acquire the file lock, load
    /// the snapshot, replay the WAL tail past the last checkpoint,
    /// truncate any torn tail, then adopt or rebuild indexes.
    pub fn open(path: impl AsRef<Path>, options: OpenOptions) -> Result<Database> {
        let db_path = path.as_ref().to_path_buf();
        let wal_path = suffixed(&db_path, ".wal");
        let lock_path = suffixed(&db_path, ".lock");

        let durability = options.resolved_durability();
        let lock_mode = options.resolved_lock_mode();
        let read_only = lock_mode == LockMode::Shared;

        let lock_guard = FileLock::acquire(&lock_path, lock_mode, options.lock_timeout_ms)?;
        let cipher = options.encryption_key.as_deref().map(SnapshotCipher::new);

        let (mut root, checkpoint_lsn) = if db_path.exists() {
            snapshot::read(&db_path, cipher.as_ref())?
        } else {
            (Value::new_object(), 0)
        };

        let mut frontier = checkpoint_lsn;
        let mut replayed = 0usize;
        if wal_path.exists() {
            let scanned = wal::scan(&wal_path)?;
            if scanned.truncated {
                tracing::warn!(
                    path = %wal_path.display(),
                    valid_len = scanned.valid_len,
                    "discarding torn WAL tail"
                );
                if !read_only {
                    wal::truncate_file(&wal_path, scanned.valid_len)?;
                }
            }
            for record in &scanned.records {
                frontier = frontier.max(record.lsn);
                if record.lsn > checkpoint_lsn {
                    ops::apply_wal_record(&mut root, record).map_err(|e| {
                        DbError::Corruption(format!(
                            "WAL replay failed at lsn {}: {e}",
                            record.lsn
                        ))
                    })?;
                    replayed += 1;
                }
            }
        }

        let mut schemas = Vec::with_capacity(options.schemas.len());
        for (prefix, declaration) in &options.schemas {
            let prefix = DotPath::parse(prefix)?;
            let schema = Schema::compile(declaration)?;
            schemas.push((prefix, schema));
        }

        let mut indexes = IndexStore::new(&options.indices)?;
        indexes.load_or_rebuild(&db_path, &root, frontier);

        let wal = if durability != Durability::None && !read_only {
            Some(WalShared {
                writer: Mutex::new(WalWriter::open(&wal_path)?),
            })
        } else {
            None
        };

        let shared = Arc::new(Shared {
            config: Config {
                durability,
                wal_batch_size: options.wal_batch_size,
                wal_flush_ms: options.wal_flush_ms,
                auto_save_interval_ms: options.auto_save_interval_ms,
                slow_query_threshold_ms: options.slow_query_threshold_ms,
            },
            db_path,
            wal_path,
            view: ArcSwap::new(Arc::new(root.clone())),
            writer: Mutex::new(WriterState {
                root,
                next_lsn: frontier + 1,
                checkpoint_lsn,
            }),
            wal,
            indexes: RwLock::new(indexes),
            hooks: Mutex::new(HookRegistry::default()),
            schemas,
            cipher,
            appended_lsn: AtomicU64::new(frontier),
            durable_lsn: AtomicU64::new(frontier),
            dirty: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            control: Mutex::new(false),
            control_cv: Condvar::new(),
            lock_guard: Mutex::new(lock_guard),
            checkpoint_lock: Mutex::new(()),
            read_only,
        });

        let mut threads = Vec::new();
        if shared.wal.is_some()
            && matches!(shared.config.durability, Durability::Lazy | Durability::Batched)
        {
            let worker = shared.clone();
            threads.push(
                std::thread::Builder::new()
                    .name("dotdb-wal-flush".to_string())
                    .spawn(move || flusher_loop(worker))?,
            );
        }
        if shared.config.durability == Durability::None
            && shared.config.auto_save_interval_ms > 0
            && !read_only
        {
            let worker = shared.clone();
            threads.push(
                std::thread::Builder::new()
                    .name("dotdb-autosave".to_string())
                    .spawn(move || autosave_loop(worker))?,
            );
        }

        tracing::info!(
            path = %shared.db_path.display(),
            ?durability,
            frontier,
            replayed,
            "store opened"
        );

        Ok(Database {
            shared,
            threads: Mutex::new(threads),
        })
    }

    fn ensure_writable(&self) -> Result<()> {
        if self.shared.closed.load(Ordering::SeqCst) {
            return Err(DbError::Closed);
        }
        if self.shared.read_only {
            return Err(DbError::ReadOnly);
        }
        Ok(())
    }

    // --- Reads ---

    /// Snapshot read; never blocks on writers. Malformed paths read as
    /// absent.
    pub fn get(&self, path: &str) -> Option<Value> {
        let path = DotPath::parse(path).ok()?;
        let view = self.shared.view.load_full();
        tree::get(&view, &path).cloned()
    }

    pub fn has(&self, path: &str) -> bool {
        match DotPath::parse(path) {
            Ok(path) => {
                let view = self.shared.view.load_full();
                tree::get(&view, &path).is_some()
            }
            Err(_) => false,
        }
    }

    /// Single-path lookup through a declared index, ordered with respect
    /// to writes accepted by this process.
    pub fn find_by_index(&self, name: &str, value: &Value) -> Result<Option<Value>> {
        let view = self.shared.view.load_full();
        let indexes = self.shared.indexes.read();
        let index = indexes
            .get(name)
            .ok_or_else(|| DbError::Index(name.to_string()))?;
        let Some(path_text) = index.first(value).cloned() else {
            return Ok(None);
        };
        drop(indexes);
        let path = DotPath::parse(&path_text)?;
        Ok(tree::get(&view, &path).cloned())
    }

    // --- Writes ---

    pub fn set(&self, path: &str, value: impl Into<Value>) -> Result<Option<Value>> {
        let path = DotPath::parse(path)?;
        let changes = self.write_ops(vec![WriteOp::Set { path, value: value.into() }])?;
        Ok(changes.into_iter().next().and_then(|c| c.old))
    }

    pub fn delete(&self, path: &str) -> Result<Option<Value>> {
        let path = DotPath::parse(path)?;
        let changes = self.write_ops(vec![WriteOp::Delete { path }])?;
        Ok(changes.into_iter().next().and_then(|c| c.old))
    }

    /// Append `items` to the array at `path` (created if absent),
    /// skipping deep-equal duplicates. One journal record per call.
    pub fn push(&self, path: &str, items: Vec<Value>) -> Result<()> {
        let path = DotPath::parse(path)?;
        self.write_ops(vec![WriteOp::Push { path, items }])?;
        Ok(())
    }

    /// Remove every deep-equal match of `items` from the array at `path`.
    pub fn pull(&self, path: &str, items: Vec<Value>) -> Result<()> {
        let path = DotPath::parse(path)?;
        self.write_ops(vec![WriteOp::Pull { path, items }])?;
        Ok(())
    }

    /// Numeric read-modify-write; returns the new value.
    pub fn add(&self, path: &str, amount: f64) -> Result<f64> {
        self.numeric(path, amount, false)
    }

    pub fn subtract(&self, path: &str, amount: f64) -> Result<f64> {
        self.numeric(path, amount, true)
    }

    fn numeric(&self, path: &str, amount: f64, subtract: bool) -> Result<f64> {
        let path = DotPath::parse(path)?;
        let changes = self.write_ops(vec![WriteOp::Add { path, amount, subtract }])?;
        changes
            .into_iter()
            .next()
            .and_then(|c| c.numeric)
            .ok_or_else(|| DbError::Type("numeric op produced no result".into()))
    }

    /// Apply a sequence of operations under one write-lock acquisition
    /// and one WAL flush boundary. The first failure rolls the whole
    /// batch back; nothing of it reaches the journal.
    pub fn batch(&self, ops: Vec<BatchOp>) -> Result<()> {
        let ops = ops
            .into_iter()
            .map(|op| {
                Ok(match op {
                    BatchOp::Set { path, value } => WriteOp::Set { path: DotPath::parse(&path)?, value },
                    BatchOp::Delete { path } => WriteOp::Delete { path: DotPath::parse(&path)? },
                    BatchOp::Push { path, items } => WriteOp::Push { path: DotPath::parse(&path)?, items },
                    BatchOp::Pull { path, items } => WriteOp::Pull { path: DotPath::parse(&path)?, items },
                    BatchOp::Add { path, amount } => WriteOp::Add { path: DotPath::parse(&path)?, amount, subtract: false },
                    BatchOp::Subtract { path, amount } => WriteOp::Add { path: DotPath::parse(&path)?, amount, subtract: true },
                })
            })
            .collect::<Result<Vec<_>>>()?;
        self.write_ops(ops)?;
        Ok(())
    }

    /// Run `f` inside a transaction. Commit on `Ok`, roll back to the
    /// pre-image on `Err` (the error is passed through). See
    /// [`Transaction`] for savepoints and nesting.
    pub fn transaction<T>(
        &self,
        f: impl FnOnce(&mut Transaction<'_>) -> Result<T>,
    ) -> Result<T> {
        self.ensure_writable()?;
        let mut writer = self.shared.writer.lock();
        let mut tx = Transaction::begin(&self.shared, writer.root.clone());
        let result = f(&mut tx)?;
        let (root, changes) = tx.into_parts();
        self.commit(&mut writer, root, changes)?;
        Ok(result)
    }

    fn write_ops(&self, ops: Vec<WriteOp>) -> Result<Vec<Change>> {
        self.ensure_writable()?;
        let mut writer = self.shared.writer.lock();
        let hooks = self.shared.hooks.lock().before_snapshot();
        let mut working = writer.root.clone();
        let mut changes = Vec::new();
        for op in ops {
            if let Some(change) = apply_op(&mut working, &self.shared.schemas, &hooks, op)? {
                changes.push(change);
            }
        }
        self.commit(&mut writer, working, changes)
    }

    /// Journal, apply, index, publish, notify, in that order, under the
    /// write lock the caller already holds.
    fn commit(
        &self,
        writer: &mut WriterState,
        new_root: Value,
        changes: Vec<Change>,
    ) -> Result<Vec<Change>> {
        if changes.is_empty() {
            return Ok(changes);
        }
        let base_lsn = writer.next_lsn;
        let mut records = Vec::with_capacity(changes.len());
        for change in &changes {
            records.push(WalRecord::new(
                writer.next_lsn,
                change.wal_op,
                change.path.to_string(),
                change.payload.clone(),
            ));
            writer.next_lsn += 1;
        }
        if let Err(e) = self.journal(&records) {
            writer.next_lsn = base_lsn;
            return Err(e);
        }
        writer.root = new_root;
        {
            let mut indexes = self.shared.indexes.write();
            for change in &changes {
                indexes.apply_mutation(&writer.root, &change.path);
            }
        }
        self.shared.view.store(Arc::new(writer.root.clone()));
        self.shared.dirty.store(true, Ordering::SeqCst);
        self.notify(&changes);
        Ok(changes)
    }

    fn journal(&self, records: &[WalRecord]) -> Result<()> {
        let Some(wal) = &self.shared.wal else {
            return Ok(());
        };
        let durability = self.shared.config.durability;
        let mut writer = wal.writer.lock();
        let pre_len = writer.len();
        let outcome: std::result::Result<(), PersistenceError> = (|| {
            for record in records {
                writer.append(record)?;
            }
            match durability {
                Durability::Sync => writer.sync(),
                _ => writer.flush(),
            }
        })();
        if let Err(e) = outcome {
            // Drop the partial batch so a retry starts from a clean
            // record boundary.
            let _ = writer.truncate_to(pre_len);
            return Err(e.into());
        }
        let last = records.last().map(|r| r.lsn).unwrap_or(0);
        self.shared.appended_lsn.store(last, Ordering::SeqCst);
        match durability {
            Durability::Sync => {
                self.shared.durable_lsn.fetch_max(last, Ordering::SeqCst);
            }
            Durability::Batched => {
                let durable = self.shared.durable_lsn.load(Ordering::SeqCst);
                if last.saturating_sub(durable) >= self.shared.config.wal_batch_size {
                    self.shared.control_cv.notify_all();
                }
            }
            _ => {}
        }
        Ok(())
    }

    /// After-middleware and subscribers, in LSN order, inside the write
    /// section. Hooks must not write back into the engine.
    fn notify(&self, changes: &[Change]) {
        let (afters, subscribers) = {
            let registry = self.shared.hooks.lock();
            (registry.after_snapshot(), registry.subscribers_snapshot())
        };
        if afters.is_empty() && subscribers.is_empty() {
            return;
        }
        for change in changes {
            let path = change.path.to_string();
            for entry in &afters {
                if entry.method == change.method && entry.pattern.matches(&path) {
                    (entry.callback)(&path, change.new.as_ref());
                }
            }
            for entry in &subscribers {
                if entry.pattern.matches(&path) {
                    (entry.callback)(&path, change.new.as_ref(), change.old.as_ref());
                }
            }
        }
    }

    // --- Hooks ---

    pub fn subscribe(
        &self,
        pattern: &str,
        f: impl Fn(&str, Option<&Value>, Option<&Value>) + Send + Sync + 'static,
    ) -> Result<u64> {
        let pattern = Pattern::parse(pattern)?;
        Ok(self.shared.hooks.lock().subscribe(pattern, Box::new(f)))
    }

    pub fn unsubscribe(&self, id: u64) -> bool {
        self.shared.hooks.lock().unsubscribe(id)
    }

    /// Before-middleware: may rewrite the incoming value. Runs inside the
    /// write lock.
    pub fn before(
        &self,
        method: Method,
        pattern: &str,
        f: impl Fn(&str, Value) -> Value + Send + Sync + 'static,
    ) -> Result<u64> {
        let pattern = Pattern::parse(pattern)?;
        Ok(self.shared.hooks.lock().add_before(method, pattern, Box::new(f)))
    }

    /// After-middleware: observational only.
    pub fn after(
        &self,
        method: Method,
        pattern: &str,
        f: impl Fn(&str, Option<&Value>) + Send + Sync + 'static,
    ) -> Result<u64> {
        let pattern = Pattern::parse(pattern)?;
        Ok(self.shared.hooks.lock().add_after(method, pattern, Box::new(f)))
    }

    pub fn remove_hook(&self, id: u64) -> bool {
        self.shared.hooks.lock().remove_hook(id)
    }

    // --- Parallel executor ---

    /// Filter the children of `collection`. Seeds from a covering
    /// equality index when one exists, otherwise scans in parallel.
    pub fn query(&self, collection: &str, filters: &[Filter]) -> Result<Vec<Value>> {
        let started = Instant::now();
        let collection_path = DotPath::parse(collection)?;
        let compiled = filter::compile(filters)?;
        let view = self.shared.view.load_full();

        let results = match self.index_seed(&collection_path, filters, &view) {
            Some(seeded) => seeded
                .into_iter()
                .filter(|doc| compiled.iter().all(|f| f.matches(doc)))
                .collect(),
            None => filter::run(collection_docs(&view, &collection_path), &compiled),
        };
        self.observe_query("query", collection, started);
        Ok(results)
    }

    pub fn aggregate(
        &self,
        collection: &str,
        op: AggregateOp,
        field: Option<&str>,
    ) -> Result<Option<f64>> {
        let started = Instant::now();
        let collection_path = DotPath::parse(collection)?;
        let field_path = match field {
            Some(field) => Some(DotPath::parse(field)?),
            None => None,
        };
        if op != AggregateOp::Count && field_path.is_none() {
            return Err(DbError::InvalidFilter(
                "this aggregate requires a field".into(),
            ));
        }
        let view = self.shared.view.load_full();
        let docs = collection_docs(&view, &collection_path);
        let result = aggregate::run(&docs, op, field_path.as_ref());
        self.observe_query("aggregate", collection, started);
        Ok(result)
    }

    /// Hash join: attach each left document's matching right-side bucket
    /// under `as_field`, preserving left order.
    pub fn lookup(
        &self,
        left: &str,
        right: &str,
        left_field: &str,
        right_field: &str,
        as_field: &str,
    ) -> Result<Vec<Value>> {
        let started = Instant::now();
        let left_path = DotPath::parse(left)?;
        let right_path = DotPath::parse(right)?;
        let left_key = DotPath::parse(left_field)?;
        let right_key = DotPath::parse(right_field)?;
        let view = self.shared.view.load_full();
        let joined = join::run(
            collection_docs(&view, &left_path),
            &collection_docs(&view, &right_path),
            &left_key,
            &right_key,
            as_field,
        );
        self.observe_query("lookup", left, started);
        Ok(joined)
    }

    fn index_seed(
        &self,
        collection: &DotPath,
        filters: &[Filter],
        view: &Value,
    ) -> Option<Vec<Value>> {
        let indexes = self.shared.indexes.read();
        for filter in filters {
            if filter.op != FilterOp::Eq {
                continue;
            }
            let Some(index) = indexes.covering(collection, &filter.field) else {
                continue;
            };
            let docs = index
                .paths(&filter.value)
                .map(|paths| {
                    paths
                        .iter()
                        .filter_map(|path_text| {
                            DotPath::parse(path_text)
                                .ok()
                                .and_then(|p| tree::get(view, &p).cloned())
                        })
                        .collect()
                })
                .unwrap_or_default();
            return Some(docs);
        }
        None
    }

    fn observe_query(&self, kind: &str, collection: &str, started: Instant) {
        let elapsed_ms = started.elapsed().as_millis() as u64;
        if elapsed_ms > self.shared.config.slow_query_threshold_ms {
            tracing::warn!(
                target: "dotdb::slow_query",
                kind,
                collection,
                elapsed_ms,
                "slow query"
            );
        }
    }

    // --- Durability controls ---

    /// Force a checkpoint now.
    pub fn save(&self) -> Result<()> {
        self.ensure_writable()?;
        self.shared.checkpoint()
    }

    /// Block until every accepted record is fsynced.
    pub fn sync(&self) -> Result<()> {
        self.shared.sync_wal()
    }

    pub fn wal_status(&self) -> WalStatus {
        WalStatus {
            enabled: self.shared.config.durability != Durability::None,
            durable_lsn: self.shared.durable_lsn.load(Ordering::SeqCst),
        }
    }

    /// Flush, take a final checkpoint, stop background work, release the
    /// file lock. Idempotent; also invoked on drop.
    pub fn close(&self) -> Result<()> {
        if self.shared.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        {
            let mut stop = self.shared.control.lock();
            *stop = true;
        }
        self.shared.control_cv.notify_all();
        for handle in self.threads.lock().drain(..) {
            let _ = handle.join();
        }
        let result = if self.shared.read_only {
            Ok(())
        } else {
            self.shared.checkpoint()
        };
        self.shared.lock_guard.lock().take();
        tracing::info!(path = %self.shared.db_path.display(), "store closed");
        result
    }
}

impl Drop for Database {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::error!(error = %e, "close on drop failed");
        }
    }
}

fn collection_docs(view: &Value, path: &DotPath) -> Vec<Value> {
    match tree::get(view, path) {
        Some(node) => tree::children(node)
            .into_iter()
            .map(|(_, doc)| doc.clone())
            .collect(),
        None => Vec::new(),
    }
}

fn suffixed(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(suffix);
    PathBuf::from(name)
}
