// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Transactions with savepoints.
//!
//! A transaction works on a private copy of the root (cheap: container
//! clones are reference-count bumps) while holding the engine write lock.
//! Journal records buffer in memory and reach the WAL only on commit,
//! under one flush boundary, so an aborted span never survives replay.
//! Savepoints capture `(root, change-mark)` pairs; `rollback_to` restores
//! them. Nested transactions are anonymous savepoints.

use dotdb_kernel::{tree, DotPath, Value};

use crate::engine::Shared;
use crate::error::{DbError, Result};
use crate::ops::{apply_op, Change, WriteOp};

pub(crate) struct Savepoint {
    name: String,
    root: Value,
    change_mark: usize,
}

/// Handle passed to the closure of [`crate::Database::transaction`].
pub struct Transaction<'db> {
    shared: &'db Shared,
    root: Value,
    changes: Vec<Change>,
    savepoints: Vec<Savepoint>,
}

impl<'db> Transaction<'db> {
    pub(crate) fn begin(shared: &'db Shared, root: Value) -> Self {
        Transaction {
            shared,
            root,
            changes: Vec::new(),
            savepoints: Vec::new(),
        }
    }

    pub(crate) fn into_parts(self) -> (Value, Vec<Change>) {
        (self.root, self.changes)
    }

    fn apply(&mut self, op: WriteOp) -> Result<Option<Change>> {
        let hooks = self.shared.hooks.lock().before_snapshot();
        let change = apply_op(&mut self.root, &self.shared.schemas, &hooks, op)?;
        if let Some(change) = &change {
            self.changes.push(change.clone());
        }
        Ok(change)
    }

    pub fn set(&mut self, path: &str, value: impl Into<Value>) -> Result<Option<Value>> {
        let path = DotPath::parse(path)?;
        Ok(self
            .apply(WriteOp::Set { path, value: value.into() })?
            .and_then(|c| c.old))
    }

    pub fn delete(&mut self, path: &str) -> Result<Option<Value>> {
        let path = DotPath::parse(path)?;
        Ok(self.apply(WriteOp::Delete { path })?.and_then(|c| c.old))
    }

    pub fn push(&mut self, path: &str, items: Vec<Value>) -> Result<()> {
        let path = DotPath::parse(path)?;
        self.apply(WriteOp::Push { path, items })?;
        Ok(())
    }

    pub fn pull(&mut self, path: &str, items: Vec<Value>) -> Result<()> {
        let path = DotPath::parse(path)?;
        self.apply(WriteOp::Pull { path, items })?;
        Ok(())
    }

    pub fn add(&mut self, path: &str, amount: f64) -> Result<f64> {
        self.numeric(path, amount, false)
    }

    pub fn subtract(&mut self, path: &str, amount: f64) -> Result<f64> {
        self.numeric(path, amount, true)
    }

    fn numeric(&mut self, path: &str, amount: f64, subtract: bool) -> Result<f64> {
        let path = DotPath::parse(path)?;
        let change = self.apply(WriteOp::Add { path, amount, subtract })?;
        change
            .and_then(|c| c.numeric)
            .ok_or_else(|| DbError::Type("numeric op produced no result".into()))
    }

    /// Read from the transaction's working state (uncommitted writes are
    /// visible here, not to concurrent readers).
    pub fn get(&self, path: &str) -> Option<Value> {
        let path = DotPath::parse(path).ok()?;
        tree::get(&self.root, &path).cloned()
    }

    pub fn has(&self, path: &str) -> bool {
        DotPath::parse(path)
            .map(|p| tree::get(&self.root, &p).is_some())
            .unwrap_or(false)
    }

    pub fn savepoint(&mut self, name: &str) {
        self.savepoints.push(Savepoint {
            name: name.to_string(),
            root: self.root.clone(),
            change_mark: self.changes.len(),
        });
    }

    /// Restore the most recent savepoint with this name. The savepoint
    /// stays usable afterwards; savepoints created after it are dropped.
    pub fn rollback_to(&mut self, name: &str) -> Result<()> {
        let position = self
            .savepoints
            .iter()
            .rposition(|sp| sp.name == name)
            .ok_or_else(|| DbError::TxConflict(name.to_string()))?;
        let savepoint = &self.savepoints[position];
        self.root = savepoint.root.clone();
        self.changes.truncate(savepoint.change_mark);
        self.savepoints.truncate(position + 1);
        Ok(())
    }

    /// Nested transaction: an anonymous savepoint that rolls back when the
    /// closure errors and is absorbed into the parent when it succeeds.
    pub fn transaction<T>(
        &mut self,
        f: impl FnOnce(&mut Transaction<'db>) -> Result<T>,
    ) -> Result<T> {
        let change_mark = self.changes.len();
        let savepoint_mark = self.savepoints.len();
        let snapshot = self.root.clone();
        match f(self) {
            Ok(value) => Ok(value),
            Err(e) => {
                self.root = snapshot;
                self.changes.truncate(change_mark);
                self.savepoints.truncate(savepoint_mark);
                Err(e)
            }
        }
    }
}
