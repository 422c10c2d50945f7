// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! The write-op core shared by single operations, batches, transactions,
//! and WAL replay.
//!
//! Every mutation is expressed as a [`WriteOp`], applied to a working
//! root, and summarized as a [`Change`]: the journal record to append,
//! the old/new values for notification, and the numeric result for
//! `add`/`subtract`. Applying the same journal records to the same base
//! state is deterministic, which is what makes replay idempotent.

use dotdb_kernel::{tree, DotPath, Schema, Value};
use dotdb_persistence::{WalOp, WalRecord};

use crate::error::Result;
use crate::subscribe::{BeforeHooks, Method};

#[derive(Debug, Clone)]
pub(crate) enum WriteOp {
    Set { path: DotPath, value: Value },
    Delete { path: DotPath },
    Push { path: DotPath, items: Vec<Value> },
    Pull { path: DotPath, items: Vec<Value> },
    Add { path: DotPath, amount: f64, subtract: bool },
}

/// Outcome of one applied mutation.
#[derive(Debug, Clone)]
pub(crate) struct Change {
    pub path: DotPath,
    pub wal_op: WalOp,
    pub payload: Vec<u8>,
    pub method: Method,
    pub old: Option<Value>,
    pub new: Option<Value>,
    /// New number for `add`/`subtract`.
    pub numeric: Option<f64>,
}

/// Apply one op to `root`. Returns `None` for no-ops (deleting an absent
/// key, pulling from an absent array); those produce no journal record
/// and no notification. Validation happens before any mutation.
pub(crate) fn apply_op(
    root: &mut Value,
    schemas: &[(DotPath, Schema)],
    hooks: &BeforeHooks,
    op: WriteOp,
) -> Result<Option<Change>> {
    match op {
        WriteOp::Set { path, value } => {
            let value = hooks.rewrite(Method::Set, &path.to_string(), value);
            validate(schemas, &path, &value)?;
            let payload = serde_json::to_vec(&value)?;
            let old = tree::set(root, &path, value.clone())?;
            Ok(Some(Change {
                path,
                wal_op: WalOp::Set,
                payload,
                method: Method::Set,
                old,
                new: Some(value),
                numeric: None,
            }))
        }
        WriteOp::Delete { path } => {
            let old = tree::delete(root, &path)?;
            if old.is_none() {
                return Ok(None);
            }
            Ok(Some(Change {
                path,
                wal_op: WalOp::Delete,
                payload: Vec::new(),
                method: Method::Delete,
                old,
                new: None,
                numeric: None,
            }))
        }
        WriteOp::Push { path, items } => {
            let items: Vec<Value> = items
                .into_iter()
                .map(|item| hooks.rewrite(Method::Push, &path.to_string(), item))
                .collect();
            let merged = tree::pushed_array(tree::get(root, &path), &items, &path)?;
            let new = Value::from(merged);
            validate(schemas, &path, &new)?;
            let payload = serde_json::to_vec(&items)?;
            let old = tree::set(root, &path, new.clone())?;
            Ok(Some(Change {
                path,
                wal_op: WalOp::Push,
                payload,
                method: Method::Push,
                old,
                new: Some(new),
                numeric: None,
            }))
        }
        WriteOp::Pull { path, items } => {
            let items: Vec<Value> = items
                .into_iter()
                .map(|item| hooks.rewrite(Method::Pull, &path.to_string(), item))
                .collect();
            let Some(remaining) = tree::pulled_array(tree::get(root, &path), &items, &path)?
            else {
                return Ok(None);
            };
            let new = Value::from(remaining);
            validate(schemas, &path, &new)?;
            // Journaled as a plain set of the recomputed array.
            let payload = serde_json::to_vec(&new)?;
            let old = tree::set(root, &path, new.clone())?;
            Ok(Some(Change {
                path,
                wal_op: WalOp::Set,
                payload,
                method: Method::Pull,
                old,
                new: Some(new),
                numeric: None,
            }))
        }
        WriteOp::Add { path, amount, subtract } => {
            let method = if subtract { Method::Subtract } else { Method::Add };
            let amount = hooks
                .rewrite(method, &path.to_string(), Value::Number(amount))
                .as_f64()
                .unwrap_or(amount);
            let signed = if subtract { -amount } else { amount };
            let result = tree::added_number(tree::get(root, &path), signed, &path)?;
            let new = Value::Number(result);
            validate(schemas, &path, &new)?;
            let payload = serde_json::to_vec(&signed)?;
            let old = tree::set(root, &path, new.clone())?;
            Ok(Some(Change {
                path,
                wal_op: WalOp::AddNum,
                payload,
                method,
                old,
                new: Some(new),
                numeric: Some(result),
            }))
        }
    }
}

/// Check a prospective value at `path` against every schema whose prefix
/// covers it.
pub(crate) fn validate(
    schemas: &[(DotPath, Schema)],
    path: &DotPath,
    value: &Value,
) -> Result<()> {
    for (prefix, schema) in schemas {
        if let Some(remainder) = path.strip_prefix(prefix) {
            if let Some(sub) = schema.descend(remainder) {
                sub.validate(value, &path.to_string())?;
            }
        }
    }
    Ok(())
}

/// Replay one journal record against a recovering root.
pub(crate) fn apply_wal_record(root: &mut Value, record: &WalRecord) -> Result<()> {
    let path = DotPath::parse(&record.path)?;
    match record.op {
        WalOp::Set => {
            let value: Value = serde_json::from_slice(&record.payload)?;
            tree::set(root, &path, value)?;
        }
        WalOp::Delete => {
            tree::delete(root, &path)?;
        }
        WalOp::Push => {
            let items: Vec<Value> = serde_json::from_slice(&record.payload)?;
            let merged = tree::pushed_array(tree::get(root, &path), &items, &path)?;
            tree::set(root, &path, Value::from(merged))?;
        }
        WalOp::AddNum => {
            let delta: f64 = serde_json::from_slice(&record.payload)?;
            let result = tree::added_number(tree::get(root, &path), delta, &path)?;
            tree::set(root, &path, Value::Number(result))?;
        }
        WalOp::Checkpoint => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DbError;
    use crate::subscribe::HookRegistry;

    fn no_hooks() -> BeforeHooks {
        HookRegistry::default().before_snapshot()
    }

    fn path(text: &str) -> DotPath {
        DotPath::parse(text).unwrap()
    }

    #[test]
    fn test_set_produces_journal_record() {
        let mut root = Value::new_object();
        let change = apply_op(
            &mut root,
            &[],
            &no_hooks(),
            WriteOp::Set { path: path("a.b"), value: Value::from(1) },
        )
        .unwrap()
        .unwrap();
        assert_eq!(change.wal_op, WalOp::Set);
        assert_eq!(change.old, None);
        assert_eq!(change.new, Some(Value::from(1)));

        // The record replays to the same state.
        let record = WalRecord::new(1, change.wal_op, change.path.to_string(), change.payload);
        let mut replayed = Value::new_object();
        apply_wal_record(&mut replayed, &record).unwrap();
        assert_eq!(replayed, root);
    }

    #[test]
    fn test_delete_of_absent_is_noop() {
        let mut root = Value::new_object();
        let change = apply_op(
            &mut root,
            &[],
            &no_hooks(),
            WriteOp::Delete { path: path("missing") },
        )
        .unwrap();
        assert!(change.is_none());
    }

    #[test]
    fn test_pull_journals_as_set() {
        let mut root = Value::from_json(r#"{"tags":["a","b"]}"#).unwrap();
        let change = apply_op(
            &mut root,
            &[],
            &no_hooks(),
            WriteOp::Pull { path: path("tags"), items: vec![Value::from("a")] },
        )
        .unwrap()
        .unwrap();
        assert_eq!(change.wal_op, WalOp::Set);
        assert_eq!(change.new, Some(Value::from_json(r#"["b"]"#).unwrap()));
    }

    #[test]
    fn test_subtract_journals_negated_delta() {
        let mut root = Value::from_json(r#"{"counter":10.0}"#).unwrap();
        let change = apply_op(
            &mut root,
            &[],
            &no_hooks(),
            WriteOp::Add { path: path("counter"), amount: 3.0, subtract: true },
        )
        .unwrap()
        .unwrap();
        assert_eq!(change.numeric, Some(7.0));
        let delta: f64 = serde_json::from_slice(&change.payload).unwrap();
        assert_eq!(delta, -3.0);
    }

    #[test]
    fn test_validation_blocks_before_mutation() {
        let schema = Schema::compile(
            &Value::from_json(r#"{"properties":{"age":{"type":"number","minimum":0}}}"#).unwrap(),
        )
        .unwrap();
        let schemas = vec![(path("user"), schema)];
        let mut root = Value::new_object();

        let err = apply_op(
            &mut root,
            &schemas,
            &no_hooks(),
            WriteOp::Set { path: path("user.age"), value: Value::from(-4) },
        )
        .unwrap_err();
        assert!(matches!(err, DbError::Validation(_)));
        // Nothing was written.
        assert_eq!(tree::get(&root, &path("user")), None);
    }

    #[test]
    fn test_replay_is_idempotent() {
        let records = vec![
            WalRecord::new(1, WalOp::Set, "a", br#"{"x":1.0}"#.to_vec()),
            WalRecord::new(2, WalOp::Push, "tags", br#"["t1","t1","t2"]"#.to_vec()),
            WalRecord::new(3, WalOp::AddNum, "n", b"5.0".to_vec()),
            WalRecord::new(4, WalOp::Delete, "a.x", Vec::new()),
        ];
        let mut once = Value::new_object();
        for record in &records {
            apply_wal_record(&mut once, record).unwrap();
        }
        let mut twice = Value::new_object();
        for record in &records {
            apply_wal_record(&mut twice, record).unwrap();
        }
        assert_eq!(once, twice);
        assert_eq!(
            tree::get(&once, &path("tags")),
            Some(&Value::from_json(r#"["t1","t2"]"#).unwrap())
        );
    }
}
