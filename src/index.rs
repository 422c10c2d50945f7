// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! In-memory equality indexes.
//!
//! Each index maps the normalized form of a document field value to an
//! ordered set of document paths, plus a reverse doc→key map so a
//! mutation can evict the stale entry in O(1). Maintenance is
//! incremental for mutations inside the collection and a full rebuild
//! when the collection node itself (or an ancestor) is replaced.

use std::collections::BTreeSet;
use std::path::Path;

use dotdb_kernel::{tree, DotPath, Value};
use dotdb_persistence::idx::{self, IndexSidecar, SidecarEntry};
use rustc_hash::FxHashMap;

use crate::config::IndexSpec;
use crate::error::{DbError, Result};

/// Normalized key for a field value: its JSON encoding, so `"1"` and `1`
/// never collide.
pub(crate) fn value_key(value: &Value) -> String {
    serde_json::to_string(value).unwrap_or_default()
}

pub(crate) struct EqualityIndex {
    name: String,
    collection: DotPath,
    field: String,
    buckets: FxHashMap<String, BTreeSet<String>>,
    doc_keys: FxHashMap<String, String>,
}

impl EqualityIndex {
    fn new(spec: &IndexSpec) -> Result<Self> {
        Ok(EqualityIndex {
            name: spec.name.clone(),
            collection: DotPath::parse(&spec.path)?,
            field: spec.field.clone(),
            buckets: FxHashMap::default(),
            doc_keys: FxHashMap::default(),
        })
    }

    /// First document path for a field value, in path order.
    pub fn first(&self, value: &Value) -> Option<&String> {
        self.buckets.get(&value_key(value)).and_then(|set| set.iter().next())
    }

    /// Full path set for a field value.
    pub fn paths(&self, value: &Value) -> Option<&BTreeSet<String>> {
        self.buckets.get(&value_key(value))
    }

    pub fn len(&self) -> usize {
        self.doc_keys.len()
    }

    fn clear(&mut self) {
        self.buckets.clear();
        self.doc_keys.clear();
    }

    fn insert_doc(&mut self, doc_path: String, key: String) {
        self.buckets
            .entry(key.clone())
            .or_default()
            .insert(doc_path.clone());
        self.doc_keys.insert(doc_path, key);
    }

    fn remove_doc(&mut self, doc_path: &str) {
        if let Some(key) = self.doc_keys.remove(doc_path) {
            if let Some(set) = self.buckets.get_mut(&key) {
                set.remove(doc_path);
                if set.is_empty() {
                    self.buckets.remove(&key);
                }
            }
        }
    }

    fn rebuild(&mut self, root: &Value) {
        self.clear();
        let Some(node) = tree::get(root, &self.collection) else {
            return;
        };
        for (key_segment, doc) in tree::children(node) {
            let doc_path = self.collection.child(&key_segment).to_string();
            if let Some(field_value) = doc.as_object().and_then(|m| m.get(self.field.as_str())) {
                self.insert_doc(doc_path, value_key(field_value));
            }
        }
    }

    /// Re-derive one document's entry after a mutation at or below it.
    fn refresh_doc(&mut self, root: &Value, key_segment: &str) {
        let doc_path = self.collection.child(key_segment);
        let doc_path_text = doc_path.to_string();
        self.remove_doc(&doc_path_text);
        if let Some(field_value) = tree::get(root, &doc_path)
            .and_then(Value::as_object)
            .and_then(|m| m.get(self.field.as_str()))
        {
            self.insert_doc(doc_path_text, value_key(field_value));
        }
    }

    fn to_sidecar(&self, checkpoint_lsn: u64) -> IndexSidecar {
        let mut entries: Vec<SidecarEntry> = self
            .buckets
            .iter()
            .map(|(key, paths)| SidecarEntry {
                key: key.clone(),
                paths: paths.iter().cloned().collect(),
            })
            .collect();
        entries.sort_by(|a, b| a.key.cmp(&b.key));
        IndexSidecar {
            name: self.name.clone(),
            collection: self.collection.to_string(),
            field: self.field.clone(),
            checkpoint_lsn,
            entries,
        }
    }

    /// Adopt a persisted sidecar if it describes this exact index at the
    /// given LSN frontier.
    fn adopt_sidecar(&mut self, sidecar: IndexSidecar, frontier: u64) -> bool {
        if sidecar.name != self.name
            || sidecar.collection != self.collection.to_string()
            || sidecar.field != self.field
            || sidecar.checkpoint_lsn != frontier
        {
            return false;
        }
        self.clear();
        for entry in sidecar.entries {
            for path in entry.paths {
                self.insert_doc(path, entry.key.clone());
            }
        }
        true
    }
}

pub(crate) struct IndexStore {
    indexes: Vec<EqualityIndex>,
}

impl IndexStore {
    pub fn new(specs: &[IndexSpec]) -> Result<IndexStore> {
        let mut indexes: Vec<EqualityIndex> = Vec::with_capacity(specs.len());
        for spec in specs {
            if indexes.iter().any(|i| i.name == spec.name) {
                return Err(DbError::Validation(format!(
                    "duplicate index name `{}`",
                    spec.name
                )));
            }
            indexes.push(EqualityIndex::new(spec)?);
        }
        Ok(IndexStore { indexes })
    }

    pub fn get(&self, name: &str) -> Option<&EqualityIndex> {
        self.indexes.iter().find(|i| i.name == name)
    }

    /// Index covering an equality filter on `field` over `collection`.
    pub fn covering(&self, collection: &DotPath, field: &str) -> Option<&EqualityIndex> {
        self.indexes
            .iter()
            .find(|i| &i.collection == collection && i.field == field)
    }

    pub fn rebuild_all(&mut self, root: &Value) {
        for index in &mut self.indexes {
            index.rebuild(root);
        }
    }

    /// Incrementally reflect a mutation at `path` against the post-state
    /// `root`.
    pub fn apply_mutation(&mut self, root: &Value, path: &DotPath) {
        for index in &mut self.indexes {
            if path.is_root() || index.collection.starts_with(path) {
                // The collection node itself may have been replaced.
                index.rebuild(root);
            } else if let Some(remainder) = path.strip_prefix(&index.collection) {
                if let Some(key_segment) = remainder.first() {
                    index.refresh_doc(root, key_segment);
                }
            }
        }
    }

    /// Adopt matching sidecars, rebuild the rest by scan.
    pub fn load_or_rebuild(&mut self, db_path: &Path, root: &Value, frontier: u64) {
        for index in &mut self.indexes {
            let sidecar_path = idx::sidecar_path(db_path, &index.name);
            let adopted = match idx::load(&sidecar_path) {
                Ok(sidecar) => index.adopt_sidecar(sidecar, frontier),
                Err(dotdb_persistence::PersistenceError::Io(ref e))
                    if e.kind() == std::io::ErrorKind::NotFound =>
                {
                    false
                }
                Err(e) => {
                    tracing::warn!(index = %index.name, error = %e, "unreadable index sidecar");
                    false
                }
            };
            if !adopted {
                index.rebuild(root);
                tracing::debug!(index = %index.name, entries = index.len(), "index rebuilt by scan");
            } else {
                tracing::debug!(index = %index.name, entries = index.len(), "index sidecar adopted");
            }
        }
    }

    /// Persist every index, stamped with the current LSN frontier.
    pub fn persist(&self, db_path: &Path, frontier: u64) -> Result<()> {
        for index in &self.indexes {
            let sidecar_path = idx::sidecar_path(db_path, &index.name);
            idx::store(&sidecar_path, &index.to_sidecar(frontier))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with(root: &Value) -> IndexStore {
        let mut store =
            IndexStore::new(&[IndexSpec::new("email", "users", "email")]).unwrap();
        store.rebuild_all(root);
        store
    }

    fn users() -> Value {
        Value::from_json(
            r#"{"users":{"alice":{"email":"a@x"},"bob":{"email":"b@x"},"carol":{"email":"a@x"}}}"#,
        )
        .unwrap()
    }

    #[test]
    fn test_rebuild_and_lookup() {
        let root = users();
        let store = store_with(&root);
        let index = store.get("email").unwrap();
        assert_eq!(
            index.first(&Value::from("b@x")),
            Some(&"users.bob".to_string())
        );
        // Duplicate values keep every path, first in path order.
        let paths = index.paths(&Value::from("a@x")).unwrap();
        assert_eq!(
            paths.iter().cloned().collect::<Vec<_>>(),
            vec!["users.alice".to_string(), "users.carol".to_string()]
        );
        assert!(index.first(&Value::from("zz@x")).is_none());
    }

    #[test]
    fn test_incremental_tracks_rewrites() {
        let mut root = users();
        let mut store = store_with(&root);

        let path = DotPath::parse("users.bob.email").unwrap();
        tree::set(&mut root, &path, Value::from("new@x")).unwrap();
        store.apply_mutation(&root, &path);

        let index = store.get("email").unwrap();
        assert!(index.first(&Value::from("b@x")).is_none());
        assert_eq!(
            index.first(&Value::from("new@x")),
            Some(&"users.bob".to_string())
        );
    }

    #[test]
    fn test_incremental_tracks_deletes() {
        let mut root = users();
        let mut store = store_with(&root);

        let path = DotPath::parse("users.alice").unwrap();
        tree::delete(&mut root, &path).unwrap();
        store.apply_mutation(&root, &path);

        let index = store.get("email").unwrap();
        assert_eq!(
            index.first(&Value::from("a@x")),
            Some(&"users.carol".to_string())
        );
    }

    #[test]
    fn test_collection_replacement_rebuilds() {
        let mut root = users();
        let mut store = store_with(&root);

        let path = DotPath::parse("users").unwrap();
        let replacement = Value::from_json(r#"{"dora":{"email":"d@x"}}"#).unwrap();
        tree::set(&mut root, &path, replacement).unwrap();
        store.apply_mutation(&root, &path);

        let index = store.get("email").unwrap();
        assert_eq!(index.len(), 1);
        assert_eq!(
            index.first(&Value::from("d@x")),
            Some(&"users.dora".to_string())
        );
    }

    #[test]
    fn test_incremental_equals_rebuild() {
        // P5-style check: after a burst of mutations the incremental index
        // matches a fresh rebuild.
        let mut root = users();
        let mut incremental = store_with(&root);

        let ops = [
            ("users.dave", Some(r#"{"email":"dv@x"}"#)),
            ("users.alice.email", Some(r#""a2@x""#)),
            ("users.bob", None),
            ("users.carol.name", Some(r#""Carol""#)),
        ];
        for (path_text, payload) in ops {
            let path = DotPath::parse(path_text).unwrap();
            match payload {
                Some(json) => {
                    tree::set(&mut root, &path, Value::from_json(json).unwrap()).unwrap();
                }
                None => {
                    tree::delete(&mut root, &path).unwrap();
                }
            }
            incremental.apply_mutation(&root, &path);
        }

        let fresh = store_with(&root);
        let a = incremental.get("email").unwrap();
        let b = fresh.get("email").unwrap();
        assert_eq!(a.len(), b.len());
        for value in ["a2@x", "dv@x", "a@x"] {
            assert_eq!(a.paths(&Value::from(value)), b.paths(&Value::from(value)));
        }
    }

    #[test]
    fn test_sidecar_round_trip_with_frontier_stamp() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("db.json");
        let root = users();
        let store = store_with(&root);
        store.persist(&db_path, 9).unwrap();

        // Matching frontier: adopted verbatim.
        let mut adopted =
            IndexStore::new(&[IndexSpec::new("email", "users", "email")]).unwrap();
        adopted.load_or_rebuild(&db_path, &Value::new_object(), 9);
        assert_eq!(
            adopted.get("email").unwrap().first(&Value::from("b@x")),
            Some(&"users.bob".to_string())
        );

        // Stale stamp: rebuilt from the (empty) tree instead.
        let mut rebuilt =
            IndexStore::new(&[IndexSpec::new("email", "users", "email")]).unwrap();
        rebuilt.load_or_rebuild(&db_path, &Value::new_object(), 10);
        assert_eq!(rebuilt.get("email").unwrap().len(), 0);
    }
}
