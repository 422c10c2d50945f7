// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Hash join between two collections.
//!
//! Build phase buckets the right collection by the stringified join key;
//! probe phase walks the left collection (in parallel above the
//! threshold), attaching each left document's bucket (possibly empty)
//! under `as_field` on a cloned copy. Left order is preserved.

use std::sync::Arc;

use dotdb_kernel::{tree, DotPath, Value};
use rayon::prelude::*;
use rustc_hash::FxHashMap;

use crate::index::value_key;

use super::{chunk_size, PARALLEL_THRESHOLD};

pub(crate) fn run(
    left: Vec<Value>,
    right: &[Value],
    left_field: &DotPath,
    right_field: &DotPath,
    as_field: &str,
) -> Vec<Value> {
    let mut buckets: FxHashMap<String, Vec<Value>> = FxHashMap::default();
    for doc in right {
        if let Some(key_value) = tree::get(doc, right_field) {
            buckets.entry(value_key(key_value)).or_default().push(doc.clone());
        }
    }

    let attach = |doc: &Value| -> Value {
        let matched = tree::get(doc, left_field)
            .and_then(|key_value| buckets.get(&value_key(key_value)))
            .cloned()
            .unwrap_or_default();
        let mut out = doc.clone();
        if let Value::Object(map) = &mut out {
            Arc::make_mut(map).insert(as_field.to_string(), Value::from(matched));
        }
        out
    };

    if left.len() < PARALLEL_THRESHOLD {
        left.iter().map(attach).collect()
    } else {
        let size = chunk_size(left.len());
        left.par_chunks(size)
            .flat_map_iter(|chunk| chunk.iter().map(attach))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn docs(json: &str) -> Vec<Value> {
        match Value::from_json(json).unwrap() {
            Value::Array(items) => items.as_ref().clone(),
            _ => panic!("expected array"),
        }
    }

    #[test]
    fn test_attaches_buckets_in_left_order() {
        let users = docs(
            r#"[{"id":1.0,"name":"Alice"},{"id":2.0,"name":"Bob"},{"id":3.0,"name":"Charlie"}]"#,
        );
        let orders = docs(
            r#"[{"userId":1.0,"sku":"a"},{"userId":2.0,"sku":"b"},{"userId":2.0,"sku":"c"},{"userId":1.0,"sku":"d"},{"userId":2.0,"sku":"e"}]"#,
        );
        let joined = run(
            users,
            &orders,
            &DotPath::parse("id").unwrap(),
            &DotPath::parse("userId").unwrap(),
            "orders",
        );

        assert_eq!(joined.len(), 3);
        let lengths: Vec<usize> = joined
            .iter()
            .map(|u| u.get_key("orders").and_then(Value::as_array).map_or(0, <[Value]>::len))
            .collect();
        assert_eq!(lengths, vec![2, 3, 0]);
        // Left order preserved.
        let names: Vec<&str> = joined
            .iter()
            .filter_map(|u| u.get_key("name").and_then(Value::as_str))
            .collect();
        assert_eq!(names, vec!["Alice", "Bob", "Charlie"]);
    }

    #[test]
    fn test_missing_left_key_gets_empty_bucket() {
        let left = docs(r#"[{"name":"NoKey"}]"#);
        let right = docs(r#"[{"userId":1.0}]"#);
        let joined = run(
            left,
            &right,
            &DotPath::parse("id").unwrap(),
            &DotPath::parse("userId").unwrap(),
            "orders",
        );
        assert_eq!(
            joined[0].get_key("orders"),
            Some(&Value::new_array())
        );
    }

    #[test]
    fn test_originals_untouched() {
        let left = docs(r#"[{"id":1.0}]"#);
        let right = docs(r#"[{"userId":1.0}]"#);
        let joined = run(
            left.clone(),
            &right,
            &DotPath::parse("id").unwrap(),
            &DotPath::parse("userId").unwrap(),
            "hits",
        );
        assert!(joined[0].get_key("hits").is_some());
        assert!(left[0].get_key("hits").is_none());
    }
}
