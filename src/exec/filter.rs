// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Filter predicates and the parallel filter scan.

use dotdb_kernel::{tree, DotPath, Value};
use rayon::prelude::*;
use regex::Regex;

use crate::error::{DbError, Result};

use super::{chunk_size, PARALLEL_THRESHOLD};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    Contains,
    StartsWith,
    EndsWith,
    In,
    NotIn,
    Regex,
    ContainsAll,
    ContainsAny,
}

impl FilterOp {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "eq" => Some(FilterOp::Eq),
            "ne" => Some(FilterOp::Ne),
            "gt" => Some(FilterOp::Gt),
            "gte" => Some(FilterOp::Gte),
            "lt" => Some(FilterOp::Lt),
            "lte" => Some(FilterOp::Lte),
            "contains" => Some(FilterOp::Contains),
            "startsWith" => Some(FilterOp::StartsWith),
            "endsWith" => Some(FilterOp::EndsWith),
            "in" => Some(FilterOp::In),
            "notIn" => Some(FilterOp::NotIn),
            "regex" => Some(FilterOp::Regex),
            "containsAll" => Some(FilterOp::ContainsAll),
            "containsAny" => Some(FilterOp::ContainsAny),
            _ => None,
        }
    }
}

/// One predicate against a document field. `field` may itself be a dot
/// path into the document.
#[derive(Debug, Clone)]
pub struct Filter {
    pub field: String,
    pub op: FilterOp,
    pub value: Value,
}

impl Filter {
    pub fn new(field: impl Into<String>, op: FilterOp, value: impl Into<Value>) -> Self {
        Filter {
            field: field.into(),
            op,
            value: value.into(),
        }
    }
}

/// A filter with its field path and regex compiled once per query.
#[derive(Debug)]
pub(crate) struct CompiledFilter {
    field: DotPath,
    op: FilterOp,
    value: Value,
    regex: Option<Regex>,
}

pub(crate) fn compile(filters: &[Filter]) -> Result<Vec<CompiledFilter>> {
    filters
        .iter()
        .map(|filter| {
            let field = DotPath::parse(&filter.field)
                .map_err(|e| DbError::InvalidFilter(e.to_string()))?;
            let regex = if filter.op == FilterOp::Regex {
                let pattern = filter.value.as_str().ok_or_else(|| {
                    DbError::InvalidFilter("regex filter value must be a string".into())
                })?;
                Some(
                    Regex::new(pattern)
                        .map_err(|e| DbError::InvalidFilter(format!("bad regex: {e}")))?,
                )
            } else {
                None
            };
            Ok(CompiledFilter {
                field,
                op: filter.op,
                value: filter.value.clone(),
                regex,
            })
        })
        .collect()
}

impl CompiledFilter {
    pub fn matches(&self, doc: &Value) -> bool {
        let field_value = tree::get(doc, &self.field);
        match self.op {
            FilterOp::Eq => field_value == Some(&self.value),
            FilterOp::Ne => field_value != Some(&self.value),
            FilterOp::Gt => compare(field_value, &self.value, |o| o == std::cmp::Ordering::Greater),
            FilterOp::Gte => compare(field_value, &self.value, |o| o != std::cmp::Ordering::Less),
            FilterOp::Lt => compare(field_value, &self.value, |o| o == std::cmp::Ordering::Less),
            FilterOp::Lte => compare(field_value, &self.value, |o| o != std::cmp::Ordering::Greater),
            FilterOp::Contains => match (field_value, &self.value) {
                (Some(Value::String(haystack)), Value::String(needle)) => {
                    haystack.contains(needle.as_str())
                }
                (Some(Value::Array(items)), needle) => items.contains(needle),
                _ => false,
            },
            FilterOp::StartsWith => match (field_value, &self.value) {
                (Some(Value::String(s)), Value::String(prefix)) => s.starts_with(prefix.as_str()),
                _ => false,
            },
            FilterOp::EndsWith => match (field_value, &self.value) {
                (Some(Value::String(s)), Value::String(suffix)) => s.ends_with(suffix.as_str()),
                _ => false,
            },
            FilterOp::In => match (&self.value, field_value) {
                (Value::Array(options), Some(fv)) => options.contains(fv),
                _ => false,
            },
            FilterOp::NotIn => match (&self.value, field_value) {
                (Value::Array(options), Some(fv)) => !options.contains(fv),
                (Value::Array(_), None) => true,
                _ => false,
            },
            FilterOp::Regex => match (field_value, &self.regex) {
                (Some(Value::String(s)), Some(regex)) => regex.is_match(s),
                _ => false,
            },
            FilterOp::ContainsAll => match (field_value, &self.value) {
                (Some(Value::Array(items)), Value::Array(wanted)) => {
                    wanted.iter().all(|w| items.contains(w))
                }
                _ => false,
            },
            FilterOp::ContainsAny => match (field_value, &self.value) {
                (Some(Value::Array(items)), Value::Array(wanted)) => {
                    wanted.iter().any(|w| items.contains(w))
                }
                _ => false,
            },
        }
    }
}

/// Numbers compare numerically, strings lexicographically; anything else
/// never orders.
fn compare(
    field_value: Option<&Value>,
    wanted: &Value,
    accept: impl Fn(std::cmp::Ordering) -> bool,
) -> bool {
    let ordering = match (field_value, wanted) {
        (Some(Value::Number(a)), Value::Number(b)) => a.partial_cmp(b),
        (Some(Value::String(a)), Value::String(b)) => Some(a.as_str().cmp(b.as_str())),
        _ => None,
    };
    ordering.map(accept).unwrap_or(false)
}

/// Filter documents, preserving input order. Parallel above the
/// threshold, chunked so chunk results concatenate deterministically.
pub(crate) fn run(docs: Vec<Value>, filters: &[CompiledFilter]) -> Vec<Value> {
    let keep = |doc: &Value| filters.iter().all(|f| f.matches(doc));
    if docs.len() < PARALLEL_THRESHOLD {
        docs.into_iter().filter(|d| keep(d)).collect()
    } else {
        let size = chunk_size(docs.len());
        docs.par_chunks(size)
            .flat_map_iter(|chunk| chunk.iter().filter(|d| keep(d)).cloned())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(json: &str) -> Value {
        Value::from_json(json).unwrap()
    }

    fn matches_one(filter: Filter, document: &Value) -> bool {
        compile(std::slice::from_ref(&filter)).unwrap()[0].matches(document)
    }

    #[test]
    fn test_eq_ne() {
        let d = doc(r#"{"age":30.0,"name":"Ann"}"#);
        assert!(matches_one(Filter::new("age", FilterOp::Eq, 30), &d));
        assert!(!matches_one(Filter::new("age", FilterOp::Eq, 31), &d));
        assert!(matches_one(Filter::new("missing", FilterOp::Ne, 1), &d));
    }

    #[test]
    fn test_numeric_and_string_ordering() {
        let d = doc(r#"{"age":30.0,"name":"bob"}"#);
        assert!(matches_one(Filter::new("age", FilterOp::Gte, 30), &d));
        assert!(matches_one(Filter::new("age", FilterOp::Lt, 31), &d));
        assert!(matches_one(Filter::new("name", FilterOp::Gt, "alice"), &d));
        // Mixed types never order.
        assert!(!matches_one(Filter::new("name", FilterOp::Gt, 5), &d));
    }

    #[test]
    fn test_string_ops() {
        let d = doc(r#"{"email":"alice@example.com"}"#);
        assert!(matches_one(Filter::new("email", FilterOp::Contains, "@example"), &d));
        assert!(matches_one(Filter::new("email", FilterOp::StartsWith, "alice"), &d));
        assert!(matches_one(Filter::new("email", FilterOp::EndsWith, ".com"), &d));
        assert!(matches_one(Filter::new("email", FilterOp::Regex, "^[a-z]+@"), &d));
    }

    #[test]
    fn test_array_ops() {
        let d = doc(r#"{"tags":["a","b","c"]}"#);
        assert!(matches_one(Filter::new("tags", FilterOp::Contains, "b"), &d));
        assert!(matches_one(
            Filter::new("tags", FilterOp::ContainsAll, doc(r#"["a","c"]"#)),
            &d
        ));
        assert!(!matches_one(
            Filter::new("tags", FilterOp::ContainsAll, doc(r#"["a","z"]"#)),
            &d
        ));
        assert!(matches_one(
            Filter::new("tags", FilterOp::ContainsAny, doc(r#"["z","c"]"#)),
            &d
        ));
    }

    #[test]
    fn test_in_not_in() {
        let d = doc(r#"{"status":"open"}"#);
        let options = doc(r#"["open","pending"]"#);
        assert!(matches_one(Filter::new("status", FilterOp::In, options.clone()), &d));
        assert!(!matches_one(Filter::new("status", FilterOp::NotIn, options), &d));
        assert!(matches_one(
            Filter::new("missing", FilterOp::NotIn, doc(r#"["x"]"#)),
            &d
        ));
    }

    #[test]
    fn test_nested_field_path() {
        let d = doc(r#"{"address":{"city":"Oslo"}}"#);
        assert!(matches_one(Filter::new("address.city", FilterOp::Eq, "Oslo"), &d));
    }

    #[test]
    fn test_bad_regex_is_invalid_filter() {
        let err = compile(&[Filter::new("x", FilterOp::Regex, "[")]).unwrap_err();
        assert!(matches!(err, DbError::InvalidFilter(_)));
    }

    #[test]
    fn test_parallel_equals_sequential() {
        let docs: Vec<Value> = (0..500)
            .map(|i| doc(&format!(r#"{{"id":{i},"even":{}}}"#, i % 2 == 0)))
            .collect();
        let filters = compile(&[
            Filter::new("even", FilterOp::Eq, true),
            Filter::new("id", FilterOp::Gte, 100),
        ])
        .unwrap();

        let sequential: Vec<Value> = docs
            .iter()
            .filter(|d| filters.iter().all(|f| f.matches(d)))
            .cloned()
            .collect();
        let parallel = run(docs, &filters);
        assert_eq!(parallel, sequential);
        assert_eq!(parallel.len(), 200);
    }
}
