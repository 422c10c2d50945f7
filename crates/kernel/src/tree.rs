//! Path-addressed reads and mutations over a [`Value`] tree.
//!
//! All writes funnel through [`set`] / [`delete`], which copy the ancestor
//! spine with `Arc::make_mut` and leave untouched subtrees shared. A reader
//! holding a clone of the old root keeps seeing the old tree.
//!
//! Array-returning operations (`pushed_array`, `pulled_array`,
//! `added_number`) compute the prospective result without mutating, so a
//! caller can validate it first and then commit with [`set`].

use std::sync::Arc;

use crate::error::{KernelError, Result};
use crate::path::{is_index_segment, DotPath};
use crate::value::{Map, Value};

/// Read the node at `path`. Absent segments and out-of-range indices yield
/// `None`; a non-numeric segment at an array node is also absent on read.
pub fn get<'a>(root: &'a Value, path: &DotPath) -> Option<&'a Value> {
    let mut current = root;
    for segment in path.segments() {
        current = match current {
            Value::Object(map) => map.get(segment.as_str())?,
            Value::Array(items) => {
                if !is_index_segment(segment) {
                    return None;
                }
                items.get(segment.parse::<usize>().ok()?)?
            }
            _ => return None,
        };
    }
    Some(current)
}

/// Write `value` at `path`, creating missing intermediate objects, and
/// return the previous value if any. An existing scalar on the way is
/// replaced by a fresh object, matching write-through semantics. The empty
/// path replaces the whole root, which must stay an object.
pub fn set(root: &mut Value, path: &DotPath, value: Value) -> Result<Option<Value>> {
    if path.is_root() {
        if !value.is_object() {
            return Err(KernelError::Type {
                path: String::new(),
                expected: "object",
                found: value.type_name(),
            });
        }
        return Ok(Some(std::mem::replace(root, value)));
    }

    let segments = path.segments();
    let Some((last, parents)) = segments.split_last() else {
        return Err(KernelError::path("", "empty path"));
    };

    let mut current = root;
    for segment in parents {
        current = descend_or_create(current, segment, path)?;
    }

    match current {
        Value::Object(map) => Ok(Arc::make_mut(map).insert(last.clone(), value)),
        Value::Array(items) => {
            let index = parse_index(last, path)?;
            let items = Arc::make_mut(items);
            if index >= items.len() {
                return Err(KernelError::path(
                    path.to_string(),
                    format!("array index {index} out of range (len {})", items.len()),
                ));
            }
            Ok(Some(std::mem::replace(&mut items[index], value)))
        }
        other => {
            let mut map = Map::new();
            map.insert(last.clone(), value);
            *other = Value::Object(Arc::new(map));
            Ok(None)
        }
    }
}

/// Remove the node at `path` and return it. Missing targets are `Ok(None)`;
/// deleting the root is rejected.
pub fn delete(root: &mut Value, path: &DotPath) -> Result<Option<Value>> {
    if path.is_root() {
        return Err(KernelError::path("", "cannot delete the root"));
    }

    let segments = path.segments();
    let Some((last, parents)) = segments.split_last() else {
        return Err(KernelError::path("", "empty path"));
    };

    let mut current = root;
    for segment in parents {
        current = match current {
            Value::Object(map) => {
                if !map.contains_key(segment.as_str()) {
                    return Ok(None);
                }
                match Arc::make_mut(map).get_mut(segment.as_str()) {
                    Some(next) => next,
                    None => return Ok(None),
                }
            }
            Value::Array(items) => {
                if !is_index_segment(segment) {
                    return Err(KernelError::path(
                        path.to_string(),
                        format!("`{segment}` is not an array index"),
                    ));
                }
                let index = parse_index(segment, path)?;
                if index >= items.len() {
                    return Ok(None);
                }
                &mut Arc::make_mut(items)[index]
            }
            _ => return Ok(None),
        };
    }

    match current {
        Value::Object(map) => Ok(Arc::make_mut(map).shift_remove(last.as_str())),
        Value::Array(items) => {
            if !is_index_segment(last) {
                return Err(KernelError::path(
                    path.to_string(),
                    format!("`{last}` is not an array index"),
                ));
            }
            let index = parse_index(last, path)?;
            if index >= items.len() {
                return Ok(None);
            }
            Ok(Some(Arc::make_mut(items).remove(index)))
        }
        _ => Ok(None),
    }
}

/// Prospective result of pushing `items` at a target currently holding
/// `current`. Items already present (by deep equality) are skipped, as are
/// duplicates within `items` itself.
pub fn pushed_array(
    current: Option<&Value>,
    items: &[Value],
    path: &DotPath,
) -> Result<Vec<Value>> {
    let mut result = match current {
        None => Vec::new(),
        Some(Value::Array(existing)) => existing.as_ref().clone(),
        Some(other) => {
            return Err(KernelError::Type {
                path: path.to_string(),
                expected: "array",
                found: other.type_name(),
            })
        }
    };
    for item in items {
        if !result.contains(item) {
            result.push(item.clone());
        }
    }
    Ok(result)
}

/// Prospective result of pulling `items` (deep-equal matches removed).
/// `None` means the target is absent and there is nothing to do.
pub fn pulled_array(
    current: Option<&Value>,
    items: &[Value],
    path: &DotPath,
) -> Result<Option<Vec<Value>>> {
    match current {
        None => Ok(None),
        Some(Value::Array(existing)) => Ok(Some(
            existing
                .iter()
                .filter(|existing_item| !items.contains(existing_item))
                .cloned()
                .collect(),
        )),
        Some(other) => Err(KernelError::Type {
            path: path.to_string(),
            expected: "array",
            found: other.type_name(),
        }),
    }
}

/// Prospective result of a numeric read-modify-write. Absent targets start
/// from zero.
pub fn added_number(current: Option<&Value>, delta: f64, path: &DotPath) -> Result<f64> {
    match current {
        None | Some(Value::Null) => Ok(delta),
        Some(Value::Number(n)) => Ok(n + delta),
        Some(other) => Err(KernelError::Type {
            path: path.to_string(),
            expected: "number",
            found: other.type_name(),
        }),
    }
}

/// Immediate children of a container node, paired with the path segment
/// that addresses each one. Scalars have no children.
pub fn children(node: &Value) -> Vec<(String, &Value)> {
    match node {
        Value::Object(map) => map.iter().map(|(k, v)| (k.clone(), v)).collect(),
        Value::Array(items) => items
            .iter()
            .enumerate()
            .map(|(i, v)| (i.to_string(), v))
            .collect(),
        _ => Vec::new(),
    }
}

fn descend_or_create<'a>(
    node: &'a mut Value,
    segment: &str,
    full: &DotPath,
) -> Result<&'a mut Value> {
    match node {
        Value::Object(map) => Ok(Arc::make_mut(map)
            .entry(segment.to_string())
            .or_insert_with(Value::new_object)),
        Value::Array(items) => {
            if !is_index_segment(segment) {
                return Err(KernelError::path(
                    full.to_string(),
                    format!("`{segment}` is not an array index"),
                ));
            }
            let index = parse_index(segment, full)?;
            let items = Arc::make_mut(items);
            let len = items.len();
            items.get_mut(index).ok_or_else(|| {
                KernelError::path(
                    full.to_string(),
                    format!("array index {index} out of range (len {len})"),
                )
            })
        }
        other => {
            *other = Value::new_object();
            descend_or_create(other, segment, full)
        }
    }
}

fn parse_index(segment: &str, full: &DotPath) -> Result<usize> {
    if !is_index_segment(segment) {
        return Err(KernelError::path(
            full.to_string(),
            format!("`{segment}` is not an array index"),
        ));
    }
    segment
        .parse::<usize>()
        .map_err(|_| KernelError::path(full.to_string(), format!("`{segment}` is not an array index")))
}
