//! Path resolution and copy-on-write writes against a value tree.

use super::types::{as_index, Path, LENGTH};
use crate::error::{Result, StoreError};
use crate::types::Value;
use std::sync::Arc;

/// Most `Null`s a single write may pad onto the end of a sequence.
pub const MAX_SEQUENCE_GAP: usize = 1024;

/// Borrow the stored node at `segments`, ignoring virtual segments.
pub fn lookup<'t>(tree: &'t Value, segments: &[String]) -> Option<&'t Value> {
    segments.iter().try_fold(tree, |node, segment| match node {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => as_index(segment).and_then(|i| items.get(i)),
        _ => None,
    })
}

/// Read the value at `path`.
///
/// Missing intermediates yield `None`. A trailing `length` on a sequence
/// yields its length, and on a missing parent yields `0`.
pub fn read(tree: &Value, path: &Path) -> Option<Value> {
    if let Some((last, parent)) = path.segments().split_last() {
        if last == LENGTH {
            match lookup(tree, parent) {
                Some(Value::Array(items)) => return Some(Value::from(items.len())),
                None => return Some(Value::from(0)),
                Some(_) => {}
            }
        }
    }
    lookup(tree, path.segments()).cloned()
}

/// Whether `path` resolves to a stored node (or a sequence's `length`).
pub fn exists(tree: &Value, path: &Path) -> bool {
    if let Some((last, parent)) = path.segments().split_last() {
        if last == LENGTH && matches!(lookup(tree, parent), Some(Value::Array(_))) {
            return true;
        }
    }
    lookup(tree, path.segments()).is_some()
}

/// Produce a new tree with `value` stored at `path`.
///
/// Every container on the path is copied; everything else is shared with
/// `tree`. Scalar and missing intermediates are replaced by a new sequence
/// (if the next segment is an index) or mapping. Indices past the end pad
/// with `Null`, at most [`MAX_SEQUENCE_GAP`] of them.
pub fn write(tree: &Value, path: &Path, value: Value) -> Result<Value> {
    let mut root = tree.clone();
    write_node(&mut root, path.segments(), value, path)?;
    Ok(root)
}

fn write_node(node: &mut Value, segments: &[String], value: Value, path: &Path) -> Result<()> {
    let Some((head, rest)) = segments.split_first() else {
        *node = value;
        return Ok(());
    };

    match node {
        Value::Object(map) => {
            let child = Arc::make_mut(map).entry(head.clone()).or_default();
            write_node(child, rest, value, path)
        }
        Value::Array(items) => {
            if head == LENGTH && rest.is_empty() {
                let len = value
                    .as_u64()
                    .and_then(|len| usize::try_from(len).ok())
                    .ok_or_else(|| {
                        StoreError::type_mismatch(path, "sequence length must be a non-negative integer")
                    })?;
                check_padding(items.len(), len, path)?;
                Arc::make_mut(items).resize(len, Value::Null);
                return Ok(());
            }

            let index = as_index(head).ok_or_else(|| {
                StoreError::type_mismatch(path, format!("{head:?} is not a sequence index"))
            })?;
            if index >= items.len() {
                let len = index.checked_add(1).ok_or_else(|| {
                    StoreError::type_mismatch(path, format!("index {index} is out of range"))
                })?;
                check_padding(items.len(), len, path)?;
                Arc::make_mut(items).resize(len, Value::Null);
            }
            write_node(&mut Arc::make_mut(items)[index], rest, value, path)
        }
        scalar => {
            *scalar = if as_index(head).is_some() {
                Value::array(Vec::new())
            } else {
                Value::object()
            };
            write_node(scalar, segments, value, path)
        }
    }
}

/// Refuse to grow a sequence from `current` to `requested` elements when
/// that would pad more than [`MAX_SEQUENCE_GAP`] `Null`s.
fn check_padding(current: usize, requested: usize, path: &Path) -> Result<()> {
    if requested > current.saturating_add(MAX_SEQUENCE_GAP) {
        return Err(StoreError::type_mismatch(
            path,
            format!(
                "growing a sequence of {current} to {requested} elements exceeds the padding limit of {MAX_SEQUENCE_GAP}"
            ),
        ));
    }
    Ok(())
}

/// Produce a new tree without the node at `path`.
///
/// Returns the new tree and the removed node. When nothing is stored at
/// `path` the original tree is returned unchanged. Removing a sequence
/// element shifts every later element down by one. Removing the root
/// leaves an empty mapping.
pub fn remove(tree: &Value, path: &Path) -> (Value, Option<Value>) {
    let Some(existing) = lookup(tree, path.segments()) else {
        return (tree.clone(), None);
    };
    let removed = existing.clone();

    let Some((last, parent)) = path.segments().split_last() else {
        return (Value::object(), Some(removed));
    };

    let mut root = tree.clone();
    if let Some(container) = lookup_mut(&mut root, parent) {
        match container {
            Value::Object(map) => {
                Arc::make_mut(map).remove(last);
            }
            Value::Array(items) => {
                if let Some(index) = as_index(last) {
                    Arc::make_mut(items).remove(index);
                }
            }
            _ => {}
        }
    }
    (root, Some(removed))
}

/// Copy-on-write descent to an existing node.
fn lookup_mut<'t>(tree: &'t mut Value, segments: &[String]) -> Option<&'t mut Value> {
    let mut node = tree;
    for segment in segments {
        node = match node {
            Value::Object(map) => Arc::make_mut(map).get_mut(segment)?,
            Value::Array(items) => {
                let index = as_index(segment)?;
                Arc::make_mut(items).get_mut(index)?
            }
            _ => return None,
        };
    }
    Some(node)
}
