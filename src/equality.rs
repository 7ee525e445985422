//! Change detection applied before a write is committed.

use crate::types::Value;

/// How a store decides whether a write actually changes anything.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ChangeDetection {
    /// Every write is a change.
    Disabled,
    /// Scalars by value, containers by identity.
    Strict,
    /// Containers equal when their direct children are strictly equal.
    Shallow,
    /// Full structural equality.
    #[default]
    Deep,
}

impl ChangeDetection {
    /// True if replacing `old` with `new` should be skipped.
    ///
    /// `None` stands for an absent value; two absent values are equal.
    pub fn is_unchanged(self, old: Option<&Value>, new: Option<&Value>) -> bool {
        let (old, new) = match (old, new) {
            (None, None) => return self != ChangeDetection::Disabled,
            (Some(old), Some(new)) => (old, new),
            _ => return false,
        };

        match self {
            ChangeDetection::Disabled => false,
            ChangeDetection::Strict => old.ptr_eq(new),
            ChangeDetection::Shallow => shallow_eq(old, new),
            ChangeDetection::Deep => old == new,
        }
    }
}

fn shallow_eq(old: &Value, new: &Value) -> bool {
    if old.ptr_eq(new) {
        return true;
    }
    match (old, new) {
        (Value::Array(a), Value::Array(b)) => {
            a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x.ptr_eq(y))
        }
        (Value::Object(a), Value::Object(b)) => {
            a.len() == b.len()
                && a.iter()
                    .zip(b.iter())
                    .all(|((ka, va), (kb, vb))| ka == kb && va.ptr_eq(vb))
        }
        _ => false,
    }
}
