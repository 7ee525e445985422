//! Dot-notation paths and the copy-on-write tree operations addressed by them.
//!
//! A path such as `"todos.0.text"` is split into segments. Each segment is a
//! mapping key, or a sequence index when the container it is applied to is a
//! sequence. The trailing segment `length` on a sequence is virtual: it is
//! never stored, it is computed on read.
//!
//! # Example
//!
//! ```ignore
//! let tree = Value::from(json!({"todos": [{"text": "a"}]}));
//! let path = Path::parse("todos.0.text")?;
//!
//! let next = write(&tree, &path, Value::from("b"))?;
//! assert_eq!(read(&next, &path), Some(Value::from("b")));
//! assert_eq!(read(&tree, &path), Some(Value::from("a")));
//! ```

mod operations;
mod types;

pub use operations::{exists, lookup, read, remove, write, MAX_SEQUENCE_GAP};
pub(crate) use types::as_index;
pub use types::{Path, LENGTH};
