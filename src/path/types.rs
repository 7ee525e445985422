//! The parsed path type.

use crate::error::{Result, StoreError};
use std::fmt;
use std::str::FromStr;

/// Name of the virtual sequence-length segment.
pub const LENGTH: &str = "length";

/// An ordered list of path segments.
///
/// The root path has no segments and renders as `""`.
#[derive(Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Path {
    segments: Vec<String>,
}

impl Path {
    /// The root of the tree.
    pub fn root() -> Self {
        Self::default()
    }

    /// Parse a dot-separated path.
    ///
    /// Only the empty string is rejected. Empty segments (`"a..b"`) are kept
    /// as empty mapping keys.
    pub fn parse(path: &str) -> Result<Self> {
        if path.is_empty() {
            return Err(StoreError::InvalidPath {
                path: path.to_string(),
                reason: "path is empty".to_string(),
            });
        }

        Ok(Self {
            segments: path.split('.').map(str::to_string).collect(),
        })
    }

    /// Build a path from already-split segments.
    pub fn from_segments<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            segments: segments.into_iter().map(Into::into).collect(),
        }
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn last(&self) -> Option<&str> {
        self.segments.last().map(String::as_str)
    }

    /// The enclosing path, or `None` for the root.
    pub fn parent(&self) -> Option<Path> {
        let (_, parent) = self.segments.split_last()?;
        Some(Self {
            segments: parent.to_vec(),
        })
    }

    pub fn child(&self, segment: impl Into<String>) -> Path {
        let mut segments = self.segments.clone();
        segments.push(segment.into());
        Self { segments }
    }

    /// Proper ancestors, nearest first. The root is always the last item
    /// for a non-root path.
    pub fn ancestors(&self) -> impl Iterator<Item = Path> + '_ {
        (0..self.segments.len()).rev().map(move |len| Self {
            segments: self.segments[..len].to_vec(),
        })
    }

    /// True if `other` lies strictly below this path.
    pub fn is_ancestor_of(&self, other: &Path) -> bool {
        other.segments.len() > self.segments.len() && other.segments.starts_with(&self.segments)
    }

    /// True if the last segment is the virtual `length` segment.
    pub fn is_length(&self) -> bool {
        self.last() == Some(LENGTH)
    }
}

/// Interpret a segment as a sequence index.
///
/// Only plain ASCII digit runs qualify, so `"+1"` and `""` stay keys.
pub(crate) fn as_index(segment: &str) -> Option<usize> {
    if segment.is_empty() || !segment.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    segment.parse().ok()
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.segments.join("."))
    }
}

impl fmt::Debug for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Path({:?})", self.to_string())
    }
}

impl FromStr for Path {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self> {
        Path::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_display() {
        let path = Path::parse("user.profile.name").unwrap();
        assert_eq!(path.segments(), ["user", "profile", "name"]);
        assert_eq!(path.to_string(), "user.profile.name");
        assert_eq!(path.len(), 3);
    }

    #[test]
    fn test_parse_empty_fails() {
        let result = Path::parse("");
        assert!(matches!(result, Err(StoreError::InvalidPath { .. })));
    }

    #[test]
    fn test_empty_segments_are_keys() {
        let path = Path::parse("a..b").unwrap();
        assert_eq!(path.segments(), ["a", "", "b"]);
    }

    #[test]
    fn test_root() {
        let root = Path::root();
        assert!(root.is_root());
        assert_eq!(root.to_string(), "");
        assert!(root.parent().is_none());
        assert!(root.is_ancestor_of(&Path::parse("a").unwrap()));
        assert!(!root.is_ancestor_of(&root));
    }

    #[test]
    fn test_ancestors_nearest_first() {
        let path = Path::parse("a.b.c").unwrap();
        let ancestors: Vec<String> = path.ancestors().map(|p| p.to_string()).collect();
        assert_eq!(ancestors, vec!["a.b", "a", ""]);
    }

    #[test]
    fn test_is_ancestor_of() {
        let a = Path::parse("todos").unwrap();
        let b = Path::parse("todos.0.text").unwrap();
        let c = Path::parse("todosX").unwrap();

        assert!(a.is_ancestor_of(&b));
        assert!(!b.is_ancestor_of(&a));
        assert!(!a.is_ancestor_of(&c));
        assert!(!a.is_ancestor_of(&a));
    }

    #[test]
    fn test_length_and_child() {
        let items = Path::parse("items").unwrap();
        let length = items.child(LENGTH);
        assert!(length.is_length());
        assert_eq!(length.parent(), Some(items));
    }

    #[test]
    fn test_as_index() {
        assert_eq!(as_index("0"), Some(0));
        assert_eq!(as_index("42"), Some(42));
        assert_eq!(as_index("+1"), None);
        assert_eq!(as_index("-1"), None);
        assert_eq!(as_index(""), None);
        assert_eq!(as_index("name"), None);
    }
}
