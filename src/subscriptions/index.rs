//! Subscription index: which listeners care about which paths.

use super::types::{Listener, SubscriptionId};
use crate::path::{as_index, lookup, read, Path, LENGTH};
use crate::types::Value;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::ops::Bound;
use std::sync::Arc;

/// Internal registration state.
struct Registration {
    path: String,
    listener: Listener,
    /// Number of outstanding handles for this registration.
    refs: usize,
}

/// Registrations sharing one path.
struct PathEntry {
    path: Path,
    ids: Vec<SubscriptionId>,
}

/// Maps exact paths to listener registrations.
pub struct SubscriptionIndex {
    registrations: BTreeMap<SubscriptionId, Registration>,
    /// Keyed by the canonical path string so descendants form a contiguous
    /// range starting at `"<path>."`.
    by_path: BTreeMap<String, PathEntry>,
    /// Counter for generating subscription IDs.
    next_id: u64,
}

impl SubscriptionIndex {
    pub fn new() -> Self {
        Self {
            registrations: BTreeMap::new(),
            by_path: BTreeMap::new(),
            next_id: 1,
        }
    }

    /// Register `listener` at `path`.
    ///
    /// Registering a listener instance already present at `path` returns the
    /// existing id; it then takes one extra [`unregister`](Self::unregister)
    /// call to remove it.
    pub fn register(&mut self, path: Path, listener: Listener) -> SubscriptionId {
        let key = path.to_string();

        if let Some(entry) = self.by_path.get(&key) {
            for id in &entry.ids {
                if let Some(registration) = self.registrations.get_mut(id) {
                    if same_listener(&registration.listener, &listener) {
                        registration.refs += 1;
                        return *id;
                    }
                }
            }
        }

        let id = SubscriptionId(self.next_id);
        self.next_id += 1;

        self.by_path
            .entry(key.clone())
            .or_insert_with(|| PathEntry {
                path,
                ids: Vec::new(),
            })
            .ids
            .push(id);
        self.registrations.insert(
            id,
            Registration {
                path: key,
                listener,
                refs: 1,
            },
        );

        id
    }

    /// Drop one handle of a registration. Returns false for unknown ids.
    pub fn unregister(&mut self, id: SubscriptionId) -> bool {
        let Some(registration) = self.registrations.get_mut(&id) else {
            return false;
        };

        registration.refs -= 1;
        if registration.refs > 0 {
            return true;
        }

        if let Some(registration) = self.registrations.remove(&id) {
            if let Some(entry) = self.by_path.get_mut(&registration.path) {
                entry.ids.retain(|other| *other != id);
                if entry.ids.is_empty() {
                    self.by_path.remove(&registration.path);
                }
            }
        }
        true
    }

    /// Paths to notify when the value at `changed` goes from its state in
    /// `before` to its state in `after` (both whole trees).
    pub fn affected_paths(&self, changed: &Path, before: &Value, after: &Value) -> BTreeSet<String> {
        let mut paths = BTreeSet::new();

        paths.insert(changed.to_string());
        if length_changed(before, after, changed) {
            paths.insert(changed.child(LENGTH).to_string());
        }

        for ancestor in changed.ancestors() {
            if length_changed(before, after, &ancestor) {
                paths.insert(ancestor.child(LENGTH).to_string());
            }
            paths.insert(ancestor.to_string());
        }

        for (key, entry) in self.descendants(changed) {
            // Virtual lengths only count when the computed length moved.
            if entry.path.is_length() && read(before, &entry.path) == read(after, &entry.path) {
                continue;
            }
            paths.insert(key.clone());
        }

        paths
    }

    /// Paths to notify when the node at `removed` is deleted from `before`,
    /// giving `after`.
    ///
    /// On top of [`affected_paths`](Self::affected_paths), removing a
    /// sequence element shifts every later element down by one, so
    /// registered paths at or after the removed index are notified too.
    pub fn removal_paths(&self, removed: &Path, before: &Value, after: &Value) -> BTreeSet<String> {
        let mut paths = self.affected_paths(removed, before, after);

        let (Some(last), Some(parent)) = (removed.last(), removed.parent()) else {
            return paths;
        };
        let Some(start) = as_index(last) else {
            return paths;
        };
        if !matches!(lookup(before, parent.segments()), Some(Value::Array(_))) {
            return paths;
        }

        let depth = parent.len();
        for (key, entry) in self.descendants(&parent) {
            let shifted = entry.path.segments()[depth..]
                .first()
                .and_then(|segment| as_index(segment))
                .is_some_and(|index| index >= start);
            if shifted {
                paths.insert(key.clone());
            }
        }

        paths
    }

    /// Listeners registered under any of `paths`, in registration order,
    /// each listener instance at most once.
    pub fn subscribers_for(&self, paths: &BTreeSet<String>) -> Vec<Listener> {
        let mut ids: Vec<SubscriptionId> = paths
            .iter()
            .filter_map(|path| self.by_path.get(path))
            .flat_map(|entry| entry.ids.iter().copied())
            .collect();
        ids.sort_unstable();
        ids.dedup();

        let mut seen = HashSet::new();
        ids.into_iter()
            .filter_map(|id| self.registrations.get(&id))
            .filter(|registration| seen.insert(listener_addr(&registration.listener)))
            .map(|registration| Arc::clone(&registration.listener))
            .collect()
    }

    /// Every path that has at least one listener.
    pub fn subscribed_paths(&self) -> impl Iterator<Item = &Path> {
        self.by_path.values().map(|entry| &entry.path)
    }

    /// Number of live registrations.
    pub fn len(&self) -> usize {
        self.registrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registrations.is_empty()
    }

    /// Remove every registration.
    pub fn clear(&mut self) {
        self.registrations.clear();
        self.by_path.clear();
    }

    /// Registered paths strictly below `path`.
    fn descendants<'a>(&'a self, path: &Path) -> Vec<(&'a String, &'a PathEntry)> {
        let prefix = if path.is_root() {
            String::new()
        } else {
            format!("{path}.")
        };

        let mut found = Vec::new();
        let range = (Bound::Included(prefix.as_str()), Bound::Unbounded);
        for (key, entry) in self.by_path.range::<str, _>(range) {
            if !key.starts_with(&prefix) {
                break;
            }
            if path.is_ancestor_of(&entry.path) {
                found.push((key, entry));
            }
        }
        found
    }
}

impl Default for SubscriptionIndex {
    fn default() -> Self {
        Self::new()
    }
}

/// Whether the sequence length at `path` differs between the two trees.
///
/// A path holding no sequence on either side has no length to change.
fn length_changed(before: &Value, after: &Value, path: &Path) -> bool {
    let old = lookup(before, path.segments()).and_then(Value::as_array);
    let new = lookup(after, path.segments()).and_then(Value::as_array);
    if old.is_none() && new.is_none() {
        return false;
    }
    old.map_or(0, <[Value]>::len) != new.map_or(0, <[Value]>::len)
}

fn listener_addr(listener: &Listener) -> *const () {
    Arc::as_ptr(listener) as *const ()
}

fn same_listener(a: &Listener, b: &Listener) -> bool {
    listener_addr(a) == listener_addr(b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subscriptions::{listener, Change};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn path(s: &str) -> Path {
        Path::parse(s).unwrap()
    }

    fn noop() -> Listener {
        listener(|_: &Change| {})
    }

    fn affected(index: &SubscriptionIndex, changed: &str, before: serde_json::Value, after: serde_json::Value) -> Vec<String> {
        index
            .affected_paths(&path(changed), &Value::from(before), &Value::from(after))
            .into_iter()
            .collect()
    }

    #[test]
    fn test_register_unregister() {
        let mut index = SubscriptionIndex::new();

        let id = index.register(path("a"), noop());
        assert_eq!(index.len(), 1);

        assert!(index.unregister(id));
        assert!(index.is_empty());
        assert_eq!(index.subscribed_paths().count(), 0);
        assert!(!index.unregister(id));
    }

    #[test]
    fn test_register_same_listener_is_idempotent() {
        let mut index = SubscriptionIndex::new();
        let shared = noop();

        let first = index.register(path("a"), Arc::clone(&shared));
        let second = index.register(path("a"), Arc::clone(&shared));
        assert_eq!(first, second);
        assert_eq!(index.len(), 1);

        // Same instance at another path is a separate registration.
        let other = index.register(path("b"), Arc::clone(&shared));
        assert_ne!(first, other);

        index.unregister(first);
        assert_eq!(index.len(), 2);
        index.unregister(first);
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn test_ancestors_and_self() {
        let index = SubscriptionIndex::new();
        let paths = affected(&index, "a.b", json!({"a": {"b": 1}}), json!({"a": {"b": 2}}));
        assert_eq!(paths, vec!["", "a", "a.b"]);
    }

    #[test]
    fn test_registered_descendants() {
        let mut index = SubscriptionIndex::new();
        index.register(path("todos.0.text"), noop());
        index.register(path("todosX"), noop());
        index.register(path("other"), noop());

        let paths = affected(
            &index,
            "todos",
            json!({"todos": [{"text": "a"}]}),
            json!({"todos": [{"text": "b"}]}),
        );
        assert_eq!(paths, vec!["", "todos", "todos.0.text"]);
    }

    #[test]
    fn test_length_on_replace() {
        let mut index = SubscriptionIndex::new();
        index.register(path("items.length"), noop());

        let grew = affected(&index, "items", json!({"items": [1, 2]}), json!({"items": [1, 2, 3]}));
        assert!(grew.contains(&"items.length".to_string()));

        let same = affected(&index, "items", json!({"items": [1, 2]}), json!({"items": [3, 4]}));
        assert!(!same.contains(&"items.length".to_string()));
    }

    #[test]
    fn test_length_on_element_write() {
        let index = SubscriptionIndex::new();

        let edit = affected(&index, "items.0", json!({"items": [1, 2]}), json!({"items": [9, 2]}));
        assert_eq!(edit, vec!["", "items", "items.0"]);

        let append = affected(&index, "items.2", json!({"items": [1, 2]}), json!({"items": [1, 2, 3]}));
        assert_eq!(append, vec!["", "items", "items.2", "items.length"]);
    }

    #[test]
    fn test_length_from_missing() {
        let index = SubscriptionIndex::new();
        let paths = affected(&index, "items", json!({}), json!({"items": [1]}));
        assert!(paths.contains(&"items.length".to_string()));
    }

    #[test]
    fn test_nested_length_descendant() {
        let mut index = SubscriptionIndex::new();
        index.register(path("user.tags.length"), noop());

        let retag = affected(
            &index,
            "user",
            json!({"user": {"tags": ["a"]}}),
            json!({"user": {"tags": ["b"]}}),
        );
        assert!(!retag.contains(&"user.tags.length".to_string()));

        let more = affected(
            &index,
            "user",
            json!({"user": {"tags": ["a"]}}),
            json!({"user": {"tags": ["a", "b"]}}),
        );
        assert!(more.contains(&"user.tags.length".to_string()));
    }

    #[test]
    fn test_removal_reaches_shifted_elements() {
        let mut index = SubscriptionIndex::new();
        index.register(path("items.0"), noop());
        index.register(path("items.2"), noop());
        index.register(path("items.3.name"), noop());
        index.register(path("items.length"), noop());
        index.register(path("other.2"), noop());

        let before = Value::from(json!({"items": ["a", "b", "c", {"name": "d"}], "other": [1, 2, 3]}));
        let (after, _) = crate::path::remove(&before, &path("items.1"));
        let paths: Vec<String> = index.removal_paths(&path("items.1"), &before, &after).into_iter().collect();

        assert_eq!(paths, vec!["", "items", "items.1", "items.2", "items.3.name", "items.length"]);
    }

    #[test]
    fn test_removal_of_mapping_key_does_not_shift() {
        let mut index = SubscriptionIndex::new();
        index.register(path("user.2"), noop());

        let before = Value::from(json!({"user": {"1": "a", "2": "b"}}));
        let (after, _) = crate::path::remove(&before, &path("user.1"));
        let paths = index.removal_paths(&path("user.1"), &before, &after);

        assert!(!paths.contains("user.2"));
    }

    #[test]
    fn test_root_change_reaches_everything() {
        let mut index = SubscriptionIndex::new();
        index.register(path("a"), noop());
        index.register(path("b.c"), noop());

        let paths = index.affected_paths(&Path::root(), &Value::object(), &Value::from(json!({"a": 1})));
        assert_eq!(paths.into_iter().collect::<Vec<_>>(), vec!["", "a", "b.c"]);
    }

    #[test]
    fn test_subscribers_deduplicated_in_order() {
        let mut index = SubscriptionIndex::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&calls);
        let shared = listener(move |_: &Change| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let first = noop();

        index.register(path("a"), Arc::clone(&first));
        index.register(path("a"), Arc::clone(&shared));
        index.register(path("a.b"), Arc::clone(&shared));
        index.register(path("c"), noop());

        let affected: BTreeSet<String> = ["a", "a.b"].iter().map(|s| s.to_string()).collect();
        let listeners = index.subscribers_for(&affected);

        assert_eq!(listeners.len(), 2);
        assert!(same_listener(&listeners[0], &first));
        assert!(same_listener(&listeners[1], &shared));

        for l in &listeners {
            l(&Change::default());
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
