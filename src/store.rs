//! Main Store struct tying paths, change detection and subscriptions together.

use crate::equality::ChangeDetection;
use crate::error::{Result, StoreError};
use crate::path::{self, Path};
use crate::subscriptions::{
    channel_listener, listener, Change, ChannelSubscription, ErrorHandler, Listener,
    ListenerPanic, Subscription, SubscriptionId, SubscriptionIndex,
};
use crate::types::Value;
use parking_lot::{Mutex, RwLock};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::any::Any;
use std::collections::BTreeSet;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Store configuration.
#[derive(Clone, Default)]
pub struct StoreConfig {
    /// How writes are compared against the current value.
    pub change_detection: ChangeDetection,

    /// Receives listener panics. When unset they are logged.
    pub error_handler: Option<ErrorHandler>,
}

impl fmt::Debug for StoreConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreConfig")
            .field("change_detection", &self.change_detection)
            .field("error_handler", &self.error_handler.is_some())
            .finish()
    }
}

/// One step of a mutation.
enum Update {
    Set(Path, Value),
    Remove(Path),
}

/// Committed trees.
struct StoreState {
    current: Value,
    initial: Value,
}

/// Listeners collected for one notification pass.
struct Pending {
    change: Change,
    listeners: Vec<Listener>,
}

struct StoreInner {
    config: StoreConfig,
    state: RwLock<StoreState>,
    subscriptions: Arc<Mutex<SubscriptionIndex>>,
    torn_down: AtomicBool,
}

/// A path-indexed reactive state container.
///
/// Provides a unified interface for:
/// - Reading and writing values by dot path
/// - Batched writes with a single notification pass
/// - Resetting to the initial snapshot
/// - Subscribing to exactly the paths a consumer renders
///
/// `Store` is a handle; clones share the same state. No lock is held while
/// listeners run, so a listener may read, write or unsubscribe.
#[derive(Clone)]
pub struct Store {
    inner: Arc<StoreInner>,
}

impl Store {
    /// Create a store whose initial snapshot is `initial`.
    pub fn new(initial: impl Into<Value>) -> Self {
        Self::with_config(initial, StoreConfig::default())
    }

    pub fn with_config(initial: impl Into<Value>, config: StoreConfig) -> Self {
        let initial = initial.into();
        Self {
            inner: Arc::new(StoreInner {
                config,
                state: RwLock::new(StoreState {
                    current: initial.clone(),
                    initial,
                }),
                subscriptions: Arc::new(Mutex::new(SubscriptionIndex::new())),
                torn_down: AtomicBool::new(false),
            }),
        }
    }

    /// True if both handles refer to the same store.
    pub fn same(a: &Store, b: &Store) -> bool {
        Arc::ptr_eq(&a.inner, &b.inner)
    }

    pub fn config(&self) -> &StoreConfig {
        &self.inner.config
    }

    // --- Reads ---

    /// Value at `path`, or `None` when nothing is stored there.
    pub fn get_value(&self, path: &str) -> Result<Option<Value>> {
        let path = Path::parse(path)?;
        Ok(path::read(&self.inner.state.read().current, &path))
    }

    /// Typed read of the value at `path`.
    pub fn get<T: DeserializeOwned>(&self, path: &str) -> Result<Option<T>> {
        self.get_value(path)?
            .map(|value| value.deserialize_into())
            .transpose()
    }

    /// Snapshot of the whole tree. Later writes never change it.
    pub fn get_values(&self) -> Value {
        self.inner.state.read().current.clone()
    }

    pub fn initial_values(&self) -> Value {
        self.inner.state.read().initial.clone()
    }

    pub fn has_field(&self, path: &str) -> Result<bool> {
        let path = Path::parse(path)?;
        Ok(path::exists(&self.inner.state.read().current, &path))
    }

    /// True if the tree differs structurally from the initial snapshot.
    pub fn is_modified(&self) -> bool {
        let state = self.inner.state.read();
        !state.current.ptr_eq(&state.initial) && state.current != state.initial
    }

    // --- Writes ---

    /// Store `value` at `path`.
    ///
    /// Returns false when change detection found nothing to do; the tree and
    /// listeners are then left untouched.
    pub fn set_value(&self, path: &str, value: impl Into<Value>) -> Result<bool> {
        let path = Path::parse(path)?;
        self.apply(vec![Update::Set(path, value.into())])
    }

    /// Typed write of `value` at `path`.
    pub fn set<T: Serialize + ?Sized>(&self, path: &str, value: &T) -> Result<bool> {
        self.set_value(path, Value::from_serialize(value)?)
    }

    /// Write every top-level key of `partial` in one pass.
    pub fn set_values(&self, partial: impl Into<Value>) -> Result<bool> {
        let Value::Object(map) = partial.into() else {
            return Err(StoreError::type_mismatch(
                Path::root(),
                "set_values expects a mapping",
            ));
        };

        let updates = map
            .iter()
            .map(|(key, value)| Update::Set(Path::from_segments([key.as_str()]), value.clone()))
            .collect();
        self.apply(updates)
    }

    /// Apply several path writes in order with one notification pass.
    ///
    /// Every path is parsed before anything is written; if any write fails
    /// none of them is committed.
    pub fn set_batch<I, K, V>(&self, updates: I) -> Result<bool>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<Value>,
    {
        let updates = updates
            .into_iter()
            .map(|(path, value)| Ok(Update::Set(Path::parse(path.as_ref())?, value.into())))
            .collect::<Result<Vec<_>>>()?;
        self.apply(updates)
    }

    /// Remove the node at `path`. Returns false if nothing was there.
    pub fn remove_field(&self, path: &str) -> Result<bool> {
        let path = Path::parse(path)?;
        self.apply(vec![Update::Remove(path)])
    }

    /// Restore the initial snapshot.
    ///
    /// Only subscribed paths whose value differs between the two trees are
    /// notified.
    pub fn reset(&self) -> bool {
        self.reset_to(None)
    }

    /// Replace the initial snapshot with `initial`, then reset to it.
    pub fn reset_with(&self, initial: impl Into<Value>) -> bool {
        self.reset_to(Some(initial.into()))
    }

    fn reset_to(&self, replacement: Option<Value>) -> bool {
        let pending = {
            let mut state = self.inner.state.write();
            if let Some(initial) = replacement {
                state.initial = initial;
            }

            if state.current.ptr_eq(&state.initial) || state.current == state.initial {
                return false;
            }

            let index = self.inner.subscriptions.lock();
            let affected: BTreeSet<String> = index
                .subscribed_paths()
                .filter(|p| path::read(&state.current, p) != path::read(&state.initial, p))
                .map(ToString::to_string)
                .collect();

            let initial = state.initial.clone();
            state.current = initial;

            Pending {
                listeners: index.subscribers_for(&affected),
                change: Change::new(affected),
            }
        };

        self.notify(pending);
        true
    }

    fn apply(&self, updates: Vec<Update>) -> Result<bool> {
        let pending = {
            let mut state = self.inner.state.write();
            let index = self.inner.subscriptions.lock();
            let detection = self.inner.config.change_detection;

            let mut tree = state.current.clone();
            let mut affected = BTreeSet::new();
            let mut changed = false;

            for update in updates {
                let next = match update {
                    Update::Set(path, value) => {
                        let old = path::read(&tree, &path);
                        if detection.is_unchanged(old.as_ref(), Some(&value)) {
                            continue;
                        }
                        let next = path::write(&tree, &path, value)?;
                        affected.extend(index.affected_paths(&path, &tree, &next));
                        next
                    }
                    Update::Remove(path) => {
                        let (next, removed) = path::remove(&tree, &path);
                        if removed.is_none() {
                            continue;
                        }
                        affected.extend(index.removal_paths(&path, &tree, &next));
                        next
                    }
                };

                tree = next;
                changed = true;
            }

            if !changed {
                return Ok(false);
            }

            state.current = tree;
            Pending {
                listeners: index.subscribers_for(&affected),
                change: Change::new(affected),
            }
        };

        self.notify(pending);
        Ok(true)
    }

    /// Run listeners. A panicking listener is reported and skipped; a
    /// panicking error handler is logged.
    fn notify(&self, pending: Pending) {
        let Pending { change, listeners } = pending;
        if listeners.is_empty() {
            return;
        }

        tracing::trace!(
            paths = change.paths().len(),
            listeners = listeners.len(),
            "notifying listeners"
        );

        for listener in listeners {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| listener(&change)));
            if let Err(payload) = outcome {
                let failure = ListenerPanic {
                    change: change.clone(),
                    message: panic_message(payload.as_ref()),
                };
                let Some(handler) = &self.inner.config.error_handler else {
                    tracing::error!(
                        panic = %failure.message,
                        paths = ?change.paths(),
                        "listener panicked"
                    );
                    continue;
                };
                if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| handler(&failure))) {
                    tracing::error!(
                        panic = %failure.message,
                        handler_panic = %panic_message(payload.as_ref()),
                        paths = ?change.paths(),
                        "listener panicked and error handler panicked"
                    );
                }
            }
        }
    }

    // --- Subscriptions ---

    /// Call `f` whenever `path` is affected by a mutation.
    pub fn subscribe<F>(&self, path: &str, f: F) -> Result<Subscription>
    where
        F: Fn(&Change) + Send + Sync + 'static,
    {
        self.subscribe_listener(path, listener(f))
    }

    /// Register a shared listener instance. Registering the same instance
    /// at the same path again does not add a second registration.
    pub fn subscribe_listener(&self, path: &str, listener: Listener) -> Result<Subscription> {
        let path = Path::parse(path)?;
        Ok(self.register(path, listener))
    }

    /// Call `f` on every mutation anywhere in the tree.
    pub fn subscribe_global<F>(&self, f: F) -> Subscription
    where
        F: Fn(&Change) + Send + Sync + 'static,
    {
        self.register(Path::root(), listener(f))
    }

    /// Deliver changes at `path` over a bounded channel.
    ///
    /// When `capacity` changes are waiting, further changes are dropped and
    /// counted instead of blocking the writer.
    pub fn subscribe_channel(&self, path: &str, capacity: usize) -> Result<ChannelSubscription> {
        let path = Path::parse(path)?;
        let (listener, receiver, dropped) = channel_listener(capacity.max(1));
        Ok(ChannelSubscription {
            subscription: self.register(path, listener),
            receiver,
            dropped,
        })
    }

    /// Remove a detached subscription.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.inner.subscriptions.lock().unregister(id)
    }

    /// Number of live registrations.
    pub fn subscriber_count(&self) -> usize {
        self.inner.subscriptions.lock().len()
    }

    fn register(&self, path: Path, listener: Listener) -> Subscription {
        let id = self.inner.subscriptions.lock().register(path, listener);
        Subscription::new(id, &self.inner.subscriptions)
    }

    // --- Lifecycle ---

    /// Drop every subscription.
    ///
    /// The tree stays readable and writable; holders can check
    /// [`is_torn_down`](Self::is_torn_down).
    pub fn teardown(&self) {
        let removed = {
            let mut index = self.inner.subscriptions.lock();
            let removed = index.len();
            index.clear();
            removed
        };
        self.inner.torn_down.store(true, Ordering::SeqCst);
        tracing::debug!(subscriptions = removed, "store torn down");
    }

    pub fn is_torn_down(&self) -> bool {
        self.inner.torn_down.load(Ordering::SeqCst)
    }
}

impl Default for Store {
    fn default() -> Self {
        Self::new(Value::object())
    }
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("values", &self.inner.state.read().current)
            .field("subscriptions", &self.subscriber_count())
            .field("torn_down", &self.is_torn_down())
            .finish()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;

    fn counter() -> (Arc<AtomicUsize>, impl Fn(&Change) + Send + Sync + 'static) {
        let count = Arc::new(AtomicUsize::new(0));
        let inner = Arc::clone(&count);
        (count, move |_: &Change| {
            inner.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn test_get_and_set() {
        let store = Store::new(json!({"user": {"name": "ada"}}));

        assert_eq!(store.get_value("user.name").unwrap(), Some(Value::from("ada")));
        assert_eq!(store.get_value("user.age").unwrap(), None);

        assert!(store.set_value("user.age", 36).unwrap());
        assert_eq!(store.get::<u32>("user.age").unwrap(), Some(36));
    }

    #[test]
    fn test_snapshot_unaffected_by_writes() {
        let store = Store::new(json!({"a": {"b": 1}}));
        let before = store.get_values();

        store.set_value("a.b", 2).unwrap();

        assert_eq!(serde_json::Value::from(before), json!({"a": {"b": 1}}));
        assert_eq!(store.get_value("a.b").unwrap(), Some(Value::from(2)));
    }

    #[test]
    fn test_listener_can_reenter() {
        let store = Store::new(json!({"a": 0, "b": 0}));
        let reader = store.clone();

        let _sub = store
            .subscribe("a", move |_| {
                let a = reader.get::<i64>("a").unwrap().unwrap_or(0);
                reader.set_value("b", a * 10).unwrap();
            })
            .unwrap();

        store.set_value("a", 4).unwrap();
        assert_eq!(store.get::<i64>("b").unwrap(), Some(40));
    }

    #[test]
    fn test_strict_detection_notifies_equal_containers() {
        let store = Store::with_config(
            json!({"list": [1, 2]}),
            StoreConfig {
                change_detection: ChangeDetection::Strict,
                ..Default::default()
            },
        );
        let (count, f) = counter();
        let _sub = store.subscribe("list", f).unwrap();

        // Same handle: identical, skipped.
        let current = store.get_value("list").unwrap().unwrap();
        assert!(!store.set_value("list", current).unwrap());

        // Equal contents, new allocation: a change under strict detection.
        assert!(store.set_value("list", json!([1, 2])).unwrap());
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_disabled_detection_always_notifies() {
        let store = Store::with_config(
            json!({"a": 1}),
            StoreConfig {
                change_detection: ChangeDetection::Disabled,
                ..Default::default()
            },
        );
        let (count, f) = counter();
        let _sub = store.subscribe("a", f).unwrap();

        assert!(store.set_value("a", 1).unwrap());
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_set_values_requires_mapping() {
        let store = Store::default();
        let result = store.set_values(json!([1, 2]));
        assert!(matches!(result, Err(StoreError::TypeMismatch { .. })));
    }

    #[test]
    fn test_reset_with_replaces_snapshot() {
        let store = Store::new(json!({"step": 1}));
        store.set_value("step", 2).unwrap();

        assert!(store.reset_with(json!({"step": 5})));
        assert_eq!(store.get::<i64>("step").unwrap(), Some(5));
        assert!(!store.is_modified());
    }

    #[test]
    fn test_teardown_drops_subscriptions() {
        let store = Store::default();
        let (count, f) = counter();
        let _sub = store.subscribe("a", f).unwrap();

        store.teardown();
        assert!(store.is_torn_down());
        assert_eq!(store.subscriber_count(), 0);

        store.set_value("a", 1).unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }
}
