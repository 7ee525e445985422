//! Registry manager for shared stores.

use crate::error::{Result, StoreError};
use crate::store::{Store, StoreConfig};
use crate::types::Value;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::ops::Deref;
use std::sync::Arc;

/// Registry configuration.
#[derive(Clone, Debug)]
pub struct RegistryConfig {
    /// Destroy entries when their reference count reaches zero.
    /// Default: true
    pub auto_cleanup: bool,

    /// Configuration for stores the registry creates.
    pub store: StoreConfig,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            auto_cleanup: true,
            store: StoreConfig::default(),
        }
    }
}

/// Internal entry state.
struct RegistryEntry {
    store: Store,
    ref_count: usize,
    auto_cleanup: bool,
}

/// Owns shared stores by identifier.
///
/// This is an ordinary value: create one per application (or per test) and
/// pass it to whatever needs it.
pub struct StoreRegistry {
    entries: Mutex<HashMap<String, RegistryEntry>>,
    config: RegistryConfig,
}

impl StoreRegistry {
    /// Create a registry with default configuration.
    pub fn new() -> Self {
        Self::with_config(RegistryConfig::default())
    }

    pub fn with_config(config: RegistryConfig) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            config,
        }
    }

    /// Attach to the store `id`, creating it from `initial` if absent.
    ///
    /// Each call counts as one consumer and must be paired with
    /// [`release`](Self::release).
    pub fn get_or_create_store(&self, id: &str, initial: impl Into<Value>) -> Store {
        self.get_or_create_store_with(id, initial, self.config.auto_cleanup)
    }

    /// Like [`get_or_create_store`](Self::get_or_create_store) with an
    /// explicit auto-cleanup flag for a newly created entry.
    pub fn get_or_create_store_with(
        &self,
        id: &str,
        initial: impl Into<Value>,
        auto_cleanup: bool,
    ) -> Store {
        let mut entries = self.entries.lock();

        if let Some(entry) = entries.get_mut(id) {
            // The entry already holds its initial values; later ones are ignored.
            entry.ref_count += 1;
            tracing::debug!(id, ref_count = entry.ref_count, "reusing store, initial values ignored");
            return entry.store.clone();
        }

        let store = Store::with_config(initial, self.config.store.clone());
        entries.insert(
            id.to_string(),
            RegistryEntry {
                store: store.clone(),
                ref_count: 1,
                auto_cleanup,
            },
        );
        tracing::debug!(id, auto_cleanup, "created store");

        store
    }

    /// Adopt an existing store under `id` with one consumer attached.
    pub fn register_store(&self, id: &str, store: Store, auto_cleanup: bool) -> Result<()> {
        let mut entries = self.entries.lock();
        if entries.contains_key(id) {
            return Err(StoreError::StoreExists(id.to_string()));
        }

        entries.insert(
            id.to_string(),
            RegistryEntry {
                store,
                ref_count: 1,
                auto_cleanup,
            },
        );
        tracing::debug!(id, auto_cleanup, "registered store");
        Ok(())
    }

    /// Look up a store without attaching to it.
    pub fn get_store(&self, id: &str) -> Option<Store> {
        self.entries.lock().get(id).map(|entry| entry.store.clone())
    }

    /// Detach one consumer.
    ///
    /// Returns true if this release destroyed the store.
    pub fn release(&self, id: &str) -> bool {
        self.release_entry(id, None)
    }

    /// Detach one consumer of `store`, if it is still the store registered
    /// under `id`.
    ///
    /// A holder of a store that was unregistered and replaced cannot
    /// release the replacement.
    pub fn release_store(&self, id: &str, store: &Store) -> bool {
        self.release_entry(id, Some(store))
    }

    fn release_entry(&self, id: &str, expected: Option<&Store>) -> bool {
        let destroyed = {
            let mut entries = self.entries.lock();
            let Some(entry) = entries.get_mut(id) else {
                tracing::warn!(id, "release of unknown store");
                return false;
            };

            if let Some(store) = expected {
                if !Store::same(&entry.store, store) {
                    tracing::debug!(id, "release of replaced store ignored");
                    return false;
                }
            }

            entry.ref_count = entry.ref_count.saturating_sub(1);
            tracing::debug!(id, ref_count = entry.ref_count, "released store");

            if entry.ref_count == 0 && entry.auto_cleanup {
                entries.remove(id)
            } else {
                None
            }
        };

        match destroyed {
            Some(entry) => {
                destroy(id, entry);
                true
            }
            None => false,
        }
    }

    /// Destroy `id` regardless of its reference count.
    ///
    /// Remaining holders keep a usable but torn-down store.
    pub fn unregister_store(&self, id: &str) -> bool {
        let removed = self.entries.lock().remove(id);
        match removed {
            Some(entry) => {
                destroy(id, entry);
                true
            }
            None => false,
        }
    }

    /// Destroy every entry.
    pub fn clear_stores(&self) {
        let drained: Vec<(String, RegistryEntry)> = self.entries.lock().drain().collect();
        for (id, entry) in drained {
            destroy(&id, entry);
        }
    }

    /// Current consumer count for `id`.
    pub fn ref_count(&self, id: &str) -> Option<usize> {
        self.entries.lock().get(id).map(|entry| entry.ref_count)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.lock().contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Registered identifiers, sorted.
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.entries.lock().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Attach to `id` and release automatically when the lease drops.
    pub fn acquire(self: &Arc<Self>, id: &str, initial: impl Into<Value>) -> StoreLease {
        let store = self.get_or_create_store(id, initial);
        StoreLease {
            registry: Arc::clone(self),
            id: id.to_string(),
            store,
        }
    }
}

impl Default for StoreRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn destroy(id: &str, entry: RegistryEntry) {
    entry.store.teardown();
    tracing::debug!(id, ref_count = entry.ref_count, "destroyed store");
}

/// A consumer's attachment to a registry store.
///
/// Dereferences to the [`Store`]; dropping it releases the attachment.
pub struct StoreLease {
    registry: Arc<StoreRegistry>,
    id: String,
    store: Store,
}

impl StoreLease {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn store(&self) -> &Store {
        &self.store
    }
}

impl Deref for StoreLease {
    type Target = Store;

    fn deref(&self) -> &Store {
        &self.store
    }
}

impl Drop for StoreLease {
    fn drop(&mut self) {
        self.registry.release_store(&self.id, &self.store);
    }
}
