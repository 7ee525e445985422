//! Shared stores keyed by identifier, with reference-counted lifetimes.
//!
//! Consumers that mount and unmount over time (the steps of a wizard, say)
//! attach to a store by id. The first attach creates it from the supplied
//! initial values; later attaches get the same instance and their initial
//! values are ignored. When the last consumer releases an entry with
//! auto-cleanup enabled, the store is torn down and the id becomes free.
//!
//! # Example
//!
//! ```ignore
//! let registry = Arc::new(StoreRegistry::new());
//!
//! let first = registry.acquire("checkout", json!({"step": 1}));
//! let second = registry.acquire("checkout", json!({"step": 99}));
//! assert_eq!(second.get::<i64>("step")?, Some(1));
//!
//! drop(first);
//! drop(second); // store destroyed here
//! ```

mod manager;

pub use manager::{RegistryConfig, StoreLease, StoreRegistry};
