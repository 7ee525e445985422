//! # Field State
//!
//! A path-indexed reactive state container for UI form and state bindings.
//! Values live in one nested tree, are addressed by dot paths, and consumers
//! subscribe to exactly the paths they render.
//!
//! ## Core Concepts
//!
//! - **Values**: A JSON-shaped tree with reference-counted containers; every
//!   write produces a new tree sharing all untouched subtrees
//! - **Paths**: Dot-separated addresses such as `todos.0.text`, with a
//!   virtual `length` segment on sequences
//! - **Subscriptions**: Listeners keyed by exact path, notified when the path,
//!   an ancestor, or a descendant changes
//! - **Registry**: Reference-counted sharing of stores by identifier
//!
//! ## Example
//!
//! ```ignore
//! use fieldstate::Store;
//! use serde_json::json;
//!
//! let store = Store::new(json!({"user": {"name": ""}, "todos": []}));
//!
//! let _name = store.subscribe("user.name", |_| println!("name changed"))?;
//! let _count = store.subscribe("todos.length", |_| println!("count changed"))?;
//!
//! store.set_value("user.name", "Ada")?;
//! store.set_batch([("todos.0", json!({"text": "write docs"})), ("user.name", json!("Grace"))])?;
//! store.reset();
//! ```

pub mod equality;
pub mod error;
pub mod path;
pub mod registry;
pub mod store;
pub mod subscriptions;
pub mod types;

// Re-exports
pub use equality::ChangeDetection;
pub use error::{Result, StoreError};
pub use path::Path;
pub use registry::{RegistryConfig, StoreLease, StoreRegistry};
pub use store::{Store, StoreConfig};
pub use subscriptions::{
    listener, Change, ChannelSubscription, ErrorHandler, Listener, ListenerPanic, Subscription,
    SubscriptionId, SubscriptionIndex,
};
pub use types::{Map, Value};
