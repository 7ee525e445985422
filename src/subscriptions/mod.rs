//! Path-keyed subscriptions for store changes.
//!
//! Listeners register under an exact path. A mutation at path `P` notifies
//! listeners registered at:
//! - `P` itself
//! - every ancestor of `P`, up to the root (global listeners)
//! - every registered descendant of `P`
//! - `X.length` for `P` or any ancestor `X` whose sequence length changed
//!
//! Each listener instance runs at most once per mutation, in registration
//! order, even when it is registered under several affected paths.
//!
//! # Example
//!
//! ```ignore
//! let store = Store::new(json!({"items": [1, 2]}));
//!
//! let count = store.subscribe("items.length", |change| {
//!     println!("count changed: {:?}", change.paths());
//! })?;
//!
//! store.set_value("items.0", 99)?; // no notification
//! store.set_value("items.2", 3)?;  // notifies
//! drop(count);                     // unsubscribes
//! ```

mod index;
mod types;

pub use index::SubscriptionIndex;
pub use types::{
    listener, Change, ChannelSubscription, ErrorHandler, Listener, ListenerPanic, Subscription,
    SubscriptionId,
};

pub(crate) use types::channel_listener;
