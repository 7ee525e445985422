//! Subscription types for store change notifications.

use super::index::SubscriptionIndex;
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

/// Unique identifier for a subscription, increasing in registration order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriptionId(pub u64);

/// The outcome of one notification pass.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Change {
    paths: BTreeSet<String>,
}

impl Change {
    pub(crate) fn new(paths: BTreeSet<String>) -> Self {
        Self { paths }
    }

    /// Every path affected by the mutation, root included as `""`.
    pub fn paths(&self) -> &BTreeSet<String> {
        &self.paths
    }

    pub fn contains(&self, path: &str) -> bool {
        self.paths.contains(path)
    }
}

/// Callback invoked on change.
///
/// The same `Arc` registered twice at one path is a single registration.
pub type Listener = Arc<dyn Fn(&Change) + Send + Sync>;

/// Wrap a closure as a [`Listener`].
pub fn listener<F>(f: F) -> Listener
where
    F: Fn(&Change) + Send + Sync + 'static,
{
    Arc::new(f)
}

/// A listener that panicked during a notification pass.
#[derive(Clone, Debug)]
pub struct ListenerPanic {
    /// The paths of the pass in which the panic happened.
    pub change: Change,
    /// The panic payload, if it was a string.
    pub message: String,
}

/// Receives listener panics instead of the default log line.
pub type ErrorHandler = Arc<dyn Fn(&ListenerPanic) + Send + Sync>;

/// Handle to a registered listener.
///
/// Dropping the handle unsubscribes. Use [`Subscription::detach`] to keep
/// the listener registered past the handle's lifetime.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    id: SubscriptionId,
    index: Weak<Mutex<SubscriptionIndex>>,
}

impl Subscription {
    pub(crate) fn new(id: SubscriptionId, index: &Arc<Mutex<SubscriptionIndex>>) -> Self {
        Self {
            id,
            index: Arc::downgrade(index),
        }
    }

    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Remove the listener now.
    pub fn unsubscribe(self) {}

    /// Keep the listener registered and return its id.
    pub fn detach(mut self) -> SubscriptionId {
        self.index = Weak::new();
        self.id
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(index) = self.index.upgrade() {
            index.lock().unregister(self.id);
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

/// A subscription that delivers changes over a bounded channel.
pub struct ChannelSubscription {
    pub(crate) subscription: Subscription,
    pub(crate) receiver: crossbeam_channel::Receiver<Change>,
    pub(crate) dropped: Arc<AtomicU64>,
}

impl ChannelSubscription {
    pub fn id(&self) -> SubscriptionId {
        self.subscription.id()
    }

    /// Receive the next change (blocking).
    pub fn recv(&self) -> Result<Change, crossbeam_channel::RecvError> {
        self.receiver.recv()
    }

    /// Try to receive a change (non-blocking).
    pub fn try_recv(&self) -> Result<Change, crossbeam_channel::TryRecvError> {
        self.receiver.try_recv()
    }

    /// Receive with timeout.
    pub fn recv_timeout(
        &self,
        timeout: std::time::Duration,
    ) -> Result<Change, crossbeam_channel::RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }

    /// Changes discarded because the buffer was full.
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Remove the listener now.
    pub fn unsubscribe(self) {
        self.subscription.unsubscribe();
    }
}

/// Build the listener side of a channel subscription.
pub(crate) fn channel_listener(
    capacity: usize,
) -> (Listener, crossbeam_channel::Receiver<Change>, Arc<AtomicU64>) {
    let (sender, receiver) = crossbeam_channel::bounded(capacity);
    let dropped = Arc::new(AtomicU64::new(0));
    let counter = Arc::clone(&dropped);

    let listener = listener(move |change: &Change| {
        // Full buffer: the consumer is behind, so this change is dropped.
        if let Err(crossbeam_channel::TrySendError::Full(_)) = sender.try_send(change.clone()) {
            counter.fetch_add(1, Ordering::Relaxed);
        }
    });

    (listener, receiver, dropped)
}
