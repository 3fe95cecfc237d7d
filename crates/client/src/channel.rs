//! Callback slots and subscriber lists for the inbound event channels.
//!
//! Each [`EventChannel`] owns one overwritable [`CallbackSlot`] (last writer
//! wins) plus an ordered list of [`Subscription`]s for consumers that need to
//! listen side by side. Events with nobody listening are dropped.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, Weak};

use serde::de::DeserializeOwned;
use serde_json::Value;
use sightline_shared::{decode_payload, EventName};

/// Listener for an event payload.
pub type Callback = Arc<dyn Fn(Value) + Send + Sync>;

/// A single overwritable callback reference.
///
/// Clones share the same cell, so a clone handed to a consumer observes and
/// overwrites the same slot the connection manager reads from.
#[derive(Clone, Default)]
pub struct CallbackSlot {
    inner: Arc<RwLock<Option<Callback>>>,
}

impl CallbackSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install `callback`, replacing whatever was there.
    pub fn set(&self, callback: impl Fn(Value) + Send + Sync + 'static) {
        self.set_callback(Arc::new(callback));
    }

    pub fn set_callback(&self, callback: Callback) {
        *self.inner.write().unwrap_or_else(PoisonError::into_inner) = Some(callback);
    }

    pub fn clear(&self) {
        *self.inner.write().unwrap_or_else(PoisonError::into_inner) = None;
    }

    pub fn is_set(&self) -> bool {
        self.current().is_some()
    }

    pub fn current(&self) -> Option<Callback> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Call the installed callback, if any. Returns whether one ran.
    ///
    /// The lock is released before the callback runs, so the callback may
    /// overwrite the slot.
    pub fn invoke(&self, payload: Value) -> bool {
        match self.current() {
            Some(callback) => {
                callback(payload);
                true
            }
            None => false,
        }
    }

    /// Whether both handles refer to the same slot.
    pub fn same_slot(&self, other: &CallbackSlot) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for CallbackSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackSlot")
            .field("is_set", &self.is_set())
            .finish()
    }
}

#[derive(Default)]
struct SubscriberList {
    next_id: u64,
    entries: Vec<(u64, Callback)>,
}

fn lock(list: &Mutex<SubscriberList>) -> MutexGuard<'_, SubscriberList> {
    list.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Ordered subscribers; each one is removed when its [`Subscription`] drops.
#[derive(Clone, Default)]
pub struct Subscribers {
    inner: Arc<Mutex<SubscriberList>>,
}

impl Subscribers {
    pub fn subscribe(&self, callback: impl Fn(Value) + Send + Sync + 'static) -> Subscription {
        let mut list = lock(&self.inner);
        let id = list.next_id;
        list.next_id += 1;
        list.entries.push((id, Arc::new(callback)));

        Subscription {
            id,
            list: Arc::downgrade(&self.inner),
        }
    }

    pub fn len(&self) -> usize {
        lock(&self.inner).entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn snapshot(&self) -> Vec<Callback> {
        lock(&self.inner)
            .entries
            .iter()
            .map(|(_, callback)| callback.clone())
            .collect()
    }
}

/// Handle returned by [`Subscribers::subscribe`]. Dropping it unsubscribes.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    id: u64,
    list: Weak<Mutex<SubscriberList>>,
}

impl Subscription {
    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(list) = self.list.upgrade() {
            lock(&list).entries.retain(|(id, _)| *id != self.id);
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

/// One named inbound channel ("metrics" or "predictions").
#[derive(Clone)]
pub struct EventChannel {
    event: EventName,
    slot: CallbackSlot,
    subscribers: Subscribers,
}

impl EventChannel {
    pub fn new(event: EventName) -> Self {
        Self {
            event,
            slot: CallbackSlot::new(),
            subscribers: Subscribers::default(),
        }
    }

    pub fn event(&self) -> EventName {
        self.event
    }

    pub fn slot(&self) -> &CallbackSlot {
        &self.slot
    }

    pub fn subscribers(&self) -> &Subscribers {
        &self.subscribers
    }

    /// Install the slot callback (last writer wins).
    pub fn set(&self, callback: impl Fn(Value) + Send + Sync + 'static) {
        self.slot.set(callback);
    }

    /// Install a slot callback that receives the payload decoded as `T`.
    /// Payloads that do not match the schema are logged and dropped.
    pub fn set_typed<T, F>(&self, callback: F)
    where
        T: DeserializeOwned + 'static,
        F: Fn(T) + Send + Sync + 'static,
    {
        let event = self.event;
        self.slot.set(move |payload: Value| match decode_payload::<T>(&payload) {
            Ok(typed) => callback(typed),
            Err(e) => {
                tracing::warn!(%event, error = %e, "Dropping payload that does not match schema");
            }
        });
    }

    pub fn clear(&self) {
        self.slot.clear();
    }

    pub fn subscribe(&self, callback: impl Fn(Value) + Send + Sync + 'static) -> Subscription {
        self.subscribers.subscribe(callback)
    }

    /// Deliver `payload` to the slot, then to every subscriber in order.
    /// Returns how many callbacks ran.
    pub fn dispatch(&self, payload: Value) -> usize {
        let mut listeners = Vec::new();
        if let Some(callback) = self.slot.current() {
            listeners.push(callback);
        }
        listeners.extend(self.subscribers.snapshot());

        let count = listeners.len();
        if count == 0 {
            tracing::trace!(event = %self.event, "No listener installed, dropping event");
            return 0;
        }

        let mut payload = Some(payload);
        for (index, callback) in listeners.iter().enumerate() {
            let value = if index + 1 == count {
                payload.take().unwrap_or(Value::Null)
            } else {
                payload.clone().unwrap_or(Value::Null)
            };
            callback(value);
        }
        count
    }

    /// Whether both handles refer to the same underlying channel.
    pub fn same_channel(&self, other: &EventChannel) -> bool {
        self.event == other.event && self.slot.same_slot(&other.slot)
    }
}

impl fmt::Debug for EventChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventChannel")
            .field("event", &self.event)
            .field("slot", &self.slot)
            .field("subscribers", &self.subscribers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn recorder() -> (Arc<Mutex<Vec<(&'static str, Value)>>>, impl Fn(&'static str) -> Callback) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let log_for_make = log.clone();
        let make = move |tag: &'static str| -> Callback {
            let log = log_for_make.clone();
            Arc::new(move |payload| log.lock().unwrap().push((tag, payload)))
        };
        (log, make)
    }

    #[test]
    fn test_unset_slot_drops_event() {
        let channel = EventChannel::new(EventName::Metrics);
        assert_eq!(channel.dispatch(json!({"cpu": 42})), 0);
        assert!(!channel.slot().invoke(json!(null)));
    }

    #[test]
    fn test_last_writer_wins() {
        let (log, make) = recorder();
        let channel = EventChannel::new(EventName::Metrics);

        channel.slot().set_callback(make("p"));
        channel.slot().set_callback(make("q"));
        channel.dispatch(json!({"cpu": 42}));

        assert_eq!(*log.lock().unwrap(), vec![("q", json!({"cpu": 42}))]);
    }

    #[test]
    fn test_clones_share_slot() {
        let channel = EventChannel::new(EventName::Predictions);
        let consumer_copy = channel.clone();
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();

        consumer_copy.set(move |_| {
            calls_clone.fetch_add(1, Ordering::SeqCst);
        });
        assert!(channel.same_channel(&consumer_copy));
        assert_eq!(channel.dispatch(json!([])), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        consumer_copy.clear();
        assert_eq!(channel.dispatch(json!([])), 0);
    }

    #[test]
    fn test_callback_may_overwrite_its_own_slot() {
        let channel = EventChannel::new(EventName::Metrics);
        let slot = channel.slot().clone();
        channel.set(move |_| slot.clear());

        assert_eq!(channel.dispatch(json!(1)), 1);
        assert!(!channel.slot().is_set());
    }

    #[test]
    fn test_subscribers_run_after_slot_in_order() {
        let (log, make) = recorder();
        let channel = EventChannel::new(EventName::Predictions);

        let first = make("first");
        let second = make("second");
        let _a = channel.subscribe(move |v| first(v));
        let b = channel.subscribe(move |v| second(v));
        channel.slot().set_callback(make("slot"));

        assert_eq!(channel.dispatch(json!(7)), 3);
        let tags: Vec<_> = log.lock().unwrap().iter().map(|(t, _)| *t).collect();
        assert_eq!(tags, vec!["slot", "first", "second"]);

        b.unsubscribe();
        assert_eq!(channel.subscribers().len(), 1);
        assert_eq!(channel.dispatch(json!(8)), 2);
    }

    #[test]
    fn test_dropped_subscription_is_removed() {
        let channel = EventChannel::new(EventName::Metrics);
        {
            let _sub = channel.subscribe(|_| {});
            assert_eq!(channel.subscribers().len(), 1);
        }
        assert!(channel.subscribers().is_empty());
    }

    #[test]
    fn test_typed_callback_decodes_and_drops_mismatches() {
        #[derive(Debug, Deserialize)]
        struct Load {
            cpu: u32,
        }

        let channel = EventChannel::new(EventName::Metrics);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = seen.clone();
        channel.set_typed(move |load: Load| seen_clone.lock().unwrap().push(load.cpu));

        channel.dispatch(json!({"cpu": 42}));
        channel.dispatch(json!({"cpu": "busy"}));

        assert_eq!(*seen.lock().unwrap(), vec![42]);
    }
}
