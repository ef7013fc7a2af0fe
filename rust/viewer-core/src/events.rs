// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Event hubs and the subscriptions that bind sessions to them.
//!
//! Services expose an [`EventHub`] per event kind. Adding a listener yields a
//! [`Subscription`]; the session keeps every subscription it creates in a
//! [`SubscriptionList`] and cancels them all on teardown, so repeated
//! initialize/destroy cycles never accumulate listeners.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

/// Callback invoked for every emitted event.
pub type Listener<T> = Arc<dyn Fn(&T) + Send + Sync>;

type ListenerTable<T> = Mutex<Vec<(u64, Listener<T>)>>;

/// Multicast event source.
pub struct EventHub<T> {
    listeners: Arc<ListenerTable<T>>,
    next_id: Arc<AtomicU64>,
}

impl<T> Clone for EventHub<T> {
    fn clone(&self) -> Self {
        Self {
            listeners: Arc::clone(&self.listeners),
            next_id: Arc::clone(&self.next_id),
        }
    }
}

impl<T> Default for EventHub<T> {
    fn default() -> Self {
        Self {
            listeners: Arc::new(Mutex::new(Vec::new())),
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }
}

impl<T: 'static> std::fmt::Debug for EventHub<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventHub")
            .field("listeners", &self.listener_count())
            .finish()
    }
}

impl<T: 'static> EventHub<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener. It stays registered until the subscription is cancelled.
    pub fn add<F>(&self, label: &'static str, listener: F) -> Subscription
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.listeners.lock().push((id, Arc::new(listener)));

        let table: Weak<ListenerTable<T>> = Arc::downgrade(&self.listeners);
        Subscription {
            label,
            cancel: Some(Box::new(move || {
                if let Some(table) = table.upgrade() {
                    table.lock().retain(|(entry, _)| *entry != id);
                }
            })),
        }
    }

    /// Deliver `event` to every listener registered at the time of the call.
    ///
    /// Listeners run outside the hub lock and may add or cancel subscriptions.
    pub fn emit(&self, event: &T) {
        let snapshot: Vec<Listener<T>> = self
            .listeners
            .lock()
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        for listener in snapshot {
            listener(event);
        }
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.lock().len()
    }
}

/// Registration of one listener on one hub.
pub struct Subscription {
    label: &'static str,
    cancel: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    pub fn label(&self) -> &'static str {
        self.label
    }

    /// Remove the listener from its hub.
    pub fn cancel(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("label", &self.label)
            .finish()
    }
}

/// Subscriptions owned by one session.
#[derive(Debug, Default)]
pub struct SubscriptionList {
    entries: Vec<Subscription>,
}

impl SubscriptionList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, subscription: Subscription) {
        self.entries.push(subscription);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn labels(&self) -> Vec<&'static str> {
        self.entries.iter().map(Subscription::label).collect()
    }

    /// Cancel every subscription, most recent first.
    pub fn cancel_all(&mut self) {
        while let Some(subscription) = self.entries.pop() {
            tracing::trace!(label = subscription.label(), "Cancelling subscription");
            subscription.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn listeners_receive_events_until_cancelled() {
        let hub = EventHub::<u32>::new();
        let seen = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&seen);
        let sub = hub.add("count", move |value| {
            counter.fetch_add(*value as usize, Ordering::SeqCst);
        });
        hub.emit(&2);
        hub.emit(&3);
        assert_eq!(seen.load(Ordering::SeqCst), 5);
        assert_eq!(hub.listener_count(), 1);

        sub.cancel();
        hub.emit(&10);
        assert_eq!(seen.load(Ordering::SeqCst), 5);
        assert_eq!(hub.listener_count(), 0);
    }

    #[test]
    fn debug_shows_listener_count() {
        let hub = EventHub::<String>::new();
        let _sub = hub.add("log", |_| {});
        assert_eq!(format!("{hub:?}"), "EventHub { listeners: 1 }");
    }

    #[test]
    fn cancelling_after_hub_dropped_is_harmless() {
        let hub = EventHub::<()>::new();
        let sub = hub.add("noop", |_| {});
        drop(hub);
        sub.cancel();
    }

    #[test]
    fn cancel_all_empties_the_list() {
        let hub = EventHub::<()>::new();
        let mut list = SubscriptionList::new();
        list.push(hub.add("a", |_| {}));
        list.push(hub.add("b", |_| {}));
        assert_eq!(list.labels(), vec!["a", "b"]);
        assert_eq!(hub.listener_count(), 2);

        list.cancel_all();
        assert!(list.is_empty());
        assert_eq!(hub.listener_count(), 0);
    }

    #[test]
    fn listeners_may_subscribe_during_emit() {
        let hub = EventHub::<()>::new();
        let inner_hub = hub.clone();
        let nested = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&nested);
        let _outer = hub.add("outer", move |_| {
            sink.lock().push(inner_hub.add("inner", |_| {}));
        });
        hub.emit(&());
        assert_eq!(hub.listener_count(), 2);
    }
}
