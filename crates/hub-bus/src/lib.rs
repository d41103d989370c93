#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! **hub-bus** – Typed in-process subscriber bus for the hub store event
//! handler.
//!
//! Five channels, one per [`HubEventKind`]. Listeners are held by `Weak`
//! reference: registering a listener is a relationship, not ownership. Once
//! every `Arc` the caller holds to its callback is dropped, the bus
//! silently stops calling it rather than keeping it alive. This is why the
//! bus is a callback registry rather than a `tokio::broadcast` channel
//! (which the storage-driver crates use for their own, unrelated
//! live-stream conveniences): `broadcast` has no way to express "this
//! subscription doesn't keep the listener alive", and its lagging-receiver
//! model drops events rather than preserving registration-order delivery.

use std::sync::{Arc, RwLock, Weak};

use hub_store_core::event::Event;
use hub_types::HubEventKind;
use tracing::{debug, error};

/// Errors the bus can report.
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    /// `broadcast` was handed an event whose kind the bus has no channel
    /// for. A programmer error: every `HubEventKind` this crate knows about
    /// maps to a channel.
    #[error("invalid param: no channel for event kind")]
    InvalidParam,
}

/// A registered listener: invoked with the committed event.
pub type Listener = dyn Fn(&Event) + Send + Sync;

/// A handle the caller must keep alive for as long as the subscription
/// should remain active. Dropping it lets the bus garbage-collect the
/// listener on its next broadcast.
pub struct Subscription {
    _callback: Arc<Listener>,
}

#[derive(Default)]
struct Channel {
    listeners: RwLock<Vec<Weak<Listener>>>,
}

impl Channel {
    fn register(&self, callback: Arc<Listener>) -> Subscription {
        self.listeners.write().unwrap().push(Arc::downgrade(&callback));
        Subscription { _callback: callback }
    }

    /// Invoke every live listener in registration order, dropping dead
    /// ones. A listener that panics never stops the others, and the panic
    /// never propagates to the caller.
    fn dispatch(&self, event: &Event) {
        let mut guard = self.listeners.write().unwrap();
        guard.retain(|weak| {
            let Some(callback) = weak.upgrade() else {
                return false;
            };
            if let Err(_panic) = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| callback(event))) {
                error!("subscriber listener panicked; continuing with remaining listeners");
            }
            true
        });
    }
}

/// The subscriber bus: five typed channels, one per [`HubEventKind`].
#[derive(Default)]
pub struct SubscriberBus {
    merge_message: Channel,
    prune_message: Channel,
    revoke_message: Channel,
    merge_username_proof: Channel,
    merge_on_chain_event: Channel,
}

impl SubscriberBus {
    /// A fresh bus with no subscribers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `callback` on the channel for `kind`. Keep the returned
    /// [`Subscription`] alive for as long as the listener should run.
    ///
    /// A `kind` with no matching channel yields a [`Subscription`] that is
    /// never wired to any channel, so it simply never fires, consistent
    /// with how a dropped `Weak` listener silently stops delivery rather
    /// than surfacing an error.
    pub fn subscribe(&self, kind: HubEventKind, callback: Arc<Listener>) -> Subscription {
        match self.channel(kind) {
            Some(channel) => channel.register(callback),
            None => Subscription { _callback: callback },
        }
    }

    /// Dispatch `event` to the channel matching its kind.
    ///
    /// `Ok(())` on a known kind (even if no listeners are currently
    /// subscribed); `Err(BusError::InvalidParam)` for a kind this bus build
    /// has no channel for.
    pub fn broadcast(&self, event: &Event) -> Result<(), BusError> {
        let kind = event.kind();
        debug!(?kind, "broadcasting event");
        match self.channel(kind) {
            Some(channel) => {
                channel.dispatch(event);
                Ok(())
            }
            None => Err(BusError::InvalidParam),
        }
    }

    fn channel(&self, kind: HubEventKind) -> Option<&Channel> {
        match kind {
            HubEventKind::MergeMessage => Some(&self.merge_message),
            HubEventKind::PruneMessage => Some(&self.prune_message),
            HubEventKind::RevokeMessage => Some(&self.revoke_message),
            HubEventKind::MergeUsernameProof => Some(&self.merge_username_proof),
            HubEventKind::MergeOnChainEvent => Some(&self.merge_on_chain_event),
            #[allow(unreachable_patterns)]
            _ => None,
        }
    }
}

/// Implements [`hub_store_core::coordinator::EventSink`] so the commit
/// coordinator's fan-out consumer can drive the bus without depending on
/// this crate.
impl hub_store_core::coordinator::EventSink for SubscriberBus {
    fn broadcast(&self, event: &Event) {
        if SubscriberBus::broadcast(self, event).is_err() {
            error!("event kind had no matching subscriber-bus channel");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hub_store_core::event::EventArgs;
    use hub_types::{Account, StoreKind};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn sample_event() -> Event {
        Event {
            id: 1,
            args: EventArgs::MergeMessage {
                account: Account(1),
                set: StoreKind::Casts,
                ts_hash: vec![0, 0, 0, 1],
                payload: vec![],
            },
        }
    }

    #[test]
    fn listener_receives_matching_events() {
        let bus = SubscriberBus::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();
        let callback: Arc<Listener> = Arc::new(move |_event| {
            calls_clone.fetch_add(1, Ordering::SeqCst);
        });
        let _subscription = bus.subscribe(HubEventKind::MergeMessage, callback);

        bus.broadcast(&sample_event()).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn dropped_subscription_stops_delivery() {
        let bus = SubscriberBus::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();
        let callback: Arc<Listener> = Arc::new(move |_event| {
            calls_clone.fetch_add(1, Ordering::SeqCst);
        });
        let subscription = bus.subscribe(HubEventKind::MergeMessage, callback);
        drop(subscription);

        bus.broadcast(&sample_event()).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn listeners_are_invoked_in_registration_order() {
        let bus = SubscriberBus::new();
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));

        let order_a = order.clone();
        let a: Arc<Listener> = Arc::new(move |_e| order_a.lock().unwrap().push("a"));
        let order_b = order.clone();
        let b: Arc<Listener> = Arc::new(move |_e| order_b.lock().unwrap().push("b"));

        let _s1 = bus.subscribe(HubEventKind::MergeMessage, a);
        let _s2 = bus.subscribe(HubEventKind::MergeMessage, b);

        bus.broadcast(&sample_event()).unwrap();
        assert_eq!(*order.lock().unwrap(), vec!["a", "b"]);
    }

    #[test]
    fn a_panicking_listener_does_not_block_the_others() {
        let bus = SubscriberBus::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let panicking: Arc<Listener> = Arc::new(|_e| panic!("boom"));
        let calls_clone = calls.clone();
        let healthy: Arc<Listener> = Arc::new(move |_e| {
            calls_clone.fetch_add(1, Ordering::SeqCst);
        });

        let _s1 = bus.subscribe(HubEventKind::MergeMessage, panicking);
        let _s2 = bus.subscribe(HubEventKind::MergeMessage, healthy);

        bus.broadcast(&sample_event()).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn listener_on_a_different_channel_is_not_invoked() {
        let bus = SubscriberBus::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();
        let callback: Arc<Listener> = Arc::new(move |_event| {
            calls_clone.fetch_add(1, Ordering::SeqCst);
        });
        let _subscription = bus.subscribe(HubEventKind::PruneMessage, callback);

        bus.broadcast(&sample_event()).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
