//! In-process publish/subscribe registry for change events.
//!
//! Handlers run synchronously in registration order. Publishing an event also
//! bumps the invalidation categories it affects, whether or not anything is
//! subscribed, so polling consumers never need to register a handler.

use std::{
    panic::{AssertUnwindSafe, catch_unwind},
    sync::{
        Arc, Weak,
        atomic::{AtomicU64, Ordering},
    },
};

use dashmap::DashMap;
use time::OffsetDateTime;
use tracing::{error, warn};
use uuid::Uuid;

use crate::state::{
    invalidation::{InvalidationTracker, RefreshCategory},
    status::UiStatus,
};

/// Event name published after a player's monthly payment status changed.
pub const PAYMENT_STATUS_CHANGED: &str = "payment_status_changed";

/// Payload of [`PAYMENT_STATUS_CHANGED`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentStatusChanged {
    /// Player whose status changed.
    pub player_id: Uuid,
    /// New binary status.
    pub status: UiStatus,
    /// Payment timestamp when the new status is paid.
    pub last_payment_date: Option<OffsetDateTime>,
}

/// Events carried by the bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeEvent {
    /// See [`PAYMENT_STATUS_CHANGED`].
    PaymentStatusChanged(PaymentStatusChanged),
}

impl ChangeEvent {
    /// Name handlers subscribe to.
    pub fn name(&self) -> &'static str {
        match self {
            ChangeEvent::PaymentStatusChanged(_) => PAYMENT_STATUS_CHANGED,
        }
    }

    /// Invalidation categories bumped whenever this event is published.
    pub fn invalidates(&self) -> &'static [RefreshCategory] {
        const PAYMENT_CATEGORIES: &[RefreshCategory] =
            &[RefreshCategory::Players, RefreshCategory::Payments];

        match self {
            ChangeEvent::PaymentStatusChanged(_) => PAYMENT_CATEGORIES,
        }
    }
}

/// Outcome reported by a handler; errors are logged and never stop the fan-out.
pub type HandlerResult = anyhow::Result<()>;

type Handler = Arc<dyn Fn(&ChangeEvent) -> HandlerResult + Send + Sync>;

/// Identifier of a registered handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

#[derive(Default)]
struct Registry {
    handlers: DashMap<&'static str, Vec<(HandlerId, Handler)>>,
    next_id: AtomicU64,
}

impl Registry {
    fn remove(&self, event: &'static str, id: HandlerId) -> bool {
        let removed = match self.handlers.get_mut(event) {
            Some(mut entry) => {
                let before = entry.len();
                entry.retain(|(existing, _)| *existing != id);
                entry.len() != before
            }
            None => false,
        };
        self.handlers.remove_if(event, |_, handlers| handlers.is_empty());
        removed
    }
}

/// Capability returned by [`ChangeNotificationBus::subscribe`] to remove the handler again.
#[must_use = "dropping a subscription keeps the handler registered"]
pub struct Subscription {
    event: &'static str,
    id: HandlerId,
    registry: Weak<Registry>,
}

impl Subscription {
    /// Identifier of the registered handler.
    pub fn id(&self) -> HandlerId {
        self.id
    }

    /// Remove the handler from the bus.
    pub fn unsubscribe(self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.remove(self.event, self.id);
        }
    }
}

/// Publish/subscribe hub shared by every writer and display surface.
pub struct ChangeNotificationBus {
    registry: Arc<Registry>,
    tracker: Arc<InvalidationTracker>,
}

impl ChangeNotificationBus {
    /// Build a bus that bumps `tracker` on every publication.
    pub fn new(tracker: Arc<InvalidationTracker>) -> Self {
        Self {
            registry: Arc::new(Registry::default()),
            tracker,
        }
    }

    /// Register `handler` for `event`.
    pub fn subscribe<F>(&self, event: &'static str, handler: F) -> Subscription
    where
        F: Fn(&ChangeEvent) -> HandlerResult + Send + Sync + 'static,
    {
        let id = HandlerId(self.registry.next_id.fetch_add(1, Ordering::Relaxed));
        self.registry
            .handlers
            .entry(event)
            .or_default()
            .push((id, Arc::new(handler)));

        Subscription {
            event,
            id,
            registry: Arc::downgrade(&self.registry),
        }
    }

    /// Remove a handler by id. Returns whether something was removed.
    pub fn unsubscribe(&self, event: &'static str, id: HandlerId) -> bool {
        self.registry.remove(event, id)
    }

    /// Number of handlers currently registered for `event`.
    pub fn subscriber_count(&self, event: &str) -> usize {
        self.registry
            .handlers
            .get(event)
            .map(|entry| entry.len())
            .unwrap_or(0)
    }

    /// Invoke every handler registered for the event, then bump its invalidation categories.
    pub fn publish(&self, event: &ChangeEvent) {
        let name = event.name();
        // Snapshot so handlers may (un)subscribe while being invoked.
        let handlers: Vec<(HandlerId, Handler)> = self
            .registry
            .handlers
            .get(name)
            .map(|entry| entry.value().clone())
            .unwrap_or_default();

        for (id, handler) in handlers {
            match catch_unwind(AssertUnwindSafe(|| (handler.as_ref())(event))) {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    warn!(event = name, handler = id.0, error = %err, "change handler failed")
                }
                Err(_) => error!(event = name, handler = id.0, "change handler panicked"),
            }
        }

        for category in event.invalidates() {
            self.tracker.bump(category);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use anyhow::anyhow;

    use super::*;
    use crate::state::invalidation::Version;

    fn bus() -> (ChangeNotificationBus, Arc<InvalidationTracker>) {
        let tracker = Arc::new(InvalidationTracker::new());
        (ChangeNotificationBus::new(tracker.clone()), tracker)
    }

    fn paid_event(player_id: Uuid) -> ChangeEvent {
        ChangeEvent::PaymentStatusChanged(PaymentStatusChanged {
            player_id,
            status: UiStatus::Paid,
            last_payment_date: Some(OffsetDateTime::UNIX_EPOCH),
        })
    }

    #[test]
    fn publish_without_subscribers_still_bumps_categories() {
        let (bus, tracker) = bus();
        let players_before = tracker.version(&RefreshCategory::Players);
        let payments_before = tracker.version(&RefreshCategory::Payments);

        bus.publish(&paid_event(Uuid::new_v4()));

        assert!(tracker.version(&RefreshCategory::Players) > players_before);
        assert!(tracker.version(&RefreshCategory::Payments) > payments_before);
        assert_eq!(tracker.version(&RefreshCategory::Teams), Version::INITIAL);
    }

    #[test]
    fn handlers_run_in_registration_order() {
        let (bus, _) = bus();
        let calls = Arc::new(Mutex::new(Vec::new()));

        for label in ["first", "second", "third"] {
            let calls = calls.clone();
            let _subscription = bus.subscribe(PAYMENT_STATUS_CHANGED, move |_| {
                calls.lock().unwrap().push(label);
                Ok(())
            });
        }

        bus.publish(&paid_event(Uuid::new_v4()));
        assert_eq!(*calls.lock().unwrap(), ["first", "second", "third"]);
    }

    #[test]
    fn failing_handlers_do_not_stop_the_fan_out() {
        let (bus, tracker) = bus();
        let reached = Arc::new(Mutex::new(0));

        let _failing = bus.subscribe(PAYMENT_STATUS_CHANGED, |_| Err(anyhow!("boom")));
        let _panicking = bus.subscribe(PAYMENT_STATUS_CHANGED, |_| panic!("handler exploded"));
        let counter = reached.clone();
        let _healthy = bus.subscribe(PAYMENT_STATUS_CHANGED, move |_| {
            *counter.lock().unwrap() += 1;
            Ok(())
        });

        bus.publish(&paid_event(Uuid::new_v4()));

        assert_eq!(*reached.lock().unwrap(), 1);
        assert_eq!(tracker.version(&RefreshCategory::Payments).get(), 1);
    }

    #[test]
    fn unsubscribe_removes_handler_and_drops_empty_registry() {
        let (bus, _) = bus();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let sink = seen.clone();
        let subscription = bus.subscribe(PAYMENT_STATUS_CHANGED, move |event| {
            let ChangeEvent::PaymentStatusChanged(payload) = event;
            sink.lock().unwrap().push(payload.player_id);
            Ok(())
        });
        assert_eq!(bus.subscriber_count(PAYMENT_STATUS_CHANGED), 1);

        let first = Uuid::new_v4();
        bus.publish(&paid_event(first));
        subscription.unsubscribe();
        bus.publish(&paid_event(Uuid::new_v4()));

        assert_eq!(*seen.lock().unwrap(), [first]);
        assert_eq!(bus.subscriber_count(PAYMENT_STATUS_CHANGED), 0);
        assert!(!bus.registry.handlers.contains_key(PAYMENT_STATUS_CHANGED));
    }

    #[test]
    fn unsubscribe_by_id_only_removes_that_handler() {
        let (bus, _) = bus();
        let keep = bus.subscribe(PAYMENT_STATUS_CHANGED, |_| Ok(()));
        let drop_me = bus.subscribe(PAYMENT_STATUS_CHANGED, |_| Ok(()));

        assert!(bus.unsubscribe(PAYMENT_STATUS_CHANGED, drop_me.id()));
        assert!(!bus.unsubscribe(PAYMENT_STATUS_CHANGED, drop_me.id()));
        assert_eq!(bus.subscriber_count(PAYMENT_STATUS_CHANGED), 1);
        keep.unsubscribe();
    }

    #[test]
    fn handlers_may_unsubscribe_while_running() {
        let (bus, _) = bus();
        let slot: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));

        let inner = slot.clone();
        let subscription = bus.subscribe(PAYMENT_STATUS_CHANGED, move |_| {
            if let Some(subscription) = inner.lock().unwrap().take() {
                subscription.unsubscribe();
            }
            Ok(())
        });
        *slot.lock().unwrap() = Some(subscription);

        bus.publish(&paid_event(Uuid::new_v4()));
        assert_eq!(bus.subscriber_count(PAYMENT_STATUS_CHANGED), 0);
    }
}
