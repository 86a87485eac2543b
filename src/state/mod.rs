pub mod clock;
pub mod invalidation;
pub mod notifications;
pub mod refresh;
mod sse;
pub mod status;

use std::sync::Arc;

use time::OffsetDateTime;
use tokio::sync::{RwLock, watch};

use crate::{
    config::AppConfig,
    dao::payment_store::PaymentStore,
    error::ServiceError,
    state::{
        clock::{Clock, SystemClock},
        invalidation::InvalidationTracker,
        notifications::ChangeNotificationBus,
    },
};

pub use self::sse::SseHub;

/// Shared handle passed to every route and service.
pub type SharedState = Arc<AppState>;

/// Central application state: the store slot plus the notification services
/// every writer and display surface shares.
pub struct AppState {
    store: RwLock<Option<Arc<dyn PaymentStore>>>,
    tracker: Arc<InvalidationTracker>,
    notifications: ChangeNotificationBus,
    public_sse: SseHub,
    degraded: watch::Sender<bool>,
    clock: Arc<dyn Clock>,
    config: AppConfig,
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`] so it can be cloned cheaply.
    ///
    /// The application starts in degraded mode until a storage backend is installed.
    pub fn new(config: AppConfig) -> SharedState {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Same as [`AppState::new`] with an explicit time source.
    pub fn with_clock(config: AppConfig, clock: Arc<dyn Clock>) -> SharedState {
        let (degraded_tx, _rx) = watch::channel(true);
        let tracker = Arc::new(InvalidationTracker::new());
        Arc::new(Self {
            store: RwLock::new(None),
            notifications: ChangeNotificationBus::new(tracker.clone()),
            tracker,
            public_sse: SseHub::new(config.sse_capacity()),
            degraded: degraded_tx,
            clock,
            config,
        })
    }

    /// Obtain a handle to the current store, if one is installed.
    pub async fn store(&self) -> Option<Arc<dyn PaymentStore>> {
        let guard = self.store.read().await;
        guard.as_ref().cloned()
    }

    /// Current store, or [`ServiceError::Degraded`] while none is installed.
    pub async fn require_store(&self) -> Result<Arc<dyn PaymentStore>, ServiceError> {
        self.store().await.ok_or(ServiceError::Degraded)
    }

    /// Install a new store implementation and leave degraded mode.
    pub async fn install_store(&self, store: Arc<dyn PaymentStore>) {
        {
            let mut guard = self.store.write().await;
            *guard = Some(store);
        }
        self.update_degraded(false);
    }

    /// Remove the current store and enter degraded mode.
    pub async fn clear_store(&self) {
        {
            let mut guard = self.store.write().await;
            guard.take();
        }
        self.update_degraded(true);
    }

    /// Current degraded flag.
    pub async fn is_degraded(&self) -> bool {
        let guard = self.store.read().await;
        guard.is_none()
    }

    /// Subscribe to degraded mode updates.
    pub fn degraded_watcher(&self) -> watch::Receiver<bool> {
        self.degraded.subscribe()
    }

    /// Publish/subscribe hub for change events.
    pub fn notifications(&self) -> &ChangeNotificationBus {
        &self.notifications
    }

    /// Version counters bumped by the notification bus.
    pub fn invalidation(&self) -> &Arc<InvalidationTracker> {
        &self.tracker
    }

    /// Broadcast hub used for the public SSE stream.
    pub fn public_sse(&self) -> &SseHub {
        &self.public_sse
    }

    /// Current wall-clock time.
    pub fn now(&self) -> OffsetDateTime {
        self.clock.now()
    }

    /// Runtime configuration.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Broadcast the degraded flag when the value changes.
    fn update_degraded(&self, value: bool) {
        self.degraded.send_if_modified(|current| {
            if *current == value {
                false
            } else {
                *current = value;
                true
            }
        });
    }
}
