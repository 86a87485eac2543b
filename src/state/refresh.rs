//! Consumer side of the invalidation tracker: notice version bumps, debounce
//! them, and run one refresh at a time.

use std::{fmt::Display, future::Future, panic::AssertUnwindSafe, sync::Arc, time::Duration};

use futures::FutureExt;
use tokio::{
    sync::Notify,
    task::JoinHandle,
    time::{Instant, MissedTickBehavior, interval, sleep_until},
};
use tracing::{debug, error, warn};

use crate::state::invalidation::{InvalidationTracker, RefreshCategory, Version};

/// Default minimum gap between two completed refreshes.
pub const DEFAULT_MIN_INTERVAL: Duration = Duration::from_millis(1_000);
/// Default quiet period between detecting a bump and refreshing.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(300);
/// Default period of the version poll.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1_000);

/// Timing knobs of a [`DebouncedRefreshSubscriber`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshTiming {
    /// A new refresh is only armed once this much time passed since the last one completed.
    pub min_interval: Duration,
    /// Delay between arming and running the refresh.
    pub debounce: Duration,
    /// How often the tracker is polled.
    pub poll_interval: Duration,
}

impl Default for RefreshTiming {
    fn default() -> Self {
        Self {
            min_interval: DEFAULT_MIN_INTERVAL,
            debounce: DEFAULT_DEBOUNCE,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

/// Phases of a single subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshPhase {
    /// Waiting for a version newer than the last one refreshed.
    Idle,
    /// A bump was seen; the refresh runs at `fire_at`.
    PendingDebounce {
        /// Deadline of the debounce timer.
        fire_at: Instant,
    },
    /// The refresh callback is running for `observed`.
    Refreshing {
        /// Tracker version read when the refresh started.
        observed: Version,
    },
}

/// Pure state machine behind [`DebouncedRefreshSubscriber`].
///
/// The debounce timer is armed once per trigger and is not pushed back by
/// bumps arriving during the quiet period.
#[derive(Debug, Clone)]
pub struct RefreshMachine {
    timing: RefreshTiming,
    phase: RefreshPhase,
    last_seen: Version,
    last_refresh_at: Option<Instant>,
}

impl RefreshMachine {
    /// Start idle, treating `last_seen` as already refreshed.
    pub fn new(timing: RefreshTiming, last_seen: Version) -> Self {
        Self {
            timing,
            phase: RefreshPhase::Idle,
            last_seen,
            last_refresh_at: None,
        }
    }

    /// Current phase.
    pub fn phase(&self) -> RefreshPhase {
        self.phase
    }

    /// Timing the machine was built with.
    pub fn timing(&self) -> RefreshTiming {
        self.timing
    }

    /// Version covered by the last completed refresh.
    pub fn last_seen(&self) -> Version {
        self.last_seen
    }

    /// Feed the tracker's current version. Returns `true` when this arms the debounce timer.
    pub fn observe(&mut self, current: Version, now: Instant) -> bool {
        if self.phase != RefreshPhase::Idle || current <= self.last_seen {
            return false;
        }

        if let Some(last) = self.last_refresh_at {
            if now.saturating_duration_since(last) <= self.timing.min_interval {
                return false;
            }
        }

        self.phase = RefreshPhase::PendingDebounce {
            fire_at: now + self.timing.debounce,
        };
        true
    }

    /// Deadline of the armed debounce timer, if any.
    pub fn deadline(&self) -> Option<Instant> {
        match self.phase {
            RefreshPhase::PendingDebounce { fire_at } => Some(fire_at),
            _ => None,
        }
    }

    /// Leave the debounce window once it elapsed. `current` is the tracker version
    /// at that moment and becomes `last_seen` when the refresh completes.
    pub fn begin_refresh(&mut self, current: Version, now: Instant) -> bool {
        match self.phase {
            RefreshPhase::PendingDebounce { fire_at } if now >= fire_at => {
                self.phase = RefreshPhase::Refreshing { observed: current };
                true
            }
            _ => false,
        }
    }

    /// Record the outcome of the refresh, whether it succeeded or not.
    pub fn finish_refresh(&mut self, now: Instant) {
        if let RefreshPhase::Refreshing { observed } = self.phase {
            self.last_seen = observed;
            self.last_refresh_at = Some(now);
            self.phase = RefreshPhase::Idle;
        }
    }
}

/// Handle to a running subscriber. Dropping it stops the subscriber.
pub struct DebouncedRefreshSubscriber {
    category: RefreshCategory,
    recheck: Arc<Notify>,
    task: JoinHandle<()>,
}

impl DebouncedRefreshSubscriber {
    /// Spawn a subscriber that calls `refresh` whenever `category` moves past `last_seen`.
    ///
    /// `last_seen` should be the version read before the owner's initial load, so
    /// a bump landing during that load is still picked up.
    pub fn spawn<F, Fut, E>(
        tracker: Arc<InvalidationTracker>,
        category: RefreshCategory,
        timing: RefreshTiming,
        last_seen: Version,
        refresh: F,
    ) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
        E: Display + Send + 'static,
    {
        let recheck = Arc::new(Notify::new());
        let machine = RefreshMachine::new(timing, last_seen);
        let task = tokio::spawn(run(
            machine,
            tracker,
            category.clone(),
            recheck.clone(),
            refresh,
        ));

        Self {
            category,
            recheck,
            task,
        }
    }

    /// Category this subscriber follows.
    pub fn category(&self) -> &RefreshCategory {
        &self.category
    }

    /// Compare versions right away instead of waiting for the next poll, e.g.
    /// after the owner's inputs changed.
    pub fn check_now(&self) {
        self.recheck.notify_one();
    }

    /// Stop the subscriber. An in-flight refresh is abandoned.
    pub fn stop(self) {}
}

impl Drop for DebouncedRefreshSubscriber {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn run<F, Fut, E>(
    mut machine: RefreshMachine,
    tracker: Arc<InvalidationTracker>,
    category: RefreshCategory,
    recheck: Arc<Notify>,
    mut refresh: F,
) where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = Result<(), E>> + Send + 'static,
    E: Display + Send + 'static,
{
    let mut changes = tracker.watch(&category);
    let mut poll = interval(machine.timing().poll_interval);
    poll.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick fires immediately; the owner has just loaded.
    let mut skip_poll = true;

    machine.observe(tracker.version(&category), Instant::now());

    loop {
        let deadline = machine.deadline();

        tokio::select! {
            _ = poll.tick() => {
                if skip_poll {
                    skip_poll = false;
                    continue;
                }
                machine.observe(tracker.version(&category), Instant::now());
            }
            changed = changes.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = *changes.borrow_and_update();
                machine.observe(current, Instant::now());
            }
            _ = recheck.notified() => {
                machine.observe(tracker.version(&category), Instant::now());
            }
            _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                let current = tracker.version(&category);
                if !machine.begin_refresh(current, Instant::now()) {
                    continue;
                }

                debug!(%category, version = %current, "refreshing");
                match AssertUnwindSafe(refresh()).catch_unwind().await {
                    Ok(Ok(())) => {}
                    Ok(Err(err)) => {
                        warn!(%category, version = %current, error = %err, "refresh failed")
                    }
                    Err(_) => error!(%category, version = %current, "refresh panicked"),
                }
                machine.finish_refresh(Instant::now());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use tokio::time::sleep;

    use super::*;

    fn ms(value: u64) -> Duration {
        Duration::from_millis(value)
    }

    #[test]
    fn machine_ignores_versions_already_seen() {
        let now = Instant::now();
        let mut machine = RefreshMachine::new(RefreshTiming::default(), Version::INITIAL);

        assert!(!machine.observe(Version::INITIAL, now));
        assert_eq!(machine.phase(), RefreshPhase::Idle);
    }

    #[test]
    fn machine_arms_once_and_does_not_reset_the_timer() {
        let start = Instant::now();
        let timing = RefreshTiming::default();
        let mut machine = RefreshMachine::new(timing, Version::INITIAL);
        let tracker = InvalidationTracker::new();
        let v1 = tracker.bump(&RefreshCategory::Payments);
        let v2 = tracker.bump(&RefreshCategory::Payments);

        assert!(machine.observe(v1, start));
        assert!(!machine.observe(v2, start + ms(100)));
        assert_eq!(machine.deadline(), Some(start + timing.debounce));

        assert!(!machine.begin_refresh(v2, start + ms(299)));
        assert!(machine.begin_refresh(v2, start + ms(300)));
        assert_eq!(machine.phase(), RefreshPhase::Refreshing { observed: v2 });

        machine.finish_refresh(start + ms(350));
        assert_eq!(machine.phase(), RefreshPhase::Idle);
        assert_eq!(machine.last_seen(), v2);
    }

    #[test]
    fn machine_enforces_min_interval_after_a_refresh() {
        let start = Instant::now();
        let tracker = InvalidationTracker::new();
        let mut machine = RefreshMachine::new(RefreshTiming::default(), Version::INITIAL);

        let v1 = tracker.bump(&RefreshCategory::Players);
        machine.observe(v1, start);
        machine.begin_refresh(v1, start + ms(300));
        machine.finish_refresh(start + ms(400));

        let v2 = tracker.bump(&RefreshCategory::Players);
        assert!(!machine.observe(v2, start + ms(1_400)));
        assert!(machine.observe(v2, start + ms(1_401)));
    }

    #[test]
    fn machine_ignores_bumps_while_refreshing() {
        let start = Instant::now();
        let tracker = InvalidationTracker::new();
        let mut machine = RefreshMachine::new(RefreshTiming::default(), Version::INITIAL);

        let v1 = tracker.bump(&RefreshCategory::Teams);
        machine.observe(v1, start);
        machine.begin_refresh(v1, start + ms(300));

        let v2 = tracker.bump(&RefreshCategory::Teams);
        assert!(!machine.observe(v2, start + ms(310)));
        machine.finish_refresh(start + ms(400));

        // The stale last_seen keeps the bump visible to a later poll.
        assert_eq!(machine.last_seen(), v1);
        assert!(machine.observe(v2, start + ms(2_000)));
    }

    fn counting_subscriber(
        tracker: &Arc<InvalidationTracker>,
        refresh_time: Duration,
    ) -> (DebouncedRefreshSubscriber, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let subscriber = DebouncedRefreshSubscriber::spawn(
            tracker.clone(),
            RefreshCategory::Payments,
            RefreshTiming::default(),
            tracker.version(&RefreshCategory::Payments),
            move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    sleep(refresh_time).await;
                    Ok::<(), std::convert::Infallible>(())
                }
            },
        );
        (subscriber, calls)
    }

    #[tokio::test(start_paused = true)]
    async fn burst_of_bumps_collapses_into_one_refresh() {
        let tracker = Arc::new(InvalidationTracker::new());
        let (_subscriber, calls) = counting_subscriber(&tracker, Duration::ZERO);
        sleep(ms(1)).await;

        for _ in 0..5 {
            tracker.bump(&RefreshCategory::Payments);
            sleep(ms(10)).await;
        }
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        sleep(ms(400)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        sleep(Duration::from_secs(5)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn no_refresh_without_bumps() {
        let tracker = Arc::new(InvalidationTracker::new());
        let (_subscriber, calls) = counting_subscriber(&tracker, Duration::ZERO);

        sleep(Duration::from_secs(5)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn bump_during_refresh_is_deferred_not_lost() {
        let tracker = Arc::new(InvalidationTracker::new());
        let (_subscriber, calls) = counting_subscriber(&tracker, ms(200));
        sleep(ms(1)).await;

        tracker.bump(&RefreshCategory::Payments);
        // Refresh runs from ~300ms to ~500ms.
        sleep(ms(400)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        tracker.bump(&RefreshCategory::Payments);

        sleep(ms(600)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        sleep(Duration::from_secs(3)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn refreshes_never_overlap() {
        let tracker = Arc::new(InvalidationTracker::new());
        let running = Arc::new(AtomicUsize::new(0));
        let overlaps = Arc::new(AtomicUsize::new(0));

        let (running_in, overlaps_in) = (running.clone(), overlaps.clone());
        let _subscriber = DebouncedRefreshSubscriber::spawn(
            tracker.clone(),
            RefreshCategory::Payments,
            RefreshTiming::default(),
            Version::INITIAL,
            move || {
                let running = running_in.clone();
                let overlaps = overlaps_in.clone();
                async move {
                    if running.fetch_add(1, Ordering::SeqCst) > 0 {
                        overlaps.fetch_add(1, Ordering::SeqCst);
                    }
                    sleep(Duration::from_secs(2)).await;
                    running.fetch_sub(1, Ordering::SeqCst);
                    Ok::<(), std::convert::Infallible>(())
                }
            },
        );

        for _ in 0..40 {
            tracker.bump(&RefreshCategory::Payments);
            sleep(ms(250)).await;
        }

        assert_eq!(overlaps.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_refresh_still_returns_to_idle() {
        let tracker = Arc::new(InvalidationTracker::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let _subscriber = DebouncedRefreshSubscriber::spawn(
            tracker.clone(),
            RefreshCategory::Players,
            RefreshTiming::default(),
            Version::INITIAL,
            move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>("store unavailable")
                }
            },
        );
        sleep(ms(1)).await;

        tracker.bump(&RefreshCategory::Players);
        sleep(ms(400)).await;
        tracker.bump(&RefreshCategory::Players);
        sleep(Duration::from_secs(3)).await;

        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn panicking_refresh_keeps_the_subscriber_alive() {
        let tracker = Arc::new(InvalidationTracker::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let _subscriber = DebouncedRefreshSubscriber::spawn(
            tracker.clone(),
            RefreshCategory::Payments,
            RefreshTiming::default(),
            Version::INITIAL,
            move || {
                let counter = counter.clone();
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                        panic!("roll-up exploded");
                    }
                    Ok::<(), std::convert::Infallible>(())
                }
            },
        );
        sleep(ms(1)).await;

        tracker.bump(&RefreshCategory::Payments);
        sleep(ms(400)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        tracker.bump(&RefreshCategory::Payments);
        sleep(Duration::from_secs(5)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_the_handle_stops_refreshing() {
        let tracker = Arc::new(InvalidationTracker::new());
        let (subscriber, calls) = counting_subscriber(&tracker, Duration::ZERO);
        subscriber.stop();

        tracker.bump(&RefreshCategory::Payments);
        sleep(Duration::from_secs(3)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn bumps_before_spawn_are_picked_up_on_mount() {
        let tracker = Arc::new(InvalidationTracker::new());
        let baseline = tracker.version(&RefreshCategory::Payments);
        tracker.bump(&RefreshCategory::Payments);

        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let subscriber = DebouncedRefreshSubscriber::spawn(
            tracker.clone(),
            RefreshCategory::Payments,
            RefreshTiming::default(),
            baseline,
            move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok::<(), std::convert::Infallible>(())
                }
            },
        );
        subscriber.check_now();

        sleep(ms(400)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
