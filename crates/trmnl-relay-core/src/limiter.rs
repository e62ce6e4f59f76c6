// ── Per-device sliding-window rate limiter ──
//
// Each device owns an ordered deque of admitted timestamps inside its own
// mutex; the DashMap only hands out the `Arc`, so devices never contend
// with each other. Timestamps use `tokio::time::Instant` so a paused test
// clock drives the window.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use dashmap::DashMap;
use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, trace};

use crate::model::{DeviceId, RateLimitOptions};

/// Outcome of a limiter check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Admit,
    Deny { retry_after: Duration },
}

impl Decision {
    pub fn is_admit(self) -> bool {
        matches!(self, Self::Admit)
    }
}

/// Point-in-time view of one device's window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LimiterStatus {
    pub enabled: bool,
    pub quota: i64,
    #[serde(serialize_with = "as_secs")]
    pub window: Duration,
    /// Admitted requests still inside the window.
    pub used: usize,
    pub remaining: usize,
    /// Time until the oldest in-window request expires.
    #[serde(serialize_with = "as_secs")]
    pub reset_in: Duration,
    /// How long the next request would have to wait; zero if admissible.
    #[serde(serialize_with = "as_secs")]
    pub wait: Duration,
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn as_secs<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(d.as_secs())
}

// ── Window ──────────────────────────────────────────────────────────

#[derive(Debug)]
struct DeviceWindow {
    options: RateLimitOptions,
    admitted: VecDeque<Instant>,
    /// Requests recorded by this limiter; restored entries don't count.
    recorded: u64,
}

impl DeviceWindow {
    fn new(options: RateLimitOptions) -> Self {
        Self {
            options,
            admitted: VecDeque::new(),
            recorded: 0,
        }
    }

    fn purge(&mut self, now: Instant) {
        let window = self.options.window;
        while let Some(&oldest) = self.admitted.front() {
            if now.saturating_duration_since(oldest) < window {
                break;
            }
            self.admitted.pop_front();
        }
    }

    fn quota(&self) -> usize {
        usize::try_from(self.options.quota).unwrap_or(0)
    }

    /// Decide on a purged window.
    fn decide(&self, now: Instant) -> Decision {
        if !self.options.enabled {
            return Decision::Admit;
        }
        let quota = self.quota();
        if quota == 0 {
            return Decision::Deny {
                retry_after: self.options.window,
            };
        }
        let used = self.admitted.len();
        if used < quota {
            return Decision::Admit;
        }
        // The slot frees up when the entry `used - quota` leaves the window.
        let retry_after = self.admitted.get(used - quota).map_or(self.options.window, |&t| {
            self.options
                .window
                .saturating_sub(now.saturating_duration_since(t))
        });
        Decision::Deny { retry_after }
    }

    fn insert(&mut self, at: Instant) {
        let idx = self.admitted.partition_point(|&t| t <= at);
        self.admitted.insert(idx, at);
    }

    fn record(&mut self, at: Instant) {
        self.insert(at);
        self.recorded += 1;
    }

    fn status(&self, now: Instant) -> LimiterStatus {
        let used = self.admitted.len();
        let reset_in = self.admitted.front().map_or(Duration::ZERO, |&t| {
            self.options
                .window
                .saturating_sub(now.saturating_duration_since(t))
        });
        let wait = match self.decide(now) {
            Decision::Admit => Duration::ZERO,
            Decision::Deny { retry_after } => retry_after,
        };
        LimiterStatus {
            enabled: self.options.enabled,
            quota: self.options.quota,
            window: self.options.window,
            used,
            remaining: self.quota().saturating_sub(used),
            reset_in,
            wait,
        }
    }
}

// ── RateLimiter ─────────────────────────────────────────────────────

/// Sliding-window limiter keyed by device id.
///
/// Unknown devices start with an empty window and the limiter's default
/// options, so their first request is admitted.
#[derive(Debug, Default)]
pub struct RateLimiter {
    windows: DashMap<DeviceId, Arc<Mutex<DeviceWindow>>>,
    defaults: RateLimitOptions,
}

impl RateLimiter {
    pub fn new(defaults: RateLimitOptions) -> Self {
        Self {
            windows: DashMap::new(),
            defaults,
        }
    }

    pub fn defaults(&self) -> RateLimitOptions {
        self.defaults
    }

    fn window(&self, device_id: &DeviceId) -> Arc<Mutex<DeviceWindow>> {
        if let Some(w) = self.windows.get(device_id) {
            return Arc::clone(w.value());
        }
        let entry = self
            .windows
            .entry(device_id.clone())
            .or_insert_with(|| Arc::new(Mutex::new(DeviceWindow::new(self.defaults))));
        Arc::clone(entry.value())
    }

    fn lock(window: &Mutex<DeviceWindow>) -> MutexGuard<'_, DeviceWindow> {
        window.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replace a device's options. Existing timestamps are kept, so a
    /// lowered quota applies to requests already in the window.
    pub fn configure(&self, device_id: &DeviceId, options: RateLimitOptions) {
        let window = self.window(device_id);
        Self::lock(&window).options = options;
    }

    pub fn forget(&self, device_id: &DeviceId) {
        self.windows.remove(device_id);
    }

    /// Would a request be admitted right now? Does not record anything.
    pub fn check(&self, device_id: &DeviceId) -> Decision {
        let now = Instant::now();
        let window = self.window(device_id);
        let mut w = Self::lock(&window);
        w.purge(now);
        w.decide(now)
    }

    /// Record an admitted request at `at`.
    pub fn record(&self, device_id: &DeviceId, at: Instant) {
        let window = self.window(device_id);
        Self::lock(&window).record(at);
    }

    /// Check and record under one lock; two concurrent callers can never
    /// both take the last slot.
    pub fn acquire(&self, device_id: &DeviceId) -> Decision {
        let now = Instant::now();
        let window = self.window(device_id);
        let mut w = Self::lock(&window);
        w.purge(now);

        let decision = w.decide(now);
        match decision {
            Decision::Admit => {
                w.record(now);
                let status = w.status(now);
                debug!(
                    device = %device_id,
                    used = status.used,
                    remaining = status.remaining,
                    reset_in_secs = status.reset_in.as_secs(),
                    "rate limit slot taken"
                );
            }
            Decision::Deny { retry_after } => {
                trace!(device = %device_id, ?retry_after, "rate limit reached");
            }
        }
        decision
    }

    /// Ages of the admitted requests still inside the window, oldest first.
    pub fn history(&self, device_id: &DeviceId) -> Vec<Duration> {
        let now = Instant::now();
        let window = self.window(device_id);
        let mut w = Self::lock(&window);
        w.purge(now);
        w.admitted
            .iter()
            .map(|&t| now.saturating_duration_since(t))
            .collect()
    }

    /// Seed a window with requests admitted `ages` ago, e.g. by an earlier
    /// process. Ages outside the window are dropped on the next check.
    pub fn restore(&self, device_id: &DeviceId, ages: &[Duration]) {
        let now = Instant::now();
        let window = self.window(device_id);
        let mut w = Self::lock(&window);
        for at in ages.iter().filter_map(|&age| now.checked_sub(age)) {
            w.insert(at);
        }
        w.purge(now);
    }

    /// Requests admitted by this limiter over its lifetime, excluding
    /// restored ones. Purging does not lower it.
    pub fn recorded(&self, device_id: &DeviceId) -> u64 {
        let window = self.window(device_id);
        Self::lock(&window).recorded
    }

    pub fn status(&self, device_id: &DeviceId) -> LimiterStatus {
        let now = Instant::now();
        let window = self.window(device_id);
        let mut w = Self::lock(&window);
        w.purge(now);
        w.status(now)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const HOUR: Duration = Duration::from_secs(3600);

    fn dev() -> DeviceId {
        DeviceId::new("AA:BB:CC:DD:EE:FF")
    }

    fn limiter(quota: i64) -> RateLimiter {
        RateLimiter::new(RateLimitOptions {
            quota,
            window: HOUR,
            enabled: true,
        })
    }

    #[tokio::test(start_paused = true)]
    async fn twelve_per_hour_then_replenished() {
        let limiter = limiter(12);
        for _ in 0..12 {
            assert_eq!(limiter.acquire(&dev()), Decision::Admit);
        }

        let Decision::Deny { retry_after } = limiter.acquire(&dev()) else {
            panic!("13th request must be denied");
        };
        assert_eq!(retry_after, HOUR);

        tokio::time::advance(Duration::from_secs(3601)).await;
        assert_eq!(limiter.acquire(&dev()), Decision::Admit);
        assert_eq!(limiter.status(&dev()).used, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn retry_after_tracks_oldest_entry() {
        let limiter = limiter(2);
        limiter.acquire(&dev());
        tokio::time::advance(Duration::from_secs(600)).await;
        limiter.acquire(&dev());

        match limiter.check(&dev()) {
            Decision::Deny { retry_after } => assert_eq!(retry_after, HOUR - Duration::from_secs(600)),
            Decision::Admit => panic!("expected denial"),
        }

        // Exactly one window after the first request it drops out.
        tokio::time::advance(HOUR - Duration::from_secs(600)).await;
        assert!(limiter.check(&dev()).is_admit());
    }

    #[tokio::test(start_paused = true)]
    async fn check_does_not_consume() {
        let limiter = limiter(1);
        for _ in 0..5 {
            assert!(limiter.check(&dev()).is_admit());
        }
        assert!(limiter.acquire(&dev()).is_admit());
        assert!(!limiter.check(&dev()).is_admit());
    }

    #[tokio::test(start_paused = true)]
    async fn non_positive_quota_always_denies() {
        for quota in [0, -3] {
            let limiter = limiter(quota);
            assert_eq!(
                limiter.acquire(&dev()),
                Decision::Deny { retry_after: HOUR }
            );
        }
    }

    #[tokio::test(start_paused = true)]
    async fn disabled_admits_but_keeps_counting() {
        let limiter = RateLimiter::new(RateLimitOptions {
            quota: 1,
            window: HOUR,
            enabled: false,
        });
        for _ in 0..3 {
            assert!(limiter.acquire(&dev()).is_admit());
        }
        let status = limiter.status(&dev());
        assert_eq!(status.used, 3);
        assert_eq!(status.remaining, 0);
        assert_eq!(status.wait, Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn configure_applies_immediately() {
        let limiter = limiter(1);
        assert!(limiter.acquire(&dev()).is_admit());
        assert!(!limiter.check(&dev()).is_admit());

        limiter.configure(
            &dev(),
            RateLimitOptions {
                quota: 30,
                window: HOUR,
                enabled: true,
            },
        );
        assert!(limiter.acquire(&dev()).is_admit());
        assert_eq!(limiter.status(&dev()).remaining, 28);
    }

    #[tokio::test(start_paused = true)]
    async fn devices_are_independent() {
        let limiter = limiter(1);
        let other = DeviceId::new("11:22:33:44:55:66");
        assert!(limiter.acquire(&dev()).is_admit());
        assert!(limiter.acquire(&other).is_admit());
        assert!(!limiter.acquire(&dev()).is_admit());

        limiter.forget(&dev());
        assert!(limiter.acquire(&dev()).is_admit());
    }

    #[tokio::test(start_paused = true)]
    async fn record_keeps_order() {
        let limiter = limiter(2);
        let earlier = Instant::now();
        tokio::time::advance(Duration::from_secs(1800)).await;
        limiter.record(&dev(), Instant::now());
        limiter.record(&dev(), earlier);

        // Oldest entry (30 min ago) decides the wait.
        match limiter.check(&dev()) {
            Decision::Deny { retry_after } => assert_eq!(retry_after, Duration::from_secs(1800)),
            Decision::Admit => panic!("expected denial"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn restored_history_counts_against_quota() {
        // Keep `now - age` representable for every age used below.
        tokio::time::advance(2 * HOUR).await;
        let limiter = limiter(3);
        limiter.restore(
            &dev(),
            &[
                Duration::from_secs(600),
                Duration::from_secs(4000),
                Duration::from_secs(60),
            ],
        );

        let history = limiter.history(&dev());
        assert_eq!(history, vec![Duration::from_secs(600), Duration::from_secs(60)]);
        assert!(limiter.acquire(&dev()).is_admit());
        match limiter.acquire(&dev()) {
            Decision::Deny { retry_after } => assert_eq!(retry_after, Duration::from_secs(3000)),
            Decision::Admit => panic!("expected denial"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn recorded_counts_own_admissions_only() {
        tokio::time::advance(2 * HOUR).await;
        let limiter = limiter(3);
        limiter.restore(&dev(), &[Duration::from_secs(60)]);
        assert_eq!(limiter.recorded(&dev()), 0);

        assert!(limiter.acquire(&dev()).is_admit());
        assert!(limiter.acquire(&dev()).is_admit());
        assert!(!limiter.acquire(&dev()).is_admit());
        assert_eq!(limiter.recorded(&dev()), 2);

        // Expiry shrinks the window, not the count.
        tokio::time::advance(HOUR).await;
        assert_eq!(limiter.status(&dev()).used, 0);
        assert_eq!(limiter.recorded(&dev()), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_acquire_never_exceeds_quota() {
        let limiter = Arc::new(limiter(12));
        let handles: Vec<_> = (0..64)
            .map(|_| {
                let limiter = Arc::clone(&limiter);
                tokio::spawn(async move { limiter.acquire(&dev()).is_admit() })
            })
            .collect();

        let mut admitted = 0;
        for h in handles {
            if h.await.unwrap() {
                admitted += 1;
            }
        }
        assert_eq!(admitted, 12);
    }
}
