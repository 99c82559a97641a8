//! Dispatch controller
//!
//! Every confirmation goes through [`DispatchController::submit`], which
//! applies the gates in a fixed order under a single lock:
//!
//! 1. in-flight call for the same key: drop
//! 2. live cache entry: replay it without touching cooldowns or budget
//! 3. per-camera or cross-camera cooldown active: drop
//! 4. rate window full: cache a synthetic rate-limited outcome
//! 5. otherwise: mark pending, stamp cooldowns, spend budget and call out
//!
//! The network call runs on its own task so the camera loop never waits.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use metrics::{counter, gauge};
use plate_tracker::{ConfirmedEvent, Panel};
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    Backend, CheckRequest, CooldownTracker, DispatchConfig, DispatchError, DispatchKey, Outcome,
    PendingCallSet, PendingToken, RateLimiter, ResponseCache, TtlClass,
};

/// A confirmation ready to be dispatched
#[derive(Debug, Clone)]
pub struct DispatchRequest {
    pub event: ConfirmedEvent,
    /// Downscaled JPEG snapshot of the confirming frame
    pub image_jpeg: Option<Vec<u8>>,
}

/// What `submit` did with a confirmation
#[derive(Debug)]
pub enum Submission {
    /// A call for the same key is already in flight
    Duplicate,
    /// Served from the response cache
    Cached(Outcome),
    /// Handled too recently by this or another camera
    CoolingDown,
    /// Refused by the rate limiter; the synthetic outcome is now cached
    RateLimited(Outcome),
    /// A backend call was started. The outcome also reaches the
    /// completion callback.
    Dispatched(JoinHandle<Outcome>),
}

impl Submission {
    pub fn label(&self) -> &'static str {
        match self {
            Submission::Duplicate => "duplicate",
            Submission::Cached(_) => "cached",
            Submission::CoolingDown => "cooling_down",
            Submission::RateLimited(_) => "rate_limited",
            Submission::Dispatched(_) => "dispatched",
        }
    }
}

/// Snapshot of shared dispatch state
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DispatchStats {
    pub cache_entries: usize,
    pub pending: usize,
    pub cooldowns: usize,
    /// Dispatches in the current rate window
    pub rate_window: usize,
    /// Rate ceiling, `None` when limiting is disabled
    pub rate_limit: Option<usize>,
}

#[derive(Debug)]
struct DispatchState {
    cache: ResponseCache,
    rate_limiter: RateLimiter,
    /// Cross-camera cooldowns
    cooldowns: CooldownTracker,
    pending: PendingCallSet,
}

struct Shared<B> {
    backend: B,
    config: DispatchConfig,
    state: Mutex<DispatchState>,
}

impl<B> Shared<B> {
    fn lock(&self) -> MutexGuard<'_, DispatchState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Owns the cache, rate limiter, cross-camera cooldowns and pending set
pub struct DispatchController<B> {
    shared: Arc<Shared<B>>,
}

impl<B> Clone for DispatchController<B> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<B: Backend> DispatchController<B> {
    pub fn new(backend: B, config: DispatchConfig) -> Self {
        let state = DispatchState {
            cache: ResponseCache::new(config.cache_ttl, config.connection_error_ttl),
            rate_limiter: RateLimiter::new(config.rate_limit_enabled, config.max_requests_per_minute),
            cooldowns: CooldownTracker::new(config.cooldown),
            pending: PendingCallSet::new(),
        };
        info!(
            "Dispatch controller ready: cooldown={:?} cache_ttl={:?} conn_error_ttl={:?} rate_limit={}",
            config.cooldown,
            config.cache_ttl,
            config.connection_error_ttl,
            if config.rate_limit_enabled {
                format!("{}/min", config.max_requests_per_minute)
            } else {
                "off".to_string()
            }
        );
        Self {
            shared: Arc::new(Shared {
                backend,
                config,
                state: Mutex::new(state),
            }),
        }
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.shared.config
    }

    /// Fresh per-camera cooldown tracker with the configured cooldown
    pub fn local_cooldowns(&self) -> CooldownTracker {
        CooldownTracker::new(self.shared.config.cooldown)
    }

    /// Run a confirmation through the gates.
    ///
    /// Must be called from within a Tokio runtime. `on_complete` runs on
    /// the spawned task once the backend call finishes; it is not called
    /// for the short-circuit results.
    pub fn submit<F>(
        &self,
        request: DispatchRequest,
        local: &mut CooldownTracker,
        now: Instant,
        on_complete: F,
    ) -> Submission
    where
        F: FnOnce(Outcome) + Send + 'static,
    {
        let DispatchRequest { event, image_jpeg } = request;
        let key = DispatchKey::new(event.plate.clone(), event.panel);

        let token = {
            let mut state = self.shared.lock();

            if state.pending.contains(&key) {
                debug!("Dispatch for {} already in flight, dropping", key);
                record_submission("duplicate");
                return Submission::Duplicate;
            }

            state.cache.sweep(now);
            if let Some(outcome) = state.cache.get(&key, now) {
                let cached = outcome.as_cached();
                info!("Cache hit for {}: {}", key, cached.message);
                record_submission("cached");
                return Submission::Cached(cached);
            }

            if !local.is_ready(&key, now) || !state.cooldowns.is_ready(&key, now) {
                debug!("Dispatch for {} still cooling down, dropping", key);
                record_submission("cooling_down");
                return Submission::CoolingDown;
            }

            if !state.rate_limiter.has_capacity(now) {
                let outcome = Outcome::rate_limited();
                warn!(
                    "Rate limit reached ({} in window), refusing {}",
                    state.rate_limiter.in_window(now),
                    key
                );
                state.cache.put(key, outcome.clone(), TtlClass::Normal, now);
                gauge!("plate_cache_entries").set(state.cache.len() as f64);
                record_submission("rate_limited");
                return Submission::RateLimited(outcome);
            }

            let Some(token) = state.pending.try_insert(key.clone()) else {
                record_submission("duplicate");
                return Submission::Duplicate;
            };
            local.stamp(key.clone(), now);
            state.cooldowns.stamp(key.clone(), now);
            state.rate_limiter.record(now);
            token
        };

        let check = CheckRequest {
            request_id: Uuid::new_v4(),
            plate: event.plate,
            panel: event.panel,
            image_jpeg,
        };
        info!(
            "[{}] Dispatching {} (dwell {:.1}s)",
            check.request_id,
            key,
            event.dwell.as_secs_f64()
        );
        record_submission("dispatched");

        let shared = Arc::clone(&self.shared);
        let handle = tokio::spawn(async move {
            let started = Instant::now();
            let outcome = shared.execute(&check).await;
            // Entries age from completion, expressed on the caller's clock
            shared.finish(key, token, &outcome, now + started.elapsed());
            on_complete(outcome.clone());
            outcome
        });

        Submission::Dispatched(handle)
    }

    /// Drop every cached outcome
    pub fn clear_cache(&self) -> usize {
        let mut state = self.shared.lock();
        let cleared = state.cache.clear();
        gauge!("plate_cache_entries").set(0.0);
        info!("Response cache cleared ({} entries)", cleared);
        cleared
    }

    /// Periodic maintenance: expire cache entries and stale cooldowns
    pub fn sweep(&self, now: Instant) -> usize {
        let mut state = self.shared.lock();
        let expired = state.cache.sweep(now);
        state.cooldowns.purge(now);
        gauge!("plate_cache_entries").set(state.cache.len() as f64);
        if expired > 0 {
            debug!("Expired {} cache entries", expired);
        }
        expired
    }

    /// Forget in-flight markers for a panel so a resumed operator is not
    /// blocked by a slow call. A late completion still lands in the cache.
    pub fn release_pending(&self, panel: Panel) -> usize {
        self.shared.lock().pending.clear_panel(panel)
    }

    /// Rescan support: clear cross-camera cooldowns and pending markers
    /// for a panel. Cached outcomes are kept.
    pub fn reset_panel(&self, panel: Panel) -> usize {
        let mut state = self.shared.lock();
        let cooldowns = state.cooldowns.clear_panel(panel);
        let pending = state.pending.clear_panel(panel);
        debug!(
            "Panel {} reset: {} cooldowns, {} pending markers cleared",
            panel, cooldowns, pending
        );
        cooldowns + pending
    }

    pub fn stats(&self, now: Instant) -> DispatchStats {
        let mut state = self.shared.lock();
        let rate_window = state.rate_limiter.in_window(now);
        DispatchStats {
            cache_entries: state.cache.len(),
            pending: state.pending.len(),
            cooldowns: state.cooldowns.len(),
            rate_window,
            rate_limit: state.rate_limiter.limit(),
        }
    }
}

impl<B: Backend> Shared<B> {
    async fn execute(&self, check: &CheckRequest) -> Outcome {
        let timeout = self.config.request_timeout;
        let started = Instant::now();

        let outcome = match tokio::time::timeout(timeout, self.backend.check_vehicle(check)).await {
            Ok(Ok(reply)) => {
                let outcome = Outcome::from_reply(&reply);
                if outcome.success {
                    info!("[{}] {} -> {}", check.request_id, check.plate, outcome.message);
                } else {
                    warn!("[{}] {} -> {}", check.request_id, check.plate, outcome.message);
                }
                outcome
            }
            Ok(Err(e)) => {
                warn!("[{}] Backend unreachable for {}: {}", check.request_id, check.plate, e);
                Outcome::connection_error(&e)
            }
            Err(_) => {
                warn!("[{}] Backend timed out for {}", check.request_id, check.plate);
                Outcome::connection_error(&DispatchError::Timeout(timeout))
            }
        };

        debug!("[{}] Completed in {:?}", check.request_id, started.elapsed());
        outcome
    }

    fn finish(&self, key: DispatchKey, token: PendingToken, outcome: &Outcome, stored_at: Instant) {
        let mut state = self.lock();
        state.pending.complete(&key, token);
        state
            .cache
            .put(key, outcome.clone(), TtlClass::of(outcome), stored_at);
        gauge!("plate_cache_entries").set(state.cache.len() as f64);
        counter!("plate_dispatch_completed_total", "kind" => outcome.kind().as_str()).increment(1);
    }
}

fn record_submission(result: &'static str) {
    counter!("plate_dispatch_total", "result" => result).increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::BackendReply;
    use plate_tracker::PlateText;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::mpsc;

    #[derive(Clone, Default)]
    struct ScriptedBackend {
        replies: Arc<Mutex<VecDeque<Result<BackendReply, DispatchError>>>>,
        calls: Arc<AtomicUsize>,
        delay: Option<Duration>,
    }

    impl ScriptedBackend {
        fn with_replies(replies: Vec<Result<BackendReply, DispatchError>>) -> Self {
            Self {
                replies: Arc::new(Mutex::new(replies.into())),
                ..Self::default()
            }
        }

        fn delayed(mut self, delay: Duration) -> Self {
            self.delay = Some(delay);
            self
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl Backend for ScriptedBackend {
        async fn check_vehicle(&self, _request: &CheckRequest) -> Result<BackendReply, DispatchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            let next = self.replies.lock().unwrap().pop_front();
            next.unwrap_or_else(|| Ok(ok_reply("Welcome")))
        }
    }

    fn ok_reply(message: &str) -> BackendReply {
        BackendReply {
            status: 200,
            body: format!(r#"{{"message":"{}","approved":true}}"#, message),
        }
    }

    fn request(plate: &str, panel: Panel, at: Instant) -> DispatchRequest {
        DispatchRequest {
            event: ConfirmedEvent {
                plate: PlateText::parse(plate).unwrap(),
                panel,
                confirmed_at: at,
                dwell: Duration::from_secs(3),
            },
            image_jpeg: None,
        }
    }

    fn config() -> DispatchConfig {
        DispatchConfig {
            cooldown: Duration::from_secs(5),
            cache_ttl: Duration::from_secs(300),
            connection_error_ttl: Duration::from_secs(120),
            rate_limit_enabled: true,
            max_requests_per_minute: 30,
            request_timeout: Duration::from_secs(10),
        }
    }

    async fn dispatched(submission: Submission) -> Outcome {
        match submission {
            Submission::Dispatched(handle) => handle.await.unwrap(),
            other => panic!("expected dispatch, got {}", other.label()),
        }
    }

    fn secs(base: Instant, s: u64) -> Instant {
        base + Duration::from_secs(s)
    }

    #[tokio::test]
    async fn test_repeat_sighting_served_from_cache() {
        let backend = ScriptedBackend::default();
        let controller = DispatchController::new(backend.clone(), config());
        let mut local = controller.local_cooldowns();
        let t0 = Instant::now();

        let outcome = dispatched(controller.submit(
            request("51A-12345", Panel::Entry, t0),
            &mut local,
            t0,
            |_| {},
        ))
        .await;
        assert!(outcome.success);
        assert_eq!(outcome.approved, Some(true));

        match controller.submit(request("51A-12345", Panel::Entry, t0), &mut local, secs(t0, 1), |_| {}) {
            Submission::Cached(cached) => {
                assert!(cached.is_cached);
                assert_eq!(cached.message, "[CACHED] Welcome");
            }
            other => panic!("expected cache hit, got {}", other.label()),
        }
        assert_eq!(backend.calls(), 1);
    }

    #[tokio::test]
    async fn test_in_flight_duplicate_is_dropped() {
        let backend = ScriptedBackend::default().delayed(Duration::from_millis(50));
        let controller = DispatchController::new(backend.clone(), config());
        let mut entry_cam = controller.local_cooldowns();
        let mut second_cam = controller.local_cooldowns();
        let t0 = Instant::now();

        let first = controller.submit(request("51A-12345", Panel::Entry, t0), &mut entry_cam, t0, |_| {});
        let second = controller.submit(
            request("51A-12345", Panel::Entry, t0),
            &mut second_cam,
            t0 + Duration::from_millis(10),
            |_| {},
        );
        assert!(matches!(second, Submission::Duplicate));

        dispatched(first).await;
        assert_eq!(backend.calls(), 1);
        assert_eq!(controller.stats(t0).pending, 0);
    }

    #[tokio::test]
    async fn test_cooldown_applies_across_cameras() {
        let backend = ScriptedBackend::default();
        let controller = DispatchController::new(backend.clone(), config());
        let mut cam_a = controller.local_cooldowns();
        let mut cam_b = controller.local_cooldowns();
        let t0 = Instant::now();

        dispatched(controller.submit(request("51A-12345", Panel::Entry, t0), &mut cam_a, t0, |_| {})).await;
        controller.clear_cache();

        let blocked = controller.submit(request("51A-12345", Panel::Entry, t0), &mut cam_b, secs(t0, 3), |_| {});
        assert!(matches!(blocked, Submission::CoolingDown));

        // Different panel is a different key
        dispatched(controller.submit(request("51A-12345", Panel::Exit, t0), &mut cam_b, secs(t0, 3), |_| {}))
            .await;

        dispatched(controller.submit(request("51A-12345", Panel::Entry, t0), &mut cam_b, secs(t0, 6), |_| {}))
            .await;
        assert_eq!(backend.calls(), 3);
    }

    #[tokio::test]
    async fn test_connection_error_cached_for_its_own_ttl() {
        let backend = ScriptedBackend::with_replies(vec![Err(DispatchError::Transport(
            "connection refused".into(),
        ))]);
        let controller = DispatchController::new(backend.clone(), config());
        let mut local = controller.local_cooldowns();
        let t0 = Instant::now();

        let outcome = dispatched(controller.submit(request("30F-11111", Panel::Exit, t0), &mut local, t0, |_| {}))
            .await;
        assert!(outcome.is_connection_error);
        assert_eq!(outcome.message, "Network Error: connection refused");

        match controller.submit(request("30F-11111", Panel::Exit, t0), &mut local, secs(t0, 60), |_| {}) {
            Submission::Cached(cached) => {
                assert!(cached.is_connection_error);
                assert!(cached.is_cached);
            }
            other => panic!("expected cache hit, got {}", other.label()),
        }
        assert_eq!(backend.calls(), 1);

        let retried =
            dispatched(controller.submit(request("30F-11111", Panel::Exit, t0), &mut local, secs(t0, 121), |_| {}))
                .await;
        assert!(retried.success);
        assert_eq!(backend.calls(), 2);
    }

    #[tokio::test]
    async fn test_rate_limited_outcome_is_cached() {
        let backend = ScriptedBackend::default();
        let controller = DispatchController::new(
            backend.clone(),
            DispatchConfig {
                max_requests_per_minute: 2,
                ..config()
            },
        );
        let mut local = controller.local_cooldowns();
        let t0 = Instant::now();

        dispatched(controller.submit(request("A-1", Panel::Entry, t0), &mut local, t0, |_| {})).await;
        dispatched(controller.submit(request("B-2", Panel::Entry, t0), &mut local, t0, |_| {})).await;

        match controller.submit(request("C-3", Panel::Entry, t0), &mut local, t0, |_| {}) {
            Submission::RateLimited(outcome) => {
                assert!(outcome.is_rate_limited);
                assert!(!outcome.success);
            }
            other => panic!("expected rate limit, got {}", other.label()),
        }
        assert_eq!(backend.calls(), 2);

        match controller.submit(request("C-3", Panel::Entry, t0), &mut local, secs(t0, 1), |_| {}) {
            Submission::Cached(cached) => assert!(cached.is_rate_limited),
            other => panic!("expected cache hit, got {}", other.label()),
        }
        assert_eq!(backend.calls(), 2);
        assert_eq!(controller.stats(secs(t0, 1)).rate_window, 2);
    }

    #[tokio::test]
    async fn test_rejection_uses_normal_ttl() {
        let backend = ScriptedBackend::with_replies(vec![Ok(BackendReply {
            status: 403,
            body: "Forbidden".into(),
        })]);
        let controller = DispatchController::new(
            backend.clone(),
            DispatchConfig {
                connection_error_ttl: Duration::from_secs(10),
                ..config()
            },
        );
        let mut local = controller.local_cooldowns();
        let t0 = Instant::now();

        let outcome = dispatched(controller.submit(request("51A-12345", Panel::Entry, t0), &mut local, t0, |_| {}))
            .await;
        assert_eq!(outcome.message, "API Error: 403 - Forbidden");

        let later = controller.submit(request("51A-12345", Panel::Entry, t0), &mut local, secs(t0, 100), |_| {});
        assert!(matches!(later, Submission::Cached(_)));
    }

    #[tokio::test]
    async fn test_timeout_becomes_connection_error() {
        let backend = ScriptedBackend::default().delayed(Duration::from_millis(200));
        let controller = DispatchController::new(
            backend,
            DispatchConfig {
                request_timeout: Duration::from_millis(20),
                ..config()
            },
        );
        let mut local = controller.local_cooldowns();
        let t0 = Instant::now();

        let outcome = dispatched(controller.submit(request("51A-12345", Panel::Entry, t0), &mut local, t0, |_| {}))
            .await;
        assert!(outcome.is_connection_error);
        assert!(outcome.message.contains("timed out"));
        assert_eq!(controller.stats(t0).pending, 0);
    }

    #[tokio::test]
    async fn test_completion_callback_receives_outcome() {
        let controller = DispatchController::new(ScriptedBackend::default(), config());
        let mut local = controller.local_cooldowns();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let t0 = Instant::now();

        let submission = controller.submit(request("51A-12345", Panel::Entry, t0), &mut local, t0, move |outcome| {
            let _ = tx.send(outcome);
        });
        dispatched(submission).await;

        let delivered = rx.recv().await.unwrap();
        assert_eq!(delivered.message, "Welcome");
    }

    #[tokio::test]
    async fn test_reset_panel_clears_cooldowns_and_pending() {
        let backend = ScriptedBackend::default().delayed(Duration::from_millis(50));
        let controller = DispatchController::new(backend.clone(), config());
        let mut local = controller.local_cooldowns();
        let t0 = Instant::now();

        let first = controller.submit(request("51A-12345", Panel::Entry, t0), &mut local, t0, |_| {});
        assert_eq!(controller.stats(t0).pending, 1);
        assert_eq!(controller.reset_panel(Panel::Entry), 2);
        assert_eq!(controller.stats(t0).pending, 0);

        // Stale completion still caches its outcome
        dispatched(first).await;
        assert_eq!(controller.stats(t0).cache_entries, 1);
        assert_eq!(controller.clear_cache(), 1);

        // Only the worker's own cooldown is left
        let blocked = controller.submit(request("51A-12345", Panel::Entry, t0), &mut local, secs(t0, 1), |_| {});
        assert!(matches!(blocked, Submission::CoolingDown));
        local.clear_panel(Panel::Entry);
        dispatched(controller.submit(request("51A-12345", Panel::Entry, t0), &mut local, secs(t0, 1), |_| {}))
            .await;
        assert_eq!(backend.calls(), 2);
    }

    #[tokio::test]
    async fn test_release_pending_only_touches_one_panel() {
        let backend = ScriptedBackend::default().delayed(Duration::from_millis(50));
        let controller = DispatchController::new(backend, config());
        let mut local = controller.local_cooldowns();
        let t0 = Instant::now();

        let entry = controller.submit(request("51A-12345", Panel::Entry, t0), &mut local, t0, |_| {});
        let exit = controller.submit(request("51A-12345", Panel::Exit, t0), &mut local, t0, |_| {});

        assert_eq!(controller.release_pending(Panel::Entry), 1);
        assert_eq!(controller.stats(t0).pending, 1);

        dispatched(entry).await;
        dispatched(exit).await;
        assert_eq!(controller.stats(t0).pending, 0);
    }

    #[tokio::test]
    async fn test_sweep_expires_entries() {
        let controller = DispatchController::new(ScriptedBackend::default(), config());
        let mut local = controller.local_cooldowns();
        let t0 = Instant::now();

        dispatched(controller.submit(request("51A-12345", Panel::Entry, t0), &mut local, t0, |_| {})).await;
        assert_eq!(controller.sweep(secs(t0, 100)), 0);
        assert_eq!(controller.sweep(secs(t0, 400)), 1);
        assert_eq!(controller.stats(secs(t0, 400)).cache_entries, 0);
    }
}
