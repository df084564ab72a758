use crate::adaptive::DynamicConfig;
use crate::clock::{Clock, SystemClock};
use crate::error::StoreError;
use crate::rate_limit::store::{WindowStore, WindowVerdict};
use crate::rate_limit::{Decision, FailurePolicy, RateLimiter, WindowConfig};
use crate::telemetry::{emit_best_effort, NullSink, RateLimitEvent, TelemetrySink, TrafficEvent};
use async_trait::async_trait;
use std::sync::Arc;

/// Sliding-window rate limiter over a shared [`WindowStore`].
///
/// Every check is exactly one store round trip carrying the current window
/// config and the clock's wall time. Nothing is cached locally, so any number
/// of tasks (or processes sharing the store) may call it concurrently.
///
/// The limiter sets no deadline of its own; wrap the call in the caller's
/// timeout and a timed-out call is simply dropped. A store error is handled by
/// the [`FailurePolicy`], fail-closed unless configured otherwise.
///
/// # Examples
/// ```
/// use meshgate::rate_limit::{InMemoryWindowStore, SlidingWindowLimiter, WindowConfig};
/// use std::time::Duration;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let config = WindowConfig::new(Duration::from_secs(1), 2).unwrap();
/// let limiter = SlidingWindowLimiter::new(InMemoryWindowStore::new(), config);
/// assert!(limiter.allow("10.0.0.7").await);
/// assert!(limiter.allow("10.0.0.7").await);
/// assert!(!limiter.allow("10.0.0.7").await);
/// # }
/// ```
pub struct SlidingWindowLimiter<S, T = NullSink> {
    store: S,
    config: DynamicConfig<WindowConfig>,
    policy: FailurePolicy,
    clock: Arc<dyn Clock>,
    sink: T,
}

impl<S, T> std::fmt::Debug for SlidingWindowLimiter<S, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlidingWindowLimiter")
            .field("config", &*self.config.get())
            .field("policy", &self.policy)
            .field("clock", &self.clock)
            .finish_non_exhaustive()
    }
}

impl<S: WindowStore> SlidingWindowLimiter<S> {
    /// Create a fail-closed limiter using the system wall clock.
    pub fn new(store: S, config: WindowConfig) -> Self {
        Self {
            store,
            config: DynamicConfig::new(config),
            policy: FailurePolicy::default(),
            clock: Arc::new(SystemClock),
            sink: NullSink,
        }
    }
}

impl<S, T> SlidingWindowLimiter<S, T> {
    /// Choose what happens when the store fails.
    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Override the clock. All limiters sharing a store must agree on the epoch.
    pub fn with_clock<C: Clock + 'static>(mut self, clock: C) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// Send decisions to a telemetry sink.
    pub fn with_sink<NewSink>(self, sink: NewSink) -> SlidingWindowLimiter<S, NewSink> {
        SlidingWindowLimiter {
            store: self.store,
            config: self.config,
            policy: self.policy,
            clock: self.clock,
            sink,
        }
    }

    /// Live config handle; updates apply to the next check.
    pub fn config(&self) -> &DynamicConfig<WindowConfig> {
        &self.config
    }

    /// Policy applied when the store fails.
    pub fn failure_policy(&self) -> FailurePolicy {
        self.policy
    }
}

impl<S, T> SlidingWindowLimiter<S, T>
where
    S: WindowStore,
    T: TelemetrySink + Sync,
    T::Future: Send + 'static,
{
    /// Reads the live config and the clock, then makes one store call.
    async fn round_trip(&self, key: &str) -> (WindowConfig, Result<WindowVerdict, StoreError>) {
        let config = *self.config.get();
        let now = self.clock.now_millis();
        let result =
            self.store.evaluate_window(key, config.window(), config.threshold(), now).await;
        (config, result)
    }

    /// One store round trip with no failure policy applied.
    pub async fn check(&self, key: &str) -> Result<bool, StoreError> {
        let (_, result) = self.round_trip(key).await;
        result.map(|verdict| verdict.allowed)
    }

    /// Full decision for `key`, including degraded outcomes.
    pub async fn evaluate(&self, key: &str) -> Decision {
        let (config, result) = self.round_trip(key).await;

        let (decision, event) = match result {
            Ok(verdict) if verdict.allowed => (
                Decision::Allowed { in_window: verdict.in_window },
                RateLimitEvent::Allowed { key: key.to_owned(), in_window: verdict.in_window },
            ),
            Ok(verdict) => {
                tracing::debug!(
                    key = %key,
                    in_window = verdict.in_window,
                    threshold = config.threshold(),
                    "rate limited"
                );
                (
                    Decision::Denied { in_window: verdict.in_window },
                    RateLimitEvent::Denied { key: key.to_owned(), in_window: verdict.in_window },
                )
            }
            Err(error) => {
                let admitted = self.policy.admits();
                tracing::warn!(
                    key = %key,
                    error = %error,
                    admitted,
                    "rate limit store failed"
                );
                (
                    Decision::Degraded { policy: self.policy, error },
                    RateLimitEvent::StoreFailed { key: key.to_owned(), admitted },
                )
            }
        };

        emit_best_effort(self.sink.clone(), TrafficEvent::RateLimit(event)).await;
        decision
    }

    /// Whether `key` may proceed. Store failures follow the failure policy, so
    /// with the default policy an unreachable store means `false`.
    pub async fn allow(&self, key: &str) -> bool {
        self.evaluate(key).await.is_allowed()
    }
}

#[async_trait]
impl<S, T> RateLimiter for SlidingWindowLimiter<S, T>
where
    S: WindowStore,
    T: TelemetrySink + Sync,
    T::Future: Send + 'static,
{
    async fn evaluate(&self, key: &str) -> Decision {
        SlidingWindowLimiter::evaluate(self, key).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::rate_limit::store::{InMemoryWindowStore, WindowVerdict};
    use crate::telemetry::MemorySink;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Debug, Default)]
    struct BrokenStore {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl WindowStore for BrokenStore {
        async fn evaluate_window(
            &self,
            _key: &str,
            _window: Duration,
            _threshold: u32,
            _now_millis: u64,
        ) -> Result<WindowVerdict, StoreError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(StoreError::Backend("connection refused".into()))
        }
    }

    fn config(window: Duration, threshold: u32) -> WindowConfig {
        WindowConfig::new(window, threshold).expect("valid window config")
    }

    #[tokio::test]
    async fn threshold_one_three_second_window() {
        let clock = ManualClock::starting_at(1_700_000_000_000);
        let limiter =
            SlidingWindowLimiter::new(InMemoryWindowStore::new(), config(Duration::from_secs(3), 1))
                .with_clock(clock.clone());

        assert!(limiter.allow("k").await);
        clock.advance(Duration::from_secs(1));
        assert!(!limiter.allow("k").await);
        clock.advance(Duration::from_millis(2_100));
        assert!(limiter.allow("k").await);
    }

    #[tokio::test]
    async fn store_failure_fails_closed_by_default() {
        let limiter = SlidingWindowLimiter::new(
            Arc::new(BrokenStore::default()),
            config(Duration::from_secs(1), 100),
        );
        assert_eq!(limiter.failure_policy(), FailurePolicy::FailClosed);
        assert!(!limiter.allow("k").await);
        assert!(matches!(
            limiter.evaluate("k").await,
            Decision::Degraded { policy: FailurePolicy::FailClosed, .. }
        ));
        assert!(limiter.check("k").await.is_err());
    }

    #[tokio::test]
    async fn store_failure_can_fail_open() {
        let store = Arc::new(BrokenStore::default());
        let limiter = SlidingWindowLimiter::new(store.clone(), config(Duration::from_secs(1), 1))
            .with_failure_policy(FailurePolicy::FailOpen);
        assert!(limiter.allow("k").await);
        assert!(limiter.allow("k").await);
        assert_eq!(store.calls.load(Ordering::SeqCst), 2, "one round trip per check");
    }

    #[tokio::test]
    async fn config_updates_apply_to_next_check() {
        let clock = ManualClock::starting_at(0);
        let limiter =
            SlidingWindowLimiter::new(InMemoryWindowStore::new(), config(Duration::from_secs(10), 1))
                .with_clock(clock);

        assert!(limiter.allow("k").await);
        assert!(!limiter.allow("k").await);
        limiter.config().set(config(Duration::from_secs(10), 3));
        assert!(limiter.allow("k").await);
        assert!(limiter.allow("k").await);
        assert!(!limiter.allow("k").await);
    }

    #[tokio::test]
    async fn emits_one_event_per_decision() {
        let sink = MemorySink::new();
        let limiter =
            SlidingWindowLimiter::new(InMemoryWindowStore::new(), config(Duration::from_secs(5), 1))
                .with_clock(ManualClock::starting_at(0))
                .with_sink(sink.clone());

        limiter.allow("client-a").await;
        limiter.allow("client-a").await;

        assert_eq!(
            sink.events(),
            vec![
                TrafficEvent::RateLimit(RateLimitEvent::Allowed {
                    key: "client-a".into(),
                    in_window: 1
                }),
                TrafficEvent::RateLimit(RateLimitEvent::Denied {
                    key: "client-a".into(),
                    in_window: 1
                }),
            ]
        );
    }
}
