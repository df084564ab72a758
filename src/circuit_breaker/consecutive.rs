use super::{Breaker, BreakerOpen, BreakerState};
use crate::clock::{Clock, MonotonicClock};
use std::sync::atomic::{AtomicU64, AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

const STATE_CLOSED: u8 = 0;
const STATE_OPEN: u8 = 1;
const STATE_HALF_OPEN: u8 = 2;

impl BreakerState {
    fn to_u8(self) -> u8 {
        match self {
            BreakerState::Closed => STATE_CLOSED,
            BreakerState::Open => STATE_OPEN,
            BreakerState::HalfOpen => STATE_HALF_OPEN,
        }
    }

    fn from_u8(raw: u8) -> Option<Self> {
        match raw {
            STATE_CLOSED => Some(BreakerState::Closed),
            STATE_OPEN => Some(BreakerState::Open),
            STATE_HALF_OPEN => Some(BreakerState::HalfOpen),
            _ => None,
        }
    }
}

/// Errors produced when validating breaker configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BreakerConfigError {
    /// Failure threshold must be > 0.
    #[error("failure_threshold must be > 0 (got {provided})")]
    InvalidFailureThreshold {
        /// Value provided by caller.
        provided: usize,
    },
    /// Recovery timeout must be > 0 unless the breaker is disabled.
    #[error("recovery_timeout must be > 0 unless breaker is disabled (got {0:?})")]
    InvalidRecoveryTimeout(Duration),
    /// Half-open probe limit must be > 0.
    #[error("half_open_max_calls must be > 0 (got {provided})")]
    InvalidHalfOpenLimit {
        /// Value provided by caller.
        provided: usize,
    },
}

/// Validated configuration for [`ConsecutiveFailureBreaker`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Deserialize),
    serde(try_from = "RawCircuitBreakerConfig")
)]
pub struct CircuitBreakerConfig {
    failure_threshold: usize,
    recovery_timeout: Duration,
    half_open_max_calls: usize,
}

impl CircuitBreakerConfig {
    /// Create a config with validation.
    pub fn new(
        failure_threshold: usize,
        recovery_timeout: Duration,
        half_open_max_calls: usize,
    ) -> Result<Self, BreakerConfigError> {
        let config = Self { failure_threshold, recovery_timeout, half_open_max_calls };
        config.validate()?;
        Ok(config)
    }

    /// A breaker that never opens.
    pub fn disabled() -> Self {
        Self {
            failure_threshold: usize::MAX,
            recovery_timeout: Duration::MAX,
            half_open_max_calls: usize::MAX,
        }
    }

    /// Consecutive failures that open the breaker from Closed.
    pub fn failure_threshold(&self) -> usize {
        self.failure_threshold
    }

    /// How long the breaker stays Open before admitting probes.
    pub fn recovery_timeout(&self) -> Duration {
        self.recovery_timeout
    }

    /// Maximum probes admitted while Half-Open.
    pub fn half_open_max_calls(&self) -> usize {
        self.half_open_max_calls
    }

    fn validate(&self) -> Result<(), BreakerConfigError> {
        if self.failure_threshold == 0 {
            return Err(BreakerConfigError::InvalidFailureThreshold { provided: 0 });
        }
        if self.half_open_max_calls == 0 {
            return Err(BreakerConfigError::InvalidHalfOpenLimit { provided: 0 });
        }
        let disabled = self.failure_threshold == usize::MAX;
        if self.recovery_timeout == Duration::ZERO && !disabled {
            return Err(BreakerConfigError::InvalidRecoveryTimeout(self.recovery_timeout));
        }
        Ok(())
    }

    fn recovery_millis(&self) -> u64 {
        u64::try_from(self.recovery_timeout.as_millis()).unwrap_or(u64::MAX)
    }
}

impl Default for CircuitBreakerConfig {
    /// Five consecutive failures, thirty seconds open, one probe.
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(30),
            half_open_max_calls: 1,
        }
    }
}

#[cfg(feature = "serde")]
#[derive(serde::Deserialize)]
struct RawCircuitBreakerConfig {
    failure_threshold: usize,
    recovery_timeout_ms: u64,
    #[serde(default = "one")]
    half_open_max_calls: usize,
}

#[cfg(feature = "serde")]
fn one() -> usize {
    1
}

#[cfg(feature = "serde")]
impl TryFrom<RawCircuitBreakerConfig> for CircuitBreakerConfig {
    type Error = BreakerConfigError;

    fn try_from(raw: RawCircuitBreakerConfig) -> Result<Self, Self::Error> {
        CircuitBreakerConfig::new(
            raw.failure_threshold,
            Duration::from_millis(raw.recovery_timeout_ms),
            raw.half_open_max_calls,
        )
    }
}

#[derive(Debug)]
struct Counters {
    state: AtomicU8,
    failure_count: AtomicUsize,
    opened_at_millis: AtomicU64,
    half_open_calls: AtomicUsize,
}

/// Lock-free breaker that opens after consecutive failures.
///
/// - **Closed**: everything is admitted. A success resets the failure streak;
///   `failure_threshold` consecutive failures open the breaker.
/// - **Open**: everything is denied until `recovery_timeout` has elapsed, then
///   the first caller moves it to Half-Open.
/// - **HalfOpen**: up to `half_open_max_calls` probes are admitted. The first
///   reported success closes the breaker; the first failure reopens it.
///
/// Clones share state, so every handle observes the same lifecycle.
///
/// # Examples
/// ```
/// use meshgate::circuit_breaker::{Breaker, CircuitBreakerConfig, ConsecutiveFailureBreaker};
/// use std::time::Duration;
///
/// let config = CircuitBreakerConfig::new(2, Duration::from_secs(30), 1).unwrap();
/// let breaker = ConsecutiveFailureBreaker::new(config);
/// breaker.mark_failed();
/// assert!(breaker.allow().is_ok());
/// breaker.mark_failed();
/// assert!(breaker.allow().is_err());
/// ```
#[derive(Debug, Clone)]
pub struct ConsecutiveFailureBreaker {
    counters: Arc<Counters>,
    config: CircuitBreakerConfig,
    clock: Arc<dyn Clock>,
}

impl Default for ConsecutiveFailureBreaker {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }
}

impl ConsecutiveFailureBreaker {
    /// Create a closed breaker from a validated config.
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            counters: Arc::new(Counters {
                state: AtomicU8::new(STATE_CLOSED),
                failure_count: AtomicUsize::new(0),
                opened_at_millis: AtomicU64::new(0),
                half_open_calls: AtomicUsize::new(0),
            }),
            config,
            clock: Arc::new(MonotonicClock::default()),
        }
    }

    /// Override the clock (useful for deterministic tests).
    pub fn with_clock<C: Clock + 'static>(mut self, clock: C) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// The config this breaker was built with.
    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Current state. Open is reported until a caller observes the elapsed
    /// recovery timeout.
    pub fn state(&self) -> BreakerState {
        self.load_state()
    }

    /// Current consecutive failure count.
    pub fn failure_count(&self) -> usize {
        self.counters.failure_count.load(Ordering::Acquire)
    }

    /// Force the breaker closed and clear its counters.
    pub fn reset(&self) {
        self.counters.state.store(STATE_CLOSED, Ordering::Release);
        self.counters.failure_count.store(0, Ordering::Release);
        self.counters.opened_at_millis.store(0, Ordering::Release);
        self.counters.half_open_calls.store(0, Ordering::Release);
        tracing::info!("circuit breaker reset → closed");
    }

    fn load_state(&self) -> BreakerState {
        // Only this module stores into `state`, always a valid discriminant.
        BreakerState::from_u8(self.counters.state.load(Ordering::Acquire))
            .unwrap_or(BreakerState::Open)
    }

    fn transition(&self, from: BreakerState, to: BreakerState) -> bool {
        self.counters
            .state
            .compare_exchange(from.to_u8(), to.to_u8(), Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn open_since(&self) -> Duration {
        let opened_at = self.counters.opened_at_millis.load(Ordering::Acquire);
        Duration::from_millis(self.clock.now_millis().saturating_sub(opened_at))
    }

    fn trip(&self) {
        self.counters.half_open_calls.store(0, Ordering::Release);
        self.counters.opened_at_millis.store(self.clock.now_millis(), Ordering::Release);
    }
}

impl Breaker for ConsecutiveFailureBreaker {
    fn allow(&self) -> Result<(), BreakerOpen> {
        loop {
            match self.load_state() {
                BreakerState::Closed => return Ok(()),
                BreakerState::Open => {
                    let open_for = self.open_since();
                    if open_for.as_millis() < u128::from(self.config.recovery_millis()) {
                        return Err(BreakerOpen);
                    }
                    if self.transition(BreakerState::Open, BreakerState::HalfOpen) {
                        // Winner of the race is the first probe.
                        self.counters.half_open_calls.store(1, Ordering::Release);
                        tracing::info!(
                            open_for_ms = open_for.as_millis() as u64,
                            "circuit breaker → half-open"
                        );
                        return Ok(());
                    }
                    // Someone else moved it; re-evaluate.
                }
                BreakerState::HalfOpen => {
                    let current = self.counters.half_open_calls.fetch_add(1, Ordering::AcqRel);
                    if current >= self.config.half_open_max_calls {
                        self.counters.half_open_calls.fetch_sub(1, Ordering::Release);
                        return Err(BreakerOpen);
                    }
                    tracing::debug!(
                        in_flight = current + 1,
                        max = self.config.half_open_max_calls,
                        "circuit breaker: half-open probe"
                    );
                    return Ok(());
                }
            }
        }
    }

    fn mark_success(&self) {
        match self.load_state() {
            BreakerState::HalfOpen => {
                if self.transition(BreakerState::HalfOpen, BreakerState::Closed) {
                    self.counters.half_open_calls.store(0, Ordering::Release);
                    self.counters.failure_count.store(0, Ordering::Release);
                    self.counters.opened_at_millis.store(0, Ordering::Release);
                    tracing::info!("circuit breaker → closed");
                }
            }
            BreakerState::Closed => {
                self.counters.failure_count.store(0, Ordering::Release);
            }
            BreakerState::Open => {}
        }
    }

    fn mark_failed(&self) {
        let failures = self.counters.failure_count.fetch_add(1, Ordering::AcqRel).saturating_add(1);
        match self.load_state() {
            BreakerState::HalfOpen => {
                if self.transition(BreakerState::HalfOpen, BreakerState::Open) {
                    self.trip();
                    tracing::warn!(failures, "circuit breaker: probe failed → open");
                }
            }
            BreakerState::Closed => {
                if failures >= self.config.failure_threshold
                    && self.transition(BreakerState::Closed, BreakerState::Open)
                {
                    self.trip();
                    tracing::error!(
                        failures,
                        threshold = self.config.failure_threshold,
                        "circuit breaker → open"
                    );
                }
            }
            BreakerState::Open => {}
        }
    }
}
