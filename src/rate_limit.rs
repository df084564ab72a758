//! Distributed sliding-window rate limiting.
//!
//! - [`WindowStore`]: the atomic evaluate-and-record primitive a shared store
//!   must expose. [`InMemoryWindowStore`] is the single-process version;
//!   `meshgate-redis` provides a Redis one.
//! - [`SlidingWindowLimiter`]: asks the store whether a key may proceed and
//!   applies the [`FailurePolicy`] when the store cannot answer.
//! - [`RateLimitLayer`]: tower middleware rejecting throttled requests before
//!   the inner service runs.
//!
//! The limiter keeps no per-key state. Counting is correct under concurrency
//! only because the store evaluates and records in one atomic step; a separate
//! count followed by a separate insert would let racing callers all see room
//! under the threshold.

use crate::error::StoreError;
use std::time::Duration;

pub mod limiter;
pub mod middleware;
pub mod store;

pub use limiter::SlidingWindowLimiter;
pub use middleware::{RateLimitLayer, RateLimitService};
pub use store::{InMemoryWindowStore, WindowStore, WindowVerdict};

/// What to do when the window store fails or times out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize), serde(rename_all = "snake_case"))]
pub enum FailurePolicy {
    /// Reject the request. Protects downstream capacity.
    #[default]
    FailClosed,
    /// Admit the request unthrottled. Keeps the service available.
    FailOpen,
}

impl FailurePolicy {
    /// Whether a request is admitted when the store fails.
    pub fn admits(&self) -> bool {
        matches!(self, FailurePolicy::FailOpen)
    }
}

/// Errors produced when validating a window configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WindowConfigError {
    /// Windows are tracked in whole milliseconds.
    #[error("window must be a whole number of milliseconds, at least 1ms (got {0:?})")]
    InvalidWindow(Duration),
    /// A zero threshold would reject everything.
    #[error("threshold must be > 0")]
    ZeroThreshold,
}

/// Sliding window length and the number of events it may hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize), serde(try_from = "RawWindowConfig"))]
pub struct WindowConfig {
    window: Duration,
    threshold: u32,
}

impl WindowConfig {
    /// Create a validated config: at most `threshold` events per `window`.
    pub fn new(window: Duration, threshold: u32) -> Result<Self, WindowConfigError> {
        if window.as_millis() == 0 || window.subsec_nanos() % 1_000_000 != 0 {
            return Err(WindowConfigError::InvalidWindow(window));
        }
        if threshold == 0 {
            return Err(WindowConfigError::ZeroThreshold);
        }
        Ok(Self { window, threshold })
    }

    /// Length of the sliding window.
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Maximum events per window.
    pub fn threshold(&self) -> u32 {
        self.threshold
    }
}

#[cfg(feature = "serde")]
#[derive(serde::Deserialize)]
struct RawWindowConfig {
    window_ms: u64,
    threshold: u32,
}

#[cfg(feature = "serde")]
impl TryFrom<RawWindowConfig> for WindowConfig {
    type Error = WindowConfigError;

    fn try_from(raw: RawWindowConfig) -> Result<Self, Self::Error> {
        WindowConfig::new(Duration::from_millis(raw.window_ms), raw.threshold)
    }
}

/// The decision returned by a rate limiter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// An event was recorded; the request may proceed.
    Allowed {
        /// Events in the window, including this one.
        in_window: u32,
    },
    /// The key is at its threshold; nothing was recorded.
    Denied {
        /// Events in the window at decision time.
        in_window: u32,
    },
    /// The store failed; `policy` decides whether the request proceeds.
    Degraded {
        /// Policy applied to this failure.
        policy: FailurePolicy,
        /// What went wrong.
        error: StoreError,
    },
}

impl Decision {
    /// Whether the request may proceed.
    pub fn is_allowed(&self) -> bool {
        match self {
            Decision::Allowed { .. } => true,
            Decision::Denied { .. } => false,
            Decision::Degraded { policy, .. } => policy.admits(),
        }
    }
}

/// Core interface for keyed admission checks.
///
/// Decouples the middleware from the limiter implementation and its store.
#[async_trait::async_trait]
pub trait RateLimiter: Send + Sync {
    /// Decide whether a request identified by `key` may proceed.
    async fn evaluate(&self, key: &str) -> Decision;
}
