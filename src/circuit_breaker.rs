//! Circuit breaker admission.
//!
//! The breaker itself is a collaborator behind the narrow [`Breaker`] contract
//! (`allow`, `mark_success`, `mark_failed`). [`CircuitBreakerGate`] sequences
//! those calls around exactly one guarded operation; it never inspects or
//! drives the breaker's state machine.
//!
//! [`ConsecutiveFailureBreaker`] is the bundled lock-free collaborator.
//! [`CircuitBreakerLayer`] puts a gate in front of a tower service.

use std::sync::Arc;

pub mod consecutive;
pub mod gate;
pub mod middleware;

pub use consecutive::{BreakerConfigError, CircuitBreakerConfig, ConsecutiveFailureBreaker};
pub use gate::CircuitBreakerGate;
pub use middleware::{CircuitBreakerLayer, CircuitBreakerService};

/// Returned by [`Breaker::allow`] when the breaker denies entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("circuit breaker is open")]
pub struct BreakerOpen;

/// Conceptual breaker state, as reported by collaborators that track one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    /// Normal operation.
    Closed,
    /// Short-circuits calls until the cool-down elapses.
    Open,
    /// Admits a limited number of probes to test recovery.
    HalfOpen,
}

/// Admission and outcome contract of a circuit breaker.
///
/// Must tolerate concurrent calls from independent gate invocations. For each
/// admitted call the gate reports exactly one outcome; a denied call reports
/// none.
pub trait Breaker: Send + Sync {
    /// Ask to run one call.
    fn allow(&self) -> Result<(), BreakerOpen>;

    /// The admitted call succeeded.
    fn mark_success(&self);

    /// The admitted call failed, panicked, or was abandoned.
    fn mark_failed(&self);
}

impl<B> Breaker for Arc<B>
where
    B: Breaker + ?Sized,
{
    fn allow(&self) -> Result<(), BreakerOpen> {
        (**self).allow()
    }

    fn mark_success(&self) {
        (**self).mark_success()
    }

    fn mark_failed(&self) {
        (**self).mark_failed()
    }
}
