use super::Breaker;
use crate::error::{TrafficError, UnavailableCause};
use crate::telemetry::{emit_best_effort, GateEvent, NullSink, TelemetrySink, TrafficEvent};
use std::fmt;
use std::future::Future;
use std::time::Instant;

/// Runs one operation under a [`Breaker`].
///
/// Per call: `allow`, then the operation, then exactly one of `mark_success`
/// or `mark_failed`. A denied call never runs the operation and reports no
/// outcome. An admitted call whose future is dropped early or panics is
/// reported as failed when its ticket is dropped.
///
/// Callers see a single [`TrafficError::Unavailable`] for both a denied call
/// and a failed operation. The operation's error is logged at debug level and
/// the [`UnavailableCause`] stays on the error and on the emitted
/// [`GateEvent`], but the detail is not forwarded.
///
/// # Examples
/// ```
/// use meshgate::circuit_breaker::{CircuitBreakerGate, ConsecutiveFailureBreaker};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let gate = CircuitBreakerGate::new(ConsecutiveFailureBreaker::default());
/// let value = gate.guard(|| async { Ok::<_, std::io::Error>(7) }).await.unwrap();
/// assert_eq!(value, 7);
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct CircuitBreakerGate<B, T = NullSink> {
    breaker: B,
    sink: T,
}

impl<B: Breaker> CircuitBreakerGate<B> {
    /// Gate calls through `breaker`.
    pub fn new(breaker: B) -> Self {
        Self { breaker, sink: NullSink }
    }
}

impl<B, T> CircuitBreakerGate<B, T> {
    /// Send gate outcomes to a telemetry sink.
    pub fn with_sink<NewSink>(self, sink: NewSink) -> CircuitBreakerGate<B, NewSink> {
        CircuitBreakerGate { breaker: self.breaker, sink }
    }

    /// The breaker collaborator.
    pub fn breaker(&self) -> &B {
        &self.breaker
    }
}

impl<B, T> CircuitBreakerGate<B, T>
where
    B: Breaker,
    T: TelemetrySink + Sync,
    T::Future: Send + 'static,
{
    /// Run `operation` if the breaker admits it.
    ///
    /// # Errors
    /// [`TrafficError::Unavailable`] with cause `BreakerOpen` when denied, or
    /// `OperationFailed` when the operation returned an error.
    pub async fn guard<F, Fut, R, E>(&self, operation: F) -> Result<R, TrafficError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<R, E>>,
        E: fmt::Display,
    {
        if self.breaker.allow().is_err() {
            tracing::debug!(cause = UnavailableCause::BreakerOpen.as_str(), "gate rejected call");
            return self.reject(UnavailableCause::BreakerOpen).await;
        }

        let ticket = Ticket { breaker: &self.breaker, settled: false };
        let started = Instant::now();
        let outcome = match operation().await {
            Ok(value) => {
                ticket.settle(true);
                Ok(value)
            }
            Err(err) => {
                ticket.settle(false);
                tracing::debug!(
                    cause = UnavailableCause::OperationFailed.as_str(),
                    error = %err,
                    "guarded operation failed"
                );
                Err(())
            }
        };

        match outcome {
            Ok(value) => {
                let event = GateEvent::Succeeded { duration: started.elapsed() };
                emit_best_effort(self.sink.clone(), TrafficEvent::Gate(event)).await;
                Ok(value)
            }
            Err(()) => self.reject(UnavailableCause::OperationFailed).await,
        }
    }

    async fn reject<R>(&self, cause: UnavailableCause) -> Result<R, TrafficError> {
        emit_best_effort(self.sink.clone(), TrafficEvent::Gate(GateEvent::Rejected { cause }))
            .await;
        Err(TrafficError::unavailable(cause))
    }
}

/// Admission held by one running operation. Dropping it unsettled counts as a
/// failure.
struct Ticket<'a, B: Breaker> {
    breaker: &'a B,
    settled: bool,
}

impl<B: Breaker> Ticket<'_, B> {
    fn settle(mut self, success: bool) {
        self.settled = true;
        if success {
            self.breaker.mark_success();
        } else {
            self.breaker.mark_failed();
        }
    }
}

impl<B: Breaker> Drop for Ticket<'_, B> {
    fn drop(&mut self) {
        if !self.settled {
            tracing::warn!("guarded operation abandoned before completing; counted as failure");
            self.breaker.mark_failed();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit_breaker::BreakerOpen;
    use crate::telemetry::MemorySink;
    use futures::FutureExt;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Debug, Default)]
    struct Recording {
        deny: AtomicBool,
        allows: AtomicUsize,
        successes: AtomicUsize,
        failures: AtomicUsize,
    }

    impl Breaker for Recording {
        fn allow(&self) -> Result<(), BreakerOpen> {
            self.allows.fetch_add(1, Ordering::SeqCst);
            if self.deny.load(Ordering::SeqCst) {
                Err(BreakerOpen)
            } else {
                Ok(())
            }
        }

        fn mark_success(&self) {
            self.successes.fetch_add(1, Ordering::SeqCst);
        }

        fn mark_failed(&self) {
            self.failures.fetch_add(1, Ordering::SeqCst);
        }
    }

    impl Recording {
        fn marks(&self) -> (usize, usize) {
            (self.successes.load(Ordering::SeqCst), self.failures.load(Ordering::SeqCst))
        }
    }

    #[tokio::test]
    async fn denied_call_never_runs() {
        let breaker = Arc::new(Recording::default());
        breaker.deny.store(true, Ordering::SeqCst);
        let gate = CircuitBreakerGate::new(breaker.clone());
        let ran = AtomicUsize::new(0);

        let err = gate
            .guard(|| async {
                ran.fetch_add(1, Ordering::SeqCst);
                Ok::<_, std::io::Error>(())
            })
            .await
            .unwrap_err();

        assert_eq!(err.unavailable_cause(), Some(UnavailableCause::BreakerOpen));
        assert_eq!(ran.load(Ordering::SeqCst), 0);
        assert_eq!(breaker.marks(), (0, 0));
    }

    #[tokio::test]
    async fn success_marks_success_once() {
        let breaker = Arc::new(Recording::default());
        let gate = CircuitBreakerGate::new(breaker.clone());

        let value = gate.guard(|| async { Ok::<_, std::io::Error>("ok") }).await.unwrap();
        assert_eq!(value, "ok");
        assert_eq!(breaker.marks(), (1, 0));
    }

    #[tokio::test]
    async fn failure_marks_failed_once_and_hides_detail() {
        let breaker = Arc::new(Recording::default());
        let gate = CircuitBreakerGate::new(breaker.clone());

        let err = gate
            .guard(|| async { Err::<(), _>("database password rejected") })
            .await
            .unwrap_err();

        assert_eq!(err.unavailable_cause(), Some(UnavailableCause::OperationFailed));
        assert!(!err.to_string().contains("password"));
        assert_eq!(breaker.marks(), (0, 1));
    }

    #[tokio::test]
    async fn panic_counts_as_failure() {
        let breaker = Arc::new(Recording::default());
        let gate = CircuitBreakerGate::new(breaker.clone());

        let result = std::panic::AssertUnwindSafe(gate.guard(|| async {
            if breaker.allows.load(Ordering::SeqCst) > 0 {
                panic!("boom");
            }
            Ok::<(), std::io::Error>(())
        }))
        .catch_unwind()
        .await;

        assert!(result.is_err());
        assert_eq!(breaker.marks(), (0, 1));
    }

    #[tokio::test]
    async fn cancellation_counts_as_failure() {
        let breaker = Arc::new(Recording::default());
        let gate = CircuitBreakerGate::new(breaker.clone());

        let pending = gate.guard(|| futures::future::pending::<Result<(), std::io::Error>>());
        let timed_out = tokio::time::timeout(std::time::Duration::from_millis(5), pending).await;

        assert!(timed_out.is_err());
        assert_eq!(breaker.marks(), (0, 1));
    }

    #[tokio::test]
    async fn emits_cause_for_each_rejection() {
        let breaker = Arc::new(Recording::default());
        let sink = MemorySink::new();
        let gate = CircuitBreakerGate::new(breaker.clone()).with_sink(sink.clone());

        let _ = gate.guard(|| async { Err::<(), _>("nope") }).await;
        breaker.deny.store(true, Ordering::SeqCst);
        let _ = gate.guard(|| async { Ok::<_, &str>(()) }).await;

        assert_eq!(
            sink.events(),
            vec![
                TrafficEvent::Gate(GateEvent::Rejected {
                    cause: UnavailableCause::OperationFailed
                }),
                TrafficEvent::Gate(GateEvent::Rejected { cause: UnavailableCause::BreakerOpen }),
            ]
        );
    }
}
