//! Error taxonomy shared by the picker, the rate limiter and the breaker gate.
//!
//! Every rejection maps to one caller-visible [`Code`]. The gate deliberately
//! reports breaker denial and operation failure under the same code and message;
//! [`UnavailableCause`] keeps the distinction for logs and telemetry.

use std::fmt;
use tower::BoxError;

/// Caller-visible status a rejection maps onto.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum Code {
    /// No backend, open breaker, or a failed guarded call.
    Unavailable,
    /// Too many requests for the throttled key.
    ResourceExhausted,
    /// Infrastructure failure (e.g. the rate-limit store) under a fail-closed policy.
    Internal,
}

impl Code {
    /// Stable lowercase name, suitable for log fields and RPC status strings.
    pub fn as_str(&self) -> &'static str {
        match self {
            Code::Unavailable => "unavailable",
            Code::ResourceExhausted => "resource_exhausted",
            Code::Internal => "internal",
        }
    }

    /// Equivalent HTTP status for HTTP-fronted transports.
    pub fn http_status(&self) -> u16 {
        match self {
            Code::Unavailable => 503,
            Code::ResourceExhausted => 429,
            Code::Internal => 500,
        }
    }
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why the breaker gate answered `Unavailable`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnavailableCause {
    /// The breaker denied entry; the operation never ran.
    BreakerOpen,
    /// The operation ran and failed; its error was not forwarded.
    OperationFailed,
}

impl UnavailableCause {
    /// Stable name for log fields.
    pub fn as_str(&self) -> &'static str {
        match self {
            UnavailableCause::BreakerOpen => "breaker_open",
            UnavailableCause::OperationFailed => "operation_failed",
        }
    }
}

/// Failure talking to the shared window store.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// The store could not be reached or rejected the command.
    #[error("window store backend error: {0}")]
    Backend(String),
    /// The store replied with something the limiter cannot interpret.
    #[error("window store returned an unexpected reply: {0}")]
    Protocol(String),
}

/// Rejections produced by this crate.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TrafficError {
    /// The picker has no backend candidate.
    #[error("unavailable: no backend candidate")]
    NoCandidate,
    /// The breaker gate rejected or absorbed the call.
    #[error("unavailable")]
    Unavailable {
        /// Internal reason; not part of the message.
        cause: UnavailableCause,
    },
    /// The rate limiter denied the key within its window.
    #[error("resource exhausted: too many requests")]
    ResourceExhausted {
        /// Throttled key.
        key: String,
    },
    /// The window store failed and the limiter is failing closed.
    #[error("internal error: rate limit store unavailable")]
    Store(#[source] StoreError),
}

impl TrafficError {
    /// Build an `Unavailable` rejection.
    pub fn unavailable(cause: UnavailableCause) -> Self {
        TrafficError::Unavailable { cause }
    }

    /// Status the caller should see.
    pub fn code(&self) -> Code {
        match self {
            TrafficError::NoCandidate | TrafficError::Unavailable { .. } => Code::Unavailable,
            TrafficError::ResourceExhausted { .. } => Code::ResourceExhausted,
            TrafficError::Store(_) => Code::Internal,
        }
    }

    /// Gate cause, if this is a gate rejection.
    pub fn unavailable_cause(&self) -> Option<UnavailableCause> {
        match self {
            TrafficError::Unavailable { cause } => Some(*cause),
            _ => None,
        }
    }

    /// Check if this error means "no backend to send to".
    pub fn is_no_candidate(&self) -> bool {
        matches!(self, TrafficError::NoCandidate)
    }

    /// Check if this error came from the rate limiter denying the key.
    pub fn is_resource_exhausted(&self) -> bool {
        matches!(self, TrafficError::ResourceExhausted { .. })
    }

    /// Check if this error maps to `Unavailable`.
    pub fn is_unavailable(&self) -> bool {
        self.code() == Code::Unavailable
    }
}

/// Recover the status code from a boxed middleware error.
///
/// Returns `None` when the error did not originate in this crate, e.g. an
/// inner service error passed through the rate-limit layer.
pub fn classify(err: &BoxError) -> Option<Code> {
    err.downcast_ref::<TrafficError>().map(TrafficError::code)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn gate_causes_share_one_message() {
        let open = TrafficError::unavailable(UnavailableCause::BreakerOpen);
        let failed = TrafficError::unavailable(UnavailableCause::OperationFailed);
        assert_eq!(open.to_string(), failed.to_string());
        assert_eq!(open.code(), failed.code());
        assert_ne!(open.unavailable_cause(), failed.unavailable_cause());
    }

    #[test]
    fn codes_map_to_statuses() {
        assert_eq!(TrafficError::NoCandidate.code(), Code::Unavailable);
        assert_eq!(
            TrafficError::ResourceExhausted { key: "10.0.0.1".into() }.code().http_status(),
            429
        );
        let store = TrafficError::Store(StoreError::Backend("connection refused".into()));
        assert_eq!(store.code(), Code::Internal);
        assert_eq!(store.code().as_str(), "internal");
        assert!(store.source().is_some());
    }

    #[test]
    fn resource_exhausted_message_hides_key() {
        let err = TrafficError::ResourceExhausted { key: "secret-token".into() };
        assert!(!err.to_string().contains("secret-token"));
        assert!(err.is_resource_exhausted());
    }

    #[test]
    fn classify_downcasts_boxed_errors() {
        let boxed: BoxError = Box::new(TrafficError::NoCandidate);
        assert_eq!(classify(&boxed), Some(Code::Unavailable));

        let foreign: BoxError = Box::new(std::io::Error::new(std::io::ErrorKind::Other, "x"));
        assert_eq!(classify(&foreign), None);
    }
}
