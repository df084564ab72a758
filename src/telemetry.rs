//! Telemetry for admission decisions.
//!
//! The rate limiter and the breaker gate describe each decision as a
//! [`TrafficEvent`] and hand it to a [`TelemetrySink`]. Sinks are plain
//! `tower::Service<TrafficEvent>` implementations, so they compose with
//! ordinary tower combinators.
//!
//! ```rust
//! use meshgate::telemetry::{GateEvent, TrafficEvent};
//! use meshgate::UnavailableCause;
//!
//! let event = TrafficEvent::Gate(GateEvent::Rejected { cause: UnavailableCause::BreakerOpen });
//! assert_eq!(event.to_string(), "gate rejected (breaker_open)");
//! ```

pub mod events;
pub mod sinks;

#[cfg(feature = "telemetry-json")]
pub use events::event_to_json;
pub use events::{GateEvent, RateLimitEvent, TrafficEvent};
pub use sinks::{emit_best_effort, LogSink, MemorySink, NullSink, TelemetrySink};
