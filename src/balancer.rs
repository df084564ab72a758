//! Outbound backend selection.
//!
//! - [`Candidate`]: a backend replica with its connection handle and weight.
//! - [`WeightedPicker`]: smooth weighted round robin over the current set.
//! - [`Balance`]: tower `Service` routing each call through a picker.
//!
//! The picker owns the candidate set. Discovery replaces the set wholesale
//! ([`WeightedPicker::rebuild`]); a pick hands out a clone of the chosen
//! handle, never a reference into the set.

pub mod candidate;
pub mod picker;
pub mod service;

pub use candidate::{Candidate, CandidateError, DEFAULT_WEIGHT, WEIGHT_METADATA_KEY};
pub use picker::{CallOutcome, Completion, NoopObserver, PickObserver, Picked, SlotState, WeightedPicker};
pub use service::Balance;
