//! Smooth weighted round-robin picker.

use super::candidate::Candidate;
use crate::error::TrafficError;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;

/// Outcome of a call made through a picked candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallOutcome {
    /// The backend answered successfully.
    Success,
    /// The call to the backend failed.
    Failure,
}

/// Receives call outcomes for picked candidates.
///
/// Scheduling never reads these: the picker decrements eagerly at selection
/// time. Implement this to feed an outcome-weighted policy of your own.
pub trait PickObserver: Send + Sync + std::fmt::Debug {
    /// Called once per completed call reported through [`Picked::done`].
    fn on_done(&self, _id: &str, _outcome: CallOutcome) {}
}

/// Observer that ignores outcomes. Default for [`WeightedPicker`].
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl PickObserver for NoopObserver {}

/// Completion hook detached from a [`Picked`].
#[derive(Debug)]
pub struct Completion {
    id: Arc<str>,
    observer: Arc<dyn PickObserver>,
}

impl Completion {
    /// Report how the call went.
    pub fn done(self, outcome: CallOutcome) {
        tracing::trace!(id = %self.id, ?outcome, "pick completed");
        self.observer.on_done(&self.id, outcome);
    }
}

/// The candidate chosen for one outbound call.
///
/// Owns a clone of the connection handle, so nothing here borrows from the
/// candidate set and a concurrent rebuild is never blocked by it.
#[derive(Debug)]
pub struct Picked<H> {
    handle: H,
    completion: Completion,
}

impl<H> Picked<H> {
    /// Id of the chosen candidate.
    pub fn id(&self) -> &str {
        &self.completion.id
    }

    /// Connection handle of the chosen candidate.
    pub fn handle(&self) -> &H {
        &self.handle
    }

    /// Split into the handle and its completion hook.
    pub fn into_parts(self) -> (H, Completion) {
        (self.handle, self.completion)
    }

    /// Report the call outcome, discarding the handle.
    pub fn done(self, outcome: CallOutcome) {
        self.completion.done(outcome);
    }
}

/// Scheduling state of one candidate, as seen by [`WeightedPicker::snapshot`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotState {
    /// Candidate id.
    pub id: String,
    /// Static weight.
    pub weight: u32,
    /// Accumulated current weight.
    pub current_weight: i64,
}

#[derive(Debug)]
struct Slot<H> {
    candidate: Candidate<H>,
    current_weight: i64,
}

#[derive(Debug)]
struct Schedule<H> {
    // Sorted by ascending id; selection keeps the first maximum, which is the
    // tie-break order.
    slots: Vec<Slot<H>>,
    total_weight: i64,
}

impl<H> Default for Schedule<H> {
    fn default() -> Self {
        Self { slots: Vec::new(), total_weight: 0 }
    }
}

/// Picks one backend per call using smooth weighted round robin.
///
/// Over any `total_weight` consecutive picks on an unchanged set, every
/// candidate is chosen exactly `weight` times, interleaved rather than in
/// bursts. `pick` and `rebuild` each run as one critical section under the
/// picker's lock; share the picker behind an `Arc`.
///
/// # Examples
/// ```
/// use meshgate::balancer::{Candidate, WeightedPicker};
///
/// let picker = WeightedPicker::new();
/// picker.rebuild(vec![
///     Candidate::new("a", "10.0.0.1:9000", 2).unwrap(),
///     Candidate::new("b", "10.0.0.2:9000", 1).unwrap(),
/// ]);
/// let picks: Vec<String> =
///     (0..3).map(|_| picker.pick().unwrap().id().to_string()).collect();
/// assert_eq!(picks, ["a", "a", "b"]);
/// ```
#[derive(Debug)]
pub struct WeightedPicker<H> {
    schedule: Mutex<Schedule<H>>,
    observer: Arc<dyn PickObserver>,
}

impl<H> Default for WeightedPicker<H> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H> WeightedPicker<H> {
    /// Create a picker with an empty candidate set.
    pub fn new() -> Self {
        Self { schedule: Mutex::new(Schedule::default()), observer: Arc::new(NoopObserver) }
    }

    /// Install an outcome observer.
    pub fn with_observer<O: PickObserver + 'static>(mut self, observer: O) -> Self {
        self.observer = Arc::new(observer);
        self
    }

    fn lock(&self) -> MutexGuard<'_, Schedule<H>> {
        // Nothing inside the critical sections can panic halfway through an
        // update, so a poisoned schedule is still consistent.
        self.schedule.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replace the candidate set wholesale.
    ///
    /// Every current weight restarts at the candidate's static weight; prior
    /// accounting is discarded. Duplicate ids keep the last occurrence.
    pub fn rebuild<I>(&self, candidates: I)
    where
        I: IntoIterator<Item = Candidate<H>>,
    {
        let mut by_id: BTreeMap<Arc<str>, Candidate<H>> = BTreeMap::new();
        for candidate in candidates {
            if let Some(previous) = by_id.insert(candidate.shared_id(), candidate) {
                tracing::warn!(id = previous.id(), "duplicate candidate id; keeping the last one");
            }
        }

        let slots: Vec<Slot<H>> = by_id
            .into_values()
            .map(|candidate| {
                let current_weight = i64::from(candidate.weight());
                Slot { candidate, current_weight }
            })
            .collect();
        let total_weight = slots.iter().map(|s| i64::from(s.candidate.weight())).sum();
        let count = slots.len();

        *self.lock() = Schedule { slots, total_weight };
        tracing::debug!(candidates = count, total_weight, "picker rebuilt");
    }

    /// Number of candidates in the current set.
    pub fn len(&self) -> usize {
        self.lock().slots.len()
    }

    /// Whether the current set is empty.
    pub fn is_empty(&self) -> bool {
        self.lock().slots.is_empty()
    }

    /// Sum of the static weights of the current set.
    pub fn total_weight(&self) -> i64 {
        self.lock().total_weight
    }

    /// Copy of the scheduling state, in tie-break order.
    pub fn snapshot(&self) -> Vec<SlotState> {
        self.lock()
            .slots
            .iter()
            .map(|slot| SlotState {
                id: slot.candidate.id().to_string(),
                weight: slot.candidate.weight(),
                current_weight: slot.current_weight,
            })
            .collect()
    }
}

impl<H: Clone> WeightedPicker<H> {
    /// Choose the candidate for the next call.
    ///
    /// Returns [`TrafficError::NoCandidate`] when the set is empty; that is the
    /// only failure.
    pub fn pick(&self) -> Result<Picked<H>, TrafficError> {
        let mut schedule = self.lock();
        let total_weight = schedule.total_weight;

        let mut best: Option<(usize, i64)> = None;
        for (idx, slot) in schedule.slots.iter_mut().enumerate() {
            slot.current_weight += i64::from(slot.candidate.weight());
            // Strictly greater: the earliest (lowest id) maximum wins ties.
            if best.map_or(true, |(_, max)| slot.current_weight > max) {
                best = Some((idx, slot.current_weight));
            }
        }
        let (chosen, _) = best.ok_or(TrafficError::NoCandidate)?;

        let slot = &mut schedule.slots[chosen];
        slot.current_weight -= total_weight;
        Ok(Picked {
            handle: slot.candidate.handle().clone(),
            completion: Completion { id: slot.candidate.shared_id(), observer: self.observer.clone() },
        })
    }

    /// Rebuild from a discovery feed until the sender side is dropped.
    ///
    /// The current value is installed immediately, then every published
    /// membership change replaces the set.
    pub async fn follow(&self, mut updates: watch::Receiver<Vec<Candidate<H>>>) {
        let initial = updates.borrow_and_update().clone();
        self.rebuild(initial);
        while updates.changed().await.is_ok() {
            let next = updates.borrow_and_update().clone();
            self.rebuild(next);
        }
        tracing::debug!("discovery feed closed; keeping the last candidate set");
    }
}
