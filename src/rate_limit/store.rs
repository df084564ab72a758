use crate::error::StoreError;
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Outcome of one evaluate-and-record round trip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowVerdict {
    /// Whether an event was recorded.
    pub allowed: bool,
    /// Events in the window after the call (including the new one if recorded).
    pub in_window: u32,
}

/// Storage interface for sliding-window records.
///
/// Implementations own the per-key record (event timestamps plus expiry) and
/// must perform the whole evaluation as one atomic operation:
///
/// 1. `window_start = now - window`
/// 2. drop events for `key` at or before `window_start`
/// 3. `count` = remaining events
/// 4. if `count < threshold`: record an event at `now`, set the record's expiry
///    to `window`, answer allowed
/// 5. otherwise answer denied and record nothing
///
/// Splitting this into a read followed by a write breaks the threshold under
/// concurrency.
#[async_trait]
pub trait WindowStore: Send + Sync {
    /// Evaluate and, if under `threshold`, record an event for `key` at
    /// `now_millis` (Unix epoch milliseconds).
    async fn evaluate_window(
        &self,
        key: &str,
        window: Duration,
        threshold: u32,
        now_millis: u64,
    ) -> Result<WindowVerdict, StoreError>;
}

#[async_trait]
impl<S> WindowStore for Arc<S>
where
    S: WindowStore + ?Sized,
{
    async fn evaluate_window(
        &self,
        key: &str,
        window: Duration,
        threshold: u32,
        now_millis: u64,
    ) -> Result<WindowVerdict, StoreError> {
        (**self).evaluate_window(key, window, threshold, now_millis).await
    }
}

pub(crate) fn window_millis(window: Duration) -> u64 {
    u64::try_from(window.as_millis()).unwrap_or(u64::MAX)
}

#[derive(Debug, Default)]
struct Record {
    events: VecDeque<u64>,
    expires_at: u64,
}

/// Single-process window store.
///
/// Each evaluation runs under one lock, which makes it atomic for every
/// limiter sharing this store (clones share records). Limits are not
/// distributed across processes.
///
/// Records whose window has fully elapsed are swept during evaluation, at
/// most once per window length, so idle keys do not accumulate.
#[derive(Default, Clone, Debug)]
pub struct InMemoryWindowStore {
    state: Arc<Mutex<State>>,
}

#[derive(Debug, Default)]
struct State {
    records: HashMap<String, Record>,
    next_sweep_at: u64,
}

impl State {
    fn sweep(&mut self, now_millis: u64) -> usize {
        let before = self.records.len();
        self.records.retain(|_, record| record.expires_at > now_millis);
        before - self.records.len()
    }
}

impl InMemoryWindowStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of keys with a live record.
    pub fn len(&self) -> usize {
        self.lock().records.len()
    }

    /// Whether no key has a record.
    pub fn is_empty(&self) -> bool {
        self.lock().records.is_empty()
    }

    /// Drop records whose expiry is at or before `now_millis`. Returns how many
    /// were removed.
    pub fn purge_expired(&self, now_millis: u64) -> usize {
        self.lock().sweep(now_millis)
    }
}

#[async_trait]
impl WindowStore for InMemoryWindowStore {
    async fn evaluate_window(
        &self,
        key: &str,
        window: Duration,
        threshold: u32,
        now_millis: u64,
    ) -> Result<WindowVerdict, StoreError> {
        let window_ms = window_millis(window);

        let mut state = self.lock();
        if now_millis >= state.next_sweep_at {
            let swept = state.sweep(now_millis);
            if swept > 0 {
                tracing::trace!(swept, "dropped expired window records");
            }
            state.next_sweep_at = now_millis.saturating_add(window_ms);
        }

        let record = state.records.entry(key.to_owned()).or_default();
        // Before the first full window has elapsed nothing can be stale.
        if let Some(window_start) = now_millis.checked_sub(window_ms) {
            record.events.retain(|&at| at > window_start);
        }

        let count = u32::try_from(record.events.len()).unwrap_or(u32::MAX);
        if count < threshold {
            record.events.push_back(now_millis);
            record.expires_at = now_millis.saturating_add(window_ms);
            Ok(WindowVerdict { allowed: true, in_window: count + 1 })
        } else {
            Ok(WindowVerdict { allowed: false, in_window: count })
        }
    }
}
