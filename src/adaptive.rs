//! Live-updatable configuration handles.
//!
//! Readers on the request path take a lock-free snapshot; operators swap in a
//! new value without rebuilding the component that holds the handle.

use arc_swap::ArcSwap;
use std::sync::Arc;

/// Shared, swappable configuration value. Clones observe the same value.
#[derive(Debug)]
pub struct DynamicConfig<T> {
    inner: Arc<ArcSwap<T>>,
}

impl<T> Clone for DynamicConfig<T> {
    fn clone(&self) -> Self {
        Self { inner: self.inner.clone() }
    }
}

impl<T> DynamicConfig<T> {
    /// Wrap an initial value.
    pub fn new(value: T) -> Self {
        Self { inner: Arc::new(ArcSwap::from_pointee(value)) }
    }

    /// Snapshot the current value.
    pub fn get(&self) -> Arc<T> {
        self.inner.load_full()
    }

    /// Replace the value entirely.
    pub fn set(&self, value: T) {
        self.inner.store(Arc::new(value));
    }

    /// Derive the next value from the current one. Concurrent updates are
    /// retried, so `f` may run more than once.
    pub fn update<F>(&self, f: F)
    where
        F: Fn(&T) -> T,
    {
        self.inner.rcu(|current| f(current));
    }
}

#[cfg(test)]
mod tests {
    use super::DynamicConfig;

    #[test]
    fn get_set_update() {
        let cfg = DynamicConfig::new(1u32);
        let shared = cfg.clone();
        assert_eq!(*cfg.get(), 1);
        cfg.set(2);
        assert_eq!(*shared.get(), 2);
        shared.update(|v| v + 3);
        assert_eq!(*cfg.get(), 5);
    }

    #[test]
    fn snapshot_survives_replacement() {
        let cfg = DynamicConfig::new(String::from("old"));
        let snapshot = cfg.get();
        cfg.set(String::from("new"));
        assert_eq!(snapshot.as_str(), "old");
        assert_eq!(cfg.get().as_str(), "new");
    }
}
