//! Fixed-window counter storage
//!
//! Time is passed in as a `Duration` since the Unix epoch so the window math
//! can be driven deterministically from tests.

use std::time::Duration;

use dashmap::DashMap;

/// Composite key: one counter per identity per window.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WindowKey {
    pub identity: String,
    pub index: u64,
}

impl WindowKey {
    pub fn new(identity: impl Into<String>, index: u64) -> Self {
        Self {
            identity: identity.into(),
            index,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowEntry {
    pub count: u32,
    /// End of the key's window. The entry is dead once `now >= reset_at`.
    pub reset_at: Duration,
}

impl WindowEntry {
    pub fn is_expired(&self, now: Duration) -> bool {
        now >= self.reset_at
    }
}

/// Result of presenting one request to a counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hit {
    /// Admitted; `count` includes this request.
    Counted { count: u32 },
    /// Limit already reached; the count was left unchanged.
    Exhausted { reset_at: Duration },
}

/// Storage for per-key window counters.
///
/// `hit` must be atomic per key: two concurrent hits on the same key never
/// both observe `count < limit` when only one slot remains.
pub trait CounterStore: Send + Sync {
    /// Create the entry if absent, then increment unless it reached `limit`.
    fn hit(&self, key: WindowKey, limit: u32, reset_at: Duration) -> Hit;

    /// Remove every entry dead at `now`; returns how many were removed.
    fn sweep(&self, now: Duration) -> usize;

    /// Number of physically present entries, dead or alive.
    fn tracked(&self) -> usize;

    fn count(&self, key: &WindowKey) -> Option<u32>;
}

/// Process-local counters on a sharded concurrent map.
#[derive(Debug, Default)]
pub struct InMemoryCounterStore {
    entries: DashMap<WindowKey, WindowEntry>,
}

impl InMemoryCounterStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CounterStore for InMemoryCounterStore {
    fn hit(&self, key: WindowKey, limit: u32, reset_at: Duration) -> Hit {
        // The entry guard holds the shard lock until it drops
        let mut entry = self
            .entries
            .entry(key)
            .or_insert(WindowEntry { count: 0, reset_at });

        if entry.count >= limit {
            return Hit::Exhausted {
                reset_at: entry.reset_at,
            };
        }
        entry.count += 1;
        Hit::Counted { count: entry.count }
    }

    fn sweep(&self, now: Duration) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        before.saturating_sub(self.entries.len())
    }

    fn tracked(&self) -> usize {
        self.entries.len()
    }

    fn count(&self, key: &WindowKey) -> Option<u32> {
        self.entries.get(key).map(|e| e.count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    const RESET: Duration = Duration::from_secs(60);

    #[test]
    fn first_hit_creates_entry() {
        let store = InMemoryCounterStore::new();
        let key = WindowKey::new("10.0.0.1", 0);

        assert_eq!(store.hit(key.clone(), 3, RESET), Hit::Counted { count: 1 });
        assert_eq!(store.count(&key), Some(1));
        assert_eq!(store.tracked(), 1);
    }

    #[test]
    fn count_freezes_at_limit() {
        let store = InMemoryCounterStore::new();
        let key = WindowKey::new("10.0.0.1", 0);

        for _ in 0..3 {
            store.hit(key.clone(), 3, RESET);
        }
        for _ in 0..5 {
            assert_eq!(
                store.hit(key.clone(), 3, RESET),
                Hit::Exhausted { reset_at: RESET }
            );
        }
        assert_eq!(store.count(&key), Some(3));
    }

    #[test]
    fn keys_are_independent() {
        let store = InMemoryCounterStore::new();
        store.hit(WindowKey::new("a", 0), 1, RESET);

        assert_eq!(
            store.hit(WindowKey::new("b", 0), 1, RESET),
            Hit::Counted { count: 1 }
        );
        assert_eq!(
            store.hit(WindowKey::new("a", 1), 1, RESET * 2),
            Hit::Counted { count: 1 }
        );
    }

    #[test]
    fn sweep_removes_only_dead_entries() {
        let store = InMemoryCounterStore::new();
        store.hit(WindowKey::new("old", 0), 10, RESET);
        store.hit(WindowKey::new("new", 1), 10, RESET * 2);

        assert_eq!(store.sweep(RESET - Duration::from_millis(1)), 0);
        assert_eq!(store.sweep(RESET), 1, "entry is dead exactly at reset");
        assert_eq!(store.tracked(), 1);
        assert!(store.count(&WindowKey::new("old", 0)).is_none());
    }

    #[test]
    fn concurrent_hits_never_exceed_limit() {
        let store = Arc::new(InMemoryCounterStore::new());
        let key = WindowKey::new("10.0.0.9", 0);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                let key = key.clone();
                std::thread::spawn(move || {
                    (0..50)
                        .filter(|_| matches!(store.hit(key.clone(), 100, RESET), Hit::Counted { .. }))
                        .count()
                })
            })
            .collect();

        let admitted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(admitted, 100);
        assert_eq!(store.count(&key), Some(100));
    }
}
