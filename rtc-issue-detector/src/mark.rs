//! Debounce and latch state kept by detectors per stream identity.
//!
//! Three flavours are used:
//!
//! - [`EdgeLatch`] - fires on the rising edge of a condition, re-arms when
//!   the condition is observed false
//! - [`DebounceMarks`] - fires once a condition has held for a timeout,
//!   then stays quiet until it clears
//! - [`ThrottleMarks`] - fires at most once per ttl while a condition holds

use std::collections::{HashMap, HashSet};
use std::hash::Hash;
use std::time::{Duration, Instant};

/// Fire-once latch per key.
#[derive(Debug)]
pub struct EdgeLatch<K> {
    active: HashSet<K>,
}

impl<K> Default for EdgeLatch<K> {
    fn default() -> Self {
        Self {
            active: HashSet::new(),
        }
    }
}

impl<K: Eq + Hash> EdgeLatch<K> {
    /// Records the condition for `key` and reports a rising edge.
    pub fn update(&mut self, key: K, active: bool) -> bool {
        if active {
            self.active.insert(key)
        } else {
            self.active.remove(&key);
            false
        }
    }

    pub fn is_active(&self, key: &K) -> bool {
        self.active.contains(key)
    }

    pub fn retain(&mut self, mut f: impl FnMut(&K) -> bool) {
        self.active.retain(|k| f(k));
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }
}

/// State of a [`DebounceMarks`] entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkState {
    /// Condition first observed at `since`, not reported yet.
    Suspected { since: Instant },
    /// Reported; stays quiet until the condition clears.
    Confirmed { since: Instant },
}

/// Requires a condition to persist for `timeout` before firing once.
#[derive(Debug)]
pub struct DebounceMarks<K> {
    timeout: Duration,
    marks: HashMap<K, MarkState>,
}

impl<K: Eq + Hash> DebounceMarks<K> {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            marks: HashMap::new(),
        }
    }

    /// Records that the condition holds for `key` at `now`. Returns true
    /// exactly once per onset, when it has held for at least the timeout.
    pub fn mark(&mut self, key: K, now: Instant) -> bool {
        match self.marks.get(&key).copied() {
            None => {
                self.marks.insert(key, MarkState::Suspected { since: now });
                false
            }
            Some(MarkState::Suspected { since }) => {
                if now.saturating_duration_since(since) >= self.timeout {
                    self.marks.insert(key, MarkState::Confirmed { since });
                    true
                } else {
                    false
                }
            }
            Some(MarkState::Confirmed { .. }) => false,
        }
    }

    /// Records that the condition no longer holds for `key`.
    pub fn clear(&mut self, key: &K) {
        self.marks.remove(key);
    }

    pub fn state(&self, key: &K) -> Option<MarkState> {
        self.marks.get(key).copied()
    }

    pub fn retain(&mut self, mut f: impl FnMut(&K) -> bool) {
        self.marks.retain(|k, _| f(k));
    }

    pub fn is_empty(&self) -> bool {
        self.marks.is_empty()
    }
}

/// Fires at most once per `ttl` while a condition persists.
#[derive(Debug)]
pub struct ThrottleMarks<K> {
    ttl: Duration,
    marked_at: HashMap<K, Instant>,
}

impl<K: Eq + Hash> ThrottleMarks<K> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            marked_at: HashMap::new(),
        }
    }

    /// Records that the condition holds for `key`. Returns true when the
    /// key was not reported within the last ttl.
    pub fn mark(&mut self, key: K, now: Instant) -> bool {
        let fire = match self.marked_at.get(&key) {
            Some(marked_at) => now.saturating_duration_since(*marked_at) > self.ttl,
            None => true,
        };
        if fire {
            self.marked_at.insert(key, now);
        }
        fire
    }

    pub fn clear(&mut self, key: &K) {
        self.marked_at.remove(key);
    }

    /// Drops marks not in `visited` that were set more than ttl ago.
    pub fn sweep(&mut self, now: Instant, visited: &HashSet<K>) {
        let ttl = self.ttl;
        self.marked_at.retain(|key, marked_at| {
            visited.contains(key) || now.saturating_duration_since(*marked_at) <= ttl
        });
    }

    pub fn contains(&self, key: &K) -> bool {
        self.marked_at.contains_key(key)
    }

    pub fn is_empty(&self) -> bool {
        self.marked_at.is_empty()
    }
}
