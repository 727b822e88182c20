//! Keyed, cancellable deadlines.
//!
//! Each key holds at most one pending deadline. Scheduling again replaces the
//! old one, which is how a timer gets "cancelled and restarted". Nothing fires
//! on its own: the owner asks for due keys with [`ExpiryTimers::drain_due`]
//! from its own loop, so all state changes stay on one thread.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::hash::Hash;

#[derive(Debug, Clone)]
pub struct ExpiryTimers<K> {
    deadlines: HashMap<K, DateTime<Utc>>,
}

impl<K> Default for ExpiryTimers<K> {
    fn default() -> Self {
        Self {
            deadlines: HashMap::new(),
        }
    }
}

impl<K: Eq + Hash + Clone> ExpiryTimers<K> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the deadline for `key`. Returns the deadline it replaced, if any.
    pub fn schedule(&mut self, key: K, deadline: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.deadlines.insert(key, deadline)
    }

    /// Drop the pending deadline for `key`. Returns whether one existed.
    pub fn cancel(&mut self, key: &K) -> bool {
        self.deadlines.remove(key).is_some()
    }

    /// Drop every pending deadline. Returns how many were dropped.
    pub fn cancel_all(&mut self) -> usize {
        let count = self.deadlines.len();
        self.deadlines.clear();
        count
    }

    pub fn deadline(&self, key: &K) -> Option<DateTime<Utc>> {
        self.deadlines.get(key).copied()
    }

    /// Whether `key` has a deadline at or before `now`.
    pub fn is_due(&self, key: &K, now: DateTime<Utc>) -> bool {
        self.deadlines.get(key).is_some_and(|deadline| *deadline <= now)
    }

    /// Remove and return every key whose deadline is at or before `now`, earliest first.
    pub fn drain_due(&mut self, now: DateTime<Utc>) -> Vec<K> {
        let mut due: Vec<(K, DateTime<Utc>)> = self
            .deadlines
            .iter()
            .filter(|(_, deadline)| **deadline <= now)
            .map(|(key, deadline)| (key.clone(), *deadline))
            .collect();
        due.sort_by_key(|(_, deadline)| *deadline);

        for (key, _) in &due {
            self.deadlines.remove(key);
        }
        due.into_iter().map(|(key, _)| key).collect()
    }

    pub fn len(&self) -> usize {
        self.deadlines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.deadlines.is_empty()
    }
}
