//! Track how each entity's rank moves between leaderboard refreshes.

use crate::clock::Clock;
use crate::expiry::ExpiryTimers;
use crate::{Movement, POSITION_CHANGE_WINDOW_SECS, RankedEntry, Scored};
use chrono::TimeDelta;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

/// The most recent rank movement seen for one entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PositionChange {
    pub unit_id: String,
    pub previous_rank: u32,
    pub current_rank: u32,
    pub movement: Movement,
    /// Set when the change is recorded, cleared once the display window passes.
    pub just_changed: bool,
}

/// Compares each ranking snapshot with the one before it.
///
/// The first time an id shows up it only becomes the baseline. After that,
/// every rank difference replaces the stored [`PositionChange`] for the id
/// and restarts its expiry. When the expiry passes, `just_changed` is cleared
/// but the record is kept.
///
/// Not reentrant: `observe` must be driven from a single loop.
pub struct PositionChangeTracker {
    clock: Arc<dyn Clock>,
    window: TimeDelta,
    previous_positions: HashMap<String, u32>,
    changes: HashMap<String, PositionChange>,
    timers: ExpiryTimers<String>,
    disposed: bool,
}

impl PositionChangeTracker {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self::with_window(clock, TimeDelta::seconds(POSITION_CHANGE_WINDOW_SECS))
    }

    pub fn with_window(clock: Arc<dyn Clock>, window: TimeDelta) -> Self {
        Self {
            clock,
            window,
            previous_positions: HashMap::new(),
            changes: HashMap::new(),
            timers: ExpiryTimers::new(),
            disposed: false,
        }
    }

    /// Feed a new ranking snapshot.
    pub fn observe<T: Scored>(&mut self, entries: &[RankedEntry<T>]) {
        if self.disposed {
            log::warn!("Ignoring snapshot of {} entries on a disposed tracker", entries.len());
            return;
        }

        // Expiries that came due before this snapshot apply first
        self.advance();

        // Duplicate ids collapse here, the last one wins
        let current_positions: HashMap<String, u32> = entries
            .iter()
            .map(|entry| (entry.entity.id().to_string(), entry.rank))
            .collect();

        let deadline = self.clock.now() + self.window;
        for (unit_id, current_rank) in &current_positions {
            let Some(previous_rank) = self.previous_positions.get(unit_id).copied() else {
                continue;
            };
            if previous_rank == *current_rank {
                continue;
            }

            let movement = Movement::between(previous_rank, *current_rank);
            log::debug!(
                "Unit {unit_id} moved {movement:?}: rank {previous_rank} -> {current_rank}"
            );
            self.changes.insert(
                unit_id.clone(),
                PositionChange {
                    unit_id: unit_id.clone(),
                    previous_rank,
                    current_rank: *current_rank,
                    movement,
                    just_changed: true,
                },
            );
            self.timers.schedule(unit_id.clone(), deadline);
        }

        self.previous_positions = current_positions;
    }

    /// Clear `just_changed` on every record whose window has passed.
    /// Returns how many records were cleared.
    pub fn advance(&mut self) -> usize {
        if self.disposed {
            return 0;
        }
        let expired = self.timers.drain_due(self.clock.now());
        for unit_id in &expired {
            if let Some(change) = self.changes.get_mut(unit_id) {
                change.just_changed = false;
                log::debug!("Position change for unit {unit_id} expired");
            }
        }
        expired.len()
    }

    /// The current change record for `unit_id`, if it has ever moved.
    ///
    /// A record whose window has passed reads as not just changed even if
    /// [`advance`](Self::advance) has not run yet.
    pub fn change_for(&self, unit_id: &str) -> Option<PositionChange> {
        let mut change = self.changes.get(unit_id)?.clone();
        if change.just_changed && self.timers.is_due(&change.unit_id, self.clock.now()) {
            change.just_changed = false;
        }
        Some(change)
    }

    /// Every retained change record, ordered by current rank.
    pub fn changes(&self) -> Vec<PositionChange> {
        let mut changes: Vec<PositionChange> = self
            .changes
            .keys()
            .filter_map(|unit_id| self.change_for(unit_id))
            .collect();
        changes.sort_by(|a, b| {
            a.current_rank
                .cmp(&b.current_rank)
                .then_with(|| a.unit_id.cmp(&b.unit_id))
        });
        changes
    }

    /// Ids whose change is still inside its display window, sorted.
    pub fn recently_changed(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .changes()
            .into_iter()
            .filter(|change| change.just_changed)
            .map(|change| change.unit_id)
            .collect();
        ids.sort();
        ids
    }

    /// The rank recorded for `unit_id` by the last snapshot.
    pub fn last_rank(&self, unit_id: &str) -> Option<u32> {
        self.previous_positions.get(unit_id).copied()
    }

    pub fn pending_expiries(&self) -> usize {
        self.timers.len()
    }

    /// Cancel all pending expiries. Records keep whatever flag they had and
    /// later snapshots are ignored.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        let cancelled = self.timers.cancel_all();
        self.disposed = true;
        log::debug!("Disposed position tracker, cancelled {cancelled} pending expiries");
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }
}
