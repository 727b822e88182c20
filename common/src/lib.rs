//! A library with common utilities for the unit scoreboard.

pub mod clock;
#[cfg(feature = "network")]
pub mod client_api_sync;
pub mod expiry;
pub mod position_tracker;
pub mod ranking;
pub mod session;
pub mod task_visibility;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

pub const CLIENT_VERSION: &str = env!("CARGO_PKG_VERSION");

/// How long a rank movement stays flagged as "just changed".
pub const POSITION_CHANGE_WINDOW_SECS: i64 = 3;

/// How long a stored login stays valid.
pub const SESSION_DURATION_HOURS: i64 = 24;

/// Timeout for each individual request to the data service.
pub const CLIENT_REQUEST_TIMEOUT_SECS: u64 = 10;

/// Tasks soft-deleted after an approved submission carry this deadline.
/// They stay in the table so completed history can still reference them.
pub const ARCHIVED_DEADLINE: DateTime<Utc> = DateTime::<Utc>::UNIX_EPOCH;

/// Anything that can be placed on the leaderboard.
pub trait Scored {
    fn id(&self) -> &str;
    fn score(&self) -> u32;
}

/// The minimal ranking input: an opaque id and its score.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScoredEntity {
    pub id: String,
    pub score: u32,
}

impl ScoredEntity {
    pub fn new(id: impl Into<String>, score: u32) -> Self {
        Self {
            id: id.into(),
            score,
        }
    }
}

impl Scored for ScoredEntity {
    fn id(&self) -> &str {
        &self.id
    }
    fn score(&self) -> u32 {
        self.score
    }
}

/// A row from the `units` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitRecord {
    pub id: String,
    pub name: String,
    pub score: u32,
}

impl Scored for UnitRecord {
    fn id(&self) -> &str {
        &self.id
    }
    fn score(&self) -> u32 {
        self.score
    }
}

/// An entity with its 1-based competition rank.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RankedEntry<T = ScoredEntity> {
    pub entity: T,
    pub rank: u32,
}

/// Which way an entity moved on the board.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Movement {
    Up,
    Down,
    Same,
}

impl Movement {
    /// Lower rank numbers are better, so going from 3 to 1 is `Up`.
    #[must_use]
    pub fn between(previous_rank: u32, current_rank: u32) -> Self {
        match current_rank.cmp(&previous_rank) {
            std::cmp::Ordering::Less => Movement::Up,
            std::cmp::Ordering::Greater => Movement::Down,
            std::cmp::Ordering::Equal => Movement::Same,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Active,
    Expired,
}

/// Task difficulty, ordered from easiest to hardest.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
    VeryHard,
    Legendary,
}

impl Difficulty {
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
            Difficulty::VeryHard => "very hard",
            Difficulty::Legendary => "legendary",
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A row from the `tasks` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub points: u32,
    pub deadline: DateTime<Utc>,
    pub status: TaskStatus,
    #[serde(default)]
    pub difficulty: Option<Difficulty>,
    #[serde(default)]
    pub category: Option<String>,
    /// `None` or empty means every unit can see the task.
    #[serde(default)]
    pub target_units: Option<Vec<String>>,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionStatus {
    Pending,
    Completed,
    Rejected,
}

/// A row from the `task_submissions` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionRecord {
    pub id: String,
    pub task_id: String,
    pub unit_id: String,
    pub status: SubmissionStatus,
    pub submitted_at: DateTime<Utc>,
    #[serde(default)]
    pub proof_url: Option<String>,
    #[serde(default)]
    pub admin_feedback: Option<String>,
}

/// The body sent when a unit submits a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewSubmission {
    pub task_id: String,
    pub unit_id: String,
    pub proof_url: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test_log::test]
    fn test_movement_between() {
        assert_eq!(Movement::between(3, 1), Movement::Up);
        assert_eq!(Movement::between(1, 3), Movement::Down);
        assert_eq!(Movement::between(2, 2), Movement::Same);
    }
}
