//! Plain-text rendering of the leaderboard and task board.

use scoreboard_common::position_tracker::PositionChangeTracker;
use scoreboard_common::task_visibility::TaskPartition;
use scoreboard_common::{Movement, RankedEntry, TaskRecord, UnitRecord};
use std::fmt::Write;

/// Marker shown next to a unit while its last move is fresh.
fn movement_marker(tracker: &PositionChangeTracker, unit_id: &str) -> &'static str {
    match tracker.change_for(unit_id) {
        Some(change) if change.just_changed => match change.movement {
            Movement::Up => "▲",
            Movement::Down => "▼",
            Movement::Same => "=",
        },
        _ => " ",
    }
}

pub fn format_leaderboard(entries: &[RankedEntry<UnitRecord>], tracker: &PositionChangeTracker) -> String {
    let name_width = entries
        .iter()
        .map(|entry| entry.entity.name.chars().count())
        .max()
        .unwrap_or(0)
        .max(4);

    let mut out = String::new();
    let _ = writeln!(out, "  #  {:<name_width$}  score", "unit");
    for entry in entries {
        let _ = writeln!(
            out,
            "{} {:>2}  {:<name_width$}  {:>5}",
            movement_marker(tracker, &entry.entity.id),
            entry.rank,
            entry.entity.name,
            entry.entity.score
        );
    }
    out
}

fn format_task_line(out: &mut String, task: &TaskRecord) {
    let difficulty = task.difficulty.map(|d| format!(" [{d}]")).unwrap_or_default();
    let category = task
        .category
        .as_deref()
        .map(|c| format!(" ({c})"))
        .unwrap_or_default();
    let _ = writeln!(
        out,
        "  - {} ({} pts){difficulty}{category}, due {}",
        task.title,
        task.points,
        task.deadline.format("%Y-%m-%d %H:%M")
    );
}

pub fn format_task_board(board: &TaskPartition) -> String {
    let mut out = String::new();
    for (heading, tasks) in [
        ("Available", &board.available),
        ("Pending review", &board.pending),
        ("Completed", &board.completed),
    ] {
        let _ = writeln!(out, "{heading} ({}):", tasks.len());
        if tasks.is_empty() {
            let _ = writeln!(out, "  (none)");
        }
        for task in tasks {
            format_task_line(&mut out, task);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeDelta, Utc};
    use scoreboard_common::clock::ManualClock;
    use scoreboard_common::ranking::resolve;
    use scoreboard_common::{Difficulty, TaskStatus};
    use std::sync::Arc;

    fn unit(id: &str, name: &str, score: u32) -> UnitRecord {
        UnitRecord {
            id: id.to_string(),
            name: name.to_string(),
            score,
        }
    }

    #[test_log::test]
    fn test_leaderboard_shows_fresh_movement() {
        let clock = ManualClock::default();
        let mut tracker = PositionChangeTracker::new(Arc::new(clock.clone()));

        tracker.observe(&resolve(&[unit("a", "Eagles", 10), unit("b", "Wolves", 5)]));
        let ranked = resolve(&[unit("a", "Eagles", 10), unit("b", "Wolves", 15)]);
        tracker.observe(&ranked);

        let text = format_leaderboard(&ranked, &tracker);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[1], "▲  1  Wolves     15");
        assert_eq!(lines[2], "▼  2  Eagles     10");

        clock.advance(TimeDelta::seconds(3));
        let text = format_leaderboard(&ranked, &tracker);
        assert!(!text.contains('▲'));
    }

    #[test_log::test]
    fn test_task_board_sections() {
        let task = TaskRecord {
            id: "t1".to_string(),
            title: "Build a shelter".to_string(),
            description: None,
            points: 25,
            deadline: DateTime::<Utc>::UNIX_EPOCH + TimeDelta::days(1),
            status: TaskStatus::Active,
            difficulty: Some(Difficulty::VeryHard),
            category: Some("outdoors".to_string()),
            target_units: None,
        };
        let board = TaskPartition {
            available: vec![task],
            pending: Vec::new(),
            completed: Vec::new(),
        };

        let text = format_task_board(&board);

        assert!(text.contains("Available (1):"));
        assert!(text.contains("  - Build a shelter (25 pts) [very hard] (outdoors), due 1970-01-02 00:00"));
        assert!(text.contains("Pending review (0):\n  (none)"));
    }
}
