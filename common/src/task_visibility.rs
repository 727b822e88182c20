//! Decide which tasks a unit can see and where each one belongs on its task board.

use crate::{ARCHIVED_DEADLINE, SubmissionRecord, SubmissionStatus, TaskRecord, TaskStatus};
use anyhow::{Result, bail};
use chrono::{DateTime, Utc};
use itertools::Itertools;
use serde::Serialize;
use std::collections::HashSet;

/// A unit's task board.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TaskPartition {
    /// Tasks the unit can still submit.
    pub available: Vec<TaskRecord>,
    /// Tasks waiting for an admin decision.
    pub pending: Vec<TaskRecord>,
    /// Tasks the unit completed, including ones archived since.
    pub completed: Vec<TaskRecord>,
}

/// Whether `unit_id` is allowed to see `task`. No targets means everyone.
pub fn is_available(task: &TaskRecord, unit_id: &str) -> bool {
    match &task.target_units {
        None => true,
        Some(targets) if targets.is_empty() => true,
        Some(targets) => targets.iter().any(|target| target == unit_id),
    }
}

pub fn is_archived(task: &TaskRecord) -> bool {
    task.deadline == ARCHIVED_DEADLINE
}

/// Whether the task is still running at `now`.
pub fn is_open(task: &TaskRecord, now: DateTime<Utc>) -> bool {
    !is_archived(task) && task.status == TaskStatus::Active && task.deadline > now
}

/// Split `tasks` into the three groups of a unit's board.
///
/// Only submissions made by `unit_id` count. A task with both a pending and
/// a completed submission only counts as completed. Rejected submissions are
/// ignored, so a rejected task shows up as available again.
pub fn partition(tasks: &[TaskRecord], submissions: &[SubmissionRecord], unit_id: &str) -> TaskPartition {
    let completed_ids = task_ids_with_status(submissions, unit_id, SubmissionStatus::Completed);
    let pending_ids: HashSet<&str> = task_ids_with_status(submissions, unit_id, SubmissionStatus::Pending)
        .difference(&completed_ids)
        .copied()
        .collect();

    let mut board = TaskPartition::default();
    for task in tasks {
        let id = task.id.as_str();
        if completed_ids.contains(id) {
            board.completed.push(task.clone());
        } else if is_archived(task) {
            continue;
        } else if pending_ids.contains(id) {
            board.pending.push(task.clone());
        } else if is_available(task, unit_id) {
            board.available.push(task.clone());
        }
    }

    log::debug!(
        "Task board for unit {unit_id}: {} available, {} pending, {} completed",
        board.available.len(),
        board.pending.len(),
        board.completed.len()
    );
    board
}

fn task_ids_with_status<'a>(
    submissions: &'a [SubmissionRecord],
    unit_id: &str,
    status: SubmissionStatus,
) -> HashSet<&'a str> {
    submissions
        .iter()
        .filter(|sub| sub.unit_id == unit_id && sub.status == status)
        .map(|sub| sub.task_id.as_str())
        .collect()
}

/// Ids of completed tasks that are missing from `active_tasks`.
/// Those were archived and have to be fetched by id to show the unit's history.
pub fn archived_ids_to_fetch(active_tasks: &[TaskRecord], submissions: &[SubmissionRecord]) -> Vec<String> {
    let known: HashSet<&str> = active_tasks.iter().map(|task| task.id.as_str()).collect();
    submissions
        .iter()
        .filter(|sub| sub.status == SubmissionStatus::Completed)
        .map(|sub| sub.task_id.as_str())
        .filter(|task_id| !known.contains(task_id))
        .unique()
        .map(str::to_string)
        .collect()
}

/// Check that `unit_id` may submit `task` given its existing submissions.
///
/// A unit gets one live submission per task: a pending or completed one
/// blocks another, a rejected one does not.
///
/// # Errors
/// Returns an error if the task is archived, not visible to the unit, or
/// already has a pending or completed submission from it.
pub fn check_new_submission(
    task: &TaskRecord,
    unit_id: &str,
    submissions: &[SubmissionRecord],
) -> Result<()> {
    if is_archived(task) {
        bail!("Task {} is archived and no longer accepts submissions", task.id);
    }
    if !is_available(task, unit_id) {
        bail!("Task {} is not assigned to unit {unit_id}", task.id);
    }
    if let Some(existing) = submissions.iter().find(|sub| {
        sub.task_id == task.id && sub.unit_id == unit_id && sub.status != SubmissionStatus::Rejected
    }) {
        bail!(
            "Unit {unit_id} already has a {:?} submission ({}) for task {}",
            existing.status,
            existing.id,
            task.id
        );
    }
    Ok(())
}
