//! Schedule propagation.
//!
//! A task's start date is either explicit or derived from its parent: the
//! child starts where the parent ends (parent start plus parent duration in
//! weeks). Whenever a start date or duration changes, the new date ripples
//! through the whole subtree in one pass.

use anyhow::{Context, Result};
use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};
use sqlx::{Postgres, Transaction};
use uuid::Uuid;

use joist_db::queries::tasks;

/// How a dependent task's start relates to its parent's end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StartConvention {
    /// Child starts on the parent's end date.
    #[default]
    OnParentEnd,
    /// Child starts the day after the parent's end date.
    DayAfterParentEnd,
}

impl StartConvention {
    /// Start date for a child of a task starting at `parent_start` and
    /// running `parent_duration_weeks` weeks.
    pub fn child_start(self, parent_start: NaiveDate, parent_duration_weeks: i32) -> NaiveDate {
        let end = end_date(parent_start, parent_duration_weeks);
        match self {
            StartConvention::OnParentEnd => end,
            StartConvention::DayAfterParentEnd => end + Days::new(1),
        }
    }
}

/// End date of a span of whole weeks.
pub fn end_date(start: NaiveDate, duration_weeks: i32) -> NaiveDate {
    start + chrono::Duration::weeks(i64::from(duration_weeks))
}

/// Set `root`'s start date and ripple the change through its descendants.
///
/// Walks the subtree iteratively; each visit writes the task's new start and
/// reads back its duration to derive the children's start. Runs inside the
/// caller's transaction so a failed propagation leaves no partial schedule.
/// Returns the number of tasks updated.
pub async fn propagate(
    tx: &mut Transaction<'_, Postgres>,
    root: Uuid,
    new_start: NaiveDate,
    convention: StartConvention,
) -> Result<u64> {
    let mut updated = 0u64;
    let mut worklist = vec![(root, new_start)];

    while let Some((task_id, start)) = worklist.pop() {
        let duration = tasks::set_start_date_returning_duration(&mut **tx, task_id, start)
            .await?
            .with_context(|| format!("task {task_id} disappeared during schedule propagation"))?;
        updated += 1;

        let child_start = convention.child_start(start, duration);
        for child_id in tasks::list_child_ids(&mut **tx, task_id).await? {
            worklist.push((child_id, child_start));
        }
    }

    tracing::debug!(root = %root, tasks = updated, "schedule propagated");
    Ok(updated)
}
