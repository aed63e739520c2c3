//! Database query functions for the `tasks` table.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use sqlx::PgExecutor;
use uuid::Uuid;

use crate::models::{ANCHOR_TASK_NAME, Task, TaskStatus};

/// Fields for a new task row.
#[derive(Debug, Clone)]
pub struct NewTask<'a> {
    pub project_id: Uuid,
    pub parent_task_id: Option<Uuid>,
    pub name: &'a str,
    pub description: &'a str,
    pub start_date: Option<NaiveDate>,
    pub duration: i32,
    pub budget: Option<f64>,
    pub fixed_budget: bool,
}

/// Insert a new task row. Returns the inserted task with server-generated
/// defaults (id, status, created_at).
pub async fn insert_task<'e, E: PgExecutor<'e>>(ex: E, new: &NewTask<'_>) -> Result<Task> {
    let task = sqlx::query_as::<_, Task>(
        "INSERT INTO tasks \
           (project_id, parent_task_id, name, description, start_date, duration, budget, fixed_budget) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
         RETURNING *",
    )
    .bind(new.project_id)
    .bind(new.parent_task_id)
    .bind(new.name)
    .bind(new.description)
    .bind(new.start_date)
    .bind(new.duration)
    .bind(new.budget)
    .bind(new.fixed_budget)
    .fetch_one(ex)
    .await
    .context("failed to insert task")?;

    Ok(task)
}

/// Fetch a single task by ID.
pub async fn get_task<'e, E: PgExecutor<'e>>(ex: E, id: Uuid) -> Result<Option<Task>> {
    let task = sqlx::query_as::<_, Task>("SELECT * FROM tasks WHERE id = $1")
        .bind(id)
        .fetch_optional(ex)
        .await
        .context("failed to fetch task")?;

    Ok(task)
}

/// Fetch a task by ID with a row lock, for rollup maintenance inside a
/// lifecycle transaction.
pub async fn get_task_for_update<'e, E: PgExecutor<'e>>(ex: E, id: Uuid) -> Result<Option<Task>> {
    let task = sqlx::query_as::<_, Task>("SELECT * FROM tasks WHERE id = $1 FOR UPDATE")
        .bind(id)
        .fetch_optional(ex)
        .await
        .context("failed to lock task row")?;

    Ok(task)
}

/// List all tasks for a project, ordered by creation time.
pub async fn list_tasks_for_project<'e, E: PgExecutor<'e>>(
    ex: E,
    project_id: Uuid,
) -> Result<Vec<Task>> {
    let tasks = sqlx::query_as::<_, Task>(
        "SELECT * FROM tasks WHERE project_id = $1 ORDER BY created_at ASC",
    )
    .bind(project_id)
    .fetch_all(ex)
    .await
    .context("failed to list tasks for project")?;

    Ok(tasks)
}

/// Fetch the project's anchor task (reserved name, no parent).
pub async fn get_anchor_task<'e, E: PgExecutor<'e>>(
    ex: E,
    project_id: Uuid,
) -> Result<Option<Task>> {
    let task = sqlx::query_as::<_, Task>(
        "SELECT * FROM tasks \
         WHERE project_id = $1 AND parent_task_id IS NULL AND name = $2",
    )
    .bind(project_id)
    .bind(ANCHOR_TASK_NAME)
    .fetch_optional(ex)
    .await
    .context("failed to fetch anchor task")?;

    Ok(task)
}

/// IDs of a task's direct children.
pub async fn list_child_ids<'e, E: PgExecutor<'e>>(ex: E, task_id: Uuid) -> Result<Vec<Uuid>> {
    let rows: Vec<(Uuid,)> = sqlx::query_as("SELECT id FROM tasks WHERE parent_task_id = $1")
        .bind(task_id)
        .fetch_all(ex)
        .await
        .context("failed to list child task ids")?;

    Ok(rows.into_iter().map(|(id,)| id).collect())
}

/// Overwrite the editable fields of a task.
#[allow(clippy::too_many_arguments)]
pub async fn update_task<'e, E: PgExecutor<'e>>(
    ex: E,
    id: Uuid,
    name: &str,
    description: &str,
    parent_task_id: Option<Uuid>,
    start_date: Option<NaiveDate>,
    duration: i32,
    status: TaskStatus,
    budget: Option<f64>,
    fixed_budget: bool,
) -> Result<u64> {
    let result = sqlx::query(
        "UPDATE tasks \
         SET name = $1, description = $2, parent_task_id = $3, start_date = $4, \
             duration = $5, status = $6, budget = $7, fixed_budget = $8 \
         WHERE id = $9",
    )
    .bind(name)
    .bind(description)
    .bind(parent_task_id)
    .bind(start_date)
    .bind(duration)
    .bind(status)
    .bind(budget)
    .bind(fixed_budget)
    .bind(id)
    .execute(ex)
    .await
    .context("failed to update task")?;

    Ok(result.rows_affected())
}

/// Set a task's start date, returning its duration (weeks) so the schedule
/// propagator can derive its children's dates without a second read.
pub async fn set_start_date_returning_duration<'e, E: PgExecutor<'e>>(
    ex: E,
    id: Uuid,
    start_date: NaiveDate,
) -> Result<Option<i32>> {
    let row: Option<(i32,)> =
        sqlx::query_as("UPDATE tasks SET start_date = $1 WHERE id = $2 RETURNING duration")
            .bind(start_date)
            .bind(id)
            .fetch_optional(ex)
            .await
            .context("failed to set task start date")?;

    Ok(row.map(|(d,)| d))
}

/// Adjust a task's rollup budget by a delta. Only valid for tasks whose
/// budget is computed, never fixed.
pub async fn adjust_task_budget<'e, E: PgExecutor<'e>>(ex: E, id: Uuid, delta: f64) -> Result<u64> {
    let result = sqlx::query("UPDATE tasks SET budget = COALESCE(budget, 0) + $1 WHERE id = $2")
        .bind(delta)
        .bind(id)
        .execute(ex)
        .await
        .context("failed to adjust task budget")?;

    Ok(result.rows_affected())
}

/// Sum of task budgets for a project (nulls count as zero).
pub async fn sum_budgets_for_project<'e, E: PgExecutor<'e>>(
    ex: E,
    project_id: Uuid,
) -> Result<f64> {
    let row: (f64,) = sqlx::query_as(
        "SELECT COALESCE(SUM(budget), 0)::double precision FROM tasks WHERE project_id = $1",
    )
    .bind(project_id)
    .fetch_one(ex)
    .await
    .context("failed to sum task budgets")?;

    Ok(row.0)
}

/// Sum of task durations (weeks) for a project.
pub async fn sum_durations_for_project<'e, E: PgExecutor<'e>>(
    ex: E,
    project_id: Uuid,
) -> Result<i64> {
    let row: (i64,) =
        sqlx::query_as("SELECT COALESCE(SUM(duration), 0) FROM tasks WHERE project_id = $1")
            .bind(project_id)
            .fetch_one(ex)
            .await
            .context("failed to sum task durations")?;

    Ok(row.0)
}

/// Budget and duration totals over a task's whole subtree (the task itself
/// plus every descendant).
///
/// Used when deleting a task: the cascade removes the subtree, and the
/// project's computed rollups must drop by these totals.
pub async fn subtree_totals<'e, E: PgExecutor<'e>>(ex: E, task_id: Uuid) -> Result<(f64, i64)> {
    let row: (f64, i64) = sqlx::query_as(
        "WITH RECURSIVE subtree AS ( \
             SELECT id, budget, duration FROM tasks WHERE id = $1 \
             UNION ALL \
             SELECT t.id, t.budget, t.duration \
             FROM tasks t JOIN subtree s ON t.parent_task_id = s.id \
         ) \
         SELECT COALESCE(SUM(budget), 0)::double precision, COALESCE(SUM(duration), 0) \
         FROM subtree",
    )
    .bind(task_id)
    .fetch_one(ex)
    .await
    .context("failed to compute subtree totals")?;

    Ok(row)
}

/// Is `candidate` the root of, or anywhere inside, the subtree under
/// `root`? Re-parenting a task onto its own subtree would create a cycle,
/// so lifecycle edits check this before accepting a new parent.
pub async fn is_in_subtree<'e, E: PgExecutor<'e>>(
    ex: E,
    root: Uuid,
    candidate: Uuid,
) -> Result<bool> {
    let row: (bool,) = sqlx::query_as(
        "WITH RECURSIVE subtree AS ( \
             SELECT id FROM tasks WHERE id = $1 \
             UNION ALL \
             SELECT t.id FROM tasks t JOIN subtree s ON t.parent_task_id = s.id \
         ) \
         SELECT EXISTS (SELECT 1 FROM subtree WHERE id = $2)",
    )
    .bind(root)
    .bind(candidate)
    .fetch_one(ex)
    .await
    .context("failed to check subtree membership")?;

    Ok(row.0)
}

/// Delete a task row. Its descendants and their materials go with it via
/// `ON DELETE CASCADE`.
pub async fn delete_task<'e, E: PgExecutor<'e>>(ex: E, id: Uuid) -> Result<u64> {
    let result = sqlx::query("DELETE FROM tasks WHERE id = $1")
        .bind(id)
        .execute(ex)
        .await
        .context("failed to delete task")?;

    Ok(result.rows_affected())
}
