//! Database query functions for the `projects` table.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use sqlx::PgExecutor;
use uuid::Uuid;

use crate::models::Project;

/// Fields for a new project row.
#[derive(Debug, Clone)]
pub struct NewProject<'a> {
    pub name: &'a str,
    pub description: &'a str,
    pub start_date: Option<NaiveDate>,
    pub duration: Option<i32>,
    pub budget: Option<f64>,
    pub fixed_budget: bool,
    pub fixed_duration: bool,
    pub created_by: Uuid,
}

/// Insert a new project row. Returns the inserted project with
/// server-generated defaults (id, is_ongoing, created_at).
pub async fn insert_project<'e, E: PgExecutor<'e>>(ex: E, new: &NewProject<'_>) -> Result<Project> {
    let project = sqlx::query_as::<_, Project>(
        "INSERT INTO projects \
           (name, description, start_date, duration, budget, fixed_budget, fixed_duration, created_by) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
         RETURNING *",
    )
    .bind(new.name)
    .bind(new.description)
    .bind(new.start_date)
    .bind(new.duration)
    .bind(new.budget)
    .bind(new.fixed_budget)
    .bind(new.fixed_duration)
    .bind(new.created_by)
    .fetch_one(ex)
    .await
    .context("failed to insert project")?;

    Ok(project)
}

/// Fetch a project by its ID.
pub async fn get_project<'e, E: PgExecutor<'e>>(ex: E, id: Uuid) -> Result<Option<Project>> {
    let project = sqlx::query_as::<_, Project>("SELECT * FROM projects WHERE id = $1")
        .bind(id)
        .fetch_optional(ex)
        .await
        .context("failed to fetch project")?;

    Ok(project)
}

/// Fetch a project by ID with a row lock.
///
/// Used inside lifecycle transactions so that concurrent edits racing on the
/// same project's rollups serialize instead of losing updates.
pub async fn get_project_for_update<'e, E: PgExecutor<'e>>(
    ex: E,
    id: Uuid,
) -> Result<Option<Project>> {
    let project = sqlx::query_as::<_, Project>("SELECT * FROM projects WHERE id = $1 FOR UPDATE")
        .bind(id)
        .fetch_optional(ex)
        .await
        .context("failed to lock project row")?;

    Ok(project)
}

/// List every project, newest first.
pub async fn list_projects<'e, E: PgExecutor<'e>>(ex: E) -> Result<Vec<Project>> {
    let projects =
        sqlx::query_as::<_, Project>("SELECT * FROM projects ORDER BY created_at DESC")
            .fetch_all(ex)
            .await
            .context("failed to list projects")?;

    Ok(projects)
}

/// List all projects created by a given user, newest first.
pub async fn list_projects_for_user<'e, E: PgExecutor<'e>>(
    ex: E,
    user_id: Uuid,
) -> Result<Vec<Project>> {
    let projects = sqlx::query_as::<_, Project>(
        "SELECT * FROM projects WHERE created_by = $1 ORDER BY created_at DESC",
    )
    .bind(user_id)
    .fetch_all(ex)
    .await
    .context("failed to list projects")?;

    Ok(projects)
}

/// Overwrite the editable fields of a project.
#[allow(clippy::too_many_arguments)]
pub async fn update_project<'e, E: PgExecutor<'e>>(
    ex: E,
    id: Uuid,
    name: &str,
    description: &str,
    start_date: Option<NaiveDate>,
    duration: Option<i32>,
    budget: Option<f64>,
    fixed_budget: bool,
    fixed_duration: bool,
) -> Result<u64> {
    let result = sqlx::query(
        "UPDATE projects \
         SET name = $1, description = $2, start_date = $3, duration = $4, \
             budget = $5, fixed_budget = $6, fixed_duration = $7 \
         WHERE id = $8",
    )
    .bind(name)
    .bind(description)
    .bind(start_date)
    .bind(duration)
    .bind(budget)
    .bind(fixed_budget)
    .bind(fixed_duration)
    .bind(id)
    .execute(ex)
    .await
    .context("failed to update project")?;

    Ok(result.rows_affected())
}

/// Adjust a project's rollup budget by a delta. Only valid for projects
/// whose budget is computed, never fixed.
pub async fn adjust_project_budget<'e, E: PgExecutor<'e>>(
    ex: E,
    id: Uuid,
    delta: f64,
) -> Result<u64> {
    let result =
        sqlx::query("UPDATE projects SET budget = COALESCE(budget, 0) + $1 WHERE id = $2")
            .bind(delta)
            .bind(id)
            .execute(ex)
            .await
            .context("failed to adjust project budget")?;

    Ok(result.rows_affected())
}

/// Adjust a project's rollup duration (weeks) by a delta. Only valid for
/// projects whose duration is computed, never fixed.
pub async fn adjust_project_duration<'e, E: PgExecutor<'e>>(
    ex: E,
    id: Uuid,
    delta_weeks: i32,
) -> Result<u64> {
    let result =
        sqlx::query("UPDATE projects SET duration = COALESCE(duration, 0) + $1 WHERE id = $2")
            .bind(delta_weeks)
            .bind(id)
            .execute(ex)
            .await
            .context("failed to adjust project duration")?;

    Ok(result.rows_affected())
}

/// Set or clear the derived `is_ongoing` flag.
pub async fn set_project_ongoing<'e, E: PgExecutor<'e>>(
    ex: E,
    id: Uuid,
    ongoing: bool,
) -> Result<u64> {
    let result = sqlx::query("UPDATE projects SET is_ongoing = $1 WHERE id = $2")
        .bind(ongoing)
        .bind(id)
        .execute(ex)
        .await
        .context("failed to set project ongoing flag")?;

    Ok(result.rows_affected())
}

/// Delete a project row. Tasks and materials go with it via `ON DELETE
/// CASCADE`.
pub async fn delete_project<'e, E: PgExecutor<'e>>(ex: E, id: Uuid) -> Result<u64> {
    let result = sqlx::query("DELETE FROM projects WHERE id = $1")
        .bind(id)
        .execute(ex)
        .await
        .context("failed to delete project")?;

    Ok(result.rows_affected())
}
