//! Project lifecycle: create, edit, delete.

use anyhow::Context;
use chrono::NaiveDate;
use sqlx::PgPool;
use uuid::Uuid;

use joist_db::models::{ANCHOR_TASK_NAME, Project};
use joist_db::queries::{projects, tasks};

use crate::context::RequestContext;
use crate::error::{FieldErrors, OpError, ViolationKind};
use crate::lifecycle::{Committed, EngineConfig, Outcome, RefreshScope};
use crate::rollup;
use crate::schedule;

/// User-supplied fields for creating or editing a project.
#[derive(Debug, Clone, Default)]
pub struct ProjectInput {
    pub name: String,
    pub description: String,
    pub start_date: Option<NaiveDate>,
    /// Weeks. Must be `Some` exactly when `fixed_duration` is set.
    pub duration: Option<i32>,
    pub fixed_duration: bool,
    /// Must be `Some` exactly when `fixed_budget` is set.
    pub budget: Option<f64>,
    pub fixed_budget: bool,
}

fn validate(input: &ProjectInput) -> Result<(), OpError> {
    let mut errors = FieldErrors::new();

    if input.name.trim().is_empty() {
        errors.add("name", ViolationKind::Invalid, "name is required");
    }
    if input.description.trim().is_empty() {
        errors.add("description", ViolationKind::Invalid, "description is required");
    }
    if let Err(v) = rollup::validate_budget_pairing("budget", input.budget, input.fixed_budget) {
        errors.push(v);
    }
    if let Err(v) =
        rollup::validate_duration_pairing("duration", input.duration, input.fixed_duration)
    {
        errors.push(v);
    }
    if input.budget.is_some_and(|b| b < 0.0) {
        errors.add("budget", ViolationKind::Invalid, "budget cannot be negative");
    }
    if input.duration.is_some_and(|d| d < 0) {
        errors.add("duration", ViolationKind::Invalid, "duration cannot be negative");
    }

    errors.into_result()
}

/// Create a project together with its anchor task, atomically.
///
/// The anchor carries the project's start date with zero duration and zero
/// budget; dependent tasks chain off it so a change to the project start
/// reschedules everything in one propagation pass.
pub async fn create_project(
    pool: &PgPool,
    ctx: &RequestContext,
    input: &ProjectInput,
) -> Result<Committed<Project>, OpError> {
    validate(input)?;

    let mut tx = pool.begin().await.context("failed to begin transaction")?;

    let project = projects::insert_project(
        &mut *tx,
        &projects::NewProject {
            name: &input.name,
            description: &input.description,
            start_date: input.start_date,
            duration: if input.fixed_duration { input.duration } else { Some(0) },
            budget: if input.fixed_budget { input.budget } else { Some(0.0) },
            fixed_budget: input.fixed_budget,
            fixed_duration: input.fixed_duration,
            created_by: ctx.user_id,
        },
    )
    .await?;

    tasks::insert_task(
        &mut *tx,
        &tasks::NewTask {
            project_id: project.id,
            parent_task_id: None,
            name: ANCHOR_TASK_NAME,
            description: "Scheduling anchor; dependent tasks chain off the project start",
            start_date: project.start_date,
            duration: 0,
            budget: Some(0.0),
            fixed_budget: false,
        },
    )
    .await?;

    tx.commit().await.context("failed to commit transaction")?;

    tracing::info!(project_id = %project.id, user = %ctx.email, "project created");
    Ok(Committed {
        value: project,
        outcome: Outcome::Redirect("/".to_owned()),
    })
}

/// Edit a project's fields, re-deriving rollups and rescheduling tasks.
///
/// Fixed amounts are checked against what the tasks already claim; computed
/// amounts are re-summed from the tasks, which also covers a flag flipping
/// from fixed back to computed. A start date change propagates through the
/// anchor to every dependent task.
pub async fn edit_project(
    pool: &PgPool,
    ctx: &RequestContext,
    id: Uuid,
    input: &ProjectInput,
    config: &EngineConfig,
) -> Result<Committed<Project>, OpError> {
    validate(input)?;

    let mut tx = pool.begin().await.context("failed to begin transaction")?;

    let existing = projects::get_project_for_update(&mut *tx, id)
        .await?
        .ok_or_else(|| OpError::NotFound(format!("project {id}")))?;

    let task_budget_total = tasks::sum_budgets_for_project(&mut *tx, id).await?;
    let task_duration_total = tasks::sum_durations_for_project(&mut *tx, id).await?;

    let mut errors = FieldErrors::new();

    let budget = if input.fixed_budget {
        let value = input.budget.unwrap_or(0.0);
        if let Err(v) = rollup::check_budget_floor("budget", value, task_budget_total) {
            errors.push(v);
        }
        Some(value)
    } else {
        Some(task_budget_total)
    };

    let duration = if input.fixed_duration {
        let value = input.duration.unwrap_or(0);
        if let Err(v) =
            rollup::check_duration_floor("duration", i64::from(value), task_duration_total)
        {
            errors.push(v);
        }
        Some(value)
    } else {
        Some(i32::try_from(task_duration_total).unwrap_or(i32::MAX))
    };

    errors.into_result()?;

    let updated = projects::update_project(
        &mut *tx,
        id,
        &input.name,
        &input.description,
        input.start_date,
        duration,
        budget,
        input.fixed_budget,
        input.fixed_duration,
    )
    .await?;
    if updated == 0 {
        return Err(OpError::NotFound(format!("project {id}")));
    }

    if let Some(new_start) = input.start_date {
        if input.start_date != existing.start_date {
            let anchor = tasks::get_anchor_task(&mut *tx, id)
                .await?
                .with_context(|| format!("project {id} has no anchor task"))?;
            schedule::propagate(&mut tx, anchor.id, new_start, config.start_convention).await?;
        }
    }

    let project = projects::get_project(&mut *tx, id)
        .await?
        .ok_or_else(|| OpError::NotFound(format!("project {id}")))?;

    tx.commit().await.context("failed to commit transaction")?;

    tracing::info!(project_id = %id, user = %ctx.email, "project updated");
    Ok(Committed {
        value: project,
        outcome: Outcome::Redirect(format!("/project/{id}")),
    })
}

/// Delete a project. Tasks and materials cascade away with it.
pub async fn delete_project(
    pool: &PgPool,
    ctx: &RequestContext,
    id: Uuid,
) -> Result<Outcome, OpError> {
    let mut tx = pool.begin().await.context("failed to begin transaction")?;

    let deleted = projects::delete_project(&mut *tx, id).await?;
    if deleted == 0 {
        return Err(OpError::NotFound(format!("project {id}")));
    }

    tx.commit().await.context("failed to commit transaction")?;

    tracing::info!(project_id = %id, user = %ctx.email, "project deleted");
    Ok(Outcome::Refresh(RefreshScope::ProjectList))
}
