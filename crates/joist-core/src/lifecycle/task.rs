//! Task lifecycle: create, edit, delete.

use anyhow::Context;
use chrono::NaiveDate;
use sqlx::PgPool;
use uuid::Uuid;

use joist_db::models::{ANCHOR_TASK_NAME, Project, Task, TaskStatus};
use joist_db::queries::{materials, projects, tasks};

use crate::context::RequestContext;
use crate::error::{FieldErrors, OpError, ViolationKind};
use crate::lifecycle::{Committed, EngineConfig, Outcome, RefreshScope};
use crate::rollup::{self, Amount};
use crate::schedule;

/// User-supplied fields for creating or editing a task.
#[derive(Debug, Clone, Default)]
pub struct TaskInput {
    pub name: String,
    pub description: String,
    /// Weeks.
    pub duration: i32,
    /// Must be `Some` exactly when `fixed_budget` is set.
    pub budget: Option<f64>,
    pub fixed_budget: bool,
    /// Exactly one of `parent` and `start_date` must be set.
    pub parent: Option<Uuid>,
    pub start_date: Option<NaiveDate>,
    pub status: TaskStatus,
}

fn validate(input: &TaskInput) -> Result<(), OpError> {
    let mut errors = FieldErrors::new();

    if input.name.trim().is_empty() {
        errors.add("name", ViolationKind::Invalid, "name is required");
    } else if input.name == ANCHOR_TASK_NAME {
        errors.add(
            "name",
            ViolationKind::Invalid,
            "this name is reserved for the project's scheduling anchor",
        );
    }
    if input.duration < 0 {
        errors.add("duration", ViolationKind::Invalid, "duration cannot be negative");
    }
    if let Err(v) = rollup::validate_budget_pairing("budget", input.budget, input.fixed_budget) {
        errors.push(v);
    }
    if input.budget.is_some_and(|b| b < 0.0) {
        errors.add("budget", ViolationKind::Invalid, "budget cannot be negative");
    }
    match (input.start_date, input.parent) {
        (None, None) => errors.add(
            "start_date",
            ViolationKind::ConstraintViolation,
            "give the task a start date or a parent task",
        ),
        (Some(_), Some(_)) => errors.add(
            "start_date",
            ViolationKind::ConstraintViolation,
            "a task takes either a start date or a parent task, not both",
        ),
        _ => {}
    }

    errors.into_result()
}

/// Resolve the parent task and derive the start date it implies.
///
/// Pushes a violation instead of returning when the parent is missing or
/// belongs to another project, so the caller reports every problem at once.
async fn resolve_parent(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    parent_id: Uuid,
    project_id: Uuid,
    convention: crate::schedule::StartConvention,
    errors: &mut FieldErrors,
) -> Result<Option<NaiveDate>, OpError> {
    match tasks::get_task(&mut **tx, parent_id).await? {
        None => {
            errors.add("parent", ViolationKind::Invalid, "parent task does not exist");
            Ok(None)
        }
        Some(parent) if parent.project_id != project_id => {
            errors.add(
                "parent",
                ViolationKind::Invalid,
                "parent task belongs to a different project",
            );
            Ok(None)
        }
        Some(parent) => Ok(parent
            .start_date
            .map(|start| convention.child_start(start, parent.duration))),
    }
}

/// Check the task's budget and duration against the project and work out the
/// rollup deltas to apply when the project tracks computed totals.
///
/// `old_budget`/`old_duration` are what the task currently contributes
/// (zero for a new task).
fn project_fit(
    project: &Project,
    task_budget_total: f64,
    task_duration_total: i64,
    old_budget: f64,
    new_budget: f64,
    old_duration: i32,
    new_duration: i32,
    errors: &mut FieldErrors,
) -> (f64, i32) {
    let mut budget_delta = 0.0;
    let mut duration_delta = 0;

    match Amount::from_row(project.budget, project.fixed_budget) {
        Amount::Fixed(ceiling) => {
            let candidate = task_budget_total - old_budget + new_budget;
            if let Err(v) = rollup::check_budget_ceiling("budget", candidate, ceiling) {
                errors.push(v);
            }
        }
        Amount::Computed(_) => budget_delta = new_budget - old_budget,
    }

    match Amount::from_row(project.duration, project.fixed_duration) {
        Amount::Fixed(ceiling) => {
            let candidate = task_duration_total - i64::from(old_duration) + i64::from(new_duration);
            if let Err(v) =
                rollup::check_duration_ceiling("duration", candidate, i64::from(ceiling))
            {
                errors.push(v);
            }
        }
        Amount::Computed(_) => duration_delta = new_duration - old_duration,
    }

    (budget_delta, duration_delta)
}

/// Create a task under a project.
///
/// A dependent task (one with a parent) gets its start date derived from the
/// parent's end; an independent task uses the explicit date. The project's
/// computed rollups move by the new task's amounts, and its fixed amounts
/// act as ceilings.
pub async fn create_task(
    pool: &PgPool,
    ctx: &RequestContext,
    project_id: Uuid,
    input: &TaskInput,
    config: &EngineConfig,
) -> Result<Committed<Task>, OpError> {
    validate(input)?;

    let mut tx = pool.begin().await.context("failed to begin transaction")?;

    let project = projects::get_project_for_update(&mut *tx, project_id)
        .await?
        .ok_or_else(|| OpError::NotFound(format!("project {project_id}")))?;

    let mut errors = FieldErrors::new();

    let start_date = match input.parent {
        Some(parent_id) => {
            resolve_parent(&mut tx, parent_id, project_id, config.start_convention, &mut errors)
                .await?
        }
        None => input.start_date,
    };

    let budget_value = if input.fixed_budget {
        input.budget.unwrap_or(0.0)
    } else {
        0.0
    };

    let task_budget_total = tasks::sum_budgets_for_project(&mut *tx, project_id).await?;
    let task_duration_total = tasks::sum_durations_for_project(&mut *tx, project_id).await?;
    let (budget_delta, duration_delta) = project_fit(
        &project,
        task_budget_total,
        task_duration_total,
        0.0,
        budget_value,
        0,
        input.duration,
        &mut errors,
    );

    errors.into_result()?;

    if budget_delta != 0.0 {
        projects::adjust_project_budget(&mut *tx, project_id, budget_delta).await?;
    }
    if duration_delta != 0 {
        projects::adjust_project_duration(&mut *tx, project_id, duration_delta).await?;
    }

    let task = tasks::insert_task(
        &mut *tx,
        &tasks::NewTask {
            project_id,
            parent_task_id: input.parent,
            name: &input.name,
            description: &input.description,
            start_date,
            duration: input.duration,
            budget: Some(budget_value),
            fixed_budget: input.fixed_budget,
        },
    )
    .await?;

    tx.commit().await.context("failed to commit transaction")?;

    tracing::info!(task_id = %task.id, project_id = %project_id, user = %ctx.email, "task created");
    Ok(Committed {
        value: task,
        outcome: Outcome::Redirect(format!("/project/{project_id}")),
    })
}

/// Edit a task, maintaining rollups and rescheduling its subtree.
///
/// A task can never become its own parent, directly or through one of its
/// descendants; that check rejects the edit before anything is written. A
/// fixed task budget must still cover the task's materials.
pub async fn edit_task(
    pool: &PgPool,
    ctx: &RequestContext,
    id: Uuid,
    input: &TaskInput,
    config: &EngineConfig,
) -> Result<Committed<Task>, OpError> {
    validate(input)?;

    if input.parent == Some(id) {
        return Err(OpError::invalid(
            "parent",
            ViolationKind::SelfReference,
            "a task cannot be its own parent",
        ));
    }

    let mut tx = pool.begin().await.context("failed to begin transaction")?;

    let unlocked = tasks::get_task(&mut *tx, id)
        .await?
        .ok_or_else(|| OpError::NotFound(format!("task {id}")))?;
    if unlocked.is_anchor() {
        return Err(OpError::invalid(
            "task",
            ViolationKind::Invalid,
            "the scheduling anchor cannot be edited",
        ));
    }

    let project = projects::get_project_for_update(&mut *tx, unlocked.project_id)
        .await?
        .ok_or_else(|| OpError::NotFound(format!("project {}", unlocked.project_id)))?;
    let existing = tasks::get_task_for_update(&mut *tx, id)
        .await?
        .ok_or_else(|| OpError::NotFound(format!("task {id}")))?;

    let mut errors = FieldErrors::new();

    let start_date = match input.parent {
        Some(parent_id) => {
            if tasks::is_in_subtree(&mut *tx, id, parent_id).await? {
                errors.add(
                    "parent",
                    ViolationKind::SelfReference,
                    "parent cannot be the task itself or one of its descendants",
                );
                None
            } else {
                resolve_parent(
                    &mut tx,
                    parent_id,
                    existing.project_id,
                    config.start_convention,
                    &mut errors,
                )
                .await?
            }
        }
        None => input.start_date,
    };

    let material_total = materials::sum_costs_for_task(&mut *tx, id).await?;
    let budget_value = if input.fixed_budget {
        let value = input.budget.unwrap_or(0.0);
        if let Err(v) = rollup::check_budget_floor("budget", value, material_total) {
            errors.push(v);
        }
        value
    } else {
        material_total
    };

    let old_budget = existing.budget.unwrap_or(0.0);
    let task_budget_total = tasks::sum_budgets_for_project(&mut *tx, existing.project_id).await?;
    let task_duration_total =
        tasks::sum_durations_for_project(&mut *tx, existing.project_id).await?;
    let (budget_delta, duration_delta) = project_fit(
        &project,
        task_budget_total,
        task_duration_total,
        old_budget,
        budget_value,
        existing.duration,
        input.duration,
        &mut errors,
    );

    errors.into_result()?;

    if budget_delta != 0.0 {
        projects::adjust_project_budget(&mut *tx, existing.project_id, budget_delta).await?;
    }
    if duration_delta != 0 {
        projects::adjust_project_duration(&mut *tx, existing.project_id, duration_delta).await?;
    }

    let updated = tasks::update_task(
        &mut *tx,
        id,
        &input.name,
        &input.description,
        input.parent,
        start_date,
        input.duration,
        input.status,
        Some(budget_value),
        input.fixed_budget,
    )
    .await?;
    if updated == 0 {
        return Err(OpError::NotFound(format!("task {id}")));
    }

    let schedule_changed = start_date != existing.start_date
        || input.duration != existing.duration
        || input.parent != existing.parent_task_id;
    if let Some(new_start) = start_date {
        if schedule_changed {
            schedule::propagate(&mut tx, id, new_start, config.start_convention).await?;
        }
    }

    let task = tasks::get_task(&mut *tx, id)
        .await?
        .ok_or_else(|| OpError::NotFound(format!("task {id}")))?;

    tx.commit().await.context("failed to commit transaction")?;

    tracing::info!(task_id = %id, user = %ctx.email, "task updated");
    Ok(Committed {
        value: task,
        outcome: Outcome::Redirect(format!("/project/{}", existing.project_id)),
    })
}

/// Delete a task and its whole subtree.
///
/// The cascade removes descendants and their materials; the project's
/// computed rollups drop by the subtree's totals so they stay equal to the
/// sum over the remaining tasks.
pub async fn delete_task(pool: &PgPool, ctx: &RequestContext, id: Uuid) -> Result<Outcome, OpError> {
    let mut tx = pool.begin().await.context("failed to begin transaction")?;

    let unlocked = tasks::get_task(&mut *tx, id)
        .await?
        .ok_or_else(|| OpError::NotFound(format!("task {id}")))?;
    if unlocked.is_anchor() {
        return Err(OpError::invalid(
            "task",
            ViolationKind::Invalid,
            "the scheduling anchor cannot be deleted",
        ));
    }

    let project = projects::get_project_for_update(&mut *tx, unlocked.project_id)
        .await?
        .ok_or_else(|| OpError::NotFound(format!("project {}", unlocked.project_id)))?;

    let (budget_total, duration_total) = tasks::subtree_totals(&mut *tx, id).await?;

    let deleted = tasks::delete_task(&mut *tx, id).await?;
    if deleted == 0 {
        return Err(OpError::NotFound(format!("task {id}")));
    }

    if !project.fixed_budget && budget_total != 0.0 {
        projects::adjust_project_budget(&mut *tx, project.id, -budget_total).await?;
    }
    if !project.fixed_duration && duration_total != 0 {
        let delta = i32::try_from(duration_total).unwrap_or(i32::MAX);
        projects::adjust_project_duration(&mut *tx, project.id, -delta).await?;
    }

    tx.commit().await.context("failed to commit transaction")?;

    tracing::info!(task_id = %id, project_id = %project.id, user = %ctx.email, "task deleted");
    Ok(Outcome::Refresh(RefreshScope::Project(project.id)))
}
