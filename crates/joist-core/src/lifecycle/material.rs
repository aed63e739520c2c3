//! Material lifecycle: add, edit, delete.
//!
//! A material's line cost is `price * quantity`. Cost changes move the
//! owning task's computed budget by the delta, and that delta keeps
//! cascading into the project's computed budget. Fixed budgets at either
//! level act as ceilings instead.

use anyhow::Context;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use joist_db::models::{Material, Project, Task};
use joist_db::queries::{materials, projects, tasks};

use crate::context::RequestContext;
use crate::error::{FieldErrors, OpError, ViolationKind};
use crate::lifecycle::{Committed, Outcome, RefreshScope};
use crate::rollup::{self, Amount};

/// User-supplied fields for adding or editing a material.
#[derive(Debug, Clone, Default)]
pub struct MaterialInput {
    pub name: String,
    pub description: String,
    /// Unit of measurement ("bag", "m2", ...).
    pub unit: String,
    pub price: f64,
    pub quantity: i32,
}

impl MaterialInput {
    fn cost(&self) -> f64 {
        self.price * f64::from(self.quantity)
    }
}

fn validate(input: &MaterialInput) -> Result<(), OpError> {
    let mut errors = FieldErrors::new();

    if input.name.trim().is_empty() {
        errors.add("name", ViolationKind::Invalid, "name is required");
    }
    if input.unit.trim().is_empty() {
        errors.add("unit", ViolationKind::Invalid, "unit is required");
    }
    if input.price < 1.0 {
        errors.add("price", ViolationKind::Invalid, "price must be at least 1");
    }
    if input.quantity < 1 {
        errors.add("quantity", ViolationKind::Invalid, "quantity must be at least 1");
    }

    errors.into_result()
}

/// Check a cost delta against the task and project budgets and work out
/// which computed rollups need to move.
///
/// Returns `(adjust_task, adjust_project)`: whether each level tracks a
/// computed budget that should absorb the delta.
async fn budget_fit(
    tx: &mut Transaction<'_, Postgres>,
    task: &Task,
    project: &Project,
    old_cost: f64,
    new_cost: f64,
    errors: &mut FieldErrors,
) -> Result<(bool, bool), OpError> {
    let mut adjust_task = false;
    let mut adjust_project = false;

    match Amount::from_row(task.budget, task.fixed_budget) {
        Amount::Fixed(ceiling) => {
            let material_total = materials::sum_costs_for_task(&mut **tx, task.id).await?;
            let candidate = material_total - old_cost + new_cost;
            if let Err(v) = rollup::check_budget_ceiling("price", candidate, ceiling) {
                errors.push(v);
            }
        }
        Amount::Computed(_) => {
            adjust_task = true;
            // The task's budget grows, so the delta also counts against the
            // project's budget.
            match Amount::from_row(project.budget, project.fixed_budget) {
                Amount::Fixed(ceiling) => {
                    let task_total =
                        tasks::sum_budgets_for_project(&mut **tx, project.id).await?;
                    let candidate = task_total - old_cost + new_cost;
                    if let Err(v) = rollup::check_budget_ceiling("price", candidate, ceiling) {
                        errors.push(v);
                    }
                }
                Amount::Computed(_) => adjust_project = true,
            }
        }
    }

    Ok((adjust_task, adjust_project))
}

/// Fetch a task's project and re-fetch the task itself, both under lock.
async fn lock_task(
    tx: &mut Transaction<'_, Postgres>,
    task_id: Uuid,
) -> Result<(Task, Project), OpError> {
    let unlocked = tasks::get_task(&mut **tx, task_id)
        .await?
        .ok_or_else(|| OpError::NotFound(format!("task {task_id}")))?;

    let project = projects::get_project_for_update(&mut **tx, unlocked.project_id)
        .await?
        .ok_or_else(|| OpError::NotFound(format!("project {}", unlocked.project_id)))?;
    let task = tasks::get_task_for_update(&mut **tx, task_id)
        .await?
        .ok_or_else(|| OpError::NotFound(format!("task {task_id}")))?;

    Ok((task, project))
}

/// Add a material to a task.
pub async fn add_material(
    pool: &PgPool,
    ctx: &RequestContext,
    task_id: Uuid,
    input: &MaterialInput,
) -> Result<Committed<Material>, OpError> {
    validate(input)?;

    let mut tx = pool.begin().await.context("failed to begin transaction")?;

    let (task, project) = lock_task(&mut tx, task_id).await?;
    if task.is_anchor() {
        return Err(OpError::invalid(
            "task",
            ViolationKind::Invalid,
            "the scheduling anchor cannot carry materials",
        ));
    }

    let cost = input.cost();
    let mut errors = FieldErrors::new();
    let (adjust_task, adjust_project) =
        budget_fit(&mut tx, &task, &project, 0.0, cost, &mut errors).await?;
    errors.into_result()?;

    if adjust_task {
        tasks::adjust_task_budget(&mut *tx, task.id, cost).await?;
    }
    if adjust_project {
        projects::adjust_project_budget(&mut *tx, project.id, cost).await?;
    }

    let material = materials::insert_material(
        &mut *tx,
        &materials::NewMaterial {
            task_id,
            name: &input.name,
            description: &input.description,
            unit: &input.unit,
            price: input.price,
            quantity: input.quantity,
        },
    )
    .await?;

    tx.commit().await.context("failed to commit transaction")?;

    tracing::info!(material_id = %material.id, task_id = %task_id, user = %ctx.email, "material added");
    Ok(Committed {
        value: material,
        outcome: Outcome::Redirect(format!("/task/{task_id}")),
    })
}

/// Edit a material, moving rollups by the cost delta.
pub async fn edit_material(
    pool: &PgPool,
    ctx: &RequestContext,
    id: Uuid,
    input: &MaterialInput,
) -> Result<Committed<Material>, OpError> {
    validate(input)?;

    let mut tx = pool.begin().await.context("failed to begin transaction")?;

    let existing = materials::get_material(&mut *tx, id)
        .await?
        .ok_or_else(|| OpError::NotFound(format!("material {id}")))?;
    let (task, project) = lock_task(&mut tx, existing.task_id).await?;

    let new_cost = input.cost();
    let delta = new_cost - existing.cost;

    let mut errors = FieldErrors::new();
    let (adjust_task, adjust_project) =
        budget_fit(&mut tx, &task, &project, existing.cost, new_cost, &mut errors).await?;
    errors.into_result()?;

    if delta != 0.0 {
        if adjust_task {
            tasks::adjust_task_budget(&mut *tx, task.id, delta).await?;
        }
        if adjust_project {
            projects::adjust_project_budget(&mut *tx, project.id, delta).await?;
        }
    }

    let updated = materials::update_material(
        &mut *tx,
        id,
        &input.name,
        &input.description,
        &input.unit,
        input.price,
        input.quantity,
    )
    .await?;
    if updated == 0 {
        return Err(OpError::NotFound(format!("material {id}")));
    }

    let material = materials::get_material(&mut *tx, id)
        .await?
        .ok_or_else(|| OpError::NotFound(format!("material {id}")))?;

    tx.commit().await.context("failed to commit transaction")?;

    tracing::info!(material_id = %id, user = %ctx.email, "material updated");
    Ok(Committed {
        value: material,
        outcome: Outcome::Redirect(format!("/task/{}", existing.task_id)),
    })
}

/// Delete a material, shrinking computed budgets by its cost.
pub async fn delete_material(
    pool: &PgPool,
    ctx: &RequestContext,
    id: Uuid,
) -> Result<Outcome, OpError> {
    let mut tx = pool.begin().await.context("failed to begin transaction")?;

    let existing = materials::get_material(&mut *tx, id)
        .await?
        .ok_or_else(|| OpError::NotFound(format!("material {id}")))?;
    let (task, project) = lock_task(&mut tx, existing.task_id).await?;

    let deleted = materials::delete_material(&mut *tx, id).await?;
    if deleted == 0 {
        return Err(OpError::NotFound(format!("material {id}")));
    }

    if existing.cost != 0.0 && !task.fixed_budget {
        tasks::adjust_task_budget(&mut *tx, task.id, -existing.cost).await?;
        if !project.fixed_budget {
            projects::adjust_project_budget(&mut *tx, project.id, -existing.cost).await?;
        }
    }

    tx.commit().await.context("failed to commit transaction")?;

    tracing::info!(material_id = %id, task_id = %task.id, user = %ctx.email, "material deleted");
    Ok(Outcome::Refresh(RefreshScope::Task(task.id)))
}
