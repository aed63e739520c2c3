//! Database query functions for the `materials` table.

use anyhow::{Context, Result};
use sqlx::PgExecutor;
use uuid::Uuid;

use crate::models::Material;

/// Fields for a new material row. `cost` is derived by the caller as
/// `price * quantity`.
#[derive(Debug, Clone)]
pub struct NewMaterial<'a> {
    pub task_id: Uuid,
    pub name: &'a str,
    pub description: &'a str,
    pub unit: &'a str,
    pub price: f64,
    pub quantity: i32,
}

/// Insert a new material row. Returns the inserted material with
/// server-generated defaults (id, created_at).
pub async fn insert_material<'e, E: PgExecutor<'e>>(
    ex: E,
    new: &NewMaterial<'_>,
) -> Result<Material> {
    let material = sqlx::query_as::<_, Material>(
        "INSERT INTO materials (task_id, name, description, unit, price, quantity, cost) \
         VALUES ($1, $2, $3, $4, $5, $6, $5 * $6) \
         RETURNING *",
    )
    .bind(new.task_id)
    .bind(new.name)
    .bind(new.description)
    .bind(new.unit)
    .bind(new.price)
    .bind(new.quantity)
    .fetch_one(ex)
    .await
    .context("failed to insert material")?;

    Ok(material)
}

/// Fetch a material by ID.
pub async fn get_material<'e, E: PgExecutor<'e>>(ex: E, id: Uuid) -> Result<Option<Material>> {
    let material = sqlx::query_as::<_, Material>("SELECT * FROM materials WHERE id = $1")
        .bind(id)
        .fetch_optional(ex)
        .await
        .context("failed to fetch material")?;

    Ok(material)
}

/// List all materials for a task, ordered by creation time.
pub async fn list_materials_for_task<'e, E: PgExecutor<'e>>(
    ex: E,
    task_id: Uuid,
) -> Result<Vec<Material>> {
    let materials = sqlx::query_as::<_, Material>(
        "SELECT * FROM materials WHERE task_id = $1 ORDER BY created_at ASC",
    )
    .bind(task_id)
    .fetch_all(ex)
    .await
    .context("failed to list materials for task")?;

    Ok(materials)
}

/// Overwrite the editable fields of a material, rederiving `cost`.
pub async fn update_material<'e, E: PgExecutor<'e>>(
    ex: E,
    id: Uuid,
    name: &str,
    description: &str,
    unit: &str,
    price: f64,
    quantity: i32,
) -> Result<u64> {
    let result = sqlx::query(
        "UPDATE materials \
         SET name = $1, description = $2, unit = $3, price = $4, quantity = $5, cost = $4 * $5 \
         WHERE id = $6",
    )
    .bind(name)
    .bind(description)
    .bind(unit)
    .bind(price)
    .bind(quantity)
    .bind(id)
    .execute(ex)
    .await
    .context("failed to update material")?;

    Ok(result.rows_affected())
}

/// Sum of material line costs for a task (empty set is zero).
pub async fn sum_costs_for_task<'e, E: PgExecutor<'e>>(ex: E, task_id: Uuid) -> Result<f64> {
    let row: (f64,) = sqlx::query_as(
        "SELECT COALESCE(SUM(cost), 0)::double precision FROM materials WHERE task_id = $1",
    )
    .bind(task_id)
    .fetch_one(ex)
    .await
    .context("failed to sum material costs")?;

    Ok(row.0)
}

/// Delete a material row.
pub async fn delete_material<'e, E: PgExecutor<'e>>(ex: E, id: Uuid) -> Result<u64> {
    let result = sqlx::query("DELETE FROM materials WHERE id = $1")
        .bind(id)
        .execute(ex)
        .await
        .context("failed to delete material")?;

    Ok(result.rows_affected())
}
