//! Database query functions for the `users` table.

use anyhow::{Context, Result};
use sqlx::PgExecutor;
use uuid::Uuid;

use crate::models::User;

/// Insert a new user row. Returns the inserted user with server-generated
/// defaults (id, created_at).
pub async fn insert_user<'e, E: PgExecutor<'e>>(
    ex: E,
    name: &str,
    email: &str,
    role: Option<&str>,
) -> Result<User> {
    let user = sqlx::query_as::<_, User>(
        "INSERT INTO users (name, email, role) VALUES ($1, $2, $3) RETURNING *",
    )
    .bind(name)
    .bind(email)
    .bind(role)
    .fetch_one(ex)
    .await
    .context("failed to insert user")?;

    Ok(user)
}

/// Fetch a user by ID.
pub async fn get_user<'e, E: PgExecutor<'e>>(ex: E, id: Uuid) -> Result<Option<User>> {
    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
        .bind(id)
        .fetch_optional(ex)
        .await
        .context("failed to fetch user")?;

    Ok(user)
}

/// List every user, oldest first.
pub async fn list_users<'e, E: PgExecutor<'e>>(ex: E) -> Result<Vec<User>> {
    let users = sqlx::query_as::<_, User>("SELECT * FROM users ORDER BY created_at ASC")
        .fetch_all(ex)
        .await
        .context("failed to list users")?;

    Ok(users)
}

/// Fetch a user by email. This is how the presentation layer resolves the
/// current user.
pub async fn get_user_by_email<'e, E: PgExecutor<'e>>(ex: E, email: &str) -> Result<Option<User>> {
    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = $1")
        .bind(email)
        .fetch_optional(ex)
        .await
        .context("failed to fetch user by email")?;

    Ok(user)
}
