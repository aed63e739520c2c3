//! `joist user` subcommands: bootstrap and inspect the identity table.

use anyhow::{Result, bail};
use sqlx::PgPool;

use joist_db::queries::users;

/// Execute `joist user add`.
pub async fn run_user_add(
    pool: &PgPool,
    name: &str,
    email: &str,
    role: Option<&str>,
) -> Result<()> {
    if users::get_user_by_email(pool, email).await?.is_some() {
        bail!("a user with email {email} already exists");
    }

    let user = users::insert_user(pool, name, email, role).await?;
    println!("User created:");
    println!("  id:    {}", user.id);
    println!("  name:  {}", user.name);
    println!("  email: {}", user.email);
    if let Some(role) = &user.role {
        println!("  role:  {role}");
    }
    println!();
    println!("Requests authenticate with the `X-User-Email: {email}` header.");

    Ok(())
}

/// Execute `joist user list`.
pub async fn run_user_list(pool: &PgPool) -> Result<()> {
    let all = users::list_users(pool).await?;

    if all.is_empty() {
        println!("No users. Run `joist user add` to create one.");
        return Ok(());
    }

    println!("{:<38} {:<28} {:<20} ROLE", "ID", "EMAIL", "NAME");
    for user in all {
        println!(
            "{:<38} {:<28} {:<20} {}",
            user.id,
            user.email,
            user.name,
            user.role.as_deref().unwrap_or("-"),
        );
    }

    Ok(())
}
