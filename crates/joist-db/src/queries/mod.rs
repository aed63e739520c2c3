//! Per-table query functions.
//!
//! Every function is generic over [`sqlx::PgExecutor`] so it can run against
//! the pool directly or inside a caller-owned transaction.

pub mod materials;
pub mod projects;
pub mod tasks;
pub mod users;
