//! The joist engine: budget/duration rollups, schedule propagation, and the
//! lifecycle controller that keeps the project/task/material hierarchy
//! consistent.
//!
//! The presentation layer (HTTP, CLI) calls into [`lifecycle`] with already
//! type-coerced input and renders the field-keyed errors from [`error`];
//! read-only derivations (Gantt data, quotations, the ongoing flag) live in
//! [`views`].

pub mod context;
pub mod error;
pub mod lifecycle;
pub mod rollup;
pub mod schedule;
pub mod views;
