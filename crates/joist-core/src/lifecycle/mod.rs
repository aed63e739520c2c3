//! Lifecycle operations over the project/task/material hierarchy.
//!
//! Every operation here validates its input, runs all reads, checks, and
//! rollup writes inside a single transaction, and reports what the caller
//! should do next via [`Outcome`]. Concurrent edits on the same project
//! serialize through `SELECT ... FOR UPDATE` on the project row.
//!
//! Lock order is always project first, then task. Operations addressed at a
//! task or material read the row without a lock to learn its project, lock
//! the project, then re-fetch the row under lock.

use serde::Serialize;
use uuid::Uuid;

use crate::schedule::StartConvention;

pub mod material;
pub mod project;
pub mod task;

/// Engine-wide knobs.
#[derive(Debug, Clone, Copy, Default)]
pub struct EngineConfig {
    pub start_convention: StartConvention,
}

/// Which part of the UI a successful mutation invalidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshScope {
    ProjectList,
    Project(Uuid),
    Task(Uuid),
}

/// What the caller should do after a committed mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// Navigate to this path.
    Redirect(String),
    /// Stay put and re-read this scope.
    Refresh(RefreshScope),
}

/// A committed mutation: the row as written plus the navigation outcome.
#[derive(Debug, Clone)]
pub struct Committed<T> {
    pub value: T,
    pub outcome: Outcome,
}
