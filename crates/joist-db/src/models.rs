use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Reserved name of the anchor task created with every project. It represents
/// "start of project" and is the root of schedule propagation.
pub const ANCHOR_TASK_NAME: &str = "Start of project";

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Execution status of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
        };
        f.write_str(s)
    }
}

impl FromStr for TaskStatus {
    type Err = TaskStatusParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "in_progress" => Ok(Self::InProgress),
            "completed" => Ok(Self::Completed),
            other => Err(TaskStatusParseError(other.to_owned())),
        }
    }
}

/// Error returned when parsing an invalid [`TaskStatus`] string.
#[derive(Debug, Clone, thiserror::Error)]
#[error("invalid task status: {0:?}")]
pub struct TaskStatusParseError(pub String);

// ---------------------------------------------------------------------------
// Row structs
// ---------------------------------------------------------------------------

/// An identity row. Authentication is handled outside the engine; this is
/// only what `created_by` stamping and project scoping need.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A project -- the top-level unit of work for a contractor.
///
/// `budget` and `duration` are dual-mode: when the matching `fixed_*` flag is
/// set they are user-fixed values, otherwise they hold the rollup sum over
/// the project's tasks.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Project {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub is_ongoing: bool,
    pub start_date: Option<NaiveDate>,
    /// Weeks.
    pub duration: Option<i32>,
    pub budget: Option<f64>,
    pub fixed_budget: bool,
    pub fixed_duration: bool,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
}

/// A task within a project. Tasks form a forest via `parent_task_id`; the
/// anchor task (name [`ANCHOR_TASK_NAME`], no parent) is the single root.
///
/// Every non-anchor task has either an explicit `start_date` or a parent,
/// never both. A task scheduled through its parent starts when the parent
/// finishes, per the configured start convention.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Task {
    pub id: Uuid,
    pub project_id: Uuid,
    pub parent_task_id: Option<Uuid>,
    pub name: String,
    pub description: String,
    pub start_date: Option<NaiveDate>,
    /// Weeks.
    pub duration: i32,
    pub status: TaskStatus,
    pub budget: Option<f64>,
    pub fixed_budget: bool,
    pub amount_spent: Option<f64>,
    pub created_at: DateTime<Utc>,
}

impl Task {
    /// Whether this is the project's anchor task.
    pub fn is_anchor(&self) -> bool {
        self.parent_task_id.is_none() && self.name == ANCHOR_TASK_NAME
    }
}

/// A material line item belonging to a task. `cost` is maintained as
/// `price * quantity` on every write and is what rolls up into the owning
/// task's budget.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Material {
    pub id: Uuid,
    pub task_id: Uuid,
    pub name: String,
    pub description: String,
    pub unit: String,
    pub price: f64,
    pub quantity: i32,
    pub cost: f64,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_status_display_roundtrip() {
        let variants = [
            TaskStatus::Pending,
            TaskStatus::InProgress,
            TaskStatus::Completed,
        ];
        for v in &variants {
            let s = v.to_string();
            let parsed: TaskStatus = s.parse().expect("should parse");
            assert_eq!(*v, parsed);
        }
    }

    #[test]
    fn task_status_invalid() {
        let result = "done".parse::<TaskStatus>();
        assert!(result.is_err());
    }

    #[test]
    fn anchor_detection() {
        let task = Task {
            id: Uuid::new_v4(),
            project_id: Uuid::new_v4(),
            parent_task_id: None,
            name: ANCHOR_TASK_NAME.to_owned(),
            description: String::new(),
            start_date: None,
            duration: 0,
            status: TaskStatus::Pending,
            budget: Some(0.0),
            fixed_budget: false,
            amount_spent: None,
            created_at: Utc::now(),
        };
        assert!(task.is_anchor());

        let mut named_like_anchor = task.clone();
        named_like_anchor.parent_task_id = Some(Uuid::new_v4());
        assert!(!named_like_anchor.is_anchor());
    }
}
