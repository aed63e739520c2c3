//! Read-only derivations: Gantt chart data, quotations, and the project's
//! ongoing flag. Nothing here participates in validation; these views shape
//! stored rows for presentation.

use anyhow::Result;
use chrono::NaiveDate;
use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

use joist_db::models::{Material, Project, TaskStatus};
use joist_db::queries::{materials, projects, tasks};

use crate::schedule;

/// One bar on the Gantt chart.
#[derive(Debug, Clone, Serialize)]
pub struct GanttTask {
    pub id: Uuid,
    pub name: String,
    pub start: NaiveDate,
    pub end: NaiveDate,
    /// The parent task, rendered as a dependency arrow.
    pub depends_on: Option<Uuid>,
    /// Percent complete. Completed tasks read 100, everything else 0.
    pub progress: u8,
}

/// Tasks of a project shaped for a Gantt chart.
///
/// The scheduling anchor and tasks without a start date are left out; a bar
/// needs a span to draw.
pub async fn gantt_data(pool: &PgPool, project_id: Uuid) -> Result<Vec<GanttTask>> {
    let rows = tasks::list_tasks_for_project(pool, project_id).await?;

    let bars = rows
        .into_iter()
        .filter(|t| !t.is_anchor())
        .filter_map(|t| {
            let start = t.start_date?;
            Some(GanttTask {
                id: t.id,
                name: t.name,
                start,
                end: schedule::end_date(start, t.duration),
                depends_on: t.parent_task_id,
                progress: if t.status == TaskStatus::Completed { 100 } else { 0 },
            })
        })
        .collect();

    Ok(bars)
}

/// One task's line on a quotation.
#[derive(Debug, Clone, Serialize)]
pub struct QuotationLine {
    pub task_id: Uuid,
    pub task_name: String,
    pub materials: Vec<Material>,
    /// Sum of the line's material costs.
    pub cost: f64,
}

/// A client-facing cost breakdown for a project.
#[derive(Debug, Clone, Serialize)]
pub struct Quotation {
    pub project_id: Uuid,
    pub project_name: String,
    pub lines: Vec<QuotationLine>,
    pub total: f64,
}

/// Build the quotation for a project: every non-anchor task with its
/// materials and line total, plus the grand total.
pub async fn quotation(pool: &PgPool, project_id: Uuid) -> Result<Option<Quotation>> {
    let Some(project) = projects::get_project(pool, project_id).await? else {
        return Ok(None);
    };

    let rows = tasks::list_tasks_for_project(pool, project_id).await?;
    let mut lines = Vec::with_capacity(rows.len());
    let mut total = 0.0;

    for task in rows.into_iter().filter(|t| !t.is_anchor()) {
        let mats = materials::list_materials_for_task(pool, task.id).await?;
        let cost: f64 = mats.iter().map(|m| m.cost).sum();
        total += cost;
        lines.push(QuotationLine {
            task_id: task.id,
            task_name: task.name,
            materials: mats,
            cost,
        });
    }

    Ok(Some(Quotation {
        project_id,
        project_name: project.name,
        lines,
        total,
    }))
}

/// Re-derive a project's `is_ongoing` flag as of `today`.
///
/// Ongoing means today falls inside the project's scheduled span, start
/// and end inclusive. Projects without a start date or duration are never
/// ongoing. The stored flag is updated only when it differs, so polling
/// this is cheap.
pub async fn refresh_ongoing(
    pool: &PgPool,
    project_id: Uuid,
    today: NaiveDate,
) -> Result<Option<Project>> {
    let Some(mut project) = projects::get_project(pool, project_id).await? else {
        return Ok(None);
    };

    let ongoing = match (project.start_date, project.duration) {
        (Some(start), Some(weeks)) => {
            let end = schedule::end_date(start, weeks);
            today >= start && today <= end
        }
        _ => false,
    };

    if ongoing != project.is_ongoing {
        projects::set_project_ongoing(pool, project_id, ongoing).await?;
        project.is_ongoing = ongoing;
        tracing::debug!(project_id = %project_id, ongoing, "ongoing flag updated");
    }

    Ok(Some(project))
}
