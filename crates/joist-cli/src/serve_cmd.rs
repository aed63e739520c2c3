use std::net::SocketAddr;

use anyhow::Result;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{Html, IntoResponse};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tower_http::cors::CorsLayer;
use uuid::Uuid;

use joist_core::context::RequestContext;
use joist_core::error::OpError;
use joist_core::lifecycle::{
    EngineConfig, Outcome, material, material::MaterialInput, project, project::ProjectInput,
    task, task::TaskInput,
};
use joist_core::schedule::StartConvention;
use joist_core::views;
use joist_db::models::{Material, Project, Task, TaskStatus};
use joist_db::queries::{materials as material_db, projects as project_db, tasks as task_db, users};

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

pub struct AppError {
    status: StatusCode,
    body: serde_json::Value,
}

impl AppError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            body: serde_json::json!({ "error": msg.into() }),
        }
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            body: serde_json::json!({ "error": msg.into() }),
        }
    }

    pub fn internal(err: anyhow::Error) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            body: serde_json::json!({ "error": format!("{err:#}") }),
        }
    }
}

impl From<OpError> for AppError {
    fn from(err: OpError) -> Self {
        match err {
            OpError::Validation(errors) => Self {
                status: StatusCode::UNPROCESSABLE_ENTITY,
                body: serde_json::json!({ "errors": errors.by_field() }),
            },
            OpError::NotFound(what) => Self::not_found(format!("{what} not found")),
            OpError::Storage(err) => Self::internal(err),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        (self.status, Json(self.body)).into_response()
    }
}

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct ProjectPayload {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub start_date: Option<NaiveDate>,
    pub duration: Option<i32>,
    #[serde(default)]
    pub fixed_duration: bool,
    pub budget: Option<f64>,
    #[serde(default)]
    pub fixed_budget: bool,
}

impl ProjectPayload {
    fn into_input(self) -> ProjectInput {
        ProjectInput {
            name: self.name,
            description: self.description,
            start_date: self.start_date,
            duration: self.duration,
            fixed_duration: self.fixed_duration,
            budget: self.budget,
            fixed_budget: self.fixed_budget,
        }
    }
}

fn default_task_duration() -> i32 {
    1
}

#[derive(Debug, Deserialize)]
pub struct TaskPayload {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_task_duration")]
    pub duration: i32,
    pub budget: Option<f64>,
    #[serde(default)]
    pub fixed_budget: bool,
    pub parent: Option<Uuid>,
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub status: TaskStatus,
}

impl TaskPayload {
    fn into_input(self) -> TaskInput {
        TaskInput {
            name: self.name,
            description: self.description,
            duration: self.duration,
            budget: self.budget,
            fixed_budget: self.fixed_budget,
            parent: self.parent,
            start_date: self.start_date,
            status: self.status,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct MaterialPayload {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub unit: String,
    pub price: f64,
    pub quantity: i32,
}

impl MaterialPayload {
    fn into_input(self) -> MaterialInput {
        MaterialInput {
            name: self.name,
            description: self.description,
            unit: self.unit,
            price: self.price,
            quantity: self.quantity,
        }
    }
}

/// A committed mutation on the wire: the written row and what to do next.
#[derive(Debug, Serialize)]
pub struct MutatedResponse<T: Serialize> {
    pub value: T,
    pub outcome: Outcome,
}

#[derive(Debug, Serialize)]
pub struct OutcomeResponse {
    pub outcome: Outcome,
}

#[derive(Debug, Serialize)]
pub struct ProjectDetailResponse {
    #[serde(flatten)]
    pub project: Project,
    pub tasks: Vec<Task>,
}

#[derive(Debug, Serialize)]
pub struct TaskDetailResponse {
    #[serde(flatten)]
    pub task: Task,
    pub materials: Vec<Material>,
}

// ---------------------------------------------------------------------------
// State and auth
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub engine: EngineConfig,
}

/// Resolve the calling user from the `X-User-Email` header.
///
/// Sessions live outside this service; callers pass an identity the
/// operator provisioned with `joist user add`.
async fn require_user(pool: &PgPool, headers: &HeaderMap) -> Result<RequestContext, AppError> {
    let email = headers
        .get("x-user-email")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::unauthorized("missing X-User-Email header"))?;

    let user = users::get_user_by_email(pool, email)
        .await
        .map_err(AppError::internal)?
        .ok_or_else(|| AppError::unauthorized(format!("no user with email {email}")))?;

    Ok(RequestContext::for_user(&user))
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/api/projects", get(list_projects).post(create_project))
        .route(
            "/api/projects/{id}",
            get(get_project_detail).put(edit_project).delete(delete_project),
        )
        .route("/api/projects/{id}/tasks", post(create_task))
        .route("/api/projects/{id}/gantt", get(get_gantt))
        .route("/api/projects/{id}/quotation", get(get_quotation))
        .route(
            "/api/tasks/{id}",
            get(get_task_detail).put(edit_task).delete(delete_task),
        )
        .route("/api/tasks/{id}/materials", post(add_material))
        .route(
            "/api/materials/{id}",
            axum::routing::put(edit_material).delete(delete_material),
        )
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

pub async fn run_serve(
    pool: PgPool,
    bind: &str,
    port: u16,
    engine: EngineConfig,
) -> Result<()> {
    let app = build_router(AppState { pool, engine });
    let addr: SocketAddr = format!("{bind}:{port}").parse()?;
    tracing::info!("joist serve listening on http://{addr}");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    tracing::info!("joist serve shut down");
    Ok(())
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("failed to install Ctrl+C handler");
}

/// Parse a `--start-convention` CLI value.
pub fn parse_convention(s: &str) -> Result<StartConvention> {
    match s {
        "on-parent-end" => Ok(StartConvention::OnParentEnd),
        "day-after-parent-end" => Ok(StartConvention::DayAfterParentEnd),
        other => anyhow::bail!(
            "invalid start convention {other:?}; expected on-parent-end or day-after-parent-end"
        ),
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn index(State(state): State<AppState>) -> Result<axum::response::Response, AppError> {
    let projects = project_db::list_projects(&state.pool)
        .await
        .map_err(AppError::internal)?;

    let rows = if projects.is_empty() {
        "<tr><td colspan=\"3\">No projects yet.</td></tr>".to_string()
    } else {
        projects
            .iter()
            .map(|p| {
                format!(
                    "<tr><td><a href=\"/api/projects/{id}\">{name}</a></td><td>{start}</td><td>{id}</td></tr>",
                    id = p.id,
                    name = p.name,
                    start = p
                        .start_date
                        .map(|d| d.to_string())
                        .unwrap_or_else(|| "unscheduled".to_string()),
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    };

    let html = format!(
        "<!DOCTYPE html>\
<html><head><title>joist</title></head><body>\
<h1>joist</h1>\
<p><a href=\"/api/projects\">/api/projects</a></p>\
<table><tr><th>Project</th><th>Start</th><th>ID</th></tr>{rows}</table>\
</body></html>"
    );

    Ok(Html(html).into_response())
}

async fn list_projects(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<axum::response::Response, AppError> {
    let ctx = require_user(&state.pool, &headers).await?;

    let listed = project_db::list_projects_for_user(&state.pool, ctx.user_id)
        .await
        .map_err(AppError::internal)?;

    // The ongoing flag is re-derived on read so the dashboard never shows a
    // stale value.
    let today = Utc::now().date_naive();
    let mut results = Vec::with_capacity(listed.len());
    for project in listed {
        let refreshed = views::refresh_ongoing(&state.pool, project.id, today)
            .await
            .map_err(AppError::internal)?;
        if let Some(p) = refreshed {
            results.push(p);
        }
    }

    Ok(Json(results).into_response())
}

async fn create_project(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<ProjectPayload>,
) -> Result<axum::response::Response, AppError> {
    let ctx = require_user(&state.pool, &headers).await?;

    let committed = project::create_project(&state.pool, &ctx, &payload.into_input()).await?;

    Ok((
        StatusCode::CREATED,
        Json(MutatedResponse {
            value: committed.value,
            outcome: committed.outcome,
        }),
    )
        .into_response())
}

async fn get_project_detail(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<axum::response::Response, AppError> {
    require_user(&state.pool, &headers).await?;

    let today = Utc::now().date_naive();
    let project = views::refresh_ongoing(&state.pool, id, today)
        .await
        .map_err(AppError::internal)?
        .ok_or_else(|| AppError::not_found(format!("project {id} not found")))?;

    let tasks = task_db::list_tasks_for_project(&state.pool, id)
        .await
        .map_err(AppError::internal)?;

    Ok(Json(ProjectDetailResponse { project, tasks }).into_response())
}

async fn edit_project(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(payload): Json<ProjectPayload>,
) -> Result<axum::response::Response, AppError> {
    let ctx = require_user(&state.pool, &headers).await?;

    let committed =
        project::edit_project(&state.pool, &ctx, id, &payload.into_input(), &state.engine).await?;

    Ok(Json(MutatedResponse {
        value: committed.value,
        outcome: committed.outcome,
    })
    .into_response())
}

async fn delete_project(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<axum::response::Response, AppError> {
    let ctx = require_user(&state.pool, &headers).await?;

    let outcome = project::delete_project(&state.pool, &ctx, id).await?;

    Ok(Json(OutcomeResponse { outcome }).into_response())
}

async fn create_task(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(project_id): Path<Uuid>,
    Json(payload): Json<TaskPayload>,
) -> Result<axum::response::Response, AppError> {
    let ctx = require_user(&state.pool, &headers).await?;

    let committed =
        task::create_task(&state.pool, &ctx, project_id, &payload.into_input(), &state.engine)
            .await?;

    Ok((
        StatusCode::CREATED,
        Json(MutatedResponse {
            value: committed.value,
            outcome: committed.outcome,
        }),
    )
        .into_response())
}

async fn get_gantt(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<axum::response::Response, AppError> {
    require_user(&state.pool, &headers).await?;

    project_db::get_project(&state.pool, id)
        .await
        .map_err(AppError::internal)?
        .ok_or_else(|| AppError::not_found(format!("project {id} not found")))?;

    let bars = views::gantt_data(&state.pool, id)
        .await
        .map_err(AppError::internal)?;

    Ok(Json(bars).into_response())
}

async fn get_quotation(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<axum::response::Response, AppError> {
    require_user(&state.pool, &headers).await?;

    let quote = views::quotation(&state.pool, id)
        .await
        .map_err(AppError::internal)?
        .ok_or_else(|| AppError::not_found(format!("project {id} not found")))?;

    Ok(Json(quote).into_response())
}

async fn get_task_detail(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<axum::response::Response, AppError> {
    require_user(&state.pool, &headers).await?;

    let task = task_db::get_task(&state.pool, id)
        .await
        .map_err(AppError::internal)?
        .ok_or_else(|| AppError::not_found(format!("task {id} not found")))?;

    let materials = material_db::list_materials_for_task(&state.pool, id)
        .await
        .map_err(AppError::internal)?;

    Ok(Json(TaskDetailResponse { task, materials }).into_response())
}

async fn edit_task(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(payload): Json<TaskPayload>,
) -> Result<axum::response::Response, AppError> {
    let ctx = require_user(&state.pool, &headers).await?;

    let committed =
        task::edit_task(&state.pool, &ctx, id, &payload.into_input(), &state.engine).await?;

    Ok(Json(MutatedResponse {
        value: committed.value,
        outcome: committed.outcome,
    })
    .into_response())
}

async fn delete_task(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<axum::response::Response, AppError> {
    let ctx = require_user(&state.pool, &headers).await?;

    let outcome = task::delete_task(&state.pool, &ctx, id).await?;

    Ok(Json(OutcomeResponse { outcome }).into_response())
}

async fn add_material(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(task_id): Path<Uuid>,
    Json(payload): Json<MaterialPayload>,
) -> Result<axum::response::Response, AppError> {
    let ctx = require_user(&state.pool, &headers).await?;

    let committed =
        material::add_material(&state.pool, &ctx, task_id, &payload.into_input()).await?;

    Ok((
        StatusCode::CREATED,
        Json(MutatedResponse {
            value: committed.value,
            outcome: committed.outcome,
        }),
    )
        .into_response())
}

async fn edit_material(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(payload): Json<MaterialPayload>,
) -> Result<axum::response::Response, AppError> {
    let ctx = require_user(&state.pool, &headers).await?;

    let committed = material::edit_material(&state.pool, &ctx, id, &payload.into_input()).await?;

    Ok(Json(MutatedResponse {
        value: committed.value,
        outcome: committed.outcome,
    })
    .into_response())
}

async fn delete_material(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<axum::response::Response, AppError> {
    let ctx = require_user(&state.pool, &headers).await?;

    let outcome = material::delete_material(&state.pool, &ctx, id).await?;

    Ok(Json(OutcomeResponse { outcome }).into_response())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use sqlx::PgPool;
    use tower::ServiceExt;

    use joist_core::lifecycle::EngineConfig;
    use joist_db::queries::users::insert_user;
    use joist_test_utils::{create_test_db, drop_test_db};

    use super::{AppState, build_router, parse_convention};

    const TEST_EMAIL: &str = "owner@example.com";

    fn app(pool: PgPool) -> axum::Router {
        build_router(AppState {
            pool,
            engine: EngineConfig::default(),
        })
    }

    async fn seed_owner(pool: &PgPool) {
        insert_user(pool, "Owner", TEST_EMAIL, Some("contractor"))
            .await
            .expect("insert_user should succeed");
    }

    async fn send(
        pool: PgPool,
        method: &str,
        uri: &str,
        authed: bool,
        body: Option<serde_json::Value>,
    ) -> axum::response::Response {
        let mut builder = Request::builder().method(method).uri(uri);
        if authed {
            builder = builder.header("x-user-email", TEST_EMAIL);
        }
        let request = match body {
            Some(json) => builder
                .header("content-type", "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        app(pool).oneshot(request).await.unwrap()
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), 1_048_576)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn index_returns_html() {
        let (pool, db_name) = create_test_db().await;

        let resp = send(pool.clone(), "GET", "/", false, None).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let content_type = resp
            .headers()
            .get("content-type")
            .expect("should have content-type header")
            .to_str()
            .unwrap();
        assert!(
            content_type.contains("text/html"),
            "content-type should contain text/html, got: {content_type}"
        );

        pool.close().await;
        drop_test_db(&db_name).await;
    }

    #[tokio::test]
    async fn api_requires_known_user() {
        let (pool, db_name) = create_test_db().await;

        // No header at all.
        let resp = send(pool.clone(), "GET", "/api/projects", false, None).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        // Header naming a user that does not exist.
        let resp = send(pool.clone(), "GET", "/api/projects", true, None).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        pool.close().await;
        drop_test_db(&db_name).await;
    }

    #[tokio::test]
    async fn create_project_returns_created_row_and_anchor() {
        let (pool, db_name) = create_test_db().await;
        seed_owner(&pool).await;

        let resp = send(
            pool.clone(),
            "POST",
            "/api/projects",
            true,
            Some(serde_json::json!({
                "name": "Kitchen",
                "description": "full refit",
                "start_date": "2024-05-01"
            })),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::CREATED);
        let json = body_json(resp).await;
        assert_eq!(json["value"]["name"], "Kitchen");
        let project_id = json["value"]["id"].as_str().unwrap().to_owned();

        // The detail view shows the automatically created anchor task.
        let resp = send(pool.clone(), "GET", &format!("/api/projects/{project_id}"), true, None)
            .await;
        assert_eq!(resp.status(), StatusCode::OK);
        let detail = body_json(resp).await;
        let tasks = detail["tasks"].as_array().expect("should have tasks array");
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0]["duration"], 0);

        pool.close().await;
        drop_test_db(&db_name).await;
    }

    #[tokio::test]
    async fn validation_errors_are_keyed_by_field() {
        let (pool, db_name) = create_test_db().await;
        seed_owner(&pool).await;

        let resp = send(
            pool.clone(),
            "POST",
            "/api/projects",
            true,
            Some(serde_json::json!({ "name": "", "description": "" })),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let json = body_json(resp).await;
        assert!(json["errors"]["name"].is_array());
        assert!(json["errors"]["description"].is_array());

        pool.close().await;
        drop_test_db(&db_name).await;
    }

    #[tokio::test]
    async fn task_and_material_flow_over_http() {
        let (pool, db_name) = create_test_db().await;
        seed_owner(&pool).await;

        let resp = send(
            pool.clone(),
            "POST",
            "/api/projects",
            true,
            Some(serde_json::json!({
                "name": "Bathroom",
                "description": "renovation",
                "start_date": "2024-01-01"
            })),
        )
        .await;
        let project_id = body_json(resp).await["value"]["id"].as_str().unwrap().to_owned();

        let resp = send(
            pool.clone(),
            "POST",
            &format!("/api/projects/{project_id}/tasks"),
            true,
            Some(serde_json::json!({
                "name": "Tiling",
                "description": "walls and floor",
                "duration": 2,
                "start_date": "2024-02-01"
            })),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::CREATED);
        let task_id = body_json(resp).await["value"]["id"].as_str().unwrap().to_owned();

        let resp = send(
            pool.clone(),
            "POST",
            &format!("/api/tasks/{task_id}/materials"),
            true,
            Some(serde_json::json!({
                "name": "Tiles",
                "unit": "m2",
                "price": 40.0,
                "quantity": 12
            })),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::CREATED);
        let material = body_json(resp).await;
        assert_eq!(material["value"]["cost"], 480.0);

        let resp = send(pool.clone(), "GET", &format!("/api/tasks/{task_id}"), true, None).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let detail = body_json(resp).await;
        assert_eq!(detail["materials"].as_array().unwrap().len(), 1);
        assert_eq!(detail["budget"], 480.0);

        let resp =
            send(pool.clone(), "GET", &format!("/api/projects/{project_id}/gantt"), true, None)
                .await;
        assert_eq!(resp.status(), StatusCode::OK);
        let bars = body_json(resp).await;
        assert_eq!(bars.as_array().unwrap().len(), 1);
        assert_eq!(bars[0]["end"], "2024-02-15");

        let resp = send(
            pool.clone(),
            "GET",
            &format!("/api/projects/{project_id}/quotation"),
            true,
            None,
        )
        .await;
        assert_eq!(resp.status(), StatusCode::OK);
        let quote = body_json(resp).await;
        assert_eq!(quote["total"], 480.0);

        pool.close().await;
        drop_test_db(&db_name).await;
    }

    #[tokio::test]
    async fn quotation_for_missing_project_is_404() {
        let (pool, db_name) = create_test_db().await;
        seed_owner(&pool).await;

        let random_id = uuid::Uuid::new_v4();
        let resp = send(
            pool.clone(),
            "GET",
            &format!("/api/projects/{random_id}/quotation"),
            true,
            None,
        )
        .await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        pool.close().await;
        drop_test_db(&db_name).await;
    }

    #[test]
    fn convention_strings_parse() {
        assert!(parse_convention("on-parent-end").is_ok());
        assert!(parse_convention("day-after-parent-end").is_ok());
        assert!(parse_convention("asap").is_err());
    }
}
