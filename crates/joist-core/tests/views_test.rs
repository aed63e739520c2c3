//! Integration tests for the derived read views: Gantt data, quotations,
//! and the ongoing flag.

use chrono::{Days, NaiveDate, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use joist_core::context::RequestContext;
use joist_core::lifecycle::{EngineConfig, material, project, task};
use joist_core::lifecycle::{
    material::MaterialInput, project::ProjectInput, task::TaskInput,
};
use joist_core::views;
use joist_db::models::TaskStatus;
use joist_db::queries::{projects, tasks, users};
use joist_test_utils::{create_test_db, drop_test_db};

async fn seed_ctx(pool: &PgPool) -> RequestContext {
    let email = format!("builder-{}@example.com", Uuid::new_v4().simple());
    let user = users::insert_user(pool, "Test Builder", &email, Some("contractor"))
        .await
        .expect("insert_user should succeed");
    RequestContext::for_user(&user)
}

fn date(s: &str) -> NaiveDate {
    s.parse().unwrap()
}

fn project_input(name: &str, start: Option<NaiveDate>) -> ProjectInput {
    ProjectInput {
        name: name.to_owned(),
        description: "a build".to_owned(),
        start_date: start,
        ..ProjectInput::default()
    }
}

fn dependent(name: &str, duration: i32, parent: Uuid) -> TaskInput {
    TaskInput {
        name: name.to_owned(),
        description: "some work".to_owned(),
        duration,
        parent: Some(parent),
        ..TaskInput::default()
    }
}

#[tokio::test]
async fn gantt_shapes_scheduled_tasks_and_skips_the_anchor() {
    let (pool, db_name) = create_test_db().await;
    let ctx = seed_ctx(&pool).await;
    let config = EngineConfig::default();

    let created =
        project::create_project(&pool, &ctx, &project_input("Charted", Some(date("2024-01-01"))))
            .await
            .unwrap()
            .value;
    let anchor = tasks::get_anchor_task(&pool, created.id).await.unwrap().unwrap();
    let a = task::create_task(&pool, &ctx, created.id, &dependent("Dig", 3, anchor.id), &config)
        .await
        .unwrap()
        .value;

    // Mark it completed so it reads as fully progressed.
    let mut done = dependent("Dig", 3, anchor.id);
    done.status = TaskStatus::Completed;
    task::edit_task(&pool, &ctx, a.id, &done, &config).await.unwrap();

    let bars = views::gantt_data(&pool, created.id)
        .await
        .expect("gantt_data should succeed");
    assert_eq!(bars.len(), 1);
    let bar = &bars[0];
    assert_eq!(bar.id, a.id);
    assert_eq!(bar.start, date("2024-01-01"));
    assert_eq!(bar.end, date("2024-01-22"));
    assert_eq!(bar.depends_on, Some(anchor.id));
    assert_eq!(bar.progress, 100);

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn gantt_skips_unscheduled_tasks() {
    let (pool, db_name) = create_test_db().await;
    let ctx = seed_ctx(&pool).await;
    let config = EngineConfig::default();

    // No project start date, so dependent tasks have no dates yet.
    let created = project::create_project(&pool, &ctx, &project_input("Dateless", None))
        .await
        .unwrap()
        .value;
    let anchor = tasks::get_anchor_task(&pool, created.id).await.unwrap().unwrap();
    task::create_task(&pool, &ctx, created.id, &dependent("Float", 1, anchor.id), &config)
        .await
        .unwrap();

    let bars = views::gantt_data(&pool, created.id).await.unwrap();
    assert!(bars.is_empty());

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn quotation_totals_material_costs_per_task() {
    let (pool, db_name) = create_test_db().await;
    let ctx = seed_ctx(&pool).await;
    let config = EngineConfig::default();

    let created =
        project::create_project(&pool, &ctx, &project_input("Quoted", Some(date("2024-01-01"))))
            .await
            .unwrap()
            .value;
    let anchor = tasks::get_anchor_task(&pool, created.id).await.unwrap().unwrap();
    let a = task::create_task(&pool, &ctx, created.id, &dependent("Walls", 2, anchor.id), &config)
        .await
        .unwrap()
        .value;
    let b = task::create_task(&pool, &ctx, created.id, &dependent("Roof", 1, a.id), &config)
        .await
        .unwrap()
        .value;

    material::add_material(
        &pool,
        &ctx,
        a.id,
        &MaterialInput {
            name: "Brick".to_owned(),
            description: "red".to_owned(),
            unit: "pallet".to_owned(),
            price: 200.0,
            quantity: 2,
        },
    )
    .await
    .unwrap();
    material::add_material(
        &pool,
        &ctx,
        b.id,
        &MaterialInput {
            name: "Shingles".to_owned(),
            description: "asphalt".to_owned(),
            unit: "bundle".to_owned(),
            price: 30.0,
            quantity: 10,
        },
    )
    .await
    .unwrap();

    let quote = views::quotation(&pool, created.id)
        .await
        .expect("quotation should succeed")
        .expect("project should exist");

    assert_eq!(quote.project_name, "Quoted");
    assert_eq!(quote.lines.len(), 2);
    let walls = quote.lines.iter().find(|l| l.task_id == a.id).unwrap();
    assert_eq!(walls.cost, 400.0);
    assert_eq!(walls.materials.len(), 1);
    let roof = quote.lines.iter().find(|l| l.task_id == b.id).unwrap();
    assert_eq!(roof.cost, 300.0);
    assert_eq!(quote.total, 700.0);

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn quotation_for_missing_project_is_none() {
    let (pool, db_name) = create_test_db().await;

    let quote = views::quotation(&pool, Uuid::new_v4()).await.unwrap();
    assert!(quote.is_none());

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn ongoing_flag_follows_the_scheduled_span() {
    let (pool, db_name) = create_test_db().await;
    let ctx = seed_ctx(&pool).await;
    let config = EngineConfig::default();
    let today = Utc::now().date_naive();

    // Started last week, runs four weeks: ongoing.
    let started = today - Days::new(7);
    let mut input = project_input("Active", Some(started));
    input.duration = Some(4);
    input.fixed_duration = true;
    let active = project::create_project(&pool, &ctx, &input).await.unwrap().value;
    assert!(!active.is_ongoing);

    let refreshed = views::refresh_ongoing(&pool, active.id, today)
        .await
        .unwrap()
        .expect("project should exist");
    assert!(refreshed.is_ongoing);
    let stored = projects::get_project(&pool, active.id).await.unwrap().unwrap();
    assert!(stored.is_ongoing);

    // Ended weeks ago: flag clears again.
    let mut over = project_input("Active", Some(today - Days::new(70)));
    over.duration = Some(4);
    over.fixed_duration = true;
    project::edit_project(&pool, &ctx, active.id, &over, &config).await.unwrap();
    let refreshed = views::refresh_ongoing(&pool, active.id, today).await.unwrap().unwrap();
    assert!(!refreshed.is_ongoing);

    // Starts in the future: not ongoing.
    let mut upcoming = project_input("Active", Some(today + Days::new(7)));
    upcoming.duration = Some(4);
    upcoming.fixed_duration = true;
    project::edit_project(&pool, &ctx, active.id, &upcoming, &config).await.unwrap();
    let refreshed = views::refresh_ongoing(&pool, active.id, today).await.unwrap().unwrap();
    assert!(!refreshed.is_ongoing);

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn project_without_schedule_is_never_ongoing() {
    let (pool, db_name) = create_test_db().await;
    let ctx = seed_ctx(&pool).await;
    let today = Utc::now().date_naive();

    let created = project::create_project(&pool, &ctx, &project_input("Unscheduled", None))
        .await
        .unwrap()
        .value;

    let refreshed = views::refresh_ongoing(&pool, created.id, today).await.unwrap().unwrap();
    assert!(!refreshed.is_ongoing);

    pool.close().await;
    drop_test_db(&db_name).await;
}
