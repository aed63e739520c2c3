//! Integration tests for the query layer: CRUD over users, projects, tasks,
//! and materials, plus the rollup and subtree helpers the engine builds on.

use chrono::NaiveDate;
use sqlx::PgPool;
use uuid::Uuid;

use joist_db::models::{Project, Task, TaskStatus, User};
use joist_db::queries::{materials, projects, tasks, users};
use joist_test_utils::{create_test_db, drop_test_db};

fn date(s: &str) -> NaiveDate {
    s.parse().unwrap()
}

async fn seed_user(pool: &PgPool) -> User {
    let email = format!("user-{}@example.com", Uuid::new_v4().simple());
    users::insert_user(pool, "Some Builder", &email, Some("contractor"))
        .await
        .expect("insert_user should succeed")
}

async fn seed_project(pool: &PgPool, user: &User) -> Project {
    projects::insert_project(
        pool,
        &projects::NewProject {
            name: "Test project",
            description: "for the query layer",
            start_date: Some(date("2024-01-01")),
            duration: Some(0),
            budget: Some(0.0),
            fixed_budget: false,
            fixed_duration: false,
            created_by: user.id,
        },
    )
    .await
    .expect("insert_project should succeed")
}

async fn seed_task(
    pool: &PgPool,
    project: &Project,
    parent: Option<Uuid>,
    name: &str,
    budget: f64,
    duration: i32,
) -> Task {
    tasks::insert_task(
        pool,
        &tasks::NewTask {
            project_id: project.id,
            parent_task_id: parent,
            name,
            description: "work",
            start_date: None,
            duration,
            budget: Some(budget),
            fixed_budget: false,
        },
    )
    .await
    .expect("insert_task should succeed")
}

#[tokio::test]
async fn user_insert_and_lookup_by_email() {
    let (pool, db_name) = create_test_db().await;

    let user = seed_user(&pool).await;
    assert_eq!(user.role.as_deref(), Some("contractor"));

    let by_email = users::get_user_by_email(&pool, &user.email)
        .await
        .expect("get_user_by_email should succeed")
        .expect("user should exist");
    assert_eq!(by_email.id, user.id);

    assert!(
        users::get_user_by_email(&pool, "nobody@example.com")
            .await
            .unwrap()
            .is_none()
    );

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn project_insert_defaults_and_listing() {
    let (pool, db_name) = create_test_db().await;
    let user = seed_user(&pool).await;

    let project = seed_project(&pool, &user).await;
    assert!(!project.is_ongoing);
    assert_eq!(project.created_by, user.id);

    let other_user = seed_user(&pool).await;
    let listed = projects::list_projects_for_user(&pool, user.id).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert!(
        projects::list_projects_for_user(&pool, other_user.id)
            .await
            .unwrap()
            .is_empty()
    );

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn task_insert_defaults_to_pending() {
    let (pool, db_name) = create_test_db().await;
    let user = seed_user(&pool).await;
    let project = seed_project(&pool, &user).await;

    let task = seed_task(&pool, &project, None, "Groundwork", 100.0, 2).await;
    assert_eq!(task.status, TaskStatus::Pending);
    assert!(task.start_date.is_none());

    let updated = tasks::update_task(
        &pool,
        task.id,
        "Groundwork",
        "work",
        None,
        Some(date("2024-02-01")),
        3,
        TaskStatus::InProgress,
        Some(150.0),
        false,
    )
    .await
    .unwrap();
    assert_eq!(updated, 1);

    let fetched = tasks::get_task(&pool, task.id).await.unwrap().unwrap();
    assert_eq!(fetched.status, TaskStatus::InProgress);
    assert_eq!(fetched.duration, 3);
    assert_eq!(fetched.budget, Some(150.0));

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn set_start_date_returns_duration_for_propagation() {
    let (pool, db_name) = create_test_db().await;
    let user = seed_user(&pool).await;
    let project = seed_project(&pool, &user).await;
    let task = seed_task(&pool, &project, None, "Scheduled", 0.0, 4).await;

    let duration = tasks::set_start_date_returning_duration(&pool, task.id, date("2024-03-01"))
        .await
        .unwrap();
    assert_eq!(duration, Some(4));

    let missing = tasks::set_start_date_returning_duration(&pool, Uuid::new_v4(), date("2024-03-01"))
        .await
        .unwrap();
    assert!(missing.is_none());

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn rollup_sums_and_adjustments() {
    let (pool, db_name) = create_test_db().await;
    let user = seed_user(&pool).await;
    let project = seed_project(&pool, &user).await;

    seed_task(&pool, &project, None, "One", 100.0, 1).await;
    seed_task(&pool, &project, None, "Two", 250.0, 2).await;

    assert_eq!(tasks::sum_budgets_for_project(&pool, project.id).await.unwrap(), 350.0);
    assert_eq!(tasks::sum_durations_for_project(&pool, project.id).await.unwrap(), 3);

    projects::adjust_project_budget(&pool, project.id, 350.0).await.unwrap();
    projects::adjust_project_duration(&pool, project.id, 3).await.unwrap();
    projects::adjust_project_budget(&pool, project.id, -100.0).await.unwrap();

    let fetched = projects::get_project(&pool, project.id).await.unwrap().unwrap();
    assert_eq!(fetched.budget, Some(250.0));
    assert_eq!(fetched.duration, Some(3));

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn subtree_totals_and_membership() {
    let (pool, db_name) = create_test_db().await;
    let user = seed_user(&pool).await;
    let project = seed_project(&pool, &user).await;

    let root = seed_task(&pool, &project, None, "Root", 100.0, 1).await;
    let mid = seed_task(&pool, &project, Some(root.id), "Mid", 200.0, 2).await;
    let leaf = seed_task(&pool, &project, Some(mid.id), "Leaf", 50.0, 1).await;
    let outside = seed_task(&pool, &project, None, "Outside", 999.0, 9).await;

    let (budget, duration) = tasks::subtree_totals(&pool, root.id).await.unwrap();
    assert_eq!(budget, 350.0);
    assert_eq!(duration, 4);

    assert!(tasks::is_in_subtree(&pool, root.id, leaf.id).await.unwrap());
    assert!(tasks::is_in_subtree(&pool, root.id, root.id).await.unwrap());
    assert!(!tasks::is_in_subtree(&pool, root.id, outside.id).await.unwrap());
    assert!(!tasks::is_in_subtree(&pool, leaf.id, root.id).await.unwrap());

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn deleting_a_task_cascades_to_descendants_and_materials() {
    let (pool, db_name) = create_test_db().await;
    let user = seed_user(&pool).await;
    let project = seed_project(&pool, &user).await;

    let root = seed_task(&pool, &project, None, "Root", 0.0, 1).await;
    let child = seed_task(&pool, &project, Some(root.id), "Child", 0.0, 1).await;
    let material = materials::insert_material(
        &pool,
        &materials::NewMaterial {
            task_id: child.id,
            name: "Nails",
            description: "galvanised",
            unit: "box",
            price: 12.0,
            quantity: 5,
        },
    )
    .await
    .unwrap();
    assert_eq!(material.cost, 60.0);

    let deleted = tasks::delete_task(&pool, root.id).await.unwrap();
    assert_eq!(deleted, 1);

    assert!(tasks::get_task(&pool, child.id).await.unwrap().is_none());
    assert!(materials::get_material(&pool, material.id).await.unwrap().is_none());

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn material_update_rederives_cost() {
    let (pool, db_name) = create_test_db().await;
    let user = seed_user(&pool).await;
    let project = seed_project(&pool, &user).await;
    let task = seed_task(&pool, &project, None, "Fit-out", 0.0, 1).await;

    let material = materials::insert_material(
        &pool,
        &materials::NewMaterial {
            task_id: task.id,
            name: "Plasterboard",
            description: "12mm",
            unit: "sheet",
            price: 20.0,
            quantity: 10,
        },
    )
    .await
    .unwrap();
    assert_eq!(material.cost, 200.0);

    materials::update_material(&pool, material.id, "Plasterboard", "15mm", "sheet", 25.0, 6)
        .await
        .unwrap();

    let fetched = materials::get_material(&pool, material.id).await.unwrap().unwrap();
    assert_eq!(fetched.cost, 150.0);
    assert_eq!(fetched.price, 25.0);
    assert_eq!(fetched.quantity, 6);

    assert_eq!(materials::sum_costs_for_task(&pool, task.id).await.unwrap(), 150.0);

    let listed = materials::list_materials_for_task(&pool, task.id).await.unwrap();
    assert_eq!(listed.len(), 1);

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn self_parent_rejected_by_schema() {
    let (pool, db_name) = create_test_db().await;
    let user = seed_user(&pool).await;
    let project = seed_project(&pool, &user).await;
    let task = seed_task(&pool, &project, None, "Loner", 0.0, 1).await;

    let result = sqlx::query("UPDATE tasks SET parent_task_id = id WHERE id = $1")
        .bind(task.id)
        .execute(&pool)
        .await;
    assert!(result.is_err(), "check constraint should reject self-parenting");

    pool.close().await;
    drop_test_db(&db_name).await;
}
