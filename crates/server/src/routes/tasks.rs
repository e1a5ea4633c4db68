use axum::{
    extract::{Path, State},
    routing::{get, put},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::{
    db::models::Task,
    domain::{validation, Permission},
    error::{AppError, Result},
    middleware::guard,
    routes::phases::fetch_project,
    services::events::{ChangeEvent, Table},
    session::Session,
    AppState,
};

/// Routes nested under `/projects`.
pub fn project_routes() -> Router<AppState> {
    Router::new().route("/:id/tasks", get(list_tasks).post(create_task))
}

pub fn router() -> Router<AppState> {
    Router::new().route("/:id", put(update_task).delete(delete_task))
}

#[derive(Debug, Deserialize)]
pub struct CreateTaskRequest {
    pub title: String,
    pub description: Option<String>,
    pub assignee_id: Option<String>,
    pub due_date: Option<String>,
}

/// `assignee_id` and `due_date` accept `null` to clear the value.
#[derive(Debug, Deserialize)]
pub struct UpdateTaskRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    #[serde(default, with = "double_option")]
    pub assignee_id: Option<Option<String>>,
    #[serde(default, with = "double_option")]
    pub due_date: Option<Option<String>>,
    pub completed: Option<bool>,
}

mod double_option {
    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
    where
        D: Deserializer<'de>,
        T: Deserialize<'de>,
    {
        Option::<T>::deserialize(deserializer).map(Some)
    }
}

#[derive(Debug, Serialize)]
pub struct TaskListResponse {
    pub tasks: Vec<Task>,
}

async fn list_tasks(
    State(state): State<AppState>,
    session: Session,
    Path(project_id): Path<String>,
) -> Result<Json<TaskListResponse>> {
    guard::require_project_access(&state.db.pool, &session, &project_id).await?;

    let tasks = sqlx::query_as::<_, Task>(
        "SELECT * FROM tasks WHERE project_id = ? ORDER BY completed ASC, due_date IS NULL, due_date ASC, created_at ASC",
    )
    .bind(&project_id)
    .fetch_all(&state.db.pool)
    .await?;

    Ok(Json(TaskListResponse { tasks }))
}

async fn ensure_assignee(pool: &SqlitePool, assignee_id: Option<&str>) -> Result<()> {
    let Some(assignee_id) = assignee_id else {
        return Ok(());
    };
    let exists = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM team_members WHERE id = ?")
        .bind(assignee_id)
        .fetch_one(pool)
        .await?;
    if exists == 0 {
        return Err(AppError::Validation("Assignee is not a team member".to_string()));
    }
    Ok(())
}

fn due_date(value: Option<&str>) -> Result<Option<String>> {
    Ok(validation::optional_date("Due date", value)?.map(|d| d.to_string()))
}

async fn create_task(
    State(state): State<AppState>,
    session: Session,
    Path(project_id): Path<String>,
    Json(body): Json<CreateTaskRequest>,
) -> Result<Json<Task>> {
    let user = session.require(Permission::ManageTasks)?;
    let project = fetch_project(&state.db.pool, &project_id).await?;

    ensure_assignee(&state.db.pool, body.assignee_id.as_deref()).await?;

    let task = Task {
        id: Uuid::new_v4().to_string(),
        project_id: project.id,
        title: validation::name("Title", &body.title)?.to_string(),
        description: body.description.unwrap_or_default().trim().to_string(),
        assignee_id: body.assignee_id,
        due_date: due_date(body.due_date.as_deref())?,
        completed: false,
        created_by: user.id,
        created_at: Utc::now().to_rfc3339(),
    };

    sqlx::query(
        "INSERT INTO tasks (id, project_id, title, description, assignee_id, due_date, completed, created_by, created_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&task.id)
    .bind(&task.project_id)
    .bind(&task.title)
    .bind(&task.description)
    .bind(&task.assignee_id)
    .bind(&task.due_date)
    .bind(task.completed)
    .bind(&task.created_by)
    .bind(&task.created_at)
    .execute(&state.db.pool)
    .await?;

    state
        .events
        .publish(ChangeEvent::inserted(Table::Tasks, &task.project_id, &task.id, &task))
        .await;

    Ok(Json(task))
}

async fn fetch_task(pool: &SqlitePool, id: &str) -> Result<Task> {
    sqlx::query_as::<_, Task>("SELECT * FROM tasks WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::NotFound("Task not found".to_string()))
}

async fn update_task(
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<String>,
    Json(body): Json<UpdateTaskRequest>,
) -> Result<Json<Task>> {
    session.require(Permission::ManageTasks)?;
    let mut task = fetch_task(&state.db.pool, &id).await?;

    if let Some(title) = body.title {
        task.title = validation::name("Title", &title)?.to_string();
    }
    if let Some(description) = body.description {
        task.description = description.trim().to_string();
    }
    if let Some(assignee_id) = body.assignee_id {
        ensure_assignee(&state.db.pool, assignee_id.as_deref()).await?;
        task.assignee_id = assignee_id;
    }
    if let Some(value) = body.due_date {
        task.due_date = due_date(value.as_deref())?;
    }
    task.completed = body.completed.unwrap_or(task.completed);

    sqlx::query(
        "UPDATE tasks SET title = ?, description = ?, assignee_id = ?, due_date = ?, completed = ? WHERE id = ?",
    )
    .bind(&task.title)
    .bind(&task.description)
    .bind(&task.assignee_id)
    .bind(&task.due_date)
    .bind(task.completed)
    .bind(&task.id)
    .execute(&state.db.pool)
    .await?;

    state
        .events
        .publish(ChangeEvent::updated(Table::Tasks, &task.project_id, &task.id, &task))
        .await;

    Ok(Json(task))
}

async fn delete_task(
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<String>,
) -> Result<Json<()>> {
    session.require(Permission::ManageTasks)?;
    let task = fetch_task(&state.db.pool, &id).await?;

    sqlx::query("DELETE FROM tasks WHERE id = ?")
        .bind(&id)
        .execute(&state.db.pool)
        .await?;

    state
        .events
        .publish(ChangeEvent::deleted(Table::Tasks, &task.project_id, &id))
        .await;

    Ok(Json(()))
}
