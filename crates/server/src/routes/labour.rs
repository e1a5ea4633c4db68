use axum::{
    extract::{Path, Query, State},
    routing::{get, put},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::{
    db::models::{EntrySource, Labour},
    domain::{cost, validation},
    error::{AppError, Result},
    middleware::guard,
    routes::{materials::PhaseFilter, phases::phase_number},
    services::events::{ChangeEvent, Table},
    session::Session,
    AppState,
};

/// Routes nested under `/projects`.
pub fn project_routes() -> Router<AppState> {
    Router::new().route("/:id/labour", get(list_labour).post(create_labour))
}

pub fn router() -> Router<AppState> {
    Router::new().route("/:id", put(update_labour).delete(delete_labour))
}

#[derive(Debug, Deserialize)]
pub struct CreateLabourRequest {
    pub phase_number: i64,
    pub description: String,
    pub worker_name: Option<String>,
    pub hours: f64,
    pub hourly_rate: f64,
    pub vat_percentage: Option<f64>,
    #[serde(default)]
    pub source: EntrySource,
}

#[derive(Debug, Deserialize)]
pub struct UpdateLabourRequest {
    pub description: Option<String>,
    pub worker_name: Option<String>,
    pub hours: Option<f64>,
    pub hourly_rate: Option<f64>,
    pub vat_percentage: Option<f64>,
}

#[derive(Debug, Serialize)]
pub struct LabourResponse {
    #[serde(flatten)]
    pub labour: Labour,
    pub total: f64,
}

impl From<Labour> for LabourResponse {
    fn from(labour: Labour) -> Self {
        Self {
            total: cost::round_amount(cost::CostLine::total(&labour)),
            labour,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct LabourListResponse {
    pub labour: Vec<LabourResponse>,
    pub total: f64,
}

async fn list_labour(
    State(state): State<AppState>,
    session: Session,
    Path(project_id): Path<String>,
    Query(filter): Query<PhaseFilter>,
) -> Result<Json<LabourListResponse>> {
    guard::require_project_access(&state.db.pool, &session, &project_id).await?;

    let entries = match filter.phase {
        Some(number) => {
            sqlx::query_as::<_, Labour>(
                "SELECT * FROM labour WHERE project_id = ? AND phase_number = ? ORDER BY created_at ASC",
            )
            .bind(&project_id)
            .bind(phase_number(number)?)
            .fetch_all(&state.db.pool)
            .await?
        }
        None => {
            sqlx::query_as::<_, Labour>(
                "SELECT * FROM labour WHERE project_id = ? ORDER BY phase_number ASC, created_at ASC",
            )
            .bind(&project_id)
            .fetch_all(&state.db.pool)
            .await?
        }
    };

    let total = cost::round_amount(cost::sum(&entries));

    Ok(Json(LabourListResponse {
        labour: entries.into_iter().map(LabourResponse::from).collect(),
        total,
    }))
}

async fn create_labour(
    State(state): State<AppState>,
    session: Session,
    Path(project_id): Path<String>,
    Json(body): Json<CreateLabourRequest>,
) -> Result<Json<LabourResponse>> {
    guard::require_project_edit(&state.db.pool, &session, &project_id).await?;

    let vat_percentage = body.vat_percentage.unwrap_or(0.0);
    cost::validate_line(body.hours, body.hourly_rate, vat_percentage)?;

    let labour = Labour {
        id: Uuid::new_v4().to_string(),
        project_id,
        phase_number: phase_number(body.phase_number)?,
        description: validation::name("Description", &body.description)?.to_string(),
        worker_name: body.worker_name.unwrap_or_default().trim().to_string(),
        hours: body.hours,
        hourly_rate: body.hourly_rate,
        vat_percentage,
        source: body.source,
        created_at: Utc::now().to_rfc3339(),
    };

    sqlx::query(
        "INSERT INTO labour (id, project_id, phase_number, description, worker_name, hours, hourly_rate, vat_percentage, source, created_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&labour.id)
    .bind(&labour.project_id)
    .bind(labour.phase_number)
    .bind(&labour.description)
    .bind(&labour.worker_name)
    .bind(labour.hours)
    .bind(labour.hourly_rate)
    .bind(labour.vat_percentage)
    .bind(labour.source)
    .bind(&labour.created_at)
    .execute(&state.db.pool)
    .await?;

    state
        .events
        .publish(ChangeEvent::inserted(
            Table::Labour,
            &labour.project_id,
            &labour.id,
            &labour,
        ))
        .await;

    Ok(Json(LabourResponse::from(labour)))
}

async fn fetch_labour(pool: &SqlitePool, id: &str) -> Result<Labour> {
    sqlx::query_as::<_, Labour>("SELECT * FROM labour WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::NotFound("Labour entry not found".to_string()))
}

async fn update_labour(
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<String>,
    Json(body): Json<UpdateLabourRequest>,
) -> Result<Json<LabourResponse>> {
    let mut labour = fetch_labour(&state.db.pool, &id).await?;
    guard::require_project_edit(&state.db.pool, &session, &labour.project_id).await?;

    if let Some(description) = body.description {
        labour.description = validation::name("Description", &description)?.to_string();
    }
    if let Some(worker_name) = body.worker_name {
        labour.worker_name = worker_name.trim().to_string();
    }
    labour.hours = body.hours.unwrap_or(labour.hours);
    labour.hourly_rate = body.hourly_rate.unwrap_or(labour.hourly_rate);
    labour.vat_percentage = body.vat_percentage.unwrap_or(labour.vat_percentage);
    cost::validate_line(labour.hours, labour.hourly_rate, labour.vat_percentage)?;

    sqlx::query(
        "UPDATE labour SET description = ?, worker_name = ?, hours = ?, hourly_rate = ?, vat_percentage = ? WHERE id = ?",
    )
    .bind(&labour.description)
    .bind(&labour.worker_name)
    .bind(labour.hours)
    .bind(labour.hourly_rate)
    .bind(labour.vat_percentage)
    .bind(&labour.id)
    .execute(&state.db.pool)
    .await?;

    state
        .events
        .publish(ChangeEvent::updated(
            Table::Labour,
            &labour.project_id,
            &labour.id,
            &labour,
        ))
        .await;

    Ok(Json(LabourResponse::from(labour)))
}

async fn delete_labour(
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<String>,
) -> Result<Json<()>> {
    let labour = fetch_labour(&state.db.pool, &id).await?;
    guard::require_project_edit(&state.db.pool, &session, &labour.project_id).await?;

    sqlx::query("DELETE FROM labour WHERE id = ?")
        .bind(&id)
        .execute(&state.db.pool)
        .await?;

    state
        .events
        .publish(ChangeEvent::deleted(Table::Labour, &labour.project_id, &id))
        .await;

    Ok(Json(()))
}
