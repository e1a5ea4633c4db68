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
    db::models::{EntrySource, Material},
    domain::{cost, validation},
    error::{AppError, Result},
    middleware::guard,
    routes::phases::phase_number,
    services::events::{ChangeEvent, Table},
    session::Session,
    AppState,
};

/// Routes nested under `/projects`.
pub fn project_routes() -> Router<AppState> {
    Router::new().route("/:id/materials", get(list_materials).post(create_material))
}

pub fn router() -> Router<AppState> {
    Router::new().route("/:id", put(update_material).delete(delete_material))
}

#[derive(Debug, Deserialize)]
pub struct PhaseFilter {
    pub phase: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct CreateMaterialRequest {
    pub phase_number: i64,
    pub name: String,
    pub category: String,
    pub quantity: f64,
    pub unit: Option<String>,
    pub unit_cost: f64,
    pub vat_percentage: Option<f64>,
    #[serde(default)]
    pub source: EntrySource,
}

#[derive(Debug, Deserialize)]
pub struct UpdateMaterialRequest {
    pub name: Option<String>,
    pub category: Option<String>,
    pub quantity: Option<f64>,
    pub unit: Option<String>,
    pub unit_cost: Option<f64>,
    pub vat_percentage: Option<f64>,
}

#[derive(Debug, Serialize)]
pub struct MaterialResponse {
    #[serde(flatten)]
    pub material: Material,
    pub total: f64,
}

impl From<Material> for MaterialResponse {
    fn from(material: Material) -> Self {
        Self {
            total: cost::round_amount(cost::CostLine::total(&material)),
            material,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct MaterialListResponse {
    pub materials: Vec<MaterialResponse>,
    pub total: f64,
}

async fn list_materials(
    State(state): State<AppState>,
    session: Session,
    Path(project_id): Path<String>,
    Query(filter): Query<PhaseFilter>,
) -> Result<Json<MaterialListResponse>> {
    guard::require_project_access(&state.db.pool, &session, &project_id).await?;

    let materials = match filter.phase {
        Some(number) => {
            sqlx::query_as::<_, Material>(
                "SELECT * FROM materials WHERE project_id = ? AND phase_number = ? ORDER BY created_at ASC",
            )
            .bind(&project_id)
            .bind(phase_number(number)?)
            .fetch_all(&state.db.pool)
            .await?
        }
        None => {
            sqlx::query_as::<_, Material>(
                "SELECT * FROM materials WHERE project_id = ? ORDER BY phase_number ASC, created_at ASC",
            )
            .bind(&project_id)
            .fetch_all(&state.db.pool)
            .await?
        }
    };

    let total = cost::round_amount(cost::sum(&materials));

    Ok(Json(MaterialListResponse {
        materials: materials.into_iter().map(MaterialResponse::from).collect(),
        total,
    }))
}

async fn create_material(
    State(state): State<AppState>,
    session: Session,
    Path(project_id): Path<String>,
    Json(body): Json<CreateMaterialRequest>,
) -> Result<Json<MaterialResponse>> {
    guard::require_project_edit(&state.db.pool, &session, &project_id).await?;

    let vat_percentage = body.vat_percentage.unwrap_or(0.0);
    cost::validate_line(body.quantity, body.unit_cost, vat_percentage)?;

    let material = Material {
        id: Uuid::new_v4().to_string(),
        project_id,
        phase_number: phase_number(body.phase_number)?,
        name: validation::name("Material name", &body.name)?.to_string(),
        category: validation::name("Category", &body.category)?.to_string(),
        quantity: body.quantity,
        unit: body.unit.unwrap_or_default().trim().to_string(),
        unit_cost: body.unit_cost,
        vat_percentage,
        source: body.source,
        created_at: Utc::now().to_rfc3339(),
    };

    sqlx::query(
        "INSERT INTO materials (id, project_id, phase_number, name, category, quantity, unit, unit_cost, vat_percentage, source, created_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&material.id)
    .bind(&material.project_id)
    .bind(material.phase_number)
    .bind(&material.name)
    .bind(&material.category)
    .bind(material.quantity)
    .bind(&material.unit)
    .bind(material.unit_cost)
    .bind(material.vat_percentage)
    .bind(material.source)
    .bind(&material.created_at)
    .execute(&state.db.pool)
    .await?;

    state
        .events
        .publish(ChangeEvent::inserted(
            Table::Materials,
            &material.project_id,
            &material.id,
            &material,
        ))
        .await;

    Ok(Json(MaterialResponse::from(material)))
}

async fn fetch_material(pool: &SqlitePool, id: &str) -> Result<Material> {
    sqlx::query_as::<_, Material>("SELECT * FROM materials WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::NotFound("Material not found".to_string()))
}

async fn update_material(
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<String>,
    Json(body): Json<UpdateMaterialRequest>,
) -> Result<Json<MaterialResponse>> {
    let mut material = fetch_material(&state.db.pool, &id).await?;
    guard::require_project_edit(&state.db.pool, &session, &material.project_id).await?;

    if let Some(name) = body.name {
        material.name = validation::name("Material name", &name)?.to_string();
    }
    if let Some(category) = body.category {
        material.category = validation::name("Category", &category)?.to_string();
    }
    if let Some(unit) = body.unit {
        material.unit = unit.trim().to_string();
    }
    material.quantity = body.quantity.unwrap_or(material.quantity);
    material.unit_cost = body.unit_cost.unwrap_or(material.unit_cost);
    material.vat_percentage = body.vat_percentage.unwrap_or(material.vat_percentage);
    cost::validate_line(material.quantity, material.unit_cost, material.vat_percentage)?;

    sqlx::query(
        "UPDATE materials SET name = ?, category = ?, quantity = ?, unit = ?, unit_cost = ?, vat_percentage = ? WHERE id = ?",
    )
    .bind(&material.name)
    .bind(&material.category)
    .bind(material.quantity)
    .bind(&material.unit)
    .bind(material.unit_cost)
    .bind(material.vat_percentage)
    .bind(&material.id)
    .execute(&state.db.pool)
    .await?;

    state
        .events
        .publish(ChangeEvent::updated(
            Table::Materials,
            &material.project_id,
            &material.id,
            &material,
        ))
        .await;

    Ok(Json(MaterialResponse::from(material)))
}

async fn delete_material(
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<String>,
) -> Result<Json<()>> {
    let material = fetch_material(&state.db.pool, &id).await?;
    guard::require_project_edit(&state.db.pool, &session, &material.project_id).await?;

    sqlx::query("DELETE FROM materials WHERE id = ?")
        .bind(&id)
        .execute(&state.db.pool)
        .await?;

    state
        .events
        .publish(ChangeEvent::deleted(Table::Materials, &material.project_id, &id))
        .await;

    Ok(Json(()))
}
