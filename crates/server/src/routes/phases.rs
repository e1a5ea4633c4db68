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
    db::models::{ChecklistItem, Labour, Material, PhaseDetails, Project},
    domain::{
        cost,
        phase::{self, PhaseSlot},
        validation, PhaseState, Role,
    },
    error::{AppError, Result},
    middleware::guard,
    services::events::{ChangeEvent, Table},
    session::Session,
    AppState,
};

/// Routes nested under `/projects`.
pub fn project_routes() -> Router<AppState> {
    Router::new()
        .route("/:id/phases", get(list_phases))
        .route("/:id/phases/:number", get(get_phase).put(update_phase))
        .route("/:id/phases/:number/override", put(set_override))
        .route(
            "/:id/phases/:number/checklist",
            get(list_checklist).post(add_checklist_item),
        )
}

pub fn checklist_router() -> Router<AppState> {
    Router::new().route("/:id", put(update_checklist_item).delete(delete_checklist_item))
}

#[derive(Debug, Serialize)]
pub struct PhaseView {
    #[serde(flatten)]
    pub slot: PhaseSlot,
    pub manual_state: Option<PhaseState>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub notes: String,
    pub checklist_total: i64,
    pub checklist_checked: i64,
}

#[derive(Debug, Serialize)]
pub struct PhaseDetailResponse {
    pub phase: PhaseView,
    pub checklist: Vec<ChecklistItem>,
    pub materials: Vec<Material>,
    pub labour: Vec<Labour>,
    pub materials_total: f64,
    pub labour_total: f64,
    pub total: f64,
}

#[derive(Debug, Deserialize)]
pub struct UpdatePhaseRequest {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct OverrideRequest {
    pub state: Option<PhaseState>,
}

#[derive(Debug, Deserialize)]
pub struct CreateChecklistItemRequest {
    pub label: String,
    pub required: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateChecklistItemRequest {
    pub label: Option<String>,
    pub required: Option<bool>,
    pub checked: Option<bool>,
}

pub(crate) fn phase_number(number: i64) -> Result<i64> {
    if !phase::is_valid_phase(number) {
        return Err(AppError::NotFound("Phase not found".to_string()));
    }
    Ok(number)
}

pub(crate) async fn fetch_project(pool: &SqlitePool, project_id: &str) -> Result<Project> {
    sqlx::query_as::<_, Project>("SELECT * FROM projects WHERE id = ?")
        .bind(project_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::NotFound("Project not found".to_string()))
}

/// All phase slots of a project merged with their stored details.
pub async fn load_phase_views(pool: &SqlitePool, project: &Project) -> Result<Vec<PhaseView>> {
    let details = sqlx::query_as::<_, PhaseDetails>(
        "SELECT * FROM project_phases WHERE project_id = ?",
    )
    .bind(&project.id)
    .fetch_all(pool)
    .await?;

    let checklist_counts = sqlx::query_as::<_, (i64, i64, i64)>(
        r#"
        SELECT phase_number, COUNT(*), COALESCE(SUM(checked), 0)
        FROM phase_checklist_items
        WHERE project_id = ?
        GROUP BY phase_number
        "#,
    )
    .bind(&project.id)
    .fetch_all(pool)
    .await?;

    let current = phase::clamp_current_phase(project.current_phase);
    let details_for = |n: u8| details.iter().find(|d| d.phase_number == n as i64);

    let slots = phase::generate_phases_with(current, |n| {
        details_for(n).and_then(|d| d.manual_state)
    });

    Ok(slots
        .into_iter()
        .map(|slot| {
            let stored = details_for(slot.number);
            let (total, checked) = checklist_counts
                .iter()
                .find(|(n, _, _)| *n == slot.number as i64)
                .map(|(_, total, checked)| (*total, *checked))
                .unwrap_or((0, 0));
            PhaseView {
                manual_state: stored.and_then(|d| d.manual_state),
                start_date: stored.and_then(|d| d.start_date.clone()),
                end_date: stored.and_then(|d| d.end_date.clone()),
                notes: stored.map(|d| d.notes.clone()).unwrap_or_default(),
                checklist_total: total,
                checklist_checked: checked,
                slot,
            }
        })
        .collect())
}

async fn load_phase_view(pool: &SqlitePool, project: &Project, number: i64) -> Result<PhaseView> {
    load_phase_views(pool, project)
        .await?
        .into_iter()
        .find(|view| view.slot.number as i64 == number)
        .ok_or_else(|| AppError::NotFound("Phase not found".to_string()))
}

async fn list_phases(
    State(state): State<AppState>,
    session: Session,
    Path(project_id): Path<String>,
) -> Result<Json<Vec<PhaseView>>> {
    guard::require_project_access(&state.db.pool, &session, &project_id).await?;
    let project = fetch_project(&state.db.pool, &project_id).await?;
    Ok(Json(load_phase_views(&state.db.pool, &project).await?))
}

async fn get_phase(
    State(state): State<AppState>,
    session: Session,
    Path((project_id, number)): Path<(String, i64)>,
) -> Result<Json<PhaseDetailResponse>> {
    let number = phase_number(number)?;
    guard::require_project_access(&state.db.pool, &session, &project_id).await?;
    let project = fetch_project(&state.db.pool, &project_id).await?;
    let phase = load_phase_view(&state.db.pool, &project, number).await?;

    let checklist = fetch_checklist(&state.db.pool, &project_id, number).await?;

    let materials = sqlx::query_as::<_, Material>(
        "SELECT * FROM materials WHERE project_id = ? AND phase_number = ? ORDER BY created_at ASC",
    )
    .bind(&project_id)
    .bind(number)
    .fetch_all(&state.db.pool)
    .await?;

    let labour = sqlx::query_as::<_, Labour>(
        "SELECT * FROM labour WHERE project_id = ? AND phase_number = ? ORDER BY created_at ASC",
    )
    .bind(&project_id)
    .bind(number)
    .fetch_all(&state.db.pool)
    .await?;

    let materials_total = cost::sum(&materials);
    let labour_total = cost::sum(&labour);

    Ok(Json(PhaseDetailResponse {
        phase,
        checklist,
        materials,
        labour,
        materials_total: cost::round_amount(materials_total),
        labour_total: cost::round_amount(labour_total),
        total: cost::round_amount(materials_total + labour_total),
    }))
}

async fn existing_details(
    pool: &SqlitePool,
    project_id: &str,
    number: i64,
) -> Result<Option<PhaseDetails>> {
    Ok(sqlx::query_as::<_, PhaseDetails>(
        "SELECT * FROM project_phases WHERE project_id = ? AND phase_number = ?",
    )
    .bind(project_id)
    .bind(number)
    .fetch_optional(pool)
    .await?)
}

async fn update_phase(
    State(state): State<AppState>,
    session: Session,
    Path((project_id, number)): Path<(String, i64)>,
    Json(body): Json<UpdatePhaseRequest>,
) -> Result<Json<PhaseView>> {
    let number = phase_number(number)?;
    guard::require_project_edit(&state.db.pool, &session, &project_id).await?;

    let existing = existing_details(&state.db.pool, &project_id, number).await?;

    // Absent fields keep their value; empty strings clear dates
    let start_date = match body.start_date {
        Some(value) => validation::optional_date("Start date", Some(&value))?,
        None => validation::optional_date(
            "Start date",
            existing.as_ref().and_then(|d| d.start_date.as_deref()),
        )?,
    };
    let end_date = match body.end_date {
        Some(value) => validation::optional_date("End date", Some(&value))?,
        None => validation::optional_date(
            "End date",
            existing.as_ref().and_then(|d| d.end_date.as_deref()),
        )?,
    };
    validation::date_range(start_date, end_date)?;

    let notes = body
        .notes
        .or_else(|| existing.as_ref().map(|d| d.notes.clone()))
        .unwrap_or_default();

    sqlx::query(
        r#"
        INSERT INTO project_phases (project_id, phase_number, start_date, end_date, notes)
        VALUES (?, ?, ?, ?, ?)
        ON CONFLICT(project_id, phase_number) DO UPDATE SET
            start_date = excluded.start_date,
            end_date = excluded.end_date,
            notes = excluded.notes
        "#,
    )
    .bind(&project_id)
    .bind(number)
    .bind(start_date.map(|d| d.to_string()))
    .bind(end_date.map(|d| d.to_string()))
    .bind(&notes)
    .execute(&state.db.pool)
    .await?;

    let project = fetch_project(&state.db.pool, &project_id).await?;
    Ok(Json(load_phase_view(&state.db.pool, &project, number).await?))
}

async fn set_override(
    State(state): State<AppState>,
    session: Session,
    Path((project_id, number)): Path<(String, i64)>,
    Json(body): Json<OverrideRequest>,
) -> Result<Json<PhaseView>> {
    let number = phase_number(number)?;
    let user = session.require_user()?;
    if !user.role.has_role(Role::Admin) {
        return Err(AppError::access_denied());
    }
    let project = fetch_project(&state.db.pool, &project_id).await?;

    sqlx::query(
        r#"
        INSERT INTO project_phases (project_id, phase_number, manual_state)
        VALUES (?, ?, ?)
        ON CONFLICT(project_id, phase_number) DO UPDATE SET
            manual_state = excluded.manual_state
        "#,
    )
    .bind(&project_id)
    .bind(number)
    .bind(body.state)
    .execute(&state.db.pool)
    .await?;

    tracing::info!(
        project_id = %project_id,
        phase = number,
        state = ?body.state,
        user_id = %user.id,
        "phase override set"
    );

    Ok(Json(load_phase_view(&state.db.pool, &project, number).await?))
}

async fn fetch_checklist(
    pool: &SqlitePool,
    project_id: &str,
    number: i64,
) -> Result<Vec<ChecklistItem>> {
    Ok(sqlx::query_as::<_, ChecklistItem>(
        "SELECT * FROM phase_checklist_items WHERE project_id = ? AND phase_number = ? ORDER BY created_at ASC",
    )
    .bind(project_id)
    .bind(number)
    .fetch_all(pool)
    .await?)
}

async fn list_checklist(
    State(state): State<AppState>,
    session: Session,
    Path((project_id, number)): Path<(String, i64)>,
) -> Result<Json<Vec<ChecklistItem>>> {
    let number = phase_number(number)?;
    guard::require_project_access(&state.db.pool, &session, &project_id).await?;
    Ok(Json(fetch_checklist(&state.db.pool, &project_id, number).await?))
}

async fn add_checklist_item(
    State(state): State<AppState>,
    session: Session,
    Path((project_id, number)): Path<(String, i64)>,
    Json(body): Json<CreateChecklistItemRequest>,
) -> Result<Json<ChecklistItem>> {
    let number = phase_number(number)?;
    guard::require_project_edit(&state.db.pool, &session, &project_id).await?;
    let label = validation::name("Label", &body.label)?.to_string();

    let item = ChecklistItem {
        id: Uuid::new_v4().to_string(),
        project_id,
        phase_number: number,
        label,
        required: body.required.unwrap_or(true),
        checked: false,
        created_at: Utc::now().to_rfc3339(),
    };

    sqlx::query(
        "INSERT INTO phase_checklist_items (id, project_id, phase_number, label, required, checked, created_at) VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&item.id)
    .bind(&item.project_id)
    .bind(item.phase_number)
    .bind(&item.label)
    .bind(item.required)
    .bind(item.checked)
    .bind(&item.created_at)
    .execute(&state.db.pool)
    .await?;

    state
        .events
        .publish(ChangeEvent::inserted(Table::Checklist, &item.project_id, &item.id, &item))
        .await;

    Ok(Json(item))
}

async fn fetch_checklist_item(pool: &SqlitePool, id: &str) -> Result<ChecklistItem> {
    sqlx::query_as::<_, ChecklistItem>("SELECT * FROM phase_checklist_items WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::NotFound("Checklist item not found".to_string()))
}

/// Members may tick items; changing the label or the required flag needs
/// edit rights.
async fn update_checklist_item(
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<String>,
    Json(body): Json<UpdateChecklistItemRequest>,
) -> Result<Json<ChecklistItem>> {
    let mut item = fetch_checklist_item(&state.db.pool, &id).await?;

    if body.label.is_some() || body.required.is_some() {
        guard::require_project_edit(&state.db.pool, &session, &item.project_id).await?;
    } else {
        guard::require_project_access(&state.db.pool, &session, &item.project_id).await?;
    }

    if let Some(label) = body.label {
        item.label = validation::name("Label", &label)?.to_string();
    }
    if let Some(required) = body.required {
        item.required = required;
    }
    if let Some(checked) = body.checked {
        item.checked = checked;
    }

    sqlx::query("UPDATE phase_checklist_items SET label = ?, required = ?, checked = ? WHERE id = ?")
        .bind(&item.label)
        .bind(item.required)
        .bind(item.checked)
        .bind(&item.id)
        .execute(&state.db.pool)
        .await?;

    state
        .events
        .publish(ChangeEvent::updated(Table::Checklist, &item.project_id, &item.id, &item))
        .await;

    Ok(Json(item))
}

async fn delete_checklist_item(
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<String>,
) -> Result<Json<()>> {
    let item = fetch_checklist_item(&state.db.pool, &id).await?;
    guard::require_project_edit(&state.db.pool, &session, &item.project_id).await?;

    sqlx::query("DELETE FROM phase_checklist_items WHERE id = ?")
        .bind(&id)
        .execute(&state.db.pool)
        .await?;

    state
        .events
        .publish(ChangeEvent::deleted(Table::Checklist, &item.project_id, &id))
        .await;

    Ok(Json(()))
}
