use axum::{
    extract::{Path, State},
    routing::{delete, get, post},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::{
    db::models::{Labour, Material, Project, TeamMember},
    domain::{
        access,
        cost::{self, CostSummary},
        phase, validation, Permission, Role,
    },
    error::{AppError, Result},
    middleware::guard,
    routes::phases::{self, fetch_project, load_phase_views, PhaseView},
    services::events::{ChangeEvent, Table},
    session::Session,
    AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_projects).post(create_project))
        .route(
            "/:id",
            get(get_project).put(update_project).delete(delete_project),
        )
        .route("/:id/advance", post(advance_phase))
        .route("/:id/team", get(list_project_team).post(add_team_member))
        .route("/:id/team/:member_id", delete(remove_team_member))
        .route("/:id/costs", get(project_costs))
        .merge(phases::project_routes())
        .merge(super::materials::project_routes())
        .merge(super::labour::project_routes())
        .merge(super::files::project_routes())
        .merge(super::tasks::project_routes())
}

#[derive(Debug, Deserialize)]
pub struct CreateProjectRequest {
    pub name: String,
    pub description: Option<String>,
    pub start_date: String,
    #[serde(default)]
    pub team_member_ids: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateProjectRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub start_date: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ProjectSummary {
    #[serde(flatten)]
    pub project: Project,
    pub completed_phases: u8,
    pub progress: f64,
}

impl From<Project> for ProjectSummary {
    fn from(project: Project) -> Self {
        let current = phase::clamp_current_phase(project.current_phase);
        Self {
            completed_phases: phase::completed_count(current),
            progress: phase::progress_percent(current),
            project: Project {
                current_phase: current as i64,
                ..project
            },
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ProjectListResponse {
    pub projects: Vec<ProjectSummary>,
}

#[derive(Debug, Serialize)]
pub struct ProjectDetailResponse {
    #[serde(flatten)]
    pub summary: ProjectSummary,
    pub can_edit: bool,
    pub phases: Vec<PhaseView>,
    pub team: Vec<TeamMember>,
}

#[derive(Debug, Deserialize)]
pub struct AddTeamMemberRequest {
    pub team_member_id: String,
}

async fn list_projects(
    State(state): State<AppState>,
    session: Session,
) -> Result<Json<ProjectListResponse>> {
    let user = session.require_user()?;

    let projects = if user.role == Role::Admin {
        sqlx::query_as::<_, Project>("SELECT * FROM projects ORDER BY updated_at DESC")
            .fetch_all(&state.db.pool)
            .await?
    } else {
        // Projects owned by the user or staffed by a team member with their email
        sqlx::query_as::<_, Project>(
            r#"
            SELECT p.* FROM projects p
            WHERE p.created_by = ? OR EXISTS (
                SELECT 1 FROM project_team_members ptm
                JOIN team_members tm ON tm.id = ptm.team_member_id
                JOIN users u ON lower(u.email) = lower(tm.email)
                WHERE ptm.project_id = p.id AND u.id = ?
            )
            ORDER BY p.updated_at DESC
            "#,
        )
        .bind(&user.id)
        .bind(&user.id)
        .fetch_all(&state.db.pool)
        .await?
    };

    Ok(Json(ProjectListResponse {
        projects: projects.into_iter().map(ProjectSummary::from).collect(),
    }))
}

async fn insert_team_link(pool: &SqlitePool, project_id: &str, member_id: &str) -> Result<()> {
    let exists = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM team_members WHERE id = ?")
        .bind(member_id)
        .fetch_one(pool)
        .await?;
    if exists == 0 {
        return Err(AppError::NotFound("Team member not found".to_string()));
    }

    sqlx::query(
        "INSERT OR IGNORE INTO project_team_members (project_id, team_member_id) VALUES (?, ?)",
    )
    .bind(project_id)
    .bind(member_id)
    .execute(pool)
    .await?;
    Ok(())
}

async fn create_project(
    State(state): State<AppState>,
    session: Session,
    Json(body): Json<CreateProjectRequest>,
) -> Result<Json<ProjectSummary>> {
    let user = session.require(Permission::ManageProjects)?;

    let name = validation::name("Project name", &body.name)?.to_string();
    let start_date = validation::date("Start date", &body.start_date)?;

    let now = Utc::now().to_rfc3339();
    let project = Project {
        id: Uuid::new_v4().to_string(),
        name,
        description: body.description.unwrap_or_default().trim().to_string(),
        start_date: start_date.to_string(),
        current_phase: phase::FIRST_PHASE as i64,
        created_by: user.id.clone(),
        created_at: now.clone(),
        updated_at: now,
    };

    let mut tx = state.db.pool.begin().await?;

    sqlx::query(
        "INSERT INTO projects (id, name, description, start_date, current_phase, created_by, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&project.id)
    .bind(&project.name)
    .bind(&project.description)
    .bind(&project.start_date)
    .bind(project.current_phase)
    .bind(&project.created_by)
    .bind(&project.created_at)
    .bind(&project.updated_at)
    .execute(&mut *tx)
    .await?;

    for member_id in &body.team_member_ids {
        let exists = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM team_members WHERE id = ?")
            .bind(member_id)
            .fetch_one(&mut *tx)
            .await?;
        if exists == 0 {
            return Err(AppError::Validation(format!(
                "Unknown team member: {member_id}"
            )));
        }
        sqlx::query(
            "INSERT OR IGNORE INTO project_team_members (project_id, team_member_id) VALUES (?, ?)",
        )
        .bind(&project.id)
        .bind(member_id)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;

    tracing::info!(project_id = %project.id, user_id = %user.id, "project created");

    Ok(Json(ProjectSummary::from(project)))
}

async fn fetch_project_team(pool: &SqlitePool, project_id: &str) -> Result<Vec<TeamMember>> {
    Ok(sqlx::query_as::<_, TeamMember>(
        r#"
        SELECT tm.* FROM team_members tm
        JOIN project_team_members ptm ON ptm.team_member_id = tm.id
        WHERE ptm.project_id = ?
        ORDER BY tm.name ASC
        "#,
    )
    .bind(project_id)
    .fetch_all(pool)
    .await?)
}

async fn get_project(
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<String>,
) -> Result<Json<ProjectDetailResponse>> {
    let (user, facts) = guard::require_project_access(&state.db.pool, &session, &id).await?;

    let project = fetch_project(&state.db.pool, &id).await?;
    let phases = load_phase_views(&state.db.pool, &project).await?;
    let team = fetch_project_team(&state.db.pool, &id).await?;

    Ok(Json(ProjectDetailResponse {
        summary: ProjectSummary::from(project),
        can_edit: access::can_edit_project(Some(&user), &facts.owner_id),
        phases,
        team,
    }))
}

async fn update_project(
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<String>,
    Json(body): Json<UpdateProjectRequest>,
) -> Result<Json<ProjectSummary>> {
    guard::require_project_edit(&state.db.pool, &session, &id).await?;
    let mut project = fetch_project(&state.db.pool, &id).await?;

    if let Some(name) = body.name {
        project.name = validation::name("Project name", &name)?.to_string();
    }
    if let Some(description) = body.description {
        project.description = description.trim().to_string();
    }
    if let Some(start_date) = body.start_date {
        project.start_date = validation::date("Start date", &start_date)?.to_string();
    }
    project.updated_at = Utc::now().to_rfc3339();

    sqlx::query(
        "UPDATE projects SET name = ?, description = ?, start_date = ?, updated_at = ? WHERE id = ?",
    )
    .bind(&project.name)
    .bind(&project.description)
    .bind(&project.start_date)
    .bind(&project.updated_at)
    .bind(&id)
    .execute(&state.db.pool)
    .await?;

    state
        .events
        .publish(ChangeEvent::updated(Table::Projects, &id, &id, &project))
        .await;

    Ok(Json(ProjectSummary::from(project)))
}

async fn delete_project(
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<String>,
) -> Result<Json<()>> {
    let user = session.require(Permission::DeleteProjects)?;
    fetch_project(&state.db.pool, &id).await?;

    // Delete from database (cascades to phases, costs, files and tasks)
    sqlx::query("DELETE FROM projects WHERE id = ?")
        .bind(&id)
        .execute(&state.db.pool)
        .await?;

    if let Err(e) = state.storage.delete_project_dir(&id).await {
        tracing::warn!(project_id = %id, error = %e, "failed to remove project files");
    }

    state
        .events
        .publish(ChangeEvent::deleted(Table::Projects, &id, &id))
        .await;
    state.events.close(&id).await;

    tracing::info!(project_id = %id, user_id = %user.id, "project deleted");

    Ok(Json(()))
}

/// Complete the active phase and unlock the next one.
async fn advance_phase(
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<String>,
) -> Result<Json<ProjectSummary>> {
    let (user, _) = guard::require_project_edit(&state.db.pool, &session, &id).await?;
    let mut project = fetch_project(&state.db.pool, &id).await?;

    let current = phase::clamp_current_phase(project.current_phase);
    let next = phase::advance(current)?;

    project.current_phase = next as i64;
    project.updated_at = Utc::now().to_rfc3339();

    // Only moves if nobody advanced in between
    let result = sqlx::query(
        "UPDATE projects SET current_phase = ?, updated_at = ? WHERE id = ? AND current_phase = ?",
    )
    .bind(project.current_phase)
    .bind(&project.updated_at)
    .bind(&id)
    .bind(current as i64)
    .execute(&state.db.pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::Conflict(
            "Project phase changed, reload and try again".to_string(),
        ));
    }

    tracing::info!(
        project_id = %id,
        user_id = %user.id,
        from = current,
        to = next,
        "project advanced to next phase"
    );

    state
        .events
        .publish(ChangeEvent::updated(Table::Projects, &id, &id, &project))
        .await;

    Ok(Json(ProjectSummary::from(project)))
}

async fn list_project_team(
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<String>,
) -> Result<Json<Vec<TeamMember>>> {
    guard::require_project_access(&state.db.pool, &session, &id).await?;
    Ok(Json(fetch_project_team(&state.db.pool, &id).await?))
}

async fn add_team_member(
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<String>,
    Json(body): Json<AddTeamMemberRequest>,
) -> Result<Json<Vec<TeamMember>>> {
    session.require(Permission::ManageTeam)?;
    fetch_project(&state.db.pool, &id).await?;

    insert_team_link(&state.db.pool, &id, &body.team_member_id).await?;

    let team = fetch_project_team(&state.db.pool, &id).await?;
    if let Some(member) = team.iter().find(|m| m.id == body.team_member_id) {
        state
            .events
            .publish(ChangeEvent::inserted(Table::Team, &id, &member.id, member))
            .await;
    }

    Ok(Json(team))
}

async fn remove_team_member(
    State(state): State<AppState>,
    session: Session,
    Path((id, member_id)): Path<(String, String)>,
) -> Result<Json<()>> {
    session.require(Permission::ManageTeam)?;

    sqlx::query("DELETE FROM project_team_members WHERE project_id = ? AND team_member_id = ?")
        .bind(&id)
        .bind(&member_id)
        .execute(&state.db.pool)
        .await?;

    state
        .events
        .publish(ChangeEvent::deleted(Table::Team, &id, &member_id))
        .await;

    Ok(Json(()))
}

pub(crate) async fn cost_summary(pool: &SqlitePool, project_id: &str) -> Result<CostSummary> {
    let materials = sqlx::query_as::<_, Material>("SELECT * FROM materials WHERE project_id = ?")
        .bind(project_id)
        .fetch_all(pool)
        .await?;
    let labour = sqlx::query_as::<_, Labour>("SELECT * FROM labour WHERE project_id = ?")
        .bind(project_id)
        .fetch_all(pool)
        .await?;

    Ok(cost::summarize(
        materials.iter().map(|m| (m.category.as_str(), m)),
        &labour,
    ))
}

async fn project_costs(
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<String>,
) -> Result<Json<CostSummary>> {
    guard::require_project_access(&state.db.pool, &session, &id).await?;
    Ok(Json(cost_summary(&state.db.pool, &id).await?))
}
