use axum::{
    extract::{Path, State},
    routing::{get, put},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::{types::Json as SqlJson, SqlitePool};
use uuid::Uuid;

use crate::{
    db::models::TeamMember,
    domain::{validation, Permission},
    error::{AppError, Result},
    services::events::{ChangeEvent, Table},
    session::Session,
    AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_team).post(create_member))
        .route("/:id", put(update_member).delete(delete_member))
}

#[derive(Debug, Deserialize)]
pub struct CreateMemberRequest {
    pub name: String,
    pub email: String,
    pub roles: Vec<String>,
    pub phone: Option<String>,
    pub start_date: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateMemberRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub roles: Option<Vec<String>>,
    pub phone: Option<String>,
    pub start_date: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TeamListResponse {
    pub members: Vec<TeamMember>,
}

/// Trim, drop blanks and duplicates; at least one job role must remain.
fn job_roles(roles: Vec<String>) -> Result<Vec<String>> {
    let mut cleaned: Vec<String> = Vec::with_capacity(roles.len());
    for role in roles {
        let role = role.trim();
        if !role.is_empty() && !cleaned.iter().any(|r| r.eq_ignore_ascii_case(role)) {
            cleaned.push(role.to_string());
        }
    }
    if cleaned.is_empty() {
        return Err(AppError::Validation(
            "At least one role is required".to_string(),
        ));
    }
    Ok(cleaned)
}

async fn list_team(
    State(state): State<AppState>,
    session: Session,
) -> Result<Json<TeamListResponse>> {
    session.require_user()?;

    let members = sqlx::query_as::<_, TeamMember>("SELECT * FROM team_members ORDER BY name ASC")
        .fetch_all(&state.db.pool)
        .await?;

    Ok(Json(TeamListResponse { members }))
}

async fn create_member(
    State(state): State<AppState>,
    session: Session,
    Json(body): Json<CreateMemberRequest>,
) -> Result<Json<TeamMember>> {
    session.require(Permission::ManageTeam)?;

    let member = TeamMember {
        id: Uuid::new_v4().to_string(),
        name: validation::name("Name", &body.name)?.to_string(),
        email: validation::email(&body.email)?,
        roles: SqlJson(job_roles(body.roles)?),
        phone: validation::optional_phone(body.phone.as_deref())?,
        start_date: validation::date("Start date", &body.start_date)?.to_string(),
        created_at: Utc::now().to_rfc3339(),
    };

    sqlx::query(
        "INSERT INTO team_members (id, name, email, roles, phone, start_date, created_at) VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&member.id)
    .bind(&member.name)
    .bind(&member.email)
    .bind(&member.roles)
    .bind(&member.phone)
    .bind(&member.start_date)
    .bind(&member.created_at)
    .execute(&state.db.pool)
    .await?;

    tracing::info!(member_id = %member.id, "team member created");

    Ok(Json(member))
}

async fn fetch_member(pool: &SqlitePool, id: &str) -> Result<TeamMember> {
    sqlx::query_as::<_, TeamMember>("SELECT * FROM team_members WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::NotFound("Team member not found".to_string()))
}

async fn linked_projects(pool: &SqlitePool, member_id: &str) -> Result<Vec<String>> {
    Ok(sqlx::query_scalar::<_, String>(
        "SELECT project_id FROM project_team_members WHERE team_member_id = ?",
    )
    .bind(member_id)
    .fetch_all(pool)
    .await?)
}

async fn update_member(
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<String>,
    Json(body): Json<UpdateMemberRequest>,
) -> Result<Json<TeamMember>> {
    session.require(Permission::ManageTeam)?;
    let mut member = fetch_member(&state.db.pool, &id).await?;

    if let Some(name) = body.name {
        member.name = validation::name("Name", &name)?.to_string();
    }
    if let Some(email) = body.email {
        member.email = validation::email(&email)?;
    }
    if let Some(roles) = body.roles {
        member.roles = SqlJson(job_roles(roles)?);
    }
    if let Some(phone) = body.phone {
        member.phone = validation::optional_phone(Some(&phone))?;
    }
    if let Some(start_date) = body.start_date {
        member.start_date = validation::date("Start date", &start_date)?.to_string();
    }

    sqlx::query(
        "UPDATE team_members SET name = ?, email = ?, roles = ?, phone = ?, start_date = ? WHERE id = ?",
    )
    .bind(&member.name)
    .bind(&member.email)
    .bind(&member.roles)
    .bind(&member.phone)
    .bind(&member.start_date)
    .bind(&member.id)
    .execute(&state.db.pool)
    .await?;

    for project_id in linked_projects(&state.db.pool, &member.id).await? {
        state
            .events
            .publish(ChangeEvent::updated(Table::Team, &project_id, &member.id, &member))
            .await;
    }

    Ok(Json(member))
}

async fn delete_member(
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<String>,
) -> Result<Json<()>> {
    session.require(Permission::ManageTeam)?;
    fetch_member(&state.db.pool, &id).await?;

    let projects = linked_projects(&state.db.pool, &id).await?;

    sqlx::query("DELETE FROM team_members WHERE id = ?")
        .bind(&id)
        .execute(&state.db.pool)
        .await?;

    for project_id in projects {
        state
            .events
            .publish(ChangeEvent::deleted(Table::Team, &project_id, &id))
            .await;
    }

    tracing::info!(member_id = %id, "team member deleted");

    Ok(Json(()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_roles_are_trimmed_and_deduplicated() {
        let roles = job_roles(vec![
            " Electrician ".to_string(),
            "electrician".to_string(),
            "".to_string(),
            "Plumber".to_string(),
        ])
        .unwrap();
        assert_eq!(roles, vec!["Electrician", "Plumber"]);
    }

    #[test]
    fn job_roles_require_one_entry() {
        assert!(job_roles(vec!["  ".to_string()]).is_err());
        assert!(job_roles(Vec::new()).is_err());
    }
}
