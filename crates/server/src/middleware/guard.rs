//! Route guards: load the facts a decision needs, ask the policy, and turn
//! a refusal into `401`/`403`.

use axum::{
    extract::Request,
    middleware::Next,
    response::Response,
};
use sqlx::SqlitePool;

use crate::{
    domain::{access, CurrentUser, Permission, Role},
    error::{AppError, Result},
    session::Session,
};

/// Ownership and membership of one project relative to one user.
#[derive(Debug, Clone)]
pub struct ProjectFacts {
    pub project_id: String,
    pub owner_id: String,
    pub is_member: bool,
}

/// A user is a member when their email matches a team member assigned to
/// the project.
pub async fn project_facts(
    pool: &SqlitePool,
    project_id: &str,
    user_id: &str,
) -> Result<ProjectFacts> {
    let owner_id = sqlx::query_scalar::<_, String>("SELECT created_by FROM projects WHERE id = ?")
        .bind(project_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::NotFound("Project not found".to_string()))?;

    let memberships = sqlx::query_scalar::<_, i64>(
        r#"
        SELECT COUNT(*) FROM project_team_members ptm
        JOIN team_members tm ON tm.id = ptm.team_member_id
        JOIN users u ON lower(u.email) = lower(tm.email)
        WHERE ptm.project_id = ? AND u.id = ?
        "#,
    )
    .bind(project_id)
    .bind(user_id)
    .fetch_one(pool)
    .await?;

    Ok(ProjectFacts {
        project_id: project_id.to_string(),
        owner_id,
        is_member: memberships > 0,
    })
}

pub async fn require_project_access(
    pool: &SqlitePool,
    session: &Session,
    project_id: &str,
) -> Result<(CurrentUser, ProjectFacts)> {
    let user = session.require_user()?;
    let facts = project_facts(pool, project_id, &user.id).await?;
    if !access::can_access_project(Some(&user), &facts.owner_id, facts.is_member) {
        return Err(AppError::access_denied());
    }
    Ok((user, facts))
}

pub async fn require_project_edit(
    pool: &SqlitePool,
    session: &Session,
    project_id: &str,
) -> Result<(CurrentUser, ProjectFacts)> {
    let user = session.require_user()?;
    let facts = project_facts(pool, project_id, &user.id).await?;
    if !access::can_edit_project(Some(&user), &facts.owner_id) {
        return Err(AppError::Forbidden(
            "Only the project owner can edit this project".to_string(),
        ));
    }
    Ok((user, facts))
}

pub async fn require_upload(
    pool: &SqlitePool,
    session: &Session,
    project_id: &str,
) -> Result<(CurrentUser, ProjectFacts)> {
    let user = session.require_user()?;
    let facts = project_facts(pool, project_id, &user.id).await?;
    if !access::can_upload_files(Some(&user), &facts.owner_id, facts.is_member) {
        return Err(AppError::access_denied());
    }
    Ok((user, facts))
}

/// Layer for route groups restricted to one role or above.
pub async fn require_role(
    required: Role,
    session: Session,
    request: Request,
    next: Next,
) -> Result<Response> {
    session.require_user()?;
    if !session.has_role(required) {
        return Err(AppError::access_denied());
    }
    Ok(next.run(request).await)
}

pub async fn admin_only(session: Session, request: Request, next: Next) -> Result<Response> {
    require_role(Role::Admin, session, request, next).await
}

/// Layer for route groups gated by a role-only permission.
pub async fn require_permission(
    permission: Permission,
    session: Session,
    request: Request,
    next: Next,
) -> Result<Response> {
    session.require(permission)?;
    Ok(next.run(request).await)
}

pub async fn reports_only(session: Session, request: Request, next: Next) -> Result<Response> {
    require_permission(Permission::ViewReports, session, request, next).await
}
