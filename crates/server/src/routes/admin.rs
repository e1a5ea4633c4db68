use axum::{
    extract::{Path, State},
    routing::{get, post, put},
    Json, Router,
};
use chrono::Utc;
use rand::{distributions::Alphanumeric, Rng};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::{
    db::models::User,
    domain::{validation, Permission, Role},
    error::{AppError, Result},
    routes::auth::hash_password,
    session::Session,
    AppState,
};

const TEMP_PASSWORD_LEN: usize = 12;

/// Mounted behind the admin layer; handlers still check their own permission.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/users", get(list_users))
        .route("/users/:id/role", put(set_role))
        .route("/workers", post(create_worker))
        .route("/workers/:id/reset-password", post(reset_worker_password))
        .route("/workers/:id/status", put(set_worker_status))
}

#[derive(Debug, Serialize, Deserialize, sqlx::FromRow)]
pub struct AdminUserView {
    pub id: String,
    pub email: String,
    pub name: String,
    pub phone: Option<String>,
    pub active: bool,
    pub role: String,
    pub created_at: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UserListResponse {
    pub users: Vec<AdminUserView>,
}

#[derive(Debug, Deserialize)]
pub struct SetRoleRequest {
    pub role: Role,
}

#[derive(Debug, Deserialize)]
pub struct CreateWorkerRequest {
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct WorkerResponse {
    pub user: AdminUserView,
    /// Present when a password was (re)generated.
    pub temporary_password: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SetStatusRequest {
    pub active: bool,
}

fn temporary_password() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(TEMP_PASSWORD_LEN)
        .map(char::from)
        .collect()
}

async fn fetch_user_view(pool: &SqlitePool, user_id: &str) -> Result<AdminUserView> {
    sqlx::query_as::<_, AdminUserView>(
        r#"
        SELECT u.id, u.email, u.name, u.phone, u.active,
               COALESCE(r.role, 'user') AS role, u.created_at
        FROM users u
        LEFT JOIN user_roles r ON r.user_id = u.id
        WHERE u.id = ?
        "#,
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::NotFound("User not found".to_string()))
}

/// Worker endpoints only act on accounts whose role is exactly `worker`.
async fn fetch_worker_view(pool: &SqlitePool, user_id: &str) -> Result<AdminUserView> {
    let view = fetch_user_view(pool, user_id).await?;
    if view.role != Role::Worker.as_str() {
        return Err(AppError::BadRequest(
            "Only worker accounts can be managed here".to_string(),
        ));
    }
    Ok(view)
}

async fn assign_role(pool: &SqlitePool, user_id: &str, role: Role) -> Result<()> {
    sqlx::query(
        "INSERT INTO user_roles (user_id, role) VALUES (?, ?) ON CONFLICT(user_id) DO UPDATE SET role = excluded.role",
    )
    .bind(user_id)
    .bind(role.as_str())
    .execute(pool)
    .await?;
    Ok(())
}

async fn list_users(
    State(state): State<AppState>,
    session: Session,
) -> Result<Json<UserListResponse>> {
    session.require(Permission::ManageUsers)?;

    let users = sqlx::query_as::<_, AdminUserView>(
        r#"
        SELECT u.id, u.email, u.name, u.phone, u.active,
               COALESCE(r.role, 'user') AS role, u.created_at
        FROM users u
        LEFT JOIN user_roles r ON r.user_id = u.id
        ORDER BY u.name ASC
        "#,
    )
    .fetch_all(&state.db.pool)
    .await?;

    Ok(Json(UserListResponse { users }))
}

async fn set_role(
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<String>,
    Json(body): Json<SetRoleRequest>,
) -> Result<Json<AdminUserView>> {
    let admin = session.require(Permission::ManageUsers)?;
    if admin.id == id && body.role != Role::Admin {
        return Err(AppError::BadRequest(
            "Admins cannot remove their own admin role".to_string(),
        ));
    }

    fetch_user_view(&state.db.pool, &id).await?;
    assign_role(&state.db.pool, &id, body.role).await?;

    tracing::info!(user_id = %id, role = %body.role, changed_by = %admin.id, "role changed");

    Ok(Json(fetch_user_view(&state.db.pool, &id).await?))
}

/// Create a worker account, or make an existing account a worker.
async fn create_worker(
    State(state): State<AppState>,
    session: Session,
    Json(body): Json<CreateWorkerRequest>,
) -> Result<Json<WorkerResponse>> {
    let admin = session.require(Permission::CreateWorkers)?;

    let email = validation::email(&body.email)?;
    let name = validation::name("Name", &body.name)?.to_string();
    let phone = validation::optional_phone(body.phone.as_deref())?;

    let existing = sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = ?")
        .bind(&email)
        .fetch_optional(&state.db.pool)
        .await?;

    let (user_id, issued_password) = match existing {
        Some(user) => {
            let current = sqlx::query_scalar::<_, String>("SELECT role FROM user_roles WHERE user_id = ?")
                .bind(&user.id)
                .fetch_optional(&state.db.pool)
                .await?
                .and_then(|r| r.parse::<Role>().ok())
                .unwrap_or_default();
            // Never demote
            if !current.has_role(Role::Worker) {
                assign_role(&state.db.pool, &user.id, Role::Worker).await?;
            }
            (user.id, None)
        }
        None => {
            let password = temporary_password();
            let user_id = Uuid::new_v4().to_string();

            let mut tx = state.db.pool.begin().await?;
            sqlx::query(
                "INSERT INTO users (id, email, name, password_hash, phone, active, created_at) VALUES (?, ?, ?, ?, ?, 1, ?)",
            )
            .bind(&user_id)
            .bind(&email)
            .bind(&name)
            .bind(hash_password(&password)?)
            .bind(&phone)
            .bind(Utc::now().to_rfc3339())
            .execute(&mut *tx)
            .await?;
            sqlx::query("INSERT INTO user_roles (user_id, role) VALUES (?, ?)")
                .bind(&user_id)
                .bind(Role::Worker.as_str())
                .execute(&mut *tx)
                .await?;
            tx.commit().await?;

            (user_id, Some(password))
        }
    };

    tracing::info!(
        user_id = %user_id,
        created = issued_password.is_some(),
        created_by = %admin.id,
        "worker provisioned"
    );

    Ok(Json(WorkerResponse {
        user: fetch_user_view(&state.db.pool, &user_id).await?,
        temporary_password: issued_password,
    }))
}

async fn reset_worker_password(
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<String>,
) -> Result<Json<WorkerResponse>> {
    let admin = session.require(Permission::CreateWorkers)?;
    fetch_worker_view(&state.db.pool, &id).await?;

    let password = temporary_password();
    sqlx::query("UPDATE users SET password_hash = ? WHERE id = ?")
        .bind(hash_password(&password)?)
        .bind(&id)
        .execute(&state.db.pool)
        .await?;

    tracing::info!(user_id = %id, reset_by = %admin.id, "worker password reset");

    Ok(Json(WorkerResponse {
        user: fetch_user_view(&state.db.pool, &id).await?,
        temporary_password: Some(password),
    }))
}

async fn set_worker_status(
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<String>,
    Json(body): Json<SetStatusRequest>,
) -> Result<Json<AdminUserView>> {
    let admin = session.require(Permission::CreateWorkers)?;
    if admin.id == id && !body.active {
        return Err(AppError::BadRequest(
            "Admins cannot disable their own account".to_string(),
        ));
    }
    fetch_worker_view(&state.db.pool, &id).await?;

    sqlx::query("UPDATE users SET active = ? WHERE id = ?")
        .bind(body.active)
        .bind(&id)
        .execute(&state.db.pool)
        .await?;

    tracing::info!(user_id = %id, active = body.active, "worker status changed");

    Ok(Json(fetch_user_view(&state.db.pool, &id).await?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn temporary_passwords_are_long_enough_and_distinct() {
        let a = temporary_password();
        let b = temporary_password();
        assert_eq!(a.len(), TEMP_PASSWORD_LEN);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric()));
        assert!(validation::password(&a).is_ok());
        assert_ne!(a, b);
    }
}
