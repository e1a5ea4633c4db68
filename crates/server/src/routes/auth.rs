use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use axum::{extract::State, routing::post, Json, Router};
use chrono::Utc;
use jsonwebtoken::{encode, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    domain::{validation, Permission, Role},
    error::{AppError, Result},
    session::Session,
    AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub name: String,
    pub password: String,
    pub phone: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: UserResponse,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UserResponse {
    pub id: String,
    pub email: String,
    pub name: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MeResponse {
    pub user: UserResponse,
    pub role: Role,
    pub permissions: Vec<Permission>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // user id
    pub email: String,
    pub name: String,
    pub exp: usize,
}

pub(crate) fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    argon2
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|_| AppError::Internal("Failed to hash password".to_string()))
}

fn verify_password(password: &str, hash: &str) -> Result<bool> {
    let parsed_hash = PasswordHash::new(hash)
        .map_err(|_| AppError::Internal("Invalid password hash".to_string()))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

pub fn create_token(user_id: &str, email: &str, name: &str, secret: &str) -> Result<String> {
    let expiration = Utc::now()
        .checked_add_signed(chrono::Duration::days(7))
        .ok_or_else(|| AppError::Internal("Token expiry out of range".to_string()))?
        .timestamp() as usize;

    let claims = Claims {
        sub: user_id.to_string(),
        email: email.to_string(),
        name: name.to_string(),
        exp: expiration,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|_| AppError::Internal("Failed to create token".to_string()))
}

async fn register(
    State(state): State<AppState>,
    Json(body): Json<RegisterRequest>,
) -> Result<Json<AuthResponse>> {
    let email = validation::email(&body.email)?;
    let name = validation::name("Name", &body.name)?.to_string();
    validation::password(&body.password)?;
    let phone = validation::optional_phone(body.phone.as_deref())?;

    // Check if user already exists
    let existing = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users WHERE email = ?")
        .bind(&email)
        .fetch_one(&state.db.pool)
        .await?;

    if existing > 0 {
        return Err(AppError::Validation("Email already registered".to_string()));
    }

    let password_hash = hash_password(&body.password)?;

    // New accounts get no role row and resolve to the least-privileged role
    let user_id = Uuid::new_v4().to_string();
    let now = Utc::now().to_rfc3339();

    sqlx::query(
        "INSERT INTO users (id, email, name, password_hash, phone, active, created_at) VALUES (?, ?, ?, ?, ?, 1, ?)",
    )
    .bind(&user_id)
    .bind(&email)
    .bind(&name)
    .bind(&password_hash)
    .bind(&phone)
    .bind(&now)
    .execute(&state.db.pool)
    .await?;

    tracing::info!(user_id = %user_id, "user registered");

    let token = create_token(&user_id, &email, &name, &state.config.jwt_secret)?;

    Ok(Json(AuthResponse {
        token,
        user: UserResponse {
            id: user_id,
            email,
            name,
        },
    }))
}

async fn login(
    State(state): State<AppState>,
    Json(body): Json<LoginRequest>,
) -> Result<Json<AuthResponse>> {
    let user = sqlx::query_as::<_, (String, String, String, String, bool)>(
        "SELECT id, email, name, password_hash, active FROM users WHERE email = ?",
    )
    .bind(body.email.trim().to_lowercase())
    .fetch_optional(&state.db.pool)
    .await?
    .ok_or(AppError::Unauthorized)?;

    let (user_id, email, name, password_hash, active) = user;

    if !verify_password(&body.password, &password_hash)? {
        return Err(AppError::Unauthorized);
    }

    if !active {
        return Err(AppError::Forbidden("Account is disabled".to_string()));
    }

    let token = create_token(&user_id, &email, &name, &state.config.jwt_secret)?;

    Ok(Json(AuthResponse {
        token,
        user: UserResponse {
            id: user_id,
            email,
            name,
        },
    }))
}

pub async fn me(session: Session) -> Result<Json<MeResponse>> {
    let user = session.require_user()?;
    let identity = session.identity().ok_or(AppError::Unauthorized)?;

    Ok(Json(MeResponse {
        user: UserResponse {
            id: identity.id.clone(),
            email: identity.email.clone(),
            name: identity.name.clone(),
        },
        role: user.role,
        permissions: Permission::granted(Some(&user)),
    }))
}
