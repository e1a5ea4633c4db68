use axum::{
    async_trait,
    extract::{FromRequestParts, Request, State},
    http::request::Parts,
    middleware::Next,
    response::Response,
};
use axum_extra::{
    headers::{authorization::Bearer, Authorization},
    TypedHeader,
};
use jsonwebtoken::{decode, DecodingKey, Validation};
use sqlx::SqlitePool;

use crate::{
    error::AppError,
    routes::auth::Claims,
    session::Session,
    AppState,
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuthUser {
    pub id: String,
    pub email: String,
    pub name: String,
}

/// Validate a bearer token and return the identity it carries.
pub fn decode_token(token: &str, secret: &str) -> Result<AuthUser, AppError> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|_| AppError::Unauthorized)?;

    Ok(AuthUser {
        id: token_data.claims.sub,
        email: token_data.claims.email,
        name: token_data.claims.name,
    })
}

/// Tokens outlive account changes; reject deleted or disabled accounts.
pub async fn ensure_active(pool: &SqlitePool, user_id: &str) -> Result<(), AppError> {
    let active = sqlx::query_scalar::<_, bool>("SELECT active FROM users WHERE id = ?")
        .bind(user_id)
        .fetch_optional(pool)
        .await?;

    match active {
        Some(true) => Ok(()),
        Some(false) => Err(AppError::Forbidden("Account is disabled".to_string())),
        None => Err(AppError::Unauthorized),
    }
}

/// Build a session for the request identity and resolve its role once.
pub async fn open_session(state: &AppState, user: AuthUser) -> Session {
    let mut session = Session::for_identity(user);
    session.role(state.roles.as_ref()).await;
    session
}

pub async fn auth_middleware(
    State(state): State<AppState>,
    bearer: Option<TypedHeader<Authorization<Bearer>>>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let Some(TypedHeader(Authorization(bearer))) = bearer else {
        return Err(AppError::Unauthorized);
    };

    let user = decode_token(bearer.token(), &state.config.jwt_secret)?;
    ensure_active(&state.db.pool, &user.id).await?;
    let session = open_session(&state, user).await;
    request.extensions_mut().insert(session);

    Ok(next.run(request).await)
}

// Routes outside the auth layer see an anonymous session, which every
// guard rejects.
#[async_trait]
impl<S> FromRequestParts<S> for Session
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts
            .extensions
            .get::<Session>()
            .cloned()
            .unwrap_or_else(Session::anonymous))
    }
}
