use axum::{extract::State, routing::post, Json, Router};
use serde::{Deserialize, Serialize};

use crate::{
    domain::{validation, Permission},
    error::{AppError, Result},
    services::notify::YesNoMessage,
    session::Session,
    AppState,
};

/// Interactive message bodies are capped by the provider.
const MAX_BODY_LEN: usize = 1024;

pub fn router() -> Router<AppState> {
    Router::new().route("/whatsapp", post(send_whatsapp))
}

#[derive(Debug, Deserialize)]
pub struct WhatsAppRequest {
    pub phone: String,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct WhatsAppResponse {
    pub message_id: String,
}

/// Send a yes/no question to a team member's phone.
async fn send_whatsapp(
    State(state): State<AppState>,
    session: Session,
    Json(body): Json<WhatsAppRequest>,
) -> Result<Json<WhatsAppResponse>> {
    let user = session.require(Permission::ManageTeam)?;

    let text = body.message.trim();
    if text.is_empty() || text.chars().count() > MAX_BODY_LEN {
        return Err(AppError::Validation(format!(
            "Message must be between 1 and {MAX_BODY_LEN} characters"
        )));
    }

    let message = YesNoMessage {
        phone: validation::phone(&body.phone)?,
        body: text.to_string(),
    };

    tracing::debug!(sent_by = %user.id, "relaying whatsapp message");
    let message_id = state.notifier.send_yes_no(&message).await?;

    Ok(Json(WhatsAppResponse { message_id }))
}
