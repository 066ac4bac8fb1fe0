//! Chat-session control command.

use crate::error::AppError;
use crate::state::AppState;
use actix_web::{web, HttpResponse};
use serde_json::json;

/// `POST /api/v1/chat/end` — persist the active chat session's history and
/// reset to "not started".
pub async fn end_chat(state: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    match state.chat.end(&state.store).await? {
        Some(session) => Ok(HttpResponse::Ok().json(json!({
            "status": "success",
            "chat_id": session.id,
            "turns": session.turns.len(),
            "started_at": session.started_at.to_rfc3339(),
            "timestamp": chrono::Utc::now().to_rfc3339(),
        }))),
        None => Ok(HttpResponse::Ok().json(json!({
            "status": "success",
            "message": "No active chat session",
            "timestamp": chrono::Utc::now().to_rfc3339(),
        }))),
    }
}
