//! Runtime configuration endpoints.

use crate::{error::AppError, state::AppState};
use actix_web::{web, HttpResponse};
use serde_json::json;

pub async fn get_config(state: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    let config = state.get_config();

    Ok(HttpResponse::Ok().json(json!({
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "config": {
            "server": {
                "host": config.server.host,
                "port": config.server.port
            },
            "transfer": {
                "handshake_timeout_secs": config.transfer.handshake_timeout_secs,
                "first_chunk_timeout_secs": config.transfer.first_chunk_timeout_secs,
                "stream_timeout_secs": config.transfer.stream_timeout_secs,
                "tail_timeout_secs": config.transfer.tail_timeout_secs,
                "tail_threshold_bytes": config.transfer.tail_threshold_bytes,
                "min_accept_ratio": config.transfer.min_accept_ratio,
                "max_audio_bytes": config.transfer.max_audio_bytes,
                "max_image_bytes": config.transfer.max_image_bytes,
                "send_chunk_bytes": config.transfer.send_chunk_bytes,
                "send_pacing_ms": config.transfer.send_pacing_ms
            },
            "collaborators": {
                "base_url": config.collaborators.base_url,
                "stt_model": config.collaborators.stt_model,
                "chat_model": config.collaborators.chat_model,
                "tts_model": config.collaborators.tts_model,
                "tts_voice": config.collaborators.tts_voice
            },
            "broadcast": {
                "history_capacity": config.broadcast.history_capacity
            },
            "storage": {
                "upload_dir": config.storage.upload_dir
            }
        }
    })))
}

pub async fn update_config(
    state: web::Data<AppState>,
    body: web::Json<serde_json::Value>,
) -> Result<HttpResponse, AppError> {
    let json_str = serde_json::to_string(&body.into_inner())?;

    let mut current_config = state.get_config();
    current_config
        .update_from_json(&json_str)
        .map_err(|e| AppError::ValidationError(e.to_string()))?;

    state
        .update_config(current_config.clone())
        .map_err(AppError::ValidationError)?;

    Ok(HttpResponse::Ok().json(json!({
        "status": "success",
        "message": "Configuration updated successfully",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "transfer": {
            "first_chunk_timeout_secs": current_config.transfer.first_chunk_timeout_secs,
            "stream_timeout_secs": current_config.transfer.stream_timeout_secs,
            "tail_timeout_secs": current_config.transfer.tail_timeout_secs,
            "tail_threshold_bytes": current_config.transfer.tail_threshold_bytes,
            "min_accept_ratio": current_config.transfer.min_accept_ratio,
            "send_chunk_bytes": current_config.transfer.send_chunk_bytes,
            "send_pacing_ms": current_config.transfer.send_pacing_ms
        }
    })))
}
