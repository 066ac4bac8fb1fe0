//! Status page and artifact listing.

use crate::error::AppError;
use crate::state::AppState;
use crate::storage::ArtifactKind;
use actix_web::{web, HttpResponse};
use serde_json::json;

/// HTML status page at `/`.
pub async fn index(state: web::Data<AppState>) -> HttpResponse {
    let config = state.get_config();
    let audio_count = state.store.count(ArtifactKind::Audio).await;
    let image_count = state.store.count(ArtifactKind::Image).await;
    let response_count = state.store.count(ArtifactKind::Response).await;

    let body = format!(
        r#"<!DOCTYPE html>
<html>
<head>
    <title>Voice Relay Backend</title>
    <style>
        body {{ font-family: Arial, sans-serif; margin: 40px; background: #f5f5f5; }}
        .container {{ background: white; padding: 30px; border-radius: 10px; box-shadow: 0 2px 10px rgba(0,0,0,0.1); }}
        h1 {{ color: #333; }}
        .status {{ padding: 10px; border-radius: 5px; margin: 10px 0; background: #d4edda; color: #155724; }}
        table {{ width: 100%; border-collapse: collapse; margin: 20px 0; }}
        td {{ padding: 10px; border-bottom: 1px solid #ddd; }}
        td:first-child {{ font-weight: bold; width: 220px; }}
    </style>
</head>
<body>
    <div class="container">
        <h1>Voice Relay Backend</h1>
        <div class="status"><strong>Status:</strong> Running</div>
        <table>
            <tr><td>Upload endpoint</td><td><code>ws://{host}:{port}/upload</code></td></tr>
            <tr><td>Observer endpoint</td><td><code>ws://{host}:{port}/ws/events</code></td></tr>
            <tr><td>Protocol</td><td>Image + Audio &rarr; Process &rarr; Response</td></tr>
            <tr><td>Send chunk size</td><td>{chunk_kb} KB</td></tr>
            <tr><td>Audio recordings</td><td>{audio_count}</td></tr>
            <tr><td>Images</td><td>{image_count}</td></tr>
            <tr><td>Responses</td><td>{response_count}</td></tr>
            <tr><td>Upload folder</td><td>{upload_dir}</td></tr>
        </table>
    </div>
</body>
</html>
"#,
        host = config.server.host,
        port = config.server.port,
        chunk_kb = config.transfer.send_chunk_bytes / 1024,
        audio_count = audio_count,
        image_count = image_count,
        response_count = response_count,
        upload_dir = config.storage.upload_dir,
    );

    HttpResponse::Ok()
        .content_type("text/html; charset=utf-8")
        .body(body)
}

/// Stored artifact listing at `/api/v1/files`, newest first.
pub async fn list_files(state: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    let audio_files = state.store.list(ArtifactKind::Audio).await;
    let image_files = state.store.list(ArtifactKind::Image).await;
    let response_files = state.store.list(ArtifactKind::Response).await;
    let total = audio_files.len() + image_files.len() + response_files.len();

    Ok(HttpResponse::Ok().json(json!({
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "audio_files": audio_files,
        "image_files": image_files,
        "response_files": response_files,
        "total_files": total,
    })))
}
