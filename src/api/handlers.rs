use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    extract::{Multipart, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use base64::Engine as _;
use serde_json::{json, Value};

use super::routes::AppState;
use super::{TtsRequest, TtsResponse, UploadResponse};
use crate::error::AppError;
use crate::voice::{VoiceStatus, DEFAULT_VOICE_ID};

pub async fn voice_status(State(state): State<Arc<AppState>>) -> Json<VoiceStatus> {
    Json(state.voice.status())
}

pub async fn voice_settings(
    State(state): State<Arc<AppState>>,
    Json(settings): Json<Value>,
) -> Result<Json<Value>, AppError> {
    let Some(settings) = settings.as_object() else {
        return Err(AppError::BadRequest("Expected a JSON object".to_string()));
    };

    if let Some(enabled) = settings.get("auto_play").and_then(Value::as_bool) {
        state.voice.set_auto_play(enabled);
    }

    Ok(Json(json!({"status": "success"})))
}

pub async fn voice_upload(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Response {
    match save_upload(&state, &mut multipart).await {
        Ok(path) => Json(UploadResponse {
            status: "success".to_string(),
            voice_id: DEFAULT_VOICE_ID.to_string(),
            path: path.display().to_string(),
        })
        .into_response(),
        Err(e) => (
            StatusCode::BAD_REQUEST,
            Json(json!({"status": "error", "message": e.to_string()})),
        )
            .into_response(),
    }
}

async fn save_upload(state: &AppState, multipart: &mut Multipart) -> Result<PathBuf, AppError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(format!("invalid multipart body: {}", e)))?
    {
        let data = field
            .bytes()
            .await
            .map_err(|e| AppError::BadRequest(format!("invalid multipart field: {}", e)))?;

        if data.is_empty() {
            continue;
        }

        return state.voice.save_sample(DEFAULT_VOICE_ID, &data);
    }

    Err(AppError::BadRequest("no audio data in upload".to_string()))
}

pub async fn tts(
    State(state): State<Arc<AppState>>,
    Json(request): Json<TtsRequest>,
) -> Result<Json<TtsResponse>, AppError> {
    let text = request.text.trim();
    if text.is_empty() {
        return Err(AppError::BadRequest("Text cannot be empty".to_string()));
    }

    let wav = state.voice.synthesize(text, request.voice_id.as_deref())?;

    Ok(Json(TtsResponse {
        audio: base64::engine::general_purpose::STANDARD.encode(wav),
        format: "wav".to_string(),
    }))
}

pub async fn voice_not_found() -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({"status": "error", "message": "unknown voice endpoint"})),
    )
        .into_response()
}
