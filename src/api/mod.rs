pub mod handlers;
pub mod proxy;
pub mod routes;

use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct TtsRequest {
    #[serde(default)]
    pub text: String,
    pub voice_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TtsResponse {
    pub audio: String,
    pub format: String,
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub status: String,
    pub voice_id: String,
    pub path: String,
}
