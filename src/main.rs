use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing_subscriber::EnvFilter;

mod api;
mod error;
mod voice;
mod web;

use api::proxy::UpstreamClient;
use api::routes::{create_router, AppState};
use voice::{SampleStore, TtsEngine, VoiceService};

#[tokio::main]
async fn main() {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Configuration from environment
    let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
    let port: u16 = std::env::var("PORT")
        .unwrap_or_else(|_| "8080".to_string())
        .parse()
        .expect("PORT must be a number");
    let upstream_base =
        std::env::var("OLLAMA_API").unwrap_or_else(|_| "http://localhost:11434/api".to_string());
    let voices_dir = std::env::var("VOICES_DIR").unwrap_or_else(|_| "./voices".to_string());
    let web_root = std::env::var("WEB_ROOT").unwrap_or_else(|_| ".".to_string());

    let addr: SocketAddr = format!("{}:{}", host, port)
        .parse()
        .expect("Invalid address");

    tracing::info!("Ollama8Web server v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Starting server on http://{}", addr);
    tracing::info!("Proxying /api requests to {}", upstream_base);
    tracing::info!("Voices directory: {}", voices_dir);

    // A missing entry document aborts startup; there is no degraded boot.
    web::ensure_index(Path::new(&web_root)).expect("Failed to seed default chat client");

    // Probe the TTS capability exactly once. On failure the voice service
    // runs degraded for the lifetime of the process.
    let engine = match TtsEngine::probe() {
        Ok(engine) => Some(engine),
        Err(e) => {
            tracing::warn!("Voice features degraded, TTS engine unavailable: {}", e);
            None
        }
    };

    let store =
        SampleStore::new(PathBuf::from(voices_dir)).expect("Failed to create voices directory");
    let voice = VoiceService::new(store, engine);

    let state = Arc::new(AppState {
        voice,
        upstream: UpstreamClient::new(upstream_base),
    });

    let app = create_router(state, &web_root);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .await
        .expect("Server error");
}
