use std::path::Path;
use std::sync::Arc;

use axum::{
    extract::Request,
    http::{header, HeaderValue, Method, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{any, get, post},
    Router,
};
use tower_http::{services::ServeDir, trace::TraceLayer};

use super::{handlers, proxy};
use crate::voice::VoiceService;
use crate::web;

pub struct AppState {
    pub voice: VoiceService,
    pub upstream: proxy::UpstreamClient,
}

/// Route table, most specific prefix first. The matcher prefers static
/// segments over captures, so `/api/voice/*` and `/api/tts` can never fall
/// through to the `/api/*path` proxy capture.
pub fn create_router(state: Arc<AppState>, web_root: impl AsRef<Path>) -> Router {
    Router::new()
        .route("/", get(redirect_to_index))
        .route("/api/voice/status", get(handlers::voice_status))
        .route("/api/voice/settings", post(handlers::voice_settings))
        .route("/api/voice/upload", post(handlers::voice_upload))
        // The wildcard needs a non-empty remainder, so the bare prefix gets
        // its own route; neither may fall through to the proxy.
        .route("/api/voice/", any(handlers::voice_not_found))
        .route("/api/voice/*rest", any(handlers::voice_not_found))
        // Synthesis owns the whole /api/tts prefix for POST. GET is not a
        // voice endpoint and proxies like any other /api path.
        .route("/api/tts", post(handlers::tts).get(proxy::forward))
        .route("/api/tts/*rest", post(handlers::tts).get(proxy::forward))
        .route("/api/*path", any(proxy::forward))
        .fallback_service(ServeDir::new(web_root))
        .layer(middleware::from_fn(cors))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn redirect_to_index() -> impl IntoResponse {
    (
        StatusCode::MOVED_PERMANENTLY,
        [(header::LOCATION, HeaderValue::from_static(web::INDEX_ROUTE))],
    )
}

/// CORS for the whole surface: OPTIONS is answered locally before any
/// routing, every other response carries the wildcard origin.
async fn cors(req: Request, next: Next) -> Response {
    if req.method() == Method::OPTIONS {
        let mut response = StatusCode::NO_CONTENT.into_response();
        let headers = response.headers_mut();
        headers.insert(
            header::ACCESS_CONTROL_ALLOW_ORIGIN,
            HeaderValue::from_static("*"),
        );
        headers.insert(
            header::ACCESS_CONTROL_ALLOW_METHODS,
            HeaderValue::from_static("GET, POST, OPTIONS"),
        );
        headers.insert(
            header::ACCESS_CONTROL_ALLOW_HEADERS,
            HeaderValue::from_static("Content-Type"),
        );
        // Preflight result is cacheable for 24 hours.
        headers.insert(
            header::ACCESS_CONTROL_MAX_AGE,
            HeaderValue::from_static("86400"),
        );
        return response;
    }

    let mut response = next.run(req).await;
    let headers = response.headers_mut();
    if !headers.contains_key(header::ACCESS_CONTROL_ALLOW_ORIGIN) {
        headers.insert(
            header::ACCESS_CONTROL_ALLOW_ORIGIN,
            HeaderValue::from_static("*"),
        );
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request as HttpRequest;
    use http_body_util::BodyExt;
    use serde_json::Value;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tower::ServiceExt;

    use crate::api::proxy::UpstreamClient;
    use crate::voice::SampleStore;

    fn test_app(upstream_base: &str) -> (tempfile::TempDir, Arc<AppState>, Router) {
        let tmp = tempfile::tempdir().unwrap();
        let store = SampleStore::new(tmp.path().join("voices")).unwrap();
        let web_root = tmp.path().join("web");
        std::fs::create_dir_all(&web_root).unwrap();

        let state = Arc::new(AppState {
            voice: VoiceService::new(store, None),
            upstream: UpstreamClient::new(upstream_base),
        });
        let router = create_router(Arc::clone(&state), web_root);
        (tmp, state, router)
    }

    /// Base URL on a port nothing listens on.
    const DEAD_UPSTREAM: &str = "http://127.0.0.1:9/api";

    /// Minimal canned upstream: reads one request, writes a fixed response.
    async fn spawn_upstream(response: &'static [u8]) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let mut buf = Vec::new();
                let mut chunk = [0u8; 1024];
                loop {
                    let n = socket.read(&mut chunk).await.unwrap_or(0);
                    if n == 0 {
                        break;
                    }
                    buf.extend_from_slice(&chunk[..n]);
                    if request_complete(&buf) {
                        break;
                    }
                }
                let _ = socket.write_all(response).await;
                let _ = socket.shutdown().await;
            }
        });
        format!("http://{}/api", addr)
    }

    fn request_complete(buf: &[u8]) -> bool {
        let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") else {
            return false;
        };
        let head = String::from_utf8_lossy(&buf[..end]).to_lowercase();
        let body_len = head
            .lines()
            .find_map(|line| line.strip_prefix("content-length:"))
            .and_then(|v| v.trim().parse::<usize>().ok())
            .unwrap_or(0);
        buf.len() >= end + 4 + body_len
    }

    async fn body_bytes(response: Response) -> Vec<u8> {
        response
            .into_body()
            .collect()
            .await
            .unwrap()
            .to_bytes()
            .to_vec()
    }

    #[tokio::test]
    async fn test_preflight_any_path_is_204_with_cors() {
        let (_tmp, _state, app) = test_app(DEAD_UPSTREAM);

        for path in ["/", "/api/generate", "/api/voice/status", "/anything"] {
            let response = app
                .clone()
                .oneshot(
                    HttpRequest::builder()
                        .method("OPTIONS")
                        .uri(path)
                        .body(Body::empty())
                        .unwrap(),
                )
                .await
                .unwrap();

            assert_eq!(response.status(), StatusCode::NO_CONTENT, "path {}", path);
            let headers = response.headers();
            assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
            assert_eq!(
                headers[header::ACCESS_CONTROL_ALLOW_METHODS],
                "GET, POST, OPTIONS"
            );
            assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_HEADERS], "Content-Type");
            assert_eq!(headers[header::ACCESS_CONTROL_MAX_AGE], "86400");
            assert!(body_bytes(response).await.is_empty());
        }
    }

    #[tokio::test]
    async fn test_root_redirects_to_chat_client() {
        let (_tmp, _state, app) = test_app(DEAD_UPSTREAM);

        let response = app
            .oneshot(HttpRequest::get("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::MOVED_PERMANENTLY);
        assert_eq!(response.headers()[header::LOCATION], "/ollama8web/index.html");
    }

    #[tokio::test]
    async fn test_post_outside_api_is_method_not_allowed() {
        let (_tmp, _state, app) = test_app(DEAD_UPSTREAM);

        let response = app
            .oneshot(
                HttpRequest::post("/some/page.html")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn test_voice_paths_never_reach_the_proxy() {
        // Upstream is unreachable; voice endpoints must answer anyway.
        let (_tmp, _state, app) = test_app(DEAD_UPSTREAM);

        let response = app
            .clone()
            .oneshot(
                HttpRequest::get("/api/voice/status")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");

        let response = app
            .clone()
            .oneshot(
                HttpRequest::post("/api/voice/does-not-exist")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        // The bare prefix has no remainder for the wildcard to capture and
        // must still stay off the proxy.
        for method in ["GET", "POST"] {
            let response = app
                .clone()
                .oneshot(
                    HttpRequest::builder()
                        .method(method)
                        .uri("/api/voice/")
                        .body(Body::empty())
                        .unwrap(),
                )
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::NOT_FOUND, "method {}", method);
        }
    }

    #[tokio::test]
    async fn test_tts_prefix_posts_reach_the_synthesizer() {
        // Upstream is unreachable; a proxied request would 502. The degraded
        // engine answers 503, proving the synthesizer handled it.
        let (_tmp, _state, app) = test_app(DEAD_UPSTREAM);

        for path in ["/api/tts", "/api/tts/extra"] {
            let response = app
                .clone()
                .oneshot(
                    HttpRequest::post(path)
                        .header(header::CONTENT_TYPE, "application/json")
                        .body(Body::from(r#"{"text": "hello"}"#))
                        .unwrap(),
                )
                .await
                .unwrap();
            assert_eq!(
                response.status(),
                StatusCode::SERVICE_UNAVAILABLE,
                "path {}",
                path
            );
        }
    }

    #[tokio::test]
    async fn test_proxy_unreachable_upstream_is_502() {
        let (_tmp, _state, app) = test_app(DEAD_UPSTREAM);

        let response = app
            .clone()
            .oneshot(
                HttpRequest::post("/api/generate")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(r#"{"model":"llama2","prompt":"hi"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        let body = String::from_utf8(body_bytes(response).await).unwrap();
        assert!(body.contains("Error"), "body: {}", body);

        // The relay keeps serving after an upstream failure.
        let response = app
            .oneshot(
                HttpRequest::get("/api/voice/status")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_proxy_relays_status_headers_and_body() {
        let upstream = spawn_upstream(
            b"HTTP/1.1 200 OK\r\n\
              Content-Type: application/json\r\n\
              Connection: close\r\n\
              Content-Length: 20\r\n\r\n\
              {\"response\":\"hello\"}",
        )
        .await;
        let (_tmp, _state, app) = test_app(&upstream);

        let response = app
            .oneshot(
                HttpRequest::post("/api/generate")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(
                        r#"{"model":"llama2","prompt":"hi","stream":false}"#,
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);

        let headers = response.headers();
        assert_eq!(headers[header::CONTENT_TYPE], "application/json");
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
        assert_eq!(
            headers[header::ACCESS_CONTROL_ALLOW_METHODS],
            "GET, POST, OPTIONS"
        );
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_HEADERS], "Content-Type");
        assert!(!headers.contains_key(header::CONNECTION));
        assert!(!headers.contains_key(header::TRANSFER_ENCODING));

        let body: Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
        assert_eq!(body["response"], "hello");
    }

    #[tokio::test]
    async fn test_proxy_relays_upstream_error_status() {
        let upstream = spawn_upstream(
            b"HTTP/1.1 404 Not Found\r\n\
              Content-Length: 0\r\n\r\n",
        )
        .await;
        let (_tmp, _state, app) = test_app(&upstream);

        let response = app
            .oneshot(
                HttpRequest::get("/api/tags")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
    }
}
