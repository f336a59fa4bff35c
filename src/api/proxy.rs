use std::sync::Arc;

use axum::{
    body::{Body, Bytes},
    extract::{Request, State},
    http::{header, HeaderMap, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
};

use super::routes::AppState;

/// Length of the fixed `/api` prefix stripped from inbound paths before
/// they are appended to the upstream base URL.
const API_PREFIX_LEN: usize = 4;

/// Stateless HTTP client for the model-serving backend. The base URL is
/// fixed for the process lifetime.
pub struct UpstreamClient {
    client: reqwest::Client,
    base: String,
}

impl UpstreamClient {
    pub fn new(base: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base: base.into(),
        }
    }

    fn target_url(&self, path_and_query: &str) -> String {
        format!("{}{}", self.base, &path_and_query[API_PREFIX_LEN..])
    }

    async fn send(
        &self,
        method: Method,
        url: &str,
        headers: &HeaderMap,
        body: Bytes,
    ) -> Result<reqwest::Response, reqwest::Error> {
        // Host and content-length are recomputed by the transport layer;
        // forwarding them verbatim would mismatch the re-issued request.
        let mut forwarded = HeaderMap::new();
        for (name, value) in headers {
            if name != header::HOST && name != header::CONTENT_LENGTH {
                forwarded.append(name.clone(), value.clone());
            }
        }

        let mut request = self.client.request(method, url).headers(forwarded);
        if !body.is_empty() {
            request = request.body(body);
        }

        request.send().await
    }
}

/// Generic `/api/*` forwarding: re-issue the inbound request against the
/// upstream base and relay status, headers and body.
pub async fn forward(State(state): State<Arc<AppState>>, req: Request) -> Response {
    let (parts, body) = req.into_parts();

    let body = match axum::body::to_bytes(body, usize::MAX).await {
        Ok(bytes) => bytes,
        Err(e) => {
            return (
                StatusCode::BAD_REQUEST,
                format!("Error reading request body: {}", e),
            )
                .into_response()
        }
    };

    let path_and_query = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/api");
    let url = state.upstream.target_url(path_and_query);

    tracing::debug!("Proxying {} {} -> {}", parts.method, parts.uri.path(), url);

    match state.upstream.send(parts.method, &url, &parts.headers, body).await {
        Ok(upstream) => relay(upstream).await,
        Err(e) => bad_gateway(&url, &e.to_string()),
    }
}

/// Buffered relay: the upstream response is fully received before any byte
/// is written downstream. Hop-by-hop headers are dropped, CORS headers
/// appended after the upstream copy.
async fn relay(upstream: reqwest::Response) -> Response {
    let status = upstream.status();
    let upstream_headers = upstream.headers().clone();
    let url = upstream.url().to_string();

    let body = match upstream.bytes().await {
        Ok(bytes) => bytes,
        Err(e) => return bad_gateway(&url, &e.to_string()),
    };

    let mut response = Response::new(Body::from(body));
    *response.status_mut() = status;

    let headers = response.headers_mut();
    for (name, value) in &upstream_headers {
        if name != header::TRANSFER_ENCODING && name != header::CONNECTION {
            headers.append(name.clone(), value.clone());
        }
    }
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

    response
}

fn bad_gateway(url: &str, detail: &str) -> Response {
    tracing::warn!("Upstream request to {} failed: {}", url, detail);
    (
        StatusCode::BAD_GATEWAY,
        format!("Error connecting to Ollama API at {}: {}", url, detail),
    )
        .into_response()
}
