//! HTTP surface: one POST route per configured endpoint

use axum::{
    body::Bytes,
    extract::{ConnectInfo, DefaultBodyLimit, MatchedPath, State},
    http::{header::CONTENT_TYPE, HeaderMap},
    routing::post,
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{error, info, info_span, Instrument};
use uuid::Uuid;

use crate::engine::{
    from_chain_result, AssembledResponse, ChainExecutor, EndpointTable, ExecutionRequest,
};

/// Shared, read-only state handed to every request
pub struct ApiState {
    pub endpoints: Arc<EndpointTable>,
    pub executor: ChainExecutor,
}

impl ApiState {
    pub fn new(endpoints: EndpointTable) -> Self {
        Self {
            endpoints: Arc::new(endpoints),
            executor: ChainExecutor::default(),
        }
    }
}

/// Create the API router with a POST route for every registered path.
///
/// Request bodies are unbounded: file-write steps take arbitrarily large
/// uploads, and a body limit would answer outside the 200/400/500 contract.
pub fn create_router(state: Arc<ApiState>) -> Router {
    let mut router = Router::new();
    for path in state.endpoints.paths() {
        router = router.route(path, post(run_endpoint));
    }

    router
        .layer(DefaultBodyLimit::disable())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind `addr` and serve until Ctrl-C
pub async fn serve(addr: SocketAddr, state: Arc<ApiState>) -> crate::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Server is listening on {}", listener.local_addr()?);

    let app = create_router(state);
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

async fn run_endpoint(
    State(state): State<Arc<ApiState>>,
    matched: MatchedPath,
    remote: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    body: Bytes,
) -> AssembledResponse {
    let request_id = Uuid::new_v4();
    let endpoint_path = matched.as_str().to_string();
    let span = info_span!("request", %request_id, endpoint = %endpoint_path);

    async move {
        let requester = remote
            .map(|ConnectInfo(addr)| addr.to_string())
            .unwrap_or_else(|| "unknown".to_string());
        info!(
            "Received request for endpoint: '{}'. Requester: '{}'.",
            endpoint_path, requester
        );

        let request = match parse_request(&headers, &body) {
            Ok(request) => request,
            Err(message) => {
                error!("{}", message);
                return AssembledResponse::request_error(message);
            }
        };

        let Some(endpoint) = state.endpoints.get(&endpoint_path) else {
            return AssembledResponse::request_error(format!(
                "No command mapped to {endpoint_path}"
            ));
        };

        let result = state.executor.execute(&endpoint.chain, &request).await;
        if let Err(e) = &result {
            error!("{}", e);
        }

        let response = from_chain_result(result, request.return_json);
        info!(status = response.status.as_u16(), "Request complete");
        response
    }
    .instrument(span)
    .await
}

/// Body must be JSON and declared as such
fn parse_request(headers: &HeaderMap, body: &[u8]) -> Result<ExecutionRequest, String> {
    if !is_json(headers) {
        return Err("Expected JSON".to_string());
    }

    serde_json::from_slice(body).map_err(|e| format!("Malformed request body: {e}"))
}

fn is_json(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(';').next())
        .map(|mime| {
            let mime = mime.trim().to_ascii_lowercase();
            mime == "application/json"
                || (mime.starts_with("application/") && mime.ends_with("+json"))
        })
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(content_type: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_str(content_type).unwrap());
        headers
    }

    #[test]
    fn test_json_content_types() {
        assert!(is_json(&headers("application/json")));
        assert!(is_json(&headers("application/json; charset=utf-8")));
        assert!(is_json(&headers("application/vnd.api+json")));
        assert!(!is_json(&headers("text/plain")));
        assert!(!is_json(&HeaderMap::new()));
    }

    #[test]
    fn test_parse_request_rejects_wrong_types() {
        let err = parse_request(&headers("application/json"), br#"{"args": [1, 2]}"#).unwrap_err();
        assert!(err.starts_with("Malformed request body"));

        let err = parse_request(&headers("application/json"), br#"{"timeout": -5}"#).unwrap_err();
        assert!(err.starts_with("Malformed request body"));
    }

    #[test]
    fn test_parse_request_requires_json_header() {
        let err = parse_request(&headers("text/plain"), b"{}").unwrap_err();
        assert_eq!(err, "Expected JSON");
    }
}
