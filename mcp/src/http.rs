use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use nagios_mcp_runtime::{Fetcher, McpServer};
use serde::Serialize;
use serde_json::Value;
use tokio::io;
use tower_http::trace::TraceLayer;

const MCP_PATH: &str = "/mcp";

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

pub fn router<F: Fetcher + 'static>(server: McpServer<F>) -> Router {
    Router::new()
        .route(MCP_PATH, post(mcp_post::<F>).get(mcp_get))
        .route("/health", get(health_check))
        .layer(TraceLayer::new_for_http())
        .with_state(server)
}

pub async fn serve<F: Fetcher + 'static>(
    server: McpServer<F>,
    host: &str,
    port: u16,
) -> io::Result<()> {
    let listener = tokio::net::TcpListener::bind((host, port)).await?;
    tracing::info!(addr = %listener.local_addr()?, "serving MCP over HTTP");
    axum::serve(listener, router(server)).await
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn mcp_get() -> Response {
    StatusCode::METHOD_NOT_ALLOWED.into_response()
}

async fn mcp_post<F: Fetcher + 'static>(
    State(server): State<McpServer<F>>,
    body: Bytes,
) -> Response {
    let incoming: Value = match serde_json::from_slice(&body) {
        Ok(payload) => payload,
        Err(_) => {
            return (
                StatusCode::OK,
                Json(nagios_mcp_runtime::parse_error_response()),
            )
                .into_response();
        }
    };

    let is_batch = incoming.is_array();
    let mut responses = server.handle_incoming_message(incoming).await;

    if responses.is_empty() {
        return StatusCode::ACCEPTED.into_response();
    }

    if responses.len() == 1 && !is_batch {
        return (StatusCode::OK, Json(responses.remove(0))).into_response();
    }

    (StatusCode::OK, Json(Value::Array(responses))).into_response()
}
