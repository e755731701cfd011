//! HTTP server for the telemetry dashboard
//!
//! Exposes the aggregation report and host vitals over a small REST API.
//!
//! # Routes
//!
//! - `GET /health` - Liveness check
//! - `GET /api/telemetry` - Aggregated telemetry plus host vitals
//! - `GET /metrics` - Prometheus text format
//!
//! # Example
//!
//! ```no_run
//! use wistec::server::TelemetryServer;
//!
//! #[tokio::main]
//! async fn main() {
//!     TelemetryServer::new(".beads/beads.db")
//!         .run("127.0.0.1:3000")
//!         .await
//!         .expect("Server failed");
//! }
//! ```

use crate::aggregator::{Aggregator, TelemetryReport};
use crate::config::WistecConfig;
use crate::metrics;
use crate::vitals::Vitals;
use crate::{Result, WistecError};
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;

/// Shared server state
struct AppState {
    aggregator: Aggregator,
}

/// HTTP server for the telemetry dashboard
pub struct TelemetryServer {
    state: Arc<AppState>,
}

impl TelemetryServer {
    /// Serve telemetry from the database at `db_path`
    ///
    /// The file does not need to exist yet; requests report it as missing
    /// until it does.
    pub fn new(db_path: impl Into<PathBuf>) -> Self {
        Self::with_aggregator(Aggregator::new(db_path))
    }

    pub fn with_aggregator(aggregator: Aggregator) -> Self {
        Self {
            state: Arc::new(AppState { aggregator }),
        }
    }

    fn router(state: Arc<AppState>) -> Router {
        Router::new()
            .route("/health", get(health))
            .route("/api/telemetry", get(get_telemetry))
            .route("/metrics", get(get_metrics))
            .with_state(state)
    }

    /// Run the server on the given address
    pub async fn run(self, addr: &str) -> Result<()> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| WistecError::Server(format!("Failed to bind {}: {}", addr, e)))?;

        tracing::info!(
            addr = addr,
            database = %self.state.aggregator.path().display(),
            "Telemetry server listening"
        );

        axum::serve(listener, Self::router(self.state))
            .await
            .map_err(WistecError::Io)
    }
}

/// Serve the database and bind address named in a config
pub async fn serve(config: &WistecConfig) -> Result<()> {
    TelemetryServer::new(&config.database)
        .run(&config.server.bind)
        .await
}

// ============================================================================
// Responses
// ============================================================================

/// Successful telemetry payload
#[derive(Debug, Serialize, Deserialize)]
pub struct TelemetryResponse {
    pub ok: bool,
    #[serde(flatten)]
    pub report: TelemetryReport,
    pub vitals: Vitals,
}

/// Error payload
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub ok: bool,
    pub error: String,
}

impl ErrorResponse {
    fn new(error: impl Into<String>) -> Self {
        Self {
            ok: false,
            error: error.into(),
        }
    }
}

/// Build the telemetry response for an aggregator
///
/// - store present: 200 with the report and vitals
/// - store missing: 404 `Database not found`
/// - anything else: 500 `Telemetry failed: <message>`
pub async fn telemetry_response(aggregator: &Aggregator) -> Response {
    let reader = aggregator.clone();
    // rusqlite is blocking
    let collected = tokio::task::spawn_blocking(move || reader.collect()).await;

    let report = match collected {
        Ok(Ok(report)) => report,
        Ok(Err(WistecError::StoreNotFound(path))) => {
            tracing::debug!(path = %path.display(), "Telemetry requested before database exists");
            return (
                StatusCode::NOT_FOUND,
                Json(ErrorResponse::new("Database not found")),
            )
                .into_response();
        }
        Ok(Err(e)) => return query_failed(e),
        Err(e) => return query_failed(e),
    };

    let body = TelemetryResponse {
        ok: true,
        report,
        vitals: Vitals::collect().await,
    };
    (StatusCode::OK, Json(body)).into_response()
}

fn query_failed(e: impl std::fmt::Display) -> Response {
    tracing::error!(error = %e, "Telemetry query failed");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse::new(format!("Telemetry failed: {}", e))),
    )
        .into_response()
}

// ============================================================================
// Handlers
// ============================================================================

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn get_telemetry(State(state): State<Arc<AppState>>) -> Response {
    telemetry_response(&state.aggregator).await
}

async fn get_metrics() -> Response {
    match metrics::encode_metrics() {
        Ok(text) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            text,
        )
            .into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse::new(e.to_string())),
        )
            .into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::EventStore;
    use crate::telemetry::{LogicBranch, NewEvent, NodeType};
    use axum::body::Body;
    use axum::http::Request;
    use tempfile::{NamedTempFile, TempDir};
    use tower::ServiceExt;

    fn create_test_server(path: impl Into<PathBuf>) -> Router {
        TelemetryServer::router(Arc::new(AppState {
            aggregator: Aggregator::new(path),
        }))
    }

    async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let temp_dir = TempDir::new().unwrap();
        let app = create_test_server(temp_dir.path().join("beads.db"));

        let (status, body) = get_json(app, "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn test_telemetry_database_not_found() {
        let temp_dir = TempDir::new().unwrap();
        let app = create_test_server(temp_dir.path().join("missing.db"));

        let (status, body) = get_json(app, "/api/telemetry").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(
            body,
            serde_json::json!({ "ok": false, "error": "Database not found" })
        );
    }

    #[tokio::test]
    async fn test_telemetry_before_table_exists() {
        let temp_file = NamedTempFile::new().unwrap();
        let app = create_test_server(temp_file.path());

        let (status, body) = get_json(app, "/api/telemetry").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["ok"], true);
        assert_eq!(body["telemetry"], serde_json::json!([]));
        assert_eq!(
            body["tokenStats"],
            serde_json::json!({ "total": 0, "avg": 0, "max": 0, "recent": 0, "rate": 0 })
        );
        assert!(body["vitals"]["cpu"]["cores"].is_number());
    }

    #[tokio::test]
    async fn test_telemetry_with_events() {
        let temp_file = NamedTempFile::new().unwrap();
        let store = EventStore::open(temp_file.path()).unwrap();
        store.ensure_schema().unwrap();
        store
            .append(&NewEvent::new(
                "Agent-1",
                "bd-7",
                NodeType::Analysis,
                LogicBranch::Normal,
                120,
            ))
            .unwrap();

        let app = create_test_server(temp_file.path());
        let (status, body) = get_json(app, "/api/telemetry").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["telemetry"][0]["agent_id"], "Agent-1");
        assert_eq!(body["telemetry"][0]["node_type"], "Analysis");
        assert_eq!(body["tokenStats"]["total"], 120);
        assert_eq!(body["tokenStats"]["recent"], 120);
        assert_eq!(body["agentStats"][0]["event_count"], 1);
        assert_eq!(body["nodeTypeStats"][0]["avg_tokens"], 120);
        assert!(body["vitals"]["hostname"].is_string());
    }

    #[tokio::test]
    async fn test_telemetry_query_failure() {
        // A file that exists but is not a SQLite database
        let temp_file = NamedTempFile::new().unwrap();
        std::fs::write(temp_file.path(), "not a database ".repeat(512)).unwrap();
        let app = create_test_server(temp_file.path());

        let (status, body) = get_json(app, "/api/telemetry").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["ok"], false);
        assert!(body["error"]
            .as_str()
            .unwrap()
            .starts_with("Telemetry failed: "));
    }

    #[tokio::test]
    async fn test_metrics_endpoint() {
        crate::metrics::record_cycle("success");
        let temp_dir = TempDir::new().unwrap();
        let app = create_test_server(temp_dir.path().join("beads.db"));

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/metrics")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(text.contains("wistec_cycles_total"));
    }
}
