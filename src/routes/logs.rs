/**
 * Logs Route Handler
 * Receives batched client-side logs from the admin dashboard and public
 * pages and re-emits them through the server's tracing pipeline.
 */
use axum::{
    extract::{Extension, Json},
    http::StatusCode,
    response::IntoResponse,
};
use tower_http::request_id::RequestId;

use crate::logging::config::{ClientLogBatch, ClientLogEntry, LogLevel, LogResponse};

/// POST /api/logs - Receive client logs
#[tracing::instrument(skip(logs), fields(batch_size = logs.logs.len()))]
pub async fn receive_client_logs(
    request_id: Option<Extension<RequestId>>,
    Json(logs): Json<ClientLogBatch>,
) -> impl IntoResponse {
    let req_id = request_id
        .as_ref()
        .and_then(|ext| ext.0.header_value().to_str().ok())
        .unwrap_or("unknown");

    tracing::info!(
        request_id = %req_id,
        batch_size = logs.logs.len(),
        "received client logs"
    );

    let mut processed = 0;
    for log in &logs.logs {
        emit_client_log(log, req_id);
        processed += 1;
    }

    let response = LogResponse {
        success: true,
        received: logs.logs.len(),
        processed,
        error: None,
    };

    (StatusCode::ACCEPTED, Json(response))
}

/// Re-emit a single client log entry at its own level.
fn emit_client_log(log: &ClientLogEntry, request_id: &str) {
    let span = tracing::info_span!(
        "client_log",
        request_id = %request_id,
        timestamp = %log.timestamp,
        source = "client",
    );
    let _enter = span.enter();

    match log.level {
        LogLevel::Trace => tracing::trace!(
            message = %log.message,
            context = ?log.context,
            metadata = ?log.metadata,
            "client log"
        ),
        LogLevel::Debug => tracing::debug!(
            message = %log.message,
            context = ?log.context,
            metadata = ?log.metadata,
            "client log"
        ),
        LogLevel::Info => tracing::info!(
            message = %log.message,
            context = ?log.context,
            metadata = ?log.metadata,
            "client log"
        ),
        LogLevel::Warn => tracing::warn!(
            message = %log.message,
            context = ?log.context,
            metadata = ?log.metadata,
            "client log"
        ),
        LogLevel::Error => tracing::error!(
            message = %log.message,
            context = ?log.context,
            metadata = ?log.metadata,
            "client log"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use axum::routing::post;
    use axum::Router;
    use tower::ServiceExt;

    #[derive(serde::Deserialize)]
    struct TestLogResponse {
        success: bool,
        received: usize,
        processed: usize,
    }

    #[tokio::test]
    async fn test_receive_logs_accepts_batch() {
        let app = Router::new().route("/api/logs", post(receive_client_logs));
        let payload = serde_json::json!({
            "logs": [
                { "timestamp": "2025-08-25T10:00:00Z", "level": "info", "message": "page loaded" },
                { "timestamp": "2025-08-25T10:00:01Z", "level": "error", "message": "save failed",
                  "context": { "table": "faqs_dwd2024" } },
            ]
        });
        let res = app
            .oneshot(
                Request::post("/api/logs")
                    .header("content-type", "application/json")
                    .body(Body::from(payload.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::ACCEPTED);

        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: TestLogResponse = serde_json::from_slice(&bytes).unwrap();
        assert!(body.success);
        assert_eq!(body.received, 2);
        assert_eq!(body.processed, 2);
    }

    #[tokio::test]
    async fn test_receive_logs_rejects_unknown_level() {
        let app = Router::new().route("/api/logs", post(receive_client_logs));
        let payload = serde_json::json!({
            "logs": [{ "timestamp": "2025-08-25T10:00:00Z", "level": "shout", "message": "hi" }]
        });
        let res = app
            .oneshot(
                Request::post("/api/logs")
                    .header("content-type", "application/json")
                    .body(Body::from(payload.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }
}
