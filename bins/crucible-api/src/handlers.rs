// HTTP route handlers for the Crucible API

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Json},
};
use crucible_common::types::{ExecutionRequest, ExecutionResult};
use std::sync::Arc;
use tracing::{error, info, Instrument};
use uuid::Uuid;

use crate::metrics;
use crate::AppState;

/// POST /api/run - Compile and run a snippet against its tests
///
/// Always answers 200 with an `ExecutionResult`; failures live in the body.
pub async fn run_code(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ExecutionRequest>,
) -> impl IntoResponse {
    let request_id = Uuid::new_v4();
    let span = tracing::info_span!("run", request_id = %request_id);

    async move {
        info!(
            tests = payload.tests.len(),
            code_bytes = payload.code.len(),
            "Execution requested"
        );

        // Bound concurrent compile/execute pipelines
        let _permit = match state.permits.acquire().await {
            Ok(permit) => permit,
            Err(e) => {
                error!(error = %e, "Concurrency limiter closed");
                let result = ExecutionResult::all_failed(
                    &payload.tests,
                    vec!["Server is shutting down".to_string()],
                    crucible_runner::error::TAG_SYSTEM_ERROR,
                );
                return (StatusCode::OK, Json(result));
            }
        };
        let _in_flight = metrics::InFlight::enter();

        let report = state.executor.run(&payload).await;
        metrics::record_run(report.outcome, report.elapsed);

        (StatusCode::OK, Json(report.result))
    }
    .instrument(span)
    .await
}

/// GET /status - Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

/// GET /metrics - Prometheus exposition
pub async fn metrics_handler() -> impl IntoResponse {
    match metrics::render() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, "Failed to render metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use crucible_common::config::RunnerConfig;
    use crucible_common::types::TestSpec;
    use crucible_runner::Executor;
    use std::path::Path;

    fn state(scratch: &Path) -> Arc<AppState> {
        let config = RunnerConfig {
            scratch_dir: Some(scratch.to_path_buf()),
            ..Default::default()
        };
        Arc::new(AppState::new(Executor::from_config(config)))
    }

    async fn call(state: Arc<AppState>, request: ExecutionRequest) -> (StatusCode, ExecutionResult) {
        let response = run_code(State(state), Json(request)).await.into_response();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn test_empty_code_is_rejected_with_200() {
        let scratch = tempfile::tempdir().unwrap();
        let request = ExecutionRequest::new("", vec![TestSpec::new("a", "true")]);

        let (status, result) = call(state(scratch.path()), request).await;

        assert_eq!(status, StatusCode::OK);
        assert!(!result.success);
        assert_eq!(result.logs, vec!["No code provided".to_string()]);
        assert!(result.tests.is_empty());
    }

    #[tokio::test]
    async fn test_run_hello_world() {
        let scratch = tempfile::tempdir().unwrap();
        let request = ExecutionRequest::new(
            "fn main() { println!(\"Hello from Test\"); }",
            Vec::new(),
        );

        let (status, result) = call(state(scratch.path()), request).await;

        assert_eq!(status, StatusCode::OK);
        assert!(result.success, "logs: {:?}", result.logs);
        assert_eq!(result.logs, vec!["Hello from Test".to_string()]);
    }

    #[tokio::test]
    async fn test_run_with_tests_counts_metric() {
        let scratch = tempfile::tempdir().unwrap();
        let request = ExecutionRequest::new(
            "fn add(a: i32, b: i32) -> i32 { a + b }",
            vec![TestSpec::new("1 + 1 = 2", "add(1, 1) == 2")],
        );
        let before = metrics::RUNS_TOTAL.with_label_values(&["success"]).get();

        let (_, result) = call(state(scratch.path()), request).await;

        assert!(result.success, "logs: {:?}", result.logs);
        assert_eq!(result.tests[0].description, "1 + 1 = 2");
        assert!(metrics::RUNS_TOTAL.with_label_values(&["success"]).get() > before);
    }

    #[tokio::test]
    async fn test_health_check() {
        let response = health_check().await.into_response();
        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"OK");
    }

    #[tokio::test]
    async fn test_metrics_endpoint() {
        metrics::record_run(crucible_runner::Outcome::NoCode, std::time::Duration::from_millis(1));
        let response = metrics_handler().await.into_response();
        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert!(String::from_utf8_lossy(&body).contains("crucible_runs_total"));
    }
}
