//! HTTP server

use crate::pool::ExecutionPool;
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use sandcastle_core::protocol::{ErrorResponse, ExecuteRequest, ExecuteResponse, HealthResponse};
use sandcastle_core::SandcastleError;
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

pub fn router(pool: Arc<ExecutionPool>) -> Router {
    Router::new()
        .route("/execute", post(execute))
        .route("/health", get(health))
        .route("/status", get(status))
        .layer(TraceLayer::new_for_http())
        .with_state(pool)
}

/// Run the daemon server until `shutdown` resolves
pub async fn run(
    listener: TcpListener,
    pool: Arc<ExecutionPool>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    axum::serve(listener, router(pool))
        .with_graceful_shutdown(shutdown)
        .await
}

fn error_response(err: &SandcastleError) -> Response {
    let status =
        StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(ErrorResponse::from(err))).into_response()
}

async fn execute(
    State(pool): State<Arc<ExecutionPool>>,
    payload: Result<Json<ExecuteRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match payload {
        Ok(payload) => payload,
        Err(rejection) => {
            tracing::debug!(error = %rejection, "rejected request body");
            let err = SandcastleError::Validation(format!(
                "Invalid request body: {}",
                rejection.body_text()
            ));
            return error_response(&err);
        }
    };

    if let Err(err) = request.validate() {
        return error_response(&err);
    }

    match pool.execute(&request).await {
        Ok(result) => (StatusCode::OK, Json(ExecuteResponse::from(&result))).into_response(),
        Err(err) => error_response(&err),
    }
}

async fn health(State(pool): State<Arc<ExecutionPool>>) -> Response {
    let status = match pool.orchestrator().runtime().ping().await {
        Ok(()) => StatusCode::OK,
        Err(e) => {
            tracing::warn!(error = %e, "container runtime unreachable");
            StatusCode::SERVICE_UNAVAILABLE
        }
    };

    let body = HealthResponse {
        status: if status.is_success() { "ok" } else { "unavailable" }.into(),
        version: env!("CARGO_PKG_VERSION").into(),
    };
    (status, Json(body)).into_response()
}

async fn status(State(pool): State<Arc<ExecutionPool>>) -> Response {
    Json(pool.status()).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use sandcastle_core::runtime::{ContainerRuntime, ContainerSpec, ExitStatus, UsageSnapshot};
    use sandcastle_core::{Orchestrator, Result, SandboxConfig};
    use std::path::Path;
    use std::time::Duration;
    use tower::ServiceExt;

    /// Echoes a fixed output, or never exits when `hang` is set
    struct StubRuntime {
        hang: bool,
        reachable: bool,
    }

    #[async_trait]
    impl ContainerRuntime for StubRuntime {
        async fn ping(&self) -> Result<()> {
            if self.reachable {
                Ok(())
            } else {
                Err(SandcastleError::runtime("ping", "connection refused"))
            }
        }
        async fn image_exists(&self, _image: &str) -> Result<bool> {
            Ok(true)
        }
        async fn build_image(&self, _image: &str, _context: &Path) -> Result<()> {
            Ok(())
        }
        async fn create(&self, _spec: &ContainerSpec) -> Result<String> {
            Ok("stub".into())
        }
        async fn start(&self, _id: &str) -> Result<()> {
            Ok(())
        }
        async fn wait(&self, _id: &str) -> Result<ExitStatus> {
            if self.hang {
                std::future::pending::<()>().await;
            }
            Ok(ExitStatus {
                code: 0,
                oom_killed: false,
            })
        }
        async fn stop(&self, _id: &str, _grace: Duration) -> Result<()> {
            Ok(())
        }
        async fn logs(&self, _id: &str) -> Result<Vec<u8>> {
            Ok(b"hi\n".to_vec())
        }
        async fn stats(&self, _id: &str) -> Result<UsageSnapshot> {
            Ok(UsageSnapshot {
                memory_usage_bytes: Some(3 * 1024 * 1024),
                memory_peak_bytes: None,
            })
        }
        async fn remove(&self, _id: &str) -> Result<()> {
            Ok(())
        }
    }

    fn app(hang: bool, reachable: bool) -> Router {
        let config = SandboxConfig::builder()
            .timeout(Duration::from_millis(50))
            .build();
        let orchestrator = Orchestrator::new(Arc::new(StubRuntime { hang, reachable }), config);
        router(Arc::new(ExecutionPool::new(orchestrator, 2)))
    }

    async fn send(app: Router, request: Request<Body>) -> (StatusCode, serde_json::Value) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    fn post_execute(body: &str) -> Request<Body> {
        Request::post("/execute")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn execute_returns_output_time_and_memory() {
        let (status, body) = send(
            app(false, true),
            post_execute(r#"{"code":"print(\"hi\")","language":"python"}"#),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["output"], "hi");
        assert_eq!(body["memoryUsage"], "3MB / 256MB");
        assert_eq!(body["outcome"], "completed");
        assert!(body["executionTime"].as_str().unwrap().ends_with("ms"));
    }

    #[tokio::test]
    async fn timeout_maps_to_408() {
        let (status, body) = send(
            app(true, true),
            post_execute(r#"{"code":"while True: pass","language":"python"}"#),
        )
        .await;

        assert_eq!(status, StatusCode::REQUEST_TIMEOUT);
        assert_eq!(body["error"], "Execution timed out (1 seconds limit).");
    }

    #[tokio::test]
    async fn malformed_body_is_a_bad_request() {
        let (status, body) = send(app(false, true), post_execute(r#"{"code": 1}"#)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().starts_with("Invalid request body"));
    }

    #[tokio::test]
    async fn unknown_language_is_a_bad_request() {
        let (status, body) = send(
            app(false, true),
            post_execute(r#"{"code":"x","language":"cobol"}"#),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("python"));
    }

    #[tokio::test]
    async fn health_reflects_runtime_reachability() {
        let get = || Request::get("/health").body(Body::empty()).unwrap();

        let (status, body) = send(app(false, true), get()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");

        let (status, _) = send(app(false, false), get()).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn status_reports_idle_slots() {
        let request = Request::get("/status").body(Body::empty()).unwrap();
        let (status, body) = send(app(false, true), request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, serde_json::json!({ "total": 2, "busy": 0, "idle": 2 }));
    }
}
