use axum::{Router, http::StatusCode, routing::get};

/// Kubelet probe handler. The controller has no warm-up phase beyond binding
/// the listener, so liveness and readiness share one answer.
async fn health_probe() -> StatusCode {
    StatusCode::NO_CONTENT
}

pub fn create_app() -> Router {
    Router::new()
        .route("/health/live", get(health_probe))
        .route("/health/ready", get(health_probe))
}
