use crate::socket;
use axum::{routing::get, Router};
use service::AppState;

pub fn define_routes(app_state: AppState) -> Router {
    Router::new()
        .merge(health_routes())
        .merge(socket_routes(app_state))
}

fn health_routes() -> Router {
    Router::new().route("/health", get(health_check))
}

fn socket_routes(app_state: AppState) -> Router {
    Router::new()
        .route("/ws", get(socket::handler::ws_handler))
        .with_state(app_state)
}

/// GET liveness probe for load balancers and uptime checks.
async fn health_check() -> (axum::http::StatusCode, &'static str) {
    (axum::http::StatusCode::OK, "healthy")
}
