use axum::http::HeaderValue;
use log::*;
use service::AppState;
use std::net::SocketAddr;
use tower_http::cors::{AllowOrigin, CorsLayer};

pub mod error;
mod router;
pub(crate) mod socket;

pub use error::{Error, Result};

/// Build the router and serve it until shutdown.
pub async fn init_server(app_state: AppState) -> Result<()> {
    let interface = app_state.config.interface.clone();
    let port = app_state.config.port;

    let cors = cors_layer(&app_state);
    let app = router::define_routes(app_state).layer(cors);

    let listen_addr = format!("{interface}:{port}");
    info!("Server starting... listening for requests on http://{listen_addr}");

    let listener = tokio::net::TcpListener::bind(&listen_addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    Ok(())
}

/// CORS policy built from the configured allowed origins. Credentials are
/// allowed so browsers send the `token` cookie on the socket handshake.
fn cors_layer(app_state: &AppState) -> CorsLayer {
    let origins: Vec<HeaderValue> = app_state
        .config
        .allowed_origins
        .iter()
        .filter_map(|origin| {
            HeaderValue::from_str(origin)
                .map_err(|_| warn!("Ignoring invalid allowed origin: {origin}"))
                .ok()
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([
            axum::http::Method::GET,
            axum::http::Method::POST,
        ])
        .allow_headers([
            axum::http::header::CONTENT_TYPE,
            axum::http::header::AUTHORIZATION,
        ])
        .allow_credentials(true)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to install ctrl-c handler: {e}");
        return;
    }
    info!("Shutdown signal received, draining connections");
}
