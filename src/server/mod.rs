//! HTTP relay for paced responses.
//!
//! ```text
//! ┌──────────┐  POST /api/pace   ┌────────────────────────────────────┐
//! │  Client  │ ────────────────> │ api::pace                          │
//! │          │ <──────────────── │   body ─> paced_stream ─> response │
//! └──────────┘  text/plain,      └────────────────────────────────────┘
//!               chunked
//! ```
//!
//! `x-request-id` replays within the configured window are answered with
//! `409 Conflict` instead of being paced a second time.

pub mod api;

use std::sync::Arc;

use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::config::PacerConfig;
use crate::errors::ServerError;

pub use api::{AppState, SharedState};

/// Build the application router.
pub fn build_router(state: SharedState, dev_mode: bool) -> Router {
    let mut app = api::api_router()
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    if dev_mode {
        app = app.layer(CorsLayer::permissive());
    }
    app
}

/// Start the relay server and run until Ctrl+C.
pub async fn start_server(config: PacerConfig, dev_mode: bool) -> Result<(), ServerError> {
    config.validate()?;

    let host = if dev_mode { "0.0.0.0" } else { config.server.host.as_str() };
    let addr = format!("{}:{}", host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|source| ServerError::Bind {
            addr: addr.clone(),
            source,
        })?;
    let local_addr = listener.local_addr().map_err(ServerError::Serve)?;

    let state = Arc::new(AppState::new(config));
    let app = build_router(state, dev_mode);

    info!(%local_addr, dev_mode, "Pacer relay listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(ServerError::Serve)?;

    info!("Server shut down gracefully");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
    info!("Shutting down...");
}
