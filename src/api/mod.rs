//! REST control surface of the imitator.
//!
//! Routes, all under `/imitator`:
//! - `GET /mode`, `PUT /mode`: read or switch auto/manual mode
//! - `GET /ups`: authoritative UPS state
//! - `PATCH /ups/params`, `PATCH /ups/battery/{bat_id}`, `PATCH /ups/alarms`:
//!   operator overrides, accepted in manual mode only

mod handlers;
mod types;

use std::future::Future;
use std::io;
use std::sync::Arc;

use axum::Router;
use axum::routing::{get, patch};
use tokio::net::{TcpListener, ToSocketAddrs};
use tracing::info;

use crate::imitator::Imitator;

pub use types::{ApiError, ErrorResponse, ModeBody, StatusBody};

/// Builds the axum router with all API routes.
///
/// # Arguments
///
/// * `imitator` - Coordinator shared with the tick task
pub fn router(imitator: Arc<Imitator>) -> Router {
    Router::new()
        .route(
            "/imitator/mode",
            get(handlers::get_mode).put(handlers::put_mode),
        )
        .route("/imitator/ups", get(handlers::get_ups))
        .route("/imitator/ups/params", patch(handlers::patch_params))
        .route(
            "/imitator/ups/battery/{bat_id}",
            patch(handlers::patch_battery),
        )
        .route("/imitator/ups/alarms", patch(handlers::patch_alarms))
        .with_state(imitator)
}

/// Binds to `addr` (a socket address or `host:port`) and serves the API
/// until `shutdown` resolves.
///
/// # Errors
///
/// Returns the I/O error if the listener cannot bind or the server fails.
pub async fn serve<A, F>(imitator: Arc<Imitator>, addr: A, shutdown: F) -> io::Result<()>
where
    A: ToSocketAddrs,
    F: Future<Output = ()> + Send + 'static,
{
    let app = router(imitator);
    let listener = TcpListener::bind(addr).await?;
    info!(addr = %listener.local_addr()?, "REST API listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
}
