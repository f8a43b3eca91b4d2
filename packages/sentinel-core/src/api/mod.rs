//! Headless HTTP surface over the controller.
//!
//! Handlers are thin: they read controller snapshots or forward operator
//! actions. Lifecycle events are streamed to clients as server-sent events.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use thiserror::Error;

use crate::controller::AlertController;

pub mod http;
pub mod response;

/// Errors that can occur when starting or running the server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Failed to bind or serve.
    #[error("Failed to bind to port: {0}")]
    Bind(#[from] std::io::Error),
}

/// Shared state for the API layer.
#[derive(Clone)]
pub struct AppState {
    pub controller: Arc<AlertController>,
}

impl AppState {
    pub fn new(controller: Arc<AlertController>) -> Self {
        Self { controller }
    }
}

/// Serves the API on `0.0.0.0:port` until `shutdown` resolves.
///
/// Port 0 picks a free port; the bound address is logged.
pub async fn start_server<F>(state: AppState, port: u16, shutdown: F) -> Result<(), ServerError>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    log::info!("Server listening on http://{}", listener.local_addr()?);

    let app = http::create_router(state);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}
