//! HTTP API in front of the sensor hub.
//!
//! The routing layer owns everything HTTP specific: bearer-token checks, CORS,
//! status code mapping and JSON encoding. The hub itself never sees a request.

pub mod config;
pub mod handlers;
pub mod router;

// Re-export commonly used items
pub use config::WebConfig;
pub use handlers::AppState;
pub use router::create_app;

use crate::error::{HubError, Result};
use crate::hub::SensorHub;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;

/// Serve the API until `shutdown` resolves.
pub async fn start_web_server<F>(config: WebConfig, hub: Arc<SensorHub>, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = config
        .bind_address()
        .parse::<SocketAddr>()
        .map_err(|e| HubError::config_error(format!("Invalid bind address: {}", e)))?;

    let app = create_app(AppState::new(hub, config))?;

    info!("Starting Sensor Hub web server on http://{}", addr);
    info!("Health endpoint: http://{}/health", addr);
    info!("API endpoint: http://{}/api/sensors", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| HubError::web_server_error(format!("Failed to bind to address: {}", e)))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| HubError::web_server_error(format!("Server error: {}", e)))?;

    Ok(())
}
