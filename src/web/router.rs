//! Web application router and middleware setup.

use crate::error::{HubError, Result};
use crate::web::config::WebConfig;
use crate::web::handlers::{self, AppState};
use axum::{
    http::{HeaderValue, Method},
    middleware,
    routing::get,
    Router,
};
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowHeaders, AllowOrigin, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;

/// Create the main axum application with all routes and middleware.
pub fn create_app(state: AppState) -> Result<Router> {
    let api = Router::new()
        .route("/api/sensors", get(handlers::list_sensors))
        .route("/api/sensors/:sensor_id", get(handlers::get_sensor_data))
        .route("/api/sensors/:sensor_id/info", get(handlers::get_sensor_info))
        // Legacy endpoint for backwards compatibility
        .route(
            "/api/temp-and-humid-sensor",
            get(handlers::get_sensor_data_legacy),
        )
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            handlers::require_api_key,
        ));

    let mut app = Router::new()
        .route("/", get(handlers::health_check))
        .route("/health", get(handlers::health_check))
        .merge(api)
        .with_state(state.clone());

    if state.config.enable_cors {
        app = app.layer(cors_layer(&state.config.cors_origins)?);
    }

    app = app.layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()));

    Ok(app)
}

/// CORS restricted to the configured origins, credentials allowed.
fn cors_layer(origins: &[String]) -> Result<CorsLayer> {
    let origins = origins
        .iter()
        .map(|origin| {
            origin.parse::<HeaderValue>().map_err(|e| {
                HubError::config_error(format!("Invalid CORS origin '{}': {}", origin, e))
            })
        })
        .collect::<Result<Vec<_>>>()?;

    info!("CORS enabled for {} origin(s)", origins.len());

    Ok(CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hub::SensorHub;
    use crate::registry::SensorRegistry;
    use std::sync::Arc;

    fn state(config: WebConfig) -> AppState {
        let registry = SensorRegistry::build(&[]).unwrap();
        let hub = SensorHub::new(registry, Default::default());
        AppState::new(Arc::new(hub), config)
    }

    #[test]
    fn test_create_app() {
        let config = WebConfig::default()
            .with_cors_origins(vec!["http://localhost:3000".to_string()])
            .with_api_key("k");
        assert!(create_app(state(config)).is_ok());
    }

    #[test]
    fn test_invalid_origin_rejected() {
        let config = WebConfig::default().with_cors_origins(vec!["bad\norigin".to_string()]);
        assert!(create_app(state(config)).is_err());
    }
}
