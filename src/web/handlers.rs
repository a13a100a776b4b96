//! HTTP handlers for API endpoints.

use crate::error::HubError;
use crate::hub::SensorHub;
use crate::sensors::dht22::TEMPERATURE_KEY;
use crate::sensors::{ReadResult, ReadingData, ReadingValue, SensorInfo};
use crate::web::config::WebConfig;
use axum::{
    extract::{Path, Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, error};

/// State shared by all handlers.
#[derive(Clone)]
pub struct AppState {
    pub hub: Arc<SensorHub>,
    pub config: Arc<WebConfig>,
}

impl AppState {
    pub fn new(hub: Arc<SensorHub>, config: WebConfig) -> Self {
        Self {
            hub,
            config: Arc::new(config),
        }
    }
}

/// Errors surfaced to HTTP clients.
#[derive(Debug)]
pub enum ApiError {
    Unauthorized,
    NotFound(String),
    ReadFailed(String),
    Internal(String),
}

impl From<HubError> for ApiError {
    fn from(err: HubError) -> Self {
        match err {
            HubError::NotFound(_) => Self::NotFound(err.to_string()),
            other => Self::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "Invalid or missing API key".to_string(),
            ),
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            Self::ReadFailed(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
            Self::Internal(msg) => {
                error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

/// Reject `/api/*` requests without the configured bearer token.
pub async fn require_api_key(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let authorized = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value == state.config.expected_authorization());

    if !authorized {
        debug!("Rejected unauthenticated request to {}", request.uri().path());
        return ApiError::Unauthorized.into_response();
    }
    next.run(request).await
}

/// Health endpoint body.
#[derive(Debug, Serialize)]
struct HealthBody {
    status: String,
    sensors: BTreeMap<String, String>,
    summary: crate::health::HealthSummary,
}

/// Health check endpoint - reads all sensors.
pub async fn health_check(State(state): State<AppState>) -> Response {
    let report = state.hub.health().await;

    let sensors = report
        .per_sensor
        .iter()
        .map(|(id, result)| {
            let status = if result.success { "healthy" } else { "unhealthy" };
            (id.clone(), status.to_string())
        })
        .collect();
    let body = HealthBody {
        status: report.overall.to_string(),
        sensors,
        summary: report.summary(),
    };

    let code = if report.is_healthy() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (code, Json(body)).into_response()
}

/// List all available sensors.
pub async fn list_sensors(State(state): State<AppState>) -> Json<serde_json::Value> {
    let sensors: Vec<SensorInfo> = state.hub.list_sensors();
    Json(json!({
        "count": sensors.len(),
        "sensors": sensors,
    }))
}

/// Get data from a specific sensor.
pub async fn get_sensor_data(
    State(state): State<AppState>,
    Path(sensor_id): Path<String>,
) -> Result<Json<ReadingData>, ApiError> {
    let result = state.hub.read_sensor(&sensor_id).await?;
    reading_data(result).map(Json)
}

/// Get information about a specific sensor.
pub async fn get_sensor_info(
    State(state): State<AppState>,
    Path(sensor_id): Path<String>,
) -> Result<Json<SensorInfo>, ApiError> {
    Ok(Json(state.hub.sensor_info(&sensor_id)?))
}

/// Historical endpoint: data of the legacy sensor, with Fahrenheit added.
pub async fn get_sensor_data_legacy(
    State(state): State<AppState>,
) -> Result<Json<ReadingData>, ApiError> {
    let sensor_id = state
        .hub
        .legacy_sensor_id()
        .ok_or_else(|| ApiError::NotFound("No DHT22 sensor configured".to_string()))?;

    let result = state.hub.read_sensor(&sensor_id).await?;
    let mut data = reading_data(result)?;
    add_fahrenheit(&mut data);
    Ok(Json(data))
}

fn reading_data(result: ReadResult) -> Result<ReadingData, ApiError> {
    if result.success {
        Ok(result.data.unwrap_or_default())
    } else {
        Err(ApiError::ReadFailed(
            result
                .error
                .unwrap_or_else(|| "Failed to retrieve data from sensor".to_string()),
        ))
    }
}

/// Older clients expect `temperature_f` next to the Celsius reading.
pub fn add_fahrenheit(data: &mut ReadingData) {
    if let Some(celsius) = data.get(TEMPERATURE_KEY).and_then(ReadingValue::as_f64) {
        let fahrenheit = celsius * 9.0 / 5.0 + 32.0;
        data.insert(
            "temperature_f".to_string(),
            ReadingValue::Number((fahrenheit * 10.0).round() / 10.0),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_fahrenheit() {
        let mut data = ReadingData::new();
        data.insert(TEMPERATURE_KEY.to_string(), ReadingValue::Number(21.5));
        add_fahrenheit(&mut data);
        assert_eq!(data["temperature_f"], ReadingValue::Number(70.7));
    }

    #[test]
    fn test_add_fahrenheit_without_temperature() {
        let mut data = ReadingData::new();
        add_fahrenheit(&mut data);
        assert!(data.is_empty());
    }

    #[test]
    fn test_not_found_maps_to_404() {
        let response = ApiError::from(HubError::not_found("x")).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_read_failure_maps_to_500() {
        let response = ApiError::ReadFailed("checksum".into()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
