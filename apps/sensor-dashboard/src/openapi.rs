use axum::routing::get;
use axum::{Json, Router};
use utoipa::OpenApi;

use crate::state::AppState;

#[derive(OpenApi)]
#[openapi(
    info(title = "Sensor Dashboard API", description = "Windowed sensor data, charts and device control"),
    paths(
        crate::routes::health::healthz_handler,
        crate::routes::sensors::get_sensor_data,
        crate::routes::sensors::get_field_data,
        crate::routes::sensors::get_latest,
        crate::routes::sensors::get_status,
        crate::routes::sensors::get_summary,
        crate::routes::sensors::export_data,
        crate::routes::charts::render_chart,
        crate::routes::charts::nearest,
        crate::routes::devices::list_devices,
        crate::routes::devices::get_device,
        crate::routes::devices::register_device,
        crate::routes::devices::delete_device,
        crate::routes::devices::send_command,
        crate::routes::devices::update_config,
    ),
    components(schemas(
        crate::error::ErrorBody,
        crate::error::ValidationIssue,
        crate::field::Field,
        crate::sample::Sample,
        crate::chart::DisplayWindow,
        crate::services::aggregator::LatestReading,
        crate::services::aggregator::FieldHealth,
        crate::services::aggregator::FieldState,
        crate::services::aggregator::OverallHealth,
        crate::services::summary::FieldSummary,
        crate::services::devices::DeviceRecord,
        crate::routes::health::HealthResponse,
        crate::routes::sensors::RangeMeta,
        crate::routes::sensors::SensorDataResponse,
        crate::routes::sensors::FieldDataResponse,
        crate::routes::sensors::LatestResponse,
        crate::routes::sensors::StatusResponse,
        crate::routes::sensors::SummaryResponse,
        crate::routes::charts::NearestHit,
        crate::routes::charts::NearestResponse,
        crate::routes::devices::DeviceListResponse,
        crate::routes::devices::DeviceResponse,
        crate::routes::devices::DispatchResponse,
        crate::routes::devices::DeviceRegisterRequest,
        crate::routes::devices::DeviceCommandRequest,
        crate::routes::devices::DeviceConfigRequest,
    )),
    tags(
        (name = "sensors", description = "Aggregated sensor data"),
        (name = "charts", description = "Server-rendered charts"),
        (name = "devices", description = "Device registry and commands")
    )
)]
pub struct ApiDoc;

pub fn openapi_json() -> serde_json::Value {
    serde_json::to_value(ApiDoc::openapi()).unwrap_or_else(|err| {
        tracing::error!(error = %err, "failed to serialize openapi document");
        serde_json::json!({})
    })
}

async fn openapi_handler() -> Json<serde_json::Value> {
    Json(openapi_json())
}

pub fn router() -> Router<AppState> {
    Router::new().route("/openapi.json", get(openapi_handler))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_every_route() {
        let doc = openapi_json();
        let paths = doc["paths"].as_object().expect("paths");
        for path in [
            "/healthz",
            "/api/sensors/data",
            "/api/sensors/data/{field}",
            "/api/sensors/latest",
            "/api/sensors/status",
            "/api/sensors/summary",
            "/api/sensors/export",
            "/api/sensors/chart/{field}",
            "/api/sensors/chart/{field}/nearest",
            "/api/devices",
            "/api/devices/{device_id}",
            "/api/devices/{device_id}/commands",
            "/api/devices/{device_id}/config",
        ] {
            assert!(paths.contains_key(path), "missing {path}");
        }
    }
}
