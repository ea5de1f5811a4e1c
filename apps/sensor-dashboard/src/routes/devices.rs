use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::sync::Arc;

use crate::error::{AppError, AppResult, ValidationError};
use crate::services::devices::{DeviceRecord, DeviceStore};
use crate::state::AppState;

#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
pub(crate) struct DeviceListResponse {
    success: bool,
    data: Vec<DeviceRecord>,
}

#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
pub(crate) struct DeviceResponse {
    success: bool,
    data: DeviceRecord,
}

#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
pub(crate) struct DispatchResponse {
    success: bool,
    topic: String,
    data: DeviceRecord,
}

#[derive(Debug, Clone, Deserialize, utoipa::ToSchema)]
pub(crate) struct DeviceRegisterRequest {
    id: String,
    name: Option<String>,
    #[schema(value_type = Option<Object>)]
    configuration: Option<JsonValue>,
}

#[derive(Debug, Clone, Deserialize, utoipa::ToSchema)]
pub(crate) struct DeviceCommandRequest {
    command: String,
    #[schema(value_type = Option<Object>)]
    parameters: Option<JsonValue>,
}

#[derive(Debug, Clone, Deserialize, utoipa::ToSchema)]
pub(crate) struct DeviceConfigRequest {
    #[schema(value_type = Object)]
    configuration: JsonValue,
}

fn device_not_found(id: &str) -> AppError {
    AppError::not_found(format!("Device '{id}' not found"))
}

/// Unknown devices are reported before broker state so callers can tell a
/// typo from an outage.
async fn require_dispatchable(state: &AppState, id: &str) -> AppResult<DeviceRecord> {
    let record = state
        .devices
        .get(id)
        .await
        .ok_or_else(|| device_not_found(id))?;
    if !state.dispatcher.is_connected() {
        return Err(AppError::unavailable("Message broker is not connected"));
    }
    Ok(record)
}

#[utoipa::path(
    get,
    path = "/api/devices",
    tag = "devices",
    responses((status = 200, description = "Registered devices", body = DeviceListResponse))
)]
pub(crate) async fn list_devices(
    State(devices): State<Arc<dyn DeviceStore>>,
) -> Json<DeviceListResponse> {
    Json(DeviceListResponse {
        success: true,
        data: devices.list().await,
    })
}

#[utoipa::path(
    get,
    path = "/api/devices/{device_id}",
    tag = "devices",
    params(("device_id" = String, Path, description = "Device id")),
    responses(
        (status = 200, description = "Device", body = DeviceResponse),
        (status = 404, description = "Device not found", body = crate::error::ErrorBody)
    )
)]
pub(crate) async fn get_device(
    State(devices): State<Arc<dyn DeviceStore>>,
    Path(device_id): Path<String>,
) -> AppResult<Json<DeviceResponse>> {
    let record = devices
        .get(&device_id)
        .await
        .ok_or_else(|| device_not_found(&device_id))?;
    Ok(Json(DeviceResponse {
        success: true,
        data: record,
    }))
}

#[utoipa::path(
    post,
    path = "/api/devices",
    tag = "devices",
    request_body = DeviceRegisterRequest,
    responses(
        (status = 201, description = "Registered device", body = DeviceResponse),
        (status = 400, description = "Invalid request", body = crate::error::ErrorBody),
        (status = 409, description = "Device already registered", body = crate::error::ErrorBody)
    )
)]
pub(crate) async fn register_device(
    State(devices): State<Arc<dyn DeviceStore>>,
    Json(payload): Json<DeviceRegisterRequest>,
) -> AppResult<(StatusCode, Json<DeviceResponse>)> {
    let id = payload.id.trim();
    let mut errors = ValidationError::default();
    if id.is_empty() || id.contains('/') || id.contains('+') || id.contains('#') {
        errors.push("id", "id must be non-empty and must not contain '/', '+' or '#'");
    }
    let configuration = match payload.configuration {
        None => JsonValue::Object(Default::default()),
        Some(value @ JsonValue::Object(_)) => value,
        Some(_) => {
            errors.push("configuration", "configuration must be a JSON object");
            JsonValue::Null
        }
    };
    if !errors.is_empty() {
        return Err(errors.into());
    }
    let name = payload
        .name
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .unwrap_or(id);
    let mut record = DeviceRecord::new(id, name);
    record.configuration = configuration;
    let Some(record) = devices.insert_if_absent(record).await else {
        return Err(AppError::new(
            StatusCode::CONFLICT,
            format!("Device '{id}' is already registered"),
        ));
    };
    tracing::info!(device_id = %record.id, "device registered");
    Ok((
        StatusCode::CREATED,
        Json(DeviceResponse {
            success: true,
            data: record,
        }),
    ))
}

#[utoipa::path(
    delete,
    path = "/api/devices/{device_id}",
    tag = "devices",
    params(("device_id" = String, Path, description = "Device id")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 404, description = "Device not found", body = crate::error::ErrorBody)
    )
)]
pub(crate) async fn delete_device(
    State(devices): State<Arc<dyn DeviceStore>>,
    Path(device_id): Path<String>,
) -> AppResult<StatusCode> {
    devices
        .remove(&device_id)
        .await
        .ok_or_else(|| device_not_found(&device_id))?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/api/devices/{device_id}/commands",
    tag = "devices",
    request_body = DeviceCommandRequest,
    params(("device_id" = String, Path, description = "Device id")),
    responses(
        (status = 200, description = "Command published", body = DispatchResponse),
        (status = 400, description = "Invalid request", body = crate::error::ErrorBody),
        (status = 404, description = "Device not found", body = crate::error::ErrorBody),
        (status = 503, description = "Message broker not connected", body = crate::error::ErrorBody)
    )
)]
pub(crate) async fn send_command(
    State(state): State<AppState>,
    Path(device_id): Path<String>,
    Json(payload): Json<DeviceCommandRequest>,
) -> AppResult<Json<DispatchResponse>> {
    let command = payload.command.trim();
    if command.is_empty() {
        return Err(AppError::bad_request("command", "command is required"));
    }
    require_dispatchable(&state, &device_id).await?;

    let topic = format!("devices/{device_id}/commands");
    let message = serde_json::json!({
        "command": command,
        "parameters": payload.parameters.unwrap_or(JsonValue::Null),
        "timestamp": Utc::now().to_rfc3339(),
    });
    state
        .dispatcher
        .publish_json(&topic, &message)
        .await
        .map_err(|err| AppError::from_dispatch(err, state.expose_error_details()))?;

    let recorded = message.clone();
    let record = state
        .devices
        .update(
            &device_id,
            Box::new(move |record| record.last_command = Some(recorded)),
        )
        .await
        .ok_or_else(|| device_not_found(&device_id))?;
    tracing::info!(device_id = %device_id, command, "device command published");
    Ok(Json(DispatchResponse {
        success: true,
        topic,
        data: record,
    }))
}

#[utoipa::path(
    post,
    path = "/api/devices/{device_id}/config",
    tag = "devices",
    request_body = DeviceConfigRequest,
    params(("device_id" = String, Path, description = "Device id")),
    responses(
        (status = 200, description = "Configuration published", body = DispatchResponse),
        (status = 400, description = "Invalid request", body = crate::error::ErrorBody),
        (status = 404, description = "Device not found", body = crate::error::ErrorBody),
        (status = 503, description = "Message broker not connected", body = crate::error::ErrorBody)
    )
)]
pub(crate) async fn update_config(
    State(state): State<AppState>,
    Path(device_id): Path<String>,
    Json(payload): Json<DeviceConfigRequest>,
) -> AppResult<Json<DispatchResponse>> {
    let JsonValue::Object(patch) = payload.configuration else {
        return Err(AppError::bad_request(
            "configuration",
            "configuration must be a JSON object",
        ));
    };
    require_dispatchable(&state, &device_id).await?;

    let topic = format!("devices/{device_id}/config");
    let message = serde_json::json!({
        "configuration": patch.clone(),
        "timestamp": Utc::now().to_rfc3339(),
    });
    state
        .dispatcher
        .publish_json(&topic, &message)
        .await
        .map_err(|err| AppError::from_dispatch(err, state.expose_error_details()))?;

    let record = state
        .devices
        .update(
            &device_id,
            Box::new(move |record| record.merge_configuration(&patch)),
        )
        .await
        .ok_or_else(|| device_not_found(&device_id))?;
    Ok(Json(DispatchResponse {
        success: true,
        topic,
        data: record,
    }))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/devices", get(list_devices).post(register_device))
        .route("/devices/{device_id}", get(get_device).delete(delete_device))
        .route("/devices/{device_id}/commands", post(send_command))
        .route("/devices/{device_id}/config", post(update_config))
}
