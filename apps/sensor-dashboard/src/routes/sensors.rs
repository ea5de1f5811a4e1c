use axum::extract::{Path, Query, State};
use axum::http::header::{CACHE_CONTROL, CONTENT_DISPOSITION, CONTENT_TYPE};
use axum::http::HeaderValue;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{AppError, AppResult};
use crate::field::{Field, FieldMap};
use crate::sample::{Sample, SampleBundle, SampleSeries};
use crate::services::aggregator::{LatestReading, StatusReport};
use crate::services::export::{format_timestamp, series_to_csv};
use crate::services::summary::FieldSummary;
use crate::state::AppState;
use crate::time::{RangeSpec, ResolvedRange, NOW_LITERAL};

pub(crate) const DATA_DEFAULTS: (&str, &str, &str) = ("-1h", NOW_LITERAL, "1m");
pub(crate) const SUMMARY_DEFAULTS: (&str, &str, &str) = ("-24h", NOW_LITERAL, "5m");
pub(crate) const EXPORT_DEFAULTS: (&str, &str, &str) = ("-24h", NOW_LITERAL, "1m");

#[derive(Debug, Clone, Default, Deserialize, utoipa::IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub(crate) struct RangeQuery {
    /// Relative (`-2h`), `now()` or RFC 3339.
    start_time: Option<String>,
    end_time: Option<String>,
    /// Aggregation window, e.g. `5m`.
    window_period: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, utoipa::IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub(crate) struct ExportQuery {
    /// Only `csv` is supported.
    format: Option<String>,
    start_time: Option<String>,
    end_time: Option<String>,
    window_period: Option<String>,
}

#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RangeMeta {
    start_time: DateTime<Utc>,
    end_time: DateTime<Utc>,
    window_period: String,
    created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    #[schema(value_type = Object)]
    errors: BTreeMap<Field, String>,
}

impl RangeMeta {
    fn from_bundle(bundle: &SampleBundle, range: &ResolvedRange) -> Self {
        Self {
            start_time: bundle.start,
            end_time: bundle.end,
            window_period: range.window.to_string(),
            created_at: bundle.created_at,
            errors: bundle.errors.clone(),
        }
    }

    fn from_range(range: &ResolvedRange, created_at: DateTime<Utc>) -> Self {
        Self {
            start_time: range.start,
            end_time: range.end,
            window_period: range.window.to_string(),
            created_at,
            errors: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
pub(crate) struct SensorDataResponse {
    success: bool,
    /// Field-keyed arrays of `{time, value, field, measurement}`.
    #[schema(value_type = Object)]
    data: FieldMap<SampleSeries>,
    meta: RangeMeta,
}

#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
pub(crate) struct FieldDataResponse {
    success: bool,
    data: Vec<Sample>,
    meta: RangeMeta,
}

#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
pub(crate) struct LatestResponse {
    success: bool,
    #[schema(value_type = Object)]
    data: FieldMap<Option<LatestReading>>,
}

#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
pub(crate) struct StatusResponse {
    success: bool,
    #[schema(value_type = Object)]
    data: StatusReport,
}

#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
pub(crate) struct SummaryResponse {
    success: bool,
    #[schema(value_type = Object)]
    data: FieldMap<FieldSummary>,
    meta: RangeMeta,
}

pub(crate) fn resolve_range(
    start: Option<&str>,
    end: Option<&str>,
    window: Option<&str>,
    defaults: (&str, &str, &str),
    now: DateTime<Utc>,
) -> AppResult<ResolvedRange> {
    let spec = RangeSpec::from_params(start, end, window, defaults)?;
    Ok(spec.resolve(now)?)
}

pub(crate) fn parse_field(raw: &str) -> AppResult<Field> {
    raw.parse::<Field>()
        .map_err(|err| AppError::bad_request("field", err.to_string()))
}

impl RangeQuery {
    fn resolve(&self, defaults: (&str, &str, &str), now: DateTime<Utc>) -> AppResult<ResolvedRange> {
        resolve_range(
            self.start_time.as_deref(),
            self.end_time.as_deref(),
            self.window_period.as_deref(),
            defaults,
            now,
        )
    }
}

#[utoipa::path(
    get,
    path = "/api/sensors/data",
    tag = "sensors",
    params(RangeQuery),
    responses(
        (status = 200, description = "Windowed means for every field", body = SensorDataResponse),
        (status = 400, description = "Invalid time range", body = crate::error::ErrorBody),
        (status = 503, description = "Time-series store unavailable", body = crate::error::ErrorBody)
    )
)]
pub(crate) async fn get_sensor_data(
    State(state): State<AppState>,
    Query(query): Query<RangeQuery>,
) -> AppResult<Json<SensorDataResponse>> {
    let now = Utc::now();
    let range = query.resolve(DATA_DEFAULTS, now)?;
    let bundle = state
        .aggregator
        .bundle(&range, now)
        .await
        .map_err(|err| AppError::from_store(err, state.expose_error_details()))?;
    let meta = RangeMeta::from_bundle(&bundle, &range);
    Ok(Json(SensorDataResponse {
        success: true,
        data: bundle.series,
        meta,
    }))
}

#[utoipa::path(
    get,
    path = "/api/sensors/data/{field}",
    tag = "sensors",
    params(("field" = String, Path, description = "temperature, humidity or pressure"), RangeQuery),
    responses(
        (status = 200, description = "Windowed means for one field", body = FieldDataResponse),
        (status = 400, description = "Unknown field or invalid time range", body = crate::error::ErrorBody),
        (status = 503, description = "Time-series store unavailable", body = crate::error::ErrorBody)
    )
)]
pub(crate) async fn get_field_data(
    State(state): State<AppState>,
    Path(field): Path<String>,
    Query(query): Query<RangeQuery>,
) -> AppResult<Json<FieldDataResponse>> {
    let field = parse_field(&field)?;
    let now = Utc::now();
    let range = query.resolve(DATA_DEFAULTS, now)?;
    let series = state
        .aggregator
        .field_series(field, &range)
        .await
        .map_err(|err| AppError::from_store(err, state.expose_error_details()))?;
    Ok(Json(FieldDataResponse {
        success: true,
        data: series.into_inner(),
        meta: RangeMeta::from_range(&range, now),
    }))
}

#[utoipa::path(
    get,
    path = "/api/sensors/latest",
    tag = "sensors",
    responses(
        (status = 200, description = "Most recent reading per field", body = LatestResponse),
        (status = 503, description = "Time-series store unavailable", body = crate::error::ErrorBody)
    )
)]
pub(crate) async fn get_latest(State(state): State<AppState>) -> AppResult<Json<LatestResponse>> {
    let latest = state
        .aggregator
        .latest(Utc::now())
        .await
        .map_err(|err| AppError::from_store(err, state.expose_error_details()))?;
    Ok(Json(LatestResponse {
        success: true,
        data: latest,
    }))
}

#[utoipa::path(
    get,
    path = "/api/sensors/status",
    tag = "sensors",
    responses((status = 200, description = "Store reachability and per-field freshness", body = StatusResponse))
)]
pub(crate) async fn get_status(State(state): State<AppState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        success: true,
        data: state.aggregator.status(Utc::now()).await,
    })
}

#[utoipa::path(
    get,
    path = "/api/sensors/summary",
    tag = "sensors",
    params(RangeQuery),
    responses(
        (status = 200, description = "Per-field statistics", body = SummaryResponse),
        (status = 400, description = "Invalid time range", body = crate::error::ErrorBody),
        (status = 503, description = "Time-series store unavailable", body = crate::error::ErrorBody)
    )
)]
pub(crate) async fn get_summary(
    State(state): State<AppState>,
    Query(query): Query<RangeQuery>,
) -> AppResult<Json<SummaryResponse>> {
    let now = Utc::now();
    let range = query.resolve(SUMMARY_DEFAULTS, now)?;
    let summary = state
        .aggregator
        .summary(&range, now)
        .await
        .map_err(|err| AppError::from_store(err, state.expose_error_details()))?;
    Ok(Json(SummaryResponse {
        success: true,
        data: summary,
        meta: RangeMeta::from_range(&range, now),
    }))
}

#[utoipa::path(
    get,
    path = "/api/sensors/export",
    tag = "sensors",
    params(ExportQuery),
    responses(
        (status = 200, description = "CSV attachment", content_type = "text/csv", body = String),
        (status = 400, description = "Unsupported format or invalid time range", body = crate::error::ErrorBody),
        (status = 503, description = "Time-series store unavailable", body = crate::error::ErrorBody)
    )
)]
pub(crate) async fn export_data(
    State(state): State<AppState>,
    Query(query): Query<ExportQuery>,
) -> AppResult<Response> {
    let format = query
        .format
        .as_deref()
        .map(str::trim)
        .filter(|f| !f.is_empty())
        .unwrap_or("csv");
    if !format.eq_ignore_ascii_case("csv") {
        return Err(AppError::bad_request(
            "format",
            format!("unsupported export format '{format}' (only csv is supported)"),
        ));
    }

    let now = Utc::now();
    let range = resolve_range(
        query.start_time.as_deref(),
        query.end_time.as_deref(),
        query.window_period.as_deref(),
        EXPORT_DEFAULTS,
        now,
    )?;
    let expose = state.expose_error_details();
    let bundle = state
        .aggregator
        .bundle(&range, now)
        .await
        .map_err(|err| AppError::from_store(err, expose))?;
    let csv = series_to_csv(&bundle.series).map_err(|err| AppError::internal(err, expose))?;

    let filename = format!(
        "attachment; filename=\"sensor-data-{}.csv\"",
        format_timestamp(now).replace(':', "-")
    );
    let disposition =
        HeaderValue::from_str(&filename).map_err(|err| AppError::internal(err, expose))?;
    Ok((
        [
            (CONTENT_TYPE, HeaderValue::from_static("text/csv; charset=utf-8")),
            (CONTENT_DISPOSITION, disposition),
            (CACHE_CONTROL, HeaderValue::from_static("no-store")),
        ],
        csv,
    )
        .into_response())
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/sensors/data", get(get_sensor_data))
        .route("/sensors/data/{field}", get(get_field_data))
        .route("/sensors/latest", get(get_latest))
        .route("/sensors/status", get(get_status))
        .route("/sensors/summary", get(get_summary))
        .route("/sensors/export", get(export_data))
}
