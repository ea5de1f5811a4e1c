use axum::extract::{Path, Query, State};
use axum::http::header::{CACHE_CONTROL, CONTENT_TYPE};
use axum::http::HeaderValue;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::chart::format::{format_tooltip_time, format_value};
use crate::chart::{
    nearest_sample, render_svg, window_samples, ChartInput, ChartLayout, DisplayWindow, Point,
};
use crate::error::{AppError, AppResult, ValidationError};
use crate::field::Field;
use crate::routes::sensors::parse_field;
use crate::sample::Sample;
use crate::state::AppState;
use crate::time::{ResolvedRange, WindowPeriod};

const DEFAULT_WIDTH: u32 = 800;
const DEFAULT_HEIGHT: u32 = 400;
const MIN_DIMENSION: u32 = 120;
const MAX_DIMENSION: u32 = 4096;

#[derive(Debug, Clone, Default, Deserialize, utoipa::IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub(crate) struct ChartQuery {
    /// `1h`, `6h`, `24h` (default) or `7d`.
    range: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    /// Overrides the aggregation window picked for `range`.
    window_period: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, utoipa::IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub(crate) struct NearestQuery {
    range: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    window_period: Option<String>,
    /// Pointer position in pixels.
    x: Option<f64>,
    y: Option<f64>,
}

#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
pub(crate) struct NearestHit {
    index: usize,
    sample: Sample,
    distance: f64,
    /// Value with unit and the full UTC timestamp, e.g. `21.5 °C at 2024-03-09 07:05:00 UTC`.
    tooltip: String,
}

#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
pub(crate) struct NearestResponse {
    success: bool,
    data: Option<NearestHit>,
}

struct ChartRequest {
    field: Field,
    window: DisplayWindow,
    layout: ChartLayout,
    range: ResolvedRange,
}

/// Buckets are epoch-aligned and labelled by their start, so a bucket that
/// straddles the cutoff would be dropped by the windower. Start the query at
/// the first bucket boundary at or after the cutoff instead.
fn first_full_bucket(cutoff: DateTime<Utc>, aggregation: WindowPeriod) -> DateTime<Utc> {
    let window_ms = aggregation.duration().num_milliseconds().max(1);
    let offset = cutoff.timestamp_millis().rem_euclid(window_ms);
    if offset == 0 {
        return cutoff;
    }
    cutoff
        .checked_add_signed(chrono::Duration::milliseconds(window_ms - offset))
        .unwrap_or(cutoff)
}

impl ChartRequest {
    fn parse(
        field: &str,
        range: Option<&str>,
        width: Option<u32>,
        height: Option<u32>,
        window_period: Option<&str>,
        now: DateTime<Utc>,
    ) -> AppResult<Self> {
        let field = parse_field(field)?;
        let mut errors = ValidationError::default();

        let window = match range.map(str::trim).filter(|r| !r.is_empty()) {
            Some(raw) => raw
                .parse::<DisplayWindow>()
                .map_err(|err| errors.push("range", err.to_string()))
                .unwrap_or_default(),
            None => DisplayWindow::default(),
        };
        let aggregation = match window_period.map(str::trim).filter(|w| !w.is_empty()) {
            Some(raw) => WindowPeriod::parse(raw)
                .map_err(|msg| errors.push("windowPeriod", msg))
                .unwrap_or_else(|_| window.aggregation_window()),
            None => window.aggregation_window(),
        };
        let mut dimension = |name: &str, value: Option<u32>, default: u32| {
            let value = value.unwrap_or(default);
            if !(MIN_DIMENSION..=MAX_DIMENSION).contains(&value) {
                errors.push(
                    name,
                    format!("must be between {MIN_DIMENSION} and {MAX_DIMENSION}"),
                );
            }
            value
        };
        let width = dimension("width", width, DEFAULT_WIDTH);
        let height = dimension("height", height, DEFAULT_HEIGHT);

        if !errors.is_empty() {
            return Err(errors.into());
        }
        Ok(Self {
            field,
            window,
            layout: ChartLayout::new(width, height),
            range: ResolvedRange {
                start: first_full_bucket(window.cutoff(now), aggregation),
                end: now,
                window: aggregation,
            },
        })
    }

    async fn visible_samples(&self, state: &AppState, now: DateTime<Utc>) -> AppResult<Vec<Sample>> {
        let series = state
            .aggregator
            .field_series(self.field, &self.range)
            .await
            .map_err(|err| AppError::from_store(err, state.expose_error_details()))?;
        Ok(window_samples(series.samples(), self.window, now))
    }
}

#[utoipa::path(
    get,
    path = "/api/sensors/chart/{field}",
    tag = "charts",
    params(("field" = String, Path, description = "temperature, humidity or pressure"), ChartQuery),
    responses(
        (status = 200, description = "Rendered chart", content_type = "image/svg+xml", body = String),
        (status = 400, description = "Invalid chart parameters", body = crate::error::ErrorBody),
        (status = 503, description = "Time-series store unavailable", body = crate::error::ErrorBody)
    )
)]
pub(crate) async fn render_chart(
    State(state): State<AppState>,
    Path(field): Path<String>,
    Query(query): Query<ChartQuery>,
) -> AppResult<Response> {
    let now = Utc::now();
    let request = ChartRequest::parse(
        &field,
        query.range.as_deref(),
        query.width,
        query.height,
        query.window_period.as_deref(),
        now,
    )?;
    let samples = request.visible_samples(&state, now).await?;
    let input = ChartInput::for_field(request.field, &samples, request.window);

    let svg = render_svg(request.layout.width, request.layout.height, |surface| {
        state.renderer.render(surface, &input).map(|_| ())
    })
    .map_err(|err| AppError::internal(err, state.expose_error_details()))?;

    Ok((
        [
            (CONTENT_TYPE, HeaderValue::from_static("image/svg+xml")),
            (CACHE_CONTROL, HeaderValue::from_static("no-store")),
        ],
        svg,
    )
        .into_response())
}

#[utoipa::path(
    get,
    path = "/api/sensors/chart/{field}/nearest",
    tag = "charts",
    params(("field" = String, Path, description = "temperature, humidity or pressure"), NearestQuery),
    responses(
        (status = 200, description = "Sample under the pointer, or null", body = NearestResponse),
        (status = 400, description = "Invalid chart parameters", body = crate::error::ErrorBody),
        (status = 503, description = "Time-series store unavailable", body = crate::error::ErrorBody)
    )
)]
pub(crate) async fn nearest(
    State(state): State<AppState>,
    Path(field): Path<String>,
    Query(query): Query<NearestQuery>,
) -> AppResult<Json<NearestResponse>> {
    let now = Utc::now();
    let request = ChartRequest::parse(
        &field,
        query.range.as_deref(),
        query.width,
        query.height,
        query.window_period.as_deref(),
        now,
    )?;
    let (Some(x), Some(y)) = (query.x, query.y) else {
        let mut errors = ValidationError::default();
        if query.x.is_none() {
            errors.push("x", "pointer x is required");
        }
        if query.y.is_none() {
            errors.push("y", "pointer y is required");
        }
        return Err(errors.into());
    };

    let samples = request.visible_samples(&state, now).await?;
    let data = nearest_sample(&samples, &request.layout, Point::new(x, y)).and_then(|hit| {
        samples.get(hit.index).map(|sample| NearestHit {
            index: hit.index,
            sample: sample.clone(),
            distance: hit.distance,
            tooltip: format!(
                "{} at {}",
                format_value(sample.value, request.field.unit()),
                format_tooltip_time(sample.timestamp)
            ),
        })
    });
    Ok(Json(NearestResponse {
        success: true,
        data,
    }))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/sensors/chart/{field}", get(render_chart))
        .route("/sensors/chart/{field}/nearest", get(nearest))
}
