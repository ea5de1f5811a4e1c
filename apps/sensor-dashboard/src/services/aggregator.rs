use chrono::{DateTime, Duration, Utc};
use futures::future::{join3, try_join3};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::field::{Field, FieldMap};
use crate::sample::{SampleBundle, SampleSeries};
use crate::services::summary::FieldSummary;
use crate::store::{SampleStore, StoreError, WindowQuery};
use crate::time::{ResolvedRange, WindowPeriod};

/// A reading newer than this counts as recent on the latest endpoint.
pub const RECENT_THRESHOLD_MINUTES: i64 = 10;
/// A field whose last reading is older than this is reported stale.
pub const HEALTH_THRESHOLD_MINUTES: i64 = 15;

const LATEST_LOOKBACK_MINUTES: i64 = 60;
const LATEST_WINDOW_MINUTES: i64 = 1;

/// How the per-field fan-out treats a failing field query.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JoinPolicy {
    /// Any failed field fails the whole bundle.
    #[default]
    AllOrNothing,
    /// Failed fields come back empty with an error marker.
    BestEffort,
}

impl FromStr for JoinPolicy {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "all_or_nothing" => Ok(JoinPolicy::AllOrNothing),
            "best_effort" => Ok(JoinPolicy::BestEffort),
            other => Err(format!("unknown join policy '{other}'")),
        }
    }
}

impl fmt::Display for JoinPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JoinPolicy::AllOrNothing => f.write_str("all_or_nothing"),
            JoinPolicy::BestEffort => f.write_str("best_effort"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LatestReading {
    pub value: f64,
    pub time: DateTime<Utc>,
    pub is_recent: bool,
    pub age_minutes: i64,
}

impl LatestReading {
    fn from_series(series: &SampleSeries, now: DateTime<Utc>) -> Option<Self> {
        let sample = series.last()?;
        let age = now - sample.timestamp;
        Some(Self {
            value: sample.value,
            time: sample.timestamp,
            is_recent: age <= Duration::minutes(RECENT_THRESHOLD_MINUTES),
            age_minutes: age.num_minutes(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum FieldState {
    Online,
    Stale,
    NoData,
}

#[derive(Debug, Clone, PartialEq, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct FieldHealth {
    pub status: FieldState,
    pub last_seen: Option<DateTime<Utc>>,
    pub age_minutes: Option<i64>,
}

impl FieldHealth {
    fn from_latest(latest: Option<&LatestReading>, now: DateTime<Utc>) -> Self {
        match latest {
            None => Self {
                status: FieldState::NoData,
                last_seen: None,
                age_minutes: None,
            },
            Some(reading) => {
                let fresh = now - reading.time <= Duration::minutes(HEALTH_THRESHOLD_MINUTES);
                Self {
                    status: if fresh {
                        FieldState::Online
                    } else {
                        FieldState::Stale
                    },
                    last_seen: Some(reading.time),
                    age_minutes: Some(reading.age_minutes),
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum OverallHealth {
    Healthy,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    pub store_reachable: bool,
    pub fields: FieldMap<FieldHealth>,
    pub overall: OverallHealth,
    pub checked_at: DateTime<Utc>,
}

/// Fans field queries out to the store and joins them into bundles.
#[derive(Clone)]
pub struct SensorAggregator {
    store: Arc<dyn SampleStore>,
    policy: JoinPolicy,
}

impl SensorAggregator {
    pub fn new(store: Arc<dyn SampleStore>, policy: JoinPolicy) -> Self {
        Self { store, policy }
    }

    /// Queries all three fields concurrently over `range`.
    pub async fn bundle(
        &self,
        range: &ResolvedRange,
        now: DateTime<Utc>,
    ) -> Result<SampleBundle, StoreError> {
        let queries = FieldMap::from_fn(|field| WindowQuery::new(field, range));
        let store = self.store.as_ref();

        match self.policy {
            JoinPolicy::AllOrNothing => {
                let (temperature, humidity, pressure) = try_join3(
                    store.query_window(&queries.temperature),
                    store.query_window(&queries.humidity),
                    store.query_window(&queries.pressure),
                )
                .await?;
                Ok(SampleBundle::new(
                    FieldMap {
                        temperature,
                        humidity,
                        pressure,
                    },
                    range,
                    now,
                ))
            }
            JoinPolicy::BestEffort => {
                let (temperature, humidity, pressure) = join3(
                    store.query_window(&queries.temperature),
                    store.query_window(&queries.humidity),
                    store.query_window(&queries.pressure),
                )
                .await;
                let results = FieldMap {
                    temperature,
                    humidity,
                    pressure,
                };

                let mut errors: BTreeMap<Field, StoreError> = BTreeMap::new();
                let series = results.map(|field, result| match result {
                    Ok(series) => series,
                    Err(err) => {
                        tracing::warn!(field = %field, error = %err, "field query failed; returning partial bundle");
                        errors.insert(field, err);
                        SampleSeries::empty()
                    }
                });
                // With nothing to show, a partial bundle would only hide the outage.
                if errors.len() == Field::ALL.len() {
                    if let Some(err) = errors.values().next().cloned() {
                        return Err(err);
                    }
                }

                let mut bundle = SampleBundle::new(series, range, now);
                bundle.errors = errors
                    .into_iter()
                    .map(|(field, err)| (field, err.to_string()))
                    .collect();
                Ok(bundle)
            }
        }
    }

    pub async fn field_series(
        &self,
        field: Field,
        range: &ResolvedRange,
    ) -> Result<SampleSeries, StoreError> {
        self.store.query_window(&WindowQuery::new(field, range)).await
    }

    /// Last windowed sample per field over a short trailing window.
    pub async fn latest(
        &self,
        now: DateTime<Utc>,
    ) -> Result<FieldMap<Option<LatestReading>>, StoreError> {
        let range = ResolvedRange {
            start: now - Duration::minutes(LATEST_LOOKBACK_MINUTES),
            end: now,
            window: WindowPeriod::from_duration(Duration::minutes(LATEST_WINDOW_MINUTES)),
        };
        let bundle = self.bundle(&range, now).await?;
        Ok(bundle
            .series
            .map(|_, series| LatestReading::from_series(&series, now)))
    }

    /// Health aggregate. Store failures degrade the report instead of
    /// propagating.
    pub async fn status(&self, now: DateTime<Utc>) -> StatusReport {
        let store_reachable = match self.store.ping().await {
            Ok(()) => true,
            Err(err) => {
                tracing::warn!(error = %err, "status check: store unreachable");
                false
            }
        };

        let latest = if store_reachable {
            match self.latest(now).await {
                Ok(latest) => Some(latest),
                Err(err) => {
                    tracing::warn!(error = %err, "status check: latest query failed");
                    None
                }
            }
        } else {
            None
        };

        let fields = FieldMap::from_fn(|field| {
            let reading = latest.as_ref().and_then(|latest| latest.get(field).as_ref());
            FieldHealth::from_latest(reading, now)
        });
        let all_online = fields
            .iter()
            .all(|(_, health)| health.status == FieldState::Online);
        let overall = if store_reachable && all_online {
            OverallHealth::Healthy
        } else {
            OverallHealth::Warning
        };

        StatusReport {
            store_reachable,
            fields,
            overall,
            checked_at: now,
        }
    }

    pub async fn summary(
        &self,
        range: &ResolvedRange,
        now: DateTime<Utc>,
    ) -> Result<FieldMap<FieldSummary>, StoreError> {
        let bundle = self.bundle(range, now).await?;
        Ok(bundle
            .series
            .map(|_, series| FieldSummary::from_series(&series)))
    }
}
