use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;

use super::{SampleStore, StoreError, WindowQuery};
use crate::field::{Field, FieldMap};
use crate::sample::{Sample, SampleSeries};

#[derive(Debug, Clone, Copy)]
struct RawReading {
    field: Field,
    ts: DateTime<Utc>,
    value: f64,
}

/// In-process store computing windowed means over raw readings.
///
/// Backs tests and demo mode, and stands in when no database is configured
/// (in which case it reports itself unreachable).
pub struct MemoryStore {
    measurement: String,
    readings: RwLock<Vec<RawReading>>,
    reachable: AtomicBool,
    failing: FieldMap<AtomicBool>,
}

impl MemoryStore {
    pub fn new(measurement: impl Into<String>) -> Self {
        Self {
            measurement: measurement.into(),
            readings: RwLock::new(Vec::new()),
            reachable: AtomicBool::new(true),
            failing: FieldMap::default(),
        }
    }

    pub fn unreachable(measurement: impl Into<String>) -> Self {
        let store = Self::new(measurement);
        store.set_reachable(false);
        store
    }

    /// Seven days of minute readings with a daily cycle per field.
    pub async fn seeded_demo(measurement: impl Into<String>, now: DateTime<Utc>) -> Self {
        let store = Self::new(measurement);
        let minutes = 7 * 24 * 60;
        let mut readings = Vec::with_capacity(minutes * Field::ALL.len());
        for minute in 0..minutes {
            let ts = now - Duration::minutes((minutes - minute) as i64);
            let phase = (minute as f64 / (24.0 * 60.0)) * std::f64::consts::TAU;
            for field in Field::ALL {
                let value = match field {
                    Field::Temperature => 21.0 + 3.5 * phase.sin(),
                    Field::Humidity => 48.0 - 9.0 * phase.sin(),
                    Field::Pressure => 1013.0 + 4.0 * (phase / 7.0).cos(),
                };
                readings.push(RawReading { field, ts, value });
            }
        }
        *store.readings.write().await = readings;
        store
    }

    pub async fn insert(&self, field: Field, ts: DateTime<Utc>, value: f64) {
        self.readings
            .write()
            .await
            .push(RawReading { field, ts, value });
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    /// Makes every query for `field` fail as if the store dropped the call.
    pub fn fail_field(&self, field: Field, failing: bool) {
        self.failing.get(field).store(failing, Ordering::SeqCst);
    }

    fn check_reachable(&self) -> Result<(), StoreError> {
        if self.reachable.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::Unreachable(
                "no time-series database is configured".to_string(),
            ))
        }
    }
}

fn bucket_start(ts: DateTime<Utc>, window_ms: i64) -> i64 {
    ts.timestamp_millis().div_euclid(window_ms) * window_ms
}

#[async_trait]
impl SampleStore for MemoryStore {
    async fn query_window(&self, query: &WindowQuery) -> Result<SampleSeries, StoreError> {
        self.check_reachable()?;
        if self.failing.get(query.field).load(Ordering::SeqCst) {
            return Err(StoreError::Unreachable(format!(
                "query for {} was dropped",
                query.field
            )));
        }

        let window_ms = query.window.duration().num_milliseconds().max(1);
        let mut buckets: BTreeMap<i64, (f64, u64)> = BTreeMap::new();
        for reading in self.readings.read().await.iter() {
            if reading.field != query.field
                || reading.ts < query.start
                || reading.ts >= query.end
                || !reading.value.is_finite()
            {
                continue;
            }
            let entry = buckets
                .entry(bucket_start(reading.ts, window_ms))
                .or_insert((0.0, 0));
            entry.0 += reading.value;
            entry.1 += 1;
        }

        let samples = buckets
            .into_iter()
            .filter_map(|(bucket, (sum, count))| {
                let mean = sum / count as f64;
                let timestamp = Utc.timestamp_millis_opt(bucket).single()?;
                mean.is_finite().then(|| Sample {
                    timestamp,
                    value: mean,
                    field: query.field,
                    source_measurement: self.measurement.clone(),
                })
            })
            .collect();
        Ok(SampleSeries::new(samples))
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.check_reachable()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::WindowPeriod;

    fn base() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).single().unwrap()
    }

    fn query(field: Field, minutes: i64, window: &str) -> WindowQuery {
        WindowQuery {
            field,
            start: base(),
            end: base() + Duration::minutes(minutes),
            window: WindowPeriod::parse(window).unwrap(),
        }
    }

    #[tokio::test]
    async fn averages_each_non_empty_window() {
        let store = MemoryStore::new("environment");
        store.insert(Field::Temperature, base(), 20.0).await;
        store.insert(Field::Temperature, base() + Duration::minutes(2), 22.0).await;
        // Minutes 5-9 stay empty.
        store.insert(Field::Temperature, base() + Duration::minutes(11), 30.0).await;
        store.insert(Field::Humidity, base(), 55.0).await;

        let series = store
            .query_window(&query(Field::Temperature, 15, "5m"))
            .await
            .unwrap();
        let points: Vec<(i64, f64)> = series
            .samples()
            .iter()
            .map(|s| ((s.timestamp - base()).num_minutes(), s.value))
            .collect();
        assert_eq!(points, vec![(0, 21.0), (10, 30.0)]);
        assert!(series
            .samples()
            .iter()
            .all(|s| s.field == Field::Temperature && s.source_measurement == "environment"));
    }

    #[tokio::test]
    async fn drops_non_finite_readings_and_respects_half_open_range() {
        let store = MemoryStore::new("environment");
        store.insert(Field::Pressure, base(), f64::NAN).await;
        store.insert(Field::Pressure, base() + Duration::minutes(1), f64::INFINITY).await;
        store.insert(Field::Pressure, base() + Duration::minutes(10), 1000.0).await;

        let series = store
            .query_window(&query(Field::Pressure, 10, "1m"))
            .await
            .unwrap();
        assert!(series.is_empty());
    }

    #[tokio::test]
    async fn unreachable_and_failing_fields_surface_typed_errors() {
        let store = MemoryStore::unreachable("environment");
        let err = store
            .query_window(&query(Field::Temperature, 10, "1m"))
            .await
            .unwrap_err();
        assert!(err.is_connection());
        assert!(store.ping().await.is_err());

        let store = MemoryStore::new("environment");
        store.fail_field(Field::Humidity, true);
        assert!(store
            .query_window(&query(Field::Humidity, 10, "1m"))
            .await
            .is_err());
        assert!(store
            .query_window(&query(Field::Temperature, 10, "1m"))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn demo_seed_covers_a_week_for_every_field() {
        let now = base();
        let store = MemoryStore::seeded_demo("environment", now).await;
        for field in Field::ALL {
            let series = store
                .query_window(&WindowQuery {
                    field,
                    start: now - Duration::days(7),
                    end: now,
                    window: WindowPeriod::parse("1d").unwrap(),
                })
                .await
                .unwrap();
            assert!(series.len() >= 7);
        }
    }
}
