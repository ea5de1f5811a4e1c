use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::future::Future;
use std::time::Duration;

use super::{SampleStore, StoreError, WindowQuery};
use crate::sample::{Sample, SampleSeries};

/// TimescaleDB-backed store. Raw readings live in a hypertable shaped
/// `(ts timestamptz, measurement text, field text, value double precision)`.
pub struct TimescaleStore {
    pool: PgPool,
    measurement: String,
    timeout: Duration,
}

#[derive(sqlx::FromRow)]
struct BucketRow {
    bucket: DateTime<Utc>,
    avg_value: Option<f64>,
    samples: i64,
}

impl TimescaleStore {
    pub fn new(pool: PgPool, measurement: impl Into<String>, timeout: Duration) -> Self {
        Self {
            pool,
            measurement: measurement.into(),
            timeout,
        }
    }

    async fn bounded<T, F>(&self, fut: F) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, sqlx::Error>>,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result.map_err(map_sqlx_error),
            Err(_) => Err(StoreError::Timeout(self.timeout.as_millis() as u64)),
        }
    }
}

fn map_sqlx_error(err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed => StoreError::Unreachable(err.to_string()),
        other => StoreError::Query(other.to_string()),
    }
}

#[async_trait]
impl SampleStore for TimescaleStore {
    async fn query_window(&self, query: &WindowQuery) -> Result<SampleSeries, StoreError> {
        let rows: Vec<BucketRow> = self
            .bounded(
                sqlx::query_as(
                    r#"
                    SELECT
                      time_bucket(make_interval(secs => $1), ts) AS bucket,
                      avg(value) AS avg_value,
                      count(*) AS samples
                    FROM sensor_readings
                    WHERE measurement = $2
                      AND field = $3
                      AND ts >= $4
                      AND ts < $5
                      AND value NOT IN ('NaN'::float8, 'Infinity'::float8, '-Infinity'::float8)
                    GROUP BY bucket
                    ORDER BY bucket ASC
                    "#,
                )
                .bind(query.window.seconds())
                .bind(&self.measurement)
                .bind(query.field.as_str())
                .bind(query.start)
                .bind(query.end)
                .fetch_all(&self.pool),
            )
            .await?;

        let samples = rows
            .into_iter()
            .filter(|row| row.samples > 0)
            .filter_map(|row| {
                let value = row.avg_value.filter(|v| v.is_finite())?;
                Some(Sample {
                    timestamp: row.bucket,
                    value,
                    field: query.field,
                    source_measurement: self.measurement.clone(),
                })
            })
            .collect();

        Ok(SampleSeries::new(samples))
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.bounded(sqlx::query("SELECT 1").execute(&self.pool))
            .await
            .map(|_| ())
    }
}
