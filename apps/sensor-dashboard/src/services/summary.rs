use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::sample::SampleSeries;

/// Descriptive statistics of one field over a range.
#[derive(Debug, Clone, PartialEq, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct FieldSummary {
    pub count: usize,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub avg: Option<f64>,
    pub median: Option<f64>,
    pub latest: Option<f64>,
    pub latest_time: Option<DateTime<Utc>>,
}

impl FieldSummary {
    pub fn from_series(series: &SampleSeries) -> Self {
        let mut values: Vec<f64> = series.samples().iter().map(|s| s.value).collect();
        let count = values.len();
        if count == 0 {
            return Self {
                count,
                min: None,
                max: None,
                avg: None,
                median: None,
                latest: None,
                latest_time: None,
            };
        }

        let latest = series.last().map(|s| (s.value, s.timestamp));
        let sum: f64 = values.iter().sum();
        values.sort_by(f64::total_cmp);
        let mid = count / 2;
        let median = if count % 2 == 0 {
            (values[mid - 1] + values[mid]) / 2.0
        } else {
            values[mid]
        };

        Self {
            count,
            min: values.first().copied(),
            max: values.last().copied(),
            avg: Some(sum / count as f64),
            median: Some(median),
            latest: latest.map(|(value, _)| value),
            latest_time: latest.map(|(_, ts)| ts),
        }
    }
}
