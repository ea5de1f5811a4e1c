use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::field::{Field, FieldMap};
use crate::time::ResolvedRange;

/// One windowed observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct Sample {
    #[serde(rename = "time")]
    pub timestamp: DateTime<Utc>,
    pub value: f64,
    pub field: Field,
    #[serde(rename = "measurement")]
    pub source_measurement: String,
}

/// Samples of one field, non-decreasing by timestamp.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SampleSeries(Vec<Sample>);

impl SampleSeries {
    /// Builds a series, restoring chronological order if the source did not
    /// guarantee it. Equal timestamps keep their input order.
    pub fn new(mut samples: Vec<Sample>) -> Self {
        if !samples
            .windows(2)
            .all(|pair| pair[0].timestamp <= pair[1].timestamp)
        {
            samples.sort_by_key(|sample| sample.timestamp);
        }
        Self(samples)
    }

    pub fn empty() -> Self {
        Self(Vec::new())
    }

    pub fn samples(&self) -> &[Sample] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn last(&self) -> Option<&Sample> {
        self.0.last()
    }

    pub fn into_inner(self) -> Vec<Sample> {
        self.0
    }
}

/// Per-field series covering one requested span.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleBundle {
    pub series: FieldMap<SampleSeries>,
    pub created_at: DateTime<Utc>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// Only populated under the best-effort join policy.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub errors: BTreeMap<Field, String>,
}

impl SampleBundle {
    pub fn new(series: FieldMap<SampleSeries>, range: &ResolvedRange, created_at: DateTime<Utc>) -> Self {
        Self {
            series,
            created_at,
            start: range.start,
            end: range.end,
            errors: BTreeMap::new(),
        }
    }

    /// Every sample of every field in one chronological list.
    pub fn flatten(&self) -> Vec<Sample> {
        flatten_series(&self.series)
    }
}

pub fn flatten_series(series: &FieldMap<SampleSeries>) -> Vec<Sample> {
    let mut all: Vec<Sample> = series
        .iter()
        .flat_map(|(_, series)| series.samples().iter().cloned())
        .collect();
    all.sort_by_key(|sample| sample.timestamp);
    all
}

#[cfg(test)]
pub(crate) fn sample_at(field: Field, timestamp: DateTime<Utc>, value: f64) -> Sample {
    Sample {
        timestamp,
        value,
        field,
        source_measurement: "environment".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn t(minutes: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).single().unwrap() + Duration::minutes(minutes)
    }

    #[test]
    fn series_sorts_out_of_order_input() {
        let series = SampleSeries::new(vec![
            sample_at(Field::Temperature, t(2), 2.0),
            sample_at(Field::Temperature, t(0), 0.0),
            sample_at(Field::Temperature, t(1), 1.0),
        ]);
        let values: Vec<f64> = series.samples().iter().map(|s| s.value).collect();
        assert_eq!(values, vec![0.0, 1.0, 2.0]);
    }

    #[test]
    fn flatten_interleaves_fields_chronologically() {
        let series = FieldMap {
            temperature: SampleSeries::new(vec![
                sample_at(Field::Temperature, t(0), 20.0),
                sample_at(Field::Temperature, t(10), 21.0),
            ]),
            humidity: SampleSeries::new(vec![sample_at(Field::Humidity, t(5), 50.0)]),
            pressure: SampleSeries::empty(),
        };
        let flat = flatten_series(&series);
        let fields: Vec<Field> = flat.iter().map(|s| s.field).collect();
        assert_eq!(
            fields,
            vec![Field::Temperature, Field::Humidity, Field::Temperature]
        );
    }

    #[test]
    fn sample_serializes_with_wire_names() {
        let json = serde_json::to_value(sample_at(Field::Pressure, t(0), 1013.2)).unwrap();
        assert_eq!(json["field"], "pressure");
        assert_eq!(json["measurement"], "environment");
        assert!(json.get("time").is_some());
    }
}
