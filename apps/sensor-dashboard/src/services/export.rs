use chrono::{DateTime, SecondsFormat, Utc};
use std::collections::BTreeMap;

use crate::field::{Field, FieldMap};
use crate::sample::SampleSeries;

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("failed to write csv: {0}")]
    Csv(#[from] csv::Error),
    #[error("failed to flush csv buffer: {0}")]
    Flush(String),
    #[error("csv output was not utf-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}

pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// One row per distinct timestamp across all fields, ascending. A field
/// without a sample at that timestamp gets an empty cell.
pub fn series_to_csv(series: &FieldMap<SampleSeries>) -> Result<String, ExportError> {
    let mut rows: BTreeMap<DateTime<Utc>, FieldMap<Option<f64>>> = BTreeMap::new();
    for (field, field_series) in series.iter() {
        for sample in field_series.samples() {
            *rows.entry(sample.timestamp).or_default().get_mut(field) = Some(sample.value);
        }
    }

    let mut writer = csv::WriterBuilder::new()
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(Vec::new());

    let mut header = vec!["timestamp"];
    header.extend(Field::ALL.iter().map(|field| field.as_str()));
    writer.write_record(&header)?;

    for (ts, values) in rows {
        let mut record = vec![format_timestamp(ts)];
        record.extend(
            Field::ALL
                .iter()
                .map(|field| values.get(*field).map(|v| v.to_string()).unwrap_or_default()),
        );
        writer.write_record(&record)?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|err| ExportError::Flush(err.to_string()))?;
    Ok(String::from_utf8(bytes)?)
}
