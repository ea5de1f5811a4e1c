use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;
use url::Url;

use crate::chart::DisplayWindow;
use crate::field::{Field, FieldMap};
use crate::sample::{SampleBundle, SampleSeries};

const DATA_PATH: &str = "api/sensors/data";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(12);

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("invalid dashboard url: {0}")]
    Url(#[from] url::ParseError),
    #[error("dashboard request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("dashboard returned HTTP {status}: {message}")]
    Status { status: u16, message: String },
    #[error("dashboard response could not be decoded: {0}")]
    Decode(#[from] serde_json::Error),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DataMeta {
    start_time: DateTime<Utc>,
    end_time: DateTime<Utc>,
    created_at: DateTime<Utc>,
    #[serde(default)]
    errors: BTreeMap<Field, String>,
}

#[derive(Debug, Deserialize)]
struct DataEnvelope {
    data: FieldMap<SampleSeries>,
    meta: DataMeta,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: String,
}

fn decode_bundle(body: &[u8]) -> Result<SampleBundle, ClientError> {
    let envelope: DataEnvelope = serde_json::from_slice(body)?;
    Ok(SampleBundle {
        series: envelope.data,
        created_at: envelope.meta.created_at,
        start: envelope.meta.start_time,
        end: envelope.meta.end_time,
        errors: envelope.meta.errors,
    })
}

fn error_message(body: &[u8]) -> String {
    serde_json::from_slice::<ErrorEnvelope>(body)
        .map(|envelope| envelope.error)
        .unwrap_or_else(|_| String::from_utf8_lossy(body).trim().to_string())
}

/// Fetches sample bundles from a running dashboard server.
#[derive(Debug, Clone)]
pub struct DashboardClient {
    http: reqwest::Client,
    base: Url,
}

impl DashboardClient {
    pub fn new(base_url: &str) -> Result<Self, ClientError> {
        let mut base = Url::parse(base_url)?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let http = reqwest::Client::builder()
            .user_agent(concat!("sensor-dashboard/", env!("CARGO_PKG_VERSION")))
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self { http, base })
    }

    pub fn data_url(&self, window: DisplayWindow) -> Result<Url, ClientError> {
        let mut url = self.base.join(DATA_PATH)?;
        url.query_pairs_mut()
            .append_pair("startTime", &window.start_expression())
            .append_pair("endTime", "now()")
            .append_pair("windowPeriod", &window.aggregation_window().to_string());
        Ok(url)
    }

    /// All three fields for `window`, aggregated at the window's resolution.
    pub async fn fetch_bundle(&self, window: DisplayWindow) -> Result<SampleBundle, ClientError> {
        let url = self.data_url(window)?;
        tracing::debug!(%url, "fetching sensor bundle");
        let response = self.http.get(url).send().await?;
        let status = response.status();
        let body = response.bytes().await?;
        if !status.is_success() {
            return Err(ClientError::Status {
                status: status.as_u16(),
                message: error_message(&body),
            });
        }
        decode_bundle(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::aggregator::JoinPolicy;
    use crate::test_support::harness;
    use chrono::Duration as ChronoDuration;
    use std::net::SocketAddr;

    #[test]
    fn data_url_carries_window_parameters() {
        let client = DashboardClient::new("http://dashboard.local:8080/base").unwrap();
        let url = client.data_url(DisplayWindow::SixHours).unwrap();
        assert_eq!(url.path(), "/base/api/sensors/data");
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert_eq!(
            pairs,
            vec![
                ("startTime".to_string(), "-6h".to_string()),
                ("endTime".to_string(), "now()".to_string()),
                ("windowPeriod".to_string(), "5m".to_string()),
            ]
        );
    }

    #[test]
    fn decodes_data_envelope_with_errors() {
        let body = br#"{
            "success": true,
            "data": {
                "temperature": [{"time": "2024-01-01T00:00:00Z", "value": 20.5, "field": "temperature", "measurement": "environment"}],
                "humidity": [],
                "pressure": []
            },
            "meta": {
                "startTime": "2023-12-31T23:00:00Z",
                "endTime": "2024-01-01T00:00:00Z",
                "windowPeriod": "1m",
                "createdAt": "2024-01-01T00:00:05Z",
                "errors": {"pressure": "query failed"}
            }
        }"#;
        let bundle = decode_bundle(body).unwrap();
        assert_eq!(bundle.series.temperature.len(), 1);
        assert!(bundle.series.humidity.is_empty());
        assert_eq!(bundle.errors.get(&Field::Pressure).map(String::as_str), Some("query failed"));
    }

    #[test]
    fn error_message_prefers_json_error_field() {
        assert_eq!(
            error_message(br#"{"success":false,"error":"store unreachable"}"#),
            "store unreachable"
        );
        assert_eq!(error_message(b" bad gateway \n"), "bad gateway");
    }

    #[tokio::test]
    async fn fetches_bundle_from_running_server() -> anyhow::Result<()> {
        let listener = match tokio::net::TcpListener::bind("127.0.0.1:0").await {
            Ok(listener) => listener,
            Err(err) if err.kind() == std::io::ErrorKind::PermissionDenied => return Ok(()),
            Err(err) => return Err(err.into()),
        };
        let addr: SocketAddr = listener.local_addr()?;

        let h = harness(JoinPolicy::AllOrNothing);
        let now = Utc::now();
        h.store
            .insert(Field::Temperature, now - ChronoDuration::minutes(5), 21.0)
            .await;
        let app = crate::routes::router(h.state.clone());
        let server = tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        let client = DashboardClient::new(&format!("http://{addr}"))?;
        let bundle = client.fetch_bundle(DisplayWindow::OneHour).await?;
        assert_eq!(bundle.series.temperature.len(), 1);
        assert!(bundle.series.pressure.is_empty());

        h.store.set_reachable(false);
        let err = client.fetch_bundle(DisplayWindow::OneHour).await.unwrap_err();
        assert!(matches!(err, ClientError::Status { status: 503, .. }));

        server.abort();
        Ok(())
    }
}
