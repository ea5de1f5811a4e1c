use chrono::Utc;
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::services::devices::{DeviceRecord, DeviceStore};
use crate::services::mqtt::{CommandDispatcher, DispatchError, MessageHandler};

pub const STATUS_TOPIC_FILTER: &str = "devices/+/status";

#[derive(Debug, Clone, Deserialize)]
struct StatusPayload {
    status: String,
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
struct StatusUpdate {
    device_id: String,
    status: String,
    name: Option<String>,
}

fn device_id_from_topic(topic: &str) -> Option<&str> {
    let mut parts = topic.split('/');
    match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some("devices"), Some(id), Some("status"), None) if !id.trim().is_empty() => Some(id),
        _ => None,
    }
}

fn parse_update(topic: &str, payload: &[u8]) -> Option<StatusUpdate> {
    let device_id = device_id_from_topic(topic)?;
    let parsed: StatusPayload = match serde_json::from_slice(payload) {
        Ok(value) => value,
        Err(err) => {
            tracing::debug!(topic, "device status ingest: invalid json payload: {err}");
            return None;
        }
    };
    let status = parsed.status.trim();
    if status.is_empty() {
        return None;
    }
    Some(StatusUpdate {
        device_id: device_id.to_string(),
        status: status.to_string(),
        name: parsed
            .name
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty()),
    })
}

/// Keeps the registry's `status`/`lastSeen` current from device status
/// messages, registering devices it has not seen before.
pub struct DeviceStatusIngestService {
    dispatcher: Arc<dyn CommandDispatcher>,
    devices: Arc<dyn DeviceStore>,
}

impl DeviceStatusIngestService {
    pub fn new(dispatcher: Arc<dyn CommandDispatcher>, devices: Arc<dyn DeviceStore>) -> Self {
        Self {
            dispatcher,
            devices,
        }
    }

    pub async fn start(self, cancel: CancellationToken) -> Result<(), DispatchError> {
        let (tx, mut rx) = mpsc::unbounded_channel::<StatusUpdate>();
        let handler: MessageHandler = Arc::new(move |topic: &str, payload: &[u8]| {
            if let Some(update) = parse_update(topic, payload) {
                let _ = tx.send(update);
            }
        });
        self.dispatcher
            .subscribe(STATUS_TOPIC_FILTER, handler)
            .await?;

        let devices = self.devices;
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    update = rx.recv() => match update {
                        Some(update) => apply_update(devices.as_ref(), update).await,
                        None => break,
                    }
                }
            }
        });
        Ok(())
    }
}

async fn apply_update(devices: &dyn DeviceStore, update: StatusUpdate) {
    let now = Utc::now();
    let seed = DeviceRecord::new(
        update.device_id.clone(),
        update.name.clone().unwrap_or_else(|| update.device_id.clone()),
    );
    let StatusUpdate { status, name, .. } = update;
    let (record, created) = devices
        .update_or_insert(
            seed,
            Box::new(move |record| {
                record.status = status;
                record.last_seen = Some(now);
                if let Some(name) = name {
                    record.name = name;
                }
            }),
        )
        .await;
    if created {
        tracing::info!(device_id = %record.id, "registered device from status message");
    }
}
