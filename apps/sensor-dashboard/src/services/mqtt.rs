use anyhow::Result;
use async_trait::async_trait;
use rumqttc::{AsyncClient, Event, Incoming, MqttOptions, QoS};
use serde_json::Value as JsonValue;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("message broker is not connected")]
    NotConnected,
    #[error("mqtt client error: {0}")]
    Client(String),
    #[error("failed to encode payload: {0}")]
    Encode(#[from] serde_json::Error),
}

const RECONNECT_BACKOFF: Duration = Duration::from_secs(2);

pub type MessageHandler = Arc<dyn Fn(&str, &[u8]) + Send + Sync>;

/// Publish/subscribe seam in front of the broker. Publishing is
/// fire-and-forget: no acknowledgement correlation, no retries.
#[async_trait]
pub trait CommandDispatcher: Send + Sync {
    async fn publish_json(&self, topic: &str, payload: &JsonValue) -> Result<(), DispatchError>;

    async fn subscribe(&self, filter: &str, handler: MessageHandler) -> Result<(), DispatchError>;

    fn is_connected(&self) -> bool;
}

/// MQTT topic filter matching with `+` and `#` wildcards.
pub fn topic_matches(filter: &str, topic: &str) -> bool {
    let mut filter_levels = filter.split('/');
    let mut topic_levels = topic.split('/');
    loop {
        match (filter_levels.next(), topic_levels.next()) {
            (Some("#"), _) => return true,
            (Some("+"), Some(_)) => {}
            (Some(f), Some(t)) if f == t => {}
            (None, None) => return true,
            _ => return false,
        }
    }
}

struct Subscription {
    filter: String,
    handler: MessageHandler,
}

type Subscriptions = Arc<Mutex<Vec<Subscription>>>;

pub struct MqttDispatcher {
    client: AsyncClient,
    connected: Arc<AtomicBool>,
    subscriptions: Subscriptions,
}

impl MqttDispatcher {
    /// Creates the client and spawns its event loop. Nothing connects until the
    /// loop polls, so an absent broker never blocks startup; the loop keeps
    /// retrying until `cancel` fires.
    pub fn new(
        client_id: &str,
        host: &str,
        port: u16,
        username: Option<&str>,
        password: Option<&str>,
        cancel: CancellationToken,
    ) -> Result<(Self, JoinHandle<()>)> {
        let mut options = MqttOptions::new(client_id, host, port);
        options.set_keep_alive(Duration::from_secs(10));
        if let (Some(username), Some(password)) = (username, password) {
            options.set_credentials(username, password);
        }
        let (client, mut eventloop) = AsyncClient::new(options, 10);
        let connected = Arc::new(AtomicBool::new(false));
        let subscriptions: Subscriptions = Arc::new(Mutex::new(Vec::new()));

        let loop_client = client.clone();
        let loop_connected = connected.clone();
        let loop_subscriptions = subscriptions.clone();
        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    event = eventloop.poll() => match event {
                        Ok(Event::Incoming(Incoming::ConnAck(_))) => {
                            tracing::info!("mqtt connected");
                            loop_connected.store(true, Ordering::SeqCst);
                            for filter in subscription_filters(&loop_subscriptions) {
                                if let Err(err) = loop_client.try_subscribe(filter.as_str(), QoS::AtLeastOnce) {
                                    tracing::warn!(filter = %filter, error = %err, "mqtt resubscribe failed");
                                }
                            }
                        }
                        Ok(Event::Incoming(Incoming::Publish(publish))) => {
                            route_publish(&loop_subscriptions, publish.topic.as_str(), publish.payload.as_ref());
                        }
                        Ok(Event::Incoming(Incoming::Disconnect)) => {
                            loop_connected.store(false, Ordering::SeqCst);
                        }
                        Ok(_) => {}
                        Err(err) => {
                            if loop_connected.swap(false, Ordering::SeqCst) {
                                tracing::warn!(error = %err, "mqtt connection lost");
                            } else {
                                tracing::debug!(error = %err, "mqtt event loop error");
                            }
                            if !backoff(&cancel, RECONNECT_BACKOFF).await {
                                break;
                            }
                        }
                    }
                }
            }
        });

        Ok((
            Self {
                client,
                connected,
                subscriptions,
            },
            handle,
        ))
    }
}

/// Waits out a reconnect delay. Returns `false` if `cancel` fired first.
async fn backoff(cancel: &CancellationToken, delay: Duration) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(delay) => true,
    }
}

fn subscription_filters(subscriptions: &Subscriptions) -> Vec<String> {
    match subscriptions.lock() {
        Ok(subs) => subs.iter().map(|sub| sub.filter.clone()).collect(),
        Err(poisoned) => poisoned
            .into_inner()
            .iter()
            .map(|sub| sub.filter.clone())
            .collect(),
    }
}

fn route_publish(subscriptions: &Subscriptions, topic: &str, payload: &[u8]) {
    let handlers: Vec<MessageHandler> = match subscriptions.lock() {
        Ok(subs) => subs
            .iter()
            .filter(|sub| topic_matches(&sub.filter, topic))
            .map(|sub| sub.handler.clone())
            .collect(),
        Err(_) => return,
    };
    for handler in handlers {
        handler(topic, payload);
    }
}

#[async_trait]
impl CommandDispatcher for MqttDispatcher {
    async fn publish_json(&self, topic: &str, payload: &JsonValue) -> Result<(), DispatchError> {
        if !self.is_connected() {
            return Err(DispatchError::NotConnected);
        }
        let bytes = serde_json::to_vec(payload)?;
        self.client
            .publish(topic, QoS::AtLeastOnce, false, bytes)
            .await
            .map_err(|err| DispatchError::Client(err.to_string()))
    }

    async fn subscribe(&self, filter: &str, handler: MessageHandler) -> Result<(), DispatchError> {
        if let Ok(mut subs) = self.subscriptions.lock() {
            subs.push(Subscription {
                filter: filter.to_string(),
                handler,
            });
        }
        // Filters registered while offline are sent on the next ConnAck.
        if self.is_connected() {
            self.client
                .subscribe(filter, QoS::AtLeastOnce)
                .await
                .map_err(|err| DispatchError::Client(err.to_string()))?;
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn wildcard_filters_match_topics() {
        assert!(topic_matches("devices/+/status", "devices/fan-1/status"));
        assert!(!topic_matches("devices/+/status", "devices/fan-1/config"));
        assert!(!topic_matches("devices/+/status", "devices/fan-1/status/extra"));
        assert!(topic_matches("devices/#", "devices/fan-1/status/extra"));
        assert!(topic_matches("devices/fan-1/commands", "devices/fan-1/commands"));
        assert!(!topic_matches("devices/fan-1", "devices"));
    }

    #[test]
    fn publishes_route_only_to_matching_handlers() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let subscriptions: Subscriptions = Arc::new(Mutex::new(vec![
            Subscription {
                filter: "devices/+/status".to_string(),
                handler: Arc::new(move |_: &str, _: &[u8]| {
                    counter.fetch_add(1, Ordering::SeqCst);
                }),
            },
            Subscription {
                filter: "other/#".to_string(),
                handler: Arc::new(|_: &str, _: &[u8]| panic!("should not be routed")),
            },
        ]));

        route_publish(&subscriptions, "devices/a/status", b"{}");
        route_publish(&subscriptions, "devices/b/status", b"{}");
        assert_eq!(hits.load(Ordering::SeqCst), 2);
        assert_eq!(subscription_filters(&subscriptions).len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn backoff_ends_early_on_cancel() {
        let cancel = CancellationToken::new();
        assert!(backoff(&cancel, Duration::from_millis(50)).await);

        let started = tokio::time::Instant::now();
        let waiter = tokio::spawn({
            let cancel = cancel.clone();
            async move { backoff(&cancel, Duration::from_secs(3600)).await }
        });
        tokio::task::yield_now().await;
        cancel.cancel();
        assert!(!waiter.await.unwrap());
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn event_loop_stops_promptly_while_broker_is_down() {
        let cancel = CancellationToken::new();
        let (_dispatcher, handle) = MqttDispatcher::new(
            "sensor-dashboard-shutdown",
            "127.0.0.1",
            1,
            None,
            None,
            cancel.clone(),
        )
        .expect("dispatcher");
        // Let the first connect attempt fail so the loop is backing off.
        tokio::time::sleep(Duration::from_millis(200)).await;
        cancel.cancel();
        tokio::time::timeout(Duration::from_millis(500), handle)
            .await
            .expect("event loop should stop before the reconnect delay elapses")
            .unwrap();
    }

    #[tokio::test]
    async fn publishing_without_broker_fails_fast() {
        let cancel = CancellationToken::new();
        let (dispatcher, handle) = MqttDispatcher::new(
            "sensor-dashboard-tests",
            "127.0.0.1",
            1,
            None,
            None,
            cancel.clone(),
        )
        .expect("dispatcher");
        let err = dispatcher
            .publish_json("devices/x/commands", &serde_json::json!({"command": "on"}))
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::NotConnected));
        cancel.cancel();
        let _ = handle.await;
    }
}
