use crate::chart::ChartRenderer;
use crate::config::DashboardConfig;
use crate::services::aggregator::{JoinPolicy, SensorAggregator};
use crate::services::devices::InMemoryDeviceStore;
use crate::services::mqtt::{topic_matches, CommandDispatcher, DispatchError, MessageHandler};
use crate::state::AppState;
use crate::store::MemoryStore;
use async_trait::async_trait;
use serde_json::Value as JsonValue;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// In-process dispatcher that records publishes and lets tests inject
/// incoming messages.
#[derive(Default)]
pub struct RecordingDispatcher {
    connected: AtomicBool,
    published: Mutex<Vec<(String, JsonValue)>>,
    subscriptions: Mutex<Vec<(String, MessageHandler)>>,
}

impl RecordingDispatcher {
    pub fn connected() -> Self {
        let dispatcher = Self::default();
        dispatcher.set_connected(true);
        dispatcher
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    pub fn published(&self) -> Vec<(String, JsonValue)> {
        self.published.lock().unwrap().clone()
    }

    pub fn deliver(&self, topic: &str, payload: &[u8]) {
        let handlers: Vec<MessageHandler> = self
            .subscriptions
            .lock()
            .unwrap()
            .iter()
            .filter(|(filter, _)| topic_matches(filter, topic))
            .map(|(_, handler)| handler.clone())
            .collect();
        for handler in handlers {
            handler(topic, payload);
        }
    }
}

#[async_trait]
impl CommandDispatcher for RecordingDispatcher {
    async fn publish_json(&self, topic: &str, payload: &JsonValue) -> Result<(), DispatchError> {
        if !self.is_connected() {
            return Err(DispatchError::NotConnected);
        }
        self.published
            .lock()
            .unwrap()
            .push((topic.to_string(), payload.clone()));
        Ok(())
    }

    async fn subscribe(&self, filter: &str, handler: MessageHandler) -> Result<(), DispatchError> {
        self.subscriptions
            .lock()
            .unwrap()
            .push((filter.to_string(), handler));
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

pub fn test_config() -> DashboardConfig {
    DashboardConfig {
        mqtt_client_id: "sensor-dashboard-tests".to_string(),
        ..DashboardConfig::default()
    }
}

pub struct TestHarness {
    pub state: AppState,
    pub store: Arc<MemoryStore>,
    pub devices: Arc<InMemoryDeviceStore>,
    pub dispatcher: Arc<RecordingDispatcher>,
}

pub fn harness(policy: JoinPolicy) -> TestHarness {
    let store = Arc::new(MemoryStore::new("environment"));
    let devices = Arc::new(InMemoryDeviceStore::new());
    let dispatcher = Arc::new(RecordingDispatcher::connected());
    let state = AppState {
        config: test_config(),
        aggregator: SensorAggregator::new(store.clone(), policy),
        devices: devices.clone(),
        dispatcher: dispatcher.clone(),
        renderer: ChartRenderer::default(),
    };
    TestHarness {
        state,
        store,
        devices,
        dispatcher,
    }
}

pub fn test_state() -> AppState {
    harness(JoinPolicy::AllOrNothing).state
}
