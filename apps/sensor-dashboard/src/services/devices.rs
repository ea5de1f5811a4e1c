use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use tokio::sync::RwLock;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DeviceRecord {
    pub id: String,
    pub name: String,
    pub status: String,
    pub last_seen: Option<DateTime<Utc>>,
    #[schema(value_type = Object)]
    pub configuration: JsonValue,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Object>)]
    pub last_command: Option<JsonValue>,
}

impl DeviceRecord {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            status: "unknown".to_string(),
            last_seen: None,
            configuration: JsonValue::Object(Default::default()),
            last_command: None,
        }
    }

    /// Shallow-merges `patch` into the configuration object.
    pub fn merge_configuration(&mut self, patch: &serde_json::Map<String, JsonValue>) {
        if !self.configuration.is_object() {
            self.configuration = JsonValue::Object(Default::default());
        }
        if let JsonValue::Object(config) = &mut self.configuration {
            for (key, value) in patch {
                config.insert(key.clone(), value.clone());
            }
        }
    }
}

/// Mutation applied to a record under the registry lock.
pub type DeviceUpdate = Box<dyn for<'r> FnOnce(&'r mut DeviceRecord) + Send>;

/// Device registry. The in-memory backing loses everything on restart; other
/// backings can be swapped in behind this trait.
#[async_trait]
pub trait DeviceStore: Send + Sync {
    async fn list(&self) -> Vec<DeviceRecord>;

    async fn get(&self, id: &str) -> Option<DeviceRecord>;

    async fn upsert(&self, record: DeviceRecord) -> DeviceRecord;

    /// Stores `record` only if its id is free; `None` when it is taken.
    async fn insert_if_absent(&self, record: DeviceRecord) -> Option<DeviceRecord>;

    async fn remove(&self, id: &str) -> Option<DeviceRecord>;

    /// Applies `apply` to an existing record under the store's lock and
    /// returns the updated record, or `None` if the id is unknown.
    async fn update(&self, id: &str, apply: DeviceUpdate) -> Option<DeviceRecord>;

    /// Applies `apply` to the record for `seed.id`, storing `seed` first if
    /// the id is unknown. The flag is true when the record was created.
    async fn update_or_insert(&self, seed: DeviceRecord, apply: DeviceUpdate) -> (DeviceRecord, bool);
}

#[derive(Default)]
pub struct InMemoryDeviceStore {
    devices: RwLock<BTreeMap<String, DeviceRecord>>,
}

impl InMemoryDeviceStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DeviceStore for InMemoryDeviceStore {
    async fn list(&self) -> Vec<DeviceRecord> {
        self.devices.read().await.values().cloned().collect()
    }

    async fn get(&self, id: &str) -> Option<DeviceRecord> {
        self.devices.read().await.get(id).cloned()
    }

    async fn upsert(&self, record: DeviceRecord) -> DeviceRecord {
        self.devices
            .write()
            .await
            .insert(record.id.clone(), record.clone());
        record
    }

    async fn insert_if_absent(&self, record: DeviceRecord) -> Option<DeviceRecord> {
        let mut devices = self.devices.write().await;
        match devices.entry(record.id.clone()) {
            Entry::Occupied(_) => None,
            Entry::Vacant(slot) => Some(slot.insert(record).clone()),
        }
    }

    async fn remove(&self, id: &str) -> Option<DeviceRecord> {
        self.devices.write().await.remove(id)
    }

    async fn update(&self, id: &str, apply: DeviceUpdate) -> Option<DeviceRecord> {
        let mut devices = self.devices.write().await;
        let record = devices.get_mut(id)?;
        apply(record);
        Some(record.clone())
    }

    async fn update_or_insert(&self, seed: DeviceRecord, apply: DeviceUpdate) -> (DeviceRecord, bool) {
        let mut devices = self.devices.write().await;
        let (record, created) = match devices.entry(seed.id.clone()) {
            Entry::Occupied(slot) => (slot.into_mut(), false),
            Entry::Vacant(slot) => (slot.insert(seed), true),
        };
        apply(record);
        (record.clone(), created)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;

    #[tokio::test]
    async fn upsert_list_and_remove() {
        let store = InMemoryDeviceStore::new();
        store.upsert(DeviceRecord::new("fan-2", "Fan 2")).await;
        store.upsert(DeviceRecord::new("fan-1", "Fan 1")).await;

        let ids: Vec<String> = store.list().await.into_iter().map(|d| d.id).collect();
        assert_eq!(ids, vec!["fan-1", "fan-2"]);

        assert!(store.remove("fan-1").await.is_some());
        assert!(store.get("fan-1").await.is_none());
        assert!(store.remove("fan-1").await.is_none());
    }

    #[tokio::test]
    async fn update_is_none_for_unknown_devices() {
        let store = InMemoryDeviceStore::new();
        let updated = store
            .update("ghost", Box::new(|record| record.status = "online".into()))
            .await;
        assert!(updated.is_none());
    }

    #[tokio::test]
    async fn concurrent_updates_are_serialized() {
        let store = Arc::new(InMemoryDeviceStore::new());
        let mut record = DeviceRecord::new("heater", "Heater");
        record.configuration = json!({"count": 0});
        store.upsert(record).await;

        let mut tasks = Vec::new();
        for _ in 0..50 {
            let store = store.clone();
            tasks.push(tokio::spawn(async move {
                store
                    .update(
                        "heater",
                        Box::new(|record| {
                            let count = record.configuration["count"].as_i64().unwrap_or(0);
                            record.configuration["count"] = json!(count + 1);
                        }),
                    )
                    .await
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }
        let record = store.get("heater").await.unwrap();
        assert_eq!(record.configuration["count"], json!(50));
    }

    #[tokio::test]
    async fn concurrent_registrations_admit_exactly_one() {
        let store = Arc::new(InMemoryDeviceStore::new());
        let mut tasks = Vec::new();
        for i in 0..20 {
            let store = store.clone();
            tasks.push(tokio::spawn(async move {
                store
                    .insert_if_absent(DeviceRecord::new("pump", format!("Pump {i}")))
                    .await
            }));
        }
        let mut winners = Vec::new();
        for task in tasks {
            if let Some(record) = task.await.unwrap() {
                winners.push(record.name);
            }
        }
        assert_eq!(winners.len(), 1);
        assert_eq!(store.get("pump").await.unwrap().name, winners[0]);
    }

    #[tokio::test]
    async fn update_or_insert_creates_once_and_then_updates() {
        let store = Arc::new(InMemoryDeviceStore::new());
        let mut tasks = Vec::new();
        for _ in 0..20 {
            let store = store.clone();
            tasks.push(tokio::spawn(async move {
                store
                    .update_or_insert(
                        DeviceRecord::new("valve", "valve"),
                        Box::new(|record| {
                            let seen = record.configuration["seen"].as_i64().unwrap_or(0);
                            record.configuration["seen"] = json!(seen + 1);
                        }),
                    )
                    .await
            }));
        }
        let mut created = 0;
        for task in tasks {
            if task.await.unwrap().1 {
                created += 1;
            }
        }
        assert_eq!(created, 1);
        assert_eq!(store.get("valve").await.unwrap().configuration["seen"], json!(20));
    }

    #[test]
    fn merge_configuration_overwrites_keys_and_keeps_others() {
        let mut record = DeviceRecord::new("fan", "Fan");
        record.configuration = json!({"speed": 1, "mode": "auto"});
        let patch = json!({"speed": 3}).as_object().cloned().unwrap();
        record.merge_configuration(&patch);
        assert_eq!(record.configuration, json!({"speed": 3, "mode": "auto"}));
    }
}
