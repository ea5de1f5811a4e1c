use crate::chart::ChartRenderer;
use crate::config::DashboardConfig;
use crate::services::aggregator::SensorAggregator;
use crate::services::devices::DeviceStore;
use crate::services::mqtt::CommandDispatcher;
use axum::extract::FromRef;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub config: DashboardConfig,
    pub aggregator: SensorAggregator,
    pub devices: Arc<dyn DeviceStore>,
    pub dispatcher: Arc<dyn CommandDispatcher>,
    pub renderer: ChartRenderer,
}

impl AppState {
    pub fn expose_error_details(&self) -> bool {
        self.config.expose_error_details()
    }
}

impl FromRef<AppState> for Arc<dyn DeviceStore> {
    fn from_ref(state: &AppState) -> Arc<dyn DeviceStore> {
        state.devices.clone()
    }
}
