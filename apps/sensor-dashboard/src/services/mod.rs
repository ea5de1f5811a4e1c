pub mod aggregator;
pub mod device_status_ingest;
pub mod devices;
pub mod export;
pub mod mqtt;
pub mod summary;
