pub mod chart;
pub mod cli;
pub mod client;
pub mod config;
pub mod db;
pub mod error;
pub mod field;
pub mod openapi;
pub mod routes;
pub mod sample;
pub mod services;
pub mod state;
pub mod static_assets;
pub mod store;
pub mod time;

#[cfg(test)]
pub mod test_support;
