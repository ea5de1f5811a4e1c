//! Windowed range queries against the external time-series store.

pub mod memory;
pub mod timescale;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::field::Field;
use crate::sample::SampleSeries;
use crate::time::{ResolvedRange, WindowPeriod};

pub use memory::MemoryStore;
pub use timescale::TimescaleStore;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("time-series store unreachable: {0}")]
    Unreachable(String),
    #[error("time-series query timed out after {0} ms")]
    Timeout(u64),
    #[error("time-series query failed: {0}")]
    Query(String),
}

impl StoreError {
    /// Connection-class failures (unreachable or timed out).
    pub fn is_connection(&self) -> bool {
        matches!(self, StoreError::Unreachable(_) | StoreError::Timeout(_))
    }
}

/// One field over `[start, end)`, averaged per `window`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowQuery {
    pub field: Field,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub window: WindowPeriod,
}

impl WindowQuery {
    pub fn new(field: Field, range: &ResolvedRange) -> Self {
        Self {
            field,
            start: range.start,
            end: range.end,
            window: range.window,
        }
    }
}

#[async_trait]
pub trait SampleStore: Send + Sync {
    /// Windowed means of `query.field`, one sample per non-empty window,
    /// ordered by window start. Non-finite values never appear.
    async fn query_window(&self, query: &WindowQuery) -> Result<SampleSeries, StoreError>;

    /// Cheap reachability probe.
    async fn ping(&self) -> Result<(), StoreError>;
}
