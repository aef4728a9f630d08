use async_trait::async_trait;
use serde_json::Value;

use crate::error::ApiError;

mod collector;
mod explorer;

pub use collector::{CostCollector, CostReport, SYSTEM_USER};
pub use explorer::CostExplorer;

/// Schedule rule that invokes the collection route once a day.
pub const DAILY_TRIGGER_RULE: &str = "daily-cost-report";

/// External cost-analysis API: daily unblended cost buckets for a date
/// window, returned as opaque JSON that is persisted verbatim.
#[async_trait]
pub trait CostUsageApi: Send + Sync {
    async fn cost_and_usage(&self, start: &str, end: &str) -> Result<Value, ApiError>;
}
