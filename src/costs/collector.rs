use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{Duration, OffsetDateTime};
use tracing::{error, info};

use super::CostUsageApi;
use crate::error::ApiError;
use crate::store::{Item, TableStore, COST_REPORTS_TABLE, USER_REPORTS_INDEX};

/// Owning user recorded when a collection run has no user attached.
pub const SYSTEM_USER: &str = "system";

const DATE: &[time::format_description::FormatItem<'static>] =
    format_description!("[year]-[month]-[day]");

/// One persisted snapshot of the external cost API. A new row is written on
/// every collection run; same-day runs produce separate rows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CostReport {
    pub id: String,
    pub user_id: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    pub start_date: String,
    pub end_date: String,
    pub cost_data: Value,
}

#[derive(Clone)]
pub struct CostCollector {
    store: Arc<dyn TableStore>,
    api: Arc<dyn CostUsageApi>,
}

impl CostCollector {
    pub fn new(store: Arc<dyn TableStore>, api: Arc<dyn CostUsageApi>) -> Self {
        Self { store, api }
    }

    /// Fetch the trailing 7-day window from the cost API, persist a snapshot,
    /// and return either the fresh payload (no user) or the most recent
    /// stored reports for the user, newest first, capped at 7.
    ///
    /// The just-written row is fetched back through a secondary index, so it
    /// may lag out of the user's result set; that is the store's consistency
    /// model, not a guarantee this method adds.
    pub async fn collect(&self, user_id: Option<&str>) -> Result<Value, ApiError> {
        let now = OffsetDateTime::now_utc();
        let (start, end) = trailing_week(now);
        let cost_data = self.api.cost_and_usage(&start, &end).await?;

        let created_at = now
            .format(&Rfc3339)
            .map_err(|e| ApiError::Internal(e.into()))?;
        let report = CostReport {
            id: format!("cost_{created_at}"),
            user_id: user_id.unwrap_or(SYSTEM_USER).to_string(),
            created_at: now,
            start_date: start,
            end_date: end,
            cost_data: cost_data.clone(),
        };
        self.store
            .put(COST_REPORTS_TABLE, "id", encode(&report)?)
            .await
            .map_err(|e| {
                error!(report_id = %report.id, error = %e, "cannot save cost report");
                e
            })?;
        info!(report_id = %report.id, user_id = %report.user_id, "cost report saved");

        match user_id {
            Some(uid) => {
                let rows = self
                    .store
                    .query_recent(COST_REPORTS_TABLE, USER_REPORTS_INDEX, "user_id", uid, 7)
                    .await?;
                Ok(Value::Array(rows.into_iter().map(Value::Object).collect()))
            }
            None => Ok(cost_data),
        }
    }
}

fn trailing_week(now: OffsetDateTime) -> (String, String) {
    let end = now.date();
    let start = (now - Duration::days(7)).date();
    // The format cannot fail for a calendar date.
    (
        start.format(&DATE).unwrap_or_default(),
        end.format(&DATE).unwrap_or_default(),
    )
}

fn encode(report: &CostReport) -> Result<Item, ApiError> {
    match serde_json::to_value(report) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(ApiError::Internal(anyhow::anyhow!(
            "cost report did not serialize to an object"
        ))),
        Err(e) => Err(ApiError::Internal(e.into())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use async_trait::async_trait;
    use serde_json::json;

    struct FakeCostApi;

    #[async_trait]
    impl CostUsageApi for FakeCostApi {
        async fn cost_and_usage(&self, start: &str, end: &str) -> Result<Value, ApiError> {
            Ok(json!([{
                "time_period": { "start": start, "end": end },
                "total": { "UnblendedCost": { "amount": "1.23", "unit": "USD" } }
            }]))
        }
    }

    fn collector() -> (Arc<MemoryStore>, CostCollector) {
        let store = Arc::new(MemoryStore::new());
        let collector = CostCollector::new(store.clone(), Arc::new(FakeCostApi));
        (store, collector)
    }

    #[tokio::test]
    async fn without_a_user_returns_the_fresh_window_and_persists_as_system() {
        let (store, collector) = collector();
        let data = collector.collect(None).await.unwrap();
        assert!(data.is_array());

        let rows = store.scan(COST_REPORTS_TABLE).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["user_id"], json!(SYSTEM_USER));
        assert!(rows[0]["id"].as_str().unwrap().starts_with("cost_"));
    }

    #[tokio::test]
    async fn with_a_user_returns_at_most_seven_newest_reports() {
        let (store, collector) = collector();
        // Pre-seed nine older reports for the user.
        for day in 10..19 {
            let report = json!({
                "id": format!("cost_2025-01-{day}T00:00:00Z"),
                "user_id": "u1",
                "created_at": format!("2025-01-{day}T00:00:00Z"),
                "start_date": "2025-01-01",
                "end_date": "2025-01-08",
                "cost_data": []
            });
            store
                .put(COST_REPORTS_TABLE, "id", report.as_object().unwrap().clone())
                .await
                .unwrap();
        }

        let data = collector.collect(Some("u1")).await.unwrap();
        let rows = data.as_array().unwrap();
        assert_eq!(rows.len(), 7);
        // Newest first: the row written by this very run leads.
        assert!(rows[0]["created_at"].as_str().unwrap() > "2025-01-18T00:00:00Z");
    }

    #[tokio::test]
    async fn every_run_writes_a_new_row() {
        let (store, collector) = collector();
        collector.collect(None).await.unwrap();
        collector.collect(Some("u2")).await.unwrap();
        let rows = store.scan(COST_REPORTS_TABLE).await.unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn trailing_week_is_seven_days_of_date_strings() {
        let now = time::macros::datetime!(2025-03-10 12:00 UTC);
        let (start, end) = trailing_week(now);
        assert_eq!(start, "2025-03-03");
        assert_eq!(end, "2025-03-10");
    }
}
