use std::sync::Arc;

use aws_config::BehaviorVersion;

use crate::config::AppConfig;
use crate::costs::{CostExplorer, CostUsageApi};
use crate::store::{DynamoStore, MemoryStore, TableStore};

/// Explicitly constructed, dependency-injected clients. Nothing here is a
/// module-level singleton; everything the handlers touch arrives through
/// this state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub store: Arc<dyn TableStore>,
    pub costs: Arc<dyn CostUsageApi>,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = Arc::new(AppConfig::from_env()?);
        // Region and credentials resolve through the default provider chain.
        let shared = aws_config::defaults(BehaviorVersion::latest()).load().await;
        Ok(Self {
            config,
            store: Arc::new(DynamoStore::new(&shared)),
            costs: Arc::new(CostExplorer::new(&shared)),
        })
    }

    pub fn from_parts(
        config: Arc<AppConfig>,
        store: Arc<dyn TableStore>,
        costs: Arc<dyn CostUsageApi>,
    ) -> Self {
        Self {
            config,
            store,
            costs,
        }
    }

    /// In-memory store plus a canned cost API, for tests.
    pub fn fake() -> Self {
        use async_trait::async_trait;
        use serde_json::{json, Value};

        use crate::error::ApiError;

        struct CannedCosts;

        #[async_trait]
        impl CostUsageApi for CannedCosts {
            async fn cost_and_usage(&self, start: &str, end: &str) -> Result<Value, ApiError> {
                Ok(json!([{
                    "time_period": { "start": start, "end": end },
                    "total": { "UnblendedCost": { "amount": "0.42", "unit": "USD" } },
                    "groups": [],
                    "estimated": true
                }]))
            }
        }

        let config = Arc::new(AppConfig {
            jwt: crate::config::JwtConfig {
                secret: "test-secret".into(),
                ttl_minutes: 5,
            },
            allowed_origin: "http://app.test".into(),
            account_id: None,
        });

        Self {
            config,
            store: Arc::new(MemoryStore::new()),
            costs: Arc::new(CannedCosts),
        }
    }
}
