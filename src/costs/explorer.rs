use async_trait::async_trait;
use aws_sdk_costexplorer::types::{DateInterval, Granularity, MetricValue, ResultByTime};
use aws_sdk_costexplorer::Client;
use serde_json::{json, Map, Value};
use tracing::error;

use super::CostUsageApi;
use crate::error::ApiError;

/// Cost Explorer client. Results are flattened to JSON so the rest of the
/// system never sees SDK types.
#[derive(Clone)]
pub struct CostExplorer {
    client: Client,
}

impl CostExplorer {
    pub fn new(conf: &aws_config::SdkConfig) -> Self {
        Self {
            client: Client::new(conf),
        }
    }
}

#[async_trait]
impl CostUsageApi for CostExplorer {
    async fn cost_and_usage(&self, start: &str, end: &str) -> Result<Value, ApiError> {
        let window = DateInterval::builder()
            .start(start)
            .end(end)
            .build()
            .map_err(|e| ApiError::Internal(e.into()))?;
        let resp = self
            .client
            .get_cost_and_usage()
            .time_period(window)
            .granularity(Granularity::Daily)
            .metrics("UnblendedCost")
            .send()
            .await
            .map_err(|e| {
                error!(start, end, error = %e, "cost explorer call failed");
                ApiError::Upstream(anyhow::Error::new(e).context("get_cost_and_usage"))
            })?;
        Ok(Value::Array(
            resp.results_by_time
                .unwrap_or_default()
                .iter()
                .map(result_to_json)
                .collect(),
        ))
    }
}

fn metric_to_json(metric: &MetricValue) -> Value {
    json!({ "amount": metric.amount(), "unit": metric.unit() })
}

fn metrics_to_json(metrics: Option<&std::collections::HashMap<String, MetricValue>>) -> Value {
    let map: Map<String, Value> = metrics
        .map(|m| {
            m.iter()
                .map(|(name, metric)| (name.clone(), metric_to_json(metric)))
                .collect()
        })
        .unwrap_or_default();
    Value::Object(map)
}

fn result_to_json(result: &ResultByTime) -> Value {
    let groups: Vec<Value> = result
        .groups()
        .iter()
        .map(|group| {
            json!({
                "keys": group.keys(),
                "metrics": metrics_to_json(group.metrics()),
            })
        })
        .collect();
    json!({
        "time_period": result
            .time_period()
            .map(|period| json!({ "start": period.start(), "end": period.end() })),
        "total": metrics_to_json(result.total()),
        "groups": groups,
        "estimated": result.estimated(),
    })
}
