//! Deployment smoke test: verifies every table and the daily schedule rule
//! exist, then performs one live health-check invocation against `API_URL`.
//! Exits non-zero on the first failure.

use anyhow::Context;
use aws_config::BehaviorVersion;
use tracing::info;

use customer_api::costs::DAILY_TRIGGER_RULE;
use customer_api::store::{COST_REPORTS_TABLE, CUSTOMERS_TABLE, DIRECTORY_TABLE, USERS_TABLE};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()))
        .init();

    let shared = aws_config::defaults(BehaviorVersion::latest()).load().await;
    let dynamo = aws_sdk_dynamodb::Client::new(&shared);
    let events = aws_sdk_eventbridge::Client::new(&shared);

    for table in [
        USERS_TABLE,
        CUSTOMERS_TABLE,
        DIRECTORY_TABLE,
        COST_REPORTS_TABLE,
    ] {
        let out = dynamo
            .describe_table()
            .table_name(table)
            .send()
            .await
            .with_context(|| format!("table {table} is missing or inaccessible"))?;
        let status = out.table().and_then(|t| t.table_status());
        info!(table, ?status, "table ok");
    }

    let rule = events
        .describe_rule()
        .name(DAILY_TRIGGER_RULE)
        .send()
        .await
        .context("daily schedule rule is missing")?;
    info!(
        schedule = ?rule.schedule_expression(),
        state = ?rule.state(),
        "schedule rule ok"
    );

    let api_url = std::env::var("API_URL").context("API_URL is required")?;
    let resp = reqwest::get(format!("{api_url}/api/health"))
        .await
        .context("health request failed")?;
    anyhow::ensure!(
        resp.status().is_success(),
        "health check returned {}",
        resp.status()
    );
    let body: serde_json::Value = resp.json().await.context("health body is not JSON")?;
    info!(%body, "live invocation ok");

    info!("all deployment checks passed");
    Ok(())
}
