//! Provisions the cost-report infrastructure: the `cost_reports` table with
//! its per-user index, and the daily schedule rule that drives collection.
//! Safe to re-run; an existing table is skipped.

use anyhow::Context;
use aws_config::BehaviorVersion;
use aws_sdk_dynamodb::types::{
    AttributeDefinition, GlobalSecondaryIndex, KeySchemaElement, KeyType, Projection,
    ProjectionType, ProvisionedThroughput, ScalarAttributeType,
};
use aws_sdk_eventbridge::types::{RuleState, Target};
use tracing::info;

use customer_api::costs::DAILY_TRIGGER_RULE;
use customer_api::store::{COST_REPORTS_TABLE, USER_REPORTS_INDEX};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()))
        .init();

    let shared = aws_config::defaults(BehaviorVersion::latest()).load().await;
    let region = shared
        .region()
        .context("AWS region is not configured")?
        .to_string();
    let account_id = std::env::var("AWS_ACCOUNT_ID").context("AWS_ACCOUNT_ID is required")?;

    let dynamo = aws_sdk_dynamodb::Client::new(&shared);
    let events = aws_sdk_eventbridge::Client::new(&shared);

    create_cost_reports_table(&dynamo).await?;
    create_daily_trigger(&events, &region, &account_id).await?;

    info!("setup completed");
    Ok(())
}

async fn create_cost_reports_table(dynamo: &aws_sdk_dynamodb::Client) -> anyhow::Result<()> {
    let throughput = || {
        ProvisionedThroughput::builder()
            .read_capacity_units(5)
            .write_capacity_units(5)
            .build()
    };
    let attr = |name: &str| {
        AttributeDefinition::builder()
            .attribute_name(name)
            .attribute_type(ScalarAttributeType::S)
            .build()
    };
    let key = |name: &str, kind: KeyType| {
        KeySchemaElement::builder()
            .attribute_name(name)
            .key_type(kind)
            .build()
    };

    // The per-user query path needs the GSI; provisioning it here keeps the
    // table and its index in one step.
    let result = dynamo
        .create_table()
        .table_name(COST_REPORTS_TABLE)
        .attribute_definitions(attr("id")?)
        .attribute_definitions(attr("user_id")?)
        .attribute_definitions(attr("created_at")?)
        .key_schema(key("id", KeyType::Hash)?)
        .provisioned_throughput(throughput()?)
        .global_secondary_indexes(
            GlobalSecondaryIndex::builder()
                .index_name(USER_REPORTS_INDEX)
                .key_schema(key("user_id", KeyType::Hash)?)
                .key_schema(key("created_at", KeyType::Range)?)
                .projection(
                    Projection::builder()
                        .projection_type(ProjectionType::All)
                        .build(),
                )
                .provisioned_throughput(throughput()?)
                .build()?,
        )
        .send()
        .await;

    match result {
        Ok(_) => {
            info!(table = COST_REPORTS_TABLE, "table created");
            Ok(())
        }
        Err(e) => {
            let svc = e.into_service_error();
            if svc.is_resource_in_use_exception() {
                info!(table = COST_REPORTS_TABLE, "table already exists, skipping");
                Ok(())
            } else {
                Err(anyhow::Error::new(svc).context("create cost_reports table"))
            }
        }
    }
}

async fn create_daily_trigger(
    events: &aws_sdk_eventbridge::Client,
    region: &str,
    account_id: &str,
) -> anyhow::Result<()> {
    events
        .put_rule()
        .name(DAILY_TRIGGER_RULE)
        .schedule_expression("cron(0 2 * * ? *)") // 02:00 UTC daily
        .state(RuleState::Enabled)
        .description("Triggers the daily cost report collection")
        .send()
        .await
        .context("put schedule rule")?;

    events
        .put_targets()
        .rule(DAILY_TRIGGER_RULE)
        .targets(
            Target::builder()
                .id("cost-report-collector")
                .arn(format!(
                    "arn:aws:lambda:{region}:{account_id}:function:customer-api"
                ))
                .build()?,
        )
        .send()
        .await
        .context("attach rule target")?;

    info!(rule = DAILY_TRIGGER_RULE, "daily trigger created");
    Ok(())
}
