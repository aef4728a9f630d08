use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use aws_sdk_dynamodb::types::{AttributeValue, ReturnValue};
use aws_sdk_dynamodb::Client;
use serde_json::{Map, Number, Value};
use tracing::error;

use crate::error::ApiError;

/// Canonical table names: one snake_case namespace for every table and
/// index.
pub const USERS_TABLE: &str = "users";
pub const CUSTOMERS_TABLE: &str = "customers";
pub const DIRECTORY_TABLE: &str = "user_directory";
pub const COST_REPORTS_TABLE: &str = "cost_reports";
pub const USER_REPORTS_INDEX: &str = "user_reports";

/// A stored row, as loosely-typed JSON. Repositories convert to and from
/// their own record types at the edges.
pub type Item = Map<String, Value>;

#[async_trait]
pub trait TableStore: Send + Sync {
    /// Full-item put keyed on `key_field`; replaces any existing row.
    async fn put(&self, table: &str, key_field: &str, item: Item) -> Result<(), ApiError>;

    async fn get(&self, table: &str, key_field: &str, key: &str)
        -> Result<Option<Item>, ApiError>;

    /// Idempotent: deleting a missing row succeeds.
    async fn delete(&self, table: &str, key_field: &str, key: &str) -> Result<(), ApiError>;

    async fn scan(&self, table: &str) -> Result<Vec<Item>, ApiError>;

    /// Atomically add 1 to a numeric attribute (missing counts as 0) and
    /// return the updated item. Fails with `NotFound` if the row is absent.
    async fn increment(
        &self,
        table: &str,
        key_field: &str,
        key: &str,
        field: &str,
    ) -> Result<Item, ApiError>;

    /// Newest-first rows of one partition on a secondary index.
    async fn query_recent(
        &self,
        table: &str,
        index: &str,
        key_field: &str,
        key: &str,
        limit: i32,
    ) -> Result<Vec<Item>, ApiError>;
}

fn store_failure(
    table: &str,
    op: &str,
    err: impl std::error::Error + Send + Sync + 'static,
) -> ApiError {
    error!(table, op, error = %err, "store operation failed");
    ApiError::Storage(anyhow::Error::new(err).context(format!("{op} on {table}")))
}

// --- DynamoDB-backed store ---

#[derive(Clone)]
pub struct DynamoStore {
    client: Client,
}

impl DynamoStore {
    pub fn new(conf: &aws_config::SdkConfig) -> Self {
        Self {
            client: Client::new(conf),
        }
    }
}

#[async_trait]
impl TableStore for DynamoStore {
    async fn put(&self, table: &str, _key_field: &str, item: Item) -> Result<(), ApiError> {
        let attrs: HashMap<String, AttributeValue> = item
            .iter()
            .map(|(k, v)| (k.clone(), to_attr(v)))
            .collect();
        self.client
            .put_item()
            .table_name(table)
            .set_item(Some(attrs))
            .send()
            .await
            .map_err(|e| store_failure(table, "put_item", e))?;
        Ok(())
    }

    async fn get(
        &self,
        table: &str,
        key_field: &str,
        key: &str,
    ) -> Result<Option<Item>, ApiError> {
        let resp = self
            .client
            .get_item()
            .table_name(table)
            .key(key_field, AttributeValue::S(key.to_string()))
            .send()
            .await
            .map_err(|e| store_failure(table, "get_item", e))?;
        Ok(resp.item.map(|attrs| item_from_attrs(&attrs)))
    }

    async fn delete(&self, table: &str, key_field: &str, key: &str) -> Result<(), ApiError> {
        self.client
            .delete_item()
            .table_name(table)
            .key(key_field, AttributeValue::S(key.to_string()))
            .send()
            .await
            .map_err(|e| store_failure(table, "delete_item", e))?;
        Ok(())
    }

    async fn scan(&self, table: &str) -> Result<Vec<Item>, ApiError> {
        let mut items = Vec::new();
        let mut start_key: Option<HashMap<String, AttributeValue>> = None;
        loop {
            let resp = self
                .client
                .scan()
                .table_name(table)
                .set_exclusive_start_key(start_key.take())
                .send()
                .await
                .map_err(|e| store_failure(table, "scan", e))?;
            if let Some(page) = resp.items {
                items.extend(page.iter().map(item_from_attrs));
            }
            match resp.last_evaluated_key {
                Some(key) if !key.is_empty() => start_key = Some(key),
                _ => break,
            }
        }
        Ok(items)
    }

    async fn increment(
        &self,
        table: &str,
        key_field: &str,
        key: &str,
        field: &str,
    ) -> Result<Item, ApiError> {
        let resp = self
            .client
            .update_item()
            .table_name(table)
            .key(key_field, AttributeValue::S(key.to_string()))
            .update_expression("ADD #c :one")
            .condition_expression(format!("attribute_exists({key_field})"))
            .expression_attribute_names("#c", field)
            .expression_attribute_values(":one", AttributeValue::N("1".into()))
            .return_values(ReturnValue::AllNew)
            .send()
            .await
            .map_err(|e| {
                let svc = e.into_service_error();
                if svc.is_conditional_check_failed_exception() {
                    ApiError::NotFound
                } else {
                    store_failure(table, "update_item", svc)
                }
            })?;
        let attrs = resp.attributes.unwrap_or_default();
        Ok(item_from_attrs(&attrs))
    }

    async fn query_recent(
        &self,
        table: &str,
        index: &str,
        key_field: &str,
        key: &str,
        limit: i32,
    ) -> Result<Vec<Item>, ApiError> {
        let resp = self
            .client
            .query()
            .table_name(table)
            .index_name(index)
            .key_condition_expression("#k = :v")
            .expression_attribute_names("#k", key_field)
            .expression_attribute_values(":v", AttributeValue::S(key.to_string()))
            .scan_index_forward(false)
            .limit(limit)
            .send()
            .await
            .map_err(|e| store_failure(table, "query", e))?;
        Ok(resp
            .items
            .unwrap_or_default()
            .iter()
            .map(item_from_attrs)
            .collect())
    }
}

fn to_attr(value: &Value) -> AttributeValue {
    match value {
        Value::Null => AttributeValue::Null(true),
        Value::Bool(b) => AttributeValue::Bool(*b),
        Value::Number(n) => AttributeValue::N(n.to_string()),
        Value::String(s) => AttributeValue::S(s.clone()),
        Value::Array(xs) => AttributeValue::L(xs.iter().map(to_attr).collect()),
        Value::Object(m) => {
            AttributeValue::M(m.iter().map(|(k, v)| (k.clone(), to_attr(v))).collect())
        }
    }
}

fn from_attr(attr: &AttributeValue) -> Value {
    match attr {
        AttributeValue::Null(_) => Value::Null,
        AttributeValue::Bool(b) => Value::Bool(*b),
        AttributeValue::N(n) => {
            if let Ok(i) = n.parse::<i64>() {
                Value::Number(i.into())
            } else {
                n.parse::<f64>()
                    .ok()
                    .and_then(Number::from_f64)
                    .map(Value::Number)
                    .unwrap_or(Value::Null)
            }
        }
        AttributeValue::S(s) => Value::String(s.clone()),
        AttributeValue::L(xs) => Value::Array(xs.iter().map(from_attr).collect()),
        AttributeValue::M(m) => Value::Object(
            m.iter()
                .map(|(k, v)| (k.clone(), from_attr(v)))
                .collect(),
        ),
        other => {
            // Binary and set types never occur in our tables.
            error!(?other, "unsupported attribute type");
            Value::Null
        }
    }
}

fn item_from_attrs(attrs: &HashMap<String, AttributeValue>) -> Item {
    attrs
        .iter()
        .map(|(k, v)| (k.clone(), from_attr(v)))
        .collect()
}

// --- In-memory store, used by tests and `AppState::fake` ---

#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<HashMap<String, Vec<Item>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn key_matches(item: &Item, key_field: &str, key: &str) -> bool {
    item.get(key_field).and_then(Value::as_str) == Some(key)
}

#[async_trait]
impl TableStore for MemoryStore {
    async fn put(&self, table: &str, key_field: &str, item: Item) -> Result<(), ApiError> {
        let key = item
            .get(key_field)
            .and_then(Value::as_str)
            .ok_or_else(|| ApiError::Validation(format!("{key_field} missing on put")))?
            .to_string();
        let mut tables = self.tables.lock().unwrap();
        let rows = tables.entry(table.to_string()).or_default();
        rows.retain(|row| !key_matches(row, key_field, &key));
        rows.push(item);
        Ok(())
    }

    async fn get(
        &self,
        table: &str,
        key_field: &str,
        key: &str,
    ) -> Result<Option<Item>, ApiError> {
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .get(table)
            .and_then(|rows| rows.iter().find(|row| key_matches(row, key_field, key)))
            .cloned())
    }

    async fn delete(&self, table: &str, key_field: &str, key: &str) -> Result<(), ApiError> {
        let mut tables = self.tables.lock().unwrap();
        if let Some(rows) = tables.get_mut(table) {
            rows.retain(|row| !key_matches(row, key_field, key));
        }
        Ok(())
    }

    async fn scan(&self, table: &str) -> Result<Vec<Item>, ApiError> {
        let tables = self.tables.lock().unwrap();
        Ok(tables.get(table).cloned().unwrap_or_default())
    }

    async fn increment(
        &self,
        table: &str,
        key_field: &str,
        key: &str,
        field: &str,
    ) -> Result<Item, ApiError> {
        let mut tables = self.tables.lock().unwrap();
        let rows = tables.get_mut(table).ok_or(ApiError::NotFound)?;
        let row = rows
            .iter_mut()
            .find(|row| key_matches(row, key_field, key))
            .ok_or(ApiError::NotFound)?;
        let current = row.get(field).and_then(Value::as_i64).unwrap_or(0);
        row.insert(field.to_string(), Value::Number((current + 1).into()));
        Ok(row.clone())
    }

    async fn query_recent(
        &self,
        table: &str,
        _index: &str,
        key_field: &str,
        key: &str,
        limit: i32,
    ) -> Result<Vec<Item>, ApiError> {
        let tables = self.tables.lock().unwrap();
        let mut rows: Vec<Item> = tables
            .get(table)
            .map(|rows| {
                rows.iter()
                    .filter(|row| key_matches(row, key_field, key))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        // RFC 3339 timestamps in UTC sort lexicographically.
        rows.sort_by(|a, b| {
            let ka = a.get("created_at").and_then(Value::as_str).unwrap_or("");
            let kb = b.get("created_at").and_then(Value::as_str).unwrap_or("");
            kb.cmp(ka)
        });
        rows.truncate(limit.max(0) as usize);
        Ok(rows)
    }
}
