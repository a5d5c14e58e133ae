//! Access to the external stats store
//!
//! Endpoints only ever see `Arc<dyn StatsStore>`; the concrete backend is
//! chosen once at startup.

pub mod memory;
pub mod postgres;
pub mod rest;

use crate::error::{StoreError, StoreResult};
use crate::query::{FunctionCall, OrderBy, TableQuery};
use serde_json::Value;

/// One untyped store record: column name to scalar
pub type RawRow = serde_json::Map<String, Value>;

/// Read-only access to tables, views and functions of the stats store
#[async_trait::async_trait]
pub trait StatsStore: Send + Sync {
    /// Run a filtered read, sorted by `order` when given
    async fn fetch(&self, query: &TableQuery, order: Option<&OrderBy>) -> StoreResult<Vec<RawRow>>;

    /// Invoke a set-returning function
    async fn call(&self, call: &FunctionCall) -> StoreResult<Vec<RawRow>>;

    /// Short backend name for logs
    fn backend_name(&self) -> &'static str;
}

/// Split a JSON array response into rows, rejecting non-object entries
pub(crate) fn rows_from_json(value: Value) -> StoreResult<Vec<RawRow>> {
    match value {
        Value::Array(items) => items
            .into_iter()
            .map(|item| match item {
                Value::Object(row) => Ok(row),
                other => Err(StoreError::decode(format!(
                    "expected a row object, got {}",
                    kind_of(&other)
                ))),
            })
            .collect(),
        Value::Null => Ok(Vec::new()),
        other => Err(StoreError::decode(format!(
            "expected an array of rows, got {}",
            kind_of(&other)
        ))),
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
