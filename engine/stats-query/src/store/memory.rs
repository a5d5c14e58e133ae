//! In-memory stats store backed by a JSON fixture
//!
//! Behaves like a real store for the parts the pipeline depends on: filters
//! and sort columns that name a column the table does not have fail with
//! [`StoreError::UndefinedColumn`], so schema drift can be exercised locally.
//! Functions are canned: a call returns the fixture rows recorded for that
//! function, paged, and its arguments are not evaluated.

use crate::error::{StoreError, StoreResult};
use crate::filter::{Comparison, FieldFilter, FilterValue, SortDirection};
use crate::query::{FunctionCall, OrderBy, TableQuery};
use crate::store::{RawRow, StatsStore};
use serde::Deserialize;
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use tracing::{debug, info};

#[derive(Debug, Clone, Default)]
struct MemoryTable {
    columns: BTreeSet<String>,
    rows: Vec<RawRow>,
}

/// Fixture file layout
#[derive(Debug, Default, Deserialize)]
struct Fixture {
    #[serde(default)]
    tables: HashMap<String, Vec<RawRow>>,
    /// Extra columns for tables whose rows do not mention them (or that are empty)
    #[serde(default)]
    columns: HashMap<String, Vec<String>>,
    #[serde(default)]
    functions: HashMap<String, Vec<RawRow>>,
}

/// Fixture-driven stats store
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    tables: HashMap<String, MemoryTable>,
    functions: HashMap<String, Vec<RawRow>>,
    failures: HashMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or extend) a table; its columns are the union of the row keys
    pub fn with_table(mut self, name: impl Into<String>, rows: Vec<RawRow>) -> Self {
        let table = self.tables.entry(name.into()).or_default();
        for row in &rows {
            table.columns.extend(row.keys().cloned());
        }
        table.rows.extend(rows);
        self
    }

    /// Declare columns a table has even when no row carries them
    pub fn with_columns(mut self, name: impl Into<String>, columns: &[&str]) -> Self {
        let table = self.tables.entry(name.into()).or_default();
        table.columns.extend(columns.iter().map(|c| c.to_string()));
        self
    }

    pub fn with_function(mut self, name: impl Into<String>, rows: Vec<RawRow>) -> Self {
        self.functions.insert(name.into(), rows);
        self
    }

    /// Make every read of `source` fail with a non-drift store error
    pub fn with_failure(mut self, source: impl Into<String>, message: impl Into<String>) -> Self {
        self.failures.insert(source.into(), message.into());
        self
    }

    /// Build a store from fixture JSON: `{"tables": {...}, "columns": {...}, "functions": {...}}`
    pub fn from_fixture_json(json: &str) -> StoreResult<Self> {
        let fixture: Fixture = serde_json::from_str(json)
            .map_err(|e| StoreError::config(format!("Invalid fixture: {}", e)))?;

        let mut store = Self::new();
        for (name, rows) in fixture.tables {
            store = store.with_table(name, rows);
        }
        for (name, columns) in fixture.columns {
            let columns: Vec<&str> = columns.iter().map(String::as_str).collect();
            store = store.with_columns(name, &columns);
        }
        for (name, rows) in fixture.functions {
            store = store.with_function(name, rows);
        }
        Ok(store)
    }

    /// Read a fixture file from disk
    pub async fn load_fixture(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        let json = tokio::fs::read_to_string(path).await.map_err(|e| {
            StoreError::config(format!("Failed to read fixture {}: {}", path.display(), e))
        })?;
        let store = Self::from_fixture_json(&json)?;
        info!(
            "Loaded fixture {} ({} tables, {} functions)",
            path.display(),
            store.tables.len(),
            store.functions.len()
        );
        Ok(store)
    }

    fn check_failure(&self, source: &str) -> StoreResult<()> {
        match self.failures.get(source) {
            Some(message) => Err(StoreError::Rejected {
                status: 500,
                code: None,
                message: message.clone(),
            }),
            None => Ok(()),
        }
    }
}

#[async_trait::async_trait]
impl StatsStore for MemoryStore {
    async fn fetch(&self, query: &TableQuery, order: Option<&OrderBy>) -> StoreResult<Vec<RawRow>> {
        self.check_failure(&query.source)?;
        let table = self
            .tables
            .get(&query.source)
            .ok_or_else(|| StoreError::UnknownSource(query.source.clone()))?;

        let referenced = query
            .filters
            .iter()
            .map(|f| f.target.as_str())
            .chain(order.map(|o| o.column.as_str()));
        for column in referenced {
            if !table.columns.contains(column) {
                return Err(StoreError::UndefinedColumn {
                    message: format!("column {}.{} does not exist", query.source, column),
                });
            }
        }

        let mut rows: Vec<RawRow> = table
            .rows
            .iter()
            .filter(|row| query.filters.iter().all(|filter| matches_filter(row, filter)))
            .cloned()
            .collect();

        if let Some(order) = order {
            let column = order.column.as_str();
            rows.sort_by(|a, b| compare_cells(a.get(column), b.get(column), order.direction));
        }

        debug!("Memory fetch {}: {} rows before paging", query.source, rows.len());
        Ok(page(rows, query.limit, query.offset))
    }

    /// Fixture rows for `call.function`; arguments are ignored
    async fn call(&self, call: &FunctionCall) -> StoreResult<Vec<RawRow>> {
        self.check_failure(&call.function)?;
        let rows = self
            .functions
            .get(&call.function)
            .ok_or_else(|| StoreError::UnknownSource(call.function.clone()))?;
        Ok(page(rows.clone(), call.limit, call.offset))
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

fn page(rows: Vec<RawRow>, limit: Option<u32>, offset: u32) -> Vec<RawRow> {
    let limit = limit.map(|l| l as usize).unwrap_or(usize::MAX);
    rows.into_iter().skip(offset as usize).take(limit).collect()
}

fn matches_filter(row: &RawRow, filter: &FieldFilter) -> bool {
    let ordering = match row.get(&filter.target) {
        None | Some(Value::Null) => return false,
        Some(cell) => compare_to_filter(cell, &filter.value),
    };
    match (ordering, filter.comparison) {
        (Some(ord), Comparison::Eq) => ord == Ordering::Equal,
        (Some(ord), Comparison::Gte) => ord != Ordering::Less,
        (Some(ord), Comparison::Lte) => ord != Ordering::Greater,
        (None, _) => false,
    }
}

fn compare_to_filter(cell: &Value, value: &FilterValue) -> Option<Ordering> {
    match value {
        FilterValue::Integer(n) => cell_number(cell).map(|c| c.total_cmp(&(*n as f64))),
        FilterValue::Boolean(b) => cell.as_bool().map(|c| c.cmp(b)),
        FilterValue::Text(s) => Some(cell_text(cell).as_str().cmp(s.as_str())),
        FilterValue::Uuid(id) => Some(cell_text(cell).to_ascii_lowercase().cmp(&id.to_string())),
    }
}

/// Null-last comparison of two cells in `direction`
fn compare_cells(a: Option<&Value>, b: Option<&Value>, direction: SortDirection) -> Ordering {
    let a = a.filter(|v| !v.is_null());
    let b = b.filter(|v| !v.is_null());
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(a), Some(b)) => {
            let ord = match (cell_number(a), cell_number(b)) {
                (Some(x), Some(y)) => x.total_cmp(&y),
                _ => cell_text(a).cmp(&cell_text(b)),
            };
            if direction.is_ascending() {
                ord
            } else {
                ord.reverse()
            }
        }
    }
}

fn cell_number(cell: &Value) -> Option<f64> {
    match cell {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
        _ => None,
    }
}

fn cell_text(cell: &Value) -> String {
    match cell {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
