//! Direct Postgres access via sqlx
//!
//! Rows are fetched as `to_jsonb(...)` so every table and view comes back as
//! the same untyped [`RawRow`] shape regardless of its column types.

use crate::error::{StoreError, StoreResult};
use crate::filter::FilterValue;
use crate::query::{FunctionCall, OrderBy, TableQuery};
use crate::store::{rows_from_json, RawRow, StatsStore};
use serde_json::Value;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Postgres, QueryBuilder};
use tracing::debug;

/// Postgres-backed stats store
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Open a connection pool
    pub async fn connect(database_url: &str, max_connections: u32) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| StoreError::Connection { message: e.to_string() })?;
        Ok(Self { pool })
    }
}

#[async_trait::async_trait]
impl StatsStore for PgStore {
    async fn fetch(&self, query: &TableQuery, order: Option<&OrderBy>) -> StoreResult<Vec<RawRow>> {
        let mut builder = select_sql(query, order);
        debug!("Postgres fetch: {}", builder.sql());
        let rows: Vec<Value> = builder.build_query_scalar::<Value>().fetch_all(&self.pool).await?;
        rows_from_json(Value::Array(rows))
    }

    async fn call(&self, call: &FunctionCall) -> StoreResult<Vec<RawRow>> {
        let mut builder = function_sql(call);
        debug!("Postgres call: {}", builder.sql());
        let rows: Vec<Value> = builder.build_query_scalar::<Value>().fetch_all(&self.pool).await?;
        rows_from_json(Value::Array(rows))
    }

    fn backend_name(&self) -> &'static str {
        "postgres"
    }
}

/// `SELECT to_jsonb(t) FROM <source> AS t [WHERE ...] [ORDER BY ...] [LIMIT] [OFFSET]`
pub(crate) fn select_sql(
    query: &TableQuery,
    order: Option<&OrderBy>,
) -> QueryBuilder<'static, Postgres> {
    let mut builder = QueryBuilder::new("SELECT to_jsonb(t) FROM ");
    builder.push(quote_path(&query.source)).push(" AS t");

    for (i, filter) in query.filters.iter().enumerate() {
        builder
            .push(if i == 0 { " WHERE t." } else { " AND t." })
            .push(quote_ident(&filter.target))
            .push(" ")
            .push(filter.comparison.sql_operator())
            .push(" ");
        push_value(&mut builder, &filter.value);
    }

    if let Some(order) = order {
        builder.push(" ORDER BY t.").push(quote_ident(&order.column)).push(
            if order.direction.is_ascending() { " ASC NULLS LAST" } else { " DESC NULLS LAST" },
        );
    }

    push_page(&mut builder, query.limit, query.offset);
    builder
}

/// `SELECT to_jsonb(r) FROM <function>(arg => $1, ...) AS r [LIMIT] [OFFSET]`
pub(crate) fn function_sql(call: &FunctionCall) -> QueryBuilder<'static, Postgres> {
    let mut builder = QueryBuilder::new("SELECT to_jsonb(r) FROM ");
    builder.push(quote_path(&call.function)).push("(");

    for (i, (name, value)) in call.args.iter().enumerate() {
        if i > 0 {
            builder.push(", ");
        }
        builder.push(quote_ident(name)).push(" => ");
        match value {
            Some(value) => push_value(&mut builder, value),
            // untyped NULL so Postgres resolves it against the declared argument type
            None => {
                builder.push("NULL");
            }
        }
    }

    builder.push(") AS r");
    push_page(&mut builder, call.limit, call.offset);
    builder
}

fn push_value(builder: &mut QueryBuilder<'static, Postgres>, value: &FilterValue) {
    match value {
        FilterValue::Text(s) => {
            builder.push_bind(s.clone());
        }
        FilterValue::Integer(n) => {
            builder.push_bind(*n);
        }
        FilterValue::Boolean(b) => {
            builder.push_bind(*b);
        }
        FilterValue::Uuid(id) => {
            builder.push_bind(*id);
        }
    }
}

fn push_page(builder: &mut QueryBuilder<'static, Postgres>, limit: Option<u32>, offset: u32) {
    if let Some(limit) = limit {
        builder.push(" LIMIT ").push_bind(i64::from(limit));
    }
    if offset > 0 {
        builder.push(" OFFSET ").push_bind(i64::from(offset));
    }
}

/// Quote one identifier, doubling embedded quotes
pub(crate) fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Quote a possibly schema-qualified name (`public.player_stats`)
pub(crate) fn quote_path(path: &str) -> String {
    path.split('.').map(quote_ident).collect::<Vec<_>>().join(".")
}
