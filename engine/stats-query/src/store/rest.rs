//! PostgREST access over HTTPS (hosted Supabase-style stores)

use crate::error::{is_undefined_column_message, StoreError, StoreResult, UNDEFINED_COLUMN};
use crate::filter::FilterValue;
use crate::query::{FunctionCall, OrderBy, TableQuery};
use crate::store::{rows_from_json, RawRow, StatsStore};
use reqwest::{Client, RequestBuilder, Response};
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Error body returned by PostgREST
#[derive(Debug, Deserialize)]
struct PostgrestError {
    code: Option<String>,
    message: Option<String>,
}

/// REST-backed stats store
pub struct RestStore {
    client: Client,
    base_url: Url,
    api_key: String,
}

impl RestStore {
    /// Create a store for `base_url` (the project URL, without `/rest/v1`)
    pub fn new(base_url: &str, api_key: impl Into<String>, timeout: Duration) -> StoreResult<Self> {
        let mut base_url = Url::parse(base_url)
            .map_err(|e| StoreError::config(format!("Invalid REST base URL: {}", e)))?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| StoreError::config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client, base_url, api_key: api_key.into() })
    }

    fn endpoint(&self, path: &str) -> StoreResult<Url> {
        self.base_url
            .join(path)
            .map_err(|e| StoreError::config(format!("Invalid REST path {}: {}", path, e)))
    }

    /// `GET /rest/v1/<source>?select=*&<col>=<op>.<value>&order=...&limit=&offset=`
    pub(crate) fn table_url(
        &self,
        query: &TableQuery,
        order: Option<&OrderBy>,
    ) -> StoreResult<Url> {
        let mut url = self.endpoint(&format!("rest/v1/{}", query.source))?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("select", "*");
            for filter in &query.filters {
                let value = format!("{}.{}", filter.comparison.postgrest_operator(), filter.value);
                pairs.append_pair(&filter.target, &value);
            }
            if let Some(order) = order {
                let direction = if order.direction.is_ascending() { "asc" } else { "desc" };
                pairs.append_pair("order", &format!("{}.{}.nullslast", order.column, direction));
            }
            if let Some(limit) = query.limit {
                pairs.append_pair("limit", &limit.to_string());
            }
            if query.offset > 0 {
                pairs.append_pair("offset", &query.offset.to_string());
            }
        }
        Ok(url)
    }

    /// `POST /rest/v1/rpc/<function>?limit=&offset=`
    pub(crate) fn function_url(&self, call: &FunctionCall) -> StoreResult<Url> {
        let mut url = self.endpoint(&format!("rest/v1/rpc/{}", call.function))?;
        if call.limit.is_some() || call.offset > 0 {
            let mut pairs = url.query_pairs_mut();
            if let Some(limit) = call.limit {
                pairs.append_pair("limit", &limit.to_string());
            }
            if call.offset > 0 {
                pairs.append_pair("offset", &call.offset.to_string());
            }
        }
        Ok(url)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request.header("apikey", &self.api_key).bearer_auth(&self.api_key)
    }
}

#[async_trait::async_trait]
impl StatsStore for RestStore {
    async fn fetch(&self, query: &TableQuery, order: Option<&OrderBy>) -> StoreResult<Vec<RawRow>> {
        let url = self.table_url(query, order)?;
        debug!("REST fetch: {}?{}", url.path(), url.query().unwrap_or_default());
        let response = self.authorized(self.client.get(url)).send().await?;
        let value = read_body(response).await?;
        rows_from_json(value)
    }

    async fn call(&self, call: &FunctionCall) -> StoreResult<Vec<RawRow>> {
        let url = self.function_url(call)?;
        let body: serde_json::Map<String, Value> = call
            .args
            .iter()
            .map(|(name, value)| {
                let json = value.as_ref().map(FilterValue::to_json).unwrap_or(Value::Null);
                (name.clone(), json)
            })
            .collect();
        debug!("REST call: {} with {} args", url.path(), body.len());

        let response = self.authorized(self.client.post(url).json(&body)).send().await?;
        match read_body(response).await? {
            // scalar-returning functions answer with a single object
            Value::Object(row) => Ok(vec![row]),
            other => rows_from_json(other),
        }
    }

    fn backend_name(&self) -> &'static str {
        "rest"
    }
}

async fn read_body(response: Response) -> StoreResult<Value> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(rejection(status.as_u16(), &body));
    }
    Ok(response.json().await?)
}

/// Classify a non-success PostgREST response
pub(crate) fn rejection(status: u16, body: &str) -> StoreError {
    match serde_json::from_str::<PostgrestError>(body) {
        Ok(err) => {
            let message = err.message.unwrap_or_else(|| format!("status {}", status));
            let undefined = err.code.as_deref() == Some(UNDEFINED_COLUMN);
            if undefined || is_undefined_column_message(&message) {
                StoreError::UndefinedColumn { message }
            } else {
                StoreError::Rejected { status, code: err.code, message }
            }
        }
        Err(_) => {
            let body = body.trim();
            let message = if body.is_empty() {
                format!("status {}", status)
            } else {
                body.to_string()
            };
            StoreError::Rejected { status, code: None, message }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::{Comparison, FieldFilter, SortDirection};

    fn store() -> RestStore {
        RestStore::new("https://stats.example.supabase.co", "anon-key", Duration::from_secs(5))
            .unwrap()
    }

    #[test]
    fn test_table_url() {
        let season = |param: &str, comparison, year| {
            FieldFilter::new(param, "season", comparison, FilterValue::Integer(year))
        };
        let from = season("seasonFrom", Comparison::Gte, 2023);
        let to = season("seasonTo", Comparison::Lte, 2024);
        let query = TableQuery::new("v_situational_leaderboard")
            .with_filters(vec![from, to])
            .limit(25)
            .offset(25);
        let order = OrderBy::new("per_game", SortDirection::Desc);

        let url = store().table_url(&query, Some(&order)).unwrap();
        assert_eq!(url.path(), "/rest/v1/v_situational_leaderboard");
        assert_eq!(
            url.query(),
            Some(
                "select=*&season=gte.2023&season=lte.2024\
                 &order=per_game.desc.nullslast&limit=25&offset=25"
            )
        );
    }

    #[test]
    fn test_function_url_keeps_base_path() {
        let timeout = Duration::from_secs(5);
        let store = RestStore::new("http://localhost:54321/project", "key", timeout).unwrap();
        let call = FunctionCall::new("api_prop_hit_rate").limit(100);
        let url = store.function_url(&call).unwrap();
        assert_eq!(url.path(), "/project/rest/v1/rpc/api_prop_hit_rate");
        assert_eq!(url.query(), Some("limit=100"));
    }

    #[test]
    fn test_invalid_base_url() {
        assert!(matches!(
            RestStore::new("not a url", "key", Duration::from_secs(1)),
            Err(StoreError::Config(_))
        ));
    }

    #[test]
    fn test_rejection_classification() {
        let drift = rejection(
            400,
            r#"{"code":"42703","message":"column injuries.updated_at does not exist"}"#,
        );
        assert!(drift.is_schema_drift());
        assert!(matches!(drift, StoreError::UndefinedColumn { .. }));

        let denied =
            rejection(401, r#"{"code":"42501","message":"permission denied for table injuries"}"#);
        assert!(!denied.is_schema_drift());
        match denied {
            StoreError::Rejected { status, code, message } => {
                assert_eq!(status, 401);
                assert_eq!(code.as_deref(), Some("42501"));
                assert_eq!(message, "permission denied for table injuries");
            }
            other => panic!("unexpected error: {:?}", other),
        }

        let gateway = rejection(502, "  ");
        assert_eq!(gateway.to_string(), "Store rejected request (502): status 502");
    }
}
