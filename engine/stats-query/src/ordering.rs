//! Drift-tolerant ordered fetches
//!
//! Store schemas drift between deployments (`updated_at` exists on one table
//! version and not the next). Each endpoint lists the columns it would like to
//! sort by; the resolver tries them in order and falls back to an unordered
//! read once every candidate has been rejected as missing. Filters may name
//! fallback columns of their own, which the resolver switches to when the
//! store reports the filter column as the missing one.

use crate::error::{StoreError, StoreResult};
use crate::filter::SortDirection;
use crate::query::{OrderBy, TableQuery};
use crate::store::{RawRow, StatsStore};
use tracing::{debug, warn};

/// The rows of a successful read and the query shape the store accepted
struct Resolved {
    rows: Vec<RawRow>,
    query: TableQuery,
    order: Option<OrderBy>,
}

/// Fetch `query` sorted by the first candidate column the store accepts.
///
/// Schema-drift failures on the sort column move on to the next candidate;
/// drift on a filter column retargets that filter to its next fallback. Any
/// other error is returned immediately. With no usable candidate the query
/// runs unordered.
pub async fn fetch_ordered(
    store: &dyn StatsStore,
    query: &TableQuery,
    candidates: &[String],
    direction: SortDirection,
) -> StoreResult<Vec<RawRow>> {
    Ok(resolve(store, query, candidates, direction).await?.rows)
}

/// Read every row matching `query`, `batch_size` rows at a time.
///
/// The first batch resolves ordering and filter columns like
/// [`fetch_ordered`]; later batches reuse what the store accepted and advance
/// the offset until a short batch comes back. Reading past `max_rows` fails
/// with [`StoreError::ScanLimit`] instead of returning a truncated set.
pub async fn scan_ordered(
    store: &dyn StatsStore,
    query: &TableQuery,
    candidates: &[String],
    direction: SortDirection,
    batch_size: u32,
    max_rows: usize,
) -> StoreResult<Vec<RawRow>> {
    let batch_size = batch_size.max(1);
    let first = query.clone().limit(batch_size).offset(0);
    let Resolved { mut rows, query, order } = resolve(store, &first, candidates, direction).await?;

    let mut last_batch = rows.len();
    while last_batch == batch_size as usize {
        if rows.len() > max_rows {
            break;
        }
        let offset = u32::try_from(rows.len()).map_err(|_| scan_limit(&query, max_rows))?;
        let batch = store.fetch(&query.clone().offset(offset), order.as_ref()).await?;
        last_batch = batch.len();
        rows.extend(batch);
    }

    if rows.len() > max_rows {
        return Err(scan_limit(&query, max_rows));
    }
    debug!("{}: scanned {} rows", query.source, rows.len());
    Ok(rows)
}

fn scan_limit(query: &TableQuery, max_rows: usize) -> StoreError {
    StoreError::ScanLimit { table: query.source.clone(), max_rows }
}

async fn resolve(
    store: &dyn StatsStore,
    query: &TableQuery,
    candidates: &[String],
    direction: SortDirection,
) -> StoreResult<Resolved> {
    let mut orders: Vec<Option<OrderBy>> = Vec::with_capacity(candidates.len() + 1);
    for column in candidates {
        if !orders.iter().flatten().any(|o| &o.column == column) {
            orders.push(Some(OrderBy::new(column.as_str(), direction)));
        }
    }
    orders.push(None);

    let mut query = query.clone();
    let mut attempt = 0;
    loop {
        let order = orders[attempt].as_ref();
        let err = match store.fetch(&query, order).await {
            Ok(rows) => {
                match order {
                    Some(order) => debug!(
                        "{}: ordered by {} ({} rows)",
                        query.source,
                        order.column,
                        rows.len()
                    ),
                    None if attempt > 0 => {
                        warn!("{}: no sort candidate accepted, fetched unordered", query.source)
                    }
                    None => {}
                }
                return Ok(Resolved { rows, query, order: order.cloned() });
            }
            Err(e) if e.is_schema_drift() => e,
            Err(e) => return Err(e),
        };

        if let Some(column) = err.missing_column() {
            if let Some(filter) = query.filters.iter_mut().find(|f| f.target == column) {
                if !filter.retarget() {
                    return Err(err);
                }
                warn!("{}: filter {} missing, retrying on {}", query.source, column, filter.target);
                continue;
            }
            if order.map_or(true, |o| o.column != column) {
                return Err(err);
            }
        }

        if attempt + 1 == orders.len() {
            return Err(err);
        }
        if let Some(order) = order {
            warn!(
                "{}: cannot order by {}, trying next candidate: {}",
                query.source, order.column, err
            );
        }
        attempt += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::{Comparison, FieldFilter, FilterValue};
    use crate::query::FunctionCall;
    use crate::store::memory::MemoryStore;
    use serde_json::{json, Value};
    use std::sync::Mutex;

    fn row(value: Value) -> RawRow {
        value.as_object().cloned().unwrap()
    }

    fn candidates(columns: &[&str]) -> Vec<String> {
        columns.iter().map(|c| c.to_string()).collect()
    }

    fn events() -> MemoryStore {
        MemoryStore::new().with_table(
            "events",
            vec![
                row(json!({ "id": 1, "c": 10 })),
                row(json!({ "id": 2, "c": 30 })),
                row(json!({ "id": 3, "c": 20 })),
            ],
        )
    }

    /// Records every attempted ordering and answers with an error built from it
    struct RecordingStore {
        attempts: Mutex<Vec<Option<String>>>,
        fail_with: fn(Option<&str>) -> StoreError,
    }

    impl RecordingStore {
        fn new(fail_with: fn(Option<&str>) -> StoreError) -> Self {
            Self { attempts: Mutex::new(Vec::new()), fail_with }
        }

        fn attempts(&self) -> Vec<Option<String>> {
            self.attempts.lock().unwrap().clone()
        }
    }

    #[async_trait::async_trait]
    impl StatsStore for RecordingStore {
        async fn fetch(
            &self,
            _query: &TableQuery,
            order: Option<&OrderBy>,
        ) -> StoreResult<Vec<RawRow>> {
            let column = order.map(|o| o.column.clone());
            self.attempts.lock().unwrap().push(column.clone());
            Err((self.fail_with)(column.as_deref()))
        }

        async fn call(&self, _call: &FunctionCall) -> StoreResult<Vec<RawRow>> {
            Ok(Vec::new())
        }

        fn backend_name(&self) -> &'static str {
            "recording"
        }
    }

    fn missing(column: Option<&str>) -> StoreError {
        StoreError::UndefinedColumn {
            message: format!("column events.{} does not exist", column.unwrap_or("kind")),
        }
    }

    fn leaderboard_rows(count: usize) -> Vec<RawRow> {
        (0..count)
            .map(|i| {
                row(json!({
                    "full_name": format!("P{}", i),
                    "team": "MIN",
                    "season": 2024,
                    "per_game": i,
                }))
            })
            .collect()
    }

    #[tokio::test]
    async fn test_falls_back_to_existing_column() {
        let store = events();
        let query = TableQuery::new("events");
        let rows = fetch_ordered(&store, &query, &candidates(&["a", "b", "c"]), SortDirection::Desc)
            .await
            .unwrap();
        let ids: Vec<i64> = rows.iter().map(|r| r["id"].as_i64().unwrap()).collect();
        assert_eq!(ids, vec![2, 3, 1]);
    }

    #[tokio::test]
    async fn test_unordered_when_no_candidate_exists() {
        let store = events();
        let query = TableQuery::new("events");
        let rows = fetch_ordered(&store, &query, &candidates(&["a", "b"]), SortDirection::Asc)
            .await
            .unwrap();
        assert_eq!(rows.len(), 3);

        let rows = fetch_ordered(&store, &query, &[], SortDirection::Asc).await.unwrap();
        assert_eq!(rows.len(), 3);
    }

    #[tokio::test]
    async fn test_fatal_error_stops_after_one_attempt() {
        let store = RecordingStore::new(|_| StoreError::Rejected {
            status: 503,
            code: None,
            message: "unavailable".into(),
        });
        let query = TableQuery::new("events");
        let err = fetch_ordered(&store, &query, &candidates(&["a", "b"]), SortDirection::Desc)
            .await
            .unwrap_err();
        assert!(!err.is_schema_drift());
        assert_eq!(store.attempts(), vec![Some("a".to_string())]);
    }

    #[tokio::test]
    async fn test_duplicates_tried_once_then_unordered() {
        let store = RecordingStore::new(missing);
        let query = TableQuery::new("events");
        let result =
            fetch_ordered(&store, &query, &candidates(&["a", "b", "a"]), SortDirection::Desc).await;

        // the unordered read fails too and its error is what comes back
        assert!(result.is_err());
        assert_eq!(store.attempts(), vec![Some("a".to_string()), Some("b".to_string()), None]);
    }

    #[tokio::test]
    async fn test_other_missing_column_does_not_spend_candidates() {
        // every read fails on the same column, whichever sort is requested
        let store = RecordingStore::new(|_| missing(Some("kind")));
        let query = TableQuery::new("events");
        let err = fetch_ordered(&store, &query, &candidates(&["a", "b"]), SortDirection::Desc)
            .await
            .unwrap_err();

        assert_eq!(err.missing_column().as_deref(), Some("kind"));
        assert_eq!(store.attempts(), vec![Some("a".to_string())]);
    }

    #[tokio::test]
    async fn test_missing_filter_column_uses_fallback() {
        let store = MemoryStore::new().with_table(
            "v_situational_leaderboard",
            vec![
                row(json!({ "full_name": "J.Addison", "team": "MIN", "per_game": 80.0 })),
                row(json!({ "full_name": "A.St. Brown", "team": "DET", "per_game": 95.0 })),
            ],
        );
        let team = FieldFilter::new(
            "team",
            "team_abbr",
            Comparison::Eq,
            FilterValue::Text("MIN".into()),
        )
            .or_column("team");
        let query = TableQuery::new("v_situational_leaderboard").with_filters(vec![team]);

        let sorts = candidates(&["updated_at", "per_game"]);
        let rows = fetch_ordered(&store, &query, &sorts, SortDirection::Desc)
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["full_name"], json!("J.Addison"));
    }

    #[tokio::test]
    async fn test_missing_filter_column_without_fallback_fails() {
        let store = events();
        let kind = FieldFilter::new("kind", "kind", Comparison::Eq, FilterValue::Text("td".into()));
        let query = TableQuery::new("events").with_filters(vec![kind]);

        let err = fetch_ordered(&store, &query, &candidates(&["c"]), SortDirection::Desc)
            .await
            .unwrap_err();
        assert_eq!(err.missing_column().as_deref(), Some("kind"));
    }

    #[tokio::test]
    async fn test_scan_reads_past_one_batch() {
        let store =
            MemoryStore::new().with_table("v_situational_leaderboard", leaderboard_rows(25));
        let query = TableQuery::new("v_situational_leaderboard");

        let sorts = candidates(&["updated_at", "per_game"]);
        let rows = scan_ordered(&store, &query, &sorts, SortDirection::Desc, 10, 100)
            .await
            .unwrap();
        assert_eq!(rows.len(), 25);
        let first: Vec<i64> =
            rows.iter().take(3).map(|r| r["per_game"].as_i64().unwrap()).collect();
        assert_eq!(first, vec![24, 23, 22]);
        assert_eq!(rows[24]["per_game"], json!(0));

        // an exact multiple of the batch size ends on an empty batch
        let store =
            MemoryStore::new().with_table("v_situational_leaderboard", leaderboard_rows(20));
        let sorts = candidates(&["per_game"]);
        let rows = scan_ordered(&store, &query, &sorts, SortDirection::Desc, 10, 20)
            .await
            .unwrap();
        assert_eq!(rows.len(), 20);
    }

    #[tokio::test]
    async fn test_scan_over_cap_fails_loudly() {
        let store =
            MemoryStore::new().with_table("v_situational_leaderboard", leaderboard_rows(25));
        let query = TableQuery::new("v_situational_leaderboard");

        let sorts = candidates(&["per_game"]);
        let err = scan_ordered(&store, &query, &sorts, SortDirection::Desc, 10, 15)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::ScanLimit { max_rows: 15, .. }));
    }
}
