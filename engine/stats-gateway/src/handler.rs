//! Endpoint handler: normalize, fetch, project, aggregate

use crate::error::{GatewayError, GatewayResult};
use crate::resources::{Resource, Source};
use stats_query::{
    aggregate, fetch_ordered, identity_key, normalize, scan_ordered, sort_rows, FieldFilter,
    FilterSet, FunctionCall, NormalizedRow, StatsStore, TableQuery,
};
use std::collections::HashMap;
use tracing::debug;

/// One page of projected rows
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    pub rows: Vec<NormalizedRow>,
    pub limit: u32,
    pub offset: u32,
    pub aggregated: bool,
}

/// Serve one request against `resource`
pub async fn handle(
    resource: &Resource,
    params: &HashMap<String, String>,
    store: &dyn StatsStore,
) -> GatewayResult<Page> {
    let set = normalize(params, &resource.query);
    if !set.is_complete() {
        debug!("/api/{}: missing required {:?}", resource.path, set.missing_required);
        return Err(GatewayError::validation(resource.required_message()));
    }

    let aggregation = resource.aggregation.as_ref().filter(|_| set.aggregate);

    // with aggregation, thresholds on summed fields wait until after the collapse
    let (thresholds, store_filters): (Vec<FieldFilter>, Vec<FieldFilter>) = set
        .filters
        .iter()
        .cloned()
        .partition(|f| aggregation.is_some() && resource.query.aggregate_field(&f.param).is_some());

    let raw = match (&resource.source, aggregation) {
        (Source::Table(table), Some(spec)) => {
            // every situation of a player is read before summing; paging happens in memory
            let query = TableQuery::new(table.as_str()).with_filters(store_filters);
            scan_ordered(
                store,
                &query,
                &set.sort_hints,
                set.direction,
                spec.scan_batch,
                spec.max_scan_rows,
            )
            .await?
        }
        (Source::Table(table), None) => {
            let query = TableQuery::from_filter_set(table.as_str(), &set);
            fetch_ordered(store, &query, &set.sort_hints, set.direction).await?
        }
        (Source::Function(function), _) => {
            store.call(&function_call(function, resource, &set)).await?
        }
    };

    let rows = resource.fields.project_all(&raw);
    let rows = match aggregation {
        Some(spec) => {
            let mut rows = aggregate(rows, |row| identity_key(row, &spec.key), &spec.reducer);
            rows.retain(|row| within_thresholds(row, &thresholds, resource));
            sort_rows(&mut rows, &spec.sort_field, spec.sort_direction);
            rows.into_iter().skip(set.offset as usize).take(set.limit as usize).collect()
        }
        None => rows,
    };

    debug!(
        "/api/{}: {} rows from {} (limit {}, offset {}, aggregated {})",
        resource.path,
        rows.len(),
        store.backend_name(),
        set.limit,
        set.offset,
        aggregation.is_some()
    );

    Ok(Page { rows, limit: set.limit, offset: set.offset, aggregated: aggregation.is_some() })
}

fn within_thresholds(row: &NormalizedRow, thresholds: &[FieldFilter], resource: &Resource) -> bool {
    thresholds.iter().all(|filter| match resource.query.aggregate_field(&filter.param) {
        Some(field) => filter.accepts_number(row.number(field)),
        None => true,
    })
}

/// Every declared parameter becomes a named argument; absent ones are passed as NULL
fn function_call(function: &str, resource: &Resource, set: &FilterSet) -> FunctionCall {
    resource
        .query
        .params
        .iter()
        .fold(FunctionCall::new(function), |call, spec| {
            call.arg(spec.target.as_str(), set.value(&spec.name).cloned())
        })
        .limit(set.limit)
        .offset(set.offset)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::ResourceCatalog;
    use serde_json::{json, Value};
    use stats_query::{FilterValue, MemoryStore, OrderBy, RawRow, StoreError, StoreResult};
    use std::sync::Mutex;

    fn row(value: Value) -> RawRow {
        value.as_object().cloned().unwrap()
    }

    fn params(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    fn situation(
        name: &str,
        team: &str,
        season: i64,
        tier: &str,
        yards: i64,
        per_game: f64,
    ) -> RawRow {
        row(json!({
            "full_name": name,
            "team_abbr": team,
            "season": season,
            "category": "pass",
            "def_tier": tier,
            "games": 1,
            "total_yards": yards,
            "per_game": per_game,
        }))
    }

    fn leaderboard_store() -> MemoryStore {
        let mut brown = situation("A.St. Brown", "DET", 2024, "top10", 190, 95.0);
        brown.insert("games".to_string(), json!(2));
        MemoryStore::new().with_table(
            "v_situational_leaderboard",
            vec![
                situation("J.Addison", "MIN", 2024, "top10", 80, 80.0),
                brown,
                situation("J.Addison", "MIN", 2024, "bottom10", 60, 60.0),
            ],
        )
    }

    /// Records function calls and answers with a single row
    struct CallRecorder {
        calls: Mutex<Vec<FunctionCall>>,
    }

    #[async_trait::async_trait]
    impl StatsStore for CallRecorder {
        async fn fetch(
            &self,
            query: &TableQuery,
            _order: Option<&OrderBy>,
        ) -> StoreResult<Vec<RawRow>> {
            Err(StoreError::UnknownSource(query.source.clone()))
        }

        async fn call(&self, call: &FunctionCall) -> StoreResult<Vec<RawRow>> {
            self.calls.lock().unwrap().push(call.clone());
            Ok(vec![row(json!({ "situation": "prime", "games": 4, "hit_rate": 0.75 }))])
        }

        fn backend_name(&self) -> &'static str {
            "recorder"
        }
    }

    #[tokio::test]
    async fn test_missing_required_is_validation_error() {
        let catalog = ResourceCatalog::standard();
        let resource = catalog.get("matchups/wr-vs-cb").unwrap();
        let store = MemoryStore::new();

        let err = handle(resource, &params(&[("cb", "Smith")]), &store).await.unwrap_err();
        assert!(matches!(err, GatewayError::Validation(_)));
        assert_eq!(err.to_string(), "wr and cb are required");
    }

    #[tokio::test]
    async fn test_leaderboard_ordered_page() {
        let catalog = ResourceCatalog::standard();
        let resource = catalog.get("situations/leaderboard").unwrap();
        let store = leaderboard_store();

        let page = handle(resource, &params(&[("limit", "2")]), &store).await.unwrap();
        assert!(!page.aggregated);
        assert_eq!(page.limit, 2);
        let per_game: Vec<f64> = page.rows.iter().map(|r| r.number("per_game")).collect();
        assert_eq!(per_game, vec![95.0, 80.0]);
        assert_eq!(page.rows[0].text("defense_tier"), "top10");
    }

    #[tokio::test]
    async fn test_leaderboard_aggregated() {
        let catalog = ResourceCatalog::standard();
        let resource = catalog.get("situations/leaderboard").unwrap();
        let store = leaderboard_store();

        let raw = params(&[("aggregate", "true"), ("team", "min")]);
        let page = handle(resource, &raw, &store).await.unwrap();
        assert!(page.aggregated);
        assert_eq!(page.rows.len(), 1);

        let addison = &page.rows[0];
        assert_eq!(addison.text("player_name"), "J.Addison");
        assert_eq!(addison.text("team"), "MIN");
        assert_eq!(addison.number("games"), 2.0);
        assert_eq!(addison.number("total"), 140.0);
        assert_eq!(addison.number("per_game"), 70.0);
        assert_eq!(addison.text("defense_tier"), "aggregated");
    }

    #[tokio::test]
    async fn test_aggregated_paging_happens_after_collapse() {
        let catalog = ResourceCatalog::standard();
        let resource = catalog.get("situations/leaderboard").unwrap();
        let store = leaderboard_store();

        let raw = params(&[("aggregate", "1"), ("limit", "1"), ("offset", "1")]);
        let page = handle(resource, &raw, &store)
            .await
            .unwrap();
        assert_eq!(page.rows.len(), 1);
        // DET 190 ranks ahead of MIN 140
        assert_eq!(page.rows[0].text("team"), "MIN");
        assert_eq!(page.rows[0].number("total"), 140.0);
    }

    #[tokio::test]
    async fn test_store_failure_surfaces() {
        let catalog = ResourceCatalog::standard();
        let resource = catalog.get("injuries").unwrap();
        let store = MemoryStore::new()
            .with_columns("injuries", &["updated_at"])
            .with_failure("injuries", "permission denied for table injuries");

        let err = handle(resource, &HashMap::new(), &store).await.unwrap_err();
        assert!(matches!(err, GatewayError::Store(_)));
        assert!(err.to_string().contains("permission denied"));
    }

    #[tokio::test]
    async fn test_function_resource_passes_all_arguments() {
        let catalog = ResourceCatalog::standard();
        let resource = catalog.get("props/hit-rate").unwrap();
        let store = CallRecorder { calls: Mutex::new(Vec::new()) };

        let page = handle(
            resource,
            &params(&[
                ("playerId", "3f2b8c1e-9d4a-4f6b-8e2a-1c5d7e9f0a3b"),
                ("propType", "rec_yds"),
                ("seasonFrom", "2023"),
                ("seasonTo", "2024"),
                ("prime", "true"),
                ("tier", "elite"),
            ]),
            &store,
        )
        .await
        .unwrap();
        assert_eq!(page.rows.len(), 1);
        assert_eq!(page.limit, 100);

        let calls = store.calls.lock().unwrap();
        let call = &calls[0];
        assert_eq!(call.function, "api_prop_hit_rate");
        let arg = |name: &str| call.args.iter().find(|(n, _)| n == name).map(|(_, v)| v.clone());
        assert_eq!(arg("p_prop_type"), Some(Some(FilterValue::Text("rec_yds".into()))));
        assert_eq!(arg("p_season_to"), Some(Some(FilterValue::Integer(2024))));
        assert_eq!(arg("p_prime_only"), Some(Some(FilterValue::Boolean(true))));
        assert_eq!(arg("p_def_tier"), Some(None));
        assert_eq!(arg("p_windy_only"), Some(None));
        assert_eq!(call.args.len(), 9);
    }

    #[tokio::test]
    async fn test_aggregation_reads_past_one_scan_batch() {
        let catalog = ResourceCatalog::standard();
        let resource = catalog.get("situations/leaderboard").unwrap();

        // the two J.Addison rows sort to opposite ends of the scan
        let mut rows = vec![situation("J.Addison", "MIN", 2024, "top10", 80, 200.0)];
        rows.extend(
            (0..1000).map(|i| situation(&format!("Filler{}", i), "GB", 2024, "mid", 10, 100.0)),
        );
        rows.push(situation("J.Addison", "MIN", 2024, "bottom10", 60, 1.0));
        let store = MemoryStore::new().with_table("v_situational_leaderboard", rows);

        let raw = params(&[("aggregate", "true"), ("limit", "1")]);
        let page = handle(resource, &raw, &store).await.unwrap();
        let addison = &page.rows[0];
        assert_eq!(addison.text("player_name"), "J.Addison");
        assert_eq!(addison.number("games"), 2.0);
        assert_eq!(addison.number("total"), 140.0);
        assert_eq!(addison.number("per_game"), 70.0);

        let raw = params(&[("aggregate", "true"), ("limit", "200"), ("offset", "900")]);
        let page = handle(resource, &raw, &store)
            .await
            .unwrap();
        assert_eq!(page.rows.len(), 101);
    }

    #[tokio::test]
    async fn test_aggregation_scan_over_cap_is_an_error() {
        let catalog = ResourceCatalog::standard();
        let mut resource = catalog.get("situations/leaderboard").unwrap().clone();
        if let Some(spec) = resource.aggregation.as_mut() {
            spec.scan_batch = 2;
            spec.max_scan_rows = 2;
        }

        let raw = params(&[("aggregate", "true")]);
        let err = handle(&resource, &raw, &leaderboard_store()).await.unwrap_err();
        assert!(matches!(err, GatewayError::Store(StoreError::ScanLimit { .. })));
        assert_eq!(err.status_code(), warp::http::StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_aggregation_keeps_seasons_apart() {
        let catalog = ResourceCatalog::standard();
        let resource = catalog.get("situations/leaderboard").unwrap();
        let store = MemoryStore::new().with_table(
            "v_situational_leaderboard",
            vec![
                situation("J.Addison", "MIN", 2023, "top10", 80, 80.0),
                situation("J.Addison", "MIN", 2024, "top10", 60, 60.0),
                situation("J.Addison", "MIN", 2024, "mid", 40, 40.0),
            ],
        );

        let page = handle(
            resource,
            &params(&[("aggregate", "true"), ("seasonFrom", "2023"), ("seasonTo", "2024")]),
            &store,
        )
        .await
        .unwrap();
        let seasons: Vec<(i64, f64, f64)> = page
            .rows
            .iter()
            .map(|r| (r.number("season") as i64, r.number("games"), r.number("total")))
            .collect();
        assert_eq!(seasons, vec![(2024, 2.0, 100.0), (2023, 1.0, 80.0)]);
    }

    #[tokio::test]
    async fn test_team_filter_follows_renamed_column() {
        let catalog = ResourceCatalog::standard();
        let resource = catalog.get("situations/leaderboard").unwrap();
        let store = MemoryStore::new().with_table(
            "v_situational_leaderboard",
            vec![
                row(json!({ "full_name": "J.Addison", "team": "MIN", "season": 2024, "games": 1,
                    "total_yards": 80, "per_game": 80.0 })),
                row(json!({ "full_name": "A.St. Brown", "team": "DET", "season": 2024, "games": 1,
                    "total_yards": 95, "per_game": 95.0 })),
            ],
        );

        let page = handle(resource, &params(&[("team", "MIN")]), &store).await.unwrap();
        assert_eq!(page.rows.len(), 1);
        assert_eq!(page.rows[0].text("team"), "MIN");

        let raw = params(&[("team", "min"), ("aggregate", "true")]);
        let page = handle(resource, &raw, &store).await.unwrap();
        assert_eq!(page.rows.len(), 1);
        assert_eq!(page.rows[0].number("total"), 80.0);
    }

    #[tokio::test]
    async fn test_aggregate_thresholds_apply_to_totals() {
        let catalog = ResourceCatalog::standard();
        let resource = catalog.get("situations/leaderboard").unwrap();
        let store = MemoryStore::new().with_table(
            "v_situational_leaderboard",
            vec![
                situation("J.Addison", "MIN", 2024, "top10", 80, 80.0),
                situation("J.Addison", "MIN", 2024, "bottom10", 60, 60.0),
                situation("A.St. Brown", "DET", 2024, "top10", 190, 95.0),
                situation("S.Barkley", "PHI", 2023, "top10", 120, 120.0),
            ],
        );

        // each Addison row is under 100 yards, the season total is not
        let page = handle(
            resource,
            &params(&[
                ("aggregate", "true"),
                ("min_yards", "100"),
                ("maxYards", "150"),
                ("year", "2024"),
            ]),
            &store,
        )
        .await
        .unwrap();
        assert_eq!(page.rows.len(), 1);
        assert_eq!(page.rows[0].text("player_name"), "J.Addison");

        let raw = params(&[("aggregate", "true"), ("min_games", "2")]);
        let page = handle(resource, &raw, &store).await.unwrap();
        let names: Vec<String> = page.rows.iter().map(|r| r.text("player_name")).collect();
        assert_eq!(names, vec!["J.Addison"]);

        // unaggregated, the same threshold filters individual situations in the store
        let page = handle(resource, &params(&[("min_yards", "100")]), &store).await.unwrap();
        let names: Vec<String> = page.rows.iter().map(|r| r.text("player_name")).collect();
        assert_eq!(names, vec!["S.Barkley", "A.St. Brown"]);
    }
}
