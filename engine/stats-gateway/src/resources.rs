//! Resource catalog: one declaration per `/api/...` endpoint
//!
//! Each resource names its store source, the parameters it accepts, the
//! columns it would like to sort by and its output shape. Nothing else about
//! an endpoint lives anywhere else.

use crate::error::{GatewayError, GatewayResult};
use stats_query::{FieldMap, FieldSpec, FieldValue, ParamSpec, QueryConfig, Reducer, SortDirection};
use std::collections::HashSet;

const POSITIONS: &[&str] = &["QB", "RB", "WR", "TE", "K"];
const DEF_CATEGORIES: &[&str] = &["rush", "pass", "overall"];
const DEF_TIERS: &[&str] = &["top10", "mid", "bottom10"];
const PROP_TYPES: &[&str] =
    &["rush_yds", "rec_yds", "receptions", "pass_yds", "rush_tds", "rec_tds", "pass_tds"];
const INJURY_STATUSES: &[&str] = &["Out", "Doubtful", "Questionable", "Probable", "IR", "PUP"];
const MARKETS: &[&str] = &["spread", "moneyline", "total"];

/// Where a resource's rows come from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    /// A table or view, read through the ordering resolver
    Table(String),
    /// A set-returning function; every declared parameter becomes a named argument
    Function(String),
}

/// How an aggregatable resource collapses its rows
#[derive(Debug, Clone, PartialEq)]
pub struct AggregationSpec {
    /// Output fields forming the identity key
    pub key: Vec<String>,
    pub reducer: Reducer,
    pub sort_field: String,
    pub sort_direction: SortDirection,
    /// Rows per store read while scanning
    pub scan_batch: u32,
    /// Scans reading more rows than this fail
    pub max_scan_rows: usize,
}

/// One endpoint under `/api/`
#[derive(Debug, Clone, PartialEq)]
pub struct Resource {
    /// Path below `/api/`, e.g. `situations/leaderboard`
    pub path: String,
    pub source: Source,
    pub query: QueryConfig,
    pub fields: FieldMap,
    pub aggregation: Option<AggregationSpec>,
}

impl Resource {
    pub fn table(path: &str, table: &str, query: QueryConfig, fields: FieldMap) -> Self {
        Self::new(path, Source::Table(table.to_string()), query, fields)
    }

    pub fn function(path: &str, function: &str, query: QueryConfig, fields: FieldMap) -> Self {
        Self::new(path, Source::Function(function.to_string()), query, fields)
    }

    fn new(path: &str, source: Source, query: QueryConfig, fields: FieldMap) -> Self {
        Self { path: path.to_string(), source, query, fields, aggregation: None }
    }

    pub fn aggregatable(mut self, spec: AggregationSpec) -> Self {
        self.aggregation = Some(spec);
        self
    }

    /// Validation message naming every required parameter
    pub fn required_message(&self) -> String {
        match self.query.required_params().as_slice() {
            [] => format!("invalid request for /api/{}", self.path),
            [only] => format!("{} is required", only),
            [init @ .., last] => format!("{} and {} are required", init.join(", "), last),
        }
    }
}

/// All mounted resources, looked up by path
#[derive(Debug, Clone, Default)]
pub struct ResourceCatalog {
    resources: Vec<Resource>,
}

impl ResourceCatalog {
    pub fn new(resources: Vec<Resource>) -> Self {
        Self { resources }
    }

    pub fn get(&self, path: &str) -> Option<&Resource> {
        self.resources.iter().find(|r| r.path == path)
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Reject inconsistent declarations before serving
    pub fn validate(&self) -> GatewayResult<()> {
        let mut seen = HashSet::new();
        for resource in &self.resources {
            let query = &resource.query;
            if !seen.insert(resource.path.as_str()) {
                let message = format!("duplicate resource path: {}", resource.path);
                return Err(GatewayError::config(message));
            }
            let (min, default, max) = (query.min_limit, query.default_limit, query.max_limit);
            if min == 0 || min > default || default > max {
                return Err(GatewayError::config(format!(
                    "{}: limits must satisfy 1 <= min ({}) <= default ({}) <= max ({})",
                    resource.path, query.min_limit, query.default_limit, query.max_limit
                )));
            }
            if let Some(spec) = &resource.aggregation {
                if spec.scan_batch == 0 || spec.max_scan_rows < spec.scan_batch as usize {
                    return Err(GatewayError::config(format!(
                        "{}: scan batch {} must be at least 1 and at most max scan rows {}",
                        resource.path, spec.scan_batch, spec.max_scan_rows
                    )));
                }
            }
        }
        Ok(())
    }

    /// The BankrollKings endpoint set
    pub fn standard() -> Self {
        Self::new(vec![
            player_stats(),
            props_lines(),
            injuries(),
            weather(),
            consensus_bets(),
            team_metrics(),
            power_ratings(),
            game_scripts(),
            odds_history(),
            events(),
            pbp_2024(),
            user_watchlist(),
            situational_leaderboard(),
            wr_vs_cb(),
            player_situations(),
            prop_hit_rate(),
        ])
    }
}

fn season() -> ParamSpec {
    ParamSpec::integer("season", "season")
}

fn week() -> ParamSpec {
    ParamSpec::integer("week", "week")
}

fn player_name() -> FieldSpec {
    FieldSpec::text("player_name", &["full_name", "player_name", "name"], "N/A")
}

fn team() -> FieldSpec {
    FieldSpec::text("team", &["team_abbr", "team"], "N/A")
}

fn player_stats() -> Resource {
    Resource::table(
        "player-stats",
        "player_stats",
        QueryConfig::new(50, 200)
            .param(season())
            .param(week())
            .param(ParamSpec::code("team", "team").alias("team_abbr"))
            .param(ParamSpec::one_of("position", "position", POSITIONS))
            .sort_by(&["updated_at", "created_at", "id"])
            .sortable(&["season", "week", "fantasy_points"]),
        FieldMap::new()
            .field(player_name())
            .field(team())
            .field(FieldSpec::text("position", &["position"], "N/A"))
            .field(FieldSpec::integer("season", &["season"], 0))
            .field(FieldSpec::integer("week", &["week"], 0))
            .keep_unmapped(),
    )
}

fn props_lines() -> Resource {
    Resource::table(
        "props-lines",
        "props_lines",
        QueryConfig::new(20, 200)
            .param(season())
            .param(week())
            .param(ParamSpec::one_of("propType", "prop_type", PROP_TYPES).alias("prop_type"))
            .param(ParamSpec::text("player", "player_name"))
            .sort_by(&["created_at", "updated_at", "id"])
            .sortable(&["line", "week"]),
        FieldMap::new()
            .field(player_name())
            .field(FieldSpec::text("prop_type", &["prop_type", "market"], "unknown"))
            .field(FieldSpec::number("line", &["line", "prop_line"], 0.0))
            .keep_unmapped(),
    )
}

fn injuries() -> Resource {
    Resource::table(
        "injuries",
        "injuries",
        QueryConfig::new(20, 200)
            .param(ParamSpec::code("team", "team").alias("team_abbr"))
            .param(ParamSpec::one_of("status", "status", INJURY_STATUSES))
            .param(season())
            .param(week())
            .sort_by(&["updated_at", "created_at", "id"]),
        FieldMap::new()
            .field(player_name())
            .field(team())
            .field(FieldSpec::text("status", &["status", "injury_status"], "unknown"))
            .keep_unmapped(),
    )
}

fn weather() -> Resource {
    Resource::table(
        "weather",
        "weather",
        QueryConfig::new(50, 200)
            .param(season())
            .param(week())
            .param(ParamSpec::code("team", "team").alias("team_abbr"))
            .sort_by(&["game_date", "created_at", "id"]),
        FieldMap::new()
            .field(team())
            .field(FieldSpec::number("temperature", &["temperature", "temp_f"], 0.0))
            .field(FieldSpec::number("wind_mph", &["wind_mph", "wind_speed"], 0.0))
            .field(FieldSpec::boolean("dome", &["dome", "is_dome"], false))
            .keep_unmapped(),
    )
}

fn consensus_bets() -> Resource {
    Resource::table(
        "consensus-bets",
        "consensus_bets",
        QueryConfig::new(50, 200)
            .param(season())
            .param(week())
            .param(ParamSpec::one_of("market", "market", MARKETS))
            .sort_by(&["created_at", "updated_at", "id"]),
        FieldMap::new().keep_unmapped(),
    )
}

fn team_metrics() -> Resource {
    Resource::table(
        "team-metrics",
        "team_metrics",
        QueryConfig::new(32, 64)
            .param(ParamSpec::code("team", "team_id").alias("team_id"))
            .sort_by(&["team_id"])
            .ascending(),
        FieldMap::new()
            .field(FieldSpec::text("team_id", &["team_id", "team_abbr", "team"], "N/A"))
            .field(FieldSpec::number("redzone_pct", &[], 0.0))
            .field(FieldSpec::number("goal_line_td_pct", &[], 0.0))
            .field(FieldSpec::number("third_down_stop_pct", &[], 0.0)),
    )
}

fn power_ratings() -> Resource {
    Resource::table(
        "power-ratings",
        "power_ratings",
        QueryConfig::new(32, 64).param(season()).param(week()).sort_by(&["rating", "id"]),
        FieldMap::new()
            .field(FieldSpec::text("team", &["team_abbr", "team", "team_id"], "N/A"))
            .field(FieldSpec::number("rating", &["rating", "power_rating"], 0.0))
            .keep_unmapped(),
    )
}

fn game_scripts() -> Resource {
    Resource::table(
        "game-scripts",
        "game_scripts",
        QueryConfig::new(50, 200)
            .param(season())
            .param(week())
            .param(ParamSpec::code("team", "team").alias("team_abbr"))
            .sort_by(&["game_id", "id"]),
        FieldMap::new().keep_unmapped(),
    )
}

fn odds_history() -> Resource {
    Resource::table(
        "odds-history",
        "odds_history",
        QueryConfig::new(50, 200)
            .param(ParamSpec::text("game_id", "game_id").alias("gameId"))
            .param(ParamSpec::text("book", "book").alias("sportsbook"))
            .sort_by(&["created_at", "updated_at", "id"]),
        FieldMap::new().keep_unmapped(),
    )
}

fn events() -> Resource {
    Resource::table(
        "events",
        "events",
        QueryConfig::new(20, 200).param(season()).param(week()).sort_by(&["created_at", "id"]),
        FieldMap::new().keep_unmapped(),
    )
}

fn pbp_2024() -> Resource {
    Resource::table(
        "pbp-2024",
        "pbp_2024",
        QueryConfig::new(50, 200)
            .param(ParamSpec::text("game_id", "game_id").alias("gameId"))
            .param(week())
            .param(ParamSpec::code("posteam", "posteam"))
            .param(ParamSpec::code("defteam", "defteam"))
            .param(ParamSpec::text("play_type", "play_type").alias("playType"))
            .sort_by(&["play_id", "id"]),
        FieldMap::new().keep_unmapped(),
    )
}

fn user_watchlist() -> Resource {
    Resource::table(
        "user-watchlist",
        "user_watchlist",
        QueryConfig::new(50, 200)
            .param(ParamSpec::text("userId", "user_id").alias("user_id"))
            .sort_by(&["created_at", "id"]),
        FieldMap::new().keep_unmapped(),
    )
}

fn situational_leaderboard() -> Resource {
    Resource::table(
        "situations/leaderboard",
        "v_situational_leaderboard",
        QueryConfig::new(25, 200)
            .param(ParamSpec::one_of("position", "position", POSITIONS))
            .param(ParamSpec::code("team", "team_abbr").alias("team_abbr").or_column("team"))
            .param(ParamSpec::one_of("category", "category", DEF_CATEGORIES).alias("defCat"))
            .param(
                ParamSpec::one_of("defTier", "def_tier", DEF_TIERS)
                    .alias("tier")
                    .alias("defense_tier")
                    .or_column("defense_tier"),
            )
            .param(season().alias("year"))
            .param(ParamSpec::integer("seasonFrom", "season").at_least())
            .param(ParamSpec::integer("seasonTo", "season").at_most())
            .param(
                ParamSpec::integer("min_yards", "total_yards")
                    .alias("minYards")
                    .or_column("total")
                    .at_least()
                    .on_aggregate("total"),
            )
            .param(
                ParamSpec::integer("max_yards", "total_yards")
                    .alias("maxYards")
                    .or_column("total")
                    .at_most()
                    .on_aggregate("total"),
            )
            .param(
                ParamSpec::integer("min_games", "games")
                    .alias("minGames")
                    .at_least()
                    .on_aggregate("games"),
            )
            .sort_by(&["per_game", "total_yards", "total"])
            .sortable(&["per_game", "total_yards", "games", "season"]),
        FieldMap::new()
            .field(FieldSpec::text("player_id", &["player_id"], "unknown"))
            .field(player_name())
            .field(FieldSpec::text("position", &["position"], "N/A"))
            .field(team())
            .field(FieldSpec::integer("season", &["season"], 0))
            .field(FieldSpec::text("category", &["category"], "unknown"))
            .field(FieldSpec::text("defense_tier", &["def_tier", "defense_tier"], "unknown"))
            .field(FieldSpec::integer("games", &["games"], 1))
            .field(FieldSpec::number("total", &["total_yards", "total", "yards"], 0.0))
            .field(FieldSpec::number("per_game", &["per_game", "avg_per_attempt"], 0.0)),
    )
    .aggregatable(AggregationSpec {
        key: vec!["player_name".to_string(), "team".to_string(), "season".to_string()],
        reducer: Reducer::new()
            .sum(&["games", "total"])
            .ratio("per_game", "total", "games", Some(1))
            .set("defense_tier", FieldValue::Text("aggregated".to_string())),
        sort_field: "total".to_string(),
        sort_direction: SortDirection::Desc,
        scan_batch: 1000,
        max_scan_rows: 50_000,
    })
}

fn wr_vs_cb() -> Resource {
    Resource::table(
        "matchups/wr-vs-cb",
        "wr_cb_matchups",
        QueryConfig::new(25, 100)
            .param(ParamSpec::text("wr", "wr_name").required())
            .param(ParamSpec::text("cb", "cb_name").required())
            .param(season())
            .param(week())
            .sort_by(&["week", "game_date", "created_at"]),
        FieldMap::new()
            .field(FieldSpec::text("wr", &["wr_name", "wr"], "N/A"))
            .field(FieldSpec::text("cb", &["cb_name", "cb"], "N/A"))
            .field(FieldSpec::integer("season", &["season"], 0))
            .field(FieldSpec::integer("week", &["week"], 0))
            .field(FieldSpec::integer("targets", &["targets"], 0))
            .field(FieldSpec::integer("receptions", &["receptions", "rec"], 0))
            .field(FieldSpec::number("yards", &["yards", "rec_yds"], 0.0))
            .keep_unmapped(),
    )
}

fn player_id() -> ParamSpec {
    ParamSpec::uuid("playerId", "p_player_id").required().alias("player_id")
}

/// Filters shared by both situational functions
fn situational_params(query: QueryConfig) -> QueryConfig {
    query
        .param(ParamSpec::integer("seasonFrom", "p_season_from").required())
        .param(ParamSpec::integer("seasonTo", "p_season_to").required())
        .param(ParamSpec::one_of("defCat", "p_def_cat", DEF_CATEGORIES))
        .param(ParamSpec::one_of("tier", "p_def_tier", DEF_TIERS).alias("defTier"))
        .param(ParamSpec::boolean("prime", "p_prime_only"))
        .param(ParamSpec::boolean("dome", "p_dome_only"))
        .param(ParamSpec::boolean("windy", "p_windy_only"))
}

fn player_situations() -> Resource {
    let query = situational_params(QueryConfig::new(100, 500).param(player_id()))
        .param(ParamSpec::one_of("homeAway", "p_home_away", &["home", "away"]))
        .param(ParamSpec::code("opponent", "p_opponent"));

    let map = FieldMap::new().keep_unmapped();
    Resource::function("situations/player", "api_get_player_situational_stats", query, map)
}

fn prop_hit_rate() -> Resource {
    let query = situational_params(
        QueryConfig::new(100, 500)
            .param(player_id())
            .param(
                ParamSpec::one_of("propType", "p_prop_type", PROP_TYPES)
                    .required()
                    .alias("prop_type"),
            ),
    );

    let map = FieldMap::new().keep_unmapped();
    Resource::function("props/hit-rate", "api_prop_hit_rate", query, map)
}
