//! Query normalizer
//!
//! Turns raw query-string pairs into a [`FilterSet`]. Normalization is total:
//! malformed input degrades to defaults or is dropped, it never fails the
//! request. Required parameters that end up absent are reported through
//! [`FilterSet::missing_required`] for the caller to act on.

use crate::filter::{parse_flag, Comparison, FieldFilter, FilterSet, FilterValue, SortDirection};
use std::collections::HashMap;
use uuid::Uuid;

/// Names of the parameters every endpoint understands
pub const LIMIT_PARAM: &str = "limit";
pub const OFFSET_PARAM: &str = "offset";
pub const SORT_PARAMS: [&str; 2] = ["sort", "orderBy"];
pub const DIRECTION_PARAMS: [&str; 2] = ["dir", "direction"];
pub const AGGREGATE_PARAM: &str = "aggregate";

/// How a parameter value is validated and typed
#[derive(Debug, Clone, PartialEq)]
pub enum ParamKind {
    /// Free text, passed through trimmed
    Text,
    /// Free text, upper-cased (team abbreviations)
    Code,
    /// Must match one of the allowed values (case-insensitive); the
    /// allow-list spelling is what reaches the store
    Enum(Vec<String>),
    Integer,
    Boolean,
    Uuid,
}

/// Declaration of one filterable request parameter
#[derive(Debug, Clone, PartialEq)]
pub struct ParamSpec {
    /// Canonical parameter name
    pub name: String,
    /// Legacy names accepted for the same filter, in precedence order
    pub aliases: Vec<String>,
    /// Store column (or function argument) the filter applies to
    pub target: String,
    /// Columns tried in order when `target` is missing from the store
    pub fallbacks: Vec<String>,
    pub kind: ParamKind,
    pub comparison: Comparison,
    pub required: bool,
    /// Output field this filter is checked against after aggregation,
    /// instead of being sent to the store
    pub aggregate_field: Option<String>,
}

impl ParamSpec {
    fn new(name: &str, target: &str, kind: ParamKind) -> Self {
        Self {
            name: name.to_string(),
            aliases: Vec::new(),
            target: target.to_string(),
            fallbacks: Vec::new(),
            kind,
            comparison: Comparison::Eq,
            required: false,
            aggregate_field: None,
        }
    }

    pub fn text(name: &str, target: &str) -> Self {
        Self::new(name, target, ParamKind::Text)
    }

    pub fn code(name: &str, target: &str) -> Self {
        Self::new(name, target, ParamKind::Code)
    }

    pub fn one_of(name: &str, target: &str, allowed: &[&str]) -> Self {
        let allowed = allowed.iter().map(|v| v.to_string()).collect();
        Self::new(name, target, ParamKind::Enum(allowed))
    }

    pub fn integer(name: &str, target: &str) -> Self {
        Self::new(name, target, ParamKind::Integer)
    }

    pub fn boolean(name: &str, target: &str) -> Self {
        Self::new(name, target, ParamKind::Boolean)
    }

    pub fn uuid(name: &str, target: &str) -> Self {
        Self::new(name, target, ParamKind::Uuid)
    }

    pub fn alias(mut self, alias: &str) -> Self {
        self.aliases.push(alias.to_string());
        self
    }

    pub fn or_column(mut self, column: &str) -> Self {
        self.fallbacks.push(column.to_string());
        self
    }

    pub fn on_aggregate(mut self, field: &str) -> Self {
        self.aggregate_field = Some(field.to_string());
        self
    }

    pub fn at_least(mut self) -> Self {
        self.comparison = Comparison::Gte;
        self
    }

    pub fn at_most(mut self) -> Self {
        self.comparison = Comparison::Lte;
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Canonical name first, then aliases in declaration order
    fn names(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.name.as_str()).chain(self.aliases.iter().map(String::as_str))
    }

    /// Validate and type a raw value; `None` means "treat as absent"
    fn coerce(&self, raw: &str) -> Option<FilterValue> {
        match &self.kind {
            ParamKind::Text => Some(FilterValue::Text(raw.to_string())),
            ParamKind::Code => Some(FilterValue::Text(raw.to_uppercase())),
            ParamKind::Enum(allowed) => allowed
                .iter()
                .find(|candidate| candidate.eq_ignore_ascii_case(raw))
                .map(|candidate| FilterValue::Text(candidate.clone())),
            ParamKind::Integer => raw.parse::<i64>().ok().map(FilterValue::Integer),
            ParamKind::Boolean => parse_flag(raw).map(FilterValue::Boolean),
            ParamKind::Uuid => Uuid::parse_str(raw).ok().map(FilterValue::Uuid),
        }
    }
}

/// Per-endpoint normalizer configuration
#[derive(Debug, Clone, PartialEq)]
pub struct QueryConfig {
    pub default_limit: u32,
    pub min_limit: u32,
    pub max_limit: u32,
    pub params: Vec<ParamSpec>,
    /// Default sort-column candidates, tried in order
    pub sort_candidates: Vec<String>,
    /// Columns a caller may ask to sort by through `sort`
    pub sortable: Vec<String>,
    pub direction: SortDirection,
    /// Value of `aggregate` when the request does not say
    pub aggregate_default: bool,
}

impl QueryConfig {
    /// Limit bounds `[1, max_limit]` with the given default
    pub fn new(default_limit: u32, max_limit: u32) -> Self {
        Self {
            default_limit,
            min_limit: 1,
            max_limit,
            params: Vec::new(),
            sort_candidates: Vec::new(),
            sortable: Vec::new(),
            direction: SortDirection::Desc,
            aggregate_default: false,
        }
    }

    pub fn param(mut self, spec: ParamSpec) -> Self {
        self.params.push(spec);
        self
    }

    pub fn sort_by(mut self, candidates: &[&str]) -> Self {
        self.sort_candidates = candidates.iter().map(|c| c.to_string()).collect();
        self
    }

    pub fn sortable(mut self, columns: &[&str]) -> Self {
        self.sortable = columns.iter().map(|c| c.to_string()).collect();
        self
    }

    pub fn ascending(mut self) -> Self {
        self.direction = SortDirection::Asc;
        self
    }

    /// Output field a parameter filters on once rows are aggregated
    pub fn aggregate_field(&self, param: &str) -> Option<&str> {
        self.params.iter().find(|p| p.name == param).and_then(|p| p.aggregate_field.as_deref())
    }

    /// Canonical names of all required parameters, in declaration order
    pub fn required_params(&self) -> Vec<&str> {
        self.params.iter().filter(|p| p.required).map(|p| p.name.as_str()).collect()
    }
}

/// Normalize raw request parameters against an endpoint configuration
pub fn normalize(raw: &HashMap<String, String>, config: &QueryConfig) -> FilterSet {
    let limit = parse_limit(
        lookup(raw, &[LIMIT_PARAM]),
        config.default_limit,
        config.min_limit,
        config.max_limit,
    );
    let offset = parse_offset(lookup(raw, &[OFFSET_PARAM]));

    let mut filters = Vec::new();
    let mut missing_required = Vec::new();
    for spec in &config.params {
        let names: Vec<&str> = spec.names().collect();
        match lookup(raw, &names).and_then(|value| spec.coerce(value)) {
            Some(value) => filters.push(FieldFilter {
                param: spec.name.clone(),
                target: spec.target.clone(),
                fallbacks: spec.fallbacks.clone(),
                comparison: spec.comparison,
                value,
            }),
            None if spec.required => missing_required.push(spec.name.clone()),
            None => {}
        }
    }

    let mut sort_hints: Vec<String> = Vec::with_capacity(config.sort_candidates.len() + 1);
    if let Some(preferred) = lookup(raw, &SORT_PARAMS) {
        if let Some(column) = config.sortable.iter().find(|c| c.as_str() == preferred) {
            sort_hints.push(column.clone());
        }
    }
    for candidate in &config.sort_candidates {
        if !sort_hints.contains(candidate) {
            sort_hints.push(candidate.clone());
        }
    }

    let direction =
        lookup(raw, &DIRECTION_PARAMS).and_then(SortDirection::parse).unwrap_or(config.direction);
    let aggregate =
        lookup(raw, &[AGGREGATE_PARAM]).and_then(parse_flag).unwrap_or(config.aggregate_default);

    FilterSet { limit, offset, filters, sort_hints, direction, aggregate, missing_required }
}

/// Parse and clamp a `limit` value.
///
/// Absent, non-numeric, non-finite or sub-1 input yields `default`; the result
/// is always within `[min, max]`. Fractional input is truncated.
pub fn parse_limit(raw: Option<&str>, default: u32, min: u32, max: u32) -> u32 {
    let min = min.max(1);
    let max = max.max(min);
    let parsed = raw
        .and_then(|s| s.trim().parse::<f64>().ok())
        .filter(|n| n.is_finite() && *n >= 1.0)
        .map(|n| n.trunc().min(u32::MAX as f64) as u32);
    parsed.unwrap_or(default).clamp(min, max)
}

/// Parse an `offset`; anything absent, malformed or negative is 0
pub fn parse_offset(raw: Option<&str>) -> u32 {
    raw.and_then(|s| s.trim().parse::<f64>().ok())
        .filter(|n| n.is_finite() && *n >= 0.0)
        .map(|n| n.trunc().min(u32::MAX as f64) as u32)
        .unwrap_or(0)
}

/// First non-empty value among `names`, in order
fn lookup<'a>(raw: &'a HashMap<String, String>, names: &[&str]) -> Option<&'a str> {
    names.iter().filter_map(|name| raw.get(*name)).map(|v| v.trim()).find(|v| !v.is_empty())
}
