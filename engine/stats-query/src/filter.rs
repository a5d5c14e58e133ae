//! Filter set produced by the query normalizer

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// A validated filter value, typed by its parameter declaration
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FilterValue {
    Text(String),
    Integer(i64),
    Boolean(bool),
    Uuid(Uuid),
}

impl FilterValue {
    /// JSON rendering used for REST function arguments
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            FilterValue::Text(s) => serde_json::Value::String(s.clone()),
            FilterValue::Integer(n) => serde_json::Value::from(*n),
            FilterValue::Boolean(b) => serde_json::Value::Bool(*b),
            FilterValue::Uuid(id) => serde_json::Value::String(id.to_string()),
        }
    }
}

impl fmt::Display for FilterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterValue::Text(s) => write!(f, "{}", s),
            FilterValue::Integer(n) => write!(f, "{}", n),
            FilterValue::Boolean(b) => write!(f, "{}", b),
            FilterValue::Uuid(id) => write!(f, "{}", id),
        }
    }
}

/// Predicate applied between a column and a filter value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Comparison {
    #[default]
    Eq,
    Gte,
    Lte,
}

impl Comparison {
    pub fn sql_operator(self) -> &'static str {
        match self {
            Comparison::Eq => "=",
            Comparison::Gte => ">=",
            Comparison::Lte => "<=",
        }
    }

    /// PostgREST horizontal filter operator
    pub fn postgrest_operator(self) -> &'static str {
        match self {
            Comparison::Eq => "eq",
            Comparison::Gte => "gte",
            Comparison::Lte => "lte",
        }
    }
}

/// One resolved filter: `column <comparison> value`
#[derive(Debug, Clone, PartialEq)]
pub struct FieldFilter {
    /// Canonical request parameter this filter came from
    pub param: String,
    /// Store column (or function argument) it targets
    pub target: String,
    /// Columns to retarget to, in order, when `target` is missing from the store
    pub fallbacks: Vec<String>,
    pub comparison: Comparison,
    pub value: FilterValue,
}

impl FieldFilter {
    pub fn new(param: &str, target: &str, comparison: Comparison, value: FilterValue) -> Self {
        Self {
            param: param.to_string(),
            target: target.to_string(),
            fallbacks: Vec::new(),
            comparison,
            value,
        }
    }

    pub fn or_column(mut self, column: &str) -> Self {
        self.fallbacks.push(column.to_string());
        self
    }

    /// Move to the next fallback column; `false` once none are left
    pub fn retarget(&mut self) -> bool {
        if self.fallbacks.is_empty() {
            return false;
        }
        self.target = self.fallbacks.remove(0);
        true
    }

    /// Whether a numeric value satisfies this filter
    pub fn accepts_number(&self, number: f64) -> bool {
        let bound = match &self.value {
            FilterValue::Integer(n) => *n as f64,
            _ => return false,
        };
        match self.comparison {
            Comparison::Eq => number == bound,
            Comparison::Gte => number >= bound,
            Comparison::Lte => number <= bound,
        }
    }
}

/// Sort direction for ordered fetches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    #[default]
    Desc,
}

impl SortDirection {
    /// Parse a request-supplied direction (`asc`/`desc`, case-insensitive)
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "asc" | "ascending" => Some(SortDirection::Asc),
            "desc" | "descending" => Some(SortDirection::Desc),
            _ => None,
        }
    }

    pub fn is_ascending(self) -> bool {
        matches!(self, SortDirection::Asc)
    }
}

/// Validated, clamped request filters for one endpoint call
#[derive(Debug, Clone, PartialEq)]
pub struct FilterSet {
    /// Always within the endpoint's `[min_limit, max_limit]`
    pub limit: u32,
    pub offset: u32,
    pub filters: Vec<FieldFilter>,
    /// Ordered sort-column candidates, caller preference first
    pub sort_hints: Vec<String>,
    pub direction: SortDirection,
    pub aggregate: bool,
    /// Canonical names of required parameters that were absent or invalid
    pub missing_required: Vec<String>,
}

impl FilterSet {
    /// Value of a filter by canonical parameter name
    pub fn value(&self, param: &str) -> Option<&FilterValue> {
        self.filters.iter().find(|f| f.param == param).map(|f| &f.value)
    }

    pub fn has(&self, param: &str) -> bool {
        self.value(param).is_some()
    }

    pub fn is_complete(&self) -> bool {
        self.missing_required.is_empty()
    }
}

/// Parse a loose boolean flag (`true/false`, `t/f`, `1/0`, `yes/no`)
pub fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "t" | "1" | "yes" | "y" | "on" => Some(true),
        "false" | "f" | "0" | "no" | "n" | "off" => Some(false),
        _ => None,
    }
}
