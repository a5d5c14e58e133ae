//! Store-agnostic query descriptions

use crate::filter::{FieldFilter, FilterSet, FilterValue, SortDirection};

/// A filtered, paged read against one table or view
#[derive(Debug, Clone, PartialEq)]
pub struct TableQuery {
    /// Table or view name, optionally schema-qualified
    pub source: String,
    pub filters: Vec<FieldFilter>,
    pub limit: Option<u32>,
    pub offset: u32,
}

impl TableQuery {
    pub fn new(source: impl Into<String>) -> Self {
        Self { source: source.into(), filters: Vec::new(), limit: None, offset: 0 }
    }

    /// Query carrying the filters and page of a normalized request
    pub fn from_filter_set(source: impl Into<String>, set: &FilterSet) -> Self {
        Self::new(source).with_filters(set.filters.clone()).limit(set.limit).offset(set.offset)
    }

    pub fn with_filters(mut self, filters: Vec<FieldFilter>) -> Self {
        self.filters = filters;
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u32) -> Self {
        self.offset = offset;
        self
    }
}

/// Sort clause for a [`TableQuery`]; nulls always sort last
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    pub column: String,
    pub direction: SortDirection,
}

impl OrderBy {
    pub fn new(column: impl Into<String>, direction: SortDirection) -> Self {
        Self { column: column.into(), direction }
    }
}

/// Invocation of a set-returning store function (RPC)
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionCall {
    pub function: String,
    /// Named arguments; `None` is passed as SQL `NULL`
    pub args: Vec<(String, Option<FilterValue>)>,
    pub limit: Option<u32>,
    pub offset: u32,
}

impl FunctionCall {
    pub fn new(function: impl Into<String>) -> Self {
        Self { function: function.into(), args: Vec::new(), limit: None, offset: 0 }
    }

    pub fn arg(mut self, name: impl Into<String>, value: Option<FilterValue>) -> Self {
        self.args.push((name.into(), value));
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u32) -> Self {
        self.offset = offset;
        self
    }
}
