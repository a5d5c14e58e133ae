//! Stats Query - the query-and-normalize pipeline behind every stats endpoint
//!
//! Request parameters are normalized into a [`FilterSet`], executed against a
//! [`StatsStore`] through the drift-tolerant ordering resolver, projected onto a
//! stable output shape and optionally collapsed into one row per entity.

pub mod aggregation;
pub mod error;
pub mod filter;
pub mod normalizer;
pub mod ordering;
pub mod projection;
pub mod query;
pub mod store;

pub use aggregation::{aggregate, identity_key, sort_rows, DerivedField, Reducer};
pub use error::{StoreError, StoreResult};
pub use filter::{Comparison, FieldFilter, FilterSet, FilterValue, SortDirection};
pub use normalizer::{normalize, parse_limit, parse_offset, ParamKind, ParamSpec, QueryConfig};
pub use ordering::{fetch_ordered, scan_ordered};
pub use projection::{project, FieldKind, FieldMap, FieldSpec, FieldValue, NormalizedRow};
pub use query::{FunctionCall, OrderBy, TableQuery};
pub use store::memory::MemoryStore;
pub use store::postgres::PgStore;
pub use store::rest::RestStore;
pub use store::{RawRow, StatsStore};
