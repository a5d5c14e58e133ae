//! Stats Gateway - HTTP surface of the BankrollKings NFL stats API
//!
//! Mounts every resource of the [`ResourceCatalog`] under `/api/`, runs each
//! request through the `stats-query` pipeline and wraps the result in a uniform
//! JSON envelope.

pub mod config;
pub mod error;
pub mod handler;
pub mod logging;
pub mod resources;
pub mod rest_api;
pub mod signals;
pub mod state;

pub use config::{DashboardConfig, LoggingConfig, ServerConfig, StoreBackend, StoreConfig};
pub use error::{GatewayError, GatewayResult};
pub use handler::{handle, Page};
pub use logging::initialize_logging;
pub use resources::{AggregationSpec, Resource, ResourceCatalog, Source};
pub use rest_api::create_routes;
pub use signals::shutdown_signal;
pub use state::{connect_store, ApiState};
