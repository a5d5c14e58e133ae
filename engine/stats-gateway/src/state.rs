//! Shared request state and store construction

use crate::config::{StoreBackend, StoreConfig};
use crate::error::{GatewayError, GatewayResult};
use crate::resources::ResourceCatalog;
use stats_query::{MemoryStore, PgStore, RestStore, StatsStore};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Everything a request needs; built once at startup and shared read-only
pub struct ApiState {
    pub store: Arc<dyn StatsStore>,
    pub catalog: ResourceCatalog,
}

impl ApiState {
    pub fn new(store: Arc<dyn StatsStore>, catalog: ResourceCatalog) -> Self {
        Self { store, catalog }
    }
}

/// Build the configured store backend
pub async fn connect_store(config: &StoreConfig) -> GatewayResult<Arc<dyn StatsStore>> {
    let store: Arc<dyn StatsStore> = match config.backend {
        StoreBackend::Postgres => {
            let url = config
                .database_url
                .as_deref()
                .ok_or_else(|| GatewayError::config("postgres backend requires DATABASE_URL"))?;
            Arc::new(PgStore::connect(url, config.max_connections).await?)
        }
        StoreBackend::Rest => {
            let url = config
                .rest_url
                .as_deref()
                .ok_or_else(|| GatewayError::config("rest backend requires SUPABASE_URL"))?;
            let key = config
                .api_key
                .as_deref()
                .ok_or_else(|| GatewayError::config("rest backend requires an API key"))?;
            Arc::new(RestStore::new(url, key, Duration::from_secs(config.request_timeout_secs))?)
        }
        StoreBackend::Memory => Arc::new(MemoryStore::load_fixture(&config.fixture_path).await?),
    };

    info!("Using {} stats store", store.backend_name());
    Ok(store)
}
