pub mod api;
pub mod clock;
pub mod config;
pub mod error;
pub mod grouping;
pub mod identity;
pub mod metrics_defs;
pub mod read_cache;
pub mod sqlite_store;
pub mod store;
pub mod sync_engine;
pub mod throttle;
pub mod types;
pub mod upstream;

#[cfg(test)]
mod testutils;

use crate::clock::SystemClock;
use crate::config::{Config, StoreConfig, ValidationError};
use crate::read_cache::MokaReadCache;
use crate::sqlite_store::SqliteCharacterStore;
use crate::store::{CharacterStore, MemoryCharacterStore, StoreError};
use crate::sync_engine::SyncEngine;
use crate::throttle::IntervalThrottle;
use crate::upstream::{NexonClient, UpstreamError};
use shared::admin_service::AdminService;
use shared::http::run_http_service;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(thiserror::Error, Debug)]
pub enum RosterError {
    #[error("invalid config: {0}")]
    Config(#[from] ValidationError),
    #[error("store setup failed: {0}")]
    Store(#[from] StoreError),
    #[error("upstream client setup failed: {0}")]
    Upstream(#[from] UpstreamError),
    #[error("api error: {0}")]
    Api(#[from] api::RosterApiError),
    #[error("admin listener error: {0}")]
    Admin(#[from] std::io::Error),
}

/// Wires a `SyncEngine` from config: Nexon client, the configured store,
/// the Moka read cache and the seed throttle.
pub async fn build_engine(config: &Config) -> Result<SyncEngine, RosterError> {
    config.validate()?;

    let upstream = NexonClient::new(
        config.upstream.base_url(),
        config.upstream.api_key.clone(),
        config.upstream.timeout(),
    )?;

    let store: Arc<dyn CharacterStore> = match &config.store {
        StoreConfig::Memory => {
            tracing::warn!("using in-memory store; records are lost on restart");
            Arc::new(MemoryCharacterStore::new())
        }
        StoreConfig::Sqlite { url } => Arc::new(SqliteCharacterStore::connect(url).await?),
    };

    let cache = MokaReadCache::new(config.cache.max_records, config.cache.max_groups);

    Ok(SyncEngine::new(
        Arc::new(upstream),
        store,
        Arc::new(cache),
        Arc::new(IntervalThrottle::new(config.sync.seed_cooldown())),
        Arc::new(SystemClock),
    )
    .with_max_union_fanout(config.sync.max_union_fanout))
}

/// Serves the public API and the admin listener until either fails.
pub async fn run(config: Config) -> Result<(), RosterError> {
    let engine = Arc::new(build_engine(&config).await?);
    let ready = Arc::new(AtomicBool::new(false));

    let listener = api::bind(&config.listener).await?;
    ready.store(true, Ordering::Relaxed);

    let api_task = async { api::serve(listener, engine).await.map_err(RosterError::from) };

    let admin_ready = Arc::clone(&ready);
    let admin_service = AdminService::new(move || admin_ready.load(Ordering::Relaxed));
    let admin_task = async {
        run_http_service(
            &config.admin_listener.host,
            config.admin_listener.port,
            admin_service,
        )
        .await
        .map_err(RosterError::from)
    };

    let result = tokio::try_join!(api_task, admin_task).map(|_| ());
    ready.store(false, Ordering::Relaxed);
    result
}
