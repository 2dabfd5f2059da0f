use std::sync::Arc;

use complyd_cache::{CategoryRegistry, RedisCache};
use complyd_core::{DataAccessError, DataLayerSettings, Result};
use complyd_pool::{ConnectionPoolManager, PoolConfig, PoolHealthReport, QueryExecutor};
use serde::Serialize;

use crate::optimizer::{QueryOptimizer, ResultCache};

/// Combined health of the layer's collaborators.
#[derive(Debug, Clone, Serialize)]
pub struct LayerHealth {
    pub database: PoolHealthReport,
    pub cache_ok: bool,
    pub healthy: bool,
}

/// Composition root for the data-access layer.
///
/// Owns the pool manager, the cache facade, and the optimizer wired to
/// both. Lifecycle is explicit: build at startup with
/// [`initialize`](Self::initialize), tear down with
/// [`shutdown`](Self::shutdown). There is no module-level state.
pub struct DataAccessLayer {
    pool: Arc<ConnectionPoolManager>,
    cache: Arc<RedisCache>,
    optimizer: QueryOptimizer,
}

impl DataAccessLayer {
    /// Connects the cache, builds and initializes both pools, starts
    /// health monitoring, and wires the optimizer.
    pub async fn initialize(settings: DataLayerSettings) -> Result<Self> {
        let registry = CategoryRegistry::with_namespace(&settings.cache.namespace);
        let cache = Arc::new(RedisCache::connect(&settings.cache.url, registry).await?);

        let pool_config = PoolConfig::from_settings(&settings.database);
        let pool = Arc::new(ConnectionPoolManager::new(
            settings.database_url(),
            pool_config,
        ));
        pool.initialize_async_pool().await?;
        {
            let pool = Arc::clone(&pool);
            tokio::task::spawn_blocking(move || pool.initialize_sync_pool())
                .await
                .map_err(|err| {
                    DataAccessError::Execution(format!("sync pool initialization failed: {}", err))
                })??;
        }
        pool.start_monitoring().await;

        let optimizer = QueryOptimizer::from_settings(
            Arc::clone(&pool) as Arc<dyn QueryExecutor>,
            Arc::clone(&cache) as Arc<dyn ResultCache>,
            &settings.optimizer,
        );

        tracing::info!("data-access layer initialized");
        Ok(Self {
            pool,
            cache,
            optimizer,
        })
    }

    /// Direct pool access, e.g. for writes, which never go through the
    /// optimizer's cache path.
    pub fn pool(&self) -> &Arc<ConnectionPoolManager> {
        &self.pool
    }

    pub fn cache(&self) -> &Arc<RedisCache> {
        &self.cache
    }

    pub fn optimizer(&self) -> &QueryOptimizer {
        &self.optimizer
    }

    pub async fn health(&self) -> LayerHealth {
        let database = self.pool.health_check().await;
        let cache_ok = self.cache.ping().await;
        LayerHealth {
            healthy: database.healthy && cache_ok,
            database,
            cache_ok,
        }
    }

    /// Stops background work and closes the pools. No monitor task
    /// survives this call.
    pub async fn shutdown(&self) {
        self.pool.close().await;
        tracing::info!("data-access layer shut down");
    }
}
