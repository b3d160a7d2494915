//! Tenant Registry (C12): lazy, race-free provisioning of per-tenant engines.
//!
//! Tenants are never pre-registered — the first request (or admin call)
//! naming a tenant slug causes its [`TenantEngine`] to be built: a SQLite
//! connection opened at `storage.tenant_db_path(tenant)` and a fresh
//! [`RateLimiter`] sized by `rate_limit.window_secs`. Concurrent first
//! requests for the same never-seen tenant must not open the database
//! twice or race on which `TenantEngine` wins; `tokio::sync::OnceCell`
//! behind a `DashMap` entry gives every concurrent caller the same
//! in-flight future instead.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::OnceCell;

use crate::config::Config;
use crate::engine::TenantEngine;
use crate::error::Result;
use crate::ids::TenantId;
use crate::ratelimit::RateLimiter;
use crate::store::Store;

pub struct TenantRegistry {
    config: Arc<Config>,
    engines: DashMap<TenantId, Arc<OnceCell<Arc<TenantEngine>>>>,
}

impl TenantRegistry {
    pub fn new(config: Arc<Config>) -> Self {
        Self { config, engines: DashMap::new() }
    }

    /// Returns the tenant's engine, provisioning it on first use.
    ///
    /// Safe under concurrent calls for the same `tenant`: only the first
    /// caller to reach an empty slot actually connects to the database;
    /// every other concurrent caller awaits that same connection attempt.
    pub async fn get_or_create(&self, tenant: &TenantId) -> Result<Arc<TenantEngine>> {
        let cell = self
            .engines
            .entry(tenant.clone())
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone();

        let engine = cell
            .get_or_try_init(|| async {
                let path = self.config.storage.tenant_db_path(tenant.as_str());
                let store = Store::connect(&path).await?;
                let limiter = RateLimiter::new(self.config.rate_limit.window());
                Ok::<_, crate::error::Error>(Arc::new(TenantEngine::new(store, limiter)))
            })
            .await?;

        Ok(engine.clone())
    }

    /// Returns the tenant's engine only if it has already been provisioned,
    /// without creating it. Used by the admin surface's log/rule listing,
    /// where a never-seen tenant should read as empty rather than silently
    /// creating a database file on disk.
    pub fn get_existing(&self, tenant: &TenantId) -> Option<Arc<TenantEngine>> {
        self.engines.get(tenant)?.get().cloned()
    }

    /// The number of tenants provisioned so far (including ones whose
    /// provisioning is still in flight).
    pub fn tenant_count(&self) -> usize {
        self.engines.len()
    }

    /// Sweeps expired rate-limit counters across every provisioned tenant.
    /// Intended to run on a periodic interval for the lifetime of the
    /// process (see [`spawn_rate_limit_sweeper`]).
    pub fn sweep_all(&self) {
        for entry in self.engines.iter() {
            if let Some(engine) = entry.value().get() {
                engine.sweep_rate_limiter();
            }
        }
    }
}

/// Spawns a background task that periodically sweeps rate-limit counters
/// across every provisioned tenant. Call once at process startup.
pub fn spawn_rate_limit_sweeper(
    registry: Arc<TenantRegistry>,
    interval: std::time::Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            registry.sweep_all();
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn test_config(dir: &tempfile::TempDir) -> Arc<Config> {
        let mut config = Config::default();
        config.storage.root_dir = dir.path().to_path_buf();
        Arc::new(config)
    }

    #[tokio::test]
    async fn get_or_create_provisions_a_new_tenant() {
        let dir = tempfile::tempdir().unwrap();
        let registry = TenantRegistry::new(test_config(&dir));
        let tenant = TenantId::from_raw("acme");
        let engine = registry.get_or_create(&tenant).await.unwrap();
        assert_eq!(engine.list_endpoints().await.unwrap().len(), 0);
        assert_eq!(registry.tenant_count(), 1);
    }

    #[tokio::test]
    async fn get_or_create_returns_the_same_engine_on_repeat_calls() {
        let dir = tempfile::tempdir().unwrap();
        let registry = TenantRegistry::new(test_config(&dir));
        let tenant = TenantId::from_raw("acme");
        let first = registry.get_or_create(&tenant).await.unwrap();
        let second = registry.get_or_create(&tenant).await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn concurrent_first_requests_provision_exactly_once() {
        let dir = tempfile::tempdir().unwrap();
        let registry = Arc::new(TenantRegistry::new(test_config(&dir)));
        let tenant = TenantId::from_raw("acme");

        let mut handles = Vec::new();
        for _ in 0..8 {
            let registry = registry.clone();
            let tenant = tenant.clone();
            handles.push(tokio::spawn(async move { registry.get_or_create(&tenant).await.unwrap() }));
        }
        let mut engines = Vec::new();
        for handle in handles {
            engines.push(handle.await.unwrap());
        }
        let first = &engines[0];
        assert!(engines.iter().all(|e| Arc::ptr_eq(e, first)));
        assert_eq!(registry.tenant_count(), 1);
    }

    #[test]
    fn get_existing_does_not_provision() {
        let dir = tempfile::tempdir().unwrap();
        let registry = TenantRegistry::new(test_config(&dir));
        let tenant = TenantId::from_raw("never-seen");
        assert!(registry.get_existing(&tenant).is_none());
        assert_eq!(registry.tenant_count(), 0);
    }
}
