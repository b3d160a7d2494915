//! Per-endpoint rules cache (part of C5).
//!
//! A read-through cache with a 60s time-to-live, invalidated on any rule
//! or endpoint mutation. It exists purely to remove a storage round trip
//! from the request-handling hot path — never a write-back cache.

use super::Store;
use crate::error::Result;
use crate::ids::EndpointId;
use crate::model::Rule;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

const DEFAULT_TTL: Duration = Duration::from_secs(60);

struct CachedEntry {
    rules: Arc<Vec<Rule>>,
    cached_at: Instant,
}

pub struct RulesCache {
    entries: DashMap<EndpointId, CachedEntry>,
    ttl: Duration,
}

impl RulesCache {
    pub fn new() -> Self {
        Self { entries: DashMap::new(), ttl: DEFAULT_TTL }
    }

    #[cfg(test)]
    fn with_ttl(ttl: Duration) -> Self {
        Self { entries: DashMap::new(), ttl }
    }

    /// Returns the cached rule list for `endpoint_id`, refreshing from
    /// `store` if absent or stale.
    pub async fn get(&self, store: &Store, endpoint_id: &EndpointId) -> Result<Arc<Vec<Rule>>> {
        if let Some(entry) = self.entries.get(endpoint_id) {
            if entry.cached_at.elapsed() < self.ttl {
                return Ok(entry.rules.clone());
            }
        }

        let rules = Arc::new(store.list_rules_for_endpoint(endpoint_id).await?);
        self.entries.insert(endpoint_id.clone(), CachedEntry { rules: rules.clone(), cached_at: Instant::now() });
        Ok(rules)
    }

    /// Drops the cached entry for one endpoint. Called on rule
    /// create/update/delete and on endpoint deletion, so that a cache
    /// invalidation always precedes any read that should observe it.
    pub fn invalidate(&self, endpoint_id: &EndpointId) {
        self.entries.remove(endpoint_id);
    }
}

impl Default for RulesCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{EndpointCreate, RuleCreate};

    #[tokio::test]
    async fn cache_serves_repeated_reads_without_hitting_storage_again() {
        let store = Store::connect_in_memory().await.unwrap();
        let endpoint = store
            .create_endpoint(EndpointCreate { path: "/a".into(), response_body: None, status_code: None, delay_ms: None, rate_limit: None })
            .await
            .unwrap();
        let cache = RulesCache::new();

        let first = cache.get(&store, &endpoint.id).await.unwrap();
        assert!(first.is_empty());

        // Insert directly into storage, bypassing the cache's invalidation path.
        store
            .create_rule(RuleCreate {
                endpoint_id: endpoint.id.clone(),
                priority: None,
                match_method: None,
                match_path: None,
                match_headers: None,
                response_body: "{}".into(),
                response_headers: None,
                response_status: None,
                response_delay_ms: None,
                active: None,
            })
            .await
            .unwrap();

        let still_cached = cache.get(&store, &endpoint.id).await.unwrap();
        assert!(still_cached.is_empty(), "cache should still serve the stale value until invalidated or expired");
    }

    #[tokio::test]
    async fn invalidate_forces_a_fresh_read() {
        let store = Store::connect_in_memory().await.unwrap();
        let endpoint = store
            .create_endpoint(EndpointCreate { path: "/a".into(), response_body: None, status_code: None, delay_ms: None, rate_limit: None })
            .await
            .unwrap();
        let cache = RulesCache::new();
        cache.get(&store, &endpoint.id).await.unwrap();

        store
            .create_rule(RuleCreate {
                endpoint_id: endpoint.id.clone(),
                priority: None,
                match_method: None,
                match_path: None,
                match_headers: None,
                response_body: "{}".into(),
                response_headers: None,
                response_status: None,
                response_delay_ms: None,
                active: None,
            })
            .await
            .unwrap();
        cache.invalidate(&endpoint.id);

        let refreshed = cache.get(&store, &endpoint.id).await.unwrap();
        assert_eq!(refreshed.len(), 1);
    }

    #[tokio::test]
    async fn entries_expire_after_their_ttl() {
        let store = Store::connect_in_memory().await.unwrap();
        let endpoint = store
            .create_endpoint(EndpointCreate { path: "/a".into(), response_body: None, status_code: None, delay_ms: None, rate_limit: None })
            .await
            .unwrap();
        let cache = RulesCache::with_ttl(Duration::from_millis(10));
        cache.get(&store, &endpoint.id).await.unwrap();

        store
            .create_rule(RuleCreate {
                endpoint_id: endpoint.id.clone(),
                priority: None,
                match_method: None,
                match_path: None,
                match_headers: None,
                response_body: "{}".into(),
                response_headers: None,
                response_status: None,
                response_delay_ms: None,
                active: None,
            })
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(20)).await;
        let refreshed = cache.get(&store, &endpoint.id).await.unwrap();
        assert_eq!(refreshed.len(), 1);
    }
}
