//! Request Handler (C6): the per-tenant orchestrator.
//!
//! One [`TenantEngine`] owns everything private to a single tenant — its
//! store, rules cache, rate limiter, and inspector hub — and drives the
//! full request pipeline in §4.6. Every component it owns (`Store`'s
//! connection pool, `RulesCache`, `RateLimiter`, `InspectorHub`) is already
//! safe under concurrent access on its own; the one thing that is not is
//! the ordering guarantee in §5 ("log insertions are totally ordered...
//! broadcasts match the insertion order"). Rather than route every
//! operation through a message-passing actor, a single narrow
//! `tokio::sync::Mutex` brackets exactly the insert-then-broadcast step, so
//! concurrent requests for the same tenant can never interleave their log
//! writes. Nothing else is serialized: reads, rate-limit checks, and the
//! artificial delay all proceed without contention.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;

use crate::error::{Error, Result};
use crate::ids::{EndpointId, RuleId};
use crate::matcher::{self, PathParams};
use crate::model::{Endpoint, EndpointCreate, EndpointUpdate, RequestLog, Rule, RuleCreate, RuleUpdate};
use crate::ratelimit::RateLimiter;
use crate::rules;
use crate::store::{RulesCache, Store};
use crate::template::{self, RenderContext};
use crate::websocket::InspectorHub;

/// Headers stripped before a request is persisted or broadcast (§6).
const FILTERED_HEADERS: &[&str] = &[
    "cf-connecting-ip",
    "cf-ipcountry",
    "cf-ray",
    "cf-visitor",
    "cf-request-id",
    "cf-warp-tag-id",
    "cf-ew-via",
    "cf-pseudo-ipv4",
    "cf-connecting-ipv6",
    "x-forwarded-proto",
    "x-forwarded-for",
    "x-real-ip",
    "cdn-loop",
];

/// Everything needed to drive one mock request through the pipeline.
pub struct MockRequest<'a> {
    pub method: &'a str,
    pub path: &'a str,
    pub headers: Vec<(String, String)>,
    pub query: HashMap<String, String>,
    pub body: Option<String>,
    pub content_type: Option<&'a str>,
}

/// The outcome of serving a mock request: what to send back to the client.
pub struct MockResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

pub struct TenantEngine {
    store: Arc<Store>,
    cache: RulesCache,
    limiter: RateLimiter,
    hub: Arc<InspectorHub>,
    log_order: Mutex<()>,
}

impl TenantEngine {
    pub fn new(store: Store, limiter: RateLimiter) -> Self {
        Self {
            store: Arc::new(store),
            cache: RulesCache::new(),
            limiter,
            hub: Arc::new(InspectorHub::new()),
            log_order: Mutex::new(()),
        }
    }

    pub fn hub(&self) -> &InspectorHub {
        &self.hub
    }

    pub fn hub_arc(&self) -> Arc<InspectorHub> {
        self.hub.clone()
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn store_arc(&self) -> Arc<Store> {
        self.store.clone()
    }

    /// Drops rate-limit counters past their 2·W grace window. Called
    /// periodically by the registry-level sweeper (one per tenant engine).
    pub fn sweep_rate_limiter(&self) {
        self.limiter.sweep();
    }

    /// Drives one request through the full §4.6 pipeline.
    pub async fn handle_request(&self, request: MockRequest<'_>) -> Result<MockResponse> {
        let started = Instant::now();
        let path = matcher::normalize(request.path);

        let endpoint = self.select_endpoint(&path).await?;
        let endpoint_params = matcher::match_path(&endpoint.path_pattern, &path).unwrap_or_default();

        let outcome = self.limiter.check_and_increment(&endpoint.id, endpoint.rate_limit);
        let rate_limit_headers = vec![
            ("X-RateLimit-Limit".to_string(), outcome.limit.to_string()),
            ("X-RateLimit-Remaining".to_string(), outcome.remaining.to_string()),
            ("X-RateLimit-Reset".to_string(), outcome.reset_at.to_string()),
        ];

        if !outcome.allowed {
            let now = std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs();
            return Err(Error::RateLimited {
                limit: outcome.limit,
                remaining: outcome.remaining,
                reset_at: outcome.reset_at,
                retry_after_secs: outcome.retry_after_secs(now),
            });
        }

        let rules = self.cache.get(&self.store, &endpoint.id).await?;
        let selected = rules::select_rule(&rules, request.method, &path, &request.headers, &endpoint_params);

        let (status, body_template, delay_ms, rule_headers, matched_rule_id, response_path_params) =
            match &selected {
                Some(m) => (
                    m.rule.response_status,
                    m.rule.response_body.clone(),
                    m.rule.response_delay_ms,
                    parse_header_overlay(m.rule.response_headers.as_deref()),
                    Some(m.rule.id.clone()),
                    m.path_params.clone(),
                ),
                None => (endpoint.status_code, endpoint.response_body.clone(), endpoint.delay_ms, Vec::new(), None, endpoint_params.clone()),
            };

        let render_ctx = RenderContext {
            method: request.method,
            path: &path,
            headers: &request.headers,
            query: &request.query,
            body: request.body.as_deref(),
            content_type: request.content_type,
            path_params: &response_path_params,
        };
        let rendered_body = template::render(&body_template, &render_ctx);

        let mut response_headers = vec![("Content-Type".to_string(), "application/json".to_string())];
        response_headers.extend(rule_headers);
        response_headers.extend(rate_limit_headers);

        let response_time_ms = started.elapsed().as_millis() as u64;

        let log = RequestLog {
            id: crate::ids::RequestLogId::new(),
            endpoint_id: endpoint.id.clone(),
            method: request.method.to_string(),
            path: path.clone(),
            headers: filtered_headers_json(&request.headers),
            body: request.body,
            timestamp: chrono::Utc::now(),
            matched_rule_id,
            path_params: path_params_json(&response_path_params),
            response_status: status,
            response_time_ms,
        };

        {
            let _guard = self.log_order.lock().await;
            self.store.insert_log(&log).await?;
            self.hub.broadcast(&log).await;
        }

        if delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
        }

        Ok(MockResponse { status, headers: response_headers, body: rendered_body })
    }

    /// Fetches all endpoints, keeps those whose pattern matches `path`, and
    /// picks the most specific; ties keep the earliest-created candidate
    /// because `list_endpoints` is already creation-ascending and the sort
    /// below is stable.
    async fn select_endpoint(&self, path: &str) -> Result<Endpoint> {
        let mut candidates: Vec<Endpoint> = self
            .store
            .list_endpoints()
            .await?
            .into_iter()
            .filter(|e| matcher::match_path(&e.path_pattern, path).is_some())
            .collect();

        candidates.sort_by(|a, b| matcher::specificity(&b.path_pattern).cmp(&matcher::specificity(&a.path_pattern)));

        candidates.into_iter().next().ok_or_else(|| Error::NotFound("Endpoint".into()))
    }

    // ---- admin surface passthroughs (C8), cache kept consistent --------

    pub async fn list_endpoints(&self) -> Result<Vec<Endpoint>> {
        self.store.list_endpoints().await
    }

    pub async fn create_endpoint(&self, create: EndpointCreate) -> Result<Endpoint> {
        self.store.create_endpoint(create).await
    }

    pub async fn update_endpoint(&self, id: &EndpointId, update: EndpointUpdate) -> Result<Option<Endpoint>> {
        let result = self.store.update_endpoint(id, update).await?;
        self.cache.invalidate(id);
        Ok(result)
    }

    pub async fn delete_endpoint(&self, id: &EndpointId) -> Result<bool> {
        let result = self.store.delete_endpoint(id).await?;
        self.cache.invalidate(id);
        Ok(result)
    }

    pub async fn list_rules(&self, endpoint_id: Option<&EndpointId>) -> Result<Vec<Rule>> {
        self.store.list_rules(endpoint_id).await
    }

    pub async fn create_rule(&self, create: RuleCreate) -> Result<Rule> {
        let endpoint_id = create.endpoint_id.clone();
        let rule = self.store.create_rule(create).await?;
        self.cache.invalidate(&endpoint_id);
        Ok(rule)
    }

    pub async fn update_rule(&self, id: &RuleId, update: RuleUpdate) -> Result<Option<Rule>> {
        let Some(existing) = self.store.get_rule(id).await? else {
            return Ok(None);
        };
        let result = self.store.update_rule(id, update).await?;
        self.cache.invalidate(&existing.endpoint_id);
        Ok(result)
    }

    pub async fn delete_rule(&self, id: &RuleId) -> Result<bool> {
        let Some(existing) = self.store.get_rule(id).await? else {
            return Ok(false);
        };
        let deleted = self.store.delete_rule(id).await?;
        self.cache.invalidate(&existing.endpoint_id);
        Ok(deleted)
    }

    pub async fn list_logs(&self, endpoint_id: Option<&EndpointId>, limit: i64) -> Result<Vec<RequestLog>> {
        self.store.list_logs(endpoint_id, limit).await
    }

    pub async fn clear_logs(&self, endpoint_id: Option<&EndpointId>) -> Result<()> {
        self.store.clear_logs(endpoint_id).await
    }
}

fn parse_header_overlay(raw: Option<&str>) -> Vec<(String, String)> {
    let Some(raw) = raw else { return Vec::new() };
    let Ok(value) = serde_json::from_str::<serde_json::Value>(raw) else { return Vec::new() };
    let Some(obj) = value.as_object() else { return Vec::new() };
    obj.iter()
        .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
        .collect()
}

fn filtered_headers_json(headers: &[(String, String)]) -> String {
    let map: serde_json::Map<String, serde_json::Value> = headers
        .iter()
        .filter(|(name, _)| !FILTERED_HEADERS.iter().any(|f| f.eq_ignore_ascii_case(name)))
        .map(|(k, v)| (k.clone(), serde_json::Value::String(v.clone())))
        .collect();
    serde_json::Value::Object(map).to_string()
}

fn path_params_json(params: &PathParams) -> Option<String> {
    if params.is_empty() {
        return None;
    }
    let map: serde_json::Map<String, serde_json::Value> =
        params.iter().map(|(k, v)| (k.clone(), serde_json::Value::String(v.clone()))).collect();
    Some(serde_json::Value::Object(map).to_string())
}
