//! Data model (§3): Endpoint, Rule, Request Log.

use crate::ids::{EndpointId, RequestLogId, RuleId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Endpoint {
    pub id: EndpointId,
    pub path_pattern: String,
    pub response_body: String,
    pub status_code: u16,
    pub delay_ms: u64,
    pub rate_limit: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields accepted when creating an endpoint; everything but `path` is
/// optional and falls back to a sensible default.
#[derive(Debug, Clone, Deserialize)]
pub struct EndpointCreate {
    pub path: String,
    pub response_body: Option<String>,
    pub status_code: Option<u16>,
    pub delay_ms: Option<u64>,
    pub rate_limit: Option<u32>,
}

/// Partial update: every field present overwrites; absent fields are
/// left untouched.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct EndpointUpdate {
    pub path: Option<String>,
    pub response_body: Option<String>,
    pub status_code: Option<u16>,
    pub delay_ms: Option<u64>,
    pub rate_limit: Option<u32>,
}

pub fn default_response_body() -> String {
    "{}".to_string()
}

pub fn default_status_code() -> u16 {
    200
}

pub fn default_delay_ms() -> u64 {
    0
}

pub fn default_rate_limit() -> u32 {
    100
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rule {
    pub id: RuleId,
    pub endpoint_id: EndpointId,
    pub priority: i64,
    pub match_method: Option<String>,
    pub match_path: Option<String>,
    /// Header-equality constraints, stored as a JSON object.
    pub match_headers: Option<String>,
    pub response_body: String,
    /// Response headers to overlay, stored as a JSON object.
    pub response_headers: Option<String>,
    pub response_status: u16,
    pub response_delay_ms: u64,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RuleCreate {
    pub endpoint_id: EndpointId,
    pub priority: Option<i64>,
    pub match_method: Option<String>,
    pub match_path: Option<String>,
    pub match_headers: Option<String>,
    pub response_body: String,
    pub response_headers: Option<String>,
    pub response_status: Option<u16>,
    pub response_delay_ms: Option<u64>,
    pub active: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct RuleUpdate {
    pub priority: Option<i64>,
    pub match_method: Option<String>,
    pub match_path: Option<String>,
    pub match_headers: Option<String>,
    pub response_body: Option<String>,
    pub response_headers: Option<String>,
    pub response_status: Option<u16>,
    pub response_delay_ms: Option<u64>,
    pub active: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestLog {
    pub id: RequestLogId,
    pub endpoint_id: EndpointId,
    pub method: String,
    pub path: String,
    /// Headers after Cloudflare/infra header filtering (§6), as a JSON object string.
    pub headers: String,
    pub body: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub matched_rule_id: Option<RuleId>,
    /// Extracted path parameters, as a JSON object string.
    pub path_params: Option<String>,
    pub response_status: u16,
    pub response_time_ms: u64,
}
