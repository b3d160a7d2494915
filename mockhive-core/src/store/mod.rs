//! Endpoint Store (C5): durable, per-tenant SQLite storage for endpoints,
//! rules, and request logs, plus the rule read-through cache.
//!
//! One `Store` owns one tenant's SQLite database file. Schema migrations
//! run once at construction and are written to be idempotent: re-running
//! them against an already-current database is a no-op.

mod cache;
mod migrate;

pub use cache::RulesCache;

use crate::error::{Error, Result};
use crate::ids::{EndpointId, RequestLogId, RuleId};
use crate::model::{Endpoint, EndpointCreate, EndpointUpdate, Rule, RuleCreate, RuleUpdate, RequestLog};
use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqlitePoolOptions, Row, SqlitePool};
use std::path::Path;
use std::str::FromStr;

/// Default `LIMIT` applied to a log query when the caller supplies none.
const DEFAULT_LOG_LIMIT: i64 = 100;

/// Hard ceiling on any log query's `LIMIT`, regardless of what the caller
/// asks for — §4.5 requires a default *and* a maximum, not just a default.
const MAX_LOG_LIMIT: i64 = 1000;

/// Floors non-positive limits to the default and caps everything else at
/// [`MAX_LOG_LIMIT`], so a caller-supplied `?limit=-1` or `?limit=999999999`
/// can never turn into an unbounded (or merely oversized) SQL `LIMIT`.
fn clamp_log_limit(limit: i64) -> i64 {
    if limit <= 0 {
        DEFAULT_LOG_LIMIT
    } else {
        limit.min(MAX_LOG_LIMIT)
    }
}

pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Opens (creating if absent) the SQLite database at `path` and runs
    /// migrations.
    pub async fn connect(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| Error::Internal(e.to_string()))?;
        }

        let url = format!("sqlite://{}?mode=rwc", path.display());
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&url)
            .await?;

        sqlx::query("PRAGMA foreign_keys = ON;").execute(&pool).await?;
        migrate::run(&pool).await?;

        Ok(Self { pool })
    }

    /// An in-memory store, used by tests.
    #[cfg(test)]
    pub async fn connect_in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        sqlx::query("PRAGMA foreign_keys = ON;").execute(&pool).await?;
        migrate::run(&pool).await?;
        Ok(Self { pool })
    }

    // ---- endpoints ----------------------------------------------------

    pub async fn create_endpoint(&self, create: EndpointCreate) -> Result<Endpoint> {
        let id = EndpointId::new();
        let now = Utc::now();
        let response_body = create.response_body.unwrap_or_else(crate::model::default_response_body);
        let status_code = create.status_code.unwrap_or_else(crate::model::default_status_code);
        let delay_ms = create.delay_ms.unwrap_or_else(crate::model::default_delay_ms);
        let rate_limit = create.rate_limit.unwrap_or_else(crate::model::default_rate_limit);

        let result = sqlx::query(
            "INSERT INTO endpoints (id, path_pattern, response_body, status_code, delay_ms, rate_limit, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(id.as_str())
        .bind(&create.path)
        .bind(&response_body)
        .bind(status_code as i64)
        .bind(delay_ms as i64)
        .bind(rate_limit as i64)
        .bind(now.to_rfc3339())
        .bind(now.to_rfc3339())
        .execute(&self.pool)
        .await;

        if let Err(sqlx::Error::Database(db_err)) = &result {
            if db_err.is_unique_violation() {
                return Err(Error::Conflict(format!("endpoint path '{}' already exists", create.path)));
            }
        }
        result?;

        Ok(Endpoint {
            id,
            path_pattern: create.path,
            response_body,
            status_code,
            delay_ms,
            rate_limit,
            created_at: now,
            updated_at: now,
        })
    }

    pub async fn list_endpoints(&self) -> Result<Vec<Endpoint>> {
        let rows = sqlx::query("SELECT * FROM endpoints ORDER BY created_at ASC")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_endpoint).collect()
    }

    pub async fn get_endpoint(&self, id: &EndpointId) -> Result<Option<Endpoint>> {
        let row = sqlx::query("SELECT * FROM endpoints WHERE id = ?")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_endpoint).transpose()
    }

    pub async fn update_endpoint(&self, id: &EndpointId, update: EndpointUpdate) -> Result<Option<Endpoint>> {
        let Some(mut endpoint) = self.get_endpoint(id).await? else {
            return Ok(None);
        };

        if let Some(path) = update.path {
            endpoint.path_pattern = path;
        }
        if let Some(body) = update.response_body {
            endpoint.response_body = body;
        }
        if let Some(status) = update.status_code {
            endpoint.status_code = status;
        }
        if let Some(delay) = update.delay_ms {
            endpoint.delay_ms = delay;
        }
        if let Some(limit) = update.rate_limit {
            endpoint.rate_limit = limit;
        }
        endpoint.updated_at = Utc::now();

        let result = sqlx::query(
            "UPDATE endpoints SET path_pattern = ?, response_body = ?, status_code = ?, delay_ms = ?, rate_limit = ?, updated_at = ?
             WHERE id = ?",
        )
        .bind(&endpoint.path_pattern)
        .bind(&endpoint.response_body)
        .bind(endpoint.status_code as i64)
        .bind(endpoint.delay_ms as i64)
        .bind(endpoint.rate_limit as i64)
        .bind(endpoint.updated_at.to_rfc3339())
        .bind(id.as_str())
        .execute(&self.pool)
        .await;

        if let Err(sqlx::Error::Database(db_err)) = &result {
            if db_err.is_unique_violation() {
                return Err(Error::Conflict(format!("endpoint path '{}' already exists", endpoint.path_pattern)));
            }
        }
        result?;

        Ok(Some(endpoint))
    }

    /// Deletes an endpoint; rules cascade via `ON DELETE CASCADE`. Logs are
    /// intentionally retained (they are historical record, not config) and
    /// must be cleared separately via `clear_logs`.
    pub async fn delete_endpoint(&self, id: &EndpointId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM endpoints WHERE id = ?")
            .bind(id.as_str())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    // ---- rules ----------------------------------------------------------

    pub async fn create_rule(&self, create: RuleCreate) -> Result<Rule> {
        if create.response_body.is_empty() {
            return Err(Error::BadRequest("rule response body must not be empty".into()));
        }
        if self.get_endpoint(&create.endpoint_id).await?.is_none() {
            return Err(Error::BadRequest("rule references an unknown endpoint".into()));
        }

        let id = RuleId::new();
        let now = Utc::now();
        let priority = create.priority.unwrap_or(0);
        let response_status = create.response_status.unwrap_or(200);
        let response_delay_ms = create.response_delay_ms.unwrap_or(0);
        let active = create.active.unwrap_or(true);

        sqlx::query(
            "INSERT INTO mock_rules
               (id, endpoint_id, priority, match_method, match_path, match_headers,
                response_body, response_headers, response_status, response_delay_ms,
                active, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(id.as_str())
        .bind(create.endpoint_id.as_str())
        .bind(priority)
        .bind(&create.match_method)
        .bind(&create.match_path)
        .bind(&create.match_headers)
        .bind(&create.response_body)
        .bind(&create.response_headers)
        .bind(response_status as i64)
        .bind(response_delay_ms as i64)
        .bind(active as i64)
        .bind(now.to_rfc3339())
        .bind(now.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(Rule {
            id,
            endpoint_id: create.endpoint_id,
            priority,
            match_method: create.match_method,
            match_path: create.match_path,
            match_headers: create.match_headers,
            response_body: create.response_body,
            response_headers: create.response_headers,
            response_status,
            response_delay_ms,
            active,
            created_at: now,
            updated_at: now,
        })
    }

    /// Uncached read straight from storage; callers on the hot path should
    /// go through [`RulesCache`] instead.
    pub async fn list_rules_for_endpoint(&self, endpoint_id: &EndpointId) -> Result<Vec<Rule>> {
        let rows = sqlx::query("SELECT * FROM mock_rules WHERE endpoint_id = ? ORDER BY created_at ASC")
            .bind(endpoint_id.as_str())
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_rule).collect()
    }

    pub async fn get_rule(&self, id: &RuleId) -> Result<Option<Rule>> {
        let row = sqlx::query("SELECT * FROM mock_rules WHERE id = ?")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_rule).transpose()
    }

    pub async fn update_rule(&self, id: &RuleId, update: RuleUpdate) -> Result<Option<Rule>> {
        let Some(mut rule) = self.get_rule(id).await? else {
            return Ok(None);
        };

        if let Some(priority) = update.priority {
            rule.priority = priority;
        }
        if update.match_method.is_some() {
            rule.match_method = update.match_method;
        }
        if update.match_path.is_some() {
            rule.match_path = update.match_path;
        }
        if update.match_headers.is_some() {
            rule.match_headers = update.match_headers;
        }
        if let Some(body) = update.response_body {
            if body.is_empty() {
                return Err(Error::BadRequest("rule response body must not be empty".into()));
            }
            rule.response_body = body;
        }
        if update.response_headers.is_some() {
            rule.response_headers = update.response_headers;
        }
        if let Some(status) = update.response_status {
            rule.response_status = status;
        }
        if let Some(delay) = update.response_delay_ms {
            rule.response_delay_ms = delay;
        }
        if let Some(active) = update.active {
            rule.active = active;
        }
        rule.updated_at = Utc::now();

        sqlx::query(
            "UPDATE mock_rules SET priority = ?, match_method = ?, match_path = ?, match_headers = ?,
                response_body = ?, response_headers = ?, response_status = ?, response_delay_ms = ?,
                active = ?, updated_at = ?
             WHERE id = ?",
        )
        .bind(rule.priority)
        .bind(&rule.match_method)
        .bind(&rule.match_path)
        .bind(&rule.match_headers)
        .bind(&rule.response_body)
        .bind(&rule.response_headers)
        .bind(rule.response_status as i64)
        .bind(rule.response_delay_ms as i64)
        .bind(rule.active as i64)
        .bind(rule.updated_at.to_rfc3339())
        .bind(id.as_str())
        .execute(&self.pool)
        .await?;

        Ok(Some(rule))
    }

    pub async fn delete_rule(&self, id: &RuleId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM mock_rules WHERE id = ?")
            .bind(id.as_str())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn list_rules(&self, endpoint_id: Option<&EndpointId>) -> Result<Vec<Rule>> {
        match endpoint_id {
            Some(id) => self.list_rules_for_endpoint(id).await,
            None => {
                let rows = sqlx::query("SELECT * FROM mock_rules ORDER BY created_at ASC")
                    .fetch_all(&self.pool)
                    .await?;
                rows.iter().map(row_to_rule).collect()
            }
        }
    }

    // ---- request logs ----------------------------------------------------

    pub async fn insert_log(&self, log: &RequestLog) -> Result<()> {
        sqlx::query(
            "INSERT INTO request_logs
               (id, endpoint_id, method, path, headers, body, timestamp,
                matched_rule_id, path_params, response_status, response_time_ms)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(log.id.as_str())
        .bind(log.endpoint_id.as_str())
        .bind(&log.method)
        .bind(&log.path)
        .bind(&log.headers)
        .bind(&log.body)
        .bind(log.timestamp.to_rfc3339())
        .bind(log.matched_rule_id.as_ref().map(|id| id.as_str().to_string()))
        .bind(&log.path_params)
        .bind(log.response_status as i64)
        .bind(log.response_time_ms as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn list_logs(&self, endpoint_id: Option<&EndpointId>, limit: i64) -> Result<Vec<RequestLog>> {
        let limit = clamp_log_limit(limit);
        let rows = if let Some(id) = endpoint_id {
            sqlx::query("SELECT * FROM request_logs WHERE endpoint_id = ? ORDER BY timestamp DESC LIMIT ?")
                .bind(id.as_str())
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
        } else {
            sqlx::query("SELECT * FROM request_logs ORDER BY timestamp DESC LIMIT ?")
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
        };
        rows.iter().map(row_to_log).collect()
    }

    pub async fn clear_logs(&self, endpoint_id: Option<&EndpointId>) -> Result<()> {
        if let Some(id) = endpoint_id {
            sqlx::query("DELETE FROM request_logs WHERE endpoint_id = ?")
                .bind(id.as_str())
                .execute(&self.pool)
                .await?;
        } else {
            sqlx::query("DELETE FROM request_logs").execute(&self.pool).await?;
        }
        Ok(())
    }
}

fn row_to_endpoint(row: &sqlx::sqlite::SqliteRow) -> Result<Endpoint> {
    Ok(Endpoint {
        id: parse_id(row.try_get::<String, _>("id")?)?,
        path_pattern: row.try_get("path_pattern")?,
        response_body: row.try_get("response_body")?,
        status_code: row.try_get::<i64, _>("status_code")? as u16,
        delay_ms: row.try_get::<i64, _>("delay_ms")? as u64,
        rate_limit: row.try_get::<i64, _>("rate_limit")? as u32,
        created_at: parse_time(row.try_get("created_at")?)?,
        updated_at: parse_time(row.try_get("updated_at")?)?,
    })
}

fn row_to_rule(row: &sqlx::sqlite::SqliteRow) -> Result<Rule> {
    Ok(Rule {
        id: parse_id(row.try_get::<String, _>("id")?)?,
        endpoint_id: parse_id(row.try_get::<String, _>("endpoint_id")?)?,
        priority: row.try_get("priority")?,
        match_method: row.try_get("match_method")?,
        match_path: row.try_get("match_path")?,
        match_headers: row.try_get("match_headers")?,
        response_body: row.try_get("response_body")?,
        response_headers: row.try_get("response_headers")?,
        response_status: row.try_get::<i64, _>("response_status")? as u16,
        response_delay_ms: row.try_get::<i64, _>("response_delay_ms")? as u64,
        active: row.try_get::<i64, _>("active")? != 0,
        created_at: parse_time(row.try_get("created_at")?)?,
        updated_at: parse_time(row.try_get("updated_at")?)?,
    })
}

fn row_to_log(row: &sqlx::sqlite::SqliteRow) -> Result<RequestLog> {
    let matched_rule_id: Option<String> = row.try_get("matched_rule_id")?;
    Ok(RequestLog {
        id: parse_id(row.try_get::<String, _>("id")?)?,
        endpoint_id: parse_id(row.try_get::<String, _>("endpoint_id")?)?,
        method: row.try_get("method")?,
        path: row.try_get("path")?,
        headers: row.try_get("headers")?,
        body: row.try_get("body")?,
        timestamp: parse_time(row.try_get("timestamp")?)?,
        matched_rule_id: matched_rule_id.map(|s| RuleId::from_str(&s)).transpose().map_err(|e| Error::Internal(e.to_string()))?,
        path_params: row.try_get("path_params")?,
        response_status: row.try_get::<i64, _>("response_status")? as u16,
        response_time_ms: row.try_get::<i64, _>("response_time_ms")? as u64,
    })
}

fn parse_id<T: FromStr>(raw: String) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    T::from_str(&raw).map_err(|e| Error::Internal(format!("corrupt id in storage: {e}")))
}

fn parse_time(raw: String) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::Internal(format!("corrupt timestamp in storage: {e}")))
}
