//! Idempotent schema migrations.
//!
//! Every engine start detects obsolete columns/tables and drops them, and
//! adds missing columns with sensible defaults. The legacy `endpoints`
//! schema had a `method` column (endpoints were historically
//! method-scoped; they are now path-only and dispatch to rules for
//! per-method behavior) — its presence triggers a full drop-and-recreate.
//! This is a one-way, lossy migration: preserved for compatibility with
//! the original source, not because it is good practice.

use crate::error::Result;
use sqlx::{Row, SqlitePool};

pub async fn run(pool: &SqlitePool) -> Result<()> {
    create_base_tables(pool).await?;
    drop_legacy_method_scoped_endpoints(pool).await?;
    Ok(())
}

async fn create_base_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS endpoints (
            id TEXT PRIMARY KEY,
            path_pattern TEXT NOT NULL UNIQUE,
            response_body TEXT NOT NULL,
            status_code INTEGER NOT NULL,
            delay_ms INTEGER NOT NULL,
            rate_limit INTEGER NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS mock_rules (
            id TEXT PRIMARY KEY,
            endpoint_id TEXT NOT NULL REFERENCES endpoints(id) ON DELETE CASCADE,
            priority INTEGER NOT NULL,
            match_method TEXT,
            match_path TEXT,
            match_headers TEXT,
            response_body TEXT NOT NULL,
            response_headers TEXT,
            response_status INTEGER NOT NULL,
            response_delay_ms INTEGER NOT NULL,
            active INTEGER NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_mock_rules_endpoint ON mock_rules(endpoint_id)")
        .execute(pool)
        .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS request_logs (
            id TEXT PRIMARY KEY,
            endpoint_id TEXT NOT NULL,
            method TEXT NOT NULL,
            path TEXT NOT NULL,
            headers TEXT NOT NULL,
            body TEXT,
            timestamp TEXT NOT NULL,
            matched_rule_id TEXT,
            path_params TEXT,
            response_status INTEGER NOT NULL,
            response_time_ms INTEGER NOT NULL
        )",
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_request_logs_endpoint_ts ON request_logs(endpoint_id, timestamp DESC)")
        .execute(pool)
        .await?;

    Ok(())
}

async fn drop_legacy_method_scoped_endpoints(pool: &SqlitePool) -> Result<()> {
    let columns = sqlx::query("PRAGMA table_info(endpoints)").fetch_all(pool).await?;
    let has_legacy_method_column = columns.iter().any(|row| {
        row.try_get::<String, _>("name").map(|name| name == "method").unwrap_or(false)
    });

    if has_legacy_method_column {
        tracing::warn!("legacy method-scoped endpoints schema detected; dropping and recreating (data loss is expected)");
        sqlx::query("DROP TABLE endpoints").execute(pool).await?;
        create_base_tables(pool).await?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    #[tokio::test]
    async fn migrations_are_idempotent() {
        let pool = SqlitePoolOptions::new().connect("sqlite::memory:").await.unwrap();
        run(&pool).await.unwrap();
        run(&pool).await.unwrap();

        let tables = sqlx::query("SELECT name FROM sqlite_master WHERE type='table'")
            .fetch_all(&pool)
            .await
            .unwrap();
        let names: Vec<String> = tables.iter().map(|r| r.try_get("name").unwrap()).collect();
        assert!(names.contains(&"endpoints".to_string()));
        assert!(names.contains(&"mock_rules".to_string()));
        assert!(names.contains(&"request_logs".to_string()));
    }

    #[tokio::test]
    async fn legacy_method_column_triggers_drop_and_recreate() {
        let pool = SqlitePoolOptions::new().connect("sqlite::memory:").await.unwrap();
        sqlx::query(
            "CREATE TABLE endpoints (id TEXT PRIMARY KEY, method TEXT NOT NULL, path_pattern TEXT)",
        )
        .execute(&pool)
        .await
        .unwrap();

        run(&pool).await.unwrap();

        let columns = sqlx::query("PRAGMA table_info(endpoints)").fetch_all(&pool).await.unwrap();
        let has_method = columns.iter().any(|row| {
            row.try_get::<String, _>("name").map(|n| n == "method").unwrap_or(false)
        });
        assert!(!has_method);
    }
}
