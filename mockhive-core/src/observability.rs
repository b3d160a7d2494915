//! Structured tracing bootstrap (C10).
//!
//! A single global `tracing` subscriber for the process: JSON-formatted
//! output, filtered by `RUST_LOG` when set, falling back to the
//! configured `server.log_level`. Per-request spans (tenant id, endpoint
//! id once resolved, request id) come from `tower_http::trace::TraceLayer`
//! in [`crate::server::build_router`]; this module only wires up the
//! subscriber those spans are emitted into.

use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::error::Result;

/// Initializes the global tracing subscriber. Safe to call exactly once,
/// at process startup, before the first request is served.
pub fn init_tracing(config: &Config) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.server.log_level.clone()));

    tracing_subscriber::fmt().json().with_env_filter(filter).init();

    tracing::info!(
        bind_addr = %config.server.bind_addr,
        port = config.server.port,
        "tracing initialized"
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_tracing_does_not_panic_with_default_config() {
        let config = Config::default();
        // A global subscriber can only be installed once per process; this
        // just exercises the construction path without asserting on the
        // (possibly already-set) global default.
        let _ = init_tracing(&config);
    }
}
