//! # mockhive-core
//!
//! The per-tenant request-serving engine for a multi-tenant HTTP mock
//! server: path matching with parameter extraction, conditional rule
//! selection, `{{...}}` template substitution, fixed-window rate limiting,
//! transactional request logging, and websocket fan-out to connected
//! inspector clients.
//!
//! A tenant's state — its endpoints, rules, logs, rate-limit counters, and
//! inspector sessions — lives entirely behind one [`engine::TenantEngine`],
//! lazily provisioned by [`tenant::TenantRegistry`] on first use. Nothing
//! is shared across tenants.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use mockhive_core::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = Arc::new(Config::load()?);
//!     observability::init_tracing(&config)?;
//!
//!     let state = AppState::new(config.clone());
//!     let app = server::build_router(state);
//!
//!     let addr = format!("{}:{}", config.server.bind_addr, config.server.port).parse().unwrap();
//!     server::serve(app, addr).await
//! }
//! ```

pub mod admin;
pub mod config;
pub mod engine;
pub mod error;
pub mod gateway;
pub mod health;
pub mod ids;
pub mod matcher;
pub mod model;
pub mod observability;
pub mod ratelimit;
pub mod rules;
pub mod server;
pub mod state;
pub mod store;
pub mod template;
pub mod tenant;
pub mod websocket;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::engine::{MockRequest, MockResponse, TenantEngine};
    pub use crate::error::{Error, Result};
    pub use crate::ids::{EndpointId, RequestLogId, RuleId, TenantId};
    pub use crate::model::{Endpoint, EndpointCreate, EndpointUpdate, Rule, RuleCreate, RuleUpdate, RequestLog};
    pub use crate::observability;
    pub use crate::server;
    pub use crate::state::AppState;
    pub use crate::tenant::TenantRegistry;
}
