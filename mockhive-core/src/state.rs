//! Shared application state handed to every axum handler.

use std::sync::Arc;

use crate::config::Config;
use crate::tenant::TenantRegistry;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub tenants: Arc<TenantRegistry>,
}

impl AppState {
    pub fn new(config: Arc<Config>) -> Self {
        let tenants = Arc::new(TenantRegistry::new(config.clone()));
        Self { config, tenants }
    }
}
