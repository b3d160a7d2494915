//! Public mock surface + inspector websocket entry point (C6, C7, §6).
//!
//! Mounted as the router's fallback so it catches every method and path not
//! claimed by the admin surface or the health endpoints. One handler serves
//! both plain HTTP mock requests and websocket upgrades: axum's
//! `Option<WebSocketUpgrade>` extractor is `None` for an ordinary request
//! and `Some` the moment the client sends the upgrade handshake, on
//! whatever path it happens to hit — matching §6's "upgrade on any path
//! under the tenant".

use std::collections::HashMap;

use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::error::{Error, Result};
use crate::ids::{validate_tenant_id, TenantId};
use crate::state::AppState;
use crate::websocket::{handle_socket, WebSocketUpgrade};

/// Splits an inbound request into a tenant id and the path the tenant's
/// own routing operates on, per the configured resolution mode (§6).
fn resolve_tenant(state: &AppState, headers: &HeaderMap, uri: &Uri) -> Result<(TenantId, String)> {
    let raw_path = uri.path();

    if state.config.tenant.routes_by_host() {
        let host = headers
            .get(http::header::HOST)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| Error::NotFound("tenant".into()))?;
        let label = host.split(['.', ':']).next().unwrap_or("");
        let tenant = validate_tenant_id(label, &state.config.tenant.reserved_names)?;
        return Ok((tenant, raw_path.to_string()));
    }

    let trimmed = raw_path.trim_start_matches('/');
    let without_mount = trimmed.strip_prefix("m/").ok_or_else(|| Error::NotFound("tenant".into()))?;
    let mut segments = without_mount.splitn(2, '/');
    let tenant_slug = segments.next().unwrap_or("");
    let rest = segments.next().unwrap_or("");
    let tenant = validate_tenant_id(tenant_slug, &state.config.tenant.reserved_names)?;
    Ok((tenant, format!("/{rest}")))
}

fn mock_method_from(method: &Method) -> &str {
    method.as_str()
}

#[allow(clippy::too_many_arguments)]
pub async fn dispatch(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
    ws: Option<WebSocketUpgrade>,
    body: Bytes,
) -> Response {
    let (tenant, tenant_path) = match resolve_tenant(&state, &headers, &uri) {
        Ok(pair) => pair,
        Err(e) => return e.into_response(),
    };

    if tenant_path.starts_with("/__internal") {
        return Error::NotFound("route".into()).into_response();
    }

    let engine = match state.tenants.get_or_create(&tenant).await {
        Ok(engine) => engine,
        Err(e) => return e.into_response(),
    };

    if let Some(ws) = ws {
        let hub = engine.hub_arc();
        let store = engine.store_arc();
        let send_buffer = state.config.websocket.send_buffer;
        return ws.on_upgrade(move |socket| handle_socket(socket, hub, store, send_buffer));
    }

    let content_type = headers.get(http::header::CONTENT_TYPE).and_then(|v| v.to_str().ok());
    let body_string = if body.is_empty() { None } else { Some(String::from_utf8_lossy(&body).into_owned()) };
    let header_pairs: Vec<(String, String)> = headers
        .iter()
        .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.as_str().to_string(), v.to_string())))
        .collect();

    let request = crate::engine::MockRequest {
        method: mock_method_from(&method),
        path: &tenant_path,
        headers: header_pairs,
        query,
        body: body_string,
        content_type,
    };

    match engine.handle_request(request).await {
        Ok(response) => mock_response_into_axum(response),
        Err(e) => e.into_response(),
    }
}

fn mock_response_into_axum(response: crate::engine::MockResponse) -> Response {
    let status = StatusCode::from_u16(response.status).unwrap_or(StatusCode::OK);
    let mut builder = Response::builder().status(status);
    for (name, value) in &response.headers {
        builder = builder.header(name, value);
    }
    builder.body(axum::body::Body::from(response.body)).unwrap_or_else(|_| {
        (StatusCode::INTERNAL_SERVER_ERROR, Json(serde_json::json!({"error": "failed to build response"})))
            .into_response()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::tenant::TenantRegistry;
    use std::sync::Arc;

    fn test_state(dir: &tempfile::TempDir) -> AppState {
        let mut config = Config::default();
        config.storage.root_dir = dir.path().to_path_buf();
        let config = Arc::new(config);
        AppState { config: config.clone(), tenants: Arc::new(TenantRegistry::new(config)) }
    }

    #[tokio::test]
    async fn resolve_tenant_strips_path_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir);
        let headers = HeaderMap::new();
        let uri: Uri = "/m/acme/orders/42".parse().unwrap();
        let (tenant, path) = resolve_tenant(&state, &headers, &uri).unwrap();
        assert_eq!(tenant.as_str(), "acme");
        assert_eq!(path, "/orders/42");
    }

    #[tokio::test]
    async fn resolve_tenant_rejects_reserved_name() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir);
        let headers = HeaderMap::new();
        let uri: Uri = "/m/admin/anything".parse().unwrap();
        assert!(resolve_tenant(&state, &headers, &uri).is_err());
    }

    #[tokio::test]
    async fn resolve_tenant_rejects_missing_mount_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir);
        let headers = HeaderMap::new();
        let uri: Uri = "/acme/orders/42".parse().unwrap();
        assert!(resolve_tenant(&state, &headers, &uri).is_err());
    }

    #[tokio::test]
    async fn resolve_tenant_by_host_uses_leftmost_label() {
        let dir = tempfile::tempdir().unwrap();
        let mut state = test_state(&dir);
        let mut config = (*state.config).clone();
        config.tenant.routing = "host".to_string();
        state.config = Arc::new(config);

        let mut headers = HeaderMap::new();
        headers.insert(http::header::HOST, "acme.mocks.example.com".parse().unwrap());
        let uri: Uri = "/orders/42".parse().unwrap();
        let (tenant, path) = resolve_tenant(&state, &headers, &uri).unwrap();
        assert_eq!(tenant.as_str(), "acme");
        assert_eq!(path, "/orders/42");
    }

    #[tokio::test]
    async fn internal_prefix_is_rejected_after_stripping() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir);
        let headers = HeaderMap::new();
        let uri: Uri = "/m/acme/__internal/endpoints".parse().unwrap();
        let (_tenant, path) = resolve_tenant(&state, &headers, &uri).unwrap();
        assert!(path.starts_with("/__internal"));
    }
}
