//! Internal Admin Surface (C8): authenticated CRUD over a tenant's
//! endpoints, rules, and logs, mounted at `/__internal/tenants/:tenant/...`.
//!
//! §6's route table names paths like `/__internal/endpoints` with no tenant
//! segment, but storage (§4.5, C12) is strictly per-tenant — a single
//! process-wide endpoint list can't exist. The tenant segment is added here
//! to resolve that; see DESIGN.md for the full note. Keeping the admin
//! surface under its own top-level prefix, entirely disjoint from the
//! public `/m/{tenant}/...` space, also makes the "never reachable from the
//! public path" guarantee in §6 structural rather than a runtime check.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::ids::{EndpointId, RuleId};
use crate::model::{Endpoint, EndpointCreate, EndpointUpdate, Rule, RuleCreate, RuleUpdate};
use crate::state::AppState;

#[derive(Serialize)]
struct DataResponse<T> {
    data: T,
}

#[derive(Serialize)]
struct SuccessResponse {
    success: bool,
}

impl SuccessResponse {
    fn ok() -> Self {
        Self { success: true }
    }
}

/// Rejects any request whose `X-Internal-Auth` header does not match the
/// configured shared secret (§6).
async fn require_shared_secret(
    State(state): State<AppState>,
    headers: HeaderMap,
    request: axum::extract::Request,
    next: Next,
) -> Response {
    let provided = headers.get("x-internal-auth").and_then(|v| v.to_str().ok());
    match provided {
        Some(secret) if secret == state.config.admin.shared_secret => next.run(request).await,
        _ => Error::Unauthorized.into_response(),
    }
}

async fn tenant_engine(
    state: &AppState,
    tenant: &str,
) -> Result<Arc<crate::engine::TenantEngine>> {
    let tenant_id = crate::ids::TenantId::from_raw(tenant);
    state.tenants.get_or_create(&tenant_id).await
}

/// Looks up an already-provisioned tenant without creating one. A tenant
/// that has never served a request or had config written has nothing to
/// list, so every read-only listing endpoint below reads as empty for it
/// rather than provisioning an empty SQLite file as a side effect of a GET.
fn existing_tenant_engine(state: &AppState, tenant: &str) -> Option<Arc<crate::engine::TenantEngine>> {
    let tenant_id = crate::ids::TenantId::from_raw(tenant);
    state.tenants.get_existing(&tenant_id)
}

async fn list_endpoints(
    State(state): State<AppState>,
    Path(tenant): Path<String>,
) -> Result<Json<DataResponse<Vec<Endpoint>>>> {
    let Some(engine) = existing_tenant_engine(&state, &tenant) else {
        return Ok(Json(DataResponse { data: Vec::new() }));
    };
    let data = engine.list_endpoints().await?;
    Ok(Json(DataResponse { data }))
}

async fn create_endpoint(
    State(state): State<AppState>,
    Path(tenant): Path<String>,
    Json(create): Json<EndpointCreate>,
) -> Result<Response> {
    let engine = tenant_engine(&state, &tenant).await?;
    let endpoint = engine.create_endpoint(create).await?;
    Ok((StatusCode::CREATED, Json(DataResponse { data: endpoint })).into_response())
}

async fn update_endpoint(
    State(state): State<AppState>,
    Path((tenant, id)): Path<(String, String)>,
    Json(update): Json<EndpointUpdate>,
) -> Result<Response> {
    let engine = tenant_engine(&state, &tenant).await?;
    let id = parse_id::<EndpointId>(&id)?;
    let Some(endpoint) = engine.update_endpoint(&id, update).await? else {
        return Err(Error::NotFound("endpoint".into()));
    };
    Ok((StatusCode::OK, Json(DataResponse { data: endpoint })).into_response())
}

async fn delete_endpoint(
    State(state): State<AppState>,
    Path((tenant, id)): Path<(String, String)>,
) -> Result<Json<SuccessResponse>> {
    let engine = tenant_engine(&state, &tenant).await?;
    let id = parse_id::<EndpointId>(&id)?;
    engine.delete_endpoint(&id).await?;
    Ok(Json(SuccessResponse::ok()))
}

#[derive(Deserialize)]
struct LogsQuery {
    #[serde(rename = "endpointId")]
    endpoint_id: Option<String>,
    limit: Option<i64>,
}

async fn list_logs(
    State(state): State<AppState>,
    Path(tenant): Path<String>,
    Query(query): Query<LogsQuery>,
) -> Result<Json<DataResponse<Vec<crate::model::RequestLog>>>> {
    let endpoint_id = query.endpoint_id.as_deref().map(parse_id::<EndpointId>).transpose()?;
    let Some(engine) = existing_tenant_engine(&state, &tenant) else {
        return Ok(Json(DataResponse { data: Vec::new() }));
    };
    // A caller-supplied `limit` is just a hint: `Store::list_logs` floors a
    // non-positive value to its own default and caps everything else at its
    // maximum, so a request like `?limit=-1` or `?limit=999999999` can never
    // return the whole log table.
    let data = engine.list_logs(endpoint_id.as_ref(), query.limit.unwrap_or(100)).await?;
    Ok(Json(DataResponse { data }))
}

async fn clear_logs(
    State(state): State<AppState>,
    Path(tenant): Path<String>,
    Query(query): Query<LogsQuery>,
) -> Result<Json<SuccessResponse>> {
    let engine = tenant_engine(&state, &tenant).await?;
    let endpoint_id = query.endpoint_id.as_deref().map(parse_id::<EndpointId>).transpose()?;
    engine.clear_logs(endpoint_id.as_ref()).await?;
    Ok(Json(SuccessResponse::ok()))
}

#[derive(Deserialize)]
struct RulesQuery {
    #[serde(rename = "endpointId")]
    endpoint_id: Option<String>,
}

async fn list_rules(
    State(state): State<AppState>,
    Path(tenant): Path<String>,
    Query(query): Query<RulesQuery>,
) -> Result<Json<DataResponse<Vec<Rule>>>> {
    let endpoint_id = query.endpoint_id.as_deref().map(parse_id::<EndpointId>).transpose()?;
    let Some(engine) = existing_tenant_engine(&state, &tenant) else {
        return Ok(Json(DataResponse { data: Vec::new() }));
    };
    let data = engine.list_rules(endpoint_id.as_ref()).await?;
    Ok(Json(DataResponse { data }))
}

async fn create_rule(
    State(state): State<AppState>,
    Path(tenant): Path<String>,
    Json(create): Json<RuleCreate>,
) -> Result<Response> {
    let engine = tenant_engine(&state, &tenant).await?;
    let rule = engine.create_rule(create).await?;
    Ok((StatusCode::CREATED, Json(DataResponse { data: rule })).into_response())
}

async fn update_rule(
    State(state): State<AppState>,
    Path((tenant, id)): Path<(String, String)>,
    Json(update): Json<RuleUpdate>,
) -> Result<Response> {
    let engine = tenant_engine(&state, &tenant).await?;
    let id = parse_id::<RuleId>(&id)?;
    let Some(rule) = engine.update_rule(&id, update).await? else {
        return Err(Error::NotFound("rule".into()));
    };
    Ok((StatusCode::OK, Json(DataResponse { data: rule })).into_response())
}

async fn delete_rule(
    State(state): State<AppState>,
    Path((tenant, id)): Path<(String, String)>,
) -> Result<Json<SuccessResponse>> {
    let engine = tenant_engine(&state, &tenant).await?;
    let id = parse_id::<RuleId>(&id)?;
    if !engine.delete_rule(&id).await? {
        return Err(Error::NotFound("rule".into()));
    }
    Ok(Json(SuccessResponse::ok()))
}

fn parse_id<T: std::str::FromStr>(raw: &str) -> Result<T> {
    raw.parse().map_err(|_| Error::BadRequest(format!("invalid id: {raw}")))
}

/// Builds the `/__internal` router, gated by [`require_shared_secret`].
pub fn router(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/tenants/:tenant/endpoints", get(list_endpoints).post(create_endpoint))
        .route("/tenants/:tenant/endpoints/:id", put(update_endpoint).delete(delete_endpoint))
        .route("/tenants/:tenant/logs", get(list_logs).delete(clear_logs))
        .route("/tenants/:tenant/rules", get(list_rules).post(create_rule))
        .route("/tenants/:tenant/rules/:id", put(update_rule).delete(delete_rule))
        .route_layer(middleware::from_fn_with_state(state, require_shared_secret))
}
