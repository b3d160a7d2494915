//! Crate-wide error type and its HTTP mapping.
//!
//! Every fallible internal operation funnels into [`Error`]. Its
//! `IntoResponse` impl performs the mapping table from the error handling
//! design: client-caused failures carry a descriptive message, while
//! `Storage`/`Internal` never leak their underlying cause to the response
//! body (it still reaches the logs via `tracing::error!`).

use axum::{
    response::{IntoResponse, Response},
    Json,
};
use http::StatusCode;
use serde::Serialize;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(#[from] Box<figment::Error>),

    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("rate limit exceeded")]
    RateLimited { limit: u32, remaining: u32, reset_at: u64, retry_after_secs: u64 },

    #[error("unauthorized")]
    Unauthorized,

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<figment::Error> for Error {
    fn from(e: figment::Error) -> Self {
        Error::Config(Box::new(e))
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    code: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    limit: Option<u32>,
    #[serde(rename = "retryAfter", skip_serializing_if = "Option::is_none")]
    retry_after: Option<u64>,
}

impl ErrorBody {
    fn plain(msg: impl Into<String>) -> Self {
        Self { error: msg.into(), code: None, limit: None, retry_after: None }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        match self {
            Error::NotFound(what) => {
                tracing::warn!(what, "not found");
                (StatusCode::NOT_FOUND, Json(ErrorBody::plain(format!("{} not found", what))))
                    .into_response()
            }
            Error::RateLimited { limit, remaining, reset_at, retry_after_secs } => {
                let body = ErrorBody {
                    error: "Rate limit exceeded".to_string(),
                    code: Some("RATE_LIMIT_EXCEEDED"),
                    limit: Some(limit),
                    retry_after: Some(retry_after_secs),
                };
                let mut response = (StatusCode::TOO_MANY_REQUESTS, Json(body)).into_response();
                let headers = response.headers_mut();
                for (name, value) in [
                    ("x-ratelimit-limit", limit.to_string()),
                    ("x-ratelimit-remaining", remaining.to_string()),
                    ("x-ratelimit-reset", reset_at.to_string()),
                    ("retry-after", retry_after_secs.to_string()),
                ] {
                    if let Ok(value) = http::HeaderValue::from_str(&value) {
                        headers.insert(http::header::HeaderName::from_static(name), value);
                    }
                }
                response
            }
            Error::Unauthorized => {
                tracing::warn!("unauthorized request");
                (StatusCode::UNAUTHORIZED, Json(ErrorBody::plain("Unauthorized"))).into_response()
            }
            Error::BadRequest(msg) => (StatusCode::BAD_REQUEST, Json(ErrorBody::plain(msg))).into_response(),
            Error::Conflict(msg) => (StatusCode::CONFLICT, Json(ErrorBody::plain(msg))).into_response(),
            Error::Storage(e) => {
                tracing::error!(error = %e, "storage failure");
                (StatusCode::INTERNAL_SERVER_ERROR, Json(ErrorBody::plain("Internal server error")))
                    .into_response()
            }
            Error::Config(e) => {
                tracing::error!(error = %e, "configuration error");
                (StatusCode::INTERNAL_SERVER_ERROR, Json(ErrorBody::plain("Internal server error")))
                    .into_response()
            }
            Error::Internal(msg) => {
                tracing::error!(error = %msg, "internal error");
                (StatusCode::INTERNAL_SERVER_ERROR, Json(ErrorBody::plain("Internal server error")))
                    .into_response()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_maps_to_404() {
        let response = Error::NotFound("endpoint".into()).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn rate_limited_carries_retry_after_header() {
        let response =
            Error::RateLimited { limit: 5, remaining: 0, reset_at: 1_700_000_060, retry_after_secs: 12 }
                .into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers().get(http::header::RETRY_AFTER).unwrap(), "12");
    }

    #[test]
    fn rate_limited_carries_all_three_rate_limit_headers() {
        let response =
            Error::RateLimited { limit: 5, remaining: 0, reset_at: 1_700_000_060, retry_after_secs: 12 }
                .into_response();
        assert_eq!(response.headers().get("x-ratelimit-limit").unwrap(), "5");
        assert_eq!(response.headers().get("x-ratelimit-remaining").unwrap(), "0");
        assert_eq!(response.headers().get("x-ratelimit-reset").unwrap(), "1700000060");
    }

    #[test]
    fn storage_errors_do_not_leak_internal_text() {
        let e = Error::Storage(sqlx::Error::RowNotFound);
        let response = e.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
