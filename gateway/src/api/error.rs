//! API error handling: RFC 7807 Problem Details responses (spec.md §4.8:
//! "All error replies use RFC 7807 Problem Details with stable
//! machine-readable `code`, numeric `status`, and `instance` containing
//! the request path").

use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use utoipa::ToSchema;

use crate::error::Error;

/// RFC 7807 problem-details body.
#[derive(Debug, Serialize, ToSchema)]
pub struct ProblemDetails {
    #[serde(rename = "type")]
    pub problem_type: String,
    pub title: String,
    pub status: u16,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    /// Filled in by the route handler with the request path; left empty
    /// when an error is constructed outside request context.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub instance: String,
}

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: &'static str,
    pub title: &'static str,
    pub detail: Option<String>,
    pub instance: String,
    pub retry_after_secs: Option<u64>,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, title: &'static str) -> Self {
        Self { status, code, title, detail: None, instance: String::new(), retry_after_secs: None }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn with_instance(mut self, instance: impl Into<String>) -> Self {
        self.instance = instance.into();
        self
    }

    pub fn with_retry_after(mut self, secs: u64) -> Self {
        self.retry_after_secs = Some(secs);
        self
    }

    pub fn bad_request(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "BAD_REQUEST", "Bad Request").with_detail(detail)
    }

    pub fn unauthorized(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "UNAUTHORIZED", "Unauthorized").with_detail(detail)
    }

    pub fn forbidden(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, "FORBIDDEN", "Forbidden").with_detail(detail)
    }

    pub fn not_found(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "NOT_FOUND", "Not Found").with_detail(detail)
    }

    pub fn conflict(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, "CONFLICT", "Conflict").with_detail(detail)
    }

    pub fn gone(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::GONE, "GONE", "Gone").with_detail(detail)
    }

    pub fn internal(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", "Internal Server Error").with_detail(detail)
    }

    pub fn service_unavailable(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::SERVICE_UNAVAILABLE, "SERVICE_UNAVAILABLE", "Service Unavailable").with_detail(detail)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ProblemDetails {
            problem_type: format!("https://xg2g.dev/problems/{}", self.code.to_lowercase()),
            title: self.title.to_string(),
            status: self.status.as_u16(),
            code: self.code.to_string(),
            detail: self.detail,
            instance: self.instance,
        };

        let mut response = (self.status, Json(body)).into_response();
        response
            .headers_mut()
            .insert(axum::http::header::CONTENT_TYPE, HeaderValue::from_static("application/problem+json"));
        if let Some(secs) = self.retry_after_secs {
            if let Ok(value) = HeaderValue::from_str(&secs.to_string()) {
                response.headers_mut().insert(axum::http::header::RETRY_AFTER, value);
            }
        }
        response
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        match err {
            Error::NotFound { entity_type, id } => ApiError::not_found(format!("{entity_type} '{id}' not found")),
            Error::Validation(msg) => ApiError::bad_request(msg),
            Error::Configuration(msg) => {
                tracing::error!("configuration error: {}", msg);
                ApiError::internal("configuration error")
            }
            Error::Conflict(msg) => ApiError::conflict(msg),
            Error::SessionTerminal => ApiError::conflict("session is in a terminal state"),
            Error::LeaseBusy(key) => {
                ApiError::conflict(format!("lease busy: {key}")).with_retry_after(5)
            }
            Error::TuneTimeout(sref) => {
                ApiError::service_unavailable(format!("tune timeout for {sref}")).with_retry_after(10)
            }
            Error::UpstreamUnavailable(msg) => {
                ApiError::service_unavailable(msg).with_retry_after(10)
            }
            Error::UpstreamResultFalse => {
                ApiError::service_unavailable("receiver rejected the request").with_retry_after(10)
            }
            Error::PathConfinement(msg) => ApiError::bad_request(msg),
            Error::Store(e) => {
                tracing::error!("store error: {}", e);
                ApiError::internal("store error occurred")
            }
            Error::Serialization(e) => ApiError::bad_request(format!("malformed payload: {e}")),
            Error::Io(e) => {
                tracing::error!("io error: {}", e);
                ApiError::internal("io error occurred")
            }
            Error::Internal(msg) => {
                tracing::error!("internal error: {}", msg);
                ApiError::internal("an unexpected error occurred")
            }
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_maps_to_404() {
        let err = ApiError::not_found("Session 'x' not found");
        assert_eq!(err.status, StatusCode::NOT_FOUND);
        assert_eq!(err.code, "NOT_FOUND");
    }

    #[test]
    fn lease_busy_carries_retry_after() {
        let err: ApiError = Error::LeaseBusy("tuner:0".into()).into();
        assert_eq!(err.status, StatusCode::CONFLICT);
        assert_eq!(err.retry_after_secs, Some(5));
    }
}
