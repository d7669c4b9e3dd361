//! Scope-checking bearer-auth middleware. Grounded on the teacher's
//! `JwtAuthLayer`/`JwtAuthService<S>` tower boilerplate, adapted to
//! check a required scope rather than just validity, and to answer with
//! RFC 7807 bodies instead of plain text.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::http::header::AUTHORIZATION;
use axum::response::{IntoResponse, Response};
use tower::{Layer, Service};

use crate::api::auth::{AuthError, AuthService};
use crate::api::error::ApiError;

fn auth_error_response(err: AuthError) -> Response {
    match err {
        AuthError::TokenExpired => ApiError::unauthorized("token expired").into_response(),
        AuthError::InvalidToken | AuthError::Validation(_) => {
            ApiError::unauthorized("invalid token").into_response()
        }
        AuthError::MissingScope(scope) => {
            ApiError::forbidden(format!("token missing required scope: {scope}")).into_response()
        }
    }
}

/// Tower layer requiring a bearer token carrying `required_scope`.
#[derive(Clone)]
pub struct ScopeAuthLayer {
    auth: Arc<AuthService>,
    required_scope: &'static str,
}

impl ScopeAuthLayer {
    pub fn new(auth: Arc<AuthService>, required_scope: &'static str) -> Self {
        Self { auth, required_scope }
    }
}

impl<S> Layer<S> for ScopeAuthLayer {
    type Service = ScopeAuthService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        ScopeAuthService { inner, auth: self.auth.clone(), required_scope: self.required_scope }
    }
}

#[derive(Clone)]
pub struct ScopeAuthService<S> {
    inner: S,
    auth: Arc<AuthService>,
    required_scope: &'static str,
}

impl<S, B> Service<axum::http::Request<B>> for ScopeAuthService<S>
where
    S: Service<axum::http::Request<B>, Response = Response> + Clone + Send + 'static,
    S::Future: Send,
    B: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: axum::http::Request<B>) -> Self::Future {
        let auth = self.auth.clone();
        let required_scope = self.required_scope;
        let mut inner = self.inner.clone();

        Box::pin(async move {
            let header = match request.headers().get(AUTHORIZATION) {
                Some(h) => h,
                None => return Ok(ApiError::unauthorized("missing authorization header").into_response()),
            };

            let header_str = match header.to_str() {
                Ok(s) => s,
                Err(_) => return Ok(ApiError::unauthorized("malformed authorization header").into_response()),
            };

            let Some(token) = header_str.strip_prefix("Bearer ") else {
                return Ok(ApiError::unauthorized("authorization header is not a bearer token").into_response());
            };

            let claims = match auth.authorize(token, required_scope) {
                Ok(claims) => claims,
                Err(e) => return Ok(auth_error_response(e)),
            };

            let (mut parts, body) = request.into_parts();
            parts.extensions.insert(claims);
            let request = axum::http::Request::from_parts(parts, body);

            inner.call(request).await
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    #[test]
    fn layer_can_be_constructed() {
        let auth = Arc::new(AuthService::new(b"secret-32-chars-long-enough!!!!", "xg2g", "xg2g-api"));
        let layer = ScopeAuthLayer::new(auth, "v3:read");
        assert_eq!(layer.required_scope, "v3:read");
    }

    #[test]
    fn request_without_header_is_detected() {
        let request: Request<()> = Request::builder().body(()).unwrap();
        assert!(request.headers().get(AUTHORIZATION).is_none());
    }
}
