//! Bearer-token validation (spec.md §6: scopes `v3:read`/`v3:write`,
//! no notion of user accounts beyond that). Tokens are issued by
//! whatever operates this gateway; this service only verifies them.

use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Claims {
    pub sub: String,
    pub scopes: Vec<String>,
    pub iss: String,
    pub aud: String,
    pub exp: u64,
    pub iat: u64,
}

impl Claims {
    pub fn has_scope(&self, scope: &str) -> bool {
        self.scopes.iter().any(|s| s == scope)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("token expired")]
    TokenExpired,
    #[error("invalid token")]
    InvalidToken,
    #[error("token missing required scope: {0}")]
    MissingScope(String),
    #[error("token validation failed: {0}")]
    Validation(String),
}

/// Validates pre-issued bearer tokens. No `generate_token`/login route
/// exists here on purpose; this gateway never mints credentials.
#[derive(Clone)]
pub struct AuthService {
    decoding_key: DecodingKey,
    issuer: String,
    audience: String,
}

impl AuthService {
    pub fn new(secret: &[u8], issuer: &str, audience: &str) -> Self {
        Self {
            decoding_key: DecodingKey::from_secret(secret),
            issuer: issuer.to_string(),
            audience: audience.to_string(),
        }
    }

    pub fn validate_token(&self, token: &str) -> Result<Claims, AuthError> {
        let mut validation = Validation::default();
        validation.set_issuer(&[&self.issuer]);
        validation.set_audience(&[&self.audience]);

        decode::<Claims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::TokenExpired,
                jsonwebtoken::errors::ErrorKind::InvalidToken
                | jsonwebtoken::errors::ErrorKind::InvalidSignature => AuthError::InvalidToken,
                _ => AuthError::Validation(e.to_string()),
            })
    }

    pub fn authorize(&self, token: &str, required_scope: &str) -> Result<Claims, AuthError> {
        let claims = self.validate_token(token)?;
        if !claims.has_scope(required_scope) {
            return Err(AuthError::MissingScope(required_scope.to_string()));
        }
        Ok(claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};

    fn service() -> AuthService {
        AuthService::new(b"test-secret-key-32-chars-long!!", "xg2g", "xg2g-api")
    }

    fn token_with(scopes: Vec<&str>, exp_offset_secs: i64) -> String {
        let now = chrono::Utc::now().timestamp();
        let claims = Claims {
            sub: "device-1".to_string(),
            scopes: scopes.into_iter().map(String::from).collect(),
            iss: "xg2g".to_string(),
            aud: "xg2g-api".to_string(),
            exp: (now + exp_offset_secs) as u64,
            iat: now as u64,
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(b"test-secret-key-32-chars-long!!"),
        )
        .unwrap()
    }

    #[test]
    fn valid_token_with_required_scope_authorizes() {
        let svc = service();
        let token = token_with(vec!["v3:read", "v3:write"], 3600);
        let claims = svc.authorize(&token, "v3:write").unwrap();
        assert_eq!(claims.sub, "device-1");
    }

    #[test]
    fn missing_scope_is_rejected() {
        let svc = service();
        let token = token_with(vec!["v3:read"], 3600);
        let err = svc.authorize(&token, "v3:write").unwrap_err();
        assert!(matches!(err, AuthError::MissingScope(_)));
    }

    #[test]
    fn expired_token_is_rejected() {
        let svc = service();
        let token = token_with(vec!["v3:read"], -10);
        let err = svc.validate_token(&token).unwrap_err();
        assert!(matches!(err, AuthError::TokenExpired));
    }
}
