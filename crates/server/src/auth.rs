//! Bearer credential verification middleware.

use crate::error::ApiError;
use crate::state::AppState;
use axum::extract::{Request, State};
use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::Response;
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde_json::{Map, Value};
use std::collections::HashSet;
use subtle::ConstantTimeEq;
use trc_core::config::AuthConfig;

/// Why a request was rejected.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuthFailure {
    /// No `Authorization` header, or a scheme other than `Bearer`.
    MissingBearerToken,
    /// A bearer credential that did not verify.
    InvalidToken,
}

impl AuthFailure {
    /// Log field value.
    pub fn reason(self) -> &'static str {
        match self {
            Self::MissingBearerToken => "missing_bearer_token",
            Self::InvalidToken => "invalid_token",
        }
    }

    /// Client-visible message.
    pub fn message(self) -> &'static str {
        match self {
            Self::MissingBearerToken => "Missing bearer token",
            Self::InvalidToken => "Invalid token",
        }
    }
}

impl From<AuthFailure> for ApiError {
    fn from(failure: AuthFailure) -> Self {
        ApiError::Unauthorized(failure.message().to_string())
    }
}

/// Verifies bearer credentials against the configured secret.
pub enum Authenticator {
    /// HMAC-signed JWTs.
    Jwt {
        key: DecodingKey,
        validation: Box<Validation>,
    },
    /// A static token compared in constant time.
    SharedSecret { secret: Vec<u8> },
}

impl Authenticator {
    pub fn from_config(config: &AuthConfig) -> Self {
        match config {
            AuthConfig::Jwt { secret } => Self::jwt(secret),
            AuthConfig::SharedSecret { secret } => Self::SharedSecret {
                secret: secret.as_bytes().to_vec(),
            },
        }
    }

    fn jwt(secret: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.algorithms = vec![Algorithm::HS256, Algorithm::HS384, Algorithm::HS512];
        // exp and nbf are enforced only when the token carries them.
        validation.required_spec_claims = HashSet::new();
        validation.validate_exp = true;
        validation.validate_nbf = true;
        validation.validate_aud = false;
        validation.leeway = 0;

        Self::Jwt {
            key: DecodingKey::from_secret(secret.as_bytes()),
            validation: Box::new(validation),
        }
    }

    /// Auth mode name, as in config.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Jwt { .. } => "jwt",
            Self::SharedSecret { .. } => "shared-secret",
        }
    }

    /// Check an `Authorization` header value.
    pub fn authenticate(&self, authorization: Option<&str>) -> Result<(), AuthFailure> {
        let token = authorization
            .and_then(bearer_token)
            .ok_or(AuthFailure::MissingBearerToken)?;

        let valid = match self {
            Self::Jwt { key, validation } => {
                jsonwebtoken::decode::<Map<String, Value>>(token, key, validation).is_ok()
            }
            Self::SharedSecret { secret } => shared_secret_matches(token.as_bytes(), secret),
        };

        if valid {
            Ok(())
        } else {
            Err(AuthFailure::InvalidToken)
        }
    }
}

impl std::fmt::Debug for Authenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Authenticator")
            .field("kind", &self.kind())
            .finish_non_exhaustive()
    }
}

/// Extract the token from a `Bearer <token>` header value.
/// The scheme is case-insensitive (RFC 6750).
fn bearer_token(value: &str) -> Option<&str> {
    let scheme = value.get(..7)?;
    if scheme.eq_ignore_ascii_case("bearer ") {
        Some(value[7..].trim())
    } else {
        None
    }
}

fn shared_secret_matches(token: &[u8], secret: &[u8]) -> bool {
    if token.len() != secret.len() {
        return false;
    }
    token.ct_eq(secret).into()
}

fn authorization_header(headers: &HeaderMap) -> Option<&str> {
    headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok())
}

/// Rejects every request without a valid bearer credential.
pub async fn auth_middleware(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if let Err(failure) = state.auth.authenticate(authorization_header(req.headers())) {
        tracing::warn!(
            method = %req.method(),
            path = %req.uri().path(),
            reason = failure.reason(),
            "Unauthorized request"
        );
        return Err(failure.into());
    }

    Ok(next.run(req).await)
}
