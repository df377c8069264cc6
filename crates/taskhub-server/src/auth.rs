//! HS256 JWT authentication and the `AuthUser` extractor.
//!
//! Tokens are read from `Authorization: Bearer <token>` or, for browser
//! WebSocket upgrades that cannot set headers, the `token` query parameter.

use std::sync::Arc;
use std::time::Duration;

use axum::Json;
use axum::extract::{FromRef, FromRequestParts, Query};
use axum::http::StatusCode;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use serde_json::json;
use taskhub_core::{UserId, UserIdentity};
use tracing::debug;

/// Token claims.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Claims {
    /// User primary key.
    pub user_id: UserId,
    /// Display name.
    pub username: String,
    /// Application role.
    pub role: String,
    /// Expiry, seconds since the epoch.
    pub exp: u64,
}

/// Authentication failures. All map to `401` except signing errors.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// No token in the header or query string.
    #[error("Authorization token required")]
    Missing,
    /// Bad signature, malformed token or wrong algorithm.
    #[error("Invalid token")]
    Invalid,
    /// The token's `exp` has passed.
    #[error("Token expired")]
    Expired,
    /// A token could not be minted.
    #[error("failed to sign token: {0}")]
    Signing(String),
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = match self {
            Self::Signing(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::UNAUTHORIZED,
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

/// Signs and verifies tokens with one shared secret.
pub struct JwtAuth {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
}

impl JwtAuth {
    /// Create an authenticator for `secret`.
    pub fn new(secret: &str) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::new(Algorithm::HS256),
        }
    }

    /// Mint a token for `user` valid for `ttl`.
    pub fn issue(&self, user: &UserIdentity, ttl: Duration) -> Result<String, AuthError> {
        let exp = Utc::now().timestamp().max(0) as u64 + ttl.as_secs();
        self.sign(&Claims {
            user_id: user.id,
            username: user.username.clone(),
            role: user.role.clone(),
            exp,
        })
    }

    /// Sign arbitrary claims.
    pub fn sign(&self, claims: &Claims) -> Result<String, AuthError> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding)
            .map_err(|e| AuthError::Signing(e.to_string()))
    }

    /// Verify a token and return the identity it carries.
    pub fn verify(&self, token: &str) -> Result<UserIdentity, AuthError> {
        let data = decode::<Claims>(token, &self.decoding, &self.validation).map_err(|e| {
            debug!(error = %e, "token rejected");
            match e.kind() {
                ErrorKind::ExpiredSignature => AuthError::Expired,
                _ => AuthError::Invalid,
            }
        })?;
        Ok(UserIdentity {
            id: data.claims.user_id,
            username: data.claims.username,
            role: data.claims.role,
        })
    }
}

/// Mint a token for `user` with `secret`.
pub fn issue_token(secret: &str, user: &UserIdentity, ttl: Duration) -> Result<String, AuthError> {
    JwtAuth::new(secret).issue(user, ttl)
}

#[derive(Deserialize)]
struct TokenQuery {
    token: Option<String>,
}

fn bearer_token(parts: &Parts) -> Option<String> {
    parts
        .headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
}

fn query_token(parts: &Parts) -> Option<String> {
    Query::<TokenQuery>::try_from_uri(&parts.uri)
        .ok()
        .and_then(|q| q.0.token)
        .filter(|t| !t.is_empty())
}

/// The authenticated caller of a request.
#[derive(Clone, Debug)]
pub struct AuthUser(pub UserIdentity);

impl<S> FromRequestParts<S> for AuthUser
where
    Arc<JwtAuth>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts)
            .or_else(|| query_token(parts))
            .ok_or(AuthError::Missing)?;
        let auth = Arc::<JwtAuth>::from_ref(state);
        auth.verify(&token).map(AuthUser)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use axum::http::Request;

    fn alice() -> UserIdentity {
        UserIdentity {
            id: 7,
            username: "alice".into(),
            role: "manager".into(),
        }
    }

    #[test]
    fn issue_then_verify() {
        let auth = JwtAuth::new("secret");
        let token = auth.issue(&alice(), Duration::from_secs(60)).unwrap();
        assert_eq!(auth.verify(&token).unwrap(), alice());
    }

    #[test]
    fn wrong_secret_is_invalid() {
        let token = issue_token("one", &alice(), Duration::from_secs(60)).unwrap();
        assert_matches!(JwtAuth::new("two").verify(&token), Err(AuthError::Invalid));
    }

    #[test]
    fn expired_token_is_rejected() {
        let auth = JwtAuth::new("secret");
        let token = auth
            .sign(&Claims {
                user_id: 7,
                username: "alice".into(),
                role: "manager".into(),
                exp: (Utc::now().timestamp() - 3600) as u64,
            })
            .unwrap();
        assert_matches!(auth.verify(&token), Err(AuthError::Expired));
    }

    #[test]
    fn garbage_is_invalid() {
        assert_matches!(JwtAuth::new("s").verify("not.a.jwt"), Err(AuthError::Invalid));
    }

    #[test]
    fn claims_use_camel_case() {
        let value = serde_json::to_value(Claims {
            user_id: 1,
            username: "a".into(),
            role: "r".into(),
            exp: 0,
        })
        .unwrap();
        assert_eq!(value["userId"], 1);
    }

    #[test]
    fn token_sources() {
        let (parts, ()) = Request::builder()
            .uri("/ws?token=abc")
            .header(AUTHORIZATION, "Bearer xyz")
            .body(())
            .unwrap()
            .into_parts();
        assert_eq!(bearer_token(&parts).as_deref(), Some("xyz"));
        assert_eq!(query_token(&parts).as_deref(), Some("abc"));

        let (parts, ()) = Request::builder().uri("/ws").body(()).unwrap().into_parts();
        assert!(bearer_token(&parts).is_none());
        assert!(query_token(&parts).is_none());
    }

    #[tokio::test]
    async fn extractor_prefers_header() {
        let auth = Arc::new(JwtAuth::new("secret"));
        let token = auth.issue(&alice(), Duration::from_secs(60)).unwrap();
        let (mut parts, ()) = Request::builder()
            .uri("/ws?token=bogus")
            .header(AUTHORIZATION, format!("Bearer {token}"))
            .body(())
            .unwrap()
            .into_parts();
        let AuthUser(user) = AuthUser::from_request_parts(&mut parts, &auth).await.unwrap();
        assert_eq!(user.id, 7);
    }

    #[tokio::test]
    async fn extractor_rejects_missing_token() {
        let auth = Arc::new(JwtAuth::new("secret"));
        let (mut parts, ()) = Request::builder().uri("/ws").body(()).unwrap().into_parts();
        let err = AuthUser::from_request_parts(&mut parts, &auth).await.unwrap_err();
        assert_matches!(err, AuthError::Missing);
        assert_eq!(err.into_response().status(), StatusCode::UNAUTHORIZED);
    }
}
