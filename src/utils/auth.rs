use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http;
use axum::middleware::Next;
use axum::response::Response;
use chrono::Utc;
use cyder_tools::auth::{decode_jwt, DecodingKey, EncodingKey, JwtError, JwtValidation};
use cyder_tools::log::warn;
use serde::{Deserialize, Serialize};

use crate::controller::GatewayError;
use crate::database::user::User;
use crate::service::app_state::AppState;

const ISSUER: &str = "model-gateway";
#[cfg(test)]
const SESSION_TOKEN_ISSUE_SEC: u64 = 3600;

pub struct SessionKeys {
    #[cfg_attr(not(test), allow(dead_code))]
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl SessionKeys {
    pub fn new(secret: &[u8]) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct SessionClaims {
    aud: String,
    exp: u64,
    iat: u64,
    iss: String,
    sub: String,
}

/// The user behind a verified session token.
#[derive(Clone, Debug)]
pub struct SessionUser(pub User);

/// Session tokens are minted by the login flow; tests mint their own.
#[cfg(test)]
pub fn issue_session_token(keys: &SessionKeys, user_id: i64) -> String {
    let now = Utc::now().timestamp() as u64;
    let claims = SessionClaims {
        aud: user_id.to_string(),
        exp: now + SESSION_TOKEN_ISSUE_SEC,
        iat: now,
        iss: ISSUER.to_string(),
        sub: "ACCESS_TOKEN".to_string(),
    };
    cyder_tools::auth::issue_jwt(&keys.encoding, &claims)
}

fn decode_session_token(keys: &SessionKeys, token: &str) -> Result<i64, JwtError> {
    let validate = JwtValidation {
        validate_aud: false,
        issuer: ISSUER,
        required_spec: &["sub", "iat", "exp"],
    };
    let claims = decode_jwt::<SessionClaims>(&keys.decoding, token, validate)?;
    if claims.exp < Utc::now().timestamp() as u64 {
        return Err(JwtError::Invalid);
    }
    claims.aud.parse::<i64>().map_err(|_| JwtError::Parse)
}

/// Extracts the credential from an `Authorization: Bearer <token>` header.
pub fn bearer_token(headers: &http::HeaderMap) -> Option<&str> {
    let value = headers.get(http::header::AUTHORIZATION)?.to_str().ok()?;
    let token = value.strip_prefix("Bearer ")?.trim();
    if token.is_empty() { None } else { Some(token) }
}

pub async fn session_auth_middleware(
    State(app_state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Result<Response, GatewayError> {
    let token = bearer_token(req.headers())
        .ok_or_else(|| GatewayError::Unauthenticated("header Authorization is needed".to_string()))?;
    let user_id = decode_session_token(&app_state.session_keys, token)
        .map_err(|_| GatewayError::Unauthenticated("token invalid or expired".to_string()))?;

    let user = app_state
        .store
        .get_user(user_id)
        .await?
        .ok_or_else(|| GatewayError::Unauthenticated("token invalid or expired".to_string()))?;
    if !user.is_active_at(Utc::now().timestamp_millis()) {
        warn!("Rejected session for disabled user {}", user.id);
        return Err(GatewayError::Forbidden("user is disabled".to_string()));
    }

    req.extensions_mut().insert(SessionUser(user));
    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn bearer_header_parsing() {
        let mut headers = http::HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);

        headers.insert(http::header::AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert_eq!(bearer_token(&headers), None);

        headers.insert(http::header::AUTHORIZATION, HeaderValue::from_static("Bearer "));
        assert_eq!(bearer_token(&headers), None);

        headers.insert(http::header::AUTHORIZATION, HeaderValue::from_static("Bearer sk-123"));
        assert_eq!(bearer_token(&headers), Some("sk-123"));
    }

    #[test]
    fn session_token_round_trip() {
        let keys = SessionKeys::new(b"test-secret");
        let token = issue_session_token(&keys, 42);
        assert_eq!(decode_session_token(&keys, &token).unwrap(), 42);

        let other = SessionKeys::new(b"another-secret");
        assert!(decode_session_token(&other, &token).is_err());
    }
}
