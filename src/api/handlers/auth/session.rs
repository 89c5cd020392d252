//! Session endpoints and cookie plumbing.
//!
//! Flow Overview:
//! 1) Extract the session token from the cookie (or a bearer header).
//! 2) Resolve the SHA-256 digest against the session store.
//! 3) Map every miss (unknown, expired, inactive user) to the same 401.

use axum::{
    extract::Extension,
    http::{
        header::{InvalidHeaderValue, AUTHORIZATION, SET_COOKIE},
        HeaderMap, HeaderValue, StatusCode,
    },
    response::IntoResponse,
    Json,
};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::{debug, error};

use super::{
    state::{AuthConfig, AuthState},
    storage::{delete_session, delete_sessions_for_user, resolve_session, SessionLookup,
        SessionRecord},
    types::SessionResponse,
    utils::hash_session_token,
};
use crate::api::handlers::audit;

pub(crate) const SESSION_COOKIE_NAME: &str = "greenroom_session";

/// Uniform body for every 401 so callers cannot probe session state.
pub(crate) const UNAUTHENTICATED_MESSAGE: &str = "Authentication required";

#[utoipa::path(
    get,
    path = "/v1/auth/session",
    responses(
        (status = 200, description = "Session is active", body = SessionResponse),
        (status = 401, description = "Missing, expired, or invalid session")
    ),
    tag = "auth"
)]
pub async fn session(headers: HeaderMap, pool: Extension<PgPool>) -> impl IntoResponse {
    match authenticate_session(&headers, &pool).await {
        Ok(Some(record)) => {
            let response = SessionResponse {
                user_id: record.user_id.to_string(),
                email: record.email,
                display_name: record.display_name,
                role: record.role.as_str().to_string(),
            };
            (StatusCode::OK, Json(response)).into_response()
        }
        Ok(None) => (StatusCode::UNAUTHORIZED, UNAUTHENTICATED_MESSAGE).into_response(),
        Err(status) => status.into_response(),
    }
}

/// Resolve a session cookie into a session record, if present.
///
/// Returns `Ok(None)` for every rejection; the reason is only logged.
pub(crate) async fn authenticate_session(
    headers: &HeaderMap,
    pool: &PgPool,
) -> Result<Option<SessionRecord>, StatusCode> {
    let Some(token) = extract_session_token(headers) else {
        return Ok(None);
    };
    // Only the hash is stored; never compare raw tokens against the database.
    let token_hash = hash_session_token(&token);
    match resolve_session(pool, &token_hash).await {
        Ok(SessionLookup::Active(record)) => Ok(Some(record)),
        Ok(SessionLookup::Missing) => {
            debug!(reason = "unknown_token", "Session rejected");
            Ok(None)
        }
        Ok(SessionLookup::Expired) => {
            debug!(reason = "expired", "Session rejected");
            Ok(None)
        }
        Ok(SessionLookup::UserInactive) => {
            debug!(reason = "user_inactive", "Session rejected");
            Ok(None)
        }
        Err(err) => {
            error!("Failed to lookup session: {err}");
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

#[utoipa::path(
    post,
    path = "/v1/auth/logout",
    responses(
        (status = 200, description = "Session cleared")
    ),
    tag = "auth"
)]
pub async fn logout(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
) -> impl IntoResponse {
    if let Some(token) = extract_session_token(&headers) {
        let token_hash = hash_session_token(&token);
        if let Err(err) = delete_session(&pool, &token_hash).await {
            error!("Failed to delete session: {err}");
        }
    }

    // Logout is idempotent: always clear the cookie, even if the session
    // record was already gone.
    let mut response_headers = HeaderMap::new();
    if let Ok(cookie) = clear_session_cookie(auth_state.config()) {
        response_headers.insert(SET_COOKIE, cookie);
    }
    (
        StatusCode::OK,
        response_headers,
        Json(serde_json::json!({ "message": "Logged out" })),
    )
        .into_response()
}

#[utoipa::path(
    post,
    path = "/v1/auth/logout-all",
    responses(
        (status = 200, description = "Every session for the caller revoked"),
        (status = 401, description = "Missing, expired, or invalid session")
    ),
    tag = "auth"
)]
pub async fn logout_all(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
) -> impl IntoResponse {
    let record = match authenticate_session(&headers, &pool).await {
        Ok(Some(record)) => record,
        Ok(None) => {
            return (StatusCode::UNAUTHORIZED, UNAUTHENTICATED_MESSAGE).into_response();
        }
        Err(status) => return status.into_response(),
    };

    let revoked = match delete_sessions_for_user(&pool, record.user_id).await {
        Ok(revoked) => revoked,
        Err(err) => {
            error!("Failed to revoke sessions: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    audit::record_event(
        &pool,
        Some(record.user_id),
        "auth.logout_all",
        None,
        Some(format!("revoked {revoked} sessions")),
    )
    .await;

    let mut response_headers = HeaderMap::new();
    if let Ok(cookie) = clear_session_cookie(auth_state.config()) {
        response_headers.insert(SET_COOKIE, cookie);
    }
    (
        StatusCode::OK,
        response_headers,
        Json(serde_json::json!({ "revoked_sessions": revoked })),
    )
        .into_response()
}

/// Build a secure `HttpOnly` cookie for the session token.
pub(crate) fn session_cookie(
    auth_config: &AuthConfig,
    token: &str,
) -> Result<HeaderValue, InvalidHeaderValue> {
    let ttl_seconds = auth_config.session_ttl_seconds();
    let secure = auth_config.session_cookie_secure();
    let mut cookie = format!(
        "{SESSION_COOKIE_NAME}={token}; Path=/; HttpOnly; SameSite=Lax; Max-Age={ttl_seconds}"
    );
    if secure {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

fn clear_session_cookie(auth_config: &AuthConfig) -> Result<HeaderValue, InvalidHeaderValue> {
    let secure = auth_config.session_cookie_secure();
    let mut cookie = format!("{SESSION_COOKIE_NAME}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0");
    if secure {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

fn extract_session_token(headers: &HeaderMap) -> Option<String> {
    if let Some(token) = extract_bearer_token(headers) {
        return Some(token);
    }
    let header = headers.get(axum::http::header::COOKIE)?;
    let value = header.to_str().ok()?;
    for pair in value.split(';') {
        let trimmed = pair.trim();
        let mut parts = trimmed.splitn(2, '=');
        let key = parts.next()?.trim();
        let val = parts.next()?.trim();
        if key == SESSION_COOKIE_NAME {
            return Some(val.to_string());
        }
    }
    None
}

fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let trimmed = value.trim();
    let token = trimmed
        .strip_prefix("Bearer ")
        .or_else(|| trimmed.strip_prefix("bearer "))?
        .trim();
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::{
        clear_session_cookie, extract_session_token, session_cookie, SESSION_COOKIE_NAME,
    };
    use crate::api::handlers::auth::state::AuthConfig;
    use anyhow::{Context, Result};
    use axum::http::{header::AUTHORIZATION, HeaderMap, HeaderValue};

    #[test]
    fn session_cookie_sets_flags() -> Result<()> {
        let config = AuthConfig::new("https://greenroom.dev".to_string());
        let cookie = session_cookie(&config, "token")?;
        let value = cookie.to_str().context("cookie header not ascii")?;
        assert!(value.starts_with(&format!("{SESSION_COOKIE_NAME}=token")));
        assert!(value.contains("HttpOnly"));
        assert!(value.contains("SameSite=Lax"));
        assert!(value.contains("Max-Age=86400"));
        assert!(value.ends_with("; Secure"));
        Ok(())
    }

    #[test]
    fn session_cookie_not_secure_over_http() -> Result<()> {
        let config = AuthConfig::new("http://localhost:5173".to_string());
        let cookie = session_cookie(&config, "token")?;
        let value = cookie.to_str().context("cookie header not ascii")?;
        assert!(!value.contains("Secure"));
        Ok(())
    }

    #[test]
    fn clear_cookie_expires_immediately() -> Result<()> {
        let config = AuthConfig::new("http://localhost:5173".to_string());
        let cookie = clear_session_cookie(&config)?;
        let value = cookie.to_str().context("cookie header not ascii")?;
        assert!(value.contains("Max-Age=0"));
        Ok(())
    }

    #[test]
    fn extract_session_token_reads_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(
            axum::http::header::COOKIE,
            HeaderValue::from_static("other=1; greenroom_session=abc123; theme=dark"),
        );
        assert_eq!(extract_session_token(&headers), Some("abc123".to_string()));
    }

    #[test]
    fn extract_session_token_prefers_bearer() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer xyz"));
        headers.insert(
            axum::http::header::COOKIE,
            HeaderValue::from_static("greenroom_session=abc123"),
        );
        assert_eq!(extract_session_token(&headers), Some("xyz".to_string()));
    }

    #[test]
    fn extract_session_token_none_when_absent() {
        let headers = HeaderMap::new();
        assert_eq!(extract_session_token(&headers), None);

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer   "));
        assert_eq!(extract_session_token(&headers), None);
    }
}
