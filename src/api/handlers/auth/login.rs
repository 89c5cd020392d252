//! Credential verification and session issuance.
//!
//! Wrong-password and unknown-identifier responses are byte-identical, and
//! the unknown path still burns an Argon2 verification so timing does not
//! enumerate accounts.

use axum::{
    extract::Extension,
    http::{header::SET_COOKIE, HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use secrecy::ExposeSecret;
use sqlx::PgPool;
use std::sync::Arc;
use tracing::error;

use super::{
    password::{verify_dummy_password, verify_password},
    rate_limit::{RateLimitAction, RateLimitDecision},
    session::session_cookie,
    state::AuthState,
    storage::{insert_session, lookup_login_record, record_login},
    types::{LoginRequest, UserProfile},
    utils::{extract_client_ip, normalize_email},
};
use crate::api::handlers::audit;

/// Single body for every credential failure; callers cannot tell an unknown
/// identifier from a wrong password.
const LOGIN_FAILED_MESSAGE: &str = "Invalid credentials";

#[utoipa::path(
    post,
    path = "/v1/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful; session cookie set", body = UserProfile),
        (status = 400, description = "Malformed payload"),
        (status = 401, description = "Invalid credentials"),
        (status = 429, description = "Too many attempts")
    ),
    tag = "auth"
)]
pub async fn login(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<LoginRequest>>,
) -> impl IntoResponse {
    let Some(Json(request)) = payload else {
        return (StatusCode::BAD_REQUEST, "Missing payload").into_response();
    };

    let identifier = request.identifier.trim().to_string();
    if identifier.is_empty() || request.password.expose_secret().is_empty() {
        return (StatusCode::BAD_REQUEST, "Missing identifier or password").into_response();
    }

    let client_ip = extract_client_ip(&headers);
    let limiter = auth_state.rate_limiter();
    if limiter.check_ip(client_ip.as_deref(), RateLimitAction::Login)
        == RateLimitDecision::Limited
        || limiter.check_identifier(&identifier, RateLimitAction::Login)
            == RateLimitDecision::Limited
    {
        return StatusCode::TOO_MANY_REQUESTS.into_response();
    }

    let email = normalize_email(&identifier);
    let record = match lookup_login_record(&pool, &email, &identifier).await {
        Ok(record) => record,
        Err(err) => {
            error!("Failed to lookup login record: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let Some(record) = record else {
        verify_dummy_password(request.password).await;
        return (StatusCode::UNAUTHORIZED, LOGIN_FAILED_MESSAGE).into_response();
    };

    match verify_password(request.password, record.password_hash).await {
        Ok(true) => {}
        Ok(false) => {
            return (StatusCode::UNAUTHORIZED, LOGIN_FAILED_MESSAGE).into_response();
        }
        Err(err) => {
            error!("Failed to verify password: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    }

    let profile = match record_login(&pool, record.user_id).await {
        Ok(row) => row,
        Err(err) => {
            error!("Failed to record login: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let ttl_seconds = auth_state.config().session_ttl_seconds();
    let token = match insert_session(&pool, record.user_id, ttl_seconds).await {
        Ok(token) => token,
        Err(err) => {
            error!("Failed to insert session: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    audit::record_event(&pool, Some(record.user_id), "auth.login", None, None).await;

    let mut response_headers = HeaderMap::new();
    match session_cookie(auth_state.config(), &token) {
        Ok(cookie) => {
            response_headers.insert(SET_COOKIE, cookie);
        }
        Err(err) => {
            error!("Failed to build session cookie: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    }

    (
        StatusCode::OK,
        response_headers,
        Json(UserProfile::from(profile)),
    )
        .into_response()
}
