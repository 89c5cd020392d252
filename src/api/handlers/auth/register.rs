//! Account registration.
//!
//! Flow Overview:
//! 1) Rate-limit by client IP.
//! 2) Validate every field, collecting per-field messages.
//! 3) Hash the password off the request path and insert the row.

use axum::{extract::Extension, http::HeaderMap, http::StatusCode, response::IntoResponse, Json};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::error;

use super::{
    password::hash_password,
    rate_limit::{RateLimitAction, RateLimitDecision},
    state::AuthState,
    storage::{insert_user, SignupOutcome},
    types::{RegisterRequest, UserProfile, ValidationErrors},
    utils::{extract_client_ip, normalize_email, valid_display_name, valid_email, valid_password},
};
use crate::api::handlers::audit;
use secrecy::ExposeSecret;

#[utoipa::path(
    post,
    path = "/v1/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Account created", body = UserProfile),
        (status = 400, description = "Validation failed", body = ValidationErrors),
        (status = 409, description = "Email or display name already registered"),
        (status = 429, description = "Too many attempts")
    ),
    tag = "auth"
)]
pub async fn register(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<RegisterRequest>>,
) -> impl IntoResponse {
    let Some(Json(request)) = payload else {
        return (StatusCode::BAD_REQUEST, "Missing payload").into_response();
    };

    let client_ip = extract_client_ip(&headers);
    if auth_state
        .rate_limiter()
        .check_ip(client_ip.as_deref(), RateLimitAction::Register)
        == RateLimitDecision::Limited
    {
        return StatusCode::TOO_MANY_REQUESTS.into_response();
    }

    let email = normalize_email(&request.email);
    let display_name = request.display_name.trim().to_string();

    let mut errors = ValidationErrors::new();
    if !valid_email(&email) {
        errors.push("email", "Invalid email address.");
    }
    if !valid_password(request.password.expose_secret()) {
        errors.push(
            "password",
            "Password must be at least 8 characters and mix character classes.",
        );
    }
    if !valid_display_name(&display_name) {
        errors.push(
            "display_name",
            "Display name must be 3-32 characters from letters, digits, spaces, '.', '_' or '-'.",
        );
    }
    if !request.accept_terms {
        errors.push("accept_terms", "You must accept the terms to register.");
    }
    if !errors.is_empty() {
        return (StatusCode::BAD_REQUEST, Json(errors)).into_response();
    }

    let password_hash = match hash_password(request.password).await {
        Ok(hash) => hash,
        Err(err) => {
            error!("Failed to hash password: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    match insert_user(&pool, &email, &display_name, &password_hash).await {
        Ok(SignupOutcome::Created(row)) => {
            audit::record_event(
                &pool,
                Some(row.id),
                "auth.register",
                Some(row.email.clone()),
                None,
            )
            .await;
            (StatusCode::CREATED, Json(UserProfile::from(row))).into_response()
        }
        Ok(SignupOutcome::Conflict) => (
            StatusCode::CONFLICT,
            "An account with that email or display name already exists",
        )
            .into_response(),
        Err(err) => {
            error!("Failed to insert user: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
