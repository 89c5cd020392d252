//! Authenticated self-service endpoints.
//!
//! Flow Overview:
//! 1) Authenticate via session cookie.
//! 2) Resolve the current user from the database.
//! 3) Apply allow-listed updates, password rotation, and session management.

use axum::{
    extract::{Extension, Path},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Row};
use tracing::error;
use utoipa::ToSchema;
use uuid::Uuid;

use super::audit;
use super::auth::password::{hash_password, verify_password};
use super::auth::principal::require_auth;
use super::auth::storage::{fetch_password_hash, update_password_and_revoke};
use super::auth::types::{PasswordChangeRequest, ValidationErrors};
use super::auth::utils::{is_unique_violation, valid_display_name, valid_password};

#[derive(Debug, Serialize, ToSchema)]
pub struct MeResponse {
    pub id: String,
    pub email: String,
    pub display_name: String,
    pub role: String,
    pub created_at: String,
    pub last_login_at: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct MeUpdateRequest {
    pub display_name: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SessionSummary {
    pub id: String,
    pub current: bool,
    pub created_at: String,
    pub last_seen_at: Option<String>,
    pub expires_at: String,
}

#[utoipa::path(
    get,
    path = "/v1/me",
    responses(
        (status = 200, description = "Return the authenticated user profile.", body = MeResponse),
        (status = 401, description = "Missing or invalid session cookie."),
    ),
    tag = "me"
)]
pub async fn get_me(headers: HeaderMap, pool: Extension<PgPool>) -> impl IntoResponse {
    let principal = match require_auth(&headers, &pool).await {
        Ok(principal) => principal,
        Err(status) => return status.into_response(),
    };

    match fetch_profile(&pool, principal.user_id).await {
        Ok(Some(profile)) => (StatusCode::OK, Json(profile)).into_response(),
        Ok(None) => StatusCode::NOT_FOUND.into_response(),
        Err(err) => {
            error!("Failed to fetch /me profile: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[utoipa::path(
    patch,
    path = "/v1/me",
    request_body = MeUpdateRequest,
    responses(
        (status = 200, description = "Updated profile.", body = MeResponse),
        (status = 400, description = "Invalid display name."),
        (status = 401, description = "Missing or invalid session cookie."),
        (status = 409, description = "Display name already taken."),
    ),
    tag = "me"
)]
pub async fn update_me(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    Json(payload): Json<MeUpdateRequest>,
) -> impl IntoResponse {
    let principal = match require_auth(&headers, &pool).await {
        Ok(principal) => principal,
        Err(status) => return status.into_response(),
    };

    let display_name = normalize_optional(payload.display_name);
    if let Some(name) = display_name.as_deref() {
        if !valid_display_name(name) {
            return (StatusCode::BAD_REQUEST, "Invalid display name.").into_response();
        }
    }

    match update_profile(&pool, principal.user_id, display_name).await {
        Ok(Some(profile)) => (StatusCode::OK, Json(profile)).into_response(),
        Ok(None) => StatusCode::NOT_FOUND.into_response(),
        Err(err) if is_unique_violation(&err) => {
            (StatusCode::CONFLICT, "Display name already taken.").into_response()
        }
        Err(err) => {
            error!("Failed to update /me profile: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[utoipa::path(
    post,
    path = "/v1/me/password",
    request_body = PasswordChangeRequest,
    responses(
        (status = 204, description = "Password rotated; other sessions revoked."),
        (status = 400, description = "New password rejected by policy.", body = ValidationErrors),
        (status = 401, description = "Missing session or wrong current password."),
    ),
    tag = "me"
)]
pub async fn change_password(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    Json(payload): Json<PasswordChangeRequest>,
) -> impl IntoResponse {
    let principal = match require_auth(&headers, &pool).await {
        Ok(principal) => principal,
        Err(status) => return status.into_response(),
    };

    let mut errors = ValidationErrors::new();
    if !valid_password(payload.new_password.expose_secret()) {
        errors.push(
            "new_password",
            "Password must be at least 8 characters and mix character classes.",
        );
    }
    if !errors.is_empty() {
        return (StatusCode::BAD_REQUEST, Json(errors)).into_response();
    }

    let stored_hash = match fetch_password_hash(&pool, principal.user_id).await {
        Ok(Some(hash)) => hash,
        Ok(None) => return StatusCode::UNAUTHORIZED.into_response(),
        Err(err) => {
            error!("Failed to fetch password hash: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    match verify_password(payload.current_password, stored_hash).await {
        Ok(true) => {}
        Ok(false) => {
            return (StatusCode::UNAUTHORIZED, "Current password is incorrect.").into_response();
        }
        Err(err) => {
            error!("Failed to verify current password: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    }

    let new_hash = match hash_password(payload.new_password).await {
        Ok(hash) => hash,
        Err(err) => {
            error!("Failed to hash new password: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    // Rotate and revoke every other session in one transaction; the session
    // that performed the change stays valid.
    match update_password_and_revoke(&pool, principal.user_id, &new_hash, principal.session_id)
        .await
    {
        Ok(revoked) => {
            audit::record_event(
                &pool,
                Some(principal.user_id),
                "auth.password_change",
                None,
                Some(format!("revoked {revoked} other sessions")),
            )
            .await;
            StatusCode::NO_CONTENT.into_response()
        }
        Err(err) => {
            error!("Failed to rotate password: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[utoipa::path(
    get,
    path = "/v1/me/sessions",
    responses(
        (status = 200, description = "Active sessions for the authenticated user.", body = [SessionSummary]),
        (status = 401, description = "Missing or invalid session cookie."),
    ),
    tag = "me"
)]
pub async fn list_sessions(headers: HeaderMap, pool: Extension<PgPool>) -> impl IntoResponse {
    let principal = match require_auth(&headers, &pool).await {
        Ok(principal) => principal,
        Err(status) => return status.into_response(),
    };

    match fetch_sessions(&pool, principal.user_id, principal.session_id).await {
        Ok(rows) => (StatusCode::OK, Json(rows)).into_response(),
        Err(err) => {
            error!("Failed to list sessions: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[utoipa::path(
    delete,
    path = "/v1/me/sessions/{sid}",
    params(("sid" = String, Path, description = "Session id")),
    responses(
        (status = 204, description = "Session revoked."),
        (status = 401, description = "Missing or invalid session cookie."),
        (status = 404, description = "Session not found."),
    ),
    tag = "me"
)]
pub async fn revoke_session(
    Path(sid): Path<String>,
    headers: HeaderMap,
    pool: Extension<PgPool>,
) -> impl IntoResponse {
    let principal = match require_auth(&headers, &pool).await {
        Ok(principal) => principal,
        Err(status) => return status.into_response(),
    };

    let Ok(session_id) = Uuid::parse_str(sid.trim()) else {
        return StatusCode::BAD_REQUEST.into_response();
    };

    match delete_own_session(&pool, principal.user_id, session_id).await {
        Ok(true) => StatusCode::NO_CONTENT.into_response(),
        Ok(false) => StatusCode::NOT_FOUND.into_response(),
        Err(err) => {
            error!("Failed to revoke session: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn fetch_profile(pool: &PgPool, user_id: Uuid) -> Result<Option<MeResponse>, sqlx::Error> {
    let query = r#"
        SELECT
            id::text AS id,
            email,
            display_name,
            role,
            to_char(created_at AT TIME ZONE 'utc', 'YYYY-MM-DD"T"HH24:MI:SS"Z"') AS created_at,
            CASE
                WHEN last_login_at IS NULL THEN NULL
                ELSE to_char(last_login_at AT TIME ZONE 'utc', 'YYYY-MM-DD"T"HH24:MI:SS"Z"')
            END AS last_login_at
        FROM users
        WHERE id = $1
        LIMIT 1
    "#;
    let row = sqlx::query(query).bind(user_id).fetch_optional(pool).await?;
    Ok(row.map(|row| MeResponse {
        id: row.get("id"),
        email: row.get("email"),
        display_name: row.get("display_name"),
        role: row.get("role"),
        created_at: row.get("created_at"),
        last_login_at: row.get("last_login_at"),
    }))
}

async fn update_profile(
    pool: &PgPool,
    user_id: Uuid,
    display_name: Option<String>,
) -> Result<Option<MeResponse>, sqlx::Error> {
    let query = r#"
        UPDATE users
        SET
            display_name = COALESCE($1, display_name),
            updated_at = NOW()
        WHERE id = $2
        RETURNING
            id::text AS id,
            email,
            display_name,
            role,
            to_char(created_at AT TIME ZONE 'utc', 'YYYY-MM-DD"T"HH24:MI:SS"Z"') AS created_at,
            CASE
                WHEN last_login_at IS NULL THEN NULL
                ELSE to_char(last_login_at AT TIME ZONE 'utc', 'YYYY-MM-DD"T"HH24:MI:SS"Z"')
            END AS last_login_at
    "#;
    let row = sqlx::query(query)
        .bind(display_name)
        .bind(user_id)
        .fetch_optional(pool)
        .await?;
    Ok(row.map(|row| MeResponse {
        id: row.get("id"),
        email: row.get("email"),
        display_name: row.get("display_name"),
        role: row.get("role"),
        created_at: row.get("created_at"),
        last_login_at: row.get("last_login_at"),
    }))
}

async fn fetch_sessions(
    pool: &PgPool,
    user_id: Uuid,
    current_session_id: Uuid,
) -> Result<Vec<SessionSummary>, sqlx::Error> {
    let query = r#"
        SELECT
            id,
            id::text AS id_text,
            to_char(created_at AT TIME ZONE 'utc', 'YYYY-MM-DD"T"HH24:MI:SS"Z"') AS created_at,
            CASE
                WHEN last_seen_at IS NULL THEN NULL
                ELSE to_char(last_seen_at AT TIME ZONE 'utc', 'YYYY-MM-DD"T"HH24:MI:SS"Z"')
            END AS last_seen_at,
            to_char(expires_at AT TIME ZONE 'utc', 'YYYY-MM-DD"T"HH24:MI:SS"Z"') AS expires_at
        FROM user_sessions
        WHERE user_id = $1 AND expires_at > NOW()
        ORDER BY created_at DESC
    "#;
    let rows = sqlx::query(query).bind(user_id).fetch_all(pool).await?;
    Ok(rows
        .into_iter()
        .map(|row| SessionSummary {
            id: row.get("id_text"),
            current: row.get::<Uuid, _>("id") == current_session_id,
            created_at: row.get("created_at"),
            last_seen_at: row.get("last_seen_at"),
            expires_at: row.get("expires_at"),
        })
        .collect())
}

async fn delete_own_session(
    pool: &PgPool,
    user_id: Uuid,
    session_id: Uuid,
) -> Result<bool, sqlx::Error> {
    // Ownership check is part of the query; other users' sessions are a 404.
    let query = "DELETE FROM user_sessions WHERE id = $1 AND user_id = $2";
    let result = sqlx::query(query)
        .bind(session_id)
        .bind(user_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

fn normalize_optional(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::normalize_optional;

    #[test]
    fn normalize_optional_trims_and_drops_empty() {
        assert_eq!(
            normalize_optional(Some("  alice  ".to_string())),
            Some("alice".to_string())
        );
        assert_eq!(normalize_optional(Some("   ".to_string())), None);
        assert_eq!(normalize_optional(None), None);
    }
}
