//! Role-based user administration endpoints.
//!
//! Flow Overview:
//! 1) Authenticate the request via session cookie.
//! 2) Enforce admin-set membership for every /users route.
//! 3) Perform reads, allow-listed updates, role changes, and deactivation.

use axum::{
    extract::{Extension, Path},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Row};
use tracing::error;
use utoipa::ToSchema;
use uuid::Uuid;

use super::audit;
use super::auth::principal::{ensure_role, require_auth, Principal};
use super::auth::role::{Role, ADMIN_ROLES};
use super::auth::storage::delete_sessions_for_user;
use super::auth::utils::{is_unique_violation, valid_display_name};

#[derive(Debug, Serialize, ToSchema)]
pub struct UserSummary {
    pub id: String,
    pub email: String,
    pub display_name: String,
    pub role: String,
    pub is_active: bool,
    pub created_at: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UserDetail {
    pub id: String,
    pub email: String,
    pub display_name: String,
    pub role: String,
    pub is_active: bool,
    pub created_at: String,
    pub updated_at: String,
    pub last_login_at: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct UserUpdateRequest {
    pub display_name: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct UserRoleRequest {
    pub role: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UserRoleResponse {
    pub id: String,
    pub role: String,
}

#[utoipa::path(
    get,
    path = "/v1/users",
    responses(
        (status = 200, description = "List users.", body = [UserSummary]),
        (status = 401, description = "Missing or invalid session cookie."),
        (status = 403, description = "Forbidden."),
    ),
    tag = "users"
)]
pub async fn list_users(headers: HeaderMap, pool: Extension<PgPool>) -> impl IntoResponse {
    let principal = match require_auth(&headers, &pool).await {
        Ok(principal) => principal,
        Err(status) => return status.into_response(),
    };
    if let Err(status) = ensure_role(&principal, ADMIN_ROLES) {
        return status.into_response();
    }

    match fetch_user_summaries(&pool).await {
        Ok(list) => (StatusCode::OK, Json(list)).into_response(),
        Err(err) => {
            error!("Failed to list users: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[utoipa::path(
    get,
    path = "/v1/users/{id}",
    params(("id" = String, Path, description = "User id")),
    responses(
        (status = 200, description = "User detail.", body = UserDetail),
        (status = 400, description = "Invalid user id."),
        (status = 401, description = "Missing or invalid session cookie."),
        (status = 403, description = "Forbidden."),
        (status = 404, description = "User not found."),
    ),
    tag = "users"
)]
pub async fn get_user(
    Path(id): Path<String>,
    headers: HeaderMap,
    pool: Extension<PgPool>,
) -> impl IntoResponse {
    let principal = match require_auth(&headers, &pool).await {
        Ok(principal) => principal,
        Err(status) => return status.into_response(),
    };
    if let Err(status) = ensure_role(&principal, ADMIN_ROLES) {
        return status.into_response();
    }

    let user_id = match Uuid::parse_str(id.trim()) {
        Ok(id) => id,
        Err(_) => return StatusCode::BAD_REQUEST.into_response(),
    };

    match fetch_user_detail(&pool, user_id).await {
        Ok(Some(detail)) => (StatusCode::OK, Json(detail)).into_response(),
        Ok(None) => StatusCode::NOT_FOUND.into_response(),
        Err(err) => {
            error!("Failed to fetch user detail: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[utoipa::path(
    patch,
    path = "/v1/users/{id}",
    params(("id" = String, Path, description = "User id")),
    request_body = UserUpdateRequest,
    responses(
        (status = 200, description = "Updated user detail.", body = UserDetail),
        (status = 400, description = "Invalid id or display name."),
        (status = 401, description = "Missing or invalid session cookie."),
        (status = 403, description = "Forbidden."),
        (status = 404, description = "User not found."),
        (status = 409, description = "Display name already taken."),
    ),
    tag = "users"
)]
pub async fn update_user(
    Path(id): Path<String>,
    headers: HeaderMap,
    pool: Extension<PgPool>,
    Json(payload): Json<UserUpdateRequest>,
) -> impl IntoResponse {
    let principal = match require_auth(&headers, &pool).await {
        Ok(principal) => principal,
        Err(status) => return status.into_response(),
    };
    if let Err(status) = ensure_role(&principal, ADMIN_ROLES) {
        return status.into_response();
    }

    let user_id = match Uuid::parse_str(id.trim()) {
        Ok(id) => id,
        Err(_) => return StatusCode::BAD_REQUEST.into_response(),
    };

    let display_name = payload
        .display_name
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty());
    if let Some(name) = display_name.as_deref() {
        if !valid_display_name(name) {
            return (StatusCode::BAD_REQUEST, "Invalid display name.").into_response();
        }
    }

    match update_user_profile(&pool, user_id, display_name).await {
        Ok(Some(detail)) => (StatusCode::OK, Json(detail)).into_response(),
        Ok(None) => StatusCode::NOT_FOUND.into_response(),
        Err(err) if is_unique_violation(&err) => {
            (StatusCode::CONFLICT, "Display name already taken.").into_response()
        }
        Err(err) => {
            error!("Failed to update user: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[utoipa::path(
    patch,
    path = "/v1/users/{id}/role",
    params(("id" = String, Path, description = "User id")),
    request_body = UserRoleRequest,
    responses(
        (status = 200, description = "Role assigned.", body = UserRoleResponse),
        (status = 400, description = "Invalid id or unknown role."),
        (status = 401, description = "Missing or invalid session cookie."),
        (status = 403, description = "Forbidden."),
        (status = 404, description = "User not found."),
    ),
    tag = "users"
)]
pub async fn assign_role(
    Path(id): Path<String>,
    headers: HeaderMap,
    pool: Extension<PgPool>,
    Json(payload): Json<UserRoleRequest>,
) -> impl IntoResponse {
    let principal = match require_auth(&headers, &pool).await {
        Ok(principal) => principal,
        Err(status) => return status.into_response(),
    };
    if let Err(status) = ensure_role(&principal, ADMIN_ROLES) {
        return status.into_response();
    }

    let user_id = match Uuid::parse_str(id.trim()) {
        Ok(id) => id,
        Err(_) => return StatusCode::BAD_REQUEST.into_response(),
    };

    let Some(role) = Role::parse(&payload.role) else {
        return (StatusCode::BAD_REQUEST, "Unknown role.").into_response();
    };

    match assign_user_role(&pool, &principal, user_id, role).await {
        Ok(response) => (StatusCode::OK, Json(response)).into_response(),
        Err(err) => err.into_response(),
    }
}

#[utoipa::path(
    post,
    path = "/v1/users/{id}/deactivate",
    params(("id" = String, Path, description = "User id")),
    responses(
        (status = 204, description = "User deactivated and sessions revoked."),
        (status = 400, description = "Invalid user id."),
        (status = 401, description = "Missing or invalid session cookie."),
        (status = 403, description = "Forbidden."),
        (status = 404, description = "User not found."),
    ),
    tag = "users"
)]
pub async fn deactivate_user(
    Path(id): Path<String>,
    headers: HeaderMap,
    pool: Extension<PgPool>,
) -> impl IntoResponse {
    set_user_active(id, headers, pool, false).await
}

#[utoipa::path(
    post,
    path = "/v1/users/{id}/reactivate",
    params(("id" = String, Path, description = "User id")),
    responses(
        (status = 204, description = "User reactivated."),
        (status = 400, description = "Invalid user id."),
        (status = 401, description = "Missing or invalid session cookie."),
        (status = 403, description = "Forbidden."),
        (status = 404, description = "User not found."),
    ),
    tag = "users"
)]
pub async fn reactivate_user(
    Path(id): Path<String>,
    headers: HeaderMap,
    pool: Extension<PgPool>,
) -> impl IntoResponse {
    set_user_active(id, headers, pool, true).await
}

async fn set_user_active(
    id: String,
    headers: HeaderMap,
    pool: Extension<PgPool>,
    active: bool,
) -> Response {
    let principal = match require_auth(&headers, &pool).await {
        Ok(principal) => principal,
        Err(status) => return status.into_response(),
    };
    if let Err(status) = ensure_role(&principal, ADMIN_ROLES) {
        return status.into_response();
    }

    let user_id = match Uuid::parse_str(id.trim()) {
        Ok(id) => id,
        Err(_) => return StatusCode::BAD_REQUEST.into_response(),
    };

    match set_active(&pool, user_id, active).await {
        Ok(false) => StatusCode::NOT_FOUND.into_response(),
        Ok(true) => {
            if !active {
                // Deactivation revokes every outstanding session immediately.
                if let Err(err) = delete_sessions_for_user(&pool, user_id).await {
                    error!("Failed to revoke sessions for deactivated user: {err}");
                    return StatusCode::INTERNAL_SERVER_ERROR.into_response();
                }
            }
            let action = if active {
                "users.reactivate"
            } else {
                "users.deactivate"
            };
            audit::record_event(
                &pool,
                Some(principal.user_id),
                action,
                Some(user_id.to_string()),
                None,
            )
            .await;
            StatusCode::NO_CONTENT.into_response()
        }
        Err(err) => {
            error!("Failed to set user active flag: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[derive(Debug)]
enum ServiceError {
    Forbidden(&'static str),
    NotFound,
    Database(sqlx::Error),
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        match self {
            Self::Forbidden(message) => (StatusCode::FORBIDDEN, message).into_response(),
            Self::NotFound => StatusCode::NOT_FOUND.into_response(),
            Self::Database(err) => {
                error!("Failed to handle user request: {err}");
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            }
        }
    }
}

async fn set_active(pool: &PgPool, user_id: Uuid, active: bool) -> Result<bool, sqlx::Error> {
    let query = "UPDATE users SET is_active = $2, updated_at = NOW() WHERE id = $1";
    let result = sqlx::query(query)
        .bind(user_id)
        .bind(active)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

async fn fetch_user_summaries(pool: &PgPool) -> Result<Vec<UserSummary>, sqlx::Error> {
    let query = r#"
        SELECT
            id::text AS id,
            email,
            display_name,
            role,
            is_active,
            to_char(created_at AT TIME ZONE 'utc', 'YYYY-MM-DD"T"HH24:MI:SS"Z"') AS created_at
        FROM users
        ORDER BY created_at DESC
    "#;
    let rows = sqlx::query(query).fetch_all(pool).await?;
    Ok(rows
        .into_iter()
        .map(|row| UserSummary {
            id: row.get("id"),
            email: row.get("email"),
            display_name: row.get("display_name"),
            role: row.get("role"),
            is_active: row.get("is_active"),
            created_at: row.get("created_at"),
        })
        .collect())
}

async fn fetch_user_detail(pool: &PgPool, user_id: Uuid) -> Result<Option<UserDetail>, sqlx::Error> {
    let query = r#"
        SELECT
            id::text AS id,
            email,
            display_name,
            role,
            is_active,
            to_char(created_at AT TIME ZONE 'utc', 'YYYY-MM-DD"T"HH24:MI:SS"Z"') AS created_at,
            to_char(updated_at AT TIME ZONE 'utc', 'YYYY-MM-DD"T"HH24:MI:SS"Z"') AS updated_at,
            CASE
                WHEN last_login_at IS NULL THEN NULL
                ELSE to_char(last_login_at AT TIME ZONE 'utc', 'YYYY-MM-DD"T"HH24:MI:SS"Z"')
            END AS last_login_at
        FROM users
        WHERE id = $1
        LIMIT 1
    "#;
    let row = sqlx::query(query).bind(user_id).fetch_optional(pool).await?;
    Ok(row.map(|row| UserDetail {
        id: row.get("id"),
        email: row.get("email"),
        display_name: row.get("display_name"),
        role: row.get("role"),
        is_active: row.get("is_active"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
        last_login_at: row.get("last_login_at"),
    }))
}

async fn update_user_profile(
    pool: &PgPool,
    user_id: Uuid,
    display_name: Option<String>,
) -> Result<Option<UserDetail>, sqlx::Error> {
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
            is_active,
            to_char(created_at AT TIME ZONE 'utc', 'YYYY-MM-DD"T"HH24:MI:SS"Z"') AS created_at,
            to_char(updated_at AT TIME ZONE 'utc', 'YYYY-MM-DD"T"HH24:MI:SS"Z"') AS updated_at,
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
    Ok(row.map(|row| UserDetail {
        id: row.get("id"),
        email: row.get("email"),
        display_name: row.get("display_name"),
        role: row.get("role"),
        is_active: row.get("is_active"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
        last_login_at: row.get("last_login_at"),
    }))
}

async fn assign_user_role(
    pool: &PgPool,
    principal: &Principal,
    user_id: Uuid,
    role: Role,
) -> Result<UserRoleResponse, ServiceError> {
    let mut tx = pool.begin().await.map_err(ServiceError::Database)?;

    let target = sqlx::query("SELECT role FROM users WHERE id = $1")
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(ServiceError::Database)?;
    let Some(target) = target else {
        return Err(ServiceError::NotFound);
    };

    let previous_role: String = target.get("role");
    // Only a ceo may change another ceo's role.
    if previous_role == Role::Ceo.as_str() && principal.role != Role::Ceo {
        return Err(ServiceError::Forbidden("Only a ceo may change a ceo role."));
    }

    sqlx::query("UPDATE users SET role = $2, updated_at = NOW() WHERE id = $1")
        .bind(user_id)
        .bind(role.as_str())
        .execute(&mut *tx)
        .await
        .map_err(ServiceError::Database)?;

    tx.commit().await.map_err(ServiceError::Database)?;

    if previous_role != role.as_str() {
        audit::record_event(
            pool,
            Some(principal.user_id),
            "users.role_change",
            Some(user_id.to_string()),
            Some(format!("{previous_role} -> {}", role.as_str())),
        )
        .await;
    }

    Ok(UserRoleResponse {
        id: user_id.to_string(),
        role: role.as_str().to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_error_debug_names() {
        assert!(format!("{:?}", ServiceError::NotFound).contains("NotFound"));
        assert!(format!("{:?}", ServiceError::Forbidden("nope")).contains("Forbidden"));
    }

    #[test]
    fn user_role_request_rejects_unknown_fields() {
        let result: Result<UserRoleRequest, _> = serde_json::from_value(serde_json::json!({
            "role": "admin",
            "is_active": false
        }));
        assert!(result.is_err());
    }
}
