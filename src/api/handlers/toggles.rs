//! Feature toggle endpoints.
//!
//! Staff can read toggles; only the admin set may create, flip, or delete
//! them. Flips land in the audit log.

use axum::{
    extract::{Extension, Path},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Row};
use tracing::error;
use utoipa::ToSchema;

use super::audit;
use super::auth::principal::{ensure_role, require_auth};
use super::auth::role::{ADMIN_ROLES, STAFF_ROLES};
use super::auth::utils::is_unique_violation;

const TOGGLE_KEY_MAX: usize = 64;

#[derive(Debug, Serialize, ToSchema)]
pub struct ToggleResponse {
    pub key: String,
    pub enabled: bool,
    pub note: Option<String>,
    pub updated_by: Option<String>,
    pub updated_at: String,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct CreateToggleRequest {
    pub key: String,
    #[serde(default)]
    pub enabled: bool,
    pub note: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct UpdateToggleRequest {
    pub enabled: Option<bool>,
    pub note: Option<String>,
}

/// Toggle keys: 1-64 chars of `[a-z0-9_-]` after lowercasing.
fn normalize_key(key: &str) -> Option<String> {
    let key = key.trim().to_lowercase();
    if key.is_empty() || key.len() > TOGGLE_KEY_MAX {
        return None;
    }
    if key
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '_' | '-'))
    {
        Some(key)
    } else {
        None
    }
}

#[utoipa::path(
    get,
    path = "/v1/toggles",
    responses(
        (status = 200, description = "All feature toggles.", body = [ToggleResponse]),
        (status = 401, description = "Missing or invalid session cookie."),
        (status = 403, description = "Forbidden."),
    ),
    tag = "toggles"
)]
pub async fn list_toggles(headers: HeaderMap, pool: Extension<PgPool>) -> impl IntoResponse {
    let principal = match require_auth(&headers, &pool).await {
        Ok(principal) => principal,
        Err(status) => return status.into_response(),
    };
    if let Err(status) = ensure_role(&principal, STAFF_ROLES) {
        return status.into_response();
    }

    match fetch_toggles(&pool).await {
        Ok(list) => (StatusCode::OK, Json(list)).into_response(),
        Err(err) => {
            error!("Failed to list toggles: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[utoipa::path(
    post,
    path = "/v1/toggles",
    request_body = CreateToggleRequest,
    responses(
        (status = 201, description = "Toggle created.", body = ToggleResponse),
        (status = 400, description = "Invalid toggle key."),
        (status = 401, description = "Missing or invalid session cookie."),
        (status = 403, description = "Forbidden."),
        (status = 409, description = "Toggle key already exists."),
    ),
    tag = "toggles"
)]
pub async fn create_toggle(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    Json(payload): Json<CreateToggleRequest>,
) -> impl IntoResponse {
    let principal = match require_auth(&headers, &pool).await {
        Ok(principal) => principal,
        Err(status) => return status.into_response(),
    };
    if let Err(status) = ensure_role(&principal, ADMIN_ROLES) {
        return status.into_response();
    }

    let Some(key) = normalize_key(&payload.key) else {
        return (
            StatusCode::BAD_REQUEST,
            "Toggle keys are 1-64 chars of [a-z0-9_-].",
        )
            .into_response();
    };

    let query = r#"
        INSERT INTO feature_toggles (key, enabled, note, updated_by, updated_at)
        VALUES ($1, $2, $3, $4, NOW())
        RETURNING
            key,
            enabled,
            note,
            updated_by::text AS updated_by,
            to_char(updated_at AT TIME ZONE 'utc', 'YYYY-MM-DD"T"HH24:MI:SS"Z"') AS updated_at
    "#;
    let row = sqlx::query(query)
        .bind(&key)
        .bind(payload.enabled)
        .bind(payload.note.as_deref())
        .bind(principal.user_id)
        .fetch_one(&pool.0)
        .await;

    match row {
        Ok(row) => {
            audit::record_event(
                &pool,
                Some(principal.user_id),
                "toggles.create",
                Some(key),
                Some(format!("enabled={}", payload.enabled)),
            )
            .await;
            (StatusCode::CREATED, Json(toggle_response(&row))).into_response()
        }
        Err(err) if is_unique_violation(&err) => {
            (StatusCode::CONFLICT, "Toggle key already exists.").into_response()
        }
        Err(err) => {
            error!("Failed to create toggle: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[utoipa::path(
    patch,
    path = "/v1/toggles/{key}",
    params(("key" = String, Path, description = "Toggle key")),
    request_body = UpdateToggleRequest,
    responses(
        (status = 200, description = "Updated toggle.", body = ToggleResponse),
        (status = 401, description = "Missing or invalid session cookie."),
        (status = 403, description = "Forbidden."),
        (status = 404, description = "Toggle not found."),
    ),
    tag = "toggles"
)]
pub async fn update_toggle(
    Path(key): Path<String>,
    headers: HeaderMap,
    pool: Extension<PgPool>,
    Json(payload): Json<UpdateToggleRequest>,
) -> impl IntoResponse {
    let principal = match require_auth(&headers, &pool).await {
        Ok(principal) => principal,
        Err(status) => return status.into_response(),
    };
    if let Err(status) = ensure_role(&principal, ADMIN_ROLES) {
        return status.into_response();
    }

    let Some(key) = normalize_key(&key) else {
        return StatusCode::NOT_FOUND.into_response();
    };

    let query = r#"
        UPDATE feature_toggles
        SET
            enabled = COALESCE($2, enabled),
            note = COALESCE($3, note),
            updated_by = $4,
            updated_at = NOW()
        WHERE key = $1
        RETURNING
            key,
            enabled,
            note,
            updated_by::text AS updated_by,
            to_char(updated_at AT TIME ZONE 'utc', 'YYYY-MM-DD"T"HH24:MI:SS"Z"') AS updated_at
    "#;
    let row = sqlx::query(query)
        .bind(&key)
        .bind(payload.enabled)
        .bind(payload.note.as_deref())
        .bind(principal.user_id)
        .fetch_optional(&pool.0)
        .await;

    match row {
        Ok(Some(row)) => {
            if let Some(enabled) = payload.enabled {
                audit::record_event(
                    &pool,
                    Some(principal.user_id),
                    "toggles.update",
                    Some(key),
                    Some(format!("enabled={enabled}")),
                )
                .await;
            }
            (StatusCode::OK, Json(toggle_response(&row))).into_response()
        }
        Ok(None) => StatusCode::NOT_FOUND.into_response(),
        Err(err) => {
            error!("Failed to update toggle: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[utoipa::path(
    delete,
    path = "/v1/toggles/{key}",
    params(("key" = String, Path, description = "Toggle key")),
    responses(
        (status = 204, description = "Toggle deleted."),
        (status = 401, description = "Missing or invalid session cookie."),
        (status = 403, description = "Forbidden."),
        (status = 404, description = "Toggle not found."),
    ),
    tag = "toggles"
)]
pub async fn delete_toggle(
    Path(key): Path<String>,
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

    let Some(key) = normalize_key(&key) else {
        return StatusCode::NOT_FOUND.into_response();
    };

    let result = sqlx::query("DELETE FROM feature_toggles WHERE key = $1")
        .bind(&key)
        .execute(&pool.0)
        .await;

    match result {
        Ok(result) if result.rows_affected() > 0 => {
            audit::record_event(
                &pool,
                Some(principal.user_id),
                "toggles.delete",
                Some(key),
                None,
            )
            .await;
            StatusCode::NO_CONTENT.into_response()
        }
        Ok(_) => StatusCode::NOT_FOUND.into_response(),
        Err(err) => {
            error!("Failed to delete toggle: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn fetch_toggles(pool: &PgPool) -> Result<Vec<ToggleResponse>, sqlx::Error> {
    let query = r#"
        SELECT
            key,
            enabled,
            note,
            updated_by::text AS updated_by,
            to_char(updated_at AT TIME ZONE 'utc', 'YYYY-MM-DD"T"HH24:MI:SS"Z"') AS updated_at
        FROM feature_toggles
        ORDER BY key
    "#;
    let rows = sqlx::query(query).fetch_all(pool).await?;
    Ok(rows.iter().map(toggle_response).collect())
}

fn toggle_response(row: &sqlx::postgres::PgRow) -> ToggleResponse {
    ToggleResponse {
        key: row.get("key"),
        enabled: row.get("enabled"),
        note: row.get("note"),
        updated_by: row.get("updated_by"),
        updated_at: row.get("updated_at"),
    }
}

#[cfg(test)]
mod tests {
    use super::normalize_key;

    #[test]
    fn normalize_key_lowercases_and_validates() {
        assert_eq!(normalize_key(" New-UI "), Some("new-ui".to_string()));
        assert_eq!(normalize_key("beta_signups"), Some("beta_signups".to_string()));
        assert_eq!(normalize_key(""), None);
        assert_eq!(normalize_key("has spaces"), None);
        assert_eq!(normalize_key(&"k".repeat(65)), None);
    }
}
