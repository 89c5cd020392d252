//! Game build registry endpoints.
//!
//! Metadata only; binaries live elsewhere. Every staff-set role can read and
//! register builds. Editing or deleting an entry requires being its uploader,
//! or a member of the admin set.

use axum::{
    extract::{Extension, Path, Query},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Row};
use tracing::error;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use super::auth::principal::{ensure_role, require_auth, Principal};
use super::auth::role::{ADMIN_ROLES, STAFF_ROLES};
use super::auth::utils::is_unique_violation;

const VERSION_MAX: usize = 64;
const GAME_MAX: usize = 80;

#[derive(Debug, Serialize, ToSchema)]
pub struct BuildResponse {
    pub id: String,
    pub game: String,
    pub version: String,
    pub channel: String,
    pub notes: Option<String>,
    pub uploaded_by: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct CreateBuildRequest {
    pub game: String,
    pub version: String,
    pub channel: String,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct UpdateBuildRequest {
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct BuildListQuery {
    /// Restrict to one release channel.
    pub channel: Option<String>,
}

/// Release channels form a closed set.
fn valid_channel(channel: &str) -> bool {
    matches!(channel, "dev" | "beta" | "release")
}

#[utoipa::path(
    get,
    path = "/v1/builds",
    params(BuildListQuery),
    responses(
        (status = 200, description = "Registered builds, newest first.", body = [BuildResponse]),
        (status = 400, description = "Unknown channel."),
        (status = 401, description = "Missing or invalid session cookie."),
        (status = 403, description = "Forbidden."),
    ),
    tag = "builds"
)]
pub async fn list_builds(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    Query(query): Query<BuildListQuery>,
) -> impl IntoResponse {
    let principal = match require_auth(&headers, &pool).await {
        Ok(principal) => principal,
        Err(status) => return status.into_response(),
    };
    if let Err(status) = ensure_role(&principal, STAFF_ROLES) {
        return status.into_response();
    }

    if let Some(channel) = query.channel.as_deref() {
        if !valid_channel(channel) {
            return (StatusCode::BAD_REQUEST, "Unknown channel.").into_response();
        }
    }

    match fetch_builds(&pool, query.channel.as_deref()).await {
        Ok(list) => (StatusCode::OK, Json(list)).into_response(),
        Err(err) => {
            error!("Failed to list builds: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[utoipa::path(
    get,
    path = "/v1/builds/{id}",
    params(("id" = String, Path, description = "Build id")),
    responses(
        (status = 200, description = "Build detail.", body = BuildResponse),
        (status = 400, description = "Invalid build id."),
        (status = 401, description = "Missing or invalid session cookie."),
        (status = 403, description = "Forbidden."),
        (status = 404, description = "Build not found."),
    ),
    tag = "builds"
)]
pub async fn get_build(
    Path(id): Path<String>,
    headers: HeaderMap,
    pool: Extension<PgPool>,
) -> impl IntoResponse {
    let principal = match require_auth(&headers, &pool).await {
        Ok(principal) => principal,
        Err(status) => return status.into_response(),
    };
    if let Err(status) = ensure_role(&principal, STAFF_ROLES) {
        return status.into_response();
    }

    let build_id = match Uuid::parse_str(id.trim()) {
        Ok(id) => id,
        Err(_) => return StatusCode::BAD_REQUEST.into_response(),
    };

    match fetch_build(&pool, build_id).await {
        Ok(Some(build)) => (StatusCode::OK, Json(build)).into_response(),
        Ok(None) => StatusCode::NOT_FOUND.into_response(),
        Err(err) => {
            error!("Failed to fetch build: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[utoipa::path(
    post,
    path = "/v1/builds",
    request_body = CreateBuildRequest,
    responses(
        (status = 201, description = "Build registered.", body = BuildResponse),
        (status = 400, description = "Invalid game, version, or channel."),
        (status = 401, description = "Missing or invalid session cookie."),
        (status = 403, description = "Forbidden."),
        (status = 409, description = "That game/version/channel is already registered."),
    ),
    tag = "builds"
)]
pub async fn create_build(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    Json(payload): Json<CreateBuildRequest>,
) -> impl IntoResponse {
    let principal = match require_auth(&headers, &pool).await {
        Ok(principal) => principal,
        Err(status) => return status.into_response(),
    };
    if let Err(status) = ensure_role(&principal, STAFF_ROLES) {
        return status.into_response();
    }

    let game = payload.game.trim();
    let version = payload.version.trim();
    if game.is_empty() || game.len() > GAME_MAX {
        return (StatusCode::BAD_REQUEST, "Invalid game name.").into_response();
    }
    if version.is_empty() || version.len() > VERSION_MAX {
        return (StatusCode::BAD_REQUEST, "Invalid version.").into_response();
    }
    if !valid_channel(&payload.channel) {
        return (StatusCode::BAD_REQUEST, "Unknown channel.").into_response();
    }

    let query = r#"
        INSERT INTO game_builds (game, version, channel, notes, uploaded_by)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING
            id::text AS id,
            game,
            version,
            channel,
            notes,
            uploaded_by::text AS uploaded_by,
            to_char(created_at AT TIME ZONE 'utc', 'YYYY-MM-DD"T"HH24:MI:SS"Z"') AS created_at,
            to_char(updated_at AT TIME ZONE 'utc', 'YYYY-MM-DD"T"HH24:MI:SS"Z"') AS updated_at
    "#;
    let row = sqlx::query(query)
        .bind(game)
        .bind(version)
        .bind(&payload.channel)
        .bind(payload.notes.as_deref())
        .bind(principal.user_id)
        .fetch_one(&pool.0)
        .await;

    match row {
        Ok(row) => (StatusCode::CREATED, Json(build_response(&row))).into_response(),
        Err(err) if is_unique_violation(&err) => (
            StatusCode::CONFLICT,
            "That game/version/channel is already registered.",
        )
            .into_response(),
        Err(err) => {
            error!("Failed to register build: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[utoipa::path(
    patch,
    path = "/v1/builds/{id}",
    params(("id" = String, Path, description = "Build id")),
    request_body = UpdateBuildRequest,
    responses(
        (status = 200, description = "Updated build.", body = BuildResponse),
        (status = 400, description = "Invalid build id."),
        (status = 401, description = "Missing or invalid session cookie."),
        (status = 403, description = "Not the uploader."),
        (status = 404, description = "Build not found."),
    ),
    tag = "builds"
)]
pub async fn update_build(
    Path(id): Path<String>,
    headers: HeaderMap,
    pool: Extension<PgPool>,
    Json(payload): Json<UpdateBuildRequest>,
) -> impl IntoResponse {
    let principal = match require_auth(&headers, &pool).await {
        Ok(principal) => principal,
        Err(status) => return status.into_response(),
    };
    if let Err(status) = ensure_role(&principal, STAFF_ROLES) {
        return status.into_response();
    }

    let build_id = match Uuid::parse_str(id.trim()) {
        Ok(id) => id,
        Err(_) => return StatusCode::BAD_REQUEST.into_response(),
    };

    if let Err(response) = ensure_uploader_or_admin(&pool, &principal, build_id).await {
        return response;
    }

    let query = r#"
        UPDATE game_builds
        SET notes = COALESCE($2, notes), updated_at = NOW()
        WHERE id = $1
        RETURNING
            id::text AS id,
            game,
            version,
            channel,
            notes,
            uploaded_by::text AS uploaded_by,
            to_char(created_at AT TIME ZONE 'utc', 'YYYY-MM-DD"T"HH24:MI:SS"Z"') AS created_at,
            to_char(updated_at AT TIME ZONE 'utc', 'YYYY-MM-DD"T"HH24:MI:SS"Z"') AS updated_at
    "#;
    let row = sqlx::query(query)
        .bind(build_id)
        .bind(payload.notes.as_deref())
        .fetch_optional(&pool.0)
        .await;

    match row {
        Ok(Some(row)) => (StatusCode::OK, Json(build_response(&row))).into_response(),
        Ok(None) => StatusCode::NOT_FOUND.into_response(),
        Err(err) => {
            error!("Failed to update build: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[utoipa::path(
    delete,
    path = "/v1/builds/{id}",
    params(("id" = String, Path, description = "Build id")),
    responses(
        (status = 204, description = "Build removed."),
        (status = 400, description = "Invalid build id."),
        (status = 401, description = "Missing or invalid session cookie."),
        (status = 403, description = "Not the uploader."),
        (status = 404, description = "Build not found."),
    ),
    tag = "builds"
)]
pub async fn delete_build(
    Path(id): Path<String>,
    headers: HeaderMap,
    pool: Extension<PgPool>,
) -> impl IntoResponse {
    let principal = match require_auth(&headers, &pool).await {
        Ok(principal) => principal,
        Err(status) => return status.into_response(),
    };
    if let Err(status) = ensure_role(&principal, STAFF_ROLES) {
        return status.into_response();
    }

    let build_id = match Uuid::parse_str(id.trim()) {
        Ok(id) => id,
        Err(_) => return StatusCode::BAD_REQUEST.into_response(),
    };

    if let Err(response) = ensure_uploader_or_admin(&pool, &principal, build_id).await {
        return response;
    }

    let result = sqlx::query("DELETE FROM game_builds WHERE id = $1")
        .bind(build_id)
        .execute(&pool.0)
        .await;

    match result {
        Ok(result) if result.rows_affected() > 0 => StatusCode::NO_CONTENT.into_response(),
        Ok(_) => StatusCode::NOT_FOUND.into_response(),
        Err(err) => {
            error!("Failed to delete build: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Ownership predicate: the uploader may mutate their entry; the admin set
/// may mutate any. Separate from the role guard by design of the API.
async fn ensure_uploader_or_admin(
    pool: &PgPool,
    principal: &Principal,
    build_id: Uuid,
) -> Result<(), Response> {
    if ADMIN_ROLES.contains(&principal.role) {
        return Ok(());
    }
    let row = sqlx::query("SELECT uploaded_by FROM game_builds WHERE id = $1")
        .bind(build_id)
        .fetch_optional(pool)
        .await
        .map_err(|err| {
            error!("Failed to fetch build owner: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        })?;
    let Some(row) = row else {
        return Err(StatusCode::NOT_FOUND.into_response());
    };
    if row.get::<Uuid, _>("uploaded_by") == principal.user_id {
        Ok(())
    } else {
        Err(StatusCode::FORBIDDEN.into_response())
    }
}

async fn fetch_builds(
    pool: &PgPool,
    channel: Option<&str>,
) -> Result<Vec<BuildResponse>, sqlx::Error> {
    let query = r#"
        SELECT
            id::text AS id,
            game,
            version,
            channel,
            notes,
            uploaded_by::text AS uploaded_by,
            to_char(created_at AT TIME ZONE 'utc', 'YYYY-MM-DD"T"HH24:MI:SS"Z"') AS created_at,
            to_char(updated_at AT TIME ZONE 'utc', 'YYYY-MM-DD"T"HH24:MI:SS"Z"') AS updated_at
        FROM game_builds
        WHERE ($1::text IS NULL OR channel = $1)
        ORDER BY created_at DESC
    "#;
    let rows = sqlx::query(query).bind(channel).fetch_all(pool).await?;
    Ok(rows.iter().map(build_response).collect())
}

async fn fetch_build(pool: &PgPool, build_id: Uuid) -> Result<Option<BuildResponse>, sqlx::Error> {
    let query = r#"
        SELECT
            id::text AS id,
            game,
            version,
            channel,
            notes,
            uploaded_by::text AS uploaded_by,
            to_char(created_at AT TIME ZONE 'utc', 'YYYY-MM-DD"T"HH24:MI:SS"Z"') AS created_at,
            to_char(updated_at AT TIME ZONE 'utc', 'YYYY-MM-DD"T"HH24:MI:SS"Z"') AS updated_at
        FROM game_builds
        WHERE id = $1
        LIMIT 1
    "#;
    let row = sqlx::query(query).bind(build_id).fetch_optional(pool).await?;
    Ok(row.as_ref().map(build_response))
}

fn build_response(row: &sqlx::postgres::PgRow) -> BuildResponse {
    BuildResponse {
        id: row.get("id"),
        game: row.get("game"),
        version: row.get("version"),
        channel: row.get("channel"),
        notes: row.get("notes"),
        uploaded_by: row.get("uploaded_by"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

#[cfg(test)]
mod tests {
    use super::valid_channel;

    #[test]
    fn channel_set_is_closed() {
        assert!(valid_channel("dev"));
        assert!(valid_channel("beta"));
        assert!(valid_channel("release"));
        assert!(!valid_channel("nightly"));
        assert!(!valid_channel("Release"));
    }
}
