//! Staff message board endpoints.
//!
//! Every staff-set role can read and post. Authors edit and delete their own
//! posts; the admin set may delete any post (moderation), but never edit
//! someone else's words.

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

const TITLE_MAX: usize = 120;
const BODY_MAX: usize = 10_000;
const DEFAULT_LIMIT: i64 = 50;
const MAX_LIMIT: i64 = 200;

#[derive(Debug, Serialize, ToSchema)]
pub struct PostResponse {
    pub id: String,
    pub author_id: String,
    pub author_name: String,
    pub title: String,
    pub body: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct CreatePostRequest {
    pub title: String,
    pub body: String,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct UpdatePostRequest {
    pub title: Option<String>,
    pub body: Option<String>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct PostListQuery {
    /// Page size, capped at 200.
    pub limit: Option<i64>,
    /// Return posts created before the post with this id.
    pub before: Option<String>,
}

fn validate_title(title: &str) -> bool {
    !title.trim().is_empty() && title.len() <= TITLE_MAX
}

fn validate_body(body: &str) -> bool {
    !body.trim().is_empty() && body.len() <= BODY_MAX
}

#[utoipa::path(
    get,
    path = "/v1/board/posts",
    params(PostListQuery),
    responses(
        (status = 200, description = "Board posts, newest first.", body = [PostResponse]),
        (status = 400, description = "Invalid pagination cursor."),
        (status = 401, description = "Missing or invalid session cookie."),
        (status = 403, description = "Forbidden."),
    ),
    tag = "board"
)]
pub async fn list_posts(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    Query(query): Query<PostListQuery>,
) -> impl IntoResponse {
    let principal = match require_auth(&headers, &pool).await {
        Ok(principal) => principal,
        Err(status) => return status.into_response(),
    };
    if let Err(status) = ensure_role(&principal, STAFF_ROLES) {
        return status.into_response();
    }

    let before = match query.before.as_deref() {
        None => None,
        Some(raw) => match Uuid::parse_str(raw.trim()) {
            Ok(id) => Some(id),
            Err(_) => return StatusCode::BAD_REQUEST.into_response(),
        },
    };
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);

    match fetch_posts(&pool, limit, before).await {
        Ok(posts) => (StatusCode::OK, Json(posts)).into_response(),
        Err(err) => {
            error!("Failed to list board posts: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[utoipa::path(
    post,
    path = "/v1/board/posts",
    request_body = CreatePostRequest,
    responses(
        (status = 201, description = "Post created.", body = PostResponse),
        (status = 400, description = "Empty or oversized title/body."),
        (status = 401, description = "Missing or invalid session cookie."),
        (status = 403, description = "Forbidden."),
    ),
    tag = "board"
)]
pub async fn create_post(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    Json(payload): Json<CreatePostRequest>,
) -> impl IntoResponse {
    let principal = match require_auth(&headers, &pool).await {
        Ok(principal) => principal,
        Err(status) => return status.into_response(),
    };
    if let Err(status) = ensure_role(&principal, STAFF_ROLES) {
        return status.into_response();
    }

    let title = payload.title.trim();
    if !validate_title(title) {
        return (StatusCode::BAD_REQUEST, "Title must be 1-120 characters.").into_response();
    }
    if !validate_body(&payload.body) {
        return (StatusCode::BAD_REQUEST, "Body must be 1-10000 characters.").into_response();
    }

    let query = r#"
        INSERT INTO board_posts (author_id, title, body)
        VALUES ($1, $2, $3)
        RETURNING id
    "#;
    let row = sqlx::query(query)
        .bind(principal.user_id)
        .bind(title)
        .bind(&payload.body)
        .fetch_one(&pool.0)
        .await;

    let post_id: Uuid = match row {
        Ok(row) => row.get("id"),
        Err(err) => {
            error!("Failed to create board post: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    match fetch_post(&pool, post_id).await {
        Ok(Some(post)) => (StatusCode::CREATED, Json(post)).into_response(),
        Ok(None) => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
        Err(err) => {
            error!("Failed to fetch created post: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[utoipa::path(
    patch,
    path = "/v1/board/posts/{id}",
    params(("id" = String, Path, description = "Post id")),
    request_body = UpdatePostRequest,
    responses(
        (status = 200, description = "Updated post.", body = PostResponse),
        (status = 400, description = "Invalid id, title, or body."),
        (status = 401, description = "Missing or invalid session cookie."),
        (status = 403, description = "Not the author."),
        (status = 404, description = "Post not found."),
    ),
    tag = "board"
)]
pub async fn update_post(
    Path(id): Path<String>,
    headers: HeaderMap,
    pool: Extension<PgPool>,
    Json(payload): Json<UpdatePostRequest>,
) -> impl IntoResponse {
    let principal = match require_auth(&headers, &pool).await {
        Ok(principal) => principal,
        Err(status) => return status.into_response(),
    };
    if let Err(status) = ensure_role(&principal, STAFF_ROLES) {
        return status.into_response();
    }

    let post_id = match Uuid::parse_str(id.trim()) {
        Ok(id) => id,
        Err(_) => return StatusCode::BAD_REQUEST.into_response(),
    };

    let title = payload
        .title
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty());
    if let Some(title) = title.as_deref() {
        if !validate_title(title) {
            return (StatusCode::BAD_REQUEST, "Title must be 1-120 characters.").into_response();
        }
    }
    if let Some(body) = payload.body.as_deref() {
        if !validate_body(body) {
            return (StatusCode::BAD_REQUEST, "Body must be 1-10000 characters.").into_response();
        }
    }

    // Editing is author-only; moderation never rewrites content.
    if let Err(response) = ensure_author(&pool, &principal, post_id, false).await {
        return response;
    }

    let query = r#"
        UPDATE board_posts
        SET
            title = COALESCE($2, title),
            body = COALESCE($3, body),
            updated_at = NOW()
        WHERE id = $1
        RETURNING id
    "#;
    let row = sqlx::query(query)
        .bind(post_id)
        .bind(title.as_deref())
        .bind(payload.body.as_deref())
        .fetch_optional(&pool.0)
        .await;

    match row {
        Ok(Some(_)) => match fetch_post(&pool, post_id).await {
            Ok(Some(post)) => (StatusCode::OK, Json(post)).into_response(),
            Ok(None) => StatusCode::NOT_FOUND.into_response(),
            Err(err) => {
                error!("Failed to fetch updated post: {err}");
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            }
        },
        Ok(None) => StatusCode::NOT_FOUND.into_response(),
        Err(err) => {
            error!("Failed to update board post: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[utoipa::path(
    delete,
    path = "/v1/board/posts/{id}",
    params(("id" = String, Path, description = "Post id")),
    responses(
        (status = 204, description = "Post deleted."),
        (status = 400, description = "Invalid post id."),
        (status = 401, description = "Missing or invalid session cookie."),
        (status = 403, description = "Not the author."),
        (status = 404, description = "Post not found."),
    ),
    tag = "board"
)]
pub async fn delete_post(
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

    let post_id = match Uuid::parse_str(id.trim()) {
        Ok(id) => id,
        Err(_) => return StatusCode::BAD_REQUEST.into_response(),
    };

    // Admin-set roles may remove any post.
    if let Err(response) = ensure_author(&pool, &principal, post_id, true).await {
        return response;
    }

    let result = sqlx::query("DELETE FROM board_posts WHERE id = $1")
        .bind(post_id)
        .execute(&pool.0)
        .await;

    match result {
        Ok(result) if result.rows_affected() > 0 => StatusCode::NO_CONTENT.into_response(),
        Ok(_) => StatusCode::NOT_FOUND.into_response(),
        Err(err) => {
            error!("Failed to delete board post: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Ownership predicate. `allow_admin_override` is true for deletes only.
async fn ensure_author(
    pool: &PgPool,
    principal: &Principal,
    post_id: Uuid,
    allow_admin_override: bool,
) -> Result<(), Response> {
    if allow_admin_override && ADMIN_ROLES.contains(&principal.role) {
        return Ok(());
    }
    let row = sqlx::query("SELECT author_id FROM board_posts WHERE id = $1")
        .bind(post_id)
        .fetch_optional(pool)
        .await
        .map_err(|err| {
            error!("Failed to fetch post author: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        })?;
    let Some(row) = row else {
        return Err(StatusCode::NOT_FOUND.into_response());
    };
    if row.get::<Uuid, _>("author_id") == principal.user_id {
        Ok(())
    } else {
        Err(StatusCode::FORBIDDEN.into_response())
    }
}

async fn fetch_posts(
    pool: &PgPool,
    limit: i64,
    before: Option<Uuid>,
) -> Result<Vec<PostResponse>, sqlx::Error> {
    let query = r#"
        SELECT
            p.id::text AS id,
            p.author_id::text AS author_id,
            u.display_name AS author_name,
            p.title,
            p.body,
            to_char(p.created_at AT TIME ZONE 'utc', 'YYYY-MM-DD"T"HH24:MI:SS"Z"') AS created_at,
            to_char(p.updated_at AT TIME ZONE 'utc', 'YYYY-MM-DD"T"HH24:MI:SS"Z"') AS updated_at
        FROM board_posts p
        JOIN users u ON u.id = p.author_id
        WHERE ($2::uuid IS NULL
               OR p.created_at < (SELECT created_at FROM board_posts WHERE id = $2))
        ORDER BY p.created_at DESC
        LIMIT $1
    "#;
    let rows = sqlx::query(query)
        .bind(limit)
        .bind(before)
        .fetch_all(pool)
        .await?;
    Ok(rows.iter().map(post_response).collect())
}

async fn fetch_post(pool: &PgPool, post_id: Uuid) -> Result<Option<PostResponse>, sqlx::Error> {
    let query = r#"
        SELECT
            p.id::text AS id,
            p.author_id::text AS author_id,
            u.display_name AS author_name,
            p.title,
            p.body,
            to_char(p.created_at AT TIME ZONE 'utc', 'YYYY-MM-DD"T"HH24:MI:SS"Z"') AS created_at,
            to_char(p.updated_at AT TIME ZONE 'utc', 'YYYY-MM-DD"T"HH24:MI:SS"Z"') AS updated_at
        FROM board_posts p
        JOIN users u ON u.id = p.author_id
        WHERE p.id = $1
        LIMIT 1
    "#;
    let row = sqlx::query(query).bind(post_id).fetch_optional(pool).await?;
    Ok(row.as_ref().map(post_response))
}

fn post_response(row: &sqlx::postgres::PgRow) -> PostResponse {
    PostResponse {
        id: row.get("id"),
        author_id: row.get("author_id"),
        author_name: row.get("author_name"),
        title: row.get("title"),
        body: row.get("body"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

#[cfg(test)]
mod tests {
    use super::{validate_body, validate_title};

    #[test]
    fn title_bounds() {
        assert!(validate_title("patch notes"));
        assert!(!validate_title("   "));
        assert!(!validate_title(&"t".repeat(121)));
    }

    #[test]
    fn body_bounds() {
        assert!(validate_body("shipping friday"));
        assert!(!validate_body(""));
        assert!(!validate_body(&"b".repeat(10_001)));
    }
}
