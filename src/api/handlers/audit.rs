//! Append-only audit trail for security-relevant events.
//!
//! Writes happen inline in the mutating code paths (login, logout-all,
//! password change, role change, deactivation, toggle flips). A failed audit
//! insert never fails the parent operation; it is logged and dropped.

use axum::{
    extract::{Extension, Query},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Row};
use tracing::{error, warn, Instrument};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use super::auth::principal::{ensure_role, require_auth};
use super::auth::role::ADMIN_ROLES;

const DEFAULT_LIMIT: i64 = 50;
const MAX_LIMIT: i64 = 200;

/// Record one audit event. Best-effort by design.
pub(crate) async fn record_event(
    pool: &PgPool,
    actor_id: Option<Uuid>,
    action: &str,
    subject: Option<String>,
    detail: Option<String>,
) {
    let query = r"
        INSERT INTO audit_log (actor_id, action, subject, detail)
        VALUES ($1, $2, $3, $4)
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    if let Err(err) = sqlx::query(query)
        .bind(actor_id)
        .bind(action)
        .bind(subject)
        .bind(detail)
        .execute(pool)
        .instrument(span)
        .await
    {
        warn!("Failed to record audit event {action}: {err}");
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AuditEntry {
    pub id: i64,
    pub actor_id: Option<String>,
    pub action: String,
    pub subject: Option<String>,
    pub detail: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct AuditListQuery {
    /// Page size, capped at 200.
    pub limit: Option<i64>,
    /// Return entries with an id strictly below this value.
    pub before: Option<i64>,
    /// Exact action filter, e.g. `auth.login`.
    pub action: Option<String>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct AuditPruneQuery {
    /// Delete entries with an id strictly below this value.
    pub before: i64,
}

#[utoipa::path(
    get,
    path = "/v1/audit",
    params(AuditListQuery),
    responses(
        (status = 200, description = "Audit entries, newest first.", body = [AuditEntry]),
        (status = 401, description = "Missing or invalid session cookie."),
        (status = 403, description = "Forbidden."),
    ),
    tag = "audit"
)]
pub async fn list_audit(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    Query(query): Query<AuditListQuery>,
) -> impl IntoResponse {
    let principal = match require_auth(&headers, &pool).await {
        Ok(principal) => principal,
        Err(status) => return status.into_response(),
    };
    if let Err(status) = ensure_role(&principal, ADMIN_ROLES) {
        return status.into_response();
    }

    let limit = query.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);

    match fetch_entries(&pool, limit, query.before, query.action.as_deref()).await {
        Ok(entries) => (StatusCode::OK, Json(entries)).into_response(),
        Err(err) => {
            error!("Failed to list audit entries: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[utoipa::path(
    delete,
    path = "/v1/audit",
    params(AuditPruneQuery),
    responses(
        (status = 200, description = "Old audit entries pruned."),
        (status = 401, description = "Missing or invalid session cookie."),
        (status = 403, description = "Forbidden."),
    ),
    tag = "audit"
)]
pub async fn prune_audit(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    Query(query): Query<AuditPruneQuery>,
) -> impl IntoResponse {
    let principal = match require_auth(&headers, &pool).await {
        Ok(principal) => principal,
        Err(status) => return status.into_response(),
    };
    if let Err(status) = ensure_role(&principal, ADMIN_ROLES) {
        return status.into_response();
    }

    match delete_entries_before(&pool, query.before).await {
        Ok(deleted) => (
            StatusCode::OK,
            Json(serde_json::json!({ "deleted": deleted })),
        )
            .into_response(),
        Err(err) => {
            error!("Failed to prune audit entries: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn fetch_entries(
    pool: &PgPool,
    limit: i64,
    before: Option<i64>,
    action: Option<&str>,
) -> Result<Vec<AuditEntry>, sqlx::Error> {
    let query = r#"
        SELECT
            id,
            actor_id::text AS actor_id,
            action,
            subject,
            detail,
            to_char(created_at AT TIME ZONE 'utc', 'YYYY-MM-DD"T"HH24:MI:SS"Z"') AS created_at
        FROM audit_log
        WHERE ($2::bigint IS NULL OR id < $2)
          AND ($3::text IS NULL OR action = $3)
        ORDER BY id DESC
        LIMIT $1
    "#;
    let rows = sqlx::query(query)
        .bind(limit)
        .bind(before)
        .bind(action)
        .fetch_all(pool)
        .await?;
    Ok(rows
        .into_iter()
        .map(|row| AuditEntry {
            id: row.get("id"),
            actor_id: row.get("actor_id"),
            action: row.get("action"),
            subject: row.get("subject"),
            detail: row.get("detail"),
            created_at: row.get("created_at"),
        })
        .collect())
}

async fn delete_entries_before(pool: &PgPool, before: i64) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM audit_log WHERE id < $1")
        .bind(before)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

#[cfg(test)]
mod tests {
    use super::{AuditListQuery, DEFAULT_LIMIT, MAX_LIMIT};

    #[test]
    fn limit_clamps_to_bounds() {
        let clamp = |limit: Option<i64>| limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
        assert_eq!(clamp(None), DEFAULT_LIMIT);
        assert_eq!(clamp(Some(0)), 1);
        assert_eq!(clamp(Some(10_000)), MAX_LIMIT);
    }

    #[test]
    fn audit_list_query_deserializes() -> anyhow::Result<()> {
        let query: AuditListQuery = serde_json::from_value(serde_json::json!({
            "limit": 10,
            "before": 99,
            "action": "auth.login"
        }))?;
        assert_eq!(query.limit, Some(10));
        assert_eq!(query.before, Some(99));
        assert_eq!(query.action.as_deref(), Some("auth.login"));
        Ok(())
    }
}
