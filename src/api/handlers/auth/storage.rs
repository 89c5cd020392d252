//! Database helpers for the credential store and the session store.
//!
//! Session tokens are stored as SHA-256 digests; every resolve re-checks the
//! backing user row so revocation and deactivation take effect immediately.

use anyhow::{anyhow, Context, Result};
use sqlx::{PgPool, Row};
use tracing::Instrument;
use uuid::Uuid;

use super::role::Role;
use super::utils::{generate_session_token, hash_session_token, is_unique_violation};

/// Outcome when attempting to create a new user.
#[derive(Debug)]
pub(super) enum SignupOutcome {
    Created(UserRow),
    Conflict,
}

/// Public-profile columns of a user row.
#[derive(Debug)]
pub(crate) struct UserRow {
    pub(crate) id: Uuid,
    pub(crate) email: String,
    pub(crate) display_name: String,
    pub(crate) role: String,
    pub(crate) created_at: String,
    pub(crate) last_login_at: Option<String>,
}

/// Minimal fields needed to verify a login attempt.
pub(super) struct LoginRecord {
    pub(super) user_id: Uuid,
    pub(super) password_hash: String,
}

/// Data attached to the request once a session resolves.
#[derive(Clone, Debug)]
pub(crate) struct SessionRecord {
    pub(crate) session_id: Uuid,
    pub(crate) user_id: Uuid,
    pub(crate) email: String,
    pub(crate) display_name: String,
    pub(crate) role: Role,
}

/// Classified result of a session lookup. Callers map every non-`Active`
/// variant to the same external 401; the variant only drives logging.
#[derive(Debug)]
pub(crate) enum SessionLookup {
    Active(SessionRecord),
    Expired,
    UserInactive,
    Missing,
}

const PROFILE_COLUMNS: &str = r#"
    id,
    email,
    display_name,
    role,
    to_char(created_at AT TIME ZONE 'utc', 'YYYY-MM-DD"T"HH24:MI:SS"Z"') AS created_at,
    CASE
        WHEN last_login_at IS NULL THEN NULL
        ELSE to_char(last_login_at AT TIME ZONE 'utc', 'YYYY-MM-DD"T"HH24:MI:SS"Z"')
    END AS last_login_at
"#;

fn user_row(row: &sqlx::postgres::PgRow) -> UserRow {
    UserRow {
        id: row.get("id"),
        email: row.get("email"),
        display_name: row.get("display_name"),
        role: row.get("role"),
        created_at: row.get("created_at"),
        last_login_at: row.get("last_login_at"),
    }
}

pub(super) async fn insert_user(
    pool: &PgPool,
    email: &str,
    display_name: &str,
    password_hash: &str,
) -> Result<SignupOutcome> {
    let query = format!(
        r"
        INSERT INTO users (email, display_name, password_hash, consented_at)
        VALUES ($1, $2, $3, NOW())
        RETURNING {PROFILE_COLUMNS}
    "
    );
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query.as_str()
    );
    let row = sqlx::query(&query)
        .bind(email)
        .bind(display_name)
        .bind(password_hash)
        .fetch_one(pool)
        .instrument(span)
        .await;

    match row {
        Ok(row) => Ok(SignupOutcome::Created(user_row(&row))),
        Err(err) if is_unique_violation(&err) => Ok(SignupOutcome::Conflict),
        Err(err) => Err(err).context("failed to insert user"),
    }
}

/// Look up login data by email or display name. Only active rows match; the
/// caller cannot tell an inactive account from an unknown one.
pub(super) async fn lookup_login_record(
    pool: &PgPool,
    email_normalized: &str,
    identifier: &str,
) -> Result<Option<LoginRecord>> {
    let query = r"
        SELECT id, password_hash
        FROM users
        WHERE (email = $1 OR display_name = $2)
          AND is_active
        LIMIT 1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(email_normalized)
        .bind(identifier)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to lookup login record")?;

    Ok(row.map(|row| LoginRecord {
        user_id: row.get("id"),
        password_hash: row.get("password_hash"),
    }))
}

pub(super) async fn record_login(pool: &PgPool, user_id: Uuid) -> Result<UserRow> {
    let query = format!(
        r"
        UPDATE users
        SET last_login_at = NOW()
        WHERE id = $1
        RETURNING {PROFILE_COLUMNS}
    "
    );
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query.as_str()
    );
    let row = sqlx::query(&query)
        .bind(user_id)
        .fetch_one(pool)
        .instrument(span)
        .await
        .context("failed to record login")?;
    Ok(user_row(&row))
}

pub(super) async fn insert_session(
    pool: &PgPool,
    user_id: Uuid,
    ttl_seconds: i64,
) -> Result<String> {
    // Generate a random token, store only its hash, and return the raw value
    // so the caller can set the session cookie.
    let query = r"
        INSERT INTO user_sessions (user_id, session_hash, expires_at)
        VALUES ($1, $2, NOW() + ($3 * INTERVAL '1 second'))
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );

    for _ in 0..3 {
        let token = generate_session_token()?;
        let token_hash = hash_session_token(&token);
        let result = sqlx::query(query)
            .bind(user_id)
            .bind(token_hash)
            .bind(ttl_seconds)
            .execute(pool)
            .instrument(span.clone())
            .await;

        match result {
            Ok(_) => return Ok(token),
            Err(err) if is_unique_violation(&err) => {}
            Err(err) => return Err(err).context("failed to insert session"),
        }
    }

    Err(anyhow!("failed to generate unique session token"))
}

/// Resolve a session token hash into a classified lookup.
///
/// The row is fetched without expiry/active filters so misses can be told
/// apart for logging; only `Active` bumps `last_seen_at`, and bumping never
/// extends the absolute expiry.
pub(crate) async fn resolve_session(pool: &PgPool, token_hash: &[u8]) -> Result<SessionLookup> {
    let query = r"
        SELECT
            user_sessions.id AS session_id,
            user_sessions.expires_at > NOW() AS fresh,
            users.id AS user_id,
            users.email,
            users.display_name,
            users.role,
            users.is_active
        FROM user_sessions
        JOIN users ON users.id = user_sessions.user_id
        WHERE user_sessions.session_hash = $1
        LIMIT 1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(token_hash)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to lookup session")?;

    let Some(row) = row else {
        return Ok(SessionLookup::Missing);
    };

    if !row.get::<bool, _>("fresh") {
        return Ok(SessionLookup::Expired);
    }
    if !row.get::<bool, _>("is_active") {
        return Ok(SessionLookup::UserInactive);
    }

    let role: String = row.get("role");
    let role = Role::parse(&role).ok_or_else(|| anyhow!("unknown role in users table: {role}"))?;

    // Record activity for audit/visibility without extending the session TTL.
    let query = r"
        UPDATE user_sessions
        SET last_seen_at = NOW()
        WHERE session_hash = $1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(token_hash)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to update session last_seen_at")?;

    Ok(SessionLookup::Active(SessionRecord {
        session_id: row.get("session_id"),
        user_id: row.get("user_id"),
        email: row.get("email"),
        display_name: row.get("display_name"),
        role,
    }))
}

pub(super) async fn delete_session(pool: &PgPool, token_hash: &[u8]) -> Result<()> {
    // Logout is idempotent; it's fine if no rows are deleted.
    let query = "DELETE FROM user_sessions WHERE session_hash = $1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "DELETE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(token_hash)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to delete session")?;
    Ok(())
}

/// Revoke every outstanding session for a user (logout-all, deactivation).
pub(crate) async fn delete_sessions_for_user(pool: &PgPool, user_id: Uuid) -> Result<u64> {
    let query = "DELETE FROM user_sessions WHERE user_id = $1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "DELETE",
        db.statement = query
    );
    let result = sqlx::query(query)
        .bind(user_id)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to delete sessions for user")?;
    Ok(result.rows_affected())
}

pub(crate) async fn fetch_password_hash(pool: &PgPool, user_id: Uuid) -> Result<Option<String>> {
    let query = "SELECT password_hash FROM users WHERE id = $1 AND is_active LIMIT 1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(user_id)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to fetch password hash")?;
    Ok(row.map(|row| row.get("password_hash")))
}

/// Rotate the password hash and revoke every *other* session in one
/// transaction. The session performing the change stays valid.
pub(crate) async fn update_password_and_revoke(
    pool: &PgPool,
    user_id: Uuid,
    new_hash: &str,
    keep_session_id: Uuid,
) -> Result<u64> {
    let mut tx = pool
        .begin()
        .await
        .context("failed to begin password change transaction")?;

    let query = r"
        UPDATE users
        SET password_hash = $2, updated_at = NOW()
        WHERE id = $1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(user_id)
        .bind(new_hash)
        .execute(&mut *tx)
        .instrument(span)
        .await
        .context("failed to update password hash")?;

    let query = "DELETE FROM user_sessions WHERE user_id = $1 AND id <> $2";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "DELETE",
        db.statement = query
    );
    let result = sqlx::query(query)
        .bind(user_id)
        .bind(keep_session_id)
        .execute(&mut *tx)
        .instrument(span)
        .await
        .context("failed to revoke other sessions")?;

    tx.commit()
        .await
        .context("failed to commit password change transaction")?;

    Ok(result.rows_affected())
}

#[cfg(test)]
mod tests {
    use super::{SessionLookup, SignupOutcome, UserRow};
    use uuid::Uuid;

    #[test]
    fn signup_outcome_debug_names() {
        assert_eq!(format!("{:?}", SignupOutcome::Conflict), "Conflict");
    }

    #[test]
    fn session_lookup_debug_names() {
        assert_eq!(format!("{:?}", SessionLookup::Missing), "Missing");
        assert_eq!(format!("{:?}", SessionLookup::Expired), "Expired");
        assert_eq!(format!("{:?}", SessionLookup::UserInactive), "UserInactive");
    }

    #[test]
    fn user_row_holds_values() {
        let row = UserRow {
            id: Uuid::nil(),
            email: "alice@example.com".to_string(),
            display_name: "alice".to_string(),
            role: "user".to_string(),
            created_at: "2026-01-01T00:00:00Z".to_string(),
            last_login_at: None,
        };
        assert_eq!(row.id, Uuid::nil());
        assert_eq!(row.role, "user");
        assert!(row.last_login_at.is_none());
    }
}
