//! Authenticated principal extraction and authorization helpers.
//!
//! Flow Overview: read the session cookie, resolve it to a user, and return a
//! principal that downstream handlers can use. Role guards and ownership
//! checks are separate predicates; ownership is compared per resource in the
//! handlers that own the resource.

use axum::http::{HeaderMap, StatusCode};
use sqlx::PgPool;
use uuid::Uuid;

use super::role::Role;
use super::session::authenticate_session;

/// Authenticated user context derived from the session cookie.
#[derive(Clone, Debug)]
pub struct Principal {
    pub user_id: Uuid,
    pub session_id: Uuid,
    pub email: String,
    pub display_name: String,
    pub role: Role,
}

/// Resolve a session cookie into a principal, or return 401 for missing sessions.
pub async fn require_auth(headers: &HeaderMap, pool: &PgPool) -> Result<Principal, StatusCode> {
    match authenticate_session(headers, pool).await {
        Ok(Some(record)) => Ok(Principal {
            user_id: record.user_id,
            session_id: record.session_id,
            email: record.email,
            display_name: record.display_name,
            role: record.role,
        }),
        Ok(None) => Err(StatusCode::UNAUTHORIZED),
        Err(status) => Err(status),
    }
}

/// Deny with 403 unless the caller's role is a member of the allowed set.
/// Must run after `require_auth`; a 403 implies a valid identity.
pub fn ensure_role(principal: &Principal, allowed: &[Role]) -> Result<(), StatusCode> {
    if allowed.contains(&principal.role) {
        Ok(())
    } else {
        Err(StatusCode::FORBIDDEN)
    }
}

#[cfg(test)]
mod tests {
    use super::{ensure_role, Principal};
    use crate::api::handlers::auth::role::{Role, ADMIN_ROLES, STAFF_ROLES};
    use axum::http::StatusCode;
    use uuid::Uuid;

    fn principal(role: Role) -> Principal {
        Principal {
            user_id: Uuid::nil(),
            session_id: Uuid::nil(),
            email: "alice@example.com".to_string(),
            display_name: "alice".to_string(),
            role,
        }
    }

    #[test]
    fn ensure_role_denies_outside_set() {
        let caller = principal(Role::User);
        assert_eq!(
            ensure_role(&caller, STAFF_ROLES),
            Err(StatusCode::FORBIDDEN)
        );
        assert_eq!(
            ensure_role(&caller, ADMIN_ROLES),
            Err(StatusCode::FORBIDDEN)
        );
    }

    #[test]
    fn ensure_role_allows_members() {
        assert_eq!(ensure_role(&principal(Role::Ceo), ADMIN_ROLES), Ok(()));
        assert_eq!(
            ensure_role(&principal(Role::DevTester), STAFF_ROLES),
            Ok(())
        );
    }

    #[test]
    fn staff_set_does_not_imply_admin_set() {
        let staff = principal(Role::Staff);
        assert_eq!(ensure_role(&staff, STAFF_ROLES), Ok(()));
        assert_eq!(ensure_role(&staff, ADMIN_ROLES), Err(StatusCode::FORBIDDEN));
    }
}
