//! `OpenAPI` document assembly.
//!
//! Add new endpoints to the `paths(...)` list so they are documented; the
//! swagger UI route in `api::new` serves the generated spec.

use utoipa::openapi::{Contact, InfoBuilder, License, Tag};
use utoipa::OpenApi;

use super::handlers::{audit, auth, board, builds, me, toggles, users};

#[derive(OpenApi)]
#[openapi(
    paths(
        auth::register::register,
        auth::login::login,
        auth::session::session,
        auth::session::logout,
        auth::session::logout_all,
        me::get_me,
        me::update_me,
        me::change_password,
        me::list_sessions,
        me::revoke_session,
        users::list_users,
        users::get_user,
        users::update_user,
        users::assign_role,
        users::deactivate_user,
        users::reactivate_user,
        toggles::list_toggles,
        toggles::create_toggle,
        toggles::update_toggle,
        toggles::delete_toggle,
        builds::list_builds,
        builds::get_build,
        builds::create_build,
        builds::update_build,
        builds::delete_build,
        board::list_posts,
        board::create_post,
        board::update_post,
        board::delete_post,
        audit::list_audit,
        audit::prune_audit,
    ),
    components(schemas(
        auth::types::RegisterRequest,
        auth::types::LoginRequest,
        auth::types::PasswordChangeRequest,
        auth::types::UserProfile,
        auth::types::SessionResponse,
        auth::types::FieldError,
        auth::types::ValidationErrors,
        me::MeResponse,
        me::MeUpdateRequest,
        me::SessionSummary,
        users::UserSummary,
        users::UserDetail,
        users::UserUpdateRequest,
        users::UserRoleRequest,
        users::UserRoleResponse,
        toggles::ToggleResponse,
        toggles::CreateToggleRequest,
        toggles::UpdateToggleRequest,
        builds::BuildResponse,
        builds::CreateBuildRequest,
        builds::UpdateBuildRequest,
        board::PostResponse,
        board::CreatePostRequest,
        board::UpdatePostRequest,
        audit::AuditEntry,
    ))
)]
struct ApiDoc;

#[must_use]
pub fn openapi() -> utoipa::openapi::OpenApi {
    let mut spec = ApiDoc::openapi();
    spec.info = cargo_info();

    let mut auth_tag = Tag::new("auth");
    auth_tag.description = Some("Registration, login, and session lifecycle".to_string());

    let mut me_tag = Tag::new("me");
    me_tag.description = Some("Self-service profile and sessions".to_string());

    let mut admin_tag = Tag::new("users");
    admin_tag.description = Some("Admin-only user management".to_string());

    spec.tags = Some(vec![auth_tag, me_tag, admin_tag]);
    spec
}

fn cargo_info() -> utoipa::openapi::Info {
    // Use Cargo.toml metadata instead of the utoipa defaults.
    let mut info = InfoBuilder::new()
        .title(env!("CARGO_PKG_NAME"))
        .version(env!("CARGO_PKG_VERSION"))
        .description(optional_str(env!("CARGO_PKG_DESCRIPTION")))
        .build();

    info.contact = cargo_contact();
    info.license = cargo_license();
    info
}

fn cargo_contact() -> Option<Contact> {
    // Cargo authors are `;` separated and may include "Name <email>".
    let authors = env!("CARGO_PKG_AUTHORS");
    let primary = authors.split(';').next().map(str::trim)?;
    if primary.is_empty() {
        return None;
    }

    let (name, email) = parse_author(primary);
    if name.is_none() && email.is_none() {
        return None;
    }

    let mut contact = Contact::new();
    contact.name = name.map(str::to_string);
    contact.email = email.map(str::to_string);
    Some(contact)
}

fn cargo_license() -> Option<License> {
    let identifier = optional_str(env!("CARGO_PKG_LICENSE"))?;
    let mut license = License::new(identifier);
    license.identifier = Some(identifier.to_string());
    Some(license)
}

fn optional_str(value: &'static str) -> Option<&'static str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed)
    }
}

fn parse_author(author: &str) -> (Option<&str>, Option<&str>) {
    if let Some(start) = author.find('<') {
        let name = author[..start].trim();
        let email = author[start + 1..].trim_end_matches('>').trim();
        let name = if name.is_empty() { None } else { Some(name) };
        let email = if email.is_empty() { None } else { Some(email) };
        (name, email)
    } else {
        let name = author.trim();
        (if name.is_empty() { None } else { Some(name) }, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn openapi_info_from_cargo() {
        let spec = openapi();
        assert_eq!(spec.info.title, env!("CARGO_PKG_NAME"));
        assert_eq!(spec.info.version, env!("CARGO_PKG_VERSION"));
        assert_eq!(
            spec.info.description.as_deref(),
            Some(env!("CARGO_PKG_DESCRIPTION"))
        );

        let contact = spec.info.contact;
        assert!(contact.is_some());
        if let Some(contact) = contact {
            assert_eq!(contact.name.as_deref(), Some("Greenroom Crew"));
            assert_eq!(contact.email.as_deref(), Some("crew@greenroom.dev"));
        }

        let license = spec.info.license;
        assert!(license.is_some());
        if let Some(license) = license {
            assert_eq!(license.name, "BSD-3-Clause");
        }
    }

    #[test]
    fn openapi_tags_and_paths() {
        let spec = openapi();
        let tags = spec.tags.clone().unwrap_or_default();
        assert!(tags.iter().any(|tag| tag.name == "auth"));
        assert!(spec.paths.paths.contains_key("/v1/auth/login"));
        assert!(spec.paths.paths.contains_key("/v1/auth/logout-all"));
        assert!(spec.paths.paths.contains_key("/v1/users/{id}/role"));
        assert!(spec.paths.paths.contains_key("/v1/board/posts"));
    }

    #[test]
    fn parse_author_splits_name_and_email() {
        assert_eq!(
            parse_author("Greenroom Crew <crew@greenroom.dev>"),
            (Some("Greenroom Crew"), Some("crew@greenroom.dev"))
        );
        assert_eq!(parse_author("Solo Author"), (Some("Solo Author"), None));
        assert_eq!(parse_author(""), (None, None));
    }
}
