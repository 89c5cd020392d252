//! # Greenroom (Accounts & Staff Backstage API)
//!
//! `greenroom` is the account service behind the studio website: cookie
//! session authentication, role-gated staff/admin APIs, and a staff
//! message board.
//!
//! ## Authentication
//!
//! Passwords are hashed with Argon2id and never stored or logged in
//! plaintext. Logins mint an opaque 256-bit session token delivered in an
//! `HttpOnly` cookie; the database keeps only a SHA-256 digest of the
//! token, so a leaked table cannot be replayed as cookies.
//!
//! Sessions are server-side rows with an absolute expiry. Every protected
//! request re-validates the session against the store and re-checks that
//! the backing user is still active, which makes revocation ("log out all
//! devices", deactivation, password change) take effect immediately.
//!
//! ## Authorization
//!
//! Access is controlled by a closed role set (`user`, `dev_tester`,
//! `developer`, `staff`, `admin`, `ceo`). Route guards check membership in
//! an allowed set, never a hierarchy walk. Ownership checks (board posts,
//! build entries) compare the stored author against the caller and are
//! independent of role.

pub mod api;
pub mod cli;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_git_commit_hash_format() {
        if GIT_COMMIT_HASH == "unknown" {
            // Acceptable in non-git build environments
            return;
        }
        assert!(
            GIT_COMMIT_HASH.chars().all(|c| c.is_ascii_hexdigit()),
            "GIT_COMMIT_HASH should be a hex string, got: {GIT_COMMIT_HASH}"
        );
        assert!(
            GIT_COMMIT_HASH.len() >= 7,
            "GIT_COMMIT_HASH should be at least 7 characters long, got: {GIT_COMMIT_HASH}"
        );
    }
}
