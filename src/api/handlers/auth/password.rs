//! Argon2id password hashing, kept off the request-dispatch path.
//!
//! Hashing is deliberately expensive, so both directions run inside
//! `spawn_blocking`; one login attempt must not stall unrelated requests.

use anyhow::{anyhow, Context, Result};
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use secrecy::{ExposeSecret, SecretString};

// A throwaway Argon2id record. Verified against when the identifier does not
// resolve to a user, so the unknown-identifier path costs the same as a wrong
// password and timing cannot enumerate accounts.
const DUMMY_HASH: &str = "$argon2id$v=19$m=19456,t=2,p=1$gZiV/M1gPc22ElAH/Jh1Hw$CWOrkoo7oJBQ/45WwZrGOPhNjikTHc8TzvYb6HQVSnM";

/// Hash a plaintext password with Argon2id and a fresh random salt.
pub(crate) async fn hash_password(password: SecretString) -> Result<String> {
    tokio::task::spawn_blocking(move || {
        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(password.expose_secret().as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|err| anyhow!("failed to hash password: {err}"))
    })
    .await
    .context("password hashing task failed")?
}

/// Verify a plaintext password against a stored PHC string.
///
/// Returns `Ok(false)` for a mismatch or an unparseable stored hash; only
/// infrastructure failures surface as errors.
pub(crate) async fn verify_password(password: SecretString, stored_hash: String) -> Result<bool> {
    tokio::task::spawn_blocking(move || {
        let Ok(parsed) = PasswordHash::new(&stored_hash) else {
            return false;
        };
        Argon2::default()
            .verify_password(password.expose_secret().as_bytes(), &parsed)
            .is_ok()
    })
    .await
    .context("password verification task failed")
}

/// Burn a verification against the dummy record.
pub(crate) async fn verify_dummy_password(password: SecretString) {
    let _ = verify_password(password, DUMMY_HASH.to_string()).await;
}

#[cfg(test)]
mod tests {
    use super::{hash_password, verify_dummy_password, verify_password};
    use anyhow::Result;
    use secrecy::SecretString;

    fn secret(value: &str) -> SecretString {
        SecretString::from(value.to_string())
    }

    #[tokio::test]
    async fn hash_then_verify_round_trip() -> Result<()> {
        let hash = hash_password(secret("Str0ng!Pass")).await?;
        assert!(hash.starts_with("$argon2id$"));
        assert!(verify_password(secret("Str0ng!Pass"), hash.clone()).await?);
        assert!(!verify_password(secret("WrongPass1!"), hash).await?);
        Ok(())
    }

    #[tokio::test]
    async fn hashes_are_salted() -> Result<()> {
        let first = hash_password(secret("Str0ng!Pass")).await?;
        let second = hash_password(secret("Str0ng!Pass")).await?;
        assert_ne!(first, second);
        Ok(())
    }

    #[tokio::test]
    async fn unparseable_hash_is_a_mismatch_not_an_error() -> Result<()> {
        let verified = verify_password(secret("anything"), "not-a-phc-string".to_string()).await?;
        assert!(!verified);
        Ok(())
    }

    #[tokio::test]
    async fn dummy_verification_never_panics() {
        verify_dummy_password(secret("whatever")).await;
    }
}
