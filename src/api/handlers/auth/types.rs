//! Request/response types for auth endpoints.

use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(ToSchema, Deserialize, Debug)]
#[serde(deny_unknown_fields)]
pub struct RegisterRequest {
    pub email: String,
    /// Plaintext password; redacted from Debug output and never stored raw.
    #[schema(value_type = String)]
    pub password: SecretString,
    pub display_name: String,
    #[serde(default)]
    pub accept_terms: bool,
}

#[derive(ToSchema, Deserialize, Debug)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    /// Email or display name.
    pub identifier: String,
    #[schema(value_type = String)]
    pub password: SecretString,
}

#[derive(ToSchema, Deserialize, Debug)]
#[serde(deny_unknown_fields)]
pub struct PasswordChangeRequest {
    #[schema(value_type = String)]
    pub current_password: SecretString,
    #[schema(value_type = String)]
    pub new_password: SecretString,
}

/// Public user profile. Never carries the password hash.
#[derive(ToSchema, Serialize, Debug)]
pub struct UserProfile {
    pub id: String,
    pub email: String,
    pub display_name: String,
    pub role: String,
    pub created_at: String,
    pub last_login_at: Option<String>,
}

impl From<super::storage::UserRow> for UserProfile {
    fn from(row: super::storage::UserRow) -> Self {
        Self {
            id: row.id.to_string(),
            email: row.email,
            display_name: row.display_name,
            role: row.role,
            created_at: row.created_at,
            last_login_at: row.last_login_at,
        }
    }
}

#[derive(ToSchema, Serialize, Debug)]
pub struct SessionResponse {
    pub user_id: String,
    pub email: String,
    pub display_name: String,
    pub role: String,
}

#[derive(ToSchema, Serialize, Debug)]
pub struct FieldError {
    pub field: &'static str,
    pub message: &'static str,
}

/// Body shape for 400 responses with per-field messages.
#[derive(ToSchema, Serialize, Debug)]
pub struct ValidationErrors {
    pub errors: Vec<FieldError>,
}

impl ValidationErrors {
    pub(crate) fn new() -> Self {
        Self { errors: Vec::new() }
    }

    pub(crate) fn push(&mut self, field: &'static str, message: &'static str) {
        self.errors.push(FieldError { field, message });
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{Context, Result};

    #[test]
    fn register_request_deserializes_and_redacts_password() -> Result<()> {
        let request: RegisterRequest = serde_json::from_value(serde_json::json!({
            "email": "alice@example.com",
            "password": "Str0ng!Pass",
            "display_name": "alice",
            "accept_terms": true
        }))?;
        assert_eq!(request.email, "alice@example.com");
        assert!(request.accept_terms);
        let debugged = format!("{request:?}");
        assert!(!debugged.contains("Str0ng!Pass"));
        Ok(())
    }

    #[test]
    fn register_request_rejects_unknown_fields() {
        let result: std::result::Result<RegisterRequest, _> =
            serde_json::from_value(serde_json::json!({
                "email": "alice@example.com",
                "password": "Str0ng!Pass",
                "display_name": "alice",
                "role": "admin"
            }));
        assert!(result.is_err());
    }

    #[test]
    fn validation_errors_collects_fields() -> Result<()> {
        let mut errors = ValidationErrors::new();
        assert!(errors.is_empty());
        errors.push("email", "Invalid email address.");
        let value = serde_json::to_value(&errors)?;
        let field = value
            .get("errors")
            .and_then(|list| list.get(0))
            .and_then(|entry| entry.get("field"))
            .and_then(serde_json::Value::as_str)
            .context("missing field entry")?;
        assert_eq!(field, "email");
        Ok(())
    }
}
