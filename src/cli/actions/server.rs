use crate::api;
use crate::api::handlers::auth::AuthConfig;
use crate::cli::actions::Action;
use anyhow::{anyhow, Result};
use url::Url;

/// Handle the server action
pub async fn handle(action: Action) -> Result<()> {
    match action {
        Action::Server {
            port,
            dsn,
            frontend_url,
            session_ttl_hours,
        } => {
            let parsed = Url::parse(&dsn)?;
            if parsed.scheme() != "postgres" && parsed.scheme() != "postgresql" {
                return Err(anyhow!("unsupported DSN scheme: {}", parsed.scheme()));
            }

            let auth_config = AuthConfig::new(frontend_url)
                .with_session_ttl_seconds(session_ttl_hours.saturating_mul(60 * 60));

            api::new(port, dsn, auth_config).await?;
        }
    }

    Ok(())
}
