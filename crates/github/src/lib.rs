pub mod command;
pub mod origin;
pub mod report;
pub mod webhook;

use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use octocrab::{Octocrab, models::InstallationId};
use runbot_core::config::GitHubConfig;

/// GitHub API access. Holds no per-delivery state; installation clients are
/// derived on demand so concurrent deliveries never share anything mutable.
#[derive(Clone)]
pub struct GitHub {
    /// Personal token client, used for deliveries without an installation.
    pub client: Option<Octocrab>,
    /// App client authenticated with the app's JWT.
    pub app_client: Option<Octocrab>,
    pub timeout: Duration,
}

impl GitHub {
    pub async fn new(config: &GitHubConfig) -> Result<Arc<Self>> {
        let client = if let Some(token) = &config.token {
            let client = Octocrab::builder()
                .personal_token(token.clone())
                .build()
                .context("Failed to create GitHub client")?;
            let profile = client.current().user().await.context("Failed to fetch current user")?;
            tracing::info!("Logged in as {}", profile.login);
            Some(client)
        } else {
            None
        };

        let app_client = if let Some(app_config) = &config.app {
            let app_client = Octocrab::builder()
                .app(
                    app_config.id.into(),
                    jsonwebtoken::EncodingKey::from_rsa_pem(app_config.private_key.as_bytes())
                        .context("Failed to parse GitHub App private key")?,
                )
                .build()
                .context("Failed to create GitHub App client")?;
            tracing::info!("Authenticating as GitHub App {}", app_config.id);
            Some(app_client)
        } else {
            None
        };

        Ok(Arc::new(Self { client, app_client, timeout: config.timeout() }))
    }

    /// Pick the client that may write to the repository a delivery came from.
    pub fn client_for(&self, installation_id: Option<u64>) -> Result<Octocrab> {
        match (installation_id, &self.app_client) {
            (Some(id), Some(app_client)) => app_client
                .installation(InstallationId(id))
                .with_context(|| format!("Failed to create client for installation {id}")),
            (installation_id, _) => {
                if let Some(id) = installation_id {
                    tracing::warn!("Delivery from installation {id} but no GitHub App configured");
                }
                self.client.clone().context("No GitHub client available for this delivery")
            }
        }
    }
}
