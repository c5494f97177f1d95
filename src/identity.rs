use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;

use crate::{config::AppConfig, session::Role};

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("identity provider request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("identity provider rejected the request ({status}): {message}")]
    Rejected { status: u16, message: String },
}

/// IdentityProvider
///
/// Back-office operations against the identity provider: reading and assigning
/// the role stored in a user's public metadata, and sending invitations.
/// Session verification itself lives in `session::SessionVerifier`.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// The raw role value recorded in the user's public metadata, if any.
    /// Values that are not a known `Role` are returned as-is.
    async fn user_role(&self, user_id: &str) -> Result<Option<String>, IdentityError>;

    async fn assign_role(&self, user_id: &str, role: Role) -> Result<(), IdentityError>;

    /// Sends an invitation email; the invited account is created with `role`.
    /// Returns the provider's invitation id.
    async fn invite(&self, email: &str, role: Role) -> Result<String, IdentityError>;
}

pub type IdentityState = Arc<dyn IdentityProvider>;

#[derive(Deserialize)]
struct ProviderUser {
    #[serde(default)]
    public_metadata: serde_json::Value,
}

#[derive(Deserialize)]
struct ProviderInvitation {
    id: String,
}

/// ClerkClient
///
/// `IdentityProvider` over the Clerk backend REST API.
#[derive(Clone)]
pub struct ClerkClient {
    http: reqwest::Client,
    api_url: String,
    secret_key: String,
}

impl ClerkClient {
    pub fn new(api_url: &str, secret_key: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_url: api_url.trim_end_matches('/').to_string(),
            secret_key: secret_key.to_string(),
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(&config.clerk_api_url, &config.clerk_secret_key)
    }

    /// `/users/{id}{suffix}` with the id percent-encoded as a single path segment.
    pub fn user_url(&self, user_id: &str, suffix: &str) -> String {
        format!(
            "{}/users/{}{suffix}",
            self.api_url,
            urlencoding::encode(user_id)
        )
    }

    /// Maps non-2xx responses to `IdentityError::Rejected` with the body as message.
    async fn checked(response: reqwest::Response) -> Result<reqwest::Response, IdentityError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = response.text().await.unwrap_or_default();
        Err(IdentityError::Rejected {
            status: status.as_u16(),
            message,
        })
    }
}

#[async_trait]
impl IdentityProvider for ClerkClient {
    async fn user_role(&self, user_id: &str) -> Result<Option<String>, IdentityError> {
        let response = self
            .http
            .get(self.user_url(user_id, ""))
            .bearer_auth(&self.secret_key)
            .send()
            .await?;
        let user = Self::checked(response).await?.json::<ProviderUser>().await?;

        Ok(user
            .public_metadata
            .get("role")
            .and_then(serde_json::Value::as_str)
            .map(String::from))
    }

    async fn assign_role(&self, user_id: &str, role: Role) -> Result<(), IdentityError> {
        let response = self
            .http
            .patch(self.user_url(user_id, "/metadata"))
            .bearer_auth(&self.secret_key)
            .json(&json!({ "public_metadata": { "role": role.as_str() } }))
            .send()
            .await?;
        Self::checked(response).await?;
        Ok(())
    }

    async fn invite(&self, email: &str, role: Role) -> Result<String, IdentityError> {
        let response = self
            .http
            .post(format!("{}/invitations", self.api_url))
            .bearer_auth(&self.secret_key)
            .json(&json!({
                "email_address": email,
                "public_metadata": { "role": role.as_str() },
                "notify": true,
                "ignore_existing": true,
            }))
            .send()
            .await?;
        let invitation = Self::checked(response)
            .await?
            .json::<ProviderInvitation>()
            .await?;
        Ok(invitation.id)
    }
}
