use std::{fmt, sync::Arc};

use async_trait::async_trait;
use axum::http::{HeaderMap, header};
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;
use ts_rs::TS;
use utoipa::ToSchema;

use crate::{
    config::AppConfig,
    guard::{ADMIN_HOME, USER_HOME},
    repository::RepositoryState,
};

/// Cookie the identity provider stores the session token in.
pub const SESSION_COOKIE: &str = "__session";

/// Header accepted by the local development bypass.
pub const DEV_USER_HEADER: &str = "x-user-id";

/// Role
///
/// The authorization attribute carried in a verified session. Anything other
/// than these two values is treated as "no role".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum Role {
    Admin,
    User,
}

impl Role {
    pub fn from_claim(value: &str) -> Option<Self> {
        match value {
            "admin" => Some(Role::Admin),
            "user" => Some(Role::User),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::User => "user",
        }
    }

    /// Canonical landing path for the role.
    pub fn home_path(&self) -> &'static str {
        match self {
            Role::Admin => ADMIN_HOME,
            Role::User => USER_HOME,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Public metadata embedded in the session claims.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionMetadata {
    #[serde(
        default,
        deserialize_with = "deserialize_role",
        skip_serializing_if = "Option::is_none"
    )]
    pub role: Option<Role>,
}

/// Unknown, null or non-string role values collapse to `None`.
fn deserialize_role<'de, D>(deserializer: D) -> Result<Option<Role>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(raw
        .as_ref()
        .and_then(serde_json::Value::as_str)
        .and_then(Role::from_claim))
}

/// SessionClaims
///
/// Payload of the signed session token issued by the identity provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClaims {
    /// Subject: the provider-assigned user identifier.
    pub sub: String,
    pub exp: usize,
    #[serde(default)]
    pub iat: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<SessionMetadata>,
}

impl SessionClaims {
    pub fn role(&self) -> Option<Role> {
        self.metadata.as_ref().and_then(|m| m.role)
    }
}

/// A session the verifier accepted.
#[derive(Debug, Clone, PartialEq)]
pub struct VerifiedSession {
    pub user_id: String,
    pub role: Option<Role>,
}

#[derive(Debug, Error)]
pub enum VerifyError {
    #[error("invalid session token: {0}")]
    InvalidToken(#[from] jsonwebtoken::errors::Error),
    #[error("session verification unavailable: {0}")]
    Unavailable(String),
}

/// SessionVerifier
///
/// The verification capability injected into the route guard and the extractors.
/// `Ok(None)` means the request carries no session at all.
#[async_trait]
pub trait SessionVerifier: Send + Sync {
    async fn verify(&self, headers: &HeaderMap) -> Result<Option<VerifiedSession>, VerifyError>;
}

pub type SessionVerifierState = Arc<dyn SessionVerifier>;

/// Outcome of classifying a request's session.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionStatus {
    pub authenticated: bool,
    pub user_id: Option<String>,
    pub role: Option<Role>,
}

impl SessionStatus {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn signed_in(user_id: impl Into<String>, role: Option<Role>) -> Self {
        Self {
            authenticated: true,
            user_id: Some(user_id.into()),
            role,
        }
    }
}

/// classify
///
/// Asks the verifier for a session and extracts the role claim. Verification
/// failures fail closed: the request is treated as unauthenticated.
pub async fn classify(verifier: &dyn SessionVerifier, headers: &HeaderMap) -> SessionStatus {
    match verifier.verify(headers).await {
        Ok(Some(session)) => SessionStatus::signed_in(session.user_id, session.role),
        Ok(None) => SessionStatus::anonymous(),
        Err(e) => {
            tracing::warn!(error = %e, "session verification failed, treating request as unauthenticated");
            SessionStatus::anonymous()
        }
    }
}

/// session_token
///
/// Bearer token first, then the provider's session cookie.
pub fn session_token(headers: &HeaderMap) -> Option<&str> {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty());
    if bearer.is_some() {
        return bearer;
    }

    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .find_map(|cookie| {
            cookie
                .trim()
                .strip_prefix(SESSION_COOKIE)
                .and_then(|rest| rest.strip_prefix('='))
        })
        .filter(|token| !token.is_empty())
}

/// JwtSessionVerifier
///
/// Validates the provider's signed session token locally, either with a shared
/// HS256 secret or with the provider's RS256 public key.
pub struct JwtSessionVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl JwtSessionVerifier {
    pub fn hs256(secret: &str) -> Self {
        Self::with_key(DecodingKey::from_secret(secret.as_bytes()), Algorithm::HS256)
    }

    pub fn rs256_pem(pem: &str) -> Result<Self, VerifyError> {
        let key = DecodingKey::from_rsa_pem(pem.as_bytes())?;
        Ok(Self::with_key(key, Algorithm::RS256))
    }

    pub fn from_config(config: &AppConfig) -> Result<Self, VerifyError> {
        match &config.session_public_key {
            Some(pem) => Self::rs256_pem(pem),
            None => Ok(Self::hs256(&config.jwt_secret)),
        }
    }

    fn with_key(key: DecodingKey, algorithm: Algorithm) -> Self {
        let mut validation = Validation::new(algorithm);
        validation.validate_exp = true;
        // Provider session tokens are not audience-scoped.
        validation.validate_aud = false;
        Self { key, validation }
    }
}

#[async_trait]
impl SessionVerifier for JwtSessionVerifier {
    async fn verify(&self, headers: &HeaderMap) -> Result<Option<VerifiedSession>, VerifyError> {
        let Some(token) = session_token(headers) else {
            return Ok(None);
        };

        let data = decode::<SessionClaims>(token, &self.key, &self.validation)?;
        let role = data.claims.role();
        Ok(Some(VerifiedSession {
            user_id: data.claims.sub,
            role,
        }))
    }
}

/// LocalBypassVerifier
///
/// Development-only shortcut: an `x-user-id` header naming an existing user
/// record authenticates the request with that record's stored role. Anything
/// else falls through to the wrapped verifier.
pub struct LocalBypassVerifier {
    inner: SessionVerifierState,
    repo: RepositoryState,
}

impl LocalBypassVerifier {
    pub fn new(inner: SessionVerifierState, repo: RepositoryState) -> Self {
        Self { inner, repo }
    }
}

#[async_trait]
impl SessionVerifier for LocalBypassVerifier {
    async fn verify(&self, headers: &HeaderMap) -> Result<Option<VerifiedSession>, VerifyError> {
        let user_id = headers
            .get(DEV_USER_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|id| !id.is_empty());

        if let Some(user_id) = user_id {
            let user = self
                .repo
                .get_user(user_id)
                .await
                .map_err(|e| VerifyError::Unavailable(e.to_string()))?;
            if let Some(user) = user {
                return Ok(Some(VerifiedSession {
                    role: Role::from_claim(&user.role),
                    user_id: user.id,
                }));
            }
        }

        self.inner.verify(headers).await
    }
}
