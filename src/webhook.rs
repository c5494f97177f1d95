//! Signature verification and payloads for the identity provider's
//! user-lifecycle webhook (Svix signing scheme).

use axum::http::HeaderMap;
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

pub const HEADER_ID: &str = "svix-id";
pub const HEADER_TIMESTAMP: &str = "svix-timestamp";
pub const HEADER_SIGNATURE: &str = "svix-signature";

/// Maximum clock skew accepted between the sender and this server.
pub const TIMESTAMP_TOLERANCE_SECS: i64 = 5 * 60;

const SECRET_PREFIX: &str = "whsec_";
const SIGNATURE_VERSION: &str = "v1,";

#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("missing `{0}` header")]
    MissingHeader(&'static str),
    #[error("webhook signing secret is not valid base64")]
    InvalidSecret,
    #[error("webhook timestamp is not a unix timestamp")]
    InvalidTimestamp,
    #[error("webhook timestamp is outside the tolerance window")]
    StaleTimestamp,
    #[error("no matching webhook signature")]
    SignatureMismatch,
    #[error("malformed webhook payload: {0}")]
    Payload(#[from] serde_json::Error),
}

/// WebhookVerifier
///
/// HMAC-SHA256 over `{id}.{timestamp}.{body}` with the decoded `whsec_` secret.
pub struct WebhookVerifier {
    keyed: HmacSha256,
}

impl WebhookVerifier {
    pub fn new(secret: &str) -> Result<Self, WebhookError> {
        let encoded = secret.strip_prefix(SECRET_PREFIX).unwrap_or(secret);
        let key = BASE64
            .decode(encoded)
            .map_err(|_| WebhookError::InvalidSecret)?;
        let keyed = HmacSha256::new_from_slice(&key).map_err(|_| WebhookError::InvalidSecret)?;
        Ok(Self { keyed })
    }

    fn mac(&self, msg_id: &str, timestamp: i64, payload: &str) -> HmacSha256 {
        let mut mac = self.keyed.clone();
        mac.update(format!("{msg_id}.{timestamp}.{payload}").as_bytes());
        mac
    }

    /// The `v1,<base64>` signature the sender would attach.
    pub fn sign(&self, msg_id: &str, timestamp: i64, payload: &str) -> String {
        let digest = self.mac(msg_id, timestamp, payload).finalize().into_bytes();
        format!("{SIGNATURE_VERSION}{}", BASE64.encode(digest))
    }

    /// verify
    ///
    /// Accepts the request when any of the space-separated `v1` signatures
    /// matches and the timestamp is within tolerance of `now`.
    pub fn verify(
        &self,
        headers: &HeaderMap,
        payload: &str,
        now: DateTime<Utc>,
    ) -> Result<(), WebhookError> {
        let msg_id = header(headers, HEADER_ID)?;
        let timestamp = header(headers, HEADER_TIMESTAMP)?
            .parse::<i64>()
            .map_err(|_| WebhookError::InvalidTimestamp)?;
        let signatures = header(headers, HEADER_SIGNATURE)?;

        if (now.timestamp() - timestamp).abs() > TIMESTAMP_TOLERANCE_SECS {
            return Err(WebhookError::StaleTimestamp);
        }

        let matched = signatures
            .split_whitespace()
            .filter_map(|candidate| candidate.strip_prefix(SIGNATURE_VERSION))
            .filter_map(|encoded| BASE64.decode(encoded).ok())
            .any(|expected| {
                self.mac(msg_id, timestamp, payload)
                    .verify_slice(&expected)
                    .is_ok()
            });

        if matched {
            Ok(())
        } else {
            Err(WebhookError::SignatureMismatch)
        }
    }
}

fn header<'a>(headers: &'a HeaderMap, name: &'static str) -> Result<&'a str, WebhookError> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or(WebhookError::MissingHeader(name))
}

/// Envelope of every webhook delivery.
#[derive(Debug, Deserialize)]
pub struct WebhookEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

impl WebhookEvent {
    /// Events that carry a user record to synchronize.
    pub fn is_user_sync(&self) -> bool {
        matches!(self.event_type.as_str(), "user.created" | "user.updated")
    }
}

#[derive(Debug, Deserialize)]
pub struct EmailAddress {
    pub email_address: String,
}

/// `data` of `user.created` / `user.updated` events.
#[derive(Debug, Deserialize)]
pub struct UserEventData {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub email_addresses: Vec<EmailAddress>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

impl UserEventData {
    pub fn primary_email(&self) -> Option<&str> {
        self.email_addresses
            .first()
            .map(|e| e.email_address.trim())
            .filter(|email| !email.is_empty())
    }

    pub fn full_name(&self) -> String {
        format!(
            "{} {}",
            self.first_name.as_deref().unwrap_or_default(),
            self.last_name.as_deref().unwrap_or_default()
        )
        .trim()
        .to_string()
    }
}
