//! Session negotiation (`POST {base}/start_session`).
//!
//! Runs once at startup. A failed negotiation is not fatal: the identity is
//! returned without a server-issued id and chat turns carry `null` for it.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{AvatalkError, Result};

const HTTP_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const HTTP_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const ANONYMOUS_USER: &str = "Anonymous";

/// Identifiers scoping one conversation to backend state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionIdentity {
    /// Local media slot the avatar stream is bound to.
    pub slot_id: i64,
    /// Server-issued conversation id, absent if negotiation failed or was skipped.
    pub remote_session_id: Option<String>,
}

impl SessionIdentity {
    /// Identity for offline use (simulation mode, failed negotiation).
    pub fn local(slot_id: i64) -> Self {
        Self {
            slot_id,
            remote_session_id: None,
        }
    }

    pub fn is_negotiated(&self) -> bool {
        self.remote_session_id.is_some()
    }
}

#[derive(Debug, Serialize)]
struct StartSessionRequest<'a> {
    user_name: &'a str,
}

#[derive(Debug, Deserialize)]
struct StartSessionResponse {
    session_id: String,
}

/// Blank names fall back to `"Anonymous"`.
pub fn normalize_user_name(raw: &str) -> &str {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        ANONYMOUS_USER
    } else {
        trimmed
    }
}

/// Parse a slot id the way the page input is read: blank or invalid is 0.
pub fn parse_slot_id(raw: &str) -> i64 {
    raw.trim().parse().unwrap_or(0)
}

/// Join `path` onto `base`, tolerating a trailing slash on the base.
pub(crate) fn endpoint_url(base: &str, path: &str) -> Result<String> {
    let base = base.trim().trim_end_matches('/');
    if base.is_empty() {
        return Err(AvatalkError::Config("service base URL is empty".into()));
    }
    if !(base.starts_with("http://") || base.starts_with("https://")) {
        return Err(AvatalkError::Config(format!(
            "service base URL must be http(s): {base}"
        )));
    }
    Ok(format!("{base}/{path}"))
}

pub(crate) fn http_client() -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .connect_timeout(HTTP_CONNECT_TIMEOUT)
        .timeout(HTTP_REQUEST_TIMEOUT)
        .build()?)
}

#[derive(Debug, Clone)]
pub struct SessionNegotiator {
    client: reqwest::Client,
    endpoint: String,
}

impl SessionNegotiator {
    /// # Errors
    /// `AvatalkError::Config` for an unusable base URL.
    pub fn new(base_url: &str) -> Result<Self> {
        Ok(Self {
            client: http_client()?,
            endpoint: endpoint_url(base_url, "start_session")?,
        })
    }

    /// Create the server session. Never fails: on any error the identity
    /// is returned without a remote id.
    pub async fn negotiate(&self, user_name: &str, slot_id: i64) -> SessionIdentity {
        match self.start_session(user_name).await {
            Ok(id) => {
                info!(slot_id, "session negotiated");
                SessionIdentity {
                    slot_id,
                    remote_session_id: Some(id),
                }
            }
            Err(e) => {
                warn!("session negotiation failed, continuing without server session: {e}");
                SessionIdentity::local(slot_id)
            }
        }
    }

    /// # Errors
    /// `AvatalkError::Transport` on network failure, non-success status, or
    /// a body without `session_id`.
    pub async fn start_session(&self, user_name: &str) -> Result<String> {
        let body = StartSessionRequest {
            user_name: normalize_user_name(user_name),
        };
        let response = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await?
            .error_for_status()?;
        let raw = response.text().await?;
        let parsed: StartSessionResponse = serde_json::from_str(&raw)
            .map_err(|e| AvatalkError::Transport(format!("malformed session reply: {e}")))?;
        Ok(parsed.session_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_user_name_is_anonymous() {
        assert_eq!(normalize_user_name("  "), "Anonymous");
        assert_eq!(normalize_user_name(" Budi "), "Budi");
    }

    #[test]
    fn slot_id_parsing_defaults_to_zero() {
        assert_eq!(parse_slot_id("2"), 2);
        assert_eq!(parse_slot_id(""), 0);
        assert_eq!(parse_slot_id("abc"), 0);
    }

    #[test]
    fn endpoint_joining() {
        assert_eq!(
            endpoint_url("https://live.example/", "human").unwrap(),
            "https://live.example/human"
        );
        assert!(endpoint_url("", "human").is_err());
        assert!(endpoint_url("ftp://x", "human").is_err());
    }

    #[tokio::test]
    async fn failed_negotiation_keeps_slot_without_remote_id() {
        let negotiator = SessionNegotiator::new("http://127.0.0.1:9").unwrap();
        let identity = negotiator.negotiate("Budi", 4).await;
        assert_eq!(identity, SessionIdentity::local(4));
        assert!(!identity.is_negotiated());
    }
}
