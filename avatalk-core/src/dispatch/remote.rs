//! Chat-service dispatcher (`POST {base}/human`).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{Reply, ReplySource, ResponseDispatcher, NO_RESPONSE_REPLY};
use crate::error::{AvatalkError, Result};
use crate::session::{endpoint_url, http_client, SessionIdentity};

/// Wire body of a chat turn.
#[derive(Debug, Clone, Serialize)]
pub struct HumanRequest<'a> {
    pub text: &'a str,
    #[serde(rename = "type")]
    pub kind: &'static str,
    /// Always set: a new utterance preempts any reply still being composed.
    pub interrupt: bool,
    pub sessionid: i64,
    pub db_session_id: Option<&'a str>,
}

impl<'a> HumanRequest<'a> {
    pub fn chat(text: &'a str, identity: &'a SessionIdentity) -> Self {
        Self {
            text,
            kind: "chat",
            interrupt: true,
            sessionid: identity.slot_id,
            db_session_id: identity.remote_session_id.as_deref(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct HumanResponse {
    #[serde(default)]
    pub msg: Option<String>,
}

impl HumanResponse {
    /// Missing or empty `msg` becomes the fixed "no response" reply.
    pub fn into_reply(self) -> Reply {
        match self.msg {
            Some(msg) if !msg.trim().is_empty() => Reply::new(msg, ReplySource::Remote),
            _ => Reply::new(NO_RESPONSE_REPLY, ReplySource::NoResponse),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RemoteDispatcher {
    client: reqwest::Client,
    endpoint: String,
}

impl RemoteDispatcher {
    /// # Errors
    /// `AvatalkError::Config` for a blank base URL.
    pub fn new(base_url: &str) -> Result<Self> {
        Ok(Self {
            client: http_client()?,
            endpoint: endpoint_url(base_url, "human")?,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn send(&self, text: &str, identity: &SessionIdentity) -> Result<HumanResponse> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&HumanRequest::chat(text, identity))
            .send()
            .await?
            .error_for_status()?;
        let body = response.text().await?;
        serde_json::from_str(&body)
            .map_err(|e| AvatalkError::Transport(format!("malformed chat reply: {e}")))
    }
}

#[async_trait]
impl ResponseDispatcher for RemoteDispatcher {
    async fn respond(&self, text: &str, identity: &SessionIdentity) -> Reply {
        debug!(chars = text.len(), slot = identity.slot_id, "dispatching chat turn");
        match self.send(text, identity).await {
            Ok(response) => response.into_reply(),
            Err(e) => {
                warn!("chat dispatch failed, substituting fallback reply: {e}");
                Reply::fallback()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity() -> SessionIdentity {
        SessionIdentity {
            slot_id: 3,
            remote_session_id: Some("db-42".into()),
        }
    }

    #[test]
    fn request_body_matches_wire_format() {
        let id = identity();
        let json = serde_json::to_value(HumanRequest::chat("Apa kabar?", &id)).unwrap();
        assert_eq!(json["text"], "Apa kabar?");
        assert_eq!(json["type"], "chat");
        assert_eq!(json["interrupt"], true);
        assert_eq!(json["sessionid"], 3);
        assert_eq!(json["db_session_id"], "db-42");
    }

    #[test]
    fn missing_session_id_serializes_as_null() {
        let id = SessionIdentity::local(0);
        let json = serde_json::to_value(HumanRequest::chat("halo", &id)).unwrap();
        assert!(json["db_session_id"].is_null());
    }

    #[test]
    fn reply_field_extraction() {
        let ok: HumanResponse = serde_json::from_str(r#"{"msg":"Baik!"}"#).unwrap();
        assert_eq!(ok.into_reply(), Reply::new("Baik!", ReplySource::Remote));

        let missing: HumanResponse = serde_json::from_str(r#"{"status":"ok"}"#).unwrap();
        assert_eq!(
            missing.into_reply(),
            Reply::new(NO_RESPONSE_REPLY, ReplySource::NoResponse)
        );

        let empty: HumanResponse = serde_json::from_str(r#"{"msg":""}"#).unwrap();
        assert_eq!(empty.into_reply().source, ReplySource::NoResponse);
    }

    #[tokio::test]
    async fn unreachable_service_yields_fallback() {
        // Port 9 (discard) on localhost is not expected to speak HTTP.
        let dispatcher = RemoteDispatcher::new("http://127.0.0.1:9").unwrap();
        assert_eq!(dispatcher.endpoint(), "http://127.0.0.1:9/human");
        let reply = dispatcher.respond("halo", &identity()).await;
        assert_eq!(reply, Reply::fallback());
    }
}
