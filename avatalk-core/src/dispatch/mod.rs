//! Response dispatchers: turn a finalized transcript into a reply.
//!
//! Both variants share one contract: the call never fails. Transport problems
//! are logged and replaced by [`FALLBACK_REPLY`] so every user turn gets
//! exactly one AI turn.

pub mod remote;
pub mod simulation;

pub use remote::RemoteDispatcher;
pub use simulation::SimulationDispatcher;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::session::SessionIdentity;

/// Substituted when the chat service cannot be reached.
pub const FALLBACK_REPLY: &str = "Maaf, aku mengalami gangguan.";

/// Substituted when the chat service answers without a `msg`.
pub const NO_RESPONSE_REPLY: &str = "Tidak ada respons dari server";

/// Where a reply came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ReplySource {
    Remote,
    /// Server answered but the reply field was missing or empty.
    NoResponse,
    /// Transport failure; the fixed apology was substituted.
    Fallback,
    Simulated,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reply {
    pub text: String,
    pub source: ReplySource,
}

impl Reply {
    pub fn new(text: impl Into<String>, source: ReplySource) -> Self {
        Self {
            text: text.into(),
            source,
        }
    }

    pub fn fallback() -> Self {
        Self::new(FALLBACK_REPLY, ReplySource::Fallback)
    }
}

/// Contract shared by remote and simulated dispatch.
#[async_trait]
pub trait ResponseDispatcher: Send + Sync + 'static {
    /// Produce a reply for `text`. Must not fail.
    async fn respond(&self, text: &str, identity: &SessionIdentity) -> Reply;
}

/// Deployment choice between the chat service and the local simulator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", rename_all_fields = "camelCase", tag = "kind")]
pub enum DispatchMode {
    Remote { base_url: String },
    Simulation { delay_ms: u64 },
}

impl Default for DispatchMode {
    fn default() -> Self {
        DispatchMode::Simulation { delay_ms: 1_000 }
    }
}

/// Build the dispatcher for a mode.
///
/// # Errors
/// Returns `AvatalkError::Config` for an unusable base URL and
/// `AvatalkError::Transport` if the HTTP client cannot be built.
pub fn from_mode(mode: &DispatchMode) -> Result<Arc<dyn ResponseDispatcher>> {
    Ok(match mode {
        DispatchMode::Remote { base_url } => Arc::new(RemoteDispatcher::new(base_url)?),
        DispatchMode::Simulation { delay_ms } => {
            Arc::new(SimulationDispatcher::new(Duration::from_millis(*delay_ms)))
        }
    })
}
