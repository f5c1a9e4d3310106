//! Event types fanned out to hosts over broadcast channels.
//!
//! | Event | Subscription |
//! |-------|--------------|
//! | `StatusEvent` | `EngineHandle::subscribe_status` |
//! | `TurnEvent` | `EngineHandle::subscribe_turns` |
//! | `AvatarEvent` | `EngineHandle::subscribe_avatar` |
//! | `DispatchEvent` | `EngineHandle::subscribe_dispatches` |
//! | `AudioActivityEvent` | `MicrophoneMonitor::subscribe_activity` |
//!
//! All types serialise with camelCase fields so a web or desktop host can
//! forward them verbatim.

use serde::{Deserialize, Serialize};

use crate::conversation::ConversationState;
use crate::dispatch::Reply;
use crate::history::ConversationTurn;
use crate::playback::AvatarState;

// ---------------------------------------------------------------------------
// Recognition results
// ---------------------------------------------------------------------------

/// A single hypothesis reported by a speech recognizer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptSegment {
    /// Recognised text.
    pub text: String,
    /// Whether this is an interim hypothesis or a committed final.
    pub kind: SegmentKind,
    /// Engine confidence in [0.0, 1.0], if available.
    pub confidence: Option<f32>,
}

impl TranscriptSegment {
    pub fn final_text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            kind: SegmentKind::Final,
            confidence: None,
        }
    }

    pub fn interim(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            kind: SegmentKind::Interim,
            confidence: None,
        }
    }
}

/// Distinguishes interim hypotheses from committed finals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SegmentKind {
    /// Interim hypothesis; never surfaced or dispatched.
    Interim,
    /// Committed final; the utterance is complete.
    Final,
}

// ---------------------------------------------------------------------------
// Audio activity events
// ---------------------------------------------------------------------------

/// Published by the microphone monitor for each classified frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioActivityEvent {
    /// Monotonically increasing event sequence number.
    pub seq: u64,
    /// Root-mean-square level of the frame in [0.0, 1.0].
    pub rms: f32,
    /// Whether the monitor currently considers the user to be speaking.
    pub user_speaking: bool,
}

// ---------------------------------------------------------------------------
// Conversation events
// ---------------------------------------------------------------------------

/// Coarse connection status shown in the host's status badge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversationStatus {
    Offline,
    /// Start requested, waiting for the media session to open.
    Connecting,
    Listening,
    Muted,
}

impl ConversationStatus {
    pub fn label(self) -> &'static str {
        match self {
            ConversationStatus::Offline => "Offline",
            ConversationStatus::Connecting => "Connecting",
            ConversationStatus::Listening => "Online (Listening)",
            ConversationStatus::Muted => "Online (Muted)",
        }
    }
}

/// Emitted whenever the conversation state snapshot changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusEvent {
    pub status: ConversationStatus,
    pub state: ConversationState,
    /// Optional human-readable detail (e.g. why the session went offline).
    pub detail: Option<String>,
}

/// Emitted after every history append; `index` is the new turn's position.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnEvent {
    pub index: usize,
    pub turn: ConversationTurn,
}

/// Emitted when the avatar switches between its idle and talking clips.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvatarEvent {
    pub state: AvatarState,
    /// Asset the avatar view should loop for this state.
    pub clip: String,
}

/// Emitted when a dispatched turn has been answered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchEvent {
    pub request: String,
    pub reply: Reply,
    /// Wall time from dispatch to reply.
    pub latency_ms: u64,
}
