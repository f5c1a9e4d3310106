//! Conversation state snapshot and timing parameters.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Live flags shown by hosts. One authoritative copy lives in the reducer;
/// everything else sees snapshots.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationState {
    /// A recognition pass is capturing.
    pub listening: bool,
    /// A synthesized utterance is audible.
    pub ai_speaking: bool,
    pub muted: bool,
    pub connected: bool,
    /// VAD indicator.
    pub user_speaking: bool,
}

/// Delays used to serialize recognizer restarts. Tuned for browser-grade
/// recognizers; none of them is a protocol constant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimingConfig {
    /// VAD speech end → restart gate reopens.
    pub speech_end_debounce: Duration,
    /// Natural recognition end or utterance end → next pass.
    pub auto_restart: Duration,
    /// Unmute → next pass.
    pub unmute_resume: Duration,
    /// Connect (or media session open) → first pass.
    pub connect_warmup: Duration,
}

impl TimingConfig {
    /// All delays zero; handy for tests that step timers by hand.
    pub fn immediate() -> Self {
        Self {
            speech_end_debounce: Duration::ZERO,
            auto_restart: Duration::ZERO,
            unmute_resume: Duration::ZERO,
            connect_warmup: Duration::ZERO,
        }
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            speech_end_debounce: Duration::from_millis(150),
            auto_restart: Duration::from_millis(200),
            unmute_resume: Duration::from_millis(400),
            connect_warmup: Duration::from_millis(400),
        }
    }
}
