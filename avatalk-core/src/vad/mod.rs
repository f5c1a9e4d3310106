//! Voice Activity Detection (VAD).
//!
//! Two layers:
//! - a per-frame classifier behind the `VoiceActivityDetector` trait
//!   (`EnergyVad` by default), and
//! - `VoiceActivityMonitor`, which turns the classifier's stream of decisions
//!   into the `SpeechStart` / `SpeechEnd` edges the conversation consumes.
//!
//! With the `audio-cpal` feature `MicrophoneMonitor` wires both to the
//! default input device.

pub mod energy;
#[cfg(feature = "audio-cpal")]
pub mod microphone;
pub mod monitor;

pub use energy::EnergyVad;
#[cfg(feature = "audio-cpal")]
pub use microphone::MicrophoneMonitor;
pub use monitor::{VadEdge, VoiceActivityMonitor};

use serde::{Deserialize, Serialize};

use crate::buffering::chunk::AudioChunk;

/// Whether a given audio frame contains speech or silence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VadDecision {
    /// The frame contains speech energy above threshold.
    Speech,
    /// The frame is silent (or below threshold, including hangover period).
    Silence,
}

impl VadDecision {
    pub fn is_speech(self) -> bool {
        self == VadDecision::Speech
    }
}

/// Trait for all VAD implementations.
///
/// Implementors may be stateful (hangover counters, RNN hidden states, etc.).
pub trait VoiceActivityDetector: Send + 'static {
    /// Analyse a chunk and return a speech/silence decision.
    fn classify(&mut self, chunk: &AudioChunk) -> VadDecision;

    /// Reset any internal state (e.g. hangover counters).
    fn reset(&mut self);
}

/// Tuning for the energy detector and the edge detector on top of it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VadConfig {
    /// RMS level above which a frame is speech.
    pub threshold: f32,
    /// Silent frames still reported as speech after real speech.
    pub hangover_frames: u32,
    /// Consecutive speech frames required before `SpeechStart`.
    pub min_speech_frames: u32,
    /// Analysis frame length.
    pub frame_ms: u32,
}

impl VadConfig {
    /// Samples per analysis frame at `sample_rate`.
    pub fn frame_len(&self, sample_rate: u32) -> usize {
        ((sample_rate as u64 * self.frame_ms.max(1) as u64) / 1000).max(1) as usize
    }
}

impl Default for VadConfig {
    fn default() -> Self {
        Self {
            threshold: 0.02,
            hangover_frames: 8,
            min_speech_frames: 3,
            frame_ms: 20,
        }
    }
}
