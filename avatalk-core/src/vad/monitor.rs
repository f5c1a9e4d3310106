//! Edge detector over per-frame VAD decisions.
//!
//! `SpeechStart` fires once `min_speech_frames` consecutive frames are
//! speech; `SpeechEnd` fires on the first silent frame after that (the
//! detector's hangover already smooths short gaps). Edges alternate strictly.

use super::{EnergyVad, VadConfig, VoiceActivityDetector};
use crate::buffering::chunk::AudioChunk;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VadEdge {
    SpeechStart,
    SpeechEnd,
}

pub struct VoiceActivityMonitor {
    detector: Box<dyn VoiceActivityDetector>,
    min_speech_frames: u32,
    speech_run: u32,
    user_speaking: bool,
    last_rms: f32,
}

impl VoiceActivityMonitor {
    pub fn new(detector: Box<dyn VoiceActivityDetector>, min_speech_frames: u32) -> Self {
        Self {
            detector,
            min_speech_frames: min_speech_frames.max(1),
            speech_run: 0,
            user_speaking: false,
            last_rms: 0.0,
        }
    }

    /// `EnergyVad` tuned from `config`.
    pub fn from_config(config: &VadConfig) -> Self {
        Self::new(
            Box::new(EnergyVad::from_config(config)),
            config.min_speech_frames,
        )
    }

    /// Classify one frame and report an edge if the speaking flag flipped.
    pub fn push(&mut self, chunk: &AudioChunk) -> Option<VadEdge> {
        self.last_rms = chunk.rms();
        if self.detector.classify(chunk).is_speech() {
            self.speech_run = self.speech_run.saturating_add(1);
            if !self.user_speaking && self.speech_run >= self.min_speech_frames {
                self.user_speaking = true;
                return Some(VadEdge::SpeechStart);
            }
            None
        } else {
            self.speech_run = 0;
            if self.user_speaking {
                self.user_speaking = false;
                return Some(VadEdge::SpeechEnd);
            }
            None
        }
    }

    pub fn user_speaking(&self) -> bool {
        self.user_speaking
    }

    /// RMS of the most recent frame.
    pub fn last_rms(&self) -> f32 {
        self.last_rms
    }

    /// Forget any speech in progress without emitting an edge.
    pub fn reset(&mut self) {
        self.detector.reset();
        self.speech_run = 0;
        self.user_speaking = false;
        self.last_rms = 0.0;
    }
}

impl std::fmt::Debug for VoiceActivityMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VoiceActivityMonitor")
            .field("min_speech_frames", &self.min_speech_frames)
            .field("user_speaking", &self.user_speaking)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn frame(amplitude: f32) -> AudioChunk {
        AudioChunk::new(vec![amplitude; 320], 16_000)
    }

    fn monitor() -> VoiceActivityMonitor {
        VoiceActivityMonitor::from_config(&VadConfig {
            threshold: 0.02,
            hangover_frames: 2,
            min_speech_frames: 3,
            frame_ms: 20,
        })
    }

    #[test]
    fn start_requires_consecutive_speech_frames() {
        let mut m = monitor();
        assert_eq!(m.push(&frame(0.3)), None);
        assert_eq!(m.push(&frame(0.3)), None);
        assert_eq!(m.push(&frame(0.3)), Some(VadEdge::SpeechStart));
        assert!(m.user_speaking());
        assert_eq!(m.push(&frame(0.3)), None);
    }

    #[test]
    fn short_click_never_starts() {
        let mut m = VoiceActivityMonitor::from_config(&VadConfig {
            hangover_frames: 0,
            ..VadConfig::default()
        });
        assert_eq!(m.push(&frame(0.3)), None);
        assert_eq!(m.push(&frame(0.0)), None);
        assert_eq!(m.push(&frame(0.3)), None);
        assert!(!m.user_speaking());
    }

    #[test]
    fn end_fires_after_hangover() {
        let mut m = monitor();
        for _ in 0..3 {
            m.push(&frame(0.3));
        }
        // Two hangover frames still count as speech.
        assert_eq!(m.push(&frame(0.0)), None);
        assert_eq!(m.push(&frame(0.0)), None);
        assert_eq!(m.push(&frame(0.0)), Some(VadEdge::SpeechEnd));
        assert_eq!(m.push(&frame(0.0)), None);
        assert!(!m.user_speaking());
    }

    #[test]
    fn reset_drops_speech_silently() {
        let mut m = monitor();
        for _ in 0..3 {
            m.push(&frame(0.3));
        }
        m.reset();
        assert!(!m.user_speaking());
        assert_eq!(m.push(&frame(0.0)), None);
    }

    #[test]
    fn tracks_last_frame_level() {
        let mut m = monitor();
        m.push(&frame(0.25));
        assert_relative_eq!(m.last_rms(), 0.25, epsilon = 1e-6);
    }
}
