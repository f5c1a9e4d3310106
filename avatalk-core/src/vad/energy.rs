//! Energy-based VAD using RMS threshold + hangover counter.
//!
//! ## Algorithm
//!
//! 1. Compute RMS of the incoming frame.
//! 2. If RMS ≥ `threshold` → `Speech`, reload the hangover counter.
//! 3. If RMS < `threshold` and hangover remains → `Speech`, count down
//!    (keeps trailing syllables inside the utterance).
//! 4. Otherwise → `Silence`.

use super::{VadConfig, VadDecision, VoiceActivityDetector};
use crate::buffering::chunk::AudioChunk;

#[derive(Debug, Clone)]
pub struct EnergyVad {
    /// Typical range: 0.01–0.05 for a quiet microphone.
    threshold: f32,
    hangover_frames: u32,
    hangover_counter: u32,
}

impl EnergyVad {
    pub fn new(threshold: f32, hangover_frames: u32) -> Self {
        Self {
            threshold,
            hangover_frames,
            hangover_counter: 0,
        }
    }

    pub fn from_config(config: &VadConfig) -> Self {
        Self::new(config.threshold, config.hangover_frames)
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }
}

impl Default for EnergyVad {
    fn default() -> Self {
        Self::from_config(&VadConfig::default())
    }
}

impl VoiceActivityDetector for EnergyVad {
    fn classify(&mut self, chunk: &AudioChunk) -> VadDecision {
        if chunk.rms() >= self.threshold {
            self.hangover_counter = self.hangover_frames;
            VadDecision::Speech
        } else if self.hangover_counter > 0 {
            self.hangover_counter -= 1;
            VadDecision::Speech
        } else {
            VadDecision::Silence
        }
    }

    fn reset(&mut self) {
        self.hangover_counter = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn silent_chunk(len: usize) -> AudioChunk {
        AudioChunk::new(vec![0.0f32; len], 16000)
    }

    fn loud_chunk(amplitude: f32, len: usize) -> AudioChunk {
        AudioChunk::new(vec![amplitude; len], 16000)
    }

    #[test]
    fn silence_below_threshold() {
        let mut vad = EnergyVad::new(0.02, 0);
        assert_eq!(vad.classify(&silent_chunk(320)), VadDecision::Silence);
        assert_eq!(vad.classify(&loud_chunk(0.01, 320)), VadDecision::Silence);
    }

    #[test]
    fn speech_above_threshold() {
        let mut vad = EnergyVad::new(0.02, 0);
        assert_eq!(vad.classify(&loud_chunk(0.5, 320)), VadDecision::Speech);
    }

    #[test]
    fn hangover_extends_speech() {
        let mut vad = EnergyVad::new(0.02, 3);
        assert_eq!(vad.classify(&loud_chunk(0.5, 320)), VadDecision::Speech);

        for _ in 0..3 {
            assert_eq!(vad.classify(&silent_chunk(320)), VadDecision::Speech);
        }
        assert_eq!(vad.classify(&silent_chunk(320)), VadDecision::Silence);
    }

    #[test]
    fn reset_clears_hangover() {
        let mut vad = EnergyVad::new(0.02, 5);
        vad.classify(&loud_chunk(0.5, 320));
        vad.reset();
        assert_eq!(vad.classify(&silent_chunk(320)), VadDecision::Silence);
    }

    #[test]
    fn empty_chunk_is_silence() {
        let mut vad = EnergyVad::default();
        assert_eq!(
            vad.classify(&AudioChunk::new(vec![], 16000)),
            VadDecision::Silence
        );
    }

    #[test]
    fn default_uses_config_threshold() {
        assert_relative_eq!(EnergyVad::default().threshold(), 0.02);
    }
}
