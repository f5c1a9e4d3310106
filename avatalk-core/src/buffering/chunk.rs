//! Typed audio frame handed from the capture ring to the voice activity detector.

/// A contiguous block of mono PCM samples at a known sample rate.
#[derive(Debug, Clone)]
pub struct AudioChunk {
    /// Mono f32 samples in [-1.0, 1.0].
    pub samples: Vec<f32>,
    /// Sample rate in Hz (e.g. 16000, 44100, 48000).
    pub sample_rate: u32,
}

impl AudioChunk {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    /// Frame length in milliseconds.
    pub fn duration_ms(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 * 1000.0 / self.sample_rate as f64
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Root-mean-square level of the frame.
    pub fn rms(&self) -> f32 {
        if self.samples.is_empty() {
            return 0.0;
        }
        let sum_sq: f32 = self.samples.iter().map(|s| s * s).sum();
        (sum_sq / self.samples.len() as f32).sqrt()
    }
}

#[cfg(test)]
mod tests {
    use super::AudioChunk;
    use approx::assert_relative_eq;

    #[test]
    fn duration_of_twenty_ms_frame() {
        let chunk = AudioChunk::new(vec![0.0; 320], 16_000);
        assert_relative_eq!(chunk.duration_ms(), 20.0);
    }

    #[test]
    fn zero_rate_has_no_duration() {
        let chunk = AudioChunk::new(vec![0.0; 320], 0);
        assert_eq!(chunk.duration_ms(), 0.0);
    }

    #[test]
    fn rms_of_square_wave() {
        let samples: Vec<f32> = (0..256)
            .map(|i| if i % 2 == 0 { 0.5 } else { -0.5 })
            .collect();
        let chunk = AudioChunk::new(samples, 16_000);
        assert_relative_eq!(chunk.rms(), 0.5, epsilon = 1e-5);
    }
}
