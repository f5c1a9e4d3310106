//! Continuous microphone monitor.
//!
//! ```text
//! cpal callback → SPSC ring → monitor thread (spawn_blocking)
//!                                  │ fixed-size frames
//!                          VoiceActivityMonitor
//!                           │               │
//!              EventSink (SpeechStart/End)  broadcast<AudioActivityEvent>
//! ```
//!
//! No audio is retained past the frame being classified.

use std::sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    Arc,
};
use std::time::Duration;

use tokio::sync::broadcast;
use tracing::{info, warn};

use super::{VadConfig, VadEdge, VoiceActivityMonitor};
use crate::{
    audio::AudioCapture,
    buffering::{chunk::AudioChunk, create_audio_ring, AudioConsumer, Consumer},
    conversation::input::{EventSink, Input},
    error::{AvatalkError, Result},
    ipc::events::AudioActivityEvent,
};

const ACTIVITY_BROADCAST_CAP: usize = 256;

/// Sleep when the ring is empty; a fraction of one analysis frame.
const IDLE_POLL: Duration = Duration::from_millis(5);

pub struct MicrophoneMonitor {
    config: VadConfig,
    preferred_device: Option<String>,
    running: Arc<AtomicBool>,
    activity_tx: broadcast::Sender<AudioActivityEvent>,
    seq: Arc<AtomicU64>,
}

impl MicrophoneMonitor {
    pub fn new(config: VadConfig, preferred_device: Option<String>) -> Self {
        let (activity_tx, _) = broadcast::channel(ACTIVITY_BROADCAST_CAP);
        Self {
            config,
            preferred_device,
            running: Arc::new(AtomicBool::new(false)),
            activity_tx,
            seq: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Live RMS + speaking flag per frame, for level meters.
    pub fn subscribe_activity(&self) -> broadcast::Receiver<AudioActivityEvent> {
        self.activity_tx.subscribe()
    }

    /// Open the microphone and start emitting speech edges into `events`.
    ///
    /// Blocks until the device is confirmed open. On failure the engine is
    /// also told through `Input::MicrophoneUnavailable` so the session goes
    /// offline.
    ///
    /// # Errors
    /// - `AvatalkError::AlreadyRunning` if already started.
    /// - `AvatalkError::NoDefaultInputDevice` / `AvatalkError::MediaAccess`
    ///   on device failure.
    pub fn start(&self, events: EventSink) -> Result<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(AvatalkError::AlreadyRunning);
        }

        let (producer, consumer) = create_audio_ring();
        let config = self.config;
        let preferred = self.preferred_device.clone();
        let running = Arc::clone(&self.running);
        let activity_tx = self.activity_tx.clone();
        let seq = Arc::clone(&self.seq);
        let thread_events = events.clone();

        // Sync oneshot: the monitor thread reports device open success/failure.
        let (open_tx, open_rx) = std::sync::mpsc::channel::<Result<u32>>();

        tokio::task::spawn_blocking(move || {
            // cpal::Stream is !Send: open and drop it on this thread.
            let capture = match AudioCapture::open_with_preference(
                producer,
                Arc::clone(&running),
                preferred.as_deref(),
            ) {
                Ok(c) => {
                    let _ = open_tx.send(Ok(c.sample_rate));
                    c
                }
                Err(e) => {
                    let _ = open_tx.send(Err(e));
                    running.store(false, Ordering::SeqCst);
                    return;
                }
            };

            let mut monitor = VoiceActivityMonitor::from_config(&config);
            run(
                consumer,
                capture.sample_rate,
                config.frame_len(capture.sample_rate),
                &mut monitor,
                &running,
                &thread_events,
                &activity_tx,
                &seq,
            );
            if monitor.user_speaking() {
                thread_events.emit(Input::SpeechEnd);
            }
            capture.stop();
            drop(capture);
            info!("microphone monitor stopped");
        });

        let result = match open_rx.recv() {
            Ok(Ok(rate)) => {
                info!(sample_rate = rate, "microphone monitor started");
                return Ok(());
            }
            Ok(Err(e)) => e,
            Err(_) => AvatalkError::Other(anyhow::anyhow!("microphone thread died unexpectedly")),
        };
        self.running.store(false, Ordering::SeqCst);
        warn!("microphone unavailable: {result}");
        events.emit(Input::MicrophoneUnavailable(result.to_string()));
        Err(result)
    }

    /// # Errors
    /// `AvatalkError::NotRunning` if not started.
    pub fn stop(&self) -> Result<()> {
        if !self.running.swap(false, Ordering::SeqCst) {
            return Err(AvatalkError::NotRunning);
        }
        info!("microphone monitor stop requested");
        Ok(())
    }
}

impl Drop for MicrophoneMonitor {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
    }
}

#[allow(clippy::too_many_arguments)]
fn run(
    mut consumer: AudioConsumer,
    sample_rate: u32,
    frame_len: usize,
    monitor: &mut VoiceActivityMonitor,
    running: &AtomicBool,
    events: &EventSink,
    activity_tx: &broadcast::Sender<AudioActivityEvent>,
    seq: &AtomicU64,
) {
    let mut frame: Vec<f32> = Vec::with_capacity(frame_len);
    let mut scratch = vec![0.0f32; frame_len];

    while running.load(Ordering::Acquire) && !events.is_closed() {
        let wanted = frame_len - frame.len();
        let n = consumer.pop_slice(&mut scratch[..wanted]);
        if n == 0 {
            std::thread::sleep(IDLE_POLL);
            continue;
        }
        frame.extend_from_slice(&scratch[..n]);
        if frame.len() < frame_len {
            continue;
        }
        let chunk = AudioChunk::new(std::mem::take(&mut frame), sample_rate);
        process_frame(monitor, &chunk, events, activity_tx, seq);
        frame = chunk.samples;
        frame.clear();
    }
}

/// Classify one frame, forward any edge and publish the level.
fn process_frame(
    monitor: &mut VoiceActivityMonitor,
    chunk: &AudioChunk,
    events: &EventSink,
    activity_tx: &broadcast::Sender<AudioActivityEvent>,
    seq: &AtomicU64,
) {
    match monitor.push(chunk) {
        Some(VadEdge::SpeechStart) => events.emit(Input::SpeechStart),
        Some(VadEdge::SpeechEnd) => events.emit(Input::SpeechEnd),
        None => {}
    }
    let _ = activity_tx.send(AudioActivityEvent {
        seq: seq.fetch_add(1, Ordering::Relaxed),
        rms: monitor.last_rms(),
        user_speaking: monitor.user_speaking(),
    });
}
