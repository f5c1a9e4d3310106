//! Terminal stand-ins for the platform speech and media services.
//!
//! The recognizer hears whatever `/speak` feeds it, the synthesizer "speaks"
//! for a duration proportional to the text length, and the media transport
//! binds the avatar view to the stream endpoint by logging it.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use avatalk_core::error::{AvatalkError, Result};
use avatalk_core::{
    EventSink, Input, MediaTransport, SpeechRecognizer, SpeechSynthesizer, TranscriptSegment,
    UtteranceId,
};
use crossbeam_channel::{bounded, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

#[derive(Default)]
struct RecognizerSlot {
    live: bool,
    sink: Option<EventSink>,
}

/// One pass at a time; a pass ends after its first result, as a
/// non-continuous browser engine does.
#[derive(Clone, Default)]
pub struct ConsoleRecognizer {
    slot: Arc<Mutex<RecognizerSlot>>,
}

impl ConsoleRecognizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_listening(&self) -> bool {
        self.slot.lock().live
    }

    /// Deliver `text` as the final result of the live pass.
    ///
    /// Returns `false` when no pass is live; the words are lost, as speech
    /// would be.
    pub fn hear(&self, text: &str) -> bool {
        let mut slot = self.slot.lock();
        if !slot.live {
            return false;
        }
        slot.live = false;
        if let Some(sink) = &slot.sink {
            sink.emit(Input::RecognitionResult(vec![
                TranscriptSegment::interim(text),
                TranscriptSegment::final_text(text),
            ]));
            sink.emit(Input::RecognitionEnded);
        }
        true
    }
}

impl SpeechRecognizer for ConsoleRecognizer {
    fn start(&mut self, events: EventSink) -> Result<()> {
        let mut slot = self.slot.lock();
        if slot.live {
            return Err(AvatalkError::RecognitionEngine(
                "recognition has already started".into(),
            ));
        }
        slot.live = true;
        events.emit(Input::RecognitionStarted);
        slot.sink = Some(events);
        debug!("console recognition pass started");
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        let mut slot = self.slot.lock();
        if !slot.live {
            return Err(AvatalkError::RecognitionEngine(
                "recognition has not started".into(),
            ));
        }
        slot.live = false;
        if let Some(sink) = &slot.sink {
            sink.emit(Input::RecognitionEnded);
        }
        debug!("console recognition pass stopped");
        Ok(())
    }
}

/// Speaks on a worker thread; the cancel channel doubles as the clock.
pub struct ConsoleSynthesizer {
    chars_per_second: f32,
    cancel_tx: Option<Sender<()>>,
}

impl ConsoleSynthesizer {
    pub fn new(chars_per_second: f32) -> Self {
        Self {
            chars_per_second,
            cancel_tx: None,
        }
    }

    pub fn speech_duration(&self, text: &str) -> Duration {
        let chars = text.chars().count().max(1) as f32;
        Duration::from_secs_f32(chars / self.chars_per_second.max(1.0))
    }
}

impl SpeechSynthesizer for ConsoleSynthesizer {
    fn speak(&mut self, utterance: UtteranceId, text: &str, events: EventSink) -> Result<()> {
        self.cancel();
        let duration = self.speech_duration(text);
        let (cancel_tx, cancel_rx) = bounded::<()>(1);
        self.cancel_tx = Some(cancel_tx);

        thread::Builder::new()
            .name("avatalk-tts".into())
            .spawn(move || {
                events.emit(Input::SynthesisStarted(utterance));
                match cancel_rx.recv_timeout(duration) {
                    Err(RecvTimeoutError::Timeout) => debug!(?utterance, "utterance finished"),
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                        debug!(?utterance, "utterance cancelled")
                    }
                }
                events.emit(Input::SynthesisEnded(utterance));
            })
            .map_err(|e| AvatalkError::Synthesis(e.to_string()))?;
        Ok(())
    }

    fn cancel(&mut self) {
        if let Some(tx) = self.cancel_tx.take() {
            // A finished worker has already dropped its receiver.
            let _ = tx.try_send(());
        }
    }
}

/// Logs the stream binding; the terminal has no video surface.
#[derive(Default)]
pub struct ConsoleMediaTransport {
    endpoint: Option<String>,
}

impl MediaTransport for ConsoleMediaTransport {
    fn open(&mut self, endpoint: &str, events: EventSink) -> Result<()> {
        if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
            return Err(AvatalkError::PlaybackSetup(format!(
                "unsupported media endpoint: {endpoint}"
            )));
        }
        info!(endpoint, "avatar view bound to media stream");
        self.endpoint = Some(endpoint.to_string());
        events.emit(Input::MediaOpened);
        Ok(())
    }

    fn close(&mut self) {
        match self.endpoint.take() {
            Some(endpoint) => info!(endpoint, "media stream closed"),
            None => warn!("media close requested with no open stream"),
        }
    }
}
