//! Speech output: local synthesis or a remote media stream, plus avatar state.
//!
//! `PlaybackOutput` owns both platform handles for a session and enforces the
//! one-live-instance rule: every new utterance cancels the previous one and
//! every media open closes the previous session first.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::conversation::input::{EventSink, Input, UtteranceId};
use crate::error::{AvatalkError, Result};

/// Visual state of the avatar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AvatarState {
    Idle,
    Talking,
}

/// How replies become audible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OutputMode {
    /// Text-to-speech on this device; the avatar loops local clips.
    LocalSynthesis,
    /// The server streams audio + video; replies only reach the history.
    RemoteMedia,
}

/// Video assets looped by the avatar view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AvatarClips {
    pub idle: String,
    pub talking: String,
    /// Shown while no remote stream is bound.
    pub standby: String,
}

impl AvatarClips {
    pub fn clip_for(&self, state: AvatarState) -> &str {
        match state {
            AvatarState::Idle => &self.idle,
            AvatarState::Talking => &self.talking,
        }
    }
}

impl Default for AvatarClips {
    fn default() -> Self {
        Self {
            idle: "assets/move.mp4".into(),
            talking: "assets/talk.mp4".into(),
            standby: "assets/police.mp4".into(),
        }
    }
}

/// Contract for text-to-speech backends.
///
/// Implementations report `Input::SynthesisStarted(id)` when audio begins and
/// exactly one `Input::SynthesisEnded(id)` when it completes or is cancelled.
pub trait SpeechSynthesizer: Send + 'static {
    /// Queue one utterance.
    ///
    /// # Errors
    /// Returns `AvatalkError::Synthesis` if the backend refuses the text.
    fn speak(&mut self, utterance: UtteranceId, text: &str, events: EventSink) -> Result<()>;

    /// Cancel any queued or playing utterance. Harmless when idle.
    fn cancel(&mut self);
}

/// Contract for live inbound media sessions (WHEP-style pull playback).
///
/// `open` only begins the handshake; implementations report
/// `Input::MediaOpened` or `Input::MediaFailed` once it settles.
pub trait MediaTransport: Send + 'static {
    /// # Errors
    /// Returns `AvatalkError::PlaybackSetup` if the SDK or the avatar view
    /// cannot be prepared at all.
    fn open(&mut self, endpoint: &str, events: EventSink) -> Result<()>;

    /// Close the session and clear the avatar view's stream binding.
    /// Harmless when already closed.
    fn close(&mut self);
}

pub struct PlaybackOutput {
    synthesizer: Option<Box<dyn SpeechSynthesizer>>,
    media: Option<Box<dyn MediaTransport>>,
    media_endpoint: Option<String>,
    events: EventSink,
}

impl PlaybackOutput {
    pub fn new(
        synthesizer: Option<Box<dyn SpeechSynthesizer>>,
        media: Option<Box<dyn MediaTransport>>,
        media_endpoint: Option<String>,
        events: EventSink,
    ) -> Self {
        Self {
            synthesizer,
            media,
            media_endpoint,
            events,
        }
    }

    /// Start an utterance, cancelling whatever was playing.
    ///
    /// A missing or failing synthesizer ends the utterance immediately so the
    /// avatar never waits for audio that will not come.
    pub fn speak(&mut self, utterance: UtteranceId, text: &str) {
        let Some(synth) = self.synthesizer.as_mut() else {
            warn!("no speech synthesizer configured; reply is text-only");
            self.events.emit(Input::SynthesisEnded(utterance));
            return;
        };
        synth.cancel();
        if let Err(e) = synth.speak(utterance, text, self.events.clone()) {
            warn!("speech synthesis failed: {e}");
            self.events.emit(Input::SynthesisEnded(utterance));
        }
    }

    pub fn cancel_speech(&mut self) {
        if let Some(synth) = self.synthesizer.as_mut() {
            synth.cancel();
        }
    }

    /// Open a fresh media session, closing any previous one first.
    pub fn open_media(&mut self) {
        if let Err(e) = self.try_open_media() {
            warn!("media playback setup failed: {e}");
            self.events.emit(Input::MediaFailed(e.to_string()));
        }
    }

    fn try_open_media(&mut self) -> Result<()> {
        let endpoint = self
            .media_endpoint
            .clone()
            .ok_or_else(|| AvatalkError::PlaybackSetup("no media endpoint configured".into()))?;
        let media = self
            .media
            .as_mut()
            .ok_or_else(|| AvatalkError::PlaybackSetup("no media transport available".into()))?;
        media.close();
        info!(endpoint = endpoint.as_str(), "opening media session");
        media.open(&endpoint, self.events.clone())
    }

    pub fn close_media(&mut self) {
        if let Some(media) = self.media.as_mut() {
            media.close();
        }
    }
}

impl std::fmt::Debug for PlaybackOutput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaybackOutput")
            .field("has_synthesizer", &self.synthesizer.is_some())
            .field("has_media", &self.media.is_some())
            .field("media_endpoint", &self.media_endpoint)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use parking_lot::Mutex;

    type Calls = Arc<Mutex<Vec<String>>>;

    struct RecordingSynth(Calls);

    impl SpeechSynthesizer for RecordingSynth {
        fn speak(&mut self, utterance: UtteranceId, text: &str, _events: EventSink) -> Result<()> {
            self.0.lock().push(format!("speak {} {text}", utterance.0));
            Ok(())
        }

        fn cancel(&mut self) {
            self.0.lock().push("cancel".into());
        }
    }

    struct RefusingSynth;

    impl SpeechSynthesizer for RefusingSynth {
        fn speak(&mut self, _: UtteranceId, _: &str, _: EventSink) -> Result<()> {
            Err(AvatalkError::Synthesis("voice unavailable".into()))
        }

        fn cancel(&mut self) {}
    }

    struct RecordingMedia(Calls);

    impl MediaTransport for RecordingMedia {
        fn open(&mut self, endpoint: &str, _events: EventSink) -> Result<()> {
            self.0.lock().push(format!("open {endpoint}"));
            Ok(())
        }

        fn close(&mut self) {
            self.0.lock().push("close".into());
        }
    }

    #[test]
    fn speak_cancels_previous_utterance_first() {
        let calls = Calls::default();
        let (sink, _rx) = EventSink::channel();
        let mut out = PlaybackOutput::new(
            Some(Box::new(RecordingSynth(Arc::clone(&calls)))),
            None,
            None,
            sink,
        );

        out.speak(UtteranceId(1), "halo");
        out.speak(UtteranceId(2), "lagi");

        assert_eq!(
            *calls.lock(),
            vec!["cancel", "speak 1 halo", "cancel", "speak 2 lagi"]
        );
    }

    #[test]
    fn refused_utterance_ends_immediately() {
        let (sink, mut rx) = EventSink::channel();
        let mut out = PlaybackOutput::new(Some(Box::new(RefusingSynth)), None, None, sink);
        out.speak(UtteranceId(7), "halo");
        match rx.try_recv() {
            Ok(Input::SynthesisEnded(id)) => assert_eq!(id, UtteranceId(7)),
            other => panic!("expected SynthesisEnded, got {other:?}"),
        }
    }

    #[test]
    fn open_media_closes_previous_session() {
        let calls = Calls::default();
        let (sink, _rx) = EventSink::channel();
        let mut out = PlaybackOutput::new(
            None,
            Some(Box::new(RecordingMedia(Arc::clone(&calls)))),
            Some("https://media.example/whep/".into()),
            sink,
        );
        out.open_media();
        out.open_media();
        assert_eq!(
            *calls.lock(),
            vec![
                "close",
                "open https://media.example/whep/",
                "close",
                "open https://media.example/whep/"
            ]
        );
    }

    #[test]
    fn open_media_without_transport_reports_failure() {
        let (sink, mut rx) = EventSink::channel();
        let mut out = PlaybackOutput::new(None, None, Some("https://x/whep/".into()), sink);
        out.open_media();
        assert!(matches!(rx.try_recv(), Ok(Input::MediaFailed(_))));
    }

    #[test]
    fn clip_selection_follows_state() {
        let clips = AvatarClips::default();
        assert_eq!(clips.clip_for(AvatarState::Idle), "assets/move.mp4");
        assert_eq!(clips.clip_for(AvatarState::Talking), "assets/talk.mp4");
    }
}
