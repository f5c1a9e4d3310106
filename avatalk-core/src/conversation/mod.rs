//! The conversation reducer.
//!
//! `Conversation::handle` is the only place conversation state changes. Every
//! platform callback and host command arrives as an [`Input`]; the reducer
//! answers with [`Effect`]s for the engine to execute. It performs no I/O and
//! holds no clocks, so every ordering of callbacks can be replayed in tests.
//!
//! Rules enforced here:
//! - no recognition pass starts while an utterance is queued or playing, and a
//!   reply waits for a live pass to end before it is spoken;
//! - at most one recognition pass, one utterance and one media session live;
//! - timers carry generation tokens and recognizer refusals carry the pass
//!   they answer, superseded ones are ignored on arrival;
//! - disconnect tears down all three resources every time it is called.

pub mod input;
pub mod state;

pub use input::{Effect, EventSink, Input, PassId, RecognitionOp, TimerKind, UtteranceId};
pub use state::{ConversationState, TimingConfig};

use std::time::Duration;

use tracing::{debug, info, warn};

use crate::dispatch::Reply;
use crate::history::Sender;
use crate::ipc::events::ConversationStatus;
use crate::playback::{AvatarState, OutputMode};
use crate::recognition::{
    final_transcript, EndOutcome, RecognitionController, RecognitionPhase, RestartGate,
    StartGates,
};

/// Where the current reply is in its life.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Speech {
    Silent,
    /// Waiting for the live recognition pass to end before speaking.
    Queued(String),
    /// Speak issued; the synthesizer has not confirmed audio yet.
    Pending(UtteranceId),
    Playing(UtteranceId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaPhase {
    Closed,
    Opening,
    Open,
}

#[derive(Debug, Clone)]
pub struct Conversation {
    timing: TimingConfig,
    output: OutputMode,
    connected: bool,
    muted: bool,
    user_speaking: bool,
    microphone_available: bool,
    media: MediaPhase,
    recognition: RecognitionController,
    speech: Speech,
    next_utterance: u64,
    debounce_generation: u64,
    restart_generation: u64,
    offline_reason: Option<String>,
}

impl Conversation {
    pub fn new(timing: TimingConfig, output: OutputMode) -> Self {
        Self {
            timing,
            output,
            connected: false,
            muted: false,
            user_speaking: false,
            microphone_available: true,
            media: MediaPhase::Closed,
            recognition: RecognitionController::new(),
            speech: Speech::Silent,
            next_utterance: 0,
            debounce_generation: 0,
            restart_generation: 0,
            offline_reason: None,
        }
    }

    pub fn state(&self) -> ConversationState {
        ConversationState {
            listening: self.recognition.is_listening(),
            ai_speaking: matches!(self.speech, Speech::Playing(_)),
            muted: self.muted,
            connected: self.connected,
            user_speaking: self.user_speaking,
        }
    }

    pub fn status(&self) -> ConversationStatus {
        if !self.connected {
            ConversationStatus::Offline
        } else if self.media == MediaPhase::Opening {
            ConversationStatus::Connecting
        } else if self.muted {
            ConversationStatus::Muted
        } else {
            ConversationStatus::Listening
        }
    }

    pub fn offline_reason(&self) -> Option<&str> {
        self.offline_reason.as_deref()
    }

    pub fn recognition_phase(&self) -> RecognitionPhase {
        self.recognition.phase()
    }

    pub fn restart_gate(&self) -> RestartGate {
        self.recognition.gate()
    }

    pub fn speech(&self) -> &Speech {
        &self.speech
    }

    pub fn media_phase(&self) -> MediaPhase {
        self.media
    }

    pub fn microphone_available(&self) -> bool {
        self.microphone_available
    }

    /// An utterance is queued, pending or playing.
    pub fn synthesis_busy(&self) -> bool {
        self.speech != Speech::Silent
    }

    pub fn handle(&mut self, input: Input) -> Vec<Effect> {
        let mut fx = Vec::new();
        debug!(?input, "conversation input");
        match input {
            Input::Connect => self.connect(&mut fx),
            Input::Disconnect | Input::Shutdown => self.go_offline(None, &mut fx),
            Input::ToggleMute => self.toggle_mute(&mut fx),
            Input::ToggleMic => self.toggle_mic(&mut fx),
            Input::SendText(text) => self.send_text(&text, &mut fx),

            Input::SpeechStart => self.speech_start(&mut fx),
            Input::SpeechEnd => self.speech_end(&mut fx),
            Input::MicrophoneUnavailable(reason) => self.microphone_lost(reason, &mut fx),

            Input::RecognitionStarted => self.recognition_started(&mut fx),
            Input::RecognitionResult(segments) => match final_transcript(&segments) {
                Some(text) if self.connected => self.accept_transcript(text, &mut fx),
                Some(_) => debug!("dropping transcript delivered after disconnect"),
                None => debug!("result carried no final text"),
            },
            Input::RecognitionError(message) => warn!("recognition engine error: {message}"),
            Input::RecognitionEnded => {
                let outcome = self.recognition.on_ended();
                self.recognition_idle(outcome, &mut fx);
            }
            Input::RecognitionRejected { op, pass, reason } => {
                debug!(?op, pass = pass.0, reason = reason.as_str(), "recognizer refused operation");
                if let Some(outcome) = self.recognition.on_rejected(op, pass) {
                    self.recognition_idle(outcome, &mut fx);
                }
            }

            Input::SynthesisStarted(id) => self.synthesis_started(id, &mut fx),
            Input::SynthesisEnded(id) => self.synthesis_ended(id, &mut fx),
            Input::MediaOpened => self.media_opened(&mut fx),
            Input::MediaFailed(reason) => {
                if self.media != MediaPhase::Closed {
                    self.go_offline(Some(format!("media playback failed: {reason}")), &mut fx);
                } else {
                    debug!("ignoring media failure for a closed session");
                }
            }

            Input::ReplyReady(reply) => self.reply_ready(reply, &mut fx),
            Input::TimerFired { kind, generation } => self.timer_fired(kind, generation, &mut fx),
        }
        fx
    }

    // ── Host commands ────────────────────────────────────────────────────

    fn connect(&mut self, fx: &mut Vec<Effect>) {
        if self.connected {
            debug!("already connected");
            return;
        }
        if !self.microphone_available {
            warn!("microphone unavailable; staying offline");
            return;
        }
        info!(output = ?self.output, "connecting");
        self.connected = true;
        self.offline_reason = None;
        match self.output {
            OutputMode::LocalSynthesis => {
                self.schedule_restart(TimerKind::ConnectWarmup, self.timing.connect_warmup, fx);
            }
            OutputMode::RemoteMedia => {
                self.media = MediaPhase::Opening;
                fx.push(Effect::OpenMedia);
            }
        }
    }

    /// Tear everything down. Issues all three teardown effects on every call.
    fn go_offline(&mut self, reason: Option<String>, fx: &mut Vec<Effect>) {
        if self.connected {
            info!(reason = reason.as_deref().unwrap_or("stop requested"), "disconnecting");
        }
        self.connected = false;
        if reason.is_some() {
            self.offline_reason = reason;
        }
        self.debounce_generation += 1;
        self.restart_generation += 1;
        // The next speech start after a reconnect must register as an edge.
        self.user_speaking = false;
        self.recognition.open_gate();

        fx.push(self.recognition.force_stop());
        if matches!(self.speech, Speech::Playing(_)) {
            fx.push(Effect::SetAvatar(AvatarState::Idle));
        }
        self.speech = Speech::Silent;
        fx.push(Effect::CancelSynthesis);
        self.media = MediaPhase::Closed;
        fx.push(Effect::CloseMedia);
    }

    fn toggle_mute(&mut self, fx: &mut Vec<Effect>) {
        self.muted = !self.muted;
        info!(muted = self.muted, "mute toggled");
        if self.muted {
            self.restart_generation += 1;
            fx.extend(self.recognition.stop());
            self.cancel_speech(fx);
        } else {
            self.schedule_restart(TimerKind::UnmuteResume, self.timing.unmute_resume, fx);
        }
    }

    fn toggle_mic(&mut self, fx: &mut Vec<Effect>) {
        if self.synthesis_busy() {
            self.cancel_speech(fx);
            self.try_start(fx);
        } else if self.recognition.is_live() {
            self.restart_generation += 1;
            fx.extend(self.recognition.stop());
        } else {
            fx.extend(self.recognition.restart(self.gates()));
        }
    }

    fn send_text(&mut self, text: &str, fx: &mut Vec<Effect>) {
        let text = text.trim();
        if text.is_empty() {
            return;
        }
        if !self.microphone_available {
            warn!("session disabled; manual text ignored");
            return;
        }
        self.accept_transcript(text.to_string(), fx);
    }

    // ── Voice activity ───────────────────────────────────────────────────

    fn speech_start(&mut self, fx: &mut Vec<Effect>) {
        if self.user_speaking {
            debug!("duplicate speech start ignored");
            return;
        }
        self.user_speaking = true;
        if !self.muted {
            self.cancel_speech(fx);
        }
        self.debounce_generation += 1;
        self.recognition.suppress();
    }

    fn speech_end(&mut self, fx: &mut Vec<Effect>) {
        if !self.user_speaking {
            debug!("speech end without start ignored");
            return;
        }
        self.user_speaking = false;
        if self.recognition.begin_debounce() {
            self.debounce_generation += 1;
            fx.push(Effect::Schedule {
                kind: TimerKind::SpeechEndDebounce,
                generation: self.debounce_generation,
                delay: self.timing.speech_end_debounce,
            });
        }
    }

    fn microphone_lost(&mut self, reason: String, fx: &mut Vec<Effect>) {
        warn!(reason = reason.as_str(), "microphone unavailable");
        self.microphone_available = false;
        self.go_offline(Some(reason), fx);
    }

    // ── Recognition ──────────────────────────────────────────────────────

    fn recognition_started(&mut self, fx: &mut Vec<Effect>) {
        self.recognition.on_started();
        if self.recognition.is_listening() && !self.gates().permit() {
            warn!("recognizer started while not permitted; stopping it");
            fx.extend(self.recognition.stop());
        }
    }

    fn accept_transcript(&mut self, text: String, fx: &mut Vec<Effect>) {
        fx.push(Effect::Record {
            sender: Sender::User,
            text: text.clone(),
        });
        fx.push(Effect::Dispatch { text });
    }

    /// The recognizer is idle again; speak a queued reply or continue listening.
    fn recognition_idle(&mut self, outcome: EndOutcome, fx: &mut Vec<Effect>) {
        if let Speech::Queued(text) = &self.speech {
            let text = text.clone();
            self.begin_utterance(text, fx);
            return;
        }
        match outcome {
            EndOutcome::RestartPending => self.try_start(fx),
            EndOutcome::Natural => {
                self.schedule_restart(TimerKind::AutoRestart, self.timing.auto_restart, fx)
            }
            EndOutcome::Stopped | EndOutcome::Stale => {}
        }
    }

    fn try_start(&mut self, fx: &mut Vec<Effect>) {
        fx.extend(self.recognition.start(self.gates()));
    }

    fn gates(&self) -> StartGates {
        StartGates {
            connected: self.connected,
            muted: self.muted,
            synthesis_busy: self.synthesis_busy(),
        }
    }

    // ── Speech output ────────────────────────────────────────────────────

    fn reply_ready(&mut self, reply: Reply, fx: &mut Vec<Effect>) {
        fx.push(Effect::Record {
            sender: Sender::Ai,
            text: reply.text.clone(),
        });
        if self.output == OutputMode::RemoteMedia {
            return;
        }
        if self.muted {
            debug!("muted; reply recorded without speaking");
            return;
        }
        // Pending restarts would race the utterance.
        self.restart_generation += 1;
        if self.recognition.is_live() {
            fx.extend(self.recognition.stop());
            if matches!(self.speech, Speech::Playing(_)) {
                fx.push(Effect::SetAvatar(AvatarState::Idle));
            }
            self.speech = Speech::Queued(reply.text);
        } else {
            self.begin_utterance(reply.text, fx);
        }
    }

    fn begin_utterance(&mut self, text: String, fx: &mut Vec<Effect>) {
        self.next_utterance += 1;
        let utterance = UtteranceId(self.next_utterance);
        if matches!(self.speech, Speech::Playing(_)) {
            fx.push(Effect::SetAvatar(AvatarState::Idle));
        }
        self.speech = Speech::Pending(utterance);
        fx.push(Effect::Speak { utterance, text });
    }

    fn cancel_speech(&mut self, fx: &mut Vec<Effect>) {
        match std::mem::replace(&mut self.speech, Speech::Silent) {
            Speech::Silent | Speech::Queued(_) => {}
            Speech::Pending(_) => fx.push(Effect::CancelSynthesis),
            Speech::Playing(_) => {
                fx.push(Effect::CancelSynthesis);
                fx.push(Effect::SetAvatar(AvatarState::Idle));
            }
        }
    }

    fn synthesis_started(&mut self, id: UtteranceId, fx: &mut Vec<Effect>) {
        if self.speech == Speech::Pending(id) {
            self.speech = Speech::Playing(id);
            fx.push(Effect::SetAvatar(AvatarState::Talking));
        } else {
            debug!(utterance = id.0, "ignoring start of superseded utterance");
        }
    }

    fn synthesis_ended(&mut self, id: UtteranceId, fx: &mut Vec<Effect>) {
        match self.speech {
            Speech::Pending(current) | Speech::Playing(current) if current == id => {
                if matches!(self.speech, Speech::Playing(_)) {
                    fx.push(Effect::SetAvatar(AvatarState::Idle));
                }
                self.speech = Speech::Silent;
                self.schedule_restart(TimerKind::AutoRestart, self.timing.auto_restart, fx);
            }
            _ => debug!(utterance = id.0, "ignoring end of superseded utterance"),
        }
    }

    fn media_opened(&mut self, fx: &mut Vec<Effect>) {
        if self.connected && self.media == MediaPhase::Opening {
            info!("media session open");
            self.media = MediaPhase::Open;
            self.schedule_restart(TimerKind::ConnectWarmup, self.timing.connect_warmup, fx);
        } else {
            debug!("media opened after teardown; closing it");
            fx.push(Effect::CloseMedia);
        }
    }

    // ── Timers ───────────────────────────────────────────────────────────

    /// Supersede any pending restart timer with a new one.
    fn schedule_restart(&mut self, kind: TimerKind, delay: Duration, fx: &mut Vec<Effect>) {
        if !self.connected || self.muted {
            return;
        }
        self.restart_generation += 1;
        fx.push(Effect::Schedule {
            kind,
            generation: self.restart_generation,
            delay,
        });
    }

    fn timer_fired(&mut self, kind: TimerKind, generation: u64, fx: &mut Vec<Effect>) {
        match kind {
            TimerKind::SpeechEndDebounce => {
                if generation != self.debounce_generation
                    || self.recognition.gate() != RestartGate::Debouncing
                {
                    debug!("stale debounce timer");
                    return;
                }
                self.recognition.open_gate();
                if !self.synthesis_busy() {
                    fx.extend(self.recognition.restart(self.gates()));
                }
            }
            TimerKind::AutoRestart | TimerKind::UnmuteResume | TimerKind::ConnectWarmup => {
                if generation != self.restart_generation {
                    debug!(?kind, "stale restart timer");
                    return;
                }
                self.try_start(fx);
            }
        }
    }
}
