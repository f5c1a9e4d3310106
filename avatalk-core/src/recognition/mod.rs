//! Recognition controller.
//!
//! Two halves:
//! - [`RecognitionController`] is the pure state machine the conversation
//!   reducer consults before asking for a start or stop. It never lets two
//!   passes overlap: a restart on a live pass stops it and only starts the
//!   fresh pass once the engine reports the old one ended.
//! - [`RecognizerHandle`] owns the single engine instance and makes every
//!   call best-effort. Engine refusals are logged and fed back as
//!   `Input::RecognitionRejected` so the state machine can roll back.
//!
//! ```text
//! Idle ──start──► Starting ──started──► Listening
//!   ▲                │                      │
//!   │              stop                   stop
//!   │                ▼                      ▼
//!   └────ended──── Stopping { then_start } ◄┘
//! ```

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::conversation::input::{Effect, EventSink, Input, PassId, RecognitionOp};
use crate::error::Result;
use crate::ipc::events::{SegmentKind, TranscriptSegment};

/// Contract for speech-recognition engines (browser API bridge, cloud STT,
/// console adapter, ...).
///
/// Every accepted `start` must eventually be followed by exactly one
/// `Input::RecognitionEnded` through the sink, after any results of that
/// pass. `RecognitionStarted` should be emitted once audio is being captured.
pub trait SpeechRecognizer: Send + 'static {
    /// Begin one recognition pass.
    ///
    /// # Errors
    /// Returns `AvatalkError::RecognitionEngine` when a pass is already live.
    fn start(&mut self, events: EventSink) -> Result<()>;

    /// Stop capturing. Results already heard are still delivered before the
    /// end event.
    ///
    /// # Errors
    /// Returns `AvatalkError::RecognitionEngine` when no pass is live.
    fn stop(&mut self) -> Result<()>;
}

/// Owner of the one recognizer instance for a session.
pub struct RecognizerHandle {
    engine: Box<dyn SpeechRecognizer>,
    events: EventSink,
}

impl RecognizerHandle {
    pub fn new(engine: Box<dyn SpeechRecognizer>, events: EventSink) -> Self {
        Self { engine, events }
    }

    pub fn start(&mut self, pass: PassId) {
        if let Err(e) = self.engine.start(self.events.clone()) {
            warn!(pass = pass.0, "recognizer start refused: {e}");
            self.events.emit(Input::RecognitionRejected {
                op: RecognitionOp::Start,
                pass,
                reason: e.to_string(),
            });
        }
    }

    pub fn stop(&mut self, pass: PassId) {
        if let Err(e) = self.engine.stop() {
            debug!(pass = pass.0, "recognizer stop refused: {e}");
            self.events.emit(Input::RecognitionRejected {
                op: RecognitionOp::Stop,
                pass,
                reason: e.to_string(),
            });
        }
    }
}

impl std::fmt::Debug for RecognizerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecognizerHandle").finish_non_exhaustive()
    }
}

/// Lifecycle of the recognizer as seen by the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RecognitionPhase {
    Idle,
    /// Start issued, engine has not confirmed capture yet.
    Starting,
    Listening,
    /// Stop issued, waiting for the end event. `then_start` chains a fresh pass.
    Stopping { then_start: bool },
}

/// Whether recognizer restarts are currently allowed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RestartGate {
    Open,
    /// The user is speaking; no restart until the VAD reports speech end.
    SuppressedBySpeech,
    /// Speech ended; waiting out the debounce before reopening.
    Debouncing,
}

/// Conditions outside the controller that must hold for a pass to begin.
#[derive(Debug, Clone, Copy)]
pub struct StartGates {
    pub connected: bool,
    pub muted: bool,
    /// An utterance is queued or playing.
    pub synthesis_busy: bool,
}

impl StartGates {
    pub fn permit(self) -> bool {
        self.connected && !self.muted && !self.synthesis_busy
    }
}

/// What a `RecognitionEnded` meant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndOutcome {
    /// The pass ended on its own (silence, result, engine timeout).
    Natural,
    /// The pass ended because we stopped it.
    Stopped,
    /// We stopped it as part of a restart; start the next pass now.
    RestartPending,
    /// No pass was known to be live.
    Stale,
}

#[derive(Debug, Clone)]
pub struct RecognitionController {
    phase: RecognitionPhase,
    gate: RestartGate,
    /// Most recently started pass. Stops address it, idle or not.
    pass: u64,
}

impl RecognitionController {
    pub fn new() -> Self {
        Self {
            phase: RecognitionPhase::Idle,
            gate: RestartGate::Open,
            pass: 0,
        }
    }

    pub fn phase(&self) -> RecognitionPhase {
        self.phase
    }

    pub fn gate(&self) -> RestartGate {
        self.gate
    }

    pub fn pass(&self) -> PassId {
        PassId(self.pass)
    }

    /// Capture confirmed by the engine.
    pub fn is_listening(&self) -> bool {
        self.phase == RecognitionPhase::Listening
    }

    /// Any phase in which the engine may still be capturing audio.
    pub fn is_live(&self) -> bool {
        self.phase != RecognitionPhase::Idle
    }

    pub fn suppress(&mut self) {
        self.gate = RestartGate::SuppressedBySpeech;
    }

    /// Returns `true` if a suppression was in effect and debouncing began.
    pub fn begin_debounce(&mut self) -> bool {
        if self.gate == RestartGate::SuppressedBySpeech {
            self.gate = RestartGate::Debouncing;
            true
        } else {
            false
        }
    }

    pub fn open_gate(&mut self) {
        self.gate = RestartGate::Open;
    }

    /// Begin a pass if nothing is live and every gate allows it.
    pub fn start(&mut self, gates: StartGates) -> Option<Effect> {
        if !gates.permit() || self.gate != RestartGate::Open {
            debug!(?gates, gate = ?self.gate, "recognition start suppressed");
            return None;
        }
        match self.phase {
            RecognitionPhase::Idle => {
                self.pass += 1;
                self.phase = RecognitionPhase::Starting;
                Some(Effect::StartRecognition(self.pass()))
            }
            RecognitionPhase::Stopping { .. } => {
                self.phase = RecognitionPhase::Stopping { then_start: true };
                None
            }
            RecognitionPhase::Starting | RecognitionPhase::Listening => None,
        }
    }

    /// Stop the live pass, cancelling any chained restart.
    pub fn stop(&mut self) -> Option<Effect> {
        match self.phase {
            RecognitionPhase::Starting | RecognitionPhase::Listening => {
                self.phase = RecognitionPhase::Stopping { then_start: false };
                Some(Effect::StopRecognition(self.pass()))
            }
            RecognitionPhase::Stopping { .. } => {
                self.phase = RecognitionPhase::Stopping { then_start: false };
                None
            }
            RecognitionPhase::Idle => None,
        }
    }

    /// Stop regardless of phase; used by teardown so the engine always sees
    /// a stop call even if we believe it is idle.
    pub fn force_stop(&mut self) -> Effect {
        if self.phase != RecognitionPhase::Idle {
            self.phase = RecognitionPhase::Stopping { then_start: false };
        }
        Effect::StopRecognition(self.pass())
    }

    /// Stop followed by a fresh start.
    pub fn restart(&mut self, gates: StartGates) -> Option<Effect> {
        if !gates.permit() || self.gate != RestartGate::Open {
            debug!(?gates, gate = ?self.gate, "recognition restart suppressed");
            return None;
        }
        match self.phase {
            RecognitionPhase::Idle => self.start(gates),
            RecognitionPhase::Starting | RecognitionPhase::Listening => {
                self.phase = RecognitionPhase::Stopping { then_start: true };
                Some(Effect::StopRecognition(self.pass()))
            }
            RecognitionPhase::Stopping { .. } => {
                self.phase = RecognitionPhase::Stopping { then_start: true };
                None
            }
        }
    }

    pub fn on_started(&mut self) {
        match self.phase {
            RecognitionPhase::Idle | RecognitionPhase::Starting => {
                self.phase = RecognitionPhase::Listening;
            }
            RecognitionPhase::Listening | RecognitionPhase::Stopping { .. } => {}
        }
    }

    pub fn on_ended(&mut self) -> EndOutcome {
        let outcome = match self.phase {
            RecognitionPhase::Idle => EndOutcome::Stale,
            RecognitionPhase::Starting | RecognitionPhase::Listening => EndOutcome::Natural,
            RecognitionPhase::Stopping { then_start: true } => EndOutcome::RestartPending,
            RecognitionPhase::Stopping { then_start: false } => EndOutcome::Stopped,
        };
        self.phase = RecognitionPhase::Idle;
        outcome
    }

    /// Roll back after the engine refused an operation on `pass`.
    ///
    /// A refused stop of the stopping pass means the engine is already idle,
    /// so it ends the pass like an end event would. Refusals addressed to any
    /// other pass are ignored.
    pub fn on_rejected(&mut self, op: RecognitionOp, pass: PassId) -> Option<EndOutcome> {
        if pass != self.pass() {
            debug!(?op, pass = pass.0, current = self.pass, "ignoring refusal for an earlier pass");
            return None;
        }
        match (op, self.phase) {
            (RecognitionOp::Start, RecognitionPhase::Starting) => {
                self.phase = RecognitionPhase::Idle;
                None
            }
            (RecognitionOp::Stop, RecognitionPhase::Stopping { then_start }) => {
                self.phase = RecognitionPhase::Idle;
                Some(if then_start {
                    EndOutcome::RestartPending
                } else {
                    EndOutcome::Stopped
                })
            }
            _ => None,
        }
    }
}

impl Default for RecognitionController {
    fn default() -> Self {
        Self::new()
    }
}

/// Concatenate the final segments of one result event.
///
/// Interim hypotheses are discarded. Returns `None` when nothing final and
/// non-blank remains.
pub fn final_transcript(segments: &[TranscriptSegment]) -> Option<String> {
    let text: String = segments
        .iter()
        .filter(|s| s.kind == SegmentKind::Final)
        .map(|s| s.text.as_str())
        .collect();
    let trimmed = text.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}
