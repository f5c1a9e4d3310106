//! Messages into the conversation reducer and the effects it asks for.

use std::time::Duration;

use tokio::sync::mpsc;
use tracing::debug;

use crate::dispatch::Reply;
use crate::history::Sender;
use crate::ipc::events::TranscriptSegment;
use crate::playback::AvatarState;

/// Identifies one synthesized utterance so late events from a cancelled
/// utterance can be told apart from the current one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UtteranceId(pub u64);

/// Identifies one recognition pass. Start and stop requests carry it, and a
/// refusal echoes it back so a late refusal of an earlier pass is not taken
/// for the current one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PassId(pub u64);

/// Which best-effort recognizer operation an engine refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecognitionOp {
    Start,
    Stop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    /// Delay between a VAD speech end and reopening the restart gate.
    SpeechEndDebounce,
    /// Restart after a natural recognition end or an utterance end.
    AutoRestart,
    /// Resume listening after unmute.
    UnmuteResume,
    /// First recognition pass after connect.
    ConnectWarmup,
}

/// Everything the reducer reacts to: host commands and platform callbacks.
#[derive(Debug, Clone, PartialEq)]
pub enum Input {
    // ── Host commands ────────────────────────────────────────────────────
    Connect,
    Disconnect,
    ToggleMute,
    ToggleMic,
    SendText(String),
    Shutdown,

    // ── Voice activity monitor ───────────────────────────────────────────
    SpeechStart,
    SpeechEnd,
    MicrophoneUnavailable(String),

    // ── Recognizer ───────────────────────────────────────────────────────
    RecognitionStarted,
    RecognitionResult(Vec<TranscriptSegment>),
    RecognitionError(String),
    RecognitionEnded,
    RecognitionRejected {
        op: RecognitionOp,
        pass: PassId,
        reason: String,
    },

    // ── Speech output ────────────────────────────────────────────────────
    SynthesisStarted(UtteranceId),
    SynthesisEnded(UtteranceId),
    MediaOpened,
    MediaFailed(String),

    // ── Dispatcher + timers ──────────────────────────────────────────────
    ReplyReady(Reply),
    TimerFired { kind: TimerKind, generation: u64 },
}

/// Side effects requested by the reducer, executed by the engine in order.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    StartRecognition(PassId),
    StopRecognition(PassId),
    CancelSynthesis,
    Speak { utterance: UtteranceId, text: String },
    Dispatch { text: String },
    Record { sender: Sender, text: String },
    OpenMedia,
    CloseMedia,
    SetAvatar(AvatarState),
    Schedule {
        kind: TimerKind,
        generation: u64,
        delay: Duration,
    },
}

/// Cloneable sender into the engine inbox.
///
/// Platform adapters receive one with every start call and report their
/// callbacks through it; nothing else mutates conversation state.
#[derive(Debug, Clone)]
pub struct EventSink(mpsc::UnboundedSender<Input>);

impl EventSink {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Input>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self(tx), rx)
    }

    pub fn emit(&self, input: Input) {
        if self.0.send(input).is_err() {
            debug!("engine inbox closed; dropping event");
        }
    }

    /// Whether the engine has shut down.
    pub fn is_closed(&self) -> bool {
        self.0.is_closed()
    }
}
