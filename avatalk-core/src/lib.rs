//! # avatalk-core
//!
//! Coordination engine for a voice-chat avatar: listen, transcribe, ask a
//! chat service, speak the reply, animate the avatar, keep a history.
//!
//! ## Architecture
//!
//! ```text
//! Microphone → AudioCapture → SPSC RingBuffer → MicrophoneMonitor(spawn_blocking)
//!                                                    │ SpeechStart / SpeechEnd
//!                                                    ▼
//!   SpeechRecognizer ──results/ends──►  Input inbox  ◄──replies── ResponseDispatcher
//!   SpeechSynthesizer ─start/end─────►      │        ◄──timers─── tokio::time::sleep
//!   MediaTransport ───open/failed────►      ▼
//!                                  Conversation::handle (pure reducer)
//!                                           │ Vec<Effect>
//!                                           ▼
//!                                  AvatalkEngine executes effects
//!                                           │
//!                 broadcast: StatusEvent · AvatarEvent · TurnEvent · DispatchEvent
//! ```
//!
//! The audio callback is zero-alloc. All conversation state lives in the
//! reducer; every platform callback is a message to it.

#![forbid(unsafe_code)]
#![warn(clippy::all)]

pub mod audio;
pub mod buffering;
pub mod conversation;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod history;
pub mod ipc;
pub mod playback;
pub mod recognition;
pub mod session;
pub mod vad;

// Convenience re-exports for downstream crates
pub use conversation::{
    Conversation, ConversationState, EventSink, Input, PassId, TimingConfig, UtteranceId,
};
pub use dispatch::{DispatchMode, Reply, ReplySource, ResponseDispatcher};
pub use engine::{AvatalkEngine, EngineConfig, EngineHandle, Platform};
pub use error::AvatalkError;
pub use history::{ConversationHistory, ConversationTurn, Sender};
pub use ipc::events::{
    AudioActivityEvent, AvatarEvent, ConversationStatus, DispatchEvent, SegmentKind, StatusEvent,
    TranscriptSegment, TurnEvent,
};
pub use playback::{AvatarClips, AvatarState, MediaTransport, OutputMode, SpeechSynthesizer};
pub use recognition::SpeechRecognizer;
pub use session::{SessionIdentity, SessionNegotiator};
pub use vad::VadConfig;

#[cfg(feature = "audio-cpal")]
pub use vad::MicrophoneMonitor;
