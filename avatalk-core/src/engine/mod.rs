//! `AvatalkEngine`: the single event loop of a conversation session.
//!
//! ## Lifecycle
//!
//! ```text
//! AvatalkEngine::new(config, platform, identity)
//!     ├─► handle()            → cloneable EngineHandle for the host
//!     └─► tokio::spawn(run()) → drains the inbox until Shutdown
//!
//! host command / platform callback ──► Input ──► Conversation::handle
//!                                                      │
//!                                               Vec<Effect> executed here
//! ```
//!
//! The engine owns every platform handle. Adapters never touch conversation
//! state; they report back through the `EventSink` they were given. Network
//! calls and timers run as spawned tasks that post their completion to the
//! same inbox, so all state changes are serialized through one reducer.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc};
use tokio::time::Instant;
use tracing::{debug, info};

use crate::{
    conversation::{Conversation, Effect, EventSink, Input, TimingConfig},
    dispatch::{self, DispatchMode, ResponseDispatcher},
    error::Result,
    history::ConversationHistory,
    ipc::events::{AvatarEvent, ConversationStatus, DispatchEvent, StatusEvent, TurnEvent},
    playback::{AvatarClips, AvatarState, MediaTransport, OutputMode, PlaybackOutput, SpeechSynthesizer},
    recognition::{RecognizerHandle, SpeechRecognizer},
    session::SessionIdentity,
    vad::VadConfig,
};

/// Broadcast channel capacity for status, avatar and dispatch events.
const BROADCAST_CAP: usize = 256;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub timing: TimingConfig,
    pub output: OutputMode,
    pub dispatch: DispatchMode,
    /// Used by hosts that attach a `MicrophoneMonitor`.
    pub vad: VadConfig,
    /// WHEP-style playback endpoint, required in `RemoteMedia` mode.
    pub media_endpoint: Option<String>,
    pub clips: AvatarClips,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            timing: TimingConfig::default(),
            output: OutputMode::LocalSynthesis,
            dispatch: DispatchMode::default(),
            vad: VadConfig::default(),
            media_endpoint: None,
            clips: AvatarClips::default(),
        }
    }
}

/// Platform handles owned by one session. Created once, never replaced.
pub struct Platform {
    pub recognizer: Box<dyn SpeechRecognizer>,
    pub synthesizer: Option<Box<dyn SpeechSynthesizer>>,
    pub media: Option<Box<dyn MediaTransport>>,
}

/// Values the host can read without going through the inbox.
struct Shared {
    status: Mutex<StatusEvent>,
    avatar: Mutex<AvatarEvent>,
    status_tx: broadcast::Sender<StatusEvent>,
    avatar_tx: broadcast::Sender<AvatarEvent>,
    dispatch_tx: broadcast::Sender<DispatchEvent>,
}

pub struct AvatalkEngine {
    clips: AvatarClips,
    output: OutputMode,
    conversation: Conversation,
    recognizer: RecognizerHandle,
    playback: PlaybackOutput,
    dispatcher: Arc<dyn ResponseDispatcher>,
    identity: Arc<SessionIdentity>,
    history: ConversationHistory,
    events: EventSink,
    inbox: mpsc::UnboundedReceiver<Input>,
    shared: Arc<Shared>,
}

impl AvatalkEngine {
    /// Build an engine with the dispatcher selected by `config.dispatch`.
    ///
    /// # Errors
    /// `AvatalkError::Config` if the remote dispatcher's base URL is unusable.
    pub fn new(config: EngineConfig, platform: Platform, identity: SessionIdentity) -> Result<Self> {
        let dispatcher = dispatch::from_mode(&config.dispatch)?;
        Ok(Self::with_dispatcher(config, platform, dispatcher, identity))
    }

    pub fn with_dispatcher(
        config: EngineConfig,
        platform: Platform,
        dispatcher: Arc<dyn ResponseDispatcher>,
        identity: SessionIdentity,
    ) -> Self {
        let (events, inbox) = EventSink::channel();
        let (status_tx, _) = broadcast::channel(BROADCAST_CAP);
        let (avatar_tx, _) = broadcast::channel(BROADCAST_CAP);
        let (dispatch_tx, _) = broadcast::channel(BROADCAST_CAP);

        let conversation = Conversation::new(config.timing, config.output);
        let status = StatusEvent {
            status: conversation.status(),
            state: conversation.state(),
            detail: None,
        };
        let avatar = offline_avatar(&config.clips, config.output);

        Self {
            recognizer: RecognizerHandle::new(platform.recognizer, events.clone()),
            playback: PlaybackOutput::new(
                platform.synthesizer,
                platform.media,
                config.media_endpoint,
                events.clone(),
            ),
            clips: config.clips,
            output: config.output,
            conversation,
            dispatcher,
            identity: Arc::new(identity),
            history: ConversationHistory::new(),
            events,
            inbox,
            shared: Arc::new(Shared {
                status: Mutex::new(status),
                avatar: Mutex::new(avatar),
                status_tx,
                avatar_tx,
                dispatch_tx,
            }),
        }
    }

    pub fn handle(&self) -> EngineHandle {
        EngineHandle {
            events: self.events.clone(),
            history: self.history.clone(),
            shared: Arc::clone(&self.shared),
        }
    }

    /// Drain the inbox until `Input::Shutdown`. Teardown effects of the
    /// shutdown are executed before returning.
    pub async fn run(mut self) {
        info!(
            output = ?self.output,
            negotiated = self.identity.is_negotiated(),
            "conversation engine running"
        );
        while let Some(input) = self.inbox.recv().await {
            let shutdown = matches!(input, Input::Shutdown);
            for effect in self.conversation.handle(input) {
                self.execute(effect);
            }
            self.publish_status();
            if shutdown {
                break;
            }
        }
        info!(turns = self.history.len(), "conversation engine stopped");
    }

    fn execute(&mut self, effect: Effect) {
        match effect {
            Effect::StartRecognition(pass) => self.recognizer.start(pass),
            Effect::StopRecognition(pass) => self.recognizer.stop(pass),
            Effect::CancelSynthesis => self.playback.cancel_speech(),
            Effect::Speak { utterance, text } => self.playback.speak(utterance, &text),
            Effect::Dispatch { text } => self.spawn_dispatch(text),
            Effect::Record { sender, text } => {
                self.history.record(sender, text);
            }
            Effect::OpenMedia => self.playback.open_media(),
            Effect::CloseMedia => {
                self.playback.close_media();
                if self.output == OutputMode::RemoteMedia {
                    self.publish_avatar(offline_avatar(&self.clips, self.output));
                }
            }
            Effect::SetAvatar(state) => self.publish_avatar(AvatarEvent {
                state,
                clip: self.clips.clip_for(state).to_string(),
            }),
            Effect::Schedule {
                kind,
                generation,
                delay,
            } => self.spawn_timer(Input::TimerFired { kind, generation }, delay),
        }
    }

    fn spawn_dispatch(&self, text: String) {
        let dispatcher = Arc::clone(&self.dispatcher);
        let identity = Arc::clone(&self.identity);
        let events = self.events.clone();
        let shared = Arc::clone(&self.shared);
        tokio::spawn(async move {
            let started = Instant::now();
            let reply = dispatcher.respond(&text, &identity).await;
            let latency_ms = started.elapsed().as_millis() as u64;
            debug!(latency_ms, source = ?reply.source, "reply ready");
            let _ = shared.dispatch_tx.send(DispatchEvent {
                request: text,
                reply: reply.clone(),
                latency_ms,
            });
            events.emit(Input::ReplyReady(reply));
        });
    }

    fn spawn_timer(&self, input: Input, delay: Duration) {
        let events = self.events.clone();
        tokio::spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            events.emit(input);
        });
    }

    fn publish_avatar(&self, event: AvatarEvent) {
        let mut current = self.shared.avatar.lock();
        if *current != event {
            *current = event.clone();
            let _ = self.shared.avatar_tx.send(event);
        }
    }

    fn publish_status(&self) {
        let event = StatusEvent {
            status: self.conversation.status(),
            state: self.conversation.state(),
            detail: self.conversation.offline_reason().map(str::to_string),
        };
        let mut current = self.shared.status.lock();
        if *current != event {
            debug!(status = ?event.status, state = ?event.state, "status changed");
            *current = event.clone();
            let _ = self.shared.status_tx.send(event);
        }
    }
}

impl std::fmt::Debug for AvatalkEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AvatalkEngine")
            .field("output", &self.output)
            .field("identity", &self.identity)
            .field("playback", &self.playback)
            .finish_non_exhaustive()
    }
}

fn offline_avatar(clips: &AvatarClips, output: OutputMode) -> AvatarEvent {
    let clip = match output {
        OutputMode::LocalSynthesis => &clips.idle,
        OutputMode::RemoteMedia => &clips.standby,
    };
    AvatarEvent {
        state: AvatarState::Idle,
        clip: clip.clone(),
    }
}

/// Cloneable host-side handle. Commands are queued; they take effect when the
/// engine loop processes them.
#[derive(Clone)]
pub struct EngineHandle {
    events: EventSink,
    history: ConversationHistory,
    shared: Arc<Shared>,
}

impl EngineHandle {
    pub fn connect(&self) {
        self.events.emit(Input::Connect);
    }

    pub fn disconnect(&self) {
        self.events.emit(Input::Disconnect);
    }

    pub fn toggle_mute(&self) {
        self.events.emit(Input::ToggleMute);
    }

    pub fn toggle_mic(&self) {
        self.events.emit(Input::ToggleMic);
    }

    /// Manual text or a quick reply. Blank text is ignored by the engine.
    pub fn send_text(&self, text: impl Into<String>) {
        self.events.emit(Input::SendText(text.into()));
    }

    pub fn shutdown(&self) {
        self.events.emit(Input::Shutdown);
    }

    /// Sink for adapters created after the engine (e.g. a microphone monitor).
    pub fn events(&self) -> EventSink {
        self.events.clone()
    }

    /// Whether the engine loop has exited.
    pub fn is_closed(&self) -> bool {
        self.events.is_closed()
    }

    pub fn history(&self) -> &ConversationHistory {
        &self.history
    }

    pub fn status(&self) -> StatusEvent {
        self.shared.status.lock().clone()
    }

    pub fn connection_status(&self) -> ConversationStatus {
        self.shared.status.lock().status
    }

    pub fn avatar(&self) -> AvatarEvent {
        self.shared.avatar.lock().clone()
    }

    pub fn subscribe_status(&self) -> broadcast::Receiver<StatusEvent> {
        self.shared.status_tx.subscribe()
    }

    pub fn subscribe_avatar(&self) -> broadcast::Receiver<AvatarEvent> {
        self.shared.avatar_tx.subscribe()
    }

    pub fn subscribe_turns(&self) -> broadcast::Receiver<TurnEvent> {
        self.history.subscribe()
    }

    pub fn subscribe_dispatches(&self) -> broadcast::Receiver<DispatchEvent> {
        self.shared.dispatch_tx.subscribe()
    }
}

impl std::fmt::Debug for EngineHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineHandle")
            .field("status", &self.connection_status())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::{Reply, ReplySource};
    use crate::error::AvatalkError;
    use async_trait::async_trait;

    struct RefusingRecognizer;

    impl SpeechRecognizer for RefusingRecognizer {
        fn start(&mut self, _events: EventSink) -> Result<()> {
            Err(AvatalkError::RecognitionEngine("unsupported".into()))
        }

        fn stop(&mut self) -> Result<()> {
            Err(AvatalkError::RecognitionEngine("not started".into()))
        }
    }

    struct Echo;

    #[async_trait]
    impl ResponseDispatcher for Echo {
        async fn respond(&self, text: &str, _identity: &SessionIdentity) -> Reply {
            Reply::new(format!("echo {text}"), ReplySource::Simulated)
        }
    }

    fn engine(output: OutputMode) -> AvatalkEngine {
        AvatalkEngine::with_dispatcher(
            EngineConfig {
                timing: TimingConfig::immediate(),
                output,
                ..EngineConfig::default()
            },
            Platform {
                recognizer: Box::new(RefusingRecognizer),
                synthesizer: None,
                media: None,
            },
            Arc::new(Echo),
            SessionIdentity::local(0),
        )
    }

    #[tokio::test]
    async fn manual_text_without_synthesizer_completes_turn() {
        let engine = engine(OutputMode::LocalSynthesis);
        let handle = engine.handle();
        let mut turns = handle.subscribe_turns();
        let task = tokio::spawn(engine.run());

        handle.connect();
        handle.send_text("halo");
        let user = turns.recv().await.unwrap();
        let ai = turns.recv().await.unwrap();
        assert_eq!(user.turn.message(), "halo");
        assert_eq!(ai.turn.message(), "echo halo");
        assert_eq!(ai.index, 1);

        handle.shutdown();
        task.await.unwrap();
        assert!(handle.is_closed());
        assert_eq!(handle.connection_status(), ConversationStatus::Offline);
    }

    #[tokio::test]
    async fn remote_media_without_transport_goes_offline_with_reason() {
        let engine = engine(OutputMode::RemoteMedia);
        let handle = engine.handle();
        assert_eq!(handle.avatar().clip, "assets/police.mp4");
        let mut status = handle.subscribe_status();
        let task = tokio::spawn(engine.run());

        handle.connect();
        let connecting = status.recv().await.unwrap();
        assert_eq!(connecting.status, ConversationStatus::Connecting);
        let offline = status.recv().await.unwrap();
        assert_eq!(offline.status, ConversationStatus::Offline);
        assert!(offline.detail.unwrap().contains("media playback failed"));

        handle.shutdown();
        task.await.unwrap();
    }
}
