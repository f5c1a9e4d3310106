use std::sync::Arc;
use std::time::Duration;

use avatalk_core::conversation::input::{EventSink, Input, UtteranceId};
use avatalk_core::dispatch::{simulation, RemoteDispatcher, SimulationDispatcher};
use avatalk_core::error::{AvatalkError, Result};
use avatalk_core::{
    AvatalkEngine, AvatarState, ConversationStatus, EngineConfig, EngineHandle, OutputMode,
    Platform, ResponseDispatcher, Sender, SessionIdentity, SpeechRecognizer, SpeechSynthesizer,
    TimingConfig, TranscriptSegment,
};
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

const SYNTH_DURATION: Duration = Duration::from_millis(500);

type Log = Arc<Mutex<Vec<String>>>;

#[derive(Default)]
struct RecognizerState {
    live: bool,
    sink: Option<EventSink>,
}

/// Recognizer driven by the test through `say`.
#[derive(Clone)]
struct FakeRecognizer {
    state: Arc<Mutex<RecognizerState>>,
    log: Log,
}

impl FakeRecognizer {
    fn new(log: Log) -> Self {
        Self {
            state: Arc::default(),
            log,
        }
    }

    /// Deliver a final result and end the pass, as a browser engine does
    /// after a pause in speech.
    fn say(&self, text: &str) {
        let mut state = self.state.lock();
        assert!(state.live, "no recognition pass is live");
        state.live = false;
        let sink = state.sink.clone().expect("sink set on start");
        sink.emit(Input::RecognitionResult(vec![
            TranscriptSegment::interim(text),
            TranscriptSegment::final_text(text),
        ]));
        sink.emit(Input::RecognitionEnded);
    }

    fn is_live(&self) -> bool {
        self.state.lock().live
    }
}

impl SpeechRecognizer for FakeRecognizer {
    fn start(&mut self, events: EventSink) -> Result<()> {
        let mut state = self.state.lock();
        if state.live {
            self.log.lock().push("start-refused".into());
            return Err(AvatalkError::RecognitionEngine("already started".into()));
        }
        self.log.lock().push("start".into());
        state.live = true;
        events.emit(Input::RecognitionStarted);
        state.sink = Some(events);
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        let mut state = self.state.lock();
        if !state.live {
            return Err(AvatalkError::RecognitionEngine("not started".into()));
        }
        self.log.lock().push("stop".into());
        state.live = false;
        if let Some(sink) = &state.sink {
            sink.emit(Input::RecognitionEnded);
        }
        Ok(())
    }
}

/// Synthesizer whose utterances last `SYNTH_DURATION` unless cancelled.
struct FakeSynthesizer {
    current: Arc<Mutex<Option<(UtteranceId, EventSink)>>>,
    log: Log,
}

impl FakeSynthesizer {
    fn new(log: Log) -> Self {
        Self {
            current: Arc::default(),
            log,
        }
    }
}

impl SpeechSynthesizer for FakeSynthesizer {
    fn speak(&mut self, utterance: UtteranceId, text: &str, events: EventSink) -> Result<()> {
        self.log.lock().push(format!("speak {text}"));
        events.emit(Input::SynthesisStarted(utterance));
        *self.current.lock() = Some((utterance, events));

        let current = Arc::clone(&self.current);
        let log = Arc::clone(&self.log);
        tokio::spawn(async move {
            tokio::time::sleep(SYNTH_DURATION).await;
            let mut slot = current.lock();
            if matches!(&*slot, Some((id, _)) if *id == utterance) {
                if let Some((id, sink)) = slot.take() {
                    log.lock().push("speech-done".into());
                    sink.emit(Input::SynthesisEnded(id));
                }
            }
        });
        Ok(())
    }

    fn cancel(&mut self) {
        if let Some((id, sink)) = self.current.lock().take() {
            self.log.lock().push("speech-cancelled".into());
            sink.emit(Input::SynthesisEnded(id));
        }
    }
}

struct Harness {
    handle: EngineHandle,
    recognizer: FakeRecognizer,
    log: Log,
    avatar: broadcast::Receiver<avatalk_core::AvatarEvent>,
    task: JoinHandle<()>,
}

impl Harness {
    fn start(timing: TimingConfig, dispatcher: Arc<dyn ResponseDispatcher>) -> Self {
        let log = Log::default();
        let recognizer = FakeRecognizer::new(Arc::clone(&log));
        let engine = AvatalkEngine::with_dispatcher(
            EngineConfig {
                timing,
                output: OutputMode::LocalSynthesis,
                ..EngineConfig::default()
            },
            Platform {
                recognizer: Box::new(recognizer.clone()),
                synthesizer: Some(Box::new(FakeSynthesizer::new(Arc::clone(&log)))),
                media: None,
            },
            dispatcher,
            SessionIdentity::local(0),
        );
        let handle = engine.handle();
        let avatar = handle.subscribe_avatar();
        let task = tokio::spawn(engine.run());
        Self {
            handle,
            recognizer,
            log,
            avatar,
            task,
        }
    }

    fn simulated() -> Self {
        Self::start(
            TimingConfig::default(),
            Arc::new(SimulationDispatcher::with_seed(Duration::from_millis(1_000), 11)),
        )
    }

    fn count(&self, entry: &str) -> usize {
        self.log.lock().iter().filter(|e| *e == entry).count()
    }

    fn avatar_states(&mut self) -> Vec<AvatarState> {
        let mut states = Vec::new();
        while let Ok(event) = self.avatar.try_recv() {
            states.push(event.state);
        }
        states
    }

    async fn shutdown(self) {
        self.handle.shutdown();
        self.task.await.expect("engine task");
    }
}

async fn settle(ms: u64) {
    tokio::time::sleep(Duration::from_millis(ms)).await;
}

/// After every `speak`, no `start` appears until the utterance finished or
/// was cancelled.
fn assert_no_start_during_speech(log: &[String]) {
    let mut speaking = false;
    for entry in log {
        if entry.starts_with("speak") {
            speaking = true;
        } else if entry == "speech-done" || entry == "speech-cancelled" {
            speaking = false;
        } else if entry == "start" {
            assert!(!speaking, "recognition started during speech: {log:?}");
        }
    }
}

#[tokio::test(start_paused = true)]
async fn apa_kabar_in_simulation_mode() {
    let mut h = Harness::simulated();
    h.handle.connect();
    settle(500).await;
    assert_eq!(h.count("start"), 1, "warm-up start after 400 ms");
    assert_eq!(h.handle.connection_status(), ConversationStatus::Listening);
    assert!(h.handle.status().state.listening);

    h.recognizer.say("Apa kabar?");
    settle(5_000).await;

    let turns = h.handle.history().snapshot();
    assert_eq!(turns.len(), 2);
    assert_eq!(turns[0].sender(), Sender::User);
    assert_eq!(turns[0].message(), "Apa kabar?");
    assert_eq!(turns[1].sender(), Sender::Ai);
    assert!(simulation::templates("Apa kabar?").contains(&turns[1].message().to_string()));

    assert_eq!(
        h.avatar_states(),
        vec![AvatarState::Talking, AvatarState::Idle]
    );
    assert_eq!(
        h.log.lock().iter().filter(|e| e.starts_with("speak")).count(),
        1
    );
    assert_no_start_during_speech(&h.log.lock());
    assert_eq!(h.count("start-refused"), 0);
    // Listening again after the reply.
    assert!(h.recognizer.is_live());

    h.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn mute_stops_listening_and_unmute_resumes_after_delay() {
    let h = Harness::simulated();
    h.handle.connect();
    settle(500).await;
    assert!(h.recognizer.is_live());

    h.handle.toggle_mute();
    settle(50).await;
    assert!(!h.recognizer.is_live());
    assert_eq!(h.handle.connection_status(), ConversationStatus::Muted);
    assert_eq!(h.handle.status().status.label(), "Online (Muted)");

    settle(2_000).await;
    assert_eq!(h.count("start"), 1, "no restart while muted");

    h.handle.toggle_mute();
    settle(300).await;
    assert_eq!(h.count("start"), 1, "resume waits for the unmute delay");
    settle(200).await;
    assert_eq!(h.count("start"), 2);
    assert!(h.handle.status().state.connected);
    assert_eq!(h.handle.connection_status(), ConversationStatus::Listening);

    h.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn double_speech_start_cancels_once_and_starts_one_pass() {
    let mut h = Harness::simulated();
    h.handle.connect();
    settle(500).await;
    h.handle.send_text("Nyanyi dong!");
    // Reply arrives at +1000 ms; speech lasts 500 ms.
    settle(1_100).await;
    assert!(h.handle.status().state.ai_speaking);
    assert!(!h.recognizer.is_live());
    let starts_before = h.count("start");

    let vad = h.handle.events();
    vad.emit(Input::SpeechStart);
    vad.emit(Input::SpeechStart);
    settle(50).await;

    assert_eq!(h.count("speech-cancelled"), 1);
    assert!(!h.handle.status().state.ai_speaking);
    assert!(h.handle.status().state.user_speaking);
    settle(1_000).await;
    assert_eq!(h.count("start"), starts_before, "gate holds while user speaks");

    vad.emit(Input::SpeechEnd);
    settle(100).await;
    assert_eq!(h.count("start"), starts_before, "debounce still pending");
    settle(100).await;
    assert_eq!(h.count("start"), starts_before + 1);
    assert_eq!(h.count("start-refused"), 0);
    assert_eq!(
        h.avatar_states(),
        vec![AvatarState::Talking, AvatarState::Idle]
    );

    h.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn disconnect_twice_leaves_everything_stopped() {
    let h = Harness::simulated();
    h.handle.connect();
    settle(500).await;
    h.handle.disconnect();
    h.handle.disconnect();
    settle(1_000).await;

    assert!(!h.recognizer.is_live());
    assert_eq!(h.count("stop"), 1);
    assert_eq!(h.handle.connection_status(), ConversationStatus::Offline);

    // Manual text still reaches the history while offline; the reply is
    // recorded and spoken, but listening does not resume.
    h.handle.send_text("Siapa kamu?");
    settle(3_000).await;
    assert_eq!(h.handle.history().len(), 2);
    assert_eq!(h.count("start"), 1);

    h.shutdown().await;
}

#[tokio::test]
async fn unreachable_chat_service_yields_one_fallback_turn() {
    let dispatcher = Arc::new(RemoteDispatcher::new("http://127.0.0.1:9").unwrap());
    let mut h = Harness::start(TimingConfig::immediate(), dispatcher);
    let mut turns = h.handle.subscribe_turns();
    h.handle.connect();
    h.handle.send_text("Apa kabar?");

    let user = tokio::time::timeout(Duration::from_secs(10), turns.recv())
        .await
        .expect("user turn")
        .unwrap();
    let ai = tokio::time::timeout(Duration::from_secs(40), turns.recv())
        .await
        .expect("ai turn")
        .unwrap();
    assert_eq!(user.turn.message(), "Apa kabar?");
    assert_eq!(ai.turn.sender(), Sender::Ai);
    assert_eq!(ai.turn.message(), "Maaf, aku mengalami gangguan.");

    // Speech runs its course and the avatar returns to idle.
    tokio::time::sleep(SYNTH_DURATION + Duration::from_millis(300)).await;
    assert_eq!(h.handle.history().len(), 2);
    assert!(!h.handle.status().state.ai_speaking);
    assert_eq!(h.handle.avatar().state, AvatarState::Idle);
    assert!(h.avatar_states().contains(&AvatarState::Talking));

    h.shutdown().await;
}
