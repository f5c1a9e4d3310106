//! Terminal rendering of the engine's broadcasts.
//!
//! The history view always follows the newest turn. When the renderer lags
//! behind the broadcast it reprints the missed turns from a snapshot.
//! The microphone meter is throttled: one line per interval, and only for
//! intervals in which the user was heard speaking.

use std::sync::Arc;
use std::time::Duration;

use avatalk_core::audio::DeviceInfo;
use avatalk_core::{
    AudioActivityEvent, AvatarEvent, ConversationHistory, ConversationTurn, DispatchEvent, Sender, StatusEvent,
    TurnEvent,
};
use chrono::Local;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::debug;

use crate::state::Diagnostics;

pub fn format_turn(index: usize, turn: &ConversationTurn) -> String {
    let who = match turn.sender() {
        Sender::User => "You",
        Sender::Ai => "AI ",
    };
    let at = turn.at().with_timezone(&Local).format("%H:%M:%S");
    format!("#{index:<3} {at} {who} > {}", turn.message())
}

pub fn format_status(event: &StatusEvent) -> String {
    let mut line = format!("[status] {}", event.status.label());
    if event.state.ai_speaking {
        line.push_str(" · speaking");
    }
    if event.state.user_speaking {
        line.push_str(" · hearing you");
    }
    if let Some(detail) = &event.detail {
        line.push_str(&format!(" ({detail})"));
    }
    line
}

pub fn format_avatar(event: &AvatarEvent) -> String {
    let state = format!("{:?}", event.state).to_lowercase();
    format!("[avatar] {state} -> {}", event.clip)
}

const METER_WIDTH: usize = 20;
/// RMS drawn as a full bar. Speech rarely goes above this.
const METER_FULL_SCALE: f32 = 0.25;

pub fn format_level(rms: f32) -> String {
    let filled = ((rms / METER_FULL_SCALE).clamp(0.0, 1.0) * METER_WIDTH as f32).round() as usize;
    format!(
        "[mic] {}{} {rms:.3}",
        "#".repeat(filled),
        ".".repeat(METER_WIDTH - filled)
    )
}

/// Peak level over one meter interval.
#[derive(Debug, Default)]
pub struct LevelWindow {
    peak: f32,
    heard_speech: bool,
}

impl LevelWindow {
    pub fn observe(&mut self, event: &AudioActivityEvent) {
        self.peak = self.peak.max(event.rms);
        self.heard_speech |= event.user_speaking;
    }

    /// Peak of the closed interval if the user spoke in it. Resets the window.
    pub fn close(&mut self) -> Option<f32> {
        let window = std::mem::take(self);
        window.heard_speech.then_some(window.peak)
    }
}

pub fn format_device(device: &DeviceInfo) -> String {
    let mut tags = Vec::new();
    if device.is_default {
        tags.push("default");
    }
    if device.is_recommended {
        tags.push("recommended");
    }
    if device.is_loopback_like {
        tags.push("loopback?");
    }
    if tags.is_empty() {
        device.name.clone()
    } else {
        format!("{} [{}]", device.name, tags.join(", "))
    }
}

/// Print every turn as it is appended, in order and exactly once.
pub async fn follow_history(history: ConversationHistory, mut rx: broadcast::Receiver<TurnEvent>) {
    let mut next = 0usize;
    loop {
        match rx.recv().await {
            Ok(event) => {
                if event.index >= next {
                    println!("{}", format_turn(event.index, &event.turn));
                    next = event.index + 1;
                }
            }
            Err(RecvError::Lagged(skipped)) => {
                debug!(skipped, "history view lagged; resyncing from snapshot");
                let turns = history.snapshot();
                for (index, turn) in turns.iter().enumerate().skip(next) {
                    println!("{}", format_turn(index, turn));
                }
                next = turns.len();
            }
            Err(RecvError::Closed) => break,
        }
    }
}

pub async fn follow_status(mut rx: broadcast::Receiver<StatusEvent>) {
    loop {
        match rx.recv().await {
            Ok(event) => println!("{}", format_status(&event)),
            Err(RecvError::Lagged(_)) => continue,
            Err(RecvError::Closed) => break,
        }
    }
}

pub async fn follow_avatar(mut rx: broadcast::Receiver<AvatarEvent>) {
    loop {
        match rx.recv().await {
            Ok(event) => println!("{}", format_avatar(&event)),
            Err(RecvError::Lagged(_)) => continue,
            Err(RecvError::Closed) => break,
        }
    }
}

pub async fn follow_activity(mut rx: broadcast::Receiver<AudioActivityEvent>, every: Duration) {
    let mut window = LevelWindow::default();
    let mut tick = tokio::time::interval(every);
    loop {
        tokio::select! {
            event = rx.recv() => match event {
                Ok(event) => window.observe(&event),
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => break,
            },
            _ = tick.tick() => {
                if let Some(peak) = window.close() {
                    println!("{}", format_level(peak));
                }
            }
        }
    }
}

pub async fn follow_dispatches(
    diagnostics: Arc<Diagnostics>,
    mut rx: broadcast::Receiver<DispatchEvent>,
) {
    loop {
        match rx.recv().await {
            Ok(event) => {
                debug!(
                    latency_ms = event.latency_ms,
                    source = ?event.reply.source,
                    "reply received"
                );
                diagnostics.record(&event);
            }
            Err(RecvError::Lagged(skipped)) => {
                debug!(skipped, "dispatch diagnostics lagged");
            }
            Err(RecvError::Closed) => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use avatalk_core::{AvatarState, ConversationState, ConversationStatus};

    #[test]
    fn turn_line_names_the_sender() {
        let line = format_turn(0, &ConversationTurn::new(Sender::User, "Apa kabar?"));
        assert!(line.starts_with("#0"));
        assert!(line.ends_with("You > Apa kabar?"));
        let line = format_turn(12, &ConversationTurn::new(Sender::Ai, "Baik!"));
        assert!(line.ends_with("AI  > Baik!"));
    }

    #[test]
    fn status_line_shows_badge_and_detail() {
        let event = StatusEvent {
            status: ConversationStatus::Offline,
            state: ConversationState::default(),
            detail: Some("microphone unavailable".into()),
        };
        assert_eq!(
            format_status(&event),
            "[status] Offline (microphone unavailable)"
        );
    }

    #[test]
    fn avatar_line_names_state_and_clip() {
        let event = AvatarEvent {
            state: AvatarState::Talking,
            clip: "assets/talk.mp4".into(),
        };
        assert_eq!(format_avatar(&event), "[avatar] talking -> assets/talk.mp4");
    }

    fn frame(rms: f32, user_speaking: bool) -> AudioActivityEvent {
        AudioActivityEvent {
            seq: 0,
            rms,
            user_speaking,
        }
    }

    #[test]
    fn level_bar_scales_and_saturates() {
        assert_eq!(format_level(0.0), format!("[mic] {} 0.000", ".".repeat(20)));
        assert_eq!(
            format_level(0.125),
            format!("[mic] {}{} 0.125", "#".repeat(10), ".".repeat(10))
        );
        assert!(format_level(0.9).starts_with(&format!("[mic] {} ", "#".repeat(20))));
    }

    #[test]
    fn level_window_reports_peak_only_when_speech_heard() {
        let mut window = LevelWindow::default();
        window.observe(&frame(0.01, false));
        window.observe(&frame(0.03, false));
        assert_eq!(window.close(), None);

        window.observe(&frame(0.05, true));
        window.observe(&frame(0.12, true));
        window.observe(&frame(0.02, false));
        assert_eq!(window.close(), Some(0.12));
        // Closing resets the window.
        assert_eq!(window.close(), None);
    }

    #[test]
    fn device_tags_are_listed() {
        let device = DeviceInfo {
            name: "USB Mic".into(),
            is_default: true,
            is_loopback_like: false,
            is_recommended: true,
        };
        assert_eq!(format_device(&device), "USB Mic [default, recommended]");
    }
}
