//! Append-only conversation history log.
//!
//! Turns are never mutated or removed. Each append takes the write lock,
//! pushes the turn and broadcasts its index before releasing the lock, so
//! subscribers observe appends in exactly the order they were stored.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::error::Result;
use crate::ipc::events::TurnEvent;

/// Slow renderers lag behind at most this many appends before they resync
/// from a snapshot.
const TURN_BROADCAST_CAP: usize = 128;

/// Who produced a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Ai,
}

/// One immutable entry in the history log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationTurn {
    sender: Sender,
    message: String,
    at: DateTime<Utc>,
}

impl ConversationTurn {
    pub fn new(sender: Sender, message: impl Into<String>) -> Self {
        Self {
            sender,
            message: message.into(),
            at: Utc::now(),
        }
    }

    pub fn sender(&self) -> Sender {
        self.sender
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn at(&self) -> DateTime<Utc> {
        self.at
    }
}

/// Shared handle to the log. Clones refer to the same sequence.
#[derive(Clone)]
pub struct ConversationHistory {
    turns: Arc<RwLock<Vec<ConversationTurn>>>,
    appended_tx: broadcast::Sender<TurnEvent>,
}

impl ConversationHistory {
    pub fn new() -> Self {
        let (appended_tx, _) = broadcast::channel(TURN_BROADCAST_CAP);
        Self {
            turns: Arc::new(RwLock::new(Vec::new())),
            appended_tx,
        }
    }

    /// Append a turn and return its index.
    pub fn append(&self, turn: ConversationTurn) -> usize {
        let mut turns = self.turns.write();
        let index = turns.len();
        turns.push(turn.clone());
        // No subscribers is fine; the snapshot remains authoritative.
        let _ = self.appended_tx.send(TurnEvent { index, turn });
        index
    }

    pub fn record(&self, sender: Sender, message: impl Into<String>) -> usize {
        self.append(ConversationTurn::new(sender, message))
    }

    pub fn snapshot(&self) -> Vec<ConversationTurn> {
        self.turns.read().clone()
    }

    pub fn len(&self) -> usize {
        self.turns.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.read().is_empty()
    }

    pub fn last(&self) -> Option<ConversationTurn> {
        self.turns.read().last().cloned()
    }

    /// Subscribe to append notifications. A view scrolls to `index` on each.
    pub fn subscribe(&self) -> broadcast::Receiver<TurnEvent> {
        self.appended_tx.subscribe()
    }

    /// Pretty JSON export of the full log.
    pub fn to_json(&self) -> Result<String> {
        let turns = self.turns.read();
        Ok(serde_json::to_string_pretty(&*turns)?)
    }
}

impl Default for ConversationHistory {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ConversationHistory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversationHistory")
            .field("len", &self.len())
            .finish_non_exhaustive()
    }
}
