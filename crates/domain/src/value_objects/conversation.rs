//! Conversation turns and threads.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Who spoke a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnRole {
    Player,
    Npc,
}

/// A single utterance in a conversation thread.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: TurnRole,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

impl Turn {
    pub fn player(text: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            role: TurnRole::Player,
            text: text.into(),
            timestamp,
        }
    }

    pub fn npc(text: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            role: TurnRole::Npc,
            text: text.into(),
            timestamp,
        }
    }
}

/// Ordered history between one session and one NPC.
///
/// # Invariants
///
/// - Turns are kept in arrival order.
/// - The only mutation is appending; nothing is removed or reordered.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationThread {
    turns: Vec<Turn>,
}

impl ConversationThread {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, turn: Turn) {
        self.turns.push(turn);
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    /// The last `n` turns in their original relative order.
    pub fn recent(&self, n: usize) -> &[Turn] {
        let start = self.turns.len().saturating_sub(n);
        &self.turns[start..]
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn thread_of(n: usize) -> ConversationThread {
        let now = Utc::now();
        let mut thread = ConversationThread::new();
        for i in 0..n {
            thread.append(Turn::player(format!("msg {i}"), now));
        }
        thread
    }

    #[test]
    fn recent_keeps_newest_turns_in_order() {
        let thread = thread_of(5);
        let texts: Vec<&str> = thread.recent(2).iter().map(|t| t.text.as_str()).collect();
        assert_eq!(texts, vec!["msg 3", "msg 4"]);
    }

    #[test]
    fn recent_larger_than_len_returns_everything() {
        let thread = thread_of(3);
        assert_eq!(thread.recent(10).len(), 3);
        assert_eq!(thread.recent(0).len(), 0);
    }

    #[test]
    fn turn_role_serializes_snake_case() {
        let json = serde_json::to_string(&TurnRole::Npc).expect("serialize");
        assert_eq!(json, "\"npc\"");
    }
}
