//! Session aggregate - one player's conversations with every NPC.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::ids::{NpcId, SessionId};
use crate::value_objects::{ConversationThread, Turn};

/// A player's continuing game context.
///
/// # Invariants
///
/// - One `ConversationThread` per NPC, created on first reference.
/// - Threads only grow; see [`ConversationThread`].
#[derive(Debug, Clone)]
pub struct Session {
    id: SessionId,
    created_at: DateTime<Utc>,
    threads: HashMap<NpcId, ConversationThread>,
}

impl Session {
    pub fn new(id: SessionId, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            created_at,
            threads: HashMap::new(),
        }
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Ordered copy of the thread with `npc_id`; empty if none exists yet.
    pub fn history(&self, npc_id: &NpcId) -> Vec<Turn> {
        self.threads
            .get(npc_id)
            .map(|thread| thread.turns().to_vec())
            .unwrap_or_default()
    }

    /// Append turns to the NPC's thread in the given order.
    pub fn append_turns(&mut self, npc_id: &NpcId, turns: impl IntoIterator<Item = Turn>) {
        let thread = self.threads.entry(npc_id.clone()).or_default();
        for turn in turns {
            thread.append(turn);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value_objects::TurnRole;

    fn ids() -> (SessionId, NpcId, NpcId) {
        (
            SessionId::new("s1").expect("session"),
            NpcId::new("guard").expect("npc"),
            NpcId::new("miller").expect("npc"),
        )
    }

    #[test]
    fn history_is_empty_for_unknown_npc() {
        let (sid, guard, _) = ids();
        let session = Session::new(sid, Utc::now());
        assert!(session.history(&guard).is_empty());
    }

    #[test]
    fn append_creates_thread_and_keeps_order() {
        let (sid, guard, miller) = ids();
        let now = Utc::now();
        let mut session = Session::new(sid, now);

        session.append_turns(&guard, [Turn::player("hello", now), Turn::npc("Halt!", now)]);
        session.append_turns(&miller, [Turn::player("flour?", now)]);

        let history = session.history(&guard);
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].role, TurnRole::Player);
        assert_eq!(history[1].text, "Halt!");
        assert_eq!(session.history(&miller).len(), 1);
    }
}
