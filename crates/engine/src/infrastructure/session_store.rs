//! In-memory session store.
//!
//! Sessions live for the lifetime of the process and are never evicted,
//! so memory grows with the number of distinct session ids and turns.
//! That is an accepted limitation of this store; swap in another
//! `SessionRepo` implementation to persist or bound it.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use hearthtalk_domain::{NpcId, Session, SessionId, Turn};
use tokio::sync::Mutex;

use crate::infrastructure::ports::{ClockPort, SessionRepo, SessionStoreError};

/// Process-wide session map with one lock per session.
///
/// The map itself is sharded (`DashMap`) and only touched briefly to find
/// or insert a session's slot; all reads and writes of a session happen
/// under that session's own mutex, so sessions never contend with each
/// other.
pub struct InMemorySessionStore {
    sessions: DashMap<SessionId, Arc<Mutex<Session>>>,
    clock: Arc<dyn ClockPort>,
}

impl InMemorySessionStore {
    pub fn new(clock: Arc<dyn ClockPort>) -> Self {
        Self {
            sessions: DashMap::new(),
            clock,
        }
    }

    /// Number of sessions seen since start-up.
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    fn slot(&self, session_id: &SessionId) -> Arc<Mutex<Session>> {
        if let Some(existing) = self.sessions.get(session_id) {
            return Arc::clone(existing.value());
        }
        let slot = self
            .sessions
            .entry(session_id.clone())
            .or_insert_with(|| {
                tracing::debug!(session_id = %session_id, "Creating session");
                Arc::new(Mutex::new(Session::new(
                    session_id.clone(),
                    self.clock.now(),
                )))
            });
        Arc::clone(slot.value())
    }
}

#[async_trait]
impl SessionRepo for InMemorySessionStore {
    async fn get_or_create(&self, session_id: &SessionId) -> Result<Session, SessionStoreError> {
        let slot = self.slot(session_id);
        let session = slot.lock().await;
        Ok(session.clone())
    }

    async fn append_turns(
        &self,
        session_id: &SessionId,
        npc_id: &NpcId,
        turns: Vec<Turn>,
    ) -> Result<(), SessionStoreError> {
        let slot = self.slot(session_id);
        let mut session = slot.lock().await;
        let count = turns.len();
        session.append_turns(npc_id, turns);
        tracing::trace!(
            session_id = %session_id,
            npc_id = %npc_id,
            appended = count,
            "Appended turns"
        );
        Ok(())
    }

    async fn get_history(&self, session_id: &SessionId, npc_id: &NpcId) -> Vec<Turn> {
        let slot = match self.sessions.get(session_id) {
            Some(entry) => Arc::clone(entry.value()),
            None => return Vec::new(),
        };
        let session = slot.lock().await;
        session.history(npc_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::clock::FixedClock;
    use chrono::Utc;
    use hearthtalk_domain::TurnRole;
    use std::time::Duration;

    fn store() -> Arc<InMemorySessionStore> {
        Arc::new(InMemorySessionStore::new(Arc::new(FixedClock(Utc::now()))))
    }

    fn sid(id: &str) -> SessionId {
        SessionId::new(id).expect("session id")
    }

    fn npc(id: &str) -> NpcId {
        NpcId::new(id).expect("npc id")
    }

    #[tokio::test]
    async fn get_or_create_is_idempotent() {
        let store = store();
        let first = store.get_or_create(&sid("s1")).await.expect("create");
        let second = store.get_or_create(&sid("s1")).await.expect("get");

        assert_eq!(first.id(), second.id());
        assert_eq!(first.created_at(), second.created_at());
        assert_eq!(store.session_count(), 1);
    }

    #[tokio::test]
    async fn history_of_unknown_session_is_empty_and_does_not_create() {
        let store = store();
        assert!(store.get_history(&sid("nobody"), &npc("guard")).await.is_empty());
        assert_eq!(store.session_count(), 0);
    }

    #[tokio::test]
    async fn append_turn_creates_session_and_thread() {
        let store = store();
        let now = Utc::now();
        store
            .append_turn(&sid("s1"), &npc("guard"), Turn::player("hello", now))
            .await
            .expect("append");

        let history = store.get_history(&sid("s1"), &npc("guard")).await;
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].role, TurnRole::Player);
        assert!(store.get_history(&sid("s1"), &npc("miller")).await.is_empty());
    }

    #[tokio::test]
    async fn concurrent_pairs_are_never_interleaved() {
        let store = store();
        let mut handles = Vec::new();
        for i in 0..32 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                let now = Utc::now();
                store
                    .append_turns(
                        &sid("s1"),
                        &npc("guard"),
                        vec![Turn::player(format!("q{i}"), now), Turn::npc(format!("a{i}"), now)],
                    )
                    .await
                    .expect("append");
            }));
        }
        for handle in handles {
            handle.await.expect("join");
        }

        let history = store.get_history(&sid("s1"), &npc("guard")).await;
        assert_eq!(history.len(), 64);
        for pair in history.chunks(2) {
            assert_eq!(pair[0].role, TurnRole::Player);
            assert_eq!(pair[1].role, TurnRole::Npc);
            assert_eq!(pair[0].text[1..], pair[1].text[1..]);
        }
    }

    #[tokio::test]
    async fn a_locked_session_does_not_block_other_sessions() {
        let store = store();
        store.get_or_create(&sid("busy")).await.expect("create");
        let busy = store.slot(&sid("busy"));
        let _held = busy.lock().await;

        let other = tokio::time::timeout(
            Duration::from_secs(1),
            store.append_turn(&sid("free"), &npc("guard"), Turn::player("hi", Utc::now())),
        )
        .await;

        assert!(other.is_ok(), "append on another session must not wait");
    }
}
