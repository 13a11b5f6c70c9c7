//! Per-message conversation flow.
//!
//! Dialogue: Received -> HistoryLoaded -> Prompted -> Generated -> Appended
//! -> Responded. A missing portrait is generated on a detached task, so the
//! reply and the history append never wait for image generation.

use std::sync::Arc;

use hearthtalk_domain::{GenerationResult, NpcDescriptor, NpcId, SessionId, Turn};
use serde_json::Value;

use super::dialogue_client::{DialogueClient, DialogueReply};
use super::prompt::{DialoguePrompt, PromptBuilder};
use super::retry::Backoff;
use crate::infrastructure::npc_roster::NpcRoster;
use crate::infrastructure::ports::{ClockPort, SessionRepo, SessionStoreError};
use crate::use_cases::portrait::EnsurePortrait;

/// Line spoken when generation could not produce a reply.
pub const FALLBACK_LINE: &str = "I'm sorry, I seem to be having trouble responding right now.";

#[derive(Debug, Clone, PartialEq)]
pub struct ChatReply {
    pub npc_reply_text: String,
    pub portrait_url: Option<String>,
    pub metadata: Option<Value>,
    /// Dialogue generation attempts made, including the first.
    pub attempts: u32,
    pub fallback_used: bool,
}

/// Request-shape faults. Generation failures never surface here.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("Unknown NPC: {0}")]
    NpcNotFound(NpcId),
    #[error("Message is empty")]
    EmptyMessage,
    #[error(transparent)]
    Store(#[from] SessionStoreError),
}

pub struct ConversationOrchestrator {
    sessions: Arc<dyn SessionRepo>,
    roster: Arc<NpcRoster>,
    prompts: PromptBuilder,
    dialogue: DialogueClient,
    portraits: Arc<EnsurePortrait>,
    clock: Arc<dyn ClockPort>,
    backoff: Backoff,
}

impl ConversationOrchestrator {
    pub fn new(
        sessions: Arc<dyn SessionRepo>,
        roster: Arc<NpcRoster>,
        prompts: PromptBuilder,
        dialogue: DialogueClient,
        portraits: Arc<EnsurePortrait>,
        clock: Arc<dyn ClockPort>,
        backoff: Backoff,
    ) -> Self {
        Self {
            sessions,
            roster,
            prompts,
            dialogue,
            portraits,
            clock,
            backoff,
        }
    }

    pub async fn handle_message(
        &self,
        session_id: &SessionId,
        npc_id: &NpcId,
        message: &str,
    ) -> Result<ChatReply, ChatError> {
        // Received
        let message = message.trim();
        if message.is_empty() {
            return Err(ChatError::EmptyMessage);
        }
        let npc = self
            .roster
            .get(npc_id)
            .ok_or_else(|| ChatError::NpcNotFound(npc_id.clone()))?;
        let received_at = self.clock.now();

        // HistoryLoaded
        let session = self.sessions.get_or_create(session_id).await?;
        let history = session.history(npc_id);

        // Prompted
        let prompt = self.prompts.build(npc, &history, message);
        tracing::debug!(
            session_id = %session_id,
            npc_id = %npc_id,
            history_turns = history.len(),
            rendered_turns = prompt.history.len(),
            "Built dialogue prompt"
        );

        // Generated
        let portrait_url = self.portrait_url(npc).await;
        let outcome = self.generate_with_retry(session_id, npc, &prompt).await;

        let (reply, fallback_used) = match outcome.result {
            Some(reply) => (reply, false),
            None => (
                DialogueReply {
                    text: FALLBACK_LINE.to_string(),
                    metadata: None,
                },
                true,
            ),
        };

        // Appended
        let replied_at = self.clock.now();
        self.sessions
            .append_turns(
                session_id,
                npc_id,
                vec![
                    Turn::player(message, received_at),
                    Turn::npc(reply.text.clone(), replied_at),
                ],
            )
            .await?;

        // Responded
        tracing::info!(
            session_id = %session_id,
            npc_id = %npc_id,
            attempts = outcome.attempts,
            fallback_used,
            has_portrait = portrait_url.is_some(),
            "Dialogue turn recorded"
        );
        Ok(ChatReply {
            npc_reply_text: reply.text,
            portrait_url,
            metadata: reply.metadata,
            attempts: outcome.attempts,
            fallback_used,
        })
    }

    /// URL of a cached portrait. When absent, generation starts in the
    /// background and this reply carries no portrait.
    async fn portrait_url(&self, npc: &NpcDescriptor) -> Option<String> {
        let cache = self.portraits.cache();
        if cache.has(&npc.id).await {
            return Some(cache.url_for(&npc.id));
        }

        let portraits = Arc::clone(&self.portraits);
        let npc = npc.clone();
        tokio::spawn(async move {
            let status = portraits.execute(&npc).await;
            tracing::debug!(npc_id = %npc.id, ?status, "Background portrait flow finished");
        });
        None
    }

    async fn generate_with_retry(
        &self,
        session_id: &SessionId,
        npc: &NpcDescriptor,
        prompt: &DialoguePrompt,
    ) -> Outcome {
        let max_attempts = self.backoff.max_attempts();
        let mut attempt = 1;

        loop {
            match self.dialogue.generate(prompt).await {
                GenerationResult::Success(reply) => {
                    return Outcome {
                        result: Some(reply),
                        attempts: attempt,
                    };
                }
                GenerationResult::TransientFailure(reason) if attempt < max_attempts => {
                    let delay = self.backoff.delay(attempt);
                    tracing::warn!(
                        session_id = %session_id,
                        npc_id = %npc.id,
                        attempt,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        %reason,
                        "Transient dialogue failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                GenerationResult::TransientFailure(reason)
                | GenerationResult::PermanentFailure(reason) => {
                    tracing::warn!(
                        session_id = %session_id,
                        npc_id = %npc.id,
                        attempt,
                        %reason,
                        "Dialogue generation gave up, using fallback line"
                    );
                    return Outcome {
                        result: None,
                        attempts: attempt,
                    };
                }
            }
        }
    }
}

struct Outcome {
    result: Option<DialogueReply>,
    attempts: u32,
}
