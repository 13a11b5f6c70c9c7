//! Conversation use cases.
//!
//! Handles player-NPC dialogue. For every player message:
//! 1. The NPC's thread history is loaded from the session store
//! 2. A prompt is built from the persona and the most recent turns
//! 3. The dialogue provider is called, retrying transient failures
//! 4. The player turn and the NPC reply are appended as one pair

mod dialogue_client;
mod orchestrator;
mod prompt;
mod retry;

pub use dialogue_client::{classify_llm_error, DialogueClient, DialogueReply};
pub use orchestrator::{ChatError, ChatReply, ConversationOrchestrator, FALLBACK_LINE};
pub use prompt::{DialoguePrompt, PromptBuilder};
pub use retry::Backoff;
