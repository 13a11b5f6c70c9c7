//! Application state and composition.

use std::sync::Arc;

use crate::config::EngineConfig;
use crate::infrastructure::{
    clock::SystemClock,
    npc_roster::NpcRoster,
    portrait_cache::PortraitCache,
    ports::{ClockPort, ImageGenPort, LlmPort, SessionRepo},
    session_store::InMemorySessionStore,
};
use crate::use_cases::conversation::{
    Backoff, ConversationOrchestrator, DialogueClient, PromptBuilder,
};
use crate::use_cases::portrait::{EnsurePortrait, PortraitClient};

/// Main application state.
///
/// Holds the session store, the roster and the use cases.
/// Passed to HTTP handlers via Axum state.
pub struct App {
    pub sessions: Arc<dyn SessionRepo>,
    pub roster: Arc<NpcRoster>,
    pub use_cases: UseCases,
}

/// Container for all use cases.
pub struct UseCases {
    pub conversation: Arc<ConversationOrchestrator>,
    pub portrait: Arc<EnsurePortrait>,
}

impl App {
    /// Create a new App with all dependencies wired up.
    pub fn new(
        config: &EngineConfig,
        roster: NpcRoster,
        llm: Arc<dyn LlmPort>,
        image_gen: Arc<dyn ImageGenPort>,
    ) -> Self {
        let clock: Arc<dyn ClockPort> = Arc::new(SystemClock::new());
        Self::with_clock(config, roster, llm, image_gen, clock)
    }

    pub fn with_clock(
        config: &EngineConfig,
        roster: NpcRoster,
        llm: Arc<dyn LlmPort>,
        image_gen: Arc<dyn ImageGenPort>,
        clock: Arc<dyn ClockPort>,
    ) -> Self {
        let sessions: Arc<dyn SessionRepo> = Arc::new(InMemorySessionStore::new(clock.clone()));
        let roster = Arc::new(roster);

        let portrait = Arc::new(EnsurePortrait::new(
            PortraitCache::new(&config.portrait.dir, &config.portrait.url_prefix),
            PortraitClient::new(image_gen, config.portrait.size)
                .with_style(config.portrait.style.clone()),
        ));

        let conversation = Arc::new(ConversationOrchestrator::new(
            sessions.clone(),
            roster.clone(),
            PromptBuilder::new(config.dialogue.max_history_turns),
            DialogueClient::new(llm, config.dialogue.temperature, config.dialogue.max_tokens),
            portrait.clone(),
            clock,
            Backoff::new(config.retry.clone()),
        ));

        Self {
            sessions,
            roster,
            use_cases: UseCases {
                conversation,
                portrait,
            },
        }
    }
}
