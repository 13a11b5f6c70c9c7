//! Port traits for infrastructure boundaries.
//!
//! These are the ONLY abstractions in the engine. Everything else is concrete types.
//! Ports exist for:
//! - Dialogue generation (could swap Ollama -> any OpenAI-compatible provider)
//! - Image generation (could swap ComfyUI -> other)
//! - Session state (could swap in-memory -> persistent store)
//! - Clock (for testing)

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hearthtalk_domain::{NpcId, Session, SessionId, Turn};

// =============================================================================
// Error Types
// =============================================================================

/// Raw failure from a dialogue provider, before classification.
#[derive(Debug, Clone, thiserror::Error)]
pub enum LlmError {
    #[error("LLM request timed out")]
    Timeout,
    #[error("LLM connection failed: {0}")]
    Connection(String),
    #[error("LLM returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// Raw failure from an image provider, before classification.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ImageGenError {
    #[error("Image generation timed out")]
    Timeout,
    #[error("Service unavailable: {0}")]
    Unavailable(String),
    #[error("Image service returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("Generation failed: {0}")]
    GenerationFailed(String),
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl LlmError {
    pub(crate) fn from_reqwest(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::Timeout
        } else if error.is_decode() {
            Self::InvalidResponse(error.to_string())
        } else {
            Self::Connection(error.to_string())
        }
    }
}

impl ImageGenError {
    pub(crate) fn from_reqwest(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::Timeout
        } else if error.is_decode() {
            Self::InvalidResponse(error.to_string())
        } else {
            Self::Unavailable(error.to_string())
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SessionStoreError {
    #[error("Session store unavailable: {0}")]
    Unavailable(String),
}

// =============================================================================
// Dialogue Generation Port
// =============================================================================

/// LLM request/response types
#[derive(Debug, Clone, PartialEq)]
pub struct LlmRequest {
    /// The conversation history
    pub messages: Vec<ChatMessage>,
    /// System prompt / context
    pub system_prompt: Option<String>,
    /// Temperature for response generation (0.0 - 2.0)
    pub temperature: Option<f32>,
    /// Maximum tokens to generate
    pub max_tokens: Option<u32>,
}

impl LlmRequest {
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            system_prompt: None,
            temperature: None,
            max_tokens: None,
        }
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn with_temperature(mut self, temp: f32) -> Self {
        self.temperature = Some(temp);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: Option<u32>) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

/// A message in the conversation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }
}

/// Role of a message sender
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageRole {
    User,
    Assistant,
}

/// Response from the LLM
#[derive(Debug, Clone)]
pub struct LlmResponse {
    /// The generated text content
    pub content: String,
    /// Finish reason
    pub finish_reason: FinishReason,
    /// Token usage
    pub usage: Option<TokenUsage>,
}

/// Reason the generation finished
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishReason {
    Stop,
    Length,
    ContentFilter,
    Unknown,
}

/// Token usage information
#[derive(Debug, Clone)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LlmPort: Send + Sync {
    async fn generate(&self, request: LlmRequest) -> Result<LlmResponse, LlmError>;
}

// =============================================================================
// Image Generation Port
// =============================================================================

/// Image generation request/response types
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRequest {
    pub prompt: String,
    pub negative_prompt: String,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone)]
pub struct ImageResult {
    pub image_data: Vec<u8>,
    /// Format reported by the provider (e.g. from the output filename).
    pub format: String,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ImageGenPort: Send + Sync {
    async fn generate(&self, request: ImageRequest) -> Result<ImageResult, ImageGenError>;
    async fn check_health(&self) -> Result<bool, ImageGenError>;
}

// =============================================================================
// Session State Port
// =============================================================================

/// Process-wide mapping from session id to conversation state.
///
/// `append_turns` is the single mutation entry point. Implementations must
/// serialize appends per session and must not let one session's appends
/// block another's.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SessionRepo: Send + Sync {
    /// Return the session, creating an empty one on first reference.
    async fn get_or_create(&self, session_id: &SessionId) -> Result<Session, SessionStoreError>;

    /// Append turns to one thread as a single unit, creating the session
    /// and thread as needed.
    async fn append_turns(
        &self,
        session_id: &SessionId,
        npc_id: &NpcId,
        turns: Vec<Turn>,
    ) -> Result<(), SessionStoreError>;

    /// Ordered history for a thread; empty when absent.
    async fn get_history(&self, session_id: &SessionId, npc_id: &NpcId) -> Vec<Turn>;

    async fn append_turn(
        &self,
        session_id: &SessionId,
        npc_id: &NpcId,
        turn: Turn,
    ) -> Result<(), SessionStoreError> {
        self.append_turns(session_id, npc_id, vec![turn]).await
    }
}

// =============================================================================
// Testability Ports
// =============================================================================

#[cfg_attr(test, mockall::automock)]
pub trait ClockPort: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}
