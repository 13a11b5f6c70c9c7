//! Dialogue generation with outcome classification.
//!
//! Wraps an [`LlmPort`] and turns every provider response or error into a
//! [`GenerationResult`], so the orchestrator never looks at HTTP status
//! codes or error strings.

use std::sync::{Arc, LazyLock};

use hearthtalk_domain::{FailureReason, GenerationResult};
use regex_lite::Regex;
use serde_json::Value;

use super::prompt::DialoguePrompt;
use crate::infrastructure::ports::{FinishReason, LlmError, LlmPort};

/// Fenced JSON metadata block some models append to their reply.
static JSON_BLOCK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```json(.*?)```").expect("valid regex"));

/// Usable NPC reply.
#[derive(Debug, Clone, PartialEq)]
pub struct DialogueReply {
    pub text: String,
    /// Structured side-channel data parsed from a ```json block, if any.
    pub metadata: Option<Value>,
}

#[derive(Clone)]
pub struct DialogueClient {
    llm: Arc<dyn LlmPort>,
    temperature: f32,
    max_tokens: u32,
}

impl DialogueClient {
    pub fn new(llm: Arc<dyn LlmPort>, temperature: f32, max_tokens: u32) -> Self {
        Self {
            llm,
            temperature,
            max_tokens,
        }
    }

    /// One generation attempt. Retrying is the caller's decision.
    pub async fn generate(&self, prompt: &DialoguePrompt) -> GenerationResult<DialogueReply> {
        let request = prompt.to_llm_request(self.temperature, self.max_tokens);

        let response = match self.llm.generate(request).await {
            Ok(response) => response,
            Err(e) => {
                let reason = classify_llm_error(&e);
                tracing::warn!(error = %e, transient = reason.is_transient(), "Dialogue generation failed");
                return GenerationResult::failure(reason);
            }
        };

        if response.finish_reason == FinishReason::ContentFilter {
            return GenerationResult::failure(FailureReason::PolicyRejected(
                "reply blocked by content filter".to_string(),
            ));
        }

        let reply = parse_reply(&response.content);
        if reply.text.is_empty() {
            tracing::warn!("Dialogue provider returned an empty reply");
            return GenerationResult::failure(FailureReason::EmptyResponse);
        }

        if let Some(usage) = &response.usage {
            tracing::debug!(
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                "Dialogue generated"
            );
        }
        GenerationResult::Success(reply)
    }
}

/// Map a raw provider error onto a failure reason.
pub fn classify_llm_error(error: &LlmError) -> FailureReason {
    match error {
        LlmError::Timeout => FailureReason::Timeout,
        LlmError::Connection(msg) => FailureReason::Connection(msg.clone()),
        LlmError::InvalidResponse(msg) => FailureReason::MalformedResponse(msg.clone()),
        LlmError::Status { status, body } => classify_status(*status, body),
    }
}

fn classify_status(status: u16, body: &str) -> FailureReason {
    let detail = format!("HTTP {status}: {body}");
    match status {
        401 | 403 => FailureReason::Unauthorized(detail),
        408 => FailureReason::Timeout,
        429 => FailureReason::RateLimited(detail),
        400..=499 if mentions_policy(body) => FailureReason::PolicyRejected(detail),
        400..=499 => FailureReason::InvalidRequest(detail),
        500..=599 => FailureReason::ServerError(detail),
        _ => FailureReason::MalformedResponse(detail),
    }
}

fn mentions_policy(body: &str) -> bool {
    let lower = body.to_lowercase();
    lower.contains("safety") || lower.contains("content_filter") || lower.contains("content filter")
}

/// Split a raw reply into spoken text and optional JSON metadata.
///
/// Metadata comes from the first block; every block is removed from the
/// spoken text. A first block that fails to parse is left in the text and
/// yields no metadata.
fn parse_reply(raw: &str) -> DialogueReply {
    let Some(caps) = JSON_BLOCK_RE.captures(raw) else {
        return DialogueReply {
            text: raw.trim().to_string(),
            metadata: None,
        };
    };

    let body = caps.get(1).map(|m| m.as_str().trim()).unwrap_or_default();
    match serde_json::from_str::<Value>(body) {
        Ok(metadata) => DialogueReply {
            text: JSON_BLOCK_RE.replace_all(raw, "").trim().to_string(),
            metadata: Some(metadata),
        },
        Err(e) => {
            tracing::debug!(error = %e, "Ignoring malformed reply metadata");
            DialogueReply {
                text: raw.trim().to_string(),
                metadata: None,
            }
        }
    }
}
