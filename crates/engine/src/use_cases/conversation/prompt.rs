//! Prompt construction for NPC dialogue.
//!
//! A pure function of the NPC descriptor, the stored history and the new
//! player message. Only the most recent `max_history_turns` turns are
//! rendered; the stored history itself is never touched.

use hearthtalk_domain::{NpcDescriptor, Turn, TurnRole};

use crate::infrastructure::ports::{ChatMessage, LlmRequest};

const STAY_IN_CHARACTER: &str = "Stay in character at all times. Reply only with what you say \
aloud, in plain spoken dialogue of one to three sentences. Never mention being an AI or a model.";

/// Structured prompt for one dialogue turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DialoguePrompt {
    pub system_prompt: String,
    /// Acknowledgement pair sent before an empty history; never stored.
    pub priming: Vec<ChatMessage>,
    /// Rendered (possibly truncated) history, oldest first.
    pub history: Vec<ChatMessage>,
    pub player_message: ChatMessage,
}

impl DialoguePrompt {
    /// All chat messages in send order.
    pub fn messages(&self) -> Vec<ChatMessage> {
        self.priming
            .iter()
            .chain(self.history.iter())
            .chain(std::iter::once(&self.player_message))
            .cloned()
            .collect()
    }

    pub fn to_llm_request(&self, temperature: f32, max_tokens: u32) -> LlmRequest {
        LlmRequest::new(self.messages())
            .with_system_prompt(self.system_prompt.clone())
            .with_temperature(temperature)
            .with_max_tokens(Some(max_tokens))
    }
}

#[derive(Debug, Clone)]
pub struct PromptBuilder {
    max_history_turns: usize,
}

impl PromptBuilder {
    pub fn new(max_history_turns: usize) -> Self {
        Self { max_history_turns }
    }

    pub fn max_history_turns(&self) -> usize {
        self.max_history_turns
    }

    pub fn build(
        &self,
        npc: &NpcDescriptor,
        history: &[Turn],
        player_message: &str,
    ) -> DialoguePrompt {
        let start = history.len().saturating_sub(self.max_history_turns);
        let rendered: Vec<ChatMessage> = history[start..].iter().map(render_turn).collect();

        let priming = if rendered.is_empty() {
            vec![
                ChatMessage::user(format!("Stay in character as {}.", npc.name)),
                ChatMessage::assistant(format!(
                    "Understood. I will now respond as {}.",
                    npc.name
                )),
            ]
        } else {
            Vec::new()
        };

        DialoguePrompt {
            system_prompt: system_prompt(npc),
            priming,
            history: rendered,
            player_message: ChatMessage::user(player_message),
        }
    }
}

fn render_turn(turn: &Turn) -> ChatMessage {
    match turn.role {
        TurnRole::Player => ChatMessage::user(turn.text.clone()),
        TurnRole::Npc => ChatMessage::assistant(turn.text.clone()),
    }
}

fn system_prompt(npc: &NpcDescriptor) -> String {
    let mut prompt = String::new();
    if !npc.persona.is_empty() {
        prompt.push_str(npc.persona.as_str());
        prompt.push_str("\n\n");
    }
    prompt.push_str(&format!("You are {}, {}.", npc.name, npc.kind_phrase()));
    if !npc.description.is_empty() {
        prompt.push(' ');
        prompt.push_str(npc.description.as_str());
    }
    prompt.push_str("\n\n");
    prompt.push_str(STAY_IN_CHARACTER);
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::ports::MessageRole;
    use chrono::Utc;
    use hearthtalk_domain::{CharacterName, Description, NpcId};

    fn guard() -> NpcDescriptor {
        NpcDescriptor::new(
            NpcId::new("guard").expect("id"),
            CharacterName::new("Brom").expect("name"),
            Description::new("You are gruff and suspicious of strangers.").expect("persona"),
        )
        .with_race(Description::new("dwarf").expect("race"))
        .with_occupation(Description::new("gate guard").expect("occupation"))
    }

    fn history(n: usize) -> Vec<Turn> {
        let now = Utc::now();
        (0..n)
            .map(|i| {
                if i % 2 == 0 {
                    Turn::player(format!("p{i}"), now)
                } else {
                    Turn::npc(format!("n{i}"), now)
                }
            })
            .collect()
    }

    #[test]
    fn build_is_deterministic() {
        let builder = PromptBuilder::new(10);
        let turns = history(4);
        assert_eq!(
            builder.build(&guard(), &turns, "hello"),
            builder.build(&guard(), &turns, "hello")
        );
    }

    #[test]
    fn system_prompt_has_persona_then_identity() {
        let prompt = PromptBuilder::new(10).build(&guard(), &[], "hello");
        assert!(prompt
            .system_prompt
            .starts_with("You are gruff and suspicious of strangers."));
        assert!(prompt.system_prompt.contains("You are Brom, a dwarf gate guard."));
    }

    #[test]
    fn history_alternates_roles_and_ends_with_player_message() {
        let prompt = PromptBuilder::new(10).build(&guard(), &history(3), "who goes there?");
        let roles: Vec<MessageRole> = prompt.messages().iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![
                MessageRole::User,
                MessageRole::Assistant,
                MessageRole::User,
                MessageRole::User
            ]
        );
        assert_eq!(prompt.player_message.content, "who goes there?");
        assert!(prompt.priming.is_empty());
    }

    #[test]
    fn truncation_keeps_most_recent_turns_in_order() {
        let turns = history(9);
        let prompt = PromptBuilder::new(4).build(&guard(), &turns, "next");

        let texts: Vec<&str> = prompt.history.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(texts, vec!["n5", "p6", "n7", "p8"]);
        // The caller's history is untouched.
        assert_eq!(turns.len(), 9);
        assert_eq!(turns[0].text, "p0");
    }

    #[test]
    fn empty_history_is_primed() {
        let prompt = PromptBuilder::new(4).build(&guard(), &[], "hello");
        assert_eq!(prompt.priming.len(), 2);
        assert_eq!(
            prompt.priming[1].content,
            "Understood. I will now respond as Brom."
        );
        assert_eq!(prompt.messages().len(), 3);
    }

    #[test]
    fn llm_request_carries_generation_parameters() {
        let request = PromptBuilder::new(4)
            .build(&guard(), &history(2), "hello")
            .to_llm_request(0.7, 128);
        assert_eq!(request.temperature, Some(0.7));
        assert_eq!(request.max_tokens, Some(128));
        assert_eq!(request.messages.len(), 3);
        assert!(request.system_prompt.is_some());
    }
}
