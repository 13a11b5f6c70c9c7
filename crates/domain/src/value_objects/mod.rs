//! Value objects - immutable, validated building blocks.

mod conversation;
mod generation;
mod names;

pub use conversation::{ConversationThread, Turn, TurnRole};
pub use generation::{FailureReason, GenerationResult};
pub use names::{CharacterName, Description};
