//! Hearthtalk domain types.
//!
//! Pure data and invariants with no I/O: identifiers, NPC descriptors,
//! conversation threads, sessions and the tagged result produced by the
//! generation clients.

pub mod aggregates;
pub mod entities;
pub mod error;
pub mod ids;
pub mod value_objects;

pub use aggregates::Session;
pub use entities::NpcDescriptor;
pub use error::DomainError;
pub use ids::{NpcId, SessionId};
pub use value_objects::{
    CharacterName, ConversationThread, Description, FailureReason, GenerationResult, Turn,
    TurnRole,
};
