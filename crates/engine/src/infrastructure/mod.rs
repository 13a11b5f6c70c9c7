//! Infrastructure implementations.
//!
//! Contains port trait implementations for external dependencies.

pub mod clock;
pub mod comfyui;
pub mod npc_roster;
pub mod ollama;
pub mod portrait_cache;
pub mod ports;
pub mod session_store;
