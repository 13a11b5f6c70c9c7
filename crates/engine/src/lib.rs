//! Hearthtalk Engine library.
//!
//! Session state and generation orchestration for NPC conversations.
//!
//! ## Structure
//!
//! - `use_cases/` - Conversation and portrait flows
//! - `infrastructure/` - External dependency implementations (ports + adapters)
//! - `api/` - HTTP entry points
//! - `app` - Application composition
//! - `config` - Environment configuration

pub mod api;
pub mod app;
pub mod config;
pub mod infrastructure;
pub mod use_cases;

pub use app::App;
pub use config::EngineConfig;
