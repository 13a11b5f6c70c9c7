//! Read-only entities sourced from static game configuration.

mod npc;

pub use npc::{portrait_file_name, NpcDescriptor, PORTRAIT_EXTENSION};
