//! Use cases - User story orchestration.
//!
//! Use cases orchestrate across ports and infrastructure to fulfill a
//! player request.

pub mod conversation;
pub mod portrait;
