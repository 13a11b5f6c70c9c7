//! Identifier newtypes.
//!
//! Both identifiers arrive as strings from the HTTP layer, so they are
//! validated once at the boundary and carried as newtypes afterwards.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// Maximum length for an opaque session identifier.
const MAX_SESSION_ID_LENGTH: usize = 128;

/// Maximum length for an NPC identifier.
const MAX_NPC_ID_LENGTH: usize = 64;

// ============================================================================
// SessionId
// ============================================================================

/// An opaque player session identifier (non-empty, <=128 chars, trimmed).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SessionId(String);

impl SessionId {
    /// Create a new session id.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvalidId` if the id is blank, too long, or
    /// contains control characters.
    pub fn new(id: impl Into<String>) -> Result<Self, DomainError> {
        let id = id.into();
        let trimmed = id.trim();
        if trimmed.is_empty() {
            return Err(DomainError::invalid_id("Session id cannot be empty"));
        }
        if trimmed.len() > MAX_SESSION_ID_LENGTH {
            return Err(DomainError::invalid_id(format!(
                "Session id cannot exceed {} characters",
                MAX_SESSION_ID_LENGTH
            )));
        }
        if trimmed.chars().any(char::is_control) {
            return Err(DomainError::invalid_id(
                "Session id cannot contain control characters",
            ));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for SessionId {
    type Error = DomainError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<SessionId> for String {
    fn from(id: SessionId) -> String {
        id.0
    }
}

// ============================================================================
// NpcId
// ============================================================================

/// A static NPC identifier.
///
/// Restricted to `[a-z0-9_-]` so it maps 1:1 onto a portrait filename
/// without escaping and can never walk out of the portrait directory.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct NpcId(String);

impl NpcId {
    /// Create a new NPC id.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvalidId` if the id is empty, longer than 64
    /// characters, or contains anything other than lower-case ASCII
    /// letters, digits, `_` and `-`.
    pub fn new(id: impl Into<String>) -> Result<Self, DomainError> {
        let id = id.into();
        if id.is_empty() {
            return Err(DomainError::invalid_id("NPC id cannot be empty"));
        }
        if id.len() > MAX_NPC_ID_LENGTH {
            return Err(DomainError::invalid_id(format!(
                "NPC id cannot exceed {} characters",
                MAX_NPC_ID_LENGTH
            )));
        }
        let valid = id
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'_' || b == b'-');
        if !valid {
            return Err(DomainError::invalid_id(format!(
                "NPC id '{}' may only contain a-z, 0-9, '_' and '-'",
                id
            )));
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NpcId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for NpcId {
    type Error = DomainError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<NpcId> for String {
    fn from(id: NpcId) -> String {
        id.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_id_is_trimmed() {
        let id = SessionId::new("  s1  ").expect("valid session id");
        assert_eq!(id.as_str(), "s1");
    }

    #[test]
    fn session_id_rejects_blank_and_control_chars() {
        assert!(SessionId::new("   ").is_err());
        assert!(SessionId::new("abc\ndef").is_err());
        assert!(SessionId::new("x".repeat(129)).is_err());
    }

    #[test]
    fn npc_id_accepts_slugs() {
        for id in ["guard", "old_miller", "smith-2"] {
            assert!(NpcId::new(id).is_ok(), "{id} should be valid");
        }
    }

    #[test]
    fn npc_id_rejects_path_like_values() {
        for id in ["", "../etc", "Guard", "a/b", "a.png", "tavern keeper"] {
            assert!(NpcId::new(id).is_err(), "{id:?} should be rejected");
        }
    }

    #[test]
    fn npc_id_deserializes_through_validation() {
        let ok: Result<NpcId, _> = serde_json::from_str("\"guard\"");
        assert!(ok.is_ok());
        let bad: Result<NpcId, _> = serde_json::from_str("\"../guard\"");
        assert!(bad.is_err());
    }
}
