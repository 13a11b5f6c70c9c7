//! NPC descriptor.

use serde::{Deserialize, Serialize};

use crate::ids::NpcId;
use crate::value_objects::{CharacterName, Description};

/// File extension every cached portrait is stored with.
pub const PORTRAIT_EXTENSION: &str = "png";

/// Static identity of a non-player character.
///
/// Loaded once from game configuration and never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NpcDescriptor {
    pub id: NpcId,
    pub name: CharacterName,
    #[serde(default)]
    pub race: Description,
    #[serde(default)]
    pub occupation: Description,
    #[serde(default)]
    pub description: Description,
    /// Personality / system-prompt text that drives the NPC's voice.
    pub persona: Description,
    #[serde(default)]
    pub short_description: Description,
}

impl NpcDescriptor {
    pub fn new(id: NpcId, name: CharacterName, persona: Description) -> Self {
        Self {
            id,
            name,
            race: Description::empty(),
            occupation: Description::empty(),
            description: Description::empty(),
            persona,
            short_description: Description::empty(),
        }
    }

    pub fn with_race(mut self, race: Description) -> Self {
        self.race = race;
        self
    }

    pub fn with_occupation(mut self, occupation: Description) -> Self {
        self.occupation = occupation;
        self
    }

    pub fn with_description(mut self, description: Description) -> Self {
        self.description = description;
        self
    }

    /// Portrait filename, derived 1:1 from the identifier.
    pub fn portrait_file_name(&self) -> String {
        portrait_file_name(&self.id)
    }

    /// "a {race} {occupation}" with whichever parts are present.
    pub fn kind_phrase(&self) -> String {
        let parts: Vec<&str> = [self.race.as_str(), self.occupation.as_str()]
            .into_iter()
            .filter(|s| !s.is_empty())
            .collect();
        if parts.is_empty() {
            "a stranger".to_string()
        } else {
            format!("a {}", parts.join(" "))
        }
    }
}

/// Portrait filename for an NPC id.
pub fn portrait_file_name(id: &NpcId) -> String {
    format!("{}.{}", id.as_str(), PORTRAIT_EXTENSION)
}
