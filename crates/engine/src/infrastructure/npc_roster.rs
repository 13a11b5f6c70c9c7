//! Static NPC roster loaded from game configuration.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use hearthtalk_domain::{NpcDescriptor, NpcId};
use serde::Deserialize;

#[derive(Debug, thiserror::Error)]
pub enum RosterError {
    #[error("Failed to read NPC roster {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid NPC roster: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Duplicate NPC id in roster: {0}")]
    DuplicateId(NpcId),
}

#[derive(Debug, Deserialize)]
struct RosterFile {
    npcs: Vec<NpcDescriptor>,
}

/// Read-only lookup of NPC descriptors by id.
#[derive(Debug, Clone, Default)]
pub struct NpcRoster {
    npcs: BTreeMap<NpcId, NpcDescriptor>,
}

impl NpcRoster {
    pub fn new(npcs: impl IntoIterator<Item = NpcDescriptor>) -> Result<Self, RosterError> {
        let mut map = BTreeMap::new();
        for npc in npcs {
            let id = npc.id.clone();
            if map.insert(id.clone(), npc).is_some() {
                return Err(RosterError::DuplicateId(id));
            }
        }
        Ok(Self { npcs: map })
    }

    /// Parse `{"npcs": [...]}`.
    pub fn from_json(json: &str) -> Result<Self, RosterError> {
        let file: RosterFile = serde_json::from_str(json)?;
        Self::new(file.npcs)
    }

    pub async fn load(path: &Path) -> Result<Self, RosterError> {
        let json = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| RosterError::Read {
                path: path.to_path_buf(),
                source,
            })?;
        let roster = Self::from_json(&json)?;
        tracing::info!(path = %path.display(), npcs = roster.len(), "Loaded NPC roster");
        Ok(roster)
    }

    pub fn get(&self, id: &NpcId) -> Option<&NpcDescriptor> {
        self.npcs.get(id)
    }

    /// All descriptors, sorted by id.
    pub fn list(&self) -> impl Iterator<Item = &NpcDescriptor> {
        self.npcs.values()
    }

    pub fn len(&self) -> usize {
        self.npcs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.npcs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ROSTER: &str = r#"{
        "npcs": [
            {"id": "miller", "name": "Hilde", "race": "human", "occupation": "miller", "persona": "Warm and chatty."},
            {"id": "guard", "name": "Brom", "race": "dwarf", "occupation": "gate guard", "persona": "Gruff, suspicious."}
        ]
    }"#;

    #[test]
    fn parses_and_lists_sorted() {
        let roster = NpcRoster::from_json(ROSTER).expect("roster");
        let ids: Vec<&str> = roster.list().map(|npc| npc.id.as_str()).collect();
        assert_eq!(ids, vec!["guard", "miller"]);

        let guard = roster.get(&NpcId::new("guard").expect("id")).expect("guard");
        assert_eq!(guard.name.as_str(), "Brom");
    }

    #[test]
    fn rejects_duplicates() {
        let json = r#"{"npcs": [
            {"id": "guard", "name": "A", "persona": "x"},
            {"id": "guard", "name": "B", "persona": "y"}
        ]}"#;
        assert!(matches!(
            NpcRoster::from_json(json),
            Err(RosterError::DuplicateId(_))
        ));
    }

    #[test]
    fn rejects_unsafe_ids() {
        let json = r#"{"npcs": [{"id": "../guard", "name": "A", "persona": "x"}]}"#;
        assert!(matches!(NpcRoster::from_json(json), Err(RosterError::Parse(_))));
    }

    #[tokio::test]
    async fn missing_file_is_a_read_error() {
        let temp_dir = tempfile::tempdir().expect("tempdir");
        let result = NpcRoster::load(&temp_dir.path().join("npcs.json")).await;
        assert!(matches!(result, Err(RosterError::Read { .. })));
    }
}
