//! Durable on-disk portrait cache.
//!
//! One file per NPC under a single directory, named `{npc_id}.png`. A file
//! that exists is the cache entry; nothing here ever deletes one.

use std::path::{Path, PathBuf};

use hearthtalk_domain::entities::portrait_file_name;
use hearthtalk_domain::NpcId;
use tokio::io::AsyncWriteExt;

#[derive(Debug, thiserror::Error)]
pub enum PortraitCacheError {
    #[error("Portrait I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl PortraitCacheError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// File store keyed by NPC id.
#[derive(Debug, Clone)]
pub struct PortraitCache {
    dir: PathBuf,
    url_prefix: String,
}

impl PortraitCache {
    pub fn new(dir: impl Into<PathBuf>, url_prefix: &str) -> Self {
        Self {
            dir: dir.into(),
            url_prefix: url_prefix.trim_end_matches('/').to_string(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Create the portrait directory if it does not exist yet.
    pub async fn ensure_dir(&self) -> Result<(), PortraitCacheError> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| PortraitCacheError::io(&self.dir, e))
    }

    /// Deterministic location of an NPC's portrait.
    pub fn path_for(&self, npc_id: &NpcId) -> PathBuf {
        self.dir.join(portrait_file_name(npc_id))
    }

    /// Public URL the HTTP layer serves the portrait under.
    pub fn url_for(&self, npc_id: &NpcId) -> String {
        format!("{}/{}", self.url_prefix, portrait_file_name(npc_id))
    }

    /// Whether a non-empty portrait file exists. Never creates anything.
    pub async fn has(&self, npc_id: &NpcId) -> bool {
        match tokio::fs::metadata(self.path_for(npc_id)).await {
            Ok(meta) => meta.is_file() && meta.len() > 0,
            Err(_) => false,
        }
    }

    /// Write the portrait atomically: the bytes go to a temporary file in
    /// the same directory, which is then renamed over the final path, so a
    /// reader sees either no file or the complete one.
    pub async fn save(&self, npc_id: &NpcId, image_bytes: &[u8]) -> Result<PathBuf, PortraitCacheError> {
        self.ensure_dir().await?;

        let final_path = self.path_for(npc_id);
        let temp_path = self
            .dir
            .join(format!(".{}.{}.tmp", npc_id.as_str(), uuid::Uuid::new_v4()));

        if let Err(e) = write_synced(&temp_path, image_bytes).await {
            let _ = tokio::fs::remove_file(&temp_path).await;
            return Err(e);
        }

        if let Err(e) = tokio::fs::rename(&temp_path, &final_path).await {
            let _ = tokio::fs::remove_file(&temp_path).await;
            return Err(PortraitCacheError::io(&final_path, e));
        }

        tracing::info!(
            npc_id = %npc_id,
            path = %final_path.display(),
            bytes = image_bytes.len(),
            "Saved portrait"
        );
        Ok(final_path)
    }
}

async fn write_synced(path: &Path, bytes: &[u8]) -> Result<(), PortraitCacheError> {
    let mut file = tokio::fs::File::create(path)
        .await
        .map_err(|e| PortraitCacheError::io(path, e))?;
    file.write_all(bytes)
        .await
        .map_err(|e| PortraitCacheError::io(path, e))?;
    file.sync_all()
        .await
        .map_err(|e| PortraitCacheError::io(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn npc(id: &str) -> NpcId {
        NpcId::new(id).expect("npc id")
    }

    #[test]
    fn path_and_url_are_derived_from_id() {
        let cache = PortraitCache::new("/data/portraits", "/portraits/");
        assert_eq!(
            cache.path_for(&npc("guard")),
            PathBuf::from("/data/portraits/guard.png")
        );
        assert_eq!(cache.url_for(&npc("guard")), "/portraits/guard.png");
    }

    #[tokio::test]
    async fn has_is_false_until_saved() {
        let temp_dir = tempfile::tempdir().expect("tempdir");
        let cache = PortraitCache::new(temp_dir.path().join("portraits"), "/portraits");

        assert!(!cache.has(&npc("guard")).await);
        // Checking must not create the directory.
        assert!(!temp_dir.path().join("portraits").exists());

        let path = cache.save(&npc("guard"), b"image-bytes").await.expect("save");

        assert!(cache.has(&npc("guard")).await);
        assert_eq!(std::fs::read(path).expect("read"), b"image-bytes");
    }

    #[tokio::test]
    async fn save_leaves_no_temporary_files() {
        let temp_dir = tempfile::tempdir().expect("tempdir");
        let cache = PortraitCache::new(temp_dir.path(), "/portraits");

        cache.save(&npc("guard"), b"first").await.expect("save");
        cache.save(&npc("guard"), b"second").await.expect("overwrite");

        let names: Vec<String> = std::fs::read_dir(temp_dir.path())
            .expect("read_dir")
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["guard.png".to_string()]);
        assert_eq!(
            std::fs::read(cache.path_for(&npc("guard"))).expect("read"),
            b"second"
        );
    }

    #[tokio::test]
    async fn empty_file_is_not_a_cache_hit() {
        let temp_dir = tempfile::tempdir().expect("tempdir");
        let cache = PortraitCache::new(temp_dir.path(), "/portraits");
        std::fs::write(cache.path_for(&npc("guard")), b"").expect("write");

        assert!(!cache.has(&npc("guard")).await);
    }
}
