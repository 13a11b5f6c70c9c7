//! Check-then-generate flow for NPC portraits.

use std::sync::Arc;

use dashmap::DashSet;
use hearthtalk_domain::{GenerationResult, NpcDescriptor, NpcId};

use super::client::PortraitClient;
use crate::infrastructure::portrait_cache::PortraitCache;

/// Outcome of one ensure call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PortraitStatus {
    /// The file already existed.
    Cached { url: String },
    /// Generated and saved by this call.
    Generated { url: String },
    /// Another task in this process is generating it right now.
    Pending,
    /// Generation or save failed; the portrait stays absent.
    Failed { reason: String },
}

impl PortraitStatus {
    /// URL to show the player, when the file exists.
    pub fn url(&self) -> Option<&str> {
        match self {
            Self::Cached { url } | Self::Generated { url } => Some(url),
            Self::Pending | Self::Failed { .. } => None,
        }
    }
}

pub struct EnsurePortrait {
    cache: PortraitCache,
    client: PortraitClient,
    in_flight: Arc<DashSet<NpcId>>,
}

impl EnsurePortrait {
    pub fn new(cache: PortraitCache, client: PortraitClient) -> Self {
        Self {
            cache,
            client,
            in_flight: Arc::new(DashSet::new()),
        }
    }

    pub fn cache(&self) -> &PortraitCache {
        &self.cache
    }

    /// Make sure a portrait exists for `npc`, generating it if missing.
    ///
    /// A failure leaves the file absent, so the next call tries again.
    pub async fn execute(&self, npc: &NpcDescriptor) -> PortraitStatus {
        if self.cache.has(&npc.id).await {
            tracing::debug!(npc_id = %npc.id, "Portrait cache hit");
            return PortraitStatus::Cached {
                url: self.cache.url_for(&npc.id),
            };
        }

        let Some(_guard) = InFlight::claim(&self.in_flight, &npc.id) else {
            tracing::debug!(npc_id = %npc.id, "Portrait generation already in flight");
            return PortraitStatus::Pending;
        };

        // A concurrent task may have finished between the check and the claim.
        if self.cache.has(&npc.id).await {
            return PortraitStatus::Cached {
                url: self.cache.url_for(&npc.id),
            };
        }

        tracing::info!(npc_id = %npc.id, "Portrait cache miss, generating");
        match self.client.generate(npc).await {
            GenerationResult::Success(png) => match self.cache.save(&npc.id, &png).await {
                Ok(_) => PortraitStatus::Generated {
                    url: self.cache.url_for(&npc.id),
                },
                Err(e) => {
                    tracing::error!(npc_id = %npc.id, error = %e, "Failed to save portrait");
                    PortraitStatus::Failed {
                        reason: e.to_string(),
                    }
                }
            },
            GenerationResult::TransientFailure(reason)
            | GenerationResult::PermanentFailure(reason) => PortraitStatus::Failed {
                reason: reason.to_string(),
            },
        }
    }
}

/// Marks an NPC as being generated until dropped, including on cancellation.
struct InFlight {
    set: Arc<DashSet<NpcId>>,
    npc_id: NpcId,
}

impl InFlight {
    fn claim(set: &Arc<DashSet<NpcId>>, npc_id: &NpcId) -> Option<Self> {
        set.insert(npc_id.clone()).then(|| Self {
            set: Arc::clone(set),
            npc_id: npc_id.clone(),
        })
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.set.remove(&self.npc_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::ports::{ImageGenError, ImageResult, MockImageGenPort};
    use crate::use_cases::portrait::client::tests::{guard, png_bytes};
    use std::time::Duration;

    fn ensure_with(images: MockImageGenPort, dir: &std::path::Path) -> EnsurePortrait {
        EnsurePortrait::new(
            PortraitCache::new(dir, "/portraits"),
            PortraitClient::new(Arc::new(images), 64),
        )
    }

    fn png_result() -> Result<ImageResult, ImageGenError> {
        Ok(ImageResult {
            image_data: png_bytes(),
            format: "png".to_string(),
        })
    }

    #[tokio::test]
    async fn generates_once_then_serves_from_cache() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut images = MockImageGenPort::new();
        images
            .expect_generate()
            .times(1)
            .returning(|_| png_result());
        let ensure = ensure_with(images, dir.path());

        let first = ensure.execute(&guard()).await;
        assert_eq!(
            first,
            PortraitStatus::Generated {
                url: "/portraits/guard.png".to_string()
            }
        );
        assert!(ensure.cache().has(&guard().id).await);

        let second = ensure.execute(&guard()).await;
        assert_eq!(second.url(), Some("/portraits/guard.png"));
        assert!(matches!(second, PortraitStatus::Cached { .. }));
    }

    #[tokio::test]
    async fn existing_file_is_never_regenerated() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cache = PortraitCache::new(dir.path(), "/portraits");
        cache.save(&guard().id, &png_bytes()).await.expect("seed");

        let mut images = MockImageGenPort::new();
        images.expect_generate().times(0);
        let ensure = ensure_with(images, dir.path());

        assert!(matches!(
            ensure.execute(&guard()).await,
            PortraitStatus::Cached { .. }
        ));
    }

    #[tokio::test]
    async fn invalid_bytes_never_reach_the_cache() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut images = MockImageGenPort::new();
        images.expect_generate().times(1).returning(|_| {
            Ok(ImageResult {
                image_data: vec![0xde, 0xad, 0x01],
                format: "png".to_string(),
            })
        });
        let ensure = ensure_with(images, dir.path());

        let status = ensure.execute(&guard()).await;
        assert!(matches!(status, PortraitStatus::Failed { .. }));
        assert!(!ensure.cache().has(&guard().id).await);
        let written = std::fs::read_dir(dir.path()).expect("read dir").count();
        assert_eq!(written, 0);
    }

    #[tokio::test]
    async fn failure_is_retried_on_next_call() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut images = MockImageGenPort::new();
        let mut seq = mockall::Sequence::new();
        images
            .expect_generate()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Err(ImageGenError::Timeout));
        images
            .expect_generate()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| png_result());
        let ensure = ensure_with(images, dir.path());

        assert!(matches!(
            ensure.execute(&guard()).await,
            PortraitStatus::Failed { .. }
        ));
        assert!(matches!(
            ensure.execute(&guard()).await,
            PortraitStatus::Generated { .. }
        ));
    }

    struct SlowImages;

    #[async_trait::async_trait]
    impl crate::infrastructure::ports::ImageGenPort for SlowImages {
        async fn generate(
            &self,
            _request: crate::infrastructure::ports::ImageRequest,
        ) -> Result<ImageResult, ImageGenError> {
            tokio::time::sleep(Duration::from_millis(100)).await;
            png_result()
        }

        async fn check_health(&self) -> Result<bool, ImageGenError> {
            Ok(true)
        }
    }

    #[tokio::test]
    async fn concurrent_callers_see_pending() {
        let dir = tempfile::tempdir().expect("tempdir");
        let ensure = Arc::new(EnsurePortrait::new(
            PortraitCache::new(dir.path(), "/portraits"),
            PortraitClient::new(Arc::new(SlowImages), 64),
        ));

        let first = {
            let ensure = Arc::clone(&ensure);
            tokio::spawn(async move { ensure.execute(&guard()).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        let second = ensure.execute(&guard()).await;

        assert_eq!(second, PortraitStatus::Pending);
        assert!(matches!(
            first.await.expect("join"),
            PortraitStatus::Generated { .. }
        ));
        assert!(ensure.in_flight.is_empty());
    }
}
