//! # Media Handling & Deduplication
//!
//! Uploads manifest media through the gateway with deduplication so a binary
//! that already exists remotely is never uploaded twice.
//!
//! Dedup candidates are found per the configured strategy: remote lookup by
//! stored content checksum, remote lookup by filename, or the local media
//! ledger. Every successful upload is recorded in the media ledger
//! (first-writer-wins per checksum).

use std::path::{Path, PathBuf};
use std::sync::Arc;

use sha2::{Digest, Sha256};
use tokio::io::AsyncReadExt;
use tracing::{debug, info};

use bridge_traits::error::{Result, SyncError};
use core_manifest::{GalleryItem, MediaInfo};

use crate::config::{DedupStrategy, FeaturedPolicy, MediaConfig, OrphanPolicy};
use crate::ledger::MediaLedger;
use crate::remote::RemoteGateway;

const CHECKSUM_BUF_SIZE: usize = 8192;

/// Streamed SHA-256 checksum of a file.
pub async fn compute_checksum(file_path: &Path) -> Result<String> {
    let mut file = tokio::fs::File::open(file_path).await.map_err(|e| {
        SyncError::media(
            "",
            "media_checksum",
            format!("cannot open {}: {e}", file_path.display()),
        )
    })?;

    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; CHECKSUM_BUF_SIZE];
    loop {
        let read = file.read(&mut buf).await.map_err(|e| {
            SyncError::media(
                "",
                "media_checksum",
                format!("cannot read {}: {e}", file_path.display()),
            )
        })?;
        if read == 0 {
            break;
        }
        hasher.update(&buf[..read]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

/// Media upload pipeline for one run.
pub struct MediaHandler {
    config: MediaConfig,
    gateway: Arc<RemoteGateway>,
    ledger: Arc<MediaLedger>,
    catalog_root: PathBuf,
}

impl MediaHandler {
    pub fn new(
        config: MediaConfig,
        gateway: Arc<RemoteGateway>,
        ledger: Arc<MediaLedger>,
        catalog_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            config,
            gateway,
            ledger,
            catalog_root: catalog_root.into(),
        }
    }

    /// Choose the featured image path per the configured policy.
    pub fn resolve_featured(&self, sku: &str, media: &MediaInfo) -> Result<Option<String>> {
        if let Some(featured) = &media.featured {
            return Ok(Some(featured.clone()));
        }

        match self.config.featured_policy {
            FeaturedPolicy::Error => Err(SyncError::media(
                sku,
                "featured_resolve",
                "featured image is required but not provided",
            )),
            FeaturedPolicy::FirstGallery => {
                Ok(media.gallery.first().map(|item| item.file.clone()))
            }
            FeaturedPolicy::AllowNull => Ok(None),
        }
    }

    /// Absolute path of a manifest-relative media file.
    pub fn file_path(&self, sku: &str, relative: &str) -> PathBuf {
        self.catalog_root.join(sku).join(relative)
    }

    /// Find an existing remote asset for this file per the dedup strategy.
    async fn find_existing(
        &self,
        sku: &str,
        file_path: &Path,
        checksum: Option<&str>,
    ) -> Result<Option<i64>> {
        match self.config.dedup_strategy {
            DedupStrategy::ChecksumMeta => {
                let checksum = match checksum {
                    Some(c) => c.to_string(),
                    None => compute_checksum(file_path).await?,
                };
                Ok(self
                    .gateway
                    .find_media_by_checksum(sku, &checksum)
                    .await?
                    .map(|asset| asset.id))
            }
            DedupStrategy::Filename => {
                let filename = file_path
                    .file_name()
                    .map(|name| name.to_string_lossy().into_owned())
                    .unwrap_or_default();
                Ok(self
                    .gateway
                    .find_media_by_filename(sku, &filename)
                    .await?
                    .map(|asset| asset.id))
            }
            DedupStrategy::LocalLedger => {
                let checksum = match checksum {
                    Some(c) => c.to_string(),
                    None => compute_checksum(file_path).await?,
                };
                Ok(self.ledger.asset_id(&checksum).await)
            }
        }
    }

    /// Upload one file with deduplication; returns the remote asset id.
    pub async fn upload(
        &self,
        sku: &str,
        file_path: &Path,
        checksum: Option<&str>,
    ) -> Result<i64> {
        let checksum = match checksum {
            Some(c) => c.to_string(),
            None => compute_checksum(file_path).await?,
        };

        if let Some(existing) = self.find_existing(sku, file_path, Some(&checksum)).await? {
            debug!(sku, file = %file_path.display(), asset_id = existing, "media already exists");
            return Ok(existing);
        }

        let asset = self
            .gateway
            .upload_media(sku, file_path, Some(&checksum))
            .await?;

        let filename = file_path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.ledger.record(&checksum, asset.id, &filename).await;

        info!(sku, file = %filename, asset_id = asset.id, "uploaded media");
        Ok(asset.id)
    }

    /// Upload gallery items in declared order.
    ///
    /// Missing files and per-file media failures degrade to warnings; any
    /// other failure (transport exhaustion, auth) fails the whole call.
    pub async fn process_gallery(
        &self,
        sku: &str,
        gallery: &[GalleryItem],
    ) -> Result<(Vec<i64>, Vec<String>)> {
        let mut asset_ids = Vec::new();
        let mut warnings = Vec::new();

        for item in gallery {
            let file_path = self.file_path(sku, &item.file);

            if !file_path.exists() {
                warnings.push(format!("gallery file not found: {}", item.file));
                continue;
            }

            match self.upload(sku, &file_path, item.checksum.as_deref()).await {
                Ok(asset_id) => asset_ids.push(asset_id),
                Err(e @ SyncError::Media { .. }) => {
                    warnings.push(format!("failed to upload {}: {e}", item.file));
                }
                Err(e) => return Err(e),
            }
        }

        Ok((asset_ids, warnings))
    }

    /// Handle remote attachments orphaned by a gallery replace.
    pub async fn cleanup_orphans(
        &self,
        sku: &str,
        old_ids: &[i64],
        new_ids: &[i64],
    ) -> Vec<String> {
        let mut warnings = Vec::new();

        for orphan in old_ids.iter().filter(|id| !new_ids.contains(id)) {
            match self.config.orphan_policy {
                OrphanPolicy::Delete => {
                    if let Err(e) = self.gateway.delete_media(sku, *orphan).await {
                        warnings.push(format!("failed to delete media {orphan}: {e}"));
                    } else {
                        debug!(sku, asset_id = orphan, "deleted orphan media");
                    }
                }
                OrphanPolicy::Detach => {
                    debug!(sku, asset_id = orphan, "detached orphan media");
                }
            }
        }

        warnings
    }
}
