//! Manifest discovery.
//!
//! Walks a catalog root directory laid out as `<root>/<sku>/manifest.json`
//! and yields `(sku, manifest)` pairs in a deterministic, configured order.
//! Discovery order is established once, before any dispatch; under parallel
//! execution it fixes the dispatch order, not the completion order.

use std::path::PathBuf;
use std::time::SystemTime;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{error, warn};

use bridge_traits::error::{Result, SyncError};

use crate::manifest::ItemManifest;

/// How discovered items are ordered before dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderingStrategy {
    /// Ascending by SKU (default)
    #[default]
    SkuAsc,
    /// By manifest file modification time
    Filesystem,
    /// As declared: directory iteration order, unsorted
    ManifestOrder,
}

/// Source of `(sku, manifest)` pairs for a run.
#[async_trait]
pub trait ManifestSource: Send + Sync {
    async fn discover(&self) -> Result<Vec<(String, ItemManifest)>>;
}

/// Filesystem-backed manifest source.
pub struct FsManifestSource {
    catalog_root: PathBuf,
    ordering: OrderingStrategy,
}

impl FsManifestSource {
    pub fn new(catalog_root: impl Into<PathBuf>, ordering: OrderingStrategy) -> Self {
        Self {
            catalog_root: catalog_root.into(),
            ordering,
        }
    }

    pub fn catalog_root(&self) -> &PathBuf {
        &self.catalog_root
    }
}

#[async_trait]
impl ManifestSource for FsManifestSource {
    async fn discover(&self) -> Result<Vec<(String, ItemManifest)>> {
        if !self.catalog_root.exists() {
            return Err(SyncError::validation(
                "",
                "discovery",
                format!("catalog root does not exist: {}", self.catalog_root.display()),
            ));
        }

        let mut candidates: Vec<(String, PathBuf, Option<SystemTime>)> = Vec::new();

        let mut entries = tokio::fs::read_dir(&self.catalog_root).await.map_err(|e| {
            SyncError::validation("", "discovery", format!("cannot read catalog root: {e}"))
        })?;

        while let Some(entry) = entries.next_entry().await.map_err(|e| {
            SyncError::validation("", "discovery", format!("cannot read catalog entry: {e}"))
        })? {
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            let manifest_path = path.join("manifest.json");
            if !manifest_path.exists() {
                continue;
            }
            let sku = entry.file_name().to_string_lossy().into_owned();
            let mtime = tokio::fs::metadata(&manifest_path)
                .await
                .ok()
                .and_then(|m| m.modified().ok());
            candidates.push((sku, manifest_path, mtime));
        }

        match self.ordering {
            OrderingStrategy::SkuAsc => candidates.sort_by(|a, b| a.0.cmp(&b.0)),
            OrderingStrategy::Filesystem => candidates.sort_by_key(|c| c.2),
            OrderingStrategy::ManifestOrder => {}
        }

        let mut manifests = Vec::with_capacity(candidates.len());
        for (sku, manifest_path, _) in candidates {
            let text = match tokio::fs::read_to_string(&manifest_path).await {
                Ok(text) => text,
                Err(e) => {
                    error!(sku = %sku, error = %e, "failed to read manifest");
                    continue;
                }
            };
            let manifest = match ItemManifest::from_json(&text) {
                Ok(manifest) => manifest,
                Err(e) => {
                    error!(sku = %sku, error = %e, "failed to parse manifest");
                    continue;
                }
            };
            if manifest.sku != sku {
                warn!(
                    directory = %sku,
                    manifest_sku = %manifest.sku,
                    "SKU mismatch between directory and manifest"
                );
            }
            manifests.push((sku, manifest));
        }

        Ok(manifests)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::path::Path;

    fn write_manifest(root: &Path, sku: &str, title: &str) {
        let dir = root.join(sku);
        std::fs::create_dir_all(&dir).unwrap();
        let manifest = json!({"sku": sku, "product": {"title": title}});
        std::fs::write(dir.join("manifest.json"), manifest.to_string()).unwrap();
    }

    #[tokio::test]
    async fn discovers_in_sku_order() {
        let tmp = tempfile::tempdir().unwrap();
        write_manifest(tmp.path(), "SKU-B", "B");
        write_manifest(tmp.path(), "SKU-A", "A");
        write_manifest(tmp.path(), "SKU-C", "C");

        let source = FsManifestSource::new(tmp.path(), OrderingStrategy::SkuAsc);
        let found = source.discover().await.unwrap();

        let skus: Vec<&str> = found.iter().map(|(sku, _)| sku.as_str()).collect();
        assert_eq!(skus, vec!["SKU-A", "SKU-B", "SKU-C"]);
    }

    #[tokio::test]
    async fn skips_directories_without_manifest() {
        let tmp = tempfile::tempdir().unwrap();
        write_manifest(tmp.path(), "SKU-A", "A");
        std::fs::create_dir_all(tmp.path().join("not-an-item")).unwrap();

        let source = FsManifestSource::new(tmp.path(), OrderingStrategy::SkuAsc);
        let found = source.discover().await.unwrap();
        assert_eq!(found.len(), 1);
    }

    #[tokio::test]
    async fn skips_malformed_manifests() {
        let tmp = tempfile::tempdir().unwrap();
        write_manifest(tmp.path(), "SKU-A", "A");
        let bad = tmp.path().join("SKU-BAD");
        std::fs::create_dir_all(&bad).unwrap();
        std::fs::write(bad.join("manifest.json"), "{not json").unwrap();

        let source = FsManifestSource::new(tmp.path(), OrderingStrategy::SkuAsc);
        let found = source.discover().await.unwrap();

        assert_eq!(found.len(), 1);
        assert_eq!(found[0].0, "SKU-A");
    }

    #[tokio::test]
    async fn missing_root_is_a_validation_error() {
        let source = FsManifestSource::new("/nonexistent/catalog", OrderingStrategy::SkuAsc);
        let err = source.discover().await.unwrap_err();
        assert_eq!(err.kind(), "validation");
    }
}
