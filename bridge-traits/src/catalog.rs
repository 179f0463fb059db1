//! Remote Catalog Provider Abstraction
//!
//! Defines the contract between the sync core and a remote content-management
//! system. The core never speaks HTTP itself; it drives a `CatalogProvider`
//! implementation (e.g. `provider-wordpress`) through this trait.
//!
//! ## Error classification
//!
//! Implementations must map transport-level failures onto [`SyncError`]
//! consistently: timeouts, connection errors, 5xx and 429 become retryable
//! `Transport` errors; other transport failures are non-retryable `Transport`;
//! 401/403 become `Auth`; uniqueness violations become `Conflict`; a missing
//! record on targeted update becomes `NotFound`.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;

/// A record that exists in the remote catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteRecord {
    /// Remote identifier assigned by the CMS
    pub id: i64,
    pub title: Option<String>,
    pub slug: Option<String>,
    pub status: Option<String>,
    /// Featured media attachment id, when set
    pub featured_media: Option<i64>,
    /// Raw meta fields as stored remotely
    #[serde(default)]
    pub meta: Value,
}

/// Fields for creating a new remote record.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RecordDraft {
    pub title: String,
    pub slug: Option<String>,
    pub status: String,
    /// Meta fields (attributes, descriptions, gallery attachment ids)
    pub meta: Value,
    /// Taxonomy name → resolved term ids
    pub taxonomy_terms: HashMap<String, Vec<i64>>,
}

/// Partial fields for updating an existing remote record.
///
/// `None` means "leave unchanged". An all-`None` patch is a no-op the
/// provider may short-circuit without a network call.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RecordPatch {
    pub title: Option<String>,
    pub slug: Option<String>,
    pub status: Option<String>,
    pub meta: Option<Value>,
    pub taxonomy_terms: Option<HashMap<String, Vec<i64>>>,
    pub featured_media: Option<i64>,
}

impl RecordPatch {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.slug.is_none()
            && self.status.is_none()
            && self.meta.is_none()
            && self.taxonomy_terms.is_none()
            && self.featured_media.is_none()
    }
}

/// A resolved taxonomy term.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteTerm {
    pub id: i64,
    pub slug: String,
}

/// A media attachment in the remote library.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteAsset {
    pub id: i64,
    pub filename: Option<String>,
    pub source_url: Option<String>,
}

/// Connectivity and permission report for a provider.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    pub authenticated: bool,
    pub reachable: bool,
    /// Endpoint name → reachable
    pub endpoints: HashMap<String, bool>,
}

impl HealthReport {
    pub fn is_healthy(&self) -> bool {
        self.authenticated && self.reachable && self.endpoints.values().all(|ok| *ok)
    }
}

/// Async interface to the remote catalog.
///
/// All methods take the SKU being processed so implementations can attach it
/// to error context; the SKU is not necessarily part of the wire request.
#[async_trait]
pub trait CatalogProvider: Send + Sync {
    /// Look up the remote record holding this SKU, if any.
    async fn find_by_sku(&self, sku: &str) -> Result<Option<RemoteRecord>>;

    /// Create a new record. Fails with `Conflict` on uniqueness violations.
    async fn create_record(&self, sku: &str, draft: &RecordDraft) -> Result<RemoteRecord>;

    /// Apply a partial update to an existing record.
    async fn update_record(
        &self,
        sku: &str,
        record_id: i64,
        patch: &RecordPatch,
    ) -> Result<RemoteRecord>;

    /// Delete a record. Returns whether the remote acknowledged the delete.
    async fn delete_record(&self, sku: &str, record_id: i64) -> Result<bool>;

    /// Resolve a single taxonomy term label to its remote term, if it exists.
    async fn resolve_term(
        &self,
        sku: &str,
        taxonomy: &str,
        label: &str,
    ) -> Result<Option<RemoteTerm>>;

    /// Upload a media file, optionally recording a content checksum remotely
    /// for later dedup lookups.
    async fn upload_media(
        &self,
        sku: &str,
        file_path: &Path,
        checksum: Option<&str>,
    ) -> Result<RemoteAsset>;

    /// Find an existing attachment by recorded content checksum.
    async fn find_media_by_checksum(&self, sku: &str, checksum: &str)
        -> Result<Option<RemoteAsset>>;

    /// Find an existing attachment by original filename.
    async fn find_media_by_filename(&self, sku: &str, filename: &str)
        -> Result<Option<RemoteAsset>>;

    /// Delete a media attachment. Returns whether the remote acknowledged it.
    async fn delete_media(&self, sku: &str, asset_id: i64) -> Result<bool>;

    /// Probe authentication and endpoint reachability.
    async fn health_check(&self) -> Result<HealthReport>;
}
