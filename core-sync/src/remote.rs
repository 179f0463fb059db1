//! # Rate-Limited, Retried Remote Gateway
//!
//! Every remote dependency the pipeline resolves goes through here: the
//! retry handler wraps the rate-limited executor, so each attempt pays a
//! token and feeds the backpressure monitor, while only retryable transport
//! failures are re-attempted.
//!
//! Backpressure `Skip` surfaces as a typed error with the
//! [`STAGE_BACKPRESSURE_SKIP`] stage; the pipeline turns it into a
//! skipped-by-backpressure outcome instead of a failure.

use std::path::Path;
use std::sync::Arc;

use bridge_traits::catalog::{
    CatalogProvider, HealthReport, RecordDraft, RecordPatch, RemoteAsset, RemoteRecord, RemoteTerm,
};
use bridge_traits::error::{Result, SyncError};

use crate::rate_limit::{Execution, RateLimitedExecutor};
use crate::retry::RetryHandler;

/// Stage recorded on errors produced by a backpressure skip.
pub const STAGE_BACKPRESSURE_SKIP: &str = "backpressure_skip";

/// Remote catalog access with rate limiting, backpressure, and retry applied.
pub struct RemoteGateway {
    provider: Arc<dyn CatalogProvider>,
    executor: RateLimitedExecutor,
    retry: RetryHandler,
}

impl RemoteGateway {
    pub fn new(
        provider: Arc<dyn CatalogProvider>,
        executor: RateLimitedExecutor,
        retry: RetryHandler,
    ) -> Self {
        Self {
            provider,
            executor,
            retry,
        }
    }

    async fn call<T, F, Fut>(&self, sku: &str, stage: &str, op: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        let execution = self
            .retry
            .execute(sku, stage, || self.executor.execute(sku, &op))
            .await?;

        match execution {
            Execution::Completed(value) => Ok(value),
            Execution::Skipped => Err(SyncError::transport(
                sku,
                STAGE_BACKPRESSURE_SKIP,
                "operation skipped due to backpressure",
            )
            .with_retryable(false)),
        }
    }

    pub async fn find_by_sku(&self, sku: &str) -> Result<Option<RemoteRecord>> {
        self.call(sku, "lookup", || self.provider.find_by_sku(sku))
            .await
    }

    pub async fn create_record(&self, sku: &str, draft: &RecordDraft) -> Result<RemoteRecord> {
        self.call(sku, "create", || self.provider.create_record(sku, draft))
            .await
    }

    pub async fn update_record(
        &self,
        sku: &str,
        record_id: i64,
        patch: &RecordPatch,
    ) -> Result<RemoteRecord> {
        self.call(sku, "update", || {
            self.provider.update_record(sku, record_id, patch)
        })
        .await
    }

    pub async fn resolve_term(
        &self,
        sku: &str,
        taxonomy: &str,
        label: &str,
    ) -> Result<Option<RemoteTerm>> {
        self.call(sku, "taxonomy_resolve", || {
            self.provider.resolve_term(sku, taxonomy, label)
        })
        .await
    }

    pub async fn upload_media(
        &self,
        sku: &str,
        file_path: &Path,
        checksum: Option<&str>,
    ) -> Result<RemoteAsset> {
        self.call(sku, "media_upload", || {
            self.provider.upload_media(sku, file_path, checksum)
        })
        .await
    }

    pub async fn find_media_by_checksum(
        &self,
        sku: &str,
        checksum: &str,
    ) -> Result<Option<RemoteAsset>> {
        self.call(sku, "media_lookup", || {
            self.provider.find_media_by_checksum(sku, checksum)
        })
        .await
    }

    pub async fn find_media_by_filename(
        &self,
        sku: &str,
        filename: &str,
    ) -> Result<Option<RemoteAsset>> {
        self.call(sku, "media_lookup", || {
            self.provider.find_media_by_filename(sku, filename)
        })
        .await
    }

    pub async fn delete_media(&self, sku: &str, asset_id: i64) -> Result<bool> {
        self.call(sku, "media_delete", || {
            self.provider.delete_media(sku, asset_id)
        })
        .await
    }

    pub async fn health_check(&self) -> Result<HealthReport> {
        self.call("", "health_check", || self.provider.health_check())
            .await
    }
}

/// Whether an error is the gateway's backpressure-skip marker.
pub fn is_backpressure_skip(error: &SyncError) -> bool {
    error.stage() == STAGE_BACKPRESSURE_SKIP
}
