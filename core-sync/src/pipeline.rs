//! # Per-Item Pipeline
//!
//! Drives one item end to end:
//! validate → remote lookup → mode check → fingerprint compare →
//! (no-op short-circuit) → taxonomy resolve → slug resolve → media resolve →
//! remote write → ledger record.
//!
//! Any typed error aborts the remaining stages of that item only; it is
//! converted into a failed outcome with a structured error report and a
//! ledger failure record, and never propagates past the item boundary. The
//! two exceptions are run-fatal by contract: backpressure abort (returned as
//! `Err` to the coordinator) and ledger corruption (which prevents startup
//! long before this code runs). Unclassified conditions cannot occur here —
//! everything below the boundary speaks [`SyncError`].

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use serde_json::{json, Value};
use tracing::{debug, info, warn};

use bridge_traits::catalog::{RecordDraft, RecordPatch, RemoteRecord};
use bridge_traits::error::{Result, SyncError};
use core_manifest::{fingerprint, ItemManifest};

use crate::config::{
    ExecutionMode, ImagePolicy, MediaFailurePolicy, MissingTermPolicy, SlugNullPolicy, SyncConfig,
    UnknownVersionPolicy,
};
use crate::ledger::{ExecutionLedger, RecordStatus};
use crate::media::MediaHandler;
use crate::outcome::{ItemOutcome, OutcomeReason, StageTimings, SyncAction};
use crate::rate_limit::STAGE_BACKPRESSURE_ABORT;
use crate::remote::{is_backpressure_skip, RemoteGateway};

/// Processes individual items against the remote catalog.
pub struct ItemPipeline {
    config: SyncConfig,
    gateway: Arc<RemoteGateway>,
    ledger: Arc<ExecutionLedger>,
    media: MediaHandler,
}

impl ItemPipeline {
    pub fn new(
        config: SyncConfig,
        gateway: Arc<RemoteGateway>,
        ledger: Arc<ExecutionLedger>,
        media: MediaHandler,
    ) -> Self {
        Self {
            config,
            gateway,
            ledger,
            media,
        }
    }

    /// Process one item to a terminal outcome.
    ///
    /// `Err` is reserved for run-fatal conditions (backpressure abort);
    /// every per-item failure comes back as a `Failed` outcome.
    pub async fn process(&self, manifest: &ItemManifest) -> Result<ItemOutcome> {
        let sku = manifest.sku.clone();
        let started = Instant::now();
        let mut warnings: Vec<String> = Vec::new();
        let mut timings = StageTimings::default();

        let result = self.run(manifest, &mut warnings, &mut timings).await;
        timings.total_ms = started.elapsed().as_millis() as u64;

        match result {
            Ok(mut outcome) => {
                outcome.warnings = warnings;
                outcome.timings = timings;
                Ok(outcome)
            }
            Err(e) if is_backpressure_skip(&e) => {
                // nothing was written; not a failure, not a no-op
                let mut outcome = ItemOutcome::new(&sku, SyncAction::Skipped)
                    .with_reason(OutcomeReason::Backpressure);
                outcome.warnings = warnings;
                outcome.timings = timings;
                Ok(outcome)
            }
            Err(e) if e.stage() == STAGE_BACKPRESSURE_ABORT => Err(e),
            Err(e) => {
                // the empty fingerprint guarantees the item is never
                // mistaken for a no-op on the next run
                if let Err(ledger_err) = self
                    .ledger
                    .record(&sku, "", SyncAction::Failed, RecordStatus::Error, None, true)
                    .await
                {
                    warn!(sku = %sku, error = %ledger_err, "failed to record failure in ledger");
                }

                let mut outcome = ItemOutcome::new(&sku, SyncAction::Failed)
                    .with_reason(OutcomeReason::Error);
                outcome.errors.push(e.to_report());
                outcome.warnings = warnings;
                outcome.timings = timings;
                Ok(outcome)
            }
        }
    }

    async fn run(
        &self,
        manifest: &ItemManifest,
        warnings: &mut Vec<String>,
        timings: &mut StageTimings,
    ) -> Result<ItemOutcome> {
        let sku = manifest.sku.as_str();

        // Validated
        let validation_errors = self.validate(manifest, warnings);
        if !validation_errors.is_empty() {
            return Err(SyncError::validation(
                sku,
                "validation",
                validation_errors.join("; "),
            )
            .with_payload(json!({ "errors": validation_errors })));
        }

        // Looked-Up-Remote
        let lookup_started = Instant::now();
        let existing = self.gateway.find_by_sku(sku).await?;
        timings.lookup_ms = lookup_started.elapsed().as_millis() as u64;

        // Mode-Checked
        match (self.config.execution.mode, &existing) {
            (ExecutionMode::Create, Some(record)) => {
                return Err(SyncError::conflict(
                    sku,
                    "mode_check",
                    "SKU already exists in create mode",
                )
                .with_payload(json!({ "remote_id": record.id })));
            }
            (ExecutionMode::Update, None) => {
                return Err(SyncError::not_found(
                    sku,
                    "mode_check",
                    "SKU not found in update mode",
                ));
            }
            _ => {}
        }

        // Fingerprint-Compared
        let manifest_hash = fingerprint(manifest);
        let ledger_hash = self.ledger.fingerprint_of(sku).await;

        if let Some(record) = &existing {
            if Some(manifest_hash.as_str()) == ledger_hash.as_deref() {
                debug!(sku, "fingerprint unchanged, skipping");
                let action = if self.config.execution.dry_run {
                    SyncAction::WouldSkip
                } else {
                    SyncAction::Skipped
                };
                return Ok(ItemOutcome::new(sku, action)
                    .with_remote_id(record.id)
                    .with_reason(OutcomeReason::Noop));
            }
        }

        // Taxonomy-Resolved
        let taxonomy_started = Instant::now();
        let taxonomy_terms = self.resolve_taxonomies(manifest, warnings).await?;
        timings.taxonomy_ms = taxonomy_started.elapsed().as_millis() as u64;

        // Slug-Resolved
        let slug = self.resolve_slug(manifest)?;

        // Media-Resolved
        let media_started = Instant::now();
        let (featured_id, gallery_ids) = self
            .resolve_media(manifest, existing.as_ref(), warnings)
            .await?;
        timings.media_ms = media_started.elapsed().as_millis() as u64;

        let meta = self.build_meta(manifest, &gallery_ids);

        // Dry run stops before any mutating write and records nothing.
        if self.config.execution.dry_run {
            return Ok(match &existing {
                Some(record) => {
                    ItemOutcome::new(sku, SyncAction::WouldUpdate).with_remote_id(record.id)
                }
                None => ItemOutcome::new(sku, SyncAction::WouldCreate),
            });
        }

        // Remote-Written
        let post_started = Instant::now();
        let (record, action) = match &existing {
            Some(record) => {
                let patch = RecordPatch {
                    title: Some(manifest.product.title.clone()),
                    slug: slug.clone(),
                    status: Some(manifest.product.status.as_str().to_string()),
                    meta: Some(meta),
                    taxonomy_terms: Some(taxonomy_terms),
                    featured_media: featured_id,
                };
                let updated = self.gateway.update_record(sku, record.id, &patch).await?;
                (updated, SyncAction::Updated)
            }
            None => {
                let draft = RecordDraft {
                    title: manifest.product.title.clone(),
                    slug: slug.clone(),
                    status: manifest.product.status.as_str().to_string(),
                    meta,
                    taxonomy_terms,
                };
                let created = self.gateway.create_record(sku, &draft).await?;

                // The record must exist before a featured asset id can be
                // attached, so creation needs one follow-up update.
                if let Some(featured_id) = featured_id {
                    let patch = RecordPatch {
                        featured_media: Some(featured_id),
                        ..RecordPatch::default()
                    };
                    self.gateway.update_record(sku, created.id, &patch).await?;
                }

                (created, SyncAction::Created)
            }
        };
        timings.post_ms = post_started.elapsed().as_millis() as u64;

        // Ledger-Recorded
        self.ledger
            .record(
                sku,
                &manifest_hash,
                action,
                RecordStatus::Success,
                Some(record.id),
                false,
            )
            .await?;

        info!(sku, action = action.as_str(), remote_id = record.id, "item synchronized");
        Ok(ItemOutcome::new(sku, action).with_remote_id(record.id))
    }

    fn validate(&self, manifest: &ItemManifest, warnings: &mut Vec<String>) -> Vec<String> {
        let mut errors = Vec::new();

        if manifest.sku.is_empty() {
            errors.push("SKU is required".to_string());
        }
        if manifest.product.title.is_empty() {
            errors.push("product title is required".to_string());
        }

        let version = &manifest.meta.schema_version;
        if !self.config.schema.supported_versions.contains(version) {
            match self.config.schema.unknown_version_policy {
                UnknownVersionPolicy::Fail => {
                    errors.push(format!("unsupported schema version: {version}"));
                }
                UnknownVersionPolicy::Warn => {
                    warnings.push(format!("unsupported schema version: {version}"));
                }
            }
        }

        errors
    }

    async fn resolve_taxonomies(
        &self,
        manifest: &ItemManifest,
        warnings: &mut Vec<String>,
    ) -> Result<HashMap<String, Vec<i64>>> {
        let sku = manifest.sku.as_str();
        let mut resolved = HashMap::new();

        for (taxonomy, labels) in &manifest.taxonomy {
            let mut term_ids: Vec<i64> = Vec::new();

            for label in labels {
                match self.gateway.resolve_term(sku, taxonomy, label).await? {
                    Some(term) => term_ids.push(term.id),
                    None => {
                        warnings.push(format!("term not found: {taxonomy}/{label}"));

                        if self.config.taxonomy.missing_term_policy == MissingTermPolicy::Fallback {
                            let fallback = &self.config.taxonomy.fallback;
                            if let Some(term) =
                                self.gateway.resolve_term(sku, taxonomy, fallback).await?
                            {
                                if !term_ids.contains(&term.id) {
                                    term_ids.push(term.id);
                                    warnings.push(format!("using fallback term: {fallback}"));
                                }
                            }
                        }
                    }
                }
            }

            if term_ids.is_empty()
                && self.config.taxonomy.missing_term_policy == MissingTermPolicy::Error
            {
                return Err(SyncError::taxonomy(
                    sku,
                    "taxonomy_resolve",
                    format!("no valid terms found for {taxonomy}"),
                )
                .with_payload(json!({ "labels": labels })));
            }

            if !term_ids.is_empty() {
                resolved.insert(taxonomy.clone(), term_ids);
            }
        }

        Ok(resolved)
    }

    fn resolve_slug(&self, manifest: &ItemManifest) -> Result<Option<String>> {
        if let Some(slug) = &manifest.product.slug {
            return Ok(Some(slug.clone()));
        }

        match self.config.slug.null_policy {
            SlugNullPolicy::FromTitle => Ok(Some(slugify(&manifest.product.title))),
            SlugNullPolicy::FromSku => Ok(Some(manifest.sku.to_lowercase())),
            SlugNullPolicy::Error => Err(SyncError::validation(
                &manifest.sku,
                "slug_resolve",
                "slug is required but not provided",
            )),
        }
    }

    /// Resolve featured and gallery media per the image policy, degrading
    /// per the configured media-failure policy.
    async fn resolve_media(
        &self,
        manifest: &ItemManifest,
        existing: Option<&RemoteRecord>,
        warnings: &mut Vec<String>,
    ) -> Result<(Option<i64>, Vec<i64>)> {
        if self.config.execution.image_policy == ImagePolicy::Ignore {
            return Ok((None, Vec::new()));
        }

        let sku = manifest.sku.as_str();

        match self.resolve_media_inner(manifest, existing, warnings).await {
            Ok(result) => Ok(result),
            Err(e @ SyncError::Media { .. }) => match self.config.degradation.media_failure {
                MediaFailurePolicy::FailSku => Err(e),
                MediaFailurePolicy::SkipMedia => {
                    warnings.push(format!("media skipped: {e}"));
                    Ok((None, Vec::new()))
                }
                MediaFailurePolicy::RetryLater => {
                    // warning-only: nothing re-schedules this in-process
                    warnings.push(format!("media will be retried on a later run: {e}"));
                    Ok((None, Vec::new()))
                }
            },
            Err(e) => {
                debug!(sku, error = %e, "media resolution failed with non-media error");
                Err(e)
            }
        }
    }

    async fn resolve_media_inner(
        &self,
        manifest: &ItemManifest,
        existing: Option<&RemoteRecord>,
        warnings: &mut Vec<String>,
    ) -> Result<(Option<i64>, Vec<i64>)> {
        let sku = manifest.sku.as_str();
        let mut featured_id = None;

        if let Some(featured_path) = self.media.resolve_featured(sku, &manifest.media)? {
            let file_path = self.media.file_path(sku, &featured_path);
            if file_path.exists() {
                let checksum = manifest
                    .media
                    .gallery
                    .iter()
                    .find(|item| item.file == featured_path)
                    .and_then(|item| item.checksum.as_deref());
                featured_id = Some(self.media.upload(sku, &file_path, checksum).await?);
            }
        }

        let mut gallery_ids = Vec::new();
        if !manifest.media.gallery.is_empty() {
            let (ids, media_warnings) =
                self.media.process_gallery(sku, &manifest.media.gallery).await?;
            gallery_ids = ids;
            warnings.extend(media_warnings);
        }

        let previous_ids = existing.map(remote_gallery_ids).unwrap_or_default();
        match self.config.execution.image_policy {
            ImagePolicy::Append => {
                // existing attachments stay, new ones follow
                let mut merged = previous_ids;
                for id in gallery_ids {
                    if !merged.contains(&id) {
                        merged.push(id);
                    }
                }
                gallery_ids = merged;
            }
            ImagePolicy::Replace => {
                let orphan_warnings = self
                    .media
                    .cleanup_orphans(sku, &previous_ids, &gallery_ids)
                    .await;
                warnings.extend(orphan_warnings);
            }
            ImagePolicy::Ignore => unreachable!("handled before media resolution"),
        }

        Ok((featured_id, gallery_ids))
    }

    fn build_meta(&self, manifest: &ItemManifest, gallery_ids: &[i64]) -> Value {
        let mut meta = json!({ "sku": manifest.sku });

        if !manifest.attributes.is_empty() {
            meta["attributes"] = json!(manifest.attributes);
        }
        if let Some(short) = &manifest.descriptions.short {
            meta["short_description"] = json!(short);
        }
        if let Some(technical) = &manifest.descriptions.technical {
            meta["technical_description"] = json!(technical);
        }
        if !gallery_ids.is_empty() {
            meta["gallery_ids"] = json!(gallery_ids);
        }

        meta
    }
}

/// Gallery attachment ids previously recorded on the remote record.
fn remote_gallery_ids(record: &RemoteRecord) -> Vec<i64> {
    record
        .meta
        .get("gallery_ids")
        .and_then(Value::as_array)
        .map(|ids| ids.iter().filter_map(Value::as_i64).collect())
        .unwrap_or_default()
}

/// Reduce text to a URL-safe slug: lowercase alphanumerics joined by dashes.
/// Non-ASCII characters are dropped rather than transliterated.
fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    let mut pending_dash = false;

    for c in text.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c.to_ascii_lowercase());
        } else if c.is_whitespace() || c == '-' || c == '_' {
            pending_dash = true;
        }
    }

    slug
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugify_lowercases_and_dashes() {
        assert_eq!(slugify("Steel Widget Mk II"), "steel-widget-mk-ii");
        assert_eq!(slugify("  spaced   out  "), "spaced-out");
        assert_eq!(slugify("under_scored-name"), "under-scored-name");
    }

    #[test]
    fn slugify_drops_non_ascii_and_punctuation() {
        assert_eq!(slugify("Caf\u{e9}! Deluxe?"), "caf-deluxe");
        assert_eq!(slugify("100% cotton"), "100-cotton");
    }

    #[test]
    fn slugify_of_empty_or_symbolic_text_is_empty() {
        assert_eq!(slugify(""), "");
        assert_eq!(slugify("!!!"), "");
    }

    #[test]
    fn remote_gallery_ids_reads_meta() {
        let record = RemoteRecord {
            id: 1,
            title: None,
            slug: None,
            status: None,
            featured_media: None,
            meta: json!({ "gallery_ids": [3, 5, 8] }),
        };
        assert_eq!(remote_gallery_ids(&record), vec![3, 5, 8]);

        let record = RemoteRecord {
            id: 1,
            title: None,
            slug: None,
            status: None,
            featured_media: None,
            meta: Value::Null,
        };
        assert!(remote_gallery_ids(&record).is_empty());
    }
}
