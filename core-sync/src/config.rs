//! Sync engine configuration.
//!
//! Every policy the engine consults lives here as a typed enum with a
//! sensible default, grouped into per-concern sections the way the pipeline
//! consumes them. Loading these values from files or flags is the host's
//! concern; the engine only ever sees the finished [`SyncConfig`].
//!
//! A few knobs are parsed and carried but not consumed by the pipeline —
//! they are reserved extension points and documented as such on the type.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub use core_manifest::OrderingStrategy;

/// Write mode for the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// Fail if the record already exists remotely
    Create,
    /// Fail if the record does not exist remotely
    Update,
    /// Create or update as needed (default)
    #[default]
    Upsert,
}

/// How gallery images interact with existing remote media.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImagePolicy {
    /// Add new images, keep existing attachments
    Append,
    /// Replace the remote gallery with the manifest's (default)
    #[default]
    Replace,
    /// Skip all media work
    Ignore,
}

/// What to do when a manifest has no slug.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlugNullPolicy {
    /// Derive from the product title (default)
    #[default]
    FromTitle,
    /// Use the lowercased SKU
    FromSku,
    /// Fail the item
    Error,
}

/// Reserved: slug collision handling. Collisions currently surface as
/// provider `Conflict` errors; this knob is carried for a future resolution
/// strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlugCollisionPolicy {
    Fail,
    #[default]
    Suffix,
    Sku,
}

/// What to do when a taxonomy label cannot be resolved remotely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingTermPolicy {
    /// Substitute the configured fallback term (default)
    #[default]
    Fallback,
    /// Fail the item when a taxonomy resolves to zero terms
    Error,
}

/// How media dedup candidates are found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DedupStrategy {
    /// Remote lookup by content checksum stored in attachment meta (default)
    #[default]
    ChecksumMeta,
    /// Remote lookup by original filename
    Filename,
    /// Local media ledger lookup by checksum
    LocalLedger,
}

/// What happens to remote attachments no longer referenced after a replace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrphanPolicy {
    /// Leave the attachment in the remote library (default)
    #[default]
    Detach,
    /// Delete the attachment remotely
    Delete,
}

/// How the featured image is chosen when the manifest does not name one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeaturedPolicy {
    /// Fail the item
    Error,
    /// Use the first gallery entry (default)
    #[default]
    FirstGallery,
    /// Proceed without a featured image
    AllowNull,
}

/// Locking strategy for per-SKU mutual exclusion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockStrategy {
    /// Marker-file advisory lease (default)
    #[default]
    Filesystem,
    /// No locking; `with_lock` is a pass-through and callers must not
    /// assume serialization
    Disabled,
}

/// How malformed execution-ledger lines are handled at load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CorruptionPolicy {
    /// Abort startup. Silently dropping ledger state risks duplicate remote
    /// writes, so this is the default.
    #[default]
    Fail,
    /// Reserved: rebuild is not implemented and is treated as `Fail` at load.
    Rebuild,
    /// Skip malformed lines with a warning; the skipped count is reported.
    IgnoreCorruptLines,
}

/// How unknown manifest schema versions are handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnknownVersionPolicy {
    #[default]
    Fail,
    Warn,
}

/// Degradation policy for media failures inside an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaFailurePolicy {
    /// Skip remaining media, continue the item with a warning (default)
    #[default]
    SkipMedia,
    /// Fail the entire item
    FailSku,
    /// Record a "will retry later" warning. No deferred re-processing
    /// exists in-process; this is warning-only by design.
    RetryLater,
}

/// Reserved: duplicate of the taxonomy missing-term handling at the
/// degradation layer. The pipeline consults [`MissingTermPolicy`] only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaxonomyFailurePolicy {
    #[default]
    UseFallback,
    FailSku,
}

/// Reaction when the backpressure monitor triggers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackpressureStrategy {
    /// Sleep the cooldown, reset counters, proceed (default)
    #[default]
    Pause,
    /// Report the operation as skipped without executing it
    Skip,
    /// Escalate as fatal, terminating the run
    Abort,
}

/// Signal the backpressure monitor watches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackpressureTrigger {
    /// Consecutive error count over the threshold (default)
    #[default]
    ConsecutiveErrors,
    /// Error rate (percent) over the threshold within a 60s window
    ErrorRate,
    /// Average response latency (ms) over the threshold
    ResponseTime,
}

/// Reserved: update-time null-field handling. Not consumed by the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NullPolicy {
    #[default]
    Ignore,
    Clear,
    Error,
}

/// Reserved: update-time missing-field handling. Not consumed by the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingFieldPolicy {
    #[default]
    Ignore,
    Error,
}

/// Reserved: post-created-then-media-failed handling. Not consumed by the
/// pipeline; failures already mark the ledger entry incomplete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PostMediaFailurePolicy {
    Rollback,
    #[default]
    MarkIncomplete,
    AllowPartial,
}

/// Execution section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionConfig {
    pub mode: ExecutionMode,
    pub image_policy: ImagePolicy,
    pub dry_run: bool,
    /// Worker pool size; 1 = strictly sequential on the calling task
    pub concurrency: usize,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            mode: ExecutionMode::default(),
            image_policy: ImagePolicy::default(),
            dry_run: false,
            concurrency: 1,
        }
    }
}

/// Manifest schema section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaConfig {
    pub supported_versions: Vec<String>,
    pub unknown_version_policy: UnknownVersionPolicy,
}

impl Default for SchemaConfig {
    fn default() -> Self {
        Self {
            supported_versions: vec!["1.0".to_string()],
            unknown_version_policy: UnknownVersionPolicy::default(),
        }
    }
}

/// Slug section.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SlugConfig {
    pub null_policy: SlugNullPolicy,
    pub collision_policy: SlugCollisionPolicy,
}

/// Taxonomy section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaxonomyConfig {
    pub missing_term_policy: MissingTermPolicy,
    /// Fallback term slug substituted for unresolved labels
    pub fallback: String,
}

impl Default for TaxonomyConfig {
    fn default() -> Self {
        Self {
            missing_term_policy: MissingTermPolicy::default(),
            fallback: "pending".to_string(),
        }
    }
}

/// Media section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaConfig {
    pub dedup_strategy: DedupStrategy,
    pub featured_policy: FeaturedPolicy,
    pub orphan_policy: OrphanPolicy,
    /// Media ledger snapshot path
    pub ledger_path: PathBuf,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            dedup_strategy: DedupStrategy::default(),
            featured_policy: FeaturedPolicy::default(),
            orphan_policy: OrphanPolicy::default(),
            ledger_path: PathBuf::from(".catsync/media_ledger.json"),
        }
    }
}

/// Lock section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LockConfig {
    pub strategy: LockStrategy,
    /// Acquisition timeout; elapsing yields a `Concurrency` failure
    pub timeout: Duration,
    /// Delete markers owned by processes that no longer exist
    pub cleanup_orphans: bool,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            strategy: LockStrategy::default(),
            timeout: Duration::from_secs(300),
            cleanup_orphans: true,
        }
    }
}

/// Rate limit section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub requests_per_second: u32,
    pub burst: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_second: 5,
            burst: 10,
        }
    }
}

/// Retry section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
        }
    }
}

/// Backpressure section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackpressureConfig {
    pub strategy: BackpressureStrategy,
    pub trigger: BackpressureTrigger,
    /// Meaning depends on the trigger: count, percent, or milliseconds
    pub threshold: u32,
    pub cooldown: Duration,
}

impl Default for BackpressureConfig {
    fn default() -> Self {
        Self {
            strategy: BackpressureStrategy::default(),
            trigger: BackpressureTrigger::default(),
            threshold: 5,
            cooldown: Duration::from_secs(30),
        }
    }
}

/// Degradation section.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DegradationConfig {
    pub media_failure: MediaFailurePolicy,
    /// Reserved, see [`TaxonomyFailurePolicy`]
    pub taxonomy_failure: TaxonomyFailurePolicy,
}

/// Reserved update-time section, see [`NullPolicy`] / [`MissingFieldPolicy`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpdateConfig {
    pub null_policy: NullPolicy,
    pub missing_policy: MissingFieldPolicy,
}

/// Reserved failure-policy section, see [`PostMediaFailurePolicy`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FailurePolicyConfig {
    pub post_then_media: PostMediaFailurePolicy,
}

/// Execution ledger section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Append-only JSONL path; lock markers live in `locks/` beside it
    pub path: PathBuf,
    pub corruption_policy: CorruptionPolicy,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(".catsync/ledger.jsonl"),
            corruption_policy: CorruptionPolicy::default(),
        }
    }
}

/// Ordering section.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrderingConfig {
    pub strategy: OrderingStrategy,
}

/// Filesystem paths section.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Root of the manifest catalog; media file references resolve under
    /// `<catalog_root>/<sku>/`
    pub catalog_root: PathBuf,
}

/// Signals section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalsConfig {
    /// Observe the cancellation token between items
    pub graceful_shutdown: bool,
}

impl Default for SignalsConfig {
    fn default() -> Self {
        Self {
            graceful_shutdown: true,
        }
    }
}

/// Complete engine configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncConfig {
    pub execution: ExecutionConfig,
    pub schema: SchemaConfig,
    pub slug: SlugConfig,
    pub taxonomy: TaxonomyConfig,
    pub media: MediaConfig,
    pub lock: LockConfig,
    pub rate_limit: RateLimitConfig,
    pub retry: RetryConfig,
    pub backpressure: BackpressureConfig,
    pub degradation: DegradationConfig,
    pub update: UpdateConfig,
    pub failure_policy: FailurePolicyConfig,
    pub ledger: LedgerConfig,
    pub ordering: OrderingConfig,
    pub paths: PathsConfig,
    pub signals: SignalsConfig,
}

impl SyncConfig {
    /// Validate parameter ranges, returning every violation.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.execution.concurrency < 1 {
            errors.push("execution.concurrency must be >= 1".to_string());
        }
        if self.lock.timeout < Duration::from_secs(1) {
            errors.push("lock.timeout must be >= 1s".to_string());
        }
        if self.rate_limit.requests_per_second < 1 {
            errors.push("rate_limit.requests_per_second must be >= 1".to_string());
        }
        if self.rate_limit.burst < 1 {
            errors.push("rate_limit.burst must be >= 1".to_string());
        }
        if self.retry.max_attempts < 1 {
            errors.push("retry.max_attempts must be >= 1".to_string());
        }
        if self.schema.supported_versions.is_empty() {
            errors.push("schema.supported_versions must not be empty".to_string());
        }

        errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = SyncConfig::default();
        assert!(config.validate().is_empty());
        assert_eq!(config.execution.mode, ExecutionMode::Upsert);
        assert_eq!(config.execution.concurrency, 1);
        assert!(!config.execution.dry_run);
        assert_eq!(config.ledger.corruption_policy, CorruptionPolicy::Fail);
        assert_eq!(config.taxonomy.fallback, "pending");
        assert_eq!(config.retry.initial_delay, Duration::from_millis(500));
    }

    #[test]
    fn out_of_range_parameters_are_reported_together() {
        let mut config = SyncConfig::default();
        config.execution.concurrency = 0;
        config.retry.max_attempts = 0;
        config.rate_limit.requests_per_second = 0;

        let errors = config.validate();
        assert_eq!(errors.len(), 3);
        assert!(errors.iter().any(|e| e.contains("concurrency")));
    }

    #[test]
    fn policies_round_trip_through_serde() {
        let config = SyncConfig::default();
        let text = serde_json::to_string(&config).unwrap();
        let parsed: SyncConfig = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn policy_names_are_snake_case_on_the_wire() {
        let text = serde_json::to_string(&ExecutionMode::Upsert).unwrap();
        assert_eq!(text, "\"upsert\"");
        let text = serde_json::to_string(&MediaFailurePolicy::SkipMedia).unwrap();
        assert_eq!(text, "\"skip_media\"");
        let text = serde_json::to_string(&CorruptionPolicy::IgnoreCorruptLines).unwrap();
        assert_eq!(text, "\"ignore_corrupt_lines\"");
    }
}
