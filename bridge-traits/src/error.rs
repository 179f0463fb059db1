//! Typed error model shared across the sync core and provider crates.
//!
//! Every error carries the affected SKU, the pipeline stage it surfaced in,
//! an optional remote HTTP status, a free-form payload snapshot, and a
//! retryable flag. The retry handler consults `is_retryable()`; the pipeline
//! converts errors into serializable [`ErrorReport`]s on item outcomes.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Context attached to every typed error.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ErrorContext {
    /// Affected catalog item identifier (empty when not item-scoped)
    pub sku: String,
    /// Pipeline stage where the error surfaced (e.g. "lookup", "media_upload")
    pub stage: String,
    /// Remote HTTP status code, when the error originated from the API
    pub http_status: Option<u16>,
    /// Snapshot of relevant data for diagnostics
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub payload: Value,
}

impl ErrorContext {
    pub fn new(sku: impl Into<String>, stage: impl Into<String>) -> Self {
        Self {
            sku: sku.into(),
            stage: stage.into(),
            http_status: None,
            payload: Value::Null,
        }
    }
}

/// Typed domain error for catalog synchronization.
///
/// Variants map one-to-one onto the error taxonomy: only `Transport` errors
/// may be retryable, and `RetryExhausted` is a distinct condition from a
/// single terminal failure — it carries the attempt count and the last
/// underlying error.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Manifest or payload validation failed
    #[error("[{}] SKU={}: {message}", .context.stage, .context.sku)]
    Validation { context: ErrorContext, message: String },

    /// Remote uniqueness violation (duplicate SKU or slug)
    #[error("[{}] SKU={}: {message}", .context.stage, .context.sku)]
    Conflict { context: ErrorContext, message: String },

    /// Expected remote resource missing
    #[error("[{}] SKU={}: {message}", .context.stage, .context.sku)]
    NotFound { context: ErrorContext, message: String },

    /// Authentication or authorization failure
    #[error("[{}] SKU={}: {message}", .context.stage, .context.sku)]
    Auth { context: ErrorContext, message: String },

    /// Taxonomy term resolution failed under a strict policy
    #[error("[{}] SKU={}: {message}", .context.stage, .context.sku)]
    Taxonomy { context: ErrorContext, message: String },

    /// Media upload or processing failure
    #[error("[{}] SKU={}: {message}", .context.stage, .context.sku)]
    Media { context: ErrorContext, message: String },

    /// Lock acquisition timeout or concurrency conflict
    #[error("[{}] SKU={}: {message}", .context.stage, .context.sku)]
    Concurrency { context: ErrorContext, message: String },

    /// Ledger read/write or corruption error
    #[error("[{}] SKU={}: {message}", .context.stage, .context.sku)]
    Ledger { context: ErrorContext, message: String },

    /// Network or HTTP transport error
    #[error("[{}] SKU={}: {message}", .context.stage, .context.sku)]
    Transport {
        context: ErrorContext,
        message: String,
        retryable: bool,
    },

    /// All retry attempts exhausted; wraps the last retryable failure
    #[error("[{}] SKU={}: {message} ({attempts} attempts)", .context.stage, .context.sku)]
    RetryExhausted {
        context: ErrorContext,
        message: String,
        attempts: u32,
        #[source]
        last: Box<SyncError>,
    },
}

impl SyncError {
    pub fn validation(sku: impl Into<String>, stage: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation { context: ErrorContext::new(sku, stage), message: message.into() }
    }

    pub fn conflict(sku: impl Into<String>, stage: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Conflict { context: ErrorContext::new(sku, stage), message: message.into() }
    }

    pub fn not_found(sku: impl Into<String>, stage: impl Into<String>, message: impl Into<String>) -> Self {
        Self::NotFound { context: ErrorContext::new(sku, stage), message: message.into() }
    }

    pub fn auth(sku: impl Into<String>, stage: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Auth { context: ErrorContext::new(sku, stage), message: message.into() }
    }

    pub fn taxonomy(sku: impl Into<String>, stage: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Taxonomy { context: ErrorContext::new(sku, stage), message: message.into() }
    }

    pub fn media(sku: impl Into<String>, stage: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Media { context: ErrorContext::new(sku, stage), message: message.into() }
    }

    pub fn concurrency(sku: impl Into<String>, stage: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Concurrency { context: ErrorContext::new(sku, stage), message: message.into() }
    }

    pub fn ledger(sku: impl Into<String>, stage: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Ledger { context: ErrorContext::new(sku, stage), message: message.into() }
    }

    /// Transport errors default to retryable; use [`SyncError::with_retryable`]
    /// to mark a permanent transport failure.
    pub fn transport(sku: impl Into<String>, stage: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Transport {
            context: ErrorContext::new(sku, stage),
            message: message.into(),
            retryable: true,
        }
    }

    pub fn retry_exhausted(
        sku: impl Into<String>,
        stage: impl Into<String>,
        attempts: u32,
        last: SyncError,
    ) -> Self {
        Self::RetryExhausted {
            context: ErrorContext::new(sku, stage),
            message: format!("all {attempts} retry attempts exhausted"),
            attempts,
            last: Box::new(last),
        }
    }

    /// Attach a remote HTTP status code.
    pub fn with_status(mut self, status: u16) -> Self {
        self.context_mut().http_status = Some(status);
        self
    }

    /// Attach a payload snapshot for diagnostics.
    pub fn with_payload(mut self, payload: Value) -> Self {
        self.context_mut().payload = payload;
        self
    }

    /// Override the retryable flag (transport errors only; no-op otherwise).
    pub fn with_retryable(mut self, value: bool) -> Self {
        if let Self::Transport { retryable, .. } = &mut self {
            *retryable = value;
        }
        self
    }

    pub fn context(&self) -> &ErrorContext {
        match self {
            Self::Validation { context, .. }
            | Self::Conflict { context, .. }
            | Self::NotFound { context, .. }
            | Self::Auth { context, .. }
            | Self::Taxonomy { context, .. }
            | Self::Media { context, .. }
            | Self::Concurrency { context, .. }
            | Self::Ledger { context, .. }
            | Self::Transport { context, .. }
            | Self::RetryExhausted { context, .. } => context,
        }
    }

    fn context_mut(&mut self) -> &mut ErrorContext {
        match self {
            Self::Validation { context, .. }
            | Self::Conflict { context, .. }
            | Self::NotFound { context, .. }
            | Self::Auth { context, .. }
            | Self::Taxonomy { context, .. }
            | Self::Media { context, .. }
            | Self::Concurrency { context, .. }
            | Self::Ledger { context, .. }
            | Self::Transport { context, .. }
            | Self::RetryExhausted { context, .. } => context,
        }
    }

    pub fn sku(&self) -> &str {
        &self.context().sku
    }

    pub fn stage(&self) -> &str {
        &self.context().stage
    }

    /// Whether the retry handler may re-attempt the failed operation.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport { retryable: true, .. })
    }

    /// Stable kind name for reports and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "validation",
            Self::Conflict { .. } => "conflict",
            Self::NotFound { .. } => "not_found",
            Self::Auth { .. } => "auth",
            Self::Taxonomy { .. } => "taxonomy",
            Self::Media { .. } => "media",
            Self::Concurrency { .. } => "concurrency",
            Self::Ledger { .. } => "ledger",
            Self::Transport { .. } => "transport",
            Self::RetryExhausted { .. } => "retry_exhausted",
        }
    }

    fn message(&self) -> &str {
        match self {
            Self::Validation { message, .. }
            | Self::Conflict { message, .. }
            | Self::NotFound { message, .. }
            | Self::Auth { message, .. }
            | Self::Taxonomy { message, .. }
            | Self::Media { message, .. }
            | Self::Concurrency { message, .. }
            | Self::Ledger { message, .. }
            | Self::Transport { message, .. }
            | Self::RetryExhausted { message, .. } => message,
        }
    }

    /// Serializable snapshot for outcome records.
    pub fn to_report(&self) -> ErrorReport {
        let context = self.context();
        ErrorReport {
            kind: self.kind().to_string(),
            sku: context.sku.clone(),
            stage: context.stage.clone(),
            message: self.message().to_string(),
            http_status: context.http_status,
            payload: context.payload.clone(),
            retryable: self.is_retryable(),
        }
    }
}

/// Serializable form of a [`SyncError`], embedded in item outcomes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorReport {
    #[serde(rename = "type")]
    pub kind: String,
    pub sku: String,
    pub stage: String,
    pub message: String,
    pub http_status: Option<u16>,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub payload: Value,
    pub retryable: bool,
}

pub type Result<T> = std::result::Result<T, SyncError>;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn transport_is_retryable_by_default() {
        let err = SyncError::transport("SKU-1", "lookup", "connection reset");
        assert!(err.is_retryable());

        let err = err.with_retryable(false);
        assert!(!err.is_retryable());
    }

    #[test]
    fn non_transport_errors_are_never_retryable() {
        let err = SyncError::conflict("SKU-1", "create", "duplicate slug");
        assert!(!err.is_retryable());
        // with_retryable is a no-op on non-transport kinds
        let err = err.with_retryable(true);
        assert!(!err.is_retryable());
    }

    #[test]
    fn report_carries_full_context() {
        let err = SyncError::validation("SKU-9", "validation", "title is required")
            .with_payload(json!({"errors": ["title is required"]}));
        let report = err.to_report();
        assert_eq!(report.kind, "validation");
        assert_eq!(report.sku, "SKU-9");
        assert_eq!(report.stage, "validation");
        assert_eq!(report.http_status, None);
        assert_eq!(report.payload["errors"][0], "title is required");
        assert!(!report.retryable);
    }

    #[test]
    fn retry_exhausted_wraps_last_error() {
        let last = SyncError::transport("SKU-1", "create", "503").with_status(503);
        let err = SyncError::retry_exhausted("SKU-1", "create", 3, last);

        match &err {
            SyncError::RetryExhausted { attempts, last, .. } => {
                assert_eq!(*attempts, 3);
                assert!(last.is_retryable());
            }
            other => panic!("unexpected variant: {other:?}"),
        }
        // exhaustion itself is terminal
        assert!(!err.is_retryable());
        assert_eq!(err.kind(), "retry_exhausted");
    }

    #[test]
    fn display_includes_stage_and_sku() {
        let err = SyncError::not_found("SKU-2", "mode_check", "SKU not found in update mode");
        assert_eq!(
            err.to_string(),
            "[mode_check] SKU=SKU-2: SKU not found in update mode"
        );
    }
}
