//! # Catalog Sync Engine
//!
//! Synchronizes a filesystem-resident catalog of product manifests into a
//! remote content-management system — exactly-once in effect per manifest
//! revision, resumable after crashes, and safe under concurrent execution.
//!
//! ## Overview
//!
//! The engine guarantees:
//! - at most one effective remote write per unique content revision across
//!   repeated runs (fingerprint + execution ledger)
//! - safe concurrent processing of independent items with no lost or
//!   duplicated remote writes (per-SKU lock manager)
//! - graceful degradation under partial failure (typed errors caught at the
//!   item boundary, backpressure reactions, media degradation policies)
//! - resumability after abrupt termination (append-only ledger with
//!   incomplete markers)
//!
//! ## Components
//!
//! - **Coordinator** (`coordinator`): discovery, sequential or bounded-pool
//!   execution, teardown contract
//! - **Pipeline** (`pipeline`): the per-item state machine
//! - **Ledgers** (`ledger`): execution (idempotency) and media (dedup)
//! - **Lock Manager** (`lock`): per-SKU advisory marker-file leases
//! - **Rate Limiter & Backpressure** (`rate_limit`): token bucket and
//!   degraded-health detection
//! - **Retry Handler** (`retry`): bounded exponential backoff with jitter
//! - **Media Handler** (`media`): checksum dedup and gallery processing
//! - **Remote Gateway** (`remote`): the rate-limited, retried provider view
//!   the pipeline consumes

pub mod config;
pub mod coordinator;
pub mod ledger;
pub mod lock;
pub mod media;
pub mod outcome;
pub mod pipeline;
pub mod rate_limit;
pub mod remote;
pub mod retry;

pub use bridge_traits::error::{ErrorReport, Result, SyncError};
pub use config::{ExecutionMode, ImagePolicy, SyncConfig};
pub use coordinator::{SyncCoordinator, SyncRunReport};
pub use ledger::{ExecutionLedger, LedgerEntry, MediaLedger, MediaLedgerEntry, RecordStatus};
pub use lock::LockManager;
pub use media::{compute_checksum, MediaHandler};
pub use outcome::{ItemOutcome, OutcomeReason, RunSummary, StageTimings, SyncAction};
pub use pipeline::ItemPipeline;
pub use rate_limit::{BackpressureMonitor, RateLimitedExecutor, TokenBucket};
pub use remote::RemoteGateway;
pub use retry::RetryHandler;
