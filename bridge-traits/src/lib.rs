//! # Sync Bridge Traits
//!
//! Seam abstractions between the sync core and its collaborators.
//!
//! ## Overview
//!
//! This crate defines the contract between the sync engine (`core-sync`) and
//! everything it treats as an external collaborator: the remote catalog API,
//! the system clock, and host logging. Provider crates (e.g.
//! `provider-wordpress`) implement these traits; the core only ever sees the
//! trait objects.
//!
//! ## Traits
//!
//! - [`CatalogProvider`](catalog::CatalogProvider) - Remote CMS operations
//!   (records, taxonomy terms, media, health)
//! - [`Clock`](time::Clock) - Time source for deterministic testing
//! - [`LoggerSink`](time::LoggerSink) - Forward structured logs to the host
//!
//! ## Error Handling
//!
//! All traits use the shared [`SyncError`](error::SyncError) taxonomy.
//! Implementations must classify failures per the table in
//! [`catalog`](catalog): the retryable flag on `Transport` errors is what the
//! core's retry handler keys on, so a wrong classification either hammers a
//! dead endpoint or gives up on a transient blip.
//!
//! ## Thread Safety
//!
//! All traits require `Send + Sync`; implementations are shared across
//! worker tasks behind `Arc`.

pub mod catalog;
pub mod error;
pub mod time;

pub use catalog::{
    CatalogProvider, HealthReport, RecordDraft, RecordPatch, RemoteAsset, RemoteRecord, RemoteTerm,
};
pub use error::{ErrorContext, ErrorReport, Result, SyncError};
pub use time::{Clock, ConsoleLogger, LogEntry, LogLevel, LoggerSink, SystemClock};
