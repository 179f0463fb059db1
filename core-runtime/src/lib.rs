//! # Core Runtime
//!
//! Ambient runtime services shared by the sync workspace:
//! - **Logging** (`logging`): `tracing-subscriber` setup with injectable
//!   host sinks
//! - **Events** (`events`): broadcast bus for run progress
//!
//! Nothing in this crate knows about catalogs or manifests; it exists so the
//! engine crates stay free of process-global state.

pub mod error;
pub mod events;
pub mod logging;

pub use error::{Error, Result};
pub use events::{EventBus, SyncEvent};
pub use logging::{init_logging, LogFormat, LoggingConfig};
