//! # Catalog Manifest Module
//!
//! Domain model for catalog item manifests.
//!
//! ## Overview
//!
//! This crate owns everything about manifests before the sync engine touches
//! them:
//! - **Model** (`manifest`): the immutable [`ItemManifest`] value with
//!   explicit absence/null semantics
//! - **Fingerprint** (`fingerprint`): canonical SHA-256 content digest used
//!   for no-op detection
//! - **Discovery** (`discovery`): filesystem walking with deterministic
//!   ordering strategies behind the [`ManifestSource`] trait

pub mod discovery;
pub mod fingerprint;
pub mod manifest;

pub use discovery::{FsManifestSource, ManifestSource, OrderingStrategy};
pub use fingerprint::fingerprint;
pub use manifest::{
    Descriptions, GalleryItem, ItemManifest, ManifestMeta, MediaInfo, ProductInfo, PublishStatus,
};
