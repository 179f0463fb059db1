//! # WordPress Provider
//!
//! Implements [`CatalogProvider`](bridge_traits::catalog::CatalogProvider)
//! for the WordPress REST API.
//!
//! ## Overview
//!
//! This crate provides:
//! - Application-password (basic auth) authentication
//! - Paginated SKU lookup with meta-query → search fallback
//! - Record create/update/delete against a catalog post type
//! - Taxonomy term resolution by slug
//! - Media upload with a stored content checksum for dedup lookups
//! - Endpoint health probing
//!
//! Retry, rate limiting, and backpressure are deliberately absent: the sync
//! core owns those and drives this client one attempt at a time.

pub mod client;
pub mod types;

pub use client::{WordPressClient, WordPressConfig};
