//! Canonical content fingerprinting for no-op detection.
//!
//! The fingerprint is a SHA-256 hex digest of a canonicalized serialization
//! of the manifest's semantic fields. Two manifests with identical semantic
//! content always produce the same digest regardless of field ordering in the
//! source file; any semantic change produces a different digest. Used purely
//! for change detection, not for security.

use serde_json::{json, Value};
use sha2::{Digest, Sha256};

use crate::manifest::ItemManifest;

/// Compute the deterministic content fingerprint of a manifest.
///
/// Only semantically meaningful fields participate: sku, product
/// title/slug/status, taxonomy (key-sorted, label order preserved),
/// descriptions, attributes (key-sorted, value order preserved), and media
/// references. Provenance metadata (`meta`) is deliberately excluded — a
/// regenerated manifest with a new timestamp but identical content is a
/// no-op.
pub fn fingerprint(manifest: &ItemManifest) -> String {
    let normalized = json!({
        "sku": manifest.sku,
        "product": {
            "title": manifest.product.title,
            "slug": manifest.product.slug,
            "status": manifest.product.status.as_str(),
        },
        "taxonomy": manifest.taxonomy,
        "descriptions": {
            "short": manifest.descriptions.short,
            "technical": manifest.descriptions.technical,
        },
        "attributes": manifest.attributes,
        "media": {
            "featured": manifest.media.featured,
            "gallery": manifest.media.gallery.iter().map(|item| json!({
                "file": item.file,
                "checksum": item.checksum,
            })).collect::<Vec<Value>>(),
        },
    });

    // serde_json's Map is key-sorted, so compact serialization of the value
    // above is already canonical.
    let canonical = normalized.to_string();

    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn manifest(value: Value) -> ItemManifest {
        ItemManifest::from_value(value).unwrap()
    }

    fn base() -> Value {
        json!({
            "sku": "SKU-001",
            "product": {"title": "Widget", "slug": "widget", "status": "publish"},
            "taxonomy": {"category": ["tools"], "brand": ["acme"]},
            "descriptions": {"short": "A widget"},
            "attributes": {"available_colors": ["red", "blue"]},
            "media": {"featured": "main.jpg", "gallery": [{"file": "main.jpg", "checksum": "abc"}]}
        })
    }

    #[test]
    fn stable_across_repeated_calls() {
        let m = manifest(base());
        assert_eq!(fingerprint(&m), fingerprint(&m));
    }

    #[test]
    fn independent_of_source_field_ordering() {
        let reordered = manifest(json!({
            "media": {"gallery": [{"checksum": "abc", "file": "main.jpg"}], "featured": "main.jpg"},
            "attributes": {"available_colors": ["red", "blue"]},
            "descriptions": {"short": "A widget"},
            "taxonomy": {"brand": ["acme"], "category": ["tools"]},
            "product": {"status": "publish", "slug": "widget", "title": "Widget"},
            "sku": "SKU-001"
        }));
        assert_eq!(fingerprint(&manifest(base())), fingerprint(&reordered));
    }

    #[test]
    fn ignores_provenance_metadata() {
        let mut with_meta = base();
        with_meta["meta"] = json!({"schema_version": "1.0", "generated_at": "2026-01-01T00:00:00Z"});
        assert_eq!(fingerprint(&manifest(base())), fingerprint(&manifest(with_meta)));
    }

    #[test]
    fn sensitive_to_title_change() {
        let mut changed = base();
        changed["product"]["title"] = json!("Widget v2");
        assert_ne!(fingerprint(&manifest(base())), fingerprint(&manifest(changed)));
    }

    #[test]
    fn sensitive_to_taxonomy_label_change() {
        let mut changed = base();
        changed["taxonomy"]["category"] = json!(["hardware"]);
        assert_ne!(fingerprint(&manifest(base())), fingerprint(&manifest(changed)));
    }

    #[test]
    fn sensitive_to_gallery_checksum_change() {
        let mut changed = base();
        changed["media"]["gallery"][0]["checksum"] = json!("def");
        assert_ne!(fingerprint(&manifest(base())), fingerprint(&manifest(changed)));
    }

    #[test]
    fn sensitive_to_label_order_within_a_taxonomy() {
        // Label order is semantic (ordered set), key order is not.
        let mut changed = base();
        changed["attributes"]["available_colors"] = json!(["blue", "red"]);
        assert_ne!(fingerprint(&manifest(base())), fingerprint(&manifest(changed)));
    }
}
