//! Item manifest domain model.
//!
//! An [`ItemManifest`] is the immutable, declarative description of one
//! catalog item's desired remote state. Manifests are loaded fresh from
//! external storage on every run and never mutated in place. All fields
//! follow explicit absence/null/empty semantics: a missing optional field
//! deserializes to `None`, never to an empty string.

use std::collections::BTreeMap;

use serde::de::Deserializer;
use serde::{Deserialize, Serialize};

/// Publication status of a catalog item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PublishStatus {
    Publish,
    #[default]
    Draft,
}

impl PublishStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Publish => "publish",
            Self::Draft => "draft",
        }
    }
}

/// Manifest provenance metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestMeta {
    #[serde(default = "default_schema_version")]
    pub schema_version: String,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub generated_at: Option<String>,
}

fn default_schema_version() -> String {
    "1.0".to_string()
}

impl Default for ManifestMeta {
    fn default() -> Self {
        Self {
            schema_version: default_schema_version(),
            source: None,
            generated_at: None,
        }
    }
}

/// Core product fields.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ProductInfo {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub status: PublishStatus,
}

/// Free-text descriptions.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Descriptions {
    #[serde(default)]
    pub short: Option<String>,
    #[serde(default)]
    pub technical: Option<String>,
}

/// One gallery entry: a file reference with an optional content checksum.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GalleryItem {
    pub file: String,
    #[serde(default)]
    pub checksum: Option<String>,
}

/// Media references: an optional featured file plus an ordered gallery.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MediaInfo {
    #[serde(default)]
    pub featured: Option<String>,
    #[serde(default)]
    pub gallery: Vec<GalleryItem>,
}

/// Declarative description of one catalog item.
///
/// `taxonomy` and `attributes` are key-sorted maps (BTreeMap) so key order in
/// the source file never leaks into canonical serialization; the label/value
/// lists inside keep their declared order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemManifest {
    pub sku: String,
    #[serde(default)]
    pub meta: ManifestMeta,
    #[serde(default)]
    pub product: ProductInfo,
    #[serde(default, deserialize_with = "string_list_map")]
    pub taxonomy: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub descriptions: Descriptions,
    #[serde(default, deserialize_with = "string_list_map")]
    pub attributes: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub media: MediaInfo,
}

impl ItemManifest {
    /// Parse a manifest from raw JSON text.
    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }

    /// Parse a manifest from an already-decoded JSON value.
    pub fn from_value(value: serde_json::Value) -> serde_json::Result<Self> {
        serde_json::from_value(value)
    }
}

/// Accepts both `"label"` and `["label", ...]` as map values; a bare string
/// is treated as a single-element list.
fn string_list_map<'de, D>(deserializer: D) -> Result<BTreeMap<String, Vec<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    let raw: BTreeMap<String, OneOrMany> = Deserialize::deserialize(deserializer)?;
    Ok(raw
        .into_iter()
        .map(|(key, value)| {
            let list = match value {
                OneOrMany::One(v) => vec![v],
                OneOrMany::Many(vs) => vs,
            };
            (key, list)
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_minimal_manifest() {
        let manifest = ItemManifest::from_value(json!({
            "sku": "SKU-001",
            "product": {"title": "Widget"}
        }))
        .unwrap();

        assert_eq!(manifest.sku, "SKU-001");
        assert_eq!(manifest.product.title, "Widget");
        assert_eq!(manifest.product.status, PublishStatus::Draft);
        assert_eq!(manifest.meta.schema_version, "1.0");
        assert!(manifest.product.slug.is_none());
        assert!(manifest.taxonomy.is_empty());
        assert!(manifest.media.gallery.is_empty());
    }

    #[test]
    fn parses_full_manifest() {
        let manifest = ItemManifest::from_value(json!({
            "sku": "SKU-002",
            "meta": {"schema_version": "1.0", "source": "erp"},
            "product": {"title": "Gadget", "slug": "gadget", "status": "publish"},
            "taxonomy": {"category": ["tools", "outdoor"]},
            "descriptions": {"short": "A gadget", "technical": "Steel"},
            "attributes": {"available_colors": ["red", "blue"]},
            "media": {
                "featured": "main.jpg",
                "gallery": [
                    {"file": "main.jpg", "checksum": "abc123"},
                    {"file": "side.jpg"}
                ]
            }
        }))
        .unwrap();

        assert_eq!(manifest.product.status, PublishStatus::Publish);
        assert_eq!(manifest.taxonomy["category"], vec!["tools", "outdoor"]);
        assert_eq!(manifest.attributes["available_colors"].len(), 2);
        assert_eq!(manifest.media.featured.as_deref(), Some("main.jpg"));
        assert_eq!(manifest.media.gallery[1].checksum, None);
    }

    #[test]
    fn scalar_taxonomy_value_becomes_single_element_list() {
        let manifest = ItemManifest::from_value(json!({
            "sku": "SKU-003",
            "product": {"title": "Thing"},
            "taxonomy": {"category": "tools"}
        }))
        .unwrap();

        assert_eq!(manifest.taxonomy["category"], vec!["tools"]);
    }

    #[test]
    fn missing_sku_is_a_parse_error() {
        let result = ItemManifest::from_value(json!({
            "product": {"title": "No sku"}
        }));
        assert!(result.is_err());
    }

    #[test]
    fn unknown_status_is_a_parse_error() {
        let result = ItemManifest::from_value(json!({
            "sku": "SKU-004",
            "product": {"title": "X", "status": "archived"}
        }));
        assert!(result.is_err());
    }
}
