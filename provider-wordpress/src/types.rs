//! WordPress REST API wire types.

use bridge_traits::catalog::{RemoteAsset, RemoteRecord, RemoteTerm};
use serde::Deserialize;
use serde_json::Value;

/// A post as returned by the catalog endpoint.
#[derive(Debug, Deserialize)]
pub struct WpPost {
    pub id: i64,
    #[serde(default)]
    pub title: Option<Value>,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub featured_media: Option<i64>,
    #[serde(default)]
    pub meta: Value,
}

impl WpPost {
    pub fn into_record(self) -> RemoteRecord {
        RemoteRecord {
            id: self.id,
            title: extract_rendered(self.title.as_ref()),
            slug: self.slug,
            status: self.status,
            featured_media: self.featured_media.filter(|id| *id != 0),
            meta: self.meta,
        }
    }
}

/// A taxonomy term as returned by `/wp-json/wp/v2/<taxonomy>`.
#[derive(Debug, Deserialize)]
pub struct WpTerm {
    pub id: i64,
    pub slug: String,
}

impl WpTerm {
    pub fn into_term(self) -> RemoteTerm {
        RemoteTerm {
            id: self.id,
            slug: self.slug,
        }
    }
}

/// A media attachment as returned by the media endpoint.
#[derive(Debug, Deserialize)]
pub struct WpMedia {
    pub id: i64,
    #[serde(default)]
    pub title: Option<Value>,
    #[serde(default)]
    pub source_url: Option<String>,
}

impl WpMedia {
    pub fn into_asset(self) -> RemoteAsset {
        RemoteAsset {
            id: self.id,
            filename: extract_rendered(self.title.as_ref()),
            source_url: self.source_url,
        }
    }
}

/// WordPress renders text fields as either `"text"` or `{"rendered": "text"}`.
pub fn extract_rendered(value: Option<&Value>) -> Option<String> {
    match value {
        Some(Value::String(text)) => Some(text.clone()),
        Some(Value::Object(map)) => map
            .get("rendered")
            .and_then(Value::as_str)
            .map(str::to_string),
        _ => None,
    }
}
