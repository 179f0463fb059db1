//! WordPress REST API client implementing [`CatalogProvider`].
//!
//! Transport mechanics only: endpoint shapes, authentication, and the
//! mapping from HTTP status codes onto the shared error taxonomy. Retry,
//! rate limiting, and backpressure live in the sync core — this client
//! performs exactly one attempt per call.
//!
//! ## Error classification
//!
//! - timeout / connection error → `Transport`, retryable
//! - other request errors → `Transport`, not retryable
//! - 5xx, 429 → `Transport`, retryable
//! - 401, 403 → `Auth`
//! - 404 on targeted update → `NotFound`
//! - slug uniqueness rejection on create → `Conflict`

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde_json::{json, Value};
use tracing::{debug, warn};

use bridge_traits::catalog::{
    CatalogProvider, HealthReport, RecordDraft, RecordPatch, RemoteAsset, RemoteRecord, RemoteTerm,
};
use bridge_traits::error::{Result, SyncError};

use crate::types::{WpMedia, WpPost, WpTerm};

const CATALOG_ENDPOINT: &str = "/wp-json/wp/v2/catalog-items";
const MEDIA_ENDPOINT: &str = "/wp-json/wp/v2/media";
const REST_ROOT: &str = "/wp-json/";

/// Taxonomy endpoint probed by the health check.
const HEALTH_TAXONOMY: &str = "item-category";

/// Attachment meta key holding the content checksum for dedup lookups.
const CHECKSUM_META_KEY: &str = "sync_checksum";

const LOOKUP_PAGE_SIZE: u32 = 100;

/// Connection settings for a WordPress site.
#[derive(Debug, Clone)]
pub struct WordPressConfig {
    /// Site root, e.g. `https://cms.example`
    pub base_url: String,
    /// Application-password user
    pub user: String,
    pub app_password: String,
    pub timeout: Duration,
}

impl WordPressConfig {
    pub fn new(
        base_url: impl Into<String>,
        user: impl Into<String>,
        app_password: impl Into<String>,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            user: user.into(),
            app_password: app_password.into(),
            timeout: Duration::from_secs(30),
        }
    }
}

/// Reqwest-backed WordPress catalog provider.
pub struct WordPressClient {
    config: WordPressConfig,
    http: Client,
}

impl WordPressClient {
    pub fn new(config: WordPressConfig) -> Self {
        let http = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(Duration::from_secs(10))
            .pool_max_idle_per_host(10)
            .user_agent("catalog-sync-core/0.1.0")
            .build()
            .expect("failed to build HTTP client");

        Self { config, http }
    }

    /// Reuse an externally configured reqwest client.
    pub fn with_client(config: WordPressConfig, http: Client) -> Self {
        Self { config, http }
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), endpoint)
    }

    fn request(&self, method: Method, endpoint: &str) -> RequestBuilder {
        self.http
            .request(method, self.url(endpoint))
            .basic_auth(&self.config.user, Some(&self.config.app_password))
    }

    /// Send one request, classifying transport failures and the statuses
    /// that are never endpoint-specific (auth, 5xx, 429).
    async fn send(&self, sku: &str, stage: &str, request: RequestBuilder) -> Result<Response> {
        let response = request.send().await.map_err(|e| {
            let retryable = e.is_timeout() || e.is_connect();
            SyncError::transport(sku, stage, format!("request error: {e}"))
                .with_retryable(retryable)
        })?;

        let status = response.status();
        if let Some(error) = classify_status(sku, stage, status) {
            return Err(error);
        }

        Ok(response)
    }

    async fn json_body<T: serde::de::DeserializeOwned>(
        sku: &str,
        stage: &str,
        response: Response,
    ) -> Result<T> {
        response.json::<T>().await.map_err(|e| {
            SyncError::transport(sku, stage, format!("malformed response body: {e}"))
                .with_retryable(false)
        })
    }

    async fn find_page(
        &self,
        sku: &str,
        page: u32,
        use_search_fallback: bool,
    ) -> Result<(Vec<WpPost>, u32)> {
        let mut query: Vec<(&str, String)> = vec![
            ("per_page", LOOKUP_PAGE_SIZE.to_string()),
            ("page", page.to_string()),
            ("status", "any".to_string()),
        ];
        if use_search_fallback {
            query.push(("search", sku.to_string()));
        } else {
            query.push(("meta_key", "sku".to_string()));
            query.push(("meta_value", sku.to_string()));
        }

        let response = self
            .send(
                sku,
                "lookup",
                self.request(Method::GET, CATALOG_ENDPOINT).query(&query),
            )
            .await?;

        // some installs reject meta queries; fall back to search once
        if response.status() == StatusCode::BAD_REQUEST && !use_search_fallback {
            return Box::pin(self.find_page(sku, page, true)).await;
        }

        if response.status() != StatusCode::OK {
            return Ok((Vec::new(), 0));
        }

        let total_pages = response
            .headers()
            .get("X-WP-TotalPages")
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.parse::<u32>().ok())
            .unwrap_or(1);

        let posts: Vec<WpPost> = Self::json_body(sku, "lookup", response).await?;
        Ok((posts, total_pages))
    }

    async fn set_media_meta(&self, sku: &str, media_id: i64, key: &str, value: &str) {
        let endpoint = format!("{MEDIA_ENDPOINT}/{media_id}");
        let payload = json!({ "meta": { key: value } });

        let result = self
            .send(
                sku,
                "media_meta",
                self.request(Method::POST, &endpoint).json(&payload),
            )
            .await;

        match result {
            Ok(response) if response.status() == StatusCode::OK => {}
            Ok(response) => {
                debug!(sku, media_id, status = %response.status(), "media meta not recorded")
            }
            Err(e) => warn!(sku, media_id, error = %e, "failed to record media checksum meta"),
        }
    }
}

#[async_trait]
impl CatalogProvider for WordPressClient {
    async fn find_by_sku(&self, sku: &str) -> Result<Option<RemoteRecord>> {
        let mut page = 1;

        loop {
            let (posts, total_pages) = self.find_page(sku, page, false).await?;
            if posts.is_empty() {
                return Ok(None);
            }

            for post in posts {
                if post.meta.get("sku").and_then(Value::as_str) == Some(sku) {
                    return Ok(Some(post.into_record()));
                }
            }

            if page >= total_pages {
                return Ok(None);
            }
            page += 1;
        }
    }

    async fn create_record(&self, sku: &str, draft: &RecordDraft) -> Result<RemoteRecord> {
        let mut payload = json!({
            "title": draft.title,
            "status": draft.status,
            "meta": draft.meta,
        });
        if let Some(slug) = &draft.slug {
            payload["slug"] = json!(slug);
        }
        for (taxonomy, term_ids) in &draft.taxonomy_terms {
            payload[taxonomy] = json!(term_ids);
        }

        let response = self
            .send(
                sku,
                "create",
                self.request(Method::POST, CATALOG_ENDPOINT).json(&payload),
            )
            .await?;

        match response.status() {
            StatusCode::CREATED => {
                let post: WpPost = Self::json_body(sku, "create", response).await?;
                Ok(post.into_record())
            }
            StatusCode::BAD_REQUEST => {
                let body = response.text().await.unwrap_or_default();
                if body.contains("slug") {
                    Err(SyncError::conflict(
                        sku,
                        "create",
                        format!("slug conflict: {:?}", draft.slug),
                    )
                    .with_status(400)
                    .with_payload(json!({ "response": truncate(&body) })))
                } else {
                    Err(SyncError::transport(sku, "create", "failed to create record")
                        .with_retryable(false)
                        .with_status(400)
                        .with_payload(json!({ "response": truncate(&body) })))
                }
            }
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(
                    SyncError::transport(sku, "create", format!("failed to create record: {status}"))
                        .with_retryable(false)
                        .with_status(status.as_u16())
                        .with_payload(json!({ "response": truncate(&body) })),
                )
            }
        }
    }

    async fn update_record(
        &self,
        sku: &str,
        record_id: i64,
        patch: &RecordPatch,
    ) -> Result<RemoteRecord> {
        if patch.is_empty() {
            return Ok(RemoteRecord {
                id: record_id,
                title: None,
                slug: None,
                status: None,
                featured_media: None,
                meta: Value::Null,
            });
        }

        let mut payload = json!({});
        if let Some(title) = &patch.title {
            payload["title"] = json!(title);
        }
        if let Some(slug) = &patch.slug {
            payload["slug"] = json!(slug);
        }
        if let Some(status) = &patch.status {
            payload["status"] = json!(status);
        }
        if let Some(meta) = &patch.meta {
            payload["meta"] = meta.clone();
        }
        if let Some(terms) = &patch.taxonomy_terms {
            for (taxonomy, term_ids) in terms {
                payload[taxonomy] = json!(term_ids);
            }
        }
        if let Some(featured) = patch.featured_media {
            payload["featured_media"] = json!(featured);
        }

        let endpoint = format!("{CATALOG_ENDPOINT}/{record_id}");
        let response = self
            .send(
                sku,
                "update",
                self.request(Method::POST, &endpoint).json(&payload),
            )
            .await?;

        match response.status() {
            StatusCode::OK => {
                let post: WpPost = Self::json_body(sku, "update", response).await?;
                Ok(post.into_record())
            }
            StatusCode::NOT_FOUND => Err(SyncError::not_found(
                sku,
                "update",
                format!("record not found: {record_id}"),
            )
            .with_status(404)),
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(
                    SyncError::transport(sku, "update", format!("failed to update record: {status}"))
                        .with_retryable(false)
                        .with_status(status.as_u16())
                        .with_payload(json!({
                            "record_id": record_id,
                            "response": truncate(&body),
                        })),
                )
            }
        }
    }

    async fn delete_record(&self, sku: &str, record_id: i64) -> Result<bool> {
        let endpoint = format!("{CATALOG_ENDPOINT}/{record_id}");
        let response = self
            .send(
                sku,
                "delete",
                self.request(Method::DELETE, &endpoint)
                    .query(&[("force", "true")]),
            )
            .await?;

        Ok(matches!(
            response.status(),
            StatusCode::OK | StatusCode::NO_CONTENT
        ))
    }

    async fn resolve_term(
        &self,
        sku: &str,
        taxonomy: &str,
        label: &str,
    ) -> Result<Option<RemoteTerm>> {
        let endpoint = format!("/wp-json/wp/v2/{taxonomy}");
        let response = self
            .send(
                sku,
                "taxonomy_lookup",
                self.request(Method::GET, &endpoint)
                    .query(&[("slug", label)]),
            )
            .await?;

        if response.status() != StatusCode::OK {
            return Ok(None);
        }

        let terms: Vec<WpTerm> = Self::json_body(sku, "taxonomy_lookup", response).await?;
        Ok(terms.into_iter().next().map(WpTerm::into_term))
    }

    async fn upload_media(
        &self,
        sku: &str,
        file_path: &Path,
        checksum: Option<&str>,
    ) -> Result<RemoteAsset> {
        let data = tokio::fs::read(file_path).await.map_err(|e| {
            SyncError::media(
                sku,
                "media_upload",
                format!("cannot read {}: {e}", file_path.display()),
            )
        })?;

        let filename = file_path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();

        let response = self
            .send(
                sku,
                "media_upload",
                self.request(Method::POST, MEDIA_ENDPOINT)
                    .header(
                        "Content-Disposition",
                        format!("attachment; filename=\"{filename}\""),
                    )
                    .header("Content-Type", guess_content_type(&filename))
                    .body(data),
            )
            .await?;

        if response.status() != StatusCode::CREATED {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(
                SyncError::media(sku, "media_upload", format!("failed to upload media: {status}"))
                    .with_status(status.as_u16())
                    .with_payload(json!({
                        "file": filename,
                        "response": truncate(&body),
                    })),
            );
        }

        let media: WpMedia = Self::json_body(sku, "media_upload", response).await?;
        let asset = media.into_asset();

        if let Some(checksum) = checksum {
            self.set_media_meta(sku, asset.id, CHECKSUM_META_KEY, checksum)
                .await;
        }

        Ok(asset)
    }

    async fn find_media_by_checksum(
        &self,
        sku: &str,
        checksum: &str,
    ) -> Result<Option<RemoteAsset>> {
        let response = self
            .send(
                sku,
                "media_lookup",
                self.request(Method::GET, MEDIA_ENDPOINT).query(&[
                    ("meta_key", CHECKSUM_META_KEY),
                    ("meta_value", checksum),
                    ("per_page", "1"),
                ]),
            )
            .await?;

        if response.status() != StatusCode::OK {
            return Ok(None);
        }

        let media: Vec<WpMedia> = Self::json_body(sku, "media_lookup", response).await?;
        Ok(media.into_iter().next().map(WpMedia::into_asset))
    }

    async fn find_media_by_filename(
        &self,
        sku: &str,
        filename: &str,
    ) -> Result<Option<RemoteAsset>> {
        let response = self
            .send(
                sku,
                "media_lookup",
                self.request(Method::GET, MEDIA_ENDPOINT)
                    .query(&[("search", filename), ("per_page", "100")]),
            )
            .await?;

        if response.status() != StatusCode::OK {
            return Ok(None);
        }

        let media: Vec<WpMedia> = Self::json_body(sku, "media_lookup", response).await?;
        Ok(media
            .into_iter()
            .find(|item| {
                item.source_url
                    .as_deref()
                    .is_some_and(|url| url.ends_with(filename))
                    || crate::types::extract_rendered(item.title.as_ref()).as_deref()
                        == Some(filename)
            })
            .map(WpMedia::into_asset))
    }

    async fn delete_media(&self, sku: &str, asset_id: i64) -> Result<bool> {
        let endpoint = format!("{MEDIA_ENDPOINT}/{asset_id}");
        let response = self
            .send(
                sku,
                "media_delete",
                self.request(Method::DELETE, &endpoint)
                    .query(&[("force", "true")]),
            )
            .await?;

        Ok(matches!(
            response.status(),
            StatusCode::OK | StatusCode::NO_CONTENT
        ))
    }

    async fn health_check(&self) -> Result<HealthReport> {
        let mut report = HealthReport::default();

        match self.send("", "health_check", self.request(Method::GET, REST_ROOT)).await {
            Ok(response) => {
                report.reachable = response.status() == StatusCode::OK;
                report.authenticated = true;
            }
            Err(SyncError::Auth { .. }) => {
                report.reachable = true;
                return Ok(report);
            }
            Err(_) => return Ok(report),
        }

        let taxonomy_endpoint = format!("/wp-json/wp/v2/{HEALTH_TAXONOMY}");
        let probes: Vec<(&str, String)> = vec![
            ("catalog-items", CATALOG_ENDPOINT.to_string()),
            (HEALTH_TAXONOMY, taxonomy_endpoint),
            ("media", MEDIA_ENDPOINT.to_string()),
        ];

        let mut endpoints = HashMap::new();
        for (name, endpoint) in probes {
            let ok = match self
                .send("", "health_check", self.request(Method::GET, &endpoint))
                .await
            {
                Ok(response) => matches!(
                    response.status(),
                    StatusCode::OK | StatusCode::BAD_REQUEST
                ),
                Err(_) => false,
            };
            endpoints.insert(name.to_string(), ok);
        }
        report.endpoints = endpoints;

        Ok(report)
    }
}

/// Map statuses that mean the same thing on every endpoint.
fn classify_status(sku: &str, stage: &str, status: StatusCode) -> Option<SyncError> {
    if status.is_server_error() {
        return Some(
            SyncError::transport(sku, stage, format!("server error: {status}"))
                .with_status(status.as_u16()),
        );
    }

    match status {
        StatusCode::TOO_MANY_REQUESTS => Some(
            SyncError::transport(sku, stage, "rate limited (429)").with_status(429),
        ),
        StatusCode::UNAUTHORIZED => Some(
            SyncError::auth(sku, stage, "authentication failed").with_status(401),
        ),
        StatusCode::FORBIDDEN => Some(
            SyncError::auth(sku, stage, "authorization denied").with_status(403),
        ),
        _ => None,
    }
}

fn guess_content_type(filename: &str) -> &'static str {
    let extension = filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();

    match extension.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "svg" => "image/svg+xml",
        "pdf" => "application/pdf",
        _ => "application/octet-stream",
    }
}

fn truncate(body: &str) -> String {
    body.chars().take(500).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_errors_and_429_are_retryable() {
        for code in [500u16, 502, 503, 429] {
            let status = StatusCode::from_u16(code).unwrap();
            let err = classify_status("SKU-1", "lookup", status).expect("classified");
            assert!(err.is_retryable(), "{code} should be retryable");
            assert_eq!(err.context().http_status, Some(code));
        }
    }

    #[test]
    fn auth_statuses_are_terminal() {
        for code in [401u16, 403] {
            let status = StatusCode::from_u16(code).unwrap();
            let err = classify_status("SKU-1", "lookup", status).expect("classified");
            assert_eq!(err.kind(), "auth");
            assert!(!err.is_retryable());
        }
    }

    #[test]
    fn ordinary_statuses_pass_through() {
        for code in [200u16, 201, 204, 400, 404] {
            let status = StatusCode::from_u16(code).unwrap();
            assert!(classify_status("SKU-1", "lookup", status).is_none());
        }
    }

    #[test]
    fn content_type_guessing_covers_common_images() {
        assert_eq!(guess_content_type("photo.JPG"), "image/jpeg");
        assert_eq!(guess_content_type("icon.png"), "image/png");
        assert_eq!(guess_content_type("sheet.pdf"), "application/pdf");
        assert_eq!(guess_content_type("noext"), "application/octet-stream");
    }

    #[test]
    fn truncate_caps_long_bodies() {
        let body = "x".repeat(2000);
        assert_eq!(truncate(&body).len(), 500);
    }
}
