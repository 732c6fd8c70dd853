//! WooCommerce REST v3 implementation of [`CatalogApi`]
//!
//! All calls go through the shared rate-limited [`HttpClient`]. Consumer key
//! and secret travel as query parameters. Failures are typed by the
//! [`ErrorClassifier`].

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use crate::application::images::image_basename;
use crate::domain::{
    CatalogApi, CatalogError, CatalogResult, ProductPayload, RemoteCategory, RemoteMedia, RemoteProduct,
    RemoteTag,
};
use crate::infrastructure::config::CatalogConfig;
use crate::infrastructure::error_classifier::ErrorClassifier;
use crate::infrastructure::http_client::HttpClient;

const MEDIA_SEARCH_PAGE_SIZE: u32 = 20;

pub struct WooCommerceClient {
    http: Arc<HttpClient>,
    classifier: ErrorClassifier,
    base_url: String,
    consumer_key: String,
    consumer_secret: String,
    per_page: u32,
    max_pages: u32,
}

impl WooCommerceClient {
    pub fn new(config: &CatalogConfig, http: Arc<HttpClient>, classifier: ErrorClassifier) -> Self {
        Self {
            http,
            classifier,
            base_url: config.base_url.trim().trim_end_matches('/').to_string(),
            consumer_key: config.consumer_key.clone(),
            consumer_secret: config.consumer_secret.clone(),
            per_page: config.per_page.max(1),
            max_pages: config.max_pages.max(1),
        }
    }

    fn wc_url(&self, path: &str) -> String {
        format!("{}/wp-json/wc/v3/{}", self.base_url, path)
    }

    fn wp_url(&self, path: &str) -> String {
        format!("{}/wp-json/wp/v2/{}", self.base_url, path)
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        self.http.request(method, url).query(&[
            ("consumer_key", self.consumer_key.as_str()),
            ("consumer_secret", self.consumer_secret.as_str()),
        ])
    }

    /// Status and body; transport failures are already classified
    async fn send_raw(&self, request: RequestBuilder) -> CatalogResult<(StatusCode, String)> {
        let response = self
            .http
            .send(request)
            .await
            .map_err(|e| self.classifier.classify_transport(&e))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| self.classifier.classify_transport(&e))?;
        Ok((status, body))
    }

    async fn execute<T: DeserializeOwned>(&self, request: RequestBuilder) -> CatalogResult<T> {
        let (status, body) = self.send_raw(request).await?;
        if !status.is_success() {
            return Err(self.classifier.classify_response(status, &body));
        }
        decode(&body)
    }

    /// Walks `per_page` pages until a short page; more than `max_pages` is an error
    async fn list_all<T: DeserializeOwned>(&self, path: &str) -> CatalogResult<Vec<T>> {
        let url = self.wc_url(path);
        let mut all = Vec::new();

        for page in 1..=self.max_pages {
            let request = self.request(Method::GET, &url).query(&[
                ("per_page", self.per_page.to_string()),
                ("page", page.to_string()),
            ]);
            let batch: Vec<T> = self.execute(request).await?;
            let count = batch.len();
            all.extend(batch);
            debug!("📄 {} page {}: {} items", path, page, count);
            if count < self.per_page as usize {
                return Ok(all);
            }
        }

        Err(CatalogError::fatal(format!(
            "{path} listing exceeded {} pages of {}; raise catalog.max_pages",
            self.max_pages, self.per_page
        )))
    }

    /// Creates a taxonomy term, reusing the existing one when the store says it exists
    async fn create_term(&self, path: &str, body: Value) -> CatalogResult<Value> {
        let request = self.request(Method::POST, &self.wc_url(path)).json(&body);
        let (status, response) = self.send_raw(request).await?;
        if status.is_success() {
            return decode(&response);
        }
        if let Some(id) = existing_term_id(&response) {
            info!("♻️ Reusing existing term {} at {}", id, path);
            let mut term = body;
            term["id"] = json!(id);
            return Ok(term);
        }
        Err(self.classifier.classify_response(status, &response))
    }
}

fn decode<T: DeserializeOwned>(body: &str) -> CatalogResult<T> {
    serde_json::from_str(body).map_err(|e| CatalogError::fatal(format!("unexpected response body: {e}")))
}

/// `resource_id` of a `term_exists` error body
fn existing_term_id(body: &str) -> Option<u64> {
    let value: Value = serde_json::from_str(body).ok()?;
    if value.get("code")?.as_str()? != "term_exists" {
        return None;
    }
    let data = value.get("data")?;
    data.get("resource_id")
        .or_else(|| data.get("term_id"))
        .and_then(Value::as_u64)
}

/// WordPress searches titles, which are the file name without extension
fn media_search_term(basename: &str) -> &str {
    basename.rsplit_once('.').map_or(basename, |(stem, _)| stem)
}

#[async_trait]
impl CatalogApi for WooCommerceClient {
    async fn list_all_products(&self) -> CatalogResult<Vec<RemoteProduct>> {
        let products: Vec<RemoteProduct> = self.list_all("products").await?;
        info!("📦 Loaded {} remote products", products.len());
        Ok(products)
    }

    async fn get_product_by_sku(&self, sku: &str) -> CatalogResult<Option<RemoteProduct>> {
        let request = self
            .request(Method::GET, &self.wc_url("products"))
            .query(&[("sku", sku), ("per_page", "1")]);
        let products: Vec<RemoteProduct> = self.execute(request).await?;
        Ok(products.into_iter().next())
    }

    async fn create_product(&self, payload: &ProductPayload) -> CatalogResult<RemoteProduct> {
        let request = self.request(Method::POST, &self.wc_url("products")).json(payload);
        self.execute(request).await
    }

    async fn update_product(&self, id: u64, payload: &ProductPayload) -> CatalogResult<RemoteProduct> {
        let request = self
            .request(Method::PUT, &self.wc_url(&format!("products/{id}")))
            .json(payload);
        self.execute(request).await
    }

    async fn delete_product(&self, id: u64) -> CatalogResult<()> {
        let request = self
            .request(Method::DELETE, &self.wc_url(&format!("products/{id}")))
            .query(&[("force", "true")]);
        let _: Value = self.execute(request).await?;
        Ok(())
    }

    async fn list_all_categories(&self) -> CatalogResult<Vec<RemoteCategory>> {
        self.list_all("products/categories").await
    }

    async fn create_category(&self, name: &str, parent: Option<u64>) -> CatalogResult<RemoteCategory> {
        let mut body = json!({ "name": name });
        if let Some(parent) = parent {
            body["parent"] = json!(parent);
        }
        let term = self.create_term("products/categories", body).await?;
        serde_json::from_value(term).map_err(|e| CatalogError::fatal(format!("unexpected category body: {e}")))
    }

    async fn delete_category(&self, id: u64) -> CatalogResult<()> {
        let request = self
            .request(Method::DELETE, &self.wc_url(&format!("products/categories/{id}")))
            .query(&[("force", "true")]);
        let _: Value = self.execute(request).await?;
        Ok(())
    }

    async fn list_all_tags(&self) -> CatalogResult<Vec<RemoteTag>> {
        self.list_all("products/tags").await
    }

    async fn create_tag(&self, name: &str) -> CatalogResult<RemoteTag> {
        let term = self.create_term("products/tags", json!({ "name": name })).await?;
        serde_json::from_value(term).map_err(|e| CatalogError::fatal(format!("unexpected tag body: {e}")))
    }

    async fn find_media_by_filename(&self, basename: &str) -> CatalogResult<Option<RemoteMedia>> {
        let request = self.request(Method::GET, &self.wp_url("media")).query(&[
            ("search", media_search_term(basename).to_string()),
            ("per_page", MEDIA_SEARCH_PAGE_SIZE.to_string()),
        ]);
        let media: Vec<RemoteMedia> = match self.execute(request).await {
            Ok(media) => media,
            Err(CatalogError::NotFound { .. }) => return Ok(None),
            Err(e) => {
                warn!("⚠️ Media search for {} failed: {}", basename, e);
                return Err(e);
            }
        };
        Ok(media
            .into_iter()
            .find(|m| image_basename(&m.source_url).as_deref() == Some(basename)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::error_classifier::ClassifierConfig;
    use crate::infrastructure::http_client::HttpClientConfig;

    fn client(base_url: &str) -> WooCommerceClient {
        let config = CatalogConfig {
            base_url: base_url.into(),
            consumer_key: "ck".into(),
            consumer_secret: "cs".into(),
            ..Default::default()
        };
        WooCommerceClient::new(
            &config,
            Arc::new(HttpClient::new(HttpClientConfig::default()).unwrap()),
            ErrorClassifier::new(&ClassifierConfig::default()).unwrap(),
        )
    }

    #[tokio::test]
    async fn test_urls_strip_trailing_slash() {
        let client = client("https://shop.example/ ");
        assert_eq!(
            client.wc_url("products/categories"),
            "https://shop.example/wp-json/wc/v3/products/categories"
        );
        assert_eq!(client.wp_url("media"), "https://shop.example/wp-json/wp/v2/media");
    }

    #[tokio::test]
    async fn test_credentials_are_query_parameters() {
        let client = client("https://shop.example");
        let request = client
            .request(Method::GET, &client.wc_url("products"))
            .build()
            .unwrap();
        let query = request.url().query().unwrap_or_default().to_string();
        assert!(query.contains("consumer_key=ck"));
        assert!(query.contains("consumer_secret=cs"));
    }

    #[test]
    fn test_existing_term_id_from_error_body() {
        let body = r#"{"code":"term_exists","message":"A term with the name provided already exists.","data":{"status":400,"resource_id":77}}"#;
        assert_eq!(existing_term_id(body), Some(77));
        assert_eq!(existing_term_id(r#"{"code":"rest_invalid_param"}"#), None);
        assert_eq!(existing_term_id("<html>"), None);
    }

    #[test]
    fn test_media_search_term_drops_extension() {
        assert_eq!(media_search_term("brake-pad.front.jpg"), "brake-pad.front");
        assert_eq!(media_search_term("noext"), "noext");
    }
}
