use super::CatalogService;
use crate::config::Credentials;
use crate::models::{AssetId, CatalogItem, ItemId, ItemUpdate};
use crate::{Error, Result};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;

const PRODUCTS_PATH: &str = "/wp-json/wc/v3/products";
const MEDIA_PATH: &str = "/wp-json/wp/v2/media";

/// WooCommerce REST client: products through `wc/v3`, media through `wp/v2`.
pub struct WooCommerceClient {
    client: Client,
    base_url: String,
    consumer_key: String,
    consumer_secret: String,
    wp_username: String,
    wp_app_password: String,
    timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct MediaResponse {
    id: AssetId,
}

impl WooCommerceClient {
    pub fn new(credentials: &Credentials) -> Self {
        Self::new_with_client(credentials, Client::new())
    }

    pub fn new_with_client(credentials: &Credentials, client: Client) -> Self {
        Self {
            client,
            base_url: credentials.store_url.trim_end_matches('/').to_string(),
            consumer_key: credentials.consumer_key.clone(),
            consumer_secret: credentials.consumer_secret.clone(),
            wp_username: credentials.wp_username.clone(),
            wp_app_password: credentials.wp_app_password.clone(),
            timeout: credentials.http_timeout,
        }
    }

    #[cfg(test)]
    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url;
        self
    }

    fn products(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .timeout(self.timeout)
            .basic_auth(&self.consumer_key, Some(&self.consumer_secret))
    }

    fn media(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .timeout(self.timeout)
            .basic_auth(&self.wp_username, Some(&self.wp_app_password))
    }

    async fn send(&self, request: RequestBuilder, context: &str) -> Result<Response> {
        let response = request.send().await.map_err(|e| {
            tracing::error!("Failed to send {} request: {}", context, e);
            e
        })?;

        if response.status().is_success() {
            return Ok(response);
        }

        let status = response.status();
        let error_text = response.text().await.unwrap_or_default();
        tracing::error!("{} failed (status {}): {}", context, status, error_text);

        if status == StatusCode::NOT_FOUND {
            return Err(Error::NotFound(format!("{}: {}", context, error_text)));
        }
        Err(Error::RemoteApi(format!(
            "{} failed (status {}): {}",
            context, status, error_text
        )))
    }

    async fn read_json<T: DeserializeOwned>(response: Response, context: &str) -> Result<T> {
        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|e| {
            tracing::error!("Failed to parse {} response: {}\nBody: {}", context, e, body);
            Error::RemoteApi(format!("Failed to parse {} response: {}", context, e))
        })
    }
}

#[async_trait]
impl CatalogService for WooCommerceClient {
    async fn get_item(&self, id: ItemId) -> Result<CatalogItem> {
        let url = format!("{}{}/{}", self.base_url, PRODUCTS_PATH, id);
        let context = format!("get product {}", id);
        let response = self.send(self.products(self.client.get(&url)), &context).await?;
        Self::read_json(response, &context).await
    }

    async fn list_items(&self, page: u32, page_size: u32) -> Result<Vec<CatalogItem>> {
        let url = format!("{}{}", self.base_url, PRODUCTS_PATH);
        let request = self
            .products(self.client.get(&url))
            .query(&[("per_page", page_size), ("page", page)]);
        let context = format!("list products page {}", page);
        let response = self.send(request, &context).await?;
        Self::read_json(response, &context).await
    }

    async fn search_items(&self, query: &str) -> Result<Vec<CatalogItem>> {
        let url = format!("{}{}", self.base_url, PRODUCTS_PATH);
        let request = self.products(self.client.get(&url)).query(&[("search", query)]);
        let response = self.send(request, "search products").await?;
        Self::read_json(response, "search products").await
    }

    async fn update_item(&self, id: ItemId, update: &ItemUpdate) -> Result<()> {
        let url = format!("{}{}/{}", self.base_url, PRODUCTS_PATH, id);
        let request = self.products(self.client.put(&url)).json(update);
        self.send(request, &format!("update product {}", id)).await?;
        tracing::info!("Product {} updated with {} images", id, update.images.len());
        Ok(())
    }

    async fn upload_asset(
        &self,
        data: &[u8],
        filename: &str,
        content_type: &str,
    ) -> Result<AssetId> {
        let url = format!("{}{}", self.base_url, MEDIA_PATH);
        let request = self
            .media(self.client.post(&url))
            .header("Content-Type", content_type)
            .header(
                "Content-Disposition",
                format!("attachment; filename=\"{}\"", filename),
            )
            .body(data.to_vec());
        let context = format!("upload {}", filename);
        let response = self.send(request, &context).await?;
        let media: MediaResponse = Self::read_json(response, &context).await?;
        Ok(media.id)
    }

    async fn delete_asset(&self, id: AssetId) -> Result<()> {
        let url = format!("{}{}/{}", self.base_url, MEDIA_PATH, id);
        let request = self.media(self.client.delete(&url)).query(&[("force", "true")]);
        self.send(request, &format!("delete media {}", id)).await?;
        Ok(())
    }

    async fn fetch_image(&self, url: &str) -> Result<Vec<u8>> {
        let request = self.client.get(url).timeout(self.timeout);
        let response = self.send(request, &format!("download {}", url)).await?;
        Ok(response.bytes().await?.to_vec())
    }
}
