//! Remote product catalog integration
//!
//! Reads products and their images from the store, uploads rendered images
//! to the media library and writes the resulting image list back.

pub mod client;
pub mod mock;

pub use client::WooCommerceClient;
pub use mock::MockCatalogClient;

use crate::models::{AssetId, CatalogItem, ItemId, ItemUpdate};
use crate::Result;
use async_trait::async_trait;

#[async_trait]
pub trait CatalogService: Send + Sync {
    async fn get_item(&self, id: ItemId) -> Result<CatalogItem>;
    /// One page of items; an empty page means there are no more.
    async fn list_items(&self, page: u32, page_size: u32) -> Result<Vec<CatalogItem>>;
    async fn search_items(&self, query: &str) -> Result<Vec<CatalogItem>>;
    async fn update_item(&self, id: ItemId, update: &ItemUpdate) -> Result<()>;
    async fn upload_asset(&self, data: &[u8], filename: &str, content_type: &str)
        -> Result<AssetId>;
    async fn delete_asset(&self, id: AssetId) -> Result<()>;
    /// Download the original bytes of an image.
    async fn fetch_image(&self, url: &str) -> Result<Vec<u8>>;
}
