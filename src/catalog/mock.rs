use super::CatalogService;
use crate::models::{AssetId, CatalogImage, CatalogItem, ItemId, ItemUpdate};
use crate::{Error, Result};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex};

const DEFAULT_BASE_URL: &str = "https://mock-shop.example.com";
const FIRST_UPLOAD_ID: AssetId = 1000;

/// In-memory catalog that applies updates to its own items and counts calls.
#[derive(Clone)]
pub struct MockCatalogClient {
    items: Arc<Mutex<BTreeMap<ItemId, CatalogItem>>>,
    pages: Arc<Mutex<Option<Vec<Vec<CatalogItem>>>>>,
    failing_pages: Arc<Mutex<HashSet<u32>>>,
    failing_uploads: Arc<Mutex<Vec<String>>>,
    failing_deletes: Arc<Mutex<HashSet<AssetId>>>,
    failing_downloads: Arc<Mutex<Vec<String>>>,
    fail_updates: Arc<Mutex<bool>>,
    image_bytes: Arc<Mutex<Vec<u8>>>,
    next_asset_id: Arc<Mutex<AssetId>>,
    uploads: Arc<Mutex<Vec<(AssetId, String, String)>>>,
    updates: Arc<Mutex<Vec<(ItemId, ItemUpdate)>>>,
    deleted: Arc<Mutex<Vec<AssetId>>>,
    list_calls: Arc<Mutex<Vec<u32>>>,
    get_count: Arc<Mutex<usize>>,
}

impl MockCatalogClient {
    pub fn new() -> Self {
        Self {
            items: Arc::new(Mutex::new(BTreeMap::new())),
            pages: Arc::new(Mutex::new(None)),
            failing_pages: Arc::new(Mutex::new(HashSet::new())),
            failing_uploads: Arc::new(Mutex::new(Vec::new())),
            failing_deletes: Arc::new(Mutex::new(HashSet::new())),
            failing_downloads: Arc::new(Mutex::new(Vec::new())),
            fail_updates: Arc::new(Mutex::new(false)),
            image_bytes: Arc::new(Mutex::new(b"original image".to_vec())),
            next_asset_id: Arc::new(Mutex::new(FIRST_UPLOAD_ID)),
            uploads: Arc::new(Mutex::new(Vec::new())),
            updates: Arc::new(Mutex::new(Vec::new())),
            deleted: Arc::new(Mutex::new(Vec::new())),
            list_calls: Arc::new(Mutex::new(Vec::new())),
            get_count: Arc::new(Mutex::new(0)),
        }
    }

    pub fn with_item(self, item: CatalogItem) -> Self {
        self.items.lock().unwrap().insert(item.id, item);
        self
    }

    /// Serve `list_items` from explicit pages instead of chunking stored items.
    /// Items on the pages are also stored so they can be updated.
    pub fn with_page(self, items: Vec<CatalogItem>) -> Self {
        {
            let mut stored = self.items.lock().unwrap();
            for item in &items {
                stored.insert(item.id, item.clone());
            }
        }
        self.pages
            .lock()
            .unwrap()
            .get_or_insert_with(Vec::new)
            .push(items);
        self
    }

    pub fn with_page_failure(self, page: u32) -> Self {
        self.failing_pages.lock().unwrap().insert(page);
        self
    }

    /// Reject uploads whose filename contains `fragment`.
    pub fn with_upload_failure_for(self, fragment: &str) -> Self {
        self.failing_uploads
            .lock()
            .unwrap()
            .push(fragment.to_string());
        self
    }

    pub fn with_delete_failure_for(self, id: AssetId) -> Self {
        self.failing_deletes.lock().unwrap().insert(id);
        self
    }

    /// Reject downloads whose URL contains `fragment`.
    pub fn with_download_failure_for(self, fragment: &str) -> Self {
        self.failing_downloads
            .lock()
            .unwrap()
            .push(fragment.to_string());
        self
    }

    pub fn with_update_failure(self, fail: bool) -> Self {
        *self.fail_updates.lock().unwrap() = fail;
        self
    }

    pub fn with_image_bytes(self, bytes: Vec<u8>) -> Self {
        *self.image_bytes.lock().unwrap() = bytes;
        self
    }

    pub fn get_item_snapshot(&self, id: ItemId) -> Option<CatalogItem> {
        self.items.lock().unwrap().get(&id).cloned()
    }

    pub fn get_upload_count(&self) -> usize {
        self.uploads.lock().unwrap().len()
    }

    /// `(asset id, filename, content type)` of every accepted upload.
    pub fn get_uploads(&self) -> Vec<(AssetId, String, String)> {
        self.uploads.lock().unwrap().clone()
    }

    pub fn get_updates(&self) -> Vec<(ItemId, ItemUpdate)> {
        self.updates.lock().unwrap().clone()
    }

    pub fn get_deleted(&self) -> Vec<AssetId> {
        self.deleted.lock().unwrap().clone()
    }

    /// Page numbers requested through `list_items`, in call order.
    pub fn get_list_calls(&self) -> Vec<u32> {
        self.list_calls.lock().unwrap().clone()
    }

    pub fn get_get_count(&self) -> usize {
        *self.get_count.lock().unwrap()
    }
}

impl Default for MockCatalogClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CatalogService for MockCatalogClient {
    async fn get_item(&self, id: ItemId) -> Result<CatalogItem> {
        *self.get_count.lock().unwrap() += 1;
        self.items
            .lock()
            .unwrap()
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("product {}", id)))
    }

    async fn list_items(&self, page: u32, page_size: u32) -> Result<Vec<CatalogItem>> {
        self.list_calls.lock().unwrap().push(page);

        if self.failing_pages.lock().unwrap().contains(&page) {
            return Err(Error::RemoteApi(format!("Mock failure for page {}", page)));
        }

        let index = page.saturating_sub(1) as usize;
        if let Some(pages) = self.pages.lock().unwrap().as_ref() {
            return Ok(pages.get(index).cloned().unwrap_or_default());
        }

        let items = self.items.lock().unwrap();
        Ok(items
            .values()
            .skip(index * page_size as usize)
            .take(page_size as usize)
            .cloned()
            .collect())
    }

    async fn search_items(&self, query: &str) -> Result<Vec<CatalogItem>> {
        let needle = query.to_lowercase();
        Ok(self
            .items
            .lock()
            .unwrap()
            .values()
            .filter(|item| {
                item.name.to_lowercase().contains(&needle)
                    || item.sku.to_lowercase().contains(&needle)
            })
            .cloned()
            .collect())
    }

    async fn update_item(&self, id: ItemId, update: &ItemUpdate) -> Result<()> {
        if *self.fail_updates.lock().unwrap() {
            return Err(Error::RemoteApi(format!("Mock failure updating {}", id)));
        }

        self.updates.lock().unwrap().push((id, update.clone()));

        let mut items = self.items.lock().unwrap();
        let item = items
            .get_mut(&id)
            .ok_or_else(|| Error::NotFound(format!("product {}", id)))?;
        item.images = update
            .images
            .iter()
            .map(|image| CatalogImage {
                id: image.id,
                src: format!("{}/media/{}.png", DEFAULT_BASE_URL, image.id),
            })
            .collect();
        for entry in &update.meta_data {
            item.set_meta(entry.clone());
        }
        Ok(())
    }

    async fn upload_asset(
        &self,
        _data: &[u8],
        filename: &str,
        content_type: &str,
    ) -> Result<AssetId> {
        let rejected = self
            .failing_uploads
            .lock()
            .unwrap()
            .iter()
            .any(|fragment| filename.contains(fragment.as_str()));
        if rejected {
            return Err(Error::RemoteApi(format!("Mock failure uploading {}", filename)));
        }

        let mut next = self.next_asset_id.lock().unwrap();
        let id = *next;
        *next += 1;

        self.uploads
            .lock()
            .unwrap()
            .push((id, filename.to_string(), content_type.to_string()));
        Ok(id)
    }

    async fn delete_asset(&self, id: AssetId) -> Result<()> {
        if self.failing_deletes.lock().unwrap().contains(&id) {
            return Err(Error::RemoteApi(format!("Mock failure deleting {}", id)));
        }
        self.deleted.lock().unwrap().push(id);
        Ok(())
    }

    async fn fetch_image(&self, url: &str) -> Result<Vec<u8>> {
        let rejected = self
            .failing_downloads
            .lock()
            .unwrap()
            .iter()
            .any(|fragment| url.contains(fragment.as_str()));
        if rejected {
            return Err(Error::RemoteApi(format!("Mock failure downloading {}", url)));
        }
        Ok(self.image_bytes.lock().unwrap().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(id: ItemId) -> CatalogItem {
        CatalogItem {
            name: format!("Product {}", id),
            ..CatalogItem::new(id)
        }
    }

    #[tokio::test]
    async fn test_mock_get_and_missing_item() {
        let client = MockCatalogClient::new().with_item(item(1));

        assert_eq!(client.get_item(1).await.unwrap().id, 1);
        assert!(matches!(
            client.get_item(2).await.unwrap_err(),
            Error::NotFound(_)
        ));
        assert_eq!(client.get_get_count(), 2);
    }

    #[tokio::test]
    async fn test_mock_chunks_stored_items_into_pages() {
        let client = (1..=5).fold(MockCatalogClient::new(), |c, id| c.with_item(item(id)));

        assert_eq!(client.list_items(1, 2).await.unwrap().len(), 2);
        assert_eq!(client.list_items(3, 2).await.unwrap().len(), 1);
        assert!(client.list_items(4, 2).await.unwrap().is_empty());
        assert_eq!(client.get_list_calls(), vec![1, 3, 4]);
    }

    #[tokio::test]
    async fn test_mock_update_applies_images_and_meta() {
        let client = MockCatalogClient::new().with_item(item(1));
        let update = ItemUpdate::new(&[10], "digest", &[3]);

        client.update_item(1, &update).await.unwrap();

        let stored = client.get_item_snapshot(1).unwrap();
        assert_eq!(stored.images[0].id, 10);
        assert_eq!(stored.processed_marker(), Some("digest"));
        assert_eq!(stored.old_image_ids(), vec![3]);
    }

    #[tokio::test]
    async fn test_mock_upload_ids_are_sequential() {
        let client = MockCatalogClient::new().with_upload_failure_for("bad");

        let first = client.upload_asset(b"a", "a.png", "image/png").await.unwrap();
        let second = client.upload_asset(b"b", "b.png", "image/png").await.unwrap();
        assert_eq!(second, first + 1);
        assert!(client.upload_asset(b"c", "bad.png", "image/png").await.is_err());
        assert_eq!(client.get_upload_count(), 2);
    }

    #[tokio::test]
    async fn test_mock_search_matches_name_and_sku() {
        let client = MockCatalogClient::new().with_item(CatalogItem {
            sku: "TEE-42".to_string(),
            ..item(1)
        });

        assert_eq!(client.search_items("product").await.unwrap().len(), 1);
        assert_eq!(client.search_items("tee").await.unwrap().len(), 1);
        assert!(client.search_items("mug").await.unwrap().is_empty());
    }
}
