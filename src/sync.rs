//! Catalog synchronization: per-product and whole-catalog runs.
//!
//! A product run goes through fetch, skip check, staging, transform, upload,
//! update and reconciliation. Individual images may fail without stopping the
//! run, but the product is only updated when at least one image made it all
//! the way through.

use crate::catalog::{CatalogService, WooCommerceClient};
use crate::config::{Credentials, ProcessingConfig};
use crate::fingerprint;
use crate::image::format::{content_type_for, detect_extension, extension_of, is_supported_input};
use crate::image::{CanvasCompositor, ImageService};
use crate::models::{
    AssetId, BatchSummary, CatalogImage, CatalogItem, ItemId, ItemOutcome, ItemSummary,
    ItemUpdate, TransformResult,
};
use crate::naming::{self, TemplateContext};
use crate::progress::{ProgressSink, TracingSink};
use crate::staging::StagingArea;
use crate::{Error, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Products requested per catalog page.
pub const PAGE_SIZE: u32 = 100;

/// A product to synchronize: fetched by id, or already at hand.
#[derive(Debug, Clone)]
pub enum ItemRef {
    Id(ItemId),
    Item(CatalogItem),
}

/// Drives synchronization runs against a catalog.
pub struct SyncOrchestrator {
    catalog: Box<dyn CatalogService>,
    image: Box<dyn ImageService>,
    progress: Arc<dyn ProgressSink>,
    staging_root: Option<PathBuf>,
}

/// Injectable service bundle used to construct [`SyncOrchestrator`].
pub struct SyncServices {
    pub catalog: Box<dyn CatalogService>,
    pub image: Box<dyn ImageService>,
    pub progress: Arc<dyn ProgressSink>,
}

/// Image that was rendered and is waiting to be uploaded.
struct Rendered {
    old_id: AssetId,
    output: PathBuf,
}

impl SyncOrchestrator {
    /// Build an orchestrator from concrete service dependencies.
    ///
    /// Staging areas are created under `staging_root`, or the system temp
    /// directory when `None`.
    pub fn with_services(services: SyncServices, staging_root: Option<PathBuf>) -> Self {
        Self {
            catalog: services.catalog,
            image: services.image,
            progress: services.progress,
            staging_root,
        }
    }

    /// Orchestrator talking to the store described by `credentials`.
    pub fn new(credentials: &Credentials, progress: Arc<dyn ProgressSink>) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(credentials.http_timeout)
            .build()?;

        info!("Using store at {}", credentials.store_url);

        Ok(Self::with_services(
            SyncServices {
                catalog: Box::new(WooCommerceClient::new_with_client(credentials, http_client)),
                image: Box::new(CanvasCompositor::new()),
                progress,
            },
            None,
        ))
    }

    /// Orchestrator for `credentials` that logs progress through `tracing`.
    pub fn from_credentials(credentials: &Credentials) -> Result<Self> {
        Self::new(credentials, Arc::new(TracingSink))
    }

    fn report(&self, message: &str) {
        self.progress.record(message);
    }

    fn report_warning(&self, message: String) {
        warn!("{}", message);
        self.progress.record(&message);
    }

    fn report_error(&self, message: String) {
        error!("{}", message);
        self.progress.record(&message);
    }

    fn open_staging(&self) -> Result<StagingArea> {
        match &self.staging_root {
            Some(root) => StagingArea::open_in(root),
            None => StagingArea::open(),
        }
    }

    /// Free-text product search.
    pub async fn search(&self, query: &str) -> Result<Vec<CatalogItem>> {
        let items = self.catalog.search_items(query).await?;
        self.report(&format!("Found {} products for '{}'", items.len(), query));
        Ok(items)
    }

    /// Synchronize one product.
    ///
    /// Fetch and update failures are returned; per-image failures are
    /// reported and leave the image out of the update.
    pub async fn process_one(
        &self,
        config: &ProcessingConfig,
        item: ItemRef,
    ) -> Result<ItemSummary> {
        config.ensure_uploadable()?;

        let item = match item {
            ItemRef::Id(id) => {
                self.report(&format!("Fetching product {}", id));
                self.catalog.get_item(id).await.map_err(|e| {
                    self.report_error(format!("Failed to fetch product {}: {}", id, e));
                    e
                })?
            }
            ItemRef::Item(item) => item,
        };

        let fingerprint = fingerprint::compute(config);
        if item.processed_marker() == Some(fingerprint.as_str()) {
            self.report(&format!(
                "Product {} already processed with these settings, skipping",
                item.id
            ));
            return Ok(ItemSummary::skipped(item.id));
        }

        if item.images.is_empty() {
            self.report(&format!("No images found for product {}", item.id));
            return Ok(ItemSummary {
                outcome: ItemOutcome::Unchanged,
                ..ItemSummary::skipped(item.id)
            });
        }

        let staging = self.open_staging()?;
        info!(
            "Processing product {} ({} images) in {}",
            item.id,
            item.images.len(),
            staging.path().display()
        );

        let outcome = self
            .sync_staged(&staging, config, &item, &fingerprint)
            .await;

        if let Err(e) = staging.close() {
            warn!("Failed to remove staging area: {}", e);
        }
        outcome
    }

    async fn sync_staged(
        &self,
        staging: &StagingArea,
        config: &ProcessingConfig,
        item: &CatalogItem,
        fingerprint: &str,
    ) -> Result<ItemSummary> {
        let total = item.images.len();
        let mut results = Vec::with_capacity(total);
        let mut rendered = Vec::with_capacity(total);

        for (index, image) in item.images.iter().enumerate() {
            let source_dir = staging.subdir(&format!("image-{}/source", image.id))?;
            let output_dir = staging.subdir(&format!("image-{}/out", image.id))?;

            let source = match self.download(image, &source_dir).await {
                Ok(path) => path,
                Err(e) => {
                    self.report_warning(format!(
                        "Failed to download image {}/{} ({}) of product {}: {}",
                        index + 1,
                        total,
                        image.id,
                        item.id,
                        e
                    ));
                    results.push(TransformResult::failure(
                        source_dir.join(url_file_name(&image.src)),
                        output_dir,
                    ));
                    continue;
                }
            };
            self.report(&format!(
                "Image {}/{} downloaded: {}",
                index + 1,
                total,
                source.display()
            ));

            let stem_name = naming::render(
                config.filename_template(),
                &TemplateContext::for_item(item, &source, config),
            );
            let output_stem = output_dir.join(stem_name);

            match self.image.transform(&source, &output_stem, config).await {
                Ok(result) => {
                    rendered.push(Rendered {
                        old_id: image.id,
                        output: result.output_path.clone(),
                    });
                    results.push(result);
                }
                Err(e) => {
                    self.report_warning(format!(
                        "Failed to transform image {} of product {}: {}",
                        image.id, item.id, e
                    ));
                    results.push(TransformResult::failure(source, output_stem));
                }
            }
        }

        let mut old_ids = Vec::with_capacity(rendered.len());
        let mut new_ids = Vec::with_capacity(rendered.len());

        for entry in &rendered {
            match self.upload(&entry.output).await {
                Ok(new_id) => {
                    self.report(&format!(
                        "Uploaded {} as media {} (replaces {})",
                        entry.output.display(),
                        new_id,
                        entry.old_id
                    ));
                    old_ids.push(entry.old_id);
                    new_ids.push(new_id);
                }
                Err(e) => {
                    self.report_warning(format!(
                        "Failed to upload replacement for image {} of product {}: {}",
                        entry.old_id, item.id, e
                    ));
                }
            }
        }

        if new_ids.is_empty() {
            self.report_warning(format!(
                "No images of product {} were processed successfully; product left unchanged",
                item.id
            ));
            return Ok(ItemSummary {
                item_id: item.id,
                outcome: ItemOutcome::Unchanged,
                old_ids: Vec::new(),
                new_ids: Vec::new(),
                results,
                failed_deletions: Vec::new(),
            });
        }

        let update = ItemUpdate::new(&new_ids, fingerprint, &old_ids);
        if let Err(e) = self.catalog.update_item(item.id, &update).await {
            self.report_error(format!("Failed to update product {}: {}", item.id, e));
            self.discard_uploads(&new_ids).await;
            return Err(e);
        }
        self.report(&format!(
            "Product {} updated with {} new images",
            item.id,
            new_ids.len()
        ));

        let failed_deletions = self.reconcile(&old_ids).await;

        Ok(ItemSummary {
            item_id: item.id,
            outcome: ItemOutcome::Updated,
            old_ids,
            new_ids,
            results,
            failed_deletions,
        })
    }

    async fn download(&self, image: &CatalogImage, dir: &Path) -> Result<PathBuf> {
        if image.src.is_empty() {
            return Err(Error::RemoteApi(format!("Image {} has no source URL", image.id)));
        }

        let bytes = self.catalog.fetch_image(&image.src).await?;

        let mut file_name = url_file_name(&image.src);
        if file_name.is_empty() {
            file_name = format!("image-{}", image.id);
        }
        if !is_supported_input(Path::new(&file_name)) {
            if let Some(ext) = detect_extension(&bytes) {
                file_name = format!("{}.{}", file_name, ext);
            }
        }

        let path = dir.join(file_name);
        tokio::fs::write(&path, &bytes).await?;
        Ok(path)
    }

    async fn upload(&self, output: &Path) -> Result<AssetId> {
        let data = tokio::fs::read(output).await?;
        let filename = output
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| {
                Error::Invariant(format!("Invalid output path: {}", output.display()))
            })?;
        let content_type = extension_of(output)
            .map(|ext| content_type_for(&ext))
            .unwrap_or("application/octet-stream");

        self.catalog.upload_asset(&data, filename, content_type).await
    }

    /// Delete superseded images; returns the ids that could not be deleted.
    async fn reconcile(&self, old_ids: &[AssetId]) -> Vec<AssetId> {
        let mut failed = Vec::new();
        for &old_id in old_ids {
            match self.catalog.delete_asset(old_id).await {
                Ok(()) => self.report(&format!("Deleted superseded image {}", old_id)),
                Err(e) => {
                    self.report_warning(format!(
                        "Failed to delete superseded image {}: {}",
                        old_id, e
                    ));
                    failed.push(old_id);
                }
            }
        }
        failed
    }

    /// Best-effort removal of uploads that no product references.
    async fn discard_uploads(&self, new_ids: &[AssetId]) {
        for &id in new_ids {
            if let Err(e) = self.catalog.delete_asset(id).await {
                warn!("Failed to remove orphaned upload {}: {}", id, e);
            }
        }
    }

    /// Synchronize every product in the catalog, page by page, until an empty
    /// page. Never fails; errors are reported and counted.
    pub async fn process_all(&self, config: &ProcessingConfig) -> BatchSummary {
        let mut summary = BatchSummary::default();

        if let Err(e) = config.ensure_uploadable() {
            self.report_error(format!("Cannot process catalog: {}", e));
            return summary;
        }

        let mut page = 1;
        loop {
            let items = match self.catalog.list_items(page, PAGE_SIZE).await {
                Ok(items) => items,
                Err(e) => {
                    self.report_error(format!(
                        "Failed to fetch product page {}: {}; stopping",
                        page, e
                    ));
                    break;
                }
            };
            summary.pages_fetched += 1;

            if items.is_empty() {
                break;
            }
            self.report(&format!(
                "Processing page {} ({} products)",
                page,
                items.len()
            ));

            for item in items {
                let id = item.id;
                match self.process_one(config, ItemRef::Item(item)).await {
                    Ok(item_summary) => summary.record(item_summary.outcome),
                    Err(e) => {
                        self.report_error(format!("Product {} failed: {}", id, e));
                        summary.record_failure();
                    }
                }
            }

            page += 1;
        }

        self.report(&format!(
            "All products processed: {} total, {} updated, {} skipped, {} unchanged, {} failed",
            summary.total_processed,
            summary.updated,
            summary.skipped,
            summary.unchanged,
            summary.failed
        ));
        summary
    }
}

/// Last path segment of `url` without query or fragment.
fn url_file_name(url: &str) -> String {
    let without_query = url.split(['?', '#']).next().unwrap_or_default();
    let name: String = without_query
        .rsplit('/')
        .next()
        .unwrap_or_default()
        .chars()
        .filter(|c| !matches!(c, '\\' | ':' | '*' | '"' | '<' | '>' | '|'))
        .collect();
    // "." and ".." would join to the staging dir itself or its parent.
    if name == "." || name == ".." {
        String::new()
    } else {
        name
    }
}
