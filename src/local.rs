//! Local file and directory processing
//!
//! Renders images found on disk into an output directory without touching the
//! remote catalog.

use crate::config::ProcessingConfig;
use crate::image::format::is_supported_input;
use crate::image::{CanvasCompositor, ImageService};
use crate::models::TransformResult;
use crate::naming::{self, TemplateContext};
use crate::progress::ProgressSink;
use crate::{Error, Result};
use std::collections::HashSet;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use walkdir::{DirEntry, WalkDir};

/// Output directory created next to the processed images by default.
pub const OUTPUT_DIR_NAME: &str = "ProcessedImages";

/// Finds processable images on disk.
pub struct FileSource;

impl FileSource {
    /// Every supported image under `root`, in file-name order. Skips the
    /// `exclude` directory (however it is spelled) and any nested
    /// [`OUTPUT_DIR_NAME`] directory left by an earlier run.
    pub fn enumerate_images(root: &Path, exclude: Option<&Path>) -> impl Iterator<Item = PathBuf> {
        let excluded = exclude.and_then(|dir| dir.canonicalize().ok());
        WalkDir::new(root)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(move |entry| !is_pruned(entry, excluded.as_deref()))
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(e) => {
                    warn!("Skipping unreadable entry: {}", e);
                    None
                }
            })
            .filter(|entry| entry.file_type().is_file() && is_supported_input(entry.path()))
            .map(DirEntry::into_path)
    }

    /// First supported image under `root`, if any.
    pub fn first_image(root: &Path) -> Option<PathBuf> {
        Self::enumerate_images(root, None).next()
    }
}

fn is_pruned(entry: &DirEntry, excluded: Option<&Path>) -> bool {
    if entry.depth() == 0 || !entry.file_type().is_dir() {
        return false;
    }
    if entry.file_name() == OsStr::new(OUTPUT_DIR_NAME) {
        return true;
    }
    excluded.is_some_and(|dir| {
        entry
            .path()
            .canonicalize()
            .is_ok_and(|path| path == dir)
    })
}

/// Directory the default output folder is created in.
fn output_base(path: &Path, is_dir: bool) -> &Path {
    if is_dir {
        return path;
    }
    path.parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."))
}

/// Counts reported by a local run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LocalSummary {
    pub processed: usize,
    pub failed: usize,
    pub deleted: usize,
    pub output_dir: PathBuf,
    pub outputs: Vec<PathBuf>,
}

pub struct LocalProcessor {
    image: Box<dyn ImageService>,
    progress: Arc<dyn ProgressSink>,
}

impl LocalProcessor {
    pub fn new(progress: Arc<dyn ProgressSink>) -> Self {
        Self::with_image_service(Box::new(CanvasCompositor::new()), progress)
    }

    pub fn with_image_service(image: Box<dyn ImageService>, progress: Arc<dyn ProgressSink>) -> Self {
        Self { image, progress }
    }

    fn report(&self, message: &str) {
        self.progress.record(message);
    }

    /// Process a single file or every image below a directory.
    pub async fn process(&self, config: &ProcessingConfig, path: &Path) -> Result<LocalSummary> {
        if !path.exists() {
            return Err(Error::NotFound(format!("{} does not exist", path.display())));
        }

        let is_dir = path.is_dir();
        let base = output_base(path, is_dir);
        let output_dir = config
            .destination()
            .cloned()
            .unwrap_or_else(|| base.join(OUTPUT_DIR_NAME));

        let sources: Vec<PathBuf> = if is_dir {
            FileSource::enumerate_images(path, Some(&output_dir)).collect()
        } else if is_supported_input(path) {
            vec![path.to_path_buf()]
        } else {
            return Err(Error::Config(format!(
                "Unsupported image file: {}",
                path.display()
            )));
        };

        prepare_output_dir(&output_dir, base).await?;
        info!(
            "Processing {} local images into {}",
            sources.len(),
            output_dir.display()
        );

        let mut summary = LocalSummary {
            output_dir: output_dir.clone(),
            ..LocalSummary::default()
        };
        let mut used_names = HashSet::new();
        let total = sources.len();

        for (index, source) in sources.iter().enumerate() {
            let rendered = naming::render(
                config.filename_template(),
                &TemplateContext::for_file(source, config),
            );
            let stem = output_dir.join(unique_name(&mut used_names, rendered));

            match self.image.transform(source, &stem, config).await {
                Ok(result) => {
                    summary.processed += 1;
                    self.report(&format!(
                        "Processed {}/{}: {}",
                        index + 1,
                        total,
                        result.output_path.display()
                    ));
                    summary.outputs.push(result.output_path);

                    if config.delete_source_images() {
                        match tokio::fs::remove_file(source).await {
                            Ok(()) => summary.deleted += 1,
                            Err(e) => {
                                warn!("Failed to delete source {}: {}", source.display(), e)
                            }
                        }
                    }
                }
                Err(e) => {
                    summary.failed += 1;
                    let message = format!("Failed to process {}: {}", source.display(), e);
                    warn!("{}", message);
                    self.report(&message);
                }
            }
        }

        self.report(&format!(
            "Local processing finished: {} processed, {} failed",
            summary.processed, summary.failed
        ));
        Ok(summary)
    }

    /// Render the first image under `root` to `output_stem`.
    pub async fn preview(
        &self,
        config: &ProcessingConfig,
        root: &Path,
        output_stem: &Path,
    ) -> Result<Option<TransformResult>> {
        let Some(source) = FileSource::first_image(root) else {
            self.report(&format!("No images found in {}", root.display()));
            return Ok(None);
        };

        if let Some(parent) = output_stem.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let result = self.image.transform(&source, output_stem, config).await?;
        self.report(&format!("Preview written to {}", result.output_path.display()));
        Ok(Some(result))
    }
}

/// Recreate `output_dir` empty. Refuses directories that contain `source_root`.
async fn prepare_output_dir(output_dir: &Path, source_root: &Path) -> Result<()> {
    if tokio::fs::try_exists(output_dir).await? {
        let output = tokio::fs::canonicalize(output_dir).await?;
        let source = tokio::fs::canonicalize(source_root).await?;
        if source.starts_with(&output) {
            return Err(Error::Config(format!(
                "Output directory {} contains the source images",
                output_dir.display()
            )));
        }
        tokio::fs::remove_dir_all(output_dir).await?;
    }
    tokio::fs::create_dir_all(output_dir).await?;
    Ok(())
}

/// `name`, or `name_2`, `name_3`... when already taken in this run.
fn unique_name(used: &mut HashSet<String>, name: String) -> String {
    if used.insert(name.clone()) {
        return name;
    }
    let mut counter = 2;
    loop {
        let candidate = format!("{}_{}", name, counter);
        if used.insert(candidate.clone()) {
            return candidate;
        }
        counter += 1;
    }
}
