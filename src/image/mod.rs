//! Image transformation
//!
//! Resizes source images under a sizing mode, composites them onto a
//! fixed-size background canvas and writes the result in the selected
//! format. Deep-zoom output is produced by a separate tile exporter.

pub mod avif;
pub mod canvas;
pub mod dzi;
pub mod fallback;
pub mod format;
pub mod mock;
pub mod processor;

pub use avif::AvifDecoder;
pub use dzi::{DeepZoomExporter, TileExporter};
pub use fallback::{FallbackDecoder, MagickDecoder};
pub use mock::MockImageProcessor;
pub use processor::CanvasCompositor;

use crate::config::ProcessingConfig;
use crate::models::TransformResult;
use crate::Result;
use async_trait::async_trait;
use std::path::Path;

#[async_trait]
pub trait ImageService: Send + Sync {
    /// Transform `input` and write it next to `output_stem`; the extension is
    /// chosen from the configured format. Returns the final output path.
    async fn transform(
        &self,
        input: &Path,
        output_stem: &Path,
        config: &ProcessingConfig,
    ) -> Result<TransformResult>;
}
