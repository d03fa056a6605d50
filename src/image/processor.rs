use super::dzi::{DeepZoomExporter, TileExporter};
use super::avif::AvifDecoder;
use super::fallback::{decode_with_fallback, FallbackDecoder};
use super::{canvas, format, ImageService};
use crate::config::{OutputFormat, ProcessingConfig};
use crate::models::TransformResult;
use crate::{Error, Result};
use async_trait::async_trait;
use image::imageops::{self, FilterType};
use image::{DynamicImage, GenericImageView, Rgba, RgbaImage};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Resizes a source image and centers it on a background canvas.
#[derive(Clone)]
pub struct CanvasCompositor {
    fallback: Option<Arc<dyn FallbackDecoder>>,
    tiles: Arc<dyn TileExporter>,
}

impl CanvasCompositor {
    /// Compositor with the in-process AVIF decoder and the built-in deep zoom exporter.
    pub fn new() -> Self {
        Self {
            fallback: Some(Arc::new(AvifDecoder::new())),
            tiles: Arc::new(DeepZoomExporter::new()),
        }
    }

    pub fn with_fallback(mut self, fallback: Option<Arc<dyn FallbackDecoder>>) -> Self {
        self.fallback = fallback;
        self
    }

    pub fn with_tile_exporter(mut self, tiles: Arc<dyn TileExporter>) -> Self {
        self.tiles = tiles;
        self
    }

    /// Blocking transform; [`ImageService::transform`] runs this off the async runtime.
    pub fn transform_sync(
        &self,
        input: &Path,
        output_stem: &Path,
        config: &ProcessingConfig,
    ) -> Result<TransformResult> {
        let extension = format::output_extension(config.format(), input)?;
        let output = with_extension(output_stem, &extension);
        if let Some(parent) = output.parent() {
            fs::create_dir_all(parent)?;
        }

        if config.format() == OutputFormat::Dzi {
            let source = decode_with_fallback(input, self.fallback.as_deref())?;
            self.tiles.export(&source, &output)?;
            return Ok(TransformResult::success(input.to_path_buf(), output));
        }

        let encoder = format::encoder_for(&extension)?;
        let source = decode_with_fallback(input, self.fallback.as_deref())?;
        let composed = composite(&source, config);

        let pixels = if format::supports_alpha(encoder) {
            DynamicImage::ImageRgba8(composed)
        } else {
            DynamicImage::ImageRgb8(DynamicImage::ImageRgba8(composed).to_rgb8())
        };

        pixels.save_with_format(&output, encoder).map_err(|e| {
            Error::Encode(format!("Failed to write {}: {}", output.display(), e))
        })?;

        tracing::debug!("Wrote {} from {}", output.display(), input.display());
        Ok(TransformResult::success(input.to_path_buf(), output))
    }
}

impl Default for CanvasCompositor {
    fn default() -> Self {
        Self::new()
    }
}

/// Resize `source` for the configured mode and center it on a filled canvas.
pub fn composite(source: &DynamicImage, config: &ProcessingConfig) -> RgbaImage {
    let canvas_size = (config.canvas_width(), config.canvas_height());
    let (width, height) =
        canvas::scaled_dimensions(source.dimensions(), canvas_size, config.size_mode());

    let resized = source
        .resize_exact(width, height, FilterType::Lanczos3)
        .to_rgba8();

    let mut composed = RgbaImage::from_pixel(
        canvas_size.0,
        canvas_size.1,
        Rgba(config.background_color().to_rgba()),
    );
    let (x, y) = canvas::center_offset(canvas_size, (width, height));
    imageops::overlay(&mut composed, &resized, x, y);
    composed
}

/// Append `.extension` without touching dots already in the stem.
fn with_extension(stem: &Path, extension: &str) -> PathBuf {
    let mut name = stem.as_os_str().to_owned();
    name.push(".");
    name.push(extension);
    PathBuf::from(name)
}

#[async_trait]
impl ImageService for CanvasCompositor {
    async fn transform(
        &self,
        input: &Path,
        output_stem: &Path,
        config: &ProcessingConfig,
    ) -> Result<TransformResult> {
        tokio::task::spawn_blocking({
            let compositor = self.clone();
            let input = input.to_path_buf();
            let output_stem = output_stem.to_path_buf();
            let config = config.clone();
            move || compositor.transform_sync(&input, &output_stem, &config)
        })
        .await
        .map_err(|e| Error::Invariant(format!("Image processing task join error: {}", e)))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BackgroundColor, SizeMode};
    use tempfile::TempDir;

    const RED: Rgba<u8> = Rgba([255, 0, 0, 255]);

    fn write_source(dir: &TempDir, name: &str, width: u32, height: u32) -> PathBuf {
        let path = dir.path().join(name);
        RgbaImage::from_pixel(width, height, RED).save(&path).unwrap();
        path
    }

    fn compositor() -> CanvasCompositor {
        CanvasCompositor::new().with_fallback(None)
    }

    #[test]
    fn test_contain_centers_on_transparent_canvas() {
        let dir = TempDir::new().unwrap();
        let source = write_source(&dir, "wide.png", 200, 100);
        let config = ProcessingConfig::new(100, 100).unwrap();

        let result = compositor()
            .transform_sync(&source, &dir.path().join("out"), &config)
            .unwrap();

        assert!(result.succeeded);
        assert_eq!(result.output_path, dir.path().join("out.png"));

        let output = image::open(&result.output_path).unwrap().to_rgba8();
        assert_eq!(output.dimensions(), (100, 100));
        // 100x50 image placed at y = 25
        assert_eq!(output.get_pixel(50, 50)[3], 255);
        assert_eq!(output.get_pixel(50, 50)[0], 255);
        assert_eq!(output.get_pixel(50, 5)[3], 0);
        assert_eq!(output.get_pixel(50, 95)[3], 0);
    }

    #[test]
    fn test_cover_fills_the_whole_canvas() {
        let dir = TempDir::new().unwrap();
        let source = write_source(&dir, "tall.png", 20, 80);
        let config = ProcessingConfig::new(60, 40)
            .unwrap()
            .with_size_mode(SizeMode::Cover);

        let result = compositor()
            .transform_sync(&source, &dir.path().join("out"), &config)
            .unwrap();

        let output = image::open(&result.output_path).unwrap().to_rgba8();
        assert_eq!(output.dimensions(), (60, 40));
        assert!(output.pixels().all(|p| p[3] == 255));
    }

    #[test]
    fn test_jpeg_output_uses_background_color() {
        let dir = TempDir::new().unwrap();
        let source = write_source(&dir, "wide.png", 200, 100);
        let config = ProcessingConfig::new(100, 100)
            .unwrap()
            .with_background(BackgroundColor::Rgb(255, 255, 255))
            .with_format(OutputFormat::Jpeg);

        let result = compositor()
            .transform_sync(&source, &dir.path().join("shirt_SKU.v2"), &config)
            .unwrap();

        assert_eq!(result.output_path, dir.path().join("shirt_SKU.v2.jpg"));
        let output = image::open(&result.output_path).unwrap().to_rgb8();
        assert_eq!(output.dimensions(), (100, 100));
        let corner = output.get_pixel(2, 2);
        assert!(corner.0.iter().all(|&c| c > 240), "corner {:?}", corner);
    }

    #[test]
    fn test_auto_keeps_source_format() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("photo.gif");
        DynamicImage::ImageRgba8(RgbaImage::from_pixel(30, 30, RED))
            .save_with_format(&source, image::ImageFormat::Gif)
            .unwrap();
        let config = ProcessingConfig::new(50, 50).unwrap();

        let result = compositor()
            .transform_sync(&source, &dir.path().join("out"), &config)
            .unwrap();

        assert_eq!(result.output_path, dir.path().join("out.gif"));
        assert_eq!(image::open(&result.output_path).unwrap().width(), 50);
    }

    #[test]
    fn test_dzi_bypasses_compositing() {
        let dir = TempDir::new().unwrap();
        let source = write_source(&dir, "big.png", 300, 200);
        let config = ProcessingConfig::new(50, 50)
            .unwrap()
            .with_format(OutputFormat::Dzi);

        let result = compositor()
            .transform_sync(&source, &dir.path().join("big"), &config)
            .unwrap();

        assert_eq!(result.output_path, dir.path().join("big.dzi"));
        let xml = fs::read_to_string(&result.output_path).unwrap();
        assert!(xml.contains("Width=\"300\" Height=\"200\""));
        assert!(dir.path().join("big_files/9/1_0.jpg").exists());
    }

    #[test]
    fn test_default_compositor_reads_avif_sources() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("photo.avif");
        let writer = std::io::BufWriter::new(fs::File::create(&source).unwrap());
        DynamicImage::ImageRgba8(RgbaImage::from_pixel(16, 8, RED))
            .write_with_encoder(image::codecs::avif::AvifEncoder::new_with_speed_quality(
                writer, 10, 100,
            ))
            .unwrap();
        let config = ProcessingConfig::new(64, 64)
            .unwrap()
            .with_format(OutputFormat::Png);

        let result = CanvasCompositor::new()
            .transform_sync(&source, &dir.path().join("out"), &config)
            .unwrap();

        assert!(result.output_path.ends_with("out.png"));
        let output = image::open(&result.output_path).unwrap().to_rgba8();
        assert_eq!(output.dimensions(), (64, 64));
        assert!(output.get_pixel(32, 32).0[0] > 200);
        assert_eq!(output.get_pixel(32, 2).0[3], 0);
    }

    #[test]
    fn test_unreadable_source_is_decode_error() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("broken.png");
        fs::write(&source, b"not a png").unwrap();
        let config = ProcessingConfig::new(50, 50).unwrap();

        let err = compositor()
            .transform_sync(&source, &dir.path().join("out"), &config)
            .unwrap_err();
        assert!(matches!(err, Error::Decode(_)));
    }

    #[test]
    fn test_unencodable_auto_format_is_config_error() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("scan.bmp");
        fs::write(&source, b"whatever").unwrap();
        let config = ProcessingConfig::new(50, 50).unwrap();

        let err = compositor()
            .transform_sync(&source, &dir.path().join("out"), &config)
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_unwritable_destination_is_encode_error() {
        let dir = TempDir::new().unwrap();
        let source = write_source(&dir, "wide.png", 20, 10);
        // A directory squatting on the output path makes the write fail.
        fs::create_dir_all(dir.path().join("out.png")).unwrap();
        let config = ProcessingConfig::new(10, 10).unwrap();

        let err = compositor()
            .transform_sync(&source, &dir.path().join("out"), &config)
            .unwrap_err();
        assert!(matches!(err, Error::Encode(_)));
    }

    #[test]
    fn test_composite_offsets_follow_center_rule() {
        let source = DynamicImage::ImageRgba8(RgbaImage::from_pixel(30, 10, RED));
        let config = ProcessingConfig::new(31, 31)
            .unwrap()
            .with_background(BackgroundColor::Rgb(0, 0, 255));

        // contain: 31x10 (rounded from 10.33), y offset = (31 - 10) / 2 = 10
        let composed = composite(&source, &config);
        assert_eq!(composed.get_pixel(15, 9), &Rgba([0, 0, 255, 255]));
        assert_eq!(composed.get_pixel(15, 10)[0], 255);
        assert_eq!(composed.get_pixel(15, 19)[0], 255);
        assert_eq!(composed.get_pixel(15, 20), &Rgba([0, 0, 255, 255]));
    }

    #[tokio::test]
    async fn test_async_transform_runs_blocking_work() {
        let dir = TempDir::new().unwrap();
        let source = write_source(&dir, "wide.png", 40, 20);
        let config = ProcessingConfig::new(20, 20).unwrap();

        let result = compositor()
            .transform(&source, &dir.path().join("async"), &config)
            .await
            .unwrap();
        assert!(result.output_path.exists());
    }
}
