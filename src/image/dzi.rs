//! Deep Zoom (DZI) pyramid export.
//!
//! Writes `<stem>.dzi` plus `<stem>_files/<level>/<col>_<row>.jpg`, where
//! level 0 is a single pixel and the top level is the source at full size.

use crate::{Error, Result};
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, ImageFormat};
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_TILE_SIZE: u32 = 254;
pub const DEFAULT_OVERLAP: u32 = 1;

pub trait TileExporter: Send + Sync {
    /// Export `image` as a tile pyramid described by the file at `descriptor`.
    fn export(&self, image: &DynamicImage, descriptor: &Path) -> Result<()>;
}

pub struct DeepZoomExporter {
    tile_size: u32,
    overlap: u32,
}

impl DeepZoomExporter {
    pub fn new() -> Self {
        Self {
            tile_size: DEFAULT_TILE_SIZE,
            overlap: DEFAULT_OVERLAP,
        }
    }

    pub fn with_tile_size(mut self, tile_size: u32) -> Self {
        self.tile_size = tile_size.max(1);
        self
    }

    fn descriptor_xml(&self, width: u32, height: u32) -> String {
        format!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
             <Image xmlns=\"http://schemas.microsoft.com/deepzoom/2008\" Format=\"jpg\" Overlap=\"{}\" TileSize=\"{}\">\n  \
             <Size Width=\"{}\" Height=\"{}\"/>\n\
             </Image>\n",
            self.overlap, self.tile_size, width, height
        )
    }

    fn write_level(&self, level_image: &DynamicImage, level_dir: &Path) -> Result<()> {
        fs::create_dir_all(level_dir)?;
        let (width, height) = level_image.dimensions();

        for (col, x, w) in tile_spans(width, self.tile_size, self.overlap) {
            for (row, y, h) in tile_spans(height, self.tile_size, self.overlap) {
                let tile = DynamicImage::ImageRgb8(level_image.crop_imm(x, y, w, h).to_rgb8());
                let path = level_dir.join(format!("{}_{}.jpg", col, row));
                tile.save_with_format(&path, ImageFormat::Jpeg).map_err(|e| {
                    Error::Encode(format!("Failed to write tile {}: {}", path.display(), e))
                })?;
            }
        }
        Ok(())
    }
}

impl Default for DeepZoomExporter {
    fn default() -> Self {
        Self::new()
    }
}

impl TileExporter for DeepZoomExporter {
    fn export(&self, image: &DynamicImage, descriptor: &Path) -> Result<()> {
        let (width, height) = image.dimensions();
        let files_dir = tiles_dir(descriptor)?;
        let max = max_level(width, height);

        for level in 0..=max {
            let (lw, lh) = level_dimensions(width, height, max - level);
            let level_image = if level == max {
                image.clone()
            } else {
                image.resize_exact(lw, lh, FilterType::Lanczos3)
            };
            self.write_level(&level_image, &files_dir.join(level.to_string()))?;
        }

        fs::write(descriptor, self.descriptor_xml(width, height))?;
        tracing::debug!(
            "Wrote {} deep zoom levels for {}",
            max + 1,
            descriptor.display()
        );
        Ok(())
    }
}

/// `photo.dzi` -> `photo_files`.
pub fn tiles_dir(descriptor: &Path) -> Result<PathBuf> {
    let stem = descriptor
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| Error::Config(format!("Invalid DZI path {}", descriptor.display())))?;
    Ok(descriptor.with_file_name(format!("{}_files", stem)))
}

/// Index of the full-resolution level.
pub fn max_level(width: u32, height: u32) -> u32 {
    let longest = width.max(height).max(1);
    // ceil(log2(longest))
    32 - (longest - 1).leading_zeros()
}

/// Size of the level `halvings` steps below full resolution.
pub fn level_dimensions(width: u32, height: u32, halvings: u32) -> (u32, u32) {
    let scale = 1u64 << halvings;
    let w = (width as u64).div_ceil(scale).max(1);
    let h = (height as u64).div_ceil(scale).max(1);
    (w as u32, h as u32)
}

/// `(index, start, length)` of every tile along one axis, overlap included.
pub fn tile_spans(length: u32, tile_size: u32, overlap: u32) -> Vec<(u32, u32, u32)> {
    let count = length.div_ceil(tile_size).max(1);
    (0..count)
        .map(|i| {
            let start = (i * tile_size).saturating_sub(if i > 0 { overlap } else { 0 });
            let end = ((i + 1) * tile_size + overlap).min(length);
            (i, start, end - start)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_max_level() {
        assert_eq!(max_level(1, 1), 0);
        assert_eq!(max_level(2, 1), 1);
        assert_eq!(max_level(300, 200), 9);
        assert_eq!(max_level(512, 512), 9);
        assert_eq!(max_level(513, 10), 10);
    }

    #[test]
    fn test_level_dimensions_round_up() {
        assert_eq!(level_dimensions(300, 200, 0), (300, 200));
        assert_eq!(level_dimensions(300, 200, 1), (150, 100));
        assert_eq!(level_dimensions(300, 200, 3), (38, 25));
        assert_eq!(level_dimensions(300, 200, 9), (1, 1));
    }

    #[test]
    fn test_tile_spans_include_overlap() {
        assert_eq!(tile_spans(100, 254, 1), vec![(0, 0, 100)]);
        assert_eq!(tile_spans(300, 254, 1), vec![(0, 0, 255), (1, 253, 47)]);
        assert_eq!(
            tile_spans(600, 254, 1),
            vec![(0, 0, 255), (1, 253, 256), (2, 507, 93)]
        );
    }

    #[test]
    fn test_tiles_dir_name() {
        assert_eq!(
            tiles_dir(Path::new("/out/photo.dzi")).unwrap(),
            PathBuf::from("/out/photo_files")
        );
    }

    #[test]
    fn test_export_writes_descriptor_and_pyramid() {
        let dir = tempdir().unwrap();
        let descriptor = dir.path().join("photo.dzi");
        let image = DynamicImage::ImageRgba8(image::RgbaImage::from_pixel(
            300,
            200,
            image::Rgba([200, 10, 10, 255]),
        ));

        DeepZoomExporter::new().export(&image, &descriptor).unwrap();

        let xml = fs::read_to_string(&descriptor).unwrap();
        assert!(xml.contains("TileSize=\"254\""));
        assert!(xml.contains("Width=\"300\" Height=\"200\""));

        let files = dir.path().join("photo_files");
        assert!(files.join("0/0_0.jpg").exists());
        assert!(files.join("9/0_0.jpg").exists());
        assert!(files.join("9/1_0.jpg").exists());
        assert!(!files.join("9/0_1.jpg").exists());

        let tile = image::open(files.join("9/1_0.jpg")).unwrap();
        assert_eq!((tile.width(), tile.height()), (47, 200));
    }
}
