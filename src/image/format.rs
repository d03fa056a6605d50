//! Output format resolution and content types.

use crate::config::OutputFormat;
use crate::{Error, Result};
use image::ImageFormat;
use std::path::Path;

/// Extensions accepted as image input.
pub const INPUT_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "webp", "avif"];

/// Lowercase extension of `path`, if any.
pub fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

pub fn is_supported_input(path: &Path) -> bool {
    extension_of(path).is_some_and(|ext| INPUT_EXTENSIONS.contains(&ext.as_str()))
}

/// File extension to write for `format`. `Auto` keeps the source's extension.
pub fn output_extension(format: OutputFormat, source: &Path) -> Result<String> {
    let ext = match format {
        OutputFormat::Auto => {
            return extension_of(source).ok_or_else(|| {
                Error::Config(format!(
                    "Cannot keep the format of {}: it has no extension",
                    source.display()
                ))
            })
        }
        OutputFormat::Jpeg => "jpg",
        OutputFormat::Png => "png",
        OutputFormat::Gif => "gif",
        OutputFormat::Webp => "webp",
        OutputFormat::Avif => "avif",
        OutputFormat::Dzi => "dzi",
    };
    Ok(ext.to_string())
}

/// Encoder used for a raster output extension.
pub fn encoder_for(extension: &str) -> Result<ImageFormat> {
    match extension.to_ascii_lowercase().as_str() {
        "jpg" | "jpeg" => Ok(ImageFormat::Jpeg),
        "png" => Ok(ImageFormat::Png),
        "gif" => Ok(ImageFormat::Gif),
        "webp" => Ok(ImageFormat::WebP),
        "avif" => Ok(ImageFormat::Avif),
        other => Err(Error::Config(format!(
            "No encoder available for '.{}' output",
            other
        ))),
    }
}

/// Whether the encoder for `format` keeps an alpha channel.
pub fn supports_alpha(format: ImageFormat) -> bool {
    !matches!(format, ImageFormat::Jpeg)
}

pub fn content_type_for(extension: &str) -> &'static str {
    match extension.to_ascii_lowercase().as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "avif" => "image/avif",
        "dzi" => "application/xml",
        _ => "application/octet-stream",
    }
}

/// Sniff an image's type from its leading bytes, returning its usual extension.
pub fn detect_extension(bytes: &[u8]) -> Option<&'static str> {
    match bytes {
        [0xFF, 0xD8, 0xFF, ..] => Some("jpg"),
        [0x89, 0x50, 0x4E, 0x47, ..] => Some("png"),
        [0x47, 0x49, 0x46, 0x38, ..] => Some("gif"),
        [0x52, 0x49, 0x46, 0x46, _, _, _, _, 0x57, 0x45, 0x42, 0x50, ..] => Some("webp"),
        [_, _, _, _, 0x66, 0x74, 0x79, 0x70, 0x61, 0x76, 0x69, 0x66, ..] => Some("avif"),
        _ => {
            tracing::warn!(
                "Unrecognized image format (first 4 bytes: {:02X?})",
                &bytes[..bytes.len().min(4)]
            );
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auto_keeps_source_extension() {
        let ext = output_extension(OutputFormat::Auto, Path::new("a/photo.JPEG")).unwrap();
        assert_eq!(ext, "jpeg");
    }

    #[test]
    fn test_auto_without_extension_is_config_error() {
        let err = output_extension(OutputFormat::Auto, Path::new("a/photo")).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_explicit_formats() {
        let src = Path::new("x.png");
        assert_eq!(output_extension(OutputFormat::Jpeg, src).unwrap(), "jpg");
        assert_eq!(output_extension(OutputFormat::Gif, src).unwrap(), "gif");
        assert_eq!(output_extension(OutputFormat::Webp, src).unwrap(), "webp");
        assert_eq!(output_extension(OutputFormat::Avif, src).unwrap(), "avif");
        assert_eq!(output_extension(OutputFormat::Dzi, src).unwrap(), "dzi");
    }

    #[test]
    fn test_encoder_lookup() {
        assert_eq!(encoder_for("JPG").unwrap(), ImageFormat::Jpeg);
        assert_eq!(encoder_for("webp").unwrap(), ImageFormat::WebP);
        assert!(matches!(encoder_for("dzi"), Err(Error::Config(_))));
        assert!(!supports_alpha(ImageFormat::Jpeg));
        assert!(supports_alpha(ImageFormat::Png));
    }

    #[test]
    fn test_content_types() {
        assert_eq!(content_type_for("jpg"), "image/jpeg");
        assert_eq!(content_type_for("PNG"), "image/png");
        assert_eq!(content_type_for("avif"), "image/avif");
        assert_eq!(content_type_for("bin"), "application/octet-stream");
    }

    #[test]
    fn test_supported_inputs() {
        assert!(is_supported_input(Path::new("a.WEBP")));
        assert!(is_supported_input(Path::new("a.avif")));
        assert!(!is_supported_input(Path::new("a.tiff")));
        assert!(!is_supported_input(Path::new("README")));
    }

    #[test]
    fn test_detect_extension() {
        assert_eq!(detect_extension(&[0xFF, 0xD8, 0xFF, 0xE0]), Some("jpg"));
        assert_eq!(detect_extension(&[0x89, 0x50, 0x4E, 0x47, 0x0D]), Some("png"));
        assert_eq!(detect_extension(b"GIF89a"), Some("gif"));
        assert_eq!(
            detect_extension(&[
                0x52, 0x49, 0x46, 0x46, 0x00, 0x00, 0x00, 0x00, 0x57, 0x45, 0x42, 0x50
            ]),
            Some("webp")
        );
        assert_eq!(
            detect_extension(b"\x00\x00\x00\x1cftypavif"),
            Some("avif")
        );
        assert_eq!(detect_extension(&[]), None);
    }
}
