//! Processing configuration and store credentials
//!
//! [`ProcessingConfig`] is validated once when it is built and then passed by
//! reference through every stage of a run. [`Credentials`] are read from the
//! environment for the REST client.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Largest canvas edge accepted by the processing options.
pub const MAX_CANVAS_DIMENSION: u32 = 2540;

pub const DEFAULT_CANVAS_SIZE: u32 = 900;
pub const DEFAULT_TEMPLATE: &str = "{slug}_{sku}_{width}x{height}";
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;

/// Canvas fill colour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackgroundColor {
    Transparent,
    Rgb(u8, u8, u8),
}

impl BackgroundColor {
    pub fn to_rgba(self) -> [u8; 4] {
        match self {
            BackgroundColor::Transparent => [0, 0, 0, 0],
            BackgroundColor::Rgb(r, g, b) => [r, g, b, 255],
        }
    }
}

impl fmt::Display for BackgroundColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackgroundColor::Transparent => write!(f, "transparent"),
            BackgroundColor::Rgb(r, g, b) => write!(f, "#{:02x}{:02x}{:02x}", r, g, b),
        }
    }
}

impl FromStr for BackgroundColor {
    type Err = Error;

    fn from_str(input: &str) -> Result<Self> {
        let value = input.trim();
        if value.eq_ignore_ascii_case("transparent") {
            return Ok(BackgroundColor::Transparent);
        }

        let invalid = || Error::Config(format!("Invalid background color '{}'", input));
        let hex = value.strip_prefix('#').ok_or_else(invalid)?;
        if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(invalid());
        }

        let expanded = match hex.len() {
            3 => hex.chars().flat_map(|c| [c, c]).collect::<String>(),
            6 => hex.to_string(),
            _ => return Err(invalid()),
        };
        let channel = |i: usize| u8::from_str_radix(&expanded[i..i + 2], 16).map_err(|_| invalid());

        Ok(BackgroundColor::Rgb(channel(0)?, channel(2)?, channel(4)?))
    }
}

/// How the source image is scaled onto the canvas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SizeMode {
    Contain,
    Cover,
}

impl fmt::Display for SizeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SizeMode::Contain => write!(f, "contain"),
            SizeMode::Cover => write!(f, "cover"),
        }
    }
}

impl FromStr for SizeMode {
    type Err = Error;

    fn from_str(input: &str) -> Result<Self> {
        match input.trim().to_ascii_lowercase().as_str() {
            "contain" => Ok(SizeMode::Contain),
            "cover" => Ok(SizeMode::Cover),
            _ => Err(Error::Config(format!("Unknown image size mode '{}'", input))),
        }
    }
}

/// Output format selector. `Auto` keeps the source file's format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OutputFormat {
    Auto,
    Jpeg,
    Png,
    Gif,
    Webp,
    Avif,
    Dzi,
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OutputFormat::Auto => "AUTO",
            OutputFormat::Jpeg => "JPEG",
            OutputFormat::Png => "PNG",
            OutputFormat::Gif => "GIF",
            OutputFormat::Webp => "WEBP",
            OutputFormat::Avif => "AVIF",
            OutputFormat::Dzi => "DZI",
        };
        write!(f, "{}", name)
    }
}

impl FromStr for OutputFormat {
    type Err = Error;

    fn from_str(input: &str) -> Result<Self> {
        match input.trim().to_ascii_uppercase().as_str() {
            "AUTO" => Ok(OutputFormat::Auto),
            "JPEG" | "JPG" => Ok(OutputFormat::Jpeg),
            "PNG" => Ok(OutputFormat::Png),
            "GIF" => Ok(OutputFormat::Gif),
            "WEBP" => Ok(OutputFormat::Webp),
            "AVIF" => Ok(OutputFormat::Avif),
            "DZI" => Ok(OutputFormat::Dzi),
            _ => Err(Error::Config(format!("Unknown image format '{}'", input))),
        }
    }
}

/// Validated, immutable settings for one processing run.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessingConfig {
    canvas_width: u32,
    canvas_height: u32,
    background_color: BackgroundColor,
    size_mode: SizeMode,
    format: OutputFormat,
    filename_template: String,
    delete_source_images: bool,
    destination: Option<PathBuf>,
}

impl ProcessingConfig {
    /// Build a config with the default options and the given canvas size.
    pub fn new(canvas_width: u32, canvas_height: u32) -> Result<Self> {
        validate_dimension("canvas width", canvas_width)?;
        validate_dimension("canvas height", canvas_height)?;

        Ok(Self {
            canvas_width,
            canvas_height,
            background_color: BackgroundColor::Transparent,
            size_mode: SizeMode::Contain,
            format: OutputFormat::Auto,
            filename_template: DEFAULT_TEMPLATE.to_string(),
            delete_source_images: false,
            destination: None,
        })
    }

    pub fn with_background(mut self, color: BackgroundColor) -> Self {
        self.background_color = color;
        self
    }

    pub fn with_size_mode(mut self, mode: SizeMode) -> Self {
        self.size_mode = mode;
        self
    }

    pub fn with_format(mut self, format: OutputFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_template(mut self, template: impl Into<String>) -> Result<Self> {
        let template = template.into();
        if template.trim().is_empty() {
            return Err(Error::Config("Filename template must not be empty".to_string()));
        }
        self.filename_template = template;
        Ok(self)
    }

    pub fn with_delete_source_images(mut self, delete: bool) -> Self {
        self.delete_source_images = delete;
        self
    }

    pub fn with_destination(mut self, destination: Option<PathBuf>) -> Self {
        self.destination = destination;
        self
    }

    pub fn canvas_width(&self) -> u32 {
        self.canvas_width
    }

    pub fn canvas_height(&self) -> u32 {
        self.canvas_height
    }

    pub fn background_color(&self) -> BackgroundColor {
        self.background_color
    }

    pub fn size_mode(&self) -> SizeMode {
        self.size_mode
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }

    pub fn filename_template(&self) -> &str {
        &self.filename_template
    }

    pub fn delete_source_images(&self) -> bool {
        self.delete_source_images
    }

    pub fn destination(&self) -> Option<&PathBuf> {
        self.destination.as_ref()
    }

    /// Remote runs upload a single file per image; a deep-zoom tile set is not one.
    pub fn ensure_uploadable(&self) -> Result<()> {
        if self.format == OutputFormat::Dzi {
            return Err(Error::Config(
                "DZI output can only be produced by local processing".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            canvas_width: DEFAULT_CANVAS_SIZE,
            canvas_height: DEFAULT_CANVAS_SIZE,
            background_color: BackgroundColor::Transparent,
            size_mode: SizeMode::Contain,
            format: OutputFormat::Auto,
            filename_template: DEFAULT_TEMPLATE.to_string(),
            delete_source_images: false,
            destination: None,
        }
    }
}

fn validate_dimension(name: &str, value: u32) -> Result<()> {
    if value == 0 || value > MAX_CANVAS_DIMENSION {
        return Err(Error::Config(format!(
            "Invalid {} {}: expected 1..={}",
            name, value, MAX_CANVAS_DIMENSION
        )));
    }
    Ok(())
}

/// Loosely typed options as stored in an options file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingOptions {
    pub canvas_width: u32,
    pub canvas_height: u32,
    pub background_color: String,
    pub image_size: String,
    pub image_format: String,
    pub template: String,
    pub delete_images: bool,
    pub destination_path: Option<PathBuf>,
}

impl Default for ProcessingOptions {
    fn default() -> Self {
        Self {
            canvas_width: DEFAULT_CANVAS_SIZE,
            canvas_height: DEFAULT_CANVAS_SIZE,
            background_color: "transparent".to_string(),
            image_size: "contain".to_string(),
            image_format: "AUTO".to_string(),
            template: DEFAULT_TEMPLATE.to_string(),
            delete_images: false,
            destination_path: None,
        }
    }
}

impl ProcessingOptions {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

impl TryFrom<ProcessingOptions> for ProcessingConfig {
    type Error = Error;

    fn try_from(options: ProcessingOptions) -> Result<Self> {
        Ok(ProcessingConfig::new(options.canvas_width, options.canvas_height)?
            .with_background(options.background_color.parse()?)
            .with_size_mode(options.image_size.parse()?)
            .with_format(options.image_format.parse()?)
            .with_template(options.template)?
            .with_delete_source_images(options.delete_images)
            .with_destination(options.destination_path))
    }
}

/// Store endpoint and credentials for the REST client.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub store_url: String,
    pub consumer_key: String,
    pub consumer_secret: String,
    pub wp_username: String,
    pub wp_app_password: String,
    pub http_timeout: Duration,
}

impl Credentials {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let required = |name: &str| {
            std::env::var(name).map_err(|_| Error::Config(format!("{} not set", name)))
        };

        let http_timeout = match std::env::var("HTTP_TIMEOUT_SECS") {
            Ok(raw) => raw.parse::<u64>().map_err(|_| {
                Error::Config(format!("HTTP_TIMEOUT_SECS must be a number, got '{}'", raw))
            })?,
            Err(_) => DEFAULT_HTTP_TIMEOUT_SECS,
        };

        Ok(Self {
            store_url: required("STORE_URL")?.trim_end_matches('/').to_string(),
            consumer_key: required("WC_CONSUMER_KEY")?,
            consumer_secret: required("WC_CONSUMER_SECRET")?,
            wp_username: required("WP_USERNAME")?,
            wp_app_password: required("WP_APP_PASSWORD")?,
            http_timeout: Duration::from_secs(http_timeout),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_background_colors() {
        assert_eq!(
            "transparent".parse::<BackgroundColor>().unwrap(),
            BackgroundColor::Transparent
        );
        assert_eq!(
            "#FF8000".parse::<BackgroundColor>().unwrap(),
            BackgroundColor::Rgb(255, 128, 0)
        );
        assert_eq!(
            "#fff".parse::<BackgroundColor>().unwrap(),
            BackgroundColor::Rgb(255, 255, 255)
        );
        assert!("red".parse::<BackgroundColor>().is_err());
        assert!("#12345".parse::<BackgroundColor>().is_err());
        assert!("#gggggg".parse::<BackgroundColor>().is_err());
    }

    #[test]
    fn test_background_color_display_is_normalized() {
        let color: BackgroundColor = "#ABCDEF".parse().unwrap();
        assert_eq!(color.to_string(), "#abcdef");
        assert_eq!(BackgroundColor::Transparent.to_string(), "transparent");
    }

    #[test]
    fn test_parse_format_and_mode() {
        assert_eq!("auto".parse::<OutputFormat>().unwrap(), OutputFormat::Auto);
        assert_eq!("WebP".parse::<OutputFormat>().unwrap(), OutputFormat::Webp);
        assert_eq!("DZI".parse::<OutputFormat>().unwrap(), OutputFormat::Dzi);
        assert!("TIFF".parse::<OutputFormat>().is_err());

        assert_eq!("Cover".parse::<SizeMode>().unwrap(), SizeMode::Cover);
        assert!("stretch".parse::<SizeMode>().is_err());
    }

    #[test]
    fn test_rejects_invalid_canvas_dimensions() {
        assert!(matches!(ProcessingConfig::new(0, 100), Err(Error::Config(_))));
        assert!(matches!(ProcessingConfig::new(100, 0), Err(Error::Config(_))));
        assert!(matches!(
            ProcessingConfig::new(MAX_CANVAS_DIMENSION + 1, 100),
            Err(Error::Config(_))
        ));
        assert!(ProcessingConfig::new(1, MAX_CANVAS_DIMENSION).is_ok());
    }

    #[test]
    fn test_rejects_empty_template() {
        let result = ProcessingConfig::new(10, 10).unwrap().with_template("  ");
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_options_json_converts_to_config() {
        let options = ProcessingOptions::from_json(
            r##"{
                "canvas_width": 1200,
                "canvas_height": 800,
                "background_color": "#000000",
                "image_size": "cover",
                "image_format": "WEBP",
                "delete_images": true
            }"##,
        )
        .unwrap();

        let config = ProcessingConfig::try_from(options).unwrap();
        assert_eq!(config.canvas_width(), 1200);
        assert_eq!(config.canvas_height(), 800);
        assert_eq!(config.background_color(), BackgroundColor::Rgb(0, 0, 0));
        assert_eq!(config.size_mode(), SizeMode::Cover);
        assert_eq!(config.format(), OutputFormat::Webp);
        assert_eq!(config.filename_template(), DEFAULT_TEMPLATE);
        assert!(config.delete_source_images());
    }

    #[test]
    fn test_options_with_unknown_format_fail() {
        let options = ProcessingOptions {
            image_format: "BMP".to_string(),
            ..ProcessingOptions::default()
        };
        assert!(matches!(
            ProcessingConfig::try_from(options),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_dzi_is_not_uploadable() {
        let config = ProcessingConfig::default().with_format(OutputFormat::Dzi);
        assert!(config.ensure_uploadable().is_err());
        assert!(ProcessingConfig::default().ensure_uploadable().is_ok());
    }
}
