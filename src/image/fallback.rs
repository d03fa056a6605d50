//! Secondary decoding for codecs the `image` crate cannot read.
//!
//! The `image` crate is built without an AVIF/HEIF decoder. When it rejects
//! such a file, a [`FallbackDecoder`] converts the source into a lossless PNG
//! intermediate and the primary decoder retries on that.

use crate::{Error, Result};
use image::{DynamicImage, ImageReader};
use std::path::Path;
use std::process::Command;

/// Extensions for which the fallback path is attempted.
pub const FALLBACK_EXTENSIONS: &[&str] = &["avif", "heic", "heif"];

pub trait FallbackDecoder: Send + Sync {
    /// Re-encode `input` as a PNG at `output`, preserving alpha.
    fn convert_to_png(&self, input: &Path, output: &Path) -> Result<()>;
}

/// Converts through the ImageMagick command line. Not installed by default;
/// plug it in with `CanvasCompositor::with_fallback` to read HEIC/HEIF.
pub struct MagickDecoder {
    program: String,
}

impl MagickDecoder {
    pub fn new() -> Self {
        Self {
            program: "magick".to_string(),
        }
    }

    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }
}

impl Default for MagickDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl FallbackDecoder for MagickDecoder {
    fn convert_to_png(&self, input: &Path, output: &Path) -> Result<()> {
        let mut target = std::ffi::OsString::from("png32:");
        target.push(output.as_os_str());

        let status = Command::new(&self.program)
            .arg(input)
            .arg(&target)
            .status()
            .map_err(|e| Error::Decode(format!("Failed to run {}: {}", self.program, e)))?;

        if !status.success() {
            return Err(Error::Decode(format!(
                "{} could not convert {} ({})",
                self.program,
                input.display(),
                status
            )));
        }
        Ok(())
    }
}

fn decode_primary(path: &Path) -> std::result::Result<DynamicImage, String> {
    ImageReader::open(path)
        .map_err(|e| e.to_string())?
        .with_guessed_format()
        .map_err(|e| e.to_string())?
        .decode()
        .map_err(|e| e.to_string())
}

fn wants_fallback(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| FALLBACK_EXTENSIONS.iter().any(|f| e.eq_ignore_ascii_case(f)))
}

/// Decode `path`, falling back to `fallback` for codecs the primary decoder
/// may not support. The intermediate file is deleted on every exit path.
pub fn decode_with_fallback(
    path: &Path,
    fallback: Option<&dyn FallbackDecoder>,
) -> Result<DynamicImage> {
    let primary_error = match decode_primary(path) {
        Ok(image) => return Ok(image),
        Err(e) => e,
    };

    let decoder = match fallback {
        Some(decoder) if wants_fallback(path) => decoder,
        _ => {
            return Err(Error::Decode(format!(
                "Failed to decode {}: {}",
                path.display(),
                primary_error
            )))
        }
    };

    tracing::info!(
        "Primary decoder rejected {} ({}), trying fallback",
        path.display(),
        primary_error
    );

    let intermediate = tempfile::Builder::new()
        .prefix("fallback-")
        .suffix(".png")
        .tempfile()?;

    decoder.convert_to_png(path, intermediate.path())?;

    let decoded = decode_primary(intermediate.path()).map_err(|e| {
        Error::Decode(format!(
            "Failed to decode {} after fallback conversion: {}",
            path.display(),
            e
        ))
    });

    intermediate.close()?;
    decoded
}
