//! Digest of the configuration fields that change the rendered output.
//!
//! Stored on each catalog item after a successful run so an unchanged
//! configuration can skip the item on the next run.

use crate::config::ProcessingConfig;
use sha2::{Digest, Sha256};

/// SHA-256 of `background_color`, `canvas_height`, `canvas_width`, `image_format`
/// and `image_size_mode`, joined with `_`, as lowercase hex.
///
/// Template and deletion settings are not part of the digest.
pub fn compute(config: &ProcessingConfig) -> String {
    let material = format!(
        "{}_{}_{}_{}_{}",
        config.background_color(),
        config.canvas_height(),
        config.canvas_width(),
        config.format(),
        config.size_mode()
    );
    format!("{:x}", Sha256::digest(material.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BackgroundColor, OutputFormat, SizeMode};

    fn base() -> ProcessingConfig {
        ProcessingConfig::new(900, 900).unwrap()
    }

    #[test]
    fn test_digest_is_lowercase_hex_sha256() {
        let digest = compute(&base());
        assert_eq!(digest.len(), 64);
        assert!(digest
            .chars()
            .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)));
    }

    #[test]
    fn test_known_digest_material() {
        let expected = format!(
            "{:x}",
            Sha256::digest(b"transparent_900_900_AUTO_contain")
        );
        assert_eq!(compute(&base()), expected);
    }

    #[test]
    fn test_ignores_unfingerprinted_fields() {
        let other = base()
            .with_template("{name}")
            .unwrap()
            .with_delete_source_images(true)
            .with_destination(Some("/tmp/out".into()));
        assert_eq!(compute(&base()), compute(&other));
    }

    #[test]
    fn test_each_field_changes_digest() {
        let reference = compute(&base());
        let variants = [
            base().with_background(BackgroundColor::Rgb(0, 0, 0)),
            ProcessingConfig::new(900, 901).unwrap(),
            ProcessingConfig::new(901, 900).unwrap(),
            base().with_format(OutputFormat::Png),
            base().with_size_mode(SizeMode::Cover),
        ];

        for variant in &variants {
            assert_ne!(compute(variant), reference, "variant {:?}", variant);
        }
    }

    #[test]
    fn test_swapped_dimensions_differ() {
        let wide = ProcessingConfig::new(1200, 800).unwrap();
        let tall = ProcessingConfig::new(800, 1200).unwrap();
        assert_ne!(compute(&wide), compute(&tall));
    }
}
