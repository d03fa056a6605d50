use super::format::output_extension;
use super::ImageService;
use crate::config::ProcessingConfig;
use crate::models::TransformResult;
use crate::{Error, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Writes a small placeholder file instead of decoding anything.
#[derive(Clone)]
pub struct MockImageProcessor {
    process_count: Arc<Mutex<usize>>,
    failing_sources: Arc<Mutex<Vec<String>>>,
    should_fail: Arc<Mutex<bool>>,
    inputs: Arc<Mutex<Vec<PathBuf>>>,
}

impl MockImageProcessor {
    pub fn new() -> Self {
        Self {
            process_count: Arc::new(Mutex::new(0)),
            failing_sources: Arc::new(Mutex::new(Vec::new())),
            should_fail: Arc::new(Mutex::new(false)),
            inputs: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_failure(self, should_fail: bool) -> Self {
        *self.should_fail.lock().unwrap() = should_fail;
        self
    }

    /// Fail for inputs whose file name contains `fragment`.
    pub fn with_failure_for(self, fragment: &str) -> Self {
        self.failing_sources
            .lock()
            .unwrap()
            .push(fragment.to_string());
        self
    }

    pub fn get_process_count(&self) -> usize {
        *self.process_count.lock().unwrap()
    }

    pub fn get_inputs(&self) -> Vec<PathBuf> {
        self.inputs.lock().unwrap().clone()
    }

    fn fails_for(&self, input: &Path) -> bool {
        if *self.should_fail.lock().unwrap() {
            return true;
        }
        let name = input
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        self.failing_sources
            .lock()
            .unwrap()
            .iter()
            .any(|fragment| name.contains(fragment.as_str()))
    }
}

impl Default for MockImageProcessor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ImageService for MockImageProcessor {
    async fn transform(
        &self,
        input: &Path,
        output_stem: &Path,
        config: &ProcessingConfig,
    ) -> Result<TransformResult> {
        self.inputs.lock().unwrap().push(input.to_path_buf());

        if self.fails_for(input) {
            return Err(Error::Decode(format!(
                "Mock failure for {}",
                input.display()
            )));
        }

        *self.process_count.lock().unwrap() += 1;

        let extension = output_extension(config.format(), input)?;
        let mut name = output_stem.as_os_str().to_owned();
        name.push(".");
        name.push(&extension);
        let output = PathBuf::from(name);

        std::fs::write(&output, b"mock image")?;
        Ok(TransformResult::success(input.to_path_buf(), output))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_mock_image_processor_writes_output() {
        let dir = tempdir().unwrap();
        let processor = MockImageProcessor::new();
        let config = ProcessingConfig::default();

        let result = processor
            .transform(Path::new("a.png"), &dir.path().join("out"), &config)
            .await
            .unwrap();

        assert!(result.succeeded);
        assert!(result.output_path.ends_with("out.png"));
        assert!(result.output_path.exists());
        assert_eq!(processor.get_process_count(), 1);
    }

    #[tokio::test]
    async fn test_mock_with_failure() {
        let processor = MockImageProcessor::new().with_failure(true);

        let result = processor
            .transform(Path::new("a.png"), Path::new("out"), &ProcessingConfig::default())
            .await;
        assert!(result.is_err());
        assert_eq!(processor.get_process_count(), 0);
    }

    #[tokio::test]
    async fn test_mock_fails_only_matching_sources() {
        let dir = tempdir().unwrap();
        let processor = MockImageProcessor::new().with_failure_for("broken");
        let config = ProcessingConfig::default();

        assert!(processor
            .transform(Path::new("broken.jpg"), &dir.path().join("a"), &config)
            .await
            .is_err());
        assert!(processor
            .transform(Path::new("fine.jpg"), &dir.path().join("b"), &config)
            .await
            .is_ok());
        assert_eq!(processor.get_inputs().len(), 2);
    }
}
