//! Progress reporting port
//!
//! Runs report human-readable progress through an injected [`ProgressSink`]
//! instead of talking to any particular front end.

use std::sync::{Arc, Mutex};

pub trait ProgressSink: Send + Sync {
    fn record(&self, message: &str);
}

/// Forwards progress messages to `tracing` at info level.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl ProgressSink for TracingSink {
    fn record(&self, message: &str) {
        tracing::info!(target: "catalog_image_sync::progress", "{}", message);
    }
}

/// Collects messages in memory.
#[derive(Clone, Default)]
pub struct MemorySink {
    messages: Arc<Mutex<Vec<String>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<String> {
        self.messages
            .lock()
            .map(|messages| messages.clone())
            .unwrap_or_default()
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.messages().iter().any(|m| m.contains(needle))
    }
}

impl ProgressSink for MemorySink {
    fn record(&self, message: &str) {
        if let Ok(mut messages) = self.messages.lock() {
            messages.push(message.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_sink_keeps_order() {
        let sink = MemorySink::new();
        sink.record("first");
        sink.record("second");

        assert_eq!(sink.messages(), vec!["first", "second"]);
        assert!(sink.contains("sec"));
        assert!(!sink.contains("third"));
    }

    #[test]
    fn test_memory_sink_clones_share_buffer() {
        let sink = MemorySink::new();
        let observer = sink.clone();
        let port: Arc<dyn ProgressSink> = Arc::new(sink);

        port.record("shared");
        assert_eq!(observer.messages(), vec!["shared"]);
    }
}
