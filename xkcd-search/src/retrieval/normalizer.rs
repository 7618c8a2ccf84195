use anyhow::{Result, bail};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};

/// Turns free text into the ordered, deduplicated terms used for matching.
#[async_trait]
pub trait Normalizer: Send + Sync {
    async fn normalize(&self, text: &str) -> Result<Vec<String>>;
}

/// Stop-word filtering and Porter stemming from `xkcd-words`.
#[derive(Debug, Clone, Copy, Default)]
pub struct WordsNormalizer;

#[async_trait]
impl Normalizer for WordsNormalizer {
    async fn normalize(&self, text: &str) -> Result<Vec<String>> {
        Ok(xkcd_words::normalize(text))
    }
}

/// A mock normalizer for testing.
/// Lowercases and splits on whitespace, deduplicating, and records every input.
#[derive(Default)]
pub struct MockNormalizer {
    pub calls: Arc<Mutex<Vec<String>>>,
    fail: bool,
}

impl MockNormalizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// A normalizer whose every call fails
    pub fn failing() -> Self {
        Self {
            calls: Arc::default(),
            fail: true,
        }
    }
}

#[async_trait]
impl Normalizer for MockNormalizer {
    async fn normalize(&self, text: &str) -> Result<Vec<String>> {
        self.calls.lock().unwrap().push(text.to_string());
        if self.fail {
            bail!("normalizer unavailable");
        }
        let mut terms: Vec<String> = Vec::new();
        for word in text.split_whitespace().map(str::to_lowercase) {
            if !terms.contains(&word) {
                terms.push(word);
            }
        }
        Ok(terms)
    }
}
