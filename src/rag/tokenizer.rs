use std::path::Path;
use std::sync::Arc;

use tokenizers::Tokenizer;

/// Average characters per token for English prose with BPE tokenizers.
const CHARS_PER_TOKEN: usize = 4;

pub trait TokenCounter: Send + Sync {
    fn name(&self) -> &str;
    fn count(&self, text: &str) -> usize;
}

pub struct ApproxTokenCounter;

impl TokenCounter for ApproxTokenCounter {
    fn name(&self) -> &str {
        "approx"
    }

    fn count(&self, text: &str) -> usize {
        text.chars().count().div_ceil(CHARS_PER_TOKEN)
    }
}

/// Exact counts from a Hugging Face `tokenizer.json`.
pub struct HfTokenCounter {
    tokenizer: Tokenizer,
}

impl HfTokenCounter {
    pub fn from_file(path: &Path) -> Result<Self, String> {
        let tokenizer = Tokenizer::from_file(path).map_err(|e| e.to_string())?;
        Ok(Self { tokenizer })
    }
}

impl TokenCounter for HfTokenCounter {
    fn name(&self) -> &str {
        "huggingface"
    }

    fn count(&self, text: &str) -> usize {
        match self.tokenizer.encode(text, false) {
            Ok(encoding) => encoding.len(),
            Err(e) => {
                tracing::debug!("Tokenizer encode failed, using approximation: {}", e);
                ApproxTokenCounter.count(text)
            }
        }
    }
}

/// The configured tokenizer, or the approximation when none is configured
/// or it cannot be loaded.
pub fn token_counter(tokenizer_path: Option<&str>) -> Arc<dyn TokenCounter> {
    let Some(path) = tokenizer_path.map(str::trim).filter(|p| !p.is_empty()) else {
        return Arc::new(ApproxTokenCounter);
    };

    match HfTokenCounter::from_file(Path::new(path)) {
        Ok(counter) => {
            tracing::info!("Loaded tokenizer from {}", path);
            Arc::new(counter)
        }
        Err(e) => {
            tracing::warn!(
                "Failed to load tokenizer {}: {}; falling back to character estimate",
                path,
                e
            );
            Arc::new(ApproxTokenCounter)
        }
    }
}
