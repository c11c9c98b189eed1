//! Document loading: PDF text extraction, deterministic chunking and corpus
//! discovery.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use uuid::Uuid;
use walkdir::WalkDir;

use super::tokenizer::TokenCounter;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("PDF extraction failed: {0}")]
    Pdf(String),
    #[error("document contains no extractable text")]
    NoText,
}

/// An immutable span of a source document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentChunk {
    pub id: String,
    pub document_id: String,
    pub source_document: String,
    pub chunk_index: usize,
    /// Character (not byte) offset of the chunk's first character.
    pub char_offset: usize,
    pub token_count: usize,
    pub text: String,
}

/// Point id stable across runs for the same document and chunk index.
pub fn chunk_id(document_id: &str, chunk_index: usize) -> String {
    let digest = Sha256::digest(format!("{}:{}", document_id, chunk_index).as_bytes());
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&digest[..16]);
    Uuid::from_bytes(bytes).to_string()
}

/// Fixed-size character window with overlap. The window end snaps back to a
/// sentence end, then to whitespace, when one falls in its last fifth.
#[derive(Clone)]
pub struct Chunker {
    chunk_size: usize,
    chunk_overlap: usize,
    counter: Arc<dyn TokenCounter>,
}

impl Chunker {
    pub fn new(chunk_size: usize, chunk_overlap: usize, counter: Arc<dyn TokenCounter>) -> Self {
        let chunk_size = chunk_size.max(1);
        Self {
            chunk_size,
            chunk_overlap: chunk_overlap.min(chunk_size - 1),
            counter,
        }
    }

    pub fn split(&self, document_id: &str, source: &str, text: &str) -> Vec<DocumentChunk> {
        let chars: Vec<char> = text.chars().collect();
        let total = chars.len();
        let mut chunks = Vec::new();
        let mut start = 0;

        while start < total {
            let hard_end = (start + self.chunk_size).min(total);
            let end = if hard_end < total {
                snap_end(&chars, start, hard_end)
            } else {
                hard_end
            };

            let window = &chars[start..end];
            let leading = window.iter().take_while(|c| c.is_whitespace()).count();
            let body: String = window[leading..].iter().collect();
            let body = body.trim_end();

            if !body.is_empty() {
                let chunk_index = chunks.len();
                chunks.push(DocumentChunk {
                    id: chunk_id(document_id, chunk_index),
                    document_id: document_id.to_string(),
                    source_document: source.to_string(),
                    chunk_index,
                    char_offset: start + leading,
                    token_count: self.counter.count(body),
                    text: body.to_string(),
                });
            }

            if end >= total {
                break;
            }
            start = end.saturating_sub(self.chunk_overlap).max(start + 1);
        }

        chunks
    }
}

fn snap_end(chars: &[char], start: usize, hard_end: usize) -> usize {
    let window = hard_end - start;
    let floor = start + (window * 4) / 5;

    let sentence = (floor.max(start + 1)..hard_end)
        .rev()
        .find(|&i| matches!(chars[i - 1], '.' | '!' | '?') && chars[i].is_whitespace());
    if let Some(i) = sentence {
        return i;
    }

    (floor.max(start + 1)..hard_end)
        .rev()
        .find(|&i| chars[i].is_whitespace())
        .unwrap_or(hard_end)
}

/// Collapses extraction noise: CRLF, trailing spaces, and runs of blank lines.
pub fn normalize_text(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut blank_run = 0;

    for line in raw.replace("\r\n", "\n").replace('\r', "\n").lines() {
        let line = line.trim_end();
        if line.trim().is_empty() {
            blank_run += 1;
            if blank_run == 1 && !out.is_empty() {
                out.push('\n');
            }
            continue;
        }
        blank_run = 0;
        out.push_str(line);
        out.push('\n');
    }

    out.trim().to_string()
}

/// Extracts and normalizes PDF text off the async runtime. Malformed PDFs
/// that make the parser panic surface as errors.
pub async fn extract_pdf_text(bytes: Vec<u8>) -> Result<String, ExtractError> {
    let joined = tokio::task::spawn_blocking(move || {
        pdf_extract::extract_text_from_mem(&bytes).map_err(|e| ExtractError::Pdf(e.to_string()))
    })
    .await;

    let raw = match joined {
        Ok(result) => result?,
        Err(e) => return Err(ExtractError::Pdf(format!("parser aborted: {}", e))),
    };

    let text = normalize_text(&raw);
    if text.is_empty() {
        return Err(ExtractError::NoText);
    }
    Ok(text)
}

pub fn is_pdf_bytes(bytes: &[u8]) -> bool {
    bytes.starts_with(b"%PDF-")
}

/// All `*.pdf` files under `dir`, sorted for a stable indexing order.
pub fn discover_pdfs(dir: &Path) -> Vec<PathBuf> {
    if !dir.is_dir() {
        return Vec::new();
    }

    let mut files: Vec<PathBuf> = WalkDir::new(dir)
        .follow_links(true)
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                tracing::warn!("Skipping unreadable corpus entry: {}", e);
                None
            }
        })
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| {
            path.extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| ext.eq_ignore_ascii_case("pdf"))
                .unwrap_or(false)
        })
        .collect();
    files.sort();
    files
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rag::tokenizer::ApproxTokenCounter;

    fn chunker(size: usize, overlap: usize) -> Chunker {
        Chunker::new(size, overlap, Arc::new(ApproxTokenCounter))
    }

    fn sample_text() -> String {
        let mut text = String::new();
        for i in 0..40 {
            text.push_str(&format!(
                "Section {} of the standards restricts gifts from prohibited sources. ",
                i
            ));
        }
        text
    }

    #[test]
    fn chunking_is_deterministic() {
        let text = sample_text();
        let first = chunker(200, 40).split("doc-1", "ethics.pdf", &text);
        let second = chunker(200, 40).split("doc-1", "ethics.pdf", &text);

        assert!(first.len() > 1);
        assert_eq!(first, second);
    }

    #[test]
    fn chunks_respect_window_and_cover_text() {
        let text = sample_text();
        let chars: Vec<char> = text.chars().collect();
        let chunks = chunker(200, 40).split("doc-1", "ethics.pdf", &text);

        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.chunk_index, i);
            assert!(chunk.text.chars().count() <= 200);
            let at_offset: String = chars[chunk.char_offset..]
                .iter()
                .take(chunk.text.chars().count())
                .collect();
            assert_eq!(at_offset, chunk.text);
        }

        for pair in chunks.windows(2) {
            let prev_end = pair[0].char_offset + pair[0].text.chars().count();
            assert!(pair[1].char_offset < prev_end, "consecutive chunks must overlap");
            assert!(pair[1].char_offset > pair[0].char_offset);
        }

        let last = chunks.last().unwrap();
        assert_eq!(
            last.char_offset + last.text.chars().count(),
            text.trim_end().chars().count()
        );
    }

    #[test]
    fn snaps_to_sentence_boundary() {
        let text = sample_text();
        // Sentences are 68 chars; the second ends inside the last fifth of 150.
        let chunks = chunker(150, 30).split("doc-1", "ethics.pdf", &text);
        assert!(chunks[0].text.ends_with('.'));
        assert_eq!(chunks[0].text.chars().count(), 135);
    }

    #[test]
    fn empty_text_yields_no_chunks() {
        assert!(chunker(100, 10).split("d", "s", "").is_empty());
        assert!(chunker(100, 10).split("d", "s", "   \n\t ").is_empty());
    }

    #[test]
    fn token_counts_are_recorded() {
        let chunks = chunker(1000, 100).split("d", "s", "abcdefgh");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].token_count, 2);
    }

    #[test]
    fn chunk_ids_are_stable_uuids() {
        let id = chunk_id("doc-1", 3);
        assert_eq!(id, chunk_id("doc-1", 3));
        assert_ne!(id, chunk_id("doc-1", 4));
        assert!(Uuid::parse_str(&id).is_ok());
    }

    #[test]
    fn normalize_collapses_blank_runs() {
        let raw = "Title  \r\n\r\n\r\n\r\nBody line\r\n   \nEnd";
        assert_eq!(normalize_text(raw), "Title\n\nBody line\n\nEnd");
    }

    #[test]
    fn discovers_pdfs_recursively() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("nested")).unwrap();
        std::fs::write(dir.path().join("b.pdf"), b"%PDF-1.4").unwrap();
        std::fs::write(dir.path().join("nested/a.PDF"), b"%PDF-1.4").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"x").unwrap();

        let found = discover_pdfs(dir.path());
        assert_eq!(found.len(), 2);
        assert!(found.iter().all(|p| p
            .extension()
            .unwrap()
            .to_string_lossy()
            .eq_ignore_ascii_case("pdf")));
    }

    #[test]
    fn pdf_magic_bytes() {
        assert!(is_pdf_bytes(b"%PDF-1.7\n..."));
        assert!(!is_pdf_bytes(b"PK\x03\x04"));
    }
}
