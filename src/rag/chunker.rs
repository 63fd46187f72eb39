//! Length-based sliding-window chunker.
//!
//! Splits text into segments of at most `max_size` characters where
//! consecutive segments share `overlap` characters. Splitting is purely
//! positional; no sentence or token awareness.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::errors::ApiError;

/// A chunk of a source document, the unit of embedding and retrieval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextChunk {
    /// Unique chunk identifier.
    pub chunk_id: String,
    /// The text content of the chunk.
    pub content: String,
    /// Source identifier (file name).
    pub source: String,
    /// Character offset in the original document.
    pub start_offset: usize,
    /// Chunk index within the source.
    pub chunk_index: usize,
}

pub fn chunk_text(
    text: &str,
    source: &str,
    max_size: usize,
    overlap: usize,
) -> Result<Vec<TextChunk>, ApiError> {
    if max_size == 0 || overlap >= max_size {
        return Err(ApiError::BadRequest(format!(
            "invalid chunk parameters: max_size={} overlap={}",
            max_size, overlap
        )));
    }

    let chars: Vec<char> = text.chars().collect();
    if chars.is_empty() {
        return Err(ApiError::ChunkingEmpty);
    }

    let step = max_size - overlap;
    let mut chunks = Vec::new();
    let mut start = 0;
    let mut chunk_index = 0;

    while start < chars.len() {
        let end = (start + max_size).min(chars.len());
        chunks.push(TextChunk {
            chunk_id: Uuid::new_v4().to_string(),
            content: chars[start..end].iter().collect(),
            source: source.to_string(),
            start_offset: start,
            chunk_index,
        });

        if end == chars.len() {
            break;
        }
        start += step;
        chunk_index += 1;
    }

    if chunks.is_empty() {
        return Err(ApiError::ChunkingEmpty);
    }

    Ok(chunks)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn covers_entire_input_within_bounds() {
        let text: String = ('a'..='z').cycle().take(1000).collect();
        let chunks = chunk_text(&text, "doc", 100, 20).unwrap();

        for chunk in &chunks {
            assert!(chunk.content.chars().count() <= 100);
        }

        // Every character position appears in at least one chunk.
        let mut covered = vec![false; 1000];
        for chunk in &chunks {
            let len = chunk.content.chars().count();
            for pos in chunk.start_offset..chunk.start_offset + len {
                covered[pos] = true;
            }
        }
        assert!(covered.into_iter().all(|c| c));
    }

    #[test]
    fn consecutive_chunks_share_overlap() {
        let text: String = "0123456789".repeat(10);
        let chunks = chunk_text(&text, "doc", 40, 10).unwrap();
        assert!(chunks.len() >= 2);

        for window in chunks.windows(2) {
            let tail: String = window[0]
                .content
                .chars()
                .skip(window[0].content.chars().count() - 10)
                .collect();
            let head: String = window[1].content.chars().take(10).collect();
            assert_eq!(tail, head);
        }
    }

    #[test]
    fn short_input_yields_single_chunk() {
        let chunks = chunk_text("hello", "doc", 512, 64).unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].content, "hello");
        assert_eq!(chunks[0].start_offset, 0);
    }

    #[test]
    fn empty_input_is_an_error() {
        assert!(matches!(
            chunk_text("", "doc", 512, 64),
            Err(ApiError::ChunkingEmpty)
        ));
    }

    #[test]
    fn overlap_must_be_smaller_than_max_size() {
        assert!(matches!(
            chunk_text("some text", "doc", 64, 64),
            Err(ApiError::BadRequest(_))
        ));
    }

    #[test]
    fn multibyte_text_chunks_on_char_boundaries() {
        let text = "日本語のテキスト分割".repeat(20);
        let chunks = chunk_text(&text, "doc", 16, 4).unwrap();
        for chunk in &chunks {
            assert!(chunk.content.chars().count() <= 16);
        }
    }
}
