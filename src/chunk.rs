//! Document chunking

use crate::{DocumentId, Error, Result};
use serde::{Deserialize, Serialize};

/// Default chunk size in characters
pub const DEFAULT_CHUNK_SIZE: usize = 500;

/// Unique chunk identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChunkId(pub uuid::Uuid);

impl ChunkId {
    /// Create a new random chunk ID
    #[must_use]
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for ChunkId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ChunkId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A span of document text paired with its embedding
///
/// Chunks are only built once the embedding exists, so a stored chunk always
/// has a vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    /// Unique chunk identifier
    pub id: ChunkId,
    /// Source document reference
    pub document_id: DocumentId,
    /// Chunk text content
    pub content: String,
    /// Character offset of the first character in the source document
    pub start_offset: usize,
    /// Embedding vector
    pub embedding: Vec<f32>,
}

impl Chunk {
    /// Create a new chunk
    #[must_use]
    pub fn new(
        document_id: DocumentId,
        content: String,
        start_offset: usize,
        embedding: Vec<f32>,
    ) -> Self {
        Self {
            id: ChunkId::new(),
            document_id,
            content,
            start_offset,
            embedding,
        }
    }

    /// Length of the chunk in characters
    #[must_use]
    pub fn len(&self) -> usize {
        self.content.chars().count()
    }

    /// Check if the chunk is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }

    /// First `max_chars` characters, with `...` appended
    #[must_use]
    pub fn preview(&self, max_chars: usize) -> String {
        let head: String = self.content.chars().take(max_chars).collect();
        format!("{head}...")
    }
}

/// A piece of text produced by a chunker, not yet embedded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment<'a> {
    /// The text
    pub text: &'a str,
    /// Character offset in the source text
    pub start_offset: usize,
}

/// Trait for text chunkers
pub trait Chunker: Send + Sync {
    /// Split text into ordered segments
    fn split<'a>(&self, text: &'a str) -> Result<Vec<Segment<'a>>>;

    /// Estimate segment count without materializing
    fn estimate_chunks(&self, text: &str) -> usize;
}

/// Split `text` into contiguous windows of `size` characters
///
/// Only the last window may be shorter. Empty text, or a zero size, yields
/// nothing.
#[must_use]
pub fn split_fixed(text: &str, size: usize) -> Vec<&str> {
    windows(text, size, 0)
        .into_iter()
        .map(|segment| segment.text)
        .collect()
}

fn windows(text: &str, size: usize, overlap: usize) -> Vec<Segment<'_>> {
    if size == 0 || text.is_empty() {
        return Vec::new();
    }

    // byte offset of every char boundary, plus the end of the string
    let bounds: Vec<usize> = text
        .char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(text.len()))
        .collect();
    let char_count = bounds.len() - 1;
    let step = size.saturating_sub(overlap).max(1);

    let mut segments = Vec::with_capacity(char_count / step + 1);
    let mut start = 0;
    loop {
        let end = (start + size).min(char_count);
        segments.push(Segment {
            text: &text[bounds[start]..bounds[end]],
            start_offset: start,
        });
        if end == char_count {
            break;
        }
        start += step;
    }
    segments
}

/// Fixed-size chunker, contiguous by default
#[derive(Debug, Clone)]
pub struct FixedSizeChunker {
    chunk_size: usize,
    overlap: usize,
}

impl FixedSizeChunker {
    /// Create a contiguous fixed-size chunker
    #[must_use]
    pub fn new(chunk_size: usize) -> Self {
        Self {
            chunk_size,
            overlap: 0,
        }
    }

    /// Repeat the last `overlap` characters of each window at the start of the next
    #[must_use]
    pub fn with_overlap(mut self, overlap: usize) -> Self {
        self.overlap = overlap;
        self
    }

    /// Configured chunk size
    #[must_use]
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Configured overlap
    #[must_use]
    pub fn overlap(&self) -> usize {
        self.overlap
    }

    fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(Error::InvalidConfig("chunk size must be positive".into()));
        }
        if self.overlap >= self.chunk_size {
            return Err(Error::InvalidConfig(format!(
                "overlap {} must be smaller than chunk size {}",
                self.overlap, self.chunk_size
            )));
        }
        Ok(())
    }
}

impl Default for FixedSizeChunker {
    fn default() -> Self {
        Self::new(DEFAULT_CHUNK_SIZE)
    }
}

impl Chunker for FixedSizeChunker {
    fn split<'a>(&self, text: &'a str) -> Result<Vec<Segment<'a>>> {
        self.validate()?;
        Ok(windows(text, self.chunk_size, self.overlap))
    }

    fn estimate_chunks(&self, text: &str) -> usize {
        let chars = text.chars().count();
        if chars == 0 || self.chunk_size == 0 {
            return 0;
        }
        let step = self.chunk_size.saturating_sub(self.overlap).max(1);
        if chars <= self.chunk_size {
            1
        } else {
            (chars - self.chunk_size + step - 1) / step + 1
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ============ split_fixed Tests ============

    #[test]
    fn test_split_fixed_remainder() {
        let text = "a".repeat(1200);
        let chunks = split_fixed(&text, 500);
        let lengths: Vec<usize> = chunks.iter().map(|c| c.len()).collect();
        assert_eq!(lengths, vec![500, 500, 200]);
    }

    #[test]
    fn test_split_fixed_exact_multiple_has_no_trailing_empty() {
        let text = "b".repeat(1000);
        let chunks = split_fixed(&text, 500);
        assert_eq!(chunks.len(), 2);
        assert!(chunks.iter().all(|c| c.len() == 500));
    }

    #[test]
    fn test_split_fixed_empty() {
        assert!(split_fixed("", 500).is_empty());
    }

    #[test]
    fn test_split_fixed_short_text() {
        let chunks = split_fixed("The sky is blue.", 500);
        assert_eq!(chunks, vec!["The sky is blue."]);
    }

    #[test]
    fn test_split_fixed_counts_characters_not_bytes() {
        let text = "héllo wörld";
        let chunks = split_fixed(text, 4);
        assert_eq!(chunks, vec!["héll", "o wö", "rld"]);
    }

    // ============ FixedSizeChunker Tests ============

    #[test]
    fn test_chunker_offsets() {
        let chunker = FixedSizeChunker::new(3);
        let segments = chunker.split("abcdefg").unwrap();
        let offsets: Vec<usize> = segments.iter().map(|s| s.start_offset).collect();
        assert_eq!(offsets, vec![0, 3, 6]);
    }

    #[test]
    fn test_chunker_with_overlap() {
        let chunker = FixedSizeChunker::new(4).with_overlap(2);
        let segments = chunker.split("abcdefgh").unwrap();
        let texts: Vec<&str> = segments.iter().map(|s| s.text).collect();
        assert_eq!(texts, vec!["abcd", "cdef", "efgh"]);
    }

    #[test]
    fn test_chunker_rejects_zero_size() {
        let chunker = FixedSizeChunker::new(0);
        assert!(matches!(chunker.split("abc"), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_chunker_rejects_overlap_not_smaller_than_size() {
        let chunker = FixedSizeChunker::new(10).with_overlap(10);
        assert!(chunker.split("abc").is_err());
    }

    #[test]
    fn test_chunker_default_size() {
        assert_eq!(FixedSizeChunker::default().chunk_size(), DEFAULT_CHUNK_SIZE);
    }

    #[test]
    fn test_estimate_matches_split() {
        let text = "x".repeat(1234);
        for chunker in [
            FixedSizeChunker::new(500),
            FixedSizeChunker::new(100).with_overlap(20),
            FixedSizeChunker::new(2000),
        ] {
            let actual = chunker.split(&text).unwrap().len();
            assert_eq!(chunker.estimate_chunks(&text), actual);
        }
    }

    // ============ Chunk Tests ============

    #[test]
    fn test_chunk_preview() {
        let chunk = Chunk::new(DocumentId::new(), "z".repeat(150), 0, vec![1.0]);
        let preview = chunk.preview(100);
        assert_eq!(preview.len(), 103);
        assert!(preview.ends_with("..."));
    }

    #[test]
    fn test_chunk_len_in_chars() {
        let chunk = Chunk::new(DocumentId::new(), "ümlaut".to_string(), 0, vec![]);
        assert_eq!(chunk.len(), 6);
        assert!(!chunk.is_empty());
    }

    // ============ Property-Based Tests ============

    use proptest::prelude::*;

    proptest! {
        #[test]
        fn prop_split_fixed_reassembles(text in "\\PC{0,2000}", size in 1usize..600) {
            let chunks = split_fixed(&text, size);
            prop_assert_eq!(chunks.concat(), text);
        }

        #[test]
        fn prop_only_last_chunk_is_short(text in "[a-z ]{1,2000}", size in 1usize..600) {
            let chunks = split_fixed(&text, size);
            let (last, rest) = chunks.split_last().unwrap();
            for chunk in rest {
                prop_assert_eq!(chunk.chars().count(), size);
            }
            let last_len = last.chars().count();
            prop_assert!(last_len >= 1 && last_len <= size);
        }
    }
}
