//! Cosine similarity ranking of chunks against a query vector

use crate::Chunk;
use serde::Serialize;
use std::cmp::Ordering;

/// Default number of chunks kept by the ranker
pub const DEFAULT_TOP_K: usize = 3;

/// Compute cosine similarity between two vectors
///
/// Mismatched lengths and zero-norm vectors score 0.0 instead of NaN.
#[must_use]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot = dot_product(a, b);
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

/// Compute dot product between two vectors
#[must_use]
pub fn dot_product(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// Descending by score, NaN last
fn by_score_desc(a: f32, b: f32) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => b.partial_cmp(&a).unwrap_or(Ordering::Equal),
    }
}

/// A chunk with its similarity to the query
#[derive(Debug, Clone, Serialize)]
pub struct RankedChunk<'a> {
    /// The chunk
    pub chunk: &'a Chunk,
    /// Cosine similarity to the query
    pub score: f32,
}

/// Orders chunks by cosine similarity to a query vector
#[derive(Debug, Clone, Copy)]
pub struct SimilarityRanker {
    top_k: usize,
}

impl SimilarityRanker {
    /// Create a ranker keeping at most `top_k` chunks
    #[must_use]
    pub fn new(top_k: usize) -> Self {
        Self { top_k }
    }

    /// Maximum chunks returned
    #[must_use]
    pub fn top_k(&self) -> usize {
        self.top_k
    }

    /// Score every chunk, sort descending, keep the best `top_k`
    ///
    /// Equal scores keep their input order.
    #[must_use]
    pub fn rank<'a>(&self, query: &[f32], chunks: &'a [Chunk]) -> Vec<RankedChunk<'a>> {
        rank(query, chunks, self.top_k)
    }
}

impl Default for SimilarityRanker {
    fn default() -> Self {
        Self::new(DEFAULT_TOP_K)
    }
}

/// Rank `chunks` against `query`, keeping at most `top_k`
#[must_use]
pub fn rank<'a>(query: &[f32], chunks: &'a [Chunk], top_k: usize) -> Vec<RankedChunk<'a>> {
    let mut scored: Vec<RankedChunk<'a>> = chunks
        .iter()
        .map(|chunk| RankedChunk {
            chunk,
            score: cosine_similarity(query, &chunk.embedding),
        })
        .collect();

    // sort_by is stable, ties stay in insertion order
    scored.sort_by(|a, b| by_score_desc(a.score, b.score));
    scored.truncate(top_k);
    scored
}
