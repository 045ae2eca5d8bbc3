//! Embedder trait and vector utilities.
//!
//! Defines the [`Embedder`] capability the pipeline batches calls to, plus
//! pure helpers for vector serialization and similarity computation.
//!
//! Concrete embedder implementations (OpenAI-compatible HTTP) live in the
//! `star-sync` app crate.

use anyhow::Result;
use async_trait::async_trait;

/// One vector returned by an [`Embedder`], tagged with the position of its
/// input text within the request.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexedVector {
    /// Index into the `texts` slice passed to [`Embedder::embed`].
    pub index: usize,
    pub vector: Vec<f32>,
}

/// Trait for embedding providers.
///
/// Results may come back in any order; callers must place each vector using
/// its [`IndexedVector::index`], never its position in the returned list.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Returns the model identifier (e.g. `"text-embedding-3-small"`).
    fn model_name(&self) -> &str;
    /// Returns the embedding vector dimensionality (e.g. `768`).
    fn dims(&self) -> usize;
    /// Embed one request worth of texts.
    async fn embed(&self, texts: &[String]) -> Result<Vec<IndexedVector>>;
}

/// Encode a float vector as a BLOB (little-endian f32 bytes).
///
/// # Example
///
/// ```rust
/// use star_sync_core::embedding::{vec_to_blob, blob_to_vec};
///
/// let v = vec![1.0f32, -2.5, 3.125];
/// let blob = vec_to_blob(&v);
/// assert_eq!(blob.len(), 12);
/// assert_eq!(blob_to_vec(&blob), v);
/// ```
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB back into a float vector.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Cosine similarity in `[-1.0, 1.0]`.
///
/// Returns `0.0` for empty vectors, zero vectors, or vectors of different
/// lengths.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}
