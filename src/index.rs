//! Vector index: build once from a chunk set, then exact k-NN search.
//!
//! [`FlatIndex`] keeps every (chunk, vector) pair in insertion order and
//! scores all of them against each query with cosine similarity. That is
//! exact and fast enough for the corpus of a single upload session.

use uuid::Uuid;

use crate::embedding::{cosine_similarity, Embedder};
use crate::error::{Error, Result};
use crate::models::{Chunk, ScoredChunk};
use crate::progress::{ProgressEvent, ProgressReporter};

/// Read-only similarity search over embedded chunks.
pub trait VectorIndex: Send + Sync {
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Vector dimensionality of the stored entries.
    fn dims(&self) -> usize;

    /// At most `k` entries, best first. Equal scores keep insertion order.
    fn search(&self, query: &[f32], k: usize) -> Vec<ScoredChunk>;
}

struct Entry {
    id: String,
    chunk: Chunk,
    vector: Vec<f32>,
}

/// Brute-force cosine index.
pub struct FlatIndex {
    entries: Vec<Entry>,
    dims: usize,
}

impl FlatIndex {
    /// Assemble an index from already-embedded chunks.
    ///
    /// Fails with [`Error::EmptyCorpus`] if `pairs` is empty and with
    /// [`Error::Embedding`] if the vectors disagree on dimensionality.
    pub fn from_embedded(pairs: Vec<(Chunk, Vec<f32>)>) -> Result<Self> {
        let dims = match pairs.first() {
            Some((_, v)) => v.len(),
            None => return Err(Error::EmptyCorpus { outcomes: Vec::new() }),
        };
        if dims == 0 {
            return Err(Error::Embedding(anyhow::anyhow!(
                "embedding service returned empty vectors"
            )));
        }

        let mut entries = Vec::with_capacity(pairs.len());
        for (chunk, vector) in pairs {
            if vector.len() != dims {
                return Err(Error::Embedding(anyhow::anyhow!(
                    "inconsistent embedding dimensions: expected {}, got {}",
                    dims,
                    vector.len()
                )));
            }
            entries.push(Entry {
                id: Uuid::new_v4().to_string(),
                chunk,
                vector,
            });
        }

        Ok(Self { entries, dims })
    }
}

impl VectorIndex for FlatIndex {
    fn len(&self) -> usize {
        self.entries.len()
    }

    fn dims(&self) -> usize {
        self.dims
    }

    fn search(&self, query: &[f32], k: usize) -> Vec<ScoredChunk> {
        let mut scored: Vec<(usize, f32)> = self
            .entries
            .iter()
            .enumerate()
            .map(|(i, e)| (i, cosine_similarity(query, &e.vector)))
            .collect();
        // Stable sort: ties stay in insertion order, NaN scores rank last.
        scored.sort_by(|a, b| rank(b.1).total_cmp(&rank(a.1)));
        scored.truncate(k);

        scored
            .into_iter()
            .map(|(i, score)| {
                let entry = &self.entries[i];
                ScoredChunk {
                    id: entry.id.clone(),
                    chunk: entry.chunk.clone(),
                    score,
                }
            })
            .collect()
    }
}

fn rank(score: f32) -> f32 {
    if score.is_nan() {
        f32::NEG_INFINITY
    } else {
        score
    }
}

/// Embed every chunk (in batches of `batch_size`) and build a [`FlatIndex`].
///
/// An empty chunk list fails with [`Error::EmptyCorpus`] before the
/// embedder is called.
pub async fn build_index(
    chunks: Vec<Chunk>,
    embedder: &dyn Embedder,
    batch_size: usize,
    progress: &dyn ProgressReporter,
) -> Result<FlatIndex> {
    if chunks.is_empty() {
        return Err(Error::EmptyCorpus {
            outcomes: Vec::new(),
        });
    }

    let total = chunks.len();
    let mut vectors: Vec<Vec<f32>> = Vec::with_capacity(total);

    for batch in chunks.chunks(batch_size.max(1)) {
        let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
        let batch_vectors = embedder.embed(&texts).await.map_err(Error::Embedding)?;
        if batch_vectors.len() != texts.len() {
            return Err(Error::Embedding(anyhow::anyhow!(
                "embedding service returned {} vectors for {} texts",
                batch_vectors.len(),
                texts.len()
            )));
        }
        if let Some(bad) = batch_vectors.iter().find(|v| v.len() != embedder.dims()) {
            return Err(Error::Embedding(anyhow::anyhow!(
                "{} returned a {}-dimensional vector, expected {}",
                embedder.model_name(),
                bad.len(),
                embedder.dims()
            )));
        }
        vectors.extend(batch_vectors);
        progress.report(ProgressEvent::Embedding {
            n: vectors.len() as u64,
            total: total as u64,
        });
    }

    tracing::debug!(
        chunks = total,
        model = embedder.model_name(),
        "embedded corpus"
    );

    FlatIndex::from_embedded(chunks.into_iter().zip(vectors).collect())
}

/// Embed `question` and return the `k` most similar chunks, best first.
pub async fn retrieve(
    index: &dyn VectorIndex,
    embedder: &dyn Embedder,
    question: &str,
    k: usize,
) -> Result<Vec<ScoredChunk>> {
    let query = embedder
        .embed_query(question)
        .await
        .map_err(Error::Embedding)?;
    if query.len() != index.dims() {
        return Err(Error::Embedding(anyhow::anyhow!(
            "query vector has {} dimensions, index has {}",
            query.len(),
            index.dims()
        )));
    }
    Ok(index.search(&query, k))
}
