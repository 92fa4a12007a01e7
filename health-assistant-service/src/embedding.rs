use tracing::debug;

use crate::error::AgentError;

/// Sentence-embedding index over an in-request corpus.
///
/// There is no persistent index: every call receives its corpus and the
/// ranking happens in process. The ONNX inference is off-loaded to a
/// blocking thread so it does not obstruct Tokio's async scheduler.
pub struct EmbeddingIndex;

impl EmbeddingIndex {
    pub fn new() -> Self {
        Self
    }

    /// Encode a single string into the model's fixed-dimensional vector.
    pub async fn encode(&self, text: &str) -> Result<Vec<f32>, AgentError> {
        let mut vectors = self.encode_batch(vec![text.to_owned()]).await?;
        vectors
            .pop()
            .ok_or_else(|| AgentError::EmbeddingUnavailable("empty embedding batch".to_string()))
    }

    pub async fn encode_batch(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>, AgentError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let count = texts.len();
        let vectors = tokio::task::spawn_blocking(move || {
            use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};

            let mut model = TextEmbedding::try_new(
                InitOptions::new(EmbeddingModel::AllMiniLML6V2).with_show_download_progress(false),
            )?;
            let embeddings = model.embed(texts, None)?;
            Ok::<Vec<Vec<f32>>, anyhow::Error>(embeddings)
        })
        .await
        .map_err(|e| AgentError::EmbeddingUnavailable(e.to_string()))?
        .map_err(|e| AgentError::EmbeddingUnavailable(e.to_string()))?;

        debug!(count, dim = vectors.first().map_or(0, Vec::len), "embedded batch");
        Ok(vectors)
    }

    /// Indices of the top-K corpus entries by cosine similarity to the
    /// query, descending, ties broken by insertion order.
    pub async fn top_k(
        &self,
        query: &str,
        corpus: &[String],
        k: usize,
    ) -> Result<Vec<usize>, AgentError> {
        if corpus.is_empty() || k == 0 {
            return Ok(Vec::new());
        }

        let mut texts = Vec::with_capacity(corpus.len() + 1);
        texts.push(query.to_owned());
        texts.extend(corpus.iter().cloned());

        let mut vectors = self.encode_batch(texts).await?;
        let query_vector = vectors.remove(0);
        Ok(rank_top_k(&query_vector, &vectors, k))
    }
}

impl Default for EmbeddingIndex {
    fn default() -> Self {
        Self::new()
    }
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// Pure ranking over already-computed vectors. A stable sort keeps
/// insertion order for equal similarities.
pub fn rank_top_k(query: &[f32], corpus: &[Vec<f32>], k: usize) -> Vec<usize> {
    let mut ranked: Vec<(usize, f32)> = corpus
        .iter()
        .enumerate()
        .map(|(i, v)| (i, cosine_similarity(query, v)))
        .collect();
    ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    ranked.into_iter().take(k).map(|(i, _)| i).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cosine_basics() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert!((cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]) + 1.0).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }

    #[test]
    fn rank_orders_by_similarity_descending() {
        let query = vec![1.0, 0.0];
        let corpus = vec![
            vec![0.0, 1.0],
            vec![1.0, 0.0],
            vec![1.0, 1.0],
        ];
        assert_eq!(rank_top_k(&query, &corpus, 3), vec![1, 2, 0]);
    }

    #[test]
    fn rank_caps_at_k_and_breaks_ties_by_insertion_order() {
        let query = vec![1.0, 0.0];
        // Two identical vectors: the earlier index must win the tie.
        let corpus = vec![
            vec![1.0, 1.0],
            vec![1.0, 0.0],
            vec![1.0, 0.0],
        ];
        assert_eq!(rank_top_k(&query, &corpus, 2), vec![1, 2]);
        assert_eq!(rank_top_k(&query, &corpus, 0), Vec::<usize>::new());
    }
}
