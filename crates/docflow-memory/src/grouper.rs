//! Groups page chunks into tutorial sections by walking them in order and
//! comparing each one against the running centroid of the open group.

use std::sync::Arc;

use futures::future::BoxFuture;
use serde::Serialize;
use tracing::debug;

use docflow_core::config::TutorialConfig;
use docflow_core::error::{DocflowError, Result};
use docflow_core::traits::{EmbeddingProvider, SemanticGrouper};
use docflow_core::types::PageChunk;

use crate::embeddings::{cosine_similarity, midpoint};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GroupingParams {
    pub similarity_threshold: f32,
    pub max_gap_pages: u32,
    pub max_group_size: usize,
}

impl From<&TutorialConfig> for GroupingParams {
    fn from(config: &TutorialConfig) -> Self {
        Self {
            similarity_threshold: config.similarity_threshold,
            max_gap_pages: config.max_gap_pages,
            max_group_size: config.max_group_size,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupingStats {
    pub total_chunks: usize,
    pub total_groups: usize,
    pub avg_group_size: f64,
    pub group_sizes: Vec<usize>,
}

impl GroupingStats {
    pub fn from_groups(groups: &[Vec<PageChunk>]) -> Self {
        let group_sizes: Vec<usize> = groups.iter().map(Vec::len).collect();
        let total_chunks: usize = group_sizes.iter().sum();
        let avg_group_size = if groups.is_empty() {
            0.0
        } else {
            total_chunks as f64 / groups.len() as f64
        };
        Self {
            total_chunks,
            total_groups: groups.len(),
            avg_group_size,
            group_sizes,
        }
    }
}

/// Split `chunks` (with one embedding each) into contiguous groups.
///
/// A chunk joins the open group when its similarity to the group centroid
/// reaches the threshold, it is at most `max_gap_pages` pages from the
/// previous chunk, and the group still has room. The centroid then moves to
/// the midpoint of itself and the new embedding.
pub fn group_by_similarity(
    chunks: &[PageChunk],
    embeddings: &[Vec<f32>],
    params: GroupingParams,
) -> Vec<Vec<PageChunk>> {
    let mut pairs = chunks.iter().zip(embeddings);
    let Some((first, first_vec)) = pairs.next() else {
        return vec![];
    };

    let mut groups = Vec::new();
    let mut current = vec![first.clone()];
    let mut centroid = first_vec.clone();

    for (chunk, embedding) in pairs {
        let last_page = current.last().map(|c| c.page).unwrap_or(chunk.page);
        let gap = chunk.page.abs_diff(last_page);
        let sim = cosine_similarity(&centroid, embedding);

        if sim >= params.similarity_threshold
            && gap <= params.max_gap_pages
            && current.len() < params.max_group_size
        {
            current.push(chunk.clone());
            centroid = midpoint(&centroid, embedding);
        } else {
            groups.push(std::mem::replace(&mut current, vec![chunk.clone()]));
            centroid = embedding.clone();
        }
    }
    groups.push(current);
    groups
}

/// [`SemanticGrouper`] backed by an embedding model.
pub struct EmbeddingGrouper {
    embedder: Arc<dyn EmbeddingProvider>,
    params: GroupingParams,
}

impl EmbeddingGrouper {
    pub fn new(embedder: Arc<dyn EmbeddingProvider>, params: GroupingParams) -> Self {
        Self { embedder, params }
    }

    pub fn params(&self) -> GroupingParams {
        self.params
    }

    pub async fn stats(&self, chunks: &[PageChunk]) -> Result<GroupingStats> {
        let groups = self.group_chunks(chunks).await?;
        Ok(GroupingStats::from_groups(&groups))
    }
}

impl SemanticGrouper for EmbeddingGrouper {
    fn group_chunks<'a>(
        &'a self,
        chunks: &'a [PageChunk],
    ) -> BoxFuture<'a, Result<Vec<Vec<PageChunk>>>> {
        Box::pin(async move {
            if chunks.is_empty() {
                return Ok(vec![]);
            }
            let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
            let embeddings = self.embedder.embed(&texts).await?;
            if embeddings.len() != chunks.len() {
                return Err(DocflowError::Embedding(format!(
                    "expected {} vectors, got {}",
                    chunks.len(),
                    embeddings.len()
                )));
            }

            let groups = group_by_similarity(chunks, &embeddings, self.params);
            debug!(
                chunks = chunks.len(),
                groups = groups.len(),
                "Grouped page chunks"
            );
            Ok(groups)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docflow_test_utils::MockEmbedder;

    fn params() -> GroupingParams {
        GroupingParams::from(&TutorialConfig::default())
    }

    fn page(n: u32, text: &str) -> PageChunk {
        PageChunk::new(n, text)
    }

    fn pages_of(groups: &[Vec<PageChunk>]) -> Vec<Vec<u32>> {
        groups
            .iter()
            .map(|g| g.iter().map(|c| c.page).collect())
            .collect()
    }

    #[test]
    fn test_similar_neighbours_group() {
        let chunks = vec![page(0, "a"), page(1, "b"), page(2, "c"), page(3, "d")];
        let v = vec![
            vec![1.0, 0.0],
            vec![0.95, 0.05],
            vec![0.0, 1.0],
            vec![0.05, 0.95],
        ];
        let groups = group_by_similarity(&chunks, &v, params());
        assert_eq!(pages_of(&groups), vec![vec![0, 1], vec![2, 3]]);
    }

    #[test]
    fn test_page_gap_splits() {
        let chunks = vec![page(0, "a"), page(3, "b")];
        let v = vec![vec![1.0, 0.0], vec![1.0, 0.0]];
        let groups = group_by_similarity(&chunks, &v, params());
        assert_eq!(pages_of(&groups), vec![vec![0], vec![3]]);
    }

    #[test]
    fn test_group_size_cap() {
        let chunks: Vec<PageChunk> = (0..5).map(|n| page(n, "x")).collect();
        let v = vec![vec![1.0, 0.0]; 5];
        let groups = group_by_similarity(&chunks, &v, params());
        assert_eq!(pages_of(&groups), vec![vec![0, 1, 2], vec![3, 4]]);
    }

    #[test]
    fn test_empty_input() {
        assert!(group_by_similarity(&[], &[], params()).is_empty());
    }

    #[test]
    fn test_stats() {
        let groups = vec![vec![page(0, "a"), page(1, "b")], vec![page(2, "c")]];
        let stats = GroupingStats::from_groups(&groups);
        assert_eq!(stats.total_chunks, 3);
        assert_eq!(stats.total_groups, 2);
        assert!((stats.avg_group_size - 1.5).abs() < 1e-9);
        assert_eq!(stats.group_sizes, vec![2, 1]);
    }

    #[tokio::test]
    async fn test_embedding_grouper() {
        let embedder = Arc::new(MockEmbedder::by_keywords(&["ownership", "async"]));
        let grouper = EmbeddingGrouper::new(embedder.clone(), params());
        let chunks = vec![
            page(0, "Ownership rules"),
            page(1, "More ownership"),
            page(2, "Async runtimes"),
        ];

        let groups = grouper.group_chunks(&chunks).await.unwrap();
        assert_eq!(pages_of(&groups), vec![vec![0, 1], vec![2]]);
        assert_eq!(embedder.calls(), 1);

        let stats = grouper.stats(&chunks).await.unwrap();
        assert_eq!(stats.total_groups, 2);
        assert!(grouper.group_chunks(&[]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_embedding_failure_propagates() {
        let grouper = EmbeddingGrouper::new(Arc::new(MockEmbedder::failing()), params());
        let err = grouper.group_chunks(&[page(0, "a")]).await.unwrap_err();
        assert!(matches!(err, DocflowError::Embedding(_)));
    }
}
