//! Multi-Vector Retriever
//!
//! 요약을 임베딩해 검색하고, 결과 ID로 docstore에서 원본을 가져옵니다.
//! 표와 이미지는 요약으로 찾고 원본으로 답변합니다.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use uuid::Uuid;

use crate::embedding::EmbeddingProvider;
use crate::extractor::ElementKind;
use crate::summarizer::SummarizedElement;

use super::store::{DocStore, NewElement};
use super::vector::{VectorEntry, VectorStore};

/// 기본 검색 결과 수
pub const DEFAULT_TOP_K: usize = 4;

/// 검색된 요소 (원본 포함)
#[derive(Debug, Clone)]
pub struct RetrievedElement {
    pub id: String,
    pub kind: ElementKind,
    pub summary: String,
    /// 텍스트/표 원문 또는 base64 이미지
    pub original_content: String,
    pub score: f32,
}

// ============================================================================
// MultiVectorRetriever
// ============================================================================

/// 요약 벡터 + 원본 docstore 검색기
pub struct MultiVectorRetriever {
    docstore: DocStore,
    vectors: Box<dyn VectorStore>,
    embedder: Arc<dyn EmbeddingProvider>,
}

impl MultiVectorRetriever {
    pub fn new(
        docstore: DocStore,
        vectors: Box<dyn VectorStore>,
        embedder: Arc<dyn EmbeddingProvider>,
    ) -> Self {
        Self {
            docstore,
            vectors,
            embedder,
        }
    }

    pub fn docstore(&self) -> &DocStore {
        &self.docstore
    }

    pub fn vectors(&self) -> &dyn VectorStore {
        self.vectors.as_ref()
    }

    /// 요약된 요소 추가
    ///
    /// 요소마다 UUID를 부여해 원본은 docstore에, 요약 임베딩은 벡터 저장소에 넣습니다.
    /// 부여된 ID 목록을 입력 순서대로 반환합니다.
    pub async fn add_documents(
        &self,
        source_id: i64,
        elements: &[SummarizedElement],
    ) -> Result<Vec<String>> {
        if elements.is_empty() {
            return Ok(vec![]);
        }

        let ids: Vec<String> = elements.iter().map(|_| Uuid::new_v4().to_string()).collect();

        let summaries: Vec<String> = elements.iter().map(|e| e.summary.clone()).collect();
        let embeddings = self
            .embedder
            .embed_batch(&summaries)
            .await
            .context("Failed to embed summaries")?;

        if embeddings.len() != elements.len() {
            anyhow::bail!(
                "Embedding count mismatch: expected {}, got {}",
                elements.len(),
                embeddings.len()
            );
        }

        let new_elements: Vec<NewElement> = ids
            .iter()
            .zip(elements)
            .map(|(id, e)| NewElement {
                id: id.clone(),
                kind: e.element.kind,
                summary: e.summary.clone(),
                original_content: e.element.content.clone(),
                page: e.element.page,
            })
            .collect();

        self.docstore
            .add_elements(source_id, &new_elements)
            .context("Failed to store originals")?;

        let entries: Vec<VectorEntry> = ids
            .iter()
            .zip(elements)
            .zip(embeddings)
            .map(|((id, e), embedding)| VectorEntry {
                id: id.clone(),
                source_id,
                kind: e.element.kind,
                summary: e.summary.clone(),
                embedding,
            })
            .collect();

        self.vectors
            .insert_batch(&entries)
            .await
            .context("Failed to insert vectors")?;

        tracing::info!("Indexed {} elements for source {}", ids.len(), source_id);
        Ok(ids)
    }

    /// 소스 삭제 (벡터 먼저, 그 다음 docstore)
    pub async fn delete_source(&self, source_id: i64) -> Result<bool> {
        let removed = self.vectors.delete_by_source(source_id).await?;
        tracing::debug!("Removed {} vectors for source {}", removed, source_id);

        self.docstore.delete_source(source_id)
    }

    /// 유사도 검색
    ///
    /// 요약 임베딩으로 상위 `k`개를 찾아 원본과 함께 반환합니다.
    /// 인덱스가 비어있으면 빈 결과입니다.
    pub async fn similarity_search(&self, query: &str, k: usize) -> Result<Vec<RetrievedElement>> {
        if k == 0 || self.vectors.count().await? == 0 {
            return Ok(vec![]);
        }

        let query_embedding = self
            .embedder
            .embed(query)
            .await
            .context("Failed to embed query")?;

        let hits = self.vectors.search(&query_embedding, k).await?;
        let scores: HashMap<String, f32> =
            hits.iter().map(|h| (h.id.clone(), h.similarity)).collect();

        let ids: Vec<String> = hits.into_iter().map(|h| h.id).collect();
        let stored = self.docstore.get_elements(&ids)?;

        if stored.len() < ids.len() {
            tracing::warn!(
                "{} retrieved ids have no original in the docstore",
                ids.len() - stored.len()
            );
        }

        Ok(stored
            .into_iter()
            .map(|e| RetrievedElement {
                score: scores.get(&e.id).copied().unwrap_or(0.0),
                id: e.id,
                kind: e.kind,
                summary: e.summary,
                original_content: e.original_content,
            })
            .collect())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    use async_trait::async_trait;
    use tempfile::TempDir;

    use crate::extractor::Element;
    use crate::knowledge::InMemoryVectorStore;

    /// 키워드 유무로 3차원 벡터를 만드는 임베더
    struct KeywordEmbedder;

    #[async_trait]
    impl EmbeddingProvider for KeywordEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            let text = text.to_lowercase();
            Ok(vec![
                if text.contains("battery") { 1.0 } else { 0.0 },
                if text.contains("sensor") { 1.0 } else { 0.0 },
                0.1,
            ])
        }

        fn dimension(&self) -> usize {
            3
        }

        fn name(&self) -> &str {
            "keyword"
        }
    }

    fn summarized(kind: ElementKind, content: &str, summary: &str) -> SummarizedElement {
        SummarizedElement {
            element: Element {
                kind,
                content: content.to_string(),
                source: PathBuf::from("manual.pdf"),
                page: None,
            },
            summary: summary.to_string(),
        }
    }

    fn create_retriever() -> (TempDir, MultiVectorRetriever) {
        let dir = TempDir::new().unwrap();
        let docstore = DocStore::open(&dir.path().join("docs.db")).unwrap();
        let retriever = MultiVectorRetriever::new(
            docstore,
            Box::new(InMemoryVectorStore::new()),
            Arc::new(KeywordEmbedder),
        );
        (dir, retriever)
    }

    #[tokio::test]
    async fn test_empty_index_returns_empty() {
        let (_dir, retriever) = create_retriever();
        let results = retriever.similarity_search("battery", 4).await.unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_search_returns_originals() {
        let (_dir, retriever) = create_retriever();
        let source_id = retriever.docstore().upsert_source("manual.pdf", "h", 2).unwrap();

        let ids = retriever
            .add_documents(
                source_id,
                &[
                    summarized(ElementKind::Table, "| cell | volt |", "Battery voltage table"),
                    summarized(ElementKind::Image, "QUJD", "Photo of the sensor head"),
                ],
            )
            .await
            .unwrap();
        assert_eq!(ids.len(), 2);
        assert_ne!(ids[0], ids[1]);

        let results = retriever.similarity_search("battery life?", 1).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].kind, ElementKind::Table);
        assert_eq!(results[0].original_content, "| cell | volt |");
        assert_eq!(results[0].summary, "Battery voltage table");
        assert!(results[0].score > 0.9);
    }

    #[tokio::test]
    async fn test_delete_source_removes_both_sides() {
        let (_dir, retriever) = create_retriever();
        let source_id = retriever.docstore().upsert_source("manual.pdf", "h", 1).unwrap();

        retriever
            .add_documents(
                source_id,
                &[summarized(ElementKind::Text, "text", "sensor calibration")],
            )
            .await
            .unwrap();

        assert!(retriever.delete_source(source_id).await.unwrap());
        assert_eq!(retriever.vectors().count().await.unwrap(), 0);
        assert_eq!(retriever.docstore().stats().unwrap().element_count, 0);
        assert!(retriever.similarity_search("sensor", 4).await.unwrap().is_empty());
    }
}
