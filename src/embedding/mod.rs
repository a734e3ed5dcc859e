//! 임베딩 모듈 - 요약 텍스트 벡터화
//!
//! 요소(텍스트/표/이미지)의 요약을 벡터로 변환합니다.
//! 원본이 아닌 요약을 임베딩하고, 검색 후 원본은 docstore에서 가져옵니다.
//!
//! ## 사용법
//! ```rust,ignore
//! let embedder = create_embedder(&config)?;
//! let embedding = embedder.embed("battery terminal caps").await?;
//! ```

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::RagConfig;
use crate::provider::OpenAiClient;

/// 배치 요청당 최대 입력 수
const MAX_BATCH_INPUTS: usize = 96;

// ============================================================================
// EmbeddingProvider Trait
// ============================================================================

/// 임베딩 프로바이더 트레이트
///
/// 텍스트를 벡터로 변환하는 인터페이스입니다.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// 단일 텍스트 임베딩
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// 배치 임베딩 (기본 구현: 순차 호출)
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.embed(text).await?);
        }
        Ok(results)
    }

    /// 임베딩 차원 수
    fn dimension(&self) -> usize;

    /// 프로바이더 이름
    fn name(&self) -> &str;
}

// ============================================================================
// OpenAI Embedding
// ============================================================================

/// OpenAI 임베딩 요청
/// ref: https://platform.openai.com/docs/api-reference/embeddings/create
#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: Vec<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    index: usize,
    embedding: Vec<f32>,
}

/// OpenAI 임베딩 구현체
#[derive(Debug, Clone)]
pub struct OpenAiEmbedding {
    client: OpenAiClient,
    model: String,
    dimension: usize,
}

impl OpenAiEmbedding {
    /// 새 임베딩 인스턴스 생성
    ///
    /// # Arguments
    /// * `client` - 공유 HTTP 클라이언트
    /// * `model` - 임베딩 모델 이름
    /// * `dimension` - 출력 차원
    pub fn new(client: OpenAiClient, model: impl Into<String>, dimension: usize) -> Result<Self> {
        if dimension == 0 {
            anyhow::bail!("Invalid dimension: 0");
        }

        Ok(Self {
            client,
            model: model.into(),
            dimension,
        })
    }

    /// `dimensions` 파라미터는 text-embedding-3 계열만 지원
    fn dimensions_param(&self) -> Option<usize> {
        self.model
            .starts_with("text-embedding-3")
            .then_some(self.dimension)
    }

    /// 비어있지 않은 텍스트 배치를 한 번의 요청으로 임베딩
    async fn request(&self, inputs: &[&str]) -> Result<Vec<Vec<f32>>> {
        let request = EmbedRequest {
            model: &self.model,
            input: inputs.to_vec(),
            dimensions: self.dimensions_param(),
        };

        let response: EmbedResponse = self
            .client
            .post_json("embeddings", &request)
            .await
            .context("Embedding request failed")?;

        order_by_index(response.data, inputs.len(), self.dimension)
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        // 빈 텍스트 처리
        if text.trim().is_empty() {
            return Ok(vec![0.0; self.dimension]);
        }

        let mut vectors = self.request(&[text]).await?;
        vectors
            .pop()
            .ok_or_else(|| anyhow::anyhow!("Embedding response was empty"))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut results = vec![vec![0.0; self.dimension]; texts.len()];

        // 빈 텍스트는 영벡터로 두고 나머지만 요청
        let pending: Vec<(usize, &str)> = texts
            .iter()
            .enumerate()
            .filter(|(_, t)| !t.trim().is_empty())
            .map(|(i, t)| (i, t.as_str()))
            .collect();

        for (batch_no, batch) in pending.chunks(MAX_BATCH_INPUTS).enumerate() {
            tracing::debug!(
                "Embedding batch {} ({} inputs)",
                batch_no + 1,
                batch.len()
            );

            let inputs: Vec<&str> = batch.iter().map(|(_, t)| *t).collect();
            let vectors = self.request(&inputs).await?;

            for ((slot, _), vector) in batch.iter().zip(vectors) {
                results[*slot] = vector;
            }
        }

        Ok(results)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        &self.model
    }
}

/// 응답 데이터를 요청 순서로 정렬하고 차원 검증
fn order_by_index(
    data: Vec<EmbeddingData>,
    expected: usize,
    dimension: usize,
) -> Result<Vec<Vec<f32>>> {
    if data.len() != expected {
        anyhow::bail!(
            "Embedding count mismatch: expected {}, got {}",
            expected,
            data.len()
        );
    }

    let mut ordered: Vec<Option<Vec<f32>>> = vec![None; expected];
    for item in data {
        if item.embedding.len() != dimension {
            anyhow::bail!(
                "Embedding dimension mismatch: expected {}, got {}",
                dimension,
                item.embedding.len()
            );
        }
        let slot = ordered
            .get_mut(item.index)
            .ok_or_else(|| anyhow::anyhow!("Embedding index out of range: {}", item.index))?;
        *slot = Some(item.embedding);
    }

    ordered
        .into_iter()
        .enumerate()
        .map(|(i, v)| v.ok_or_else(|| anyhow::anyhow!("Missing embedding for input {}", i)))
        .collect()
}

// ============================================================================
// Factory Function
// ============================================================================

/// 설정으로 임베딩 프로바이더 생성
pub fn create_embedder(client: OpenAiClient, config: &RagConfig) -> Result<OpenAiEmbedding> {
    let embedder = OpenAiEmbedding::new(
        client,
        config.embedding_model.clone(),
        config.embedding_dimension,
    )?;
    tracing::info!(
        "Using {} embedding (dimension: {})",
        embedder.name(),
        embedder.dimension()
    );
    Ok(embedder)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn test_client() -> OpenAiClient {
        OpenAiClient::new("fake_key".to_string(), "http://localhost:1", 60).unwrap()
    }

    #[test]
    fn test_invalid_dimension() {
        let result = OpenAiEmbedding::new(test_client(), "text-embedding-3-small", 0);
        assert!(result.is_err());
    }

    #[test]
    fn test_dimensions_param_only_for_v3_models() {
        let v3 = OpenAiEmbedding::new(test_client(), "text-embedding-3-small", 512).unwrap();
        assert_eq!(v3.dimensions_param(), Some(512));

        let ada = OpenAiEmbedding::new(test_client(), "text-embedding-ada-002", 1536).unwrap();
        assert_eq!(ada.dimensions_param(), None);
    }

    #[tokio::test]
    async fn test_empty_text_skips_request() {
        let embedder = OpenAiEmbedding::new(test_client(), "text-embedding-3-small", 4).unwrap();
        let vector = embedder.embed("   ").await.unwrap();
        assert_eq!(vector, vec![0.0; 4]);

        let batch = embedder
            .embed_batch(&["".to_string(), " ".to_string()])
            .await
            .unwrap();
        assert_eq!(batch.len(), 2);
        assert!(batch.iter().all(|v| v.iter().all(|x| *x == 0.0)));
    }

    #[test]
    fn test_order_by_index() {
        let data = vec![
            EmbeddingData {
                index: 1,
                embedding: vec![1.0, 1.0],
            },
            EmbeddingData {
                index: 0,
                embedding: vec![0.0, 0.0],
            },
        ];
        let ordered = order_by_index(data, 2, 2).unwrap();
        assert_eq!(ordered[0], vec![0.0, 0.0]);
        assert_eq!(ordered[1], vec![1.0, 1.0]);
    }

    #[test]
    fn test_order_by_index_dimension_mismatch() {
        let data = vec![EmbeddingData {
            index: 0,
            embedding: vec![0.0; 3],
        }];
        assert!(order_by_index(data, 1, 2).is_err());
    }
}
