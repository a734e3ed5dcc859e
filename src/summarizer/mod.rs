//! 요약 모듈 - 요소별 검색용 요약 생성
//!
//! 텍스트/표는 동시 요청 수를 제한한 배치로, 이미지는 멀티모달 메시지로 요약합니다.
//! 이미지 요약 실패는 파이프라인을 멈추지 않고 에러 문자열을 요약으로 사용합니다.

use std::sync::Arc;

use anyhow::Result;
use futures::stream::{self, StreamExt, TryStreamExt};

use crate::extractor::{Element, ElementKind};
use crate::llm::{ChatMessage, ChatModel, ContentPart};

/// 텍스트/표 요약 프롬프트 (`{element}` 치환)
pub const TEXT_TABLE_PROMPT: &str = "You are an assistant tasked with summarizing tables and text. \
Give a concise summary of the table or text. Table or text chunk: {element} ";

/// 이미지 요약 프롬프트
pub const IMAGE_PROMPT: &str = "You are an assistant tasked with summarizing images for retrieval. \
These summaries will be embedded and used to retrieve the raw image. \
Give a concise summary of the image that is well optimized for retrieval. \
Describe the image in detail. Be specific about graphs, such as bar plots, curves.";

/// 기본 동시 요청 수
pub const DEFAULT_MAX_CONCURRENCY: usize = 5;

/// 요약이 붙은 요소
#[derive(Debug, Clone, PartialEq)]
pub struct SummarizedElement {
    pub element: Element,
    pub summary: String,
}

// ============================================================================
// Summarizer
// ============================================================================

/// 요소 요약기
pub struct Summarizer {
    model: Arc<dyn ChatModel>,
    max_concurrency: usize,
}

impl Summarizer {
    pub fn new(model: Arc<dyn ChatModel>) -> Self {
        Self {
            model,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
        }
    }

    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency.max(1);
        self
    }

    /// 텍스트 청크 요약 (입력 순서 유지)
    pub async fn summarize_texts(&self, texts: &[String]) -> Result<Vec<String>> {
        self.summarize_batch(texts).await
    }

    /// 표 요약 (입력 순서 유지)
    pub async fn summarize_tables(&self, tables: &[String]) -> Result<Vec<String>> {
        self.summarize_batch(tables).await
    }

    /// 프롬프트 배치 실행
    ///
    /// 최대 `max_concurrency`개 요청을 동시에 보내고, 하나라도 실패하면 에러입니다.
    async fn summarize_batch(&self, chunks: &[String]) -> Result<Vec<String>> {
        stream::iter(chunks.iter().enumerate())
            .map(|(i, chunk)| async move {
                tracing::debug!("Summarizing chunk {}/{}", i + 1, chunks.len());
                let prompt = TEXT_TABLE_PROMPT.replace("{element}", chunk);
                self.model.complete(&[ChatMessage::user(prompt)]).await
            })
            .buffered(self.max_concurrency)
            .try_collect()
            .await
    }

    /// 이미지 요약
    ///
    /// 실패 시 경고를 남기고 에러 메시지를 요약으로 반환합니다.
    pub async fn summarize_image(&self, image_base64: &str) -> String {
        let message = ChatMessage::user_parts(vec![
            ContentPart::text(IMAGE_PROMPT),
            ContentPart::image_base64(image_base64),
        ]);

        match self.model.complete(&[message]).await {
            Ok(summary) => summary,
            Err(e) => {
                tracing::warn!("An error occurred during image summarization: {:#}", e);
                format!("{:#}", e)
            }
        }
    }

    /// 이미지 목록 요약 (입력 순서 유지)
    pub async fn summarize_images(&self, images: &[String]) -> Vec<String> {
        stream::iter(images)
            .map(|image| self.summarize_image(image))
            .buffered(self.max_concurrency)
            .collect()
            .await
    }

    /// 요소 목록 요약
    ///
    /// 종류별로 모아 요약한 뒤 원래 순서로 되돌립니다.
    pub async fn summarize_elements(&self, elements: &[Element]) -> Result<Vec<SummarizedElement>> {
        let collect = |kind: ElementKind| -> (Vec<usize>, Vec<String>) {
            elements
                .iter()
                .enumerate()
                .filter(|(_, e)| e.kind == kind)
                .map(|(i, e)| (i, e.content.clone()))
                .unzip()
        };

        let (text_idx, texts) = collect(ElementKind::Text);
        let (table_idx, tables) = collect(ElementKind::Table);
        let (image_idx, images) = collect(ElementKind::Image);

        let text_summaries = self.summarize_texts(&texts).await?;
        let table_summaries = self.summarize_tables(&tables).await?;
        let image_summaries = self.summarize_images(&images).await;

        let mut summaries: Vec<Option<String>> = vec![None; elements.len()];
        for (indices, values) in [
            (text_idx, text_summaries),
            (table_idx, table_summaries),
            (image_idx, image_summaries),
        ] {
            for (i, summary) in indices.into_iter().zip(values) {
                summaries[i] = Some(summary);
            }
        }

        tracing::info!(
            "Summarized {} text, {} table, {} image elements",
            texts.len(),
            tables.len(),
            images.len()
        );

        Ok(elements
            .iter()
            .cloned()
            .zip(summaries)
            .map(|(element, summary)| SummarizedElement {
                element,
                summary: summary.unwrap_or_default(),
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
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use crate::llm::MessageContent;

    /// 프롬프트 마지막 단어를 돌려주는 모델, 이미지는 실패
    struct FakeModel {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ChatModel for FakeModel {
        async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &messages[0].content {
                MessageContent::Text(text) => Ok(format!(
                    "summary of {}",
                    text.split_whitespace().last().unwrap_or_default()
                )),
                MessageContent::Parts(_) => anyhow::bail!("vision unavailable"),
            }
        }

        fn name(&self) -> &str {
            "fake"
        }
    }

    fn summarizer() -> (Arc<FakeModel>, Summarizer) {
        let model = Arc::new(FakeModel {
            calls: AtomicUsize::new(0),
        });
        let summarizer = Summarizer::new(model.clone()).with_max_concurrency(2);
        (model, summarizer)
    }

    fn element(kind: ElementKind, content: &str) -> Element {
        Element {
            kind,
            content: content.to_string(),
            source: PathBuf::from("manual.pdf"),
            page: Some(1),
        }
    }

    #[test]
    fn test_prompt_substitution() {
        let prompt = TEXT_TABLE_PROMPT.replace("{element}", "chunk");
        assert!(prompt.ends_with("Table or text chunk: chunk "));
    }

    #[tokio::test]
    async fn test_batch_preserves_order() {
        let (model, summarizer) = summarizer();
        let texts: Vec<String> = (0..7).map(|i| format!("t{}", i)).collect();

        let summaries = summarizer.summarize_texts(&texts).await.unwrap();

        assert_eq!(summaries.len(), 7);
        assert_eq!(summaries[0], "summary of t0");
        assert_eq!(summaries[6], "summary of t6");
        assert_eq!(model.calls.load(Ordering::SeqCst), 7);
    }

    #[tokio::test]
    async fn test_image_error_becomes_summary() {
        let (_model, summarizer) = summarizer();
        let summary = summarizer.summarize_image("QUJD").await;
        assert!(summary.contains("vision unavailable"));
    }

    #[tokio::test]
    async fn test_summarize_elements_keeps_positions() {
        let (_model, summarizer) = summarizer();
        let elements = vec![
            element(ElementKind::Image, "QUJD"),
            element(ElementKind::Text, "alpha"),
            element(ElementKind::Table, "beta"),
            element(ElementKind::Text, "gamma"),
        ];

        let summarized = summarizer.summarize_elements(&elements).await.unwrap();

        assert_eq!(summarized.len(), 4);
        assert!(summarized[0].summary.contains("vision unavailable"));
        assert_eq!(summarized[1].summary, "summary of alpha");
        assert_eq!(summarized[2].summary, "summary of beta");
        assert_eq!(summarized[3].summary, "summary of gamma");
        assert_eq!(summarized[2].element.kind, ElementKind::Table);
    }

    #[tokio::test]
    async fn test_empty_input() {
        let (model, summarizer) = summarizer();
        assert!(summarizer.summarize_texts(&[]).await.unwrap().is_empty());
        assert!(summarizer.summarize_elements(&[]).await.unwrap().is_empty());
        assert_eq!(model.calls.load(Ordering::SeqCst), 0);
    }
}
