//! RAG 파이프라인
//!
//! - `Indexer`: 데이터 폴더 → 추출 → 요약 → 인덱싱 (변경된 파일만)
//! - `AnswerEngine`: 질문 → 검색 → 컨텍스트 → 답변 + 관련 이미지

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};

use crate::collector::{CollectedFile, CollectorConfig, FileCollector};
use crate::extractor::{count_kind, ContentExtractor, ElementKind, PartitionConfig};
use crate::knowledge::{MultiVectorRetriever, RetrievedElement, DEFAULT_TOP_K};
use crate::llm::{ChatMessage, ChatModel, ContentPart};
use crate::summarizer::Summarizer;

/// 답변 프롬프트 (`{context}`, `{question}` 치환)
pub const ANSWER_PROMPT: &str = "\nAnswer the question based only on the following context, \
which can include text, images, and tables:\n{context}\nQuestion: {question} \n";

// ============================================================================
// Ingest
// ============================================================================

/// 수집 옵션
#[derive(Debug, Clone, Default)]
pub struct IngestOptions {
    /// 변경되지 않은 파일도 다시 인덱싱
    pub force: bool,
    /// 이미지 파일 건너뛰기 (PDF 내장 이미지는 유지)
    pub skip_images: bool,
    /// 하위 폴더까지 탐색
    pub recursive: bool,
}

/// 수집 결과 요약
#[derive(Debug, Default)]
pub struct IngestReport {
    pub files_seen: usize,
    pub ingested: usize,
    pub unchanged: usize,
    pub failed: usize,
    pub text_elements: usize,
    pub table_elements: usize,
    pub image_elements: usize,
    /// 실패한 파일과 에러 메시지
    pub failures: Vec<(PathBuf, String)>,
}

impl IngestReport {
    pub fn total_elements(&self) -> usize {
        self.text_elements + self.table_elements + self.image_elements
    }
}

/// 인덱싱 중인 소스의 해시 (실제 SHA-256과 절대 같지 않음)
const PENDING_SHA256: &str = "";

/// 파일 단위 처리 결과
enum FileOutcome {
    Unchanged,
    Indexed { text: usize, table: usize, image: usize },
}

/// 인덱서 - 데이터 폴더를 지식 저장소에 반영
pub struct Indexer {
    retriever: Arc<MultiVectorRetriever>,
    extractor: ContentExtractor,
    summarizer: Summarizer,
    figures_dir: PathBuf,
}

impl Indexer {
    pub fn new(
        retriever: Arc<MultiVectorRetriever>,
        summarizer: Summarizer,
        partition: PartitionConfig,
    ) -> Self {
        Self {
            retriever,
            figures_dir: partition.image_output_dir.clone(),
            extractor: ContentExtractor::new(partition),
            summarizer,
        }
    }

    /// 폴더 수집
    ///
    /// 파일별 실패는 기록하고 다음 파일로 넘어갑니다.
    pub async fn ingest_directory(&self, dir: &Path, options: &IngestOptions) -> Result<IngestReport> {
        let collector = FileCollector::new(CollectorConfig {
            max_depth: if options.recursive { None } else { Some(1) },
            skip_images: options.skip_images,
            exclude_dir: Some(self.figures_dir.clone()),
            ..Default::default()
        });

        let files = collector
            .collect_directory(dir)
            .with_context(|| format!("Failed to collect files from {:?}", dir))?;

        let mut report = IngestReport {
            files_seen: files.len(),
            ..Default::default()
        };

        for file in &files {
            match self.ingest_file(file, options.force).await {
                Ok(FileOutcome::Unchanged) => {
                    tracing::info!("Unchanged, skipping: {:?}", file.path);
                    report.unchanged += 1;
                }
                Ok(FileOutcome::Indexed { text, table, image }) => {
                    report.ingested += 1;
                    report.text_elements += text;
                    report.table_elements += table;
                    report.image_elements += image;
                }
                Err(e) => {
                    tracing::warn!("Failed to ingest {:?}: {:#}", file.path, e);
                    report.failed += 1;
                    report.failures.push((file.path.clone(), format!("{:#}", e)));
                }
            }
        }

        tracing::info!(
            "Ingest finished: {} indexed, {} unchanged, {} failed",
            report.ingested,
            report.unchanged,
            report.failed
        );
        Ok(report)
    }

    async fn ingest_file(&self, file: &CollectedFile, force: bool) -> Result<FileOutcome> {
        let key = file.path.to_string_lossy().to_string();
        let sha256 = file_sha256(&file.path).await?;
        let docstore = self.retriever.docstore();

        if let Some(existing) = docstore.get_source_by_path(&key)? {
            if !force && existing.sha256 == sha256 {
                return Ok(FileOutcome::Unchanged);
            }
            self.retriever.delete_source(existing.id).await?;
        }

        tracing::info!("Extracting: {:?}", file.path);
        let elements = self.extractor.extract(file).await?;
        if elements.is_empty() {
            tracing::warn!("No elements extracted from {:?}", file.path);
        }

        let summarized = self.summarizer.summarize_elements(&elements).await?;

        // 인덱싱이 끝나기 전까지는 해시를 비워 두어, 중단되면 다음 실행에서 변경으로 판정
        let source_id = docstore.upsert_source(&key, PENDING_SHA256, 0)?;

        if let Err(e) = self.retriever.add_documents(source_id, &summarized).await {
            if let Err(cleanup) = self.retriever.delete_source(source_id).await {
                tracing::warn!("Failed to roll back source {}: {:#}", source_id, cleanup);
            }
            return Err(e);
        }

        docstore.upsert_source(&key, &sha256, summarized.len())?;

        Ok(FileOutcome::Indexed {
            text: count_kind(&elements, ElementKind::Text),
            table: count_kind(&elements, ElementKind::Table),
            image: count_kind(&elements, ElementKind::Image),
        })
    }
}

/// 파일 내용 SHA-256 (hex)
pub async fn file_sha256(path: &Path) -> Result<String> {
    let data = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read file: {:?}", path))?;
    Ok(format!("{:x}", Sha256::digest(&data)))
}

// ============================================================================
// Answer
// ============================================================================

/// 검색 결과로 컨텍스트 구성
///
/// 텍스트/표는 원본, 이미지는 요약을 태그와 함께 이어붙이고
/// 이미지 원본(base64)은 검색 순서대로 따로 모읍니다.
pub fn build_context(elements: &[RetrievedElement]) -> (String, Vec<String>) {
    let mut context = String::new();
    let mut images = Vec::new();

    for element in elements {
        match element.kind {
            ElementKind::Text => {
                context.push_str("[text]");
                context.push_str(&element.original_content);
            }
            ElementKind::Table => {
                context.push_str("[table]");
                context.push_str(&element.original_content);
            }
            ElementKind::Image => {
                context.push_str("[image]");
                context.push_str(&element.summary);
                images.push(element.original_content.clone());
            }
        }
    }

    (context, images)
}

/// 답변 프롬프트 생성
///
/// 컨텍스트 안의 `{question}` 같은 문자열은 치환하지 않습니다.
pub fn answer_prompt(context: &str, question: &str) -> String {
    match ANSWER_PROMPT.split_once("{context}") {
        Some((head, tail)) => format!("{}{}{}", head, context, tail.replace("{question}", question)),
        None => ANSWER_PROMPT.replace("{question}", question),
    }
}

/// 답변
#[derive(Debug, Clone)]
pub struct Answer {
    pub text: String,
    /// 관련 이미지 (base64)
    pub images: Vec<String>,
    /// 답변에 사용된 검색 결과
    pub sources: Vec<RetrievedElement>,
}

/// 답변 엔진
pub struct AnswerEngine {
    retriever: Arc<MultiVectorRetriever>,
    model: Arc<dyn ChatModel>,
    top_k: usize,
    attach_images: bool,
}

impl AnswerEngine {
    pub fn new(retriever: Arc<MultiVectorRetriever>, model: Arc<dyn ChatModel>) -> Self {
        Self {
            retriever,
            model,
            top_k: DEFAULT_TOP_K,
            attach_images: false,
        }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k.max(1);
        self
    }

    /// 검색된 이미지를 프롬프트에 이미지 파트로 첨부
    pub fn with_attach_images(mut self, attach_images: bool) -> Self {
        self.attach_images = attach_images;
        self
    }

    /// 질문에 답변
    pub async fn answer(&self, question: &str) -> Result<Answer> {
        let sources = self
            .retriever
            .similarity_search(question, self.top_k)
            .await
            .context("Failed to retrieve context")?;

        if sources.is_empty() {
            tracing::warn!("No context retrieved; answering with an empty context");
        }

        let (context, images) = build_context(&sources);
        let prompt = answer_prompt(&context, question);

        let message = if self.attach_images && !images.is_empty() {
            let mut parts = vec![ContentPart::text(prompt)];
            parts.extend(images.iter().map(|img| ContentPart::image_base64(img)));
            ChatMessage::user_parts(parts)
        } else {
            ChatMessage::user(prompt)
        };

        tracing::debug!(
            "Answering with {} context elements ({} images) via {}",
            sources.len(),
            images.len(),
            self.model.name()
        );

        let text = self
            .model
            .complete(&[message])
            .await
            .context("Failed to generate answer")?;

        Ok(Answer {
            text,
            images,
            sources,
        })
    }
}

// ============================================================================
// Tests
// ============================================================================
