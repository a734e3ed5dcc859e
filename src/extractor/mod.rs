//! 콘텐츠 추출 모듈
//!
//! PDF를 텍스트/표/이미지 요소(Element)로 분할합니다.
//! - PDF 텍스트: pdf-extract로 페이지별 추출 후 블록 분류 + 제목 기준 청킹
//! - PDF 이미지: lopdf로 내장 JPEG 스트림 추출
//! - 이미지 파일: base64 인코딩

pub mod chunker;
pub mod image;
pub mod pdf;

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::collector::{CollectedFile, FileType};

// ============================================================================
// Element
// ============================================================================

/// 요소 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementKind {
    Text,
    Table,
    Image,
}

impl ElementKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ElementKind::Text => "text",
            ElementKind::Table => "table",
            ElementKind::Image => "image",
        }
    }
}

impl fmt::Display for ElementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ElementKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "text" => Ok(ElementKind::Text),
            "table" => Ok(ElementKind::Table),
            "image" => Ok(ElementKind::Image),
            other => anyhow::bail!("Unknown element kind: {}", other),
        }
    }
}

/// 추출된 요소
#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    pub kind: ElementKind,
    /// 텍스트/표는 원문, 이미지는 base64
    pub content: String,
    /// 원본 파일
    pub source: PathBuf,
    /// 시작 페이지 (1부터)
    pub page: Option<usize>,
}

// ============================================================================
// Partition Config
// ============================================================================

/// PDF 분할 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartitionConfig {
    /// 내장 이미지 추출 여부
    pub extract_images: bool,
    /// 표 추론 여부 (꺼지면 표 블록도 텍스트로 취급)
    pub infer_table_structure: bool,
    /// 청크 최대 크기 (hard limit)
    pub max_characters: usize,
    /// 이 크기를 넘으면 새 청크 시작 (soft limit)
    pub new_after_n_chars: usize,
    /// 이 크기 미만 청크는 다음 청크와 병합
    pub combine_text_under_n_chars: usize,
    /// 추출 이미지 저장 디렉토리
    pub image_output_dir: PathBuf,
}

impl Default for PartitionConfig {
    fn default() -> Self {
        Self {
            extract_images: true,
            infer_table_structure: true,
            max_characters: 4000,
            new_after_n_chars: 3800,
            combine_text_under_n_chars: 2000,
            image_output_dir: PathBuf::from("figures"),
        }
    }
}

impl PartitionConfig {
    /// 크기 관계 검증
    pub fn validate(&self) -> Result<()> {
        if self.max_characters == 0 {
            anyhow::bail!("max_characters must be greater than 0");
        }
        if self.new_after_n_chars > self.max_characters {
            anyhow::bail!(
                "new_after_n_chars ({}) must not exceed max_characters ({})",
                self.new_after_n_chars,
                self.max_characters
            );
        }
        if self.combine_text_under_n_chars > self.max_characters {
            anyhow::bail!(
                "combine_text_under_n_chars ({}) must not exceed max_characters ({})",
                self.combine_text_under_n_chars,
                self.max_characters
            );
        }
        Ok(())
    }
}

// ============================================================================
// Partitioning
// ============================================================================

/// PDF를 요소로 분할 (동기, CPU 바운드)
///
/// 텍스트/표 요소가 먼저, 이미지 요소가 뒤에 옵니다.
pub fn partition_pdf(path: &Path, config: &PartitionConfig) -> Result<Vec<Element>> {
    let pages = pdf::extract_text_from_pdf(path)?;

    let blocks: Vec<pdf::Block> = pages
        .iter()
        .flat_map(|(page, text)| pdf::classify_blocks(text, *page, config.infer_table_structure))
        .collect();

    let mut elements: Vec<Element> = chunker::chunk_by_title(&blocks, config)
        .into_iter()
        .map(|chunk| Element {
            kind: chunk.kind,
            content: chunk.text,
            source: path.to_path_buf(),
            page: Some(chunk.page),
        })
        .collect();

    if config.extract_images {
        match image::extract_pdf_images(path, &config.image_output_dir) {
            Ok(images) => {
                for extracted in images {
                    elements.push(Element {
                        kind: ElementKind::Image,
                        content: image::encode_image(&extracted.data),
                        source: path.to_path_buf(),
                        page: extracted.page,
                    });
                }
            }
            Err(e) => tracing::warn!("Image extraction failed for {:?}: {:#}", path, e),
        }
    }

    tracing::info!(
        "Partitioned {:?}: {} text, {} table, {} image elements",
        path.file_name().unwrap_or_default(),
        count_kind(&elements, ElementKind::Text),
        count_kind(&elements, ElementKind::Table),
        count_kind(&elements, ElementKind::Image),
    );

    Ok(elements)
}

/// 종류별 요소 수
pub fn count_kind(elements: &[Element], kind: ElementKind) -> usize {
    elements.iter().filter(|e| e.kind == kind).count()
}

// ============================================================================
// Content Extractor
// ============================================================================

/// 콘텐츠 추출기
pub struct ContentExtractor {
    config: PartitionConfig,
}

impl ContentExtractor {
    pub fn new(config: PartitionConfig) -> Self {
        Self { config }
    }

    /// 수집된 파일에서 요소 추출
    pub async fn extract(&self, file: &CollectedFile) -> Result<Vec<Element>> {
        match file.file_type {
            FileType::Pdf => self.extract_pdf(&file.path).await,
            FileType::Image => Ok(vec![image::load_image(&file.path).await?]),
        }
    }

    /// PDF 추출은 CPU 바운드이므로 spawn_blocking 사용
    async fn extract_pdf(&self, path: &Path) -> Result<Vec<Element>> {
        let path = path.to_path_buf();
        let config = self.config.clone();
        tokio::task::spawn_blocking(move || partition_pdf(&path, &config))
            .await
            .context("PDF extraction task failed")?
    }
}

// ============================================================================
// Tests
// ============================================================================
