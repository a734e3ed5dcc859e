//! PDF 텍스트 추출 및 블록 분류
//!
//! pdf-extract 크레이트로 페이지별 텍스트를 뽑고,
//! 빈 줄 기준 블록을 제목/본문/표로 분류합니다.

use std::path::Path;
use std::sync::OnceLock;

use anyhow::{Context, Result};
use regex::Regex;

/// 제목으로 볼 최대 길이 (문자 수)
const TITLE_MAX_CHARS: usize = 80;
/// 제목으로 볼 최대 단어 수
const TITLE_MAX_WORDS: usize = 12;

// ============================================================================
// Page Text
// ============================================================================

/// PDF에서 텍스트 추출
///
/// 페이지별로 텍스트를 추출하여 (페이지 번호, 텍스트) 튜플 벡터로 반환합니다.
/// 페이지 번호는 1부터 시작합니다. 텍스트가 없으면 빈 벡터를 반환합니다.
pub fn extract_text_from_pdf(path: &Path) -> Result<Vec<(usize, String)>> {
    let bytes = std::fs::read(path).with_context(|| format!("Failed to read PDF: {:?}", path))?;

    let text = pdf_extract::extract_text_from_mem(&bytes)
        .with_context(|| format!("Failed to extract text from PDF: {:?}", path))?;

    if text.trim().is_empty() {
        tracing::warn!(
            "No text extracted from PDF: {:?}. It might be a scanned document.",
            path
        );
        return Ok(vec![]);
    }

    Ok(split_pdf_pages(&text)
        .into_iter()
        .enumerate()
        .map(|(i, text)| (i + 1, text))
        .collect())
}

/// PDF 텍스트를 페이지별로 분리 (폼피드 기준)
fn split_pdf_pages(text: &str) -> Vec<String> {
    let pages: Vec<String> = text
        .split('\x0c')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();

    if pages.is_empty() {
        vec![text.trim().to_string()]
    } else {
        pages
    }
}

// ============================================================================
// Blocks
// ============================================================================

/// 블록 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    Title,
    Narrative,
    Table,
}

/// 페이지 내 텍스트 블록
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub kind: BlockKind,
    pub text: String,
    pub page: usize,
}

fn column_gap_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\S(?:\t+| {2,})\S").expect("valid column gap regex"))
}

fn blank_line_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\n[ \t]*\n").expect("valid blank line regex"))
}

/// 페이지 텍스트를 블록으로 분류
///
/// `infer_tables`가 꺼져 있으면 표 후보도 본문으로 취급합니다.
pub fn classify_blocks(page_text: &str, page: usize, infer_tables: bool) -> Vec<Block> {
    let normalized = page_text.replace("\r\n", "\n");
    let mut blocks = Vec::new();

    for raw in blank_line_re().split(&normalized) {
        let lines: Vec<&str> = raw
            .lines()
            .map(|l| l.trim_end())
            .filter(|l| !l.trim().is_empty())
            .collect();

        if lines.is_empty() {
            continue;
        }

        if infer_tables && looks_like_table(&lines) {
            blocks.push(Block {
                kind: BlockKind::Table,
                text: lines.join("\n"),
                page,
            });
            continue;
        }

        let first = lines[0].trim();
        if is_title(first) {
            blocks.push(Block {
                kind: BlockKind::Title,
                text: first.to_string(),
                page,
            });

            if lines.len() > 1 {
                blocks.push(Block {
                    kind: BlockKind::Narrative,
                    text: join_narrative(&lines[1..]),
                    page,
                });
            }
            continue;
        }

        blocks.push(Block {
            kind: BlockKind::Narrative,
            text: join_narrative(&lines),
            page,
        });
    }

    blocks
}

/// 표 블록 판정: 2줄 이상이고 절반 이상의 줄에 열 간격이 있음
fn looks_like_table(lines: &[&str]) -> bool {
    if lines.len() < 2 {
        return false;
    }

    let columnar = lines
        .iter()
        .filter(|l| column_gap_re().is_match(l.trim()))
        .count();

    columnar * 2 >= lines.len()
}

/// 제목 판정
pub fn is_title(line: &str) -> bool {
    let line = line.trim();
    let char_count = line.chars().count();

    if char_count < 2 || char_count > TITLE_MAX_CHARS {
        return false;
    }
    if line.split_whitespace().count() > TITLE_MAX_WORDS {
        return false;
    }
    if line.ends_with(&['.', ',', ';', '!', '?', '-'][..]) {
        return false;
    }

    let letters = line.chars().filter(|c| c.is_alphabetic()).count();
    if letters == 0 || letters * 2 < char_count {
        return false;
    }

    // 첫 글자(번호 제외)가 대문자
    line.chars()
        .find(|c| c.is_alphabetic())
        .map(|c| c.is_uppercase())
        .unwrap_or(false)
}

/// 본문 줄을 한 문단으로 결합 (하이픈 줄바꿈 복원)
fn join_narrative(lines: &[&str]) -> String {
    let mut out = String::new();
    for line in lines {
        let line = line.trim();
        if out.ends_with('-') {
            out.pop();
            out.push_str(line);
        } else {
            if !out.is_empty() {
                out.push(' ');
            }
            out.push_str(line);
        }
    }
    out
}

// ============================================================================
// Tests
// ============================================================================
