//! 제목 기준 청킹 (by title)
//!
//! 분류된 블록을 섹션 단위 청크로 묶습니다.
//! - 제목을 만나면 새 섹션 시작
//! - `new_after_n_chars`를 넘기면 청크 마감 (soft limit)
//! - `max_characters`를 넘는 블록은 강제 분할 (hard limit)
//! - 표는 텍스트와 섞지 않고 독립 청크
//! - `combine_text_under_n_chars` 미만 청크는 다음 청크와 병합

use super::pdf::{Block, BlockKind};
use super::{ElementKind, PartitionConfig};

/// 청크 결과
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub kind: ElementKind,
    pub text: String,
    /// 청크 첫 블록의 페이지
    pub page: usize,
}

/// 블록들을 제목 기준으로 청킹
pub fn chunk_by_title(blocks: &[Block], config: &PartitionConfig) -> Vec<Chunk> {
    let mut builder = SectionBuilder::new(config);

    for block in blocks {
        match block.kind {
            BlockKind::Table => {
                builder.flush();
                for piece in split_hard(&block.text, config.max_characters) {
                    builder.chunks.push(Chunk {
                        kind: ElementKind::Table,
                        text: piece,
                        page: block.page,
                    });
                }
            }
            BlockKind::Title => {
                builder.flush();
                builder.append(&block.text, block.page);
            }
            BlockKind::Narrative => {
                for piece in split_hard(&block.text, config.max_characters) {
                    builder.append(&piece, block.page);
                }
            }
        }
    }
    builder.flush();

    combine_small_chunks(builder.chunks, config)
}

// ============================================================================
// Section Builder
// ============================================================================

struct SectionBuilder<'a> {
    config: &'a PartitionConfig,
    current: String,
    /// `current`의 문자 수
    current_chars: usize,
    page: usize,
    chunks: Vec<Chunk>,
}

impl<'a> SectionBuilder<'a> {
    fn new(config: &'a PartitionConfig) -> Self {
        Self {
            config,
            current: String::new(),
            current_chars: 0,
            page: 0,
            chunks: Vec::new(),
        }
    }

    /// 텍스트 추가 (soft/hard limit 적용)
    fn append(&mut self, text: &str, page: usize) {
        let text_chars = text.chars().count();

        if !self.current.is_empty() {
            let combined = self.current_chars + 2 + text_chars;
            if self.current_chars >= self.config.new_after_n_chars
                || combined > self.config.max_characters
            {
                self.flush();
            }
        }

        if self.current.is_empty() {
            self.page = page;
        } else {
            self.current.push_str("\n\n");
            self.current_chars += 2;
        }
        self.current.push_str(text);
        self.current_chars += text_chars;

        if self.current_chars >= self.config.new_after_n_chars {
            self.flush();
        }
    }

    /// 현재 섹션 마감
    fn flush(&mut self) {
        let text = std::mem::take(&mut self.current);
        self.current_chars = 0;
        if text.trim().is_empty() {
            return;
        }
        self.chunks.push(Chunk {
            kind: ElementKind::Text,
            text,
            page: self.page,
        });
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// 작은 텍스트 청크 병합
///
/// 이전 청크가 `combine_text_under_n_chars` 미만이고 병합 결과가
/// `max_characters` 이하일 때만 병합합니다. 표는 병합하지 않습니다.
fn combine_small_chunks(chunks: Vec<Chunk>, config: &PartitionConfig) -> Vec<Chunk> {
    if config.combine_text_under_n_chars == 0 {
        return chunks;
    }

    let mut result: Vec<Chunk> = Vec::with_capacity(chunks.len());

    for chunk in chunks {
        if let Some(last) = result.last_mut() {
            if last.kind == ElementKind::Text && chunk.kind == ElementKind::Text {
                let last_chars = last.text.chars().count();
                if last_chars < config.combine_text_under_n_chars
                    && last_chars + chunk.text.chars().count() + 2 <= config.max_characters
                {
                    last.text.push_str("\n\n");
                    last.text.push_str(&chunk.text);
                    continue;
                }
            }
        }
        result.push(chunk);
    }

    result
}

/// `max_chars` 문자 이하 조각으로 강제 분할 (가능하면 공백에서)
fn split_hard(text: &str, max_chars: usize) -> Vec<String> {
    if text.chars().count() <= max_chars {
        return vec![text.to_string()];
    }

    let mut pieces = Vec::new();
    let mut rest = text;

    while let Some(limit) = char_offset(rest, max_chars) {
        let mut cut = limit;
        if let Some(space) = rest[..cut].rfind(char::is_whitespace) {
            if space > 0 {
                cut = space;
            }
        }
        if cut == 0 {
            // max_chars가 0인 경우 한 문자씩
            cut = char_offset(rest, 1).unwrap_or(rest.len());
        }

        let piece = rest[..cut].trim();
        if !piece.is_empty() {
            pieces.push(piece.to_string());
        }
        rest = rest[cut..].trim_start();
    }

    if !rest.trim().is_empty() {
        pieces.push(rest.trim().to_string());
    }

    pieces
}

/// `n`번째 문자의 바이트 오프셋 (문자가 `n`개 이하면 None)
#[inline]
fn char_offset(s: &str, n: usize) -> Option<usize> {
    s.char_indices().nth(n).map(|(i, _)| i)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn block(kind: BlockKind, text: &str, page: usize) -> Block {
        Block {
            kind,
            text: text.to_string(),
            page,
        }
    }

    fn small_config() -> PartitionConfig {
        PartitionConfig {
            max_characters: 100,
            new_after_n_chars: 80,
            combine_text_under_n_chars: 0,
            ..PartitionConfig::default()
        }
    }

    #[test]
    fn test_empty_blocks() {
        assert!(chunk_by_title(&[], &PartitionConfig::default()).is_empty());
    }

    #[test]
    fn test_titles_start_new_sections() {
        let blocks = vec![
            block(BlockKind::Title, "Overview", 1),
            block(BlockKind::Narrative, "First section body.", 1),
            block(BlockKind::Title, "Technical Data", 2),
            block(BlockKind::Narrative, "Second section body.", 2),
        ];

        let chunks = chunk_by_title(&blocks, &small_config());
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].text, "Overview\n\nFirst section body.");
        assert_eq!(chunks[1].page, 2);
        assert!(chunks[1].text.starts_with("Technical Data"));
    }

    #[test]
    fn test_tables_are_standalone() {
        let blocks = vec![
            block(BlockKind::Narrative, "Intro text.", 1),
            block(BlockKind::Table, "A    B\n1    2", 1),
            block(BlockKind::Narrative, "Outro text.", 1),
        ];

        let chunks = chunk_by_title(&blocks, &PartitionConfig::default());
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[1].kind, ElementKind::Table);
        assert_eq!(chunks[1].text, "A    B\n1    2");
        assert_eq!(chunks[0].kind, ElementKind::Text);
        assert_eq!(chunks[2].kind, ElementKind::Text);
    }

    #[test]
    fn test_soft_limit_closes_section() {
        let para = "word ".repeat(10); // 50 bytes
        let blocks = vec![
            block(BlockKind::Narrative, para.trim(), 1),
            block(BlockKind::Narrative, para.trim(), 1),
            block(BlockKind::Narrative, para.trim(), 1),
        ];

        let chunks = chunk_by_title(&blocks, &small_config());
        assert!(chunks.len() >= 2);
        assert!(chunks.iter().all(|c| c.text.len() <= 100));
    }

    #[test]
    fn test_oversized_block_is_hard_split() {
        let long = "abcdefghij ".repeat(30);
        let blocks = vec![block(BlockKind::Narrative, &long, 1)];

        let chunks = chunk_by_title(&blocks, &small_config());
        assert!(chunks.len() >= 3);
        assert!(chunks.iter().all(|c| c.text.len() <= 100));
    }

    #[test]
    fn test_combine_small_sections() {
        let config = PartitionConfig {
            max_characters: 200,
            new_after_n_chars: 180,
            combine_text_under_n_chars: 50,
            ..PartitionConfig::default()
        };
        let blocks = vec![
            block(BlockKind::Title, "Tiny", 1),
            block(BlockKind::Title, "Also Tiny", 1),
            block(BlockKind::Narrative, "Body text.", 1),
        ];

        let chunks = chunk_by_title(&blocks, &config);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "Tiny\n\nAlso Tiny\n\nBody text.");
    }

    #[test]
    fn test_combine_never_merges_tables() {
        let config = PartitionConfig {
            combine_text_under_n_chars: 2000,
            ..PartitionConfig::default()
        };
        let blocks = vec![
            block(BlockKind::Narrative, "Short.", 1),
            block(BlockKind::Table, "A    B\n1    2", 1),
        ];

        let chunks = chunk_by_title(&blocks, &config);
        assert_eq!(chunks.len(), 2);
    }

    #[test]
    fn test_split_hard_unicode() {
        let text = "세계 ".repeat(50);
        let pieces = split_hard(&text, 20);
        assert!(pieces.iter().all(|p| p.chars().count() <= 20));
        assert!(pieces.iter().all(|p| !p.is_empty()));
    }

    #[test]
    fn test_limits_count_characters() {
        // 2,999자 (UTF-8로는 8,997바이트)
        let korean = "가".repeat(2999);
        let blocks = vec![block(BlockKind::Narrative, &korean, 1)];

        let chunks = chunk_by_title(&blocks, &PartitionConfig::default());
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text.chars().count(), 2999);
    }

    #[test]
    fn test_combine_counts_characters() {
        let config = PartitionConfig {
            max_characters: 200,
            new_after_n_chars: 180,
            combine_text_under_n_chars: 50,
            ..PartitionConfig::default()
        };
        let blocks = vec![
            block(BlockKind::Title, &"ä".repeat(30), 1),
            block(BlockKind::Title, "Messbereich", 1),
        ];

        let chunks = chunk_by_title(&blocks, &config);
        assert_eq!(chunks.len(), 1);
    }

    #[test]
    fn test_char_offset() {
        let s = "Hello, 세계!";
        assert_eq!(char_offset(s, 5), Some(5));
        assert_eq!(char_offset(s, 8), Some(10));
        assert_eq!(char_offset(s, 10), None);
        assert_eq!(char_offset("", 0), None);
    }
}
