//! 설정 모듈
//!
//! 기본값 위에 환경변수(.env 포함)를 덮어써서 런타임 설정을 구성합니다.
//!
//! | 환경변수 | 용도 |
//! |---|---|
//! | `OPENAI_API_KEY` | API 키 (provider 모듈에서 읽음) |
//! | `OPENAI_BASE_URL` | OpenAI 호환 엔드포인트 |
//! | `DILO_CHAT_MODEL` | 요약/답변 모델 |
//! | `DILO_EMBEDDING_MODEL` | 임베딩 모델 |
//! | `DILO_EMBEDDING_DIMENSION` | 임베딩 차원 |
//! | `DILO_DATA_DIR` | 데이터 디렉토리 |

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::extractor::PartitionConfig;

/// 기본 OpenAI 엔드포인트
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// 기본 멀티모달 채팅 모델
pub const DEFAULT_CHAT_MODEL: &str = "gpt-4o";

/// 기본 임베딩 모델
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";

/// 기본 임베딩 차원 (text-embedding-3-small)
pub const DEFAULT_EMBEDDING_DIMENSION: usize = 1536;

// ============================================================================
// Data Directory
// ============================================================================

/// 데이터 디렉토리 경로 (~/.dilo-rag/)
pub fn get_data_dir() -> PathBuf {
    if let Some(dir) = env_string("DILO_DATA_DIR") {
        return PathBuf::from(dir);
    }

    dirs::data_local_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".dilo-rag")
}

// ============================================================================
// RagConfig
// ============================================================================

/// 파이프라인 전체 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RagConfig {
    /// 데이터 디렉토리 (knowledge.db, vectors.lance, figures/)
    pub data_dir: PathBuf,
    /// OpenAI 호환 API 베이스 URL
    pub base_url: String,
    /// 채팅 모델 이름
    pub chat_model: String,
    /// 임베딩 모델 이름
    pub embedding_model: String,
    /// 임베딩 차원
    pub embedding_dimension: usize,
    /// 샘플링 온도
    pub temperature: f32,
    /// 응답 최대 토큰
    pub max_tokens: u32,
    /// 요약 동시 요청 수
    pub max_concurrency: usize,
    /// 검색 결과 수
    pub top_k: usize,
    /// 분당 최대 요청 수
    pub requests_per_minute: u32,
    /// PDF 분할 설정
    pub partition: PartitionConfig,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self::with_data_dir(get_data_dir())
    }
}

impl RagConfig {
    /// 지정한 데이터 디렉토리로 기본 설정 생성
    pub fn with_data_dir(data_dir: PathBuf) -> Self {
        let partition = PartitionConfig {
            image_output_dir: data_dir.join("figures"),
            ..PartitionConfig::default()
        };

        Self {
            data_dir,
            base_url: DEFAULT_BASE_URL.to_string(),
            chat_model: DEFAULT_CHAT_MODEL.to_string(),
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
            embedding_dimension: DEFAULT_EMBEDDING_DIMENSION,
            temperature: 0.0,
            max_tokens: 1024,
            max_concurrency: 5,
            top_k: 4,
            requests_per_minute: 500,
            partition,
        }
    }

    /// 환경변수를 반영한 설정
    ///
    /// `.env` 파일이 있으면 먼저 로드합니다.
    pub fn from_env() -> Result<Self> {
        if let Ok(path) = dotenvy::dotenv() {
            tracing::debug!("Loaded environment from {:?}", path);
        }

        let mut config = Self::default();

        if let Some(url) = env_string("OPENAI_BASE_URL") {
            config.base_url = url.trim_end_matches('/').to_string();
        }
        if let Some(model) = env_string("DILO_CHAT_MODEL") {
            config.chat_model = model;
        }
        if let Some(model) = env_string("DILO_EMBEDDING_MODEL") {
            config.embedding_model = model;
        }
        if let Some(dim) = env_string("DILO_EMBEDDING_DIMENSION") {
            config.embedding_dimension = dim
                .parse()
                .with_context(|| format!("Invalid DILO_EMBEDDING_DIMENSION: {}", dim))?;
        }

        config.validate()?;
        Ok(config)
    }

    /// 설정 값 검증
    pub fn validate(&self) -> Result<()> {
        if self.embedding_dimension == 0 {
            anyhow::bail!("Embedding dimension must be greater than 0");
        }
        if self.max_concurrency == 0 {
            anyhow::bail!("max_concurrency must be at least 1");
        }
        if self.top_k == 0 {
            anyhow::bail!("top_k must be at least 1");
        }
        self.partition.validate()
    }

    /// 데이터 디렉토리 변경 (추출 이미지 폴더도 함께 이동)
    pub fn set_data_dir(&mut self, data_dir: PathBuf) {
        self.partition.image_output_dir = data_dir.join("figures");
        self.data_dir = data_dir;
    }

    /// SQLite docstore 경로
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("knowledge.db")
    }

    /// LanceDB 경로
    pub fn lance_path(&self) -> PathBuf {
        self.data_dir.join("vectors.lance")
    }

    /// 데이터 디렉토리 생성
    pub fn ensure_data_dir(&self) -> Result<&Path> {
        if !self.data_dir.exists() {
            std::fs::create_dir_all(&self.data_dir)
                .with_context(|| format!("Failed to create data directory: {:?}", self.data_dir))?;
        }
        Ok(&self.data_dir)
    }
}

/// 비어있지 않은 환경변수 값
fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_paths() {
        let config = RagConfig::with_data_dir(PathBuf::from("/tmp/dilo"));
        assert_eq!(config.db_path(), PathBuf::from("/tmp/dilo/knowledge.db"));
        assert_eq!(config.lance_path(), PathBuf::from("/tmp/dilo/vectors.lance"));
        assert_eq!(
            config.partition.image_output_dir,
            PathBuf::from("/tmp/dilo/figures")
        );
    }

    #[test]
    fn test_defaults_match_pipeline() {
        let config = RagConfig::with_data_dir(PathBuf::from("."));
        assert_eq!(config.max_concurrency, 5);
        assert_eq!(config.max_tokens, 1024);
        assert_eq!(config.top_k, 4);
        assert_eq!(config.temperature, 0.0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_values() {
        let mut config = RagConfig::with_data_dir(PathBuf::from("."));
        config.top_k = 0;
        assert!(config.validate().is_err());

        let mut config = RagConfig::with_data_dir(PathBuf::from("."));
        config.embedding_dimension = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_set_data_dir_moves_figures() {
        let mut config = RagConfig::with_data_dir(PathBuf::from("/tmp/a"));
        config.set_data_dir(PathBuf::from("/tmp/b"));
        assert_eq!(config.db_path(), PathBuf::from("/tmp/b/knowledge.db"));
        assert_eq!(
            config.partition.image_output_dir,
            PathBuf::from("/tmp/b/figures")
        );
    }
}
