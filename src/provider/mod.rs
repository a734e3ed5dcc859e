//! OpenAI 호환 API 공통 모듈
//!
//! 채팅/임베딩 클라이언트가 공유하는 HTTP 처리:
//! - API 키 로드
//! - Rate Limiter (슬라이딩 윈도우 + 최소 딜레이)
//! - 429/5xx 지수 백오프 재시도
//!
//! ref: https://platform.openai.com/docs/api-reference

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;

/// 요청 타임아웃
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);
/// 재시도 최대 횟수
const MAX_RETRIES: u32 = 3;
/// 재시도 시 초기 백오프 (ms)
const INITIAL_BACKOFF_MS: u64 = 2000;
/// Rate limit 윈도우
const RATE_LIMIT_WINDOW: Duration = Duration::from_secs(60);

// ============================================================================
// Errors
// ============================================================================

/// API 호출 에러
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(
        "API key not found. Set OPENAI_API_KEY environment variable.\n\
         Get your API key at: https://platform.openai.com/api-keys"
    )]
    MissingApiKey,

    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("rate limit exceeded (429) after {0} retries")]
    RateLimited(u32),

    #[error("failed to parse response: {0}")]
    Parse(#[from] serde_json::Error),
}

impl ApiError {
    /// 재시도할 만한 에러인지
    fn is_retryable(&self) -> bool {
        match self {
            ApiError::Transport(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            ApiError::Api { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

/// OpenAI 에러 응답
#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
}

// ============================================================================
// API Key Management
// ============================================================================

/// API 키 로드 (OPENAI_API_KEY)
pub fn get_api_key() -> Result<String, ApiError> {
    match std::env::var("OPENAI_API_KEY") {
        Ok(key) if !key.trim().is_empty() => {
            tracing::debug!("Using API key from OPENAI_API_KEY");
            Ok(key)
        }
        _ => Err(ApiError::MissingApiKey),
    }
}

/// API 키 존재 여부 확인
pub fn has_api_key() -> bool {
    get_api_key().is_ok()
}

// ============================================================================
// Rate Limiter
// ============================================================================

/// Rate Limiter with minimum delay between requests
#[derive(Debug)]
struct RateLimiter {
    requests: Vec<Instant>,
    max_requests: u32,
    window: Duration,
    min_delay: Duration,
    last_request: Option<Instant>,
}

impl RateLimiter {
    fn new(max_requests: u32, window: Duration) -> Self {
        let max_requests = max_requests.max(1);
        Self {
            requests: Vec::new(),
            max_requests,
            window,
            min_delay: window / (max_requests * 4),
            last_request: None,
        }
    }

    /// 요청 가능 여부 확인 및 대기
    async fn acquire(&mut self) {
        if let Some(last) = self.last_request {
            let elapsed = last.elapsed();
            if elapsed < self.min_delay {
                tokio::time::sleep(self.min_delay - elapsed).await;
            }
        }

        let now = Instant::now();
        self.requests.retain(|&t| now.duration_since(t) < self.window);

        if self.requests.len() >= self.max_requests as usize {
            if let Some(&oldest) = self.requests.first() {
                let wait_time = self.window.saturating_sub(now.duration_since(oldest));
                if !wait_time.is_zero() {
                    tracing::debug!("Rate limit reached, waiting {:?}", wait_time);
                    tokio::time::sleep(wait_time).await;
                }
                let now = Instant::now();
                self.requests.retain(|&t| now.duration_since(t) < self.window);
            }
        }

        let now = Instant::now();
        self.requests.push(now);
        self.last_request = Some(now);
    }
}

// ============================================================================
// OpenAiClient
// ============================================================================

/// OpenAI 호환 HTTP 클라이언트
///
/// `Clone`은 내부 커넥션 풀과 rate limiter를 공유합니다.
#[derive(Debug, Clone)]
pub struct OpenAiClient {
    api_key: String,
    base_url: String,
    http: reqwest::Client,
    rate_limiter: Arc<Mutex<RateLimiter>>,
}

impl OpenAiClient {
    /// 새 클라이언트 생성
    pub fn new(api_key: String, base_url: &str, requests_per_minute: u32) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
            rate_limiter: Arc::new(Mutex::new(RateLimiter::new(
                requests_per_minute,
                RATE_LIMIT_WINDOW,
            ))),
        })
    }

    /// 환경변수의 API 키로 생성
    pub fn from_env(base_url: &str, requests_per_minute: u32) -> Result<Self> {
        let api_key = get_api_key()?;
        Self::new(api_key, base_url, requests_per_minute)
    }

    /// 엔드포인트 URL
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// JSON POST (rate limit + 재시도)
    pub async fn post_json<Req, Resp>(&self, path: &str, body: &Req) -> Result<Resp, ApiError>
    where
        Req: Serialize + Sync,
        Resp: DeserializeOwned,
    {
        let url = self.endpoint(path);
        let mut attempt = 0;

        loop {
            {
                let mut limiter = self.rate_limiter.lock().await;
                limiter.acquire().await;
            }

            match self.send_once(&url, body).await {
                Ok(resp) => return Ok(resp),
                Err(e) if e.is_retryable() && attempt < MAX_RETRIES => {
                    let backoff = Duration::from_millis(INITIAL_BACKOFF_MS * 2u64.pow(attempt));
                    tracing::warn!(
                        "{} failed ({}), retrying in {:?} (attempt {}/{})",
                        path,
                        e,
                        backoff,
                        attempt + 1,
                        MAX_RETRIES
                    );
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
                Err(ApiError::Api { status: 429, .. }) => {
                    return Err(ApiError::RateLimited(MAX_RETRIES));
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn send_once<Req, Resp>(&self, url: &str, body: &Req) -> Result<Resp, ApiError>
    where
        Req: Serialize + Sync,
        Resp: DeserializeOwned,
    {
        let response = self
            .http
            .post(url)
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            let message = serde_json::from_str::<ErrorBody>(&text)
                .map(|e| e.error.message)
                .unwrap_or(text);
            return Err(ApiError::Api {
                status: status.as_u16(),
                message,
            });
        }

        Ok(serde_json::from_str(&text)?)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_join() {
        let client =
            OpenAiClient::new("key".to_string(), "https://api.openai.com/v1/", 60).unwrap();
        assert_eq!(
            client.endpoint("/chat/completions"),
            "https://api.openai.com/v1/chat/completions"
        );
        assert_eq!(
            client.endpoint("embeddings"),
            "https://api.openai.com/v1/embeddings"
        );
    }

    #[test]
    fn test_retryable_statuses() {
        let rate_limited = ApiError::Api {
            status: 429,
            message: "slow down".to_string(),
        };
        let server = ApiError::Api {
            status: 503,
            message: "unavailable".to_string(),
        };
        let bad_request = ApiError::Api {
            status: 400,
            message: "invalid".to_string(),
        };

        assert!(rate_limited.is_retryable());
        assert!(server.is_retryable());
        assert!(!bad_request.is_retryable());
        assert!(!ApiError::MissingApiKey.is_retryable());
    }

    #[test]
    fn test_rate_limiter_min_delay() {
        let limiter = RateLimiter::new(60, Duration::from_secs(60));
        assert_eq!(limiter.min_delay, Duration::from_millis(250));
    }

    #[tokio::test]
    async fn test_rate_limiter_records_requests() {
        let mut limiter = RateLimiter::new(6000, Duration::from_secs(60));
        limiter.acquire().await;
        limiter.acquire().await;
        assert_eq!(limiter.requests.len(), 2);
        assert!(limiter.last_request.is_some());
    }
}
