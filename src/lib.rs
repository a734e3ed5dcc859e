//! dilo-rag - 멀티모달 PDF RAG 챗봇
//!
//! PDF에서 텍스트/표/이미지를 추출해 멀티모달 모델로 요약하고,
//! 요약 임베딩(LanceDB)과 원본(SQLite)을 분리 저장하는 멀티벡터 검색으로
//! 질문에 답변하고 관련 이미지를 함께 보여줍니다.

pub mod chat;
pub mod cli;
pub mod collector;
pub mod config;
pub mod embedding;
pub mod extractor;
pub mod knowledge;
pub mod llm;
pub mod provider;
pub mod rag;
pub mod summarizer;

// Re-exports
pub use config::{get_data_dir, RagConfig};
pub use embedding::{create_embedder, EmbeddingProvider, OpenAiEmbedding};
pub use extractor::{partition_pdf, Element, ElementKind, PartitionConfig};
pub use knowledge::{
    DocStore, InMemoryVectorStore, LanceVectorStore, MultiVectorRetriever, RetrievedElement,
    SearchResult, StoreStats, VectorEntry, VectorStore,
};
pub use llm::{ChatMessage, ChatModel, OpenAiChat};
pub use provider::{get_api_key, has_api_key, ApiError, OpenAiClient};
pub use rag::{build_context, Answer, AnswerEngine, IngestOptions, IngestReport, Indexer};
pub use summarizer::{SummarizedElement, Summarizer};
