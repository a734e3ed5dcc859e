//! Knowledge 모듈 - 멀티벡터 지식 저장소
//!
//! - SQLite: 요소 원본 저장 (docstore)
//! - LanceDB: 요약 임베딩 벡터 검색 (ANN)
//! - Retriever: 요약으로 검색, 원본으로 반환

mod lance;
mod retriever;
mod store;
mod vector;

// Re-exports
pub use lance::LanceVectorStore;
pub use retriever::{MultiVectorRetriever, RetrievedElement, DEFAULT_TOP_K};
pub use store::{DocStore, NewElement, Source, StoreStats, StoredElement};
pub use vector::{cosine_similarity, InMemoryVectorStore, SearchResult, VectorEntry, VectorStore};
