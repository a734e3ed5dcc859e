//! DocStore - rusqlite 기반 원본 저장소
//!
//! 요소 원본(텍스트, 표, base64 이미지)을 요소 ID로 저장합니다.
//! 벡터 저장소에는 요약만 있으므로, 검색 후 원본은 여기서 가져옵니다.
//! 저장 위치: <data_dir>/knowledge.db

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, params_from_iter, Connection, OpenFlags, OptionalExtension, Row};
use serde::Serialize;

use crate::extractor::ElementKind;

// ============================================================================
// Types
// ============================================================================

/// 수집된 소스 파일 (PDF 또는 이미지)
#[derive(Debug, Clone, Serialize)]
pub struct Source {
    pub id: i64,
    pub path: String,
    /// 파일 내용 SHA-256 (변경 감지)
    pub sha256: String,
    pub element_count: usize,
    pub ingested_at: DateTime<Utc>,
}

/// 저장된 요소
#[derive(Debug, Clone, PartialEq)]
pub struct StoredElement {
    pub id: String,
    pub source_id: i64,
    pub kind: ElementKind,
    pub summary: String,
    pub original_content: String,
    pub page: Option<usize>,
}

/// 새 요소 입력용 구조체
#[derive(Debug, Clone)]
pub struct NewElement {
    pub id: String,
    pub kind: ElementKind,
    pub summary: String,
    pub original_content: String,
    pub page: Option<usize>,
}

/// 저장소 통계
#[derive(Debug, Clone, Serialize)]
pub struct StoreStats {
    pub source_count: usize,
    pub element_count: usize,
    pub text_count: usize,
    pub table_count: usize,
    pub image_count: usize,
    pub db_path: PathBuf,
}

// ============================================================================
// DocStore
// ============================================================================

/// DocStore - 동기 원본 저장소
pub struct DocStore {
    conn: Arc<Mutex<Connection>>,
    db_path: PathBuf,
}

impl DocStore {
    /// 저장소 열기 (없으면 생성)
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent).context("Failed to create database directory")?;
            }
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .context("Failed to open SQLite database")?;

        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
            db_path: path.to_path_buf(),
        };

        store.initialize()?;
        Ok(store)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| anyhow::anyhow!("Lock error: {}", e))
    }

    /// 스키마 초기화
    fn initialize(&self) -> Result<()> {
        let conn = self.lock()?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS sources (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                path TEXT NOT NULL UNIQUE,
                sha256 TEXT NOT NULL,
                element_count INTEGER NOT NULL DEFAULT 0,
                ingested_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS elements (
                id TEXT PRIMARY KEY,
                source_id INTEGER NOT NULL REFERENCES sources(id),
                kind TEXT NOT NULL,
                summary TEXT NOT NULL,
                original_content TEXT NOT NULL,
                page INTEGER,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_elements_source ON elements(source_id);
            "#,
        )
        .context("Failed to create docstore schema")?;

        tracing::debug!("Docstore initialized at {:?}", self.db_path);
        Ok(())
    }

    /// 소스 저장 (경로가 같으면 해시/요소 수 갱신)
    pub fn upsert_source(&self, path: &str, sha256: &str, element_count: usize) -> Result<i64> {
        let conn = self.lock()?;
        let now = Utc::now().to_rfc3339();

        conn.execute(
            "INSERT INTO sources (path, sha256, element_count, ingested_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(path) DO UPDATE SET
                sha256 = excluded.sha256,
                element_count = excluded.element_count,
                ingested_at = excluded.ingested_at",
            params![path, sha256, element_count as i64, now],
        )
        .context("Failed to upsert source")?;

        let id: i64 = conn
            .query_row("SELECT id FROM sources WHERE path = ?1", params![path], |row| {
                row.get(0)
            })
            .context("Failed to read source id")?;

        tracing::debug!("Upserted source: {} (id={})", path, id);
        Ok(id)
    }

    /// 경로로 소스 조회
    pub fn get_source_by_path(&self, path: &str) -> Result<Option<Source>> {
        let conn = self.lock()?;

        conn.query_row(
            "SELECT id, path, sha256, element_count, ingested_at FROM sources WHERE path = ?1",
            params![path],
            row_to_source,
        )
        .optional()
        .context("Failed to query source")
    }

    /// 소스 목록 (최근 수집 순)
    pub fn list_sources(&self, limit: usize) -> Result<Vec<Source>> {
        let conn = self.lock()?;

        let mut stmt = conn.prepare(
            "SELECT id, path, sha256, element_count, ingested_at FROM sources
             ORDER BY ingested_at DESC, id DESC
             LIMIT ?1",
        )?;

        let sources = stmt
            .query_map(params![limit as i64], row_to_source)?
            .filter_map(|r| r.ok())
            .collect();

        Ok(sources)
    }

    /// 소스 삭제 (요소 포함)
    pub fn delete_source(&self, id: i64) -> Result<bool> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        tx.execute("DELETE FROM elements WHERE source_id = ?1", params![id])?;
        let rows = tx.execute("DELETE FROM sources WHERE id = ?1", params![id])?;

        tx.commit().context("Failed to delete source")?;
        Ok(rows > 0)
    }

    /// 요소 일괄 저장
    pub fn add_elements(&self, source_id: i64, elements: &[NewElement]) -> Result<usize> {
        let mut conn = self.lock()?;
        let now = Utc::now().to_rfc3339();
        let tx = conn.transaction()?;

        {
            let mut stmt = tx.prepare(
                "INSERT INTO elements (id, source_id, kind, summary, original_content, page, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            )?;

            for element in elements {
                stmt.execute(params![
                    element.id,
                    source_id,
                    element.kind.as_str(),
                    element.summary,
                    element.original_content,
                    element.page.map(|p| p as i64),
                    now,
                ])
                .with_context(|| format!("Failed to insert element {}", element.id))?;
            }
        }

        tx.commit().context("Failed to commit elements")?;
        Ok(elements.len())
    }

    /// ID 목록으로 요소 조회
    ///
    /// 요청한 순서를 유지합니다. 없는 ID는 결과에서 빠집니다.
    pub fn get_elements(&self, ids: &[String]) -> Result<Vec<StoredElement>> {
        if ids.is_empty() {
            return Ok(vec![]);
        }

        let conn = self.lock()?;

        let placeholders = vec!["?"; ids.len()].join(", ");
        let sql = format!(
            "SELECT id, source_id, kind, summary, original_content, page FROM elements
             WHERE id IN ({})",
            placeholders
        );

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(ids.iter()), |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, Option<i64>>(5)?,
            ))
        })?;

        let mut found = HashMap::new();
        for row in rows {
            let (id, source_id, kind, summary, original_content, page) = row?;
            found.insert(
                id.clone(),
                StoredElement {
                    id,
                    source_id,
                    kind: kind.parse()?,
                    summary,
                    original_content,
                    page: page.map(|p| p as usize),
                },
            );
        }

        Ok(ids.iter().filter_map(|id| found.remove(id)).collect())
    }

    /// 저장소 통계
    pub fn stats(&self) -> Result<StoreStats> {
        let conn = self.lock()?;

        let count = |sql: &str| -> usize {
            conn.query_row(sql, [], |row| row.get::<_, i64>(0))
                .unwrap_or(0) as usize
        };

        Ok(StoreStats {
            source_count: count("SELECT COUNT(*) FROM sources"),
            element_count: count("SELECT COUNT(*) FROM elements"),
            text_count: count("SELECT COUNT(*) FROM elements WHERE kind = 'text'"),
            table_count: count("SELECT COUNT(*) FROM elements WHERE kind = 'table'"),
            image_count: count("SELECT COUNT(*) FROM elements WHERE kind = 'image'"),
            db_path: self.db_path.clone(),
        })
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

fn row_to_source(row: &Row<'_>) -> rusqlite::Result<Source> {
    Ok(Source {
        id: row.get(0)?,
        path: row.get(1)?,
        sha256: row.get(2)?,
        element_count: row.get::<_, i64>(3)? as usize,
        ingested_at: parse_datetime(row.get::<_, String>(4)?),
    })
}

/// RFC3339 문자열을 DateTime<Utc>로 파싱
fn parse_datetime(s: String) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

// ============================================================================
// Tests
// ============================================================================
