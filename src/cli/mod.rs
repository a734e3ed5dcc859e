//! CLI 모듈
//!
//! dilo-rag CLI 명령어 정의 및 구현

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::chat::{
    format_question_list, parse_input, resolve_question, save_images, ChatInput,
    FOLLOW_UP_MESSAGE, GOODBYE_MESSAGE, WELCOME_MESSAGE,
};
use crate::collector::{CollectionStats, CollectorConfig, FileCollector, FileType};
use crate::config::RagConfig;
use crate::embedding::{create_embedder, EmbeddingProvider};
use crate::extractor::ElementKind;
use crate::knowledge::{DocStore, LanceVectorStore, MultiVectorRetriever, VectorStore};
use crate::llm::{ChatModel, OpenAiChat};
use crate::provider::{has_api_key, OpenAiClient};
use crate::rag::{Answer, AnswerEngine, IngestOptions, Indexer};
use crate::summarizer::Summarizer;

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Parser)]
#[command(name = "dilo-rag")]
#[command(version, about = "멀티모달 PDF RAG 챗봇", long_about = None)]
pub struct Cli {
    /// 데이터 디렉토리 (기본: ~/.dilo-rag, DILO_DATA_DIR)
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// 폴더의 PDF/이미지를 요약해 지식베이스에 추가
    Ingest {
        /// 수집할 폴더 경로
        #[arg(short, long, default_value = "Data")]
        dir: PathBuf,

        /// 변경되지 않은 파일도 다시 처리
        #[arg(long)]
        force: bool,

        /// 이미지 파일 건너뛰기
        #[arg(long)]
        skip_images: bool,

        /// 하위 폴더까지 탐색
        #[arg(short, long)]
        recursive: bool,

        /// 요약 동시 요청 수
        #[arg(long)]
        max_concurrency: Option<usize>,
    },

    /// 질문 하나에 답변
    Ask {
        /// 질문 (숫자면 미리 정의된 질문 번호)
        question: String,

        /// 검색 결과 수
        #[arg(short, long)]
        limit: Option<usize>,

        /// 관련 이미지 저장 폴더
        #[arg(long)]
        images_dir: Option<PathBuf>,

        /// 관련 이미지를 답변 모델에 함께 전달
        #[arg(long)]
        attach_images: bool,
    },

    /// 대화형 챗봇
    Chat {
        /// 검색 결과 수
        #[arg(short, long)]
        limit: Option<usize>,

        /// 관련 이미지 저장 폴더
        #[arg(long)]
        images_dir: Option<PathBuf>,

        /// 관련 이미지를 답변 모델에 함께 전달
        #[arg(long)]
        attach_images: bool,
    },

    /// 미리 정의된 질문 목록
    Questions,

    /// 수집된 소스 목록
    List {
        /// 결과 개수 제한
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// 상태 확인
    Status,
}

// ============================================================================
// CLI Runner
// ============================================================================

/// CLI 명령어 실행
pub async fn run(cli: Cli) -> Result<()> {
    let mut config = RagConfig::from_env().context("설정 로드 실패")?;
    if let Some(dir) = cli.data_dir {
        config.set_data_dir(dir);
    }

    match cli.command {
        Commands::Ingest {
            dir,
            force,
            skip_images,
            recursive,
            max_concurrency,
        } => {
            if let Some(n) = max_concurrency {
                config.max_concurrency = n;
            }
            let options = IngestOptions {
                force,
                skip_images,
                recursive,
            };
            cmd_ingest(&config, &dir, &options).await
        }
        Commands::Ask {
            question,
            limit,
            images_dir,
            attach_images,
        } => {
            apply_limit(&mut config, limit);
            cmd_ask(&config, &question, images_dir.as_deref(), attach_images).await
        }
        Commands::Chat {
            limit,
            images_dir,
            attach_images,
        } => {
            apply_limit(&mut config, limit);
            cmd_chat(&config, images_dir.as_deref(), attach_images).await
        }
        Commands::Questions => {
            println!("{}", format_question_list());
            Ok(())
        }
        Commands::List { limit } => cmd_list(&config, limit),
        Commands::Status => cmd_status(&config).await,
    }
}

fn apply_limit(config: &mut RagConfig, limit: Option<usize>) {
    if let Some(k) = limit {
        config.top_k = k;
    }
}

// ============================================================================
// Pipeline Setup
// ============================================================================

fn require_api_key() -> Result<()> {
    if !has_api_key() {
        bail!(
            "API 키가 설정되지 않았습니다.\n\n\
             설정 방법:\n  \
             export OPENAI_API_KEY=your-api-key\n  \
             또는 .env 파일에 OPENAI_API_KEY=... 추가"
        );
    }
    Ok(())
}

/// 검색기 + 채팅 모델 구성
async fn open_pipeline(config: &RagConfig) -> Result<(Arc<MultiVectorRetriever>, Arc<dyn ChatModel>)> {
    require_api_key()?;
    config.validate()?;
    config.ensure_data_dir()?;

    let client = OpenAiClient::from_env(&config.base_url, config.requests_per_minute)?;
    let embedder = create_embedder(client.clone(), config)?;

    let docstore = DocStore::open(&config.db_path()).context("DocStore 열기 실패")?;
    let vectors = LanceVectorStore::open(&config.lance_path(), embedder.dimension())
        .await
        .context("벡터 저장소 열기 실패")?;

    let retriever = Arc::new(MultiVectorRetriever::new(
        docstore,
        Box::new(vectors),
        Arc::new(embedder),
    ));
    let model: Arc<dyn ChatModel> = Arc::new(OpenAiChat::from_config(client, config));

    Ok((retriever, model))
}

// ============================================================================
// Command Implementations
// ============================================================================

/// 수집 명령어 (ingest)
async fn cmd_ingest(config: &RagConfig, dir: &Path, options: &IngestOptions) -> Result<()> {
    // 대상 미리보기
    let preview = FileCollector::new(CollectorConfig {
        max_depth: if options.recursive { None } else { Some(1) },
        skip_images: options.skip_images,
        exclude_dir: Some(config.partition.image_output_dir.clone()),
        ..Default::default()
    })
    .collect_directory(dir)
    .with_context(|| format!("폴더를 읽을 수 없습니다: {}", dir.display()))?;

    if preview.is_empty() {
        println!("[!] 수집할 파일이 없습니다: {}", dir.display());
        return Ok(());
    }

    let stats = CollectionStats::from_files(&preview);
    println!("[*] 수집 대상: {} 파일", stats.total_files);
    println!("    PDF: {}, 이미지: {}", stats.pdf_files, stats.image_files);
    println!("    총 크기: {}", format_bytes(stats.total_size as usize));
    println!();

    let (retriever, model) = open_pipeline(config).await?;
    let summarizer = Summarizer::new(model).with_max_concurrency(config.max_concurrency);
    let indexer = Indexer::new(retriever, summarizer, config.partition.clone());

    println!(
        "[*] 추출 및 요약 중 ({}, 동시 요청 {})...",
        config.chat_model, config.max_concurrency
    );

    let report = indexer.ingest_directory(dir, options).await?;

    println!();
    println!(
        "[OK] 완료: 처리 {}, 변경 없음 {}, 실패 {}",
        report.ingested, report.unchanged, report.failed
    );
    println!(
        "     요소: 텍스트 {}, 표 {}, 이미지 {} (합계 {})",
        report.text_elements,
        report.table_elements,
        report.image_elements,
        report.total_elements()
    );

    for (path, error) in &report.failures {
        println!("[!] {}: {}", path.display(), truncate_text(error, 200));
    }

    Ok(())
}

/// 질문 명령어 (ask)
async fn cmd_ask(
    config: &RagConfig,
    input: &str,
    images_dir: Option<&Path>,
    attach_images: bool,
) -> Result<()> {
    let question = resolve_question(input);
    let engine = open_engine(config, attach_images).await?;

    println!("[*] 질문: {}", question);
    let answer = engine.answer(&question).await.context("답변 생성 실패")?;
    print_answer(&answer, images_dir)
}

/// 대화 명령어 (chat)
async fn cmd_chat(config: &RagConfig, images_dir: Option<&Path>, attach_images: bool) -> Result<()> {
    let engine = open_engine(config, attach_images).await?;

    println!("{}", WELCOME_MESSAGE);
    println!();
    println!("번호를 입력하면 미리 정의된 질문을, 'list'는 질문 목록, 'exit'는 종료입니다.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("\n> ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };

        match parse_input(&line) {
            ChatInput::Empty => continue,
            ChatInput::ListQuestions => {
                println!("Please choose a question by entering its number:\n");
                println!("{}", format_question_list());
            }
            ChatInput::Quit => break,
            ChatInput::Ask(question) => {
                println!("[*] Thinking...");
                match engine.answer(&question).await {
                    Ok(answer) => print_answer(&answer, images_dir)?,
                    Err(e) => println!("[!] 답변 생성 실패: {:#}", e),
                }
                println!();
                println!("{}", FOLLOW_UP_MESSAGE);
            }
        }
    }

    println!("{}", GOODBYE_MESSAGE);
    Ok(())
}

async fn open_engine(config: &RagConfig, attach_images: bool) -> Result<AnswerEngine> {
    let (retriever, model) = open_pipeline(config).await?;

    if retriever.vectors().count().await? == 0 {
        println!("[!] 지식베이스가 비어 있습니다. 먼저 `dilo-rag ingest`를 실행하세요.");
    }

    Ok(AnswerEngine::new(retriever, model)
        .with_top_k(config.top_k)
        .with_attach_images(attach_images))
}

fn print_answer(answer: &Answer, images_dir: Option<&Path>) -> Result<()> {
    println!();
    println!("{}", answer.text.trim());
    println!();

    if !answer.sources.is_empty() {
        println!("[*] 참고한 요소 ({} 건):", answer.sources.len());
        for (i, source) in answer.sources.iter().enumerate() {
            let label = match source.kind {
                ElementKind::Text => "TXT",
                ElementKind::Table => "TBL",
                ElementKind::Image => "IMG",
            };
            println!(
                "  {}. [{}] [점수: {:.4}] {}",
                i + 1,
                label,
                source.score,
                truncate_text(&source.summary, 80)
            );
        }
    }

    if answer.images.is_empty() {
        return Ok(());
    }

    match images_dir {
        Some(dir) => {
            let paths = save_images(dir, &answer.images).context("이미지 저장 실패")?;
            println!("[OK] 관련 이미지 {} 개 저장:", paths.len());
            for path in paths {
                println!("     {}", path.display());
            }
        }
        None => println!(
            "[*] 관련 이미지 {} 개 (--images-dir 로 저장 가능)",
            answer.images.len()
        ),
    }

    Ok(())
}

/// 목록 명령어 (list)
fn cmd_list(config: &RagConfig, limit: usize) -> Result<()> {
    let store = DocStore::open(&config.db_path()).context("DocStore 열기 실패")?;
    let sources = store.list_sources(limit).context("소스 목록 조회 실패")?;

    if sources.is_empty() {
        println!("[!] 수집된 문서가 없습니다.");
        return Ok(());
    }

    println!("[OK] 수집된 문서 ({} 건):\n", sources.len());

    for source in sources {
        let label = FileType::from_path(Path::new(&source.path))
            .map(|t| t.label())
            .unwrap_or("?");
        println!("  #{:<4} [{}] {}", source.id, label, source.path);
        println!(
            "        {} | {} elements | sha256 {}",
            source.ingested_at.format("%Y-%m-%d %H:%M"),
            source.element_count,
            truncate_text(&source.sha256, 12)
        );
        println!();
    }

    Ok(())
}

/// 상태 명령어 (status)
async fn cmd_status(config: &RagConfig) -> Result<()> {
    println!("dilo-rag v{}", env!("CARGO_PKG_VERSION"));
    println!();

    println!("[*] 데이터 디렉토리: {}", config.data_dir.display());
    println!("[*] 채팅 모델: {}", config.chat_model);
    println!(
        "[*] 임베딩 모델: {} ({}차원)",
        config.embedding_model, config.embedding_dimension
    );

    if has_api_key() {
        println!("[OK] API 키: 설정됨");
    } else {
        println!("[!] API 키: 미설정");
        println!("    설정: export OPENAI_API_KEY=your-key");
    }

    if !config.db_path().exists() {
        println!("[!] 지식베이스가 아직 없습니다. `dilo-rag ingest`로 생성하세요.");
        return Ok(());
    }

    match DocStore::open(&config.db_path()).and_then(|store| store.stats()) {
        Ok(stats) => {
            println!("[OK] DB: {}", stats.db_path.display());
            println!("[OK] 소스: {} 건", stats.source_count);
            println!(
                "     요소: {} 건 (텍스트 {}, 표 {}, 이미지 {})",
                stats.element_count, stats.text_count, stats.table_count, stats.image_count
            );
        }
        Err(e) => println!("[!] DocStore 통계 조회 실패: {}", e),
    }

    match LanceVectorStore::open(&config.lance_path(), config.embedding_dimension).await {
        Ok(vectors) => match vectors.count().await {
            Ok(count) => println!("[OK] 벡터 인덱스: {} 건", count),
            Err(e) => tracing::debug!("Vector count failed: {}", e),
        },
        Err(e) => tracing::debug!("Vector store open failed: {}", e),
    }

    Ok(())
}

// ============================================================================
// Helper Functions
// ============================================================================

/// 텍스트 자르기 (UTF-8 안전)
fn truncate_text(text: &str, max_chars: usize) -> String {
    let cleaned = text.replace('\n', " ").replace('\r', "");
    let cleaned = cleaned.trim();

    if cleaned.chars().count() <= max_chars {
        cleaned.to_string()
    } else {
        let truncated: String = cleaned.chars().take(max_chars).collect();
        format!("{}...", truncated)
    }
}

/// 바이트 크기 포맷팅
fn format_bytes(bytes: usize) -> String {
    const KB: usize = 1024;
    const MB: usize = KB * 1024;

    if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

// ============================================================================
// Tests
// ============================================================================
