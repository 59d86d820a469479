//! Startup glue shared by the exercise binaries.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use agent_course::telemetry::{init_tracing, LogFormat};
use agent_course::{
    connect_pool, AgentDb, CourseConfig, Embedder, GroqClient, HuggingFaceEmbedder, InMemoryDb,
    Knowledge, PgVector, PostgresDb,
};
use anyhow::{bail, Context};
use serde_json::Value;
use sqlx::PgPool;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::warn;

/// Directory holding the course documents, relative to the workspace root.
pub const SAMPLE_DATA_DIR: &str = "sample_data";

pub struct Course {
    pub config: CourseConfig,
}

impl Course {
    /// Load `.env`, install logging and build the configuration. Fails when
    /// `GROQ_API_KEY` is missing.
    pub fn init() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        init_tracing(LogFormat::from_env());

        let config = CourseConfig::from_env_or_file(None)?;
        if let Err(err) = config.require_model_key() {
            eprintln!("❌ Error: GROQ_API_KEY not found in environment variables.");
            eprintln!("Please create a .env file with your API key.");
            return Err(err.into());
        }
        Ok(Self { config })
    }

    /// Groq client for one exercise. `AGENT_COURSE_MAX_TOKENS` wins over the
    /// exercise default.
    pub fn model(&self, default_max_tokens: u32) -> anyhow::Result<Arc<GroqClient>> {
        let max_tokens = self.config.model.max_tokens.unwrap_or(default_max_tokens);
        let client = GroqClient::from_config(&self.config.model.with_max_tokens(max_tokens))?;
        Ok(Arc::new(client))
    }

    /// Session and memory storage in PostgreSQL.
    pub async fn database(&self) -> anyhow::Result<Arc<dyn AgentDb>> {
        let db = PostgresDb::connect(&self.config.database)
            .await
            .with_context(|| {
                format!(
                    "database at {} is not reachable",
                    redact_password(&self.config.database.url)
                )
            })?;
        Ok(Arc::new(db))
    }

    /// Like [`Course::database`], but keeps history in process when PostgreSQL is down.
    pub async fn database_or_in_memory(&self) -> Arc<dyn AgentDb> {
        match self.database().await {
            Ok(db) => {
                println!("✅ Database connected successfully!");
                db
            }
            Err(err) => {
                warn!(error = %err, "falling back to in-process history");
                println!("❌ Database connection failed: {err:#}");
                println!("Memory features will be limited without database.");
                Arc::new(InMemoryDb::new())
            }
        }
    }

    pub fn embedder(&self) -> anyhow::Result<Arc<dyn Embedder>> {
        if let Err(err) = self.config.require_embedder_key() {
            eprintln!("❌ Error: HUGGINGFACE_API_KEY (or HF_TOKEN) not found in environment variables.");
            return Err(err.into());
        }
        Ok(Arc::new(HuggingFaceEmbedder::from_config(&self.config.embedder)?))
    }

    /// Open the pool shared by every knowledge table of an exercise.
    pub async fn knowledge_loader(&self) -> anyhow::Result<KnowledgeLoader> {
        let embedder = self.embedder()?;
        let pool = connect_pool(&self.config.database)
            .await
            .context("make sure PostgreSQL with pgvector is running (see the persistent-memory exercise)")?;
        Ok(KnowledgeLoader {
            pool,
            embedder,
            dimensions: self.config.embedder.dimensions,
        })
    }
}

/// Builds pgvector-backed knowledge bases over one pool and embedder.
pub struct KnowledgeLoader {
    pool: PgPool,
    embedder: Arc<dyn Embedder>,
    dimensions: usize,
}

impl KnowledgeLoader {
    /// Knowledge base stored in `table`, without loading anything.
    pub async fn open(&self, name: &str, description: &str, table: &str) -> anyhow::Result<Knowledge> {
        let store = PgVector::from_pool(self.pool.clone(), table, self.dimensions).await?;
        Ok(Knowledge::new(name, self.embedder.clone(), Arc::new(store))
            .with_description(description)
            .with_max_results(5))
    }

    /// Knowledge base in `table` with the file at `path` loaded into it.
    /// Chunks already present are left untouched.
    pub async fn load_file(
        &self,
        name: &str,
        description: &str,
        table: &str,
        path: &Path,
        metadata: Value,
    ) -> anyhow::Result<Arc<Knowledge>> {
        let knowledge = self.open(name, description, table).await?;
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| name.to_string());
        let inserted = knowledge
            .add_content(path, Some(&file_name), metadata)
            .await
            .with_context(|| format!("error loading {}", path.display()))?;
        println!("📄 {file_name}: {inserted} new chunks embedded");
        Ok(Arc::new(knowledge))
    }
}

/// Resolve a course document from the working directory or the workspace root.
pub fn sample_data(file: &str) -> anyhow::Result<PathBuf> {
    let candidates = [
        Path::new(SAMPLE_DATA_DIR).join(file),
        Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("../..")
            .join(SAMPLE_DATA_DIR)
            .join(file),
    ];
    match candidates.into_iter().find(|path| path.is_file()) {
        Some(path) => Ok(path),
        None => {
            let expected = Path::new(SAMPLE_DATA_DIR).join(file);
            println!("❌ Sample document not found: {}", expected.display());
            println!("Make sure to run this from the workspace root");
            bail!("sample document not found: {}", expected.display())
        }
    }
}

/// Exercise title followed by an underline as wide as the title.
pub fn banner(title: &str, lines: &[&str]) {
    println!("{title}");
    println!("{}", "=".repeat(title.chars().count() + 2));
    for line in lines {
        println!("{line}");
    }
    println!();
}

/// `key: value` hints printed under a heading.
pub fn hints(heading: &str, items: &[&str]) {
    println!("{heading}");
    for item in items {
        println!("  {item}");
    }
    println!();
}

/// Print `label: ` and read one trimmed line. `None` on end of input or a blank line.
/// The reader keeps any input after that line, so it can be handed on to a chat loop.
pub async fn prompt_line<R, W>(
    reader: &mut R,
    writer: &mut W,
    label: &str,
) -> anyhow::Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    writer.write_all(format!("{label}: ").as_bytes()).await?;
    writer.flush().await?;
    let mut line = String::new();
    if reader.read_line(&mut line).await? == 0 {
        return Ok(None);
    }
    let line = line.trim();
    Ok((!line.is_empty()).then(|| line.to_string()))
}

fn redact_password(url: &str) -> String {
    match (url.find("://"), url.rfind('@')) {
        (Some(scheme), Some(at)) if at > scheme => {
            let credentials = &url[scheme + 3..at];
            match credentials.split_once(':') {
                Some((user, _)) => format!("{}{user}:***{}", &url[..scheme + 3], &url[at..]),
                None => url.to_string(),
            }
        }
        _ => url.to_string(),
    }
}
