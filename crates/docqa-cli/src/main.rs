//! docqa CLI
//!
//! Command-line interface for the docqa pipeline.
//!
//! ## Usage
//!
//! ```bash
//! # Answer a question about a text file (placeholder providers without a key)
//! docqa ask --path notes.txt --question "What is the deadline?"
//!
//! # Use Gemini
//! GEMINI_API_KEY=... docqa ask --path notes.txt --question "..." --format json
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use docqa::{
    pipeline::{Pipeline, PipelineBuilder},
    rag::Answer,
    PipelineConfig,
};
use std::fs;
use std::path::Path;

const DEMO_DOCUMENT: &str = "The sky is blue because air scatters short wavelengths of \
sunlight more than long ones. Grass is green because chlorophyll absorbs red and blue \
light and reflects green. Snow is white because ice crystals scatter all visible \
wavelengths equally. Rust is a systems programming language that guarantees memory \
safety without a garbage collector.";

/// Output format for answers
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
enum OutputFormat {
    /// Human readable
    #[default]
    Text,
    /// Pretty-printed JSON
    Json,
}

#[derive(Parser)]
#[command(name = "docqa")]
#[command(version)]
#[command(about = "Ask questions about text documents", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Answer a question about a built-in sample document
    Demo {
        /// Question to ask
        #[arg(short, long, default_value = "What color is the sky?")]
        question: String,
    },

    /// Ingest a text file and answer a question about it
    Ask {
        /// Path to a UTF-8 text file
        #[arg(short, long)]
        path: String,

        /// Question to ask
        #[arg(short, long)]
        question: String,

        /// Number of chunks used as context
        #[arg(short, long)]
        top_k: Option<usize>,

        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Show pipeline info
    Info,
}

#[tokio::main]
async fn main() -> Result<()> {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "docqa=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Demo { question } => run_demo(&question).await?,
        Commands::Ask {
            path,
            question,
            top_k,
            format,
        } => run_ask(&path, &question, top_k, format).await?,
        Commands::Info => run_info()?,
    }

    Ok(())
}

fn load_config(top_k: Option<usize>) -> Result<PipelineConfig> {
    let mut config = PipelineConfig::from_env().context("Invalid environment configuration")?;
    if let Some(top_k) = top_k {
        config.retrieval.top_k = top_k;
    }
    Ok(config)
}

/// One-shot pipeline: everything is processed before the question is asked
fn build_pipeline(config: PipelineConfig) -> Result<Pipeline> {
    PipelineBuilder::from_config(config)
        .context("Failed to configure providers")?
        .without_queue()
        .build()
        .context("Failed to build pipeline")
}

fn run_info() -> Result<()> {
    let config = load_config(None)?;

    println!("docqa Pipeline");
    println!("==============");
    println!("Version: {}", env!("CARGO_PKG_VERSION"));
    println!();
    println!("Components:");
    println!(
        "  - Chunker: fixed-size, {} characters",
        config.chunking.chunk_size
    );
    println!("  - Ranker: cosine similarity, top {}", config.retrieval.top_k);
    println!(
        "  - Cache: in-memory, TTL {}s, {} entries",
        config.cache.ttl_secs, config.cache.capacity
    );
    println!(
        "  - Queue: {} workers, {} attempts",
        config.queue.workers, config.queue.retry.max_attempts
    );
    if config.provider.is_configured() {
        println!(
            "  - Providers: Gemini ({} / {})",
            config.provider.embedding_model, config.provider.generation_model
        );
    } else {
        println!("  - Providers: placeholder (set GEMINI_API_KEY for Gemini)");
    }
    Ok(())
}

async fn run_demo(question: &str) -> Result<()> {
    println!("=== docqa Demo ===\n");

    let pipeline = build_pipeline(load_config(None)?)?;
    let ingestion = pipeline
        .ingest("demo.txt", DEMO_DOCUMENT)
        .await
        .context("Failed to process demo document")?;
    let status = pipeline.status(ingestion.document_id).await?;
    println!(
        "Indexed {} ({} chunks)\n",
        status.filename, status.chunk_count
    );

    let answer = pipeline
        .ask(ingestion.document_id, question)
        .await
        .context("Failed to answer question")?;
    print_text(question, &answer);
    Ok(())
}

async fn run_ask(
    path: &str,
    question: &str,
    top_k: Option<usize>,
    format: OutputFormat,
) -> Result<()> {
    let path = Path::new(path);
    if !path.is_file() {
        anyhow::bail!("Path not found: {}", path.display());
    }

    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read file: {}", path.display()))?;
    tracing::debug!(path = %path.display(), bytes = text.len(), "read input file");
    let filename = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("document.txt");

    let pipeline = build_pipeline(load_config(top_k)?)?;
    let ingestion = pipeline
        .ingest(filename, &text)
        .await
        .with_context(|| format!("Failed to process {}", path.display()))?;
    let answer = pipeline
        .ask(ingestion.document_id, question)
        .await
        .context("Failed to answer question")?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&answer)?),
        OutputFormat::Text => print_text(question, &answer),
    }
    Ok(())
}

fn print_text(question: &str, answer: &Answer) {
    println!("Question: \"{question}\"\n");
    println!("Answer:");
    println!("{}\n", answer.result.answer);
    println!("Relevant chunks ({}):", answer.result.relevant_chunks.len());
    println!("{}", "-".repeat(50));
    for (i, chunk) in answer.result.relevant_chunks.iter().enumerate() {
        println!("{}. [Score: {:.3}] {}", i + 1, chunk.score, chunk.text);
    }
}
