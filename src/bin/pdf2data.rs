//! CLI binary for edgequake-pdf2data.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `PipelineConfig` / `ServerConfig` and either serves the HTTP API or
//! processes a single file and prints the JSON result.

use anyhow::{Context, Result};
use clap::Parser;
use edgequake_pdf2data::server::routes::ProcessResponse;
use edgequake_pdf2data::{
    serve, Document, OcrStatus, PageSeparator, Pipeline, PipelineConfig, ServerConfig,
    DEFAULT_MODEL, DEFAULT_OCR_ENDPOINT,
};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Serve the HTTP API on 0.0.0.0:8000
  pdf2data

  # Serve on another port, OCR service on another host
  pdf2data --bind 127.0.0.1:9000 --ocr-url http://10.0.0.5:1234/v1/chat/completions

  # Process one file and print the JSON result
  pdf2data invoice.pdf > invoice.json

  # Extract text only (no OCR service needed)
  pdf2data --extract-only invoice.pdf

ENDPOINTS:
  GET  /              API info
  GET  /health        Liveness and OCR service status
  POST /upload-pdf    multipart 'file' → extracted text
  POST /process-pdf   multipart 'file' → entities and tables
  POST /process-text  JSON {"text": "..."} → entities and tables

SETUP:
  1. Start LM Studio and load olmocr-7b-0225-preview (server on port 1234)
  2. Run:  pdf2data
"#;

/// Extract names, dates, addresses and tables from PDFs with a local OCR model.
#[derive(Parser, Debug)]
#[command(
    name = "pdf2data",
    version,
    about = "Extract entities and tables from PDFs using a local OCR model",
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Process this PDF once and print JSON instead of serving.
    input: Option<PathBuf>,

    /// With an input file: print extracted text only, no OCR.
    #[arg(long, requires = "input")]
    extract_only: bool,

    /// Socket address for the HTTP server.
    #[arg(long, env = "PDF2DATA_BIND", default_value = "0.0.0.0:8000")]
    bind: String,

    /// Allowed CORS origins (comma-separated).
    #[arg(
        long,
        env = "PDF2DATA_CORS_ORIGINS",
        value_delimiter = ',',
        default_value = "http://localhost:3000,http://127.0.0.1:3000"
    )]
    cors_origins: Vec<String>,

    /// Maximum upload size in megabytes.
    #[arg(long, env = "PDF2DATA_MAX_UPLOAD_MB", default_value_t = 50)]
    max_upload_mb: usize,

    /// Chat-completions URL of the OCR service.
    #[arg(long, env = "OLMOCR_API_URL", default_value = DEFAULT_OCR_ENDPOINT)]
    ocr_url: String,

    /// URL probed for liveness (default: derived from --ocr-url).
    #[arg(long, env = "PDF2DATA_MODELS_URL")]
    models_url: Option<String>,

    /// Model identifier sent with every request.
    #[arg(long, env = "PDF2DATA_MODEL", default_value = DEFAULT_MODEL)]
    model: String,

    /// Sampling temperature (0.0–2.0).
    #[arg(long, env = "PDF2DATA_TEMPERATURE", default_value_t = 0.3)]
    temperature: f32,

    /// Max tokens generated per chunk.
    #[arg(long, env = "PDF2DATA_MAX_TOKENS", default_value_t = 2048)]
    max_tokens: usize,

    /// Max characters per chunk sent to the model.
    #[arg(long, env = "PDF2DATA_MAX_CHUNK_LENGTH", default_value_t = 4000)]
    max_chunk_length: usize,

    /// Concurrent OCR calls per request.
    #[arg(short, long, env = "PDF2DATA_CONCURRENCY", default_value_t = 3)]
    concurrency: usize,

    /// Automatic retries for transient OCR failures.
    #[arg(long, env = "PDF2DATA_MAX_RETRIES", default_value_t = 1)]
    max_retries: u32,

    /// Per-call OCR timeout in seconds.
    #[arg(long, env = "PDF2DATA_API_TIMEOUT", default_value_t = 30)]
    api_timeout: u64,

    /// Seconds between health probes.
    #[arg(long, env = "PDF2DATA_HEALTH_INTERVAL", default_value_t = 15)]
    health_interval: u64,

    /// Page separator: formfeed, none, hr, page, or a custom string.
    #[arg(long, env = "PDF2DATA_SEPARATOR", default_value = "formfeed")]
    separator: String,

    /// Path to a text file containing a custom system prompt.
    #[arg(long, env = "PDF2DATA_SYSTEM_PROMPT")]
    system_prompt: Option<PathBuf>,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "PDF2DATA_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "PDF2DATA_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Build pipeline ───────────────────────────────────────────────────
    let config = build_config(&cli).await?;
    let pipeline = Arc::new(Pipeline::new(config).context("Failed to create OCR client")?);

    // ── One-shot mode ────────────────────────────────────────────────────
    if let Some(ref path) = cli.input {
        return process_file(&cli, &pipeline, path).await;
    }

    // ── Server mode ──────────────────────────────────────────────────────
    let server_config = ServerConfig {
        bind: cli.bind.clone(),
        cors_origins: cli.cors_origins.clone(),
        max_upload_bytes: cli.max_upload_mb * 1024 * 1024,
    };

    let _monitor = pipeline.start_health_monitor();
    serve(pipeline, server_config)
        .await
        .with_context(|| format!("Server on {} failed", cli.bind))?;

    Ok(())
}

/// Process one file and print the result as JSON on stdout.
async fn process_file(cli: &Cli, pipeline: &Pipeline, path: &Path) -> Result<()> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read {:?}", path))?;
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let document = Document::new(file_name, bytes);

    if cli.extract_only {
        let extracted = pipeline
            .extract(&document)
            .await
            .context("Extraction failed")?;
        println!("{}", extracted.text);
        if !cli.quiet {
            eprintln!(
                "{} {} pages, {} chars",
                green("✔"),
                extracted.page_count,
                extracted.text.chars().count()
            );
        }
        return Ok(());
    }

    if pipeline.health().refresh(pipeline.backend().as_ref()).await == OcrStatus::Offline {
        eprintln!(
            "{} OCR service not reachable at {}",
            red("✘"),
            pipeline.config().ocr_endpoint
        );
    }

    let result = pipeline.process_document(&document).await;
    let response = ProcessResponse::new(Some(document.file_name()), &result);
    println!(
        "{}",
        serde_json::to_string_pretty(&response).context("Failed to serialise result")?
    );

    if !cli.quiet {
        if result.success() {
            eprintln!(
                "{} {} entities, {} tables  {}",
                green("✔"),
                result.entities().len(),
                result.tables().len(),
                dim(&format!(
                    "({} chunks, {} degraded)",
                    result.exchanges().len(),
                    result.degraded_chunks()
                )),
            );
        } else {
            eprintln!(
                "{} {}",
                red("✘"),
                result.error_message().unwrap_or_default()
            );
        }
    }

    if result.success() {
        Ok(())
    } else {
        anyhow::bail!("Processing {:?} failed", path)
    }
}

/// Map CLI args to `PipelineConfig`.
async fn build_config(cli: &Cli) -> Result<PipelineConfig> {
    let mut builder = PipelineConfig::builder()
        .ocr_endpoint(&cli.ocr_url)
        .model(&cli.model)
        .temperature(cli.temperature)
        .max_tokens(cli.max_tokens)
        .max_chunk_length(cli.max_chunk_length)
        .concurrency(cli.concurrency)
        .max_retries(cli.max_retries)
        .api_timeout_secs(cli.api_timeout)
        .health_interval_secs(cli.health_interval)
        .page_separator(parse_separator(&cli.separator));

    if let Some(ref url) = cli.models_url {
        builder = builder.models_endpoint(url);
    }

    if let Some(ref path) = cli.system_prompt {
        let prompt = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read system prompt from {:?}", path))?;
        builder = builder.system_prompt(prompt);
    }

    builder.build().context("Invalid configuration")
}

/// Parse `--separator` string into `PageSeparator`.
fn parse_separator(s: &str) -> PageSeparator {
    match s.to_lowercase().as_str() {
        "formfeed" | "ff" => PageSeparator::FormFeed,
        "none" => PageSeparator::None,
        "hr" | "---" => PageSeparator::HorizontalRule,
        "page" => PageSeparator::PageMarker,
        _ => PageSeparator::Custom(s.to_string()),
    }
}
