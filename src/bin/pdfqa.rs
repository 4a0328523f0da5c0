//! CLI binary for edgequake-pdfqa.
//!
//! A thin shim over the library crate that maps CLI flags to `QaConfig`,
//! drives indexing with a progress bar and prints answers.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use edgequake_pdfqa::{
    inspect, CancellationToken, PagePrediction, PdfQa, ProgressCallback, QaConfig,
    QaProgressCallback, QaResult, TerminalReason, ToolError,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, IsTerminal, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Section progress bar while indexing, one log line per attempt while
/// answering.
struct CliProgressCallback {
    bar: Mutex<Option<ProgressBar>>,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            bar: Mutex::new(None),
        })
    }

    fn println(&self, line: String) {
        match self.bar.lock().ok().and_then(|b| b.clone()) {
            Some(bar) => bar.println(line),
            None => eprintln!("{line}"),
        }
    }
}

impl QaProgressCallback for CliProgressCallback {
    fn on_indexing_start(&self, total_sections: usize) {
        let bar = ProgressBar::new(total_sections as u64);
        bar.set_style(
            ProgressStyle::with_template(
                "{spinner:.cyan} {prefix:.bold}  \
                 [{bar:42.green/238}] {pos:>3}/{len} sections  \
                 ⏱ {elapsed_precise}  ETA {eta_precise}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▉▊▋▌▍▎▏  ")
            .tick_strings(TICKS),
        );
        bar.set_prefix("Indexing");
        bar.enable_steady_tick(Duration::from_millis(80));
        bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Summarising {total_sections} sections…"))
        ));
        if let Ok(mut slot) = self.bar.lock() {
            *slot = Some(bar);
        }
    }

    fn on_section_start(&self, section_id: usize, _total: usize) {
        if let Some(bar) = self.bar.lock().ok().and_then(|b| b.clone()) {
            bar.set_message(format!("section {section_id}"));
        }
    }

    fn on_section_complete(&self, section_id: usize, total: usize) {
        if let Some(bar) = self.bar.lock().ok().and_then(|b| b.clone()) {
            bar.println(format!(
                "  {} Section {:>3}/{:<3}",
                green("✓"),
                section_id,
                total
            ));
            bar.inc(1);
        }
    }

    fn on_section_error(&self, section_id: usize, total: usize, error: &str) {
        let msg = if error.chars().count() > 80 {
            format!("{}\u{2026}", error.chars().take(79).collect::<String>())
        } else {
            error.to_string()
        };
        self.println(format!(
            "  {} Section {:>3}/{:<3}  {}",
            red("✗"),
            section_id,
            total,
            red(&msg)
        ));
    }

    fn on_indexing_complete(&self, total_sections: usize) {
        if let Ok(mut slot) = self.bar.lock() {
            if let Some(bar) = slot.take() {
                bar.finish_and_clear();
            }
        }
        eprintln!(
            "{} {} sections indexed",
            green("✔"),
            bold(&total_sections.to_string())
        );
    }

    fn on_prediction(&self, attempt: u32, prediction: &PagePrediction) {
        self.println(format!(
            "  {} attempt {}: pages {:?}",
            cyan("→"),
            attempt,
            prediction.pages
        ));
    }

    fn on_attempt_failed(&self, attempt: u32, error: &ToolError) {
        self.println(format!(
            "  {} attempt {}: {}",
            yellow("⚠"),
            attempt,
            error.message
        ));
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Ask one question (indexes the PDF on first use)
  pdfqa ask report.pdf -q "What was the revenue in 2023?"

  # Interactive session
  pdfqa ask report.pdf -i

  # Force a fresh index and export it
  pdfqa index report.pdf --reindex -o report.index.json

  # Ask about a PDF behind a URL, JSON output
  pdfqa ask https://arxiv.org/pdf/1706.03762 -q "What is multi-head attention?" --json

  # Inspect PDF metadata (no API key needed)
  pdfqa inspect report.pdf

  # Show the effective configuration
  pdfqa config

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY          OpenAI API key
  ANTHROPIC_API_KEY       Anthropic API key
  GEMINI_API_KEY          Google Gemini API key
  EDGEQUAKE_LLM_PROVIDER  Override provider (openai, anthropic, gemini, ollama)
  EDGEQUAKE_MODEL         Override model ID
  PDFQA_*                 Every option below (e.g. PDFQA_CHUNK_SIZE, PDFQA_MAX_RETRIES)
  PDFIUM_LIB_PATH         Path to an existing libpdfium (skips auto-download)

SETUP:
  1. Set API key:     export OPENAI_API_KEY=sk-...
  2. Ask:             pdfqa ask document.pdf -q "..."

  PDFium is downloaded automatically on first run and cached.
"#;

/// Ask questions about PDF documents with an LLM that reads only the pages it needs.
#[derive(Parser, Debug)]
#[command(
    name = "pdfqa",
    version,
    about = "Ask questions about PDF documents using section summaries and LLM page routing",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "PDFQA_VERBOSE")]
    verbose: bool,

    /// Suppress all output except answers and errors.
    #[arg(long, global = true, env = "PDFQA_QUIET")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Ask questions about a PDF.
    Ask(AskArgs),
    /// Build (or rebuild) the section index of a PDF.
    Index(IndexArgs),
    /// Print PDF metadata; no LLM call.
    Inspect(InspectArgs),
    /// Print the effective configuration.
    Config(QaArgs),
}

#[derive(Args, Debug)]
struct AskArgs {
    /// Local PDF file path or HTTP/HTTPS URL.
    input: String,

    /// Question to answer. Without it (or with -i) an interactive session starts.
    #[arg(short, long)]
    question: Option<String>,

    /// Interactive mode: read questions until quit/exit/q or EOF.
    #[arg(short, long)]
    interactive: bool,

    /// Rebuild the index even if a fresh one is persisted.
    #[arg(long)]
    reindex: bool,

    /// Print the full result as JSON.
    #[arg(long, env = "PDFQA_JSON")]
    json: bool,

    #[command(flatten)]
    qa: QaArgs,
}

#[derive(Args, Debug)]
struct IndexArgs {
    /// Local PDF file path or HTTP/HTTPS URL.
    input: String,

    /// Also write the index JSON to this file.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Rebuild the index even if a fresh one is persisted.
    #[arg(long)]
    reindex: bool,

    #[command(flatten)]
    qa: QaArgs,
}

#[derive(Args, Debug)]
struct InspectArgs {
    /// Local PDF file path or HTTP/HTTPS URL.
    input: String,

    /// Print metadata as JSON.
    #[arg(long, env = "PDFQA_JSON")]
    json: bool,

    /// PDF user password for encrypted documents.
    #[arg(long, env = "PDFQA_PASSWORD")]
    password: Option<String>,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "PDFQA_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,
}

/// Options shared by every command that builds a `QaConfig`.
#[derive(Args, Debug)]
struct QaArgs {
    /// LLM model ID (e.g. gpt-4.1-nano, gpt-4.1, claude-sonnet-4-20250514).
    #[arg(long, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// LLM provider: openai, anthropic, gemini, ollama, azure.
    #[arg(long, env = "EDGEQUAKE_PROVIDER")]
    provider: Option<String>,

    /// Pages per indexed section.
    #[arg(long, env = "PDFQA_CHUNK_SIZE", default_value_t = 10)]
    chunk_size: usize,

    /// Fetch attempts per question, the first one included.
    #[arg(long, env = "PDFQA_MAX_RETRIES", default_value_t = 3,
          value_parser = clap::value_parser!(u32).range(1..))]
    max_retries: u32,

    /// Pages kept from one prediction.
    #[arg(long, env = "PDFQA_MAX_PAGES", default_value_t = 20)]
    max_pages: usize,

    /// Section summaries shown to the router (0 = all).
    #[arg(long, env = "PDFQA_ROUTER_MAX_SECTIONS", default_value_t = 0)]
    router_max_sections: usize,

    /// Sections summarised concurrently while indexing.
    #[arg(short, long, env = "PDFQA_CONCURRENCY", default_value_t = 1)]
    concurrency: usize,

    /// Pause before each section summary call, in milliseconds.
    #[arg(long, env = "PDFQA_API_DELAY_MS", default_value_t = 0)]
    api_delay_ms: u64,

    /// Timeout for one LLM call or page fetch, in seconds.
    #[arg(long, env = "PDFQA_API_TIMEOUT", default_value_t = 60)]
    api_timeout: u64,

    /// Transport-level retries per LLM call.
    #[arg(long, env = "PDFQA_BACKEND_RETRIES", default_value_t = 3)]
    backend_retries: u32,

    /// Rendering DPI for page images (72–400).
    #[arg(long, env = "PDFQA_DPI", default_value_t = 150,
          value_parser = clap::value_parser!(u32).range(72..=400))]
    dpi: u32,

    /// Do not send page images to the answer call.
    #[arg(long, env = "PDFQA_NO_VISION")]
    no_vision: bool,

    /// Page images sent to the answer call.
    #[arg(long, env = "PDFQA_MAX_ANSWER_IMAGES", default_value_t = 1)]
    max_answer_images: usize,

    /// PDF user password for encrypted documents.
    #[arg(long, env = "PDFQA_PASSWORD")]
    password: Option<String>,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "PDFQA_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// Directory for persisted indexes.
    #[arg(long, env = "PDFQA_INDEX_DIR", default_value = ".pdfqa/indices")]
    index_dir: PathBuf,

    /// Disable progress output.
    #[arg(long, env = "PDFQA_NO_PROGRESS")]
    no_progress: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress display replaces INFO-level library logs.
    let show_progress = !cli.quiet
        && match &cli.command {
            Command::Ask(a) => !a.qa.no_progress && !a.json,
            Command::Index(i) => !i.qa.no_progress,
            Command::Inspect(_) | Command::Config(_) => false,
        };
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
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

    match cli.command {
        Command::Inspect(args) => run_inspect(args).await,
        Command::Config(args) => run_config(args),
        Command::Index(args) => {
            ensure_pdfium(cli.quiet)?;
            run_index(args, show_progress).await
        }
        Command::Ask(args) => {
            ensure_pdfium(cli.quiet)?;
            run_ask(args, show_progress, cli.quiet).await
        }
    }
}

/// Download the pdfium library on first run, with a byte progress bar.
fn ensure_pdfium(quiet: bool) -> Result<()> {
    if pdfium_auto::is_pdfium_cached() {
        return Ok(());
    }
    if quiet {
        tokio::task::block_in_place(|| pdfium_auto::ensure_pdfium_library(None))
            .context("Failed to download PDFium engine")?;
        return Ok(());
    }

    let dl_bar = ProgressBar::new(0);
    dl_bar.set_style(
        ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {bytes}/{total_bytes}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS),
    );
    dl_bar.set_prefix("PDF engine");
    dl_bar.enable_steady_tick(Duration::from_millis(80));

    let bar = dl_bar.clone();
    tokio::task::block_in_place(|| {
        pdfium_auto::ensure_pdfium_library(Some(&|downloaded, total| {
            if let Some(t) = total {
                if bar.length().unwrap_or(0) != t {
                    bar.set_length(t);
                }
            }
            bar.set_position(downloaded);
        }))
    })
    .context("Failed to download PDFium engine")?;

    dl_bar.finish_with_message("ready ✓");
    Ok(())
}

/// Map CLI args to `QaConfig`.
fn build_config(args: &QaArgs, progress: Option<ProgressCallback>) -> Result<QaConfig> {
    let mut builder = QaConfig::builder()
        .chunk_size(args.chunk_size)
        .max_retries(args.max_retries)
        .max_pages_per_prediction(args.max_pages)
        .router_max_sections(args.router_max_sections)
        .indexing_concurrency(args.concurrency)
        .api_delay_ms(args.api_delay_ms)
        .call_timeout_ms(args.api_timeout.saturating_mul(1000))
        .backend_retries(args.backend_retries)
        .dpi(args.dpi)
        .use_vision(!args.no_vision)
        .max_answer_images(args.max_answer_images)
        .download_timeout_secs(args.download_timeout)
        .index_dir(args.index_dir.clone());

    if let Some(ref model) = args.model {
        builder = builder.model(model.clone());
    }
    if let Some(ref provider) = args.provider {
        builder = builder.provider_name(provider.clone());
    }
    if let Some(ref password) = args.password {
        builder = builder.password(password.clone());
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

fn progress_for(show_progress: bool) -> Option<ProgressCallback> {
    show_progress.then(|| CliProgressCallback::new() as Arc<dyn QaProgressCallback>)
}

async fn run_inspect(args: InspectArgs) -> Result<()> {
    let mut builder = QaConfig::builder().download_timeout_secs(args.download_timeout);
    if let Some(ref password) = args.password {
        builder = builder.password(password.clone());
    }
    let config = builder.build().context("Invalid configuration")?;
    let meta = inspect(&args.input, &config)
        .await
        .context("Failed to inspect PDF")?;

    if args.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&meta).context("Failed to serialize metadata")?
        );
        return Ok(());
    }

    println!("File:         {}", args.input);
    if let Some(ref t) = meta.title {
        println!("Title:        {}", t);
    }
    if let Some(ref a) = meta.author {
        println!("Author:       {}", a);
    }
    if let Some(ref s) = meta.subject {
        println!("Subject:      {}", s);
    }
    println!("Pages:        {}", meta.page_count);
    println!("PDF Version:  {}", meta.pdf_version);
    if let Some(ref p) = meta.producer {
        println!("Producer:     {}", p);
    }
    if let Some(ref c) = meta.creator {
        println!("Creator:      {}", c);
    }
    Ok(())
}

fn run_config(args: QaArgs) -> Result<()> {
    let config = build_config(&args, None)?;
    println!("{}", bold("Effective configuration"));
    println!("  chunk_size:               {}", config.chunk_size);
    println!("  max_retries:              {}", config.max_retries);
    println!("  max_pages_per_prediction: {}", config.max_pages_per_prediction);
    println!("  router_max_sections:      {}", config.router_max_sections);
    println!("  indexing_concurrency:     {}", config.indexing_concurrency);
    println!("  api_delay_ms:             {}", config.api_delay_ms);
    println!("  call_timeout_ms:          {}", config.call_timeout_ms);
    println!("  backend_retries:          {}", config.backend_retries);
    println!("  dpi:                      {}", config.dpi);
    println!("  use_vision:               {}", config.use_vision);
    println!("  max_answer_images:        {}", config.max_answer_images);
    println!("  index_dir:                {}", config.index_dir.display());
    println!(
        "  provider:                 {}",
        config.provider_name.as_deref().unwrap_or("(auto-detect)")
    );
    println!(
        "  model:                    {}",
        config.model.as_deref().unwrap_or("(provider default)")
    );
    match edgequake_pdfqa::pipeline::llm::resolve_provider(&config) {
        Ok(_) => println!("  resolved provider:        {}", green("ok")),
        Err(e) => println!("  resolved provider:        {}", red(&e.to_string())),
    }
    Ok(())
}

async fn run_index(args: IndexArgs, show_progress: bool) -> Result<()> {
    let config = build_config(&args.qa, progress_for(show_progress))?;
    let session = PdfQa::open(&args.input, &config, args.reindex)
        .await
        .context("Indexing failed")?;

    let meta = session.metadata();
    eprintln!(
        "{} {} pages, {} sections of {} pages",
        green("✔"),
        meta.total_pages,
        meta.total_sections,
        meta.chunk_size
    );
    for s in session.index().summaries() {
        println!(
            "{} {}",
            bold(&format!(
                "Section {} (pages {}-{}):",
                s.section_id, s.page_range.0, s.page_range.1
            )),
            s.summary
        );
        if !s.keywords.is_empty() {
            println!("  {}", dim(&s.keywords.join(", ")));
        }
    }

    if let Some(ref out) = args.output {
        session
            .export_index(out)
            .await
            .with_context(|| format!("Failed to write index to {}", out.display()))?;
        eprintln!("   index written to {}", bold(&out.display().to_string()));
    }
    Ok(())
}

async fn run_ask(args: AskArgs, show_progress: bool, quiet: bool) -> Result<()> {
    let config = build_config(&args.qa, progress_for(show_progress))?;
    let session = PdfQa::open(&args.input, &config, args.reindex)
        .await
        .context("Failed to open document")?;

    let interactive = args.interactive || args.question.is_none();
    if let Some(ref q) = args.question {
        ask_one(&session, q, args.json).await?;
    }
    if !interactive {
        return Ok(());
    }

    let meta = session.metadata();
    if !quiet {
        eprintln!(
            "{} {} pages, {} sections. Type a question, or quit/exit/q to leave.",
            cyan("◆"),
            meta.total_pages,
            meta.total_sections
        );
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        if io::stdin().is_terminal() {
            eprint!("{} ", bold("?"));
            io::stderr().flush().ok();
        }
        let Some(line) = lines.next_line().await.context("Failed to read stdin")? else {
            break;
        };
        let question = line.trim();
        if question.is_empty() {
            continue;
        }
        if matches!(question.to_lowercase().as_str(), "quit" | "exit" | "q") {
            break;
        }
        if let Err(e) = ask_one(&session, question, args.json).await {
            eprintln!("{} {:#}", red("✘"), e);
        }
    }
    Ok(())
}

/// Ask one question; Ctrl-C cancels it.
async fn ask_one(session: &PdfQa, question: &str, json: bool) -> Result<()> {
    let cancel = CancellationToken::new();
    let watcher = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        })
    };
    let result = session.ask_with_cancel(question, &cancel).await;
    watcher.abort();

    let result = result.context("Question failed")?;
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&result).context("Failed to serialise result")?
        );
    } else {
        print_result(&result);
    }
    Ok(())
}

fn print_result(result: &QaResult) {
    match (&result.answer, result.terminal_reason) {
        (Some(answer), _) => {
            println!("{answer}");
            let sources = result
                .citations
                .iter()
                .map(|p| p.to_string())
                .collect::<Vec<_>>()
                .join(", ");
            println!("{}", dim(&format!("Sources: pages {sources}")));
        }
        (None, TerminalReason::EmptyContent) => {
            println!(
                "{} The fetched pages ({:?}) do not contain the answer.",
                yellow("⚠"),
                result.fetched_pages
            );
        }
        (None, _) => {
            println!(
                "{} No valid pages found after {} attempts.",
                red("✘"),
                result.attempts
            );
            if let Some(err) = result.history.last().and_then(|h| h.error.as_ref()) {
                println!("{}", dim(&format!("Last error: {}", err.message)));
            }
        }
    }
    eprintln!(
        "{}",
        dim(&format!(
            "{:?} after {} attempt(s)",
            result.terminal_reason, result.attempts
        ))
    );
}
