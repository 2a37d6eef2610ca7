//! CLI binary for deepread.
//!
//! A thin shim over the library crate that maps CLI flags and environment
//! variables to `DeepReadConfig`, runs the selected pipeline and prints the
//! resulting artifact path.

use anyhow::{Context, Result};
use clap::Parser;
use deepread::{
    process, DeepReadConfig, ExtractProgress, JobState, Mode, PipelineProgressCallback,
    PipelineRun, ProgressCallback, SummaryOptions,
};
use indicatif::{HumanBytes, ProgressBar, ProgressStyle};
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
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
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Spinner anchored at the bottom of the terminal plus one log line per step.
struct CliProgressCallback {
    bar: ProgressBar,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new_spinner();
        let template = "{spinner:.cyan} {prefix:.bold}  {msg}  ⏱ {elapsed}";
        let style = ProgressStyle::with_template(template)
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);
        bar.set_style(style);
        bar.set_prefix("Starting");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self { bar })
    }
}

impl PipelineProgressCallback for CliProgressCallback {
    fn on_pipeline_start(&self, name: &str, total_steps: usize) {
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Running '{name}' pipeline ({total_steps} steps)…"))
        ));
    }

    fn on_step_start(&self, index: usize, total_steps: usize, name: &str) {
        self.bar.set_prefix(format!("[{index}/{total_steps}]"));
        self.bar.set_message(name.to_string());
    }

    fn on_step_complete(&self, index: usize, total_steps: usize, name: &str, elapsed: Duration) {
        self.bar.println(format!(
            "  {} [{}/{}] {:<18} {}",
            green("✓"),
            index,
            total_steps,
            name,
            dim(&format!("{:.1}s", elapsed.as_secs_f64())),
        ));
    }

    fn on_step_error(&self, index: usize, total_steps: usize, name: &str, error: &str) {
        // Keep the line short; the full error is printed on exit.
        let msg = match error.lines().next() {
            Some(first) if first.chars().count() > 80 => {
                format!("{}\u{2026}", first.chars().take(79).collect::<String>())
            }
            Some(first) => first.to_string(),
            None => String::new(),
        };
        self.bar.println(format!(
            "  {} [{}/{}] {:<18} {}",
            red("✗"),
            index,
            total_steps,
            name,
            red(&msg),
        ));
        self.bar.finish_and_clear();
    }

    fn on_pipeline_complete(&self, _name: &str, elapsed: Duration) {
        self.bar.finish_and_clear();
        eprintln!(
            "{} done in {}",
            green("✔"),
            bold(&format!("{:.1}s", elapsed.as_secs_f64()))
        );
    }

    fn on_job_update(&self, task_id: &str, state: &JobState, progress: Option<&ExtractProgress>) {
        let pages = match (state, progress) {
            (JobState::Running, Some(p)) if p.total_pages > 0 => {
                format!("  {}/{} pages", p.extracted_pages, p.total_pages)
            }
            _ => String::new(),
        };
        self.bar.set_message(format!("task {} {}{}", dim(task_id), state, pages));
    }

    fn on_download_progress(&self, downloaded: u64, total: Option<u64>) {
        let msg = match total {
            Some(t) => format!("downloading result {}/{}", HumanBytes(downloaded), HumanBytes(t)),
            None => format!("downloading result {}", HumanBytes(downloaded)),
        };
        self.bar.set_message(msg);
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Upload, extract and summarise a PDF
  deepread -i paper.pdf

  # Only extract the PDF to Markdown
  deepread -i paper.pdf --step parse

  # Summarise an existing Markdown file with a custom prompt
  deepread -i output/20240501120000_paper/full.md --prompt "Three bullet points"

  # Show the effective configuration (secrets masked)
  deepread --config

ENVIRONMENT VARIABLES:
  MINERU_API_KEY          Extraction service API key (required)
  MINERU_API_URL          Extraction task endpoint
  GITEE_ACCESS_TOKEN      Content store access token (required)
  GITEE_OWNER             Content store repository owner (required)
  GITEE_REPO              Content store repository name (required)
  GITEE_BRANCH            Target branch (default: master)
  GITEE_UPLOAD_PATH       Upload root inside the repository (default: pdfs)
  REQUEST_TIMEOUT         Request and polling timeout in seconds (default: 300)
  MAX_RETRIES             Attempts per outbound call (default: 3)
  DEEPREAD_OUTPUT_DIR     Local output root (default: output)
  DEEPREAD_PROVIDER       LLM provider (openai, anthropic, gemini, ollama)
  DEEPREAD_MODEL          LLM model ID
  ANTHROPIC_API_KEY       Anthropic API key
  OPENAI_API_KEY          OpenAI API key

  Variables may also be placed in a .env file in the working directory.
"#;

/// Summarise PDF documents with an LLM.
#[derive(Parser, Debug)]
#[command(
    name = "deepread",
    version,
    about = "Summarise PDF documents with an LLM",
    long_about = "Upload a PDF to a content store, extract it to Markdown with a remote \
extraction service, and summarise the Markdown with an LLM. Markdown files can be \
summarised directly.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Input file: a .pdf or a .md.
    #[arg(short, long, required_unless_present = "config")]
    input: Option<PathBuf>,

    /// Summary style.
    #[arg(short, long, default_value = "detailed")]
    style: String,

    /// Custom summary prompt; overrides --style.
    #[arg(short, long)]
    prompt: Option<String>,

    /// Run only one stage instead of the full pipeline.
    #[arg(long, value_enum)]
    step: Option<StepArg>,

    /// Write the summary here instead of next to the Markdown.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Print the effective configuration and exit.
    #[arg(long)]
    config: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "DEEPREAD_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "DEEPREAD_QUIET")]
    quiet: bool,

    /// Disable the progress spinner.
    #[arg(long, env = "DEEPREAD_NO_PROGRESS")]
    no_progress: bool,

    // ── Settings (usually from the environment) ──────────────────────────
    #[arg(long, env = "MINERU_API_KEY", hide_env_values = true)]
    mineru_api_key: Option<String>,

    #[arg(long, env = "MINERU_API_URL", default_value = "https://mineru.net/api/v4/extract/task")]
    mineru_api_url: String,

    #[arg(long, env = "GITEE_ACCESS_TOKEN", hide_env_values = true)]
    gitee_access_token: Option<String>,

    #[arg(long, env = "GITEE_OWNER", default_value = "")]
    gitee_owner: String,

    #[arg(long, env = "GITEE_REPO", default_value = "")]
    gitee_repo: String,

    #[arg(long, env = "GITEE_BRANCH", default_value = "master")]
    gitee_branch: String,

    #[arg(long, env = "GITEE_UPLOAD_PATH", default_value = "pdfs")]
    gitee_upload_path: String,

    /// Request and polling timeout in seconds.
    #[arg(long, env = "REQUEST_TIMEOUT", default_value_t = 300)]
    request_timeout: u64,

    #[arg(long, env = "MAX_RETRIES", default_value_t = 3,
          value_parser = clap::value_parser!(u32).range(1..))]
    max_retries: u32,

    #[arg(long, env = "DEEPREAD_OUTPUT_DIR", default_value = "output")]
    output_dir: PathBuf,

    #[arg(long, env = "DEEPREAD_PROMPTS_DIR", default_value = "prompts")]
    prompts_dir: PathBuf,

    /// LLM provider: openai, anthropic, gemini, ollama, azure.
    #[arg(long, env = "DEEPREAD_PROVIDER")]
    provider: Option<String>,

    /// LLM model ID.
    #[arg(long, env = "DEEPREAD_MODEL")]
    model: Option<String>,

    /// Max tokens the LLM may generate for a summary.
    #[arg(long, env = "DEEPREAD_MAX_TOKENS", default_value_t = 30000)]
    max_tokens: usize,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum StepArg {
    /// Upload and extract only.
    Parse,
    /// Summarise a Markdown file only.
    Summarize,
}

fn mode_for(step: Option<StepArg>) -> Mode {
    match step {
        None => Mode::Full,
        Some(StepArg::Parse) => Mode::Parse,
        Some(StepArg::Summarize) => Mode::Summarize,
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env before parsing so env-backed flags see its values.
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // Suppress INFO-level library logs when the spinner is active.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.config;
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

    tokio::select! {
        result = run(cli, show_progress) => match result {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                eprintln!("{} {:#}", red("✘"), e);
                ExitCode::from(1)
            }
        },
        _ = tokio::signal::ctrl_c() => {
            eprintln!("\n{} Interrupted", red("✘"));
            ExitCode::from(130)
        }
    }
}

async fn run(cli: Cli, show_progress: bool) -> Result<()> {
    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn PipelineProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, progress_cb)?;

    if cli.config {
        print_config(&config);
        return Ok(());
    }

    config
        .validate_credentials()
        .context("Missing credentials")?;

    let input = cli
        .input
        .clone()
        .context("--input is required")?;
    let mode = mode_for(cli.step);
    let options = SummaryOptions {
        style: Some(cli.style.clone()),
        custom_prompt: cli.prompt.clone(),
        output_path: cli.output.clone(),
    };

    let run = process(&input, mode, &options, &config)
        .await
        .with_context(|| format!("Processing {} failed", input.display()))?;

    report(&run, mode, cli.quiet);
    Ok(())
}

/// Map CLI args to `DeepReadConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<DeepReadConfig> {
    let mut builder = DeepReadConfig::builder()
        .extraction_api_url(&cli.mineru_api_url)
        .store_owner(&cli.gitee_owner)
        .store_repo(&cli.gitee_repo)
        .store_branch(&cli.gitee_branch)
        .upload_root(&cli.gitee_upload_path)
        .request_timeout_secs(cli.request_timeout)
        .job_timeout_secs(cli.request_timeout)
        .max_retries(cli.max_retries)
        .output_dir(&cli.output_dir)
        .prompts_dir(&cli.prompts_dir)
        .max_tokens(cli.max_tokens);

    if let Some(key) = &cli.mineru_api_key {
        builder = builder.extraction_api_key(key);
    }
    if let Some(token) = &cli.gitee_access_token {
        builder = builder.store_token(token);
    }
    if let Some(provider) = &cli.provider {
        builder = builder.provider_name(provider);
    }
    if let Some(model) = &cli.model {
        builder = builder.model(model);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

fn print_config(config: &DeepReadConfig) {
    println!("{}", bold("deepread configuration"));
    for (key, value) in config.redacted_summary() {
        println!("  {:<20} {}", key, value);
    }
}

/// Print the artifact the user asked for on stdout, stats on stderr.
fn report(run: &PipelineRun, mode: Mode, quiet: bool) {
    let ctx = &run.context;
    let artifact = match mode {
        Mode::Parse => ctx.get_str("markdown_path"),
        _ => ctx.get_str("output_path"),
    };

    match artifact {
        Some(path) => println!("{path}"),
        None => {
            // Extraction finished without an archive.
            if let Some(task) = ctx.get_str("task_id") {
                eprintln!("{} task {} produced no result archive", cyan("⚠"), task);
            }
        }
    }

    if quiet {
        return;
    }
    let tokens = (ctx.get_u64("input_tokens"), ctx.get_u64("output_tokens"));
    if let (Some(input), Some(output)) = tokens {
        eprintln!(
            "   {} tokens in  /  {} tokens out  —  {} chars",
            dim(&input.to_string()),
            dim(&output.to_string()),
            ctx.get_u64("summary_length").unwrap_or(0),
        );
    }
    for step in &run.steps {
        eprintln!(
            "   {} {}",
            dim(&format!("{:>6.1}s", step.elapsed.as_secs_f64())),
            step.name
        );
    }
}
