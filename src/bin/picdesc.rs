//! CLI binary for edgequake-picdesc.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `PictureDescriptionOptions`, describes the pictures of a document JSON
//! file and writes the annotated document back out.

use anyhow::{Context, Result};
use clap::Parser;
use edgequake_picdesc::{
    ApiOptions, BackendOptions, DescriptionProgressCallback, DescriptionStats, Document,
    PictureDescriber, PictureDescriptionOptions, ProgressCallback, ProviderOptions,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
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

// ── CLI progress callback using indicatif ────────────────────────────────────

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

/// Terminal progress callback: one bar over all candidate pictures plus a
/// log line per described picture.
struct CliProgressCallback {
    bar: ProgressBar,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);
        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Loading pictures…");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self { bar })
    }
}

impl DescriptionProgressCallback for CliProgressCallback {
    fn on_start(&self, total_candidates: usize) {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} pictures  ⏱ {elapsed_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.set_length(total_candidates as u64);
        self.bar.set_style(style);
        self.bar.set_prefix("Describing");
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Describing up to {total_candidates} pictures…"))
        ));
    }

    fn on_batch_start(&self, batch_index: usize, batch_len: usize) {
        self.bar
            .set_message(format!("batch {} ({batch_len})", batch_index + 1));
    }

    fn on_picture_described(&self, self_ref: &str, description_len: usize) {
        self.bar.println(format!(
            "  {} {:<16}  {}",
            green("✓"),
            self_ref,
            dim(&format!("{description_len:>5} chars")),
        ));
    }

    fn on_batch_complete(&self, _batch_index: usize, submitted: usize, _described: usize) {
        self.bar.inc(submitted as u64);
    }

    fn on_complete(&self, stats: &DescriptionStats) {
        self.bar.finish_and_clear();
        eprintln!(
            "{} {} of {} pictures described  {}",
            green("✔"),
            bold(&stats.described.to_string()),
            stats.candidates,
            dim(&format!(
                "({} below threshold, {} without image)",
                stats.skipped, stats.without_image
            )),
        );
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Describe with a local OpenAI-compatible server (vLLM, Ollama, LM Studio)
  picdesc report.json -o report.described.json --allow-remote \
      --url http://localhost:11434/v1/chat/completions --param model=granite3.2-vision:2b

  # Use two paragraphs before and one after each picture as context
  picdesc report.json --allow-remote --before 2 --after 1 --param model=smolvlm

  # llama-stack server
  picdesc report.json --allow-remote --backend llama-stack \
      --url http://localhost:8321/v1/inference/chat-completion \
      --param model_id=meta-llama/Llama-3.2-11B-Vision-Instruct

  # Hosted provider through edgequake-llm
  picdesc report.json --allow-remote --backend provider --provider openai --model gpt-4.1-nano

INPUT:
  A document JSON with `items` (reading order) and `pages` (geometry). Picture
  items carry their rendered bitmap as a data URI under `image.uri`; pictures
  without one are left untouched.

ENVIRONMENT VARIABLES:
  Every flag has a PICDESC_* fallback (e.g. PICDESC_URL, PICDESC_ALLOW_REMOTE).
  OPENAI_API_KEY          OpenAI API key (provider backend)
  ANTHROPIC_API_KEY       Anthropic API key (provider backend)
  EDGEQUAKE_LLM_PROVIDER  Provider auto-selection (provider backend)
  EDGEQUAKE_MODEL         Model auto-selection (provider backend)
  RUST_LOG                Overrides the log filter
"#;

/// Describe the pictures of a document with a vision-language model.
#[derive(Parser, Debug)]
#[command(
    name = "picdesc",
    version,
    about = "Describe document pictures with a vision-language model",
    long_about = "Describe the pictures of a parsed document with a vision-language model and \
attach each description to its picture. Works with any OpenAI-compatible endpoint, llama-stack, \
or an edgequake-llm provider.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Document JSON file.
    input: PathBuf,

    /// Write the annotated document to this file instead of stdout.
    #[arg(short, long, env = "PICDESC_OUTPUT")]
    output: Option<PathBuf>,

    /// Description backend.
    #[arg(long, env = "PICDESC_BACKEND", value_enum, default_value = "api")]
    backend: BackendArg,

    /// Endpoint URL for the api and llama-stack backends.
    #[arg(long, env = "PICDESC_URL", default_value = edgequake_picdesc::config::DEFAULT_API_URL)]
    url: String,

    /// Extra request header, `NAME=VALUE`. Repeatable.
    #[arg(long = "header", env = "PICDESC_HEADER", value_name = "NAME=VALUE")]
    headers: Vec<String>,

    /// Extra body field, `KEY=JSON` (non-JSON values are sent as strings). Repeatable.
    #[arg(long = "param", env = "PICDESC_PARAM", value_name = "KEY=JSON")]
    params: Vec<String>,

    /// Per-request timeout in seconds.
    #[arg(long, env = "PICDESC_TIMEOUT", default_value_t = 20)]
    timeout: u64,

    /// Base prompt sent with every picture.
    #[arg(long, env = "PICDESC_PROMPT", conflicts_with = "prompt_file")]
    prompt: Option<String>,

    /// Read the base prompt from a text file.
    #[arg(long, env = "PICDESC_PROMPT_FILE")]
    prompt_file: Option<PathBuf>,

    /// Text fragments before each picture used as context.
    #[arg(long, env = "PICDESC_BEFORE", default_value_t = 0)]
    before: usize,

    /// Text fragments after each picture used as context.
    #[arg(long, env = "PICDESC_AFTER", default_value_t = 0)]
    after: usize,

    /// Minimum fraction of its page a picture must cover (0–1).
    #[arg(long, env = "PICDESC_THRESHOLD", default_value_t = 0.05)]
    threshold: f64,

    /// Pictures submitted per batch.
    #[arg(long, env = "PICDESC_BATCH_SIZE", default_value_t = 8)]
    batch_size: usize,

    /// Allow sending pictures to remote services.
    #[arg(long, env = "PICDESC_ALLOW_REMOTE")]
    allow_remote: bool,

    /// edgequake-llm provider for `--backend provider` (openai, anthropic, gemini, ollama, …).
    #[arg(long, env = "PICDESC_PROVIDER")]
    provider: Option<String>,

    /// Model ID for `--backend provider`.
    #[arg(long, env = "PICDESC_MODEL")]
    model: Option<String>,

    /// Print description stats as JSON on stderr.
    #[arg(long, env = "PICDESC_JSON_STATS")]
    json_stats: bool,

    /// Disable progress bar.
    #[arg(long, env = "PICDESC_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "PICDESC_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "PICDESC_QUIET")]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Debug)]
enum BackendArg {
    Api,
    LlamaStack,
    Provider,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let show_progress = !cli.quiet && !cli.no_progress;
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

    // ── Build options ────────────────────────────────────────────────────
    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn DescriptionProgressCallback>)
    } else {
        None
    };
    let options = build_options(&cli, progress_cb).await?;

    // ── Describe ─────────────────────────────────────────────────────────
    let mut doc = Document::from_json_file(&cli.input).context("Failed to load document")?;
    let describer = PictureDescriber::new(options).context("Failed to set up backend")?;
    let stats = describer
        .describe_document(&mut doc)
        .await
        .context("Picture description failed")?;

    // ── Output ───────────────────────────────────────────────────────────
    if let Some(ref output_path) = cli.output {
        doc.to_json_file(output_path)
            .context("Failed to write annotated document")?;
        if !cli.quiet {
            eprintln!(
                "{}  {}/{} pictures  →  {}",
                green("✔"),
                stats.described,
                stats.candidates,
                bold(&output_path.display().to_string()),
            );
        }
    } else {
        let json = serde_json::to_string_pretty(&doc).context("Failed to serialise document")?;
        let stdout = io::stdout();
        let mut handle = stdout.lock();
        handle
            .write_all(json.as_bytes())
            .and_then(|_| handle.write_all(b"\n"))
            .context("Failed to write to stdout")?;
    }

    if cli.json_stats {
        eprintln!(
            "{}",
            serde_json::to_string_pretty(&stats).context("Failed to serialise stats")?
        );
    } else if !cli.quiet && !show_progress {
        eprintln!(
            "Described {}/{} pictures ({} below threshold, {} without image)",
            stats.described, stats.candidates, stats.skipped, stats.without_image
        );
    }

    Ok(())
}

/// Map CLI args to `PictureDescriptionOptions`.
async fn build_options(
    cli: &Cli,
    progress: Option<ProgressCallback>,
) -> Result<PictureDescriptionOptions> {
    let prompt = if let Some(ref path) = cli.prompt_file {
        Some(
            tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read prompt from {:?}", path))?,
        )
    } else {
        cli.prompt.clone()
    };

    let backend = match cli.backend {
        BackendArg::Api => BackendOptions::Api(build_api_options(cli)?),
        BackendArg::LlamaStack => BackendOptions::LlamaStack(build_api_options(cli)?),
        BackendArg::Provider => BackendOptions::Provider(ProviderOptions {
            provider_name: cli.provider.clone(),
            model: cli.model.clone(),
            ..ProviderOptions::default()
        }),
    };

    let mut builder = PictureDescriptionOptions::builder()
        .allow_remote(cli.allow_remote)
        .text_window(cli.before, cli.after)
        .picture_area_threshold(cli.threshold)
        .batch_size(cli.batch_size)
        .backend(backend);

    if let Some(prompt) = prompt {
        builder = builder.prompt(prompt.trim());
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

fn build_api_options(cli: &Cli) -> Result<ApiOptions> {
    let mut api = ApiOptions::new(&cli.url).timeout_secs(cli.timeout);
    for raw in &cli.headers {
        let (name, value) = split_pair(raw, "--header")?;
        api = api.header(name, value);
    }
    for raw in &cli.params {
        let (key, value) = split_pair(raw, "--param")?;
        api = api.param(key, parse_param_value(value));
    }
    Ok(api)
}

/// Split `KEY=VALUE` on the first `=`.
fn split_pair<'a>(raw: &'a str, flag: &str) -> Result<(&'a str, &'a str)> {
    match raw.split_once('=') {
        Some((k, v)) if !k.trim().is_empty() => Ok((k.trim(), v)),
        _ => anyhow::bail!("{flag} expects KEY=VALUE (got '{raw}')"),
    }
}

/// `200` → number, `true` → bool, `{"a":1}` → object, `granite` → string.
fn parse_param_value(raw: &str) -> serde_json::Value {
    serde_json::from_str(raw).unwrap_or_else(|_| serde_json::Value::String(raw.to_string()))
}
