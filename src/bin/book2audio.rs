//! CLI binary for book2audio.
//!
//! A thin shim over the library crate: copies the input into a local data
//! directory, runs one job through the pipeline, and prints the outcome.

use anyhow::{bail, Context, Result};
use book2audio::providers::llm::{resolve_provider, LlmTranslator, ProviderSelection};
use book2audio::providers::speech::HttpSpeech;
use book2audio::providers::vision::VisionOcr;
use book2audio::storage::content_type_for_key;
use book2audio::{
    input, Capabilities, FileJobStore, FsStore, JobResult, JobStatus, ObjectMeta, ObjectStore,
    Pipeline, PipelineConfig, PipelineProgressCallback, ProgressCallback, Stage, Stores,
    UploadAuthorizer,
};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::{Path, PathBuf};
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

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress: a spinner while extracting or persisting, a chunk bar
/// while translating and synthesising.
struct CliProgressCallback {
    bar: ProgressBar,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        bar.set_style(spinner_style());
        bar.set_prefix("Preparing");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self { bar })
    }
}

fn spinner_style() -> ProgressStyle {
    ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
        .tick_strings(TICKS)
}

fn chunk_bar_style() -> ProgressStyle {
    ProgressStyle::with_template(
        "{spinner:.cyan} {prefix:.bold}  \
         [{bar:42.green/238}] {pos:>3}/{len} chunks  \
         ⏱ {elapsed_precise}  ETA {eta_precise}",
    )
    .unwrap_or_else(|_| ProgressStyle::default_bar())
    .progress_chars("█▉▊▋▌▍▎▏  ")
    .tick_strings(TICKS)
}

impl PipelineProgressCallback for CliProgressCallback {
    fn on_job_start(&self, job_id: &str, source_key: &str) {
        self.bar
            .println(format!("{} {}", bold(source_key), dim(&format!("job {job_id}"))));
    }

    fn on_stage_start(&self, stage: Stage) {
        let (prefix, chunked) = match stage {
            Stage::Extract => ("Extracting", false),
            Stage::Translate => ("Translating", true),
            Stage::Synthesize => ("Synthesising", true),
            Stage::Persist => ("Saving", false),
        };
        self.bar
            .set_style(if chunked { chunk_bar_style() } else { spinner_style() });
        self.bar.set_prefix(prefix);
        self.bar.set_position(0);
        self.bar.set_length(0);
        self.bar.reset_eta();
    }

    fn on_chunk_complete(&self, _stage: Stage, index: usize, total: usize) {
        self.bar.set_length(total as u64);
        self.bar.set_position(index as u64 + 1);
    }

    fn on_job_complete(&self, _job_id: &str, status: JobStatus, error: Option<String>) {
        self.bar.finish_and_clear();
        match status {
            JobStatus::Done => eprintln!("{} narration ready", green("✔")),
            _ => eprintln!(
                "{} {}",
                red("✘"),
                red(error.as_deref().unwrap_or("job failed"))
            ),
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Narrate a text file in Spanish
  book2audio moby-dick.txt --lang es

  # Scanned PDF from a URL, Hindi narration, custom voice
  book2audio https://example.com/scan.pdf --lang hi --voice hi=shimmer

  # Self-hosted OpenAI-compatible speech server
  book2audio notes.rtf --tts-endpoint http://localhost:8880/v1/audio/speech

  # Inspect a job record
  book2audio --status 2b1f0c9e-...

  # Issue a signed upload URL (needs BOOK2AUDIO_SIGNING_KEY)
  book2audio --upload-url novel.pdf --lang fr --content-type application/pdf

DATA DIRECTORY LAYOUT:
  <data-dir>/input/   uploaded sources (+ .meta.json with target_lang)
  <data-dir>/text/    extracted/… and translated/… text
  <data-dir>/audio/   <name>_<lang>.mp3 narrations
  <data-dir>/jobs/    one JSON record per job

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY          OpenAI API key (LLM and default speech endpoint)
  ANTHROPIC_API_KEY       Anthropic API key
  GEMINI_API_KEY          Google Gemini API key
  EDGEQUAKE_LLM_PROVIDER  Override provider (openai, anthropic, gemini, ollama)
  EDGEQUAKE_MODEL         Override model ID
  BOOK2AUDIO_SIGNING_KEY  Secret for --upload-url
  RUST_LOG                Override log filtering
"#;

/// Convert books into translated audio narrations.
#[derive(Parser, Debug)]
#[command(
    name = "book2audio",
    version,
    about = "Convert books (text, RTF, images, PDFs) into translated MP3 narrations",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local file path or HTTP/HTTPS URL of the book.
    #[arg(required_unless_present_any = ["status", "upload_url"])]
    input: Option<String>,

    /// Target narration language code (e.g. es, hi, fr-CA).
    #[arg(short, long, env = "BOOK2AUDIO_LANG")]
    lang: Option<String>,

    /// Directory holding inputs, outputs and job records.
    #[arg(long, env = "BOOK2AUDIO_DATA_DIR", default_value = "book2audio-data")]
    data_dir: PathBuf,

    /// LLM provider for OCR and translation: openai, anthropic, gemini, ollama.
    #[arg(long, env = "EDGEQUAKE_PROVIDER")]
    provider: Option<String>,

    /// LLM model ID (default: gpt-4.1-nano).
    #[arg(long, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// OpenAI-compatible speech endpoint.
    #[arg(long, env = "BOOK2AUDIO_TTS_ENDPOINT")]
    tts_endpoint: Option<String>,

    /// Speech model ID (default: tts-1).
    #[arg(long, env = "BOOK2AUDIO_TTS_MODEL")]
    tts_model: Option<String>,

    /// Voice override as LANG=VOICE; repeatable.
    #[arg(long = "voice", value_name = "LANG=VOICE", value_parser = parse_voice)]
    voices: Vec<(String, String)>,

    /// Maximum characters per translation request.
    #[arg(long, env = "BOOK2AUDIO_TRANSLATE_LIMIT", default_value_t = 4500)]
    translate_limit: usize,

    /// Maximum characters per speech request.
    #[arg(long, env = "BOOK2AUDIO_SYNTHESIS_LIMIT", default_value_t = 3000)]
    synthesis_limit: usize,

    /// Seconds to wait for a multi-page OCR job.
    #[arg(long, env = "BOOK2AUDIO_OCR_TIMEOUT", default_value_t = 60)]
    ocr_timeout: u64,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "BOOK2AUDIO_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// Print the record of this job and exit.
    #[arg(long, value_name = "JOB_ID", conflicts_with = "upload_url")]
    status: Option<String>,

    /// Print a signed upload URL for FILENAME and exit.
    #[arg(long, value_name = "FILENAME")]
    upload_url: Option<String>,

    /// Content type bound into --upload-url.
    #[arg(long, requires = "upload_url")]
    content_type: Option<String>,

    /// Base URL of the upload endpoint for --upload-url.
    #[arg(
        long,
        env = "BOOK2AUDIO_UPLOAD_BASE_URL",
        default_value = "http://localhost:8080/upload"
    )]
    upload_base_url: String,

    /// Output structured JSON instead of text.
    #[arg(long, env = "BOOK2AUDIO_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "BOOK2AUDIO_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "BOOK2AUDIO_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "BOOK2AUDIO_QUIET")]
    quiet: bool,
}

fn parse_voice(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((lang, voice)) if !lang.trim().is_empty() && !voice.trim().is_empty() => {
            Ok((lang.trim().to_string(), voice.trim().to_string()))
        }
        _ => Err(format!("expected LANG=VOICE, got '{s}'")),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar gives all the feedback that matters; library INFO
    // logs would tear it.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json && cli.input.is_some();
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

    if let Some(ref job_id) = cli.status {
        return print_status(&cli, job_id).await;
    }
    if let Some(ref filename) = cli.upload_url {
        return print_upload_url(&cli, filename);
    }

    let progress: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn PipelineProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, progress)?;
    let input_str = cli.input.as_deref().context("INPUT is required")?;
    let lang = cli
        .lang
        .clone()
        .unwrap_or_else(|| config.default_target_lang.clone());

    // ── Stage the source in the data directory ──────────────────────────
    let dirs = DataDirs::new(&cli.data_dir);
    let loaded = input::load_input(input_str, cli.download_timeout)
        .await
        .with_context(|| format!("Failed to load {input_str}"))?;
    let source_store = Arc::new(FsStore::new(&dirs.input));
    source_store
        .put(
            &loaded.file_name,
            loaded.bytes,
            ObjectMeta::new(content_type_for_key(&loaded.file_name))
                .with_tag(book2audio::storage::TARGET_LANG_TAG, lang.as_str()),
        )
        .await
        .context("Failed to stage input")?;

    // ── Capabilities ─────────────────────────────────────────────────────
    let selection = ProviderSelection {
        provider: None,
        provider_name: cli.provider.clone(),
        model: cli.model.clone(),
    };
    let llm = resolve_provider(&selection).context("LLM provider unavailable")?;
    let speech = HttpSpeech::from_env(cli.tts_endpoint.as_deref(), cli.tts_model.as_deref())
        .context("Speech provider unavailable")?;
    let capabilities = Capabilities::new(
        Arc::new(VisionOcr::new(Arc::clone(&llm))),
        Arc::new(LlmTranslator::new(llm)),
        Arc::new(speech),
    );

    let stores = Stores::new(
        source_store,
        Arc::new(FsStore::new(&dirs.text)),
        Arc::new(FsStore::new(&dirs.audio)),
    );
    let pipeline = Pipeline::new(
        config,
        capabilities,
        stores,
        Arc::new(FileJobStore::new(&dirs.jobs)),
    );

    // ── Run ──────────────────────────────────────────────────────────────
    let result = pipeline
        .submit(&loaded.file_name)
        .await
        .context("Job store unavailable")?;
    report(&cli, &dirs, &result, show_progress)?;

    if !result.is_done() {
        bail!(
            "{}",
            result.error.unwrap_or_else(|| "job failed".to_string())
        );
    }
    Ok(())
}

/// Sub-directories of `--data-dir`.
struct DataDirs {
    input: PathBuf,
    text: PathBuf,
    audio: PathBuf,
    jobs: PathBuf,
}

impl DataDirs {
    fn new(root: &Path) -> Self {
        Self {
            input: root.join("input"),
            text: root.join("text"),
            audio: root.join("audio"),
            jobs: root.join("jobs"),
        }
    }
}

/// Map CLI args to `PipelineConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<PipelineConfig> {
    let mut builder = PipelineConfig::builder()
        .translate_char_limit(cli.translate_limit)
        .synthesis_char_limit(cli.synthesis_limit)
        .max_poll_wait(Duration::from_secs(cli.ocr_timeout));
    for (lang, voice) in &cli.voices {
        builder = builder.voice(lang.as_str(), voice.as_str());
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }
    builder.build().context("Invalid configuration")
}

fn report(cli: &Cli, dirs: &DataDirs, result: &JobResult, show_progress: bool) -> Result<()> {
    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(result).context("Failed to serialise result")?
        );
        return Ok(());
    }
    if cli.quiet {
        return Ok(());
    }

    let s = &result.stats;
    match result.audio_key {
        Some(ref key) => {
            if !show_progress {
                eprintln!("{} job {} done", green("✔"), result.job_id);
            }
            eprintln!(
                "   {} chars extracted  /  {} chars translated  /  {} chunk(s) narrated  —  {}ms total",
                dim(&s.extracted_chars.to_string()),
                dim(&s.translated_chars.to_string()),
                dim(&s.synthesis_chunks.to_string()),
                s.total_ms,
            );
            println!("{}", dirs.audio.join(key).display());
        }
        None if !show_progress => {
            eprintln!(
                "{} job {} failed [{}]: {}",
                red("✘"),
                result.job_id,
                result.error_kind.as_deref().unwrap_or("unknown"),
                result.error.as_deref().unwrap_or("")
            );
        }
        None => {}
    }
    Ok(())
}

async fn print_status(cli: &Cli, job_id: &str) -> Result<()> {
    let dirs = DataDirs::new(&cli.data_dir);
    let store = FileJobStore::new(&dirs.jobs);
    let job = book2audio::JobStore::get(&store, job_id)
        .await
        .context("Failed to read job record")?
        .with_context(|| format!("Job '{job_id}' not found in {}", dirs.jobs.display()))?;

    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&job).context("Failed to serialise job")?
        );
    } else {
        println!("Job:          {}", job.id);
        println!("Source:       {}", job.source_key);
        println!("Language:     {}", job.target_lang);
        println!("Status:       {}", job.status);
        println!("Created:      {}", job.created_at.to_rfc3339());
        if let Some(ref a) = job.audio_key {
            println!("Audio:        {}", dirs.audio.join(a).display());
        }
        if let Some(ref e) = job.error {
            println!("Error:        {}", e);
        }
    }
    Ok(())
}

fn print_upload_url(cli: &Cli, filename: &str) -> Result<()> {
    let key = std::env::var("BOOK2AUDIO_SIGNING_KEY")
        .ok()
        .filter(|k| !k.is_empty())
        .context("BOOK2AUDIO_SIGNING_KEY must be set to issue upload URLs")?;
    let authorizer = UploadAuthorizer::new(&cli.upload_base_url, key)?;
    let grant = authorizer.authorize(
        Some(filename),
        cli.lang.as_deref(),
        cli.content_type.as_deref(),
        chrono::Utc::now(),
    )?;

    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&grant).context("Failed to serialise grant")?
        );
    } else {
        println!("{}", grant.url);
        if !cli.quiet {
            eprintln!("   expires {}", dim(&grant.expires_at.to_rfc3339()));
        }
    }
    Ok(())
}
