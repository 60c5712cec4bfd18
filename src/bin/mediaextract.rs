//! CLI binary for edgequake-extract.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `ExtractionConfig`, runs the batch and prints or writes the results.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use edgequake_extract::{
    process_batch, ExtractionConfig, ExtractionProgressCallback, FrameFailurePolicy, JobOutput,
    JobResult, MediaExtractor, MediaJob, ProgressCallback, RenderedPageStrategy,
};
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::json;
use std::collections::HashMap;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
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

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: one bar for the batch plus a log line per
/// finished item. Items may finish out of order.
struct CliProgressCallback {
    bar: ProgressBar,
    start_times: Mutex<HashMap<usize, Instant>>,
    errors: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} items  \
             ⏱ {elapsed_precise}  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);

        let bar = ProgressBar::new(0);
        bar.set_style(style);
        bar.set_prefix("Extracting");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
            errors: AtomicUsize::new(0),
        })
    }

    fn elapsed_secs(&self, index: usize) -> f64 {
        self.start_times
            .lock()
            .unwrap()
            .remove(&index)
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

impl ExtractionProgressCallback for CliProgressCallback {
    fn on_batch_start(&self, total: usize) {
        self.bar.set_length(total as u64);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Extracting {total} item(s)…"))
        ));
    }

    fn on_item_start(&self, index: usize, _total: usize) {
        self.start_times
            .lock()
            .unwrap()
            .insert(index, Instant::now());
        self.bar.set_message(format!("item {}", index + 1));
    }

    fn on_item_complete(&self, index: usize, total: usize, output_len: usize) {
        let secs = self.elapsed_secs(index);
        self.bar.println(format!(
            "  {} Item {:>3}/{:<3}  {:<8}  {}",
            green("✓"),
            index + 1,
            total,
            dim(&format!("{output_len:>7} bytes")),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_item_error(&self, index: usize, total: usize, error: &str) {
        let secs = self.elapsed_secs(index);
        self.errors.fetch_add(1, Ordering::SeqCst);

        let msg: String = if error.chars().count() > 80 {
            format!("{}\u{2026}", error.chars().take(79).collect::<String>())
        } else {
            error.to_string()
        };
        self.bar.println(format!(
            "  {} Item {:>3}/{:<3}  {}  {}",
            red("✗"),
            index + 1,
            total,
            red(&msg),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_batch_complete(&self, total: usize, success_count: usize) {
        let failed = total.saturating_sub(success_count);
        self.bar.finish_and_clear();
        if failed == 0 {
            eprintln!(
                "{} {} item(s) extracted",
                green("✔"),
                bold(&success_count.to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} item(s) extracted  ({} failed)",
                if failed == total { red("✘") } else { cyan("⚠") },
                bold(&success_count.to_string()),
                total,
                red(&failed.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Text of a PDF, DOCX, XLSX or plain-text URL
  mediaextract document https://example.com/nota.pdf

  # Several documents at once, as JSON
  mediaextract --json -c 4 document a.pdf b.docx c.xlsx

  # OCR an image with a tighter budget
  mediaextract --time-budget 3 image scan.jpg

  # Speech-ready MP3 with silence trimmed, written to ./out
  mediaextract --out-dir out audio --vad https://example.com/voz.ogg

  # Five frames of a video, skipping frames ffmpeg cannot decode
  mediaextract --out-dir frames video --max-frames 5 --frame-failure skip clip.mp4

ENVIRONMENT VARIABLES:
  FFMPEG_BIN        ffmpeg binary (default: ffmpeg)
  FFPROBE_BIN       ffprobe binary (default: ffprobe)
  TESSERACT_BIN     tesseract binary (default: tesseract)
  RNNOISE_MODEL     RNNoise model for quiet audio
                    (default: /usr/local/share/rnnoise-model.rnn)
  PDFIUM_LIB_PATH   libpdfium file or directory (default: system library)
  RUST_LOG          tracing filter, overrides --verbose/--quiet
"#;

/// Extract text, images and speech-ready audio from media URLs.
#[derive(Parser, Debug)]
#[command(
    name = "mediaextract",
    version,
    about = "Extract text, frames and speech-ready audio from media URLs",
    long_about = "Extract text from PDF/DOCX/XLSX/plain-text documents and images (budgeted \
tesseract OCR), normalise audio to 16 kHz mono MP3 and sample representative video frames.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Items processed in parallel.
    #[arg(short, long, env = "MEDIAEXTRACT_CONCURRENCY", default_value_t = 4, global = true)]
    concurrency: usize,

    /// Print results as JSON.
    #[arg(long, env = "MEDIAEXTRACT_JSON", global = true)]
    json: bool,

    /// Directory for MP3 and JPEG outputs.
    #[arg(short, long, env = "MEDIAEXTRACT_OUT_DIR", default_value = ".", global = true)]
    out_dir: PathBuf,

    /// OCR language(s), `+`-joined.
    #[arg(long, env = "MEDIAEXTRACT_LANGUAGE", global = true)]
    language: Option<String>,

    /// OCR time budget in seconds.
    #[arg(long, env = "MEDIAEXTRACT_TIME_BUDGET", global = true)]
    time_budget: Option<f64>,

    /// OCR confidence (0–100) at which escalation stops.
    #[arg(long, env = "MEDIAEXTRACT_CONFIDENCE_TARGET", global = true)]
    confidence_target: Option<f32>,

    /// HTTP timeout in seconds.
    #[arg(long, env = "MEDIAEXTRACT_FETCH_TIMEOUT", default_value_t = 30, global = true)]
    fetch_timeout: u64,

    /// Disable progress bar.
    #[arg(long, env = "MEDIAEXTRACT_NO_PROGRESS", global = true)]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "MEDIAEXTRACT_VERBOSE", global = true)]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "MEDIAEXTRACT_QUIET", global = true)]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Text of documents (PDF, DOCX, XLSX, plain text).
    Document {
        #[command(flatten)]
        inputs: Inputs,

        /// Run the full OCR ladder on rendered PDF pages instead of one fast pass.
        #[arg(long)]
        budgeted_pages: bool,
    },
    /// Budgeted OCR of images.
    Image {
        #[command(flatten)]
        inputs: Inputs,
    },
    /// Normalise audio (or the audio track of a video) to 16 kHz mono MP3.
    Audio {
        #[command(flatten)]
        inputs: Inputs,

        /// Trim leading and trailing silence.
        #[arg(long)]
        vad: bool,

        /// Keep the downloaded source for reuse.
        #[arg(long)]
        keep_tmp: bool,
    },
    /// Representative JPEG frames of videos.
    Video {
        #[command(flatten)]
        inputs: Inputs,

        /// Frames per video (start, middle, end).
        #[arg(long, default_value_t = 3)]
        max_frames: usize,

        /// What to do when one frame cannot be captured.
        #[arg(long, value_enum, default_value = "abort")]
        frame_failure: FrameFailureArg,

        /// Keep the downloaded source for reuse.
        #[arg(long)]
        keep_tmp: bool,
    },
}

#[derive(Args, Debug)]
struct Inputs {
    /// URLs or local paths.
    #[arg(required = true)]
    urls: Vec<String>,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum FrameFailureArg {
    Abort,
    Skip,
}

impl From<FrameFailureArg> for FrameFailurePolicy {
    fn from(v: FrameFailureArg) -> Self {
        match v {
            FrameFailureArg::Abort => FrameFailurePolicy::Abort,
            FrameFailureArg::Skip => FrameFailurePolicy::Skip,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // Suppress INFO-level library logs when the progress bar is active.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
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

    // ── Build config and jobs ────────────────────────────────────────────
    let config = build_config(&cli)?;
    let jobs = build_jobs(&cli.command);
    let extractor = tokio::task::spawn_blocking(move || MediaExtractor::new(config))
        .await
        .context("Extractor setup panicked")?
        .context("Failed to set up extractor")?;

    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn ExtractionProgressCallback>)
    } else {
        None
    };

    // ── Run ──────────────────────────────────────────────────────────────
    let extractor = Arc::new(extractor);
    let results = process_batch(Arc::clone(&extractor), jobs, cli.concurrency, progress_cb).await;
    // The blocking HTTP client must not be dropped on an async worker.
    tokio::task::spawn_blocking(move || drop(extractor)).await.ok();
    let failed = results.iter().filter(|r| r.output.is_err()).count();

    if matches!(cli.command, Command::Audio { .. } | Command::Video { .. }) {
        tokio::fs::create_dir_all(&cli.out_dir)
            .await
            .with_context(|| format!("Failed to create {}", cli.out_dir.display()))?;
    }

    let mut report = Vec::with_capacity(results.len());
    for result in &results {
        let written = write_media(&cli.out_dir, result).await?;
        if cli.json {
            report.push(json_entry(result, &written));
        } else {
            print_result(result, &written, results.len() > 1, cli.quiet)?;
        }
    }

    if cli.json {
        let json = serde_json::to_string_pretty(&report).context("Failed to serialise output")?;
        println!("{json}");
    }

    if failed > 0 {
        anyhow::bail!("{} of {} item(s) failed", failed, results.len());
    }
    Ok(())
}

/// Map CLI args to `ExtractionConfig`.
fn build_config(cli: &Cli) -> Result<ExtractionConfig> {
    let mut builder = ExtractionConfig::builder().fetch_timeout_secs(cli.fetch_timeout);
    if let Some(ref language) = cli.language {
        builder = builder.ocr_language(language.clone()).pdf_language(language.clone());
    }
    if let Some(secs) = cli.time_budget {
        builder = builder.time_budget_secs(secs);
    }
    if let Some(target) = cli.confidence_target {
        builder = builder.confidence_target(target);
    }
    match &cli.command {
        Command::Document {
            budgeted_pages: true,
            ..
        } => builder = builder.rendered_page_strategy(RenderedPageStrategy::Budgeted),
        Command::Video { frame_failure, .. } => {
            builder = builder.frame_failure_policy((*frame_failure).into())
        }
        _ => {}
    }
    builder.build().context("Invalid configuration")
}

fn build_jobs(command: &Command) -> Vec<MediaJob> {
    match command {
        Command::Document { inputs, .. } => inputs
            .urls
            .iter()
            .map(|url| MediaJob::Document { url: url.clone() })
            .collect(),
        Command::Image { inputs } => inputs
            .urls
            .iter()
            .map(|url| MediaJob::Image { url: url.clone() })
            .collect(),
        Command::Audio {
            inputs,
            vad,
            keep_tmp,
        } => inputs
            .urls
            .iter()
            .map(|url| MediaJob::Audio {
                url: url.clone(),
                use_vad: *vad,
                delete_tmp: !keep_tmp,
            })
            .collect(),
        Command::Video {
            inputs,
            max_frames,
            keep_tmp,
            ..
        } => inputs
            .urls
            .iter()
            .map(|url| MediaJob::Video {
                url: url.clone(),
                max_frames: *max_frames,
                delete_tmp: !keep_tmp,
            })
            .collect(),
    }
}

/// Write MP3s and frames under `out_dir`; returns the written paths.
async fn write_media(out_dir: &Path, result: &JobResult) -> Result<Vec<PathBuf>> {
    let mut written = Vec::new();
    match &result.output {
        Ok(JobOutput::Audio(audio)) => {
            let path = out_dir.join(format!("{:03}_{}", result.index, audio.file_name));
            tokio::fs::write(&path, &audio.mp3)
                .await
                .with_context(|| format!("Failed to write {}", path.display()))?;
            written.push(path);
        }
        Ok(JobOutput::Video(frames)) => {
            for frame in frames {
                let path = out_dir.join(format!("{:03}_{}", result.index, frame.file_name));
                tokio::fs::write(&path, &frame.jpeg)
                    .await
                    .with_context(|| format!("Failed to write {}", path.display()))?;
                written.push(path);
            }
        }
        _ => {}
    }
    Ok(written)
}

fn json_entry(result: &JobResult, written: &[PathBuf]) -> serde_json::Value {
    match &result.output {
        Ok(output) => json!({
            "url": result.job.url(),
            "ok": true,
            "result": output,
            "files": written,
        }),
        Err(e) => json!({
            "url": result.job.url(),
            "ok": false,
            "error": e.to_string(),
        }),
    }
}

fn print_result(result: &JobResult, written: &[PathBuf], header: bool, quiet: bool) -> Result<()> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    if header {
        writeln!(out, "{}", bold(&format!("==> {} <==", result.job.url())))?;
    }
    match &result.output {
        Err(e) => eprintln!("{} {}: {}", red("✗"), result.job.url(), e),
        Ok(JobOutput::Document(doc)) => match &doc.text {
            Some(text) => {
                writeln!(out, "{text}")?;
                if !doc.preview_images.is_empty() && !quiet {
                    eprintln!(
                        "   {}",
                        dim(&format!(
                            "{} page preview(s) available with --json",
                            doc.preview_images.len()
                        ))
                    );
                }
            }
            None => eprintln!("{} {}: unsupported content type", cyan("⚠"), result.job.url()),
        },
        Ok(JobOutput::Image(image)) => {
            writeln!(out, "{}", image.text)?;
            if !quiet {
                eprintln!(
                    "   {}",
                    dim(&format!(
                        "confidence {:.1} via {:?}",
                        image.confidence, image.tier
                    ))
                );
            }
        }
        Ok(JobOutput::Audio(audio)) => {
            for path in written {
                writeln!(out, "{}  {:.2}s", path.display(), audio.duration_seconds)?;
            }
        }
        Ok(JobOutput::Video(frames)) => {
            for (path, frame) in written.iter().zip(frames) {
                writeln!(out, "{}  @{:.3}s", path.display(), frame.timestamp_seconds)?;
            }
        }
    }
    Ok(())
}
