//! ffprobe / ffmpeg measurements of media files.
//!
//! Every probe is memoised by file path in [`PipelineCaches`]; the entries
//! are dropped when the scratch file behind the path is deleted (see
//! [`crate::pipeline::input::MaterializedFile`]).

use crate::cache::PipelineCaches;
use crate::error::{ExtractError, Result};
use crate::tools::Invocation;
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Runs probes against local media files.
pub struct MediaProbe {
    ffmpeg: PathBuf,
    ffprobe: PathBuf,
    caches: Arc<PipelineCaches>,
}

impl MediaProbe {
    pub fn new(
        ffmpeg: impl Into<PathBuf>,
        ffprobe: impl Into<PathBuf>,
        caches: Arc<PipelineCaches>,
    ) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            ffprobe: ffprobe.into(),
            caches,
        }
    }

    /// Whether the file carries at least one audio stream.
    ///
    /// A failing ffprobe is an error, not "no audio": only a successful run
    /// that lists no stream means the track is missing.
    pub fn has_audio_stream(&self, path: &Path) -> Result<bool> {
        self.caches
            .has_audio
            .get_or_try_insert(path.to_path_buf(), || {
                let out = Invocation::new(&self.ffprobe)
                    .args(["-v", "error", "-select_streams", "a"])
                    .args(["-show_entries", "stream=index", "-of", "csv=p=0"])
                    .arg(path)
                    .run()?;
                let found = has_stream(&out.stdout);
                debug!("{}: audio stream present = {}", path.display(), found);
                Ok(found)
            })
    }

    /// Mean volume in dBFS as reported by ffmpeg's `volumedetect` filter.
    /// Returns 0.0 when ffmpeg prints no measurement.
    pub fn mean_volume_dbfs(&self, path: &Path) -> Result<f64> {
        self.caches
            .mean_volume
            .get_or_try_insert(path.to_path_buf(), || {
                let out = Invocation::new(&self.ffmpeg)
                    .args(["-hide_banner", "-nostats", "-i"])
                    .arg(path)
                    .args(["-af", "volumedetect", "-f", "null", "-"])
                    .run()?;
                let mean = parse_mean_volume(&out.stderr).unwrap_or(0.0);
                debug!("{}: mean volume {:.1} dBFS", path.display(), mean);
                Ok(mean)
            })
    }

    /// Container duration in seconds.
    pub fn duration_secs(&self, path: &Path) -> Result<f64> {
        self.caches
            .duration
            .get_or_try_insert(path.to_path_buf(), || {
                let inv = Invocation::new(&self.ffprobe)
                    .args(["-v", "error", "-show_entries", "format=duration"])
                    .args(["-of", "default=noprint_wrappers=1:nokey=1"])
                    .arg(path);
                let out = inv.run()?;
                parse_duration(&out.stdout).ok_or_else(|| ExtractError::ToolOutput {
                    tool: inv.tool_name(),
                    detail: format!("not a duration: {:?}", out.stdout.trim()),
                })
            })
    }
}

// ── Output parsers ───────────────────────────────────────────────────────

static RE_MEAN_VOLUME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"mean_volume:\s*(-?(?:\d+(?:\.\d*)?|inf))\s*dB").unwrap());

/// Read `mean_volume: -23.4 dB` from volumedetect's stderr.
pub fn parse_mean_volume(stderr: &str) -> Option<f64> {
    RE_MEAN_VOLUME
        .captures(stderr)
        .and_then(|c| c[1].parse::<f64>().ok())
}

/// Parse ffprobe's bare `format=duration` value. `N/A` yields `None`.
pub fn parse_duration(stdout: &str) -> Option<f64> {
    stdout.trim().parse::<f64>().ok()
}

/// ffprobe with `-select_streams a` prints one index per audio stream.
pub fn has_stream(stdout: &str) -> bool {
    !stdout.trim().is_empty()
}
