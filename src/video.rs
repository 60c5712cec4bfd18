//! Representative JPEG frames from a video: start, middle, end.

use crate::cache::PipelineCaches;
use crate::config::{FrameFailurePolicy, VideoConfig};
use crate::error::Result;
use crate::output::{frame_file_name, FrameSample};
use crate::pipeline::input::Materializer;
use crate::probe::MediaProbe;
use crate::tools::{Invocation, ScratchFile};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Default number of frames per video.
pub const DEFAULT_MAX_FRAMES: usize = 3;

/// Captures still frames with ffmpeg.
pub struct VideoSampler {
    materializer: Arc<Materializer>,
    probe: Arc<MediaProbe>,
    caches: Arc<PipelineCaches>,
    ffmpeg: PathBuf,
    config: VideoConfig,
}

impl VideoSampler {
    pub fn new(
        materializer: Arc<Materializer>,
        probe: Arc<MediaProbe>,
        caches: Arc<PipelineCaches>,
        ffmpeg: impl Into<PathBuf>,
        config: VideoConfig,
    ) -> Self {
        Self {
            materializer,
            probe,
            caches,
            ffmpeg: ffmpeg.into(),
            config,
        }
    }

    /// Up to `max_frames` frames at `[0, duration/2, duration - 0.2]`.
    pub fn sample(
        &self,
        url: &str,
        max_frames: usize,
        delete_tmp: bool,
    ) -> Result<Arc<Vec<FrameSample>>> {
        self.caches
            .video
            .get_or_try_insert((url.to_string(), max_frames, delete_tmp), || {
                self.sample_uncached(url, max_frames, delete_tmp)
                    .map(Arc::new)
            })
    }

    fn sample_uncached(
        &self,
        url: &str,
        max_frames: usize,
        delete_tmp: bool,
    ) -> Result<Vec<FrameSample>> {
        let source = self.materializer.materialize(url, !delete_tmp)?;

        let duration = match self.probe.duration_secs(source.path()) {
            Ok(d) if d.is_finite() && d > 0.0 => d,
            Ok(d) => {
                debug!("Unusable duration {} for {}", d, url);
                self.config.assumed_duration_secs
            }
            Err(e) => {
                debug!("Duration probe failed for {}: {}", url, e);
                self.config.assumed_duration_secs
            }
        };

        let timestamps = representative_timestamps(duration, max_frames, self.config.end_offset_secs);
        let mut frames = Vec::with_capacity(timestamps.len());
        for (index, t) in timestamps.into_iter().enumerate() {
            match self.capture(source.path(), t) {
                Ok(jpeg) => frames.push(FrameSample {
                    jpeg,
                    timestamp_seconds: t,
                    file_name: frame_file_name(index),
                }),
                Err(e) => match self.config.frame_failure {
                    FrameFailurePolicy::Abort => return Err(e),
                    FrameFailurePolicy::Skip => {
                        warn!("Skipping frame at {:.3}s of {}: {}", t, url, e);
                    }
                },
            }
        }

        info!("Sampled {} frame(s) from {} ({:.2}s)", frames.len(), url, duration);
        Ok(frames)
    }

    /// One JPEG at `t` seconds. The per-frame file is gone when this returns.
    fn capture(&self, src: &Path, t: f64) -> Result<Vec<u8>> {
        let out = ScratchFile::new(".jpg")?;
        frame_invocation(&self.ffmpeg, src, t, self.config.jpeg_qscale, out.path()).run()?;
        out.read()
    }
}

/// `[0, dur/2, max(0, dur - end_offset)]`, truncated to `max_frames`.
pub fn representative_timestamps(duration: f64, max_frames: usize, end_offset: f64) -> Vec<f64> {
    let mut ts = vec![0.0];
    if max_frames >= 2 {
        ts.push((duration / 2.0).max(0.0));
    }
    if max_frames >= 3 {
        ts.push((duration - end_offset).max(0.0));
    }
    ts.truncate(max_frames);
    ts
}

/// `ffmpeg -y -ss <t> -i <src> -frames:v 1 -qscale:v <q> <dst>`
pub fn frame_invocation(ffmpeg: &Path, src: &Path, t: f64, qscale: u8, dst: &Path) -> Invocation {
    Invocation::new(ffmpeg)
        .args(["-y", "-ss"])
        .arg(format!("{t:.3}"))
        .arg("-i")
        .arg(src)
        .args(["-frames:v", "1", "-qscale:v"])
        .arg(qscale.to_string())
        .arg(dst)
}
