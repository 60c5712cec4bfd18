//! Speech-ready MP3 from any audio or video URL.
//!
//! ## Pipeline
//!
//! ```text
//! materialise ─▶ has audio? ─▶ volumedetect ─▶ filter chain ─▶ ffmpeg recode ─▶ duration
//!                   │ no                                                 │ any failure
//!                   ▼                                                    ▼
//!             NoAudioStream                                  in-process transcode
//! ```
//!
//! A missing audio track is the only failure that skips the fallback: the
//! decoder would fail on the same input anyway.

use super::fallback;
use super::filters::FilterChain;
use crate::cache::PipelineCaches;
use crate::config::AudioConfig;
use crate::error::{ExtractError, Result};
use crate::output::{mp3_file_name, AudioProfile, NormalizedAudio};
use crate::pipeline::input::{MaterializedFile, Materializer};
use crate::probe::MediaProbe;
use crate::tools::{Invocation, ScratchFile};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Converts media into 16 kHz mono MP3.
pub struct AudioNormalizer {
    materializer: Arc<Materializer>,
    probe: Arc<MediaProbe>,
    caches: Arc<PipelineCaches>,
    ffmpeg: PathBuf,
    rnnoise_model: PathBuf,
    config: AudioConfig,
}

impl AudioNormalizer {
    pub fn new(
        materializer: Arc<Materializer>,
        probe: Arc<MediaProbe>,
        caches: Arc<PipelineCaches>,
        ffmpeg: impl Into<PathBuf>,
        rnnoise_model: impl Into<PathBuf>,
        config: AudioConfig,
    ) -> Self {
        Self {
            materializer,
            probe,
            caches,
            ffmpeg: ffmpeg.into(),
            rnnoise_model: rnnoise_model.into(),
            config,
        }
    }

    /// Normalise the audio of `url`.
    ///
    /// With `use_vad`, leading and trailing silence is trimmed. With
    /// `delete_tmp = false` the downloaded source is kept on disk and reused
    /// by later calls for the same URL.
    pub fn normalize(&self, url: &str, use_vad: bool, delete_tmp: bool) -> Result<NormalizedAudio> {
        self.caches
            .audio
            .get_or_try_insert((url.to_string(), use_vad, delete_tmp), || {
                self.normalize_uncached(url, use_vad, delete_tmp)
            })
    }

    fn normalize_uncached(
        &self,
        url: &str,
        use_vad: bool,
        delete_tmp: bool,
    ) -> Result<NormalizedAudio> {
        let source = self.materializer.materialize(url, !delete_tmp)?;

        let (mp3, duration_seconds) = match self.recode_with_ffmpeg(&source, use_vad) {
            Ok(done) => done,
            Err(e @ ExtractError::NoAudioStream { .. }) => return Err(e),
            Err(e) => {
                warn!("ffmpeg normalisation of {} failed: {}; using in-process transcode", url, e);
                fallback::transcode(&source.bytes(), self.config.sample_rate, self.config.bitrate_kbps)
                    .map_err(|fallback_err| {
                        error!("Fallback transcode of {} failed: {}", url, fallback_err);
                        fallback_err
                    })?
            }
        };

        info!(
            "Normalised {}: {:.2}s, {} bytes",
            url,
            duration_seconds,
            mp3.len()
        );
        Ok(NormalizedAudio {
            mp3,
            duration_seconds,
            file_name: mp3_file_name(url),
        })
    }

    /// Loudness profile of a local file.
    pub fn profile(&self, path: &Path) -> Result<AudioProfile> {
        let mean = self.probe.mean_volume_dbfs(path)?;
        let duration = match self.probe.duration_secs(path) {
            Ok(d) => Some(d),
            Err(e) => {
                debug!("No duration for {}: {}", path.display(), e);
                None
            }
        };
        Ok(AudioProfile::new(
            duration,
            mean,
            self.config.gain_threshold_dbfs,
        ))
    }

    fn recode_with_ffmpeg(&self, source: &MaterializedFile, use_vad: bool) -> Result<(Vec<u8>, f64)> {
        let src = source.path();
        if !self.probe.has_audio_stream(src)? {
            return Err(ExtractError::NoAudioStream {
                path: PathBuf::from(source.url()),
            });
        }

        let profile = self.profile(src)?;
        let chain = FilterChain::for_profile(&profile, use_vad, &self.config, &self.rnnoise_model);
        debug!(
            "{}: mean {:.1} dBFS, needs_gain={}, filters {}",
            source.url(),
            profile.mean_volume_dbfs,
            profile.needs_gain,
            chain
        );

        let out = ScratchFile::new(".mp3")?;
        recode_invocation(&self.ffmpeg, src, &chain, &self.config, out.path()).run()?;
        let mp3 = out.read()?;
        let duration = self.probe.duration_secs(out.path());
        // The scratch name can be reused once the file is gone.
        self.caches.forget_path(out.path());
        Ok((mp3, duration?))
    }
}

/// `ffmpeg -y -i <src> -vn -ar <rate> -ac 1 -af <chain> -c:a libmp3lame -b:a <kbps>k <dst>`
pub fn recode_invocation(
    ffmpeg: &Path,
    src: &Path,
    chain: &FilterChain,
    config: &AudioConfig,
    dst: &Path,
) -> Invocation {
    Invocation::new(ffmpeg)
        .args(["-y", "-i"])
        .arg(src)
        .args(["-vn", "-ar"])
        .arg(config.sample_rate.to_string())
        .args(["-ac", "1", "-af"])
        .arg(chain.render())
        .args(["-c:a", "libmp3lame", "-b:a"])
        .arg(format!("{}k", config.bitrate_kbps))
        .arg(dst)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recode_arguments() {
        let config = AudioConfig::default();
        let profile = AudioProfile::new(None, -20.0, config.gain_threshold_dbfs);
        let chain = FilterChain::for_profile(&profile, false, &config, Path::new("/m.rnn"));
        let inv = recode_invocation(
            Path::new("ffmpeg"),
            Path::new("/tmp/in"),
            &chain,
            &config,
            Path::new("/tmp/out.mp3"),
        );
        assert_eq!(
            inv.args_lossy(),
            [
                "-y", "-i", "/tmp/in", "-vn", "-ar", "16000", "-ac", "1", "-af",
                "highpass=f=80", "-c:a", "libmp3lame", "-b:a", "64k", "/tmp/out.mp3"
            ]
        );
    }
}
