//! ffmpeg `-af` filter chain for speech normalisation.

use crate::config::AudioConfig;
use crate::output::AudioProfile;
use std::path::Path;

/// Loudness normalisation applied to quiet sources.
pub const LOUDNORM: &str = "loudnorm=I=-16:LRA=11:TP=-1.5";

/// Peak-detection silence trimming at both ends (voice activity).
pub const VAD_FILTER: &str = "silenceremove=\
start_periods=1:start_duration=0:\
start_threshold=-45dB:\
stop_periods=1:stop_duration=0.4:\
stop_threshold=-45dB:\
detection=peak";

/// Ordered list of ffmpeg audio filters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterChain {
    filters: Vec<String>,
}

impl FilterChain {
    /// High-pass always; loudnorm and RNNoise denoise when the profile needs
    /// gain; silence removal when `use_vad` is set.
    pub fn for_profile(
        profile: &AudioProfile,
        use_vad: bool,
        config: &AudioConfig,
        rnnoise_model: &Path,
    ) -> Self {
        let mut filters = vec![format!("highpass=f={}", config.highpass_hz)];
        if profile.needs_gain {
            filters.push(LOUDNORM.to_string());
            filters.push(format!("arnndn=m={}", rnnoise_model.display()));
        }
        if use_vad {
            filters.push(VAD_FILTER.to_string());
        }
        Self { filters }
    }

    pub fn filters(&self) -> &[String] {
        &self.filters
    }

    /// The comma-joined value passed to `-af`.
    pub fn render(&self) -> String {
        self.filters.join(",")
    }
}

impl std::fmt::Display for FilterChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.render())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MODEL: &str = "/usr/local/share/rnnoise-model.rnn";

    fn chain(mean_dbfs: f64, vad: bool) -> String {
        let config = AudioConfig::default();
        let profile = AudioProfile::new(Some(10.0), mean_dbfs, config.gain_threshold_dbfs);
        FilterChain::for_profile(&profile, vad, &config, Path::new(MODEL)).render()
    }

    #[test]
    fn quiet_source_gets_gain_and_denoise() {
        assert_eq!(
            chain(-40.0, false),
            "highpass=f=80,loudnorm=I=-16:LRA=11:TP=-1.5,arnndn=m=/usr/local/share/rnnoise-model.rnn"
        );
    }

    #[test]
    fn loud_source_only_gets_highpass() {
        assert_eq!(chain(-20.0, false), "highpass=f=80");
    }

    #[test]
    fn vad_is_appended_last() {
        assert_eq!(
            chain(-20.0, true),
            "highpass=f=80,silenceremove=start_periods=1:start_duration=0:start_threshold=-45dB:\
stop_periods=1:stop_duration=0.4:stop_threshold=-45dB:detection=peak"
        );
        assert!(chain(-40.0, true).ends_with("detection=peak"));
    }
}
