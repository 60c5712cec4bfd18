//! Audio normalisation for speech recognition.
//!
//! [`AudioNormalizer`] turns any audio or video URL into a 16 kHz mono
//! 64 kbps MP3. ffmpeg does the work when it can; the [`fallback`] module
//! decodes and encodes in-process when it cannot.

pub mod fallback;
pub mod filters;
pub mod mp3;
pub mod normalize;

pub use filters::FilterChain;
pub use mp3::{accumulate_mp3, mp3_duration, mp3_to_data_uri, Mp3Source};
pub use normalize::AudioNormalizer;
