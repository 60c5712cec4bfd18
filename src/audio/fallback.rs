//! In-process transcoding used when the ffmpeg path fails.
//!
//! ```text
//! bytes ──▶ symphonia decode ──▶ mono downmix ──▶ rubato resample ──▶ LAME CBR
//! ```
//!
//! No filters are applied here: the fallback trades speech clean-up for
//! not depending on any external binary.

use crate::error::{ExtractError, Result};
use mp3lame_encoder::{Bitrate, Builder, FlushNoGap, MonoPcm, Quality};
use rubato::{FftFixedIn, Resampler};
use std::io::Cursor;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::{debug, warn};

const RESAMPLE_CHUNK: usize = 1024;

/// Mono PCM in `[-1.0, 1.0]`.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedAudio {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl DecodedAudio {
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

/// Decode the first audio track of any container symphonia understands and
/// average its channels into one.
pub fn decode_to_mono(bytes: &[u8]) -> Result<DecodedAudio> {
    decode_hinted(bytes, None)
}

/// [`decode_to_mono`] with a file-extension hint for the container probe.
pub fn decode_hinted(bytes: &[u8], extension: Option<&str>) -> Result<DecodedAudio> {
    let mut hint = Hint::new();
    if let Some(ext) = extension {
        hint.with_extension(ext);
    }
    let mss = MediaSourceStream::new(Box::new(Cursor::new(bytes.to_vec())), Default::default());
    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| ExtractError::AudioDecode(format!("unrecognised container: {e}")))?;
    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| ExtractError::AudioDecode("no decodable audio track".into()))?;
    let track_id = track.id;
    let mut sample_rate = track.codec_params.sample_rate.unwrap_or(0);
    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| ExtractError::AudioDecode(format!("unsupported codec: {e}")))?;

    let mut samples = Vec::new();
    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => return Err(ExtractError::AudioDecode(e.to_string())),
        };
        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(SymphoniaError::DecodeError(e)) => {
                warn!("Skipping undecodable packet: {}", e);
                continue;
            }
            Err(e) => return Err(ExtractError::AudioDecode(e.to_string())),
        };

        let spec = *decoded.spec();
        sample_rate = spec.rate;
        let channels = spec.channels.count().max(1);
        let mut buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
        buf.copy_interleaved_ref(decoded);
        samples.extend(
            buf.samples()
                .chunks(channels)
                .map(|frame| frame.iter().sum::<f32>() / channels as f32),
        );
    }

    if samples.is_empty() || sample_rate == 0 {
        return Err(ExtractError::AudioDecode("no audio samples decoded".into()));
    }
    debug!(
        "Decoded {} mono samples at {} Hz",
        samples.len(),
        sample_rate
    );
    Ok(DecodedAudio {
        samples,
        sample_rate,
    })
}

/// Resample mono PCM. The output length is `len * to / from`, rounded.
pub fn resample(samples: &[f32], from: u32, to: u32) -> Result<Vec<f32>> {
    if from == to || samples.is_empty() {
        return Ok(samples.to_vec());
    }
    let expected = (samples.len() as f64 * to as f64 / from as f64).round() as usize;

    let mut resampler = FftFixedIn::<f32>::new(from as usize, to as usize, RESAMPLE_CHUNK, 2, 1)
        .map_err(|e| ExtractError::AudioDecode(format!("resampler setup: {e}")))?;
    let delay = resampler.output_delay();
    let mut out: Vec<f32> = Vec::with_capacity(expected + delay + RESAMPLE_CHUNK);

    let mut pos = 0;
    while samples.len() - pos >= resampler.input_frames_next() {
        let need = resampler.input_frames_next();
        let wave: [&[f32]; 1] = [&samples[pos..pos + need]];
        let chunk = resampler
            .process(&wave[..], None)
            .map_err(|e| ExtractError::AudioDecode(format!("resample: {e}")))?;
        out.extend_from_slice(&chunk[0]);
        pos += need;
    }
    if pos < samples.len() {
        let wave: [&[f32]; 1] = [&samples[pos..]];
        let chunk = resampler
            .process_partial(Some(&wave[..]), None)
            .map_err(|e| ExtractError::AudioDecode(format!("resample: {e}")))?;
        out.extend_from_slice(&chunk[0]);
    }
    // Drain the filter delay.
    while out.len() < expected + delay {
        let chunk = resampler
            .process_partial::<&[f32]>(None, None)
            .map_err(|e| ExtractError::AudioDecode(format!("resample: {e}")))?;
        if chunk[0].is_empty() {
            break;
        }
        out.extend_from_slice(&chunk[0]);
    }

    let mut out = out.split_off(delay.min(out.len()));
    out.truncate(expected);
    Ok(out)
}

/// Encode mono PCM as constant-bitrate MP3.
pub fn encode_mp3(samples: &[f32], sample_rate: u32, bitrate_kbps: u32) -> Result<Vec<u8>> {
    let bitrate = lame_bitrate(bitrate_kbps)?;
    let mut builder =
        Builder::new().ok_or_else(|| ExtractError::AudioEncode("LAME unavailable".into()))?;
    builder
        .set_num_channels(1)
        .map_err(|e| ExtractError::AudioEncode(format!("{e:?}")))?;
    builder
        .set_sample_rate(sample_rate)
        .map_err(|e| ExtractError::AudioEncode(format!("{e:?}")))?;
    builder
        .set_brate(bitrate)
        .map_err(|e| ExtractError::AudioEncode(format!("{e:?}")))?;
    builder
        .set_quality(Quality::Good)
        .map_err(|e| ExtractError::AudioEncode(format!("{e:?}")))?;
    let mut encoder = builder
        .build()
        .map_err(|e| ExtractError::AudioEncode(format!("{e:?}")))?;

    let pcm: Vec<i16> = samples
        .iter()
        .map(|s| (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)
        .collect();

    let mut mp3 = Vec::with_capacity(mp3lame_encoder::max_required_buffer_size(pcm.len()) + 7200);
    encoder
        .encode_to_vec(MonoPcm(&pcm), &mut mp3)
        .map_err(|e| ExtractError::AudioEncode(format!("{e:?}")))?;
    mp3.reserve(7200);
    encoder
        .flush_to_vec::<FlushNoGap>(&mut mp3)
        .map_err(|e| ExtractError::AudioEncode(format!("{e:?}")))?;
    Ok(mp3)
}

fn lame_bitrate(kbps: u32) -> Result<Bitrate> {
    Ok(match kbps {
        8 => Bitrate::Kbps8,
        16 => Bitrate::Kbps16,
        24 => Bitrate::Kbps24,
        32 => Bitrate::Kbps32,
        40 => Bitrate::Kbps40,
        48 => Bitrate::Kbps48,
        64 => Bitrate::Kbps64,
        80 => Bitrate::Kbps80,
        96 => Bitrate::Kbps96,
        112 => Bitrate::Kbps112,
        128 => Bitrate::Kbps128,
        160 => Bitrate::Kbps160,
        192 => Bitrate::Kbps192,
        224 => Bitrate::Kbps224,
        256 => Bitrate::Kbps256,
        320 => Bitrate::Kbps320,
        other => {
            return Err(ExtractError::AudioEncode(format!(
                "unsupported MP3 bitrate {other} kbps"
            )))
        }
    })
}

/// Decode, downmix, resample and encode. Returns the MP3 and its duration,
/// computed from the resampled sample count.
pub fn transcode(bytes: &[u8], sample_rate: u32, bitrate_kbps: u32) -> Result<(Vec<u8>, f64)> {
    let decoded = decode_to_mono(bytes)?;
    let pcm = resample(&decoded.samples, decoded.sample_rate, sample_rate)?;
    let duration = pcm.len() as f64 / sample_rate as f64;
    let mp3 = encode_mp3(&pcm, sample_rate, bitrate_kbps)?;
    debug!("Fallback transcode: {:.2}s, {} MP3 bytes", duration, mp3.len());
    Ok((mp3, duration))
}
