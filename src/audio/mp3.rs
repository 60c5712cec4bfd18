//! Helpers for MP3 payloads already in memory.

use super::fallback::decode_hinted;
use crate::error::Result;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::io::Cursor;

/// Prefix of every data URI produced by [`mp3_to_data_uri`].
pub const DATA_URI_PREFIX: &str = "data:audio/mp3;base64,";

/// The shapes an MP3 payload arrives in.
pub enum Mp3Source {
    /// A seekable in-memory buffer; its whole contents are used regardless
    /// of the current position.
    Buffer(Cursor<Vec<u8>>),
    Bytes(Vec<u8>),
    /// A stream of chunks, e.g. from a speech synthesis response.
    Chunks(Box<dyn Iterator<Item = Vec<u8>> + Send>),
}

impl Mp3Source {
    pub fn into_bytes(self) -> Vec<u8> {
        match self {
            Mp3Source::Buffer(cursor) => cursor.into_inner(),
            Mp3Source::Bytes(bytes) => bytes,
            Mp3Source::Chunks(chunks) => concat_chunks(chunks),
        }
    }
}

impl std::fmt::Debug for Mp3Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Mp3Source::Buffer(c) => write!(f, "Buffer({} bytes)", c.get_ref().len()),
            Mp3Source::Bytes(b) => write!(f, "Bytes({} bytes)", b.len()),
            Mp3Source::Chunks(_) => f.write_str("Chunks(..)"),
        }
    }
}

fn concat_chunks(chunks: impl Iterator<Item = Vec<u8>>) -> Vec<u8> {
    let mut out = Vec::new();
    for chunk in chunks.filter(|c| !c.is_empty()) {
        out.extend_from_slice(&chunk);
    }
    out
}

/// Playback duration of an MP3 in seconds, from its decoded sample count.
pub fn mp3_duration(bytes: &[u8]) -> Result<f64> {
    Ok(decode_hinted(bytes, Some("mp3"))?.duration_secs())
}

/// Concatenate streamed chunks and measure the result.
pub fn accumulate_mp3(chunks: impl IntoIterator<Item = Vec<u8>>) -> Result<(Vec<u8>, f64)> {
    let bytes = concat_chunks(chunks.into_iter());
    let duration = mp3_duration(&bytes)?;
    Ok((bytes, duration))
}

/// `data:audio/mp3;base64,…` URI plus the duration of the payload.
pub fn mp3_to_data_uri(source: Mp3Source) -> Result<(String, f64)> {
    let bytes = source.into_bytes();
    let duration = mp3_duration(&bytes)?;
    Ok((format!("{DATA_URI_PREFIX}{}", STANDARD.encode(&bytes)), duration))
}
