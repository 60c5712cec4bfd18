//! Parallel processing of independent media items.
//!
//! The pipelines are synchronous, so each job runs on tokio's blocking pool
//! via `spawn_blocking`; `buffer_unordered` bounds how many are in flight.
//! Results come back in input order regardless of completion order.

use crate::error::ExtractError;
use crate::extractor::{ImageText, MediaExtractor};
use crate::output::{ExtractionResult, FrameSample, NormalizedAudio};
use crate::progress::ProgressCallback;
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

/// One unit of work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum MediaJob {
    Document {
        url: String,
    },
    Image {
        url: String,
    },
    Audio {
        url: String,
        #[serde(default)]
        use_vad: bool,
        #[serde(default = "default_true")]
        delete_tmp: bool,
    },
    Video {
        url: String,
        #[serde(default = "default_max_frames")]
        max_frames: usize,
        #[serde(default = "default_true")]
        delete_tmp: bool,
    },
}

fn default_true() -> bool {
    true
}

fn default_max_frames() -> usize {
    crate::video::DEFAULT_MAX_FRAMES
}

impl MediaJob {
    pub fn url(&self) -> &str {
        match self {
            MediaJob::Document { url }
            | MediaJob::Image { url }
            | MediaJob::Audio { url, .. }
            | MediaJob::Video { url, .. } => url,
        }
    }

    fn run(&self, extractor: &MediaExtractor) -> Result<JobOutput, ExtractError> {
        Ok(match self {
            MediaJob::Document { url } => JobOutput::Document(extractor.extract_document(url)?),
            MediaJob::Image { url } => JobOutput::Image(extractor.recognize_image(url)?),
            MediaJob::Audio {
                url,
                use_vad,
                delete_tmp,
            } => JobOutput::Audio(extractor.normalize_audio(url, *use_vad, *delete_tmp)?),
            MediaJob::Video {
                url,
                max_frames,
                delete_tmp,
            } => JobOutput::Video(
                extractor
                    .sample_video(url, *max_frames, *delete_tmp)?
                    .as_ref()
                    .clone(),
            ),
        })
    }
}

/// What a successful job produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "output", rename_all = "lowercase")]
pub enum JobOutput {
    Document(ExtractionResult),
    Image(ImageText),
    Audio(NormalizedAudio),
    Video(Vec<FrameSample>),
}

impl JobOutput {
    /// Bytes of text or media produced, for progress reporting.
    pub fn len(&self) -> usize {
        match self {
            JobOutput::Document(r) => r.text.as_ref().map_or(0, String::len),
            JobOutput::Image(t) => t.text.len(),
            JobOutput::Audio(a) => a.mp3.len(),
            JobOutput::Video(frames) => frames.iter().map(|f| f.jpeg.len()).sum(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Outcome of one job, in input position `index`.
#[derive(Debug)]
pub struct JobResult {
    pub index: usize,
    pub job: MediaJob,
    pub output: Result<JobOutput, ExtractError>,
}

/// Run `jobs` with at most `concurrency` in flight.
pub async fn process_batch(
    extractor: Arc<MediaExtractor>,
    jobs: Vec<MediaJob>,
    concurrency: usize,
    callback: Option<ProgressCallback>,
) -> Vec<JobResult> {
    let total = jobs.len();
    if let Some(cb) = &callback {
        cb.on_batch_start(total);
    }
    info!("Processing {} item(s), concurrency {}", total, concurrency.max(1));

    let mut results: Vec<JobResult> = stream::iter(jobs.into_iter().enumerate().map(|(index, job)| {
        let extractor = Arc::clone(&extractor);
        let callback = callback.clone();
        async move {
            if let Some(cb) = &callback {
                cb.on_item_start(index, total);
            }
            let task_job = job.clone();
            let output = tokio::task::spawn_blocking(move || task_job.run(&extractor))
                .await
                .unwrap_or_else(|e| Err(ExtractError::Internal(format!("worker panicked: {e}"))));

            match &output {
                Ok(out) => {
                    if let Some(cb) = &callback {
                        cb.on_item_complete(index, total, out.len());
                    }
                }
                Err(e) => {
                    warn!("{} failed: {}", job.url(), e);
                    if let Some(cb) = &callback {
                        cb.on_item_error(index, total, &e.to_string());
                    }
                }
            }
            JobResult { index, job, output }
        }
    }))
    .buffer_unordered(concurrency.max(1))
    .collect()
    .await;

    results.sort_by_key(|r| r.index);

    let succeeded = results.iter().filter(|r| r.output.is_ok()).count();
    if let Some(cb) = &callback {
        cb.on_batch_complete(total, succeeded);
    }
    info!("Batch done: {}/{} succeeded", succeeded, total);
    results
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jobs_deserialize_with_defaults() {
        let job: MediaJob =
            serde_json::from_str(r#"{"kind":"video","url":"https://x/v.mp4"}"#).unwrap();
        assert_eq!(
            job,
            MediaJob::Video {
                url: "https://x/v.mp4".into(),
                max_frames: 3,
                delete_tmp: true,
            }
        );
        let job: MediaJob =
            serde_json::from_str(r#"{"kind":"audio","url":"a.ogg","use_vad":true}"#).unwrap();
        assert_eq!(job.url(), "a.ogg");
    }

    #[test]
    fn output_len_counts_payload() {
        let out = JobOutput::Document(ExtractionResult::text(
            crate::document::DocumentKind::PlainText,
            "hello",
        ));
        assert_eq!(out.len(), 5);
        assert!(!out.is_empty());
    }
}
