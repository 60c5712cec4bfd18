//! Batch runner: ordering, isolation of failures, progress callbacks.

mod common;

use common::{offline_config, FakeFetcher, FnRecognizer};
use edgequake_extract::{
    process_batch, ExtractionProgressCallback, JobOutput, MediaExtractor, MediaJob,
    ProgressCallback,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct Recorder {
    started: AtomicUsize,
    completed: AtomicUsize,
    errors: AtomicUsize,
    finished: Mutex<Option<(usize, usize)>>,
}

impl ExtractionProgressCallback for Recorder {
    fn on_item_start(&self, _index: usize, _total: usize) {
        self.started.fetch_add(1, Ordering::SeqCst);
    }

    fn on_item_complete(&self, _index: usize, _total: usize, _output_len: usize) {
        self.completed.fetch_add(1, Ordering::SeqCst);
    }

    fn on_item_error(&self, _index: usize, _total: usize, _error: &str) {
        self.errors.fetch_add(1, Ordering::SeqCst);
    }

    fn on_batch_complete(&self, total: usize, success_count: usize) {
        *self.finished.lock().unwrap() = Some((total, success_count));
    }
}

fn doc(url: &str) -> MediaJob {
    MediaJob::Document {
        url: url.to_string(),
    }
}

#[tokio::test]
async fn results_keep_input_order_and_failures_stay_local() {
    let mut fetcher = FakeFetcher::default();
    for i in 0..6 {
        fetcher = fetcher.with(&format!("https://x/{i}.txt"), format!("doc {i}"), "text/plain");
    }
    let extractor = Arc::new(
        MediaExtractor::with_components(
            offline_config(),
            Arc::new(fetcher),
            Arc::new(FnRecognizer::constant("", 0.0)),
        )
        .unwrap(),
    );

    let mut jobs: Vec<MediaJob> = (0..6).map(|i| doc(&format!("https://x/{i}.txt"))).collect();
    jobs.insert(3, doc("https://x/missing.txt"));

    let recorder = Arc::new(Recorder::default());
    let results = process_batch(extractor, jobs, 3, Some(recorder.clone() as ProgressCallback)).await;

    assert_eq!(results.len(), 7);
    for (i, r) in results.iter().enumerate() {
        assert_eq!(r.index, i);
    }
    assert!(results[3].output.is_err());

    match &results[4].output {
        Ok(JobOutput::Document(d)) => assert_eq!(d.text.as_deref(), Some("doc 3")),
        other => panic!("unexpected output: {other:?}"),
    }

    assert_eq!(recorder.started.load(Ordering::SeqCst), 7);
    assert_eq!(recorder.completed.load(Ordering::SeqCst), 6);
    assert_eq!(recorder.errors.load(Ordering::SeqCst), 1);
    assert_eq!(*recorder.finished.lock().unwrap(), Some((7, 6)));
}

#[tokio::test]
async fn zero_concurrency_still_runs() {
    let fetcher = FakeFetcher::default().with("https://x/a.txt", "a", "text/plain");
    let extractor = Arc::new(
        MediaExtractor::with_components(
            offline_config(),
            Arc::new(fetcher),
            Arc::new(FnRecognizer::constant("", 0.0)),
        )
        .unwrap(),
    );
    let results = process_batch(extractor, vec![doc("https://x/a.txt")], 0, None).await;
    assert_eq!(results.len(), 1);
    assert!(results[0].output.is_ok());
}

#[tokio::test]
async fn empty_batch_reports_completion() {
    let extractor = Arc::new(
        MediaExtractor::with_components(
            offline_config(),
            Arc::new(FakeFetcher::default()),
            Arc::new(FnRecognizer::constant("", 0.0)),
        )
        .unwrap(),
    );
    let recorder = Arc::new(Recorder::default());
    let results = process_batch(extractor, Vec::new(), 4, Some(recorder.clone() as ProgressCallback)).await;
    assert!(results.is_empty());
    assert_eq!(*recorder.finished.lock().unwrap(), Some((0, 0)));
}
