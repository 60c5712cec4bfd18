//! Memoisation caches injected into each pipeline stage.
//!
//! Every expensive, pure-by-argument operation (fetch, loudness and duration
//! probes, recognition of a given image, whole-item results) is memoised in a
//! [`MemoCache`], a thin wrapper over [`moka::sync::Cache`] configured from
//! [`CacheConfig`] with a TTL, a capacity and an explicit eviction policy.
//!
//! Entries that point at scratch files must be dropped when the file goes
//! away. [`PipelineCaches::forget_path`] and [`PipelineCaches::forget_url`]
//! are the two invalidation hooks the temp-file guard calls on deletion.

use crate::config::{CacheConfig, EvictionKind};
use crate::fetch::Fetched;
use crate::ocr::{Recognition, RecognitionKey};
use crate::output::{ExtractionResult, FrameSample, NormalizedAudio};
use moka::notification::RemovalCause;
use moka::policy::EvictionPolicy;
use moka::sync::{Cache, CacheBuilder};
use std::hash::Hash;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace, warn};

/// A named, optionally disabled memoisation cache.
///
/// Cloning is cheap and clones share storage.
#[derive(Clone)]
pub struct MemoCache<K, V> {
    name: &'static str,
    inner: Option<Cache<K, V>>,
}

impl<K, V> MemoCache<K, V>
where
    K: Hash + Eq + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Build a cache from the shared configuration.
    pub fn new(name: &'static str, config: &CacheConfig) -> Self {
        if !config.enabled {
            return Self::disabled(name);
        }
        Self {
            name,
            inner: Some(Self::configured(name, config).build()),
        }
    }

    /// Like [`MemoCache::new`], calling `on_evict` for every entry dropped
    /// by capacity or TTL. Invalidated and replaced entries are not reported.
    pub fn with_eviction_listener(
        name: &'static str,
        config: &CacheConfig,
        on_evict: impl Fn(&K, V) + Send + Sync + 'static,
    ) -> Self {
        if !config.enabled {
            return Self::disabled(name);
        }
        let cache = Self::configured(name, config)
            .eviction_listener(move |key: Arc<K>, value: V, cause: RemovalCause| {
                if cause.was_evicted() {
                    trace!(cache = name, ?cause, "entry evicted");
                    on_evict(&key, value);
                }
            })
            .build();
        Self {
            name,
            inner: Some(cache),
        }
    }

    fn configured(name: &'static str, config: &CacheConfig) -> CacheBuilder<K, V, Cache<K, V>> {
        let policy = match config.eviction {
            EvictionKind::Lru => EvictionPolicy::lru(),
            EvictionKind::TinyLfu => EvictionPolicy::tiny_lfu(),
        };
        let mut builder = Cache::builder()
            .name(name)
            .max_capacity(config.max_entries)
            .eviction_policy(policy);
        if let Some(ttl) = config.ttl_secs.filter(|t| *t > 0) {
            builder = builder.time_to_live(Duration::from_secs(ttl));
        }

        debug!(
            cache = name,
            max_entries = config.max_entries,
            ttl_secs = ?config.ttl_secs,
            eviction = ?config.eviction,
            "Cache initialised"
        );
        builder
    }

    /// A cache where every lookup misses and every insert is dropped.
    pub fn disabled(name: &'static str) -> Self {
        Self { name, inner: None }
    }

    pub fn get(&self, key: &K) -> Option<V> {
        let hit = self.inner.as_ref()?.get(key);
        trace!(cache = self.name, hit = hit.is_some(), "lookup");
        hit
    }

    pub fn insert(&self, key: K, value: V) {
        if let Some(cache) = &self.inner {
            cache.insert(key, value);
        }
    }

    pub fn invalidate(&self, key: &K) {
        if let Some(cache) = &self.inner {
            cache.invalidate(key);
        }
    }

    /// Apply pending evictions now instead of on a later write.
    pub fn run_pending_tasks(&self) {
        if let Some(cache) = &self.inner {
            cache.run_pending_tasks();
        }
    }

    /// Return the cached value or compute, store and return it.
    ///
    /// Errors are never cached.
    pub fn get_or_try_insert<E>(
        &self,
        key: K,
        compute: impl FnOnce() -> Result<V, E>,
    ) -> Result<V, E> {
        if let Some(hit) = self.get(&key) {
            return Ok(hit);
        }
        let value = compute()?;
        self.insert(key, value.clone());
        Ok(value)
    }
}

/// Key for memoised audio results: `(url, use_vad, delete_tmp)`.
pub type AudioKey = (String, bool, bool);

/// Key for memoised frame samples: `(url, max_frames, delete_tmp)`.
pub type VideoKey = (String, usize, bool);

/// Every cache the pipelines use, shared behind an `Arc`.
pub struct PipelineCaches {
    /// URL → fetched bytes and headers.
    pub fetch: MemoCache<String, Fetched>,
    /// URL → scratch file retained by a previous call (`delete_tmp = false`).
    pub retained: MemoCache<String, PathBuf>,
    /// Path → "has at least one audio stream".
    pub has_audio: MemoCache<PathBuf, bool>,
    /// Path → mean volume in dBFS.
    pub mean_volume: MemoCache<PathBuf, f64>,
    /// Path → container duration in seconds.
    pub duration: MemoCache<PathBuf, f64>,
    /// Preprocessed image + options → recognition.
    pub recognition: MemoCache<RecognitionKey, Recognition>,
    /// URL → document extraction result.
    pub documents: MemoCache<String, ExtractionResult>,
    /// Normalised audio results.
    pub audio: MemoCache<AudioKey, NormalizedAudio>,
    /// Sampled video frames.
    pub video: MemoCache<VideoKey, Arc<Vec<FrameSample>>>,
}

impl PipelineCaches {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            fetch: MemoCache::new("fetch", config),
            retained: MemoCache::with_eviction_listener("retained", config, remove_evicted_file),
            has_audio: MemoCache::new("has_audio", config),
            mean_volume: MemoCache::new("mean_volume", config),
            duration: MemoCache::new("duration", config),
            recognition: MemoCache::new("recognition", config),
            documents: MemoCache::new("documents", config),
            audio: MemoCache::new("audio", config),
            video: MemoCache::new("video", config),
        }
    }

    /// Drop every probe result computed against `path`.
    pub fn forget_path(&self, path: &Path) {
        let key = path.to_path_buf();
        self.has_audio.invalidate(&key);
        self.mean_volume.invalidate(&key);
        self.duration.invalidate(&key);
        trace!(path = %path.display(), "probe cache entries invalidated");
    }

    /// Drop the fetch and retained-file entries for `url`.
    pub fn forget_url(&self, url: &str) {
        let key = url.to_string();
        self.fetch.invalidate(&key);
        self.retained.invalidate(&key);
        trace!(url, "url cache entries invalidated");
    }
}

/// A retained scratch file whose entry has aged out is unreachable.
fn remove_evicted_file(url: &String, path: PathBuf) {
    match std::fs::remove_file(&path) {
        Ok(()) => debug!("Removed evicted retained input {} for {}", path.display(), url),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Could not remove evicted {}: {}", path.display(), e),
    }
}
