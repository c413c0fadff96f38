//! In-flight stream registry
//!
//! Concurrent map from stream id to record with sliding idle expiration.
//! Expiry is enforced two ways: lazily on lookup, and by a background
//! sweeper, so a stalled sweeper can never resurrect a dead stream. The
//! eviction path (idle timeout or explicit remove) closes the temp file
//! handle and deletes the file from disk exactly once, guarded by the
//! record's phase transition.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::fs::OpenOptions;
use tokio::sync::RwLock;

use crate::hooks::{HookBus, UploadEvent};

use super::types::{random_id, UploadError, UploadStream, STREAM_ID_LENGTH};

/// Registry of in-flight upload streams.
#[derive(Clone)]
pub struct StreamRegistry {
    inner: Arc<RegistryInner>,
}

struct RegistryInner {
    streams: RwLock<HashMap<String, Arc<UploadStream>>>,
    upload_dir: PathBuf,
    idle_timeout: Duration,
    hooks: HookBus,
}

impl StreamRegistry {
    pub async fn new(
        upload_dir: impl Into<PathBuf>,
        idle_timeout: Duration,
        hooks: HookBus,
    ) -> Result<Self, UploadError> {
        let upload_dir = upload_dir.into();
        tokio::fs::create_dir_all(&upload_dir).await?;
        Ok(Self {
            inner: Arc::new(RegistryInner {
                streams: RwLock::new(HashMap::new()),
                upload_dir,
                idle_timeout,
                hooks,
            }),
        })
    }

    pub fn idle_timeout(&self) -> Duration {
        self.inner.idle_timeout
    }

    pub fn upload_dir(&self) -> &Path {
        &self.inner.upload_dir
    }

    /// Backing temp file for an in-flight stream.
    pub fn temp_path(&self, stream_id: &str) -> PathBuf {
        self.inner.upload_dir.join(format!("{}.tmp", stream_id))
    }

    /// Durable location a finalized stream's file is promoted to.
    pub fn final_path(&self, stream_id: &str) -> PathBuf {
        self.inner.upload_dir.join(format!("{}.upload", stream_id))
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Open a new stream: fresh id, backing temp file, fresh hasher session.
    ///
    /// Id collisions at 32 random alphanumeric chars are negligible; an
    /// insert simply replaces any stale record under the same key.
    pub async fn create(
        &self,
        extension: &str,
        name: Option<String>,
    ) -> Result<String, UploadError> {
        let stream_id = random_id(STREAM_ID_LENGTH);
        let file = OpenOptions::new()
            .create(true)
            .truncate(true)
            .read(true)
            .write(true)
            .open(self.temp_path(&stream_id))
            .await?;

        let record = Arc::new(UploadStream::new(
            stream_id.clone(),
            extension.to_string(),
            name.clone(),
            file,
        ));

        self.inner
            .streams
            .write()
            .await
            .insert(stream_id.clone(), record);

        tracing::info!(
            stream_id = %stream_id,
            extension = %extension,
            "Upload stream created"
        );

        self.inner.hooks.publish(UploadEvent::StreamCreated {
            stream_id: stream_id.clone(),
            extension: extension.to_string(),
            name,
        });

        Ok(stream_id)
    }

    /// Fetch a live record, refreshing its idle clock.
    ///
    /// A record past its idle window is evicted on the spot and reported
    /// as absent.
    pub async fn lookup(&self, stream_id: &str) -> Option<Arc<UploadStream>> {
        let record = self.inner.streams.read().await.get(stream_id).cloned()?;

        if record.is_idle_expired(self.inner.idle_timeout) {
            self.evict(record).await;
            return None;
        }

        record.touch();
        Some(record)
    }

    /// Explicit termination. Idempotent: removing an unknown or already
    /// expired id is a no-op.
    pub async fn remove(&self, stream_id: &str) -> bool {
        let record = match self.inner.streams.read().await.get(stream_id).cloned() {
            Some(record) => record,
            None => return false,
        };
        self.evict(record).await
    }

    /// Evict every stream past its idle window. Returns how many died.
    pub async fn sweep(&self) -> usize {
        let expired: Vec<Arc<UploadStream>> = {
            let streams = self.inner.streams.read().await;
            streams
                .values()
                .filter(|r| r.is_idle_expired(self.inner.idle_timeout))
                .cloned()
                .collect()
        };

        let mut evicted = 0;
        for record in expired {
            if self.evict(record).await {
                evicted += 1;
            }
        }

        if evicted > 0 {
            tracing::info!(count = evicted, "Swept idle upload streams");
        }
        evicted
    }

    /// Background sweeper ticking at a quarter of the idle timeout.
    pub fn start_sweeper(&self) -> tokio::task::JoinHandle<()> {
        let registry = self.clone();
        tokio::spawn(async move {
            let period = (registry.inner.idle_timeout / 4).max(Duration::from_secs(1));
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                registry.sweep().await;
            }
        })
    }

    /// Remove a record from the map without running eviction cleanup.
    /// Used by finalize once ownership of the file has transferred.
    pub(crate) async fn detach(&self, record: &UploadStream) {
        self.inner.streams.write().await.remove(&record.stream_id);
    }

    /// Eviction callback: close the file handle, delete the temp file.
    ///
    /// The `Open -> Closed` CAS makes this run at most once per record and
    /// never concurrently with finalize, which holds `Finalizing`.
    async fn evict(&self, record: Arc<UploadStream>) -> bool {
        if !record.try_close() {
            return false;
        }

        self.inner.streams.write().await.remove(&record.stream_id);

        {
            let mut state = record.state.lock().await;
            state.file.take();
            state.hasher.take();
        }

        let path = self.temp_path(&record.stream_id);
        if let Err(e) = tokio::fs::remove_file(&path).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(stream_id = %record.stream_id, error = %e, "Failed to delete temp file");
            }
        }

        tracing::debug!(stream_id = %record.stream_id, "Upload stream evicted");
        true
    }
}

/// Remove leftover `*.tmp` files from streams that died with a previous
/// process. Part of the boot sequence, not of normal operation.
pub async fn sweep_stale_temp_files(upload_dir: &Path) -> std::io::Result<usize> {
    let mut removed = 0;
    let mut entries = match tokio::fs::read_dir(upload_dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e),
    };

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().is_some_and(|ext| ext == "tmp") {
            tokio::fs::remove_file(&path).await?;
            removed += 1;
        }
    }

    if removed > 0 {
        tracing::info!(count = removed, "Removed stale temp files from previous run");
    }
    Ok(removed)
}
