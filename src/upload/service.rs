//! Chunk ingestion pipeline and finalize/dedup transition
//!
//! Both transport bindings drive this service; it owns the ordering
//! invariant (file bytes and digest state advance together, per stream)
//! and the promotion of a completed stream into the durable item store.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use tokio::io::AsyncWriteExt;

use crate::db::{InsertOutcome, ItemStore};
use crate::hooks::{HookBus, UploadEvent};

use super::hasher::chunk_digest;
use super::registry::StreamRegistry;
use super::types::{random_id, UploadError, UploadStream, UploadedItem};

/// The upload engine: registry + pipeline + finalize, shared by the HTTP
/// and socket bindings.
#[derive(Clone)]
pub struct UploadService {
    registry: StreamRegistry,
    store: Arc<dyn ItemStore>,
    hooks: HookBus,
    id_length: usize,
    max_extension_length: usize,
}

impl UploadService {
    pub fn new(
        registry: StreamRegistry,
        store: Arc<dyn ItemStore>,
        hooks: HookBus,
        id_length: usize,
        max_extension_length: usize,
    ) -> Self {
        Self {
            registry,
            store,
            hooks,
            id_length,
            max_extension_length,
        }
    }

    pub fn registry(&self) -> &StreamRegistry {
        &self.registry
    }

    pub fn store(&self) -> &Arc<dyn ItemStore> {
        &self.store
    }

    // ========================================================================
    // Stream lifecycle
    // ========================================================================

    /// Open a new upload stream.
    pub async fn create_stream(
        &self,
        extension: &str,
        name: Option<String>,
    ) -> Result<String, UploadError> {
        if extension.len() > self.max_extension_length {
            return Err(UploadError::ExtensionTooLong {
                length: extension.len(),
                max: self.max_extension_length,
            });
        }
        self.registry.create(extension, name).await
    }

    /// Explicit termination; a no-op for unknown or already gone ids.
    pub async fn terminate(&self, stream_id: &str) -> bool {
        self.registry.remove(stream_id).await
    }

    // ========================================================================
    // Chunk ingestion
    // ========================================================================

    /// Append one chunk to a stream.
    ///
    /// With `expected_hash` set, the chunk's own digest is checked first and
    /// a mismatch returns `Ok(false)` without touching the temp file or the
    /// stream digest, so the client can retry the same chunk. On acceptance
    /// the bytes hit the file and the hasher as an ordered pair.
    pub async fn append_chunk(
        &self,
        record: &UploadStream,
        bytes: &[u8],
        expected_hash: Option<&str>,
    ) -> Result<bool, UploadError> {
        if let Some(expected) = expected_hash {
            let actual = chunk_digest(bytes);
            if !actual.eq_ignore_ascii_case(expected) {
                tracing::debug!(
                    stream_id = %record.stream_id,
                    expected = %expected,
                    actual = %actual,
                    "Rejected chunk with mismatched hash"
                );
                return Ok(false);
            }
        }

        {
            let mut guard = record.state.lock().await;
            let state = &mut *guard;

            let file = match state.file.as_mut() {
                Some(file) => file,
                // evicted underneath us; surface as absence
                None => return Err(UploadError::StreamNotFound(record.stream_id.clone())),
            };
            let hasher = match state.hasher.as_mut() {
                Some(hasher) => hasher,
                None => return Err(UploadError::StreamSealed(record.stream_id.clone())),
            };

            file.write_all(bytes).await?;
            hasher.append(bytes);
        }

        record.touch();
        self.hooks.publish(UploadEvent::ChunkReceived {
            stream_id: record.stream_id.clone(),
            size: bytes.len(),
        });

        Ok(true)
    }

    // ========================================================================
    // Finalization & dedup
    // ========================================================================

    /// Seal the stream digest and return it.
    ///
    /// Idempotent: the first call consumes the hasher session, later calls
    /// return the stored digest. Callers compare this against the digest
    /// the client declared before committing to [`Self::finalize`].
    pub async fn seal_digest(&self, record: &UploadStream) -> Result<String, UploadError> {
        let mut state = record.state.lock().await;
        if let Some(hash) = &state.finalized_hash {
            return Ok(hash.clone());
        }
        match state.hasher.take() {
            Some(hasher) => {
                let hash = hasher.finish();
                state.finalized_hash = Some(hash.clone());
                Ok(hash)
            }
            None => Err(UploadError::StreamNotFound(record.stream_id.clone())),
        }
    }

    /// Promote a completed stream into the durable store.
    ///
    /// Precondition (enforced by the bindings): the sealed digest matches
    /// the digest the client declared. Identical content always converges
    /// on one item id and one backing file; a store failure leaves the temp
    /// file in place and the stream registered, so the call is retryable.
    pub async fn finalize(&self, record: Arc<UploadStream>) -> Result<String, UploadError> {
        let hash = self.seal_digest(&record).await?;

        if !record.try_begin_finalize() {
            // already evicted, or another finalize owns the record
            return Err(UploadError::StreamNotFound(record.stream_id.clone()));
        }

        // close the temp file before any move or dedup decision
        {
            let mut state = record.state.lock().await;
            if let Some(mut file) = state.file.take() {
                if let Err(e) = file.flush().await {
                    record.abort_finalize();
                    return Err(e.into());
                }
            }
        }

        let existing = match self.store.find_by_hash(&hash).await {
            Ok(existing) => existing,
            Err(e) => {
                record.abort_finalize();
                return Err(e);
            }
        };

        let temp_path = self.registry.temp_path(&record.stream_id);

        if let Some(existing) = existing {
            // dedup hit: the bytes already live under another item
            self.registry.detach(&record).await;
            remove_quietly(&temp_path, &record.stream_id).await;
            record.complete_finalize();

            tracing::info!(
                stream_id = %record.stream_id,
                item_id = %existing.id,
                hash = %hash,
                "Finalize resolved to existing item"
            );
            return Ok(existing.id);
        }

        let final_path = self.registry.final_path(&record.stream_id);
        if let Err(e) = tokio::fs::rename(&temp_path, &final_path).await {
            record.abort_finalize();
            return Err(e.into());
        }

        let item = UploadedItem {
            id: random_id(self.id_length),
            stream_id: record.stream_id.clone(),
            extension: record.extension.clone(),
            name: record.name.clone(),
            hash: hash.clone(),
            created_at: Utc::now().to_rfc3339(),
        };

        match self.store.insert(&item).await {
            Ok(InsertOutcome::Inserted) => {
                self.registry.detach(&record).await;
                record.complete_finalize();

                tracing::info!(
                    stream_id = %record.stream_id,
                    item_id = %item.id,
                    hash = %hash,
                    "Upload stream finalized"
                );
                self.hooks.publish(UploadEvent::StreamFinalized { item: item.clone() });
                Ok(item.id)
            }
            Ok(InsertOutcome::DuplicateHash) => {
                // lost a same-hash race after our rename; converge on the winner
                match self.store.find_by_hash(&hash).await {
                    Ok(Some(winner)) => {
                        remove_quietly(&final_path, &record.stream_id).await;
                        self.registry.detach(&record).await;
                        record.complete_finalize();

                        tracing::info!(
                            stream_id = %record.stream_id,
                            item_id = %winner.id,
                            "Finalize lost same-hash race, resolved to winner"
                        );
                        Ok(winner.id)
                    }
                    Ok(None) => {
                        let _ = tokio::fs::rename(&final_path, &temp_path).await;
                        record.abort_finalize();
                        Err(UploadError::Store(
                            "duplicate hash reported but no winning row found".to_string(),
                        ))
                    }
                    Err(e) => {
                        let _ = tokio::fs::rename(&final_path, &temp_path).await;
                        record.abort_finalize();
                        Err(e)
                    }
                }
            }
            Err(e) => {
                // retryable: put the temp file back and keep the stream alive
                let _ = tokio::fs::rename(&final_path, &temp_path).await;
                record.abort_finalize();
                Err(e)
            }
        }
    }

    // ========================================================================
    // Retrieval
    // ========================================================================

    /// Look up a durable item and the path of its backing file.
    ///
    /// A missing row and a missing file are the same thing to callers:
    /// not found.
    pub async fn retrieve(&self, item_id: &str) -> Result<(UploadedItem, PathBuf), UploadError> {
        let item = self
            .store
            .find_by_id(item_id)
            .await?
            .ok_or_else(|| UploadError::ItemNotFound(item_id.to_string()))?;

        let path = self.registry.final_path(&item.stream_id);
        if tokio::fs::metadata(&path).await.is_err() {
            return Err(UploadError::ItemNotFound(item_id.to_string()));
        }

        Ok((item, path))
    }
}

async fn remove_quietly(path: &std::path::Path, stream_id: &str) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!(stream_id = %stream_id, error = %e, "Failed to remove file");
        }
    }
}
