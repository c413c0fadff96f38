//! Upload engine types

use std::sync::atomic::{AtomicU8, Ordering};
use std::time::{Duration, Instant};

use axum::http::StatusCode;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::fs::File;
use tokio::sync::Mutex;

use super::hasher::HasherSession;

// ============================================================================
// Constants & ids
// ============================================================================

/// Length of ephemeral stream ids.
pub const STREAM_ID_LENGTH: usize = 32;

const ID_CHARS: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// Random lowercase-alphanumeric id of the given length.
pub fn random_id(length: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..length)
        .map(|_| ID_CHARS[rng.gen_range(0..ID_CHARS.len())] as char)
        .collect()
}

// ============================================================================
// Stream record
// ============================================================================

/// Lifecycle phase of a stream record.
///
/// `Open -> Finalizing` is taken only by the finalize path,
/// `Open -> Closed` only by eviction/termination, and
/// `Finalizing -> Closed` completes a successful finalize. The two
/// competing transitions out of `Open` are CAS-guarded so eviction can
/// never delete a file that finalize is in the middle of promoting.
const PHASE_OPEN: u8 = 0;
const PHASE_FINALIZING: u8 = 1;
const PHASE_CLOSED: u8 = 2;

/// Mutable guts of an in-flight stream, serialized behind one async lock.
///
/// `file` and `hasher` advance together on every accepted chunk; once the
/// digest is sealed `hasher` is gone and `finalized_hash` holds the result
/// so a finalize retry never re-hashes.
pub struct StreamState {
    pub file: Option<File>,
    pub hasher: Option<HasherSession>,
    pub finalized_hash: Option<String>,
}

/// An in-flight, not-yet-finalized upload owned by the registry.
pub struct UploadStream {
    pub stream_id: String,
    pub extension: String,
    pub name: Option<String>,
    pub(crate) state: Mutex<StreamState>,
    phase: AtomicU8,
    last_access: parking_lot::Mutex<Instant>,
}

impl UploadStream {
    pub(crate) fn new(
        stream_id: String,
        extension: String,
        name: Option<String>,
        file: File,
    ) -> Self {
        Self {
            stream_id,
            extension,
            name,
            state: Mutex::new(StreamState {
                file: Some(file),
                hasher: Some(HasherSession::new()),
                finalized_hash: None,
            }),
            phase: AtomicU8::new(PHASE_OPEN),
            last_access: parking_lot::Mutex::new(Instant::now()),
        }
    }

    /// Reset the sliding idle clock. Called on every access.
    pub(crate) fn touch(&self) {
        *self.last_access.lock() = Instant::now();
    }

    pub(crate) fn is_idle_expired(&self, timeout: Duration) -> bool {
        self.last_access.lock().elapsed() > timeout
    }

    /// Claim the record for finalization. Fails if it was already evicted
    /// or another finalize is in flight.
    pub(crate) fn try_begin_finalize(&self) -> bool {
        self.phase
            .compare_exchange(
                PHASE_OPEN,
                PHASE_FINALIZING,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    /// Claim the record for eviction. Fails if finalize already owns it or
    /// another evictor won; the loser must not touch the backing file.
    pub(crate) fn try_close(&self) -> bool {
        self.phase
            .compare_exchange(PHASE_OPEN, PHASE_CLOSED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Finalize failed in a retryable way; hand the record back.
    pub(crate) fn abort_finalize(&self) {
        self.phase.store(PHASE_OPEN, Ordering::Release);
    }

    pub(crate) fn complete_finalize(&self) {
        self.phase.store(PHASE_CLOSED, Ordering::Release);
    }
}

// ============================================================================
// Durable item
// ============================================================================

/// A durable, immutable record of a completed upload.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct UploadedItem {
    /// Public item id, assigned at finalize
    pub id: String,
    /// Provenance link to the originating stream; names the backing file
    pub stream_id: String,
    pub extension: String,
    pub name: Option<String>,
    /// 40-char lowercase hex content digest; unique across all items
    pub hash: String,
    /// RFC 3339 timestamp of the finalize
    pub created_at: String,
}

impl UploadedItem {
    /// Display filename for downloads: `name.ext` when a name was supplied,
    /// `hash.ext` otherwise.
    pub fn download_name(&self) -> String {
        match &self.name {
            Some(name) => format!("{}.{}", name, self.extension),
            None => format!("{}.{}", self.hash, self.extension),
        }
    }
}

// ============================================================================
// Errors
// ============================================================================

/// Upload engine error taxonomy.
///
/// Not-found and validation errors are recoverable and leave stream state
/// unchanged; store failures keep the temp file in place so finalize can
/// be retried.
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("Stream not found: {0}")]
    StreamNotFound(String),

    #[error("File with id not found: {0}")]
    ItemNotFound(String),

    #[error("Extension must be in bounds of 0-{max}")]
    ExtensionTooLong { length: usize, max: usize },

    #[error("Hash doesn't match")]
    HashMismatch,

    #[error("Stream digest already finalized: {0}")]
    StreamSealed(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl UploadError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::StreamNotFound(_) | Self::ItemNotFound(_) => StatusCode::NOT_FOUND,
            Self::ExtensionTooLong { .. } | Self::HashMismatch => StatusCode::BAD_REQUEST,
            Self::StreamSealed(_) => StatusCode::CONFLICT,
            Self::Store(_) | Self::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// `(generic, field)` pair for the wire error body.
    pub fn wire_code(&self) -> (&'static str, &'static str) {
        match self {
            Self::StreamNotFound(_) => ("NOT_FOUND", "STREAM"),
            Self::ItemNotFound(_) => ("NOT_FOUND", "ID"),
            Self::ExtensionTooLong { .. } => ("PARAM_LENGTH", "EXTENSION"),
            Self::HashMismatch => ("HASH_MISMATCH", "HASH"),
            Self::StreamSealed(_) => ("STREAM_SEALED", "STREAM"),
            Self::Store(_) | Self::Io(_) => ("INTERNAL_SERVER_ERROR", "GENERIC"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_ids_are_lowercase_alphanumeric() {
        let id = random_id(STREAM_ID_LENGTH);
        assert_eq!(id.len(), 32);
        assert!(id
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()));
    }

    #[test]
    fn random_ids_are_distinct() {
        assert_ne!(random_id(12), random_id(12));
    }

    #[test]
    fn download_name_prefers_display_name() {
        let mut item = UploadedItem {
            id: "abc123def456".into(),
            stream_id: random_id(STREAM_ID_LENGTH),
            extension: "png".into(),
            name: Some("screenshot".into()),
            hash: "da39a3ee5e6b4b0d3255bfef95601890afd80709".into(),
            created_at: chrono::Utc::now().to_rfc3339(),
        };
        assert_eq!(item.download_name(), "screenshot.png");

        item.name = None;
        assert_eq!(
            item.download_name(),
            "da39a3ee5e6b4b0d3255bfef95601890afd80709.png"
        );
    }

    #[test]
    fn phase_transitions_are_exclusive() {
        let stream = UploadStream::new(
            random_id(STREAM_ID_LENGTH),
            "bin".into(),
            None,
            // safe in tests: std File wrapped after creation
            tokio::fs::File::from_std(tempfile::tempfile().unwrap()),
        );

        assert!(stream.try_begin_finalize());
        // eviction must lose against an in-flight finalize
        assert!(!stream.try_close());
        // and a second finalize must lose too
        assert!(!stream.try_begin_finalize());

        stream.abort_finalize();
        assert!(stream.try_close());
        assert!(!stream.try_begin_finalize());
    }
}
