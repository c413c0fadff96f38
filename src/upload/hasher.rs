//! Incremental content hashing
//!
//! Each upload stream owns one [`HasherSession`] fed the exact bytes that
//! land in its temp file, in the same order. Finalizing consumes the
//! session, so append-after-finalize is unrepresentable.

use sha1::{Digest, Sha1};

/// Incremental SHA-1 over a stream's accepted chunks.
pub struct HasherSession {
    digest: Sha1,
}

impl HasherSession {
    pub fn new() -> Self {
        Self { digest: Sha1::new() }
    }

    /// Feed the next byte range into the running digest.
    pub fn append(&mut self, bytes: &[u8]) {
        self.digest.update(bytes);
    }

    /// Consume the session and return the lowercase hex digest of
    /// everything appended so far.
    pub fn finish(self) -> String {
        hex::encode(self.digest.finalize())
    }
}

impl Default for HasherSession {
    fn default() -> Self {
        Self::new()
    }
}

/// One-shot digest over a single chunk, independent of any stream state.
/// Used to validate a client-supplied per-chunk hash before the bytes are
/// allowed to touch the temp file.
pub fn chunk_digest(bytes: &[u8]) -> String {
    hex::encode(Sha1::digest(bytes))
}
