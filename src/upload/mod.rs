//! Chunked-upload ingestion engine
//!
//! Files arrive as a sequence of arbitrarily-sized chunks over either
//! transport binding. The engine:
//! - tracks in-flight streams in a registry with sliding idle eviction
//! - hashes content incrementally as chunks land in the temp file
//! - deduplicates identical content at finalize by digest
//! - promotes completed uploads into the durable item store
//!
//! Flow: binding -> registry (create/lookup) -> pipeline (per chunk)
//! -> finalize/dedup -> item store.

pub mod hasher;
pub mod registry;
pub mod service;
pub mod types;

pub use hasher::{chunk_digest, HasherSession};
pub use registry::{sweep_stale_temp_files, StreamRegistry};
pub use service::UploadService;
pub use types::{random_id, UploadError, UploadStream, UploadedItem, STREAM_ID_LENGTH};
