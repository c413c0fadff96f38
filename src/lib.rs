//! Stash Server Library
//!
//! Chunked-upload ingestion engine plus the app shell around it. The
//! binary in `main.rs` is a thin bootstrap; everything lives here so
//! integration tests can drive the engine and the transport bindings
//! directly.
//!
//! # Modules
//!
//! - `upload`: the ingestion engine (registry, pipeline, finalize/dedup)
//! - `socket`: duplex-socket transport binding
//! - `routes`: request-per-operation HTTP binding + presentation routes
//! - `db`: durable item store
//! - `hooks`: publish-only upload event feed

pub mod config;
pub mod db;
pub mod error;
pub mod hooks;
pub mod media;
pub mod mime;
pub mod routes;
pub mod socket;
pub mod state;
pub mod upload;
pub mod web;
