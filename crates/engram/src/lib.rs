//! Engram - per-character dynamic memory for interactive narrative agents
//!
//! Each character accumulates free-text memories through a three-tier
//! pipeline: a bounded in-process recent queue, a durable staging buffer,
//! and a persistent vector index for semantic search. The daemon exposes
//! the pipeline over HTTP, one resource per character.

pub mod config;
pub mod embedding;
pub mod error;
pub mod memory;
pub mod server;
pub mod storage;
pub mod testing;

pub use error::{EngramError, Result};
