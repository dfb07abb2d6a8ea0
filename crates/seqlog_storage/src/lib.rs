//! # seqlog storage
//!
//! Storage backend trait and implementations for seqlog.
//!
//! This crate provides the lowest-level storage abstraction for the log.
//! Storage backends are **opaque byte stores** - they do not interpret
//! the data they store.
//!
//! ## Design Principles
//!
//! - Backends are simple byte stores (read, append, flush, sync)
//! - No knowledge of record framing, segments, or index entries
//! - Must be `Send + Sync` so a writer and its readers can live on different threads
//! - A reader handle may observe growth made through another handle via [`StorageBackend::refresh`]
//!
//! ## Available Backends
//!
//! - [`InMemoryBackend`] - For testing; clones share the same buffer
//! - [`FileBackend`] - For persistent storage using OS file APIs
//!
//! ## Example
//!
//! ```rust
//! use seqlog_storage::{StorageBackend, InMemoryBackend};
//!
//! let mut backend = InMemoryBackend::new();
//! let offset = backend.append(b"hello world").unwrap();
//! let data = backend.read_at(offset, 11).unwrap();
//! assert_eq!(&data, b"hello world");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod file;
mod memory;

pub use backend::StorageBackend;
pub use error::{StorageError, StorageResult};
pub use file::FileBackend;
pub use memory::InMemoryBackend;
