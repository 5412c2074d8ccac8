//! # PetalStore Storage
//!
//! Byte-store backends that hold a PetalStore database log.
//!
//! A backend knows nothing about collections, records or log framing. It
//! stores one growing byte sequence per database and offers the handful of
//! operations the log needs: read, append, truncate a torn tail, and make
//! writes durable.
//!
//! ## Available Backends
//!
//! - [`InMemoryBackend`] - A shareable buffer; clones see the same bytes, so a
//!   database can be closed and reopened within one process
//! - [`FileBackend`] - One locked file per database
//!
//! ## Example
//!
//! ```rust
//! use petalstore_storage::{StorageBackend, InMemoryBackend};
//!
//! let mut backend = InMemoryBackend::new();
//! backend.append(b"rose").unwrap();
//!
//! let reopened = backend.clone();
//! assert_eq!(reopened.read_all().unwrap(), b"rose");
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
