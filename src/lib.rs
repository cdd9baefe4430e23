//! Persistent symbol index for C and C++ sources.
//!
//! Layers, bottom up:
//!
//! - [`types`]: record pointers, linkage and fragment ids, the crate error.
//! - [`primitives`]: byte encodings, positioned file I/O and the single-writer lock.
//! - [`storage`]: a block-allocated heap with strings, a record B-tree and node lists.
//! - [`pdom`]: bindings, names, files, includes and macros stored in that heap.
//! - [`query`]: visitors and collectors answering name lookups.

#![warn(missing_docs)]

pub mod pdom;
pub mod primitives;
pub mod query;
pub mod storage;
pub mod types;

pub use pdom::options::PdomOptions;
pub use pdom::Pdom;
pub use types::{PdomError, Result};
