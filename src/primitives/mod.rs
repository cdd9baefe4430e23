//! Low-level primitives for building the index storage.
//!
//! Includes byte utilities, positioned file I/O and the single-writer/multi-reader
//! coordinator.

/// Varint and cursor utilities.
pub mod bytes;

/// Single-writer, multiple-reader coordination and write-lock yielding.
pub mod concurrency;

/// Positioned file I/O abstractions.
pub mod io;
