//! Storage engine underneath the index.
//!
//! A byte-addressable heap with a block allocator, heap strings, an ordered record index
//! and intrusive lists of node records. Nothing here knows about bindings or files.

/// Record B-tree with pluggable comparators and visitors.
pub mod btree;

/// Heap database: chunks, allocator and typed accessors.
pub mod database;

/// Intrusive lists of node records.
pub mod node_list;

/// Length-prefixed heap strings and name orderings.
pub mod strings;

mod options;

pub use btree::{
    AcceptOutcome, BTree, BTreeStats, BTreeStatsSnapshot, BTreeVisitor, RecordComparator,
    TreeCheck, VisitFlow,
};
pub use database::{Database, DatabaseStatsSnapshot};
pub use node_list::NodeList;
pub use options::{DatabaseOptions, DEFAULT_MAX_DATABASE_SIZE};
pub use strings::DbString;
