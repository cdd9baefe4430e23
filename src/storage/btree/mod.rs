#![forbid(unsafe_code)]

//! Ordered index over heap records.
//!
//! The tree stores record pointers only; ordering comes from a [`RecordComparator`] that
//! decodes the records it is handed. Searches are expressed as [`BTreeVisitor`]s, which
//! compare candidate records against an implicit key and decide whether the traversal
//! goes on.

use std::cmp::Ordering;

use crate::storage::database::Database;
use crate::types::{RecPtr, Result};

mod stats;
mod tree;

pub use stats::{BTreeStats, BTreeStatsSnapshot};
pub use tree::{BTree, TreeCheck, DEGREE, MAX_CHILDREN, MAX_RECORDS};

/// Total order over records of one tree.
pub trait RecordComparator {
    /// Compares the record `a` with the record `b`.
    fn compare(&self, db: &Database, a: RecPtr, b: RecPtr) -> Result<Ordering>;
}

impl<C: RecordComparator + ?Sized> RecordComparator for &C {
    fn compare(&self, db: &Database, a: RecPtr, b: RecPtr) -> Result<Ordering> {
        (**self).compare(db, a, b)
    }
}

/// Decision returned by [`BTreeVisitor::visit`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum VisitFlow {
    /// Keep visiting records.
    Continue,
    /// Stop, the visitor has what it was looking for.
    StopFound,
    /// Stop, the visitor knows nothing further can match.
    StopNotFound,
}

/// How a traversal ended.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum AcceptOutcome {
    /// Every candidate record was visited.
    Exhausted,
    /// The visitor stopped with [`VisitFlow::StopFound`].
    Found,
    /// The visitor stopped with [`VisitFlow::StopNotFound`].
    NotFound,
    /// The visitor observed a cancellation request. Its results are partial.
    Cancelled,
}

impl AcceptOutcome {
    /// Returns true if the traversal ended because of cancellation.
    pub fn is_cancelled(self) -> bool {
        self == AcceptOutcome::Cancelled
    }
}

/// Search driven through [`BTree::accept`].
///
/// `compare` places a record relative to the visitor's key: `Less` means the record sorts
/// before every matching record, `Greater` after. Records comparing `Equal` are passed to
/// `visit` in tree order. A visitor whose `compare` always returns `Equal` sees every
/// record. Returning [`crate::types::PdomError::Cancelled`] from either method aborts the
/// traversal, which then reports [`AcceptOutcome::Cancelled`].
pub trait BTreeVisitor {
    /// Compares `record` with the key this visitor searches for.
    fn compare(&mut self, db: &Database, record: RecPtr) -> Result<Ordering>;

    /// Handles a record that compared `Equal`.
    fn visit(&mut self, db: &Database, record: RecPtr) -> Result<VisitFlow>;
}

impl<V: BTreeVisitor + ?Sized> BTreeVisitor for &mut V {
    fn compare(&mut self, db: &Database, record: RecPtr) -> Result<Ordering> {
        (**self).compare(db, record)
    }

    fn visit(&mut self, db: &Database, record: RecPtr) -> Result<VisitFlow> {
        (**self).visit(db, record)
    }
}

/// Visitor that collects every record of a tree in order.
#[derive(Default, Debug)]
pub struct CollectAll {
    /// Records seen so far.
    pub records: Vec<RecPtr>,
}

impl BTreeVisitor for CollectAll {
    fn compare(&mut self, _db: &Database, _record: RecPtr) -> Result<Ordering> {
        Ok(Ordering::Equal)
    }

    fn visit(&mut self, _db: &Database, record: RecPtr) -> Result<VisitFlow> {
        self.records.push(record);
        Ok(VisitFlow::Continue)
    }
}

#[cfg(test)]
mod tests;
