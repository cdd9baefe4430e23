use std::cmp::Ordering;
use std::sync::Arc;

use tracing::{debug, trace};

use super::{AcceptOutcome, BTreeStats, BTreeVisitor, RecordComparator, VisitFlow};
use crate::storage::database::{Database, PTR_SIZE};
use crate::types::{PdomError, RecPtr, Result};

/// Minimum degree of the tree.
pub const DEGREE: usize = 8;
/// Records held by a full node.
pub const MAX_RECORDS: usize = 2 * DEGREE - 1;
/// Children of a full internal node.
pub const MAX_CHILDREN: usize = 2 * DEGREE;
const MIN_RECORDS: usize = DEGREE - 1;
const MEDIAN_RECORD: usize = DEGREE - 1;
const OFFSET_CHILDREN: u64 = (MAX_RECORDS * PTR_SIZE) as u64;
const NODE_SIZE: usize = (MAX_RECORDS + MAX_CHILDREN) * PTR_SIZE;

/// B-tree of record pointers rooted at a pointer slot in the heap.
///
/// A node is a heap block holding [`MAX_RECORDS`] record slots followed by
/// [`MAX_CHILDREN`] child slots. Records are packed to the left; a null record ends the
/// node. The tree keeps no state of its own besides the address of its root slot, so a
/// handle can be rebuilt on every use.
pub struct BTree<C> {
    root_slot: RecPtr,
    comparator: C,
    stats: Option<Arc<BTreeStats>>,
}

/// Result of [`BTree::check`].
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TreeCheck {
    /// Number of records reached.
    pub records: usize,
    /// Number of levels.
    pub depth: usize,
    /// Human readable descriptions of every violation found.
    pub violations: Vec<String>,
}

enum Slot {
    Record(usize),
    Child(usize),
}

impl<C: RecordComparator> BTree<C> {
    /// Tree whose root pointer lives at `root_slot`.
    pub fn new(root_slot: RecPtr, comparator: C) -> Self {
        Self {
            root_slot,
            comparator,
            stats: None,
        }
    }

    /// Counts operations into `stats`.
    pub fn with_stats(mut self, stats: Arc<BTreeStats>) -> Self {
        self.stats = Some(stats);
        self
    }

    /// The comparator ordering this tree.
    pub fn comparator(&self) -> &C {
        &self.comparator
    }

    /// Address of the root node, null for an empty tree.
    pub fn root(&self, db: &Database) -> Result<RecPtr> {
        db.get_rec_ptr(self.root_slot)
    }

    fn set_root(&self, db: &Database, node: RecPtr) -> Result<()> {
        db.put_rec_ptr(self.root_slot, node)
    }

    fn stat(&self, f: impl FnOnce(&BTreeStats)) {
        if let Some(stats) = self.stats.as_deref() {
            f(stats);
        }
    }

    /// Inserts `record` unless an equal record is present.
    ///
    /// Returns the record that is in the tree afterwards: `record` itself, or the equal
    /// record that was already there.
    pub fn insert(&self, db: &Database, record: RecPtr) -> Result<RecPtr> {
        if record.is_null() {
            return Err(PdomError::Invalid("insert of null record"));
        }
        let root = self.root(db)?;
        if root.is_null() {
            let node = allocate_node(db)?;
            put(db, node, Slot::Record(0), record)?;
            self.set_root(db, node)?;
            self.stat(BTreeStats::inc_inserts);
            return Ok(record);
        }
        let result = self.insert_into(db, root, record)?;
        if result == record {
            self.stat(BTreeStats::inc_inserts);
        } else {
            self.stat(BTreeStats::inc_insert_hits);
        }
        Ok(result)
    }

    fn insert_into(&self, db: &Database, root: RecPtr, record: RecPtr) -> Result<RecPtr> {
        let mut parent = RecPtr::NULL;
        let mut parent_index = 0;
        let mut node = root;
        loop {
            if !get(db, node, Slot::Record(MAX_RECORDS - 1))?.is_null() {
                let median = get(db, node, Slot::Record(MEDIAN_RECORD))?;
                if median == record {
                    return Ok(median);
                }
                let upper = self.split(db, parent, parent_index, node, median)?;
                match self.comparator.compare(db, median, record)? {
                    Ordering::Greater => {}
                    Ordering::Less => node = upper,
                    Ordering::Equal => return Ok(median),
                }
            }

            let count = record_count(db, node)?;
            let mut lower = 0;
            let mut upper = count;
            while lower < upper {
                let middle = (lower + upper) / 2;
                let existing = get(db, node, Slot::Record(middle))?;
                match self.comparator.compare(db, existing, record)? {
                    Ordering::Greater => upper = middle,
                    Ordering::Less => lower = middle + 1,
                    Ordering::Equal => return Ok(existing),
                }
            }

            let child = get(db, node, Slot::Child(lower))?;
            if child.is_null() {
                for j in (lower..count).rev() {
                    let moved = get(db, node, Slot::Record(j))?;
                    put(db, node, Slot::Record(j + 1), moved)?;
                }
                put(db, node, Slot::Record(lower), record)?;
                return Ok(record);
            }
            parent = node;
            parent_index = lower;
            node = child;
        }
    }

    /// Splits the full `node` around `median`, returning the new upper sibling.
    fn split(
        &self,
        db: &Database,
        parent: RecPtr,
        parent_index: usize,
        node: RecPtr,
        median: RecPtr,
    ) -> Result<RecPtr> {
        let sibling = allocate_node(db)?;
        for i in MEDIAN_RECORD + 1..MAX_RECORDS {
            let moved = get(db, node, Slot::Record(i))?;
            put(db, sibling, Slot::Record(i - MEDIAN_RECORD - 1), moved)?;
            put(db, node, Slot::Record(i), RecPtr::NULL)?;
        }
        for i in MEDIAN_RECORD + 1..MAX_CHILDREN {
            let moved = get(db, node, Slot::Child(i))?;
            put(db, sibling, Slot::Child(i - MEDIAN_RECORD - 1), moved)?;
            put(db, node, Slot::Child(i), RecPtr::NULL)?;
        }
        put(db, node, Slot::Record(MEDIAN_RECORD), RecPtr::NULL)?;

        if parent.is_null() {
            let root = allocate_node(db)?;
            put(db, root, Slot::Record(0), median)?;
            put(db, root, Slot::Child(0), node)?;
            put(db, root, Slot::Child(1), sibling)?;
            self.set_root(db, root)?;
        } else {
            let count = record_count(db, parent)?;
            for i in (parent_index..count).rev() {
                let moved = get(db, parent, Slot::Record(i))?;
                put(db, parent, Slot::Record(i + 1), moved)?;
                let moved = get(db, parent, Slot::Child(i + 1))?;
                put(db, parent, Slot::Child(i + 2), moved)?;
            }
            put(db, parent, Slot::Record(parent_index), median)?;
            put(db, parent, Slot::Child(parent_index + 1), sibling)?;
        }
        self.stat(BTreeStats::inc_splits);
        Ok(sibling)
    }

    /// Removes `record` from the tree.
    ///
    /// Returns `false` when `record` is not in the tree. A different record that merely
    /// compares equal is left alone.
    pub fn delete(&self, db: &Database, record: RecPtr) -> Result<bool> {
        let root = self.root(db)?;
        let removed = if root.is_null() {
            false
        } else {
            self.delete_from(db, root, record)?
        };
        if !root.is_null() && record_count(db, root)? == 0 {
            let child = get(db, root, Slot::Child(0))?;
            self.set_root(db, child)?;
            db.free(root)?;
        }
        if removed {
            self.stat(BTreeStats::inc_deletes);
        } else {
            trace!(record = %record, "btree.delete.missing");
            self.stat(BTreeStats::inc_delete_misses);
        }
        Ok(removed)
    }

    fn delete_from(&self, db: &Database, node: RecPtr, record: RecPtr) -> Result<bool> {
        let count = record_count(db, node)?;
        let (index, ordering) = self.lower_bound(db, node, count, record)?;
        let is_leaf = get(db, node, Slot::Child(0))?.is_null();

        if index < count && ordering == Ordering::Equal {
            if get(db, node, Slot::Record(index))? != record {
                return Ok(false);
            }
            if is_leaf {
                remove_record(db, node, index, count)?;
                return Ok(true);
            }
            let left = get(db, node, Slot::Child(index))?;
            let right = get(db, node, Slot::Child(index + 1))?;
            if record_count(db, left)? > MIN_RECORDS {
                let pred = self.last_record(db, left)?;
                put(db, node, Slot::Record(index), pred)?;
                return self.delete_from(db, left, pred);
            }
            if record_count(db, right)? > MIN_RECORDS {
                let succ = self.first_record(db, right)?;
                put(db, node, Slot::Record(index), succ)?;
                return self.delete_from(db, right, succ);
            }
            self.merge(db, node, index)?;
            return self.delete_from(db, left, record);
        }

        if is_leaf {
            return Ok(false);
        }
        let mut child = get(db, node, Slot::Child(index))?;
        if record_count(db, child)? == MIN_RECORDS {
            let left = if index > 0 {
                get(db, node, Slot::Child(index - 1))?
            } else {
                RecPtr::NULL
            };
            let right = if index < count {
                get(db, node, Slot::Child(index + 1))?
            } else {
                RecPtr::NULL
            };
            if !left.is_null() && record_count(db, left)? > MIN_RECORDS {
                self.rotate_right(db, node, index - 1, left, child)?;
            } else if !right.is_null() && record_count(db, right)? > MIN_RECORDS {
                self.rotate_left(db, node, index, child, right)?;
            } else if !right.is_null() {
                self.merge(db, node, index)?;
            } else {
                self.merge(db, node, index - 1)?;
                child = left;
            }
        }
        self.delete_from(db, child, record)
    }

    /// First slot whose record compares `>=` to `record`, with that comparison.
    fn lower_bound(
        &self,
        db: &Database,
        node: RecPtr,
        count: usize,
        record: RecPtr,
    ) -> Result<(usize, Ordering)> {
        let mut lower = 0;
        let mut upper = count;
        let mut found = Ordering::Greater;
        while lower < upper {
            let middle = (lower + upper) / 2;
            let existing = get(db, node, Slot::Record(middle))?;
            match self.comparator.compare(db, existing, record)? {
                Ordering::Less => lower = middle + 1,
                other => {
                    upper = middle;
                    found = other;
                }
            }
        }
        if lower < count {
            let existing = get(db, node, Slot::Record(lower))?;
            found = self.comparator.compare(db, existing, record)?;
        }
        Ok((lower, found))
    }

    fn last_record(&self, db: &Database, mut node: RecPtr) -> Result<RecPtr> {
        loop {
            let count = record_count(db, node)?;
            let child = get(db, node, Slot::Child(count))?;
            if child.is_null() {
                return get(db, node, Slot::Record(count - 1));
            }
            node = child;
        }
    }

    fn first_record(&self, db: &Database, mut node: RecPtr) -> Result<RecPtr> {
        loop {
            let child = get(db, node, Slot::Child(0))?;
            if child.is_null() {
                return get(db, node, Slot::Record(0));
            }
            node = child;
        }
    }

    /// Merges child `index + 1` and the separating record into child `index`.
    fn merge(&self, db: &Database, node: RecPtr, index: usize) -> Result<()> {
        let left = get(db, node, Slot::Child(index))?;
        let right = get(db, node, Slot::Child(index + 1))?;
        let left_count = record_count(db, left)?;
        let right_count = record_count(db, right)?;
        let separator = get(db, node, Slot::Record(index))?;
        put(db, left, Slot::Record(left_count), separator)?;
        for i in 0..right_count {
            let moved = get(db, right, Slot::Record(i))?;
            put(db, left, Slot::Record(left_count + 1 + i), moved)?;
        }
        for i in 0..=right_count {
            let moved = get(db, right, Slot::Child(i))?;
            put(db, left, Slot::Child(left_count + 1 + i), moved)?;
        }
        let count = record_count(db, node)?;
        for i in index..count - 1 {
            let moved = get(db, node, Slot::Record(i + 1))?;
            put(db, node, Slot::Record(i), moved)?;
            let moved = get(db, node, Slot::Child(i + 2))?;
            put(db, node, Slot::Child(i + 1), moved)?;
        }
        put(db, node, Slot::Record(count - 1), RecPtr::NULL)?;
        put(db, node, Slot::Child(count), RecPtr::NULL)?;
        db.free(right)?;
        self.stat(BTreeStats::inc_merges);
        Ok(())
    }

    /// Moves the last record of `left` up into `node` and the separator down into `child`.
    fn rotate_right(
        &self,
        db: &Database,
        node: RecPtr,
        separator_index: usize,
        left: RecPtr,
        child: RecPtr,
    ) -> Result<()> {
        let child_count = record_count(db, child)?;
        for i in (0..child_count).rev() {
            let moved = get(db, child, Slot::Record(i))?;
            put(db, child, Slot::Record(i + 1), moved)?;
        }
        for i in (0..=child_count).rev() {
            let moved = get(db, child, Slot::Child(i))?;
            put(db, child, Slot::Child(i + 1), moved)?;
        }
        let separator = get(db, node, Slot::Record(separator_index))?;
        put(db, child, Slot::Record(0), separator)?;
        let left_count = record_count(db, left)?;
        let moved_child = get(db, left, Slot::Child(left_count))?;
        put(db, child, Slot::Child(0), moved_child)?;
        let moved_record = get(db, left, Slot::Record(left_count - 1))?;
        put(db, node, Slot::Record(separator_index), moved_record)?;
        put(db, left, Slot::Record(left_count - 1), RecPtr::NULL)?;
        put(db, left, Slot::Child(left_count), RecPtr::NULL)?;
        self.stat(BTreeStats::inc_rotations);
        Ok(())
    }

    /// Moves the first record of `right` up into `node` and the separator down into `child`.
    fn rotate_left(
        &self,
        db: &Database,
        node: RecPtr,
        separator_index: usize,
        child: RecPtr,
        right: RecPtr,
    ) -> Result<()> {
        let child_count = record_count(db, child)?;
        let separator = get(db, node, Slot::Record(separator_index))?;
        put(db, child, Slot::Record(child_count), separator)?;
        let moved_child = get(db, right, Slot::Child(0))?;
        put(db, child, Slot::Child(child_count + 1), moved_child)?;
        let moved_record = get(db, right, Slot::Record(0))?;
        put(db, node, Slot::Record(separator_index), moved_record)?;
        let right_count = record_count(db, right)?;
        for i in 0..right_count - 1 {
            let moved = get(db, right, Slot::Record(i + 1))?;
            put(db, right, Slot::Record(i), moved)?;
        }
        for i in 0..right_count {
            let moved = get(db, right, Slot::Child(i + 1))?;
            put(db, right, Slot::Child(i), moved)?;
        }
        put(db, right, Slot::Record(right_count - 1), RecPtr::NULL)?;
        put(db, right, Slot::Child(right_count), RecPtr::NULL)?;
        self.stat(BTreeStats::inc_rotations);
        Ok(())
    }

    /// Visits records in tree order, see [`BTreeVisitor`].
    pub fn accept<V: BTreeVisitor + ?Sized>(
        &self,
        db: &Database,
        visitor: &mut V,
    ) -> Result<AcceptOutcome> {
        self.stat(BTreeStats::inc_accepts);
        let root = self.root(db)?;
        match accept_node(db, root, visitor) {
            Ok(None) => Ok(AcceptOutcome::Exhausted),
            Ok(Some(VisitFlow::StopFound)) => Ok(AcceptOutcome::Found),
            Ok(Some(_)) => Ok(AcceptOutcome::NotFound),
            Err(PdomError::Cancelled) => {
                debug!(root = %self.root_slot, "btree.accept.cancelled");
                self.stat(BTreeStats::inc_cancelled_accepts);
                Ok(AcceptOutcome::Cancelled)
            }
            Err(err) => Err(err),
        }
    }

    /// Every record in tree order.
    pub fn records(&self, db: &Database) -> Result<Vec<RecPtr>> {
        let mut all = super::CollectAll::default();
        self.accept(db, &mut all)?;
        Ok(all.records)
    }

    /// Returns true when the tree holds no record.
    pub fn is_empty(&self, db: &Database) -> Result<bool> {
        Ok(self.root(db)?.is_null())
    }

    /// Checks node occupancy, leaf depth and record order.
    pub fn check(&self, db: &Database) -> Result<TreeCheck> {
        let mut report = TreeCheck::default();
        let root = self.root(db)?;
        if root.is_null() {
            return Ok(report);
        }
        let mut previous = None;
        let mut leaf_depth = None;
        self.check_node(db, root, 1, true, &mut previous, &mut leaf_depth, &mut report)?;
        report.depth = leaf_depth.unwrap_or(0);
        Ok(report)
    }

    #[allow(clippy::too_many_arguments)]
    fn check_node(
        &self,
        db: &Database,
        node: RecPtr,
        depth: usize,
        is_root: bool,
        previous: &mut Option<RecPtr>,
        leaf_depth: &mut Option<usize>,
        report: &mut TreeCheck,
    ) -> Result<()> {
        let count = record_count(db, node)?;
        if count == 0 || (!is_root && count < MIN_RECORDS) {
            report
                .violations
                .push(format!("node {node} holds {count} records"));
        }
        let is_leaf = get(db, node, Slot::Child(0))?.is_null();
        if is_leaf {
            match *leaf_depth {
                None => *leaf_depth = Some(depth),
                Some(expected) if expected != depth => report
                    .violations
                    .push(format!("leaf {node} at depth {depth}, expected {expected}")),
                Some(_) => {}
            }
        }
        for i in 0..=count {
            let child = get(db, node, Slot::Child(i))?;
            if is_leaf != child.is_null() {
                report
                    .violations
                    .push(format!("node {node} has inconsistent child {i}"));
            }
            if !child.is_null() {
                self.check_node(db, child, depth + 1, false, previous, leaf_depth, report)?;
            }
            if i < count {
                let record = get(db, node, Slot::Record(i))?;
                if let Some(prev) = *previous {
                    if self.comparator.compare(db, prev, record)? != Ordering::Less {
                        report
                            .violations
                            .push(format!("record {record} is not above {prev}"));
                    }
                }
                *previous = Some(record);
                report.records += 1;
            }
        }
        Ok(())
    }
}

/// Returns `None` to continue, or the flow that stopped the traversal.
fn accept_node<V: BTreeVisitor + ?Sized>(
    db: &Database,
    node: RecPtr,
    visitor: &mut V,
) -> Result<Option<VisitFlow>> {
    if node.is_null() {
        return Ok(None);
    }
    let count = record_count(db, node)?;
    let mut lower = 0;
    let mut upper = count;
    while lower < upper {
        let middle = (lower + upper) / 2;
        let record = get(db, node, Slot::Record(middle))?;
        if visitor.compare(db, record)? == Ordering::Less {
            lower = middle + 1;
        } else {
            upper = middle;
        }
    }
    for i in lower..count {
        let record = get(db, node, Slot::Record(i))?;
        if visitor.compare(db, record)? == Ordering::Greater {
            return accept_node(db, get(db, node, Slot::Child(i))?, visitor);
        }
        if let Some(flow) = accept_node(db, get(db, node, Slot::Child(i))?, visitor)? {
            return Ok(Some(flow));
        }
        match visitor.visit(db, record)? {
            VisitFlow::Continue => {}
            flow => return Ok(Some(flow)),
        }
    }
    accept_node(db, get(db, node, Slot::Child(count))?, visitor)
}

fn allocate_node(db: &Database) -> Result<RecPtr> {
    db.malloc(NODE_SIZE)
}

fn slot_address(node: RecPtr, slot: Slot) -> RecPtr {
    match slot {
        Slot::Record(i) => node.add((i * PTR_SIZE) as u64),
        Slot::Child(i) => node.add(OFFSET_CHILDREN + (i * PTR_SIZE) as u64),
    }
}

fn get(db: &Database, node: RecPtr, slot: Slot) -> Result<RecPtr> {
    db.get_rec_ptr(slot_address(node, slot))
}

fn put(db: &Database, node: RecPtr, slot: Slot, value: RecPtr) -> Result<()> {
    db.put_rec_ptr(slot_address(node, slot), value)
}

fn record_count(db: &Database, node: RecPtr) -> Result<usize> {
    let mut count = 0;
    while count < MAX_RECORDS && !get(db, node, Slot::Record(count))?.is_null() {
        count += 1;
    }
    Ok(count)
}

fn remove_record(db: &Database, node: RecPtr, index: usize, count: usize) -> Result<()> {
    for i in index..count - 1 {
        let moved = get(db, node, Slot::Record(i + 1))?;
        put(db, node, Slot::Record(i), moved)?;
    }
    put(db, node, Slot::Record(count - 1), RecPtr::NULL)
}
