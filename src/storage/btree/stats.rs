use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

/// Snapshot of B-tree statistics at a point in time.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct BTreeStatsSnapshot {
    /// Number of records inserted (existing equal records excluded)
    pub inserts: u64,
    /// Number of inserts that found an equal record already present
    pub insert_hits: u64,
    /// Number of records removed
    pub deletes: u64,
    /// Number of delete calls for records that were not present
    pub delete_misses: u64,
    /// Number of node splits performed
    pub splits: u64,
    /// Number of node merges performed
    pub merges: u64,
    /// Number of records moved between siblings while deleting
    pub rotations: u64,
    /// Number of visitor traversals started
    pub accepts: u64,
    /// Number of traversals that ended on a cancellation request
    pub cancelled_accepts: u64,
}

/// Thread-safe statistics shared by every tree of an index.
#[derive(Default, Debug)]
pub struct BTreeStats {
    inserts: AtomicU64,
    insert_hits: AtomicU64,
    deletes: AtomicU64,
    delete_misses: AtomicU64,
    splits: AtomicU64,
    merges: AtomicU64,
    rotations: AtomicU64,
    accepts: AtomicU64,
    cancelled_accepts: AtomicU64,
}

impl BTreeStats {
    pub(crate) fn inc_inserts(&self) {
        self.inserts.fetch_add(1, AtomicOrdering::Relaxed);
    }

    pub(crate) fn inc_insert_hits(&self) {
        self.insert_hits.fetch_add(1, AtomicOrdering::Relaxed);
    }

    pub(crate) fn inc_deletes(&self) {
        self.deletes.fetch_add(1, AtomicOrdering::Relaxed);
    }

    pub(crate) fn inc_delete_misses(&self) {
        self.delete_misses.fetch_add(1, AtomicOrdering::Relaxed);
    }

    pub(crate) fn inc_splits(&self) {
        self.splits.fetch_add(1, AtomicOrdering::Relaxed);
    }

    pub(crate) fn inc_merges(&self) {
        self.merges.fetch_add(1, AtomicOrdering::Relaxed);
    }

    pub(crate) fn inc_rotations(&self) {
        self.rotations.fetch_add(1, AtomicOrdering::Relaxed);
    }

    pub(crate) fn inc_accepts(&self) {
        self.accepts.fetch_add(1, AtomicOrdering::Relaxed);
    }

    pub(crate) fn inc_cancelled_accepts(&self) {
        self.cancelled_accepts.fetch_add(1, AtomicOrdering::Relaxed);
    }

    /// Creates a snapshot of all current statistics.
    pub fn snapshot(&self) -> BTreeStatsSnapshot {
        BTreeStatsSnapshot {
            inserts: self.inserts.load(AtomicOrdering::Relaxed),
            insert_hits: self.insert_hits.load(AtomicOrdering::Relaxed),
            deletes: self.deletes.load(AtomicOrdering::Relaxed),
            delete_misses: self.delete_misses.load(AtomicOrdering::Relaxed),
            splits: self.splits.load(AtomicOrdering::Relaxed),
            merges: self.merges.load(AtomicOrdering::Relaxed),
            rotations: self.rotations.load(AtomicOrdering::Relaxed),
            accepts: self.accepts.load(AtomicOrdering::Relaxed),
            cancelled_accepts: self.cancelled_accepts.load(AtomicOrdering::Relaxed),
        }
    }

    /// Emits current statistics to the tracing infrastructure.
    pub fn emit_tracing(&self) {
        let snapshot = self.snapshot();
        tracing::info!(
            target: "pdom_btree::stats",
            inserts = snapshot.inserts,
            insert_hits = snapshot.insert_hits,
            deletes = snapshot.deletes,
            delete_misses = snapshot.delete_misses,
            splits = snapshot.splits,
            merges = snapshot.merges,
            rotations = snapshot.rotations,
            accepts = snapshot.accepts,
            cancelled_accepts = snapshot.cancelled_accepts,
            "btree stats snapshot"
        );
    }
}
