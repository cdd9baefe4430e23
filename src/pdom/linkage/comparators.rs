//! Orders of the per-linkage trees.

use std::cmp::Ordering;

use crate::pdom::binding::{Binding, LOCAL_TO_FILE};
use crate::pdom::named;
use crate::pdom::node::{self, BindingKind};
use crate::storage::database::Database;
use crate::storage::RecordComparator;
use crate::types::{RecPtr, Result};

/// Name, then local-to-file record, then node type, then enumerator sequence.
///
/// The sequence lets enumerators that tie on everything else coexist in one tree.
fn compare_in_scope(db: &Database, a: RecPtr, b: RecPtr) -> Result<Ordering> {
    let cmp = named::compare_names(db, a, b)?;
    if cmp != Ordering::Equal {
        return Ok(cmp);
    }
    let cmp = db
        .get_rec_ptr(a.add(LOCAL_TO_FILE))?
        .cmp(&db.get_rec_ptr(b.add(LOCAL_TO_FILE))?);
    if cmp != Ordering::Equal {
        return Ok(cmp);
    }
    let (_, ta) = node::read_tag(db, a)?;
    let (_, tb) = node::read_tag(db, b)?;
    let cmp = ta.cmp(&tb);
    if cmp != Ordering::Equal || ta != BindingKind::Enumerator.node_type() {
        return Ok(cmp);
    }
    let sa = Binding::load(db, a)?.enumerator_sequence(db)?;
    let sb = Binding::load(db, b)?.enumerator_sequence(db)?;
    Ok(sa.cmp(&sb))
}

/// Order of the global binding index.
#[derive(Copy, Clone, Debug, Default)]
pub struct GlobalIndexOrder;

impl RecordComparator for GlobalIndexOrder {
    fn compare(&self, db: &Database, a: RecPtr, b: RecPtr) -> Result<Ordering> {
        compare_in_scope(db, a, b)
    }
}

/// Order of the nested binding index: parent record first, then as the global index.
#[derive(Copy, Clone, Debug, Default)]
pub struct NestedIndexOrder;

impl RecordComparator for NestedIndexOrder {
    fn compare(&self, db: &Database, a: RecPtr, b: RecPtr) -> Result<Ordering> {
        let cmp = node::parent(db, a)?.cmp(&node::parent(db, b)?);
        if cmp != Ordering::Equal {
            return Ok(cmp);
        }
        compare_in_scope(db, a, b)
    }
}

/// Order of the macro container index: by name.
#[derive(Copy, Clone, Debug, Default)]
pub struct MacroIndexOrder;

impl RecordComparator for MacroIndexOrder {
    fn compare(&self, db: &Database, a: RecPtr, b: RecPtr) -> Result<Ordering> {
        named::compare_names(db, a, b)
    }
}
