//! Per-linkage heads for references made from files of another linkage.
//!
//! A binding keeps one entry per foreign linkage, singly linked from its `FIRST_EXTREF`
//! field. Each entry heads a chain of reference names that is linked exactly like the
//! binding's own reference chain.

use crate::storage::database::{Database, PTR_SIZE};
use crate::types::{LinkageId, RecPtr, Result};

const LINKAGE: u64 = 0;
const FIRST_NAME: u64 = 4;
const NEXT: u64 = 8;
const RECORD_SIZE: usize = 4 + 2 * PTR_SIZE;

/// One external reference list of a binding.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ExternalReferences {
    /// Linkage of the referencing files.
    pub linkage: LinkageId,
    /// First name of the list.
    pub first_name: RecPtr,
}

fn entries(db: &Database, head_slot: RecPtr) -> Result<Vec<RecPtr>> {
    let mut out = Vec::new();
    let mut entry = db.get_rec_ptr(head_slot)?;
    while !entry.is_null() {
        out.push(entry);
        entry = db.get_rec_ptr(entry.add(NEXT))?;
    }
    Ok(out)
}

fn linkage_of(db: &Database, entry: RecPtr) -> Result<LinkageId> {
    Ok(LinkageId(db.get_short(entry.add(LINKAGE))? as u16))
}

/// Slot holding the first name referencing the binding from `linkage`, creating the entry
/// when `create` is set. Returns `None` when there is no entry and none was created.
pub(crate) fn name_slot(
    db: &Database,
    head_slot: RecPtr,
    linkage: LinkageId,
    create: bool,
) -> Result<Option<RecPtr>> {
    for entry in entries(db, head_slot)? {
        if linkage_of(db, entry)? == linkage {
            return Ok(Some(entry.add(FIRST_NAME)));
        }
    }
    if !create {
        return Ok(None);
    }
    let entry = db.malloc(RECORD_SIZE)?;
    db.put_short(entry.add(LINKAGE), linkage.0 as i16)?;
    db.put_rec_ptr(entry.add(NEXT), db.get_rec_ptr(head_slot)?)?;
    db.put_rec_ptr(head_slot, entry)?;
    Ok(Some(entry.add(FIRST_NAME)))
}

/// Frees the entry for `linkage` once its name list is empty.
pub(crate) fn remove_if_empty(db: &Database, head_slot: RecPtr, linkage: LinkageId) -> Result<()> {
    let mut prev_slot = head_slot;
    let mut entry = db.get_rec_ptr(head_slot)?;
    while !entry.is_null() {
        let next = db.get_rec_ptr(entry.add(NEXT))?;
        if linkage_of(db, entry)? == linkage {
            if db.get_rec_ptr(entry.add(FIRST_NAME))?.is_null() {
                db.put_rec_ptr(prev_slot, next)?;
                db.free(entry)?;
            }
            return Ok(());
        }
        prev_slot = entry.add(NEXT);
        entry = next;
    }
    Ok(())
}

/// Every external reference list headed at `head_slot`.
pub fn lists(db: &Database, head_slot: RecPtr) -> Result<Vec<ExternalReferences>> {
    entries(db, head_slot)?
        .into_iter()
        .map(|entry| {
            Ok(ExternalReferences {
                linkage: linkage_of(db, entry)?,
                first_name: db.get_rec_ptr(entry.add(FIRST_NAME))?,
            })
        })
        .collect()
}
