//! Inheritance edges of composites, keyed by the base-clause name that introduced them.

use serde::Serialize;

use super::kinds::Visibility;
use super::name::Name;
use crate::storage::database::{Database, PTR_SIZE};
use crate::types::{RecPtr, Result};

const NAME: u64 = 0;
const NEXT: u64 = 4;
const FLAGS: u64 = 8;
const RECORD_SIZE: usize = 2 * PTR_SIZE + 1;

const VIRTUAL: u8 = 0x04;

/// One base class of a composite.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
pub struct BaseInfo {
    /// Record of the base edge.
    pub record: RecPtr,
    /// Base-clause name the edge was created for.
    pub name: RecPtr,
    /// Binding the base-clause name refers to.
    pub base_binding: RecPtr,
    /// `virtual` inheritance.
    pub is_virtual: bool,
    /// Access of the base.
    pub visibility: Visibility,
}

/// Prepends a base edge for the base-clause `name` to the list at `first_slot`.
pub(crate) fn add(
    db: &Database,
    first_slot: RecPtr,
    name: Name,
    is_virtual: bool,
    visibility: Visibility,
) -> Result<RecPtr> {
    let record = db.malloc(RECORD_SIZE)?;
    db.put_rec_ptr(record.add(NAME), name.record())?;
    db.put_rec_ptr(record.add(NEXT), db.get_rec_ptr(first_slot)?)?;
    let flags = visibility.bits() | if is_virtual { VIRTUAL } else { 0 };
    db.put_byte(record.add(FLAGS), flags)?;
    db.put_rec_ptr(first_slot, record)?;
    Ok(record)
}

/// Removes and frees the edge created for `name`. Returns false if there is none.
pub(crate) fn remove_for_name(db: &Database, first_slot: RecPtr, name: Name) -> Result<bool> {
    let mut prev_slot = first_slot;
    let mut record = db.get_rec_ptr(first_slot)?;
    while !record.is_null() {
        let next = db.get_rec_ptr(record.add(NEXT))?;
        if db.get_rec_ptr(record.add(NAME))? == name.record() {
            db.put_rec_ptr(prev_slot, next)?;
            db.free(record)?;
            return Ok(true);
        }
        prev_slot = record.add(NEXT);
        record = next;
    }
    Ok(false)
}

/// Every edge of the list at `first_slot`.
pub(crate) fn list(db: &Database, first_slot: RecPtr) -> Result<Vec<BaseInfo>> {
    let mut out = Vec::new();
    let mut record = db.get_rec_ptr(first_slot)?;
    while !record.is_null() {
        let name = db.get_rec_ptr(record.add(NAME))?;
        let flags = db.get_byte(record.add(FLAGS))?;
        out.push(BaseInfo {
            record,
            name,
            base_binding: Name::at(name).binding(db)?,
            is_virtual: flags & VIRTUAL != 0,
            visibility: Visibility::from_bits(flags),
        });
        record = db.get_rec_ptr(record.add(NEXT))?;
    }
    Ok(out)
}

/// Frees every edge of the list at `first_slot`.
pub(crate) fn delete_all(db: &Database, first_slot: RecPtr) -> Result<()> {
    let mut record = db.get_rec_ptr(first_slot)?;
    while !record.is_null() {
        let next = db.get_rec_ptr(record.add(NEXT))?;
        db.free(record)?;
        record = next;
    }
    db.put_rec_ptr(first_slot, RecPtr::NULL)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdom::name::{NameFlags, NameRole, Specifier};
    use crate::storage::DatabaseOptions;

    #[test]
    fn edges_are_found_by_name() {
        let db = Database::in_memory(DatabaseOptions::default()).unwrap();
        let slot = db.malloc(PTR_SIZE).unwrap();
        let flags = NameFlags::new(NameRole::Reference).with_specifier(Specifier::Base);
        let n1 = Name::create(&db, RecPtr::NULL, RecPtr(4098), RecPtr::NULL, 0, 1, flags).unwrap();
        let n2 = Name::create(&db, RecPtr::NULL, RecPtr(4106), RecPtr::NULL, 5, 1, flags).unwrap();
        add(&db, slot, n1, false, Visibility::Public).unwrap();
        add(&db, slot, n2, true, Visibility::Private).unwrap();

        let bases = list(&db, slot).unwrap();
        assert_eq!(bases.len(), 2);
        assert_eq!(bases[0].base_binding, RecPtr(4106));
        assert!(bases[0].is_virtual);
        assert_eq!(bases[0].visibility, Visibility::Private);

        assert!(remove_for_name(&db, slot, n2).unwrap());
        assert!(!remove_for_name(&db, slot, n2).unwrap());
        assert_eq!(list(&db, slot).unwrap()[0].name, n1.record());
        delete_all(&db, slot).unwrap();
        assert!(list(&db, slot).unwrap().is_empty());
    }
}
