use std::cell::OnceCell;

use super::node;
use crate::storage::database::{Database, PTR_SIZE};
use crate::storage::strings::{self, DbString};
use crate::types::{PdomError, RecPtr, Result};

pub(crate) const NAME: u64 = node::RECORD_SIZE as u64;
/// Size of the named node header.
pub const RECORD_SIZE: usize = node::RECORD_SIZE + PTR_SIZE;

/// Node with a name, which lives in its own heap string.
///
/// The first read of the name is kept in the handle; [`NamedNode::update_name`] replaces
/// both the stored string and that copy.
#[derive(Clone, Debug)]
pub struct NamedNode {
    record: RecPtr,
    name: OnceCell<Box<[u8]>>,
}

impl PartialEq for NamedNode {
    fn eq(&self, other: &Self) -> bool {
        self.record == other.record
    }
}

impl Eq for NamedNode {}

impl NamedNode {
    /// Handle to the named node at `record`.
    pub fn at(record: RecPtr) -> Self {
        Self {
            record,
            name: OnceCell::new(),
        }
    }

    /// Record of the node.
    pub fn record(&self) -> RecPtr {
        self.record
    }

    /// Stores `name` for the freshly allocated node at `record`.
    pub(crate) fn init_name(db: &Database, record: RecPtr, name: &str) -> Result<()> {
        let stored = DbString::create(db, name)?;
        db.put_rec_ptr(record.add(NAME), stored.record())
    }

    /// Name bytes, read from the store at most once per handle.
    pub fn name_bytes(&self, db: &Database) -> Result<&[u8]> {
        if let Some(cached) = self.name.get() {
            return Ok(&cached[..]);
        }
        let bytes = name_of(db, self.record)?.into_boxed_slice();
        Ok(&self.name.get_or_init(|| bytes)[..])
    }

    /// Name as a string.
    pub fn name(&self, db: &Database) -> Result<String> {
        String::from_utf8(self.name_bytes(db)?.to_vec())
            .map_err(|_| PdomError::corruption(format!("name of {} is not UTF-8", self.record)))
    }

    /// Returns true if the node is called exactly `candidate`.
    ///
    /// Uses the cached name when the handle has one, and the store otherwise.
    pub fn has_name(&self, db: &Database, candidate: &[u8]) -> Result<bool> {
        if let Some(cached) = self.name.get() {
            return Ok(&cached[..] == candidate);
        }
        let stored = db.get_rec_ptr(self.record.add(NAME))?;
        if stored.is_null() {
            return Ok(candidate.is_empty());
        }
        Ok(DbString::at(stored).compare(db, candidate, true)? == std::cmp::Ordering::Equal)
    }

    /// Replaces the stored name.
    pub fn update_name(&mut self, db: &Database, name: &str) -> Result<()> {
        let old = db.get_rec_ptr(self.record.add(NAME))?;
        Self::init_name(db, self.record, name)?;
        if !old.is_null() {
            DbString::at(old).delete(db)?;
        }
        self.name = OnceCell::new();
        Ok(())
    }

    /// Frees the name string of the node at `record`.
    pub(crate) fn delete_name(db: &Database, record: RecPtr) -> Result<()> {
        let stored = db.get_rec_ptr(record.add(NAME))?;
        if !stored.is_null() {
            DbString::at(stored).delete(db)?;
            db.put_rec_ptr(record.add(NAME), RecPtr::NULL)?;
        }
        Ok(())
    }
}

/// Name bytes of the named node at `record`, bypassing any handle cache.
pub fn name_of(db: &Database, record: RecPtr) -> Result<Vec<u8>> {
    let stored = db.get_rec_ptr(record.add(NAME))?;
    if stored.is_null() {
        return Ok(Vec::new());
    }
    DbString::at(stored).bytes(db)
}

/// Compares the names of two named nodes in index order.
pub fn compare_names(db: &Database, a: RecPtr, b: RecPtr) -> Result<std::cmp::Ordering> {
    Ok(strings::compare_compatible_with_ignore_case(
        &name_of(db, a)?,
        &name_of(db, b)?,
    ))
}
