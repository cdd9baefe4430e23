//! Using directives (C++), kept per file as a list linked from the newest entry backwards.

use crate::storage::database::Database;
use crate::types::{RecPtr, Result};

const NAMESPACE: u64 = 0;
const FILE: u64 = 4;
const OFFSET: u64 = 8;
const PREV_IN_FILE: u64 = 12;
const RECORD_SIZE: usize = 16;

/// Handle to a using-directive record.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct UsingDirective {
    record: RecPtr,
}

impl UsingDirective {
    /// Handle to the directive at `record`.
    pub fn at(record: RecPtr) -> Self {
        Self { record }
    }

    pub(crate) fn create(
        db: &Database,
        file: RecPtr,
        namespace: RecPtr,
        offset: u32,
        prev: RecPtr,
    ) -> Result<Self> {
        let record = db.malloc(RECORD_SIZE)?;
        db.put_rec_ptr(record.add(NAMESPACE), namespace)?;
        db.put_rec_ptr(record.add(FILE), file)?;
        db.put_int(record.add(OFFSET), offset as i32)?;
        db.put_rec_ptr(record.add(PREV_IN_FILE), prev)?;
        Ok(Self { record })
    }

    /// Record of the directive.
    pub fn record(&self) -> RecPtr {
        self.record
    }

    /// Nominated namespace binding.
    pub fn namespace(&self, db: &Database) -> Result<RecPtr> {
        db.get_rec_ptr(self.record.add(NAMESPACE))
    }

    /// File containing the directive.
    pub fn file(&self, db: &Database) -> Result<RecPtr> {
        db.get_rec_ptr(self.record.add(FILE))
    }

    pub(crate) fn set_file(&self, db: &Database, file: RecPtr) -> Result<()> {
        db.put_rec_ptr(self.record.add(FILE), file)
    }

    /// Offset of the directive.
    pub fn offset(&self, db: &Database) -> Result<u32> {
        Ok(db.get_int(self.record.add(OFFSET))? as u32)
    }

    /// Directive added before this one in the same file.
    pub fn prev_in_file(&self, db: &Database) -> Result<RecPtr> {
        db.get_rec_ptr(self.record.add(PREV_IN_FILE))
    }

    pub(crate) fn free(self, db: &Database) -> Result<()> {
        db.free(self.record)
    }
}

/// Directives of the list ending at `last`, newest first.
pub(crate) fn list(db: &Database, last: RecPtr) -> Result<Vec<UsingDirective>> {
    let mut out = Vec::new();
    let mut next = last;
    while !next.is_null() {
        let directive = UsingDirective::at(next);
        next = directive.prev_in_file(db)?;
        out.push(directive);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::DatabaseOptions;

    #[test]
    fn newest_directive_comes_first() {
        let db = Database::in_memory(DatabaseOptions::default()).unwrap();
        let first = UsingDirective::create(&db, RecPtr(4098), RecPtr(10), 4, RecPtr::NULL).unwrap();
        let second = UsingDirective::create(&db, RecPtr(4098), RecPtr(18), 40, first.record()).unwrap();
        assert_eq!(list(&db, second.record()).unwrap(), vec![second, first]);
        assert_eq!(second.namespace(&db).unwrap(), RecPtr(18));
        assert_eq!(first.offset(&db).unwrap(), 4);
    }
}
