//! Include edges between files.
//!
//! An include sits on two lists at once: the singly linked outgoing list of the including
//! file (in directive order) and the doubly linked incoming list of the included file,
//! whose head is the context include when there is one.

use serde::Serialize;

use crate::storage::database::{Database, INT_SIZE, SHORT_SIZE};
use crate::storage::DbString;
use crate::types::{RecPtr, Result};

const INCLUDES: u64 = 0;
const INCLUDED_BY: u64 = 4;
const NEXT_IN_INCLUDES: u64 = 8;
pub(crate) const NEXT_IN_INCLUDED_BY: u64 = 12;
pub(crate) const PREV_IN_INCLUDED_BY: u64 = 16;
const NAME: u64 = 20;
const OFFSET: u64 = 24;
const LENGTH: u64 = OFFSET + INT_SIZE as u64;
const FLAGS: u64 = LENGTH + SHORT_SIZE as u64;
/// Size of an include record.
pub const RECORD_SIZE: usize = FLAGS as usize + 1;

const RESOLVED: u8 = 0x01;
const SYSTEM: u8 = 0x02;

/// An include directive as seen by the parser.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IncludeInfo {
    /// Name as written in the directive, without delimiters.
    pub name: String,
    /// Offset of the name.
    pub offset: u32,
    /// Length of the name.
    pub length: u16,
    /// `#include <...>`
    pub system: bool,
    /// File the directive resolved to.
    pub target: Option<RecPtr>,
    /// This inclusion produced the indexed variant of the target.
    pub context: bool,
}

impl IncludeInfo {
    /// Unresolved `#include "name"` at `offset`.
    pub fn new(name: impl Into<String>, offset: u32) -> Self {
        let name = name.into();
        Self {
            length: name.len() as u16,
            name,
            offset,
            system: false,
            target: None,
            context: false,
        }
    }

    /// Resolves the directive to `file`.
    pub fn resolved_to(mut self, file: RecPtr) -> Self {
        self.target = file.non_null();
        self
    }

    /// Marks the directive as the context inclusion of its target.
    pub fn as_context(mut self) -> Self {
        self.context = true;
        self
    }

    /// Marks the directive as a system include.
    pub fn system(mut self) -> Self {
        self.system = true;
        self
    }
}

/// Decoded include, as reported by queries.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct IncludeSummary {
    /// Directive name.
    pub name: String,
    /// Offset of the name.
    pub offset: u32,
    /// Target file record, if resolved.
    pub target: Option<u64>,
    /// System include.
    pub system: bool,
}

/// Handle to an include record.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Include {
    record: RecPtr,
}

impl Include {
    /// Handle to the include at `record`.
    pub fn at(record: RecPtr) -> Self {
        Self { record }
    }

    pub(crate) fn create(db: &Database, source: RecPtr, info: &IncludeInfo) -> Result<Self> {
        let record = db.malloc(RECORD_SIZE)?;
        let name = DbString::create(db, &info.name)?;
        db.put_rec_ptr(record.add(INCLUDED_BY), source)?;
        db.put_rec_ptr(record.add(INCLUDES), info.target.unwrap_or_default())?;
        db.put_rec_ptr(record.add(NAME), name.record())?;
        db.put_int(record.add(OFFSET), info.offset as i32)?;
        db.put_short(record.add(LENGTH), info.length as i16)?;
        let mut flags = 0;
        if info.target.is_some() {
            flags |= RESOLVED;
        }
        if info.system {
            flags |= SYSTEM;
        }
        db.put_byte(record.add(FLAGS), flags)?;
        Ok(Self { record })
    }

    /// Record of the include.
    pub fn record(&self) -> RecPtr {
        self.record
    }

    /// Included file; null when unresolved.
    pub fn includes(&self, db: &Database) -> Result<RecPtr> {
        db.get_rec_ptr(self.record.add(INCLUDES))
    }

    pub(crate) fn set_includes(&self, db: &Database, file: RecPtr) -> Result<()> {
        db.put_rec_ptr(self.record.add(INCLUDES), file)
    }

    /// Including file.
    pub fn included_by(&self, db: &Database) -> Result<RecPtr> {
        db.get_rec_ptr(self.record.add(INCLUDED_BY))
    }

    pub(crate) fn set_included_by(&self, db: &Database, file: RecPtr) -> Result<()> {
        db.put_rec_ptr(self.record.add(INCLUDED_BY), file)
    }

    /// Next outgoing include of the including file.
    pub fn next_in_includes(&self, db: &Database) -> Result<RecPtr> {
        db.get_rec_ptr(self.record.add(NEXT_IN_INCLUDES))
    }

    pub(crate) fn set_next_in_includes(&self, db: &Database, next: RecPtr) -> Result<()> {
        db.put_rec_ptr(self.record.add(NEXT_IN_INCLUDES), next)
    }

    /// Next incoming include of the included file.
    pub fn next_in_included_by(&self, db: &Database) -> Result<RecPtr> {
        db.get_rec_ptr(self.record.add(NEXT_IN_INCLUDED_BY))
    }

    /// Previous incoming include of the included file.
    pub fn prev_in_included_by(&self, db: &Database) -> Result<RecPtr> {
        db.get_rec_ptr(self.record.add(PREV_IN_INCLUDED_BY))
    }

    /// Name as written in the directive.
    pub fn name(&self, db: &Database) -> Result<String> {
        let stored = db.get_rec_ptr(self.record.add(NAME))?;
        if stored.is_null() {
            return Ok(String::new());
        }
        DbString::at(stored).read(db)
    }

    /// Offset of the directive name.
    pub fn offset(&self, db: &Database) -> Result<u32> {
        Ok(db.get_int(self.record.add(OFFSET))? as u32)
    }

    /// Length of the directive name.
    pub fn length(&self, db: &Database) -> Result<u16> {
        Ok(db.get_short(self.record.add(LENGTH))? as u16)
    }

    /// The directive resolved to a file.
    pub fn is_resolved(&self, db: &Database) -> Result<bool> {
        Ok(db.get_byte(self.record.add(FLAGS))? & RESOLVED != 0)
    }

    /// `#include <...>`
    pub fn is_system(&self, db: &Database) -> Result<bool> {
        Ok(db.get_byte(self.record.add(FLAGS))? & SYSTEM != 0)
    }

    /// Decodes every field.
    pub fn summary(&self, db: &Database) -> Result<IncludeSummary> {
        Ok(IncludeSummary {
            name: self.name(db)?,
            offset: self.offset(db)?,
            target: self.includes(db)?.non_null().map(|file| file.0),
            system: self.is_system(db)?,
        })
    }

    /// Frees the name and the record. The include must be off both lists.
    pub(crate) fn free(self, db: &Database) -> Result<()> {
        let name = db.get_rec_ptr(self.record.add(NAME))?;
        if !name.is_null() {
            DbString::at(name).delete(db)?;
        }
        db.free(self.record)
    }
}

/// Links `include` into the incoming list headed at `head`: first when it is the context
/// include or the list is empty, second otherwise.
pub(crate) fn add_included_by(db: &Database, head: RecPtr, include: Include, context: bool) -> Result<()> {
    let first = db.get_rec_ptr(head)?;
    let record = include.record();
    if context || first.is_null() {
        db.put_rec_ptr(record.add(PREV_IN_INCLUDED_BY), RecPtr::NULL)?;
        db.put_rec_ptr(record.add(NEXT_IN_INCLUDED_BY), first)?;
        if !first.is_null() {
            db.put_rec_ptr(first.add(PREV_IN_INCLUDED_BY), record)?;
        }
        return db.put_rec_ptr(head, record);
    }
    let second = db.get_rec_ptr(first.add(NEXT_IN_INCLUDED_BY))?;
    db.put_rec_ptr(record.add(PREV_IN_INCLUDED_BY), first)?;
    db.put_rec_ptr(record.add(NEXT_IN_INCLUDED_BY), second)?;
    if !second.is_null() {
        db.put_rec_ptr(second.add(PREV_IN_INCLUDED_BY), record)?;
    }
    db.put_rec_ptr(first.add(NEXT_IN_INCLUDED_BY), record)
}

/// Unlinks `include` from the incoming list headed at `head`.
pub(crate) fn remove_included_by(db: &Database, head: RecPtr, include: Include) -> Result<()> {
    let record = include.record();
    let prev = db.get_rec_ptr(record.add(PREV_IN_INCLUDED_BY))?;
    let next = db.get_rec_ptr(record.add(NEXT_IN_INCLUDED_BY))?;
    if !next.is_null() {
        db.put_rec_ptr(next.add(PREV_IN_INCLUDED_BY), prev)?;
    }
    if prev.is_null() {
        if db.get_rec_ptr(head)? == record {
            db.put_rec_ptr(head, next)?;
        }
    } else {
        db.put_rec_ptr(prev.add(NEXT_IN_INCLUDED_BY), next)?;
    }
    db.put_rec_ptr(record.add(PREV_IN_INCLUDED_BY), RecPtr::NULL)?;
    db.put_rec_ptr(record.add(NEXT_IN_INCLUDED_BY), RecPtr::NULL)
}

/// Records of the incoming list headed at `head`, in list order.
pub(crate) fn included_by_list(db: &Database, head: RecPtr) -> Result<Vec<Include>> {
    let mut out = Vec::new();
    let mut next = db.get_rec_ptr(head)?;
    while !next.is_null() {
        let include = Include::at(next);
        next = include.next_in_included_by(db)?;
        out.push(include);
    }
    Ok(out)
}
