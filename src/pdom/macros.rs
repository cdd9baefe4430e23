//! Macro definitions and references, grouped by name under per-linkage containers.
//!
//! A container is a named node in its linkage's macro index. It heads a doubly linked
//! chain of definitions and one of references, both prepended like binding chains. A
//! container with neither is removed from the index by its linkage.

use serde::Serialize;

use super::named::{self, NamedNode};
use super::node::{self, MACRO_CONTAINER_NODE};
use crate::storage::database::{Database, INT_SIZE, PTR_SIZE, SHORT_SIZE};
use crate::storage::DbString;
use crate::types::{LinkageId, RecPtr, Result};

const FIRST_DEF: u64 = named::RECORD_SIZE as u64;
const FIRST_REF: u64 = FIRST_DEF + PTR_SIZE as u64;
const CONTAINER_SIZE: usize = named::RECORD_SIZE + 2 * PTR_SIZE;

/// A macro to be stored: a `#define` or an `#undef`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MacroDefinition {
    /// Macro name.
    pub name: String,
    /// Parameter names of function-style macros.
    pub parameters: Option<Vec<String>>,
    /// Replacement text.
    pub expansion: String,
    /// Offset of the macro name in the file.
    pub name_offset: u32,
    /// Length of the macro name.
    pub name_length: u16,
    /// `#undef` rather than `#define`.
    pub undef: bool,
}

impl MacroDefinition {
    /// Object-like `#define name expansion`.
    pub fn object(name: impl Into<String>, expansion: impl Into<String>, name_offset: u32) -> Self {
        let name = name.into();
        Self {
            name_length: name.len() as u16,
            name,
            parameters: None,
            expansion: expansion.into(),
            name_offset,
            undef: false,
        }
    }

    /// Function-style `#define name(parameters) expansion`.
    pub fn function(
        name: impl Into<String>,
        parameters: Vec<String>,
        expansion: impl Into<String>,
        name_offset: u32,
    ) -> Self {
        Self {
            parameters: Some(parameters),
            ..Self::object(name, expansion, name_offset)
        }
    }

    /// `#undef name`.
    pub fn undef(name: impl Into<String>, name_offset: u32) -> Self {
        Self {
            undef: true,
            ..Self::object(name, "", name_offset)
        }
    }
}

/// A use of a macro name.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MacroUse {
    /// Macro name.
    pub name: String,
    /// Offset in the file.
    pub offset: u32,
    /// Length.
    pub length: u16,
    /// Used in a conditional directive (`#ifdef`, `defined`).
    pub conditional: bool,
}

/// Handle to a macro container.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MacroContainer {
    node: NamedNode,
    linkage: LinkageId,
}

impl MacroContainer {
    /// Handle to the container at `record`.
    pub fn at(record: RecPtr, linkage: LinkageId) -> Self {
        Self {
            node: NamedNode::at(record),
            linkage,
        }
    }

    pub(crate) fn create(
        db: &Database,
        linkage: LinkageId,
        linkage_record: RecPtr,
        name: &str,
    ) -> Result<Self> {
        let record = db.malloc(CONTAINER_SIZE)?;
        node::write_header(db, record, linkage, MACRO_CONTAINER_NODE, linkage_record)?;
        NamedNode::init_name(db, record, name)?;
        Ok(Self::at(record, linkage))
    }

    /// Record of the container.
    pub fn record(&self) -> RecPtr {
        self.node.record()
    }

    /// Linkage owning the container.
    pub fn linkage(&self) -> LinkageId {
        self.linkage
    }

    /// Macro name.
    pub fn name(&self, db: &Database) -> Result<String> {
        self.node.name(db)
    }

    /// Macro name bytes.
    pub fn name_bytes(&self, db: &Database) -> Result<&[u8]> {
        self.node.name_bytes(db)
    }

    /// Definitions and undefs, most recent first.
    pub fn definitions(&self, db: &Database) -> Result<Vec<Macro>> {
        let mut out = Vec::new();
        let mut next = db.get_rec_ptr(self.record().add(FIRST_DEF))?;
        while !next.is_null() {
            let current = Macro::at(next);
            next = current.next_in_container(db)?;
            out.push(current);
        }
        Ok(out)
    }

    /// References, most recent first.
    pub fn references(&self, db: &Database) -> Result<Vec<MacroReference>> {
        let mut out = Vec::new();
        let mut next = db.get_rec_ptr(self.record().add(FIRST_REF))?;
        while !next.is_null() {
            let current = MacroReference::at(next);
            next = db.get_rec_ptr(next.add(MacroReference::CONTAINER_NEXT))?;
            out.push(current);
        }
        Ok(out)
    }

    /// Returns true when no definition or reference is left.
    pub fn is_orphaned(&self, db: &Database) -> Result<bool> {
        Ok(db.get_rec_ptr(self.record().add(FIRST_DEF))?.is_null()
            && db.get_rec_ptr(self.record().add(FIRST_REF))?.is_null())
    }

    pub(crate) fn add_definition(&self, db: &Database, definition: Macro) -> Result<()> {
        prepend(
            db,
            self.record().add(FIRST_DEF),
            definition.record,
            Macro::PREV_IN_CONTAINER,
            Macro::NEXT_IN_CONTAINER,
        )
    }

    pub(crate) fn remove_definition(&self, db: &Database, definition: Macro) -> Result<()> {
        unlink(
            db,
            self.record().add(FIRST_DEF),
            definition.record,
            Macro::PREV_IN_CONTAINER,
            Macro::NEXT_IN_CONTAINER,
        )
    }

    pub(crate) fn add_reference(&self, db: &Database, reference: MacroReference) -> Result<()> {
        prepend(
            db,
            self.record().add(FIRST_REF),
            reference.record,
            MacroReference::CONTAINER_PREV,
            MacroReference::CONTAINER_NEXT,
        )
    }

    pub(crate) fn remove_reference(&self, db: &Database, reference: MacroReference) -> Result<()> {
        unlink(
            db,
            self.record().add(FIRST_REF),
            reference.record,
            MacroReference::CONTAINER_PREV,
            MacroReference::CONTAINER_NEXT,
        )
    }

    /// Frees the name and the record. The container must be out of the macro index.
    pub(crate) fn free(&self, db: &Database) -> Result<()> {
        NamedNode::delete_name(db, self.record())?;
        db.free(self.record())
    }
}

fn prepend(db: &Database, head: RecPtr, record: RecPtr, prev: u64, next: u64) -> Result<()> {
    let first = db.get_rec_ptr(head)?;
    db.put_rec_ptr(record.add(prev), RecPtr::NULL)?;
    db.put_rec_ptr(record.add(next), first)?;
    if !first.is_null() {
        db.put_rec_ptr(first.add(prev), record)?;
    }
    db.put_rec_ptr(head, record)
}

fn unlink(db: &Database, head: RecPtr, record: RecPtr, prev: u64, next: u64) -> Result<()> {
    let before = db.get_rec_ptr(record.add(prev))?;
    let after = db.get_rec_ptr(record.add(next))?;
    if !after.is_null() {
        db.put_rec_ptr(after.add(prev), before)?;
    }
    if before.is_null() {
        db.put_rec_ptr(head, after)?;
    } else {
        db.put_rec_ptr(before.add(next), after)?;
    }
    db.put_rec_ptr(record.add(prev), RecPtr::NULL)?;
    db.put_rec_ptr(record.add(next), RecPtr::NULL)
}

/// Handle to a macro definition (or undef) record.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Macro {
    record: RecPtr,
}

/// Decoded macro definition, as reported by queries.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct MacroInfo {
    /// Macro name.
    pub name: String,
    /// Parameters of function-style macros.
    pub parameters: Option<Vec<String>>,
    /// Replacement text.
    pub expansion: String,
    /// `#undef`
    pub undef: bool,
    /// Offset of the name in its file.
    pub name_offset: u32,
}

impl Macro {
    const CONTAINER: u64 = 0;
    const FILE: u64 = 4;
    const PARAMETERS: u64 = 8;
    const EXPANSION: u64 = 12;
    const NEXT_IN_FILE: u64 = 16;
    const NEXT_IN_CONTAINER: u64 = 20;
    const PREV_IN_CONTAINER: u64 = 24;
    const NAME_OFFSET: u64 = 28;
    const NAME_LENGTH: u64 = Self::NAME_OFFSET + INT_SIZE as u64;
    const FLAGS: u64 = Self::NAME_LENGTH + SHORT_SIZE as u64;
    const RECORD_SIZE: usize = Self::FLAGS as usize + 1;

    const UNDEF: u8 = 0x01;
    const FUNCTION_STYLE: u8 = 0x02;

    /// Handle to the macro at `record`.
    pub fn at(record: RecPtr) -> Self {
        Self { record }
    }

    pub(crate) fn create(
        db: &Database,
        container: RecPtr,
        file: RecPtr,
        definition: &MacroDefinition,
    ) -> Result<Self> {
        let record = db.malloc(Self::RECORD_SIZE)?;
        db.put_rec_ptr(record.add(Self::CONTAINER), container)?;
        db.put_rec_ptr(record.add(Self::FILE), file)?;
        let mut flags = 0;
        if definition.undef {
            flags |= Self::UNDEF;
        }
        if let Some(parameters) = &definition.parameters {
            flags |= Self::FUNCTION_STYLE;
            let joined = DbString::create(db, &parameters.join(","))?;
            db.put_rec_ptr(record.add(Self::PARAMETERS), joined.record())?;
        }
        if !definition.undef {
            let expansion = DbString::create(db, &definition.expansion)?;
            db.put_rec_ptr(record.add(Self::EXPANSION), expansion.record())?;
        }
        db.put_int(record.add(Self::NAME_OFFSET), definition.name_offset as i32)?;
        db.put_short(record.add(Self::NAME_LENGTH), definition.name_length as i16)?;
        db.put_byte(record.add(Self::FLAGS), flags)?;
        Ok(Self { record })
    }

    /// Record of the macro.
    pub fn record(&self) -> RecPtr {
        self.record
    }

    /// Container record.
    pub fn container(&self, db: &Database) -> Result<RecPtr> {
        db.get_rec_ptr(self.record.add(Self::CONTAINER))
    }

    /// File defining the macro.
    pub fn file(&self, db: &Database) -> Result<RecPtr> {
        db.get_rec_ptr(self.record.add(Self::FILE))
    }

    pub(crate) fn set_file(&self, db: &Database, file: RecPtr) -> Result<()> {
        db.put_rec_ptr(self.record.add(Self::FILE), file)
    }

    /// Next macro of the same file.
    pub fn next_in_file(&self, db: &Database) -> Result<RecPtr> {
        db.get_rec_ptr(self.record.add(Self::NEXT_IN_FILE))
    }

    pub(crate) fn set_next_in_file(&self, db: &Database, next: RecPtr) -> Result<()> {
        db.put_rec_ptr(self.record.add(Self::NEXT_IN_FILE), next)
    }

    fn next_in_container(&self, db: &Database) -> Result<RecPtr> {
        db.get_rec_ptr(self.record.add(Self::NEXT_IN_CONTAINER))
    }

    fn flags(&self, db: &Database) -> Result<u8> {
        db.get_byte(self.record.add(Self::FLAGS))
    }

    /// `#undef` rather than `#define`.
    pub fn is_undef(&self, db: &Database) -> Result<bool> {
        Ok(self.flags(db)? & Self::UNDEF != 0)
    }

    /// Parameters of function-style macros.
    pub fn parameters(&self, db: &Database) -> Result<Option<Vec<String>>> {
        if self.flags(db)? & Self::FUNCTION_STYLE == 0 {
            return Ok(None);
        }
        let stored = db.get_rec_ptr(self.record.add(Self::PARAMETERS))?;
        let joined = DbString::at(stored).read(db)?;
        if joined.is_empty() {
            return Ok(Some(Vec::new()));
        }
        Ok(Some(joined.split(',').map(str::to_string).collect()))
    }

    /// Replacement text; empty for undefs.
    pub fn expansion(&self, db: &Database) -> Result<String> {
        let stored = db.get_rec_ptr(self.record.add(Self::EXPANSION))?;
        if stored.is_null() {
            return Ok(String::new());
        }
        DbString::at(stored).read(db)
    }

    /// Offset of the macro name.
    pub fn name_offset(&self, db: &Database) -> Result<u32> {
        Ok(db.get_int(self.record.add(Self::NAME_OFFSET))? as u32)
    }

    /// Length of the macro name.
    pub fn name_length(&self, db: &Database) -> Result<u16> {
        Ok(db.get_short(self.record.add(Self::NAME_LENGTH))? as u16)
    }

    /// Decodes every field.
    pub fn info(&self, db: &Database) -> Result<MacroInfo> {
        Ok(MacroInfo {
            name: NamedNode::at(self.container(db)?).name(db)?,
            parameters: self.parameters(db)?,
            expansion: self.expansion(db)?,
            undef: self.is_undef(db)?,
            name_offset: self.name_offset(db)?,
        })
    }

    /// Frees owned strings and the record. The macro must be unlinked from its container.
    pub(crate) fn free(self, db: &Database) -> Result<()> {
        for slot in [Self::PARAMETERS, Self::EXPANSION] {
            let stored = db.get_rec_ptr(self.record.add(slot))?;
            if !stored.is_null() {
                DbString::at(stored).delete(db)?;
            }
        }
        db.free(self.record)
    }
}

/// Handle to a macro reference record.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct MacroReference {
    record: RecPtr,
}

impl MacroReference {
    const FILE: u64 = 0;
    const FILE_NEXT: u64 = 4;
    const CONTAINER: u64 = 8;
    const CONTAINER_PREV: u64 = 12;
    const CONTAINER_NEXT: u64 = 16;
    const OFFSET: u64 = 20;
    const LENGTH: u64 = Self::OFFSET + INT_SIZE as u64;
    const FLAGS: u64 = Self::LENGTH + SHORT_SIZE as u64;
    const RECORD_SIZE: usize = Self::FLAGS as usize + 1;

    const CONDITIONAL: u8 = 0x01;

    /// Handle to the reference at `record`.
    pub fn at(record: RecPtr) -> Self {
        Self { record }
    }

    pub(crate) fn create(db: &Database, container: RecPtr, file: RecPtr, use_: &MacroUse) -> Result<Self> {
        let record = db.malloc(Self::RECORD_SIZE)?;
        db.put_rec_ptr(record.add(Self::FILE), file)?;
        db.put_rec_ptr(record.add(Self::CONTAINER), container)?;
        db.put_int(record.add(Self::OFFSET), use_.offset as i32)?;
        db.put_short(record.add(Self::LENGTH), use_.length as i16)?;
        db.put_byte(
            record.add(Self::FLAGS),
            if use_.conditional { Self::CONDITIONAL } else { 0 },
        )?;
        Ok(Self { record })
    }

    /// Record of the reference.
    pub fn record(&self) -> RecPtr {
        self.record
    }

    /// File the reference is in.
    pub fn file(&self, db: &Database) -> Result<RecPtr> {
        db.get_rec_ptr(self.record.add(Self::FILE))
    }

    pub(crate) fn set_file(&self, db: &Database, file: RecPtr) -> Result<()> {
        db.put_rec_ptr(self.record.add(Self::FILE), file)
    }

    /// Next reference of the same file.
    pub fn next_in_file(&self, db: &Database) -> Result<RecPtr> {
        db.get_rec_ptr(self.record.add(Self::FILE_NEXT))
    }

    pub(crate) fn set_next_in_file(&self, db: &Database, next: RecPtr) -> Result<()> {
        db.put_rec_ptr(self.record.add(Self::FILE_NEXT), next)
    }

    /// Container record.
    pub fn container(&self, db: &Database) -> Result<RecPtr> {
        db.get_rec_ptr(self.record.add(Self::CONTAINER))
    }

    /// Offset in the file.
    pub fn offset(&self, db: &Database) -> Result<u32> {
        Ok(db.get_int(self.record.add(Self::OFFSET))? as u32)
    }

    /// Length.
    pub fn length(&self, db: &Database) -> Result<u16> {
        Ok(db.get_short(self.record.add(Self::LENGTH))? as u16)
    }

    /// Used in a conditional directive.
    pub fn is_conditional(&self, db: &Database) -> Result<bool> {
        Ok(db.get_byte(self.record.add(Self::FLAGS))? & Self::CONDITIONAL != 0)
    }

    pub(crate) fn free(self, db: &Database) -> Result<()> {
        db.free(self.record)
    }
}
