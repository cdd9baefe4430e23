//! Occurrence records: one per declaration, definition or reference of a binding in a file.

use serde::Serialize;

use crate::storage::database::{Database, PTR_SIZE, SHORT_SIZE, THREE_BYTE_SIZE};
use crate::types::{PdomError, RecPtr, Result};

const FILE: u64 = 0;
const FILE_NEXT: u64 = 4;
const CALLER: u64 = 8;
const BINDING: u64 = 12;
pub(crate) const BINDING_PREV: u64 = 16;
pub(crate) const BINDING_NEXT: u64 = 20;
const OFFSET: u64 = 24;
const LENGTH: u64 = 27;
const FLAGS: u64 = 29;
/// Size of a name record.
pub const RECORD_SIZE: usize = 6 * PTR_SIZE + THREE_BYTE_SIZE + SHORT_SIZE + 1;

const ROLE_MASK: u8 = 0x03;
const SPECIFIER_MASK: u8 = 0x0C;
const POLYMORPHIC_CALL: u8 = 0x10;
const READ_ACCESS: u8 = 0x20;
const WRITE_ACCESS: u8 = 0x40;
const POTENTIAL_MATCH: u8 = 0x80;

/// Largest offset a name record can hold.
pub const MAX_OFFSET: u32 = (1 << 24) - 1;

/// What an occurrence does with its binding.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NameRole {
    /// Declares the binding.
    Declaration,
    /// Defines the binding.
    Definition,
    /// Uses the binding.
    Reference,
}

impl NameRole {
    fn bits(self) -> u8 {
        match self {
            NameRole::Declaration => 1,
            NameRole::Definition => 2,
            NameRole::Reference => 3,
        }
    }

    fn from_bits(bits: u8) -> Option<Self> {
        match bits & ROLE_MASK {
            1 => Some(NameRole::Declaration),
            2 => Some(NameRole::Definition),
            3 => Some(NameRole::Reference),
            _ => None,
        }
    }
}

/// Syntactic position of an occurrence that matters to the index.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Specifier {
    /// Plain occurrence.
    #[default]
    None,
    /// Named in a friend declaration.
    Friend,
    /// Named in a base clause.
    Base,
    /// Name of an inline namespace definition.
    InlineNamespace,
}

impl Specifier {
    fn bits(self) -> u8 {
        match self {
            Specifier::None => 0,
            Specifier::Friend => 0x04,
            Specifier::Base => 0x08,
            Specifier::InlineNamespace => 0x0C,
        }
    }

    fn from_bits(bits: u8) -> Self {
        match bits & SPECIFIER_MASK {
            0x04 => Specifier::Friend,
            0x08 => Specifier::Base,
            0x0C => Specifier::InlineNamespace,
            _ => Specifier::None,
        }
    }
}

/// The flags byte of a name record.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct NameFlags(u8);

impl NameFlags {
    /// Flags of an occurrence with `role` and nothing else set.
    pub fn new(role: NameRole) -> Self {
        Self(role.bits())
    }

    /// Raw byte.
    pub fn bits(self) -> u8 {
        self.0
    }

    /// Parses a stored flags byte.
    pub fn from_bits(bits: u8) -> Result<Self> {
        NameRole::from_bits(bits)
            .map(|_| Self(bits))
            .ok_or_else(|| PdomError::corruption(format!("name flags {bits:#04x} have no role")))
    }

    /// Sets the specifier.
    pub fn with_specifier(self, specifier: Specifier) -> Self {
        Self((self.0 & !SPECIFIER_MASK) | specifier.bits())
    }

    /// Records read and write access of a reference.
    pub fn with_access(self, read: bool, write: bool) -> Self {
        let mut bits = self.0 & !(READ_ACCESS | WRITE_ACCESS);
        if read {
            bits |= READ_ACCESS;
        }
        if write {
            bits |= WRITE_ACCESS;
        }
        Self(bits)
    }

    /// Marks a call that may dispatch to overriders.
    pub fn with_polymorphic_call(self, polymorphic: bool) -> Self {
        self.set(POLYMORPHIC_CALL, polymorphic)
    }

    /// Marks a reference resolved by heuristics only.
    pub fn with_potential_match(self, potential: bool) -> Self {
        self.set(POTENTIAL_MATCH, potential)
    }

    fn set(self, bit: u8, on: bool) -> Self {
        if on {
            Self(self.0 | bit)
        } else {
            Self(self.0 & !bit)
        }
    }

    /// Role encoded in the flags.
    pub fn role(self) -> NameRole {
        NameRole::from_bits(self.0).unwrap_or(NameRole::Reference)
    }

    /// Specifier encoded in the flags.
    pub fn specifier(self) -> Specifier {
        Specifier::from_bits(self.0)
    }

    /// Reads the binding.
    pub fn is_read(self) -> bool {
        self.0 & READ_ACCESS != 0
    }

    /// Writes the binding.
    pub fn is_write(self) -> bool {
        self.0 & WRITE_ACCESS != 0
    }

    /// Call that may dispatch to overriders.
    pub fn is_polymorphic_call(self) -> bool {
        self.0 & POLYMORPHIC_CALL != 0
    }

    /// Resolved by heuristics only.
    pub fn is_potential_match(self) -> bool {
        self.0 & POTENTIAL_MATCH != 0
    }
}

/// Handle to a name record.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Name {
    record: RecPtr,
}

impl Name {
    /// Handle to the name at `record`.
    pub fn at(record: RecPtr) -> Self {
        Self { record }
    }

    /// Allocates a name owned by `file` and pointing at `binding`. Chain fields start null.
    pub(crate) fn create(
        db: &Database,
        file: RecPtr,
        binding: RecPtr,
        caller: RecPtr,
        offset: u32,
        length: u16,
        flags: NameFlags,
    ) -> Result<Self> {
        if offset > MAX_OFFSET {
            return Err(PdomError::Invalid("name offset does not fit three bytes"));
        }
        let record = db.malloc(RECORD_SIZE)?;
        db.put_rec_ptr(record.add(FILE), file)?;
        db.put_rec_ptr(record.add(CALLER), caller)?;
        db.put_rec_ptr(record.add(BINDING), binding)?;
        db.put_three_byte_uint(record.add(OFFSET), offset)?;
        db.put_short(record.add(LENGTH), length as i16)?;
        db.put_byte(record.add(FLAGS), flags.bits())?;
        Ok(Self { record })
    }

    /// Record of the name.
    pub fn record(&self) -> RecPtr {
        self.record
    }

    /// File the occurrence is in.
    pub fn file(&self, db: &Database) -> Result<RecPtr> {
        db.get_rec_ptr(self.record.add(FILE))
    }

    pub(crate) fn set_file(&self, db: &Database, file: RecPtr) -> Result<()> {
        db.put_rec_ptr(self.record.add(FILE), file)
    }

    /// Next name of the same file.
    pub fn next_in_file(&self, db: &Database) -> Result<Option<Name>> {
        Ok(db.get_rec_ptr(self.record.add(FILE_NEXT))?.non_null().map(Name::at))
    }

    pub(crate) fn set_next_in_file(&self, db: &Database, next: RecPtr) -> Result<()> {
        db.put_rec_ptr(self.record.add(FILE_NEXT), next)
    }

    /// Definition name enclosing this occurrence, if any.
    pub fn caller(&self, db: &Database) -> Result<Option<Name>> {
        Ok(db.get_rec_ptr(self.record.add(CALLER))?.non_null().map(Name::at))
    }

    /// Binding the occurrence belongs to.
    pub fn binding(&self, db: &Database) -> Result<RecPtr> {
        db.get_rec_ptr(self.record.add(BINDING))
    }

    /// Previous name in the binding chain.
    pub fn prev_in_binding(&self, db: &Database) -> Result<RecPtr> {
        db.get_rec_ptr(self.record.add(BINDING_PREV))
    }

    /// Next name in the binding chain.
    pub fn next_in_binding(&self, db: &Database) -> Result<RecPtr> {
        db.get_rec_ptr(self.record.add(BINDING_NEXT))
    }

    pub(crate) fn set_prev_in_binding(&self, db: &Database, prev: RecPtr) -> Result<()> {
        db.put_rec_ptr(self.record.add(BINDING_PREV), prev)
    }

    pub(crate) fn set_next_in_binding(&self, db: &Database, next: RecPtr) -> Result<()> {
        db.put_rec_ptr(self.record.add(BINDING_NEXT), next)
    }

    /// Offset of the occurrence in its file.
    pub fn offset(&self, db: &Database) -> Result<u32> {
        db.get_three_byte_uint(self.record.add(OFFSET))
    }

    /// Length of the occurrence.
    pub fn length(&self, db: &Database) -> Result<u16> {
        Ok(db.get_short(self.record.add(LENGTH))? as u16)
    }

    /// Flags byte.
    pub fn flags(&self, db: &Database) -> Result<NameFlags> {
        NameFlags::from_bits(db.get_byte(self.record.add(FLAGS))?)
    }

    /// Role of the occurrence.
    pub fn role(&self, db: &Database) -> Result<NameRole> {
        Ok(self.flags(db)?.role())
    }

    /// Returns true for names in a base clause.
    pub fn is_base_specifier(&self, db: &Database) -> Result<bool> {
        Ok(self.flags(db)?.specifier() == Specifier::Base)
    }

    /// Frees the record. The name must already be unlinked from its binding and file.
    pub(crate) fn free(self, db: &Database) -> Result<()> {
        db.free(self.record)
    }
}

/// Iterates a binding chain through the `BINDING_NEXT` fields.
pub struct BindingChain<'db> {
    db: &'db Database,
    next: RecPtr,
}

impl<'db> BindingChain<'db> {
    pub(crate) fn new(db: &'db Database, first: RecPtr) -> Self {
        Self { db, next: first }
    }
}

impl Iterator for BindingChain<'_> {
    type Item = Result<Name>;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next.non_null()?;
        let name = Name::at(current);
        match name.next_in_binding(self.db) {
            Ok(next) => {
                self.next = next;
                Some(Ok(name))
            }
            Err(err) => {
                self.next = RecPtr::NULL;
                Some(Err(err))
            }
        }
    }
}

/// Iterates the names of a file in insertion order.
pub struct FileNames<'db> {
    db: &'db Database,
    next: RecPtr,
}

impl<'db> FileNames<'db> {
    pub(crate) fn new(db: &'db Database, first: RecPtr) -> Self {
        Self { db, next: first }
    }
}

impl Iterator for FileNames<'_> {
    type Item = Result<Name>;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next.non_null()?;
        let name = Name::at(current);
        match self.db.get_rec_ptr(current.add(FILE_NEXT)) {
            Ok(next) => {
                self.next = next;
                Some(Ok(name))
            }
            Err(err) => {
                self.next = RecPtr::NULL;
                Some(Err(err))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::DatabaseOptions;

    #[test]
    fn record_fields_roundtrip() {
        let db = Database::in_memory(DatabaseOptions::default()).unwrap();
        assert_eq!(RECORD_SIZE, 30);
        let flags = NameFlags::new(NameRole::Reference)
            .with_specifier(Specifier::Base)
            .with_access(true, false)
            .with_potential_match(true);
        let name = Name::create(&db, RecPtr(4098), RecPtr(4106), RecPtr::NULL, 70_000, 12, flags)
            .unwrap();
        assert_eq!(name.file(&db).unwrap(), RecPtr(4098));
        assert_eq!(name.binding(&db).unwrap(), RecPtr(4106));
        assert_eq!(name.caller(&db).unwrap(), None);
        assert_eq!(name.offset(&db).unwrap(), 70_000);
        assert_eq!(name.length(&db).unwrap(), 12);
        let stored = name.flags(&db).unwrap();
        assert_eq!(stored.role(), NameRole::Reference);
        assert_eq!(stored.specifier(), Specifier::Base);
        assert!(stored.is_read() && !stored.is_write());
        assert!(stored.is_potential_match() && !stored.is_polymorphic_call());
        assert!(name.is_base_specifier(&db).unwrap());
    }

    #[test]
    fn oversized_offset_is_rejected() {
        let db = Database::in_memory(DatabaseOptions::default()).unwrap();
        let flags = NameFlags::new(NameRole::Declaration);
        let err = Name::create(&db, RecPtr::NULL, RecPtr::NULL, RecPtr::NULL, 1 << 24, 1, flags)
            .unwrap_err();
        assert!(matches!(err, PdomError::Invalid(_)));
    }

    #[test]
    fn flags_without_role_are_corrupt() {
        assert!(NameFlags::from_bits(0x20).is_err());
        assert_eq!(
            NameFlags::from_bits(0x0E).unwrap().specifier(),
            Specifier::InlineNamespace
        );
    }
}
