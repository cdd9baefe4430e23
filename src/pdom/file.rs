//! File records: the owners of names, macros, macro references, includes and using
//! directives.
//!
//! Files live in the file index, ordered by location string, then linkage id, then the
//! significant-macros signature, so one header may be indexed several times under
//! different macro contexts. The outgoing lists keep insertion order; the incoming include
//! list keeps the context include first.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use serde::Serialize;
use tracing::{debug, trace};

use super::binding::Binding;
use super::include::{self, Include, IncludeInfo};
use super::linkage::{BaseSpecifier, Linkage};
use super::location::IndexLocation;
use super::macros::{Macro, MacroContainer, MacroDefinition, MacroReference, MacroUse};
use super::name::{FileNames, Name, NameFlags, NameRole, Specifier};
use super::node;
use super::symbol::SourceSymbol;
use super::using::{self, UsingDirective};
use super::Pdom;
use crate::primitives::concurrency::YieldPoint;
use crate::storage::database::Database;
use crate::storage::{BTreeVisitor, DbString, RecordComparator, VisitFlow};
use crate::types::{LinkageId, PdomError, RecPtr, Result};

const FIRST_NAME: u64 = 0;
const FIRST_INCLUDE: u64 = 4;
const FIRST_INCLUDED_BY: u64 = 8;
const FIRST_MACRO: u64 = 12;
const LOCATION: u64 = 16;
const LINKAGE_ID: u64 = 20;
const FLAGS: u64 = 23;
const TIMESTAMP: u64 = 24;
const CONTENT_HASH: u64 = 32;
const ENCODING_HASH: u64 = 40;
const LAST_USING_DIRECTIVE: u64 = 44;
const FIRST_MACRO_REFERENCE: u64 = 48;
const SIGNIFICANT_MACROS: u64 = 52;
/// Size of a file record.
pub const RECORD_SIZE: usize = 56;

const PRAGMA_ONCE: u8 = 0x01;

/// Timestamp of a file without indexed content.
pub const NO_CONTENT: i64 = -1;

/// Seed of [`content_hash`].
const CONTENT_HASH_SEED: u64 = 0x7064_6f6d;

/// Hash of file contents stored in the file record.
pub fn content_hash(contents: &[u8]) -> u64 {
    xxhash_rust::xxh64::xxh64(contents, CONTENT_HASH_SEED)
}

/// Macro definitions in effect at an inclusion point that change how a header parses.
///
/// `None` values stand for macros that must be undefined.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SignificantMacros {
    macros: BTreeMap<String, Option<String>>,
}

impl SignificantMacros {
    /// The empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requires `name` to be defined as `value`.
    pub fn define(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.macros.insert(name.into(), Some(value.into()));
        self
    }

    /// Requires `name` to be undefined.
    pub fn undefine(mut self, name: impl Into<String>) -> Self {
        self.macros.insert(name.into(), None);
        self
    }

    /// Returns true when no macro is significant.
    pub fn is_empty(&self) -> bool {
        self.macros.is_empty()
    }

    /// Canonical string form, stored in the file record and used as index key.
    pub fn signature(&self) -> String {
        let mut out = String::new();
        for (name, value) in &self.macros {
            match value {
                Some(value) => {
                    out.push_str(name);
                    out.push('=');
                    out.push_str(value);
                }
                None => {
                    out.push('!');
                    out.push_str(name);
                }
            }
            out.push(';');
        }
        out
    }
}

fn read_optional_string(db: &Database, slot: RecPtr) -> Result<Vec<u8>> {
    let stored = db.get_rec_ptr(slot)?;
    if stored.is_null() {
        return Ok(Vec::new());
    }
    DbString::at(stored).bytes(db)
}

fn compare_optional_string(db: &Database, slot: RecPtr, key: &[u8]) -> Result<Ordering> {
    let stored = db.get_rec_ptr(slot)?;
    if stored.is_null() {
        return Ok(0usize.cmp(&key.len()));
    }
    DbString::at(stored).compare(db, key, true)
}

/// Order of the file index.
#[derive(Copy, Clone, Debug, Default)]
pub struct FileIndexOrder;

impl RecordComparator for FileIndexOrder {
    fn compare(&self, db: &Database, a: RecPtr, b: RecPtr) -> Result<Ordering> {
        let cmp = read_optional_string(db, a.add(LOCATION))?
            .cmp(&read_optional_string(db, b.add(LOCATION))?);
        if cmp != Ordering::Equal {
            return Ok(cmp);
        }
        let cmp = db
            .get_three_byte_uint(a.add(LINKAGE_ID))?
            .cmp(&db.get_three_byte_uint(b.add(LINKAGE_ID))?);
        if cmp != Ordering::Equal {
            return Ok(cmp);
        }
        Ok(read_optional_string(db, a.add(SIGNIFICANT_MACROS))?
            .cmp(&read_optional_string(db, b.add(SIGNIFICANT_MACROS))?))
    }
}

/// Finds files by location, optionally narrowed to one linkage and one signature.
pub(crate) struct FileLookup<'a> {
    pub(crate) location: &'a [u8],
    pub(crate) key: Option<(LinkageId, &'a [u8])>,
    pub(crate) found: Vec<RecPtr>,
}

impl BTreeVisitor for FileLookup<'_> {
    fn compare(&mut self, db: &Database, record: RecPtr) -> Result<Ordering> {
        let cmp = compare_optional_string(db, record.add(LOCATION), self.location)?;
        if cmp != Ordering::Equal {
            return Ok(cmp);
        }
        let Some((linkage, signature)) = self.key else {
            return Ok(Ordering::Equal);
        };
        let cmp = db
            .get_three_byte_uint(record.add(LINKAGE_ID))?
            .cmp(&u32::from(linkage.0));
        if cmp != Ordering::Equal {
            return Ok(cmp);
        }
        compare_optional_string(db, record.add(SIGNIFICANT_MACROS), signature)
    }

    fn visit(&mut self, _db: &Database, record: RecPtr) -> Result<VisitFlow> {
        self.found.push(record);
        Ok(if self.key.is_some() {
            VisitFlow::StopFound
        } else {
            VisitFlow::Continue
        })
    }
}

/// One occurrence handed to [`File::add_names`].
#[derive(Clone, Copy)]
pub struct NameOccurrence<'a> {
    /// Symbol the occurrence resolves to.
    pub symbol: &'a dyn SourceSymbol,
    /// Declaration, definition or reference.
    pub role: NameRole,
    /// Offset in the file.
    pub offset: u32,
    /// Length of the occurrence.
    pub length: u16,
    /// Syntactic position.
    pub specifier: Specifier,
    /// Base-clause details, for base specifiers.
    pub base: Option<BaseSpecifier>,
    /// Read access.
    pub read: bool,
    /// Write access.
    pub write: bool,
    /// Call that may dispatch to overriders.
    pub polymorphic_call: bool,
    /// Resolved by heuristics only.
    pub potential_match: bool,
    /// Index of the enclosing definition among the occurrences already passed.
    pub caller: Option<usize>,
    /// Linkage the symbol belongs to, when it differs from the file's.
    pub linkage: Option<LinkageId>,
}

impl<'a> NameOccurrence<'a> {
    /// Occurrence with no flags besides its role.
    pub fn new(symbol: &'a dyn SourceSymbol, role: NameRole, offset: u32, length: u16) -> Self {
        Self {
            symbol,
            role,
            offset,
            length,
            specifier: Specifier::None,
            base: None,
            read: false,
            write: false,
            polymorphic_call: false,
            potential_match: false,
            caller: None,
            linkage: None,
        }
    }

    /// Marks the occurrence as a base-clause name.
    pub fn as_base(mut self, base: BaseSpecifier) -> Self {
        self.specifier = Specifier::Base;
        self.base = Some(base);
        self
    }

    /// Sets the specifier.
    pub fn with_specifier(mut self, specifier: Specifier) -> Self {
        self.specifier = specifier;
        self
    }

    /// Sets read and write access.
    pub fn with_access(mut self, read: bool, write: bool) -> Self {
        self.read = read;
        self.write = write;
        self
    }

    /// Sets the enclosing definition.
    pub fn within(mut self, caller: usize) -> Self {
        self.caller = Some(caller);
        self
    }

    /// Resolves the symbol in `linkage` instead of the file's linkage.
    pub fn in_linkage(mut self, linkage: LinkageId) -> Self {
        self.linkage = Some(linkage);
        self
    }

    fn flags(&self) -> NameFlags {
        NameFlags::new(self.role)
            .with_specifier(self.specifier)
            .with_access(self.read, self.write)
            .with_polymorphic_call(self.polymorphic_call)
            .with_potential_match(self.potential_match)
    }
}

/// Metadata of a file, as reported by queries.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FileSummary {
    /// Record of the file.
    pub record: u64,
    /// Stored location string.
    pub location: String,
    /// Linkage of the file.
    pub linkage: String,
    /// Significant-macros signature.
    pub significant_macros: String,
    /// Timestamp; `-1` without content.
    pub timestamp: i64,
    /// Content hash.
    pub content_hash: u64,
    /// `#pragma once`
    pub pragma_once: bool,
    /// Number of names.
    pub names: usize,
    /// Number of macros.
    pub macros: usize,
    /// Number of outgoing includes.
    pub includes: usize,
}

/// Handle to a file record.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct File {
    record: RecPtr,
}

impl File {
    /// Handle to the file at `record`.
    pub fn at(record: RecPtr) -> Self {
        Self { record }
    }

    pub(crate) fn create(
        db: &Database,
        linkage: LinkageId,
        location: &str,
        macros: &SignificantMacros,
    ) -> Result<Self> {
        let record = db.malloc(RECORD_SIZE)?;
        let stored = DbString::create(db, location)?;
        db.put_rec_ptr(record.add(LOCATION), stored.record())?;
        db.put_three_byte_uint(record.add(LINKAGE_ID), u32::from(linkage.0))?;
        if !macros.is_empty() {
            let signature = DbString::create(db, &macros.signature())?;
            db.put_rec_ptr(record.add(SIGNIFICANT_MACROS), signature.record())?;
        }
        db.put_long(record.add(TIMESTAMP), NO_CONTENT)?;
        trace!(record = %record, location, "pdom.file.create");
        Ok(Self { record })
    }

    /// Record of the file.
    pub fn record(&self) -> RecPtr {
        self.record
    }

    /// Stored location string.
    pub fn location(&self, db: &Database) -> Result<String> {
        let bytes = read_optional_string(db, self.record.add(LOCATION))?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Decoded location, or `None` when the stored string cannot be decoded.
    pub fn index_location(&self, pdom: &Pdom) -> Result<Option<IndexLocation>> {
        let internal = self.location(pdom.db())?;
        if let Some(hit) = pdom.caches().location(&internal) {
            return Ok(Some(hit));
        }
        let decoded = pdom.converter().from_internal(&internal);
        if let Some(location) = &decoded {
            pdom.caches().put_location(internal, location.clone());
        }
        Ok(decoded)
    }

    /// Linkage of the file.
    pub fn linkage_id(&self, db: &Database) -> Result<LinkageId> {
        Ok(LinkageId(db.get_three_byte_uint(self.record.add(LINKAGE_ID))? as u16))
    }

    /// Significant-macros signature; empty for the default context.
    pub fn significant_macros(&self, db: &Database) -> Result<String> {
        let bytes = read_optional_string(db, self.record.add(SIGNIFICANT_MACROS))?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Modification time of the indexed content; [`NO_CONTENT`] without content.
    pub fn timestamp(&self, db: &Database) -> Result<i64> {
        db.get_long(self.record.add(TIMESTAMP))
    }

    /// Sets the timestamp.
    pub fn set_timestamp(&self, db: &Database, timestamp: i64) -> Result<()> {
        db.put_long(self.record.add(TIMESTAMP), timestamp)
    }

    /// Returns true once content has been indexed.
    pub fn has_content(&self, db: &Database) -> Result<bool> {
        Ok(self.timestamp(db)? != NO_CONTENT)
    }

    /// Hash of the indexed content.
    pub fn content_hash(&self, db: &Database) -> Result<u64> {
        Ok(db.get_long(self.record.add(CONTENT_HASH))? as u64)
    }

    /// Sets the content hash.
    pub fn set_content_hash(&self, db: &Database, hash: u64) -> Result<()> {
        db.put_long(self.record.add(CONTENT_HASH), hash as i64)
    }

    /// Hash of the encoding the content was decoded with.
    pub fn encoding_hash(&self, db: &Database) -> Result<u32> {
        Ok(db.get_int(self.record.add(ENCODING_HASH))? as u32)
    }

    /// Sets the encoding hash.
    pub fn set_encoding_hash(&self, db: &Database, hash: u32) -> Result<()> {
        db.put_int(self.record.add(ENCODING_HASH), hash as i32)
    }

    /// `#pragma once`
    pub fn has_pragma_once(&self, db: &Database) -> Result<bool> {
        Ok(db.get_byte(self.record.add(FLAGS))? & PRAGMA_ONCE != 0)
    }

    /// Sets the pragma-once flag.
    pub fn set_pragma_once(&self, db: &Database, pragma_once: bool) -> Result<()> {
        let flags = db.get_byte(self.record.add(FLAGS))?;
        let flags = if pragma_once {
            flags | PRAGMA_ONCE
        } else {
            flags & !PRAGMA_ONCE
        };
        db.put_byte(self.record.add(FLAGS), flags)
    }

    /// Names in insertion order.
    pub fn names<'db>(&self, db: &'db Database) -> Result<FileNames<'db>> {
        Ok(FileNames::new(db, db.get_rec_ptr(self.record.add(FIRST_NAME))?))
    }

    /// Outgoing includes in directive order.
    pub fn includes(&self, db: &Database) -> Result<Vec<Include>> {
        let mut out = Vec::new();
        let mut next = db.get_rec_ptr(self.record.add(FIRST_INCLUDE))?;
        while !next.is_null() {
            let include = Include::at(next);
            next = include.next_in_includes(db)?;
            out.push(include);
        }
        Ok(out)
    }

    /// Incoming includes, context include first.
    pub fn included_by(&self, db: &Database) -> Result<Vec<Include>> {
        include::included_by_list(db, self.record.add(FIRST_INCLUDED_BY))
    }

    /// Macros in definition order.
    pub fn macros(&self, db: &Database) -> Result<Vec<Macro>> {
        let mut out = Vec::new();
        let mut next = db.get_rec_ptr(self.record.add(FIRST_MACRO))?;
        while !next.is_null() {
            let current = Macro::at(next);
            next = current.next_in_file(db)?;
            out.push(current);
        }
        Ok(out)
    }

    /// Macro references in insertion order.
    pub fn macro_references(&self, db: &Database) -> Result<Vec<MacroReference>> {
        let mut out = Vec::new();
        let mut next = db.get_rec_ptr(self.record.add(FIRST_MACRO_REFERENCE))?;
        while !next.is_null() {
            let current = MacroReference::at(next);
            next = current.next_in_file(db)?;
            out.push(current);
        }
        Ok(out)
    }

    /// Using directives, newest first.
    pub fn using_directives(&self, db: &Database) -> Result<Vec<UsingDirective>> {
        using::list(db, db.get_rec_ptr(self.record.add(LAST_USING_DIRECTIVE))?)
    }

    /// Metadata and list sizes.
    pub fn summary(&self, db: &Database) -> Result<FileSummary> {
        let mut names = 0;
        for name in self.names(db)? {
            name?;
            names += 1;
        }
        Ok(FileSummary {
            record: self.record.0,
            location: self.location(db)?,
            linkage: self.linkage_id(db)?.name().to_string(),
            significant_macros: self.significant_macros(db)?,
            timestamp: self.timestamp(db)?,
            content_hash: self.content_hash(db)?,
            pragma_once: self.has_pragma_once(db)?,
            names,
            macros: self.macros(db)?.len(),
            includes: self.includes(db)?.len(),
        })
    }

    fn last_in_list(
        db: &Database,
        head: RecPtr,
        next_of: impl Fn(RecPtr) -> Result<RecPtr>,
    ) -> Result<RecPtr> {
        let mut last = RecPtr::NULL;
        let mut next = db.get_rec_ptr(head)?;
        while !next.is_null() {
            last = next;
            next = next_of(next)?;
        }
        Ok(last)
    }

    /// Stores `occurrences` as names of this file, appended in order.
    ///
    /// Each occurrence is resolved through [`Linkage::add_binding`]; occurrences whose
    /// symbol cannot be stored are skipped. The write lock is offered to waiting threads
    /// through `yield_point` every `yield_interval` occurrences. Returns the created names,
    /// `None` for skipped occurrences.
    pub fn add_names(
        &self,
        pdom: &Pdom,
        occurrences: &[NameOccurrence<'_>],
        yield_point: &mut dyn YieldPoint,
    ) -> Result<Vec<Option<Name>>> {
        let db = pdom.db();
        let file_linkage = self.linkage_id(db)?;
        let interval = pdom.options().yield_interval.max(1) as usize;
        let mut tail = Self::last_in_list(db, self.record.add(FIRST_NAME), |record| {
            Ok(Name::at(record).next_in_file(db)?.map(|n| n.record()).unwrap_or_default())
        })?;
        let mut created: Vec<Option<Name>> = Vec::with_capacity(occurrences.len());
        for (index, occurrence) in occurrences.iter().enumerate() {
            if index > 0 && index % interval == 0 {
                yield_point.yield_point();
            }
            let caller = match occurrence.caller {
                Some(at) if at >= index => {
                    return Err(PdomError::Invalid("caller must precede the occurrence"))
                }
                Some(at) => created[at].map(|name| name.record()).unwrap_or_default(),
                None => RecPtr::NULL,
            };
            let linkage = pdom.create_linkage(occurrence.linkage.unwrap_or(file_linkage))?;
            let Some(binding) = linkage.add_binding(pdom, occurrence.symbol)? else {
                trace!(name = occurrence.symbol.name(), "pdom.file.add_names.skip");
                created.push(None);
                continue;
            };
            let name = Name::create(
                db,
                self.record,
                binding.record(),
                caller,
                occurrence.offset,
                occurrence.length,
                occurrence.flags(),
            )?;
            if tail.is_null() {
                db.put_rec_ptr(self.record.add(FIRST_NAME), name.record())?;
            } else {
                Name::at(tail).set_next_in_file(db, name.record())?;
            }
            tail = name.record();
            binding.add_name(db, name, file_linkage)?;
            linkage.on_create_name(pdom, name, occurrence.base)?;
            created.push(Some(name));
        }
        debug!(file = %self.record, names = occurrences.len(), "pdom.file.add_names");
        Ok(created)
    }

    /// Stores macro definitions and undefs, appended in order.
    pub fn add_macros(&self, pdom: &Pdom, definitions: &[MacroDefinition]) -> Result<Vec<Macro>> {
        let db = pdom.db();
        let linkage = pdom.create_linkage(self.linkage_id(db)?)?;
        let mut tail = Self::last_in_list(db, self.record.add(FIRST_MACRO), |record| {
            Macro::at(record).next_in_file(db)
        })?;
        let mut created = Vec::with_capacity(definitions.len());
        for definition in definitions {
            let Some(container) = linkage.macro_container(pdom, &definition.name, true)? else {
                continue;
            };
            let stored = Macro::create(db, container.record(), self.record, definition)?;
            container.add_definition(db, stored)?;
            if tail.is_null() {
                db.put_rec_ptr(self.record.add(FIRST_MACRO), stored.record())?;
            } else {
                Macro::at(tail).set_next_in_file(db, stored.record())?;
            }
            tail = stored.record();
            created.push(stored);
        }
        trace!(file = %self.record, macros = created.len(), "pdom.file.add_macros");
        Ok(created)
    }

    /// Stores macro references, appended in order.
    pub fn add_macro_references(&self, pdom: &Pdom, uses: &[MacroUse]) -> Result<Vec<MacroReference>> {
        let db = pdom.db();
        let linkage = pdom.create_linkage(self.linkage_id(db)?)?;
        let mut tail = Self::last_in_list(db, self.record.add(FIRST_MACRO_REFERENCE), |record| {
            MacroReference::at(record).next_in_file(db)
        })?;
        let mut created = Vec::with_capacity(uses.len());
        for use_ in uses {
            let Some(container) = linkage.macro_container(pdom, &use_.name, true)? else {
                continue;
            };
            let reference = MacroReference::create(db, container.record(), self.record, use_)?;
            container.add_reference(db, reference)?;
            if tail.is_null() {
                db.put_rec_ptr(self.record.add(FIRST_MACRO_REFERENCE), reference.record())?;
            } else {
                MacroReference::at(tail).set_next_in_file(db, reference.record())?;
            }
            tail = reference.record();
            created.push(reference);
        }
        Ok(created)
    }

    /// Stores the include directives of this file, appended in order, and links the
    /// resolved ones into their targets' incoming lists.
    pub fn add_includes_to(&self, pdom: &Pdom, infos: &[IncludeInfo]) -> Result<Vec<Include>> {
        let db = pdom.db();
        let mut tail = Self::last_in_list(db, self.record.add(FIRST_INCLUDE), |record| {
            Include::at(record).next_in_includes(db)
        })?;
        let mut created = Vec::with_capacity(infos.len());
        for info in infos {
            let include = Include::create(db, self.record, info)?;
            if tail.is_null() {
                db.put_rec_ptr(self.record.add(FIRST_INCLUDE), include.record())?;
            } else {
                Include::at(tail).set_next_in_includes(db, include.record())?;
            }
            tail = include.record();
            if let Some(target) = info.target {
                File::at(target).add_included_by(db, include, info.context)?;
            }
            created.push(include);
        }
        Ok(created)
    }

    /// Links `include` into this file's incoming list; a context include goes first,
    /// any other include second.
    pub fn add_included_by(&self, db: &Database, include: Include, context: bool) -> Result<()> {
        include::add_included_by(db, self.record.add(FIRST_INCLUDED_BY), include, context)
    }

    /// Records a using directive nominating `namespace` at `offset`.
    pub fn add_using_directive(
        &self,
        db: &Database,
        namespace: &Binding,
        offset: u32,
    ) -> Result<UsingDirective> {
        let slot = self.record.add(LAST_USING_DIRECTIVE);
        let previous = db.get_rec_ptr(slot)?;
        let directive = UsingDirective::create(db, self.record, namespace.record(), offset, previous)?;
        db.put_rec_ptr(slot, directive.record())?;
        Ok(directive)
    }

    /// Deletes the content of the file: using directives, includes, macros, macro
    /// references and names, in that order, then marks the file as having no content.
    ///
    /// Incoming includes are kept; the file keeps its identity.
    pub fn clear(&self, pdom: &Pdom) -> Result<()> {
        let db = pdom.db();
        let file_linkage = self.linkage_id(db)?;

        for directive in self.using_directives(db)? {
            directive.free(db)?;
        }
        db.put_rec_ptr(self.record.add(LAST_USING_DIRECTIVE), RecPtr::NULL)?;

        for include in self.includes(db)? {
            let target = include.includes(db)?;
            if !target.is_null() {
                include::remove_included_by(db, target.add(FIRST_INCLUDED_BY), include)?;
            }
            include.free(db)?;
        }
        db.put_rec_ptr(self.record.add(FIRST_INCLUDE), RecPtr::NULL)?;

        for stored in self.macros(db)? {
            let container = self.container_of(pdom, stored.container(db)?)?;
            if let Some((linkage, container)) = &container {
                container.remove_definition(db, stored)?;
                stored.free(db)?;
                linkage.remove_macro_container_if_orphaned(pdom, container)?;
            } else {
                stored.free(db)?;
            }
        }
        db.put_rec_ptr(self.record.add(FIRST_MACRO), RecPtr::NULL)?;

        for reference in self.macro_references(db)? {
            let container = self.container_of(pdom, reference.container(db)?)?;
            if let Some((linkage, container)) = &container {
                container.remove_reference(db, reference)?;
                reference.free(db)?;
                linkage.remove_macro_container_if_orphaned(pdom, container)?;
            } else {
                reference.free(db)?;
            }
        }
        db.put_rec_ptr(self.record.add(FIRST_MACRO_REFERENCE), RecPtr::NULL)?;

        let names = self.names(db)?.collect::<Result<Vec<_>>>()?;
        let mut owners = Vec::with_capacity(names.len());
        for name in &names {
            let binding = Binding::load(db, name.binding(db)?)?;
            let linkage = pdom.linkage(binding.linkage())?.ok_or_else(|| {
                PdomError::corruption(format!("binding {} has no linkage", binding.record()))
            })?;
            linkage.on_delete_name(pdom, *name)?;
            owners.push(binding);
        }
        for (name, binding) in names.into_iter().zip(owners) {
            binding.remove_name(db, name, file_linkage)?;
            name.free(db)?;
        }
        db.put_rec_ptr(self.record.add(FIRST_NAME), RecPtr::NULL)?;

        self.set_timestamp(db, NO_CONTENT)?;
        debug!(file = %self.record, "pdom.file.clear");
        Ok(())
    }

    fn container_of(&self, pdom: &Pdom, record: RecPtr) -> Result<Option<(Linkage, MacroContainer)>> {
        if record.is_null() {
            return Ok(None);
        }
        let (id, _) = node::read_tag(pdom.db(), record)?;
        Ok(pdom
            .linkage(id)?
            .map(|linkage| (linkage, MacroContainer::at(record, id))))
    }

    /// Moves the content of `source` into this file and frees `source`.
    ///
    /// This file is cleared first. Names, includes, macros, macro references and using
    /// directives of `source` are re-owned by this file together with its timestamp,
    /// hashes and flags. Includes that targeted `source` are retargeted here, after the
    /// ones already present. `source` is removed from the file index if it is there.
    pub fn replace_contents_from(&self, pdom: &Pdom, source: File) -> Result<()> {
        if source == *self {
            return Err(PdomError::Invalid("file cannot replace its own contents"));
        }
        let db = pdom.db();
        self.clear(pdom)?;

        for name in source.names(db)? {
            name?.set_file(db, self.record)?;
        }
        for include in source.includes(db)? {
            include.set_included_by(db, self.record)?;
        }
        for stored in source.macros(db)? {
            stored.set_file(db, self.record)?;
        }
        for reference in source.macro_references(db)? {
            reference.set_file(db, self.record)?;
        }
        for directive in source.using_directives(db)? {
            directive.set_file(db, self.record)?;
        }
        for slot in [
            FIRST_NAME,
            FIRST_INCLUDE,
            FIRST_MACRO,
            FIRST_MACRO_REFERENCE,
            LAST_USING_DIRECTIVE,
        ] {
            db.put_rec_ptr(self.record.add(slot), db.get_rec_ptr(source.record.add(slot))?)?;
            db.put_rec_ptr(source.record.add(slot), RecPtr::NULL)?;
        }
        self.set_timestamp(db, source.timestamp(db)?)?;
        self.set_content_hash(db, source.content_hash(db)?)?;
        self.set_encoding_hash(db, source.encoding_hash(db)?)?;
        db.put_byte(self.record.add(FLAGS), db.get_byte(source.record.add(FLAGS))?)?;

        let incoming = source.included_by(db)?;
        let mut tail = self.included_by(db)?.last().map(Include::record).unwrap_or_default();
        for include in incoming {
            include.set_includes(db, self.record)?;
            db.put_rec_ptr(include.record().add(include::PREV_IN_INCLUDED_BY), tail)?;
            db.put_rec_ptr(include.record().add(include::NEXT_IN_INCLUDED_BY), RecPtr::NULL)?;
            if tail.is_null() {
                db.put_rec_ptr(self.record.add(FIRST_INCLUDED_BY), include.record())?;
            } else {
                db.put_rec_ptr(tail.add(include::NEXT_IN_INCLUDED_BY), include.record())?;
            }
            tail = include.record();
        }
        db.put_rec_ptr(source.record.add(FIRST_INCLUDED_BY), RecPtr::NULL)?;

        pdom.file_index().delete(db, source.record)?;
        source.free(db)?;
        debug!(file = %self.record, source = %source.record, "pdom.file.replace_contents");
        Ok(())
    }

    /// Frees the strings and the record. The file must be empty and out of the index.
    pub(crate) fn free(self, db: &Database) -> Result<()> {
        for slot in [LOCATION, SIGNIFICANT_MACROS] {
            let stored = db.get_rec_ptr(self.record.add(slot))?;
            if !stored.is_null() {
                DbString::at(stored).delete(db)?;
            }
        }
        db.free(self.record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_is_canonical() {
        let a = SignificantMacros::new().define("B", "2").undefine("A").define("C", "");
        let b = SignificantMacros::new().define("C", "").define("B", "2").undefine("A");
        assert_eq!(a.signature(), b.signature());
        assert_eq!(a.signature(), "!A;B=2;C=;");
        assert_eq!(SignificantMacros::new().signature(), "");
    }

    #[test]
    fn content_hash_is_stable() {
        assert_eq!(content_hash(b"int x;"), content_hash(b"int x;"));
        assert_ne!(content_hash(b"int x;"), content_hash(b"int y;"));
    }
}
