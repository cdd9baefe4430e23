//! Bindings: named nodes that own the occurrence chains of one program symbol.
//!
//! A binding heads three doubly linked chains of [`Name`] records (declarations,
//! definitions, references) plus the external reference lists of [`super::extref`].
//! New names are prepended, so every chain iterates most recent first.

use std::cmp::Ordering;

use super::extref::{self, ExternalReferences};
use super::name::{BindingChain, Name, NameRole};
use super::named::{self, NamedNode};
use super::node::{self, BindingKind, LINKAGE_NODE};
use crate::storage::database::{Database, PTR_SIZE};
use crate::types::{LinkageId, PdomError, RecPtr, Result};

const FIRST_DECL: u64 = named::RECORD_SIZE as u64;
const FIRST_DEF: u64 = FIRST_DECL + PTR_SIZE as u64;
const FIRST_REF: u64 = FIRST_DEF + PTR_SIZE as u64;
pub(crate) const LOCAL_TO_FILE: u64 = FIRST_REF + PTR_SIZE as u64;
const FIRST_EXTREF: u64 = LOCAL_TO_FILE + PTR_SIZE as u64;
/// Size of the common binding record; kind specific fields follow.
pub const RECORD_SIZE: usize = named::RECORD_SIZE + 5 * PTR_SIZE;

/// Handle to a binding record.
#[derive(Clone, Debug)]
pub struct Binding {
    node: NamedNode,
    linkage: LinkageId,
    kind: BindingKind,
}

impl PartialEq for Binding {
    fn eq(&self, other: &Self) -> bool {
        self.node == other.node
    }
}

impl Eq for Binding {}

impl Binding {
    /// Handle to the binding of `kind` at `record`.
    pub fn at(record: RecPtr, linkage: LinkageId, kind: BindingKind) -> Self {
        Self {
            node: NamedNode::at(record),
            linkage,
            kind,
        }
    }

    /// Loads the handle of the binding at `record` from its node header.
    pub fn load(db: &Database, record: RecPtr) -> Result<Self> {
        let (linkage, node_type) = node::read_tag(db, record)?;
        let kind = BindingKind::from_node_type(node_type).ok_or_else(|| {
            PdomError::corruption(format!("record {record} is not a binding (type {node_type})"))
        })?;
        Ok(Self::at(record, linkage, kind))
    }

    /// Allocates a binding record with the common fields set and kind fields zeroed.
    pub(crate) fn create(
        db: &Database,
        linkage: LinkageId,
        kind: BindingKind,
        parent: RecPtr,
        name: &str,
        local_to_file: RecPtr,
        record_size: usize,
    ) -> Result<Self> {
        debug_assert!(record_size >= RECORD_SIZE);
        let record = db.malloc(record_size)?;
        node::write_header(db, record, linkage, kind.node_type(), parent)?;
        NamedNode::init_name(db, record, name)?;
        db.put_rec_ptr(record.add(LOCAL_TO_FILE), local_to_file)?;
        Ok(Self::at(record, linkage, kind))
    }

    /// Record of the binding.
    pub fn record(&self) -> RecPtr {
        self.node.record()
    }

    /// Linkage the binding belongs to.
    pub fn linkage(&self) -> LinkageId {
        self.linkage
    }

    /// Kind of the binding.
    pub fn kind(&self) -> BindingKind {
        self.kind
    }

    /// Named node view of the binding.
    pub fn named(&self) -> &NamedNode {
        &self.node
    }

    /// Name bytes.
    pub fn name_bytes(&self, db: &Database) -> Result<&[u8]> {
        self.node.name_bytes(db)
    }

    /// Name.
    pub fn name(&self, db: &Database) -> Result<String> {
        self.node.name(db)
    }

    /// Returns true if the binding is called exactly `candidate`.
    pub fn has_name(&self, db: &Database, candidate: &[u8]) -> Result<bool> {
        self.node.has_name(db, candidate)
    }

    /// Record of the scope owning the binding: its linkage or an enclosing binding.
    pub fn parent(&self, db: &Database) -> Result<RecPtr> {
        node::parent(db, self.record())
    }

    /// Returns true if the binding sits directly in its linkage's global scope.
    pub fn is_global(&self, db: &Database) -> Result<bool> {
        is_linkage_record(db, self.parent(db)?)
    }

    /// File a file-local binding is restricted to, or null.
    pub fn local_to_file(&self, db: &Database) -> Result<RecPtr> {
        db.get_rec_ptr(self.record().add(LOCAL_TO_FILE))
    }

    /// Returns true for bindings visible in one file only.
    pub fn is_file_local(&self, db: &Database) -> Result<bool> {
        Ok(!self.local_to_file(db)?.is_null())
    }

    /// Most recent declaration.
    pub fn first_declaration(&self, db: &Database) -> Result<Option<Name>> {
        self.head(db, FIRST_DECL)
    }

    /// Most recent definition.
    pub fn first_definition(&self, db: &Database) -> Result<Option<Name>> {
        self.head(db, FIRST_DEF)
    }

    /// Most recent reference from a file of the binding's own linkage.
    pub fn first_reference(&self, db: &Database) -> Result<Option<Name>> {
        self.head(db, FIRST_REF)
    }

    fn head(&self, db: &Database, slot: u64) -> Result<Option<Name>> {
        Ok(db.get_rec_ptr(self.record().add(slot))?.non_null().map(Name::at))
    }

    /// Declarations, most recent first.
    pub fn declarations<'db>(&self, db: &'db Database) -> Result<BindingChain<'db>> {
        self.chain(db, FIRST_DECL)
    }

    /// Definitions, most recent first.
    pub fn definitions<'db>(&self, db: &'db Database) -> Result<BindingChain<'db>> {
        self.chain(db, FIRST_DEF)
    }

    /// References from the binding's own linkage, most recent first.
    pub fn references<'db>(&self, db: &'db Database) -> Result<BindingChain<'db>> {
        self.chain(db, FIRST_REF)
    }

    fn chain<'db>(&self, db: &'db Database, slot: u64) -> Result<BindingChain<'db>> {
        Ok(BindingChain::new(db, db.get_rec_ptr(self.record().add(slot))?))
    }

    /// External reference lists, one per foreign linkage.
    pub fn external_reference_lists(&self, db: &Database) -> Result<Vec<ExternalReferences>> {
        extref::lists(db, self.record().add(FIRST_EXTREF))
    }

    /// References from files of other linkages.
    pub fn external_references(&self, db: &Database) -> Result<Vec<Name>> {
        let mut out = Vec::new();
        for list in self.external_reference_lists(db)? {
            for name in BindingChain::new(db, list.first_name) {
                out.push(name?);
            }
        }
        Ok(out)
    }

    /// Prepends a declaration.
    pub fn add_declaration(&self, db: &Database, name: Name) -> Result<()> {
        self.prepend(db, self.record().add(FIRST_DECL), name)
    }

    /// Prepends a definition.
    pub fn add_definition(&self, db: &Database, name: Name) -> Result<()> {
        self.prepend(db, self.record().add(FIRST_DEF), name)
    }

    /// Prepends a reference made from a file of `file_linkage`. References from another
    /// linkage go to that linkage's external reference list.
    pub fn add_reference(&self, db: &Database, name: Name, file_linkage: LinkageId) -> Result<()> {
        let slot = self.reference_slot(db, file_linkage, true)?;
        match slot {
            Some(slot) => self.prepend(db, slot, name),
            None => Err(PdomError::Invalid("no reference list for linkage")),
        }
    }

    /// Adds `name` to the chain matching its role.
    pub fn add_name(&self, db: &Database, name: Name, file_linkage: LinkageId) -> Result<()> {
        match name.role(db)? {
            NameRole::Declaration => self.add_declaration(db, name),
            NameRole::Definition => self.add_definition(db, name),
            NameRole::Reference => self.add_reference(db, name, file_linkage),
        }
    }

    fn reference_slot(
        &self,
        db: &Database,
        file_linkage: LinkageId,
        create: bool,
    ) -> Result<Option<RecPtr>> {
        if file_linkage == self.linkage || file_linkage == LinkageId::NONE {
            return Ok(Some(self.record().add(FIRST_REF)));
        }
        extref::name_slot(db, self.record().add(FIRST_EXTREF), file_linkage, create)
    }

    fn prepend(&self, db: &Database, slot: RecPtr, name: Name) -> Result<()> {
        let first = db.get_rec_ptr(slot)?;
        name.set_prev_in_binding(db, RecPtr::NULL)?;
        name.set_next_in_binding(db, first)?;
        if !first.is_null() {
            Name::at(first).set_prev_in_binding(db, name.record())?;
        }
        db.put_rec_ptr(slot, name.record())
    }

    /// Unlinks `name` from whichever chain holds it, leaving its chain fields null.
    pub fn remove_name(&self, db: &Database, name: Name, file_linkage: LinkageId) -> Result<()> {
        let role = name.role(db)?;
        let prev = name.prev_in_binding(db)?;
        let next = name.next_in_binding(db)?;
        if !next.is_null() {
            Name::at(next).set_prev_in_binding(db, prev)?;
        }
        if prev.is_null() {
            let slot = match role {
                NameRole::Declaration => Some(self.record().add(FIRST_DECL)),
                NameRole::Definition => Some(self.record().add(FIRST_DEF)),
                NameRole::Reference => self.reference_slot(db, file_linkage, false)?,
            };
            if let Some(slot) = slot {
                if db.get_rec_ptr(slot)? == name.record() {
                    db.put_rec_ptr(slot, next)?;
                } else {
                    debug_assert!(false, "name {} is not the head of its chain", name.record());
                }
            }
        } else {
            Name::at(prev).set_next_in_binding(db, next)?;
        }
        name.set_prev_in_binding(db, RecPtr::NULL)?;
        name.set_next_in_binding(db, RecPtr::NULL)?;
        if role == NameRole::Reference && file_linkage != self.linkage && file_linkage != LinkageId::NONE {
            extref::remove_if_empty(db, self.record().add(FIRST_EXTREF), file_linkage)?;
        }
        Ok(())
    }

    /// Returns true when no declaration, definition or reference of any linkage remains.
    pub fn is_orphaned(&self, db: &Database) -> Result<bool> {
        for slot in [FIRST_DECL, FIRST_DEF, FIRST_REF, FIRST_EXTREF] {
            if !db.get_rec_ptr(self.record().add(slot))?.is_null() {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Qualified name, outermost scope first.
    pub fn qualified_name(&self, db: &Database) -> Result<Vec<String>> {
        let mut parts = vec![self.name(db)?];
        let mut scope = self.parent(db)?;
        while !is_linkage_record(db, scope)? {
            parts.push(NamedNode::at(scope).name(db)?);
            scope = node::parent(db, scope)?;
        }
        parts.reverse();
        Ok(parts)
    }

    /// Identity order of bindings, see [`compare_bindings`].
    pub fn pdom_compare_to(&self, db: &Database, other: &Binding) -> Result<Ordering> {
        compare_bindings(db, self.record(), other.record())
    }
}

/// Returns true for the null record and for linkage records.
pub(crate) fn is_linkage_record(db: &Database, record: RecPtr) -> Result<bool> {
    if record.is_null() {
        return Ok(true);
    }
    Ok(node::read_tag(db, record)?.1 == LINKAGE_NODE)
}

/// Total order defining binding identity.
///
/// Walks both qualified names from the innermost component outwards. At every level the
/// names are compared first, then the local-to-file records, so a file-local binding
/// never collapses into a global one of the same name. A shorter qualified name sorts
/// first. Only fully equal walks fall back to the node type.
pub fn compare_bindings(db: &Database, a: RecPtr, b: RecPtr) -> Result<Ordering> {
    let (mut x, mut y) = (a, b);
    loop {
        let cmp = named::compare_names(db, x, y)?;
        if cmp != Ordering::Equal {
            return Ok(cmp);
        }
        let cmp = db
            .get_rec_ptr(x.add(LOCAL_TO_FILE))?
            .cmp(&db.get_rec_ptr(y.add(LOCAL_TO_FILE))?);
        if cmp != Ordering::Equal {
            return Ok(cmp);
        }
        let (px, py) = (node::parent(db, x)?, node::parent(db, y)?);
        match (is_linkage_record(db, px)?, is_linkage_record(db, py)?) {
            (true, true) => break,
            (true, false) => return Ok(Ordering::Less),
            (false, true) => return Ok(Ordering::Greater),
            (false, false) => {
                x = px;
                y = py;
            }
        }
    }
    let (_, ta) = node::read_tag(db, a)?;
    let (_, tb) = node::read_tag(db, b)?;
    Ok(ta.cmp(&tb))
}
