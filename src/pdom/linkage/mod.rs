//! Per-language roots of the index.
//!
//! A linkage record owns three trees: the global index (bindings whose parent is the
//! linkage), the nested index (every other binding, ordered by parent first) and the
//! macro index (one container per macro name). Bindings enter through
//! [`Linkage::add_binding`], which is the only place that creates binding records.

use std::cmp::Ordering;
use std::sync::Arc;

use tracing::{debug, trace, warn};

use super::base;
use super::binding::{self, Binding};
use super::cache::BindingCacheKey;
use super::kinds;
use super::macros::MacroContainer;
use super::name::Name;
use super::named::{self, NamedNode};
use super::node::{self, BindingKind, LINKAGE_NODE};
use super::symbol::SourceSymbol;
use super::Pdom;
use crate::query::BindingCollector;
use crate::storage::database::{Database, PTR_SIZE};
use crate::storage::strings;
use crate::storage::{BTree, BTreeVisitor, VisitFlow};
use crate::types::{LinkageId, PdomError, RecPtr, Result};

pub mod codec;
pub mod comparators;
pub mod factory;
pub mod types;

use codec::EVALUATION_SIZE;
use comparators::{GlobalIndexOrder, MacroIndexOrder, NestedIndexOrder};
pub use factory::{CLinkageFactory, CppLinkageFactory, LinkageFactory};
use types::{Evaluation, IndexType, IndexValue};

const NEXT_LINKAGE: u64 = named::RECORD_SIZE as u64;
const INDEX: u64 = NEXT_LINKAGE + PTR_SIZE as u64;
const NESTED_INDEX: u64 = INDEX + PTR_SIZE as u64;
const MACRO_INDEX: u64 = NESTED_INDEX + PTR_SIZE as u64;
const ENUMERATOR_SEQUENCE: u64 = MACRO_INDEX + PTR_SIZE as u64;
/// Size of a linkage record.
pub const RECORD_SIZE: usize = ENUMERATOR_SEQUENCE as usize + 4;

/// Base-clause details of a name, passed to [`Linkage::on_create_name`].
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct BaseSpecifier {
    /// `virtual` base.
    pub is_virtual: bool,
    /// Access of the base.
    pub visibility: kinds::Visibility,
}

/// Handle to a linkage record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Linkage {
    record: RecPtr,
    id: LinkageId,
}

/// Finds the binding with a given identity inside one scope.
struct ScopeLookup<'a> {
    nested_parent: Option<RecPtr>,
    name: &'a [u8],
    local_to_file: RecPtr,
    node_type: u16,
    enumeration: RecPtr,
    found: Option<RecPtr>,
}

impl BTreeVisitor for ScopeLookup<'_> {
    fn compare(&mut self, db: &Database, record: RecPtr) -> Result<Ordering> {
        if let Some(parent) = self.nested_parent {
            let cmp = node::parent(db, record)?.cmp(&parent);
            if cmp != Ordering::Equal {
                return Ok(cmp);
            }
        }
        let cmp =
            strings::compare_compatible_with_ignore_case(&named::name_of(db, record)?, self.name);
        if cmp != Ordering::Equal {
            return Ok(cmp);
        }
        Ok(db
            .get_rec_ptr(record.add(binding::LOCAL_TO_FILE))?
            .cmp(&self.local_to_file))
    }

    fn visit(&mut self, db: &Database, record: RecPtr) -> Result<VisitFlow> {
        let (_, node_type) = node::read_tag(db, record)?;
        if node_type != self.node_type {
            return Ok(VisitFlow::Continue);
        }
        if node_type == BindingKind::Enumerator.node_type()
            && Binding::load(db, record)?.enumeration(db)? != self.enumeration
        {
            return Ok(VisitFlow::Continue);
        }
        self.found = Some(record);
        Ok(VisitFlow::StopFound)
    }
}

struct MacroLookup<'a> {
    name: &'a [u8],
    found: Option<RecPtr>,
}

impl BTreeVisitor for MacroLookup<'_> {
    fn compare(&mut self, db: &Database, record: RecPtr) -> Result<Ordering> {
        Ok(strings::compare_compatible_with_ignore_case(
            &named::name_of(db, record)?,
            self.name,
        ))
    }

    fn visit(&mut self, _db: &Database, record: RecPtr) -> Result<VisitFlow> {
        self.found = Some(record);
        Ok(VisitFlow::StopFound)
    }
}

impl Linkage {
    /// Handle to the linkage record at `record`.
    pub fn at(record: RecPtr, id: LinkageId) -> Self {
        Self { record, id }
    }

    pub(crate) fn create(db: &Database, factory: &dyn LinkageFactory, next: RecPtr) -> Result<Self> {
        let record = db.malloc(RECORD_SIZE)?;
        node::write_header(db, record, factory.id(), LINKAGE_NODE, RecPtr::NULL)?;
        NamedNode::init_name(db, record, factory.name())?;
        db.put_rec_ptr(record.add(NEXT_LINKAGE), next)?;
        debug!(linkage = %factory.id(), record = %record, "pdom.linkage.create");
        Ok(Self::at(record, factory.id()))
    }

    /// Record of the linkage.
    pub fn record(&self) -> RecPtr {
        self.record
    }

    /// Id of the linkage.
    pub fn id(&self) -> LinkageId {
        self.id
    }

    /// Stored language name.
    pub fn name(&self, db: &Database) -> Result<String> {
        NamedNode::at(self.record).name(db)
    }

    pub(crate) fn next(&self, db: &Database) -> Result<RecPtr> {
        db.get_rec_ptr(self.record.add(NEXT_LINKAGE))
    }

    /// Tree of bindings whose parent is the linkage.
    pub fn index(&self, pdom: &Pdom) -> BTree<GlobalIndexOrder> {
        BTree::new(self.record.add(INDEX), GlobalIndexOrder).with_stats(pdom.btree_stats())
    }

    /// Tree of bindings nested in other bindings.
    pub fn nested_index(&self, pdom: &Pdom) -> BTree<NestedIndexOrder> {
        BTree::new(self.record.add(NESTED_INDEX), NestedIndexOrder).with_stats(pdom.btree_stats())
    }

    /// Tree of macro containers.
    pub fn macro_index(&self, pdom: &Pdom) -> BTree<MacroIndexOrder> {
        BTree::new(self.record.add(MACRO_INDEX), MacroIndexOrder).with_stats(pdom.btree_stats())
    }

    fn next_enumerator_sequence(&self, db: &Database) -> Result<u32> {
        let slot = self.record.add(ENUMERATOR_SEQUENCE);
        let next = db.get_int(slot)? as u32;
        db.put_int(slot, next.wrapping_add(1) as i32)?;
        Ok(next)
    }

    /// Binding stored at `record`, or `None` for null and for records that are not
    /// bindings.
    pub fn get_binding(&self, pdom: &Pdom, record: RecPtr) -> Result<Option<Binding>> {
        Ok(node::load(pdom, record)?.and_then(|node| node.into_binding()))
    }

    /// Get-or-create of the binding for `symbol`.
    ///
    /// Returns `None` when the symbol cannot be stored here: problems, parameters, kinds
    /// the language lacks, and symbols local to a file of another fragment. An existing
    /// binding has its attributes refreshed from the symbol.
    pub fn add_binding(&self, pdom: &Pdom, symbol: &dyn SourceSymbol) -> Result<Option<Binding>> {
        self.resolve(pdom, symbol, true)
    }

    /// The stored binding for `symbol`, without creating anything.
    pub fn adapt_binding(&self, pdom: &Pdom, symbol: &dyn SourceSymbol) -> Result<Option<Binding>> {
        self.resolve(pdom, symbol, false)
    }

    fn resolve(&self, pdom: &Pdom, symbol: &dyn SourceSymbol, create: bool) -> Result<Option<Binding>> {
        let db = pdom.db();
        let fragment = pdom.fragment_id()?;
        if let Some((origin, record)) = symbol.persisted() {
            if origin == fragment {
                return Ok(Some(Binding::load(db, record)?));
            }
        }
        let Some(kind) = symbol.kind().binding_kind() else {
            return Ok(None);
        };
        let supported = pdom
            .factory(self.id)
            .map(|factory| factory.supports(kind))
            .unwrap_or(false);
        if !supported {
            return Ok(None);
        }
        let local_to_file = match symbol.file_local() {
            Some(local) if local.fragment != fragment => return Ok(None),
            Some(local) => local.file,
            None => RecPtr::NULL,
        };

        let mut enumeration = None;
        let parent = match symbol.owner() {
            None => self.record,
            Some(owner) => {
                let Some(owner) = self.resolve(pdom, owner, create)? else {
                    return Ok(None);
                };
                if kind == BindingKind::Enumerator && owner.kind() == BindingKind::Enumeration {
                    let parent = if owner.is_scoped(db)? {
                        owner.record()
                    } else {
                        owner.parent(db)?
                    };
                    enumeration = Some(owner);
                    parent
                } else {
                    owner.record()
                }
            }
        };

        let name = symbol.name();
        let enumeration_record = enumeration.as_ref().map(Binding::record).unwrap_or_default();
        if let Some(existing) = self.lookup(pdom, kind, parent, name.as_bytes(), local_to_file, enumeration_record)? {
            if create {
                update(db, &existing, symbol)?;
            }
            return Ok(Some(existing));
        }
        if !create {
            return Ok(None);
        }

        let created = Binding::create(
            db,
            self.id,
            kind,
            parent,
            name,
            local_to_file,
            kinds::record_size(kind),
        )?;
        if kind == BindingKind::Enumerator {
            created.set_enumeration(db, enumeration_record)?;
            created.set_enumerator_sequence(db, self.next_enumerator_sequence(db)?)?;
        }
        update(db, &created, symbol)?;
        if parent == self.record {
            self.index(pdom).insert(db, created.record())?;
        } else {
            self.nested_index(pdom).insert(db, created.record())?;
        }
        match enumeration {
            Some(enumeration) => enumeration.add_child(db, created.record())?,
            None if parent != self.record => Binding::load(db, parent)?.add_child(db, created.record())?,
            None => {}
        }
        pdom.caches().invalidate_bindings(self.id, name.as_bytes());
        debug!(
            linkage = %self.id,
            kind = %kind,
            name,
            record = %created.record(),
            "pdom.linkage.add_binding"
        );
        Ok(Some(created))
    }

    fn lookup(
        &self,
        pdom: &Pdom,
        kind: BindingKind,
        parent: RecPtr,
        name: &[u8],
        local_to_file: RecPtr,
        enumeration: RecPtr,
    ) -> Result<Option<Binding>> {
        let db = pdom.db();
        let mut visitor = ScopeLookup {
            nested_parent: (parent != self.record).then_some(parent),
            name,
            local_to_file,
            node_type: kind.node_type(),
            enumeration,
            found: None,
        };
        if parent == self.record {
            self.index(pdom).accept(db, &mut visitor)?;
        } else {
            self.nested_index(pdom).accept(db, &mut visitor)?;
        }
        Ok(visitor
            .found
            .map(|record| Binding::at(record, self.id, kind)))
    }

    /// Records of the global bindings called `name`, answered from the binding cache when
    /// possible.
    pub fn get_bindings_via_cache(
        &self,
        pdom: &Pdom,
        name: &[u8],
        case_sensitive: bool,
    ) -> Result<Arc<[RecPtr]>> {
        let key = BindingCacheKey::new(self.id, name, case_sensitive);
        if let Some(hit) = pdom.caches().bindings(&key) {
            return Ok(hit);
        }
        let mut collector = BindingCollector::exact(name).case_sensitive(case_sensitive);
        self.index(pdom).accept(pdom.db(), &mut collector)?;
        let records: Arc<[RecPtr]> = collector.into_records().into();
        pdom.caches().put_bindings(key, Arc::clone(&records));
        Ok(records)
    }

    /// Deletes an orphaned binding: unlinks it from its tree and owner, then frees its
    /// fields, name and record.
    pub fn delete_binding(&self, pdom: &Pdom, binding: &Binding) -> Result<()> {
        let db = pdom.db();
        if !binding.is_orphaned(db)? {
            return Err(PdomError::Invalid("binding still has names"));
        }
        if !binding.children(db)?.is_empty() {
            return Err(PdomError::Invalid("binding still has members"));
        }
        let name = binding.name_bytes(db)?.to_vec();
        let parent = binding.parent(db)?;
        let removed = if parent == self.record {
            self.index(pdom).delete(db, binding.record())?
        } else {
            self.nested_index(pdom).delete(db, binding.record())?
        };
        debug_assert!(removed, "binding {} missing from its index", binding.record());
        if binding.kind() == BindingKind::Enumerator {
            let enumeration = binding.enumeration(db)?;
            if !enumeration.is_null() {
                Binding::load(db, enumeration)?.remove_child(db, binding.record())?;
            }
        } else if parent != self.record {
            Binding::load(db, parent)?.remove_child(db, binding.record())?;
        }
        binding.delete_kind_fields(db)?;
        NamedNode::delete_name(db, binding.record())?;
        db.free(binding.record())?;
        pdom.caches().invalidate_bindings(self.id, &name);
        debug!(linkage = %self.id, record = %binding.record(), "pdom.linkage.delete_binding");
        Ok(())
    }

    /// Side effects of a freshly linked name: base clauses become inheritance edges of the
    /// composite whose definition encloses them.
    pub fn on_create_name(&self, pdom: &Pdom, name: Name, base: Option<BaseSpecifier>) -> Result<()> {
        let db = pdom.db();
        if !name.is_base_specifier(db)? {
            return Ok(());
        }
        let Some(derived) = self.enclosing_composite(db, name)? else {
            return Ok(());
        };
        let base = base.unwrap_or_default();
        base::add(db, derived.first_base_slot()?, name, base.is_virtual, base.visibility)?;
        trace!(derived = %derived.record(), name = %name.record(), "pdom.linkage.add_base");
        Ok(())
    }

    /// Undoes [`Linkage::on_create_name`]; called before a name is deleted.
    pub fn on_delete_name(&self, pdom: &Pdom, name: Name) -> Result<()> {
        let db = pdom.db();
        if !name.is_base_specifier(db)? {
            return Ok(());
        }
        if let Some(derived) = self.enclosing_composite(db, name)? {
            base::remove_for_name(db, derived.first_base_slot()?, name)?;
        }
        Ok(())
    }

    fn enclosing_composite(&self, db: &Database, name: Name) -> Result<Option<Binding>> {
        let Some(caller) = name.caller(db)? else {
            return Ok(None);
        };
        let record = caller.binding(db)?;
        if record.is_null() {
            return Ok(None);
        }
        let binding = Binding::load(db, record)?;
        Ok((binding.kind() == BindingKind::Composite).then_some(binding))
    }

    /// Container of the macros called `name`, created on demand when `create` is set.
    pub fn macro_container(&self, pdom: &Pdom, name: &str, create: bool) -> Result<Option<MacroContainer>> {
        if let Some(record) = pdom.caches().macro_container(self.id, name.as_bytes()) {
            return Ok(Some(MacroContainer::at(record, self.id)));
        }
        let db = pdom.db();
        let mut lookup = MacroLookup {
            name: name.as_bytes(),
            found: None,
        };
        let index = self.macro_index(pdom);
        index.accept(db, &mut lookup)?;
        let record = match lookup.found {
            Some(record) => record,
            None if create => {
                let container = MacroContainer::create(db, self.id, self.record, name)?;
                index.insert(db, container.record())?;
                trace!(linkage = %self.id, name, "pdom.linkage.macro_container.create");
                container.record()
            }
            None => return Ok(None),
        };
        pdom.caches().put_macro_container(self.id, name.as_bytes(), record);
        Ok(Some(MacroContainer::at(record, self.id)))
    }

    /// Removes `container` from the macro index and frees it once nothing refers to it.
    /// Returns true if it was removed.
    pub(crate) fn remove_macro_container_if_orphaned(
        &self,
        pdom: &Pdom,
        container: &MacroContainer,
    ) -> Result<bool> {
        let db = pdom.db();
        if !container.is_orphaned(db)? {
            return Ok(false);
        }
        let name = container.name_bytes(db)?.to_vec();
        self.macro_index(pdom).delete(db, container.record())?;
        pdom.caches().invalidate_macro_container(self.id, &name);
        container.free(db)?;
        trace!(linkage = %self.id, name = %String::from_utf8_lossy(&name), "pdom.linkage.macro_container.remove");
        Ok(true)
    }

    /// Type of `binding`, with decode failures logged and replaced by
    /// [`IndexType::Unstorable`].
    pub fn type_or_problem(&self, db: &Database, binding: &Binding) -> Option<IndexType> {
        match binding.ty(db) {
            Ok(ty) => ty,
            Err(err) => {
                warn!(record = %binding.record(), error = %err, "pdom.linkage.load_type");
                Some(IndexType::Unstorable)
            }
        }
    }

    /// Value of `binding`, with decode failures logged and replaced by
    /// [`IndexValue::Unknown`].
    pub fn value_or_unknown(&self, db: &Database, binding: &Binding) -> Option<IndexValue> {
        match binding.value(db) {
            Ok(value) => value,
            Err(err) => {
                warn!(record = %binding.record(), error = %err, "pdom.linkage.load_value");
                Some(IndexValue::Unknown)
            }
        }
    }

    /// Evaluation in the [`EVALUATION_SIZE`] slot at `slot`, with decode failures logged
    /// and replaced by [`Evaluation::Problem`].
    pub fn evaluation_or_problem(&self, db: &Database, slot: RecPtr) -> Option<Evaluation> {
        match codec::load_evaluation(db, slot) {
            Ok(evaluation) => evaluation,
            Err(err) => {
                warn!(slot = %slot, size = EVALUATION_SIZE, error = %err, "pdom.linkage.load_evaluation");
                Some(Evaluation::Problem)
            }
        }
    }
}

/// Refreshes the mutable attributes of `binding` from `symbol`.
fn update(db: &Database, binding: &Binding, symbol: &dyn SourceSymbol) -> Result<()> {
    match binding.kind() {
        BindingKind::Variable | BindingKind::Field => {
            refresh_type(db, binding, symbol)?;
            let value = symbol.value();
            if binding.value(db).ok().flatten() != value {
                binding.set_value(db, value.as_ref())?;
            }
            binding.set_modifiers(db, symbol.modifiers())
        }
        BindingKind::Function | BindingKind::Method => {
            refresh_type(db, binding, symbol)?;
            binding.set_modifiers(db, symbol.modifiers())?;
            binding.set_parameter_count(db, symbol.parameter_count())?;
            if binding.kind() == BindingKind::Method {
                binding.set_method_flags(db, symbol.method_flags())?;
            }
            Ok(())
        }
        BindingKind::Typedef => refresh_type(db, binding, symbol),
        BindingKind::Composite => {
            binding.set_composite_key(db, symbol.composite_key())?;
            binding.set_anonymous(db, symbol.is_anonymous())
        }
        BindingKind::Enumeration => {
            refresh_type(db, binding, symbol)?;
            binding.set_scoped(db, symbol.is_scoped())
        }
        BindingKind::Enumerator => {
            let value = symbol.value();
            if binding.value(db).ok().flatten() != value {
                binding.set_value(db, value.as_ref())?;
            }
            Ok(())
        }
        BindingKind::Namespace => binding.set_inline_namespace(db, symbol.is_inline()),
    }
}

fn refresh_type(db: &Database, binding: &Binding, symbol: &dyn SourceSymbol) -> Result<()> {
    let ty = symbol.ty();
    if binding.ty(db).ok().flatten() != ty {
        binding.set_ty(db, ty.as_ref())?;
    }
    Ok(())
}
