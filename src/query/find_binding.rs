//! Point lookups of one binding by name, through an index or through a member list.

use std::cmp::Ordering;

use smallvec::SmallVec;
use tracing::debug;

use crate::pdom::binding::{Binding, LOCAL_TO_FILE};
use crate::pdom::linkage::Linkage;
use crate::pdom::named;
use crate::pdom::node::{self, BindingKind};
use crate::pdom::Pdom;
use crate::storage::database::Database;
use crate::storage::strings;
use crate::storage::{AcceptOutcome, BTreeVisitor, VisitFlow};
use crate::types::{PdomError, RecPtr, Result};

/// Visitor of a walk over the members of a binding, see [`accept_members`].
pub trait NodeVisitor {
    /// Handles one member record.
    fn visit(&mut self, db: &Database, record: RecPtr) -> Result<VisitFlow>;
}

/// Walks the members of a composite or the enumerators of an enumeration in insertion
/// order. Cancellation raised by the visitor ends the walk with
/// [`AcceptOutcome::Cancelled`].
pub fn accept_members<V: NodeVisitor + ?Sized>(
    db: &Database,
    parent: &Binding,
    visitor: &mut V,
) -> Result<AcceptOutcome> {
    for child in parent.children(db)? {
        match visitor.visit(db, child) {
            Ok(VisitFlow::Continue) => {}
            Ok(VisitFlow::StopFound) => return Ok(AcceptOutcome::Found),
            Ok(VisitFlow::StopNotFound) => return Ok(AcceptOutcome::NotFound),
            Err(PdomError::Cancelled) => {
                debug!(parent = %parent.record(), "query.members.cancelled");
                return Ok(AcceptOutcome::Cancelled);
            }
            Err(err) => return Err(err),
        }
    }
    Ok(AcceptOutcome::Exhausted)
}

/// Finds the first binding with a given name, local-to-file record and one of a set of
/// kinds.
#[derive(Debug)]
pub struct FindBinding {
    name: Vec<u8>,
    node_types: SmallVec<[u16; 4]>,
    local_to_file: RecPtr,
    parent: Option<RecPtr>,
    found: Option<RecPtr>,
}

impl FindBinding {
    /// Looks for a global binding called `name` of any kind.
    pub fn new(name: impl AsRef<[u8]>) -> Self {
        Self {
            name: name.as_ref().to_vec(),
            node_types: SmallVec::new(),
            local_to_file: RecPtr::NULL,
            parent: None,
            found: None,
        }
    }

    /// Accepts only the given kinds.
    pub fn kinds(mut self, kinds: &[BindingKind]) -> Self {
        self.node_types = kinds.iter().map(|kind| kind.node_type()).collect();
        self
    }

    /// Looks for the binding local to `file` instead of the global one.
    pub fn local_to(mut self, file: RecPtr) -> Self {
        self.local_to_file = file;
        self
    }

    /// Looks among the bindings nested in `parent`.
    pub fn within(mut self, parent: RecPtr) -> Self {
        self.parent = Some(parent);
        self
    }

    /// Record found, if any.
    pub fn found(&self) -> Option<RecPtr> {
        self.found
    }

    fn accepts_kind(&self, db: &Database, record: RecPtr) -> Result<bool> {
        if self.node_types.is_empty() {
            return Ok(true);
        }
        let (_, node_type) = node::read_tag(db, record)?;
        Ok(self.node_types.contains(&node_type))
    }
}

impl BTreeVisitor for FindBinding {
    fn compare(&mut self, db: &Database, record: RecPtr) -> Result<Ordering> {
        if let Some(parent) = self.parent {
            let cmp = node::parent(db, record)?.cmp(&parent);
            if cmp != Ordering::Equal {
                return Ok(cmp);
            }
        }
        let cmp = strings::compare_compatible_with_ignore_case(
            &named::name_of(db, record)?,
            &self.name,
        );
        if cmp != Ordering::Equal {
            return Ok(cmp);
        }
        Ok(db
            .get_rec_ptr(record.add(LOCAL_TO_FILE))?
            .cmp(&self.local_to_file))
    }

    fn visit(&mut self, db: &Database, record: RecPtr) -> Result<VisitFlow> {
        if !self.accepts_kind(db, record)? {
            return Ok(VisitFlow::Continue);
        }
        self.found = Some(record);
        Ok(VisitFlow::StopFound)
    }
}

impl NodeVisitor for FindBinding {
    fn visit(&mut self, db: &Database, record: RecPtr) -> Result<VisitFlow> {
        if named::name_of(db, record)? != self.name
            || db.get_rec_ptr(record.add(LOCAL_TO_FILE))? != self.local_to_file
            || !self.accepts_kind(db, record)?
        {
            return Ok(VisitFlow::Continue);
        }
        self.found = Some(record);
        Ok(VisitFlow::StopFound)
    }
}

/// The global binding called `name` of one of `kinds` (any kind when empty). With a
/// non-null `local_to_file` the binding local to that file is preferred, then the
/// global one.
pub fn find_binding(
    pdom: &Pdom,
    linkage: &Linkage,
    name: &str,
    kinds: &[BindingKind],
    local_to_file: RecPtr,
) -> Result<Option<Binding>> {
    find_in(pdom, linkage, None, name, kinds, local_to_file)
}

/// The binding called `name` nested directly in `parent`, looked up through the nested
/// index of `linkage`.
pub fn find_in_scope(
    pdom: &Pdom,
    linkage: &Linkage,
    parent: &Binding,
    name: &str,
    kinds: &[BindingKind],
    local_to_file: RecPtr,
) -> Result<Option<Binding>> {
    find_in(pdom, linkage, Some(parent.record()), name, kinds, local_to_file)
}

fn find_in(
    pdom: &Pdom,
    linkage: &Linkage,
    parent: Option<RecPtr>,
    name: &str,
    kinds: &[BindingKind],
    local_to_file: RecPtr,
) -> Result<Option<Binding>> {
    let db = pdom.db();
    let mut candidates = vec![local_to_file];
    if !local_to_file.is_null() {
        candidates.push(RecPtr::NULL);
    }
    for file in candidates {
        let mut visitor = FindBinding::new(name).kinds(kinds).local_to(file);
        visitor.parent = parent;
        match parent {
            Some(_) => linkage.nested_index(pdom).accept(db, &mut visitor)?,
            None => linkage.index(pdom).accept(db, &mut visitor)?,
        };
        if let Some(record) = visitor.found {
            return Ok(Some(Binding::load(db, record)?));
        }
    }
    Ok(None)
}

/// The member of `parent` called `name` of one of `kinds`, found by walking its member
/// list.
pub fn find_member(
    pdom: &Pdom,
    parent: &Binding,
    name: &str,
    kinds: &[BindingKind],
) -> Result<Option<Binding>> {
    let db = pdom.db();
    let mut visitor = FindBinding::new(name).kinds(kinds);
    accept_members(db, parent, &mut visitor)?;
    visitor
        .found
        .map(|record| Binding::load(db, record))
        .transpose()
}
