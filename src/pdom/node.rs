//! Common header of every node record and the registry that turns records into handles.
//!
//! A node record starts with the id of the linkage whose factory decodes it, a node type
//! and the record of its parent. [`load`] reads that tag pair and dispatches through the
//! [`NodeRegistry`]; there is no other polymorphism in the persisted format.

use std::fmt;

use rustc_hash::FxHashMap;
use serde::Serialize;

use super::binding::Binding;
use super::linkage::Linkage;
use super::macros::MacroContainer;
use super::Pdom;
use crate::storage::database::{Database, PTR_SIZE};
use crate::types::{LinkageId, PdomError, RecPtr, Result};

pub(crate) const LINKAGE_ID: u64 = 0;
pub(crate) const NODE_TYPE: u64 = 2;
pub(crate) const PARENT: u64 = 4;
/// Size of the node header.
pub const RECORD_SIZE: usize = 4 + PTR_SIZE;

/// Node type of linkage records.
pub const LINKAGE_NODE: u16 = 1;
/// Node type of macro containers.
pub const MACRO_CONTAINER_NODE: u16 = 2;

/// Kinds of bindings the index stores.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BindingKind {
    /// Global or static variable.
    Variable,
    /// Free function.
    Function,
    /// Type alias.
    Typedef,
    /// Struct, union or class.
    Composite,
    /// Data member of a composite.
    Field,
    /// Enumeration type.
    Enumeration,
    /// Enumeration constant.
    Enumerator,
    /// C++ namespace.
    Namespace,
    /// C++ member function.
    Method,
}

impl BindingKind {
    /// Every kind, in node type order.
    pub const ALL: [BindingKind; 9] = [
        BindingKind::Variable,
        BindingKind::Function,
        BindingKind::Typedef,
        BindingKind::Composite,
        BindingKind::Field,
        BindingKind::Enumeration,
        BindingKind::Enumerator,
        BindingKind::Namespace,
        BindingKind::Method,
    ];

    /// Node type stored in records of this kind.
    pub fn node_type(self) -> u16 {
        match self {
            BindingKind::Variable => 10,
            BindingKind::Function => 11,
            BindingKind::Typedef => 12,
            BindingKind::Composite => 13,
            BindingKind::Field => 14,
            BindingKind::Enumeration => 15,
            BindingKind::Enumerator => 16,
            BindingKind::Namespace => 17,
            BindingKind::Method => 18,
        }
    }

    /// Kind stored under `node_type`.
    pub fn from_node_type(node_type: u16) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.node_type() == node_type)
    }

    /// Lower-case name, as accepted on the command line.
    pub fn name(self) -> &'static str {
        match self {
            BindingKind::Variable => "variable",
            BindingKind::Function => "function",
            BindingKind::Typedef => "typedef",
            BindingKind::Composite => "composite",
            BindingKind::Field => "field",
            BindingKind::Enumeration => "enumeration",
            BindingKind::Enumerator => "enumerator",
            BindingKind::Namespace => "namespace",
            BindingKind::Method => "method",
        }
    }

    /// Parses a name produced by [`BindingKind::name`].
    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.name() == name)
    }
}

impl fmt::Display for BindingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Handle produced by [`load`].
#[derive(Clone, Debug)]
pub enum PdomNode {
    /// A linkage root.
    Linkage(Linkage),
    /// A binding of any kind.
    Binding(Binding),
    /// A macro container.
    MacroContainer(MacroContainer),
}

impl PdomNode {
    /// Record of the node.
    pub fn record(&self) -> RecPtr {
        match self {
            PdomNode::Linkage(linkage) => linkage.record(),
            PdomNode::Binding(binding) => binding.record(),
            PdomNode::MacroContainer(container) => container.record(),
        }
    }

    /// The binding, if this node is one.
    pub fn into_binding(self) -> Option<Binding> {
        match self {
            PdomNode::Binding(binding) => Some(binding),
            _ => None,
        }
    }
}

/// Builds the handle of a record once its tag pair is known.
pub type NodeConstructor = fn(RecPtr, LinkageId) -> PdomNode;

/// Maps `(linkage id, node type)` to the constructor of the matching handle.
#[derive(Default)]
pub struct NodeRegistry {
    constructors: FxHashMap<(LinkageId, u16), NodeConstructor>,
}

impl NodeRegistry {
    /// Registers the constructor for records tagged `(linkage, node_type)`.
    pub fn register(&mut self, linkage: LinkageId, node_type: u16, constructor: NodeConstructor) {
        self.constructors.insert((linkage, node_type), constructor);
    }

    /// Constructor for the tag pair, if registered.
    pub fn constructor(&self, linkage: LinkageId, node_type: u16) -> Option<NodeConstructor> {
        self.constructors.get(&(linkage, node_type)).copied()
    }

    /// Returns true if `linkage` knows how to decode `node_type`.
    pub fn contains(&self, linkage: LinkageId, node_type: u16) -> bool {
        self.constructors.contains_key(&(linkage, node_type))
    }
}

/// Tag pair of a node record.
pub fn read_tag(db: &Database, record: RecPtr) -> Result<(LinkageId, u16)> {
    let linkage = db.get_short(record.add(LINKAGE_ID))? as u16;
    let node_type = db.get_short(record.add(NODE_TYPE))? as u16;
    Ok((LinkageId(linkage), node_type))
}

/// Writes the node header of a freshly allocated record.
pub(crate) fn write_header(
    db: &Database,
    record: RecPtr,
    linkage: LinkageId,
    node_type: u16,
    parent: RecPtr,
) -> Result<()> {
    db.put_short(record.add(LINKAGE_ID), linkage.0 as i16)?;
    db.put_short(record.add(NODE_TYPE), node_type as i16)?;
    db.put_rec_ptr(record.add(PARENT), parent)
}

/// Parent record of a node.
pub fn parent(db: &Database, record: RecPtr) -> Result<RecPtr> {
    db.get_rec_ptr(record.add(PARENT))
}

/// Loads the handle of the node stored at `record`. Returns `None` for the null record.
pub fn load(pdom: &Pdom, record: RecPtr) -> Result<Option<PdomNode>> {
    if record.is_null() {
        return Ok(None);
    }
    let (linkage, node_type) = read_tag(pdom.db(), record)?;
    let constructor = pdom
        .registry()
        .constructor(linkage, node_type)
        .ok_or_else(|| {
            PdomError::corruption(format!(
                "record {record} has unknown tag ({linkage}, {node_type})"
            ))
        })?;
    Ok(Some(constructor(record, linkage)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_types_roundtrip() {
        for kind in BindingKind::ALL {
            assert_eq!(BindingKind::from_node_type(kind.node_type()), Some(kind));
            assert_eq!(BindingKind::parse(kind.name()), Some(kind));
        }
        assert_eq!(BindingKind::from_node_type(LINKAGE_NODE), None);
        assert_eq!(BindingKind::from_node_type(MACRO_CONTAINER_NODE), None);
    }
}
