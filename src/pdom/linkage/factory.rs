//! Per-language factories: which binding kinds a linkage stores and how its records load.

use crate::pdom::binding::Binding;
use crate::pdom::macros::MacroContainer;
use crate::pdom::node::{BindingKind, NodeRegistry, PdomNode, LINKAGE_NODE, MACRO_CONTAINER_NODE};
use crate::types::{LinkageId, RecPtr};

use super::Linkage;

/// Language specific part of a linkage.
pub trait LinkageFactory: Send + Sync {
    /// Id stored in every record of the linkage.
    fn id(&self) -> LinkageId;

    /// Language name stored in the linkage record.
    fn name(&self) -> &'static str;

    /// Binding kinds the language has.
    fn kinds(&self) -> &'static [BindingKind];

    /// Returns true if bindings of `kind` can be stored.
    fn supports(&self, kind: BindingKind) -> bool {
        self.kinds().contains(&kind)
    }

    /// Registers a constructor for every node type the linkage writes.
    fn register(&self, registry: &mut NodeRegistry) {
        let id = self.id();
        registry.register(id, LINKAGE_NODE, |record, linkage| {
            PdomNode::Linkage(Linkage::at(record, linkage))
        });
        registry.register(id, MACRO_CONTAINER_NODE, |record, linkage| {
            PdomNode::MacroContainer(MacroContainer::at(record, linkage))
        });
        for kind in self.kinds() {
            registry.register(id, kind.node_type(), constructor(*kind));
        }
    }
}

macro_rules! binding_constructor {
    ($kind:ident) => {{
        fn construct(record: RecPtr, linkage: LinkageId) -> PdomNode {
            PdomNode::Binding(Binding::at(record, linkage, BindingKind::$kind))
        }
        construct
    }};
}

fn constructor(kind: BindingKind) -> fn(RecPtr, LinkageId) -> PdomNode {
    match kind {
        BindingKind::Variable => binding_constructor!(Variable),
        BindingKind::Function => binding_constructor!(Function),
        BindingKind::Typedef => binding_constructor!(Typedef),
        BindingKind::Composite => binding_constructor!(Composite),
        BindingKind::Field => binding_constructor!(Field),
        BindingKind::Enumeration => binding_constructor!(Enumeration),
        BindingKind::Enumerator => binding_constructor!(Enumerator),
        BindingKind::Namespace => binding_constructor!(Namespace),
        BindingKind::Method => binding_constructor!(Method),
    }
}

/// The C language.
#[derive(Debug, Default, Clone, Copy)]
pub struct CLinkageFactory;

impl LinkageFactory for CLinkageFactory {
    fn id(&self) -> LinkageId {
        LinkageId::C
    }

    fn name(&self) -> &'static str {
        "C"
    }

    fn kinds(&self) -> &'static [BindingKind] {
        &[
            BindingKind::Variable,
            BindingKind::Function,
            BindingKind::Typedef,
            BindingKind::Composite,
            BindingKind::Field,
            BindingKind::Enumeration,
            BindingKind::Enumerator,
        ]
    }
}

/// The C++ language.
#[derive(Debug, Default, Clone, Copy)]
pub struct CppLinkageFactory;

impl LinkageFactory for CppLinkageFactory {
    fn id(&self) -> LinkageId {
        LinkageId::CPP
    }

    fn name(&self) -> &'static str {
        "C++"
    }

    fn kinds(&self) -> &'static [BindingKind] {
        &BindingKind::ALL
    }
}
