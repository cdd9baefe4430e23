//! The view of a parsed symbol that the indexer hands to the index.

use super::kinds::{CompositeKey, MethodFlags, Modifiers};
use super::linkage::types::{IndexType, IndexValue};
use super::node::BindingKind;
use crate::types::{FragmentId, RecPtr};

/// Kind of a source symbol, including the kinds the index refuses to store.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum SymbolKind {
    /// Variable.
    Variable,
    /// Free function.
    Function,
    /// Type alias.
    Typedef,
    /// Struct, union or class.
    Composite,
    /// Data member.
    Field,
    /// Enumeration.
    Enumeration,
    /// Enumeration constant.
    Enumerator,
    /// Namespace.
    Namespace,
    /// Member function.
    Method,
    /// Function parameter; never stored.
    Parameter,
    /// Unresolved symbol; never stored.
    Problem,
}

impl SymbolKind {
    /// Binding kind storing symbols of this kind.
    pub fn binding_kind(self) -> Option<BindingKind> {
        Some(match self {
            SymbolKind::Variable => BindingKind::Variable,
            SymbolKind::Function => BindingKind::Function,
            SymbolKind::Typedef => BindingKind::Typedef,
            SymbolKind::Composite => BindingKind::Composite,
            SymbolKind::Field => BindingKind::Field,
            SymbolKind::Enumeration => BindingKind::Enumeration,
            SymbolKind::Enumerator => BindingKind::Enumerator,
            SymbolKind::Namespace => BindingKind::Namespace,
            SymbolKind::Method => BindingKind::Method,
            SymbolKind::Parameter | SymbolKind::Problem => return None,
        })
    }
}

/// Marks a symbol visible in one file only.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct FileLocal {
    /// Index fragment holding the file.
    pub fragment: FragmentId,
    /// File record in that fragment.
    pub file: RecPtr,
}

/// A symbol produced by the parser.
///
/// Only [`SourceSymbol::name`] and [`SourceSymbol::kind`] are required; every other
/// attribute defaults to "absent".
pub trait SourceSymbol {
    /// Unqualified name.
    fn name(&self) -> &str;

    /// Kind of the symbol.
    fn kind(&self) -> SymbolKind;

    /// Enclosing symbol; `None` for the global scope. For enumerators this is the
    /// enumeration.
    fn owner(&self) -> Option<&dyn SourceSymbol> {
        None
    }

    /// Set for file-local (`static`) symbols.
    fn file_local(&self) -> Option<FileLocal> {
        None
    }

    /// Binding record, when the symbol is already a binding of some index fragment.
    fn persisted(&self) -> Option<(FragmentId, RecPtr)> {
        None
    }

    /// Storage class and qualifiers.
    fn modifiers(&self) -> Modifiers {
        Modifiers::default()
    }

    /// Type of variables, fields, functions and typedefs, and fixed type of enumerations.
    fn ty(&self) -> Option<IndexType> {
        None
    }

    /// Initial value of variables and fields, value of enumerators.
    fn value(&self) -> Option<IndexValue> {
        None
    }

    /// Parameter count of functions and methods.
    fn parameter_count(&self) -> u16 {
        0
    }

    /// Properties of methods.
    fn method_flags(&self) -> MethodFlags {
        MethodFlags::default()
    }

    /// Key of composites.
    fn composite_key(&self) -> CompositeKey {
        CompositeKey::Struct
    }

    /// Composites without a name.
    fn is_anonymous(&self) -> bool {
        false
    }

    /// `enum class`
    fn is_scoped(&self) -> bool {
        false
    }

    /// `inline namespace`
    fn is_inline(&self) -> bool {
        false
    }
}

/// Plain data implementation of [`SourceSymbol`], used by tools and tests.
#[derive(Clone, Debug)]
pub struct Symbol {
    /// Unqualified name.
    pub name: String,
    /// Kind.
    pub kind: SymbolKind,
    /// Enclosing symbol.
    pub owner: Option<Box<Symbol>>,
    /// File locality.
    pub file_local: Option<FileLocal>,
    /// Existing binding.
    pub persisted: Option<(FragmentId, RecPtr)>,
    /// Modifiers.
    pub modifiers: Modifiers,
    /// Type.
    pub ty: Option<IndexType>,
    /// Value.
    pub value: Option<IndexValue>,
    /// Parameter count.
    pub parameter_count: u16,
    /// Method flags.
    pub method_flags: MethodFlags,
    /// Composite key.
    pub composite_key: CompositeKey,
    /// Anonymous composite.
    pub anonymous: bool,
    /// Scoped enumeration.
    pub scoped: bool,
    /// Inline namespace.
    pub inline: bool,
}

impl Symbol {
    /// Symbol of `kind` called `name` in the global scope.
    pub fn new(kind: SymbolKind, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind,
            owner: None,
            file_local: None,
            persisted: None,
            modifiers: Modifiers::default(),
            ty: None,
            value: None,
            parameter_count: 0,
            method_flags: MethodFlags::default(),
            composite_key: CompositeKey::Struct,
            anonymous: false,
            scoped: false,
            inline: false,
        }
    }

    /// Places the symbol inside `owner`.
    pub fn in_scope(mut self, owner: Symbol) -> Self {
        self.owner = Some(Box::new(owner));
        self
    }

    /// Restricts the symbol to `file` of `fragment`.
    pub fn local_to(mut self, fragment: FragmentId, file: RecPtr) -> Self {
        self.file_local = Some(FileLocal { fragment, file });
        self
    }

    /// Points the symbol at an existing binding.
    pub fn persisted_as(mut self, fragment: FragmentId, record: RecPtr) -> Self {
        self.persisted = Some((fragment, record));
        self
    }

    /// Sets the type.
    pub fn with_type(mut self, ty: IndexType) -> Self {
        self.ty = Some(ty);
        self
    }

    /// Sets the value.
    pub fn with_value(mut self, value: IndexValue) -> Self {
        self.value = Some(value);
        self
    }

    /// Sets the modifiers.
    pub fn with_modifiers(mut self, modifiers: Modifiers) -> Self {
        self.modifiers = modifiers;
        self
    }

    /// Marks an enumeration as scoped.
    pub fn scoped(mut self) -> Self {
        self.scoped = true;
        self
    }
}

impl SourceSymbol for Symbol {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> SymbolKind {
        self.kind
    }

    fn owner(&self) -> Option<&dyn SourceSymbol> {
        self.owner.as_deref().map(|owner| owner as &dyn SourceSymbol)
    }

    fn file_local(&self) -> Option<FileLocal> {
        self.file_local
    }

    fn persisted(&self) -> Option<(FragmentId, RecPtr)> {
        self.persisted
    }

    fn modifiers(&self) -> Modifiers {
        self.modifiers
    }

    fn ty(&self) -> Option<IndexType> {
        self.ty.clone()
    }

    fn value(&self) -> Option<IndexValue> {
        self.value.clone()
    }

    fn parameter_count(&self) -> u16 {
        self.parameter_count
    }

    fn method_flags(&self) -> MethodFlags {
        self.method_flags
    }

    fn composite_key(&self) -> CompositeKey {
        self.composite_key
    }

    fn is_anonymous(&self) -> bool {
        self.anonymous
    }

    fn is_scoped(&self) -> bool {
        self.scoped
    }

    fn is_inline(&self) -> bool {
        self.inline
    }
}
