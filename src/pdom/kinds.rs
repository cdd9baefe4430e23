//! Kind specific fields of binding records and their cascading delete.
//!
//! | kind                | fields after the common binding header                    |
//! |---------------------|-----------------------------------------------------------|
//! | variable, field     | type slot, value slot, modifiers                          |
//! | function            | type slot, modifiers, parameter count                     |
//! | method              | function fields, method flags                             |
//! | typedef             | type slot                                                 |
//! | composite           | key, member list, first base, flags                       |
//! | enumeration         | enumerator list, fixed type slot, flags                   |
//! | enumerator          | value slot, insertion sequence, enumeration               |
//! | namespace           | flags                                                     |

use serde::Serialize;

use super::base::{self, BaseInfo};
use super::binding::{self, Binding};
use super::linkage::codec::{self, TYPE_SIZE, VALUE_SIZE};
use super::linkage::types::{IndexType, IndexValue};
use super::node::BindingKind;
use crate::storage::database::{Database, INT_SIZE, PTR_SIZE, SHORT_SIZE};
use crate::storage::NodeList;
use crate::types::{PdomError, RecPtr, Result};

const BASE: u64 = binding::RECORD_SIZE as u64;

mod variable {
    use super::*;
    pub const TYPE: u64 = BASE;
    pub const VALUE: u64 = TYPE + TYPE_SIZE as u64;
    pub const MODIFIERS: u64 = VALUE + VALUE_SIZE as u64;
    pub const RECORD_SIZE: usize = MODIFIERS as usize + 1;
}

mod function {
    use super::*;
    pub const TYPE: u64 = BASE;
    pub const MODIFIERS: u64 = TYPE + TYPE_SIZE as u64;
    pub const PARAMETER_COUNT: u64 = MODIFIERS + 1;
    pub const RECORD_SIZE: usize = PARAMETER_COUNT as usize + SHORT_SIZE;
    pub const METHOD_FLAGS: u64 = RECORD_SIZE as u64;
    pub const METHOD_RECORD_SIZE: usize = RECORD_SIZE + 1;
}

mod typedef {
    use super::*;
    pub const TYPE: u64 = BASE;
    pub const RECORD_SIZE: usize = TYPE as usize + TYPE_SIZE;
}

mod composite {
    use super::*;
    pub const KEY: u64 = BASE;
    pub const MEMBERS: u64 = BASE + 4;
    pub const FIRST_BASE: u64 = MEMBERS + PTR_SIZE as u64;
    pub const FLAGS: u64 = FIRST_BASE + PTR_SIZE as u64;
    pub const RECORD_SIZE: usize = FLAGS as usize + 1;
    pub const ANONYMOUS: u8 = 0x01;
}

mod enumeration {
    use super::*;
    pub const ENUMERATORS: u64 = BASE;
    pub const FIXED_TYPE: u64 = ENUMERATORS + PTR_SIZE as u64;
    pub const FLAGS: u64 = FIXED_TYPE + TYPE_SIZE as u64;
    pub const RECORD_SIZE: usize = FLAGS as usize + 1;
    pub const SCOPED: u8 = 0x01;
}

mod enumerator {
    use super::*;
    pub const VALUE: u64 = BASE;
    pub const SEQUENCE: u64 = BASE + 8;
    pub const ENUMERATION: u64 = SEQUENCE + INT_SIZE as u64;
    pub const RECORD_SIZE: usize = ENUMERATION as usize + PTR_SIZE;
}

mod namespace {
    use super::*;
    pub const FLAGS: u64 = BASE;
    pub const RECORD_SIZE: usize = FLAGS as usize + 1;
    pub const INLINE: u8 = 0x01;
}

/// Record size of bindings of `kind`.
pub fn record_size(kind: BindingKind) -> usize {
    match kind {
        BindingKind::Variable | BindingKind::Field => variable::RECORD_SIZE,
        BindingKind::Function => function::RECORD_SIZE,
        BindingKind::Method => function::METHOD_RECORD_SIZE,
        BindingKind::Typedef => typedef::RECORD_SIZE,
        BindingKind::Composite => composite::RECORD_SIZE,
        BindingKind::Enumeration => enumeration::RECORD_SIZE,
        BindingKind::Enumerator => enumerator::RECORD_SIZE,
        BindingKind::Namespace => namespace::RECORD_SIZE,
    }
}

/// Storage class and qualifier bits of variables, fields and functions.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize)]
pub struct Modifiers(pub u8);

impl Modifiers {
    /// `static`
    pub const STATIC: u8 = 0x01;
    /// `extern`
    pub const EXTERN: u8 = 0x02;
    /// `inline`
    pub const INLINE: u8 = 0x04;
    /// `constexpr`
    pub const CONSTEXPR: u8 = 0x08;
    /// `register`
    pub const REGISTER: u8 = 0x10;
    /// `mutable`
    pub const MUTABLE: u8 = 0x20;
    /// `thread_local`
    pub const THREAD_LOCAL: u8 = 0x40;

    /// Returns true if every bit of `bits` is set.
    pub fn contains(self, bits: u8) -> bool {
        self.0 & bits == bits
    }
}

/// Member access of methods, fields and bases.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    /// `public`
    #[default]
    Public,
    /// `protected`
    Protected,
    /// `private`
    Private,
}

impl Visibility {
    pub(crate) fn bits(self) -> u8 {
        match self {
            Visibility::Public => 0,
            Visibility::Protected => 1,
            Visibility::Private => 2,
        }
    }

    pub(crate) fn from_bits(bits: u8) -> Self {
        match bits & 0x03 {
            1 => Visibility::Protected,
            2 => Visibility::Private,
            _ => Visibility::Public,
        }
    }
}

/// Properties of C++ member functions.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize)]
pub struct MethodFlags(pub u8);

impl MethodFlags {
    /// `virtual`
    pub const VIRTUAL: u8 = 0x01;
    /// `= 0`
    pub const PURE_VIRTUAL: u8 = 0x02;
    /// `const` member function.
    pub const CONST: u8 = 0x04;
    /// Constructor.
    pub const CONSTRUCTOR: u8 = 0x08;
    /// Destructor.
    pub const DESTRUCTOR: u8 = 0x10;
    const VISIBILITY_SHIFT: u8 = 5;

    /// Flags with `bits` set and the given visibility.
    pub fn new(bits: u8, visibility: Visibility) -> Self {
        Self((bits & 0x1F) | (visibility.bits() << Self::VISIBILITY_SHIFT))
    }

    /// Returns true if every bit of `bits` is set.
    pub fn contains(self, bits: u8) -> bool {
        self.0 & bits == bits
    }

    /// Access of the method.
    pub fn visibility(self) -> Visibility {
        Visibility::from_bits(self.0 >> Self::VISIBILITY_SHIFT)
    }
}

/// `struct`, `union` or `class`.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CompositeKey {
    /// `struct`
    #[default]
    Struct,
    /// `union`
    Union,
    /// `class`
    Class,
}

impl CompositeKey {
    fn to_byte(self) -> u8 {
        match self {
            CompositeKey::Struct => 1,
            CompositeKey::Union => 2,
            CompositeKey::Class => 3,
        }
    }

    fn from_byte(byte: u8) -> Result<Self> {
        match byte {
            1 => Ok(CompositeKey::Struct),
            2 => Ok(CompositeKey::Union),
            3 => Ok(CompositeKey::Class),
            other => Err(PdomError::corruption(format!("invalid composite key {other}"))),
        }
    }
}

fn type_slot(kind: BindingKind) -> Option<u64> {
    match kind {
        BindingKind::Variable | BindingKind::Field => Some(variable::TYPE),
        BindingKind::Function | BindingKind::Method => Some(function::TYPE),
        BindingKind::Typedef => Some(typedef::TYPE),
        BindingKind::Enumeration => Some(enumeration::FIXED_TYPE),
        _ => None,
    }
}

fn value_slot(kind: BindingKind) -> Option<u64> {
    match kind {
        BindingKind::Variable | BindingKind::Field => Some(variable::VALUE),
        BindingKind::Enumerator => Some(enumerator::VALUE),
        _ => None,
    }
}

fn modifiers_offset(kind: BindingKind) -> Option<u64> {
    match kind {
        BindingKind::Variable | BindingKind::Field => Some(variable::MODIFIERS),
        BindingKind::Function | BindingKind::Method => Some(function::MODIFIERS),
        _ => None,
    }
}

impl Binding {
    fn require(&self, kinds: &[BindingKind], what: &'static str) -> Result<()> {
        if kinds.contains(&self.kind()) {
            Ok(())
        } else {
            Err(PdomError::Invalid(what))
        }
    }

    /// Address of the type slot, for kinds that have one.
    pub(crate) fn type_slot(&self) -> Option<RecPtr> {
        type_slot(self.kind()).map(|offset| self.record().add(offset))
    }

    /// Address of the value slot, for kinds that have one.
    pub(crate) fn value_slot(&self) -> Option<RecPtr> {
        value_slot(self.kind()).map(|offset| self.record().add(offset))
    }

    /// Stored type; `None` for kinds without a type and for absent types.
    pub fn ty(&self, db: &Database) -> Result<Option<IndexType>> {
        match self.type_slot() {
            Some(slot) => codec::load_type(db, slot),
            None => Ok(None),
        }
    }

    /// Replaces the stored type.
    pub fn set_ty(&self, db: &Database, ty: Option<&IndexType>) -> Result<()> {
        let slot = self
            .type_slot()
            .ok_or(PdomError::Invalid("binding kind has no type"))?;
        codec::store_type(db, slot, ty)
    }

    /// Stored value; `None` for kinds without a value and for absent values.
    pub fn value(&self, db: &Database) -> Result<Option<IndexValue>> {
        match self.value_slot() {
            Some(slot) => codec::load_value(db, slot),
            None => Ok(None),
        }
    }

    /// Replaces the stored value.
    pub fn set_value(&self, db: &Database, value: Option<&IndexValue>) -> Result<()> {
        let slot = self
            .value_slot()
            .ok_or(PdomError::Invalid("binding kind has no value"))?;
        codec::store_value(db, slot, value)
    }

    /// Modifiers; empty for kinds without modifiers.
    pub fn modifiers(&self, db: &Database) -> Result<Modifiers> {
        match modifiers_offset(self.kind()) {
            Some(offset) => Ok(Modifiers(db.get_byte(self.record().add(offset))?)),
            None => Ok(Modifiers::default()),
        }
    }

    /// Replaces the modifiers.
    pub fn set_modifiers(&self, db: &Database, modifiers: Modifiers) -> Result<()> {
        let offset = modifiers_offset(self.kind())
            .ok_or(PdomError::Invalid("binding kind has no modifiers"))?;
        db.put_byte(self.record().add(offset), modifiers.0)
    }

    /// Number of parameters of a function or method.
    pub fn parameter_count(&self, db: &Database) -> Result<u16> {
        self.require(&[BindingKind::Function, BindingKind::Method], "not a function")?;
        Ok(db.get_short(self.record().add(function::PARAMETER_COUNT))? as u16)
    }

    /// Sets the number of parameters of a function or method.
    pub fn set_parameter_count(&self, db: &Database, count: u16) -> Result<()> {
        self.require(&[BindingKind::Function, BindingKind::Method], "not a function")?;
        db.put_short(self.record().add(function::PARAMETER_COUNT), count as i16)
    }

    /// Flags of a method.
    pub fn method_flags(&self, db: &Database) -> Result<MethodFlags> {
        self.require(&[BindingKind::Method], "not a method")?;
        Ok(MethodFlags(db.get_byte(self.record().add(function::METHOD_FLAGS))?))
    }

    /// Replaces the flags of a method.
    pub fn set_method_flags(&self, db: &Database, flags: MethodFlags) -> Result<()> {
        self.require(&[BindingKind::Method], "not a method")?;
        db.put_byte(self.record().add(function::METHOD_FLAGS), flags.0)
    }

    /// Key of a composite.
    pub fn composite_key(&self, db: &Database) -> Result<CompositeKey> {
        self.require(&[BindingKind::Composite], "not a composite")?;
        CompositeKey::from_byte(db.get_byte(self.record().add(composite::KEY))?)
    }

    /// Sets the key of a composite.
    pub fn set_composite_key(&self, db: &Database, key: CompositeKey) -> Result<()> {
        self.require(&[BindingKind::Composite], "not a composite")?;
        db.put_byte(self.record().add(composite::KEY), key.to_byte())
    }

    /// Returns true for composites without a name of their own.
    pub fn is_anonymous(&self, db: &Database) -> Result<bool> {
        self.require(&[BindingKind::Composite], "not a composite")?;
        Ok(db.get_byte(self.record().add(composite::FLAGS))? & composite::ANONYMOUS != 0)
    }

    /// Marks a composite as anonymous.
    pub fn set_anonymous(&self, db: &Database, anonymous: bool) -> Result<()> {
        self.require(&[BindingKind::Composite], "not a composite")?;
        db.put_byte(
            self.record().add(composite::FLAGS),
            if anonymous { composite::ANONYMOUS } else { 0 },
        )
    }

    fn child_list(&self) -> Option<NodeList> {
        match self.kind() {
            BindingKind::Composite => Some(NodeList::at(self.record().add(composite::MEMBERS))),
            BindingKind::Enumeration => {
                Some(NodeList::at(self.record().add(enumeration::ENUMERATORS)))
            }
            _ => None,
        }
    }

    /// Members of a composite or enumerators of an enumeration, in insertion order.
    pub fn children(&self, db: &Database) -> Result<Vec<RecPtr>> {
        match self.child_list() {
            Some(list) => list.elements(db),
            None => Ok(Vec::new()),
        }
    }

    pub(crate) fn add_child(&self, db: &Database, child: RecPtr) -> Result<()> {
        match self.child_list() {
            Some(list) => list.add(db, child),
            None => Ok(()),
        }
    }

    pub(crate) fn remove_child(&self, db: &Database, child: RecPtr) -> Result<bool> {
        match self.child_list() {
            Some(list) => list.remove(db, child),
            None => Ok(false),
        }
    }

    pub(crate) fn first_base_slot(&self) -> Result<RecPtr> {
        self.require(&[BindingKind::Composite], "not a composite")?;
        Ok(self.record().add(composite::FIRST_BASE))
    }

    /// Base classes of a composite, most recently added first.
    pub fn bases(&self, db: &Database) -> Result<Vec<BaseInfo>> {
        base::list(db, self.first_base_slot()?)
    }

    /// Returns true for scoped enumerations (`enum class`).
    pub fn is_scoped(&self, db: &Database) -> Result<bool> {
        self.require(&[BindingKind::Enumeration], "not an enumeration")?;
        Ok(db.get_byte(self.record().add(enumeration::FLAGS))? & enumeration::SCOPED != 0)
    }

    /// Marks an enumeration as scoped.
    pub fn set_scoped(&self, db: &Database, scoped: bool) -> Result<()> {
        self.require(&[BindingKind::Enumeration], "not an enumeration")?;
        db.put_byte(
            self.record().add(enumeration::FLAGS),
            if scoped { enumeration::SCOPED } else { 0 },
        )
    }

    /// Enumeration owning an enumerator.
    pub fn enumeration(&self, db: &Database) -> Result<RecPtr> {
        self.require(&[BindingKind::Enumerator], "not an enumerator")?;
        db.get_rec_ptr(self.record().add(enumerator::ENUMERATION))
    }

    pub(crate) fn set_enumeration(&self, db: &Database, enumeration: RecPtr) -> Result<()> {
        self.require(&[BindingKind::Enumerator], "not an enumerator")?;
        db.put_rec_ptr(self.record().add(enumerator::ENUMERATION), enumeration)
    }

    /// Insertion sequence of an enumerator within its linkage.
    pub fn enumerator_sequence(&self, db: &Database) -> Result<u32> {
        self.require(&[BindingKind::Enumerator], "not an enumerator")?;
        Ok(db.get_int(self.record().add(enumerator::SEQUENCE))? as u32)
    }

    pub(crate) fn set_enumerator_sequence(&self, db: &Database, sequence: u32) -> Result<()> {
        self.require(&[BindingKind::Enumerator], "not an enumerator")?;
        db.put_int(self.record().add(enumerator::SEQUENCE), sequence as i32)
    }

    /// Returns true for inline namespaces.
    pub fn is_inline_namespace(&self, db: &Database) -> Result<bool> {
        self.require(&[BindingKind::Namespace], "not a namespace")?;
        Ok(db.get_byte(self.record().add(namespace::FLAGS))? & namespace::INLINE != 0)
    }

    /// Marks a namespace as inline.
    pub fn set_inline_namespace(&self, db: &Database, inline: bool) -> Result<()> {
        self.require(&[BindingKind::Namespace], "not a namespace")?;
        db.put_byte(
            self.record().add(namespace::FLAGS),
            if inline { namespace::INLINE } else { 0 },
        )
    }

    /// Frees everything the kind specific fields own. Member bindings themselves are
    /// not touched; their list items are.
    pub(crate) fn delete_kind_fields(&self, db: &Database) -> Result<()> {
        if let Some(slot) = self.type_slot() {
            codec::delete_bytes(db, slot, TYPE_SIZE)?;
        }
        if let Some(slot) = self.value_slot() {
            codec::delete_bytes(db, slot, VALUE_SIZE)?;
        }
        if let Some(list) = self.child_list() {
            list.delete_items(db)?;
        }
        if self.kind() == BindingKind::Composite {
            base::delete_all(db, self.first_base_slot()?)?;
        }
        Ok(())
    }
}
