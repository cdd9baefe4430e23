//! Types, values and evaluations as the index stores them, and their tagged byte format.
//!
//! Every item starts with a tag byte. References to persisted bindings are written as
//! [`BINDING_TYPE`] followed by the varint record address; integers are varints.

use serde::Serialize;

use crate::primitives::bytes::{buf::Cursor, var};
use crate::types::{PdomError, RecPtr, Result};

/// Absent item.
pub const NULL_TYPE: u8 = 0x00;
pub(crate) const BASIC_TYPE: u8 = 0x01;
pub(crate) const POINTER_TYPE: u8 = 0x02;
pub(crate) const QUALIFIER_TYPE: u8 = 0x03;
pub(crate) const ARRAY_TYPE: u8 = 0x04;
pub(crate) const FUNCTION_TYPE: u8 = 0x05;
pub(crate) const REFERENCE_TYPE: u8 = 0x06;

pub(crate) const UNKNOWN_VALUE: u8 = 0x10;
pub(crate) const INTEGRAL_VALUE: u8 = 0x11;
pub(crate) const FLOAT_VALUE: u8 = 0x12;
pub(crate) const COMPOSITE_VALUE: u8 = 0x13;
pub(crate) const DEPENDENT_VALUE: u8 = 0x14;

pub(crate) const FIXED_EVAL: u8 = 0x20;
pub(crate) const BINDING_EVAL: u8 = 0x21;
pub(crate) const UNARY_EVAL: u8 = 0x22;
pub(crate) const BINARY_EVAL: u8 = 0x23;
pub(crate) const CONDITIONAL_EVAL: u8 = 0x24;
pub(crate) const CALL_EVAL: u8 = 0x25;

pub(crate) const TYPE_ARGUMENT: u8 = 0x30;
pub(crate) const VALUE_ARGUMENT: u8 = 0x31;

/// Placeholder for something that could not be stored.
pub const UNSTORABLE_TYPE: u8 = 0x1D;
/// Reference to a persisted binding.
pub const BINDING_TYPE: u8 = 0x1E;
/// The slot holds a pointer to a chained, length-prefixed payload.
pub const INDIRECT_TYPE: u8 = 0x1F;

const MAX_NESTING: usize = 256;

/// Built-in type kinds.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize)]
#[repr(u8)]
#[serde(rename_all = "snake_case")]
pub enum BasicKind {
    /// `void`
    Void = 1,
    /// `bool` / `_Bool`
    Bool = 2,
    /// `char`
    Char = 3,
    /// `wchar_t`
    WChar = 4,
    /// `int` and its sized variants
    Int = 5,
    /// `float`
    Float = 6,
    /// `double`
    Double = 7,
}

impl BasicKind {
    fn from_u8(raw: u8) -> Result<Self> {
        Ok(match raw {
            1 => BasicKind::Void,
            2 => BasicKind::Bool,
            3 => BasicKind::Char,
            4 => BasicKind::WChar,
            5 => BasicKind::Int,
            6 => BasicKind::Float,
            7 => BasicKind::Double,
            other => {
                return Err(PdomError::unmarshal(format!("unknown basic type {other}")));
            }
        })
    }
}

/// Modifier bits of [`IndexType::Basic`].
pub mod basic_flags {
    /// `signed`
    pub const SIGNED: u8 = 0x01;
    /// `unsigned`
    pub const UNSIGNED: u8 = 0x02;
    /// `short`
    pub const SHORT: u8 = 0x04;
    /// `long`
    pub const LONG: u8 = 0x08;
    /// `long long`
    pub const LONG_LONG: u8 = 0x10;
    /// `_Complex`
    pub const COMPLEX: u8 = 0x20;
}

/// A type as stored in binding records.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexType {
    /// Something that could not be stored; also the sentinel for undecodable types.
    Unstorable,
    /// A persisted composite, enumeration or typedef.
    Binding(RecPtr),
    /// A built-in type.
    Basic {
        /// Which built-in type.
        kind: BasicKind,
        /// [`basic_flags`] bits.
        flags: u8,
    },
    /// Pointer to `target`.
    Pointer {
        /// Pointee.
        target: Box<IndexType>,
        /// Qualifiers of the pointer itself.
        is_const: bool,
    },
    /// cv-qualified `target`.
    Qualifier {
        /// Qualified type.
        target: Box<IndexType>,
        /// `const`
        is_const: bool,
        /// `volatile`
        is_volatile: bool,
    },
    /// Array of `element`.
    Array {
        /// Element type.
        element: Box<IndexType>,
        /// Array size, when known.
        size: Option<Box<IndexValue>>,
    },
    /// Function type.
    Function {
        /// Return type.
        return_type: Box<IndexType>,
        /// Parameter types.
        parameters: Vec<IndexType>,
        /// Trailing `...`.
        varargs: bool,
    },
    /// C++ reference to `target`.
    Reference {
        /// Referenced type.
        target: Box<IndexType>,
        /// `&&`
        rvalue: bool,
    },
}

/// A compile-time value.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexValue {
    /// Not known; also the sentinel for undecodable values.
    Unknown,
    /// Integral constant.
    Integral(i64),
    /// Floating point constant.
    Float(f64),
    /// Aggregate initializer.
    Composite(Vec<IndexValue>),
    /// Value of an expression that could not be folded.
    Dependent(Box<Evaluation>),
}

/// An expression kept in symbolic form.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Evaluation {
    /// Not evaluable; also the sentinel for undecodable evaluations.
    Problem,
    /// A constant of known type.
    Fixed {
        /// Type of the expression.
        ty: IndexType,
        /// Its value.
        value: IndexValue,
    },
    /// Use of a persisted binding.
    Binding {
        /// The binding.
        binding: RecPtr,
        /// Type of the expression.
        ty: IndexType,
    },
    /// Unary operator.
    Unary {
        /// Operator code.
        op: u8,
        /// Operand.
        operand: Box<Evaluation>,
    },
    /// Binary operator.
    Binary {
        /// Operator code.
        op: u8,
        /// Left operand.
        lhs: Box<Evaluation>,
        /// Right operand.
        rhs: Box<Evaluation>,
    },
    /// `cond ? then : otherwise`
    Conditional {
        /// Condition.
        condition: Box<Evaluation>,
        /// Value when true.
        then: Box<Evaluation>,
        /// Value when false.
        otherwise: Box<Evaluation>,
    },
    /// Function call.
    Call {
        /// Callee.
        function: Box<Evaluation>,
        /// Arguments.
        arguments: Vec<Evaluation>,
    },
}

/// Argument of a template instance.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TemplateArgument {
    /// Type argument.
    Type(IndexType),
    /// Non-type argument.
    Value {
        /// Type of the argument.
        ty: IndexType,
        /// Its value.
        value: IndexValue,
    },
}

/// Growable buffer items are marshalled into.
#[derive(Default, Debug, Clone)]
pub struct MarshalBuffer {
    bytes: Vec<u8>,
}

impl MarshalBuffer {
    /// Empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Marshalled bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Consumes the buffer.
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    /// Number of marshalled bytes.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Returns true if nothing was marshalled.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Appends a raw byte.
    pub fn put_byte(&mut self, value: u8) {
        self.bytes.push(value);
    }

    /// Appends a varint-encoded int.
    pub fn put_int(&mut self, value: i32) {
        var::encode_i32(value, &mut self.bytes);
    }

    /// Appends a varint-encoded long.
    pub fn put_long(&mut self, value: i64) {
        var::encode_i64(value, &mut self.bytes);
    }

    fn put_len(&mut self, len: usize) {
        var::encode_u64(len as u64, &mut self.bytes);
    }

    /// Appends a reference to a persisted binding.
    pub fn put_binding(&mut self, record: RecPtr) {
        if record.is_null() {
            self.put_byte(NULL_TYPE);
        } else {
            self.put_byte(BINDING_TYPE);
            var::encode_u64(record.0, &mut self.bytes);
        }
    }

    /// Appends a type; `None` is written as the null tag.
    pub fn put_type(&mut self, ty: Option<&IndexType>) {
        let Some(ty) = ty else {
            self.put_byte(NULL_TYPE);
            return;
        };
        match ty {
            IndexType::Unstorable => self.put_byte(UNSTORABLE_TYPE),
            IndexType::Binding(record) => self.put_binding(*record),
            IndexType::Basic { kind, flags } => {
                self.put_byte(BASIC_TYPE);
                self.put_byte(*kind as u8);
                self.put_byte(*flags);
            }
            IndexType::Pointer { target, is_const } => {
                self.put_byte(POINTER_TYPE);
                self.put_byte(u8::from(*is_const));
                self.put_type(Some(target));
            }
            IndexType::Qualifier {
                target,
                is_const,
                is_volatile,
            } => {
                self.put_byte(QUALIFIER_TYPE);
                self.put_byte(u8::from(*is_const) | (u8::from(*is_volatile) << 1));
                self.put_type(Some(target));
            }
            IndexType::Array { element, size } => {
                self.put_byte(ARRAY_TYPE);
                self.put_type(Some(element));
                self.put_value(size.as_deref());
            }
            IndexType::Function {
                return_type,
                parameters,
                varargs,
            } => {
                self.put_byte(FUNCTION_TYPE);
                self.put_byte(u8::from(*varargs));
                self.put_type(Some(return_type));
                self.put_len(parameters.len());
                for parameter in parameters {
                    self.put_type(Some(parameter));
                }
            }
            IndexType::Reference { target, rvalue } => {
                self.put_byte(REFERENCE_TYPE);
                self.put_byte(u8::from(*rvalue));
                self.put_type(Some(target));
            }
        }
    }

    /// Appends a value; `None` is written as the null tag.
    pub fn put_value(&mut self, value: Option<&IndexValue>) {
        let Some(value) = value else {
            self.put_byte(NULL_TYPE);
            return;
        };
        match value {
            IndexValue::Unknown => self.put_byte(UNKNOWN_VALUE),
            IndexValue::Integral(v) => {
                self.put_byte(INTEGRAL_VALUE);
                self.put_long(*v);
            }
            IndexValue::Float(v) => {
                self.put_byte(FLOAT_VALUE);
                self.bytes.extend_from_slice(&v.to_bits().to_be_bytes());
            }
            IndexValue::Composite(items) => {
                self.put_byte(COMPOSITE_VALUE);
                self.put_len(items.len());
                for item in items {
                    self.put_value(Some(item));
                }
            }
            IndexValue::Dependent(evaluation) => {
                self.put_byte(DEPENDENT_VALUE);
                self.put_evaluation(Some(evaluation));
            }
        }
    }

    /// Appends an evaluation; `None` is written as the null tag.
    pub fn put_evaluation(&mut self, evaluation: Option<&Evaluation>) {
        let Some(evaluation) = evaluation else {
            self.put_byte(NULL_TYPE);
            return;
        };
        match evaluation {
            Evaluation::Problem => self.put_byte(UNSTORABLE_TYPE),
            Evaluation::Fixed { ty, value } => {
                self.put_byte(FIXED_EVAL);
                self.put_type(Some(ty));
                self.put_value(Some(value));
            }
            Evaluation::Binding { binding, ty } => {
                self.put_byte(BINDING_EVAL);
                self.put_binding(*binding);
                self.put_type(Some(ty));
            }
            Evaluation::Unary { op, operand } => {
                self.put_byte(UNARY_EVAL);
                self.put_byte(*op);
                self.put_evaluation(Some(operand));
            }
            Evaluation::Binary { op, lhs, rhs } => {
                self.put_byte(BINARY_EVAL);
                self.put_byte(*op);
                self.put_evaluation(Some(lhs));
                self.put_evaluation(Some(rhs));
            }
            Evaluation::Conditional {
                condition,
                then,
                otherwise,
            } => {
                self.put_byte(CONDITIONAL_EVAL);
                self.put_evaluation(Some(condition));
                self.put_evaluation(Some(then));
                self.put_evaluation(Some(otherwise));
            }
            Evaluation::Call {
                function,
                arguments,
            } => {
                self.put_byte(CALL_EVAL);
                self.put_evaluation(Some(function));
                self.put_len(arguments.len());
                for argument in arguments {
                    self.put_evaluation(Some(argument));
                }
            }
        }
    }

    /// Appends a template argument.
    pub fn put_template_argument(&mut self, argument: &TemplateArgument) {
        match argument {
            TemplateArgument::Type(ty) => {
                self.put_byte(TYPE_ARGUMENT);
                self.put_type(Some(ty));
            }
            TemplateArgument::Value { ty, value } => {
                self.put_byte(VALUE_ARGUMENT);
                self.put_type(Some(ty));
                self.put_value(Some(value));
            }
        }
    }
}

/// Reads items written by a [`MarshalBuffer`].
pub struct UnmarshalBuffer<'a> {
    cursor: Cursor<'a>,
    depth: usize,
}

impl<'a> UnmarshalBuffer<'a> {
    /// Reader over `bytes`.
    pub fn new(bytes: &'a [u8]) -> Self {
        Self {
            cursor: Cursor::new(bytes),
            depth: 0,
        }
    }

    /// Bytes not read yet.
    pub fn remaining(&self) -> usize {
        self.cursor.remaining()
    }

    fn enter(&mut self) -> Result<()> {
        self.depth += 1;
        if self.depth > MAX_NESTING {
            return Err(PdomError::unmarshal("nesting too deep"));
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.depth -= 1;
    }

    fn flag(&mut self) -> Result<bool> {
        match self.cursor.byte()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(PdomError::unmarshal(format!("invalid flag byte {other}"))),
        }
    }

    fn len(&mut self) -> Result<usize> {
        let len = self.cursor.var_u64()?;
        let len = usize::try_from(len).map_err(|_| PdomError::unmarshal("length overflow"))?;
        if len > self.cursor.remaining() {
            return Err(PdomError::unmarshal(format!(
                "list of {len} items in {} bytes",
                self.cursor.remaining()
            )));
        }
        Ok(len)
    }

    fn binding_record(&mut self) -> Result<RecPtr> {
        let raw = self.cursor.var_u64()?;
        if raw == 0 {
            return Err(PdomError::unmarshal("binding reference to null record"));
        }
        Ok(RecPtr(raw))
    }

    /// Reads a persisted binding reference.
    pub fn get_binding(&mut self) -> Result<Option<RecPtr>> {
        match self.cursor.byte()? {
            NULL_TYPE => Ok(None),
            BINDING_TYPE => Ok(Some(self.binding_record()?)),
            tag => Err(PdomError::unmarshal(format!(
                "expected binding, found tag {tag:#04x}"
            ))),
        }
    }

    /// Reads a type.
    pub fn get_type(&mut self) -> Result<Option<IndexType>> {
        self.enter()?;
        let tag = self.cursor.byte()?;
        let ty = match tag {
            NULL_TYPE => None,
            UNSTORABLE_TYPE => Some(IndexType::Unstorable),
            BINDING_TYPE => Some(IndexType::Binding(self.binding_record()?)),
            BASIC_TYPE => Some(IndexType::Basic {
                kind: BasicKind::from_u8(self.cursor.byte()?)?,
                flags: self.cursor.byte()?,
            }),
            POINTER_TYPE => {
                let is_const = self.flag()?;
                Some(IndexType::Pointer {
                    target: Box::new(self.required_type()?),
                    is_const,
                })
            }
            QUALIFIER_TYPE => {
                let bits = self.cursor.byte()?;
                if bits > 3 {
                    return Err(PdomError::unmarshal("invalid qualifier bits"));
                }
                Some(IndexType::Qualifier {
                    target: Box::new(self.required_type()?),
                    is_const: bits & 1 != 0,
                    is_volatile: bits & 2 != 0,
                })
            }
            ARRAY_TYPE => {
                let element = Box::new(self.required_type()?);
                let size = self.get_value()?.map(Box::new);
                Some(IndexType::Array { element, size })
            }
            FUNCTION_TYPE => {
                let varargs = self.flag()?;
                let return_type = Box::new(self.required_type()?);
                let count = self.len()?;
                let mut parameters = Vec::with_capacity(count);
                for _ in 0..count {
                    parameters.push(self.required_type()?);
                }
                Some(IndexType::Function {
                    return_type,
                    parameters,
                    varargs,
                })
            }
            REFERENCE_TYPE => {
                let rvalue = self.flag()?;
                Some(IndexType::Reference {
                    target: Box::new(self.required_type()?),
                    rvalue,
                })
            }
            tag => {
                return Err(PdomError::unmarshal(format!(
                    "expected type, found tag {tag:#04x}"
                )))
            }
        };
        self.leave();
        Ok(ty)
    }

    fn required_type(&mut self) -> Result<IndexType> {
        self.get_type()?
            .ok_or_else(|| PdomError::unmarshal("missing nested type"))
    }

    /// Reads a value.
    pub fn get_value(&mut self) -> Result<Option<IndexValue>> {
        self.enter()?;
        let value = match self.cursor.byte()? {
            NULL_TYPE => None,
            UNKNOWN_VALUE => Some(IndexValue::Unknown),
            INTEGRAL_VALUE => Some(IndexValue::Integral(self.cursor.var_i64()?)),
            FLOAT_VALUE => {
                let bytes = self.cursor.take(8)?;
                let mut raw = [0u8; 8];
                raw.copy_from_slice(bytes);
                Some(IndexValue::Float(f64::from_bits(u64::from_be_bytes(raw))))
            }
            COMPOSITE_VALUE => {
                let count = self.len()?;
                let mut items = Vec::with_capacity(count);
                for _ in 0..count {
                    items.push(self.required_value()?);
                }
                Some(IndexValue::Composite(items))
            }
            DEPENDENT_VALUE => Some(IndexValue::Dependent(Box::new(
                self.required_evaluation()?,
            ))),
            tag => {
                return Err(PdomError::unmarshal(format!(
                    "expected value, found tag {tag:#04x}"
                )))
            }
        };
        self.leave();
        Ok(value)
    }

    fn required_value(&mut self) -> Result<IndexValue> {
        self.get_value()?
            .ok_or_else(|| PdomError::unmarshal("missing nested value"))
    }

    /// Reads an evaluation.
    pub fn get_evaluation(&mut self) -> Result<Option<Evaluation>> {
        self.enter()?;
        let evaluation = match self.cursor.byte()? {
            NULL_TYPE => None,
            UNSTORABLE_TYPE => Some(Evaluation::Problem),
            FIXED_EVAL => Some(Evaluation::Fixed {
                ty: self.required_type()?,
                value: self.required_value()?,
            }),
            BINDING_EVAL => {
                let binding = self
                    .get_binding()?
                    .ok_or_else(|| PdomError::unmarshal("binding evaluation without binding"))?;
                Some(Evaluation::Binding {
                    binding,
                    ty: self.required_type()?,
                })
            }
            UNARY_EVAL => Some(Evaluation::Unary {
                op: self.cursor.byte()?,
                operand: Box::new(self.required_evaluation()?),
            }),
            BINARY_EVAL => Some(Evaluation::Binary {
                op: self.cursor.byte()?,
                lhs: Box::new(self.required_evaluation()?),
                rhs: Box::new(self.required_evaluation()?),
            }),
            CONDITIONAL_EVAL => Some(Evaluation::Conditional {
                condition: Box::new(self.required_evaluation()?),
                then: Box::new(self.required_evaluation()?),
                otherwise: Box::new(self.required_evaluation()?),
            }),
            CALL_EVAL => {
                let function = Box::new(self.required_evaluation()?);
                let count = self.len()?;
                let mut arguments = Vec::with_capacity(count);
                for _ in 0..count {
                    arguments.push(self.required_evaluation()?);
                }
                Some(Evaluation::Call {
                    function,
                    arguments,
                })
            }
            tag => {
                return Err(PdomError::unmarshal(format!(
                    "expected evaluation, found tag {tag:#04x}"
                )))
            }
        };
        self.leave();
        Ok(evaluation)
    }

    fn required_evaluation(&mut self) -> Result<Evaluation> {
        self.get_evaluation()?
            .ok_or_else(|| PdomError::unmarshal("missing nested evaluation"))
    }

    /// Reads a template argument.
    pub fn get_template_argument(&mut self) -> Result<TemplateArgument> {
        match self.cursor.byte()? {
            TYPE_ARGUMENT => Ok(TemplateArgument::Type(self.required_type()?)),
            VALUE_ARGUMENT => Ok(TemplateArgument::Value {
                ty: self.required_type()?,
                value: self.required_value()?,
            }),
            tag => Err(PdomError::unmarshal(format!(
                "expected template argument, found tag {tag:#04x}"
            ))),
        }
    }
}
