//! Runtime values and the heap they point into.
//!
//! [`Value`] is the dynamic counterpart of a [`TypeRef`]. Values themselves
//! are trees; anything with reference identity (pointees, sequence backing
//! stores, maps) lives in a [`Heap`] cell and is referred to by address, so
//! two values can share a cell and a cell can (indirectly) contain itself.
//!
//! [`TypeRef`]: typesynth_core::types::TypeRef

use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use typesynth_core::types::{Presence, WrapperKind};

use super::error::RuntimeError;

/// A runtime value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Uint(u64),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
    /// Record or literal fields in declaration order.
    Record(IndexMap<String, Value>),
    /// Fixed-size array, stored inline.
    Array(Vec<Value>),
    /// Address of a [`Cell::Value`]; `None` is nil.
    Pointer(Option<usize>),
    /// Address of a [`Cell::Sequence`]; `None` is nil.
    Sequence(Option<usize>),
    /// Address of a [`Cell::Map`]; `None` is nil.
    Map(Option<usize>),
    Wrapped {
        kind: WrapperKind,
        state: Presence,
        /// Payload, present only in the defined state.
        value: Option<Box<Value>>,
    },
    /// Handle to something without a structural shape.
    Opaque(String),
}

impl Value {
    pub fn str(s: &str) -> Value {
        Value::Str(s.to_string())
    }

    pub fn record<'a>(fields: impl IntoIterator<Item = (&'a str, Value)>) -> Value {
        Value::Record(
            fields
                .into_iter()
                .map(|(name, value)| (name.to_string(), value))
                .collect(),
        )
    }

    pub fn defined(kind: WrapperKind, value: Value) -> Value {
        Value::Wrapped {
            kind,
            state: Presence::Defined,
            value: Some(Box::new(value)),
        }
    }

    /// A wrapper in an absent state.
    pub fn absent(kind: WrapperKind, state: Presence) -> Value {
        Value::Wrapped {
            kind,
            state,
            value: None,
        }
    }

    pub fn null(kind: WrapperKind) -> Value {
        Value::absent(kind, Presence::Null)
    }

    pub fn undefined(kind: WrapperKind) -> Value {
        Value::absent(kind, Presence::Undefined)
    }

    /// Presence state if this is a wrapper.
    pub fn state(&self) -> Option<Presence> {
        match self {
            Value::Wrapped { state, .. } => Some(*state),
            _ => None,
        }
    }

    /// Defined payload of a wrapper.
    pub fn payload(&self) -> Option<&Value> {
        match self {
            Value::Wrapped {
                state: Presence::Defined,
                value: Some(v),
                ..
            } => Some(v),
            _ => None,
        }
    }

    pub fn field(&self, name: &str) -> Result<&Value, RuntimeError> {
        match self {
            Value::Record(fields) => fields.get(name).ok_or_else(|| RuntimeError::MissingField {
                field: name.to_string(),
            }),
            other => Err(RuntimeError::TypeMismatch {
                expected: "record".into(),
                got: other.type_name().into(),
            }),
        }
    }

    /// A zero value with the same shape as `self`: scalars zeroed, references
    /// nil, wrappers in their zero state.
    pub fn zero_like(&self) -> Value {
        match self {
            Value::Bool(_) => Value::Bool(false),
            Value::Int(_) => Value::Int(0),
            Value::Uint(_) => Value::Uint(0),
            Value::Float(_) => Value::Float(0.0),
            Value::Str(_) => Value::Str(String::new()),
            Value::Bytes(_) => Value::Bytes(Vec::new()),
            Value::Record(fields) => Value::Record(
                fields
                    .iter()
                    .map(|(k, v)| (k.clone(), v.zero_like()))
                    .collect(),
            ),
            Value::Array(items) => Value::Array(items.iter().map(Value::zero_like).collect()),
            Value::Pointer(_) => Value::Pointer(None),
            Value::Sequence(_) => Value::Sequence(None),
            Value::Map(_) => Value::Map(None),
            Value::Wrapped { kind, .. } => Value::absent(*kind, kind.zero_state()),
            Value::Opaque(_) => Value::Opaque(String::new()),
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Uint(_) => "uint",
            Value::Float(_) => "float",
            Value::Str(_) => "string",
            Value::Bytes(_) => "bytes",
            Value::Record(_) => "record",
            Value::Array(_) => "array",
            Value::Pointer(_) => "pointer",
            Value::Sequence(_) => "sequence",
            Value::Map(_) => "map",
            Value::Wrapped { .. } => "wrapper",
            Value::Opaque(_) => "opaque",
        }
    }
}

/// Renders map keys and scalars the way they appear in validation paths.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Uint(u) => write!(f, "{}", u),
            Value::Float(x) => write!(f, "{}", x),
            Value::Str(s) => f.write_str(s),
            other => write!(f, "<{}>", other.type_name()),
        }
    }
}

/// A heap cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Cell {
    Value(Value),
    Sequence(Vec<Value>),
    /// Entries in insertion order.
    Map(Vec<(Value, Value)>),
}

/// Flat arena of cells addressed by index.
#[derive(Debug, Clone, Default)]
pub struct Heap {
    cells: Vec<Cell>,
}

impl Heap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alloc(&mut self, cell: Cell) -> usize {
        let addr = self.cells.len();
        self.cells.push(cell);
        addr
    }

    /// Total number of cells ever allocated.
    pub fn allocations(&self) -> usize {
        self.cells.len()
    }

    pub fn pointer(&mut self, value: Value) -> Value {
        Value::Pointer(Some(self.alloc(Cell::Value(value))))
    }

    pub fn sequence(&mut self, items: Vec<Value>) -> Value {
        Value::Sequence(Some(self.alloc(Cell::Sequence(items))))
    }

    pub fn map(&mut self, entries: Vec<(Value, Value)>) -> Value {
        Value::Map(Some(self.alloc(Cell::Map(entries))))
    }

    pub fn cell(&self, addr: usize) -> Result<&Cell, RuntimeError> {
        self.cells.get(addr).ok_or(RuntimeError::DanglingAddress {
            addr,
            size: self.cells.len(),
        })
    }

    pub fn store(&mut self, addr: usize, cell: Cell) -> Result<(), RuntimeError> {
        let size = self.cells.len();
        let slot = self
            .cells
            .get_mut(addr)
            .ok_or(RuntimeError::DanglingAddress { addr, size })?;
        *slot = cell;
        Ok(())
    }

    /// The value a pointer cell holds.
    pub fn load(&self, addr: usize) -> Result<&Value, RuntimeError> {
        match self.cell(addr)? {
            Cell::Value(v) => Ok(v),
            _ => Err(RuntimeError::TypeMismatch {
                expected: "pointer cell".into(),
                got: "container cell".into(),
            }),
        }
    }

    /// Elements of a sequence value or an array; nil is empty.
    pub fn elements(&self, value: &Value) -> Result<Vec<Value>, RuntimeError> {
        match value {
            Value::Array(items) => Ok(items.clone()),
            Value::Sequence(None) => Ok(Vec::new()),
            Value::Sequence(Some(addr)) => match self.cell(*addr)? {
                Cell::Sequence(items) => Ok(items.clone()),
                _ => Err(RuntimeError::TypeMismatch {
                    expected: "sequence cell".into(),
                    got: "other cell".into(),
                }),
            },
            other => Err(RuntimeError::TypeMismatch {
                expected: "sequence".into(),
                got: other.type_name().into(),
            }),
        }
    }

    /// Entries of a map value; nil is empty.
    pub fn entries(&self, value: &Value) -> Result<Vec<(Value, Value)>, RuntimeError> {
        match value {
            Value::Map(None) => Ok(Vec::new()),
            Value::Map(Some(addr)) => match self.cell(*addr)? {
                Cell::Map(entries) => Ok(entries.clone()),
                _ => Err(RuntimeError::TypeMismatch {
                    expected: "map cell".into(),
                    got: "other cell".into(),
                }),
            },
            other => Err(RuntimeError::TypeMismatch {
                expected: "map".into(),
                got: other.type_name().into(),
            }),
        }
    }

    /// Length of a sequence, array or map value.
    pub fn len_of(&self, value: &Value) -> Result<usize, RuntimeError> {
        match value {
            Value::Map(_) => Ok(self.entries(value)?.len()),
            _ => Ok(self.elements(value)?.len()),
        }
    }
}
