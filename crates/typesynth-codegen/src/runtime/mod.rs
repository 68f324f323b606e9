//! Reference evaluator for synthesized definitions.
//!
//! The synthesizer only produces structured definitions; this module runs
//! them against dynamic [`Value`]s so their behavior can be checked without
//! rendering any source.
//!
//! # Architecture
//!
//! - [`Runtime`] indexes the emitted functions by `(type, kind)` and holds
//!   the [`Heap`] every reference value points into.
//! - Capabilities declared by types (user-supplied clone, projection and
//!   validation methods) are stood in for by host closures registered with
//!   [`Runtime::register_host`] and [`Runtime::register_validator`].
//! - Deep copies and projections keep a per-call map from old to new
//!   addresses, so shared and cyclic instances are copied once per cell.
//! - Heap references are followed through work lists rather than native
//!   recursion, so chains of any length stay within a fixed stack.
//! - Callbacks for live type parameters are resolved through a chain of
//!   frames: each generated clone call binds its parameters to the caller's
//!   copy ops, evaluated in the caller's frame.

mod check;
mod copy;
pub mod error;
mod project;
mod update;
pub mod value;

pub use error::{join_path, RuntimeError, ValidationFailure};
pub use value::{Cell, Heap, Value};

use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;

use typesynth_core::id::QualifiedName;
use typesynth_core::types::{ScalarType, TypeKind, TypeRef};
use typesynth_core::universe::Universe;

use crate::defs::{Definition, FunctionDef, FunctionKind, Item};

/// Capability a host closure stands in for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HostKind {
    Clone,
    ToPlain,
    FromPlain,
}

impl fmt::Display for HostKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            HostKind::Clone => "clone",
            HostKind::ToPlain => "to-plain",
            HostKind::FromPlain => "from-plain",
        };
        f.write_str(s)
    }
}

/// User-supplied transform of one value.
pub type HostFn = Box<dyn Fn(&mut Heap, &Value) -> Result<Value, String>>;

/// User-supplied validator; the failure path is relative to the value.
pub type HostValidator = Box<dyn Fn(&Heap, &Value) -> Option<ValidationFailure>>;

/// Kind of heap cell a copy or projection allocates before filling it.
#[derive(Debug, Clone, Copy)]
enum CellKind {
    Pointer,
    Sequence,
    Map,
}

impl CellKind {
    fn placeholder(self) -> Cell {
        match self {
            CellKind::Pointer => Cell::Value(Value::Pointer(None)),
            CellKind::Sequence => Cell::Sequence(Vec::new()),
            CellKind::Map => Cell::Map(Vec::new()),
        }
    }
}

/// Configuration for the runtime.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Maximum inline nesting of generated calls and of zero values.
    /// References are followed iteratively and do not count. Default: 64.
    pub max_depth: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        RuntimeConfig { max_depth: 64 }
    }
}

/// Evaluates synthesized definitions over [`Value`]s.
pub struct Runtime<'u> {
    universe: &'u Universe,
    functions: HashMap<(QualifiedName, FunctionKind), Rc<FunctionDef>>,
    hosts: HashMap<(QualifiedName, HostKind), HostFn>,
    validators: HashMap<QualifiedName, HostValidator>,
    config: RuntimeConfig,
    heap: Heap,
}

impl<'u> Runtime<'u> {
    /// Creates a runtime over the functions among `definitions`.
    pub fn new(universe: &'u Universe, definitions: &[Definition]) -> Self {
        let functions = definitions
            .iter()
            .filter_map(|d| match &d.item {
                Item::Function(f) => Some((
                    (f.signature.target.clone(), f.signature.kind),
                    Rc::new(f.clone()),
                )),
                _ => None,
            })
            .collect();
        Runtime {
            universe,
            functions,
            hosts: HashMap::new(),
            validators: HashMap::new(),
            config: RuntimeConfig::default(),
            heap: Heap::new(),
        }
    }

    pub fn with_config(mut self, config: RuntimeConfig) -> Self {
        self.config = config;
        self
    }

    pub fn register_host(
        &mut self,
        name: QualifiedName,
        kind: HostKind,
        f: impl Fn(&mut Heap, &Value) -> Result<Value, String> + 'static,
    ) {
        self.hosts.insert((name, kind), Box::new(f));
    }

    pub fn register_validator(
        &mut self,
        name: QualifiedName,
        f: impl Fn(&Heap, &Value) -> Option<ValidationFailure> + 'static,
    ) {
        self.validators.insert(name, Box::new(f));
    }

    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    pub fn heap_mut(&mut self) -> &mut Heap {
        &mut self.heap
    }

    pub fn function(&self, name: &QualifiedName, kind: FunctionKind) -> Option<&FunctionDef> {
        self.functions.get(&(name.clone(), kind)).map(|f| f.as_ref())
    }

    fn lookup(&self, name: &QualifiedName, kind: FunctionKind) -> Option<Rc<FunctionDef>> {
        self.functions.get(&(name.clone(), kind)).cloned()
    }

    fn require(&self, name: &QualifiedName, kind: FunctionKind) -> Result<Rc<FunctionDef>, RuntimeError> {
        self.lookup(name, kind).ok_or_else(|| RuntimeError::FunctionNotFound {
            name: name.clone(),
            kind,
        })
    }

    fn call_host(
        &mut self,
        name: &QualifiedName,
        kind: HostKind,
        value: &Value,
    ) -> Result<Value, RuntimeError> {
        let f = self
            .hosts
            .get(&(name.clone(), kind))
            .ok_or_else(|| RuntimeError::HostNotRegistered {
                name: name.clone(),
                kind: kind.to_string(),
            })?;
        f(&mut self.heap, value).map_err(|message| RuntimeError::Host {
            name: name.clone(),
            message,
        })
    }

    // -----------------------------------------------------------------------
    // Zero and absent values
    // -----------------------------------------------------------------------

    /// Follows aliases until `ty` is not a named alias.
    fn resolve(&self, ty: &TypeRef) -> TypeRef {
        let mut current = ty.clone();
        for _ in 0..self.config.max_depth {
            let next = match &current {
                TypeRef::Named { name, .. } => match self.universe.get(name).map(|e| &e.kind) {
                    Some(TypeKind::Alias { target }) => target.clone(),
                    _ => return current,
                },
                _ => return current,
            };
            current = next;
        }
        current
    }

    /// The zero value of `ty`.
    pub fn zero_value(&self, ty: &TypeRef) -> Result<Value, RuntimeError> {
        self.zero_at(ty, 0)
    }

    fn zero_at(&self, ty: &TypeRef, depth: usize) -> Result<Value, RuntimeError> {
        if depth > self.config.max_depth {
            return Err(RuntimeError::RecursionLimitExceeded {
                limit: self.config.max_depth,
            });
        }
        let value = match ty {
            TypeRef::Scalar(s) => match s {
                ScalarType::Bool => Value::Bool(false),
                ScalarType::Int => Value::Int(0),
                ScalarType::Uint => Value::Uint(0),
                ScalarType::Float => Value::Float(0.0),
                ScalarType::String => Value::Str(String::new()),
                ScalarType::Bytes => Value::Bytes(Vec::new()),
            },
            TypeRef::Pointer(_) => Value::Pointer(None),
            TypeRef::Sequence(_) => Value::Sequence(None),
            TypeRef::Map { .. } => Value::Map(None),
            TypeRef::Array { elem, len } => {
                let zero = self.zero_at(elem, depth + 1)?;
                Value::Array(vec![zero; *len as usize])
            }
            TypeRef::Wrapper { kind, .. } => Value::absent(*kind, kind.zero_state()),
            TypeRef::Literal(fields) => {
                let mut out = IndexMap::new();
                for field in fields {
                    out.insert(field.name.clone(), self.zero_at(&field.ty, depth + 1)?);
                }
                Value::Record(out)
            }
            TypeRef::Opaque(_) => Value::Opaque(String::new()),
            TypeRef::Param(p) => {
                return Err(RuntimeError::TypeMismatch {
                    expected: "concrete type".into(),
                    got: format!("type parameter {}", p),
                })
            }
            TypeRef::Named { name, .. } => {
                let entry = self
                    .universe
                    .get(name)
                    .ok_or_else(|| RuntimeError::UnknownType { name: name.clone() })?;
                match &entry.kind {
                    TypeKind::Record { fields } => {
                        let mut out = IndexMap::new();
                        for field in fields {
                            out.insert(field.name.clone(), self.zero_at(&field.ty, depth + 1)?);
                        }
                        Value::Record(out)
                    }
                    TypeKind::Alias { target } => self.zero_at(target, depth + 1)?,
                    TypeKind::Container { shape } => self.zero_at(shape, depth + 1)?,
                }
            }
        };
        Ok(value)
    }

    /// The explicit-absent value of `ty`: a wrapper's null state, otherwise
    /// the zero value.
    pub fn absent_value(&self, ty: &TypeRef) -> Result<Value, RuntimeError> {
        match self.resolve(ty) {
            TypeRef::Wrapper { kind, .. } => Ok(Value::null(kind)),
            resolved => self.zero_value(&resolved),
        }
    }

    // -----------------------------------------------------------------------
    // Structural comparison
    // -----------------------------------------------------------------------

    /// Structural equality through the heap. Cycles compare equal when both
    /// sides revisit the same pair of cells.
    pub fn deep_eq(&self, a: &Value, b: &Value) -> Result<bool, RuntimeError> {
        let mut seen = HashSet::new();
        let mut pending = vec![(a.clone(), b.clone())];
        while let Some((a, b)) = pending.pop() {
            if !self.eq_step(&a, &b, &mut seen, &mut pending)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Compares the outer shape of `a` and `b` and queues their children.
    fn eq_step(
        &self,
        a: &Value,
        b: &Value,
        seen: &mut HashSet<(usize, usize)>,
        pending: &mut Vec<(Value, Value)>,
    ) -> Result<bool, RuntimeError> {
        match (a, b) {
            (Value::Pointer(Some(x)), Value::Pointer(Some(y))) => {
                if seen.insert((*x, *y)) {
                    pending.push((self.heap.load(*x)?.clone(), self.heap.load(*y)?.clone()));
                }
                Ok(true)
            }
            (Value::Sequence(Some(x)), Value::Sequence(Some(y))) => {
                if !seen.insert((*x, *y)) {
                    return Ok(true);
                }
                let (l, r) = (self.heap.elements(a)?, self.heap.elements(b)?);
                Ok(queue_pairs(l, r, pending))
            }
            (Value::Map(Some(x)), Value::Map(Some(y))) => {
                if !seen.insert((*x, *y)) {
                    return Ok(true);
                }
                let (l, r) = (self.heap.entries(a)?, self.heap.entries(b)?);
                if l.len() != r.len() {
                    return Ok(false);
                }
                for ((lk, lv), (rk, rv)) in l.into_iter().zip(r) {
                    if lk != rk {
                        return Ok(false);
                    }
                    pending.push((lv, rv));
                }
                Ok(true)
            }
            (Value::Array(l), Value::Array(r)) => Ok(queue_pairs(l.clone(), r.clone(), pending)),
            (Value::Record(l), Value::Record(r)) => {
                if l.len() != r.len() || l.keys().ne(r.keys()) {
                    return Ok(false);
                }
                Ok(queue_pairs(
                    l.values().cloned().collect(),
                    r.values().cloned().collect(),
                    pending,
                ))
            }
            (
                Value::Wrapped {
                    kind: lk,
                    state: ls,
                    value: lv,
                },
                Value::Wrapped {
                    kind: rk,
                    state: rs,
                    value: rv,
                },
            ) => {
                if lk != rk || ls != rs {
                    return Ok(false);
                }
                match (lv, rv) {
                    (Some(l), Some(r)) => {
                        pending.push(((**l).clone(), (**r).clone()));
                        Ok(true)
                    }
                    (None, None) => Ok(true),
                    _ => Ok(false),
                }
            }
            _ => Ok(a == b),
        }
    }

    /// Every heap address reachable from `value`.
    pub fn addresses(&self, value: &Value) -> Result<BTreeSet<usize>, RuntimeError> {
        let mut out = BTreeSet::new();
        let mut stack = vec![value.clone()];
        while let Some(v) = stack.pop() {
            match &v {
                Value::Pointer(Some(addr)) => {
                    if out.insert(*addr) {
                        stack.push(self.heap.load(*addr)?.clone());
                    }
                }
                Value::Sequence(Some(addr)) => {
                    if out.insert(*addr) {
                        stack.extend(self.heap.elements(&v)?);
                    }
                }
                Value::Map(Some(addr)) => {
                    if out.insert(*addr) {
                        for (k, item) in self.heap.entries(&v)? {
                            stack.push(k);
                            stack.push(item);
                        }
                    }
                }
                Value::Record(fields) => stack.extend(fields.values().cloned()),
                Value::Array(items) => stack.extend(items.iter().cloned()),
                Value::Wrapped { value: Some(inner), .. } => stack.push((**inner).clone()),
                _ => {}
            }
        }
        Ok(out)
    }

    /// Whether `a` and `b` reach a common heap cell.
    pub fn shares_identity(&self, a: &Value, b: &Value) -> Result<bool, RuntimeError> {
        let left = self.addresses(a)?;
        let right = self.addresses(b)?;
        Ok(!left.is_disjoint(&right))
    }
}

/// Queues `l` and `r` pairwise; false when their lengths differ.
fn queue_pairs(l: Vec<Value>, r: Vec<Value>, pending: &mut Vec<(Value, Value)>) -> bool {
    if l.len() != r.len() {
        return false;
    }
    pending.extend(l.into_iter().zip(r));
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use typesynth_core::types::{FieldDef, TypeEntry, WrapperKind};

    fn universe() -> Universe {
        Universe::from_entries(vec![
            TypeEntry::record(
                QualifiedName::new("m", "R"),
                vec![
                    FieldDef::new("N", TypeRef::int()),
                    FieldDef::new("S", TypeRef::seq(TypeRef::string())),
                    FieldDef::new("U", TypeRef::und(TypeRef::int())),
                    FieldDef::new("A", TypeRef::array(TypeRef::option(TypeRef::int()), 2)),
                ],
            ),
            TypeEntry::alias(QualifiedName::new("m", "MaybeInt"), TypeRef::option(TypeRef::int())),
        ])
        .unwrap()
    }

    #[test]
    fn zero_values_follow_declarations() {
        let universe = universe();
        let rt = Runtime::new(&universe, &[]);
        let zero = rt.zero_value(&TypeRef::named("m", "R")).unwrap();
        assert_eq!(
            zero,
            Value::record([
                ("N", Value::Int(0)),
                ("S", Value::Sequence(None)),
                ("U", Value::undefined(WrapperKind::Und)),
                (
                    "A",
                    Value::Array(vec![Value::null(WrapperKind::Option), Value::null(WrapperKind::Option)])
                ),
            ])
        );
        assert!(rt.zero_value(&TypeRef::named("m", "Missing")).is_err());
    }

    #[test]
    fn absent_value_follows_aliases() {
        let universe = universe();
        let rt = Runtime::new(&universe, &[]);
        assert_eq!(
            rt.absent_value(&TypeRef::named("m", "MaybeInt")).unwrap(),
            Value::null(WrapperKind::Option)
        );
        assert_eq!(
            rt.absent_value(&TypeRef::und(TypeRef::int())).unwrap(),
            Value::null(WrapperKind::Und)
        );
        assert_eq!(rt.absent_value(&TypeRef::int()).unwrap(), Value::Int(0));
    }

    #[test]
    fn deep_eq_sees_through_cells() {
        let universe = universe();
        let mut rt = Runtime::new(&universe, &[]);
        let a = rt.heap_mut().sequence(vec![Value::Int(1)]);
        let b = rt.heap_mut().sequence(vec![Value::Int(1)]);
        assert!(rt.deep_eq(&a, &b).unwrap());
        assert!(!rt.shares_identity(&a, &b).unwrap());
        assert!(rt.shares_identity(&a, &a).unwrap());
        assert!(!rt.deep_eq(&a, &Value::Sequence(None)).unwrap());
    }
}
