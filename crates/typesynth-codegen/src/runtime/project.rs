//! Evaluation of plain projections.
//!
//! Like clones, projections allocate each referenced cell once and fill it
//! from a work list, so shared and cyclic references keep their shape and
//! long chains do not nest calls.

use std::collections::HashMap;

use indexmap::IndexMap;

use typesynth_core::id::QualifiedName;
use typesynth_core::types::{Capability, Presence, WrapperKind};

use crate::defs::{Body, FunctionKind};
use crate::plain::{PlainBody, PlainConv};

use super::error::RuntimeError;
use super::value::{Cell, Value};
use super::{CellKind, HostKind, Runtime};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    ToPlain,
    FromPlain,
}

impl Direction {
    fn function_kind(self) -> FunctionKind {
        match self {
            Direction::ToPlain => FunctionKind::ToPlain,
            Direction::FromPlain => FunctionKind::FromPlain,
        }
    }

    fn host_kind(self) -> HostKind {
        match self {
            Direction::ToPlain => HostKind::ToPlain,
            Direction::FromPlain => HostKind::FromPlain,
        }
    }
}

/// A projected cell whose contents are still to be filled from `from`.
#[derive(Debug)]
struct Deferred {
    kind: CellKind,
    from: usize,
    to: usize,
    conv: PlainConv,
}

/// Per top-level projection: direction, old address to new address and
/// queued cells.
#[derive(Debug)]
struct Walk {
    dir: Direction,
    projected: HashMap<usize, usize>,
    pending: Vec<Deferred>,
}

impl Walk {
    fn new(dir: Direction) -> Self {
        Walk {
            dir,
            projected: HashMap::new(),
            pending: Vec::new(),
        }
    }
}

impl Runtime<'_> {
    /// Projects `value` of type `name` onto its plain companion. A type
    /// without a companion is its own plain type.
    pub fn to_plain(&mut self, name: &QualifiedName, value: &Value) -> Result<Value, RuntimeError> {
        self.project_root(name, value, Direction::ToPlain)
    }

    /// Inverse of [`Runtime::to_plain`]. Fields left out of the companion come
    /// back as zero values.
    pub fn from_plain(&mut self, name: &QualifiedName, plain: &Value) -> Result<Value, RuntimeError> {
        self.project_root(name, plain, Direction::FromPlain)
    }

    fn project_root(
        &mut self,
        name: &QualifiedName,
        value: &Value,
        dir: Direction,
    ) -> Result<Value, RuntimeError> {
        let mut walk = Walk::new(dir);
        let out = self.project_named(name, value, &mut walk)?;
        while let Some(job) = walk.pending.pop() {
            let cell = match job.kind {
                CellKind::Pointer => {
                    let pointee = self.heap.load(job.from)?.clone();
                    Cell::Value(self.project(&job.conv, &pointee, &mut walk)?)
                }
                CellKind::Sequence => {
                    let items = self.heap.elements(&Value::Sequence(Some(job.from)))?;
                    Cell::Sequence(self.project_all(&job.conv, items, &mut walk)?)
                }
                CellKind::Map => {
                    let mut entries = Vec::new();
                    for (key, item) in self.heap.entries(&Value::Map(Some(job.from)))? {
                        entries.push((key, self.project(&job.conv, &item, &mut walk)?));
                    }
                    Cell::Map(entries)
                }
            };
            self.heap.store(job.to, cell)?;
        }
        Ok(out)
    }

    /// Address of the projection of cell `from`, allocating and queueing it
    /// on first sight.
    fn defer_projection(&mut self, kind: CellKind, from: usize, conv: &PlainConv, walk: &mut Walk) -> usize {
        if let Some(&to) = walk.projected.get(&from) {
            return to;
        }
        let to = self.heap.alloc(kind.placeholder());
        walk.projected.insert(from, to);
        walk.pending.push(Deferred {
            kind,
            from,
            to,
            conv: conv.clone(),
        });
        to
    }

    fn project_named(
        &mut self,
        name: &QualifiedName,
        value: &Value,
        walk: &mut Walk,
    ) -> Result<Value, RuntimeError> {
        let function = match self.lookup(name, walk.dir.function_kind()) {
            Some(f) => f,
            None => {
                if self.universe.capability(name, Capability::Project).is_some() {
                    return self.call_host(name, walk.dir.host_kind(), value);
                }
                return Ok(value.clone());
            }
        };
        let body: &PlainBody = match &function.body {
            Body::Plain(body) => body,
            _ => {
                return Err(RuntimeError::TypeMismatch {
                    expected: "plain body".into(),
                    got: function.signature.name.clone(),
                })
            }
        };

        if let [step] = body.steps.as_slice() {
            if step.field.is_empty() {
                return self.project(&step.conv, value, walk);
            }
        }

        let record = match value {
            Value::Record(r) => r,
            other => return Err(mismatch("record", other)),
        };
        let mut out = IndexMap::new();
        for step in &body.steps {
            let v = record.get(&step.field).ok_or_else(|| RuntimeError::MissingField {
                field: step.field.clone(),
            })?;
            out.insert(step.field.clone(), self.project(&step.conv, v, walk)?);
        }
        if walk.dir == Direction::FromPlain {
            out = self.restore_omitted(name, out)?;
        }
        Ok(Value::Record(out))
    }

    /// Puts the fields of `name` in declaration order, zeroing the ones the
    /// companion does not carry.
    fn restore_omitted(
        &self,
        name: &QualifiedName,
        mut fields: IndexMap<String, Value>,
    ) -> Result<IndexMap<String, Value>, RuntimeError> {
        let entry = self
            .universe
            .get(name)
            .ok_or_else(|| RuntimeError::UnknownType { name: name.clone() })?;
        let mut out = IndexMap::new();
        for field in entry.fields() {
            let value = match fields.shift_remove(&field.name) {
                Some(v) => v,
                None => self.zero_value(&field.ty)?,
            };
            out.insert(field.name.clone(), value);
        }
        Ok(out)
    }

    fn project(&mut self, conv: &PlainConv, value: &Value, walk: &mut Walk) -> Result<Value, RuntimeError> {
        match conv {
            PlainConv::Keep => Ok(value.clone()),
            PlainConv::Nested { target } => self.project_named(target, value, walk),
            PlainConv::Delegate { target, .. } => self.call_host(target, walk.dir.host_kind(), value),
            PlainConv::Pointer(inner) => match value {
                Value::Pointer(None) => Ok(Value::Pointer(None)),
                Value::Pointer(Some(addr)) => {
                    Ok(Value::Pointer(Some(self.defer_projection(CellKind::Pointer, *addr, inner, walk))))
                }
                other => Err(mismatch("pointer", other)),
            },
            PlainConv::Sequence(inner) => match value {
                Value::Sequence(None) => Ok(Value::Sequence(None)),
                Value::Sequence(Some(addr)) => {
                    Ok(Value::Sequence(Some(self.defer_projection(CellKind::Sequence, *addr, inner, walk))))
                }
                other => Err(mismatch("sequence", other)),
            },
            PlainConv::Array(inner) => match value {
                Value::Array(items) => Ok(Value::Array(self.project_all(inner, items.clone(), walk)?)),
                other => Err(mismatch("array", other)),
            },
            PlainConv::MapValue(inner) => match value {
                Value::Map(None) => Ok(Value::Map(None)),
                Value::Map(Some(addr)) => {
                    Ok(Value::Map(Some(self.defer_projection(CellKind::Map, *addr, inner, walk))))
                }
                other => Err(mismatch("map", other)),
            },
            PlainConv::Wrapped { kind, payload } => {
                let state = state_of(value)?;
                let out_kind = match (walk.dir, kind) {
                    (Direction::ToPlain, WrapperKind::Elastic) => WrapperKind::Und,
                    _ => *kind,
                };
                match value.payload() {
                    Some(inner) => {
                        let inner = inner.clone();
                        Ok(Value::defined(out_kind, self.project(payload, &inner, walk)?))
                    }
                    None => Ok(Value::absent(out_kind, state)),
                }
            }
            PlainConv::Unwrap { kind, payload } => match walk.dir {
                Direction::ToPlain => {
                    let inner = defined_payload(value)?.clone();
                    self.project(payload, &inner, walk)
                }
                Direction::FromPlain => Ok(Value::defined(*kind, self.project(payload, value, walk)?)),
            },
            PlainConv::ToOption {
                kind,
                absent,
                payload,
            } => match walk.dir {
                Direction::ToPlain => match state_of(value)? {
                    Presence::Defined => {
                        let inner = defined_payload(value)?.clone();
                        Ok(Value::defined(WrapperKind::Option, self.project(payload, &inner, walk)?))
                    }
                    s if s == *absent => Ok(Value::null(WrapperKind::Option)),
                    s => Err(out_of_range(s)),
                },
                Direction::FromPlain => match state_of(value)? {
                    Presence::Defined => {
                        let inner = defined_payload(value)?.clone();
                        Ok(Value::defined(*kind, self.project(payload, &inner, walk)?))
                    }
                    _ => Ok(Value::absent(*kind, *absent)),
                },
            },
            PlainConv::Marker { kind, state } => match walk.dir {
                Direction::ToPlain => match state_of(value)? {
                    s if s == *state => Ok(Value::Record(IndexMap::new())),
                    s => Err(out_of_range(s)),
                },
                Direction::FromPlain => Ok(Value::absent(*kind, *state)),
            },
            PlainConv::AbsentPair { kind } => match walk.dir {
                Direction::ToPlain => match state_of(value)? {
                    Presence::Null => Ok(Value::Bool(true)),
                    Presence::Undefined => Ok(Value::Bool(false)),
                    s => Err(out_of_range(s)),
                },
                Direction::FromPlain => match value {
                    Value::Bool(true) => Ok(Value::null(*kind)),
                    Value::Bool(false) => Ok(Value::undefined(*kind)),
                    other => Err(mismatch("bool", other)),
                },
            },
            PlainConv::ElasticPayload {
                non_null,
                fixed_len,
                elem,
            } => self.project_elastic(*non_null, *fixed_len, elem, value, walk),
        }
    }

    fn project_all(
        &mut self,
        conv: &PlainConv,
        items: Vec<Value>,
        walk: &mut Walk,
    ) -> Result<Vec<Value>, RuntimeError> {
        let mut out = Vec::with_capacity(items.len());
        for item in &items {
            out.push(self.project(conv, item, walk)?);
        }
        Ok(out)
    }

    fn project_elastic(
        &mut self,
        non_null: bool,
        fixed_len: Option<u32>,
        elem: &PlainConv,
        value: &Value,
        walk: &mut Walk,
    ) -> Result<Value, RuntimeError> {
        let nil = matches!(value, Value::Sequence(None));
        let items = self.heap.elements(value)?;
        let mut out = Vec::with_capacity(items.len());

        match walk.dir {
            Direction::ToPlain => {
                if let Some(n) = fixed_len {
                    if items.len() != n as usize {
                        return Err(RuntimeError::Projection {
                            reason: format!("expected {} elements, found {}", n, items.len()),
                        });
                    }
                }
                for item in &items {
                    let projected = match item.payload() {
                        Some(inner) => {
                            let inner = inner.clone();
                            let p = self.project(elem, &inner, walk)?;
                            if non_null {
                                p
                            } else {
                                Value::defined(WrapperKind::Option, p)
                            }
                        }
                        None if non_null => {
                            return Err(RuntimeError::Projection {
                                reason: "absent element in a non-null sequence".into(),
                            })
                        }
                        None => Value::null(WrapperKind::Option),
                    };
                    out.push(projected);
                }
                match fixed_len {
                    Some(_) => Ok(Value::Array(out)),
                    None if nil => Ok(Value::Sequence(None)),
                    None => Ok(self.heap.sequence(out)),
                }
            }
            Direction::FromPlain => {
                for item in &items {
                    let restored = if non_null {
                        Value::defined(WrapperKind::Option, self.project(elem, item, walk)?)
                    } else {
                        match item.payload() {
                            Some(inner) => {
                                let inner = inner.clone();
                                Value::defined(WrapperKind::Option, self.project(elem, &inner, walk)?)
                            }
                            None => Value::null(WrapperKind::Option),
                        }
                    };
                    out.push(restored);
                }
                if nil {
                    Ok(Value::Sequence(None))
                } else {
                    Ok(self.heap.sequence(out))
                }
            }
        }
    }
}

fn state_of(value: &Value) -> Result<Presence, RuntimeError> {
    value.state().ok_or_else(|| mismatch("wrapper", value))
}

fn defined_payload(value: &Value) -> Result<&Value, RuntimeError> {
    match value.payload() {
        Some(inner) => Ok(inner),
        None => Err(out_of_range(state_of(value)?)),
    }
}

fn out_of_range(state: Presence) -> RuntimeError {
    RuntimeError::Projection {
        reason: format!("state {} has no plain representation", state),
    }
}

fn mismatch(expected: &str, got: &Value) -> RuntimeError {
    RuntimeError::TypeMismatch {
        expected: expected.to_string(),
        got: got.type_name().to_string(),
    }
}
