//! Evaluation of clone definitions.
//!
//! Copying a reference allocates the new cell at once and queues its
//! contents; the queue is drained after the top-level call returns. Native
//! recursion is therefore bounded by how deeply values nest inline, not by
//! how long a pointer chain is.

use std::collections::HashMap;
use std::rc::Rc;

use indexmap::IndexMap;

use typesynth_check::plan::CopyOp;
use typesynth_core::id::QualifiedName;
use typesynth_core::types::{Capability, Presence};

use crate::clone::CloneBody;
use crate::defs::{Body, FunctionKind};

use super::error::RuntimeError;
use super::value::{Cell, Value};
use super::{CellKind, HostKind, Runtime};

/// Callback bindings of one generated clone call.
#[derive(Debug, Default)]
struct Frame {
    bindings: HashMap<String, Binding>,
}

/// A caller's copy op, evaluated in the caller's frame.
#[derive(Debug)]
struct Binding {
    op: CopyOp,
    env: Rc<Frame>,
}

/// A new cell whose contents are still to be copied from `from`.
#[derive(Debug)]
struct Deferred {
    kind: CellKind,
    from: usize,
    to: usize,
    /// Op for the pointee, the elements or the map values.
    op: CopyOp,
    env: Rc<Frame>,
}

/// Per top-level clone: old address to new address, queued cells and call
/// depth.
#[derive(Debug, Default)]
struct CopyState {
    copied: HashMap<usize, usize>,
    pending: Vec<Deferred>,
    depth: usize,
}

impl Runtime<'_> {
    /// Deep-copies `value` of type `name`.
    ///
    /// Types without a generated clone are copied by their own clone method
    /// when they declare one, and by assignment otherwise.
    pub fn clone_value(&mut self, name: &QualifiedName, value: &Value) -> Result<Value, RuntimeError> {
        self.clone_with(name, &[], value)
    }

    /// Deep-copies an instantiation of a parametric type, passing one copy op
    /// per live type parameter.
    pub fn clone_with(
        &mut self,
        name: &QualifiedName,
        callbacks: &[CopyOp],
        value: &Value,
    ) -> Result<Value, RuntimeError> {
        let root = Rc::new(Frame::default());
        let mut state = CopyState::default();
        if self.lookup(name, FunctionKind::Clone).is_some() {
            let copy = self.call_clone(name, callbacks, &root, value, &mut state)?;
            self.fill_pending(&mut state)?;
            return Ok(copy);
        }
        if self.universe.capability(name, Capability::Clone).is_some() {
            return self.call_host(name, HostKind::Clone, value);
        }
        Ok(value.clone())
    }

    /// Copies the contents of queued cells. Copying one cell may queue more.
    fn fill_pending(&mut self, state: &mut CopyState) -> Result<(), RuntimeError> {
        while let Some(job) = state.pending.pop() {
            let cell = match job.kind {
                CellKind::Pointer => {
                    let pointee = self.heap.load(job.from)?.clone();
                    Cell::Value(self.copy(&job.op, &pointee, &job.env, state)?)
                }
                CellKind::Sequence => {
                    let mut items = Vec::new();
                    for item in self.heap.elements(&Value::Sequence(Some(job.from)))? {
                        items.push(self.copy(&job.op, &item, &job.env, state)?);
                    }
                    Cell::Sequence(items)
                }
                CellKind::Map => {
                    let mut entries = Vec::new();
                    for (key, item) in self.heap.entries(&Value::Map(Some(job.from)))? {
                        entries.push((key, self.copy(&job.op, &item, &job.env, state)?));
                    }
                    Cell::Map(entries)
                }
            };
            self.heap.store(job.to, cell)?;
        }
        Ok(())
    }

    /// Address of the copy of cell `from`, allocating and queueing it on
    /// first sight.
    fn defer(
        &mut self,
        kind: CellKind,
        from: usize,
        op: &CopyOp,
        env: &Rc<Frame>,
        state: &mut CopyState,
    ) -> usize {
        if let Some(&to) = state.copied.get(&from) {
            return to;
        }
        let to = self.heap.alloc(kind.placeholder());
        state.copied.insert(from, to);
        state.pending.push(Deferred {
            kind,
            from,
            to,
            op: op.clone(),
            env: Rc::clone(env),
        });
        to
    }

    fn call_clone(
        &mut self,
        target: &QualifiedName,
        callbacks: &[CopyOp],
        env: &Rc<Frame>,
        value: &Value,
        state: &mut CopyState,
    ) -> Result<Value, RuntimeError> {
        let function = self.require(target, FunctionKind::Clone)?;
        let body = match &function.body {
            Body::Clone(body) => body,
            _ => {
                return Err(RuntimeError::TypeMismatch {
                    expected: "clone body".into(),
                    got: function.signature.name.clone(),
                })
            }
        };

        let mut frame = Frame::default();
        for (param, op) in function.signature.callbacks.iter().zip(callbacks) {
            frame.bindings.insert(
                param.clone(),
                Binding {
                    op: op.clone(),
                    env: Rc::clone(env),
                },
            );
        }
        let frame = Rc::new(frame);

        state.depth += 1;
        if state.depth > self.config.max_depth {
            return Err(RuntimeError::RecursionLimitExceeded {
                limit: self.config.max_depth,
            });
        }
        let result = match body {
            CloneBody::Whole { op } => self.copy(op, value, &frame, state),
            CloneBody::Record { fields, reset } => {
                let record = match value {
                    Value::Record(r) => r,
                    other => {
                        return Err(RuntimeError::TypeMismatch {
                            expected: "record".into(),
                            got: other.type_name().into(),
                        })
                    }
                };
                let mut out = IndexMap::new();
                for (name, v) in record {
                    let copied = match fields.iter().find(|s| &s.field == name) {
                        Some(step) => self.copy(&step.op, v, &frame, state)?,
                        None if reset.contains(name) => v.zero_like(),
                        None => v.clone(),
                    };
                    out.insert(name.clone(), copied);
                }
                Ok(Value::Record(out))
            }
        };
        state.depth -= 1;
        result
    }

    fn copy(
        &mut self,
        op: &CopyOp,
        value: &Value,
        env: &Rc<Frame>,
        state: &mut CopyState,
    ) -> Result<Value, RuntimeError> {
        match op {
            CopyOp::Assign | CopyOp::Share => Ok(value.clone()),
            CopyOp::Callback { param } => {
                let binding = env
                    .bindings
                    .get(param)
                    .ok_or_else(|| RuntimeError::MissingCallback {
                        param: param.clone(),
                    })?;
                let (op, caller) = (binding.op.clone(), Rc::clone(&binding.env));
                self.copy(&op, value, &caller, state)
            }
            CopyOp::Call { target, callbacks } => {
                self.call_clone(target, callbacks, env, value, state)
            }
            CopyOp::Delegate { target, .. } => self.call_host(target, HostKind::Clone, value),
            CopyOp::Pointer(inner) => match value {
                Value::Pointer(None) => Ok(Value::Pointer(None)),
                Value::Pointer(Some(addr)) => Ok(Value::Pointer(Some(self.defer(
                    CellKind::Pointer,
                    *addr,
                    inner,
                    env,
                    state,
                )))),
                other => Err(mismatch("pointer", other)),
            },
            CopyOp::Sequence(inner) => match value {
                Value::Sequence(None) => Ok(Value::Sequence(None)),
                Value::Sequence(Some(addr)) => Ok(Value::Sequence(Some(self.defer(
                    CellKind::Sequence,
                    *addr,
                    inner,
                    env,
                    state,
                )))),
                other => Err(mismatch("sequence", other)),
            },
            CopyOp::Map { value: inner } => match value {
                Value::Map(None) => Ok(Value::Map(None)),
                Value::Map(Some(addr)) => Ok(Value::Map(Some(self.defer(
                    CellKind::Map,
                    *addr,
                    inner,
                    env,
                    state,
                )))),
                other => Err(mismatch("map", other)),
            },
            CopyOp::Array(inner) => match value {
                Value::Array(items) => {
                    let mut out = Vec::with_capacity(items.len());
                    for item in items {
                        out.push(self.copy(inner, item, env, state)?);
                    }
                    Ok(Value::Array(out))
                }
                other => Err(mismatch("array", other)),
            },
            CopyOp::Wrapper { inner, .. } => match value {
                Value::Wrapped {
                    kind,
                    state: Presence::Defined,
                    value: Some(payload),
                } => Ok(Value::defined(*kind, self.copy(inner, payload, env, state)?)),
                Value::Wrapped { .. } => Ok(value.clone()),
                other => Err(mismatch("wrapper", other)),
            },
            CopyOp::Record { fields } => match value {
                Value::Record(record) => {
                    let mut out = IndexMap::new();
                    for (name, v) in record {
                        let copied = match fields.iter().find(|(f, _)| f == name) {
                            Some((_, op)) => self.copy(op, v, env, state)?,
                            None => v.zero_like(),
                        };
                        out.insert(name.clone(), copied);
                    }
                    Ok(Value::Record(out))
                }
                other => Err(mismatch("record", other)),
            },
        }
    }
}

fn mismatch(expected: &str, got: &Value) -> RuntimeError {
    RuntimeError::TypeMismatch {
        expected: expected.to_string(),
        got: got.type_name().to_string(),
    }
}
