//! Evaluation of validators.
//!
//! Values are walked with an explicit work stack, so a long pointer chain
//! costs heap, not native stack. Tasks are pushed in reverse, which keeps
//! the walk depth first and fields in declaration order: the failure
//! reported is the first one a recursive walk would meet.

use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use typesynth_core::directive::Constraint;
use typesynth_core::id::QualifiedName;
use typesynth_core::types::{Capability, Presence};

use crate::defs::{Body, FunctionKind};
use crate::validator::{FieldCheck, NestedCheck};

use super::error::{join_path, RuntimeError, ValidationFailure};
use super::value::Value;
use super::Runtime;

type Outcome = Result<Option<ValidationFailure>, RuntimeError>;

/// Callback bindings of one generated validator call.
#[derive(Default)]
struct Scope<'a> {
    bindings: HashMap<&'a str, Binding<'a>>,
}

/// A caller's check for a type parameter, run in the caller's scope.
struct Binding<'a> {
    check: Option<&'a NestedCheck>,
    scope: Rc<Scope<'a>>,
}

enum Task<'a> {
    /// One field of a record checked by a generated validator.
    Field {
        check: &'a FieldCheck,
        record: Rc<Value>,
        path: String,
        scope: Rc<Scope<'a>>,
    },
    Nested {
        check: &'a NestedCheck,
        value: Value,
        path: String,
        scope: Rc<Scope<'a>>,
    },
}

fn nested<'a>(check: &'a NestedCheck, value: Value, path: String, scope: &Rc<Scope<'a>>) -> Task<'a> {
    Task::Nested {
        check,
        value,
        path,
        scope: Rc::clone(scope),
    }
}

fn push_fields<'a>(
    stack: &mut Vec<Task<'a>>,
    checks: &'a [FieldCheck],
    value: Value,
    path: &str,
    scope: Rc<Scope<'a>>,
) {
    let record = Rc::new(value);
    for check in checks.iter().rev() {
        stack.push(Task::Field {
            check,
            record: Rc::clone(&record),
            path: path.to_string(),
            scope: Rc::clone(&scope),
        });
    }
}

impl Runtime<'_> {
    /// Validates `value` of type `name`, returning the first failure.
    ///
    /// Types without a generated validator defer to their registered host
    /// validator, and are valid if they have none.
    pub fn validate(&self, name: &QualifiedName, value: &Value) -> Outcome {
        self.validate_with(name, &[], value)
    }

    /// Validates an instantiation of a parametric type, passing one check
    /// per callback parameter of its validator. Parameters without a check
    /// check nothing.
    pub fn validate_with<'a>(
        &'a self,
        name: &QualifiedName,
        callbacks: &'a [Option<NestedCheck>],
        value: &Value,
    ) -> Outcome {
        let root = Rc::new(Scope::default());
        let mut stack = Vec::new();
        if let Some(failure) = self.enter(name, callbacks, &root, value.clone(), String::new(), &mut stack)? {
            return Ok(Some(failure));
        }
        let mut seen = HashSet::new();
        while let Some(task) = stack.pop() {
            let failure = match task {
                Task::Field {
                    check,
                    record,
                    path,
                    scope,
                } => {
                    let field = if check.field.is_empty() {
                        record.as_ref()
                    } else {
                        record.field(&check.field)?
                    };
                    let path = join_path(&path, &check.field);
                    let failure = match &check.constraint {
                        Some(constraint) => self.check_constraint(constraint, field)?,
                        None => None,
                    };
                    if failure.is_none() {
                        if let Some(check) = &check.nested {
                            stack.push(nested(check, field.clone(), path.clone(), &scope));
                        }
                    }
                    failure.map(|f| f.prefixed(&path))
                }
                Task::Nested {
                    check,
                    value,
                    path,
                    scope,
                } => self.step(check, value, path, &scope, &mut seen, &mut stack)?,
            };
            if failure.is_some() {
                return Ok(failure);
            }
        }
        Ok(None)
    }

    /// Calls the validator of `target`: a generated one has its fields
    /// queued, a host one runs right away.
    fn enter<'a>(
        &'a self,
        target: &QualifiedName,
        callbacks: &'a [Option<NestedCheck>],
        caller: &Rc<Scope<'a>>,
        value: Value,
        path: String,
        stack: &mut Vec<Task<'a>>,
    ) -> Outcome {
        let function = match self.function(target, FunctionKind::Validate) {
            Some(f) => f,
            None => return Ok(self.validate_host(target, &value)?.map(|f| f.prefixed(&path))),
        };
        let checks = match &function.body {
            Body::Validate(body) => &body.checks,
            _ => {
                return Err(RuntimeError::TypeMismatch {
                    expected: "validate body".into(),
                    got: function.signature.name.clone(),
                })
            }
        };
        let mut scope = Scope::default();
        for (i, param) in function.signature.callbacks.iter().enumerate() {
            scope.bindings.insert(
                param.as_str(),
                Binding {
                    check: callbacks.get(i).and_then(Option::as_ref),
                    scope: Rc::clone(caller),
                },
            );
        }
        push_fields(stack, checks, value, &path, Rc::new(scope));
        Ok(None)
    }

    fn validate_host(&self, name: &QualifiedName, value: &Value) -> Outcome {
        if let Some(validator) = self.validators.get(name) {
            return Ok(validator(&self.heap, value));
        }
        if self.universe.capability(name, Capability::Validate).is_some() {
            return Err(RuntimeError::HostNotRegistered {
                name: name.clone(),
                kind: "validate".into(),
            });
        }
        Ok(None)
    }

    fn step<'a>(
        &'a self,
        check: &'a NestedCheck,
        value: Value,
        path: String,
        scope: &Rc<Scope<'a>>,
        seen: &mut HashSet<usize>,
        stack: &mut Vec<Task<'a>>,
    ) -> Outcome {
        match check {
            NestedCheck::Call { target, callbacks } => {
                self.enter(target, callbacks, scope, value, path, stack)
            }
            NestedCheck::Callback { param } => {
                let binding = scope
                    .bindings
                    .get(param.as_str())
                    .ok_or_else(|| RuntimeError::MissingCallback {
                        param: param.clone(),
                    })?;
                if let Some(check) = binding.check {
                    stack.push(nested(check, value, path, &binding.scope));
                }
                Ok(None)
            }
            NestedCheck::Delegate { target, .. } => {
                Ok(self.validate_host(target, &value)?.map(|f| f.prefixed(&path)))
            }
            NestedCheck::Pointer(inner) => match value {
                Value::Pointer(Some(addr)) => {
                    if seen.insert(addr) {
                        let pointee = self.heap.load(addr)?.clone();
                        stack.push(nested(inner, pointee, path, scope));
                    }
                    Ok(None)
                }
                Value::Pointer(None) => Ok(None),
                other => Err(mismatch("pointer", &other)),
            },
            NestedCheck::Elements(inner) => {
                if let Value::Sequence(Some(addr)) = value {
                    if !seen.insert(addr) {
                        return Ok(None);
                    }
                }
                let items = self.heap.elements(&value)?;
                for (i, item) in items.into_iter().enumerate().rev() {
                    let at = join_path(&path, &format!("[{}]", i));
                    stack.push(nested(inner, item, at, scope));
                }
                Ok(None)
            }
            NestedCheck::MapValues(inner) => {
                if let Value::Map(Some(addr)) = value {
                    if !seen.insert(addr) {
                        return Ok(None);
                    }
                }
                let entries = self.heap.entries(&value)?;
                for (key, item) in entries.into_iter().rev() {
                    let at = join_path(&path, &format!("[{}]", key));
                    stack.push(nested(inner, item, at, scope));
                }
                Ok(None)
            }
            NestedCheck::Wrapped(inner) => match &value {
                Value::Wrapped { .. } => {
                    if let Some(payload) = value.payload() {
                        stack.push(nested(inner, payload.clone(), path, scope));
                    }
                    Ok(None)
                }
                other => Err(mismatch("wrapper", other)),
            },
            NestedCheck::Inline(checks) => {
                push_fields(stack, checks, value, &path, Rc::clone(scope));
                Ok(None)
            }
        }
    }

    fn check_constraint(&self, constraint: &Constraint, value: &Value) -> Outcome {
        let target = match value.state() {
            Some(state) => {
                if !constraint.allows(state) {
                    return Ok(Some(ValidationFailure::new(
                        "",
                        format!("state {} not allowed", state),
                    )));
                }
                match value.payload() {
                    Some(payload) => payload,
                    None => return Ok(None),
                }
            }
            None => value,
        };

        if let Some(relation) = &constraint.len {
            let len = self.heap.len_of(target)?;
            if !relation.holds(len) {
                return Ok(Some(ValidationFailure::new(
                    "",
                    format!("length {} violates {}", len, relation),
                )));
            }
        }

        if constraint.values_non_null {
            let items = match target {
                Value::Map(_) => self
                    .heap
                    .entries(target)?
                    .into_iter()
                    .map(|(k, v)| (format!("[{}]", k), v))
                    .collect::<Vec<_>>(),
                _ => self
                    .heap
                    .elements(target)?
                    .into_iter()
                    .enumerate()
                    .map(|(i, v)| (format!("[{}]", i), v))
                    .collect(),
            };
            for (segment, item) in items {
                if item.state().is_some_and(|s| s != Presence::Defined) {
                    return Ok(Some(ValidationFailure::new(segment, "null element")));
                }
            }
        }
        Ok(None)
    }
}

fn mismatch(expected: &str, got: &Value) -> RuntimeError {
    RuntimeError::TypeMismatch {
        expected: expected.to_string(),
        got: got.type_name().to_string(),
    }
}
