//! Validators.
//!
//! A type gets a `Validate` function when one of its fields carries a
//! constraint or reaches a validatable type. Checks run in field order and
//! stop at the first failure, which is reported with a path relative to the
//! validated value (`A`, `B[2]`, `Inner.X`, `M[key]`).
//!
//! A field typed by a type parameter is checked through a callback, the
//! same way generated clones take one copy op per live parameter. Call
//! sites pass the check of each type argument, so `Box[Inner]` validates
//! the `Inner` it holds.

use std::collections::{BTreeSet, HashMap};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use typesynth_check::plan::SynthesisPlan;
use typesynth_core::directive::{parse_field_annotation, Constraint};
use typesynth_core::graph::{Target, TypeGraph};
use typesynth_core::id::QualifiedName;
use typesynth_core::types::{Capability, FieldDef, TypeRef, WrapperKind};

use crate::defs::{self_type, Body, FunctionDef, FunctionKind, Signature};
use crate::synth::SkipReason;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidateBody {
    pub checks: Vec<FieldCheck>,
}

/// Checks for one field: its own constraint first, then the nested value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldCheck {
    pub field: String,
    pub constraint: Option<Constraint>,
    pub nested: Option<NestedCheck>,
}

/// Validation of values reachable from a field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NestedCheck {
    /// Generated validator of `target`, passing one check per callback
    /// parameter of the callee; `None` checks nothing.
    Call {
        target: QualifiedName,
        callbacks: Vec<Option<NestedCheck>>,
    },
    /// The check passed for a type parameter.
    Callback { param: String },
    /// User-supplied validator of `target`.
    Delegate { target: QualifiedName, method: String },
    /// Nil is valid.
    Pointer(Box<NestedCheck>),
    Elements(Box<NestedCheck>),
    MapValues(Box<NestedCheck>),
    /// Checked only when the wrapper is defined.
    Wrapped(Box<NestedCheck>),
    /// Anonymous record checked in place.
    Inline(Vec<FieldCheck>),
}

impl NestedCheck {
    /// Type parameters whose callbacks this check invokes.
    fn collect_params(&self, out: &mut BTreeSet<String>) {
        match self {
            NestedCheck::Callback { param } => {
                out.insert(param.clone());
            }
            NestedCheck::Call { callbacks, .. } => {
                for check in callbacks.iter().flatten() {
                    check.collect_params(out);
                }
            }
            NestedCheck::Pointer(inner)
            | NestedCheck::Elements(inner)
            | NestedCheck::MapValues(inner)
            | NestedCheck::Wrapped(inner) => inner.collect_params(out),
            NestedCheck::Inline(checks) => {
                for check in checks {
                    if let Some(nested) = &check.nested {
                        nested.collect_params(out);
                    }
                }
            }
            NestedCheck::Delegate { .. } => {}
        }
    }
}

/// What call sites need to know about a type with a generated validator.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Validatable {
    /// Type parameters the validator takes a check for, in declaration
    /// order.
    callbacks: Vec<String>,
    /// Whether it checks anything when every callback checks nothing.
    standalone: bool,
}

/// Types that get a generated validator.
#[derive(Debug, Clone, Default)]
pub struct ValidatorIndex {
    checks: IndexMap<QualifiedName, Vec<FieldCheck>>,
    callbacks: HashMap<QualifiedName, Vec<String>>,
}

impl ValidatorIndex {
    pub fn build(graph: &TypeGraph, plans: &IndexMap<QualifiedName, SynthesisPlan>) -> Self {
        // Grows monotonically: a type found validatable can only gain
        // callbacks or become standalone.
        let mut found: HashMap<QualifiedName, Validatable> = HashMap::new();
        loop {
            let finder = CheckFinder { graph, found: &found };
            let updates: Vec<(QualifiedName, Validatable)> = plans
                .values()
                .filter(|p| p.method(Capability::Validate).is_none())
                .filter_map(|p| {
                    let v = finder.validatable(p)?;
                    (found.get(&p.name) != Some(&v)).then(|| (p.name.clone(), v))
                })
                .collect();
            if updates.is_empty() {
                break;
            }
            found.extend(updates);
        }

        let finder = CheckFinder { graph, found: &found };
        let checks = plans
            .values()
            .filter(|p| found.contains_key(&p.name))
            .map(|p| (p.name.clone(), finder.plan_checks(p, &p.type_params)))
            .collect();
        let callbacks = found.into_iter().map(|(name, v)| (name, v.callbacks)).collect();
        ValidatorIndex { checks, callbacks }
    }

    pub fn has_validator(&self, name: &QualifiedName) -> bool {
        self.checks.contains_key(name)
    }

    pub fn checks(&self, name: &QualifiedName) -> Option<&[FieldCheck]> {
        self.checks.get(name).map(|v| v.as_slice())
    }

    /// Type parameters the validator of `name` takes a check for.
    pub fn callbacks(&self, name: &QualifiedName) -> &[String] {
        self.callbacks.get(name).map(|v| v.as_slice()).unwrap_or(&[])
    }
}

struct CheckFinder<'a> {
    graph: &'a TypeGraph,
    found: &'a HashMap<QualifiedName, Validatable>,
}

impl CheckFinder<'_> {
    fn validatable(&self, plan: &SynthesisPlan) -> Option<Validatable> {
        let checks = self.plan_checks(plan, &plan.type_params);
        if checks.is_empty() {
            return None;
        }
        let mut used = BTreeSet::new();
        for check in checks.iter().filter_map(|c| c.nested.as_ref()) {
            check.collect_params(&mut used);
        }
        Some(Validatable {
            callbacks: plan
                .type_params
                .iter()
                .filter(|p| used.contains(*p))
                .cloned()
                .collect(),
            standalone: used.is_empty() || !self.plan_checks(plan, &[]).is_empty(),
        })
    }

    /// Checks of the fields of `plan`. Only `params` are checked through
    /// callbacks; other type parameters check nothing.
    fn plan_checks(&self, plan: &SynthesisPlan, params: &[String]) -> Vec<FieldCheck> {
        plan.fields
            .iter()
            .filter_map(|f| self.field_check(&f.name, &f.ty, f.annotation.constraint, params))
            .collect()
    }

    fn field_check(
        &self,
        name: &str,
        ty: &TypeRef,
        constraint: Option<Constraint>,
        params: &[String],
    ) -> Option<FieldCheck> {
        let nested = self.nested(ty, params, &mut Vec::new());
        if constraint.is_none() && nested.is_none() {
            return None;
        }
        Some(FieldCheck {
            field: name.to_string(),
            constraint,
            nested,
        })
    }

    fn nested(
        &self,
        ty: &TypeRef,
        params: &[String],
        guard: &mut Vec<QualifiedName>,
    ) -> Option<NestedCheck> {
        let boxed = |c: NestedCheck| Box::new(c);
        match ty {
            TypeRef::Pointer(p) => self.nested(p, params, guard).map(boxed).map(NestedCheck::Pointer),
            TypeRef::Sequence(e) | TypeRef::Array { elem: e, .. } => {
                self.nested(e, params, guard).map(boxed).map(NestedCheck::Elements)
            }
            TypeRef::Map { value, .. } => {
                self.nested(value, params, guard).map(boxed).map(NestedCheck::MapValues)
            }
            TypeRef::Wrapper {
                kind: WrapperKind::Elastic,
                inner,
            } => self.nested(inner, params, guard).map(|c| {
                NestedCheck::Wrapped(Box::new(NestedCheck::Elements(Box::new(
                    NestedCheck::Wrapped(Box::new(c)),
                ))))
            }),
            TypeRef::Wrapper { inner, .. } => {
                self.nested(inner, params, guard).map(boxed).map(NestedCheck::Wrapped)
            }
            TypeRef::Literal(fields) => {
                let checks: Vec<FieldCheck> = fields
                    .iter()
                    .filter_map(|f| {
                        let annotation = self.literal_annotation(fields, f);
                        if annotation.ignore {
                            return None;
                        }
                        self.field_check(&f.name, &f.ty, annotation.constraint, params)
                    })
                    .collect();
                if checks.is_empty() {
                    None
                } else {
                    Some(NestedCheck::Inline(checks))
                }
            }
            TypeRef::Named { name, args } => match self.graph.lookup(name) {
                Some(Target::Node(id)) => {
                    let canonical = self.graph.name_of(id)?.clone();
                    let node = self.graph.node(id)?;
                    if let Some(method) = node.method(Capability::Validate) {
                        return Some(NestedCheck::Delegate {
                            target: canonical,
                            method: method.name.clone(),
                        });
                    }
                    let found = self.found.get(&canonical)?;
                    let callbacks: Vec<Option<NestedCheck>> = found
                        .callbacks
                        .iter()
                        .map(|param| {
                            let i = node.type_params.iter().position(|p| p == param)?;
                            self.nested(args.get(i)?, params, guard)
                        })
                        .collect();
                    if !found.standalone && callbacks.iter().all(Option::is_none) {
                        return None;
                    }
                    Some(NestedCheck::Call {
                        target: canonical,
                        callbacks,
                    })
                }
                Some(Target::Shape(shape)) if !guard.contains(name) => {
                    guard.push(name.clone());
                    let check = self.nested(&shape, params, guard);
                    guard.pop();
                    check
                }
                _ => None,
            },
            TypeRef::Param(p) if params.contains(p) => Some(NestedCheck::Callback { param: p.clone() }),
            TypeRef::Scalar(_) | TypeRef::Param(_) | TypeRef::Opaque(_) => None,
        }
    }

    fn literal_annotation(
        &self,
        fields: &[FieldDef],
        field: &FieldDef,
    ) -> typesynth_core::directive::Annotation {
        self.graph
            .literal(fields)
            .and_then(|id| self.graph.field_annotation(id, &field.name).cloned())
            .or_else(|| parse_field_annotation(field).ok())
            .unwrap_or_default()
    }
}

/// Synthesizes the validator of `plan`.
pub fn synthesize_validator(
    index: &ValidatorIndex,
    plan: &SynthesisPlan,
) -> Result<FunctionDef, SkipReason> {
    if plan.method(Capability::Validate).is_some() {
        return Err(SkipReason::Delegated);
    }
    let checks = index.checks(&plan.name).ok_or(SkipReason::NothingToDo)?;
    let signature = Signature::new(FunctionKind::Validate, &plan.name, &plan.type_params)
        .with_callbacks(index.callbacks(&plan.name))
        .with_inputs(vec![self_type(&plan.name, &plan.type_params)]);
    Ok(FunctionDef {
        signature,
        body: Body::Validate(ValidateBody {
            checks: checks.to_vec(),
        }),
    })
}
