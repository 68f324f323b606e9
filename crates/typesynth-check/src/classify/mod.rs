//! Field classification.
//!
//! [`Classifier`] decides, for every field of every named type, how a deep
//! copy of that field is built. It works in two passes over the synthesis
//! order:
//!
//! 1. **Facts** (in [`Classifier::new`]): per node, whether copying it needs
//!    more than assignment and which of its type parameters are *live*
//!    (reached in a copied position). Units are visited leaves first; inside
//!    a cyclic unit the facts are iterated to a fixpoint.
//! 2. **Plans** ([`Classifier::classify_all`]): per field, a [`CopyOp`]
//!    program and its [`Strategy`](crate::plan::Strategy). Call sites of
//!    parametric types pass one callback per live parameter; an
//!    instantiation that is plain for its arguments collapses to assignment.
//!
//! Failures are collected per root type. A type that references a failed
//! type fails with [`SynthError::DependencyFailed`], and a failure anywhere
//! in a cyclic unit fails the whole unit.

pub mod cache;

use std::collections::{BTreeSet, HashSet};

pub use cache::{ClassificationCache, NodeFacts};

use typesynth_core::directive::{parse_field_annotation, Annotation};
use typesynth_core::error::{FailureLog, SynthError};
use typesynth_core::graph::{Target, TypeGraph};
use typesynth_core::id::{FieldPath, NodeId, QualifiedName};
use typesynth_core::node::NodeShape;
use typesynth_core::types::{Capability, FieldDef, TypeRef, WrapperKind};
use typesynth_core::universe::Universe;

use crate::order::{CycleKind, SynthesisOrder};
use crate::plan::{
    Classification, CopyOp, FieldCapabilities, InstanceClass, PlannedField, PlannedUnit,
    Strategy, SynthesisPlan,
};

/// Parameters and depth reached by a type reference.
#[derive(Debug, Default)]
struct Reach {
    deep: bool,
    params: BTreeSet<String>,
}

impl Reach {
    fn deep() -> Self {
        Reach {
            deep: true,
            params: BTreeSet::new(),
        }
    }

    fn deepen(mut self) -> Self {
        self.deep = true;
        self
    }

    fn absorb(&mut self, other: Reach) {
        self.deep |= other.deep;
        self.params.extend(other.params);
    }
}

/// Classifies the types of one graph. Owns its cache; create one per
/// synthesis invocation.
pub struct Classifier<'a> {
    universe: &'a Universe,
    graph: &'a TypeGraph,
    order: &'a SynthesisOrder,
    cache: ClassificationCache,
    failed: HashSet<NodeId>,
    failures: FailureLog,
}

impl<'a> Classifier<'a> {
    /// Creates a classifier and computes node facts bottom-up.
    ///
    /// `failures` are the diagnostics of earlier stages; types named there
    /// are treated as failed dependencies.
    pub fn new(
        universe: &'a Universe,
        graph: &'a TypeGraph,
        order: &'a SynthesisOrder,
        mut failures: FailureLog,
    ) -> Self {
        failures.merge(order.failures.clone());
        let mut failed: HashSet<NodeId> = order.excluded.iter().copied().collect();
        for (name, _) in failures.iter() {
            if let Some(id) = graph.node_by_name(name) {
                failed.insert(id);
            }
        }

        let mut classifier = Classifier {
            universe,
            graph,
            order,
            cache: ClassificationCache::new(),
            failed,
            failures,
        };
        classifier.compute_facts();
        classifier
    }

    pub fn facts(&self, id: NodeId) -> Option<&NodeFacts> {
        self.cache.get(id)
    }

    // -----------------------------------------------------------------------
    // Facts
    // -----------------------------------------------------------------------

    fn compute_facts(&mut self) {
        let order = self.order;
        for unit in &order.units {
            let members: Vec<NodeId> = unit
                .members
                .iter()
                .copied()
                .filter(|&id| self.graph.name_of(id).is_some())
                .collect();
            for &id in &members {
                let params = self.graph.node(id).map_or(0, |n| n.type_params.len());
                self.cache.update(id, NodeFacts::plain(params));
            }
            let mut rounds = 0;
            loop {
                rounds += 1;
                let mut changed = false;
                for &id in &members {
                    let facts = self.node_facts(id);
                    changed |= self.cache.update(id, facts);
                }
                if !changed || unit.cycle == CycleKind::Acyclic {
                    break;
                }
            }
            if rounds > 1 {
                tracing::trace!(members = members.len(), rounds, "facts fixpoint");
            }
        }
    }

    fn node_facts(&self, id: NodeId) -> NodeFacts {
        let node = match self.graph.node(id) {
            Some(n) => n,
            None => return NodeFacts::default(),
        };
        let mut reach = Reach::default();
        for field in node.fields() {
            let annotation = self
                .graph
                .field_annotation(id, &field.name)
                .cloned()
                .unwrap_or_default();
            reach.absorb(self.field_reach(&field, &annotation, &mut Vec::new()));
        }
        NodeFacts {
            deep: reach.deep,
            live: node
                .type_params
                .iter()
                .map(|p| reach.params.contains(p))
                .collect(),
        }
    }

    fn field_reach(
        &self,
        field: &FieldDef,
        annotation: &Annotation,
        guard: &mut Vec<QualifiedName>,
    ) -> Reach {
        if annotation.ignore || annotation.required_capability {
            // The copy resets or delegates the field, so it cannot be a
            // plain assignment.
            return Reach::deep();
        }
        if annotation.passthrough {
            return Reach::default();
        }
        self.analyze(&field.ty, guard)
    }

    fn analyze(&self, ty: &TypeRef, guard: &mut Vec<QualifiedName>) -> Reach {
        match ty {
            TypeRef::Scalar(_) | TypeRef::Opaque(_) => Reach::default(),
            TypeRef::Param(p) => Reach {
                deep: false,
                params: BTreeSet::from([p.clone()]),
            },
            TypeRef::Sequence(inner) | TypeRef::Pointer(inner) => {
                self.analyze(inner, guard).deepen()
            }
            TypeRef::Map { value, .. } => self.analyze(value, guard).deepen(),
            TypeRef::Wrapper {
                kind: WrapperKind::Elastic,
                inner,
            } => self.analyze(inner, guard).deepen(),
            TypeRef::Array { elem: inner, .. } | TypeRef::Wrapper { inner, .. } => {
                self.analyze(inner, guard)
            }
            TypeRef::Literal(fields) => {
                let mut reach = Reach::default();
                for field in fields {
                    let annotation = self.literal_annotation(fields, field);
                    reach.absorb(self.field_reach(field, &annotation, guard));
                }
                reach
            }
            TypeRef::Named { name, args } => match self.graph.lookup(name) {
                Some(Target::Node(id)) => self.node_reach(id, args, guard),
                Some(Target::Shape(shape)) if !guard.contains(name) => {
                    guard.push(name.clone());
                    let reach = self.analyze(&shape, guard);
                    guard.pop();
                    reach
                }
                _ => Reach::default(),
            },
        }
    }

    fn node_reach(&self, id: NodeId, args: &[TypeRef], guard: &mut Vec<QualifiedName>) -> Reach {
        let node = match self.graph.node(id) {
            Some(n) => n,
            None => return Reach::default(),
        };
        if node.annotation.passthrough {
            return Reach::default();
        }
        if node.method(Capability::Clone).is_some() {
            return Reach::deep();
        }
        let plain = NodeFacts::plain(node.type_params.len());
        let facts = self.cache.get(id).unwrap_or(&plain);
        let mut reach = Reach {
            deep: facts.deep,
            params: BTreeSet::new(),
        };
        for (i, arg) in args.iter().enumerate() {
            if facts.is_live(i) {
                reach.absorb(self.analyze(arg, guard));
            }
        }
        reach
    }

    fn literal_annotation(&self, fields: &[FieldDef], field: &FieldDef) -> Annotation {
        self.graph
            .literal(fields)
            .and_then(|id| self.graph.field_annotation(id, &field.name).cloned())
            .or_else(|| parse_field_annotation(field).ok())
            .unwrap_or_default()
    }

    // -----------------------------------------------------------------------
    // Plans
    // -----------------------------------------------------------------------

    /// Plans every named type in synthesis order.
    pub fn classify_all(&mut self) -> Classification {
        let mut classification = Classification::default();
        let order = self.order;

        for unit in &order.units {
            let mut planned = Vec::new();
            let mut culprit: Option<QualifiedName> = None;

            for &id in &unit.members {
                let name = match self.graph.name_of(id) {
                    Some(n) => n.clone(),
                    None => continue,
                };
                if self.failed.contains(&id) {
                    culprit.get_or_insert(name);
                    continue;
                }
                match self.plan_node(id, &name, unit.cycle) {
                    Ok(plan) => planned.push(plan),
                    Err(errors) => {
                        tracing::debug!(type_name = %name, errors = errors.len(), "classification failed");
                        for error in errors {
                            self.failures.record(name.clone(), error);
                        }
                        self.failed.insert(id);
                        culprit.get_or_insert(name);
                    }
                }
            }

            if let (Some(culprit), CycleKind::PointerBroken) = (&culprit, unit.cycle) {
                for plan in planned.drain(..) {
                    self.failures.record(
                        plan.name.clone(),
                        SynthError::DependencyFailed {
                            path: FieldPath::root(&plan.name),
                            dependency: culprit.clone(),
                        },
                    );
                    self.failed.insert(plan.node);
                }
            }

            if planned.is_empty() {
                continue;
            }
            let index = classification.units.len();
            classification.units.push(PlannedUnit {
                members: planned.iter().map(|p| p.name.clone()).collect(),
                cycle: unit.cycle,
            });
            for mut plan in planned {
                plan.unit = index;
                classification.plans.insert(plan.name.clone(), plan);
            }
        }

        tracing::info!(
            planned = classification.plans.len(),
            failed = self.failures.len(),
            "classification complete"
        );
        classification.failures = self.failures.clone();
        classification
    }

    fn plan_node(
        &self,
        id: NodeId,
        name: &QualifiedName,
        cycle: CycleKind,
    ) -> Result<SynthesisPlan, Vec<SynthError>> {
        let root = FieldPath::root(name);
        let node = self.graph.node(id).ok_or_else(|| {
            vec![SynthError::UnresolvedType {
                type_name: name.to_string(),
                path: root.clone(),
            }]
        })?;
        let plain = NodeFacts::plain(node.type_params.len());
        let facts = self.cache.get(id).unwrap_or(&plain);

        let mut fields = Vec::new();
        let mut ignored = Vec::new();
        let mut errors = Vec::new();
        for field in node.fields() {
            let annotation = self
                .graph
                .field_annotation(id, &field.name)
                .cloned()
                .unwrap_or_default();
            if annotation.ignore {
                ignored.push(field.name.clone());
                continue;
            }
            let path = if field.name.is_empty() {
                root.clone()
            } else {
                root.child(field.name.clone())
            };
            match self.field_op(&field, &annotation, &path, &mut Vec::new()) {
                Ok(op) => fields.push(PlannedField {
                    capabilities: self.capabilities(&field.ty),
                    strategy: self.field_strategy(&op),
                    name: field.name,
                    ty: field.ty,
                    embedded: field.embedded,
                    annotation,
                    op,
                }),
                Err(e) => errors.push(e),
            }
        }
        if !errors.is_empty() {
            return Err(errors);
        }

        let skip_entire = ignored.is_empty() && fields.iter().all(|f| f.op.is_trivial());
        let live_params = node
            .type_params
            .iter()
            .enumerate()
            .filter(|(i, _)| facts.is_live(*i))
            .map(|(_, p)| p.clone())
            .collect();

        Ok(SynthesisPlan {
            name: name.clone(),
            node: id,
            type_params: node.type_params.clone(),
            live_params,
            skip_entire,
            container: matches!(node.shape, NodeShape::Container(_)),
            fields,
            ignored,
            methods: node.methods.clone(),
            passthrough: node.annotation.passthrough,
            cycle,
            unit: 0,
        })
    }

    /// Strategy of a field op. A generated call rebuilds whatever shape its
    /// target has, looking through named containers and aliases.
    fn field_strategy(&self, op: &CopyOp) -> Strategy {
        let mut name = match op {
            CopyOp::Call { target, .. } => target.clone(),
            other => return other.strategy(),
        };
        for _ in 0..=self.graph.node_count() {
            let shape = match self.graph.lookup(&name) {
                Some(Target::Node(id)) => match self.graph.node(id).map(|n| &n.shape) {
                    Some(NodeShape::Container(shape)) => shape.clone(),
                    _ => return Strategy::RecordRebuild,
                },
                Some(Target::Shape(shape)) => shape,
                _ => return Strategy::RecordRebuild,
            };
            match shape {
                TypeRef::Named { name: next, .. } => name = next,
                TypeRef::Pointer(_) => return Strategy::PointerRebuild,
                TypeRef::Sequence(_)
                | TypeRef::Map { .. }
                | TypeRef::Array { .. }
                | TypeRef::Wrapper {
                    kind: WrapperKind::Elastic,
                    ..
                } => return Strategy::ContainerRebuild,
                _ => return Strategy::RecordRebuild,
            }
        }
        Strategy::RecordRebuild
    }

    fn field_op(
        &self,
        field: &FieldDef,
        annotation: &Annotation,
        path: &FieldPath,
        guard: &mut Vec<QualifiedName>,
    ) -> Result<CopyOp, SynthError> {
        if annotation.passthrough {
            return Ok(CopyOp::Share);
        }
        if annotation.required_capability {
            let caps = self.capabilities(&field.ty);
            return match (caps.target, caps.clone) {
                (Some(target), Some(method)) => Ok(CopyOp::Delegate {
                    target,
                    method: method.name,
                }),
                _ => Err(SynthError::MissingCapability {
                    path: path.clone(),
                    type_name: field.ty.to_string(),
                    capability: Capability::Clone,
                }),
            };
        }
        self.copy_op(&field.ty, path, guard)
    }

    fn copy_op(
        &self,
        ty: &TypeRef,
        path: &FieldPath,
        guard: &mut Vec<QualifiedName>,
    ) -> Result<CopyOp, SynthError> {
        let op = match ty {
            TypeRef::Scalar(_) => CopyOp::Assign,
            TypeRef::Param(p) => CopyOp::Callback { param: p.clone() },
            TypeRef::Opaque(_) => {
                return Err(SynthError::NoStrategy {
                    path: path.clone(),
                    detail: format!("{} has no copyable shape and declares no clone method", ty),
                })
            }
            TypeRef::Sequence(elem) => CopyOp::Sequence(Box::new(self.copy_op(elem, path, guard)?)),
            TypeRef::Map { value, .. } => CopyOp::Map {
                value: Box::new(self.copy_op(value, path, guard)?),
            },
            TypeRef::Array { elem, .. } => {
                let inner = self.copy_op(elem, path, guard)?;
                if inner.is_trivial() {
                    inner
                } else {
                    CopyOp::Array(Box::new(inner))
                }
            }
            TypeRef::Pointer(pointee) => {
                CopyOp::Pointer(Box::new(self.copy_op(pointee, path, guard)?))
            }
            TypeRef::Wrapper {
                kind: WrapperKind::Elastic,
                inner,
            } => {
                let elem = wrap(WrapperKind::Option, self.copy_op(inner, path, guard)?);
                CopyOp::Wrapper {
                    kind: WrapperKind::Elastic,
                    inner: Box::new(CopyOp::Sequence(Box::new(elem))),
                }
            }
            TypeRef::Wrapper { kind, inner } => wrap(*kind, self.copy_op(inner, path, guard)?),
            TypeRef::Literal(fields) => {
                let mut ops = Vec::new();
                let mut trivial = true;
                for field in fields {
                    let annotation = self.literal_annotation(fields, field);
                    if annotation.ignore {
                        trivial = false;
                        continue;
                    }
                    let op = self.field_op(field, &annotation, &path.child(field.name.clone()), guard)?;
                    trivial &= op.is_trivial();
                    ops.push((field.name.clone(), op));
                }
                if trivial {
                    CopyOp::Assign
                } else {
                    CopyOp::Record { fields: ops }
                }
            }
            TypeRef::Named { name, args } => match self.graph.lookup(name) {
                Some(Target::Node(id)) => self.named_op(id, name, args, path, guard)?,
                Some(Target::Shape(shape)) => {
                    if guard.contains(name) {
                        return Err(SynthError::AliasCycle { name: name.clone() });
                    }
                    guard.push(name.clone());
                    let op = self.copy_op(&shape, path, guard);
                    guard.pop();
                    op?
                }
                Some(Target::Ignored) => CopyOp::Share,
                Some(Target::Failed(dependency)) => {
                    return Err(SynthError::DependencyFailed {
                        path: path.clone(),
                        dependency,
                    })
                }
                None => {
                    return Err(SynthError::UnresolvedType {
                        type_name: name.to_string(),
                        path: path.clone(),
                    })
                }
            },
        };
        Ok(op)
    }

    fn named_op(
        &self,
        id: NodeId,
        name: &QualifiedName,
        args: &[TypeRef],
        path: &FieldPath,
        guard: &mut Vec<QualifiedName>,
    ) -> Result<CopyOp, SynthError> {
        let canonical = self.graph.name_of(id).cloned().unwrap_or_else(|| name.clone());
        if self.failed.contains(&id) {
            return Err(SynthError::DependencyFailed {
                path: path.clone(),
                dependency: canonical,
            });
        }
        let node = match self.graph.node(id) {
            Some(n) => n,
            None => {
                return Err(SynthError::UnresolvedType {
                    type_name: name.to_string(),
                    path: path.clone(),
                })
            }
        };
        if node.annotation.passthrough {
            return Ok(CopyOp::Share);
        }
        if let Some(method) = node.method(Capability::Clone) {
            return Ok(CopyOp::Delegate {
                target: canonical,
                method: method.name.clone(),
            });
        }

        let plain = NodeFacts::plain(node.type_params.len());
        let facts = self.cache.get(id).unwrap_or(&plain);
        let mut deep = facts.deep;
        let mut callbacks = Vec::new();
        for i in 0..node.type_params.len() {
            if !facts.is_live(i) {
                continue;
            }
            let op = match args.get(i) {
                Some(arg) => self.copy_op(arg, path, guard)?,
                None => CopyOp::Assign,
            };
            deep |= !op.is_trivial();
            callbacks.push(op);
        }
        if !deep {
            return Ok(CopyOp::Assign);
        }
        Ok(CopyOp::Call {
            target: canonical,
            callbacks,
        })
    }

    /// Capability methods of a field whose type is a named type.
    fn capabilities(&self, ty: &TypeRef) -> FieldCapabilities {
        let name = match ty {
            TypeRef::Named { name, .. } => name,
            _ => return FieldCapabilities::default(),
        };
        let canonical = match self.graph.node_by_name(name).and_then(|id| self.graph.name_of(id)) {
            Some(n) => n,
            None => return FieldCapabilities::default(),
        };
        FieldCapabilities {
            target: Some(canonical.clone()),
            clone: self.universe.capability(canonical, Capability::Clone).cloned(),
            validate: self.universe.capability(canonical, Capability::Validate).cloned(),
            project: self.universe.capability(canonical, Capability::Project).cloned(),
        }
    }

    /// Classifies a concrete instantiation `name[args]` as seen from a call
    /// site.
    pub fn classify_instance(
        &self,
        name: &QualifiedName,
        args: &[TypeRef],
    ) -> Result<InstanceClass, SynthError> {
        let path = FieldPath::root(name);
        let op = match self.graph.lookup(name) {
            Some(Target::Node(id)) => {
                if let Some(method) = self
                    .graph
                    .node(id)
                    .and_then(|n| n.method(Capability::Clone))
                    .filter(|_| !self.failed.contains(&id))
                {
                    return Ok(InstanceClass::Delegated(method.clone()));
                }
                self.named_op(id, name, args, &path, &mut Vec::new())?
            }
            Some(_) => self.copy_op(
                &TypeRef::Named {
                    name: name.clone(),
                    args: args.to_vec(),
                },
                &path,
                &mut Vec::new(),
            )?,
            None => {
                return Err(SynthError::UnresolvedType {
                    type_name: name.to_string(),
                    path,
                })
            }
        };
        Ok(match op {
            op if op.is_trivial() => InstanceClass::SkipEntire,
            CopyOp::Call { callbacks, .. } => InstanceClass::Generated { callbacks },
            _ => InstanceClass::Generated {
                callbacks: Vec::new(),
            },
        })
    }
}

/// Wraps a payload op; a trivial payload keeps the wrapper trivial.
fn wrap(kind: WrapperKind, inner: CopyOp) -> CopyOp {
    if inner.is_trivial() {
        inner
    } else {
        CopyOp::Wrapper {
            kind,
            inner: Box::new(inner),
        }
    }
}

