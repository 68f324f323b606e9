//! TypeGraph: the directed graph of type nodes built from a [`Universe`].
//!
//! [`TypeGraph::build`] turns every non-alias entry into a node, resolves
//! aliases onto their canonical node, and walks each field's [`TypeRef`] to
//! emit typed edges:
//!
//! - container and pointer hops are recorded on the edge path;
//! - anonymous literal records become structural nodes, deduplicated by
//!   shape;
//! - references through type arguments of a parametric type are recorded as
//!   separate edges tagged with the argument index, prefixed with the
//!   indirection the parametric type applies to that parameter (if any).
//!
//! Field directives are parsed here, once, so later stages only see
//! validated annotations. A root type with an unresolved reference or a bad
//! directive is recorded in [`GraphBuild::failures`] and keeps no outgoing
//! edges.

use std::collections::{HashMap, HashSet};

use petgraph::graph::EdgeIndex;
use petgraph::stable_graph::StableGraph;
use petgraph::visit::EdgeRef;
use petgraph::Directed;
use smallvec::SmallVec;

use crate::directive::{parse_field_annotation, parse_type_annotation, Annotation};
use crate::edge::{Edge, EdgeKind};
use crate::error::{FailureLog, SynthError};
use crate::id::{FieldPath, NodeId, QualifiedName};
use crate::node::{NodeKey, NodeShape, TypeNode};
use crate::types::{FieldDef, TypeKind, TypeRef, WrapperKind};
use crate::universe::Universe;

type Hops = SmallVec<[EdgeKind; 4]>;

/// What a qualified name resolves to in the graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Node(NodeId),
    /// Alias to an unnamed shape; references expand to the shape.
    Shape(TypeRef),
    /// Excluded by a type-level `ignore`.
    Ignored,
    /// Alias that failed to resolve.
    Failed(QualifiedName),
}

/// The graph of type nodes and derived edges.
#[derive(Debug, Clone)]
pub struct TypeGraph {
    graph: StableGraph<TypeNode, Edge, Directed, u32>,
    by_name: HashMap<QualifiedName, NodeId>,
    aliases: HashMap<QualifiedName, Target>,
    literals: HashMap<String, NodeId>,
    ignored: HashSet<QualifiedName>,
    field_annotations: HashMap<(NodeId, String), Annotation>,
}

/// Result of [`TypeGraph::build`].
#[derive(Debug, Clone)]
pub struct GraphBuild {
    pub graph: TypeGraph,
    pub failures: FailureLog,
}

impl TypeGraph {
    fn empty() -> Self {
        TypeGraph {
            graph: StableGraph::new(),
            by_name: HashMap::new(),
            aliases: HashMap::new(),
            literals: HashMap::new(),
            ignored: HashSet::new(),
            field_annotations: HashMap::new(),
        }
    }

    /// Builds the graph for every entry of `universe`.
    pub fn build(universe: &Universe) -> GraphBuild {
        let mut builder = Builder {
            universe,
            graph: TypeGraph::empty(),
            failures: FailureLog::new(),
            alias_stack: Vec::new(),
        };
        builder.add_named_nodes();
        builder.resolve_aliases();
        builder.walk_named_nodes();

        tracing::debug!(
            nodes = builder.graph.graph.node_count(),
            edges = builder.graph.graph.edge_count(),
            failed = builder.failures.len(),
            "type graph built"
        );

        GraphBuild {
            graph: builder.graph,
            failures: builder.failures,
        }
    }

    // -----------------------------------------------------------------------
    // Read-only accessors
    // -----------------------------------------------------------------------

    /// Returns a read-only reference to the underlying petgraph graph.
    pub fn inner(&self) -> &StableGraph<TypeNode, Edge, Directed, u32> {
        &self.graph
    }

    pub fn node(&self, id: NodeId) -> Option<&TypeNode> {
        self.graph.node_weight(id.into())
    }

    /// All node ids in insertion order.
    pub fn node_ids(&self) -> Vec<NodeId> {
        self.graph.node_indices().map(NodeId::from).collect()
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Resolves a qualified name (following aliases).
    pub fn lookup(&self, name: &QualifiedName) -> Option<Target> {
        if let Some(&id) = self.by_name.get(name) {
            return Some(Target::Node(id));
        }
        if let Some(target) = self.aliases.get(name) {
            return Some(target.clone());
        }
        if self.ignored.contains(name) {
            return Some(Target::Ignored);
        }
        None
    }

    /// Node a name resolves to, if it resolves to a node.
    pub fn node_by_name(&self, name: &QualifiedName) -> Option<NodeId> {
        match self.lookup(name) {
            Some(Target::Node(id)) => Some(id),
            _ => None,
        }
    }

    /// Canonical name of a named node.
    pub fn name_of(&self, id: NodeId) -> Option<&QualifiedName> {
        self.node(id).and_then(|n| n.name())
    }

    /// Structural node of an anonymous literal with these fields.
    pub fn literal(&self, fields: &[FieldDef]) -> Option<NodeId> {
        let key = TypeRef::Literal(fields.to_vec()).to_string();
        self.literals.get(&key).copied()
    }

    /// Outgoing edges of `id` as `(target, edge)`, in insertion order.
    pub fn edges_from(&self, id: NodeId) -> Vec<(NodeId, &Edge)> {
        let mut edges: Vec<(EdgeIndex<u32>, NodeId, &Edge)> = self
            .graph
            .edges(id.into())
            .map(|e| (e.id(), NodeId::from(e.target()), e.weight()))
            .collect();
        edges.sort_by_key(|(idx, _, _)| idx.index());
        edges.into_iter().map(|(_, to, e)| (to, e)).collect()
    }

    /// Parsed annotation of a field of `id`.
    pub fn field_annotation(&self, id: NodeId, field: &str) -> Option<&Annotation> {
        self.field_annotations.get(&(id, field.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

struct Builder<'u> {
    universe: &'u Universe,
    graph: TypeGraph,
    failures: FailureLog,
    alias_stack: Vec<QualifiedName>,
}

impl<'u> Builder<'u> {
    fn add_named_nodes(&mut self) {
        for entry in self.universe.entries() {
            let annotation = match parse_type_annotation(entry) {
                Ok(a) => a,
                Err(reason) => {
                    self.failures.record(
                        entry.name.clone(),
                        SynthError::Annotation {
                            path: FieldPath::root(&entry.name),
                            reason,
                        },
                    );
                    Annotation::default()
                }
            };
            if annotation.ignore {
                self.graph.ignored.insert(entry.name.clone());
                continue;
            }
            let shape = match &entry.kind {
                TypeKind::Alias { .. } => continue,
                TypeKind::Record { fields } => NodeShape::Record(fields.clone()),
                TypeKind::Container { shape } => NodeShape::Container(shape.clone()),
            };
            let idx = self.graph.graph.add_node(TypeNode {
                key: NodeKey::Named(entry.name.clone()),
                names: vec![entry.name.clone()],
                type_params: entry.type_params.clone(),
                shape,
                methods: entry.methods.clone(),
                annotation,
            });
            self.graph.by_name.insert(entry.name.clone(), NodeId::from(idx));
        }
    }

    fn resolve_aliases(&mut self) {
        let aliases: Vec<QualifiedName> = self
            .universe
            .entries()
            .filter(|e| matches!(e.kind, TypeKind::Alias { .. }))
            .filter(|e| !self.graph.ignored.contains(&e.name))
            .map(|e| e.name.clone())
            .collect();

        for alias in aliases {
            match self.resolve_alias(&alias) {
                Ok(Target::Node(id)) => {
                    if let Some(node) = self.graph.graph.node_weight_mut(id.into()) {
                        node.names.push(alias.clone());
                    }
                    self.graph.aliases.insert(alias, Target::Node(id));
                }
                Ok(target) => {
                    self.graph.aliases.insert(alias, target);
                }
                Err(err) => {
                    self.failures.record(alias.clone(), err);
                    self.graph
                        .aliases
                        .insert(alias.clone(), Target::Failed(alias));
                }
            }
        }
    }

    fn resolve_alias(&self, alias: &QualifiedName) -> Result<Target, SynthError> {
        let mut seen = HashSet::new();
        let mut current = alias.clone();
        loop {
            if !seen.insert(current.clone()) {
                return Err(SynthError::AliasCycle {
                    name: alias.clone(),
                });
            }
            let target = match self.universe.get(&current).map(|e| &e.kind) {
                Some(TypeKind::Alias { target }) => target,
                _ => {
                    return Err(SynthError::UnresolvedType {
                        type_name: current.to_string(),
                        path: FieldPath::root(alias),
                    })
                }
            };
            match target {
                TypeRef::Named { name, args } if args.is_empty() => {
                    if self.graph.ignored.contains(name) {
                        return Ok(Target::Ignored);
                    }
                    if let Some(&id) = self.graph.by_name.get(name) {
                        return Ok(Target::Node(id));
                    }
                    current = name.clone();
                }
                other => return Ok(Target::Shape(other.clone())),
            }
        }
    }

    fn walk_named_nodes(&mut self) {
        let mut roots: Vec<(NodeId, QualifiedName)> = self
            .graph
            .by_name
            .iter()
            .map(|(name, &id)| (id, name.clone()))
            .collect();
        roots.sort_by_key(|(id, _)| *id);

        for (id, root) in roots {
            let mut errors = Vec::new();
            let fields = match self.graph.node(id) {
                Some(node) => node.fields(),
                None => continue,
            };
            self.walk_fields(id, &fields, &root, &FieldPath::root(&root), &mut errors);

            if !errors.is_empty() {
                let outgoing: Vec<EdgeIndex<u32>> =
                    self.graph.graph.edges(id.into()).map(|e| e.id()).collect();
                for edge in outgoing {
                    self.graph.graph.remove_edge(edge);
                }
                for err in errors {
                    self.failures.record(root.clone(), err);
                }
            }
        }
    }

    fn walk_fields(
        &mut self,
        from: NodeId,
        fields: &[FieldDef],
        root: &QualifiedName,
        base: &FieldPath,
        errors: &mut Vec<SynthError>,
    ) {
        for field in fields {
            let path = if field.name.is_empty() {
                base.clone()
            } else {
                base.child(field.name.clone())
            };
            let annotation = match parse_field_annotation(field) {
                Ok(a) => a,
                Err(reason) => {
                    errors.push(SynthError::Annotation { path, reason });
                    continue;
                }
            };
            let ignore = annotation.ignore;
            self.graph
                .field_annotations
                .insert((from, field.name.clone()), annotation);
            if ignore {
                continue;
            }
            let site = Site {
                from,
                field: &field.name,
                embedded: field.embedded,
                root,
                path: &path,
            };
            self.walk(&site, &field.ty, SmallVec::new(), None, errors);
        }
    }

    fn walk(
        &mut self,
        site: &Site<'_>,
        ty: &TypeRef,
        hops: Hops,
        type_arg: Option<u16>,
        errors: &mut Vec<SynthError>,
    ) {
        let with = |hops: &Hops, kind: EdgeKind| -> Hops {
            let mut h = hops.clone();
            h.push(kind);
            h
        };
        match ty {
            TypeRef::Scalar(_) | TypeRef::Param(_) | TypeRef::Opaque(_) => {}
            TypeRef::Sequence(elem) => {
                self.walk(site, elem, with(&hops, EdgeKind::SequenceElem), type_arg, errors)
            }
            TypeRef::Map { key, value } => {
                self.walk(site, key, with(&hops, EdgeKind::MapKey), type_arg, errors);
                self.walk(site, value, with(&hops, EdgeKind::MapValue), type_arg, errors);
            }
            TypeRef::Array { elem, .. } => {
                self.walk(site, elem, with(&hops, EdgeKind::ArrayElem), type_arg, errors)
            }
            TypeRef::Pointer(pointee) => {
                self.walk(site, pointee, with(&hops, EdgeKind::Pointer), type_arg, errors)
            }
            TypeRef::Wrapper {
                kind: WrapperKind::Elastic,
                inner,
            } => self.walk(site, inner, with(&hops, EdgeKind::SequenceElem), type_arg, errors),
            TypeRef::Wrapper { inner, .. } => self.walk(site, inner, hops, type_arg, errors),
            TypeRef::Literal(fields) => {
                let to = self.literal_node(fields, site.root, site.path, errors);
                self.add_edge(site, to, hops, type_arg);
            }
            TypeRef::Named { name, args } => match self.graph.lookup(name) {
                Some(Target::Node(to)) => {
                    self.add_edge(site, to, hops.clone(), type_arg);
                    for (i, arg) in args.iter().enumerate() {
                        let mut visiting = HashSet::new();
                        let arg_hops = match param_use(self.universe, name, i, &mut visiting) {
                            ParamUse::Unused => continue,
                            ParamUse::ByValue => hops.clone(),
                            ParamUse::Indirect(kind) => with(&hops, kind),
                        };
                        let arg_index = type_arg.unwrap_or(i as u16);
                        self.walk(site, arg, arg_hops, Some(arg_index), errors);
                    }
                }
                Some(Target::Shape(shape)) => {
                    if self.alias_stack.contains(name) {
                        errors.push(SynthError::AliasCycle { name: name.clone() });
                        return;
                    }
                    self.alias_stack.push(name.clone());
                    self.walk(site, &shape, hops, type_arg, errors);
                    self.alias_stack.pop();
                }
                Some(Target::Ignored) | Some(Target::Failed(_)) => {}
                None => errors.push(SynthError::UnresolvedType {
                    type_name: name.to_string(),
                    path: site.path.clone(),
                }),
            },
        }
    }

    fn add_edge(&mut self, site: &Site<'_>, to: NodeId, hops: Hops, type_arg: Option<u16>) {
        let mut edge = Edge::new(site.field, hops, site.embedded);
        if let Some(i) = type_arg {
            edge = edge.through_type_arg(i);
        }
        self.graph.graph.add_edge(site.from.into(), to.into(), edge);
    }

    fn literal_node(
        &mut self,
        fields: &[FieldDef],
        root: &QualifiedName,
        path: &FieldPath,
        errors: &mut Vec<SynthError>,
    ) -> NodeId {
        let key = TypeRef::Literal(fields.to_vec()).to_string();
        if let Some(&id) = self.graph.literals.get(&key) {
            return id;
        }
        let idx = self.graph.graph.add_node(TypeNode {
            key: NodeKey::Literal(key.clone()),
            names: Vec::new(),
            type_params: Vec::new(),
            shape: NodeShape::Record(fields.to_vec()),
            methods: Vec::new(),
            annotation: Annotation::default(),
        });
        let id = NodeId::from(idx);
        self.graph.literals.insert(key, id);
        self.walk_fields(id, fields, root, path, errors);
        id
    }
}

/// Where an edge originates.
struct Site<'a> {
    from: NodeId,
    field: &'a str,
    embedded: bool,
    root: &'a QualifiedName,
    path: &'a FieldPath,
}

// ---------------------------------------------------------------------------
// Type-parameter usage
// ---------------------------------------------------------------------------

/// How a parametric type uses one of its parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParamUse {
    Unused,
    ByValue,
    /// Only reached behind this first indirection.
    Indirect(EdgeKind),
}

impl ParamUse {
    fn combine(self, other: ParamUse) -> ParamUse {
        match (self, other) {
            (ParamUse::ByValue, _) | (_, ParamUse::ByValue) => ParamUse::ByValue,
            (ParamUse::Indirect(k), _) | (_, ParamUse::Indirect(k)) => ParamUse::Indirect(k),
            _ => ParamUse::Unused,
        }
    }
}

fn param_use(
    universe: &Universe,
    name: &QualifiedName,
    index: usize,
    visiting: &mut HashSet<(QualifiedName, usize)>,
) -> ParamUse {
    let entry = match universe.get(name) {
        Some(e) => e,
        None => return ParamUse::Unused,
    };
    if let TypeKind::Alias {
        target: TypeRef::Named { name: target, args },
    } = &entry.kind
    {
        if args.is_empty() {
            return param_use(universe, target, index, visiting);
        }
    }
    let param = match entry.type_params.get(index) {
        Some(p) => p.clone(),
        None => return ParamUse::Unused,
    };
    if !visiting.insert((name.clone(), index)) {
        return ParamUse::Unused;
    }
    let shapes: Vec<&TypeRef> = match &entry.kind {
        TypeKind::Record { fields } => fields
            .iter()
            .filter(|f| !parse_field_annotation(f).map(|a| a.ignore).unwrap_or(false))
            .map(|f| &f.ty)
            .collect(),
        TypeKind::Container { shape } => vec![shape],
        TypeKind::Alias { target } => vec![target],
    };
    shapes.into_iter().fold(ParamUse::Unused, |acc, ty| {
        acc.combine(scan_param(universe, ty, &param, None, visiting))
    })
}

fn scan_param(
    universe: &Universe,
    ty: &TypeRef,
    param: &str,
    hop: Option<EdgeKind>,
    visiting: &mut HashSet<(QualifiedName, usize)>,
) -> ParamUse {
    match ty {
        TypeRef::Param(p) if p == param => hop.map_or(ParamUse::ByValue, ParamUse::Indirect),
        TypeRef::Param(_) | TypeRef::Scalar(_) | TypeRef::Opaque(_) => ParamUse::Unused,
        TypeRef::Sequence(elem) => scan_param(
            universe,
            elem,
            param,
            hop.or(Some(EdgeKind::SequenceElem)),
            visiting,
        ),
        TypeRef::Map { key, value } => {
            let k = scan_param(universe, key, param, hop.or(Some(EdgeKind::MapKey)), visiting);
            let v = scan_param(universe, value, param, hop.or(Some(EdgeKind::MapValue)), visiting);
            k.combine(v)
        }
        TypeRef::Array { elem, .. } => scan_param(universe, elem, param, hop, visiting),
        TypeRef::Pointer(p) => {
            scan_param(universe, p, param, hop.or(Some(EdgeKind::Pointer)), visiting)
        }
        TypeRef::Wrapper {
            kind: WrapperKind::Elastic,
            inner,
        } => scan_param(
            universe,
            inner,
            param,
            hop.or(Some(EdgeKind::SequenceElem)),
            visiting,
        ),
        TypeRef::Wrapper { inner, .. } => scan_param(universe, inner, param, hop, visiting),
        TypeRef::Literal(fields) => fields.iter().fold(ParamUse::Unused, |acc, f| {
            acc.combine(scan_param(universe, &f.ty, param, hop, visiting))
        }),
        TypeRef::Named { name, args } => {
            let mut acc = ParamUse::Unused;
            for (j, arg) in args.iter().enumerate() {
                let inner = scan_param(universe, arg, param, None, visiting);
                if inner == ParamUse::Unused {
                    continue;
                }
                let scanned = match param_use(universe, name, j, visiting) {
                    ParamUse::Unused => ParamUse::Unused,
                    ParamUse::ByValue => scan_param(universe, arg, param, hop, visiting),
                    ParamUse::Indirect(k) => {
                        scan_param(universe, arg, param, hop.or(Some(k)), visiting)
                    }
                };
                acc = acc.combine(scanned);
            }
            acc
        }
    }
}
