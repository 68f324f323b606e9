//! Cycle & order resolution over the type graph.
//!
//! Two SCC passes run over petgraph projections of the [`TypeGraph`]:
//!
//! - over every edge, to find synthesis units (maximal mutually recursive
//!   clusters) in leaves-first order;
//! - over by-value edges only, to find cycles with no pointer or container
//!   in between. Those describe types of infinite size and are reported as
//!   [`SynthError::DirectCycle`]; their members are left out of every unit.

use std::collections::{BTreeSet, HashMap};

use petgraph::algo::tarjan_scc;
use petgraph::graph::DiGraph;
use serde::{Deserialize, Serialize};

use typesynth_core::edge::Edge;
use typesynth_core::error::{FailureLog, SynthError};
use typesynth_core::graph::TypeGraph;
use typesynth_core::id::{NodeId, QualifiedName};

/// Recursion strategy of a synthesis unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CycleKind {
    Acyclic,
    /// Cyclic only through indirections. Every member signature is declared
    /// before any member body.
    PointerBroken,
}

/// One SCC of the type graph, synthesized as a whole.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SynthesisUnit {
    /// Sorted by node id.
    pub members: Vec<NodeId>,
    pub cycle: CycleKind,
}

/// Leaves-first synthesis order.
#[derive(Debug, Clone, Default)]
pub struct SynthesisOrder {
    pub units: Vec<SynthesisUnit>,
    /// Members of direct cycles; not part of any unit.
    pub excluded: BTreeSet<NodeId>,
    pub failures: FailureLog,
}

impl SynthesisOrder {
    /// Index of the unit containing `id`.
    pub fn unit_of(&self, id: NodeId) -> Option<usize> {
        self.units.iter().position(|u| u.members.contains(&id))
    }
}

/// Copies the graph into a plain `DiGraph` keeping only the edges `keep`
/// accepts. Parallel edges collapse to one.
fn project(graph: &TypeGraph, keep: impl Fn(&Edge) -> bool) -> DiGraph<NodeId, ()> {
    let mut projected = DiGraph::new();
    let mut index = HashMap::new();
    for id in graph.node_ids() {
        index.insert(id, projected.add_node(id));
    }
    for id in graph.node_ids() {
        for (to, edge) in graph.edges_from(id) {
            if !keep(edge) {
                continue;
            }
            if let (Some(&a), Some(&b)) = (index.get(&id), index.get(&to)) {
                projected.update_edge(a, b, ());
            }
        }
    }
    projected
}

fn member_name(graph: &TypeGraph, id: NodeId) -> QualifiedName {
    match graph.node(id) {
        Some(node) => match node.name() {
            Some(name) => name.clone(),
            None => QualifiedName::new("", node.label()),
        },
        None => QualifiedName::new("", id.to_string()),
    }
}

/// Computes the synthesis order for `graph`.
pub fn resolve_order(graph: &TypeGraph) -> SynthesisOrder {
    let mut order = SynthesisOrder::default();

    // Direct cycles first.
    let by_value = project(graph, |e| !e.is_indirect());
    for component in tarjan_scc(&by_value) {
        let self_loop =
            component.len() == 1 && by_value.contains_edge(component[0], component[0]);
        if component.len() < 2 && !self_loop {
            continue;
        }
        let mut members: Vec<NodeId> = component.iter().map(|&i| by_value[i]).collect();
        members.sort();
        let names: Vec<QualifiedName> = members.iter().map(|&m| member_name(graph, m)).collect();
        tracing::warn!(members = ?names, "direct cycle without indirection");

        let error = SynthError::DirectCycle {
            members: names.clone(),
        };
        for (id, name) in members.iter().zip(names) {
            if graph.name_of(*id).is_some() {
                order.failures.record(name, error.clone());
            }
        }
        order.excluded.extend(members);
    }

    // tarjan_scc yields components in reverse topological order: every
    // component comes after the components it points to.
    let all = project(graph, |_| true);
    for component in tarjan_scc(&all) {
        let cyclic = component.len() > 1 || all.contains_edge(component[0], component[0]);
        let mut members: Vec<NodeId> = component
            .iter()
            .map(|&i| all[i])
            .filter(|id| !order.excluded.contains(id))
            .collect();
        if members.is_empty() {
            continue;
        }
        members.sort();
        order.units.push(SynthesisUnit {
            members,
            cycle: if cyclic {
                CycleKind::PointerBroken
            } else {
                CycleKind::Acyclic
            },
        });
    }

    tracing::debug!(
        units = order.units.len(),
        excluded = order.excluded.len(),
        "synthesis order resolved"
    );
    order
}

#[cfg(test)]
mod tests {
    use super::*;
    use typesynth_core::types::{FieldDef, TypeEntry, TypeRef};
    use typesynth_core::universe::Universe;

    fn qn(name: &str) -> QualifiedName {
        QualifiedName::new("m", name)
    }

    fn graph(entries: Vec<TypeEntry>) -> TypeGraph {
        TypeGraph::build(&Universe::from_entries(entries).unwrap()).graph
    }

    #[test]
    fn leaves_come_first() {
        let g = graph(vec![
            TypeEntry::record(qn("Top"), vec![FieldDef::new("m", TypeRef::named("m", "Mid"))]),
            TypeEntry::record(qn("Mid"), vec![FieldDef::new("l", TypeRef::ptr(TypeRef::named("m", "Leaf")))]),
            TypeEntry::record(qn("Leaf"), vec![FieldDef::new("x", TypeRef::int())]),
        ]);
        let order = resolve_order(&g);
        assert_eq!(order.units.len(), 3);
        let pos = |n: &str| order.unit_of(g.node_by_name(&qn(n)).unwrap()).unwrap();
        assert!(pos("Leaf") < pos("Mid"));
        assert!(pos("Mid") < pos("Top"));
        assert!(order.units.iter().all(|u| u.cycle == CycleKind::Acyclic));
    }

    #[test]
    fn pointer_self_reference_is_pointer_broken() {
        let g = graph(vec![TypeEntry::record(
            qn("Node"),
            vec![
                FieldDef::new("v", TypeRef::int()),
                FieldDef::new("next", TypeRef::ptr(TypeRef::named("m", "Node"))),
            ],
        )]);
        let order = resolve_order(&g);
        assert!(order.failures.is_empty());
        assert_eq!(order.units.len(), 1);
        assert_eq!(order.units[0].cycle, CycleKind::PointerBroken);
    }

    #[test]
    fn mutual_recursion_forms_one_unit() {
        let g = graph(vec![
            TypeEntry::record(qn("A"), vec![FieldDef::new("b", TypeRef::seq(TypeRef::named("m", "B")))]),
            TypeEntry::record(qn("B"), vec![FieldDef::new("a", TypeRef::ptr(TypeRef::named("m", "A")))]),
            TypeEntry::record(qn("User"), vec![FieldDef::new("a", TypeRef::named("m", "A"))]),
        ]);
        let order = resolve_order(&g);
        assert_eq!(order.units.len(), 2);
        assert_eq!(order.units[0].members.len(), 2);
        assert_eq!(order.units[0].cycle, CycleKind::PointerBroken);
        assert_eq!(order.units[1].cycle, CycleKind::Acyclic);
    }

    #[test]
    fn by_value_cycle_is_structural_error() {
        let g = graph(vec![
            TypeEntry::record(qn("A"), vec![FieldDef::new("b", TypeRef::named("m", "B"))]),
            TypeEntry::record(qn("B"), vec![FieldDef::new("a", TypeRef::array(TypeRef::named("m", "A"), 2))]),
            TypeEntry::record(qn("Other"), vec![FieldDef::new("x", TypeRef::int())]),
        ]);
        let order = resolve_order(&g);
        let errs = order.failures.get(&qn("A")).unwrap();
        match &errs[0] {
            SynthError::DirectCycle { members } => assert_eq!(members, &vec![qn("A"), qn("B")]),
            other => panic!("unexpected {:?}", other),
        }
        assert!(order.failures.contains(&qn("B")));
        assert_eq!(order.units.len(), 1);
        assert_eq!(order.excluded.len(), 2);
    }

    #[test]
    fn by_value_self_embedding_is_rejected() {
        let g = graph(vec![TypeEntry::record(
            qn("Loop"),
            vec![FieldDef::new("again", TypeRef::option(TypeRef::named("m", "Loop")))],
        )]);
        let order = resolve_order(&g);
        assert!(order.failures.contains(&qn("Loop")));
        assert!(order.units.is_empty());
    }

    #[test]
    fn every_node_in_exactly_one_unit() {
        let g = graph(vec![
            TypeEntry::record(qn("A"), vec![FieldDef::new("b", TypeRef::ptr(TypeRef::named("m", "B")))]),
            TypeEntry::record(qn("B"), vec![FieldDef::new("c", TypeRef::map(TypeRef::string(), TypeRef::named("m", "C")))]),
            TypeEntry::record(qn("C"), vec![FieldDef::new("a", TypeRef::seq(TypeRef::named("m", "A")))]),
            TypeEntry::record(qn("D"), vec![]),
        ]);
        let order = resolve_order(&g);
        let mut seen: Vec<NodeId> = order.units.iter().flat_map(|u| u.members.clone()).collect();
        seen.sort();
        assert_eq!(seen, g.node_ids());
    }
}
