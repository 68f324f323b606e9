//! Ordering properties over randomly generated universes.

use proptest::prelude::*;

use typesynth_check::resolve_order;
use typesynth_core::graph::TypeGraph;
use typesynth_core::id::QualifiedName;
use typesynth_core::types::{FieldDef, TypeEntry, TypeRef};
use typesynth_core::universe::Universe;

fn qn(i: usize) -> QualifiedName {
    QualifiedName::new("m", format!("T{}", i))
}

/// `(from, to, through_pointer)` references between `n` record types.
/// By-value references only point at lower indices, so the universe never
/// contains a direct cycle; pointer references may point anywhere.
fn universe_strategy() -> impl Strategy<Value = (usize, Vec<(usize, usize, bool)>)> {
    (1usize..8).prop_flat_map(|n| {
        let edge = (0..n, 0..n, any::<bool>()).prop_map(|(from, to, ptr)| {
            if ptr || to < from {
                (from, to, ptr)
            } else {
                (from, to, true)
            }
        });
        (Just(n), prop::collection::vec(edge, 0..16))
    })
}

fn build(n: usize, refs: &[(usize, usize, bool)]) -> Universe {
    let entries = (0..n).map(|i| {
        let fields = refs
            .iter()
            .enumerate()
            .filter(|(_, (from, _, _))| *from == i)
            .map(|(k, (_, to, ptr))| {
                let target = TypeRef::named("m", &format!("T{}", to));
                let ty = if *ptr { TypeRef::ptr(target) } else { target };
                FieldDef::new(&format!("F{}", k), ty)
            })
            .collect();
        TypeEntry::record(qn(i), fields)
    });
    Universe::from_entries(entries).unwrap()
}

proptest! {
    #[test]
    fn dependencies_precede_dependents((n, refs) in universe_strategy()) {
        let universe = build(n, &refs);
        let build = TypeGraph::build(&universe);
        prop_assert!(build.failures.is_empty());
        let order = resolve_order(&build.graph);
        prop_assert!(order.excluded.is_empty());
        prop_assert!(order.failures.is_empty());

        let unit = |i: usize| {
            let id = build.graph.node_by_name(&qn(i)).unwrap();
            order.unit_of(id).unwrap()
        };
        for &(from, to, _) in &refs {
            prop_assert!(unit(to) <= unit(from), "T{} emitted after T{}", to, from);
        }
    }

    #[test]
    fn every_type_lands_in_exactly_one_unit((n, refs) in universe_strategy()) {
        let universe = build(n, &refs);
        let build = TypeGraph::build(&universe);
        let order = resolve_order(&build.graph);
        for i in 0..n {
            let id = build.graph.node_by_name(&qn(i)).unwrap();
            let hits = order.units.iter().filter(|u| u.members.contains(&id)).count();
            prop_assert_eq!(hits, 1);
        }
    }
}
