//! Analysis passes over a type graph: cycle & order resolution and field
//! classification.
//!
//! [`analyze`] runs the whole front half of the pipeline: build the
//! [`TypeGraph`], resolve the synthesis order, then classify every type.
//! The result is read-only input for the synthesizer.

pub mod classify;
pub mod order;
pub mod plan;

pub use classify::{ClassificationCache, Classifier, NodeFacts};
pub use order::{resolve_order, CycleKind, SynthesisOrder, SynthesisUnit};
pub use plan::{
    Classification, CopyOp, FieldCapabilities, InstanceClass, PlannedField, PlannedUnit,
    Strategy, SynthesisPlan,
};

use typesynth_core::graph::TypeGraph;
use typesynth_core::universe::Universe;

/// Everything the synthesizer needs from one universe.
#[derive(Debug, Clone)]
pub struct Analysis {
    pub graph: TypeGraph,
    pub order: SynthesisOrder,
    pub classification: Classification,
}

/// Builds the graph, resolves the order, and classifies every type of
/// `universe`. Failures of every stage end up in
/// `classification.failures`.
pub fn analyze(universe: &Universe) -> Analysis {
    let build = TypeGraph::build(universe);
    let order = resolve_order(&build.graph);
    let classification = {
        let mut classifier = Classifier::new(universe, &build.graph, &order, build.failures);
        classifier.classify_all()
    };
    Analysis {
        graph: build.graph,
        order,
        classification,
    }
}
