//! The synthesis pipeline.
//!
//! [`synthesize`] runs analysis, drops every plan that failed or depends on
//! a failed type, builds the cross-type indexes (plain companions,
//! validators) sequentially, then synthesizes each unit on a bounded worker
//! pool. Definitions are handed to the emitter on the calling thread, in
//! unit order, so output is deterministic regardless of worker count.

use std::collections::HashSet;

use indexmap::IndexMap;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use typesynth_check::analyze;
use typesynth_check::order::CycleKind;
use typesynth_check::plan::{PlannedUnit, SynthesisPlan};
use typesynth_core::error::{FailureLog, SynthError};
use typesynth_core::graph::{Target, TypeGraph};
use typesynth_core::id::{FieldPath, QualifiedName};
use typesynth_core::types::TypeRef;
use typesynth_core::universe::Universe;

use crate::clone::synthesize_clone;
use crate::defs::{Definition, Emitter, Item};
use crate::error::CodegenError;
use crate::patch::synthesize_patch;
use crate::plain::{check_range, synthesize_plain, PlainIndex};
use crate::validator::{synthesize_validator, ValidatorIndex};
use crate::{Family, SynthOptions};

/// Why a family produced nothing for a type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Copying by assignment is already a deep copy.
    SkipEntire,
    /// The type supplies its own method for this family.
    Delegated,
    /// Type-level `nocopy`.
    Passthrough,
    /// No field needs the transformation.
    NothingToDo,
    Container,
    Parametric,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Skipped {
    pub origin: QualifiedName,
    pub family: Family,
    pub reason: SkipReason,
}

/// Outcome of one synthesis run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SynthesisReport {
    /// Number of definitions handed to the emitter.
    pub emitted: usize,
    pub skipped: Vec<Skipped>,
    pub failures: FailureLog,
}

impl SynthesisReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Read-only state shared by all unit workers.
struct SynthContext<'a> {
    graph: &'a TypeGraph,
    plans: &'a IndexMap<QualifiedName, SynthesisPlan>,
    options: &'a SynthOptions,
    plain: PlainIndex,
    validators: ValidatorIndex,
}

#[derive(Debug, Default)]
struct UnitOutput {
    definitions: Vec<Definition>,
    skipped: Vec<Skipped>,
}

/// Synthesizes every enabled family for every type of `universe`.
///
/// Per-type failures do not stop the run; they are returned in the report
/// and the failed types (and everything depending on them) are left out.
pub fn synthesize(
    universe: &Universe,
    options: &SynthOptions,
    emitter: &mut dyn Emitter,
) -> Result<SynthesisReport, CodegenError> {
    options.validate()?;

    let analysis = analyze(universe);
    let mut failures = analysis.classification.failures.clone();
    let mut plans = analysis.classification.plans.clone();

    for plan in plans.values() {
        for error in check_range(plan) {
            failures.record(plan.name.clone(), error);
        }
    }
    drop_failed(&analysis.graph, &mut plans, &mut failures);

    let ctx = SynthContext {
        graph: &analysis.graph,
        plans: &plans,
        options,
        plain: if options.enabled(Family::Plain) {
            PlainIndex::build(&analysis.graph, &plans, &options.plain_suffix)
        } else {
            PlainIndex::default()
        },
        validators: if options.enabled(Family::Validator) {
            ValidatorIndex::build(&analysis.graph, &plans)
        } else {
            ValidatorIndex::default()
        },
    };

    let workers = options.worker_count();
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .build()
        .map_err(|e| CodegenError::WorkerPool(e.to_string()))?;

    let units = &analysis.classification.units;
    let outputs: Vec<UnitOutput> =
        pool.install(|| units.par_iter().map(|unit| generate_unit(&ctx, unit)).collect());

    let mut report = SynthesisReport {
        failures,
        ..SynthesisReport::default()
    };
    for output in outputs {
        for definition in output.definitions {
            emitter.emit(definition);
            report.emitted += 1;
        }
        report.skipped.extend(output.skipped);
    }

    tracing::info!(
        units = units.len(),
        workers,
        emitted = report.emitted,
        skipped = report.skipped.len(),
        failed = report.failures.len(),
        "synthesis complete"
    );
    Ok(report)
}

/// Removes failed plans, and plans referencing a failed type, to a
/// fixpoint.
fn drop_failed(
    graph: &TypeGraph,
    plans: &mut IndexMap<QualifiedName, SynthesisPlan>,
    failures: &mut FailureLog,
) {
    loop {
        let failed: HashSet<QualifiedName> = failures.iter().map(|(n, _)| n.clone()).collect();
        let mut dropped = Vec::new();
        for plan in plans.values() {
            if failed.contains(&plan.name) {
                dropped.push((plan.name.clone(), None));
                continue;
            }
            let dependency = plan.fields.iter().find_map(|f| {
                failed_reference(graph, &f.ty, &failed, &mut Vec::new())
                    .map(|dep| (FieldPath::root(&plan.name).child(f.name.clone()), dep))
            });
            if let Some(found) = dependency {
                dropped.push((plan.name.clone(), Some(found)));
            }
        }
        if dropped.is_empty() {
            return;
        }
        for (name, dependency) in dropped {
            plans.shift_remove(&name);
            if let Some((path, dependency)) = dependency {
                tracing::debug!(type_name = %name, %dependency, "dropped with failed dependency");
                failures.record(name, SynthError::DependencyFailed { path, dependency });
            }
        }
    }
}

fn failed_reference(
    graph: &TypeGraph,
    ty: &TypeRef,
    failed: &HashSet<QualifiedName>,
    guard: &mut Vec<QualifiedName>,
) -> Option<QualifiedName> {
    match ty {
        TypeRef::Named { name, args } => {
            let own = match graph.lookup(name) {
                Some(Target::Node(id)) => graph
                    .name_of(id)
                    .filter(|canonical| failed.contains(*canonical))
                    .cloned(),
                Some(Target::Shape(shape)) if !guard.contains(name) => {
                    guard.push(name.clone());
                    let found = failed_reference(graph, &shape, failed, guard);
                    guard.pop();
                    found
                }
                _ if failed.contains(name) => Some(name.clone()),
                _ => None,
            };
            own.or_else(|| {
                args.iter()
                    .find_map(|a| failed_reference(graph, a, failed, guard))
            })
        }
        TypeRef::Sequence(inner) | TypeRef::Pointer(inner) => {
            failed_reference(graph, inner, failed, guard)
        }
        TypeRef::Array { elem, .. } => failed_reference(graph, elem, failed, guard),
        TypeRef::Wrapper { inner, .. } => failed_reference(graph, inner, failed, guard),
        TypeRef::Map { key, value } => failed_reference(graph, key, failed, guard)
            .or_else(|| failed_reference(graph, value, failed, guard)),
        TypeRef::Literal(fields) => fields
            .iter()
            .find_map(|f| failed_reference(graph, &f.ty, failed, guard)),
        TypeRef::Scalar(_) | TypeRef::Param(_) | TypeRef::Opaque(_) => None,
    }
}

/// Synthesizes every member of one unit. Members of a pointer-broken unit
/// get all their signatures ahead of any declaration or body.
fn generate_unit(ctx: &SynthContext<'_>, unit: &PlannedUnit) -> UnitOutput {
    let mut signatures = Vec::new();
    let mut output = UnitOutput::default();

    for name in &unit.members {
        let plan = match ctx.plans.get(name) {
            Some(p) => p,
            None => continue,
        };
        let mut decls = Vec::new();
        let mut functions = Vec::new();
        for &family in &ctx.options.families {
            let items = match generate(ctx, plan, family) {
                Ok(items) => items,
                Err(reason) => {
                    output.skipped.push(Skipped {
                        origin: name.clone(),
                        family,
                        reason,
                    });
                    continue;
                }
            };
            for item in items {
                let definition = Definition {
                    origin: name.clone(),
                    family,
                    item,
                };
                match &definition.item {
                    Item::TypeDecl(_) => decls.push(definition),
                    Item::Function(f) => {
                        if unit.cycle == CycleKind::PointerBroken {
                            signatures.push(Definition {
                                origin: name.clone(),
                                family,
                                item: Item::Signature(f.signature.clone()),
                            });
                        }
                        functions.push(definition);
                    }
                    Item::Signature(_) => signatures.push(definition),
                }
            }
        }
        output.definitions.extend(decls);
        output.definitions.extend(functions);
    }

    if !signatures.is_empty() {
        signatures.append(&mut output.definitions);
        output.definitions = signatures;
    }
    tracing::debug!(
        members = unit.members.len(),
        definitions = output.definitions.len(),
        "unit synthesized"
    );
    output
}

fn generate(
    ctx: &SynthContext<'_>,
    plan: &SynthesisPlan,
    family: Family,
) -> Result<Vec<Item>, SkipReason> {
    match family {
        Family::Clone => synthesize_clone(plan).map(|f| vec![Item::Function(f)]),
        Family::Plain => synthesize_plain(&ctx.plain, plan),
        Family::Patch => synthesize_patch(ctx.graph, plan, &ctx.options.patch_suffix),
        Family::Validator => {
            synthesize_validator(&ctx.validators, plan).map(|f| vec![Item::Function(f)])
        }
    }
}
