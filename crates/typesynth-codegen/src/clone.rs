//! Clone synthesis: one deep-copy function per type that needs one.

use serde::{Deserialize, Serialize};

use typesynth_check::plan::{CopyOp, SynthesisPlan};
use typesynth_core::types::Capability;

use crate::defs::{self_type, Body, FunctionDef, FunctionKind, Signature};
use crate::synth::SkipReason;

/// Body of a generated clone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloneBody {
    /// Build a new record field by field. Fields in `reset` are excluded
    /// from copying and left at their zero value.
    Record {
        fields: Vec<CloneStep>,
        reset: Vec<String>,
    },
    /// Named container type: one op over the whole value.
    Whole { op: CopyOp },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloneStep {
    pub field: String,
    pub op: CopyOp,
}

/// Synthesizes the clone function of `plan`, or says why there is none.
pub fn synthesize_clone(plan: &SynthesisPlan) -> Result<FunctionDef, SkipReason> {
    if plan.method(Capability::Clone).is_some() {
        return Err(SkipReason::Delegated);
    }
    if plan.passthrough {
        return Err(SkipReason::Passthrough);
    }
    if plan.skip_entire {
        return Err(SkipReason::SkipEntire);
    }

    let body = if plan.container {
        let op = plan
            .fields
            .first()
            .map(|f| f.op.clone())
            .unwrap_or(CopyOp::Assign);
        CloneBody::Whole { op }
    } else {
        CloneBody::Record {
            fields: plan
                .fields
                .iter()
                .map(|f| CloneStep {
                    field: f.name.clone(),
                    op: f.op.clone(),
                })
                .collect(),
            reset: plan.ignored.clone(),
        }
    };

    let ty = self_type(&plan.name, &plan.type_params);
    let signature = Signature::new(FunctionKind::Clone, &plan.name, &plan.type_params)
        .with_callbacks(&plan.live_params)
        .with_inputs(vec![ty.clone()])
        .returning(ty);

    Ok(FunctionDef {
        signature,
        body: Body::Clone(body),
    })
}
