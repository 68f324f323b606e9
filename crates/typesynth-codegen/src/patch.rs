//! Patch companions: sparse updates.
//!
//! `<Name>Patch` mirrors a record with every field wrapped in `Und`:
//! undefined leaves the field unset, null sets it to its absent value, and a
//! defined payload sets it to that value. Four functions come with it:
//!
//! - `FromValue` lifts a value into a patch that sets every field;
//! - `ToValue` resolves a patch back into a value (unset fields get their
//!   zero value);
//! - `Merge` combines two patches, the right one winning on every field it
//!   sets;
//! - `ApplyPatch` is `ToValue(Merge(FromValue(orig), patch))`.

use serde::{Deserialize, Serialize};

use typesynth_check::plan::SynthesisPlan;
use typesynth_core::graph::{Target, TypeGraph};
use typesynth_core::id::QualifiedName;
use typesynth_core::types::TypeRef;

use crate::defs::{
    self_type, Body, DeclField, DeclShape, FunctionDef, FunctionKind, Item, Signature, TypeDecl,
};
use crate::synth::SkipReason;

/// What an explicit-absent (null) patch entry resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AbsentValue {
    /// The field's wrapper in its null state.
    WrapperNull,
    /// A nil pointer, sequence or map.
    NilReference,
    /// The field's zero value.
    Zero,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatchField {
    pub name: String,
    /// Declared type of the original field.
    pub ty: TypeRef,
    pub absent: AbsentValue,
}

/// Body shared by the four patch functions; the function kind selects the
/// operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatchBody {
    pub companion: QualifiedName,
    pub fields: Vec<PatchField>,
}

/// Resolves what explicit-absent means for values of `ty`, following
/// aliases to unnamed shapes.
pub fn absent_value(graph: &TypeGraph, ty: &TypeRef) -> AbsentValue {
    let mut current = ty.clone();
    let mut seen: Vec<QualifiedName> = Vec::new();
    loop {
        let next = match &current {
            TypeRef::Wrapper { .. } => return AbsentValue::WrapperNull,
            TypeRef::Pointer(_) | TypeRef::Sequence(_) | TypeRef::Map { .. } => {
                return AbsentValue::NilReference
            }
            TypeRef::Named { name, .. } => match graph.lookup(name) {
                Some(Target::Shape(shape)) if !seen.contains(name) => {
                    seen.push(name.clone());
                    shape
                }
                _ => return AbsentValue::Zero,
            },
            _ => return AbsentValue::Zero,
        };
        current = next;
    }
}

/// Synthesizes the patch companion and its four functions.
///
/// Named containers have no fields to patch, and parametric types are left
/// to their instantiations.
pub fn synthesize_patch(
    graph: &TypeGraph,
    plan: &SynthesisPlan,
    suffix: &str,
) -> Result<Vec<Item>, SkipReason> {
    if plan.container {
        return Err(SkipReason::Container);
    }
    if !plan.type_params.is_empty() {
        return Err(SkipReason::Parametric);
    }
    if plan.fields.is_empty() {
        return Err(SkipReason::NothingToDo);
    }

    let companion = plan.name.with_suffix(suffix);
    let fields: Vec<PatchField> = plan
        .fields
        .iter()
        .map(|f| PatchField {
            name: f.name.clone(),
            ty: f.ty.clone(),
            absent: absent_value(graph, &f.ty),
        })
        .collect();

    let decl = TypeDecl {
        name: companion.clone(),
        type_params: Vec::new(),
        shape: DeclShape::Record(
            plan.fields
                .iter()
                .map(|f| DeclField {
                    name: f.name.clone(),
                    ty: TypeRef::und(f.ty.clone()),
                    embedded: false,
                })
                .collect(),
        ),
    };

    let body = PatchBody {
        companion: companion.clone(),
        fields,
    };
    let value_ty = self_type(&plan.name, &[]);
    let patch_ty = self_type(&companion, &[]);
    let function = |kind: FunctionKind, inputs: Vec<TypeRef>, output: &TypeRef| {
        Item::Function(FunctionDef {
            signature: Signature::new(kind, &plan.name, &[])
                .with_inputs(inputs)
                .returning(output.clone()),
            body: Body::Patch(body.clone()),
        })
    };

    Ok(vec![
        Item::TypeDecl(decl),
        function(FunctionKind::PatchFromValue, vec![value_ty.clone()], &patch_ty),
        function(FunctionKind::PatchToValue, vec![patch_ty.clone()], &value_ty),
        function(
            FunctionKind::PatchMerge,
            vec![patch_ty.clone(), patch_ty.clone()],
            &patch_ty,
        ),
        function(
            FunctionKind::PatchApply,
            vec![value_ty.clone(), patch_ty.clone()],
            &value_ty,
        ),
    ])
}
