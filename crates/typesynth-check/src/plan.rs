//! Synthesis plans: the classifier's output, consumed once by the
//! synthesizer.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use typesynth_core::directive::Annotation;
use typesynth_core::error::FailureLog;
use typesynth_core::id::{NodeId, QualifiedName};
use typesynth_core::types::{Capability, MethodDescriptor, TypeRef, WrapperKind};

use crate::order::CycleKind;

/// How a field is deep-copied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Strategy {
    CopyByAssignment,
    DelegateToCapability(MethodDescriptor),
    ContainerRebuild,
    RecordRebuild,
    PointerRebuild,
    PassthroughShare,
}

/// Recursive copy program for one value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CopyOp {
    /// Copy the value as is; it holds no references.
    Assign,
    /// Copy the value as is, sharing any references it holds.
    Share,
    /// Call the user-supplied clone method of `target`.
    Delegate { target: QualifiedName, method: String },
    /// Invoke the callback passed for a live type parameter.
    Callback { param: String },
    /// Call the generated clone of `target`, passing one callback per live
    /// type parameter.
    Call {
        target: QualifiedName,
        callbacks: Vec<CopyOp>,
    },
    /// Nil stays nil; otherwise allocate a new cell.
    Pointer(Box<CopyOp>),
    Sequence(Box<CopyOp>),
    /// Keys are copied by assignment.
    Map { value: Box<CopyOp> },
    Array(Box<CopyOp>),
    /// Copies the defined payload; for `Elastic` the payload op covers the
    /// whole element sequence.
    Wrapper { kind: WrapperKind, inner: Box<CopyOp> },
    /// Anonymous record rebuilt field by field; unlisted fields reset.
    Record { fields: Vec<(String, CopyOp)> },
}

impl CopyOp {
    /// Whether a plain value copy is already a deep copy.
    pub fn is_trivial(&self) -> bool {
        matches!(self, CopyOp::Assign | CopyOp::Share)
    }

    pub fn strategy(&self) -> Strategy {
        match self {
            CopyOp::Assign => Strategy::CopyByAssignment,
            CopyOp::Share => Strategy::PassthroughShare,
            CopyOp::Delegate { method, .. } => Strategy::DelegateToCapability(MethodDescriptor {
                name: method.clone(),
                capability: Capability::Clone,
            }),
            CopyOp::Pointer(_) => Strategy::PointerRebuild,
            CopyOp::Sequence(_) | CopyOp::Map { .. } | CopyOp::Array(_) => {
                Strategy::ContainerRebuild
            }
            CopyOp::Wrapper {
                kind: WrapperKind::Elastic,
                ..
            } => Strategy::ContainerRebuild,
            CopyOp::Wrapper { .. }
            | CopyOp::Record { .. }
            | CopyOp::Call { .. }
            | CopyOp::Callback { .. } => Strategy::RecordRebuild,
        }
    }
}

/// Capability methods declared by a field's type, resolved once.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldCapabilities {
    /// The named type the capabilities belong to.
    pub target: Option<QualifiedName>,
    pub clone: Option<MethodDescriptor>,
    pub validate: Option<MethodDescriptor>,
    pub project: Option<MethodDescriptor>,
}

impl FieldCapabilities {
    pub fn get(&self, capability: Capability) -> Option<&MethodDescriptor> {
        match capability {
            Capability::Clone => self.clone.as_ref(),
            Capability::Validate => self.validate.as_ref(),
            Capability::Project => self.project.as_ref(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedField {
    pub name: String,
    pub ty: TypeRef,
    pub embedded: bool,
    pub annotation: Annotation,
    pub strategy: Strategy,
    pub op: CopyOp,
    pub capabilities: FieldCapabilities,
}

/// Per-type plan. Field order matches declaration order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SynthesisPlan {
    pub name: QualifiedName,
    pub node: NodeId,
    pub type_params: Vec<String>,
    /// Parameters the generated transforms take a callback for.
    pub live_params: Vec<String>,
    /// Every field copies by assignment; callers copy the whole value.
    pub skip_entire: bool,
    /// Named container entries plan a single pseudo field named `""`.
    pub container: bool,
    pub fields: Vec<PlannedField>,
    /// Fields excluded by `ignore`, in declaration order.
    pub ignored: Vec<String>,
    /// Methods declared on the type itself.
    pub methods: Vec<MethodDescriptor>,
    /// Type-level `nocopy`.
    pub passthrough: bool,
    pub cycle: CycleKind,
    /// Index into [`Classification::units`].
    pub unit: usize,
}

impl SynthesisPlan {
    pub fn method(&self, capability: Capability) -> Option<&MethodDescriptor> {
        self.methods.iter().find(|m| m.capability == capability)
    }

    pub fn field(&self, name: &str) -> Option<&PlannedField> {
        self.fields.iter().find(|f| f.name == name)
    }
}

/// Names of the plans in one synthesis unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedUnit {
    pub members: Vec<QualifiedName>,
    pub cycle: CycleKind,
}

/// How a concrete instantiation of a type is copied at a call site.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InstanceClass {
    SkipEntire,
    /// The type declares its own clone method.
    Delegated(MethodDescriptor),
    /// Generated clone taking these callbacks, one per live parameter.
    Generated { callbacks: Vec<CopyOp> },
}

/// Output of a classification pass.
#[derive(Debug, Clone, Default)]
pub struct Classification {
    /// Plans in unit order.
    pub plans: IndexMap<QualifiedName, SynthesisPlan>,
    pub units: Vec<PlannedUnit>,
    pub failures: FailureLog,
}

impl Classification {
    pub fn plan(&self, name: &QualifiedName) -> Option<&SynthesisPlan> {
        self.plans.get(name)
    }
}
