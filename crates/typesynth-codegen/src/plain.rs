//! Plain companions.
//!
//! A wrapper field whose constraint narrows its presence states can be
//! projected onto a simpler type: a `required` `Und[T]` is just `T`, an
//! `Und[T]` allowing `def,null` is `Option[T]`, and so on. Types with at
//! least one such field get a `<Name>Plain` companion declaration plus a
//! `ToPlain` / `FromPlain` pair. A type whose fields reference a type with a
//! companion gets one too, so the set of companions is computed to a fixpoint
//! over all plans.

use std::collections::HashSet;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use typesynth_check::plan::{PlannedField, SynthesisPlan};
use typesynth_core::directive::{Constraint, LenOp};
use typesynth_core::error::SynthError;
use typesynth_core::graph::{Target, TypeGraph};
use typesynth_core::id::{FieldPath, QualifiedName};
use typesynth_core::types::{Capability, Presence, ScalarType, TypeRef, WrapperKind};

use crate::defs::{
    self_type, Body, DeclField, DeclShape, FunctionDef, FunctionKind, Item, Signature, TypeDecl,
};
use crate::synth::SkipReason;

/// Conversion between a field value and its plain counterpart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlainConv {
    /// Same type on both sides.
    Keep,
    /// Named type with a generated companion.
    Nested { target: QualifiedName },
    /// Named type projecting itself through a user-supplied method.
    Delegate { target: QualifiedName, method: String },
    Pointer(Box<PlainConv>),
    Sequence(Box<PlainConv>),
    Array(Box<PlainConv>),
    /// Keys are kept as is.
    MapValue(Box<PlainConv>),
    /// Every admitted state survives; only the payload changes.
    Wrapped { kind: WrapperKind, payload: Box<PlainConv> },
    /// Only `def` is allowed: the plain field is the payload.
    Unwrap { kind: WrapperKind, payload: Box<PlainConv> },
    /// `def` plus one absent state: the plain field is `Option[payload]`.
    ToOption {
        kind: WrapperKind,
        absent: Presence,
        payload: Box<PlainConv>,
    },
    /// A single absent state: the plain field is an empty record.
    Marker { kind: WrapperKind, state: Presence },
    /// `null` and `und` only: the plain field is `true` for null.
    AbsentPair { kind: WrapperKind },
    /// Payload of an `Elastic` value: a sequence of optional elements.
    ElasticPayload {
        non_null: bool,
        fixed_len: Option<u32>,
        elem: Box<PlainConv>,
    },
}

impl PlainConv {
    pub fn is_keep(&self) -> bool {
        matches!(self, PlainConv::Keep)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlainStep {
    pub field: String,
    pub conv: PlainConv,
}

/// Body shared by `ToPlain` and `FromPlain`; the function kind gives the
/// direction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlainBody {
    pub companion: QualifiedName,
    pub steps: Vec<PlainStep>,
}

/// A planned field and its plain counterpart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlainField {
    pub name: String,
    pub embedded: bool,
    pub conv: PlainConv,
    pub ty: TypeRef,
}

/// Which types get a plain companion, and how their fields convert.
#[derive(Debug, Clone, Default)]
pub struct PlainIndex {
    suffix: String,
    companions: IndexMap<QualifiedName, Vec<PlainField>>,
}

impl PlainIndex {
    /// Computes companions for `plans` to a fixpoint.
    pub fn build(
        graph: &TypeGraph,
        plans: &IndexMap<QualifiedName, SynthesisPlan>,
        suffix: &str,
    ) -> Self {
        let mut has: HashSet<QualifiedName> = HashSet::new();
        let mut rounds = 0;
        loop {
            rounds += 1;
            let converter = Converter {
                graph,
                has: &has,
                suffix,
            };
            let added: Vec<QualifiedName> = plans
                .values()
                .filter(|p| !has.contains(&p.name) && p.method(Capability::Project).is_none())
                .filter(|p| p.fields.iter().any(|f| !converter.field(f).0.is_keep()))
                .map(|p| p.name.clone())
                .collect();
            if added.is_empty() {
                break;
            }
            has.extend(added);
        }

        let converter = Converter {
            graph,
            has: &has,
            suffix,
        };
        let companions = plans
            .values()
            .filter(|p| has.contains(&p.name))
            .map(|p| {
                let fields = p
                    .fields
                    .iter()
                    .map(|f| {
                        let (conv, ty) = converter.field(f);
                        PlainField {
                            name: f.name.clone(),
                            embedded: f.embedded,
                            conv,
                            ty,
                        }
                    })
                    .collect();
                (p.name.clone(), fields)
            })
            .collect::<IndexMap<_, _>>();

        tracing::debug!(companions = companions.len(), rounds, "plain companions resolved");
        PlainIndex {
            suffix: suffix.to_string(),
            companions,
        }
    }

    pub fn has_companion(&self, name: &QualifiedName) -> bool {
        self.companions.contains_key(name)
    }

    pub fn fields(&self, name: &QualifiedName) -> Option<&[PlainField]> {
        self.companions.get(name).map(|v| v.as_slice())
    }

    pub fn companion_name(&self, name: &QualifiedName) -> QualifiedName {
        name.with_suffix(&self.suffix)
    }
}

struct Converter<'a> {
    graph: &'a TypeGraph,
    has: &'a HashSet<QualifiedName>,
    suffix: &'a str,
}

impl Converter<'_> {
    fn field(&self, field: &PlannedField) -> (PlainConv, TypeRef) {
        self.convert(&field.ty, field.annotation.constraint.as_ref(), &mut Vec::new())
    }

    fn convert(
        &self,
        ty: &TypeRef,
        constraint: Option<&Constraint>,
        guard: &mut Vec<QualifiedName>,
    ) -> (PlainConv, TypeRef) {
        let keep = (PlainConv::Keep, ty.clone());
        match ty {
            TypeRef::Wrapper { kind, inner } => self.wrapper(ty, *kind, inner, constraint, guard),
            TypeRef::Pointer(p) => lift(self.convert(p, None, guard), ty, PlainConv::Pointer, TypeRef::Pointer),
            TypeRef::Sequence(e) => {
                lift(self.convert(e, None, guard), ty, PlainConv::Sequence, TypeRef::Sequence)
            }
            TypeRef::Array { elem, len } => {
                let len = *len;
                lift(self.convert(elem, None, guard), ty, PlainConv::Array, |e| {
                    TypeRef::Array { elem: e, len }
                })
            }
            TypeRef::Map { key, value } => {
                let key = key.clone();
                lift(self.convert(value, None, guard), ty, PlainConv::MapValue, |v| {
                    TypeRef::Map {
                        key: key.clone(),
                        value: v,
                    }
                })
            }
            TypeRef::Named { name, args } => match self.graph.lookup(name) {
                Some(Target::Node(id)) => {
                    let (canonical, node) = match (self.graph.name_of(id), self.graph.node(id)) {
                        (Some(c), Some(n)) => (c.clone(), n),
                        _ => return keep,
                    };
                    let plain_ty = TypeRef::Named {
                        name: canonical.with_suffix(self.suffix),
                        args: args.clone(),
                    };
                    if let Some(method) = node.method(Capability::Project) {
                        (
                            PlainConv::Delegate {
                                target: canonical,
                                method: method.name.clone(),
                            },
                            plain_ty,
                        )
                    } else if self.has.contains(&canonical) {
                        (PlainConv::Nested { target: canonical }, plain_ty)
                    } else {
                        keep
                    }
                }
                Some(Target::Shape(shape)) if !guard.contains(name) => {
                    guard.push(name.clone());
                    let converted = self.convert(&shape, constraint, guard);
                    guard.pop();
                    if converted.0.is_keep() {
                        keep
                    } else {
                        converted
                    }
                }
                _ => keep,
            },
            TypeRef::Scalar(_) | TypeRef::Param(_) | TypeRef::Literal(_) | TypeRef::Opaque(_) => {
                keep
            }
        }
    }

    fn wrapper(
        &self,
        ty: &TypeRef,
        kind: WrapperKind,
        inner: &TypeRef,
        constraint: Option<&Constraint>,
        guard: &mut Vec<QualifiedName>,
    ) -> (PlainConv, TypeRef) {
        let (payload, payload_ty) = if kind == WrapperKind::Elastic {
            self.elastic_payload(inner, constraint, guard)
        } else {
            self.convert(inner, None, guard)
        };

        let admitted: Vec<Presence> = STATES.iter().copied().filter(|s| kind.admits(*s)).collect();
        let allowed: Vec<Presence> = admitted
            .iter()
            .copied()
            .filter(|s| constraint.map_or(true, |c| c.allows(*s)))
            .collect();

        if allowed.len() == admitted.len() || allowed.is_empty() {
            if payload.is_keep() {
                return (PlainConv::Keep, ty.clone());
            }
            let plain_kind = if kind == WrapperKind::Elastic {
                WrapperKind::Und
            } else {
                kind
            };
            return (
                PlainConv::Wrapped {
                    kind,
                    payload: Box::new(payload),
                },
                TypeRef::wrapper(plain_kind, payload_ty),
            );
        }

        match allowed.as_slice() {
            [Presence::Defined] => (
                PlainConv::Unwrap {
                    kind,
                    payload: Box::new(payload),
                },
                payload_ty,
            ),
            [Presence::Defined, absent] => (
                PlainConv::ToOption {
                    kind,
                    absent: *absent,
                    payload: Box::new(payload),
                },
                TypeRef::option(payload_ty),
            ),
            [state] => (
                PlainConv::Marker {
                    kind,
                    state: *state,
                },
                TypeRef::Literal(Vec::new()),
            ),
            _ => (
                PlainConv::AbsentPair { kind },
                TypeRef::Scalar(ScalarType::Bool),
            ),
        }
    }

    fn elastic_payload(
        &self,
        inner: &TypeRef,
        constraint: Option<&Constraint>,
        guard: &mut Vec<QualifiedName>,
    ) -> (PlainConv, TypeRef) {
        let (elem, elem_ty) = self.convert(inner, None, guard);
        let non_null = constraint.map_or(false, |c| c.values_non_null);
        let fixed_len = constraint
            .and_then(|c| c.len)
            .filter(|l| l.op == LenOp::Eq)
            .and_then(|l| u32::try_from(l.bound).ok());

        if !non_null && fixed_len.is_none() && elem.is_keep() {
            return (
                PlainConv::Keep,
                TypeRef::seq(TypeRef::option(inner.clone())),
            );
        }
        let base = if non_null {
            elem_ty
        } else {
            TypeRef::option(elem_ty)
        };
        let ty = match fixed_len {
            Some(n) => TypeRef::array(base, n),
            None => TypeRef::seq(base),
        };
        (
            PlainConv::ElasticPayload {
                non_null,
                fixed_len,
                elem: Box::new(elem),
            },
            ty,
        )
    }
}

const STATES: [Presence; 3] = [Presence::Defined, Presence::Null, Presence::Undefined];

fn lift(
    (conv, plain): (PlainConv, TypeRef),
    original: &TypeRef,
    wrap_conv: impl FnOnce(Box<PlainConv>) -> PlainConv,
    wrap_ty: impl FnOnce(Box<TypeRef>) -> TypeRef,
) -> (PlainConv, TypeRef) {
    if conv.is_keep() {
        (PlainConv::Keep, original.clone())
    } else {
        (wrap_conv(Box::new(conv)), wrap_ty(Box::new(plain)))
    }
}

/// Presence states a field's constraint names explicitly but its wrapper
/// cannot represent. `nullish` adapts to the wrapper and is never out of
/// range.
pub fn check_range(plan: &SynthesisPlan) -> Vec<SynthError> {
    let root = FieldPath::root(&plan.name);
    let mut errors = Vec::new();
    for field in &plan.fields {
        let (kind, states) = match (
            field.ty.wrapper_kind(),
            field.annotation.constraint.and_then(|c| c.states),
        ) {
            (Some(kind), Some(states)) => (kind, states),
            _ => continue,
        };
        let explicit = [
            (Presence::Defined, states.required || states.def),
            (Presence::Null, states.null),
            (Presence::Undefined, states.und),
        ];
        for (state, named) in explicit {
            if named && !kind.admits(state) {
                errors.push(SynthError::StateOutOfRange {
                    path: root.child(field.name.clone()),
                    state,
                    wrapper: kind,
                });
            }
        }
    }
    errors
}

/// Synthesizes the companion declaration and both projections of `plan`.
pub fn synthesize_plain(index: &PlainIndex, plan: &SynthesisPlan) -> Result<Vec<Item>, SkipReason> {
    if plan.method(Capability::Project).is_some() {
        return Err(SkipReason::Delegated);
    }
    let fields = index.fields(&plan.name).ok_or(SkipReason::NothingToDo)?;
    let companion = index.companion_name(&plan.name);

    let shape = if plan.container {
        let ty = fields
            .first()
            .map(|f| f.ty.clone())
            .unwrap_or_else(|| TypeRef::Literal(Vec::new()));
        DeclShape::Container(ty)
    } else {
        DeclShape::Record(
            fields
                .iter()
                .map(|f| DeclField {
                    name: f.name.clone(),
                    ty: f.ty.clone(),
                    embedded: f.embedded,
                })
                .collect(),
        )
    };
    let decl = TypeDecl {
        name: companion.clone(),
        type_params: plan.type_params.clone(),
        shape,
    };

    let body = PlainBody {
        companion: companion.clone(),
        steps: fields
            .iter()
            .map(|f| PlainStep {
                field: f.name.clone(),
                conv: f.conv.clone(),
            })
            .collect(),
    };
    let value_ty = self_type(&plan.name, &plan.type_params);
    let plain_ty = self_type(&companion, &plan.type_params);

    let to_plain = FunctionDef {
        signature: Signature::new(FunctionKind::ToPlain, &plan.name, &plan.type_params)
            .with_inputs(vec![value_ty.clone()])
            .returning(plain_ty.clone()),
        body: Body::Plain(body.clone()),
    };
    let from_plain = FunctionDef {
        signature: Signature::new(FunctionKind::FromPlain, &plan.name, &plan.type_params)
            .with_inputs(vec![plain_ty])
            .returning(value_ty),
        body: Body::Plain(body),
    };

    Ok(vec![
        Item::TypeDecl(decl),
        Item::Function(to_plain),
        Item::Function(from_plain),
    ])
}
