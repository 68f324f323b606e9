//! Structured definitions handed to the emitter.
//!
//! The synthesizer never produces source text. Every output is a
//! [`Definition`] tagged with the type it was derived from and its
//! [`Family`]; rendering, imports and file placement belong to the
//! [`Emitter`].

use std::fmt;

use serde::{Deserialize, Serialize};

use typesynth_core::id::QualifiedName;
use typesynth_core::types::TypeRef;

use crate::clone::CloneBody;
use crate::patch::PatchBody;
use crate::plain::PlainBody;
use crate::validator::ValidateBody;
use crate::Family;

/// One synthesized item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Definition {
    /// The type this definition was synthesized for.
    pub origin: QualifiedName,
    pub family: Family,
    pub item: Item,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Item {
    TypeDecl(TypeDecl),
    /// Forward declaration, emitted for every member of a cyclic unit
    /// before any body.
    Signature(Signature),
    Function(FunctionDef),
}

/// A companion type declaration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeDecl {
    pub name: QualifiedName,
    pub type_params: Vec<String>,
    pub shape: DeclShape,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeclShape {
    Record(Vec<DeclField>),
    Container(TypeRef),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeclField {
    pub name: String,
    pub ty: TypeRef,
    pub embedded: bool,
}

/// What a synthesized function does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FunctionKind {
    Clone,
    ToPlain,
    FromPlain,
    PatchFromValue,
    PatchToValue,
    PatchMerge,
    PatchApply,
    Validate,
}

impl FunctionKind {
    pub fn method_name(self) -> &'static str {
        match self {
            FunctionKind::Clone => "Clone",
            FunctionKind::ToPlain => "ToPlain",
            FunctionKind::FromPlain => "FromPlain",
            FunctionKind::PatchFromValue => "FromValue",
            FunctionKind::PatchToValue => "ToValue",
            FunctionKind::PatchMerge => "Merge",
            FunctionKind::PatchApply => "ApplyPatch",
            FunctionKind::Validate => "Validate",
        }
    }
}

impl fmt::Display for FunctionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.method_name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    /// `Type.Method`.
    pub name: String,
    pub kind: FunctionKind,
    pub target: QualifiedName,
    pub type_params: Vec<String>,
    /// One callback per live type parameter, in parameter order.
    pub callbacks: Vec<String>,
    pub inputs: Vec<TypeRef>,
    /// `None` for validators, which return an optional failure.
    pub output: Option<TypeRef>,
}

impl Signature {
    pub fn new(kind: FunctionKind, target: &QualifiedName, type_params: &[String]) -> Self {
        Signature {
            name: format!("{}.{}", target.name, kind.method_name()),
            kind,
            target: target.clone(),
            type_params: type_params.to_vec(),
            callbacks: Vec::new(),
            inputs: Vec::new(),
            output: None,
        }
    }

    pub fn with_callbacks(mut self, callbacks: &[String]) -> Self {
        self.callbacks = callbacks.to_vec();
        self
    }

    pub fn with_inputs(mut self, inputs: Vec<TypeRef>) -> Self {
        self.inputs = inputs;
        self
    }

    pub fn returning(mut self, output: TypeRef) -> Self {
        self.output = Some(output);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDef {
    pub signature: Signature,
    pub body: Body,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Body {
    Clone(CloneBody),
    Plain(PlainBody),
    Patch(PatchBody),
    Validate(ValidateBody),
}

/// `name[P1, P2]` for a type with parameters, written as a reference.
pub fn self_type(name: &QualifiedName, type_params: &[String]) -> TypeRef {
    TypeRef::Named {
        name: name.clone(),
        args: type_params.iter().map(|p| TypeRef::Param(p.clone())).collect(),
    }
}

/// Sink for synthesized definitions.
pub trait Emitter {
    fn emit(&mut self, definition: Definition);
}

/// Collects definitions in emission order.
#[derive(Debug, Default)]
pub struct VecEmitter {
    pub definitions: Vec<Definition>,
}

impl VecEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Functions of `kind` synthesized for `origin`.
    pub fn function(&self, origin: &QualifiedName, kind: FunctionKind) -> Option<&FunctionDef> {
        self.definitions.iter().find_map(|d| match &d.item {
            Item::Function(f) if &d.origin == origin && f.signature.kind == kind => Some(f),
            _ => None,
        })
    }

    pub fn type_decl(&self, name: &QualifiedName) -> Option<&TypeDecl> {
        self.definitions.iter().find_map(|d| match &d.item {
            Item::TypeDecl(t) if &t.name == name => Some(t),
            _ => None,
        })
    }
}

impl Emitter for VecEmitter {
    fn emit(&mut self, definition: Definition) {
        self.definitions.push(definition);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_names_are_type_qualified() {
        let target = QualifiedName::new("m", "User");
        let sig = Signature::new(FunctionKind::PatchApply, &target, &[]);
        assert_eq!(sig.name, "User.ApplyPatch");
        assert!(sig.output.is_none());
    }

    #[test]
    fn self_type_lists_params() {
        let ty = self_type(&QualifiedName::new("m", "Box"), &["T".to_string()]);
        assert_eq!(ty.to_string(), "m.Box[T]");
    }
}
