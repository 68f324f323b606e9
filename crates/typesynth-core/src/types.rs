//! The type universe data model.
//!
//! A [`TypeEntry`] is one statically declared type: a record with ordered
//! fields, an alias, or a named container shape. Field and alias types are
//! written as [`TypeRef`] trees built from scalars, named references,
//! type-parameter references, and the built-in shapes (sequences, maps,
//! fixed arrays, pointers, optionality wrappers, anonymous literal records).
//!
//! Entries are immutable once loaded into a [`crate::universe::Universe`].

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::id::QualifiedName;

/// Scalar types. All of them are copied by assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScalarType {
    Bool,
    Int,
    Uint,
    Float,
    String,
    Bytes,
}

impl fmt::Display for ScalarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ScalarType::Bool => "bool",
            ScalarType::Int => "int",
            ScalarType::Uint => "uint",
            ScalarType::Float => "float",
            ScalarType::String => "string",
            ScalarType::Bytes => "bytes",
        };
        f.write_str(s)
    }
}

/// Runtime presence state of an optionality wrapper.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Presence {
    Defined,
    Null,
    Undefined,
}

impl fmt::Display for Presence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Presence::Defined => "def",
            Presence::Null => "null",
            Presence::Undefined => "und",
        };
        f.write_str(s)
    }
}

/// Optionality wrappers.
///
/// - `Option`: defined or null.
/// - `Und`: defined, null, or undefined.
/// - `Elastic`: like `Und`, but the defined payload is a sequence of
///   `Option` elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WrapperKind {
    Option,
    Und,
    Elastic,
}

impl WrapperKind {
    /// Whether this wrapper can represent `state` at all.
    pub fn admits(self, state: Presence) -> bool {
        match self {
            WrapperKind::Option => state != Presence::Undefined,
            WrapperKind::Und | WrapperKind::Elastic => true,
        }
    }

    /// The state a zero-valued wrapper is in.
    pub fn zero_state(self) -> Presence {
        match self {
            WrapperKind::Option => Presence::Null,
            WrapperKind::Und | WrapperKind::Elastic => Presence::Undefined,
        }
    }
}

impl fmt::Display for WrapperKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            WrapperKind::Option => "Option",
            WrapperKind::Und => "Und",
            WrapperKind::Elastic => "Elastic",
        };
        f.write_str(s)
    }
}

/// A type reference as written in a field, alias, or container declaration.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TypeRef {
    Scalar(ScalarType),
    /// Reference to a declared type, with type arguments for parametric types.
    Named {
        name: QualifiedName,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        args: Vec<TypeRef>,
    },
    /// Reference to a type parameter of the enclosing parametric type.
    Param(String),
    Sequence(Box<TypeRef>),
    Map {
        key: Box<TypeRef>,
        value: Box<TypeRef>,
    },
    /// Fixed-size array, copied by value.
    Array { elem: Box<TypeRef>, len: u32 },
    Pointer(Box<TypeRef>),
    Wrapper {
        kind: WrapperKind,
        inner: Box<TypeRef>,
    },
    /// Anonymous record written inline.
    Literal(Vec<FieldDef>),
    /// A value with no structural shape (function, channel, interface).
    Opaque(String),
}

impl TypeRef {
    pub fn scalar(s: ScalarType) -> Self {
        TypeRef::Scalar(s)
    }

    pub fn int() -> Self {
        TypeRef::Scalar(ScalarType::Int)
    }

    pub fn string() -> Self {
        TypeRef::Scalar(ScalarType::String)
    }

    pub fn named(package: &str, name: &str) -> Self {
        TypeRef::Named {
            name: QualifiedName::new(package, name),
            args: Vec::new(),
        }
    }

    pub fn generic(package: &str, name: &str, args: Vec<TypeRef>) -> Self {
        TypeRef::Named {
            name: QualifiedName::new(package, name),
            args,
        }
    }

    pub fn param(name: &str) -> Self {
        TypeRef::Param(name.to_string())
    }

    pub fn seq(elem: TypeRef) -> Self {
        TypeRef::Sequence(Box::new(elem))
    }

    pub fn map(key: TypeRef, value: TypeRef) -> Self {
        TypeRef::Map {
            key: Box::new(key),
            value: Box::new(value),
        }
    }

    pub fn array(elem: TypeRef, len: u32) -> Self {
        TypeRef::Array {
            elem: Box::new(elem),
            len,
        }
    }

    pub fn ptr(pointee: TypeRef) -> Self {
        TypeRef::Pointer(Box::new(pointee))
    }

    pub fn wrapper(kind: WrapperKind, inner: TypeRef) -> Self {
        TypeRef::Wrapper {
            kind,
            inner: Box::new(inner),
        }
    }

    pub fn option(inner: TypeRef) -> Self {
        TypeRef::wrapper(WrapperKind::Option, inner)
    }

    pub fn und(inner: TypeRef) -> Self {
        TypeRef::wrapper(WrapperKind::Und, inner)
    }

    pub fn elastic(inner: TypeRef) -> Self {
        TypeRef::wrapper(WrapperKind::Elastic, inner)
    }

    /// The wrapper kind if this is an optionality wrapper.
    pub fn wrapper_kind(&self) -> Option<WrapperKind> {
        match self {
            TypeRef::Wrapper { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    /// Whether a length relation can be evaluated on values of this type:
    /// bare sequences, maps and arrays, `Elastic`, or a wrapper around one of
    /// the former.
    pub fn carries_length(&self) -> bool {
        match self {
            TypeRef::Sequence(_) | TypeRef::Map { .. } | TypeRef::Array { .. } => true,
            TypeRef::Wrapper {
                kind: WrapperKind::Elastic,
                ..
            } => true,
            TypeRef::Wrapper { inner, .. } => matches!(
                **inner,
                TypeRef::Sequence(_) | TypeRef::Map { .. } | TypeRef::Array { .. }
            ),
            _ => false,
        }
    }

    /// Whether the elements of this type are nullable wrappers, which is
    /// what an element non-null constraint checks.
    pub fn carries_nullable_elements(&self) -> bool {
        fn nullable(elem: &TypeRef) -> bool {
            matches!(
                elem.wrapper_kind(),
                Some(WrapperKind::Option) | Some(WrapperKind::Und)
            )
        }
        match self {
            TypeRef::Wrapper {
                kind: WrapperKind::Elastic,
                ..
            } => true,
            TypeRef::Sequence(elem) | TypeRef::Array { elem, .. } => nullable(elem),
            TypeRef::Wrapper { inner, .. } => match &**inner {
                TypeRef::Sequence(elem) | TypeRef::Array { elem, .. } => nullable(elem),
                _ => false,
            },
            _ => false,
        }
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeRef::Scalar(s) => write!(f, "{}", s),
            TypeRef::Named { name, args } => {
                write!(f, "{}", name)?;
                if !args.is_empty() {
                    let args: Vec<String> = args.iter().map(|a| a.to_string()).collect();
                    write!(f, "[{}]", args.join(", "))?;
                }
                Ok(())
            }
            TypeRef::Param(p) => write!(f, "{}", p),
            TypeRef::Sequence(elem) => write!(f, "[]{}", elem),
            TypeRef::Map { key, value } => write!(f, "map[{}]{}", key, value),
            TypeRef::Array { elem, len } => write!(f, "[{}]{}", len, elem),
            TypeRef::Pointer(p) => write!(f, "*{}", p),
            TypeRef::Wrapper { kind, inner } => write!(f, "{}[{}]", kind, inner),
            TypeRef::Literal(fields) => {
                write!(f, "struct{{")?;
                for (i, field) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, "; ")?;
                    }
                    write!(f, "{}", field)?;
                }
                write!(f, "}}")
            }
            TypeRef::Opaque(desc) => write!(f, "opaque({})", desc),
        }
    }
}

/// A single field of a record or literal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FieldDef {
    pub name: String,
    pub ty: TypeRef,
    /// Inlined composition (embedded field).
    #[serde(default)]
    pub embedded: bool,
    /// Raw copy-channel directive (`ignore`, `nocopy`, `method`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub copy_directive: Option<String>,
    /// Raw constraint-channel directive (`required,len>=1,...`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub constraint_directive: Option<String>,
}

impl FieldDef {
    pub fn new(name: impl Into<String>, ty: TypeRef) -> Self {
        FieldDef {
            name: name.into(),
            ty,
            embedded: false,
            copy_directive: None,
            constraint_directive: None,
        }
    }

    pub fn embedded(mut self) -> Self {
        self.embedded = true;
        self
    }

    pub fn with_copy(mut self, directive: &str) -> Self {
        self.copy_directive = Some(directive.to_string());
        self
    }

    pub fn with_constraint(mut self, directive: &str) -> Self {
        self.constraint_directive = Some(directive.to_string());
        self
    }
}

impl fmt::Display for FieldDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.embedded {
            write!(f, "..{}", self.ty)?;
        } else {
            write!(f, "{} {}", self.name, self.ty)?;
        }
        if let Some(d) = &self.copy_directive {
            write!(f, " copy:{:?}", d)?;
        }
        if let Some(d) = &self.constraint_directive {
            write!(f, " und:{:?}", d)?;
        }
        Ok(())
    }
}

/// The declared body of a [`TypeEntry`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TypeKind {
    Record { fields: Vec<FieldDef> },
    Alias { target: TypeRef },
    /// A named type whose underlying shape is a container (`type Ids []Id`).
    Container { shape: TypeRef },
}

/// Coarse classification of an entry, as reported to diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryKind {
    Record,
    Alias,
    Parametric,
    ContainerAlias,
}

/// A user-supplied capability a type may expose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    Clone,
    Validate,
    /// Plain projection (to/from the plain companion).
    Project,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Capability::Clone => "clone",
            Capability::Validate => "validate",
            Capability::Project => "project",
        };
        f.write_str(s)
    }
}

/// A capability method declared on a type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MethodDescriptor {
    pub name: String,
    pub capability: Capability,
}

/// One declared type of the universe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeEntry {
    pub name: QualifiedName,
    pub kind: TypeKind,
    #[serde(default)]
    pub type_params: Vec<String>,
    #[serde(default)]
    pub methods: Vec<MethodDescriptor>,
    /// Raw copy-channel directive attached to the type itself.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub copy_directive: Option<String>,
}

impl TypeEntry {
    fn with_kind(name: QualifiedName, kind: TypeKind) -> Self {
        TypeEntry {
            name,
            kind,
            type_params: Vec::new(),
            methods: Vec::new(),
            copy_directive: None,
        }
    }

    pub fn record(name: QualifiedName, fields: Vec<FieldDef>) -> Self {
        TypeEntry::with_kind(name, TypeKind::Record { fields })
    }

    pub fn alias(name: QualifiedName, target: TypeRef) -> Self {
        TypeEntry::with_kind(name, TypeKind::Alias { target })
    }

    pub fn container(name: QualifiedName, shape: TypeRef) -> Self {
        TypeEntry::with_kind(name, TypeKind::Container { shape })
    }

    pub fn with_params(mut self, params: &[&str]) -> Self {
        self.type_params = params.iter().map(|p| p.to_string()).collect();
        self
    }

    pub fn with_method(mut self, capability: Capability, name: &str) -> Self {
        self.methods.push(MethodDescriptor {
            name: name.to_string(),
            capability,
        });
        self
    }

    pub fn with_copy_directive(mut self, directive: &str) -> Self {
        self.copy_directive = Some(directive.to_string());
        self
    }

    pub fn entry_kind(&self) -> EntryKind {
        match &self.kind {
            TypeKind::Alias { .. } => EntryKind::Alias,
            TypeKind::Container { .. } => EntryKind::ContainerAlias,
            TypeKind::Record { .. } if !self.type_params.is_empty() => EntryKind::Parametric,
            TypeKind::Record { .. } => EntryKind::Record,
        }
    }

    /// Record fields in declaration order; empty for non-record entries.
    pub fn fields(&self) -> &[FieldDef] {
        match &self.kind {
            TypeKind::Record { fields } => fields,
            _ => &[],
        }
    }

    pub fn method(&self, capability: Capability) -> Option<&MethodDescriptor> {
        self.methods.iter().find(|m| m.capability == capability)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrapper_ranges() {
        assert!(WrapperKind::Option.admits(Presence::Defined));
        assert!(WrapperKind::Option.admits(Presence::Null));
        assert!(!WrapperKind::Option.admits(Presence::Undefined));
        assert!(WrapperKind::Und.admits(Presence::Undefined));
        assert!(WrapperKind::Elastic.admits(Presence::Null));
    }

    #[test]
    fn display_is_canonical_shape() {
        let ty = TypeRef::map(
            TypeRef::string(),
            TypeRef::seq(TypeRef::ptr(TypeRef::generic(
                "m",
                "Box",
                vec![TypeRef::int()],
            ))),
        );
        assert_eq!(ty.to_string(), "map[string][]*m.Box[int]");

        let lit = TypeRef::Literal(vec![
            FieldDef::new("a", TypeRef::int()),
            FieldDef::new("b", TypeRef::und(TypeRef::string())).with_constraint("required"),
        ]);
        assert_eq!(lit.to_string(), "struct{a int; b Und[string] und:\"required\"}");
    }

    #[test]
    fn length_carriers() {
        assert!(TypeRef::seq(TypeRef::int()).carries_length());
        assert!(TypeRef::elastic(TypeRef::int()).carries_length());
        assert!(TypeRef::und(TypeRef::seq(TypeRef::int())).carries_length());
        assert!(!TypeRef::und(TypeRef::int()).carries_length());
        assert!(!TypeRef::int().carries_length());
    }

    #[test]
    fn nullable_element_carriers() {
        assert!(TypeRef::elastic(TypeRef::int()).carries_nullable_elements());
        assert!(TypeRef::seq(TypeRef::option(TypeRef::int())).carries_nullable_elements());
        assert!(!TypeRef::seq(TypeRef::int()).carries_nullable_elements());
        assert!(TypeRef::und(TypeRef::array(TypeRef::und(TypeRef::int()), 3))
            .carries_nullable_elements());
    }

    #[test]
    fn entry_kinds() {
        let name = QualifiedName::new("m", "T");
        assert_eq!(
            TypeEntry::record(name.clone(), vec![]).entry_kind(),
            EntryKind::Record
        );
        assert_eq!(
            TypeEntry::record(name.clone(), vec![])
                .with_params(&["T"])
                .entry_kind(),
            EntryKind::Parametric
        );
        assert_eq!(
            TypeEntry::alias(name.clone(), TypeRef::int()).entry_kind(),
            EntryKind::Alias
        );
        assert_eq!(
            TypeEntry::container(name, TypeRef::seq(TypeRef::int())).entry_kind(),
            EntryKind::ContainerAlias
        );
    }

    #[test]
    fn method_lookup_by_capability() {
        let entry = TypeEntry::record(QualifiedName::new("m", "T"), vec![])
            .with_method(Capability::Clone, "CloneFunc")
            .with_method(Capability::Validate, "Validate");
        assert_eq!(entry.method(Capability::Clone).unwrap().name, "CloneFunc");
        assert!(entry.method(Capability::Project).is_none());
    }

    #[test]
    fn serde_roundtrip_entry() {
        let entry = TypeEntry::record(
            QualifiedName::new("m", "R"),
            vec![
                FieldDef::new("a", TypeRef::und(TypeRef::string())).with_constraint("required"),
                FieldDef::new("b", TypeRef::seq(TypeRef::param("T"))),
            ],
        )
        .with_params(&["T"]);
        let json = serde_json::to_string(&entry).unwrap();
        let back: TypeEntry = serde_json::from_str(&json).unwrap();
        assert_eq!(entry, back);
    }
}
