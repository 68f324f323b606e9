//! Directive parsing: turns raw annotation strings into [`Annotation`]s.
//!
//! Two independent channels are parsed here:
//!
//! - the copy channel (`ignore` / `-`, `nocopy`, `method`) on types and
//!   fields;
//! - the constraint channel on fields: presence states (`required`, `def`,
//!   `null`, `und`, `nullish`), a length relation (`len>=1`), and an element
//!   constraint (`values:nonnull`).
//!
//! Parsing also checks the directive against the field's declared type, so
//! classification never sees a constraint the field cannot carry.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::{FieldDef, Presence, TypeEntry, TypeRef};

/// Errors produced while parsing a directive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum AnnotationError {
    #[error("unknown directive token '{token}'")]
    UnknownToken { token: String },

    #[error("directive declares no constraint")]
    Empty,

    #[error("invalid length operator in '{token}', expected one of ==, >, >=, <, <=")]
    BadLengthOperator { token: String },

    #[error("invalid length bound in '{token}'")]
    BadLengthBound { token: String },

    #[error("length relation declared more than once")]
    DuplicateLength,

    #[error("presence states require an optionality wrapper, found {ty}")]
    PresenceOnNonWrapper { ty: String },

    #[error("length relation requires a sequence, map or array, found {ty}")]
    LengthOnNonContainer { ty: String },

    #[error("values:nonnull requires nullable elements, found {ty}")]
    NonNullOnPlainElements { ty: String },

    #[error("'ignore' cannot be combined with other copy directives")]
    IgnoreCombined,
}

/// Length comparison operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LenOp {
    Eq,
    Gt,
    Ge,
    Lt,
    Le,
}

impl LenOp {
    pub fn as_str(self) -> &'static str {
        match self {
            LenOp::Eq => "==",
            LenOp::Gt => ">",
            LenOp::Ge => ">=",
            LenOp::Lt => "<",
            LenOp::Le => "<=",
        }
    }
}

/// `len <op> bound`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LenRelation {
    pub op: LenOp,
    pub bound: usize,
}

impl LenRelation {
    pub fn holds(&self, len: usize) -> bool {
        match self.op {
            LenOp::Eq => len == self.bound,
            LenOp::Gt => len > self.bound,
            LenOp::Ge => len >= self.bound,
            LenOp::Lt => len < self.bound,
            LenOp::Le => len <= self.bound,
        }
    }
}

impl fmt::Display for LenRelation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "len{}{}", self.op.as_str(), self.bound)
    }
}

/// Allowed presence states. The flags are independent; `nullish` admits
/// whichever absent states the wrapper can represent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PresenceSet {
    pub required: bool,
    pub def: bool,
    pub null: bool,
    pub und: bool,
    pub nullish: bool,
}

impl PresenceSet {
    pub fn is_empty(&self) -> bool {
        !(self.required || self.def || self.null || self.und || self.nullish)
    }

    pub fn allows(&self, state: Presence) -> bool {
        match state {
            Presence::Defined => self.required || self.def,
            Presence::Null => self.null || self.nullish,
            Presence::Undefined => self.und || self.nullish,
        }
    }
}

/// Parsed constraint-channel directive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Constraint {
    /// `None` when the directive names no presence state (all states allowed).
    pub states: Option<PresenceSet>,
    pub len: Option<LenRelation>,
    pub values_non_null: bool,
}

impl Constraint {
    pub fn allows(&self, state: Presence) -> bool {
        self.states.map_or(true, |s| s.allows(state))
    }
}

/// Structured annotation attached to a type or field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Annotation {
    /// Excluded from all synthesis.
    pub ignore: bool,
    /// Deep copy shares the reference instead of recursing.
    pub passthrough: bool,
    /// Deep copy must delegate to a user-supplied method.
    pub required_capability: bool,
    pub constraint: Option<Constraint>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct CopyFlags {
    ignore: bool,
    passthrough: bool,
    required_capability: bool,
}

fn tokens(raw: &str) -> impl Iterator<Item = &str> {
    raw.split(',').map(str::trim).filter(|t| !t.is_empty())
}

fn parse_copy_channel(raw: &str) -> Result<CopyFlags, AnnotationError> {
    let mut flags = CopyFlags::default();
    for token in tokens(raw) {
        match token {
            "ignore" | "-" => flags.ignore = true,
            "nocopy" => flags.passthrough = true,
            "method" => flags.required_capability = true,
            other => {
                return Err(AnnotationError::UnknownToken {
                    token: other.to_string(),
                })
            }
        }
    }
    if flags.ignore && (flags.passthrough || flags.required_capability) {
        return Err(AnnotationError::IgnoreCombined);
    }
    Ok(flags)
}

fn parse_len(token: &str) -> Result<LenRelation, AnnotationError> {
    let rest = &token["len".len()..];
    // Two-character operators must be tried first.
    let (op, bound) = if let Some(b) = rest.strip_prefix("==") {
        (LenOp::Eq, b)
    } else if let Some(b) = rest.strip_prefix(">=") {
        (LenOp::Ge, b)
    } else if let Some(b) = rest.strip_prefix("<=") {
        (LenOp::Le, b)
    } else if let Some(b) = rest.strip_prefix('>') {
        (LenOp::Gt, b)
    } else if let Some(b) = rest.strip_prefix('<') {
        (LenOp::Lt, b)
    } else {
        return Err(AnnotationError::BadLengthOperator {
            token: token.to_string(),
        });
    };
    let bound = bound
        .trim()
        .parse::<usize>()
        .map_err(|_| AnnotationError::BadLengthBound {
            token: token.to_string(),
        })?;
    Ok(LenRelation { op, bound })
}

/// Parses a constraint-channel directive without looking at the field type.
pub fn parse_constraint(raw: &str) -> Result<Constraint, AnnotationError> {
    let mut states = PresenceSet::default();
    let mut constraint = Constraint::default();
    let mut any = false;

    for token in tokens(raw) {
        any = true;
        match token {
            "required" => states.required = true,
            "def" => states.def = true,
            "null" => states.null = true,
            "und" => states.und = true,
            "nullish" => states.nullish = true,
            "values:nonnull" => constraint.values_non_null = true,
            t if t.starts_with("len") => {
                if constraint.len.is_some() {
                    return Err(AnnotationError::DuplicateLength);
                }
                constraint.len = Some(parse_len(t)?);
            }
            other => {
                return Err(AnnotationError::UnknownToken {
                    token: other.to_string(),
                })
            }
        }
    }

    if !any {
        return Err(AnnotationError::Empty);
    }
    if !states.is_empty() {
        constraint.states = Some(states);
    }
    Ok(constraint)
}

/// Checks that `ty` can structurally carry `constraint`.
pub fn check_carrier(constraint: &Constraint, ty: &TypeRef) -> Result<(), AnnotationError> {
    if constraint.states.is_some() && ty.wrapper_kind().is_none() {
        return Err(AnnotationError::PresenceOnNonWrapper { ty: ty.to_string() });
    }
    if constraint.len.is_some() && !ty.carries_length() {
        return Err(AnnotationError::LengthOnNonContainer { ty: ty.to_string() });
    }
    if constraint.values_non_null && !ty.carries_nullable_elements() {
        return Err(AnnotationError::NonNullOnPlainElements { ty: ty.to_string() });
    }
    Ok(())
}

/// Parses both channels of a field directive and validates them against the
/// field's declared type.
pub fn parse_field_annotation(field: &FieldDef) -> Result<Annotation, AnnotationError> {
    let flags = match &field.copy_directive {
        Some(raw) => parse_copy_channel(raw)?,
        None => CopyFlags::default(),
    };
    let constraint = match &field.constraint_directive {
        Some(raw) => {
            let c = parse_constraint(raw)?;
            check_carrier(&c, &field.ty)?;
            Some(c)
        }
        None => None,
    };
    Ok(Annotation {
        ignore: flags.ignore,
        passthrough: flags.passthrough,
        required_capability: flags.required_capability,
        constraint,
    })
}

/// Parses the copy-channel directive attached to a type.
pub fn parse_type_annotation(entry: &TypeEntry) -> Result<Annotation, AnnotationError> {
    let flags = match &entry.copy_directive {
        Some(raw) => parse_copy_channel(raw)?,
        None => CopyFlags::default(),
    };
    Ok(Annotation {
        ignore: flags.ignore,
        passthrough: flags.passthrough,
        required_capability: flags.required_capability,
        constraint: None,
    })
}
