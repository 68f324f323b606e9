//! Edge types for the type graph.
//!
//! An [`Edge`] records that one node reaches another through a field. The
//! `path` keeps every container/pointer hop between the field and the
//! target, so the cycle resolver can tell a by-value embedding apart from a
//! reference that is broken by an indirection.

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

/// How a field reaches its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EdgeKind {
    /// The field's type is the target, by value.
    Direct,
    SequenceElem,
    MapKey,
    MapValue,
    ArrayElem,
    Pointer,
    /// Embedded (inlined) composition.
    Inlined,
}

impl EdgeKind {
    /// Whether a hop of this kind goes through a reference, which makes any
    /// cycle over it finite at runtime.
    pub fn is_indirection(self) -> bool {
        matches!(
            self,
            EdgeKind::SequenceElem | EdgeKind::MapKey | EdgeKind::MapValue | EdgeKind::Pointer
        )
    }
}

/// A derived dependency between two type nodes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    /// First hop of `path`, or `Direct`/`Inlined` for an empty path.
    pub kind: EdgeKind,
    /// Originating field name; empty for container edges.
    pub field: String,
    pub path: SmallVec<[EdgeKind; 4]>,
    /// Set when the edge was reached through the i-th type argument of a
    /// parametric type rather than through the field's own shape.
    pub type_arg: Option<u16>,
}

impl Edge {
    pub fn new(field: &str, path: SmallVec<[EdgeKind; 4]>, embedded: bool) -> Self {
        let kind = path.first().copied().unwrap_or(if embedded {
            EdgeKind::Inlined
        } else {
            EdgeKind::Direct
        });
        Edge {
            kind,
            field: field.to_string(),
            path,
            type_arg: None,
        }
    }

    pub fn through_type_arg(mut self, index: u16) -> Self {
        self.type_arg = Some(index);
        self
    }

    /// Returns `true` if any hop is a pointer or container reference.
    pub fn is_indirect(&self) -> bool {
        self.path.iter().any(|k| k.is_indirection())
    }
}
