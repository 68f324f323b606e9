//! Type graph nodes.
//!
//! Named entries get nominal nodes; anonymous literal records get
//! structural nodes keyed by their canonical shape, so two occurrences of the
//! same literal share one node. Aliases do not get nodes of their own: they
//! add a name to the node they resolve to.

use serde::{Deserialize, Serialize};

use crate::directive::Annotation;
use crate::id::QualifiedName;
use crate::types::{Capability, FieldDef, MethodDescriptor, TypeRef};

/// Identity of a node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeKey {
    Named(QualifiedName),
    /// Canonical shape string of an anonymous literal record.
    Literal(String),
}

/// What a node is made of.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeShape {
    Record(Vec<FieldDef>),
    /// Named container type; the shape is walked as a single unnamed field.
    Container(TypeRef),
}

/// A node of the type graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypeNode {
    pub key: NodeKey,
    /// Canonical name first, then alias names in resolution order.
    pub names: Vec<QualifiedName>,
    pub type_params: Vec<String>,
    pub shape: NodeShape,
    pub methods: Vec<MethodDescriptor>,
    /// Type-level annotation.
    pub annotation: Annotation,
}

impl TypeNode {
    /// Canonical name; `None` for literal nodes.
    pub fn name(&self) -> Option<&QualifiedName> {
        match &self.key {
            NodeKey::Named(name) => Some(name),
            NodeKey::Literal(_) => None,
        }
    }

    pub fn is_literal(&self) -> bool {
        matches!(self.key, NodeKey::Literal(_))
    }

    pub fn method(&self, capability: Capability) -> Option<&MethodDescriptor> {
        self.methods.iter().find(|m| m.capability == capability)
    }

    /// Fields in declaration order. A container node yields one pseudo field
    /// with an empty name.
    pub fn fields(&self) -> Vec<FieldDef> {
        match &self.shape {
            NodeShape::Record(fields) => fields.clone(),
            NodeShape::Container(shape) => vec![FieldDef::new("", shape.clone())],
        }
    }

    /// Human-readable label for diagnostics.
    pub fn label(&self) -> String {
        match &self.key {
            NodeKey::Named(name) => name.to_string(),
            NodeKey::Literal(shape) => shape.clone(),
        }
    }
}
