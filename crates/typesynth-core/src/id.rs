//! Identity types for the type universe and the type graph.
//!
//! [`QualifiedName`] is the nominal identity of a declared type
//! (package qualifier + name). [`NodeId`] is a stable newtype over the
//! petgraph node index of a [`crate::graph::TypeGraph`] node, so a node
//! handle cannot be confused with an edge index or a plain integer.

use std::fmt;

use petgraph::graph::NodeIndex;
use serde::{Deserialize, Serialize};

/// Stable node identifier. Maps to a petgraph `NodeIndex<u32>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub u32);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// Bridge between NodeId and petgraph's NodeIndex<u32>.

impl From<NodeIndex<u32>> for NodeId {
    fn from(idx: NodeIndex<u32>) -> Self {
        NodeId(idx.index() as u32)
    }
}

impl From<NodeId> for NodeIndex<u32> {
    fn from(id: NodeId) -> Self {
        NodeIndex::new(id.0 as usize)
    }
}

/// Nominal identity of a declared type: package qualifier plus name.
///
/// An empty package denotes the universe's root package and displays as the
/// bare name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct QualifiedName {
    pub package: String,
    pub name: String,
}

impl QualifiedName {
    pub fn new(package: impl Into<String>, name: impl Into<String>) -> Self {
        QualifiedName {
            package: package.into(),
            name: name.into(),
        }
    }

    /// Parses `pkg.Name` (split at the last `.`); a string without a dot
    /// lands in the root package.
    pub fn parse(s: &str) -> Self {
        match s.rsplit_once('.') {
            Some((package, name)) => QualifiedName::new(package, name),
            None => QualifiedName::new("", s),
        }
    }

    /// Returns a sibling name in the same package with `suffix` appended,
    /// used for companion types (`FooPlain`, `FooPatch`).
    pub fn with_suffix(&self, suffix: &str) -> Self {
        QualifiedName::new(self.package.clone(), format!("{}{}", self.name, suffix))
    }
}

impl fmt::Display for QualifiedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.package.is_empty() {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{}.{}", self.package, self.name)
        }
    }
}

/// A dotted field path used in diagnostics, rooted at the synthesis root
/// type (`pkg.Root.field.sub`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FieldPath(Vec<String>);

impl FieldPath {
    pub fn root(name: &QualifiedName) -> Self {
        FieldPath(vec![name.to_string()])
    }

    /// Returns a new path with `segment` appended.
    pub fn child(&self, segment: impl Into<String>) -> Self {
        let mut segments = self.0.clone();
        segments.push(segment.into());
        FieldPath(segments)
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join("."))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_id_to_node_index_roundtrip() {
        let idx = NodeIndex::<u32>::new(42);
        let node_id = NodeId::from(idx);
        assert_eq!(node_id.0, 42);

        let back: NodeIndex<u32> = node_id.into();
        assert_eq!(back.index(), 42);
    }

    #[test]
    fn node_id_display() {
        assert_eq!(format!("{}", NodeId(7)), "7");
    }

    #[test]
    fn qualified_name_display() {
        assert_eq!(QualifiedName::new("model", "User").to_string(), "model.User");
        assert_eq!(QualifiedName::new("", "User").to_string(), "User");
    }

    #[test]
    fn qualified_name_parse_splits_at_last_dot() {
        let name = QualifiedName::parse("github.com/acme/model.User");
        assert_eq!(name.package, "github.com/acme/model");
        assert_eq!(name.name, "User");

        let bare = QualifiedName::parse("User");
        assert_eq!(bare.package, "");
        assert_eq!(bare.name, "User");
    }

    #[test]
    fn with_suffix_keeps_package() {
        let plain = QualifiedName::new("model", "User").with_suffix("Plain");
        assert_eq!(plain, QualifiedName::new("model", "UserPlain"));
    }

    #[test]
    fn field_path_child_does_not_mutate_parent() {
        let root = FieldPath::root(&QualifiedName::new("m", "R"));
        let child = root.child("items");
        assert_eq!(root.to_string(), "m.R");
        assert_eq!(child.to_string(), "m.R.items");
        assert_eq!(child.segments().len(), 2);
    }

    #[test]
    fn serde_roundtrip() {
        let name = QualifiedName::new("m", "R");
        let json = serde_json::to_string(&name).unwrap();
        let back: QualifiedName = serde_json::from_str(&json).unwrap();
        assert_eq!(name, back);
    }
}
