pub mod directive;
pub mod edge;
pub mod error;
pub mod graph;
pub mod id;
pub mod node;
pub mod types;
pub mod universe;

// Re-export commonly used types
pub use directive::{Annotation, AnnotationError, Constraint, LenOp, LenRelation, PresenceSet};
pub use edge::{Edge, EdgeKind};
pub use error::{CoreError, ErrorCategory, FailureLog, SynthError};
pub use graph::{GraphBuild, Target, TypeGraph};
pub use id::{FieldPath, NodeId, QualifiedName};
pub use node::{NodeKey, NodeShape, TypeNode};
pub use types::{
    Capability, EntryKind, FieldDef, MethodDescriptor, Presence, ScalarType, TypeEntry, TypeKind,
    TypeRef, WrapperKind,
};
pub use universe::{PackageLoader, StaticPackage, Universe, UniverseBuilder};
