//! Core data model: values, paths and fingerprints

mod hash;
mod path;
mod value;

pub use hash::Hash;
pub use path::{Path, PathSegment};
pub use value::{Mapping, NodeId, Opaque, Sequence, Value, ValueKind};
