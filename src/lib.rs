//! # state_tree
//!
//! Identity-preserving reconciliation of schema-less state trees.
//!
//! Given the previous and the next snapshot of a JSON-like tree,
//! [`reconcile`] returns a tree equal to the next one that reuses every
//! subtree of the previous one that did not change. Consumers memoizing on
//! identity (UI components, caches) then only see work where content moved.
//!
//! ## Core Concepts
//!
//! - **Values**: nulls, booleans, numbers, strings, sequences and mappings.
//!   Containers are shared handles, so identity is observable.
//! - **Reconciler**: the structural merge, with cycle and depth guards
//! - **StateStore**: keeps the last emitted state and notifies on change
//! - **Diff**: which paths differ between two trees
//!
//! ## Example
//!
//! ```
//! use serde_json::json;
//! use state_tree::{reconcile, Value};
//!
//! let previous = Value::from(json!({"title": "a", "tags": ["x", "y"]}));
//! let next = Value::from(json!({"title": "b", "tags": ["x", "y"]}));
//!
//! let merged = reconcile(&previous, &next);
//! assert_eq!(merged, next);
//! assert!(merged.get("tags").unwrap().is_same(&previous.get("tags").unwrap()));
//! ```

pub mod config;
pub mod model;
pub mod ops;
pub mod store;

mod error;

pub use config::Config;
pub use error::{Error, Result};
pub use model::{Hash, Mapping, NodeId, Opaque, Path, PathSegment, Sequence, Value, ValueKind};
pub use ops::{
    diff_values, reconcile, Diff, DiffEntry, ReconcileOptions, ReconcileStats, Reconciler,
    Reconciliation,
};
pub use store::{StateStore, SubscriptionId};
