//! Operations over state trees: reconcile and diff

mod diff;
mod reconcile;

pub use diff::{diff_values, Diff, DiffEntry};
pub use reconcile::{
    reconcile, ReconcileOptions, ReconcileStats, Reconciler, Reconciliation, DEFAULT_MAX_DEPTH,
};
