//! Identity-preserving reconciliation of two state trees
//!
//! Walks `next` depth-first and compares it against `previous`. Wherever a
//! subtree of `previous` is deeply equal to the corresponding subtree of
//! `next`, the result holds the `previous` handle itself rather than an
//! equal copy, so consumers that memoize on identity see no change there.
//!
//! The walk keeps the set of containers on the current path of `next`. A
//! child that is already on that path (a back-reference) stops reuse for
//! its parent, which is then returned as `next` verbatim.

use crate::model::{Mapping, NodeId, Sequence, Value};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Default recursion limit
pub const DEFAULT_MAX_DEPTH: usize = 512;

/// Tuning for a [`Reconciler`]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcileOptions {
    /// Deepest level that is merged. Below it `next` is taken as-is.
    /// `None` removes the limit.
    pub max_depth: Option<usize>,
}

impl Default for ReconcileOptions {
    fn default() -> Self {
        ReconcileOptions {
            max_depth: Some(DEFAULT_MAX_DEPTH),
        }
    }
}

/// How a reconciliation went
///
/// Every visited node lands in exactly one bucket.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileStats {
    /// Nodes answered with the `previous` handle
    pub reused: usize,
    /// Containers freshly allocated because something below changed
    pub rebuilt: usize,
    /// Nodes answered with `next` (null boundary, kind change, new primitive)
    pub replaced: usize,
    /// Containers given up on because a child pointed back up the path
    pub cycles: usize,
    /// Subtrees taken from `next` because the depth limit was reached
    pub depth_limited: usize,
}

impl ReconcileStats {
    /// Total number of nodes visited
    pub fn visited(&self) -> usize {
        self.reused + self.rebuilt + self.replaced + self.cycles + self.depth_limited
    }
}

/// Result of [`Reconciler::reconcile_with_stats`]
#[derive(Clone, Debug)]
pub struct Reconciliation {
    pub value: Value,
    pub stats: ReconcileStats,
}

/// Reconciles state snapshots
///
/// Stateless between calls; one instance can serve any number of threads.
#[derive(Clone, Debug, Default)]
pub struct Reconciler {
    options: ReconcileOptions,
}

impl Reconciler {
    /// Create a reconciler with the given options
    pub fn new(options: ReconcileOptions) -> Self {
        Reconciler { options }
    }

    /// The options this reconciler was built with
    pub fn options(&self) -> &ReconcileOptions {
        &self.options
    }

    /// Merge `next` onto `previous`, keeping `previous` handles where equal
    ///
    /// The result is deeply equal to `next`. Neither input is modified.
    pub fn reconcile(&self, previous: &Value, next: &Value) -> Value {
        self.reconcile_with_stats(previous, next).value
    }

    /// Like [`reconcile`](Self::reconcile), also reporting what happened
    pub fn reconcile_with_stats(&self, previous: &Value, next: &Value) -> Reconciliation {
        let mut pass = Pass {
            options: &self.options,
            ancestors: HashSet::new(),
            stats: ReconcileStats::default(),
        };
        let value = pass.visit(Some(previous), next, 0);
        tracing::debug!(
            reused = pass.stats.reused,
            rebuilt = pass.stats.rebuilt,
            replaced = pass.stats.replaced,
            cycles = pass.stats.cycles,
            depth_limited = pass.stats.depth_limited,
            "reconciled state tree"
        );
        Reconciliation {
            value,
            stats: pass.stats,
        }
    }
}

/// Reconcile with default options
pub fn reconcile(previous: &Value, next: &Value) -> Value {
    Reconciler::default().reconcile(previous, next)
}

/// One top-level call. `ancestors` holds the containers of `next` on the
/// path from the root to the node being visited.
struct Pass<'a> {
    options: &'a ReconcileOptions,
    ancestors: HashSet<NodeId>,
    stats: ReconcileStats,
}

impl Pass<'_> {
    fn visit(&mut self, previous: Option<&Value>, next: &Value, depth: usize) -> Value {
        let previous = match previous {
            Some(previous) if previous.is_same(next) => {
                self.stats.reused += 1;
                return previous.clone();
            }
            Some(previous) if !previous.is_null() => previous,
            _ => return self.replace(next),
        };

        if self.options.max_depth.is_some_and(|max| depth > max) {
            tracing::trace!(depth, "depth limit reached, taking next as-is");
            self.stats.depth_limited += 1;
            return next.clone();
        }

        match (previous, next) {
            (_, Value::Null) => self.replace(next),
            (Value::Sequence(prev), Value::Sequence(seq)) => {
                let id = seq.id();
                self.ancestors.insert(id);
                let merged = self.visit_sequence(prev, seq, depth);
                self.ancestors.remove(&id);
                merged
            }
            (Value::Mapping(prev), Value::Mapping(map)) => {
                let id = map.id();
                self.ancestors.insert(id);
                let merged = self.visit_mapping(prev, map, depth);
                self.ancestors.remove(&id);
                merged
            }
            // Kind changed, or a primitive/opaque leaf that differs.
            _ => self.replace(next),
        }
    }

    fn visit_sequence(&mut self, prev: &Sequence, seq: &Sequence, depth: usize) -> Value {
        let prev_items = prev.read();
        let next_items = seq.read();

        let mut all_equal = prev_items.len() == next_items.len();
        let mut result = Vec::with_capacity(next_items.len());
        for (index, item) in next_items.iter().enumerate() {
            if self.points_back(item) {
                tracing::trace!(index, "back-reference in sequence, taking next as-is");
                self.stats.cycles += 1;
                return Value::Sequence(seq.clone());
            }
            let prev_item = prev_items.get(index);
            let merged = self.visit(prev_item, item, depth + 1);
            if !prev_item.is_some_and(|p| merged.is_same(p)) {
                all_equal = false;
            }
            result.push(merged);
        }

        if all_equal {
            self.stats.reused += 1;
            Value::Sequence(prev.clone())
        } else {
            self.stats.rebuilt += 1;
            Value::Sequence(Sequence::new(result))
        }
    }

    fn visit_mapping(&mut self, prev: &Mapping, map: &Mapping, depth: usize) -> Value {
        let prev_entries = prev.read();
        let next_entries = map.read();

        // Every key of `next` matching plus equal sizes means no key of
        // `previous` was dropped.
        let mut all_equal = prev_entries.len() == next_entries.len();
        let mut result = IndexMap::with_capacity(next_entries.len());
        for (key, item) in next_entries.iter() {
            if self.points_back(item) {
                tracing::trace!(key = key.as_str(), "back-reference in mapping, taking next as-is");
                self.stats.cycles += 1;
                return Value::Mapping(map.clone());
            }
            let prev_item = prev_entries.get(key);
            let merged = self.visit(prev_item, item, depth + 1);
            if !prev_item.is_some_and(|p| merged.is_same(p)) {
                all_equal = false;
            }
            result.insert(key.clone(), merged);
        }

        if all_equal {
            self.stats.reused += 1;
            Value::Mapping(prev.clone())
        } else {
            self.stats.rebuilt += 1;
            Value::Mapping(Mapping::new(result))
        }
    }

    fn points_back(&self, item: &Value) -> bool {
        item.container_id()
            .is_some_and(|id| self.ancestors.contains(&id))
    }

    fn replace(&mut self, next: &Value) -> Value {
        self.stats.replaced += 1;
        next.clone()
    }
}
