//! Path-level diff between two state trees

use crate::model::{Hash, NodeId, Path, Value};

/// Type of change in a diff
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DiffEntry {
    /// Path exists only in the new tree
    Added { path: Path, new_hash: Hash },
    /// Path exists only in the old tree
    Removed { path: Path, old_hash: Hash },
    /// Path exists in both with different content
    Modified {
        path: Path,
        old_hash: Hash,
        new_hash: Hash,
    },
}

impl DiffEntry {
    pub fn path(&self) -> &Path {
        match self {
            DiffEntry::Added { path, .. } => path,
            DiffEntry::Removed { path, .. } => path,
            DiffEntry::Modified { path, .. } => path,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            DiffEntry::Added { .. } => "added",
            DiffEntry::Removed { .. } => "removed",
            DiffEntry::Modified { .. } => "modified",
        }
    }
}

/// A diff between two trees
#[derive(Clone, Debug, Default)]
pub struct Diff {
    pub entries: Vec<DiffEntry>,
}

impl Diff {
    pub fn new(entries: Vec<DiffEntry>) -> Self {
        Diff { entries }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn added_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| matches!(e, DiffEntry::Added { .. }))
            .count()
    }

    pub fn removed_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| matches!(e, DiffEntry::Removed { .. }))
            .count()
    }

    pub fn modified_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| matches!(e, DiffEntry::Modified { .. }))
            .count()
    }

    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        self.entries.iter().map(DiffEntry::path)
    }

    /// Whether anything at or below `path` changed
    pub fn touches(&self, path: &Path) -> bool {
        self.paths().any(|p| p.starts_with(path))
    }
}

/// Compute the diff between two trees
///
/// Entries sit at the deepest level where the trees differ. Subtrees that
/// are the same handle are skipped without being walked, which makes diffing
/// a reconciled result against its `previous` proportional to what changed.
/// Mapping entries follow `new`'s key order, then keys only in `old`.
pub fn diff_values(old: &Value, new: &Value) -> Diff {
    let mut entries = Vec::new();
    let mut path = Path::root();
    let mut visiting = Vec::new();
    diff_subtree(old, new, &mut path, &mut visiting, &mut entries);
    Diff::new(entries)
}

fn diff_subtree(
    old: &Value,
    new: &Value,
    path: &mut Path,
    visiting: &mut Vec<(NodeId, NodeId)>,
    entries: &mut Vec<DiffEntry>,
) {
    if old.is_same(new) {
        return;
    }

    match (old, new) {
        (Value::Mapping(old_map), Value::Mapping(new_map)) => {
            let pair = (old_map.id(), new_map.id());
            if visiting.contains(&pair) {
                return;
            }
            visiting.push(pair);
            let old_entries = old_map.read();
            let new_entries = new_map.read();
            for (key, new_item) in new_entries.iter() {
                path.push(key.as_str());
                match old_entries.get(key) {
                    Some(old_item) => diff_subtree(old_item, new_item, path, visiting, entries),
                    None => entries.push(DiffEntry::Added {
                        path: path.clone(),
                        new_hash: new_item.fingerprint(),
                    }),
                }
                path.pop();
            }
            for (key, old_item) in old_entries.iter() {
                if !new_entries.contains_key(key) {
                    entries.push(DiffEntry::Removed {
                        path: path.child(key.as_str()),
                        old_hash: old_item.fingerprint(),
                    });
                }
            }
            visiting.pop();
        }
        (Value::Sequence(old_seq), Value::Sequence(new_seq)) => {
            let pair = (old_seq.id(), new_seq.id());
            if visiting.contains(&pair) {
                return;
            }
            visiting.push(pair);
            let old_items = old_seq.read();
            let new_items = new_seq.read();
            for (index, new_item) in new_items.iter().enumerate() {
                path.push(index);
                match old_items.get(index) {
                    Some(old_item) => diff_subtree(old_item, new_item, path, visiting, entries),
                    None => entries.push(DiffEntry::Added {
                        path: path.clone(),
                        new_hash: new_item.fingerprint(),
                    }),
                }
                path.pop();
            }
            for (index, old_item) in old_items.iter().enumerate().skip(new_items.len()) {
                entries.push(DiffEntry::Removed {
                    path: path.child(index),
                    old_hash: old_item.fingerprint(),
                });
            }
            visiting.pop();
        }
        _ => {
            if old != new {
                entries.push(DiffEntry::Modified {
                    path: path.clone(),
                    old_hash: old.fingerprint(),
                    new_hash: new.fingerprint(),
                });
            }
        }
    }
}
