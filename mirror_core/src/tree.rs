//! Persistent index of the mirrored tree.
//!
//! A [`TreeIndex`] is an immutable snapshot. [`TreeIndex::insert`] returns a
//! new snapshot that shares every untouched subtree with the old one, so
//! snapshots are cheap to clone and safe to publish across tasks.

use crate::{Depth, EntryKind, Meta, path};
use std::{collections::BTreeMap, sync::Arc};

type Children = Arc<BTreeMap<String, TreeNode>>;

/// One node of the tree: a blob leaf or a subtree.
///
/// Tree-kind metadata lives on the subtree it describes, so a path is
/// never a leaf and a subtree at the same time.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TreeNode {
    Leaf(Meta),
    Dir {
        meta: Option<Meta>,
        children: Children,
    },
}

impl TreeNode {
    fn empty_dir(meta: Option<Meta>) -> Self {
        TreeNode::Dir {
            meta,
            children: Children::default(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TreeIndex {
    root: Children,
}

impl TreeIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `meta` at `meta.path`, creating intermediate subtrees.
    ///
    /// Inserting a `Meta` equal to the stored one returns a snapshot that
    /// shares the receiver's root (see [`TreeIndex::ptr_eq`]).
    pub fn insert(&self, meta: Meta) -> TreeIndex {
        let parts: Vec<String> = path::segments(&meta.path).map(str::to_owned).collect();
        if parts.is_empty() {
            return self.clone();
        }
        match insert_at(&self.root, &parts, meta) {
            Some(root) => TreeIndex { root },
            None => self.clone(),
        }
    }

    /// True when both snapshots share the same root allocation.
    pub fn ptr_eq(&self, other: &TreeIndex) -> bool {
        Arc::ptr_eq(&self.root, &other.root)
    }

    /// Top-level entries of the snapshot.
    pub fn root_children(&self) -> &BTreeMap<String, TreeNode> {
        &self.root
    }

    pub fn get_node(&self, path: &str) -> Option<&TreeNode> {
        let mut parts = path::segments(path);
        let first = parts.next()?;
        let mut node = self.root.get(first)?;
        for part in parts {
            match node {
                TreeNode::Dir { children, .. } => node = children.get(part)?,
                TreeNode::Leaf(_) => return None,
            }
        }
        Some(node)
    }

    /// Blob metadata at `path`; `None` when absent or when `path` is a subtree.
    pub fn get_meta(&self, path: &str) -> Option<&Meta> {
        match self.get_node(path)? {
            TreeNode::Leaf(meta) => Some(meta),
            TreeNode::Dir { .. } => None,
        }
    }

    /// Tree metadata recorded for the subtree at `path`, if any.
    pub fn tree_meta(&self, path: &str) -> Option<&Meta> {
        match self.get_node(path)? {
            TreeNode::Dir { meta, .. } => meta.as_ref(),
            TreeNode::Leaf(_) => None,
        }
    }

    /// All leaves at or below `path` within `depth` levels.
    ///
    /// `Depth::Limited(0)` lists direct children only. Entries come out in
    /// lexicographic order of their path segments.
    pub fn list_entries(&self, path: &str, depth: Depth) -> Vec<Meta> {
        let mut out = Vec::new();
        let start = if path::segments(path).next().is_none() {
            Some(&self.root)
        } else {
            match self.get_node(path) {
                Some(TreeNode::Dir { children, .. }) => Some(children),
                _ => None,
            }
        };
        if let Some(children) = start {
            collect_leaves(children, depth, &mut out);
        }
        out
    }

    /// Number of blob entries in the snapshot. Tree metas are not counted.
    pub fn len(&self) -> usize {
        count_leaves(&self.root)
    }

    /// `true` when the snapshot holds no blob entries, even if it already
    /// knows some subtrees.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn insert_at(children: &Children, parts: &[String], meta: Meta) -> Option<Children> {
    let (head, rest) = parts.split_first()?;
    let existing = children.get(head);

    let node = if rest.is_empty() {
        match (meta.kind, existing) {
            (EntryKind::Blob, Some(TreeNode::Leaf(current))) if *current == meta => return None,
            (EntryKind::Blob, _) => TreeNode::Leaf(meta),
            (EntryKind::Tree, Some(TreeNode::Dir { meta: current, children })) => {
                if current.as_ref() == Some(&meta) {
                    return None;
                }
                TreeNode::Dir {
                    meta: Some(meta),
                    children: children.clone(),
                }
            }
            (EntryKind::Tree, _) => TreeNode::empty_dir(Some(meta)),
        }
    } else {
        let (dir_meta, grandchildren) = match existing {
            Some(TreeNode::Dir { meta, children }) => (meta.clone(), children.clone()),
            // a leaf on the way down was replaced by a newer subtree revision
            _ => (None, Children::default()),
        };
        let grandchildren = insert_at(&grandchildren, rest, meta)?;
        TreeNode::Dir {
            meta: dir_meta,
            children: grandchildren,
        }
    };

    let mut next = BTreeMap::clone(children);
    next.insert(head.clone(), node);
    Some(Arc::new(next))
}

fn count_leaves(children: &Children) -> usize {
    children
        .values()
        .map(|node| match node {
            TreeNode::Leaf(_) => 1,
            TreeNode::Dir { children, .. } => count_leaves(children),
        })
        .sum()
}

fn collect_leaves(children: &Children, depth: Depth, out: &mut Vec<Meta>) {
    for node in children.values() {
        match node {
            TreeNode::Leaf(meta) => out.push(meta.clone()),
            TreeNode::Dir { children, .. } => {
                if let Some(next) = depth.descend() {
                    collect_leaves(children, next, out);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paths(metas: &[Meta]) -> Vec<&str> {
        metas.iter().map(|m| m.path.as_str()).collect()
    }

    #[test]
    fn insert_creates_intermediate_subtrees() {
        let index = TreeIndex::new().insert(Meta::blob("a/b/c.txt", "h1"));
        assert_eq!(index.get_meta("a/b/c.txt").unwrap().hash.as_str(), "h1");
        assert!(matches!(index.get_node("a/b"), Some(TreeNode::Dir { meta: None, .. })));
        // subtrees are not leaves
        assert!(index.get_meta("a/b").is_none());
        assert!(index.get_meta("a/b/c.txt/d").is_none());
    }

    #[test]
    fn insert_is_persistent() {
        let before = TreeIndex::new().insert(Meta::blob("x", "h1"));
        let after = before.insert(Meta::blob("x", "h2"));
        assert_eq!(before.get_meta("x").unwrap().hash.as_str(), "h1");
        assert_eq!(after.get_meta("x").unwrap().hash.as_str(), "h2");
    }

    #[test]
    fn identical_insert_is_idempotent() {
        let once = TreeIndex::new()
            .insert(Meta::tree("a", "t1"))
            .insert(Meta::blob("a/f", "h1"));
        let twice = once.insert(Meta::blob("a/f", "h1"));
        assert_eq!(once, twice);
        assert!(once.ptr_eq(&twice));
        assert!(once.ptr_eq(&once.insert(Meta::tree("a", "t1"))));
    }

    #[test]
    fn untouched_subtrees_are_shared() {
        let base = TreeIndex::new()
            .insert(Meta::blob("left/f", "h1"))
            .insert(Meta::blob("right/g", "h2"));
        let next = base.insert(Meta::blob("right/g", "h3"));
        let (Some(TreeNode::Dir { children: a, .. }), Some(TreeNode::Dir { children: b, .. })) =
            (base.get_node("left"), next.get_node("left"))
        else {
            panic!("expected subtrees");
        };
        assert!(Arc::ptr_eq(a, b));
    }

    #[test]
    fn tree_meta_keeps_children() {
        let index = TreeIndex::new()
            .insert(Meta::tree("dir", "t1"))
            .insert(Meta::blob("dir/f", "h1"))
            .insert(Meta::tree("dir", "t2"));
        assert_eq!(index.tree_meta("dir").unwrap().hash.as_str(), "t2");
        assert!(index.get_meta("dir/f").is_some());
    }

    #[test]
    fn kind_changes_replace_the_node() {
        let index = TreeIndex::new().insert(Meta::blob("p", "h1"));
        let index = index.insert(Meta::tree("p", "t1"));
        assert!(index.get_meta("p").is_none());
        assert_eq!(index.tree_meta("p").unwrap().hash.as_str(), "t1");

        let index = index.insert(Meta::blob("p/inner", "h2"));
        let index = index.insert(Meta::blob("p", "h3"));
        assert_eq!(index.get_meta("p").unwrap().hash.as_str(), "h3");
        assert!(index.get_meta("p/inner").is_none());
    }

    #[test]
    fn leaf_on_the_way_down_becomes_a_subtree() {
        let index = TreeIndex::new()
            .insert(Meta::blob("a", "h1"))
            .insert(Meta::blob("a/b", "h2"));
        assert!(index.get_meta("a").is_none());
        assert!(index.get_meta("a/b").is_some());
    }

    #[test]
    fn list_entries_respects_depth() {
        let index = TreeIndex::new()
            .insert(Meta::blob("root/a.txt", "1"))
            .insert(Meta::tree("root/sub", "t"))
            .insert(Meta::blob("root/sub/b.txt", "2"))
            .insert(Meta::blob("root/sub/deeper/c.txt", "3"));

        assert_eq!(paths(&index.list_entries("root", Depth::ZERO)), ["root/a.txt"]);
        assert_eq!(
            paths(&index.list_entries("root", Depth::Limited(1))),
            ["root/a.txt", "root/sub/b.txt"]
        );
        assert_eq!(
            paths(&index.list_entries("root", Depth::Unbounded)),
            ["root/a.txt", "root/sub/b.txt", "root/sub/deeper/c.txt"]
        );
        assert_eq!(index.len(), 3);
    }

    #[test]
    fn list_entries_on_missing_or_leaf_is_empty() {
        let index = TreeIndex::new().insert(Meta::blob("a/f", "1"));
        assert!(index.list_entries("nope", Depth::Unbounded).is_empty());
        assert!(index.list_entries("a/f", Depth::Unbounded).is_empty());
        assert_eq!(index.list_entries("", Depth::Unbounded).len(), 1);
    }

    #[test]
    fn tree_metas_alone_leave_the_snapshot_empty() {
        let index = TreeIndex::new().insert(Meta::tree("a", "t1"));
        assert_eq!(index.len(), 0);
        assert!(index.is_empty());

        let index = index.insert(Meta::blob("a/f", "1"));
        assert_eq!(index.len(), 1);
        assert!(!index.is_empty());
    }

    #[test]
    fn paths_are_normalized() {
        let index = TreeIndex::new().insert(Meta::blob("/a//b", "1"));
        assert!(index.get_meta("a/b").is_some());
        assert!(index.get_meta("a/b/").is_some());
    }

    #[test]
    fn root_meta_is_ignored() {
        let index = TreeIndex::new();
        assert!(index.ptr_eq(&index.insert(Meta::tree("", "t"))));
        assert!(index.get_node("").is_none());
    }
}
