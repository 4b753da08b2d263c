use std::{sync::Arc, time::Duration};

use anyhow::Result;
use mirror_core::{Meta, TreeIndex, TreeNode};
use mirror_sync::{Mirror, SubscribeOptions};

use super::watch::display_path;

pub async fn run_tree(mirror: &Mirror, path: &str, settle_ms: u64) -> Result<()> {
    mirror.subscribe(path, SubscribeOptions::new().unbounded());

    // settled once a full quiet period passes without a new snapshot
    let quiet = Duration::from_millis(settle_ms.max(1));
    let mut last = mirror.snapshot();
    loop {
        tokio::time::sleep(quiet).await;
        let current = mirror.snapshot();
        if Arc::ptr_eq(&current, &last) {
            break;
        }
        last = current;
    }

    print!("{}", render(&last, path));
    mirror.unsubscribe(path);
    Ok(())
}

/// Draws the subtree at `path` with box-drawing connectors.
fn render(tree: &TreeIndex, path: &str) -> String {
    let mut out = format!("{}\n", display_path(path));
    let root_children = if mirror_core::path::segments(path).next().is_none() {
        tree.root_children()
    } else {
        match tree.get_node(path) {
            Some(TreeNode::Dir { children, .. }) => &**children,
            _ => return out,
        }
    };

    // (children, index into them, prefix) per open directory
    let mut stack = vec![(root_children.iter().collect::<Vec<_>>(), 0usize, String::new())];
    while let Some((entries, index, prefix)) = stack.last_mut() {
        let Some((name, node)) = entries.get(*index).copied() else {
            stack.pop();
            continue;
        };
        *index += 1;
        let last = *index == entries.len();
        let connector = if last { "└── " } else { "├── " };
        let line = match node {
            TreeNode::Leaf(meta) => format!("{prefix}{connector}{name} {}", short_hash(meta)),
            TreeNode::Dir { .. } => format!("{prefix}{connector}{name}/"),
        };
        out.push_str(&line);
        out.push('\n');

        if let TreeNode::Dir { children, .. } = node {
            let nested = format!("{prefix}{}", if last { "    " } else { "│   " });
            stack.push((children.iter().collect(), 0, nested));
        }
    }
    out
}

fn short_hash(meta: &Meta) -> String {
    format!("[{}]", meta.hash.fmt_short())
}
