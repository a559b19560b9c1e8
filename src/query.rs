//! Parallel divide-and-conquer queries over the frozen tree. Work is
//! partitioned by approximate subtree size; once a branch's thread budget
//! drops below 2 the remainder is walked iteratively on one thread.

use std::path::{Path, PathBuf};
use std::thread;

use crossbeam_channel::bounded;

use crate::tree::{DirNode, PathMap};
use crate::types::DirEntries;

/// Caller-supplied filter: given a directory's retained subdirectory and
/// file names, returns the subset of each to keep exploring/reporting.
/// Carries a lifetime so filters may borrow from the caller.
pub type WalkFn<'a> = dyn Fn(&DirEntries) -> (Vec<String>, Vec<String>) + Sync + 'a;

/// Apply `filter` to the subtree rooted at `start` (absolute). An unknown
/// start path yields no results, never an error. Results are sorted.
pub fn find_matching(
    tree: &PathMap,
    start: &Path,
    filter: &WalkFn<'_>,
    thread_budget: usize,
) -> Vec<PathBuf> {
    let Some(node) = tree.node(start) else {
        return Vec::new();
    };
    let mut results = walk(node, start.to_path_buf(), filter, thread_budget);
    results.sort();
    results
}

fn apply_filter(node: &DirNode, path: &Path, filter: &WalkFn<'_>) -> (Vec<String>, Vec<String>) {
    let entries = DirEntries {
        path: path.to_path_buf(),
        dir_names: node.children.keys().cloned().collect(),
        file_names: node.files.clone(),
    };
    filter(&entries)
}

fn walk(node: &DirNode, path: PathBuf, filter: &WalkFn<'_>, budget: usize) -> Vec<PathBuf> {
    if budget < 2 {
        return walk_iterative(node, path, filter);
    }

    let (dir_names, file_names) = apply_filter(node, &path, filter);
    let mut results: Vec<PathBuf> = file_names.iter().map(|f| path.join(f)).collect();

    // Children actually present in the tree, with their size estimates.
    let children: Vec<(&str, &DirNode)> = dir_names
        .iter()
        .filter_map(|name| node.children.get(name).map(|c| (name.as_str(), c)))
        .collect();
    let total: usize = children
        .iter()
        .map(|(_, c)| c.approx_descendants.max(1))
        .sum();
    if children.is_empty() {
        return results;
    }

    let (tx, rx) = bounded(children.len());
    let mut spawned = 0;
    thread::scope(|scope| {
        for (name, child) in &children {
            let share = budget * child.approx_descendants.max(1) / total.max(1);
            let child_path = path.join(name);
            if share >= 2 {
                let tx = tx.clone();
                spawned += 1;
                scope.spawn(move || {
                    let _ = tx.send(walk(child, child_path, filter, share));
                });
            } else {
                results.extend(walk_iterative(child, child_path, filter));
            }
        }
        for _ in 0..spawned {
            if let Ok(sub) = rx.recv() {
                results.extend(sub);
            }
        }
    });

    results
}

/// Single-threaded walk with an explicit work list instead of recursion.
fn walk_iterative(node: &DirNode, path: PathBuf, filter: &WalkFn<'_>) -> Vec<PathBuf> {
    let mut results = Vec::new();
    let mut work = vec![(node, path)];
    while let Some((node, path)) = work.pop() {
        let (dir_names, file_names) = apply_filter(node, &path, filter);
        results.extend(file_names.iter().map(|f| path.join(f)));
        for name in dir_names {
            if let Some(child) = node.children.get(&name) {
                work.push((child, path.join(name)));
            }
        }
    }
    results
}
