//! In-memory mirror of the directory hierarchy. Each node holds the
//! last-known stat signature, the retained file names, and a child map,
//! plus an approximate descendant count used to partition query work.

use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use std::path::{Component, Path, PathBuf};

use crate::types::StatSig;

#[derive(Clone, Debug, Default)]
pub struct DirNode {
    pub sig: StatSig,
    /// Non-directory entries retained after filtering (basenames only).
    pub files: Vec<String>,
    pub children: BTreeMap<String, DirNode>,
    /// Advisory subtree size (self included); only needs to be roughly
    /// right, it steers work partitioning and nothing else.
    pub approx_descendants: usize,
}

/// Flattened form of one node, the unit the serializer works with.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FlatDir {
    pub path: PathBuf,
    pub sig: StatSig,
    pub files: Vec<String>,
}

/// Tree of [`DirNode`]s rooted at `/`. Arbitrary absolute paths are
/// tolerated everywhere; a path is made relative to the root before the
/// component walk.
#[derive(Clone, Debug, Default)]
pub struct PathMap {
    root: DirNode,
}

fn normal_components(path: &Path) -> impl Iterator<Item = &std::ffi::OsStr> {
    path.components().filter_map(|c| match c {
        Component::Normal(s) => Some(s),
        _ => None,
    })
}

impl PathMap {
    pub fn new() -> PathMap {
        PathMap::default()
    }

    pub fn root(&self) -> &DirNode {
        &self.root
    }

    /// Walk `path` component-by-component from the root. Returns `None` if
    /// any component is absent.
    pub fn node(&self, path: &Path) -> Option<&DirNode> {
        let mut node = &self.root;
        for comp in normal_components(path) {
            node = node.children.get(comp.to_string_lossy().as_ref())?;
        }
        Some(node)
    }

    /// Like [`node`](Self::node) but can create missing components on the
    /// way down.
    pub fn node_mut(&mut self, path: &Path, create: bool) -> Option<&mut DirNode> {
        let mut node = &mut self.root;
        for comp in normal_components(path) {
            let name = comp.to_string_lossy().into_owned();
            node = if create {
                node.children.entry(name).or_default()
            } else {
                node.children.get_mut(&name)?
            };
        }
        Some(node)
    }

    /// Recursively union `other` into this tree. Where `other` carries a
    /// non-missing signature it wins (a rescanned subtree merged back over
    /// stale data). Descendant counts are recomputed afterwards.
    pub fn merge_in(&mut self, other: PathMap) {
        merge_nodes(&mut self.root, other.root);
        self.update_descendant_counts();
    }

    /// Bottom-up `1 + sum(children)`. Advisory only.
    pub fn update_descendant_counts(&mut self) {
        update_counts(&mut self.root);
    }

    /// Flatten into `{path, signature, files}` tuples. Output order is
    /// unspecified; callers sort by path when determinism matters.
    pub fn dump_all(&self) -> Vec<FlatDir> {
        let mut out = Vec::new();
        flatten(&self.root, PathBuf::from("/"), &mut out);
        out
    }
}

fn merge_nodes(dst: &mut DirNode, src: DirNode) {
    if !src.sig.is_missing() {
        dst.sig = src.sig;
        dst.files = src.files;
    }
    for (name, child) in src.children {
        match dst.children.entry(name) {
            Entry::Occupied(mut e) => merge_nodes(e.get_mut(), child),
            Entry::Vacant(e) => {
                e.insert(child);
            }
        }
    }
}

fn update_counts(node: &mut DirNode) -> usize {
    let mut count = 1;
    for child in node.children.values_mut() {
        count += update_counts(child);
    }
    node.approx_descendants = count;
    count
}

fn flatten(node: &DirNode, path: PathBuf, out: &mut Vec<FlatDir>) {
    out.push(FlatDir {
        path: path.clone(),
        sig: node.sig,
        files: node.files.clone(),
    });
    for (name, child) in &node.children {
        flatten(child, path.join(name), out);
    }
}
