//! Finder façade: construction runs the load pipeline to completion, kicks
//! off the background cache dump when anything changed, and serves queries
//! against the frozen tree.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use anyhow::{Context, bail};
use log::debug;

use crate::Result;
use crate::cache;
use crate::concurrent::{Semaphore, TaskPool, default_capacity};
use crate::fs::FileSystem;
use crate::pipeline::loader::{self, LoadContext};
use crate::query::{self, WalkFn};
use crate::tree::PathMap;
use crate::types::{DirEntries, FinderConfig, FsError};

/// One configured root: the form the caller supplied (preserved in
/// results) and its absolute form (used internally).
struct RootDir {
    as_configured: PathBuf,
    absolute: PathBuf,
}

/// Caching file finder. Construction loads (or rebuilds) the directory
/// tree; afterwards the tree is immutable and queries are read-only, so
/// they may run concurrently. Call [`shutdown`](Finder::shutdown) before
/// process exit or the on-disk cache may be left unwritten.
pub struct Finder {
    config: Arc<FinderConfig>,
    roots: Vec<RootDir>,
    tree: Arc<PathMap>,
    thread_budget: usize,
    dump_handle: Option<JoinHandle<()>>,
}

impl Finder {
    /// Build a finder over `config.root_dirs`, loading the cache at
    /// `cache_path` if it is usable and cold-scanning otherwise.
    ///
    /// Fails if a configured root does not exist, or if any unexpected
    /// filesystem error (anything other than "not found" or "permission
    /// denied") occurred during the load.
    pub fn new(
        fs: Arc<dyn FileSystem>,
        config: FinderConfig,
        cache_path: impl Into<PathBuf>,
    ) -> Result<Finder> {
        let cache_path = cache_path.into();
        let (config, roots) = normalize_config(config);
        let config = Arc::new(config);
        debug!("finder config: {config:#?}");

        for root in &roots {
            let info = fs
                .stat(&root.absolute)
                .with_context(|| format!("root directory {}", root.absolute.display()))?;
            if !info.is_dir {
                bail!("root {} is not a directory", root.absolute.display());
            }
        }

        let sem = Arc::new(Semaphore::new(default_capacity()));
        let pool = TaskPool::new(Arc::clone(&sem));
        let thread_budget = sem.capacity();
        let ctx = LoadContext {
            fs: Arc::clone(&fs),
            config: Arc::clone(&config),
            pool: pool.clone(),
            errors: Arc::new(Mutex::new(Vec::new())),
            modified: Arc::new(AtomicBool::new(false)),
        };

        let tree = loader::load(&ctx, &cache_path);
        ctx.pool.wait();

        let mut errors: Vec<FsError> = std::mem::take(&mut *ctx.errors.lock().unwrap());
        // An error under a directory that no longer matters (pruned or
        // vanished along with an ancestor) is not worth reporting.
        errors.retain(|e| tree.node(&e.path).is_some());
        if !errors.is_empty() {
            let details = errors
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("; ");
            bail!("{} filesystem errors while scanning: {details}", errors.len());
        }

        let tree = Arc::new(tree);
        let dump_handle = if ctx.modified.load(Ordering::Relaxed) {
            debug!("tree changed, writing cache to {}", cache_path.display());
            let fs = Arc::clone(&fs);
            let config = Arc::clone(&config);
            let tree = Arc::clone(&tree);
            Some(thread::spawn(move || {
                if let Err(err) = cache::write_cache(&fs, &config, &cache_path, &tree, &pool) {
                    debug!("skipping cache write: {err}");
                }
            }))
        } else {
            debug!("tree unchanged, keeping existing cache");
            None
        };

        Ok(Finder {
            config,
            roots,
            tree,
            thread_budget,
            dump_handle,
        })
    }

    /// Every known path under every configured root.
    pub fn find_all(&self) -> Vec<PathBuf> {
        let mut results = Vec::new();
        for root in &self.roots {
            results.extend(self.find_at(&root.as_configured));
        }
        results.sort();
        results.dedup();
        results
    }

    /// Every known path under `root`.
    pub fn find_at(&self, root: &Path) -> Vec<PathBuf> {
        self.find_with(root, &|entries: &DirEntries| {
            (entries.dir_names.clone(), entries.file_names.clone())
        })
    }

    /// Every path whose basename is `file_name`, under every root.
    pub fn find_named(&self, file_name: &str) -> Vec<PathBuf> {
        let mut results = Vec::new();
        for root in &self.roots {
            results.extend(self.find_named_at(&root.as_configured, file_name));
        }
        results.sort();
        results.dedup();
        results
    }

    pub fn find_named_at(&self, root: &Path, file_name: &str) -> Vec<PathBuf> {
        self.find_with(root, &named_filter(file_name))
    }

    /// Like [`find_named`](Finder::find_named), but once a directory has a
    /// match its subdirectories are not explored further.
    pub fn find_first_named(&self, file_name: &str) -> Vec<PathBuf> {
        let mut results = Vec::new();
        for root in &self.roots {
            results.extend(self.find_first_named_at(&root.as_configured, file_name));
        }
        results.sort();
        results.dedup();
        results
    }

    pub fn find_first_named_at(&self, root: &Path, file_name: &str) -> Vec<PathBuf> {
        self.find_with(root, &first_named_filter(file_name))
    }

    /// Most general query: `filter` decides, per directory, which
    /// subdirectories to descend into and which files to report.
    pub fn find_matching<F>(&self, root: &Path, filter: F) -> Vec<PathBuf>
    where
        F: Fn(&DirEntries) -> (Vec<String>, Vec<String>) + Sync,
    {
        self.find_with(root, &filter)
    }

    /// Block until any in-flight cache dump has finished. Idempotent.
    pub fn wait_for_dump(&mut self) {
        if let Some(handle) = self.dump_handle.take() {
            let _ = handle.join();
        }
    }

    /// Must be called before process exit, or the on-disk cache may be left
    /// stale or unwritten.
    pub fn shutdown(&mut self) {
        self.wait_for_dump();
    }

    fn find_with(&self, start: &Path, filter: &WalkFn<'_>) -> Vec<PathBuf> {
        let absolute = self.resolve(start);
        // Deliberate caller contract: querying outside every configured
        // root yields no results, not an error.
        if !self.roots.iter().any(|r| absolute.starts_with(&r.absolute)) {
            return Vec::new();
        }
        let results = query::find_matching(&self.tree, &absolute, filter, self.thread_budget);
        if start.is_absolute() {
            results
        } else {
            results
                .into_iter()
                .map(|p| match p.strip_prefix(&self.config.working_dir) {
                    Ok(rel) => rel.to_path_buf(),
                    Err(_) => p,
                })
                .collect()
        }
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.config.working_dir.join(path)
        }
    }
}

fn named_filter(file_name: &str) -> impl Fn(&DirEntries) -> (Vec<String>, Vec<String>) + Sync {
    let file_name = file_name.to_string();
    move |entries: &DirEntries| {
        let files = entries
            .file_names
            .iter()
            .filter(|f| **f == file_name)
            .cloned()
            .collect();
        (entries.dir_names.clone(), files)
    }
}

fn first_named_filter(
    file_name: &str,
) -> impl Fn(&DirEntries) -> (Vec<String>, Vec<String>) + Sync {
    let file_name = file_name.to_string();
    move |entries: &DirEntries| {
        if entries.file_names.iter().any(|f| *f == file_name) {
            // Stop descending past a hit.
            (Vec::new(), vec![file_name.clone()])
        } else {
            (entries.dir_names.clone(), Vec::new())
        }
    }
}

/// Make roots absolute against the working directory and deduplicate them
/// syntactically: a root contained in another configured root by literal
/// path prefix is dropped. Symlinks are never resolved for this.
fn normalize_config(mut config: FinderConfig) -> (FinderConfig, Vec<RootDir>) {
    let mut candidates: Vec<RootDir> = config
        .root_dirs
        .iter()
        .map(|r| RootDir {
            as_configured: r.clone(),
            absolute: if r.is_absolute() {
                r.clone()
            } else {
                config.working_dir.join(r)
            },
        })
        .collect();
    candidates.sort_by(|a, b| a.absolute.cmp(&b.absolute));

    let mut roots: Vec<RootDir> = Vec::new();
    for candidate in candidates {
        if !roots.iter().any(|kept| candidate.absolute.starts_with(&kept.absolute)) {
            roots.push(candidate);
        }
    }

    config.root_dirs = roots.iter().map(|r| r.absolute.clone()).collect();
    (config, roots)
}
