//! Cache load pipeline. The warm path validates the cache header, decodes
//! blocks in parallel while restatting every cached directory, then repairs
//! only the stale subtrees; the cold path scans recursively from the
//! configured roots. Either way a single collector loop owns the tree and
//! all mutation is serialized through its message channel; tasks never
//! touch the tree directly.

use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use crossbeam_channel::{Receiver, Sender, bounded, unbounded};
use log::debug;

use crate::cache::{self, parse::CachedDir};
use crate::concurrent::TaskPool;
use crate::fs::{self, FileSystem};
use crate::pipeline::listing::{self, Listing};
use crate::tree::{DirNode, PathMap};
use crate::types::{FinderConfig, FsError, StatSig};

/// Capacity of the raw-block channel between the reader thread and the
/// decode workers.
const RAW_BLOCK_CHANNEL_CAP: usize = 16;

/// Shared state threaded through every load task.
#[derive(Clone)]
pub struct LoadContext {
    pub fs: Arc<dyn FileSystem>,
    pub config: Arc<FinderConfig>,
    pub pool: TaskPool,
    pub errors: Arc<Mutex<Vec<FsError>>>,
    pub modified: Arc<AtomicBool>,
}

impl LoadContext {
    fn mark_modified(&self) {
        self.modified.store(true, Ordering::Relaxed);
    }
}

enum LoadMsg {
    /// Partial tree from one decoded block plus the stale dirs it flagged.
    Block(PathMap, Vec<PathBuf>),
    /// One decode worker exited.
    DecodeDone,
    /// Malformed payload; the warm result is unusable.
    Corrupt,
    Statted(PathBuf, StatSig),
    /// `None` means the directory could not be listed and is now absent.
    Listed(PathBuf, Option<Listing>),
}

/// Load the tree: warm if a usable cache exists at `cache_path`, cold
/// otherwise. Returns with the tree fully populated and structurally
/// stable; all spawned work has drained.
pub fn load(ctx: &LoadContext, cache_path: &Path) -> PathMap {
    if let Some(tree) = try_warm_load(ctx, cache_path) {
        return tree;
    }
    ctx.mark_modified();
    cold_scan(ctx)
}

/// Stat `path` and reduce the result to a signature. Benign errors (and a
/// path that is no longer a directory) become the missing sentinel;
/// unexpected errors are recorded and also treated as missing.
fn stat_sig(fs_impl: &dyn FileSystem, errors: &Mutex<Vec<FsError>>, path: &Path) -> StatSig {
    match fs_impl.stat(path) {
        Ok(info) if info.is_dir => info.sig(),
        Ok(_) => StatSig::MISSING,
        Err(err) => {
            if !fs::is_benign(&err) {
                errors.lock().unwrap().push(FsError {
                    path: path.to_path_buf(),
                    message: err.to_string(),
                });
            }
            StatSig::MISSING
        }
    }
}

fn schedule_stat(ctx: &LoadContext, tx: &Sender<LoadMsg>, path: PathBuf) {
    let fs_impl = Arc::clone(&ctx.fs);
    let errors = Arc::clone(&ctx.errors);
    let tx = tx.clone();
    ctx.pool.run(move || {
        let sig = stat_sig(&*fs_impl, &errors, &path);
        let _ = tx.send(LoadMsg::Statted(path, sig));
    });
}

fn schedule_list(ctx: &LoadContext, tx: &Sender<LoadMsg>, path: PathBuf) {
    let fs_impl = Arc::clone(&ctx.fs);
    let config = Arc::clone(&ctx.config);
    let errors = Arc::clone(&ctx.errors);
    let tx = tx.clone();
    ctx.pool.run(move || {
        let listing = match listing::list_dir(&*fs_impl, &path, &config) {
            Ok(listing) => Some(listing),
            Err(err) => {
                if !fs::is_benign(&err) {
                    errors.lock().unwrap().push(FsError {
                        path: path.clone(),
                        message: err.to_string(),
                    });
                }
                None
            }
        };
        let _ = tx.send(LoadMsg::Listed(path, listing));
    });
}

/// Decode one block and restat every directory in it. Produces the block's
/// partial tree and the directories that need re-listing.
fn process_block(ctx: &LoadContext, block: &str) -> serde_json::Result<(PathMap, Vec<PathBuf>)> {
    let dirs: Vec<CachedDir> = cache::decode_block(block)?;
    let mut partial = PathMap::new();
    let mut stale = Vec::new();
    for cached in dirs {
        let fresh = stat_sig(&*ctx.fs, &ctx.errors, &cached.path);
        let Some(node) = partial.node_mut(&cached.path, true) else {
            continue;
        };
        if fresh.is_missing() {
            // Dropped: sentinel signature, no listing scheduled.
            ctx.mark_modified();
        } else if fresh == cached.sig {
            node.sig = fresh;
            node.files = cached.files;
        } else {
            node.sig = fresh;
            stale.push(cached.path);
            ctx.mark_modified();
        }
    }
    Ok((partial, stale))
}

/// Open and validate the cache header, then run the streamed decode and
/// repair phases. `None` means no usable cache (absent, wrong header, or
/// corrupt payload) and the caller must cold-scan.
fn try_warm_load(ctx: &LoadContext, cache_path: &Path) -> Option<PathMap> {
    let file = match ctx.fs.open(cache_path) {
        Ok(file) => file,
        Err(err) => {
            debug!("no usable cache at {}: {}", cache_path.display(), err);
            return None;
        }
    };
    let mut reader = BufReader::new(file);

    let version = read_line(&mut reader)?;
    if version != cache::CACHE_VERSION {
        debug!("cache version mismatch, rescanning");
        return None;
    }
    let header = read_line(&mut reader)?;
    let expected = cache::header_line(&ctx.fs.view_id(), &ctx.config).ok()?;
    if header != expected {
        debug!("cache config mismatch, rescanning");
        return None;
    }

    let (raw_tx, raw_rx) = bounded::<String>(RAW_BLOCK_CHANNEL_CAP);
    let (msg_tx, msg_rx) = unbounded::<LoadMsg>();

    // Reader: stream raw blocks without parsing them; newline is the block
    // boundary and never occurs inside a block.
    let reader_tx = raw_tx;
    let reader_msg_tx = msg_tx.clone();
    thread::spawn(move || {
        for line in reader.lines() {
            match line {
                Ok(block) => {
                    if block.is_empty() {
                        continue;
                    }
                    if reader_tx.send(block).is_err() {
                        break;
                    }
                }
                Err(err) => {
                    debug!("cache read failed mid-stream: {err}");
                    let _ = reader_msg_tx.send(LoadMsg::Corrupt);
                    break;
                }
            }
        }
    });

    // Decode workers: parse blocks and restat their directories in
    // parallel. Worker count matches the semaphore capacity, which bounds
    // the stats they issue.
    let num_workers = ctx.pool.capacity();
    for _ in 0..num_workers {
        let ctx = ctx.clone();
        let raw_rx = raw_rx.clone();
        let msg_tx = msg_tx.clone();
        thread::spawn(move || {
            while let Ok(block) = raw_rx.recv() {
                match process_block(&ctx, &block) {
                    Ok((partial, stale)) => {
                        let _ = msg_tx.send(LoadMsg::Block(partial, stale));
                    }
                    Err(err) => {
                        debug!("corrupt cache block, rescanning: {err}");
                        let _ = msg_tx.send(LoadMsg::Corrupt);
                    }
                }
            }
            let _ = msg_tx.send(LoadMsg::DecodeDone);
        });
    }

    collect(ctx, msg_rx, msg_tx, num_workers, 0)
}

/// From-scratch recursive scan starting at the configured roots (already
/// deduplicated by the caller).
fn cold_scan(ctx: &LoadContext) -> PathMap {
    let (msg_tx, msg_rx) = unbounded::<LoadMsg>();
    let mut outstanding = 0;
    for root in &ctx.config.root_dirs {
        schedule_stat(ctx, &msg_tx, root.clone());
        outstanding += 1;
    }
    collect(ctx, msg_rx, msg_tx, 0, outstanding).unwrap_or_default()
}

/// Single-owner collector loop: the only place the shared tree is mutated.
/// Runs until the decode phase has finished and every scheduled stat/list
/// task has reported back. Returns `None` if the cache payload turned out
/// to be corrupt.
fn collect(
    ctx: &LoadContext,
    msg_rx: Receiver<LoadMsg>,
    msg_tx: Sender<LoadMsg>,
    decode_workers: usize,
    initial_outstanding: usize,
) -> Option<PathMap> {
    let mut tree = PathMap::new();
    let mut outstanding = initial_outstanding;
    let mut decoders = decode_workers;
    let mut corrupt = false;
    // Re-listing starts only after every block has merged, so a pruned or
    // rescanned directory can never be resurrected by a late block merge.
    let mut pending_lists: Vec<PathBuf> = Vec::new();

    while decoders > 0 || outstanding > 0 {
        let Ok(msg) = msg_rx.recv() else {
            break;
        };
        match msg {
            LoadMsg::Block(partial, stale) => {
                tree.merge_in(partial);
                pending_lists.extend(stale);
            }
            LoadMsg::DecodeDone => {
                decoders -= 1;
                if decoders == 0 && !corrupt {
                    for path in pending_lists.drain(..) {
                        schedule_list(ctx, &msg_tx, path);
                        outstanding += 1;
                    }
                }
            }
            LoadMsg::Corrupt => corrupt = true,
            LoadMsg::Statted(path, sig) => {
                outstanding -= 1;
                if let Some(node) = tree.node_mut(&path, true) {
                    node.sig = sig;
                }
                if !sig.is_missing() {
                    schedule_list(ctx, &msg_tx, path);
                    outstanding += 1;
                }
            }
            LoadMsg::Listed(path, listing) => {
                outstanding -= 1;
                for new_dir in apply_listing(ctx, &mut tree, &path, listing) {
                    schedule_stat(ctx, &msg_tx, new_dir);
                    outstanding += 1;
                }
            }
        }
    }

    tree.update_descendant_counts();
    if corrupt { None } else { Some(tree) }
}

/// Apply one listing result: replace the node's files and children with
/// exactly the retained set (the one place children can shrink). Returns
/// the newly-discovered subdirectories that still need a stat.
fn apply_listing(
    ctx: &LoadContext,
    tree: &mut PathMap,
    path: &Path,
    listing: Option<Listing>,
) -> Vec<PathBuf> {
    let Some(node) = tree.node_mut(path, true) else {
        return Vec::new();
    };
    let Some(listing) = listing else {
        node.sig = StatSig::MISSING;
        node.files.clear();
        node.children.clear();
        ctx.mark_modified();
        return Vec::new();
    };

    node.files = listing.files;

    let mut old_children = std::mem::take(&mut node.children);
    let mut new_dirs = Vec::new();
    for name in listing.subdirs {
        match old_children.remove(&name) {
            Some(child) => {
                node.children.insert(name, child);
            }
            None => {
                node.children.insert(name.clone(), DirNode::default());
                new_dirs.push(path.join(name));
            }
        }
    }
    if !old_children.is_empty() || !new_dirs.is_empty() {
        ctx.mark_modified();
    }
    new_dirs
}

fn read_line<R: BufRead>(reader: &mut R) -> Option<String> {
    let mut line = String::new();
    match reader.read_line(&mut line) {
        Ok(0) | Err(_) => None,
        Ok(_) => Some(line.trim_end_matches('\n').to_string()),
    }
}
