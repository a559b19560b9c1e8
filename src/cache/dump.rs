//! Serializing the tree back to disk: sort, group by device, compress
//! paths against a common prefix, encode blocks in parallel, then write to
//! a temp file and atomically rename over the cache path.

use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use crossbeam_channel::bounded;

use crate::Result;
use crate::concurrent::TaskPool;
use crate::fs::FileSystem;
use crate::tree::{FlatDir, PathMap};
use crate::types::FinderConfig;

use super::{CACHE_VERSION, DeviceGroup, GroupDir, header_line};

/// Longest common path prefix of `a` and `b`, component-wise.
pub fn common_prefix(a: &Path, b: &Path) -> PathBuf {
    let mut prefix = PathBuf::from("/");
    let normals = |p: &'_ Path| {
        p.components()
            .filter_map(|c| match c {
                Component::Normal(s) => Some(s.to_os_string()),
                _ => None,
            })
            .collect::<Vec<_>>()
    };
    for (ca, cb) in normals(a).into_iter().zip(normals(b)) {
        if ca == cb {
            prefix.push(ca);
        } else {
            break;
        }
    }
    prefix
}

/// Group one sorted chunk of directories by device number, storing paths as
/// suffixes of the group's common prefix.
pub fn group_by_device(dirs: &[FlatDir]) -> Vec<DeviceGroup> {
    let mut by_device: BTreeMap<u64, Vec<&FlatDir>> = BTreeMap::new();
    for dir in dirs {
        by_device.entry(dir.sig.device).or_default().push(dir);
    }
    by_device
        .into_iter()
        .map(|(device, dirs)| {
            let prefix = dirs
                .iter()
                .skip(1)
                .fold(dirs[0].path.clone(), |acc, d| common_prefix(&acc, &d.path));
            let group_dirs = dirs
                .iter()
                .map(|d| GroupDir {
                    path: d
                        .path
                        .strip_prefix(&prefix)
                        .unwrap_or(&d.path)
                        .to_string_lossy()
                        .into_owned(),
                    mod_time_ns: d.sig.mod_time_ns,
                    inode: d.sig.inode,
                    files: d.files.clone(),
                })
                .collect();
            DeviceGroup {
                device,
                root: prefix.to_string_lossy().into_owned(),
                dirs: group_dirs,
            }
        })
        .collect()
}

/// Encode sorted directories as newline-separable JSON blocks, one task per
/// chunk so a later load can parse them in parallel too.
pub fn encode_blocks(dirs: Vec<FlatDir>, pool: &TaskPool) -> Result<Vec<String>> {
    if dirs.is_empty() {
        return Ok(Vec::new());
    }
    let num_blocks = pool.capacity().min(dirs.len());
    let chunk_size = dirs.len().div_ceil(num_blocks);
    let chunks: Vec<Vec<FlatDir>> = dirs.chunks(chunk_size).map(|c| c.to_vec()).collect();

    let (tx, rx) = bounded(chunks.len());
    let total = chunks.len();
    for (idx, chunk) in chunks.into_iter().enumerate() {
        let tx = tx.clone();
        pool.run(move || {
            let groups = group_by_device(&chunk);
            let _ = tx.send((idx, serde_json::to_string(&groups)));
        });
    }
    drop(tx);

    let mut blocks: Vec<Option<String>> = vec![None; total];
    for (idx, encoded) in rx {
        blocks[idx] = Some(encoded?);
    }
    Ok(blocks.into_iter().flatten().collect())
}

fn temp_path_for(cache_path: &Path) -> PathBuf {
    let name = cache_path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("cache");
    cache_path
        .parent()
        .unwrap_or(Path::new("."))
        .join(format!("{name}.tmp"))
}

/// Serialize the whole tree and atomically replace the cache file. Nodes
/// with the missing sentinel are dropped; entries are sorted by path so the
/// output is deterministic.
pub fn write_cache(
    fs: &Arc<dyn FileSystem>,
    config: &FinderConfig,
    cache_path: &Path,
    tree: &PathMap,
    pool: &TaskPool,
) -> Result<()> {
    let mut dirs = tree.dump_all();
    dirs.retain(|d| !d.sig.is_missing());
    dirs.sort_by(|a, b| a.path.cmp(&b.path));

    let header = header_line(&fs.view_id(), config)?;
    let blocks = encode_blocks(dirs, pool)?;

    let mut contents = String::new();
    contents.push_str(CACHE_VERSION);
    contents.push('\n');
    contents.push_str(&header);
    contents.push('\n');
    for block in &blocks {
        contents.push_str(block);
        contents.push('\n');
    }

    let temp_path = temp_path_for(cache_path);
    fs.write_file(&temp_path, contents.as_bytes())?;
    fs.rename(&temp_path, cache_path)?;
    Ok(())
}
