//! Directory listing and filtering, shared by the warm-load repair path and
//! the cold scan.

use std::io;
use std::path::Path;

use crate::fs::FileSystem;
use crate::types::FinderConfig;

/// The retained contents of one freshly-listed directory.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Listing {
    pub files: Vec<String>,
    pub subdirs: Vec<String>,
}

/// List `path` and apply the configured filters.
///
/// Entries are partitioned into real subdirectories and files. A symlink to
/// a directory is skipped entirely: following it would double-count a
/// target reachable under two names. A symlink to anything else (including
/// a target that cannot be statted) counts as a file, since the link name
/// itself is meaningful to callers.
///
/// If any file name matches a configured prune-file, the whole directory is
/// treated as empty. Otherwise files are intersected with `include_files`
/// and subdirectories matching `exclude_dirs` are dropped.
pub fn list_dir(fs: &dyn FileSystem, path: &Path, config: &FinderConfig) -> io::Result<Listing> {
    let entries = fs.read_dir(path)?;

    let mut files = Vec::new();
    let mut subdirs = Vec::new();
    for entry in entries {
        if entry.is_dir {
            subdirs.push(entry.name);
        } else if entry.is_symlink {
            match fs.stat(&path.join(&entry.name)) {
                Ok(info) if info.is_dir => {}
                _ => files.push(entry.name),
            }
        } else {
            files.push(entry.name);
        }
    }

    if files.iter().any(|f| config.prune_files.contains(f)) {
        return Ok(Listing::default());
    }

    files.retain(|f| config.include_files.contains(f));
    subdirs.retain(|d| !config.exclude_dirs.contains(d));
    files.sort();
    subdirs.sort();

    Ok(Listing { files, subdirs })
}
