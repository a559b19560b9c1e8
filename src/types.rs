//! Public types for the finch API: configuration, signatures, query filters.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Identity of a directory at a point in time. Two signatures are equal
/// (directory unchanged) iff all three fields match exactly.
///
/// `mod_time_ns == 0` is the missing sentinel: the directory did not exist
/// (or was unreadable) when it was last examined.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatSig {
    /// Modification time in nanoseconds since epoch. 0 means missing.
    pub mod_time_ns: i64,
    pub inode: u64,
    pub device: u64,
}

impl StatSig {
    pub const MISSING: StatSig = StatSig {
        mod_time_ns: 0,
        inode: 0,
        device: 0,
    };

    pub fn is_missing(&self) -> bool {
        self.mod_time_ns == 0
    }
}

/// Configuration for a [`Finder`](crate::Finder). A persisted cache is only
/// reused when the serialized config matches the current run byte-for-byte.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinderConfig {
    /// Directory that relative query paths (and relative roots) are resolved
    /// against. Results for a relative query are rewritten back into
    /// relative form.
    pub working_dir: PathBuf,
    /// Root directories to track. Deduplicated syntactically: a root that is
    /// a path-prefix descendant of another configured root is dropped.
    pub root_dirs: Vec<PathBuf>,
    /// Directory basenames excluded outright (never listed, never returned).
    pub exclude_dirs: Vec<String>,
    /// File basenames whose presence discards the entire containing
    /// directory, files and subdirectories both.
    pub prune_files: Vec<String>,
    /// The only file basenames ever retained or returned.
    pub include_files: Vec<String>,
}

/// The retained contents of one cached directory, handed to a
/// [`find_matching`](crate::Finder::find_matching) filter.
#[derive(Clone, Debug)]
pub struct DirEntries {
    pub path: PathBuf,
    pub dir_names: Vec<String>,
    pub file_names: Vec<String>,
}

/// One filesystem error recorded during the load phase: the path it occurred
/// on and the error text. Errors under paths that ended up outside the final
/// tree are pruned before being surfaced.
#[derive(Clone, Debug)]
pub struct FsError {
    pub path: PathBuf,
    pub message: String,
}

impl std::fmt::Display for FsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.path.display(), self.message)
    }
}
