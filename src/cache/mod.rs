//! On-disk cache format. Line 1 is the format version string, line 2 the
//! JSON-serialized header (filesystem view + config), and every following
//! line is one independently-parseable JSON block of per-device directory
//! groups. Newlines never occur inside a block, so block boundaries are
//! found without parsing.

pub mod dump;
pub mod parse;

pub use dump::write_cache;
pub use parse::{CachedDir, decode_block};

use serde::{Deserialize, Serialize};

use crate::Result;
use crate::types::FinderConfig;

pub const CACHE_VERSION: &str = "finch cache format 1";

/// Serialized on line 2 of the cache file. The cache is reused only when
/// this line matches the current run byte-for-byte.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheHeader {
    pub view: String,
    pub config: FinderConfig,
}

pub fn header_line(view: &str, config: &FinderConfig) -> Result<String> {
    let header = CacheHeader {
        view: view.to_string(),
        config: config.clone(),
    };
    Ok(serde_json::to_string(&header)?)
}

/// One per-device group within a block. Paths are stored as suffixes
/// relative to the group's common prefix.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DeviceGroup {
    #[serde(rename = "Device")]
    pub device: u64,
    #[serde(rename = "Root")]
    pub root: String,
    #[serde(rename = "Dirs")]
    pub dirs: Vec<GroupDir>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GroupDir {
    /// Path suffix relative to the group root ("" for the root itself).
    #[serde(rename = "P")]
    pub path: String,
    /// Modification time in nanoseconds.
    #[serde(rename = "T")]
    pub mod_time_ns: i64,
    #[serde(rename = "I")]
    pub inode: u64,
    /// Retained file basenames.
    #[serde(rename = "F")]
    pub files: Vec<String>,
}
