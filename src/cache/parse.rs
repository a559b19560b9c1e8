//! Decoding of cache blocks back into `{path, signature, files}` tuples.

use std::path::PathBuf;

use super::DeviceGroup;
use crate::types::StatSig;

/// One previously-cached directory, reconstructed from a block.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CachedDir {
    pub path: PathBuf,
    pub sig: StatSig,
    pub files: Vec<String>,
}

/// Decode one newline-delimited block. A malformed block is a
/// `serde_json::Error`; the caller treats that as "no usable cache".
pub fn decode_block(block: &str) -> serde_json::Result<Vec<CachedDir>> {
    let groups: Vec<DeviceGroup> = serde_json::from_str(block)?;
    let mut dirs = Vec::new();
    for group in groups {
        let root = PathBuf::from(&group.root);
        for dir in group.dirs {
            let path = if dir.path.is_empty() {
                root.clone()
            } else {
                root.join(&dir.path)
            };
            dirs.push(CachedDir {
                path,
                sig: StatSig {
                    mod_time_ns: dir.mod_time_ns,
                    inode: dir.inode,
                    device: group.device,
                },
                files: dir.files,
            });
        }
    }
    Ok(dirs)
}
