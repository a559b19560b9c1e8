//! Filesystem abstraction: a real-OS adapter plus an in-memory mock with a
//! manipulable clock for tests. Everything the engine touches on disk goes
//! through the [`FileSystem`] trait so load/validate/repair can be tested
//! without a real filesystem.

pub mod mock;

pub use mock::MockFs;

use std::io::{self, Read};
use std::path::Path;

use crate::types::StatSig;

/// Stat result: the raw identity primitives a directory signature is built
/// from, plus the type bits the lister needs.
#[derive(Clone, Copy, Debug)]
pub struct FileInfo {
    /// Modification time in nanoseconds since epoch.
    pub mod_time_ns: i64,
    pub inode: u64,
    pub device: u64,
    pub is_dir: bool,
    pub is_symlink: bool,
}

impl FileInfo {
    pub fn sig(&self) -> StatSig {
        StatSig {
            mod_time_ns: self.mod_time_ns,
            inode: self.inode,
            device: self.device,
        }
    }
}

/// One entry from a directory listing. Type bits come from lstat-style
/// information: a symlink reports `is_symlink` and not what it points at.
#[derive(Clone, Debug)]
pub struct DirEntryInfo {
    pub name: String,
    pub is_dir: bool,
    pub is_symlink: bool,
}

/// Injected filesystem interface. Production code uses [`OsFs`]; tests use
/// [`MockFs`].
pub trait FileSystem: Send + Sync {
    /// Stat, following symlinks.
    fn stat(&self, path: &Path) -> io::Result<FileInfo>;

    /// Stat without following symlinks.
    fn lstat(&self, path: &Path) -> io::Result<FileInfo>;

    /// List a directory. Entry order is unspecified.
    fn read_dir(&self, path: &Path) -> io::Result<Vec<DirEntryInfo>>;

    /// Open a file for streamed reading (the cache file is decoded
    /// block-by-block without loading it whole).
    fn open(&self, path: &Path) -> io::Result<Box<dyn Read + Send>>;

    fn write_file(&self, path: &Path, data: &[u8]) -> io::Result<()>;

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()>;

    /// Opaque identity of the filesystem view (`user@host`). Part of the
    /// cache header; a cache written under a different view is not reused.
    fn view_id(&self) -> String;
}

/// True for errors treated as "this path is now absent": the path does not
/// exist or we are not allowed to see it. Everything else is unexpected and
/// gets recorded.
pub fn is_benign(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::NotFound | io::ErrorKind::PermissionDenied
    )
}

/// Real-OS filesystem adapter.
#[derive(Clone, Copy, Debug, Default)]
pub struct OsFs;

#[cfg(unix)]
fn info_from_metadata(meta: &std::fs::Metadata) -> FileInfo {
    use std::os::unix::fs::MetadataExt;
    FileInfo {
        mod_time_ns: meta.mtime() * 1_000_000_000 + meta.mtime_nsec(),
        inode: meta.ino(),
        device: meta.dev(),
        is_dir: meta.is_dir(),
        is_symlink: meta.file_type().is_symlink(),
    }
}

#[cfg(not(unix))]
fn info_from_metadata(meta: &std::fs::Metadata) -> FileInfo {
    let mod_time_ns = meta
        .modified()
        .ok()
        .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
        .map(|d| d.as_nanos() as i64)
        .unwrap_or(0);
    FileInfo {
        mod_time_ns,
        inode: 0,
        device: 0,
        is_dir: meta.is_dir(),
        is_symlink: meta.file_type().is_symlink(),
    }
}

impl FileSystem for OsFs {
    fn stat(&self, path: &Path) -> io::Result<FileInfo> {
        std::fs::metadata(path).map(|m| info_from_metadata(&m))
    }

    fn lstat(&self, path: &Path) -> io::Result<FileInfo> {
        std::fs::symlink_metadata(path).map(|m| info_from_metadata(&m))
    }

    fn read_dir(&self, path: &Path) -> io::Result<Vec<DirEntryInfo>> {
        let mut entries = Vec::new();
        for ent in std::fs::read_dir(path)? {
            let ent = ent?;
            let file_type = ent.file_type()?;
            entries.push(DirEntryInfo {
                name: ent.file_name().to_string_lossy().into_owned(),
                is_dir: file_type.is_dir(),
                is_symlink: file_type.is_symlink(),
            });
        }
        Ok(entries)
    }

    fn open(&self, path: &Path) -> io::Result<Box<dyn Read + Send>> {
        Ok(Box::new(std::fs::File::open(path)?))
    }

    fn write_file(&self, path: &Path, data: &[u8]) -> io::Result<()> {
        std::fs::write(path, data)
    }

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        std::fs::rename(from, to)
    }

    fn view_id(&self) -> String {
        format!("{}@{}", username(), hostname())
    }
}

#[cfg(unix)]
fn username() -> String {
    std::env::var("USER").unwrap_or_else(|_| {
        let uid = unsafe { libc::getuid() };
        format!("uid{uid}")
    })
}

#[cfg(not(unix))]
fn username() -> String {
    std::env::var("USERNAME").unwrap_or_else(|_| "unknown".to_string())
}

#[cfg(unix)]
fn hostname() -> String {
    let mut buf = [0u8; 256];
    let rc = unsafe { libc::gethostname(buf.as_mut_ptr() as *mut libc::c_char, buf.len()) };
    if rc != 0 {
        return "localhost".to_string();
    }
    let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    String::from_utf8_lossy(&buf[..end]).into_owned()
}

#[cfg(not(unix))]
fn hostname() -> String {
    std::env::var("COMPUTERNAME").unwrap_or_else(|_| "localhost".to_string())
}
