//! In-memory filesystem for tests: a manipulable logical clock, per-entry
//! inode assignment, injectable errors, and call recording so tests can
//! assert exactly which paths were statted or listed.

use std::collections::{BTreeMap, HashMap};
use std::io::{self, Cursor, Read};
use std::path::{Component, Path, PathBuf};
use std::sync::Mutex;

use super::{DirEntryInfo, FileInfo, FileSystem};

const CLOCK_TICK_NS: i64 = 1_000;
const MAX_LINK_DEPTH: usize = 10;

enum MockNode {
    Dir {
        children: BTreeMap<String, MockNode>,
        mtime_ns: i64,
        inode: u64,
        device: u64,
    },
    File {
        data: Vec<u8>,
        mtime_ns: i64,
        inode: u64,
        device: u64,
    },
    Symlink {
        target: PathBuf,
        mtime_ns: i64,
        inode: u64,
        device: u64,
    },
}

impl MockNode {
    fn info(&self) -> FileInfo {
        match self {
            MockNode::Dir {
                mtime_ns,
                inode,
                device,
                ..
            } => FileInfo {
                mod_time_ns: *mtime_ns,
                inode: *inode,
                device: *device,
                is_dir: true,
                is_symlink: false,
            },
            MockNode::File {
                mtime_ns,
                inode,
                device,
                ..
            } => FileInfo {
                mod_time_ns: *mtime_ns,
                inode: *inode,
                device: *device,
                is_dir: false,
                is_symlink: false,
            },
            MockNode::Symlink {
                mtime_ns,
                inode,
                device,
                ..
            } => FileInfo {
                mod_time_ns: *mtime_ns,
                inode: *inode,
                device: *device,
                is_dir: false,
                is_symlink: true,
            },
        }
    }
}

struct MockState {
    root: MockNode,
    clock_ns: i64,
    next_inode: u64,
    device: u64,
    view: String,
    statted: Vec<PathBuf>,
    listed: Vec<PathBuf>,
    fail: HashMap<PathBuf, io::ErrorKind>,
}

/// In-memory [`FileSystem`]. All mutations advance the logical clock, so a
/// touched directory always gets a fresh mtime.
pub struct MockFs {
    state: Mutex<MockState>,
}

fn path_components(path: &Path) -> Vec<String> {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(s) => Some(s.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect()
}

fn not_found() -> io::Error {
    io::Error::new(io::ErrorKind::NotFound, "no such file or directory")
}

fn not_a_dir() -> io::Error {
    io::Error::new(io::ErrorKind::NotFound, "not a directory")
}

fn lookup<'a>(node: &'a MockNode, comps: &[String]) -> io::Result<&'a MockNode> {
    let Some((first, rest)) = comps.split_first() else {
        return Ok(node);
    };
    match node {
        MockNode::Dir { children, .. } => match children.get(first) {
            Some(child) => lookup(child, rest),
            None => Err(not_found()),
        },
        _ => Err(not_a_dir()),
    }
}

fn ensure_dir<'a>(
    node: &'a mut MockNode,
    comps: &[String],
    next_inode: &mut u64,
    clock_ns: &mut i64,
    device: u64,
) -> io::Result<&'a mut MockNode> {
    let Some((first, rest)) = comps.split_first() else {
        return Ok(node);
    };
    let MockNode::Dir {
        children, mtime_ns, ..
    } = node
    else {
        return Err(not_a_dir());
    };
    if !children.contains_key(first) {
        *clock_ns += CLOCK_TICK_NS;
        *mtime_ns = *clock_ns;
        let inode = *next_inode;
        *next_inode += 1;
        children.insert(
            first.clone(),
            MockNode::Dir {
                children: BTreeMap::new(),
                mtime_ns: *clock_ns,
                inode,
                device,
            },
        );
    }
    ensure_dir(
        children.get_mut(first).expect("just inserted"),
        rest,
        next_inode,
        clock_ns,
        device,
    )
}

impl MockState {
    fn check_fail(&self, path: &Path) -> io::Result<()> {
        let comps = path_components(path);
        let normalized: PathBuf = PathBuf::from("/").join(comps.iter().collect::<PathBuf>());
        match self.fail.get(&normalized) {
            Some(kind) => Err(io::Error::new(*kind, "injected error")),
            None => Ok(()),
        }
    }

    /// Lstat-style lookup.
    fn lookup_no_follow(&self, path: &Path) -> io::Result<&MockNode> {
        lookup(&self.root, &path_components(path))
    }

    /// Stat-style lookup: follows a chain of symlinks on the final component.
    fn lookup_follow(&self, path: &Path) -> io::Result<&MockNode> {
        let mut current = path.to_path_buf();
        for _ in 0..MAX_LINK_DEPTH {
            let node = self.lookup_no_follow(&current)?;
            match node {
                MockNode::Symlink { target, .. } => {
                    current = if target.is_absolute() {
                        target.clone()
                    } else {
                        current.parent().unwrap_or(Path::new("/")).join(target)
                    };
                }
                _ => return Ok(node),
            }
        }
        Err(io::Error::other("too many levels of symbolic links"))
    }
}

impl MockFs {
    pub fn new() -> MockFs {
        MockFs {
            state: Mutex::new(MockState {
                root: MockNode::Dir {
                    children: BTreeMap::new(),
                    mtime_ns: 1_000_000_000,
                    inode: 1,
                    device: 1,
                },
                clock_ns: 1_000_000_000,
                next_inode: 2,
                device: 1,
                view: "user@mock".to_string(),
                statted: Vec::new(),
                listed: Vec::new(),
                fail: HashMap::new(),
            }),
        }
    }

    /// Create a directory and any missing ancestors.
    pub fn mkdirs(&self, path: &Path) {
        let mut state = self.state.lock().unwrap();
        let MockState {
            root,
            next_inode,
            clock_ns,
            device,
            ..
        } = &mut *state;
        let _ = ensure_dir(root, &path_components(path), next_inode, clock_ns, *device);
    }

    /// Create (or overwrite) a file, creating ancestors as needed. A new
    /// file ticks the parent directory's mtime; an overwrite does not.
    pub fn create_file(&self, path: &Path, data: &[u8]) {
        let mut state = self.state.lock().unwrap();
        let MockState {
            root,
            next_inode,
            clock_ns,
            device,
            ..
        } = &mut *state;
        let comps = path_components(path);
        let Some((name, parents)) = comps.split_last() else {
            return;
        };
        let Ok(MockNode::Dir {
            children, mtime_ns, ..
        }) = ensure_dir(root, parents, next_inode, clock_ns, *device)
        else {
            return;
        };
        *clock_ns += CLOCK_TICK_NS;
        match children.get_mut(name) {
            Some(MockNode::File {
                data: existing,
                mtime_ns: file_mtime,
                ..
            }) => {
                *existing = data.to_vec();
                *file_mtime = *clock_ns;
            }
            _ => {
                *mtime_ns = *clock_ns;
                let inode = *next_inode;
                *next_inode += 1;
                children.insert(
                    name.clone(),
                    MockNode::File {
                        data: data.to_vec(),
                        mtime_ns: *clock_ns,
                        inode,
                        device: *device,
                    },
                );
            }
        }
    }

    /// Create a symlink at `path` pointing at `target` (absolute, or
    /// relative to the link's parent directory).
    pub fn symlink(&self, path: &Path, target: &Path) {
        let mut state = self.state.lock().unwrap();
        let MockState {
            root,
            next_inode,
            clock_ns,
            device,
            ..
        } = &mut *state;
        let comps = path_components(path);
        let Some((name, parents)) = comps.split_last() else {
            return;
        };
        let Ok(MockNode::Dir {
            children, mtime_ns, ..
        }) = ensure_dir(root, parents, next_inode, clock_ns, *device)
        else {
            return;
        };
        *clock_ns += CLOCK_TICK_NS;
        *mtime_ns = *clock_ns;
        let inode = *next_inode;
        *next_inode += 1;
        children.insert(
            name.clone(),
            MockNode::Symlink {
                target: target.to_path_buf(),
                mtime_ns: *clock_ns,
                inode,
                device: *device,
            },
        );
    }

    /// Remove a file, symlink, or whole directory subtree. Ticks the parent
    /// directory's mtime.
    pub fn remove(&self, path: &Path) {
        let mut state = self.state.lock().unwrap();
        let MockState { root, clock_ns, .. } = &mut *state;
        let comps = path_components(path);
        let Some((name, parents)) = comps.split_last() else {
            return;
        };
        if let Ok(MockNode::Dir {
            children, mtime_ns, ..
        }) = lookup_mut(root, parents)
            && children.remove(name).is_some()
        {
            *clock_ns += CLOCK_TICK_NS;
            *mtime_ns = *clock_ns;
        }
    }

    /// Make `stat`/`read_dir`/`open` on `path` fail with `kind`.
    pub fn fail_path(&self, path: &Path, kind: io::ErrorKind) {
        let normalized = PathBuf::from("/").join(path_components(path).iter().collect::<PathBuf>());
        self.state.lock().unwrap().fail.insert(normalized, kind);
    }

    /// Device number stamped on subsequently created entries.
    pub fn set_device(&self, device: u64) {
        self.state.lock().unwrap().device = device;
    }

    pub fn set_view_id(&self, view: &str) {
        self.state.lock().unwrap().view = view.to_string();
    }

    pub fn advance_clock(&self, ns: i64) {
        self.state.lock().unwrap().clock_ns += ns;
    }

    /// Paths statted (stat or lstat) since the last [`clear_calls`](Self::clear_calls).
    pub fn statted_paths(&self) -> Vec<PathBuf> {
        self.state.lock().unwrap().statted.clone()
    }

    /// Paths listed via read_dir since the last [`clear_calls`](Self::clear_calls).
    pub fn listed_paths(&self) -> Vec<PathBuf> {
        self.state.lock().unwrap().listed.clone()
    }

    pub fn clear_calls(&self) {
        let mut state = self.state.lock().unwrap();
        state.statted.clear();
        state.listed.clear();
    }
}

impl Default for MockFs {
    fn default() -> Self {
        MockFs::new()
    }
}

fn lookup_mut<'a>(node: &'a mut MockNode, comps: &[String]) -> io::Result<&'a mut MockNode> {
    let Some((first, rest)) = comps.split_first() else {
        return Ok(node);
    };
    match node {
        MockNode::Dir { children, .. } => match children.get_mut(first) {
            Some(child) => lookup_mut(child, rest),
            None => Err(not_found()),
        },
        _ => Err(not_a_dir()),
    }
}

impl FileSystem for MockFs {
    fn stat(&self, path: &Path) -> io::Result<FileInfo> {
        let mut state = self.state.lock().unwrap();
        state.statted.push(path.to_path_buf());
        state.check_fail(path)?;
        state.lookup_follow(path).map(|n| n.info())
    }

    fn lstat(&self, path: &Path) -> io::Result<FileInfo> {
        let mut state = self.state.lock().unwrap();
        state.statted.push(path.to_path_buf());
        state.check_fail(path)?;
        state.lookup_no_follow(path).map(|n| n.info())
    }

    fn read_dir(&self, path: &Path) -> io::Result<Vec<DirEntryInfo>> {
        let mut state = self.state.lock().unwrap();
        state.listed.push(path.to_path_buf());
        state.check_fail(path)?;
        match state.lookup_no_follow(path)? {
            MockNode::Dir { children, .. } => Ok(children
                .iter()
                .map(|(name, node)| {
                    let info = node.info();
                    DirEntryInfo {
                        name: name.clone(),
                        is_dir: info.is_dir,
                        is_symlink: info.is_symlink,
                    }
                })
                .collect()),
            _ => Err(not_a_dir()),
        }
    }

    fn open(&self, path: &Path) -> io::Result<Box<dyn Read + Send>> {
        let state = self.state.lock().unwrap();
        state.check_fail(path)?;
        match state.lookup_follow(path)? {
            MockNode::File { data, .. } => Ok(Box::new(Cursor::new(data.clone()))),
            _ => Err(io::Error::new(io::ErrorKind::InvalidInput, "not a file")),
        }
    }

    fn write_file(&self, path: &Path, data: &[u8]) -> io::Result<()> {
        self.create_file(path, data);
        Ok(())
    }

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        let mut state = self.state.lock().unwrap();
        let MockState { root, clock_ns, .. } = &mut *state;
        let from_comps = path_components(from);
        let Some((from_name, from_parents)) = from_comps.split_last() else {
            return Err(not_found());
        };
        let node = match lookup_mut(root, from_parents)? {
            MockNode::Dir {
                children, mtime_ns, ..
            } => {
                let node = children.remove(from_name).ok_or_else(not_found)?;
                *clock_ns += CLOCK_TICK_NS;
                *mtime_ns = *clock_ns;
                node
            }
            _ => return Err(not_a_dir()),
        };
        let to_comps = path_components(to);
        let Some((to_name, to_parents)) = to_comps.split_last() else {
            return Err(not_found());
        };
        match lookup_mut(root, to_parents)? {
            MockNode::Dir {
                children, mtime_ns, ..
            } => {
                *clock_ns += CLOCK_TICK_NS;
                *mtime_ns = *clock_ns;
                children.insert(to_name.clone(), node);
                Ok(())
            }
            _ => Err(not_a_dir()),
        }
    }

    fn view_id(&self) -> String {
        self.state.lock().unwrap().view.clone()
    }
}
