//! Finch: caching file finder.
//!
//! Given a set of root directories, answers "which files under these roots
//! match criteria X" on every invocation without re-walking the whole tree.
//! A persistent on-disk cache of directory contents is validated against
//! the live filesystem with cheap stat calls, only the stale portions are
//! re-listed, and queries are served out of the resulting in-memory tree
//! with a parallel divide-and-conquer walk.
//!
//! ```no_run
//! use std::path::PathBuf;
//! use std::sync::Arc;
//!
//! let config = finch::FinderConfig {
//!     working_dir: PathBuf::from("/src"),
//!     root_dirs: vec![PathBuf::from("/src/project")],
//!     include_files: vec!["Build.toml".to_string()],
//!     ..Default::default()
//! };
//! let mut finder =
//!     finch::Finder::new(Arc::new(finch::fs::OsFs), config, "/tmp/finch.cache").unwrap();
//! let builds = finder.find_named("Build.toml");
//! finder.shutdown();
//! ```

pub mod cache;
pub mod concurrent;
pub mod finder;
pub mod fs;
pub mod pipeline;
pub mod query;
pub mod tree;
pub mod types;
pub mod utils;

pub use finder::Finder;
pub use types::{DirEntries, FinderConfig, FsError, StatSig};

/// Result alias used by the public finch API.
pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, Error>;
