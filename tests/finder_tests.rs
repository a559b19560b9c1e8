use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use finch::fs::{FileSystem, MockFs};
use finch::{Finder, FinderConfig};

fn config(roots: &[&str], include: &[&str]) -> FinderConfig {
    FinderConfig {
        working_dir: PathBuf::from("/"),
        root_dirs: roots.iter().map(PathBuf::from).collect(),
        exclude_dirs: vec![],
        prune_files: vec![],
        include_files: include.iter().map(|s| s.to_string()).collect(),
    }
}

fn paths(raw: &[&str]) -> Vec<PathBuf> {
    let mut out: Vec<PathBuf> = raw.iter().map(PathBuf::from).collect();
    out.sort();
    out
}

const CACHE: &str = "/cache/finder";

// --- basic queries ---

#[test]
fn test_find_named_across_tree() {
    let fs = Arc::new(MockFs::new());
    fs.create_file(Path::new("/tmp/findme.txt"), b"");
    fs.create_file(Path::new("/tmp/a/findme.txt"), b"");
    fs.create_file(Path::new("/tmp/a/skip.txt"), b"");
    fs.create_file(Path::new("/tmp/a/b/findme.txt"), b"");

    let mut finder = Finder::new(fs, config(&["/tmp"], &["findme.txt"]), CACHE).unwrap();
    assert_eq!(
        finder.find_named("findme.txt"),
        paths(&["/tmp/findme.txt", "/tmp/a/findme.txt", "/tmp/a/b/findme.txt"])
    );
    // skip.txt is not an included file name, so it is invisible everywhere.
    assert!(finder.find_named("skip.txt").is_empty());
    finder.shutdown();
}

#[test]
fn test_find_all_returns_every_retained_file() {
    let fs = Arc::new(MockFs::new());
    fs.create_file(Path::new("/tmp/a.txt"), b"");
    fs.create_file(Path::new("/tmp/sub/b.txt"), b"");
    fs.create_file(Path::new("/tmp/sub/ignored.log"), b"");

    let mut finder = Finder::new(fs, config(&["/tmp"], &["a.txt", "b.txt"]), CACHE).unwrap();
    assert_eq!(finder.find_all(), paths(&["/tmp/a.txt", "/tmp/sub/b.txt"]));
    finder.shutdown();
}

#[test]
fn test_find_first_named_stops_below_a_hit() {
    let fs = Arc::new(MockFs::new());
    fs.create_file(Path::new("/tmp/findme.txt"), b"");
    fs.create_file(Path::new("/tmp/a/findme.txt"), b"");
    fs.create_file(Path::new("/tmp/other/deep/findme.txt"), b"");

    let mut finder = Finder::new(fs, config(&["/tmp"], &["findme.txt"]), CACHE).unwrap();
    // The root itself has a hit, so nothing below it is explored.
    assert_eq!(
        finder.find_first_named("findme.txt"),
        paths(&["/tmp/findme.txt"])
    );
    finder.shutdown();
}

#[test]
fn test_find_matching_custom_filter() {
    let fs = Arc::new(MockFs::new());
    fs.create_file(Path::new("/tmp/keep/findme.txt"), b"");
    fs.create_file(Path::new("/tmp/avoid/findme.txt"), b"");

    let mut finder = Finder::new(fs, config(&["/tmp"], &["findme.txt"]), CACHE).unwrap();
    let results = finder.find_matching(Path::new("/tmp"), |entries: &finch::DirEntries| {
        let dirs = entries
            .dir_names
            .iter()
            .filter(|d| *d != "avoid")
            .cloned()
            .collect();
        (dirs, entries.file_names.clone())
    });
    assert_eq!(results, paths(&["/tmp/keep/findme.txt"]));
    finder.shutdown();
}

#[test]
fn test_find_matching_filter_may_borrow_locals() {
    let fs = Arc::new(MockFs::new());
    fs.create_file(Path::new("/tmp/findme.txt"), b"");
    fs.create_file(Path::new("/tmp/other.txt"), b"");

    let mut finder = Finder::new(
        fs,
        config(&["/tmp"], &["findme.txt", "other.txt"]),
        CACHE,
    )
    .unwrap();

    // The filter closure captures references to caller-owned data; queries
    // must accept non-'static filters.
    let wanted = vec!["findme.txt".to_string()];
    let wanted = &wanted;
    let results = finder.find_matching(Path::new("/tmp"), |entries: &finch::DirEntries| {
        let files = entries
            .file_names
            .iter()
            .filter(|f| wanted.contains(f))
            .cloned()
            .collect();
        (entries.dir_names.clone(), files)
    });
    assert_eq!(results, paths(&["/tmp/findme.txt"]));

    let name = String::from("other.txt");
    assert_eq!(
        finder.find_named_at(Path::new("/tmp"), name.as_str()),
        paths(&["/tmp/other.txt"])
    );
    finder.shutdown();
}

#[test]
fn test_query_outside_roots_is_empty() {
    let fs = Arc::new(MockFs::new());
    fs.create_file(Path::new("/tmp/findme.txt"), b"");
    fs.create_file(Path::new("/other/findme.txt"), b"");

    let mut finder = Finder::new(fs, config(&["/tmp"], &["findme.txt"]), CACHE).unwrap();
    assert!(finder.find_named_at(Path::new("/other"), "findme.txt").is_empty());
    assert!(finder.find_named_at(Path::new("/"), "findme.txt").is_empty());
    finder.shutdown();
}

#[test]
fn test_relative_query_returns_relative_results() {
    let fs = Arc::new(MockFs::new());
    fs.create_file(Path::new("/tmp/a/findme.txt"), b"");

    let mut cfg = config(&["/tmp"], &["findme.txt"]);
    cfg.working_dir = PathBuf::from("/tmp");
    let mut finder = Finder::new(fs, cfg, CACHE).unwrap();
    assert_eq!(
        finder.find_named_at(Path::new("a"), "findme.txt"),
        paths(&["a/findme.txt"])
    );
    finder.shutdown();
}

#[test]
fn test_overlapping_roots_deduplicated() {
    let fs = Arc::new(MockFs::new());
    fs.create_file(Path::new("/tmp/a/findme.txt"), b"");

    let mut finder = Finder::new(
        fs,
        config(&["/tmp", "/tmp/a"], &["findme.txt"]),
        CACHE,
    )
    .unwrap();
    assert_eq!(finder.find_named("findme.txt"), paths(&["/tmp/a/findme.txt"]));
    finder.shutdown();
}

// --- construction errors ---

#[test]
fn test_missing_root_is_an_error() {
    let fs = Arc::new(MockFs::new());
    assert!(Finder::new(fs, config(&["/nope"], &["x"]), CACHE).is_err());
}

#[test]
fn test_file_root_is_an_error() {
    let fs = Arc::new(MockFs::new());
    fs.create_file(Path::new("/tmp/file"), b"");
    assert!(Finder::new(fs, config(&["/tmp/file"], &["x"]), CACHE).is_err());
}

#[test]
fn test_unexpected_fs_error_fails_construction() {
    let fs = Arc::new(MockFs::new());
    fs.create_file(Path::new("/tmp/findme.txt"), b"");
    fs.mkdirs(Path::new("/tmp/bad"));
    fs.fail_path(Path::new("/tmp/bad"), ErrorKind::InvalidInput);
    assert!(Finder::new(fs, config(&["/tmp"], &["findme.txt"]), CACHE).is_err());
}

#[test]
fn test_permission_denied_subtree_is_tolerated() {
    let fs = Arc::new(MockFs::new());
    fs.create_file(Path::new("/tmp/findme.txt"), b"");
    fs.create_file(Path::new("/tmp/secret/findme.txt"), b"");
    fs.fail_path(Path::new("/tmp/secret"), ErrorKind::PermissionDenied);

    let mut finder = Finder::new(fs, config(&["/tmp"], &["findme.txt"]), CACHE).unwrap();
    assert_eq!(finder.find_named("findme.txt"), paths(&["/tmp/findme.txt"]));
    finder.shutdown();
}

// --- incremental reload ---

#[test]
fn test_second_run_reuses_cache_without_listing() {
    let fs = Arc::new(MockFs::new());
    fs.create_file(Path::new("/tmp/findme.txt"), b"");
    fs.create_file(Path::new("/tmp/a/findme.txt"), b"");

    let cfg = config(&["/tmp"], &["findme.txt"]);
    let mut finder = Finder::new(fs.clone(), cfg.clone(), CACHE).unwrap();
    let first = finder.find_named("findme.txt");
    finder.shutdown();

    fs.clear_calls();
    let mut finder = Finder::new(fs.clone(), cfg, CACHE).unwrap();
    assert_eq!(finder.find_named("findme.txt"), first);
    // Validation is stat-only: nothing was re-listed, and only known
    // directories were statted.
    assert!(fs.listed_paths().is_empty());
    for path in fs.statted_paths() {
        assert!(
            path == Path::new("/tmp") || path == Path::new("/tmp/a"),
            "unexpected stat of {}",
            path.display()
        );
    }
    finder.shutdown();
}

#[test]
fn test_unchanged_tree_does_not_rewrite_cache() {
    let fs = Arc::new(MockFs::new());
    fs.create_file(Path::new("/tmp/findme.txt"), b"");

    let cfg = config(&["/tmp"], &["findme.txt"]);
    let mut finder = Finder::new(fs.clone(), cfg.clone(), CACHE).unwrap();
    finder.shutdown();
    let written = fs.stat(Path::new(CACHE)).unwrap();

    // No filesystem changes: run two must leave the cache file untouched.
    let mut finder = Finder::new(fs.clone(), cfg.clone(), CACHE).unwrap();
    finder.shutdown();
    assert_eq!(fs.stat(Path::new(CACHE)).unwrap().sig(), written.sig());

    // A change forces a rewrite.
    fs.create_file(Path::new("/tmp/sub/findme.txt"), b"");
    let mut finder = Finder::new(fs.clone(), cfg, CACHE).unwrap();
    finder.shutdown();
    assert_ne!(fs.stat(Path::new(CACHE)).unwrap().sig(), written.sig());
}

#[test]
fn test_only_touched_directory_is_relisted() {
    let fs = Arc::new(MockFs::new());
    fs.create_file(Path::new("/tmp/a/findme.txt"), b"");
    fs.create_file(Path::new("/tmp/b/findme.txt"), b"");
    fs.create_file(Path::new("/tmp/c/findme.txt"), b"");

    let cfg = config(&["/tmp"], &["findme.txt"]);
    let mut finder = Finder::new(fs.clone(), cfg.clone(), CACHE).unwrap();
    finder.shutdown();

    // Only /tmp/b changes between runs.
    fs.create_file(Path::new("/tmp/b/findme2.txt"), b"");
    fs.clear_calls();

    let mut finder = Finder::new(fs.clone(), cfg, CACHE).unwrap();
    assert_eq!(
        finder.find_named("findme.txt"),
        paths(&["/tmp/a/findme.txt", "/tmp/b/findme.txt", "/tmp/c/findme.txt"])
    );
    assert_eq!(fs.listed_paths(), vec![PathBuf::from("/tmp/b")]);
    finder.shutdown();
}

#[test]
fn test_deleted_file_disappears_after_reload() {
    let fs = Arc::new(MockFs::new());
    fs.create_file(Path::new("/tmp/findme.txt"), b"");
    fs.create_file(Path::new("/tmp/a/findme.txt"), b"");

    let cfg = config(&["/tmp"], &["findme.txt"]);
    let mut finder = Finder::new(fs.clone(), cfg.clone(), CACHE).unwrap();
    finder.shutdown();

    fs.remove(Path::new("/tmp/a/findme.txt"));
    fs.clear_calls();
    let mut finder = Finder::new(fs.clone(), cfg, CACHE).unwrap();
    assert_eq!(finder.find_named("findme.txt"), paths(&["/tmp/findme.txt"]));
    assert_eq!(fs.listed_paths(), vec![PathBuf::from("/tmp/a")]);
    finder.shutdown();
}

#[test]
fn test_deleted_subtree_disappears_after_reload() {
    let fs = Arc::new(MockFs::new());
    fs.create_file(Path::new("/tmp/findme.txt"), b"");
    fs.create_file(Path::new("/tmp/a/b/findme.txt"), b"");

    let cfg = config(&["/tmp"], &["findme.txt"]);
    let mut finder = Finder::new(fs.clone(), cfg.clone(), CACHE).unwrap();
    finder.shutdown();

    fs.remove(Path::new("/tmp/a"));
    let mut finder = Finder::new(fs.clone(), cfg, CACHE).unwrap();
    assert_eq!(finder.find_named("findme.txt"), paths(&["/tmp/findme.txt"]));
    finder.shutdown();
}

#[test]
fn test_new_subtree_appears_after_reload() {
    let fs = Arc::new(MockFs::new());
    fs.create_file(Path::new("/tmp/findme.txt"), b"");

    let cfg = config(&["/tmp"], &["findme.txt"]);
    let mut finder = Finder::new(fs.clone(), cfg.clone(), CACHE).unwrap();
    finder.shutdown();

    fs.create_file(Path::new("/tmp/new/deep/findme.txt"), b"");
    let mut finder = Finder::new(fs.clone(), cfg, CACHE).unwrap();
    assert_eq!(
        finder.find_named("findme.txt"),
        paths(&["/tmp/findme.txt", "/tmp/new/deep/findme.txt"])
    );
    finder.shutdown();
}

// --- prune files ---

#[test]
fn test_prune_file_hides_directory_and_descendants() {
    let fs = Arc::new(MockFs::new());
    fs.create_file(Path::new("/tmp/findme.txt"), b"");
    fs.create_file(Path::new("/tmp/sub/findme.txt"), b"");
    fs.create_file(Path::new("/tmp/sub/deeper/findme.txt"), b"");
    fs.create_file(Path::new("/tmp/sub/PRUNE"), b"");

    let mut cfg = config(&["/tmp"], &["findme.txt"]);
    cfg.prune_files = vec!["PRUNE".to_string()];
    let mut finder = Finder::new(fs, cfg, CACHE).unwrap();
    assert_eq!(finder.find_named("findme.txt"), paths(&["/tmp/findme.txt"]));
    finder.shutdown();
}

#[test]
fn test_prune_file_added_between_runs_takes_effect() {
    let fs = Arc::new(MockFs::new());
    fs.create_file(Path::new("/tmp/findme.txt"), b"");
    fs.create_file(Path::new("/tmp/sub/findme.txt"), b"");
    fs.create_file(Path::new("/tmp/sub/deeper/findme.txt"), b"");

    let mut cfg = config(&["/tmp"], &["findme.txt"]);
    cfg.prune_files = vec!["PRUNE".to_string()];
    let mut finder = Finder::new(fs.clone(), cfg.clone(), CACHE).unwrap();
    assert_eq!(
        finder.find_named("findme.txt"),
        paths(&[
            "/tmp/findme.txt",
            "/tmp/sub/findme.txt",
            "/tmp/sub/deeper/findme.txt"
        ])
    );
    finder.shutdown();

    fs.create_file(Path::new("/tmp/sub/PRUNE"), b"");
    let mut finder = Finder::new(fs.clone(), cfg, CACHE).unwrap();
    assert_eq!(finder.find_named("findme.txt"), paths(&["/tmp/findme.txt"]));
    finder.shutdown();
}

// --- exclusions and symlinks ---

#[test]
fn test_excluded_directories_are_never_entered() {
    let fs = Arc::new(MockFs::new());
    fs.create_file(Path::new("/tmp/findme.txt"), b"");
    fs.create_file(Path::new("/tmp/out/findme.txt"), b"");
    fs.create_file(Path::new("/tmp/keep/out/findme.txt"), b"");

    let mut cfg = config(&["/tmp"], &["findme.txt"]);
    cfg.exclude_dirs = vec!["out".to_string()];
    let mut finder = Finder::new(fs.clone(), cfg, CACHE).unwrap();
    assert_eq!(finder.find_named("findme.txt"), paths(&["/tmp/findme.txt"]));
    // Exclusion is by basename at any depth, and excluded dirs are not
    // even listed.
    assert!(!fs.listed_paths().contains(&PathBuf::from("/tmp/out")));
    finder.shutdown();
}

#[test]
fn test_symlink_to_directory_is_not_traversed() {
    let fs = Arc::new(MockFs::new());
    fs.create_file(Path::new("/tmp/real/findme.txt"), b"");
    fs.symlink(Path::new("/tmp/alias"), Path::new("/tmp/real"));

    let mut finder = Finder::new(fs, config(&["/tmp"], &["findme.txt"]), CACHE).unwrap();
    assert_eq!(
        finder.find_named("findme.txt"),
        paths(&["/tmp/real/findme.txt"])
    );
    finder.shutdown();
}

#[test]
fn test_symlink_to_file_is_found_under_link_name() {
    let fs = Arc::new(MockFs::new());
    fs.create_file(Path::new("/tmp/real.txt"), b"");
    fs.symlink(Path::new("/tmp/findme.txt"), Path::new("/tmp/real.txt"));

    let mut finder = Finder::new(fs, config(&["/tmp"], &["findme.txt"]), CACHE).unwrap();
    assert_eq!(finder.find_named("findme.txt"), paths(&["/tmp/findme.txt"]));
    finder.shutdown();
}

#[test]
fn test_self_referential_symlink_does_not_loop() {
    let fs = Arc::new(MockFs::new());
    fs.create_file(Path::new("/tmp/other.txt"), b"");
    fs.symlink(Path::new("/tmp/findme.txt"), Path::new("/tmp/findme.txt"));

    // The dangling/cyclic link is treated as a plain file.
    let mut finder = Finder::new(fs, config(&["/tmp"], &["findme.txt"]), CACHE).unwrap();
    assert_eq!(finder.find_named("findme.txt"), paths(&["/tmp/findme.txt"]));
    finder.shutdown();
}
