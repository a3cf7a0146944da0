//! Repository file discovery.
//!
//! Walks the configured include roots of a checkout and decides which
//! files enter indexing. Directories matching an ignore glob, and hidden
//! directories other than `.github`, are pruned without descending.
//! Every excluded file is counted under the reason it was dropped so a
//! run can be audited with `factgap discover`.
//!
//! Order is deterministic: single-file roots first, then directory roots
//! in configuration order, each walked sorted by file name.

use std::collections::BTreeSet;
use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::Serialize;
use walkdir::WalkDir;

use crate::config::DiscoveryConfig;

/// Bytes inspected for NUL when sniffing binary files.
const BINARY_SNIFF_BYTES: usize = 8192;

const SUPPORTED_EXTENSIONS: &[&str] = &[
    "py", "js", "ts", "tsx", "jsx", "md", "txt", "go", "rs", "java", "rb", "php", "c", "cpp", "h",
    "hpp", "cs", "swift", "kt", "scala", "yml", "yaml", "json", "toml", "ini", "cfg", "conf", "rst",
];

const DOCUMENT_EXTENSIONS: &[&str] = &["md", "txt", "rst"];

/// Compiled ignore globs, shared by discovery and PR indexing.
pub struct IgnoreMatcher {
    set: GlobSet,
}

impl IgnoreMatcher {
    pub fn new(patterns: &[String]) -> Result<Self> {
        let mut builder = GlobSetBuilder::new();
        for pattern in patterns {
            builder.add(
                Glob::new(pattern).with_context(|| format!("Invalid ignore glob: {}", pattern))?,
            );
        }
        Ok(Self {
            set: builder.build()?,
        })
    }

    /// `path` is relative to the repo root, `/`-separated.
    pub fn is_ignored(&self, path: &str) -> bool {
        self.set.is_match(path)
    }

    pub fn is_ignored_dir(&self, path: &str) -> bool {
        self.set.is_match(path) || self.set.is_match(format!("{}/", path.trim_end_matches('/')))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    IgnoredDirPruned,
    HiddenDirPruned,
    IgnoredPath,
    TestFile,
    UnsupportedExt,
    TooLarge,
    Binary,
    Unreadable,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct DiscoveryStats {
    pub dirs_visited: usize,
    pub files_seen: usize,
    pub files_included: usize,
    pub ignored_dir_pruned: usize,
    pub hidden_dir_pruned: usize,
    pub ignored_path: usize,
    pub test_file: usize,
    pub unsupported_ext: usize,
    pub too_large: usize,
    pub binary: usize,
    pub unreadable: usize,
    /// Top-level entries of the checkout that no include root covers.
    pub outside_include_roots: usize,
    /// `max_files` was hit and the walk stopped early.
    pub cap_reached: bool,
}

impl DiscoveryStats {
    fn record(&mut self, reason: SkipReason) {
        let slot = match reason {
            SkipReason::IgnoredDirPruned => &mut self.ignored_dir_pruned,
            SkipReason::HiddenDirPruned => &mut self.hidden_dir_pruned,
            SkipReason::IgnoredPath => &mut self.ignored_path,
            SkipReason::TestFile => &mut self.test_file,
            SkipReason::UnsupportedExt => &mut self.unsupported_ext,
            SkipReason::TooLarge => &mut self.too_large,
            SkipReason::Binary => &mut self.binary,
            SkipReason::Unreadable => &mut self.unreadable,
        };
        *slot += 1;
    }

    /// Files seen but not included. Pruned directories are not files.
    pub fn total_skipped(&self) -> usize {
        self.ignored_path
            + self.test_file
            + self.unsupported_ext
            + self.too_large
            + self.binary
            + self.unreadable
    }
}

fn extension(path: &str) -> Option<String> {
    Path::new(path)
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
}

pub fn is_supported_extension(path: &str) -> bool {
    extension(path).is_some_and(|e| SUPPORTED_EXTENSIONS.contains(&e.as_str()))
}

/// Prose files are indexed as `repo_doc`; everything else as `code`.
pub fn is_document(path: &str) -> bool {
    extension(path).is_some_and(|e| DOCUMENT_EXTENSIONS.contains(&e.as_str()))
}

/// `test_*` files, `*_test` stems, and anything under a `test`/`tests` directory.
pub fn is_test_file(path: &str) -> bool {
    let p = Path::new(path);
    let name = p
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let stem = p
        .file_stem()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    if name.starts_with("test_") || stem.ends_with("_test") {
        return true;
    }
    p.parent().is_some_and(|dir| {
        dir.components()
            .any(|c| matches!(c.as_os_str().to_str(), Some("test") | Some("tests")))
    })
}

fn relative_str(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

fn is_hidden_dir(name: &str) -> bool {
    name.starts_with('.') && name != ".github"
}

fn sniff_binary(path: &Path) -> std::io::Result<bool> {
    let mut file = std::fs::File::open(path)?;
    let mut buf = vec![0u8; BINARY_SNIFF_BYTES];
    let mut filled = 0;
    while filled < buf.len() {
        let n = file.read(&mut buf[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(buf[..filled].contains(&0))
}

struct Filter<'a> {
    config: &'a DiscoveryConfig,
    ignore: &'a IgnoreMatcher,
}

impl Filter<'_> {
    fn check_file(&self, rel: &str, path: &Path) -> Result<(), SkipReason> {
        if self.ignore.is_ignored(rel) {
            return Err(SkipReason::IgnoredPath);
        }
        if !self.config.include_tests && is_test_file(rel) {
            return Err(SkipReason::TestFile);
        }
        if !is_supported_extension(rel) {
            return Err(SkipReason::UnsupportedExt);
        }
        let size = std::fs::metadata(path)
            .map_err(|_| SkipReason::Unreadable)?
            .len();
        if size > self.config.max_file_bytes {
            return Err(SkipReason::TooLarge);
        }
        match sniff_binary(path) {
            Ok(true) => Err(SkipReason::Binary),
            Ok(false) => Ok(()),
            Err(_) => Err(SkipReason::Unreadable),
        }
    }

    fn prune_dir(&self, rel: &str, name: &str) -> Option<SkipReason> {
        if is_hidden_dir(name) {
            Some(SkipReason::HiddenDirPruned)
        } else if self.ignore.is_ignored_dir(rel) {
            Some(SkipReason::IgnoredDirPruned)
        } else {
            None
        }
    }
}

/// Discover indexable files under `repo_root`.
///
/// Returns repo-relative paths in discovery order.
pub fn discover_files(
    repo_root: &Path,
    config: &DiscoveryConfig,
) -> Result<(Vec<PathBuf>, DiscoveryStats)> {
    if !repo_root.is_dir() {
        anyhow::bail!("Repository root is not a directory: {}", repo_root.display());
    }

    let ignore = IgnoreMatcher::new(&config.ignore_globs)?;
    let filter = Filter {
        config,
        ignore: &ignore,
    };
    let mut stats = DiscoveryStats {
        outside_include_roots: count_outside_roots(repo_root, &config.include_roots)?,
        ..DiscoveryStats::default()
    };
    let mut seen = BTreeSet::new();
    let mut files = Vec::new();

    let (file_roots, dir_roots): (Vec<&String>, Vec<&String>) = config
        .include_roots
        .iter()
        .partition(|root| !root.ends_with('/') && repo_root.join(root).is_file());

    for root in file_roots {
        if files.len() >= config.max_files {
            stats.cap_reached = true;
            break;
        }
        let rel = root.trim_start_matches("./").to_string();
        if !seen.insert(rel.clone()) {
            continue;
        }
        stats.files_seen += 1;
        match filter.check_file(&rel, &repo_root.join(&rel)) {
            Ok(()) => files.push(PathBuf::from(rel)),
            Err(reason) => stats.record(reason),
        }
    }

    'roots: for root in dir_roots {
        if stats.cap_reached {
            break;
        }
        let dir = repo_root.join(root.trim_end_matches('/'));
        if !dir.is_dir() {
            tracing::debug!("Include root not found: {}", root);
            continue;
        }

        let mut walker = WalkDir::new(&dir)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter();
        while let Some(entry) = walker.next() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::debug!("Walk error under {}: {}", root, e);
                    stats.record(SkipReason::Unreadable);
                    continue;
                }
            };
            let rel = relative_str(repo_root, entry.path());

            if entry.file_type().is_dir() {
                if entry.depth() > 0 {
                    let name = entry.file_name().to_string_lossy();
                    if let Some(reason) = filter.prune_dir(&rel, &name) {
                        stats.record(reason);
                        walker.skip_current_dir();
                        continue;
                    }
                }
                stats.dirs_visited += 1;
                continue;
            }
            if !entry.file_type().is_file() {
                continue;
            }

            if !seen.insert(rel.clone()) {
                continue;
            }
            if files.len() >= config.max_files {
                stats.cap_reached = true;
                break 'roots;
            }
            stats.files_seen += 1;
            match filter.check_file(&rel, entry.path()) {
                Ok(()) => files.push(PathBuf::from(rel)),
                Err(reason) => stats.record(reason),
            }
        }
    }

    stats.files_included = files.len();
    tracing::info!(
        "Discovered {} files ({} seen, {} skipped, {} dirs)",
        stats.files_included,
        stats.files_seen,
        stats.total_skipped(),
        stats.dirs_visited
    );
    Ok((files, stats))
}

fn count_outside_roots(repo_root: &Path, include_roots: &[String]) -> Result<usize> {
    let covered: BTreeSet<&str> = include_roots
        .iter()
        .filter_map(|r| r.trim_start_matches("./").split('/').find(|s| !s.is_empty()))
        .collect();

    let mut outside = 0;
    for entry in std::fs::read_dir(repo_root)
        .with_context(|| format!("Failed to list {}", repo_root.display()))?
    {
        let name = entry?.file_name().to_string_lossy().to_string();
        if !covered.contains(name.as_str()) {
            outside += 1;
        }
    }
    Ok(outside)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_test_file_heuristic() {
        assert!(is_test_file("src/test_billing.py"));
        assert!(is_test_file("pkg/billing_test.go"));
        assert!(is_test_file("tests/integration.rs"));
        assert!(is_test_file("app/test/helpers.js"));
        assert!(!is_test_file("src/testing.py"));
        assert!(!is_test_file("src/contest.rs"));
    }

    #[test]
    fn test_extension_checks() {
        assert!(is_supported_extension("src/lib.RS"));
        assert!(is_supported_extension("config/app.yaml"));
        assert!(!is_supported_extension("assets/logo.png"));
        assert!(!is_supported_extension("Makefile"));
        assert!(is_document("docs/adr/0001.md"));
        assert!(!is_document("src/main.rs"));
    }

    #[test]
    fn test_ignore_matcher_dirs() {
        let m = IgnoreMatcher::new(&["**/node_modules/**".to_string()]).unwrap();
        assert!(m.is_ignored_dir("node_modules"));
        assert!(m.is_ignored_dir("web/node_modules"));
        assert!(m.is_ignored("web/node_modules/react/index.js"));
        assert!(!m.is_ignored_dir("src"));
    }

    #[test]
    fn test_invalid_glob_rejected() {
        assert!(IgnoreMatcher::new(&["src/[".to_string()]).is_err());
    }
}
