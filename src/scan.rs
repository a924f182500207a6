//! Directory Scanner: discovers candidate files under a root according to a
//! layered set of inclusion/exclusion rules.
//!
//! Precedence, from strongest to weakest:
//! 1. ignored file names and ignored root-relative paths exclude a file outright,
//! 2. ignored extensions exclude a file,
//! 3. accepted extensions or a special include name admit a file,
//! 4. with no accepted extensions and no special names, every file is admitted.
//!
//! Directories named in `ignored_dir_names` are pruned before descent. Files
//! whose name is in `special_include_filenames` are found even inside pruned
//! directories, but still lose to rule 1.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};
use strum::{AsRefStr, EnumIter, IntoEnumIterator};
use tracing::{debug, info, warn};
use walkdir::{DirEntry, WalkDir};

use crate::error::ScanError;

/// Directory names pruned when the caller supplies none.
pub const DEFAULT_IGNORED_DIRS: &[&str] = &[
    "__pycache__",
    ".vscode",
    ".github",
    "venv",
    ".venv",
    ".mypy_cache",
    ".pytest_cache",
    ".ruff_cache",
];

/// Document types the store knows how to parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, AsRefStr)]
#[strum(serialize_all = "lowercase")]
pub enum DocumentType {
    Mp3,
    Csv,
    Eml,
    Msg,
    P7s,
    Epub,
    Xls,
    Xlsx,
    Html,
    Htm,
    Bmp,
    Heic,
    Jpeg,
    Jpg,
    Png,
    Tiff,
    Svg,
    Webp,
    Ico,
    Md,
    Odt,
    Pdf,
    Ppt,
    Pptx,
    Rst,
    Rtf,
    Doc,
    Docx,
    Org,
    Tsv,
    Txt,
    Json,
    Py,
    Css,
    Js,
    Ts,
}

impl DocumentType {
    /// The file suffix for this type, e.g. `.pdf`.
    pub fn extension(&self) -> String {
        format!(".{}", self.as_ref())
    }

    pub fn default_extensions() -> Vec<String> {
        DocumentType::iter().map(|t| t.extension()).collect()
    }
}

/// Caller-supplied rule overrides. An absent field takes its default; a
/// present field is used as given, even when empty.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterOverrides {
    pub ignored_dir_names: Option<Vec<String>>,
    pub accepted_extensions: Option<Vec<String>>,
    pub ignored_extensions: Option<Vec<String>>,
    pub special_include_filenames: Option<Vec<String>>,
    pub ignored_filenames: Option<Vec<String>>,
    pub ignored_relative_paths: Option<Vec<String>>,
}

/// Resolved, immutable rule set for one scan.
///
/// Extensions are stored lower-cased and compared case-insensitively; file
/// names and relative paths are compared exactly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterRuleSet {
    ignored_dir_names: HashSet<String>,
    accepted_extensions: Vec<String>,
    ignored_extensions: Vec<String>,
    special_include_filenames: HashSet<String>,
    ignored_filenames: HashSet<String>,
    ignored_relative_paths: HashSet<PathBuf>,
}

impl Default for FilterRuleSet {
    fn default() -> Self {
        Self::resolve(FilterOverrides::default())
    }
}

impl FilterRuleSet {
    /// Merge overrides with the built-in defaults.
    pub fn resolve(overrides: FilterOverrides) -> Self {
        let ignored_dir_names = overrides
            .ignored_dir_names
            .unwrap_or_else(|| DEFAULT_IGNORED_DIRS.iter().map(|d| d.to_string()).collect());
        let accepted_extensions = overrides
            .accepted_extensions
            .unwrap_or_else(DocumentType::default_extensions);

        Self {
            ignored_dir_names: ignored_dir_names.into_iter().collect(),
            accepted_extensions: lower_all(accepted_extensions),
            ignored_extensions: lower_all(overrides.ignored_extensions.unwrap_or_default()),
            special_include_filenames: overrides
                .special_include_filenames
                .unwrap_or_default()
                .into_iter()
                .collect(),
            ignored_filenames: overrides
                .ignored_filenames
                .unwrap_or_default()
                .into_iter()
                .collect(),
            ignored_relative_paths: overrides
                .ignored_relative_paths
                .unwrap_or_default()
                .iter()
                .map(|p| normalize(Path::new(p)))
                .collect(),
        }
    }

    pub fn is_ignored_dir(&self, name: &str) -> bool {
        self.ignored_dir_names.contains(name)
    }

    pub fn is_special(&self, file_name: &str) -> bool {
        self.special_include_filenames.contains(file_name)
    }

    /// Rule 1: file-name and relative-path exclusions.
    fn is_excluded(&self, file_name: &str, relative: &Path) -> bool {
        self.ignored_filenames.contains(file_name)
            || self.ignored_relative_paths.contains(&normalize(relative))
    }

    /// Full decision for a file seen during the filtered walk.
    pub fn admits(&self, file_name: &str, relative: &Path) -> bool {
        if self.is_excluded(file_name, relative) {
            return false;
        }
        let lower = file_name.to_lowercase();
        if self.ignored_extensions.iter().any(|ext| lower.ends_with(ext)) {
            return false;
        }
        let accept_all =
            self.accepted_extensions.is_empty() && self.special_include_filenames.is_empty();
        accept_all
            || self.is_special(file_name)
            || self.accepted_extensions.iter().any(|ext| lower.ends_with(ext))
    }
}

fn lower_all(values: Vec<String>) -> Vec<String> {
    values.into_iter().map(|v| v.to_lowercase()).collect()
}

/// Lexically normalise a relative path: drop `.`, fold `..` into its parent.
pub fn normalize(path: &Path) -> PathBuf {
    let mut parts: Vec<Component<'_>> = Vec::new();
    for comp in path.components() {
        match comp {
            Component::CurDir => {}
            Component::ParentDir => match parts.last() {
                Some(Component::Normal(_)) => {
                    parts.pop();
                }
                _ => parts.push(comp),
            },
            other => parts.push(other),
        }
    }
    if parts.is_empty() {
        return PathBuf::from(".");
    }
    parts.iter().collect()
}

/// Ordered, deduplicated, non-empty list of absolute file paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchedFiles {
    paths: Vec<PathBuf>,
}

impl MatchedFiles {
    pub fn as_slice(&self) -> &[PathBuf] {
        &self.paths
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn into_vec(self) -> Vec<PathBuf> {
        self.paths
    }
}

impl std::ops::Deref for MatchedFiles {
    type Target = [PathBuf];

    fn deref(&self) -> &[PathBuf] {
        &self.paths
    }
}

impl IntoIterator for MatchedFiles {
    type Item = PathBuf;
    type IntoIter = std::vec::IntoIter<PathBuf>;

    fn into_iter(self) -> Self::IntoIter {
        self.paths.into_iter()
    }
}

#[derive(Default)]
struct Collector {
    seen: HashSet<PathBuf>,
    paths: Vec<PathBuf>,
}

impl Collector {
    fn push(&mut self, path: PathBuf) {
        if self.seen.insert(path.clone()) {
            self.paths.push(path);
        }
    }
}

/// Scan `root` and return every file admitted by `rules`.
///
/// Returns `Ok(None)` when the scan ran but nothing matched.
pub fn scan(root: &Path, rules: &FilterRuleSet) -> Result<Option<MatchedFiles>, ScanError> {
    if root.as_os_str().is_empty() {
        return Err(ScanError::InvalidRoot(String::new()));
    }
    let root = std::path::absolute(root)
        .map_err(|e| ScanError::InvalidRoot(format!("{}: {e}", root.display())))?;
    match std::fs::metadata(&root) {
        Ok(meta) if !meta.is_dir() => {
            warn!(root = %root.display(), "Root is not a directory, nothing to scan");
            return Ok(None);
        }
        Ok(_) => {}
        Err(source) => return Err(ScanError::Io { path: root, source }),
    }
    info!(root = %root.display(), "Scanning directory");

    let mut collector = Collector::default();

    if !rules.special_include_filenames.is_empty() {
        for entry in walk(&root, |_| true) {
            let Some(entry) = visit(entry, &root)? else {
                continue;
            };
            let Some((name, relative)) = file_parts(&entry, &root) else {
                continue;
            };
            if rules.is_special(&name) && !rules.is_excluded(&name, &relative) {
                debug!(path = %entry.path().display(), "Matched special include file");
                collector.push(entry.into_path());
            }
        }
    }

    let walker = walk(&root, |entry| {
        if entry.depth() == 0 || !entry.file_type().is_dir() {
            return true;
        }
        let keep = entry
            .file_name()
            .to_str()
            .map_or(true, |name| !rules.is_ignored_dir(name));
        if !keep {
            debug!(path = %entry.path().display(), "Pruning ignored directory");
        }
        keep
    });
    for entry in walker {
        let Some(entry) = visit(entry, &root)? else {
            continue;
        };
        let Some((name, relative)) = file_parts(&entry, &root) else {
            continue;
        };
        if rules.admits(&name, &relative) {
            collector.push(entry.into_path());
        }
    }

    info!(root = %root.display(), matched = collector.paths.len(), "Scan complete");
    if collector.paths.is_empty() {
        Ok(None)
    } else {
        Ok(Some(MatchedFiles {
            paths: collector.paths,
        }))
    }
}

fn walk<'a, P>(root: &Path, keep: P) -> impl Iterator<Item = walkdir::Result<DirEntry>> + 'a
where
    P: FnMut(&DirEntry) -> bool + 'a,
{
    WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(keep)
}

/// Errors on the root abort the scan; errors below it are logged and skipped.
fn visit(entry: walkdir::Result<DirEntry>, root: &Path) -> Result<Option<DirEntry>, ScanError> {
    match entry {
        Ok(entry) => Ok(Some(entry)),
        Err(e) if e.depth() == 0 => {
            let path = e.path().unwrap_or(root).to_path_buf();
            let source = e
                .into_io_error()
                .unwrap_or_else(|| std::io::Error::other("filesystem loop at root"));
            Err(ScanError::Io { path, source })
        }
        Err(e) => {
            warn!(error = %e, "Skipping unreadable entry");
            Ok(None)
        }
    }
}

/// File name and root-relative path for regular files and links to them;
/// `None` for anything else. Directory links are never followed.
fn file_parts(entry: &DirEntry, root: &Path) -> Option<(String, PathBuf)> {
    let is_file = entry.file_type().is_file()
        || (entry.path_is_symlink() && entry.path().is_file());
    if !is_file {
        return None;
    }
    let name = entry.file_name().to_string_lossy().into_owned();
    let relative = entry.path().strip_prefix(root).ok()?.to_path_buf();
    Some((name, relative))
}
