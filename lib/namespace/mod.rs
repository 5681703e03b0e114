//! Maps remote file records onto a directory tree.
//!
//! [`build`] is pure: the same records in the same order always produce the same
//! [`NamespaceSnapshot`]. Snapshots are never edited after construction; the refresh loop builds a
//! fresh one each cycle and swaps it in through [`PublishedNamespace`].

mod published;
mod record;

pub use published::PublishedNamespace;
pub use record::{FileRecord, MediaType};

use std::borrow::Cow;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use serde::Deserialize;
use tracing::debug;

/// Path of the root directory.
pub const ROOT: &str = "/";
/// Curated-mode directory holding movies.
pub const MOVIES_DIR: &str = "/movies";
/// Curated-mode directory holding series and anime.
pub const SERIES_DIR: &str = "/series";

/// How records are laid out in the tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NamespaceMode {
    /// Media-library layout under `/movies` and `/series`.
    #[default]
    Curated,
    /// The remote's own relative paths, verbatim.
    Mirror,
}

/// An immutable directory tree plus a path-to-record index.
///
/// Every key of the file index has its whole ancestor chain present as directories, and every
/// file listed as a child of a directory is a key of the file index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamespaceSnapshot {
    mode: NamespaceMode,
    structure: BTreeMap<String, Vec<String>>,
    file_index: HashMap<String, Arc<FileRecord>>,
    total_bytes: u64,
    skipped: usize,
}

impl NamespaceSnapshot {
    /// The snapshot for an account with no files.
    #[must_use]
    pub fn empty(mode: NamespaceMode) -> Self {
        build(Vec::new(), mode)
    }

    /// The layout this snapshot was built with.
    #[must_use]
    pub fn mode(&self) -> NamespaceMode {
        self.mode
    }

    /// Directory path to sorted child names.
    #[must_use]
    pub fn structure(&self) -> &BTreeMap<String, Vec<String>> {
        &self.structure
    }

    /// Children of the directory at `path`, or `None` if it is not a directory.
    #[must_use]
    pub fn children(&self, path: &str) -> Option<&[String]> {
        self.structure.get(normalize(path).as_ref()).map(Vec::as_slice)
    }

    /// Whether `path` names a directory.
    #[must_use]
    pub fn is_dir(&self, path: &str) -> bool {
        self.structure.contains_key(normalize(path).as_ref())
    }

    /// The record for the file at `path`, or `None` if it is not a file.
    #[must_use]
    pub fn file(&self, path: &str) -> Option<&Arc<FileRecord>> {
        self.file_index.get(normalize(path).as_ref())
    }

    /// Every indexed file path and its record, in no particular order.
    pub fn files(&self) -> impl Iterator<Item = (&str, &Arc<FileRecord>)> {
        self.file_index.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of indexed files.
    #[must_use]
    pub fn file_count(&self) -> usize {
        self.file_index.len()
    }

    /// Number of directories, root included.
    #[must_use]
    pub fn dir_count(&self) -> usize {
        self.structure.len()
    }

    /// Sum of the sizes of every indexed file.
    #[must_use]
    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    /// Records dropped while building, either malformed or colliding with a directory.
    #[must_use]
    pub fn skipped(&self) -> usize {
        self.skipped
    }
}

/// Canonical form of a lookup path: leading `/`, no repeated or trailing separators.
#[must_use]
pub fn normalize(path: &str) -> Cow<'_, str> {
    let canonical = path.starts_with('/')
        && (path == ROOT || !path.ends_with('/'))
        && !path.contains("//");
    if canonical {
        return Cow::Borrowed(path);
    }
    let joined = path
        .split('/')
        .filter(|c| !c.is_empty())
        .collect::<Vec<_>>()
        .join("/");
    Cow::Owned(format!("/{joined}"))
}

/// Parent directory of a normalized, non-root path.
#[must_use]
pub fn parent(path: &str) -> &str {
    match path.rfind('/') {
        Some(0) | None => ROOT,
        Some(i) => &path[..i],
    }
}

/// Last component of a normalized path. Empty for the root.
#[must_use]
pub fn file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or_default()
}

/// Build a snapshot from a full listing.
///
/// Records that cannot be placed are skipped with a debug-level event. Duplicate file paths keep
/// the last record. A file whose path is also needed as a directory is dropped.
#[must_use]
pub fn build(records: Vec<FileRecord>, mode: NamespaceMode) -> NamespaceSnapshot {
    let mut skipped = 0usize;
    let mut file_index: HashMap<String, Arc<FileRecord>> = HashMap::with_capacity(records.len());

    for record in records {
        match place(&record, mode) {
            Ok(components) => {
                file_index.insert(format!("/{}", components.join("/")), Arc::new(record));
            }
            Err(reason) => {
                skipped += 1;
                debug!(
                    path = ?record.path,
                    file_name = ?record.file_name,
                    media_type = ?record.media_type,
                    reason,
                    "skipping record"
                );
            }
        }
    }

    let mut dirs: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    dirs.insert(ROOT.to_owned(), BTreeSet::new());
    if mode == NamespaceMode::Curated {
        add_dir(&mut dirs, MOVIES_DIR);
        add_dir(&mut dirs, SERIES_DIR);
    }
    for path in file_index.keys() {
        add_dir(&mut dirs, parent(path));
    }

    file_index.retain(|path, _| {
        let collides = dirs.contains_key(path);
        if collides {
            skipped += 1;
            debug!(path = %path, "file path is also a directory, skipping");
        }
        !collides
    });

    for path in file_index.keys() {
        if let Some(children) = dirs.get_mut(parent(path)) {
            children.insert(file_name(path).to_owned());
        }
    }

    let total_bytes = file_index.values().map(|r| r.file_size).sum();
    let structure = dirs
        .into_iter()
        .map(|(dir, children)| (dir, children.into_iter().collect()))
        .collect();

    NamespaceSnapshot {
        mode,
        structure,
        file_index,
        total_bytes,
        skipped,
    }
}

/// Register `dir` and every ancestor as directories, each linked into its parent.
fn add_dir(dirs: &mut BTreeMap<String, BTreeSet<String>>, dir: &str) {
    let mut current = dir;
    while current != ROOT {
        dirs.entry(current.to_owned()).or_default();
        let up = parent(current);
        dirs.entry(up.to_owned())
            .or_default()
            .insert(file_name(current).to_owned());
        current = up;
    }
}

/// Path components for `record` under `mode`, or why it cannot be placed.
fn place(record: &FileRecord, mode: NamespaceMode) -> Result<Vec<&str>, &'static str> {
    match mode {
        NamespaceMode::Mirror => {
            let path = record.path.as_deref().ok_or("missing path")?;
            let components: Vec<&str> = path.split('/').filter(|c| !c.is_empty()).collect();
            if components.is_empty() {
                return Err("empty path");
            }
            if components.iter().any(|c| *c == "." || *c == "..") {
                return Err("path contains a relative component");
            }
            Ok(components)
        }
        NamespaceMode::Curated => {
            let root = component(record.root_folder.as_deref())?;
            let file = component(record.file_name.as_deref())?;
            match record.media_type {
                MediaType::Movie => Ok(vec!["movies", root, file]),
                MediaType::Series | MediaType::Anime => {
                    let folder = component(record.folder_name.as_deref())?;
                    Ok(vec!["series", root, folder, file])
                }
                MediaType::Unknown => Err("unknown media type"),
            }
        }
    }
}

fn component(name: Option<&str>) -> Result<&str, &'static str> {
    match name {
        None => Err("missing name component"),
        Some("" | "." | "..") => Err("invalid name component"),
        Some(n) if n.contains('/') => Err("name component contains a separator"),
        Some(n) => Ok(n),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_collapses_separators() {
        assert_eq!(normalize("/"), "/");
        assert_eq!(normalize(""), "/");
        assert_eq!(normalize("/movies/"), "/movies");
        assert_eq!(normalize("//movies//Foo"), "/movies/Foo");
        assert_eq!(normalize("movies"), "/movies");
        assert!(matches!(normalize("/movies/Foo"), Cow::Borrowed(_)));
    }

    #[test]
    fn parent_and_name_split_the_last_component() {
        assert_eq!(parent("/movies"), "/");
        assert_eq!(parent("/movies/Foo/a.mkv"), "/movies/Foo");
        assert_eq!(file_name("/movies/Foo/a.mkv"), "a.mkv");
        assert_eq!(file_name("/"), "");
    }

    #[test]
    fn components_reject_traversal() {
        assert!(component(Some("..")).is_err());
        assert!(component(Some("a/b")).is_err());
        assert!(component(Some("")).is_err());
        assert_eq!(component(Some("Foo (2020)")), Ok("Foo (2020)"));
    }
}
