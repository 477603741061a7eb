//! VirtualTree: an ordered, in-memory snapshot of a definitions directory.
//!
//! Loaded once per run from disk (see `buildabot-infra::filesystem`), then
//! mutated only by the variable injector and read by every later stage.

use std::collections::btree_map;
use std::collections::{BTreeMap, BTreeSet};

/// Ordered mapping from normalized absolute path to text content.
///
/// Keys always use `/` separators and live under `root`. Iteration order is
/// lexicographic, which keeps every downstream stage deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VirtualTree {
    root: String,
    files: BTreeMap<String, String>,
    /// Paths that exist on disk but could not be read, with the reason.
    unreadable: BTreeMap<String, String>,
}

impl VirtualTree {
    /// Create an empty tree rooted at `root`.
    pub fn new(root: impl AsRef<str>) -> Self {
        Self {
            root: normalize_path(root.as_ref()),
            files: BTreeMap::new(),
            unreadable: BTreeMap::new(),
        }
    }

    /// Build a tree from `(path relative to root, content)` pairs.
    ///
    /// Convenient for tests and for hosts that synthesize definitions.
    pub fn from_relative<I, P, C>(root: impl AsRef<str>, entries: I) -> Self
    where
        I: IntoIterator<Item = (P, C)>,
        P: AsRef<str>,
        C: Into<String>,
    {
        let mut tree = Self::new(root);
        for (path, content) in entries {
            let full = tree.join(path.as_ref());
            tree.files.insert(full, content.into());
        }
        tree
    }

    /// The normalized root directory.
    pub fn root(&self) -> &str {
        &self.root
    }

    /// Insert or replace a file. The path is normalized first.
    pub fn insert(&mut self, path: impl AsRef<str>, content: impl Into<String>) {
        self.files.insert(normalize_path(path.as_ref()), content.into());
    }

    /// Record a file that could not be read. Only its entity fails to compile.
    pub fn mark_unreadable(&mut self, path: impl AsRef<str>, reason: impl Into<String>) {
        self.unreadable
            .insert(normalize_path(path.as_ref()), reason.into());
    }

    /// Unreadable files as `(path, reason)` pairs in path order.
    pub fn unreadable(&self) -> btree_map::Iter<'_, String, String> {
        self.unreadable.iter()
    }

    /// Read a file by its full path.
    pub fn get(&self, path: &str) -> Option<&str> {
        self.files.get(path).map(String::as_str)
    }

    /// Whether a file exists at the full path.
    pub fn contains(&self, path: &str) -> bool {
        self.files.contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// No readable or unreadable files at all.
    pub fn is_empty(&self) -> bool {
        self.files.is_empty() && self.unreadable.is_empty()
    }

    /// Iterate over `(path, content)` pairs in path order.
    pub fn iter(&self) -> btree_map::Iter<'_, String, String> {
        self.files.iter()
    }

    /// Join a root-relative path onto the root.
    pub fn join(&self, relative: &str) -> String {
        let relative = normalize_path(relative);
        let relative = relative.trim_start_matches('/');
        if self.root.is_empty() {
            relative.to_string()
        } else if self.root == "/" {
            format!("/{relative}")
        } else {
            format!("{}/{relative}", self.root)
        }
    }

    /// Strip the root from a full path, returning the root-relative part.
    pub fn relative<'a>(&self, path: &'a str) -> Option<&'a str> {
        if self.root.is_empty() {
            return Some(path);
        }
        let rest = path.strip_prefix(self.root.as_str())?;
        if self.root == "/" {
            return Some(rest);
        }
        rest.strip_prefix('/')
    }

    /// The entity (top-level directory) a file belongs to.
    ///
    /// Files sitting directly in the root belong to no entity.
    pub fn entity_of<'a>(&self, path: &'a str) -> Option<&'a str> {
        let relative = self.relative(path)?;
        let (entity, rest) = relative.split_once('/')?;
        if entity.is_empty() || rest.is_empty() {
            return None;
        }
        Some(entity)
    }

    /// Every entity name that owns at least one file.
    pub fn entity_names(&self) -> BTreeSet<String> {
        self.files
            .keys()
            .chain(self.unreadable.keys())
            .filter_map(|path| self.entity_of(path))
            .map(str::to_string)
            .collect()
    }

    /// Full path of a directory (or file) inside an entity.
    pub fn entity_path(&self, entity: &str, rest: &str) -> String {
        if rest.is_empty() {
            self.join(entity)
        } else {
            self.join(&format!("{entity}/{rest}"))
        }
    }

    /// Files strictly below a directory, in path order.
    pub fn files_under<'a>(
        &'a self,
        dir: &'a str,
    ) -> impl Iterator<Item = (&'a String, &'a String)> + 'a {
        let prefix = format!("{}/", dir.trim_end_matches('/'));
        self.files
            .range(prefix.clone()..)
            .take_while(move |(path, _)| path.starts_with(&prefix))
    }

    /// Files belonging to one entity, in path order.
    pub fn entity_files<'a>(
        &'a self,
        entity: &str,
    ) -> impl Iterator<Item = (&'a String, &'a String)> + 'a {
        let dir = self.join(entity);
        let prefix = format!("{dir}/");
        self.files
            .range(prefix.clone()..)
            .take_while(move |(path, _)| path.starts_with(&prefix))
    }

    /// Replace the content of several files at once.
    ///
    /// Used by the injector to commit one entity's rewritten files only
    /// after every file in that entity substituted cleanly.
    pub fn commit(&mut self, rewritten: BTreeMap<String, String>) {
        self.files.extend(rewritten);
    }
}

impl IntoIterator for VirtualTree {
    type Item = (String, String);
    type IntoIter = btree_map::IntoIter<String, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.files.into_iter()
    }
}

/// Base filename of a `/`-separated path.
pub fn file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// Filename without its final extension (`faq.txt` -> `faq`).
pub fn file_stem(path: &str) -> &str {
    let name = file_name(path);
    match name.rfind('.') {
        Some(0) | None => name,
        Some(idx) => &name[..idx],
    }
}

/// Normalize a path to `/` separators without `.` segments, duplicate
/// separators or a trailing separator.
pub fn normalize_path(path: &str) -> String {
    let unified = path.replace('\\', "/");
    let absolute = unified.starts_with('/');
    let segments: Vec<&str> = unified
        .split('/')
        .filter(|segment| !segment.is_empty() && *segment != ".")
        .collect();
    let joined = segments.join("/");
    match (absolute, joined.is_empty()) {
        (true, true) => "/".to_string(),
        (true, false) => format!("/{joined}"),
        (false, _) => joined,
    }
}
