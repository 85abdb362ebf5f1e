//! Store path classification.
//!
//! The store is a single directory whose immediate children (store
//! objects) are the unit of garbage collection. This module decides, by
//! purely lexical means, whether a path lies inside the store and which
//! store object it belongs to. Nothing here touches the filesystem.

use std::path::{Component, Path, PathBuf};

use regex::Regex;

/// Lexical rule for a store object name: one or more of `[0-9a-z]`,
/// then any number of `[0-9a-zA-Z+-._?=]`.
const OBJECT_NAME_PATTERN: &str = r"[0-9a-z]+[0-9a-zA-Z+\-._?=]*";

/// The store root plus the two regexes derived from it, compiled once at
/// startup and reused for every scan.
#[derive(Debug, Clone)]
pub struct StoreDir {
    dir: PathBuf,
    name_re: Regex,
    path_re: Regex,
}

impl StoreDir {
    pub fn new(dir: impl Into<PathBuf>) -> StoreDir {
        let dir = dir.into();
        let name_re = Regex::new(&format!("^{OBJECT_NAME_PATTERN}$"))
            .expect("object name pattern is a valid regex");
        let path_re = Regex::new(&format!(
            "{}/{OBJECT_NAME_PATTERN}",
            regex::escape(&dir.to_string_lossy())
        ))
        .expect("store path pattern is a valid regex");
        StoreDir { dir, name_re, path_re }
    }

    /// The store root directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// True iff `path` is the store root or lies below it. The comparison
    /// is component-wise, so `/nix/storeOther` does not count as inside
    /// `/nix/store`.
    pub fn contains(&self, path: &Path) -> bool {
        path.starts_with(&self.dir)
    }

    /// True iff `name` satisfies the store object lexical rule.
    pub fn is_valid_object_name(&self, name: &str) -> bool {
        self.name_re.is_match(name)
    }

    /// The store object `path` belongs to, if any: the store root joined
    /// with the first path component below it, provided that component is
    /// a valid object name. `/nix/store/abc-x/bin/sh` yields
    /// `/nix/store/abc-x`; the store root itself and children with
    /// invalid names yield `None`.
    pub fn object_below(&self, path: &Path) -> Option<PathBuf> {
        let rel = path.strip_prefix(&self.dir).ok()?;
        let first = match rel.components().next()? {
            Component::Normal(name) => name,
            _ => return None,
        };
        let name = first.to_str()?;
        if self.is_valid_object_name(name) {
            Some(self.dir.join(first))
        } else {
            None
        }
    }

    /// Regex matching a store object path as a substring of arbitrary
    /// text. Used by the content scanners.
    pub fn path_regex(&self) -> &Regex {
        &self.path_re
    }
}
