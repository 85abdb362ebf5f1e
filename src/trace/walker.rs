//! Bounded walk from starting paths down to the store.
//!
//! The walk inspects every path by its link-status (the final symlink is
//! never followed implicitly) and dispatches on file type. Directories
//! are descended for free; each symlink resolution consumes one hop from
//! a fixed budget, so adversarial link chains and cycles terminate.
//! Filesystem errors on individual paths are expected on untrusted user
//! trees and never abort the walk.

use std::fs::{self, FileType};
use std::path::{Path, PathBuf};

use tracing::debug;

use super::TraceResult;
use crate::store::StoreDir;

/// Symlink resolutions allowed per chain. Indirect roots are by
/// convention one link into user space plus one link into the store;
/// anything longer is treated as unreachable.
const MAX_LINK_HOPS: u32 = 2;

/// Walks starting paths down to store objects.
pub struct Tracer<'a> {
    store: &'a StoreDir,
}

impl<'a> Tracer<'a> {
    pub fn new(store: &'a StoreDir) -> Tracer<'a> {
        Tracer { store }
    }

    /// Trace every starting path, accumulating reachable store objects
    /// and dangling symlinks.
    pub fn trace<I>(&self, starts: I) -> TraceResult
    where
        I: IntoIterator<Item = PathBuf>,
    {
        let mut result = TraceResult::default();
        for start in starts {
            self.visit(&start, MAX_LINK_HOPS, &mut result);
        }
        result
    }

    /// Inspect one path by its link-status and dispatch on file type.
    fn visit(&self, path: &Path, hops_left: u32, result: &mut TraceResult) {
        debug!(path = %path.display(), "considering");
        let meta = match fs::symlink_metadata(path) {
            Ok(meta) => meta,
            Err(err) => {
                debug!(path = %path.display(), error = %err, "cannot stat, skipping");
                return;
            }
        };
        self.dispatch(path, meta.file_type(), hops_left, result);
    }

    fn dispatch(&self, path: &Path, file_type: FileType, hops_left: u32, result: &mut TraceResult) {
        if file_type.is_dir() {
            self.descend(path, hops_left, result);
        } else if file_type.is_symlink() {
            self.resolve_link(path, path, hops_left, result);
        } else if file_type.is_file() {
            self.probe_file(path, result);
        }
        // Sockets, devices and fifos cannot pin a store object.
    }

    /// Recurse into a directory. Descent does not consume a hop; every
    /// entry starts a fresh link chain.
    fn descend(&self, dir: &Path, hops_left: u32, result: &mut TraceResult) {
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(err) => {
                debug!(dir = %dir.display(), error = %err, "cannot list directory, skipping");
                return;
            }
        };
        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    debug!(dir = %dir.display(), error = %err, "error reading directory entry");
                    continue;
                }
            };
            match entry.file_type() {
                Ok(file_type) => self.dispatch(&entry.path(), file_type, hops_left, result),
                Err(err) => {
                    debug!(path = %entry.path().display(), error = %err, "cannot stat entry")
                }
            }
        }
    }

    /// Resolve one symlink hop. `origin` is the first link of the chain
    /// and is what gets recorded as the external root when the chain ends
    /// in the store.
    fn resolve_link(&self, origin: &Path, link: &Path, hops_left: u32, result: &mut TraceResult) {
        if hops_left == 0 {
            debug!(link = %link.display(), "link budget exhausted");
            return;
        }
        let raw_target = match fs::read_link(link) {
            Ok(target) => target,
            Err(err) => {
                debug!(link = %link.display(), error = %err, "cannot read link");
                return;
            }
        };
        // A relative target is interpreted from the link's parent directory.
        let target = if raw_target.is_absolute() {
            raw_target
        } else {
            link.parent().unwrap_or_else(|| Path::new("/")).join(raw_target)
        };

        let meta = match fs::symlink_metadata(&target) {
            Ok(meta) => meta,
            Err(err) => {
                debug!(link = %link.display(), target = %target.display(), error = %err, "dead link");
                result.dead_links.insert(link.to_path_buf());
                return;
            }
        };

        if self.store.contains(&target) {
            // Store paths are leaves, never traversed further.
            if let Some(object) = self.store.object_below(&target) {
                result.add_root(object, origin.to_path_buf());
            }
            return;
        }

        let file_type = meta.file_type();
        if file_type.is_symlink() {
            self.resolve_link(origin, &target, hops_left - 1, result);
        } else if file_type.is_dir() {
            self.descend(&target, hops_left - 1, result);
        } else if file_type.is_file() {
            self.probe_file(&target, result);
        }
    }

    /// A regular file whose basename names an existing store object pins
    /// it. This covers roots kept as hardlinks or copies; the content of
    /// the file is not scanned.
    fn probe_file(&self, path: &Path, result: &mut TraceResult) {
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            return;
        };
        if !self.store.is_valid_object_name(name) {
            return;
        }
        let candidate = self.store.dir().join(name);
        if fs::symlink_metadata(&candidate).is_ok() {
            result.add_root(candidate, path.to_path_buf());
        }
    }
}
