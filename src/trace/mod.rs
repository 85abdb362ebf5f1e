//! Filesystem tracing of GC roots.
//!
//! Tracing starts from the well-known root directories under the state
//! root and follows directories, symlinks and plain files down to the
//! store objects they pin. The result of a trace lives only for the
//! duration of one request.

pub mod walker;

pub use walker::Tracer;

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

/// Mapping from a store object path to the set of external paths that
/// each independently keep it alive.
pub type Roots = BTreeMap<PathBuf, BTreeSet<PathBuf>>;

/// Accumulated outcome of tracing a set of starting paths.
///
/// Ordered containers keep the wire output stable across identical scans.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TraceResult {
    /// Store objects and the external roots that pin them
    pub roots: Roots,
    /// Symlinks whose targets no longer resolve; candidates for removal
    /// by the collector
    pub dead_links: BTreeSet<PathBuf>,
}

impl TraceResult {
    /// Record `external` as a root keeping `object` alive.
    pub fn add_root(&mut self, object: PathBuf, external: PathBuf) {
        self.roots.entry(object).or_default().insert(external);
    }

    /// Per-key set union of another roots map into this result.
    pub fn merge_roots(&mut self, other: Roots) {
        for (object, externals) in other {
            self.roots.entry(object).or_default().extend(externals);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_root_absorbs_duplicates() {
        let mut result = TraceResult::default();
        result.add_root("/s/abc".into(), "/v/gcroots/a".into());
        result.add_root("/s/abc".into(), "/v/gcroots/a".into());
        result.add_root("/s/abc".into(), "/v/gcroots/b".into());
        assert_eq!(result.roots.len(), 1);
        assert_eq!(result.roots[&PathBuf::from("/s/abc")].len(), 2);
    }

    #[test]
    fn test_merge_roots_unions_per_key() {
        let mut result = TraceResult::default();
        result.add_root("/s/abc".into(), "/v/gcroots/a".into());

        let mut runtime = Roots::new();
        runtime
            .entry("/s/abc".into())
            .or_default()
            .insert("/proc/42/exe".into());
        runtime
            .entry("/s/def".into())
            .or_default()
            .insert("/proc/42/cwd".into());

        result.merge_roots(runtime);
        // Existing keys gain the runtime roots instead of dropping them
        assert_eq!(result.roots[&PathBuf::from("/s/abc")].len(), 2);
        assert_eq!(result.roots[&PathBuf::from("/s/def")].len(), 1);
    }
}
