//! Process-wide configuration, created once from the command line and
//! immutable for the daemon's lifetime.

use std::collections::BTreeSet;
use std::path::PathBuf;

use crate::store::StoreDir;

/// Default store root.
pub const DEFAULT_STORE_DIR: &str = "/nix/store";

/// Default state root; `profiles/` and `gcroots/` live beneath it.
pub const DEFAULT_STATE_DIR: &str = "/nix/var/nix";

/// Immutable daemon configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Store root; its immediate children are the unit of collection
    pub store: StoreDir,
    /// State root hosting the indirect-root forest
    pub state_dir: PathBuf,
    /// Listening socket path
    pub socket_path: PathBuf,
}

impl Config {
    /// Build a configuration. The socket path defaults to
    /// `<state_dir>/gc-socket/socket`.
    pub fn new(store_dir: PathBuf, state_dir: PathBuf, socket_path: Option<PathBuf>) -> Config {
        let socket_path =
            socket_path.unwrap_or_else(|| state_dir.join("gc-socket").join("socket"));
        Config {
            store: StoreDir::new(store_dir),
            state_dir,
            socket_path,
        }
    }

    /// The well-known directories a trace starts from.
    pub fn standard_roots(&self) -> BTreeSet<PathBuf> {
        BTreeSet::from([
            self.state_dir.join("profiles"),
            self.state_dir.join("gcroots"),
        ])
    }
}

impl Default for Config {
    fn default() -> Config {
        Config::new(DEFAULT_STORE_DIR.into(), DEFAULT_STATE_DIR.into(), None)
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;

    #[test]
    fn test_socket_path_defaults_under_state_dir() {
        let config = Config::default();
        assert_eq!(
            config.socket_path,
            Path::new("/nix/var/nix/gc-socket/socket")
        );
    }

    #[test]
    fn test_explicit_socket_path_wins() {
        let config = Config::new(
            "/s".into(),
            "/v".into(),
            Some("/run/tracer.sock".into()),
        );
        assert_eq!(config.socket_path, Path::new("/run/tracer.sock"));
    }

    #[test]
    fn test_standard_roots() {
        let config = Config::new("/s".into(), "/v".into(), None);
        let roots = config.standard_roots();
        assert!(roots.contains(Path::new("/v/profiles")));
        assert!(roots.contains(Path::new("/v/gcroots")));
        assert_eq!(roots.len(), 2);
    }
}
