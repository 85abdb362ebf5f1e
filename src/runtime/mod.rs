//! Runtime root scanning via /proc.
//!
//! A store object mapped into a running process is every bit as live as
//! one pinned by a named symlink: deleting it would crash the process on
//! its next page fault. For every process this module probes the
//! executable, working directory and open file descriptors, scans the
//! environment blob and memory maps for store paths, and finally checks
//! a short list of kernel configuration files that may name store paths.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use regex::Regex;
use tracing::debug;

use crate::error::{Result, TracerError};
use crate::store::StoreDir;
use crate::trace::Roots;

/// Kernel configuration files that may point into the store. Mostly
/// relevant on NixOS-style systems; missing files are skipped.
const KERNEL_CONFIG_FILES: &[&str] = &[
    "/proc/sys/kernel/modprobe",
    "/proc/sys/kernel/fbsplash",
    "/proc/sys/kernel/poweroff_cmd",
];

/// Extracts the pathname field from one line of `/proc/<pid>/maps`: the
/// final whitespace-separated field beginning with `/`.
const MAPS_LINE_PATTERN: &str = r"^\s*\S+\s+\S+\s+\S+\s+\S+\s+\S+\s+(/\S+)\s*$";

/// Enumerates processes and kernel configuration for in-use store paths.
pub struct RuntimeScanner<'a> {
    store: &'a StoreDir,
    proc_root: PathBuf,
    maps_re: Regex,
}

impl<'a> RuntimeScanner<'a> {
    pub fn new(store: &'a StoreDir) -> RuntimeScanner<'a> {
        Self::with_proc_root(store, PathBuf::from("/proc"))
    }

    fn with_proc_root(store: &'a StoreDir, proc_root: PathBuf) -> RuntimeScanner<'a> {
        RuntimeScanner {
            store,
            proc_root,
            maps_re: Regex::new(MAPS_LINE_PATTERN).expect("maps line pattern is a valid regex"),
        }
    }

    /// Collect store references held by running processes and by the
    /// kernel configuration.
    ///
    /// `ENOENT`, `EACCES` and `ESRCH` are expected while walking /proc
    /// (processes exit mid-scan, hardened containers hide entries) and
    /// are skipped; any other I/O error aborts the scan and the request.
    pub fn scan(&self) -> Result<Roots> {
        let mut roots = Roots::new();
        let entries = match fs::read_dir(&self.proc_root) {
            Ok(entries) => entries,
            // No procfs on this system; there are no runtime roots.
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(roots),
            Err(err) => return Err(scan_error(&self.proc_root, err)),
        };
        for entry in entries {
            let entry = entry.map_err(|err| scan_error(&self.proc_root, err))?;
            if !is_pid_dir(&entry) {
                continue;
            }
            self.scan_process(&entry.path(), &mut roots)?;
        }
        for file in KERNEL_CONFIG_FILES {
            self.scan_file_content(Path::new(file), &mut roots)?;
        }
        Ok(roots)
    }

    /// Probe one `/proc/<pid>` directory.
    fn scan_process(&self, pid_dir: &Path, roots: &mut Roots) -> Result<()> {
        debug!(path = %pid_dir.display(), "scanning process");

        let mut probes = vec![pid_dir.join("exe"), pid_dir.join("cwd")];
        let fd_dir = pid_dir.join("fd");
        match fs::read_dir(&fd_dir) {
            Ok(entries) => {
                for entry in entries {
                    match entry {
                        Ok(entry) => probes.push(entry.path()),
                        Err(err) if is_benign(&err) => break,
                        Err(err) => return Err(scan_error(&fd_dir, err)),
                    }
                }
            }
            Err(err) if is_benign(&err) => {
                debug!(path = %fd_dir.display(), error = %err, "cannot list file descriptors")
            }
            Err(err) => return Err(scan_error(&fd_dir, err)),
        }

        for probe in &probes {
            match fs::read_link(probe) {
                Ok(target) => {
                    if let Some(object) = self.store.object_below(&target) {
                        roots.entry(object).or_default().insert(probe.clone());
                    }
                }
                Err(err) => {
                    debug!(path = %probe.display(), error = %err, "cannot read link")
                }
            }
        }

        self.scan_file_content(&pid_dir.join("environ"), roots)?;
        self.scan_maps(&pid_dir.join("maps"), roots)?;
        Ok(())
    }

    /// Scan a file's content for store path occurrences, recording the
    /// file itself as the root of every match.
    fn scan_file_content(&self, file: &Path, roots: &mut Roots) -> Result<()> {
        let content = match fs::read(file) {
            Ok(bytes) => bytes,
            Err(err) if is_benign(&err) => return Ok(()),
            Err(err) => return Err(scan_error(file, err)),
        };
        let content = String::from_utf8_lossy(&content);
        for m in self.store.path_regex().find_iter(&content) {
            roots
                .entry(PathBuf::from(m.as_str()))
                .or_default()
                .insert(file.to_path_buf());
        }
        Ok(())
    }

    /// Scan `/proc/<pid>/maps` line-wise for mappings of store files.
    fn scan_maps(&self, maps: &Path, roots: &mut Roots) -> Result<()> {
        let content = match fs::read(maps) {
            Ok(bytes) => bytes,
            Err(err) if is_benign(&err) => return Ok(()),
            Err(err) => return Err(scan_error(maps, err)),
        };
        let content = String::from_utf8_lossy(&content);
        for line in content.lines() {
            let Some(captures) = self.maps_re.captures(line) else {
                continue;
            };
            if let Some(object) = self.store.object_below(Path::new(&captures[1])) {
                roots.entry(object).or_default().insert(maps.to_path_buf());
            }
        }
        Ok(())
    }
}

/// Process directories are the entries whose name is purely decimal digits.
fn is_pid_dir(entry: &fs::DirEntry) -> bool {
    let name = entry.file_name();
    let Some(name) = name.to_str() else {
        return false;
    };
    !name.is_empty()
        && name.bytes().all(|b| b.is_ascii_digit())
        && entry.file_type().map(|t| t.is_dir()).unwrap_or(false)
}

/// Races with exiting processes and hardened containers show up as these;
/// anything else is a real scan failure.
fn is_benign(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::NotFound | io::ErrorKind::PermissionDenied
    ) || err.raw_os_error() == Some(libc::ESRCH)
}

fn scan_error(path: &Path, source: io::Error) -> TracerError {
    TracerError::Scan {
        path: path.to_path_buf(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use std::os::unix::fs::symlink;

    use tempfile::{tempdir, TempDir};

    use super::*;

    /// Fake /proc layout next to a fake store.
    struct Fixture {
        dir: TempDir,
        store_path: PathBuf,
        proc_root: PathBuf,
    }

    impl Fixture {
        fn new() -> Fixture {
            let dir = tempdir().unwrap();
            let store_path = dir.path().join("store");
            let proc_root = dir.path().join("proc");
            fs::create_dir_all(&store_path).unwrap();
            fs::create_dir_all(&proc_root).unwrap();
            Fixture {
                dir,
                store_path,
                proc_root,
            }
        }

        fn add_pid(&self, pid: &str) -> PathBuf {
            let pid_dir = self.proc_root.join(pid);
            fs::create_dir_all(pid_dir.join("fd")).unwrap();
            pid_dir
        }

        fn scan(&self) -> Roots {
            let store = StoreDir::new(&self.store_path);
            let scanner = RuntimeScanner::with_proc_root(&store, self.proc_root.clone());
            scanner.scan().unwrap()
        }
    }

    #[test]
    fn test_exe_and_cwd_links_are_recorded() {
        let fx = Fixture::new();
        let obj = fx.store_path.join("def-bin");
        fs::create_dir(&obj).unwrap();
        let pid = fx.add_pid("42");
        symlink(obj.join("bin/tool"), pid.join("exe")).unwrap();
        symlink(fx.dir.path(), pid.join("cwd")).unwrap();

        let roots = fx.scan();
        assert_eq!(
            roots[&obj].iter().collect::<Vec<_>>(),
            vec![&pid.join("exe")]
        );
    }

    #[test]
    fn test_open_file_descriptors_are_probed() {
        let fx = Fixture::new();
        let obj = fx.store_path.join("fd-obj");
        fs::create_dir(&obj).unwrap();
        let pid = fx.add_pid("100");
        symlink(&obj, pid.join("fd").join("3")).unwrap();

        let roots = fx.scan();
        assert!(roots[&obj].contains(&pid.join("fd").join("3")));
    }

    #[test]
    fn test_non_pid_entries_are_skipped() {
        let fx = Fixture::new();
        let obj = fx.store_path.join("skip-obj");
        fs::create_dir(&obj).unwrap();
        let not_pid = fx.proc_root.join("sys");
        fs::create_dir_all(&not_pid).unwrap();
        symlink(&obj, not_pid.join("exe")).unwrap();

        assert!(fx.scan().is_empty());
    }

    #[test]
    fn test_environ_blob_is_scanned() {
        let fx = Fixture::new();
        let obj = fx.store_path.join("env-obj");
        fs::create_dir(&obj).unwrap();
        let pid = fx.add_pid("7");
        // NUL-separated blob; the match must end at the object name even
        // when followed by non-path bytes.
        let blob = format!(
            "PATH=/usr/bin\0TOOL={}!garbage\0X=1",
            obj.display()
        );
        fs::write(pid.join("environ"), blob.as_bytes()).unwrap();

        let roots = fx.scan();
        assert_eq!(
            roots[&obj].iter().collect::<Vec<_>>(),
            vec![&pid.join("environ")]
        );
    }

    #[test]
    fn test_maps_lines_are_scanned() {
        let fx = Fixture::new();
        let obj = fx.store_path.join("lib-obj");
        fs::create_dir(&obj).unwrap();
        let pid = fx.add_pid("8");
        let maps = format!(
            "7f0000000000-7f0000001000 r-xp 00000000 08:01 12345 {}/lib/libx.so\n\
             7f0000002000-7f0000003000 rw-p 00000000 00:00 0\n\
             7f0000004000-7f0000005000 r--p 00000000 08:01 999 /usr/lib/other.so\n",
            obj.display()
        );
        fs::write(pid.join("maps"), maps).unwrap();

        let roots = fx.scan();
        assert_eq!(roots.len(), 1);
        assert_eq!(
            roots[&obj].iter().collect::<Vec<_>>(),
            vec![&pid.join("maps")]
        );
    }

    #[test]
    fn test_missing_proc_means_no_runtime_roots() {
        let dir = tempdir().unwrap();
        let store = StoreDir::new(dir.path().join("store"));
        let scanner = RuntimeScanner::with_proc_root(&store, dir.path().join("no-proc"));
        assert!(scanner.scan().unwrap().is_empty());
    }

    #[test]
    fn test_pid_without_probe_files_is_harmless() {
        let fx = Fixture::new();
        // A bare pid directory: no exe, cwd, environ or maps.
        fx.add_pid("55");
        assert!(fx.scan().is_empty());
    }
}
