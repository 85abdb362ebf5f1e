//! Daemon server: a Unix socket server that reports GC roots.
//!
//! Connections are served strictly one at a time; a request is a bare
//! connect, the response is a full root report, and nothing survives
//! between requests except the immutable configuration and the listening
//! socket. Per-request failures are logged and the server goes straight
//! back to accepting; only startup failures are fatal.

use std::fs;
use std::io::{self, BufReader, BufWriter, Write};
use std::os::fd::{AsRawFd, OwnedFd};
use std::os::unix::fs::PermissionsExt;
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use nix::errno::Errno;
use nix::sys::signal::{self, SaFlags, SigAction, SigHandler, SigSet, Signal};
use nix::sys::socket::{self, AddressFamily, Backlog, SockFlag, SockType, UnixAddr};
use nix::sys::wait::{waitpid, WaitStatus};
use nix::unistd::{chdir, fork, ForkResult};
use tracing::{debug, info, warn};

use super::protocol;
use crate::config::Config;
use crate::error::{Result, TracerError};
use crate::runtime::RuntimeScanner;
use crate::trace::{TraceResult, Tracer};

/// Socket file mode: owner and group may connect, nobody else. The
/// filesystem permissions are the trust boundary.
const SOCKET_MODE: u32 = 0o660;

/// Connections are served one at a time, so a short queue is plenty.
const LISTEN_BACKLOG: i32 = 5;

/// Set by the termination handlers; checked around every accept.
static SHUTDOWN: AtomicBool = AtomicBool::new(false);

extern "C" fn request_shutdown(_signal: libc::c_int) {
    SHUTDOWN.store(true, Ordering::SeqCst);
}

/// The listening daemon.
pub struct Server {
    config: Config,
    listener: UnixListener,
}

impl Server {
    /// Create, bind, chmod and listen on the configured socket and
    /// install the signal handlers. Any failure here is fatal.
    pub fn bind(config: Config) -> Result<Server> {
        install_signal_handlers()?;
        let listener = bind_socket(&config.socket_path)?;
        info!(socket = %config.socket_path.display(), "daemon listening");
        Ok(Server { config, listener })
    }

    /// Accept and serve connections until a termination signal arrives,
    /// then unlink the socket and return. A failed request does not
    /// poison the daemon.
    pub fn run(&self) -> Result<()> {
        loop {
            if SHUTDOWN.load(Ordering::SeqCst) {
                break;
            }
            match self.listener.accept() {
                Ok((stream, _)) => {
                    if let Err(err) = self.serve(stream) {
                        warn!(error = %err, "request failed");
                    }
                }
                // A signal interrupted accept; loop around to re-check
                // the shutdown flag.
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(TracerError::Accept(err)),
            }
        }
        info!("daemon shutting down");
        let _ = fs::remove_file(&self.config.socket_path);
        Ok(())
    }

    /// One request: full scan, stream the report, close.
    fn serve(&self, stream: UnixStream) -> Result<()> {
        debug!("serving root report");
        let result = self.scan()?;
        let mut writer = BufWriter::new(stream);
        protocol::write_response(&mut writer, &result)?;
        writer.flush()?;
        Ok(())
    }

    /// Union of the filesystem trace from the standard root directories
    /// and the runtime roots.
    fn scan(&self) -> Result<TraceResult> {
        let mut result = Tracer::new(&self.config.store).trace(self.config.standard_roots());
        let runtime = RuntimeScanner::new(&self.config.store).scan()?;
        result.merge_roots(runtime);
        Ok(result)
    }
}

/// Connect to a running tracer and fetch a complete root report. This is
/// what the collector calls before computing reachability; a truncated
/// report parses to an error and must not be acted on.
pub fn fetch_roots(socket_path: &Path) -> Result<TraceResult> {
    let stream = UnixStream::connect(socket_path)?;
    let mut reader = BufReader::new(stream);
    Ok(protocol::read_response(&mut reader)?)
}

/// SIGINT, SIGTERM and SIGHUP request an orderly exit. SIGPIPE is
/// ignored so a client disconnecting mid-response surfaces as a write
/// error instead of killing the daemon; SIGWINCH is ignored as noise.
/// The exit handlers are installed without SA_RESTART so a pending
/// accept returns EINTR and the shutdown flag gets observed.
fn install_signal_handlers() -> Result<()> {
    let exit = SigAction::new(
        SigHandler::Handler(request_shutdown),
        SaFlags::empty(),
        SigSet::empty(),
    );
    let ignore = SigAction::new(SigHandler::SigIgn, SaFlags::empty(), SigSet::empty());
    for (sig, action) in [
        (Signal::SIGINT, &exit),
        (Signal::SIGTERM, &exit),
        (Signal::SIGHUP, &exit),
        (Signal::SIGPIPE, &ignore),
        (Signal::SIGWINCH, &ignore),
    ] {
        // SAFETY: the exit handler only stores to an atomic, which is
        // async-signal-safe.
        unsafe { signal::sigaction(sig, action) }
            .map_err(|source| TracerError::Signal { signal: sig, source })?;
    }
    Ok(())
}

/// Create the listening socket: unlink any stale socket file, bind,
/// restrict the mode, listen.
fn bind_socket(path: &Path) -> Result<UnixListener> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let _ = fs::remove_file(path);

    let fd = socket::socket(
        AddressFamily::Unix,
        SockType::Stream,
        SockFlag::SOCK_CLOEXEC,
        None,
    )
    .map_err(TracerError::CreateSocket)?;

    match UnixAddr::new(path) {
        Ok(addr) => {
            socket::bind(fd.as_raw_fd(), &addr).map_err(|err| bind_error(path, err))?;
        }
        Err(Errno::ENAMETOOLONG) => bind_long_path(&fd, path)?,
        Err(err) => return Err(bind_error(path, err)),
    }

    fs::set_permissions(path, fs::Permissions::from_mode(SOCKET_MODE)).map_err(|source| {
        TracerError::Chmod {
            path: path.to_path_buf(),
            source,
        }
    })?;

    let backlog = Backlog::new(LISTEN_BACKLOG).map_err(|source| TracerError::Listen {
        path: path.to_path_buf(),
        source,
    })?;
    socket::listen(&fd, backlog).map_err(|source| TracerError::Listen {
        path: path.to_path_buf(),
        source,
    })?;

    Ok(UnixListener::from(fd))
}

/// A path longer than sun_path still binds: a forked child chdirs into
/// the parent directory and binds the basename on the shared descriptor.
fn bind_long_path(fd: &OwnedFd, path: &Path) -> Result<()> {
    debug!(path = %path.display(), "socket path exceeds sun_path, binding via child");
    let dir = path.parent().unwrap_or_else(|| Path::new("/"));
    let Some(base) = path.file_name() else {
        return Err(TracerError::Bind {
            path: path.to_path_buf(),
            reason: "path has no file name".into(),
        });
    };
    // SAFETY: the child only calls async-signal-safe functions (chdir,
    // bind, _exit) before exiting.
    match unsafe { fork() }.map_err(|err| bind_error(path, err))? {
        ForkResult::Child => {
            let bound = chdir(dir).is_ok()
                && UnixAddr::new(Path::new(base))
                    .and_then(|addr| socket::bind(fd.as_raw_fd(), &addr))
                    .is_ok();
            unsafe { libc::_exit(if bound { 0 } else { 1 }) }
        }
        ForkResult::Parent { child } => match waitpid(child, None) {
            Ok(WaitStatus::Exited(_, 0)) => Ok(()),
            _ => Err(TracerError::Bind {
                path: path.to_path_buf(),
                reason: "bind from child process failed".into(),
            }),
        },
    }
}

fn bind_error(path: &Path, err: Errno) -> TracerError {
    TracerError::Bind {
        path: path.to_path_buf(),
        reason: err.to_string(),
    }
}
