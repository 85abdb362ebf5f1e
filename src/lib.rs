//! # gcrootd
//!
//! Privileged GC root tracer for a content-addressed package store.
//!
//! Before the garbage collector may delete anything it needs the
//! authoritative set of live store objects and the external paths that
//! pin them. Discovering that set is the only store operation that
//! requires root: indirect roots live inside arbitrary users' home
//! directories, and runtime roots come from every process's /proc
//! entries. gcrootd isolates exactly that discovery into a small,
//! self-contained daemon serving root reports over a Unix socket.
//!
//! ## Key properties
//!
//! - **Minimal attack surface**: no dependency on the store manager;
//!   one binary, one socket.
//! - **Hostile-filesystem tolerant**: dangling, circular and
//!   permission-denied paths are expected inputs, never fatal.
//! - **Conservative**: a missed root corrupts installations, a spurious
//!   root merely delays reclamation; ties break toward reporting.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use gcrootd::{Config, Server};
//!
//! fn main() -> gcrootd::Result<()> {
//!     let server = Server::bind(Config::default())?;
//!     server.run()
//! }
//! ```

pub mod config;
pub mod daemon;
pub mod error;
pub mod runtime;
pub mod store;
pub mod trace;

// Re-exports for convenience
pub use config::Config;
pub use daemon::server::{fetch_roots, Server};
pub use error::{Result, TracerError};
pub use runtime::RuntimeScanner;
pub use store::StoreDir;
pub use trace::{Roots, TraceResult, Tracer};
