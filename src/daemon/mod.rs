//! Daemon module: the long-lived root tracer service.
//!
//! The daemon is the only component of the store toolchain that must run
//! as root: resolving indirect roots means reading inside arbitrary home
//! directories, and runtime roots come from every process's /proc entry.
//! It therefore stays self-contained and serves the unprivileged
//! collector over a Unix socket.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │           gcrootd (root)                │
//! │  - traces profiles/ and gcroots/        │
//! │  - scans /proc for runtime roots        │
//! │  - Unix socket server, one client       │
//! └─────────────────────────────────────────┘
//!           ▲
//!           │ <state>/gc-socket/socket
//!           ▼
//! ┌─────────────────────────────────────────┐
//! │        collector (unprivileged)         │
//! │  - connects before deleting anything    │
//! │  - receives the full root report        │
//! └─────────────────────────────────────────┘
//! ```

pub mod protocol;
pub mod server;

pub use protocol::{read_response, write_response, ProtocolError};
pub use server::{fetch_roots, Server};
