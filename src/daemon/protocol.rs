//! Wire format for root reports.
//!
//! A response is line-oriented text in two sections separated by exactly
//! one blank line:
//!
//! ```text
//! <store object path>\t<external root path>\n    (one line per root edge)
//! \n                                             (separator, always present)
//! <dead link path>\n                             (one line per dead link)
//! ```
//!
//! Connecting is the request; there is no request body. Paths travel as
//! raw bytes so non-UTF-8 roots survive the wire. A response that ends
//! before the separator line is truncated and must be treated as a scan
//! failure by the client.

use std::ffi::OsString;
use std::io::{self, BufRead, Write};
use std::os::unix::ffi::{OsStrExt, OsStringExt};
use std::path::PathBuf;

use thiserror::Error;

use crate::trace::TraceResult;

/// Errors from parsing a root report.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The stream ended before the section separator
    #[error("response truncated before the separator line")]
    Truncated,

    /// A roots line without a tab between object and root
    #[error("malformed root line: {0:?}")]
    MalformedRoot(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Serialize a trace result: one line per (store object, external root)
/// edge, the blank separator, then one line per dead link.
pub fn write_response<W: Write>(writer: &mut W, result: &TraceResult) -> io::Result<()> {
    for (object, externals) in &result.roots {
        for external in externals {
            writer.write_all(object.as_os_str().as_bytes())?;
            writer.write_all(b"\t")?;
            writer.write_all(external.as_os_str().as_bytes())?;
            writer.write_all(b"\n")?;
        }
    }
    writer.write_all(b"\n")?;
    for dead in &result.dead_links {
        writer.write_all(dead.as_os_str().as_bytes())?;
        writer.write_all(b"\n")?;
    }
    Ok(())
}

/// Parse a root report, the inverse of [`write_response`].
pub fn read_response<R: BufRead>(reader: &mut R) -> Result<TraceResult, ProtocolError> {
    let mut result = TraceResult::default();
    loop {
        let Some(line) = read_line(reader)? else {
            return Err(ProtocolError::Truncated);
        };
        if line.is_empty() {
            break;
        }
        let Some(tab) = line.iter().position(|&b| b == b'\t') else {
            return Err(ProtocolError::MalformedRoot(
                String::from_utf8_lossy(&line).into_owned(),
            ));
        };
        let object = PathBuf::from(OsString::from_vec(line[..tab].to_vec()));
        let external = PathBuf::from(OsString::from_vec(line[tab + 1..].to_vec()));
        result.add_root(object, external);
    }
    while let Some(line) = read_line(reader)? {
        if !line.is_empty() {
            result
                .dead_links
                .insert(PathBuf::from(OsString::from_vec(line)));
        }
    }
    Ok(result)
}

/// One newline-terminated line, without the newline. `None` at EOF.
fn read_line<R: BufRead>(reader: &mut R) -> io::Result<Option<Vec<u8>>> {
    let mut buf = Vec::new();
    if reader.read_until(b'\n', &mut buf)? == 0 {
        return Ok(None);
    }
    if buf.last() == Some(&b'\n') {
        buf.pop();
    }
    Ok(Some(buf))
}
