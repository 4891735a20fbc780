//! Serialize the MIME tree back to RFC 5322 bytes and write it in place.

use std::io::Write as _;
use std::path::Path;

use tracing::debug;

use crate::error::{Result, StampError};
use crate::model::part::{LineEnding, Message, MessagePart};

impl Message {
    /// Serialize the whole message.
    ///
    /// For a message that was parsed and not modified the output equals
    /// the input.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        write_part(&self.root, self.line_ending, &mut out);
        out
    }
}

/// Append one part (headers, empty line, body) to `out`.
pub fn write_part(part: &MessagePart, eol: LineEnding, out: &mut Vec<u8>) {
    for header in part.headers() {
        out.extend_from_slice(header.name().as_bytes());
        out.push(b':');
        out.extend_from_slice(header.raw_value());
        out.extend_from_slice(eol.as_bytes());
    }
    out.extend_from_slice(eol.as_bytes());

    match part {
        MessagePart::Leaf { body, .. } => out.extend_from_slice(body),
        MessagePart::Multipart {
            boundary,
            preamble,
            children,
            epilogue,
            ..
        } => {
            // Every delimiter except one at the very start is preceded by a line break.
            let mut wrote_any = false;
            if let Some(preamble) = preamble {
                out.extend_from_slice(preamble);
                wrote_any = true;
            }
            for child in children {
                if wrote_any {
                    out.extend_from_slice(eol.as_bytes());
                }
                out.extend_from_slice(b"--");
                out.extend_from_slice(boundary.as_bytes());
                out.extend_from_slice(eol.as_bytes());
                write_part(child, eol, out);
                wrote_any = true;
            }
            if let Some(epilogue) = epilogue {
                if wrote_any {
                    out.extend_from_slice(eol.as_bytes());
                }
                out.extend_from_slice(b"--");
                out.extend_from_slice(boundary.as_bytes());
                out.extend_from_slice(b"--");
                out.extend_from_slice(epilogue);
            }
        }
    }
}

/// Replace `path` with `bytes` without readers ever seeing a partial file.
///
/// The data goes to a temporary file in the same directory, which takes
/// over the original's permissions and is then renamed onto `path`.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));

    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| StampError::io(dir, e))?;
    tmp.write_all(bytes)
        .map_err(|e| StampError::io(tmp.path(), e))?;
    tmp.as_file()
        .sync_all()
        .map_err(|e| StampError::io(tmp.path(), e))?;

    if let Ok(meta) = std::fs::metadata(path) {
        std::fs::set_permissions(tmp.path(), meta.permissions())
            .map_err(|e| StampError::io(tmp.path(), e))?;
    }

    tmp.persist(path)
        .map_err(|e| StampError::io(path, e.error))?;
    debug!(path = %path.display(), size = bytes.len(), "Message written");
    Ok(())
}
