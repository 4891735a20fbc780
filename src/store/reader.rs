//! Bounded file reads.
//!
//! The filter runs inside the MTA's delivery path, so a read from a stuck
//! file system must not hang it forever.

use std::path::Path;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::Duration;

use tracing::debug;

use crate::error::{Result, StampError};

/// Read a whole file, giving up after `timeout`.
///
/// The read runs on a helper thread. On timeout that thread is abandoned;
/// the process handles a single message and exits soon after.
pub fn read_bounded(path: &Path, timeout: Duration) -> Result<Vec<u8>> {
    let (tx, rx) = mpsc::channel();
    let owned = path.to_path_buf();
    thread::Builder::new()
        .name("bounded-read".to_string())
        .spawn(move || {
            // The receiver is gone after a timeout; nothing left to report to.
            let _ = tx.send(std::fs::read(&owned));
        })
        .map_err(|e| StampError::io(path, e))?;

    match rx.recv_timeout(timeout) {
        Ok(Ok(data)) => {
            debug!(path = %path.display(), size = data.len(), "Read file");
            Ok(data)
        }
        Ok(Err(e)) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(StampError::FileNotFound(path.to_path_buf()))
        }
        Ok(Err(e)) => Err(StampError::io(path, e)),
        Err(RecvTimeoutError::Timeout) => Err(StampError::Timeout {
            path: path.to_path_buf(),
            timeout,
        }),
        Err(RecvTimeoutError::Disconnected) => Err(StampError::io(
            path,
            std::io::Error::other("reader thread exited without a result"),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("msg.eml");
        std::fs::write(&path, b"Subject: hi\n\nbody\n").unwrap();
        let data = read_bounded(&path, Duration::from_secs(5)).unwrap();
        assert_eq!(data, b"Subject: hi\n\nbody\n");
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = read_bounded(&dir.path().join("nope.eml"), Duration::from_secs(5));
        assert!(matches!(result, Err(StampError::FileNotFound(_))));
    }
}
