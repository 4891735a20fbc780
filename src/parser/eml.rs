//! Parser for individual `.eml` files (RFC 5322 messages as handed over by the MTA).

use std::path::Path;
use std::time::Duration;

use crate::error::Result;
use crate::model::part::Message;
use crate::parser::mime;
use crate::store::reader::read_bounded;

/// Read and parse a single `.eml` file.
///
/// Returns the raw bytes alongside the parsed tree so callers can archive
/// or compare against the original.
pub fn parse_eml(path: impl AsRef<Path>, timeout: Duration) -> Result<(Vec<u8>, Message)> {
    let path = path.as_ref();
    let raw = read_bounded(path, timeout)?;
    let message = mime::parse_message(&raw)?;
    Ok((raw, message))
}
