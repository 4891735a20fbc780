//! Email parsing: EML files, header decoding, and raw-preserving MIME trees.

pub mod eml;
pub mod header;
pub mod mime;
