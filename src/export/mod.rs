//! Output: message serialization, in-place writes, and diagnostic copies.

pub mod archive;
pub mod eml;
