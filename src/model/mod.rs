//! Core data model: the MIME tree, the embedded image, and address lists.

pub mod address;
pub mod image;
pub mod part;
