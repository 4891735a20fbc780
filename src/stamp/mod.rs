//! Image embedding: detection of an existing copy, placeholder rewriting,
//! and the per-message run that ties them together.

pub mod inspect;
pub mod process;
pub mod rewriter;
pub mod scanner;
