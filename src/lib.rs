//! `mimestamp`: an MTA content filter that embeds a versioned inline image
//! into the HTML body of outgoing MIME messages.
//!
//! The library parses a message into an owned, raw-preserving MIME tree,
//! decides from the envelope addresses whether the message is eligible,
//! detects an already embedded (current or outdated) copy of the image,
//! substitutes the HTML placeholder and restructures the tree to carry the
//! image, and writes the result back atomically.

pub mod config;
pub mod error;
pub mod export;
pub mod model;
pub mod parser;
pub mod stamp;
pub mod store;
