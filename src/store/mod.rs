//! File access for the message and image resources.

pub mod reader;
