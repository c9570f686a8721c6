//! File-backed sources.
//!
//! - [`text`]: one element per line of a text file
//! - [`dir`]: one element per path matching a glob pattern in a directory
//! - [`jsonl`]: one element per line of a JSON Lines file, plus a writer
//! - [`compression`]: transparent decompression used by the line readers

pub mod compression;
pub mod dir;
pub mod jsonl;
pub mod text;
