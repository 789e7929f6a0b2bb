//! Persistence: text meshes and binary snapshots.

pub mod binary;
mod snapshot;
pub mod text;

pub use binary::{BinReader, BinWriter};
pub use text::{TextMesh, parse_text};
