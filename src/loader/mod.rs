//! Reading configuration files: a gzip-transparent line reader, the
//! shared envelope formats layered on top of it, and the last-good
//! fallback mechanism every loader gets for free.

pub mod envelope;
pub mod line_loader;

pub use line_loader::{ConfLoader, Digest};
