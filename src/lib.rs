//! liveconf — a hot-reloading configuration plane.
//!
//! A small number of loader roles watch a tree of configuration files on
//! disk, parse them, and publish immutable snapshots that many reader
//! roles can consult without ever blocking on a reload in progress. A
//! segment that fails to parse falls back to its own last-known-good copy,
//! or keeps whatever the process already had loaded, rather than taking
//! the whole module down.

pub mod config;
pub mod confset;
pub mod digest_store;
pub mod error;
pub mod loader;
pub mod registry;
pub mod segment;
pub mod snapshot;
pub mod watch;

pub use config::PlaneConfig;
pub use confset::{Confset, ConfsetVec};
pub use error::{ConfError, Result};
pub use registry::{ConfInfo, ModuleHandle, Registry};
pub use segment::{SegmentDispatcher, SegmentLoader, SegmentSlot, SegmentedConf};
pub use snapshot::{Handle, Snapshot};
