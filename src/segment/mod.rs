//! The segmented conf dispatcher: turns a stream of per-id filesystem
//! change events into a new, fully-formed slot array ready to publish.

pub mod confobject;
pub mod dispatcher;

pub use confobject::{SegmentSlot, SegmentedConf};
pub use dispatcher::{SegmentDispatcher, SegmentLoader};
