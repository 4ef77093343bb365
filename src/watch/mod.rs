//! Filesystem segment watching: the `%u`-templated path grammar and the
//! watcher that turns raw filesystem churn into deduplicated per-segment
//! change events.

pub mod path_template;
pub mod preffile;
pub mod watcher;

pub use path_template::PathTemplate;
pub use preffile::{Preffile, PreffileEvent, PreffileState};
pub use watcher::SegmentWatcher;
