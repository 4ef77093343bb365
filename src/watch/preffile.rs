//! A single segment file tracked by a [`super::watcher::SegmentWatcher`]:
//! its numeric id, its last-seen filesystem stat, and the state machine
//! that drives what the dispatcher does with it on the next pass.

use std::path::PathBuf;
use std::time::SystemTime;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreffileState {
    /// Unchanged since the last successful pass.
    Clean,
    /// New since the last pass.
    Added,
    /// Existing id, content or metadata changed.
    Modified,
    /// Was present, is now gone.
    Removed,
    /// A previous load attempt failed; eligible for another attempt once
    /// its retry deadline has passed.
    Retry,
}

#[derive(Debug, Clone)]
pub struct Stat {
    pub size: u64,
    pub mtime: SystemTime,
}

impl Stat {
    pub fn from_metadata(meta: &std::fs::Metadata) -> Self {
        Self {
            size: meta.len(),
            mtime: meta.modified().unwrap_or(SystemTime::UNIX_EPOCH),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Preffile {
    pub id: u32,
    pub path: PathBuf,
    pub state: PreffileState,
    pub stat: Option<Stat>,
}

impl Preffile {
    pub fn new(id: u32, path: PathBuf, stat: Stat) -> Self {
        Self {
            id,
            path,
            state: PreffileState::Added,
            stat: Some(stat),
        }
    }
}

/// An event handed out by `next_changed`: which segment id changed, and
/// how. `retry` is set when this delivery was produced by an explicit
/// [`super::watcher::SegmentWatcher::retry`] requeue rather than a fresh
/// filesystem change.
#[derive(Debug, Clone)]
pub struct PreffileEvent {
    pub id: u32,
    pub path: PathBuf,
    pub state: PreffileState,
    pub retry: bool,
}
