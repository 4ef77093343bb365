//! The segmented conf dispatcher: clone the current slot array, drain the
//! watcher's pending events into it, stamp the result, and hand the new
//! array back to the caller for publication.

use super::confobject::{SegmentSlot, SegmentedConf};
use crate::error::Result;
use crate::loader::line_loader::last_good_path;
use crate::loader::ConfLoader;
use crate::watch::{PreffileState, SegmentWatcher};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::warn;

fn stat_mtime(path: &std::path::Path) -> SystemTime {
    std::fs::metadata(path).and_then(|m| m.modified()).unwrap_or(UNIX_EPOCH)
}

/// A type that knows how to parse one segment file's content. Given an
/// already-open loader, implementations read whatever envelope their
/// format uses and return the parsed value.
pub trait SegmentLoader: Send + Sync {
    type Value: Send + Sync + 'static;

    fn load(&self, loader: &mut ConfLoader) -> Result<Self::Value>;
}

pub struct SegmentDispatcher<L: SegmentLoader> {
    loader: L,
    retry_sec: u64,
    last_reload: Option<u64>,
}

impl<L: SegmentLoader> SegmentDispatcher<L> {
    pub fn new(loader: L, retry_sec: u64) -> Self {
        Self {
            loader,
            retry_sec,
            last_reload: None,
        }
    }

    pub fn last_reload_unix(&self) -> Option<u64> {
        self.last_reload
    }

    /// Run one pass of the pipeline: clone, drain, stamp. The caller
    /// publishes the returned value (e.g. via [`crate::snapshot::Snapshot`])
    /// once it has one; this function never touches the publish path
    /// itself so that publication can be batched across several
    /// dispatchers in one generation bump.
    pub fn reload(&mut self, watcher: &mut SegmentWatcher, current: &SegmentedConf<L::Value>) -> SegmentedConf<L::Value> {
        let mut next = current.clone();

        while let Some(event) = watcher.next_changed() {
            match event.state {
                PreffileState::Removed => {
                    next.slots_mut().retain(|s| s.id != event.id);
                },
                PreffileState::Added | PreffileState::Modified | PreffileState::Retry => {
                    self.load_one(&mut next, event.id, &event.path, watcher);
                },
                PreffileState::Clean => {},
            }
        }

        next.slots_mut().sort_by_key(|s| s.id);
        self.last_reload = Some(now_unix());
        next
    }

    fn load_one(&self, conf: &mut SegmentedConf<L::Value>, id: u32, path: &std::path::Path, watcher: &mut SegmentWatcher) {
        match self.try_load(path) {
            Ok(value) => {
                upsert(conf, SegmentSlot {
                    id,
                    value: Some(Arc::new(value)),
                    failed_load: false,
                    mtime: stat_mtime(path),
                });
            },
            Err(e) => {
                warn!(segment = id, path = %path.display(), error = %e, "segment load failed, falling back");

                let had_existing = conf.find(id).map(|s| s.value.is_some()).unwrap_or(false);

                if !had_existing {
                    // use_org has nothing to fall back on yet: try the
                    // last-good sidecar as this segment's first value.
                    if let Ok(fallback) = self.try_load(&last_good_path(path)) {
                        upsert(conf, SegmentSlot {
                            id,
                            value: Some(Arc::new(fallback)),
                            failed_load: true,
                            mtime: stat_mtime(&last_good_path(path)),
                        });
                    } else {
                        upsert(conf, SegmentSlot { id, value: None, failed_load: true, mtime: UNIX_EPOCH });
                    }
                } else {
                    // use_org: keep the previous in-memory value, just
                    // flag this pass as failed. The on-disk last-good
                    // sidecar is left untouched.
                    if let Some(slot) = conf.slots_mut().iter_mut().find(|s| s.id == id) {
                        slot.failed_load = true;
                    }
                }

                watcher.retry(id, self.retry_sec);
            },
        }
    }

    fn try_load(&self, path: &std::path::Path) -> Result<L::Value> {
        let mut loader = ConfLoader::open(path)?;
        let result = self.loader.load(&mut loader);
        loader.done(result.is_ok())?;
        result
    }
}

fn upsert<T>(conf: &mut SegmentedConf<T>, slot: SegmentSlot<T>) {
    let slots = conf.slots_mut();
    match slots.binary_search_by_key(&slot.id, |s| s.id) {
        Ok(idx) => slots[idx] = slot,
        Err(idx) => slots.insert(idx, slot),
    }
}

fn now_unix() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0)
}
