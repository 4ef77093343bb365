//! The conf-info registry: the process-wide table of every module that
//! has registered a configuration path, and the single place that
//! decides whether a module's on-disk content has moved since the last
//! pass.

use crate::error::{ConfError, Result};
use crate::loader::line_loader::Digest;
use crate::watch::SegmentWatcher;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

pub type ModuleHandle = u32;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileStat {
    pub dev: u64,
    pub ino: u64,
    pub size: u64,
    pub mtime_secs: i64,
}

impl FileStat {
    #[cfg(unix)]
    pub fn from_metadata(meta: &std::fs::Metadata) -> Self {
        use std::os::unix::fs::MetadataExt;
        Self {
            dev: meta.dev(),
            ino: meta.ino(),
            size: meta.len(),
            mtime_secs: meta.mtime(),
        }
    }

    #[cfg(not(unix))]
    pub fn from_metadata(meta: &std::fs::Metadata) -> Self {
        let mtime_secs = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(SystemTime::UNIX_EPOCH).ok())
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);
        Self {
            dev: 0,
            ino: 0,
            size: meta.len(),
            mtime_secs,
        }
    }
}

/// Everything the registry knows about a registered module, independent
/// of whatever type its loaded value ends up being.
pub struct ConfInfo {
    pub name: String,
    pub path: PathBuf,
    pub loadable: bool,
    pub failed_load: bool,
    pub updates: u64,
    pub digest: Option<Digest>,
    stat: Option<FileStat>,
    segment_watcher: Option<SegmentWatcher>,
}

impl ConfInfo {
    pub fn segment_watcher_mut(&mut self) -> Option<&mut SegmentWatcher> {
        self.segment_watcher.as_mut()
    }

    pub fn segment_watcher(&self) -> Option<&SegmentWatcher> {
        self.segment_watcher.as_ref()
    }

    pub fn record_load(&mut self, success: bool, digest: Option<Digest>) {
        self.updates += 1;
        self.failed_load = !success;
        if success {
            self.digest = digest;
        }
    }
}

/// The process-wide registration table. One instance lives for the
/// lifetime of the loader role; reader roles never touch it.
pub struct Registry {
    root: PathBuf,
    modules: HashMap<ModuleHandle, ConfInfo>,
    by_name: HashMap<String, ModuleHandle>,
    next_handle: ModuleHandle,
}

impl Registry {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            modules: HashMap::new(),
            by_name: HashMap::new(),
            next_handle: 1,
        }
    }

    /// Resolve `relative_path` under the configured root, rejecting any
    /// path that isn't actually relative or that would escape the root
    /// via `..` — this is a fatal programmer/operator mistake, not a
    /// recoverable load error.
    pub fn relative_path(&self, relative_path: &str) -> Result<PathBuf> {
        let rel = Path::new(relative_path);
        if rel.is_absolute() {
            return Err(ConfError::Policy(format!(
                "registered path '{relative_path}' must be relative to the configured root"
            )));
        }
        if rel.components().any(|c| matches!(c, std::path::Component::ParentDir)) {
            return Err(ConfError::Policy(format!(
                "registered path '{relative_path}' escapes the configured root"
            )));
        }
        Ok(self.root.join(rel))
    }

    /// Register a module's name and path. Re-registering an already-known
    /// name is a policy violation — the C source asserts on this, and so
    /// do we, by returning an error the caller is expected to treat as
    /// fatal rather than recover from.
    pub fn register(
        &mut self,
        name: &str,
        relative_path: &str,
        loadable: bool,
        segment_watcher: Option<SegmentWatcher>,
    ) -> Result<ModuleHandle> {
        if self.by_name.contains_key(name) {
            return Err(ConfError::Policy(format!("module '{name}' is already registered")));
        }

        let path = self.relative_path(relative_path)?;
        let handle = self.next_handle;
        self.next_handle += 1;

        self.modules.insert(
            handle,
            ConfInfo {
                name: name.to_string(),
                path,
                loadable,
                failed_load: false,
                updates: 0,
                digest: None,
                stat: None,
                segment_watcher,
            },
        );
        self.by_name.insert(name.to_string(), handle);

        Ok(handle)
    }

    pub fn get(&self, handle: ModuleHandle) -> Result<&ConfInfo> {
        self.modules.get(&handle).ok_or_else(|| ConfError::NotFound(handle.to_string()))
    }

    pub fn get_mut(&mut self, handle: ModuleHandle) -> Result<&mut ConfInfo> {
        self.modules.get_mut(&handle).ok_or_else(|| ConfError::NotFound(handle.to_string()))
    }

    pub fn handles(&self) -> impl Iterator<Item = ModuleHandle> + '_ {
        self.modules.keys().copied()
    }

    /// Whether `handle`'s content may have changed since the last look.
    ///
    /// A segmented module delegates entirely to its watcher. A plain
    /// single-file module falls back to comparing `(dev, ino, size,
    /// mtime)`, trying `<path>.gz` if the plain path is gone — matching
    /// the two ways a file can disappear (replaced by its compressed
    /// form, or actually deleted).
    pub fn is_changed(&mut self, handle: ModuleHandle) -> Result<bool> {
        let info = self.get_mut(handle)?;

        if let Some(watcher) = info.segment_watcher.as_mut() {
            return Ok(watcher.is_changed());
        }

        let current = stat_with_gz_fallback(&info.path);
        let changed = match (&info.stat, &current) {
            (None, None) => false,
            (None, Some(_)) => true,
            (Some(prev), None) => prev.ino != 0,
            (Some(prev), Some(meta)) => *prev != FileStat::from_metadata(meta),
        };

        if changed {
            info.stat = current.map(|m| FileStat::from_metadata(&m));
        }

        Ok(changed)
    }
}

fn stat_with_gz_fallback(path: &Path) -> Option<std::fs::Metadata> {
    std::fs::metadata(path).ok().or_else(|| {
        let mut gz = path.as_os_str().to_owned();
        gz.push(".gz");
        std::fs::metadata(gz).ok()
    })
}
