//! Periodic digest persistence: one file per registered module, one line
//! per segment, written atomically so a reader never observes a half
//! written file, with old files reaped by mtime.

use crate::error::{ConfError, Result};
use crate::loader::Digest;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::warn;

pub struct DigestStore {
    dir: PathBuf,
    max_age: Duration,
}

impl DigestStore {
    pub fn new(dir: impl Into<PathBuf>, max_age_sec: u64) -> Self {
        Self { dir: dir.into(), max_age: Duration::from_secs(max_age_sec) }
    }

    /// Write `module`'s digest file as `<id> <digest>` lines, one per
    /// segment, sorted by id. Written to a temp file in the same
    /// directory then renamed into place, so a concurrent reader only
    /// ever sees the old or the new content, never a partial write.
    pub fn write(&self, module: &str, entries: &[(u32, Digest)]) -> Result<()> {
        fs::create_dir_all(&self.dir).map_err(|e| ConfError::io(self.dir.display().to_string(), e))?;

        let mut sorted = entries.to_vec();
        sorted.sort_by_key(|(id, _)| *id);

        let mut tmp = tempfile::NamedTempFile::new_in(&self.dir)
            .map_err(|e| ConfError::io(self.dir.display().to_string(), e))?;
        for (id, digest) in &sorted {
            writeln!(tmp, "{id} {digest}").map_err(|e| ConfError::io(self.dir.display().to_string(), e))?;
        }

        let dest = self.module_path(module);
        tmp.persist(&dest).map_err(|e| ConfError::io(dest.display().to_string(), e.error))?;
        Ok(())
    }

    /// Read back a previously written digest file, for tests and for a
    /// process that starts up and wants to compare against its last run
    /// before the first reload completes.
    pub fn read(&self, module: &str) -> Result<Vec<(u32, Digest)>> {
        let path = self.module_path(module);
        let contents = fs::read_to_string(&path).map_err(|e| ConfError::io(path.display().to_string(), e))?;

        let mut out = Vec::new();
        for (line_no, line) in contents.lines().enumerate() {
            let mut parts = line.split_whitespace();
            let id: u32 = parts
                .next()
                .and_then(|s| s.parse().ok())
                .ok_or_else(|| ConfError::parse(path.display().to_string(), line_no as u32 + 1, "missing segment id"))?;
            let hex = parts
                .next()
                .ok_or_else(|| ConfError::parse(path.display().to_string(), line_no as u32 + 1, "missing digest"))?;
            out.push((id, parse_digest(&path, line_no as u32 + 1, hex)?));
        }
        Ok(out)
    }

    /// Remove digest files whose mtime is older than `max_age`. Run this
    /// on the same cadence `update_freq_sec` drives `write` at; a file
    /// that's aged out has outlived every module that would still be
    /// writing to it.
    pub fn gc(&self) -> Result<()> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(ConfError::io(self.dir.display().to_string(), e)),
        };

        let now = SystemTime::now();
        for entry in entries {
            let entry = entry.map_err(|e| ConfError::io(self.dir.display().to_string(), e))?;
            let path = entry.path();
            let metadata = match entry.metadata() {
                Ok(m) => m,
                Err(_) => continue,
            };
            let mtime = match metadata.modified() {
                Ok(mtime) => mtime,
                Err(_) => continue,
            };
            let age = match now.duration_since(mtime) {
                Ok(age) => age,
                Err(_) => continue,
            };
            if age > self.max_age {
                if let Err(e) = fs::remove_file(&path) {
                    warn!(path = %path.display(), error = %e, "failed to reap aged digest file");
                }
            }
        }
        Ok(())
    }

    fn module_path(&self, module: &str) -> PathBuf {
        self.dir.join(format!("{module}.digest"))
    }
}

fn parse_digest(path: &Path, line: u32, hex: &str) -> Result<Digest> {
    if hex.len() != 32 {
        return Err(ConfError::parse(path.display().to_string(), line, "digest must be 32 hex chars"));
    }
    let mut bytes = [0u8; 16];
    for (i, byte) in bytes.iter_mut().enumerate() {
        *byte = u8::from_str_radix(&hex[i * 2..i * 2 + 2], 16)
            .map_err(|_| ConfError::parse(path.display().to_string(), line, "invalid hex digest"))?;
    }
    Ok(Digest(bytes))
}
