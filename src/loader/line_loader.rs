//! Gzip-transparent line reader with a running content digest and a
//! last-good shadow file, modeled on the `conf_loader` read protocol:
//! call `read_line` until it returns `None`, then check `eof()` against
//! `err()` to tell "ran out of input" apart from "hit a real error".

use crate::error::{ConfError, Result};
use flate2::read::GzDecoder;
use std::fs::File;
use std::io::{BufRead, BufReader, Read, Write};
use std::path::{Path, PathBuf};

/// A 128-bit content digest, taken over the raw bytes of a file before any
/// comment-stripping or chomping — two files differing only in trailing
/// whitespace handling by a consumer still compare unequal here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Digest(pub [u8; 16]);

impl std::fmt::Display for Digest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LoaderFlags {
    pub skip_comments: bool,
    pub skip_empty: bool,
    pub allow_nul: bool,
}

enum Source {
    Plain(BufReader<File>),
    Gzip(BufReader<GzDecoder<File>>),
}

impl Read for Source {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match self {
            Source::Plain(r) => r.read(buf),
            Source::Gzip(r) => r.read(buf),
        }
    }
}

impl BufRead for Source {
    fn fill_buf(&mut self) -> std::io::Result<&[u8]> {
        match self {
            Source::Plain(r) => r.fill_buf(),
            Source::Gzip(r) => r.fill_buf(),
        }
    }

    fn consume(&mut self, amt: usize) {
        match self {
            Source::Plain(r) => r.consume(amt),
            Source::Gzip(r) => r.consume(amt),
        }
    }
}

/// Reads one configuration file, line by line, maintaining a digest of
/// the raw bytes seen and a shadow copy destined to become the
/// `<path>.last-good` sidecar once the caller reports a successful load.
pub struct ConfLoader {
    path: PathBuf,
    source: Source,
    flags: LoaderFlags,
    line_no: u32,
    eof: bool,
    err: Option<ConfError>,
    unread: Option<String>,
    hasher: blake3::Hasher,
    shadow: Option<tempfile::NamedTempFile>,
}

impl ConfLoader {
    /// Open `path`, transparently decompressing if it looks gzipped
    /// (checked by extension, matching the `.gz` fallback convention used
    /// for change-detection elsewhere in this crate).
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_inner(path.as_ref(), LoaderFlags::default(), true)
    }

    pub fn open_with(path: impl AsRef<Path>, flags: LoaderFlags) -> Result<Self> {
        Self::open_inner(path.as_ref(), flags, true)
    }

    /// Open `<path>.last-good` as a read-only fallback source: used when a
    /// fresh allocate attempt on `path` fails. Does not itself maintain a
    /// shadow copy — a last-good read that happens to succeed must not
    /// produce a `<path>.last-good.last-good` sidecar.
    pub fn open_last_good(path: impl AsRef<Path>) -> Result<Self> {
        let sidecar = last_good_path(path.as_ref());
        Self::open_inner(&sidecar, LoaderFlags::default(), false)
    }

    fn open_inner(path: &Path, flags: LoaderFlags, want_shadow: bool) -> Result<Self> {
        let path = path.to_path_buf();
        let (file, source_path) = open_plain_or_gz(&path)?;

        let source = if source_path.extension().map(|e| e == "gz").unwrap_or(false) {
            Source::Gzip(BufReader::new(GzDecoder::new(file)))
        } else {
            Source::Plain(BufReader::new(file))
        };

        let shadow = if want_shadow {
            let shadow_dir = path.parent().unwrap_or_else(|| Path::new("."));
            tempfile::NamedTempFile::new_in(shadow_dir).ok()
        } else {
            None
        };

        Ok(Self {
            path,
            source,
            flags,
            line_no: 0,
            eof: false,
            err: None,
            unread: None,
            hasher: blake3::Hasher::new(),
            shadow,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn line(&self) -> u32 {
        self.line_no
    }

    pub fn eof(&self) -> bool {
        self.eof
    }

    pub fn err(&self) -> Option<&ConfError> {
        self.err.as_ref()
    }

    /// Push a line back so the next `read_line` returns it again. Only one
    /// line of pushback is supported, matching the C loader's contract.
    pub fn unread_line(&mut self, line: String) {
        self.unread = Some(line);
        self.line_no = self.line_no.saturating_sub(1);
    }

    /// Read the next logical line, applying the comment/blank-line
    /// filters configured at `open`. Returns `None` on EOF or on error;
    /// callers distinguish the two via `eof()`/`err()` afterward.
    pub fn read_line(&mut self) -> Option<String> {
        if let Some(line) = self.unread.take() {
            self.line_no += 1;
            return Some(line);
        }

        loop {
            if self.eof || self.err.is_some() {
                return None;
            }

            let mut raw = Vec::new();
            let n = match self.source.read_until(b'\n', &mut raw) {
                Ok(n) => n,
                Err(e) => {
                    self.err = Some(ConfError::io(self.path.display().to_string(), e));
                    return None;
                },
            };

            if n == 0 {
                self.eof = true;
                return None;
            }

            self.hasher.update(&raw);

            if !self.flags.allow_nul && raw.contains(&0) {
                self.err = Some(ConfError::parse(
                    self.path.display().to_string(),
                    self.line_no + 1,
                    "embedded NUL byte",
                ));
                return None;
            }

            if let Some(ref mut shadow) = self.shadow {
                let _ = shadow.write_all(&raw);
            }

            self.line_no += 1;

            let line = match String::from_utf8(raw) {
                Ok(s) => s,
                Err(e) => {
                    self.err = Some(ConfError::parse(
                        self.path.display().to_string(),
                        self.line_no,
                        format!("invalid utf-8: {e}"),
                    ));
                    return None;
                },
            };
            let chomped = line.trim_end_matches(['\n', '\r']).to_string();

            if self.flags.skip_empty && chomped.is_empty() {
                continue;
            }
            if self.flags.skip_comments && chomped.trim_start().starts_with('#') {
                continue;
            }

            return Some(chomped);
        }
    }

    /// Slurp the remaining content as raw bytes, for formats (JSON) that
    /// aren't line-oriented. Still runs through the digest and shadow.
    pub fn read_whole_file(&mut self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        self.source
            .read_to_end(&mut buf)
            .map_err(|e| ConfError::io(self.path.display().to_string(), e))?;
        self.hasher.update(&buf);
        if let Some(ref mut shadow) = self.shadow {
            let _ = shadow.write_all(&buf);
        }
        self.eof = true;
        Ok(buf)
    }

    pub fn digest(&self) -> Digest {
        let hash = self.hasher.clone().finalize();
        let mut out = [0u8; 16];
        out.copy_from_slice(&hash.as_bytes()[..16]);
        Digest(out)
    }

    /// Finalize the load. On success, atomically rename the shadow copy
    /// into place as `<path>.last-good`; on failure, the shadow is
    /// dropped and last-good (if any) is left untouched.
    pub fn done(mut self, success: bool) -> Result<()> {
        if success {
            if let Some(shadow) = self.shadow.take() {
                let dest = last_good_path(&self.path);
                shadow
                    .persist(&dest)
                    .map_err(|e| ConfError::io(dest.display().to_string(), e.error))?;
            }
        }
        Ok(())
    }
}

pub fn last_good_path(path: &Path) -> PathBuf {
    let mut s = path.as_os_str().to_owned();
    s.push(".last-good");
    PathBuf::from(s)
}

fn gz_sibling(path: &Path) -> PathBuf {
    let mut s = path.as_os_str().to_owned();
    s.push(".gz");
    PathBuf::from(s)
}

/// Open `path`, falling back to `<path>.gz` if the plain path doesn't
/// exist. Per §4.1: `NotFound` only when neither form is present; any
/// other I/O failure (permissions, a broken symlink, ...) is an `Io`
/// error, never collapsed into `NotFound` — §7 depends on that
/// distinction (`NotFound` drives deletion/removal handling, `Io` drives
/// segment failure + last-good fallback).
fn open_plain_or_gz(path: &Path) -> Result<(File, PathBuf)> {
    match File::open(path) {
        Ok(file) => Ok((file, path.to_path_buf())),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            let gz_path = gz_sibling(path);
            match File::open(&gz_path) {
                Ok(file) => Ok((file, gz_path)),
                Err(e2) if e2.kind() == std::io::ErrorKind::NotFound => Err(ConfError::NotFound(path.display().to_string())),
                Err(e2) => Err(ConfError::io(gz_path.display().to_string(), e2)),
            }
        },
        Err(e) => Err(ConfError::io(path.display().to_string(), e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    fn write_file(dir: &tempfile::TempDir, name: &str, contents: &str) -> PathBuf {
        let path = dir.path().join(name);
        let mut f = File::create(&path).unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        path
    }

    #[test]
    fn reads_lines_and_reports_eof() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "a.conf", "one\ntwo\nthree\n");

        let mut loader = ConfLoader::open(&path).unwrap();
        assert_eq!(loader.read_line().as_deref(), Some("one"));
        assert_eq!(loader.read_line().as_deref(), Some("two"));
        assert_eq!(loader.read_line().as_deref(), Some("three"));
        assert_eq!(loader.read_line(), None);
        assert!(loader.eof());
        assert!(loader.err().is_none());
    }

    #[test]
    fn unread_line_replays_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "a.conf", "one\ntwo\n");

        let mut loader = ConfLoader::open(&path).unwrap();
        let first = loader.read_line().unwrap();
        assert_eq!(first, "one");
        loader.unread_line(first);
        assert_eq!(loader.read_line().as_deref(), Some("one"));
        assert_eq!(loader.read_line().as_deref(), Some("two"));
    }

    #[test]
    fn done_on_success_writes_last_good_byte_identical_to_source() {
        let dir = tempfile::tempdir().unwrap();
        let contents = "geoip 1\ncount 1\n1.2.3.4 IT\n";
        let path = write_file(&dir, "geoip.conf", contents);

        let mut loader = ConfLoader::open(&path).unwrap();
        while loader.read_line().is_some() {}
        loader.done(true).unwrap();

        let saved = std::fs::read_to_string(last_good_path(&path)).unwrap();
        assert_eq!(saved, contents);
    }

    #[test]
    fn done_on_failure_leaves_no_last_good() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "geoip.conf", "garbage\n");

        let mut loader = ConfLoader::open(&path).unwrap();
        while loader.read_line().is_some() {}
        loader.done(false).unwrap();

        assert!(!last_good_path(&path).exists());
    }

    #[test]
    fn open_falls_back_to_gz_sibling_when_plain_path_is_absent() {
        use std::io::Write as _;

        let dir = tempfile::tempdir().unwrap();
        let plain_path = dir.path().join("geoip.conf");
        let gz_path = dir.path().join("geoip.conf.gz");

        let mut encoder = flate2::write::GzEncoder::new(File::create(&gz_path).unwrap(), flate2::Compression::default());
        encoder.write_all(b"geoip 1\ncount 0\n").unwrap();
        encoder.finish().unwrap();

        let mut loader = ConfLoader::open(&plain_path).unwrap();
        assert_eq!(loader.read_line().as_deref(), Some("geoip 1"));
        assert_eq!(loader.read_line().as_deref(), Some("count 0"));
    }

    #[test]
    fn open_reports_not_found_when_neither_plain_nor_gz_exists() {
        let dir = tempfile::tempdir().unwrap();
        let err = ConfLoader::open(dir.path().join("missing.conf")).unwrap_err();
        assert!(matches!(err, ConfError::NotFound(_)), "expected NotFound, got {err:?}");
    }

    #[test]
    fn digest_is_stable_for_identical_content() {
        let dir = tempfile::tempdir().unwrap();
        let path_a = write_file(&dir, "a.conf", "same content\n");
        let path_b = write_file(&dir, "b.conf", "same content\n");

        let mut loader_a = ConfLoader::open(&path_a).unwrap();
        while loader_a.read_line().is_some() {}
        let mut loader_b = ConfLoader::open(&path_b).unwrap();
        while loader_b.read_line().is_some() {}

        assert_eq!(loader_a.digest(), loader_b.digest());
    }
}
