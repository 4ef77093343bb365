//! The two structured-file envelope formats every segment's content is
//! expected to arrive in, plus the line tokenizer consumers use to pull
//! key/value pairs out of a data line.

use crate::error::{ConfError, Result};
use crate::loader::ConfLoader;
use serde_json::Value;
use tracing::warn;

/// Header of the line envelope: `"<type> <version>\n"` followed by a
/// `"count N\n"` line, before any data lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineEnvelopeHeader {
    pub type_name: String,
    pub version: u32,
    pub count: u32,
}

/// A `[name:k]` section marker, as seen between groups of data lines in a
/// sectioned line-envelope type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionHeader {
    pub name: String,
    pub index: u32,
}

/// Read and validate the `"<type> <version>"` / `"count N"` pair at the
/// head of a line-envelope file. Returns a [`ConfError::Parse`] on any
/// malformed or missing header, mirroring the `sscanf`-based checks in
/// the C loader this format was carried over from.
pub fn read_header(loader: &mut ConfLoader, expected_type: &str) -> Result<LineEnvelopeHeader> {
    let path = loader.path().display().to_string();

    let type_line = loader
        .read_line()
        .ok_or_else(|| ConfError::parse(&path, loader.line(), "missing type/version header"))?;

    let mut parts = type_line.split_whitespace();
    let type_name = parts
        .next()
        .ok_or_else(|| ConfError::parse(&path, loader.line(), "missing type name"))?
        .to_string();
    if type_name != expected_type {
        return Err(ConfError::parse(
            &path,
            loader.line(),
            format!("expected type '{expected_type}', got '{type_name}'"),
        ));
    }
    let version: u32 = parts
        .next()
        .ok_or_else(|| ConfError::parse(&path, loader.line(), "missing version"))?
        .parse()
        .map_err(|_| ConfError::parse(&path, loader.line(), "version is not a number"))?;
    if parts.next().is_some() {
        return Err(ConfError::parse(&path, loader.line(), "trailing garbage on header line"));
    }

    let count_line = loader
        .read_line()
        .ok_or_else(|| ConfError::parse(&path, loader.line(), "missing count line"))?;
    let count: u32 = count_line
        .strip_prefix("count ")
        .ok_or_else(|| ConfError::parse(&path, loader.line(), "expected 'count N' line"))?
        .trim()
        .parse()
        .map_err(|_| ConfError::parse(&path, loader.line(), "count is not a number"))?;

    Ok(LineEnvelopeHeader {
        type_name,
        version,
        count,
    })
}

/// Recognize a `[name:k]` section marker line, if `line` is one.
pub fn parse_section_header(line: &str) -> Option<SectionHeader> {
    let inner = line.strip_prefix('[')?.strip_suffix(']')?;
    let (name, index) = inner.rsplit_once(':')?;
    let index: u32 = index.parse().ok()?;
    Some(SectionHeader {
        name: name.to_string(),
        index,
    })
}

/// Confirm the loader is positioned at end of file and nothing else was
/// left unread — catches "more entries present in the file than
/// expected" the same way the geoip loader does after its item loop.
pub fn expect_eof(loader: &ConfLoader) -> Result<()> {
    if !loader.eof() {
        return Err(ConfError::parse(
            loader.path().display().to_string(),
            loader.line(),
            "more entries present in the file than declared by count",
        ));
    }
    Ok(())
}

/// Per-consumer glue for the sectioned body of a line envelope: which
/// `[name:k]` sections a caller actually wants, and what to do with each
/// data line inside them. A type that only cares about a subset of
/// sections (a URL-only config ignoring `[domains:k]`) implements
/// [`Self::wants`] to say so; the driver still consumes and discards the
/// lines of a section it doesn't want, so the byte count stays correct.
pub trait SectionSink {
    /// Handle one data line from section `name`, in declaration order.
    fn line(&mut self, name: &str, line: &str) -> Result<()>;

    /// Whether `name`'s lines should be handed to [`Self::line`] at all.
    /// Sections this returns `false` for are still consumed, just never
    /// parsed — the load-flag-driven skip `spec.md` §4.2 describes.
    fn wants(&self, name: &str) -> bool {
        let _ = name;
        true
    }

    /// Called once if a `[meta:m]` block's `name` field was present.
    fn meta_name(&mut self, _name: &str) {}
}

/// Drive the section-oriented body of a line envelope, once `header` (the
/// type/version/count line) has already been read: an optional
/// `[meta:m]` block (`m` `key value` pairs, only `name` recognized —
/// anything else is warned about and skipped), followed by zero or more
/// `[name:k]` payload sections dispatched to `sink`. Validates at EOF that
/// the declared section sizes sum to `header.count`, matching §4.2's "all
/// counts must sum to N" and testable property #12 (an empty `[x:0]`
/// section is accepted; a mismatched sum is rejected).
pub fn read_sections(loader: &mut ConfLoader, header: &LineEnvelopeHeader, sink: &mut impl SectionSink) -> Result<()> {
    let path = loader.path().display().to_string();
    let mut consumed_total: u32 = 0;

    while let Some(line) = loader.read_line() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let Some(section) = parse_section_header(trimmed) else {
            return Err(ConfError::parse(&path, loader.line(), format!("expected a '[name:k]' section header, got '{line}'")));
        };

        if section.name == "meta" {
            for _ in 0..section.index {
                let entry = loader
                    .read_line()
                    .ok_or_else(|| ConfError::parse(&path, loader.line(), "meta section ended before its declared size"))?;
                match parseline(&entry, ' ', true) {
                    (Some(key), value) if key == "name" => {
                        if let Some(value) = value {
                            sink.meta_name(&value);
                        }
                    },
                    (Some(key), _) => warn!(field = %key, "unrecognized meta field, skipping"),
                    (None, _) => {},
                }
            }
            continue;
        }

        let wants = sink.wants(&section.name);
        for _ in 0..section.index {
            let entry = loader
                .read_line()
                .ok_or_else(|| ConfError::parse(&path, loader.line(), format!("section '{}' ended before its declared size", section.name)))?;
            if wants {
                sink.line(&section.name, &entry)?;
            }
        }
        consumed_total += section.index;
    }

    if let Some(err) = loader.err() {
        return Err(ConfError::parse(&path, loader.line(), err.to_string()));
    }

    if consumed_total != header.count {
        return Err(ConfError::parse(
            &path,
            loader.line(),
            format!("section sizes sum to {consumed_total}, expected {}", header.count),
        ));
    }

    Ok(())
}

/// Split a data line into up to two whitespace/`sep`-delimited words,
/// stripping a trailing `#...` comment first.
///
/// Returns `(None, None)` for a blank or all-comment line, `(Some(key),
/// None)` for a single word, and `(Some(key), Some(value))` once a
/// separator is found. When `multi` is true, runs of `sep` are collapsed
/// (so `"a   =   b"` and `"a=b"` parse identically); otherwise a single
/// `sep` occurrence splits the line.
pub fn parseline(line: &str, sep: char, multi: bool) -> (Option<String>, Option<String>) {
    let without_comment = match line.find('#') {
        Some(idx) => &line[..idx],
        None => line,
    };
    let trimmed = without_comment.trim();
    if trimmed.is_empty() {
        return (None, None);
    }

    let split_at = if multi {
        trimmed.find(|c: char| c == sep || c.is_whitespace())
    } else {
        trimmed.find(sep)
    };

    match split_at {
        None => (Some(trimmed.to_string()), None),
        Some(idx) => {
            let key = trimmed[..idx].trim();
            let rest = &trimmed[idx..];
            let rest = if multi {
                rest.trim_start_matches(|c: char| c == sep || c.is_whitespace())
            } else {
                rest[1..].trim_start()
            };
            let rest = rest.trim();
            if rest.is_empty() {
                (Some(key.to_string()), None)
            } else {
                (Some(key.to_string()), Some(rest.to_string()))
            }
        },
    }
}

/// Parse a JSON envelope: an object, optionally wrapped under a named
/// member, carrying a `version` array (first element numeric) alongside
/// a payload member named after `type_name`.
///
/// When `member` is `Some`, a lexical scan locates `"<member>":` before
/// handing the remainder to the JSON parser — trailing bytes after the
/// value are tolerated, matching `cJSON_ParseWithOpts`'s
/// `require_null_terminated = (member == NULL)` behavior. Without a
/// wrapper, the entire input must parse as exactly one JSON value.
pub fn parse_json_envelope(bytes: &[u8], member: Option<&str>, type_name: &str) -> Result<(Value, f64)> {
    let text = std::str::from_utf8(bytes)
        .map_err(|e| ConfError::parse("<buffer>", 0, format!("not valid utf-8: {e}")))?;

    let value: Value = match member {
        Some(member) => {
            let needle = format!("\"{member}\"");
            let start = text
                .find(&needle)
                .ok_or_else(|| ConfError::parse("<buffer>", 0, format!("member '{member}' not found")))?;
            let after = &text[start + needle.len()..];
            let after = after.trim_start();
            let after = after
                .strip_prefix(':')
                .ok_or_else(|| ConfError::parse("<buffer>", 0, format!("member '{member}' not followed by ':'")))?;

            let mut stream = serde_json::Deserializer::from_str(after).into_iter::<Value>();
            stream
                .next()
                .ok_or_else(|| ConfError::parse("<buffer>", 0, "empty value after member"))?
                .map_err(|e| ConfError::parse("<buffer>", 0, e.to_string()))?
        },
        None => serde_json::from_str(text).map_err(|e| ConfError::parse("<buffer>", 0, e.to_string()))?,
    };

    let obj = value
        .as_object()
        .ok_or_else(|| ConfError::parse("<buffer>", 0, "envelope is not a JSON object"))?;

    let version = obj
        .get("version")
        .and_then(|v| v.as_array())
        .filter(|a| !a.is_empty())
        .and_then(|a| a[0].as_f64())
        .ok_or_else(|| ConfError::parse("<buffer>", 0, "version must be a non-empty array with a numeric first element"))?;

    let data = obj
        .get(type_name)
        .cloned()
        .ok_or_else(|| ConfError::NotFound(format!("member '{type_name}' missing from envelope")))?;

    Ok((data, version))
}
