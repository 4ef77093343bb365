//! Path-template grammar: at most one `%u` placeholder, only in the final
//! path component, with ordinary glob wildcards (`*`, `?`) permitted in
//! any earlier component.

use crate::error::{ConfError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateComponent {
    Literal(String),
    Wildcard(String),
    IdPattern { prefix: String, suffix: String },
}

/// Linux's `PATH_MAX`. A template that can never resolve to a path under
/// this ceiling is rejected up front, at construction, rather than letting
/// every matching file silently fail to `open()` later at event time.
pub(crate) const PATH_MAX: usize = 4096;

#[derive(Debug, Clone)]
pub struct PathTemplate {
    pub absolute: bool,
    pub components: Vec<TemplateComponent>,
}

impl PathTemplate {
    /// Parse a template string such as `./data-%u` or `./prefs/*/urlprefs-%u.conf`.
    pub fn parse(path: &str) -> Result<Self> {
        if path.len() >= PATH_MAX {
            return Err(ConfError::Policy(format!(
                "path template exceeds the {PATH_MAX}-byte path length ceiling"
            )));
        }

        let absolute = path.starts_with('/');
        let parts: Vec<&str> = path.split('/').filter(|p| !p.is_empty() && *p != ".").collect();

        if parts.is_empty() {
            return Err(ConfError::Policy("empty path template".to_string()));
        }

        let mut components = Vec::with_capacity(parts.len());
        let mut seen_id = false;
        let last = parts.len() - 1;

        for (i, part) in parts.iter().enumerate() {
            let is_final = i == last;
            let id_positions: Vec<_> = part.match_indices("%u").collect();

            if id_positions.len() > 1 {
                return Err(ConfError::Policy(format!(
                    "only one %u is allowed per path template, found {} in '{part}'",
                    id_positions.len()
                )));
            }

            if let Some((idx, _)) = id_positions.first() {
                if seen_id {
                    return Err(ConfError::Policy("only one %u is allowed per path template".to_string()));
                }
                if !is_final {
                    return Err(ConfError::Policy("%u is only permitted in the final path component".to_string()));
                }
                seen_id = true;
                let prefix = part[..*idx].to_string();
                let suffix = part[idx + 2..].to_string();
                if prefix.contains('*') || prefix.contains('?') || suffix.contains('*') || suffix.contains('?') {
                    return Err(ConfError::Policy(
                        "no other wildcards are permitted alongside %u in the final component".to_string(),
                    ));
                }
                components.push(TemplateComponent::IdPattern { prefix, suffix });
            } else if part.contains('*') || part.contains('?') {
                components.push(TemplateComponent::Wildcard((*part).to_string()));
            } else {
                components.push(TemplateComponent::Literal((*part).to_string()));
            }
        }

        Ok(Self { absolute, components })
    }

    pub fn has_id_component(&self) -> bool {
        matches!(self.components.last(), Some(TemplateComponent::IdPattern { .. }))
    }
}

/// Classic shell-style wildcard match supporting `*` and `?`, used to test
/// directory/file names against an earlier-component glob.
pub fn glob_match(pattern: &str, name: &str) -> bool {
    fn helper(p: &[u8], s: &[u8]) -> bool {
        match (p.first(), s.first()) {
            (None, None) => true,
            (Some(b'*'), _) => helper(&p[1..], s) || (!s.is_empty() && helper(p, &s[1..])),
            (Some(b'?'), Some(_)) => helper(&p[1..], &s[1..]),
            (Some(pc), Some(sc)) if pc == sc => helper(&p[1..], &s[1..]),
            _ => false,
        }
    }
    helper(pattern.as_bytes(), name.as_bytes())
}

/// Match a filename against a `prefix<digits>suffix` id pattern, returning
/// the parsed id. The digit run is whatever's left after stripping the
/// literal prefix and suffix — equivalent to diffing the glob against the
/// actual filename the way `preffile_new` locates its numeric id. A
/// non-numeric (or empty) remainder still matches, with id 0, the same way
/// the C source's `kit_strtoul` falls through to zero on a bad parse.
pub fn match_id(prefix: &str, suffix: &str, filename: &str) -> Option<u32> {
    let rest = filename.strip_prefix(prefix)?;
    let rest = rest.strip_suffix(suffix)?;
    Some(rest.parse().unwrap_or(0))
}
