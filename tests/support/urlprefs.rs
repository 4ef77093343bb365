//! A minimal segmented consumer over a `%u`-templated directory of
//! preference files, one per organization, each listing domain→action
//! rules under `[meta:m]`/`[domains:k]`/`[urls:k]` sections. Proves the
//! segment dispatcher and the section-driven line envelope against a
//! multi-file, multi-section format. Drives S3, S4 and S5.

use confplane::loader::envelope::{read_header, read_sections, SectionSink};
use confplane::loader::ConfLoader;
use confplane::segment::SegmentLoader;
use confplane::{ConfError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct UrlPrefSegment {
    pub org_name: Option<String>,
    pub rules: Vec<(String, String)>,
}

struct Sink {
    skip_domains: bool,
    segment: UrlPrefSegment,
    error: Option<String>,
}

impl SectionSink for Sink {
    fn line(&mut self, name: &str, line: &str) -> Result<()> {
        let mut columns = line.split_whitespace();
        let (Some(domain), Some(action)) = (columns.next(), columns.next()) else {
            self.error.get_or_insert_with(|| format!("malformed '{name}' data line: '{line}'"));
            return Ok(());
        };
        self.segment.rules.push((domain.to_string(), action.to_string()));
        Ok(())
    }

    fn wants(&self, name: &str) -> bool {
        name != "domains" || !self.skip_domains
    }

    fn meta_name(&mut self, name: &str) {
        self.segment.org_name = Some(name.to_string());
    }
}

/// A segment loader for org preference files. `skip_domains` models the
/// load-flag bit `spec.md` §4.2 describes for a URL-only consumer: the
/// `[domains:k]` section is still consumed (to keep the declared count
/// balanced) but its lines are never parsed.
#[derive(Default)]
pub struct UrlPrefSegments {
    pub skip_domains: bool,
}

impl SegmentLoader for UrlPrefSegments {
    type Value = UrlPrefSegment;

    fn load(&self, loader: &mut ConfLoader) -> Result<UrlPrefSegment> {
        let header = read_header(loader, "urlprefs")?;

        let mut sink = Sink { skip_domains: self.skip_domains, segment: UrlPrefSegment::default(), error: None };
        read_sections(loader, &header, &mut sink)?;

        if let Some(message) = sink.error {
            return Err(ConfError::parse(loader.path().display().to_string(), loader.line(), message));
        }

        Ok(sink.segment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn loads_a_well_formed_segment_with_sections() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("urlprefs-1");
        fs::write(
            &path,
            "urlprefs 1\ncount 3\n[meta:1]\nname org-7\n[domains:2]\nexample.com block\nexample.org allow\n[urls:1]\nexample.net/x block\n",
        )
        .unwrap();

        let mut loader = ConfLoader::open(&path).unwrap();
        let segment = UrlPrefSegments::default().load(&mut loader).unwrap();

        assert_eq!(segment.org_name.as_deref(), Some("org-7"));
        assert_eq!(
            segment.rules,
            vec![
                ("example.com".to_string(), "block".to_string()),
                ("example.org".to_string(), "allow".to_string()),
                ("example.net/x".to_string(), "block".to_string()),
            ]
        );
    }

    #[test]
    fn url_only_loader_skips_the_domains_section() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("urlprefs-1");
        fs::write(
            &path,
            "urlprefs 1\ncount 2\n[domains:1]\nexample.com block\n[urls:1]\nexample.net/x block\n",
        )
        .unwrap();

        let mut loader = ConfLoader::open(&path).unwrap();
        let segment = UrlPrefSegments { skip_domains: true }.load(&mut loader).unwrap();

        assert_eq!(segment.rules, vec![("example.net/x".to_string(), "block".to_string())]);
    }

    #[test]
    fn count_mismatch_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("urlprefs-1");
        fs::write(&path, "urlprefs 1\ncount 2\n[domains:1]\nexample.com block\n").unwrap();

        let mut loader = ConfLoader::open(&path).unwrap();
        assert!(UrlPrefSegments::default().load(&mut loader).is_err());
    }
}
