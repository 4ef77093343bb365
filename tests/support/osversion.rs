//! A minimal JSON-envelope consumer wrapped under a named member, mirroring
//! `osversion-current`'s use of the shared JSON-file loader: the payload
//! lives at `<member>.osversion-current`, alongside a sibling `version`
//! array. Drives the S2 boundary scenario.

use confplane::loader::{envelope::parse_json_envelope, ConfLoader};
use confplane::Result;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct OsVersionCurrent {
    #[serde(default)]
    pub current: Option<String>,
    #[serde(default)]
    pub minimum: Option<String>,
}

pub fn load(loader: &mut ConfLoader, member: &str) -> Result<(OsVersionCurrent, f64)> {
    let bytes = loader.read_whole_file()?;
    let (data, version) = parse_json_envelope(&bytes, Some(member), "osversion-current")?;
    let parsed: OsVersionCurrent = serde_json::from_value(data)
        .map_err(|e| confplane::ConfError::parse(loader.path().display().to_string(), loader.line(), e.to_string()))?;
    Ok((parsed, version))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn scenario_s2_wrapped_envelope_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("osversion-current.json");
        fs::write(
            &path,
            r#"{"catalog":{"osversion-current":{"current":"10.2","minimum":"9.0"},"version":[1]}}"#,
        )
        .unwrap();

        let mut loader = ConfLoader::open(&path).unwrap();
        let (parsed, version) = load(&mut loader, "catalog").unwrap();

        assert_eq!(version, 1.0);
        assert_eq!(parsed.current.as_deref(), Some("10.2"));
        assert_eq!(parsed.minimum.as_deref(), Some("9.0"));
    }

    #[test]
    fn missing_member_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("osversion-current.json");
        fs::write(&path, r#"{"catalog":{"version":[1]}}"#).unwrap();

        let mut loader = ConfLoader::open(&path).unwrap();
        assert!(load(&mut loader, "catalog").is_err());
    }
}
