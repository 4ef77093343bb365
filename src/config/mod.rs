//! Configuration knobs for the plane itself.
//!
//! This is deliberately small: the interesting "configuration" in this
//! crate is the *content* a [`crate::segment`] dispatcher loads on behalf
//! of a registered module, not the plane's own settings. `PlaneConfig` is
//! just the handful of knobs needed to stand the plane up (where segments
//! live on disk, how the digest store behaves, how much reload work runs
//! concurrently).

use crate::error::{ConfError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub mod validation;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PlaneConfig {
    /// Absolute directory that every registered segment path must resolve
    /// under. `conf_info_assert_pathok`'s equivalent is enforced against
    /// this field wherever a module registers a path.
    pub root_directory: PathBuf,

    #[serde(default)]
    pub digest_store: DigestStoreConfig,

    #[serde(default)]
    pub segment: SegmentConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DigestStoreConfig {
    pub dir: PathBuf,
    #[serde(default = "default_digest_update_freq_sec")]
    pub update_freq_sec: u64,
    #[serde(default = "default_digest_max_age_sec")]
    pub max_age_sec: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SegmentConfig {
    #[serde(default = "default_segment_parallel")]
    pub parallel: usize,
    #[serde(default = "default_segment_retry_sec")]
    pub retry_sec: u64,
}

fn default_digest_update_freq_sec() -> u64 {
    60
}
fn default_digest_max_age_sec() -> u64 {
    86400
}
fn default_segment_parallel() -> usize {
    4
}
fn default_segment_retry_sec() -> u64 {
    5
}

impl Default for DigestStoreConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("digest"),
            update_freq_sec: default_digest_update_freq_sec(),
            max_age_sec: default_digest_max_age_sec(),
        }
    }
}

impl Default for SegmentConfig {
    fn default() -> Self {
        Self {
            parallel: default_segment_parallel(),
            retry_sec: default_segment_retry_sec(),
        }
    }
}

impl Default for PlaneConfig {
    fn default() -> Self {
        Self {
            root_directory: PathBuf::from("."),
            digest_store: DigestStoreConfig::default(),
            segment: SegmentConfig::default(),
        }
    }
}

impl PlaneConfig {
    /// Load from a YAML or TOML file, dispatched on the file extension,
    /// the way the rest of this codebase loads its own settings.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfError::io(path.display().to_string(), e))?;

        let extension = path.extension().and_then(|ext| ext.to_str()).unwrap_or("yaml");

        let config: PlaneConfig = match extension {
            "yaml" | "yml" => serde_yaml::from_str(&content)
                .map_err(|e| ConfError::parse(path.display().to_string(), 0, e.to_string()))?,
            "toml" => toml::from_str(&content)
                .map_err(|e| ConfError::parse(path.display().to_string(), 0, e.to_string()))?,
            other => {
                return Err(ConfError::Policy(format!(
                    "unsupported plane config format: {other}"
                )))
            },
        };

        config.validate()?;
        Ok(config)
    }
}
