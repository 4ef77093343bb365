//! Configuration validation logic

use crate::config::PlaneConfig;
use crate::error::{ConfError, Result};

impl PlaneConfig {
    /// Validate the plane's own settings.
    ///
    /// This does not touch any segment's content — that validation lives
    /// in the segment dispatcher, one file at a time, during a reload.
    pub fn validate(&self) -> Result<()> {
        if !self.root_directory.is_absolute() {
            return Err(ConfError::Policy(format!(
                "root_directory must be absolute, got {}",
                self.root_directory.display()
            )));
        }

        if self.segment.parallel == 0 {
            return Err(ConfError::Policy(
                "segment.parallel must be non-zero".to_string(),
            ));
        }

        if self.segment.retry_sec == 0 {
            return Err(ConfError::Policy(
                "segment.retry-sec must be non-zero".to_string(),
            ));
        }

        if self.digest_store.update_freq_sec == 0 {
            return Err(ConfError::Policy(
                "digest-store.update-freq-sec must be non-zero".to_string(),
            ));
        }

        if self.digest_store.max_age_sec < self.digest_store.update_freq_sec {
            return Err(ConfError::Policy(
                "digest-store.max-age-sec must be at least update-freq-sec".to_string(),
            ));
        }

        Ok(())
    }
}
