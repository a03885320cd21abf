//! Config loading, validation, and utility operations.

use super::model::LockConfig;
use crate::error::{LockError, Result};
use std::path::Path;

impl LockConfig {
    /// Load config from a YAML file.
    ///
    /// Unknown fields in the YAML are silently ignored for forward compatibility.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path).map_err(|e| {
            LockError::Config(format!(
                "failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;

        Self::from_yaml(&content)
    }

    /// Parse config from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: LockConfig = serde_yaml::from_str(yaml)
            .map_err(|e| LockError::Config(format!("failed to parse config YAML: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Serialize config to YAML string.
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self)
            .map_err(|e| LockError::Config(format!("failed to serialize config to YAML: {}", e)))
    }

    /// Validate config values.
    ///
    /// Validation rules:
    /// - `entropy_n` must be positive
    /// - `expire_time_seconds`, when set, must be a positive finite number
    /// - `retry.max_attempts`, when set, must be positive
    /// - `retry.initial_backoff_ms` must not exceed `retry.max_backoff_ms`
    pub fn validate(&self) -> Result<()> {
        if self.entropy_n == 0 {
            return Err(LockError::Config(
                "config validation failed: entropy_n must be greater than 0".to_string(),
            ));
        }

        if let Some(secs) = self.expire_time_seconds
            && !(secs.is_finite() && secs > 0.0)
        {
            return Err(LockError::Config(format!(
                "config validation failed: expire_time_seconds must be a positive number (found {})",
                secs
            )));
        }

        if self.retry.max_attempts == Some(0) {
            return Err(LockError::Config(
                "config validation failed: retry.max_attempts must be greater than 0".to_string(),
            ));
        }

        if self.retry.initial_backoff_ms > self.retry.max_backoff_ms {
            return Err(LockError::Config(format!(
                "config validation failed: retry.initial_backoff_ms ({}) exceeds retry.max_backoff_ms ({})",
                self.retry.initial_backoff_ms, self.retry.max_backoff_ms
            )));
        }

        Ok(())
    }
}
