// SPDX-License-Identifier: MIT
//! Codec and file-unit settings

use serde::{Deserialize, Serialize};

use crate::codec::ErrorMode;

/// Default gzip level for `.gz` output
pub const DEFAULT_GZIP_LEVEL: u32 = 6;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodecConfig {
    /// Stop at the first failing field, or collect them all
    pub error_mode: ErrorMode,
    /// Override for the bank buffer capacity; `None` uses the schema maximum
    pub buffer_capacity: Option<usize>,
    /// Check bank CRCs while reading DST files
    pub verify_crc: bool,
    pub gzip_level: u32,
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            error_mode: ErrorMode::FailFast,
            buffer_capacity: None,
            verify_crc: false,
            gzip_level: DEFAULT_GZIP_LEVEL,
        }
    }
}

impl CodecConfig {
    /// Read settings from `DST_*` environment variables, falling back to defaults
    pub fn from_env() -> Self {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Like [`from_env`](Self::from_env) with a custom variable lookup
    pub fn from_vars<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        Self {
            error_mode: lookup("DST_ERROR_MODE")
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.error_mode),
            buffer_capacity: lookup("DST_BUFFER_CAPACITY").and_then(|s| s.parse().ok()),
            verify_crc: lookup("DST_VERIFY_CRC")
                .map(|s| matches!(s.trim(), "1" | "true" | "yes" | "on"))
                .unwrap_or(defaults.verify_crc),
            gzip_level: lookup("DST_GZIP_LEVEL")
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.gzip_level),
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.gzip_level > 9 {
            return Err("DST_GZIP_LEVEL must be between 0 and 9".to_string());
        }

        if let Some(capacity) = self.buffer_capacity {
            if capacity < crate::format::BANK_HEADER_SIZE {
                return Err(format!(
                    "DST_BUFFER_CAPACITY must hold at least the {}-byte bank header",
                    crate::format::BANK_HEADER_SIZE
                ));
            }
        }

        Ok(())
    }

    pub fn with_error_mode(mut self, mode: ErrorMode) -> Self {
        self.error_mode = mode;
        self
    }

    pub fn with_buffer_capacity(mut self, capacity: usize) -> Self {
        self.buffer_capacity = Some(capacity);
        self
    }

    pub fn with_verify_crc(mut self, verify: bool) -> Self {
        self.verify_crc = verify;
        self
    }

    pub fn with_gzip_level(mut self, level: u32) -> Self {
        self.gzip_level = level;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = CodecConfig::from_vars(vars(&[]));
        assert_eq!(config, CodecConfig::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_vars() {
        let config = CodecConfig::from_vars(vars(&[
            ("DST_ERROR_MODE", "accumulate"),
            ("DST_BUFFER_CAPACITY", "4096"),
            ("DST_VERIFY_CRC", "true"),
            ("DST_GZIP_LEVEL", "9"),
        ]));
        assert_eq!(config.error_mode, ErrorMode::Accumulate);
        assert_eq!(config.buffer_capacity, Some(4096));
        assert!(config.verify_crc);
        assert_eq!(config.gzip_level, 9);
    }

    #[test]
    fn test_unparseable_values_fall_back() {
        let config = CodecConfig::from_vars(vars(&[
            ("DST_ERROR_MODE", "loud"),
            ("DST_GZIP_LEVEL", "max"),
        ]));
        assert_eq!(config.error_mode, ErrorMode::FailFast);
        assert_eq!(config.gzip_level, DEFAULT_GZIP_LEVEL);
    }

    #[test]
    fn test_validate() {
        assert!(CodecConfig::default().with_gzip_level(10).validate().is_err());
        assert!(CodecConfig::default()
            .with_buffer_capacity(4)
            .validate()
            .is_err());
        assert!(CodecConfig::default()
            .with_buffer_capacity(8)
            .with_verify_crc(true)
            .validate()
            .is_ok());
    }
}
