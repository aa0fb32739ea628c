/*!
 * Configuration types for orbit-upload
 */

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{UploadError, UploadResult};

/// Default part size (8 MiB)
pub const DEFAULT_PART_SIZE: u64 = 8 * 1024 * 1024;

/// Default multipart threshold (8 MiB)
pub const DEFAULT_MULTIPART_THRESHOLD: u64 = 8 * 1024 * 1024;

/// Default number of parts uploaded at once
pub const DEFAULT_MAX_CONCURRENCY: usize = 5;

/// Hard ceiling on parts uploaded at once
pub const MAX_CONCURRENCY: usize = 8;

/// Maximum number of parts in one multipart session
pub const MAX_PARTS: u64 = 10_000;

/// Maximum size of a single part (5 GiB)
pub const MAX_PART_SIZE: u64 = 5 * 1024 * 1024 * 1024;

/// Largest object a single put-object request may carry (5 GiB)
pub const MAX_SINGLE_SHOT_SIZE: u64 = 5 * 1024 * 1024 * 1024;

/// Main configuration for uploads
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadConfig {
    /// Size of each multipart part in bytes (the last part may be smaller)
    #[serde(default = "default_part_size")]
    pub part_size: u64,

    /// Number of parts uploaded concurrently (1..=8)
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// Objects at or above this size use multipart upload
    #[serde(default = "default_multipart_threshold")]
    pub multipart_threshold: u64,

    /// Retries per part after the first attempt
    #[serde(default = "default_max_retries")]
    pub max_retries_per_part: u32,

    /// First retry delay; doubles on each further retry
    #[serde(default = "default_retry_base_delay", with = "duration_ms")]
    pub retry_base_delay: Duration,

    /// Upper bound for a single retry delay
    #[serde(default = "default_retry_max_delay", with = "duration_ms")]
    pub retry_max_delay: Duration,

    /// Random jitter added to each delay, as a fraction of it (0.0-1.0)
    #[serde(default)]
    pub retry_jitter: f64,

    /// Timeout for one request attempt; an elapsed timeout is retried
    #[serde(default = "default_attempt_timeout", with = "duration_ms")]
    pub attempt_timeout: Duration,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            part_size: default_part_size(),
            max_concurrency: default_max_concurrency(),
            multipart_threshold: default_multipart_threshold(),
            max_retries_per_part: default_max_retries(),
            retry_base_delay: default_retry_base_delay(),
            retry_max_delay: default_retry_max_delay(),
            retry_jitter: 0.0,
            attempt_timeout: default_attempt_timeout(),
        }
    }
}

impl UploadConfig {
    /// Validate the configuration. No network call is made with an invalid config.
    pub fn validate(&self) -> UploadResult<()> {
        validate_parameters(self.multipart_threshold, self.part_size, self.max_concurrency)?;

        if self.part_size > MAX_PART_SIZE {
            return Err(UploadError::InvalidConfiguration(format!(
                "part_size {} exceeds maximum {}",
                self.part_size, MAX_PART_SIZE
            )));
        }

        // Objects below the threshold go up in one request
        if self.multipart_threshold > MAX_SINGLE_SHOT_SIZE {
            return Err(UploadError::InvalidConfiguration(format!(
                "multipart_threshold {} exceeds the single-request limit {}",
                self.multipart_threshold, MAX_SINGLE_SHOT_SIZE
            )));
        }

        if !(0.0..=1.0).contains(&self.retry_jitter) {
            return Err(UploadError::InvalidConfiguration(format!(
                "retry_jitter {} must be between 0.0 and 1.0",
                self.retry_jitter
            )));
        }

        if self.retry_max_delay < self.retry_base_delay {
            return Err(UploadError::InvalidConfiguration(format!(
                "retry_max_delay {:?} is shorter than retry_base_delay {:?}",
                self.retry_max_delay, self.retry_base_delay
            )));
        }

        if self.attempt_timeout.is_zero() {
            return Err(UploadError::InvalidConfiguration(
                "attempt_timeout must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> UploadResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            UploadError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&contents)
    }

    /// Parse configuration from TOML text
    pub fn from_toml_str(contents: &str) -> UploadResult<Self> {
        toml::from_str(contents)
            .map_err(|e| UploadError::Config(format!("Failed to parse configuration: {}", e)))
    }

    /// Save configuration to a TOML file
    pub fn to_file(&self, path: &Path) -> UploadResult<()> {
        let contents = toml::to_string_pretty(self)
            .map_err(|e| UploadError::Config(format!("Failed to serialize configuration: {}", e)))?;
        std::fs::write(path, contents).map_err(|e| {
            UploadError::Config(format!("Failed to write {}: {}", path.display(), e))
        })
    }

    /// Small parts and few workers: at most ~10 MiB of part buffers resident
    pub fn low_memory_preset() -> Self {
        Self {
            part_size: 5 * 1024 * 1024,
            max_concurrency: 2,
            ..Default::default()
        }
    }

    /// Large parts at the concurrency ceiling
    pub fn throughput_preset() -> Self {
        Self {
            part_size: 16 * 1024 * 1024,
            max_concurrency: MAX_CONCURRENCY,
            multipart_threshold: 16 * 1024 * 1024,
            ..Default::default()
        }
    }
}

/// Check the three parameters every strategy decision depends on
pub(crate) fn validate_parameters(
    threshold: u64,
    part_size: u64,
    concurrency: usize,
) -> UploadResult<()> {
    if threshold == 0 {
        return Err(UploadError::InvalidConfiguration(
            "multipart_threshold must be greater than zero".to_string(),
        ));
    }

    if part_size == 0 {
        return Err(UploadError::InvalidConfiguration(
            "part_size must be greater than zero".to_string(),
        ));
    }

    if concurrency == 0 {
        return Err(UploadError::InvalidConfiguration(
            "max_concurrency must be at least 1".to_string(),
        ));
    }

    if concurrency > MAX_CONCURRENCY {
        return Err(UploadError::InvalidConfiguration(format!(
            "max_concurrency {} exceeds maximum {}",
            concurrency, MAX_CONCURRENCY
        )));
    }

    Ok(())
}

/// Builder for UploadConfig
#[derive(Debug, Clone, Default)]
pub struct UploadConfigBuilder {
    config: UploadConfig,
}

impl UploadConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn part_size(mut self, bytes: u64) -> Self {
        self.config.part_size = bytes;
        self
    }

    pub fn max_concurrency(mut self, concurrency: usize) -> Self {
        self.config.max_concurrency = concurrency;
        self
    }

    pub fn multipart_threshold(mut self, bytes: u64) -> Self {
        self.config.multipart_threshold = bytes;
        self
    }

    pub fn max_retries_per_part(mut self, retries: u32) -> Self {
        self.config.max_retries_per_part = retries;
        self
    }

    pub fn retry_base_delay(mut self, delay: Duration) -> Self {
        self.config.retry_base_delay = delay;
        self
    }

    pub fn retry_max_delay(mut self, delay: Duration) -> Self {
        self.config.retry_max_delay = delay;
        self
    }

    pub fn retry_jitter(mut self, fraction: f64) -> Self {
        self.config.retry_jitter = fraction;
        self
    }

    pub fn attempt_timeout(mut self, timeout: Duration) -> Self {
        self.config.attempt_timeout = timeout;
        self
    }

    /// Build and validate the configuration
    pub fn build(self) -> UploadResult<UploadConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct LoggingConfig {
    /// Log level for diagnostic output
    #[serde(default)]
    pub log_level: LogLevel,

    /// Log file path (None = stdout), written as JSON lines
    #[serde(default)]
    pub log_file: Option<PathBuf>,

    /// Enable verbose logging (shorthand for log_level = debug)
    #[serde(default)]
    pub verbose: bool,
}

/// Log level for diagnostic output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Only errors
    Error,

    /// Warnings and errors
    Warn,

    /// Info, warnings, and errors
    #[default]
    Info,

    /// Debug and above
    Debug,

    /// All messages including traces
    Trace,
}

impl LogLevel {
    /// Convert to tracing::Level
    pub fn to_tracing_level(&self) -> tracing::Level {
        match self {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Trace => tracing::Level::TRACE,
        }
    }
}

// Default value functions for serde
fn default_part_size() -> u64 {
    DEFAULT_PART_SIZE
}

fn default_max_concurrency() -> usize {
    DEFAULT_MAX_CONCURRENCY
}

fn default_multipart_threshold() -> u64 {
    DEFAULT_MULTIPART_THRESHOLD
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_base_delay() -> Duration {
    Duration::from_millis(200)
}

fn default_retry_max_delay() -> Duration {
    Duration::from_secs(20)
}

fn default_attempt_timeout() -> Duration {
    Duration::from_secs(300)
}

/// Durations are stored as integer milliseconds
mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults_match_documented_values() {
        let config = UploadConfig::default();
        assert_eq!(config.part_size, 8 * 1024 * 1024);
        assert_eq!(config.max_concurrency, 5);
        assert_eq!(config.multipart_threshold, 8 * 1024 * 1024);
        assert_eq!(config.max_retries_per_part, 3);
        assert_eq!(config.retry_base_delay, Duration::from_millis(200));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_concurrency_bounds() {
        for concurrency in 1..=MAX_CONCURRENCY {
            let config = UploadConfig {
                max_concurrency: concurrency,
                ..Default::default()
            };
            assert!(config.validate().is_ok(), "concurrency {}", concurrency);
        }

        for concurrency in [0, 9, 64] {
            let config = UploadConfig {
                max_concurrency: concurrency,
                ..Default::default()
            };
            assert!(matches!(
                config.validate(),
                Err(UploadError::InvalidConfiguration(_))
            ));
        }
    }

    #[test]
    fn test_threshold_capped_at_single_request_limit() {
        let config = UploadConfig {
            multipart_threshold: MAX_SINGLE_SHOT_SIZE,
            ..Default::default()
        };
        assert!(config.validate().is_ok());

        let config = UploadConfig {
            multipart_threshold: 8 * 1024 * 1024 * 1024,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(UploadError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_zero_part_size_and_threshold_rejected() {
        let config = UploadConfig {
            part_size: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = UploadConfig {
            multipart_threshold: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_retry_settings_validated() {
        let config = UploadConfig {
            retry_jitter: 1.5,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = UploadConfig {
            retry_base_delay: Duration::from_secs(10),
            retry_max_delay: Duration::from_secs(1),
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = UploadConfig {
            attempt_timeout: Duration::ZERO,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let toml_str = r#"
            part_size = 5242880
            max_concurrency = 3
            retry_base_delay = 50
        "#;
        let config = UploadConfig::from_toml_str(toml_str).unwrap();
        assert_eq!(config.part_size, 5 * 1024 * 1024);
        assert_eq!(config.max_concurrency, 3);
        assert_eq!(config.retry_base_delay, Duration::from_millis(50));
        assert_eq!(config.multipart_threshold, DEFAULT_MULTIPART_THRESHOLD);
        assert_eq!(config.attempt_timeout, Duration::from_secs(300));
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let err = UploadConfig::from_toml_str("part_size = \"big\"").unwrap_err();
        assert!(matches!(err, UploadError::Config(_)));
    }

    #[test]
    fn test_file_round_trip() {
        let file = NamedTempFile::new().unwrap();
        let config = UploadConfig::throughput_preset();
        config.to_file(file.path()).unwrap();

        let loaded = UploadConfig::from_file(file.path()).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_presets_are_valid() {
        assert!(UploadConfig::low_memory_preset().validate().is_ok());
        assert!(UploadConfig::throughput_preset().validate().is_ok());
        assert_eq!(UploadConfig::throughput_preset().max_concurrency, 8);
    }

    #[test]
    fn test_builder_validates() {
        let config = UploadConfigBuilder::new()
            .part_size(1024)
            .max_concurrency(3)
            .retry_base_delay(Duration::from_millis(1))
            .build()
            .unwrap();
        assert_eq!(config.part_size, 1024);

        let err = UploadConfigBuilder::new().max_concurrency(9).build();
        assert!(matches!(err, Err(UploadError::InvalidConfiguration(_))));
    }

    #[test]
    fn test_log_level_conversion() {
        assert_eq!(LogLevel::Error.to_tracing_level(), tracing::Level::ERROR);
        assert_eq!(LogLevel::Info.to_tracing_level(), tracing::Level::INFO);
        assert_eq!(LogLevel::Trace.to_tracing_level(), tracing::Level::TRACE);
        assert_eq!(LogLevel::default(), LogLevel::Info);
    }
}
