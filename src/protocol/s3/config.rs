//! Configuration for the native S3 store

use crate::protocol::{StoreError, StoreResult};
use serde::{Deserialize, Serialize};

/// Connection settings for [`S3Store`](super::S3Store)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct S3StoreConfig {
    /// AWS region (e.g., "us-east-1")
    #[serde(default)]
    pub region: Option<String>,

    /// Custom endpoint URL (for S3-compatible services like MinIO)
    #[serde(default)]
    pub endpoint: Option<String>,

    /// AWS access key ID (optional - uses credential chain if not provided)
    #[serde(default)]
    pub access_key: Option<String>,

    /// AWS secret access key (optional - uses credential chain if not provided)
    #[serde(default)]
    pub secret_key: Option<String>,

    /// Session token (for temporary credentials)
    #[serde(default)]
    pub session_token: Option<String>,

    /// Path-style addressing (required for MinIO, LocalStack)
    #[serde(default)]
    pub force_path_style: bool,

    /// SDK operation timeout in seconds
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
}

impl Default for S3StoreConfig {
    fn default() -> Self {
        Self {
            region: None,
            endpoint: None,
            access_key: None,
            secret_key: None,
            session_token: None,
            force_path_style: false,
            timeout_seconds: default_timeout_seconds(),
        }
    }
}

impl S3StoreConfig {
    /// Validate the configuration
    pub fn validate(&self) -> StoreResult<()> {
        if self.access_key.is_some() != self.secret_key.is_some() {
            return Err(StoreError::InvalidRequest(
                "Both access_key and secret_key must be provided together".to_string(),
            ));
        }

        if self.session_token.is_some() && self.access_key.is_none() {
            return Err(StoreError::InvalidRequest(
                "session_token requires access_key and secret_key".to_string(),
            ));
        }

        if self.timeout_seconds == 0 {
            return Err(StoreError::InvalidRequest(
                "timeout_seconds must be greater than zero".to_string(),
            ));
        }

        if let Some(endpoint) = &self.endpoint {
            if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
                return Err(StoreError::InvalidRequest(format!(
                    "Endpoint must start with http:// or https://: {}",
                    endpoint
                )));
            }
        }

        Ok(())
    }

    /// Settings for a local MinIO server
    pub fn minio(endpoint: impl Into<String>, access_key: &str, secret_key: &str) -> Self {
        Self {
            region: Some("us-east-1".to_string()),
            endpoint: Some(endpoint.into()),
            access_key: Some(access_key.to_string()),
            secret_key: Some(secret_key.to_string()),
            force_path_style: true,
            ..Default::default()
        }
    }
}

/// Builder for S3StoreConfig
#[derive(Debug, Clone, Default)]
pub struct S3StoreConfigBuilder {
    config: S3StoreConfig,
}

impl S3StoreConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn region(mut self, region: impl Into<String>) -> Self {
        self.config.region = Some(region.into());
        self
    }

    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.config.endpoint = Some(endpoint.into());
        self
    }

    pub fn credentials(
        mut self,
        access_key: impl Into<String>,
        secret_key: impl Into<String>,
    ) -> Self {
        self.config.access_key = Some(access_key.into());
        self.config.secret_key = Some(secret_key.into());
        self
    }

    pub fn session_token(mut self, token: impl Into<String>) -> Self {
        self.config.session_token = Some(token.into());
        self
    }

    pub fn force_path_style(mut self, enabled: bool) -> Self {
        self.config.force_path_style = enabled;
        self
    }

    pub fn timeout_seconds(mut self, seconds: u64) -> Self {
        self.config.timeout_seconds = seconds;
        self
    }

    /// Build and validate the configuration
    pub fn build(self) -> StoreResult<S3StoreConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

fn default_timeout_seconds() -> u64 {
    300
}
