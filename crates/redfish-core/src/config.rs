//! Configuration structures for Redfish clients.
//!
//! This module provides the connection configuration for a Redfish service:
//! endpoint, credentials, authentication method, TLS and retry settings.

use crate::client::{
    ClientConfig, RetryPolicy, DEFAULT_CONNECT_TIMEOUT, DEFAULT_PROTOCOL_VERSION,
    DEFAULT_REQUEST_TIMEOUT, DEFAULT_ROOT_PATH, DEFAULT_SERVER_SIDE_RETRIES,
    DEFAULT_SERVER_SIDE_RETRY_DELAY, DEFAULT_TASK_TIMEOUT,
};
use crate::Error;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;
use validator::Validate;

/// How the client authenticates against the service.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthMethod {
    /// HTTP basic credentials on every request
    Basic,
    /// Token-based Redfish session
    Session,
    /// Try a session first, fall back to basic credentials
    #[default]
    Auto,
}

/// Configuration for a Redfish client instance.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct RedfishConfig {
    /// Service base URL, e.g. `https://bmc.example.com`
    #[validate(url)]
    pub base_url: String,

    /// Account name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    /// Account password
    #[serde(default, skip_serializing)]
    pub password: Option<String>,

    /// Authentication method
    #[serde(default)]
    pub auth_method: AuthMethod,

    /// Path of the service root
    #[serde(default = "default_root_path")]
    pub root_path: String,

    /// Whether to verify TLS certificates
    #[serde(default = "default_tls_verify")]
    pub tls_verify: bool,

    /// Optional path to custom CA certificate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls_ca_cert: Option<std::path::PathBuf>,

    /// Request timeout in seconds
    #[validate(range(min = 1, max = 300))]
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Retries for GET requests failing server-side
    #[validate(range(max = 20))]
    #[serde(default = "default_server_side_retries")]
    pub server_side_retries: u32,

    /// Delay between server-side retries in seconds
    #[validate(range(max = 60))]
    #[serde(default = "default_server_side_retry_delay_secs")]
    pub server_side_retry_delay_secs: u64,

    /// Time to wait for long-running operations in blocking mode, in seconds
    #[validate(range(min = 1, max = 86400))]
    #[serde(default = "default_task_timeout_secs")]
    pub task_timeout_secs: u64,

    /// Send `Connection: close` on every request
    #[serde(default = "default_connection_close")]
    pub connection_close: bool,

    /// Protocol version header value
    #[serde(default = "default_protocol_version")]
    pub protocol_version: String,
}

fn default_root_path() -> String {
    DEFAULT_ROOT_PATH.to_string()
}

const fn default_tls_verify() -> bool {
    true
}

const fn default_request_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT
}

const fn default_server_side_retries() -> u32 {
    DEFAULT_SERVER_SIDE_RETRIES
}

const fn default_server_side_retry_delay_secs() -> u64 {
    DEFAULT_SERVER_SIDE_RETRY_DELAY
}

const fn default_task_timeout_secs() -> u64 {
    DEFAULT_TASK_TIMEOUT
}

const fn default_connection_close() -> bool {
    true
}

fn default_protocol_version() -> String {
    DEFAULT_PROTOCOL_VERSION.to_string()
}

impl RedfishConfig {
    /// Create a new client configuration with required parameters.
    ///
    /// # Arguments
    ///
    /// * `base_url` - The service base URL (e.g., "https://bmc.example.com")
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid or validation fails.
    pub fn new(base_url: impl Into<String>) -> Result<Self, Error> {
        let config = Self {
            base_url: base_url.into(),
            ..Self::default()
        };

        config.validate_all()?;
        Ok(config)
    }

    /// Validate the whole configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] describing the invalid fields.
    pub fn validate_all(&self) -> Result<(), Error> {
        self.validate()?;
        Ok(())
    }

    /// Set account credentials.
    #[must_use]
    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    /// Set the authentication method.
    #[must_use]
    pub const fn with_auth_method(mut self, method: AuthMethod) -> Self {
        self.auth_method = method;
        self
    }

    /// Set the service root path.
    #[must_use]
    pub fn with_root_path(mut self, path: impl Into<String>) -> Self {
        self.root_path = path.into();
        self
    }

    /// Set whether to verify TLS certificates.
    #[must_use]
    pub const fn with_tls_verify(mut self, verify: bool) -> Self {
        self.tls_verify = verify;
        self
    }

    /// Set custom CA certificate path.
    #[must_use]
    pub fn with_ca_cert(mut self, path: std::path::PathBuf) -> Self {
        self.tls_ca_cert = Some(path);
        self
    }

    /// Set request timeout in seconds.
    #[must_use]
    pub const fn with_timeout(mut self, seconds: u64) -> Self {
        self.request_timeout_secs = seconds;
        self
    }

    /// Set the server-side retry budget and delay.
    #[must_use]
    pub const fn with_server_side_retries(mut self, retries: u32, delay_secs: u64) -> Self {
        self.server_side_retries = retries;
        self.server_side_retry_delay_secs = delay_secs;
        self
    }

    /// Set the long-running operation timeout in seconds.
    #[must_use]
    pub const fn with_task_timeout(mut self, seconds: u64) -> Self {
        self.task_timeout_secs = seconds;
        self
    }

    /// Enable or disable the `Connection: close` hint.
    #[must_use]
    pub const fn with_connection_close(mut self, enabled: bool) -> Self {
        self.connection_close = enabled;
        self
    }

    /// Get the request timeout as a Duration.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Get the long-running operation timeout as a Duration.
    #[must_use]
    pub const fn task_timeout(&self) -> Duration {
        Duration::from_secs(self.task_timeout_secs)
    }

    /// Parse and validate the base URL.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL cannot be parsed.
    pub fn parse_base_url(&self) -> Result<Url, Error> {
        Url::parse(&self.base_url)
            .map_err(|e| Error::Config(format!("Invalid base URL: {e}")))
    }

    /// Derive the runtime HTTP client configuration.
    #[must_use]
    pub fn client_config(&self) -> ClientConfig {
        ClientConfig::new()
            .with_timeout(self.timeout())
            .with_connect_timeout(Duration::from_secs(DEFAULT_CONNECT_TIMEOUT))
            .with_retry_policy(
                RetryPolicy::new()
                    .with_max_retries(self.server_side_retries)
                    .with_delay(Duration::from_secs(self.server_side_retry_delay_secs)),
            )
            .with_connection_close(self.connection_close)
            .with_protocol_version(self.protocol_version.clone())
            .with_task_timeout(self.task_timeout())
    }
}

impl Default for RedfishConfig {
    fn default() -> Self {
        Self {
            base_url: "https://localhost".to_string(),
            username: None,
            password: None,
            auth_method: AuthMethod::default(),
            root_path: default_root_path(),
            tls_verify: default_tls_verify(),
            tls_ca_cert: None,
            request_timeout_secs: default_request_timeout_secs(),
            server_side_retries: default_server_side_retries(),
            server_side_retry_delay_secs: default_server_side_retry_delay_secs(),
            task_timeout_secs: default_task_timeout_secs(),
            connection_close: default_connection_close(),
            protocol_version: default_protocol_version(),
        }
    }
}
