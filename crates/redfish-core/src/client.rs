//! Protocol constants and retry policy.
//!
//! This module provides the header names, default budgets and HTTP client
//! configuration shared by every Redfish connector.

use std::time::Duration;

// Protocol headers

/// Header carrying the protocol (OData) version on every request
pub const PROTOCOL_VERSION_HEADER: &str = "OData-Version";

/// Default protocol version sent in [`PROTOCOL_VERSION_HEADER`]
pub const DEFAULT_PROTOCOL_VERSION: &str = "4.0";

/// Response header carrying a freshly created session token, and the
/// request header used to present it afterwards
pub const SESSION_TOKEN_HEADER: &str = "X-Auth-Token";

/// JSON media type used for request bodies
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// Machine error code used when an error body carries none
pub const DEFAULT_ERROR_CODE: &str = "Base.1.0.GeneralError";

/// Default service root path
pub const DEFAULT_ROOT_PATH: &str = "/redfish/v1/";

// Timeouts (in seconds)

/// Default timeout for a single HTTP round-trip
pub const DEFAULT_REQUEST_TIMEOUT: u64 = 60;

/// Default connect timeout
pub const DEFAULT_CONNECT_TIMEOUT: u64 = 10;

/// Default time to wait for a long-running operation in blocking mode
pub const DEFAULT_TASK_TIMEOUT: u64 = 60;

/// Poll interval used when a task monitor sends no `Retry-After`
pub const DEFAULT_RETRY_AFTER: u64 = 1;

// Retry settings

/// Default number of retries for GET requests failing server-side
pub const DEFAULT_SERVER_SIDE_RETRIES: u32 = 5;

/// Default delay between server-side retries in seconds
pub const DEFAULT_SERVER_SIDE_RETRY_DELAY: u64 = 3;

/// Retry policy for server-side failures.
///
/// Redfish services recover from transient 5xx responses on their own
/// schedule, so the delay between attempts is fixed rather than growing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of retry attempts
    pub max_retries: u32,

    /// Delay before each retry
    pub delay: Duration,
}

impl RetryPolicy {
    /// Create a new retry policy with default values.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            max_retries: DEFAULT_SERVER_SIDE_RETRIES,
            delay: Duration::from_secs(DEFAULT_SERVER_SIDE_RETRY_DELAY),
        }
    }

    /// Create a retry policy with no retries.
    #[must_use]
    pub const fn no_retry() -> Self {
        Self {
            max_retries: 0,
            delay: Duration::from_secs(0),
        }
    }

    /// Set the maximum number of retries.
    #[must_use]
    pub const fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// Set the delay between retries.
    #[must_use]
    pub const fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new()
    }
}

/// HTTP client configuration.
///
/// Runtime settings for the connector's HTTP client and request pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Timeout for a single HTTP round-trip
    pub timeout: Duration,

    /// Connect timeout
    pub connect_timeout: Duration,

    /// Retry policy for server-side failures on GET
    pub retry_policy: RetryPolicy,

    /// Send `Connection: close` on every request
    pub connection_close: bool,

    /// Value of the protocol version header
    pub protocol_version: String,

    /// Time to wait for long-running operations in blocking mode
    pub task_timeout: Duration,
}

impl ClientConfig {
    /// Create a new client configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self {
            timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT),
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT),
            retry_policy: RetryPolicy::new(),
            connection_close: true,
            protocol_version: DEFAULT_PROTOCOL_VERSION.to_string(),
            task_timeout: Duration::from_secs(DEFAULT_TASK_TIMEOUT),
        }
    }

    /// Set request timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set connect timeout.
    #[must_use]
    pub const fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set retry policy.
    #[must_use]
    pub const fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    /// Disable retries.
    #[must_use]
    pub const fn without_retries(mut self) -> Self {
        self.retry_policy = RetryPolicy::no_retry();
        self
    }

    /// Enable or disable the `Connection: close` hint.
    #[must_use]
    pub const fn with_connection_close(mut self, enabled: bool) -> Self {
        self.connection_close = enabled;
        self
    }

    /// Set the long-running operation timeout.
    #[must_use]
    pub const fn with_task_timeout(mut self, timeout: Duration) -> Self {
        self.task_timeout = timeout;
        self
    }

    /// Set the protocol version header value.
    #[must_use]
    pub fn with_protocol_version(mut self, version: impl Into<String>) -> Self {
        self.protocol_version = version.into();
        self
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new()
    }
}
