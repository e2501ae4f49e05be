//! Error types for Redfish operations.
//!
//! This module provides the error taxonomy shared by every Redfish client:
//! transport failures, missing or malformed headers, and the HTTP error
//! family refined by status code.

use crate::client::DEFAULT_ERROR_CODE;
use crate::types::{most_severe_message, ErrorBody, ExtendedInfo};
use reqwest::StatusCode;
use serde_json::Value;
use std::fmt;
use thiserror::Error;
use tracing::warn;

/// Main error type for Redfish operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// Transport-level failure, or a long-running operation that did not
    /// finish in time
    #[error("Unable to connect to {url}. Error: {message}")]
    Connection {
        /// URL that was being accessed
        url: String,
        /// Underlying cause
        message: String,
    },

    /// An expected response header is absent
    #[error("Response to {target_uri} did not contain a {header} header")]
    MissingHeader {
        /// Request target the response belongs to
        target_uri: String,
        /// Name of the missing header
        header: String,
    },

    /// Session creation succeeded without returning a session token
    #[error("No X-Auth-Token returned from remote host when attempting to establish a session via {method} {url}")]
    MissingSessionToken {
        /// HTTP method of the session creation request
        method: String,
        /// Session collection URL
        url: String,
    },

    /// A header is present but cannot be interpreted
    #[error("Malformed {header} header `{value}`: {reason}")]
    MalformedHeader {
        /// Header name
        header: String,
        /// Raw header value
        value: String,
        /// Why it could not be parsed
        reason: String,
    },

    /// A resource document lacks a required attribute
    #[error("The attribute {attribute} is missing from the resource {resource}")]
    MissingAttribute {
        /// Resource path
        resource: String,
        /// Attribute path, e.g. `Sessions/@odata.id`
        attribute: String,
    },

    /// HTTP 400
    #[error("{0}")]
    BadRequest(HttpError),

    /// HTTP 401 or 403
    #[error("{0}")]
    Access(HttpError),

    /// HTTP 404
    #[error("{0}")]
    NotFound(HttpError),

    /// HTTP 5xx
    #[error("{0}")]
    ServerSide(HttpError),

    /// Any other HTTP status at or above 400
    #[error("{0}")]
    Http(HttpError),

    /// Response body could not be parsed
    #[error("Failed to parse response: {0}")]
    Parse(String),

    /// URL could not be parsed or joined
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),
}

/// Specialized result type for Redfish operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Details of a failed HTTP exchange.
///
/// Built once when a response is classified and never mutated.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpError {
    /// HTTP method of the failed request
    pub method: String,
    /// Requested URL
    pub url: String,
    /// Response status code
    pub status: u16,
    /// Raw JSON body, if the response carried one
    pub body: Option<Value>,
    /// Machine error code
    pub code: String,
    /// Human readable message
    pub detail: Option<String>,
    /// Extended info entries from the error body
    pub extended_info: Vec<ExtendedInfo>,
}

impl HttpError {
    /// Build the error details from a raw response.
    ///
    /// A body that is not JSON is logged and leaves `body` and `detail` empty.
    #[must_use]
    pub fn from_response(method: &str, url: &str, status: StatusCode, body: &[u8]) -> Self {
        let mut error = Self {
            method: method.to_string(),
            url: url.to_string(),
            status: status.as_u16(),
            body: None,
            code: DEFAULT_ERROR_CODE.to_string(),
            detail: None,
            extended_info: Vec::new(),
        };

        let value = match serde_json::from_slice::<Value>(body) {
            Ok(value) => value,
            Err(_) => {
                warn!(
                    method,
                    url,
                    status = status.as_u16(),
                    "Error response has no JSON body"
                );
                return error;
            }
        };

        let payload = serde_json::from_value::<ErrorBody>(value.clone())
            .map(|body| body.error)
            .unwrap_or_default();

        if let Some(code) = payload.code {
            error.code = code;
        }
        error.detail = most_severe_message(&payload.extended_info)
            .map(str::to_string)
            .or(payload.message);
        error.extended_info = payload.extended_info;
        error.body = Some(value);
        error
    }

    /// Returns the human readable message, or `unknown error`.
    #[must_use]
    pub fn message(&self) -> &str {
        self.detail.as_deref().unwrap_or("unknown error")
    }
}

impl fmt::Display for HttpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "HTTP {} {} returned code {}. {}: {}",
            self.method,
            self.url,
            self.status,
            self.code,
            self.message()
        )
    }
}

/// Classify a response, returning the matching error for failures.
///
/// Statuses below 400 are successes. 400 is a bad request, 401 and 403 are
/// access failures, 404 is not found, 500 and above are server-side failures
/// and anything else is a generic HTTP error.
///
/// # Errors
///
/// Returns the typed error for any status of 400 or above.
pub fn classify_response(method: &str, url: &str, status: StatusCode, body: &[u8]) -> Result<()> {
    let code = status.as_u16();
    if code < 400 {
        return Ok(());
    }

    let error = HttpError::from_response(method, url, status, body);
    Err(match code {
        400 => Error::BadRequest(error),
        401 | 403 => Error::Access(error),
        404 => Error::NotFound(error),
        code if code >= 500 => Error::ServerSide(error),
        _ => Error::Http(error),
    })
}

impl Error {
    /// Returns the error code for this error type.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Connection { .. } => "CONNECTION_ERROR",
            Self::MissingHeader { .. } => "MISSING_HEADER",
            Self::MissingSessionToken { .. } => "MISSING_SESSION_TOKEN",
            Self::MalformedHeader { .. } => "MALFORMED_HEADER",
            Self::MissingAttribute { .. } => "MISSING_ATTRIBUTE",
            Self::BadRequest(_) => "BAD_REQUEST",
            Self::Access(_) => "ACCESS_ERROR",
            Self::NotFound(_) => "NOT_FOUND",
            Self::ServerSide(_) => "SERVER_SIDE_ERROR",
            Self::Http(_) => "HTTP_ERROR",
            Self::Parse(_) => "PARSE_ERROR",
            Self::InvalidUrl(_) => "INVALID_URL",
            Self::Config(_) => "CONFIG_ERROR",
            Self::Validation(_) => "VALIDATION_ERROR",
        }
    }

    /// Returns the HTTP details when this error came from a response.
    #[must_use]
    pub const fn http_error(&self) -> Option<&HttpError> {
        match self {
            Self::BadRequest(err)
            | Self::Access(err)
            | Self::NotFound(err)
            | Self::ServerSide(err)
            | Self::Http(err) => Some(err),
            _ => None,
        }
    }

    /// Returns the HTTP status code when this error came from a response.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        self.http_error().map(|err| err.status)
    }

    /// Returns true for 401/403 responses.
    #[must_use]
    pub const fn is_access(&self) -> bool {
        matches!(self, Self::Access(_))
    }

    /// Returns true for 5xx responses.
    #[must_use]
    pub const fn is_server_side(&self) -> bool {
        matches!(self, Self::ServerSide(_))
    }

    /// Returns true if repeating the request later may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::ServerSide(_) | Self::Connection { .. })
    }
}

// Conversions from external error types
impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        let url = err
            .url()
            .map(ToString::to_string)
            .unwrap_or_else(|| "<unknown>".to_string());
        Self::Connection {
            url,
            message: err.to_string(),
        }
    }
}

impl From<url::ParseError> for Error {
    fn from(err: url::ParseError) -> Self {
        Self::InvalidUrl(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Parse(err.to_string())
    }
}

impl From<validator::ValidationErrors> for Error {
    fn from(err: validator::ValidationErrors) -> Self {
        Self::Validation(err.to_string())
    }
}
