//! Buffered HTTP responses.

use crate::Result;
use redfish_core::Error;
use reqwest::header::{HeaderMap, HeaderName};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use std::borrow::Cow;
use url::Url;

/// A fully read HTTP response.
///
/// The body is buffered once and can be inspected any number of times.
#[derive(Debug, Clone)]
pub struct Response {
    url: Url,
    status: StatusCode,
    headers: HeaderMap,
    body: Vec<u8>,
}

impl Response {
    /// Build a response from its parts.
    #[must_use]
    pub fn new(url: Url, status: StatusCode, headers: HeaderMap, body: Vec<u8>) -> Self {
        Self {
            url,
            status,
            headers,
            body,
        }
    }

    pub(crate) async fn read(response: reqwest::Response) -> Result<Self> {
        let url = response.url().clone();
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await.map_err(|err| Error::Connection {
            url: url.to_string(),
            message: format!("failed to read response body: {err}"),
        })?;

        Ok(Self::new(url, status, headers, body.to_vec()))
    }

    /// URL the response was received from.
    #[must_use]
    pub const fn url(&self) -> &Url {
        &self.url
    }

    /// Status code.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        self.status
    }

    /// All response headers.
    #[must_use]
    pub const fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Value of a header, if present and valid UTF-8.
    #[must_use]
    pub fn header<K>(&self, name: K) -> Option<&str>
    where
        K: reqwest::header::AsHeaderName,
    {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }

    /// Whether the named header is present.
    #[must_use]
    pub fn has_header(&self, name: &HeaderName) -> bool {
        self.headers.contains_key(name)
    }

    /// Raw body bytes.
    #[must_use]
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Whether the body is non-empty.
    #[must_use]
    pub fn has_content(&self) -> bool {
        !self.body.is_empty()
    }

    /// Body decoded as UTF-8, replacing invalid sequences.
    #[must_use]
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }

    /// Deserialize the body as JSON.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Parse`] naming the URL when the body does not match `T`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_slice(&self.body).map_err(|err| {
            Error::Parse(format!("Failed to parse response from `{}`: {err}", self.url))
        })
    }
}
