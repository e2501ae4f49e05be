//! Request dispatch for Redfish services.
//!
//! [`Connector`] issues HTTP requests, attaches the credentials kept in its
//! [`RequestContext`], classifies failures, retries server-side failures on
//! GET, refreshes an expired session once on an access failure, and waits out
//! long-running operations for blocking calls.

use crate::auth::{authenticator_for, Authenticator};
use crate::models::ServiceRoot;
use crate::response::Response;
use crate::task_monitor::TaskMonitor;
use crate::Result;
use redfish_core::client::{
    ClientConfig, JSON_CONTENT_TYPE, PROTOCOL_VERSION_HEADER, SESSION_TOKEN_HEADER,
};
use redfish_core::config::RedfishConfig;
use redfish_core::{classify_response, Error};
use reqwest::header::{
    AsHeaderName, HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONNECTION, CONTENT_TYPE,
    LOCATION,
};
use reqwest::{Client, ClientBuilder, Method, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde_json::{Map, Value};
use std::fmt;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use url::Url;

const USER_AGENT: &str = concat!("redfish-connector/", env!("CARGO_PKG_VERSION"));
const REDACTED: &str = "***";
const SENSITIVE_BODY_FIELD: &str = "Password";

/// Boxed future returned by [`Connector::op`].
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Callback invoked with every raw response before it is classified.
pub type ResponseObserver = Arc<dyn Fn(&Response) + Send + Sync>;

fn session_token_header() -> HeaderName {
    HeaderName::from_static("x-auth-token")
}

fn protocol_version_header() -> HeaderName {
    HeaderName::from_static("odata-version")
}

struct BasicCredentials {
    username: String,
    password: SecretString,
}

impl fmt::Debug for BasicCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BasicCredentials")
            .field("username", &self.username)
            .field("password", &REDACTED)
            .finish()
    }
}

/// Headers and credentials applied to every request of a [`Connector`].
///
/// Authenticators write this state; the connector reads it on each send.
#[derive(Debug, Default)]
pub struct RequestContext {
    headers: HeaderMap,
    basic: Option<BasicCredentials>,
}

impl RequestContext {
    /// Present `token` in the session token header from now on.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedHeader`] if the token is not a valid header value.
    pub fn set_session_token(&mut self, token: &str) -> Result<()> {
        let mut value = HeaderValue::from_str(token).map_err(|err| Error::MalformedHeader {
            header: SESSION_TOKEN_HEADER.to_string(),
            value: REDACTED.to_string(),
            reason: err.to_string(),
        })?;
        value.set_sensitive(true);
        self.headers.insert(session_token_header(), value);
        Ok(())
    }

    /// Stop presenting a session token.
    pub fn clear_session_token(&mut self) {
        self.headers.remove(session_token_header());
    }

    /// The session token currently presented, if any.
    #[must_use]
    pub fn session_token(&self) -> Option<&str> {
        self.headers
            .get(session_token_header())
            .and_then(|value| value.to_str().ok())
    }

    /// Send HTTP basic credentials with every request.
    pub fn set_basic_credentials(&mut self, username: impl Into<String>, password: SecretString) {
        self.basic = Some(BasicCredentials {
            username: username.into(),
            password,
        });
    }

    /// Stop sending HTTP basic credentials.
    pub fn clear_basic_credentials(&mut self) {
        self.basic = None;
    }

    /// Whether basic credentials are set.
    #[must_use]
    pub const fn has_basic_credentials(&self) -> bool {
        self.basic.is_some()
    }

    /// Add a header to every request.
    pub fn set_header(&mut self, name: HeaderName, value: HeaderValue) {
        self.headers.insert(name, value);
    }

    /// Remove a persistent header.
    pub fn remove_header<K: AsHeaderName>(&mut self, name: K) -> Option<HeaderValue> {
        self.headers.remove(name)
    }

    /// Persistent headers.
    #[must_use]
    pub const fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Drop every credential: session token, authorization header and
    /// basic credentials.
    pub fn clear_credentials(&mut self) {
        self.clear_session_token();
        self.headers.remove(AUTHORIZATION);
        self.clear_basic_credentials();
    }
}

/// Per-call options for [`Connector::op`].
#[derive(Debug, Clone)]
pub struct OpOptions {
    /// Extra headers; they override connector defaults case-insensitively
    pub headers: HeaderMap,
    /// Wait for a long-running operation started by this call
    pub blocking: bool,
    /// How long to wait when blocking
    pub timeout: Duration,
    /// Server-side retry budget for GET; `None` uses the connector's policy
    pub server_side_retries: Option<u32>,
}

impl OpOptions {
    /// Non-blocking options with no extra headers.
    #[must_use]
    pub fn new() -> Self {
        Self {
            headers: HeaderMap::new(),
            blocking: false,
            timeout: Duration::from_secs(redfish_core::client::DEFAULT_TASK_TIMEOUT),
            server_side_retries: None,
        }
    }

    /// Add a header.
    #[must_use]
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Replace the extra headers.
    #[must_use]
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    /// Wait up to `timeout` for a long-running operation to finish.
    #[must_use]
    pub const fn blocking(mut self, timeout: Duration) -> Self {
        self.blocking = true;
        self.timeout = timeout;
        self
    }

    /// Override the server-side retry budget.
    #[must_use]
    pub const fn with_server_side_retries(mut self, retries: u32) -> Self {
        self.server_side_retries = Some(retries);
        self
    }
}

impl Default for OpOptions {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for [`Connector`].
#[derive(Clone)]
pub struct ConnectorBuilder {
    base_url: Url,
    http_config: ClientConfig,
    tls_verify: bool,
    tls_ca_cert: Option<PathBuf>,
    user_agent: String,
    observer: Option<ResponseObserver>,
}

impl fmt::Debug for ConnectorBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectorBuilder")
            .field("base_url", &self.base_url.as_str())
            .field("http_config", &self.http_config)
            .field("tls_verify", &self.tls_verify)
            .field("tls_ca_cert", &self.tls_ca_cert)
            .field("user_agent", &self.user_agent)
            .finish_non_exhaustive()
    }
}

impl ConnectorBuilder {
    /// Create a builder for the specified base URL.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidUrl`] if the URL cannot be parsed.
    pub fn new(base_url: impl AsRef<str>) -> Result<Self> {
        let base_url = Url::parse(base_url.as_ref())?;

        Ok(Self {
            base_url,
            http_config: ClientConfig::new(),
            tls_verify: true,
            tls_ca_cert: None,
            user_agent: USER_AGENT.to_string(),
            observer: None,
        })
    }

    /// Create a builder from a validated [`RedfishConfig`].
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn from_config(config: &RedfishConfig) -> Result<Self> {
        config.validate_all()?;
        let base_url = config.parse_base_url()?;

        Ok(Self {
            base_url,
            http_config: config.client_config(),
            tls_verify: config.tls_verify,
            tls_ca_cert: config.tls_ca_cert.clone(),
            user_agent: USER_AGENT.to_string(),
            observer: None,
        })
    }

    /// Override the HTTP client configuration.
    #[must_use]
    pub fn with_http_config(mut self, config: ClientConfig) -> Self {
        self.http_config = config;
        self
    }

    /// Set whether to verify TLS certificates.
    #[must_use]
    pub fn with_tls_verify(mut self, verify: bool) -> Self {
        self.tls_verify = verify;
        self
    }

    /// Trust an additional PEM encoded CA certificate.
    #[must_use]
    pub fn with_ca_cert(mut self, path: PathBuf) -> Self {
        self.tls_ca_cert = Some(path);
        self
    }

    /// Override the user agent.
    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Observe every raw response.
    #[must_use]
    pub fn with_response_observer<F>(mut self, observer: F) -> Self
    where
        F: Fn(&Response) + Send + Sync + 'static,
    {
        self.observer = Some(Arc::new(observer));
        self
    }

    /// Build the connector.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the CA certificate cannot be loaded or the
    /// HTTP client cannot be constructed.
    pub fn build(self) -> Result<Connector> {
        let mut builder = ClientBuilder::new()
            .user_agent(self.user_agent.as_str())
            .timeout(self.http_config.timeout)
            .connect_timeout(self.http_config.connect_timeout);

        if !self.tls_verify {
            warn!(base_url = %self.base_url, "TLS verification disabled for Redfish connector");
            builder = builder.danger_accept_invalid_certs(true);
        }

        if let Some(ca_cert) = &self.tls_ca_cert {
            debug!("loading Redfish CA certificate from {}", ca_cert.display());
            let bytes = std::fs::read(ca_cert).map_err(|err| {
                Error::Config(format!(
                    "Failed to read CA certificate {}: {err}",
                    ca_cert.display()
                ))
            })?;
            let cert = reqwest::Certificate::from_pem(&bytes)
                .map_err(|err| Error::Config(format!("Invalid CA certificate: {err}")))?;
            builder = builder.add_root_certificate(cert);
        }

        let http = builder
            .build()
            .map_err(|err| Error::Config(format!("Failed to build HTTP client: {err}")))?;

        Ok(Connector {
            http,
            base_url: self.base_url,
            config: self.http_config,
            context: RequestContext::default(),
            authenticator: None,
            observer: self.observer,
        })
    }
}

/// Sequential request dispatcher for one Redfish service.
///
/// A connector owns the request context and, optionally, one bound
/// [`Authenticator`]. Every operation takes `&mut self`, so a single caller
/// drives it at a time.
pub struct Connector {
    http: Client,
    base_url: Url,
    config: ClientConfig,
    context: RequestContext,
    authenticator: Option<Box<dyn Authenticator>>,
    observer: Option<ResponseObserver>,
}

impl fmt::Debug for Connector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connector")
            .field("base_url", &self.base_url.as_str())
            .field("config", &self.config)
            .field("context", &self.context)
            .field("authenticated", &self.authenticator.is_some())
            .finish_non_exhaustive()
    }
}

impl Connector {
    /// Construct a connector directly from the base URL.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid or the HTTP client cannot be built.
    pub fn new(base_url: impl AsRef<str>) -> Result<Self> {
        ConnectorBuilder::new(base_url)?.build()
    }

    /// Start a builder for the base URL.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidUrl`] if the URL cannot be parsed.
    pub fn builder(base_url: impl AsRef<str>) -> Result<ConnectorBuilder> {
        ConnectorBuilder::new(base_url)
    }

    /// Connect to the service described by `config`.
    ///
    /// Fetches the service root and, when a username is configured, binds the
    /// authenticator selected by the configuration and authenticates.
    ///
    /// # Errors
    ///
    /// Returns any configuration, transport or authentication error.
    pub async fn connect(config: &RedfishConfig) -> Result<Self> {
        let mut connector = ConnectorBuilder::from_config(config)?.build()?;
        let root = ServiceRoot::fetch(&mut connector, &config.root_path).await?;
        info!(
            base_url = %connector.base_url,
            version = root.redfish_version().unwrap_or("unknown"),
            "Connected to Redfish service root"
        );

        if config.username.is_some() {
            let authenticator = authenticator_for(config)?;
            connector.bind(authenticator, root);
            connector.authenticate().await?;
        }

        Ok(connector)
    }

    /// Return the base URL.
    #[must_use]
    pub const fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Return the HTTP client configuration.
    #[must_use]
    pub const fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Options for a blocking call using the configured task timeout.
    #[must_use]
    pub fn blocking_options(&self) -> OpOptions {
        OpOptions::new().blocking(self.config.task_timeout)
    }

    /// Shared request context.
    #[must_use]
    pub const fn context(&self) -> &RequestContext {
        &self.context
    }

    /// Mutable request context, used by authenticators.
    pub fn context_mut(&mut self) -> &mut RequestContext {
        &mut self.context
    }

    /// Replace the response observer.
    pub fn set_response_observer(&mut self, observer: Option<ResponseObserver>) {
        self.observer = observer;
    }

    /// Bind `authenticator` to `root` and make it this connector's credential source.
    ///
    /// A previously bound authenticator is dropped without being closed.
    pub fn bind(&mut self, mut authenticator: Box<dyn Authenticator>, root: ServiceRoot) {
        authenticator.bind(root);
        if self.authenticator.replace(authenticator).is_some() {
            debug!("Replaced previously bound authenticator");
        }
    }

    /// Detach and return the bound authenticator.
    pub fn unbind(&mut self) -> Option<Box<dyn Authenticator>> {
        self.authenticator.take()
    }

    /// Whether an authenticator is bound.
    #[must_use]
    pub const fn is_bound(&self) -> bool {
        self.authenticator.is_some()
    }

    /// Whether the bound authenticator holds a refreshable session.
    #[must_use]
    pub fn can_refresh_session(&self) -> bool {
        self.authenticator
            .as_ref()
            .is_some_and(|authenticator| authenticator.can_refresh_session())
    }

    /// Run the bound authenticator's handshake.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if nothing is bound, or the handshake error.
    pub async fn authenticate(&mut self) -> Result<()> {
        let mut authenticator = self.authenticator.take().ok_or_else(|| {
            Error::Config("No authenticator bound to the connector".to_string())
        })?;
        let result = authenticator.authenticate(self).await;
        self.authenticator = Some(authenticator);
        result
    }

    /// Re-authenticate the bound authenticator.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if nothing is bound, or the refresh error.
    pub async fn refresh_session(&mut self) -> Result<()> {
        let mut authenticator = self.authenticator.take().ok_or_else(|| {
            Error::Config("No authenticator bound to the connector".to_string())
        })?;
        let result = authenticator.refresh(self).await;
        self.authenticator = Some(authenticator);
        result
    }

    /// Tear down the bound authenticator's remote state, if any.
    ///
    /// # Errors
    ///
    /// Returns errors the authenticator does not tolerate during teardown.
    pub async fn close(&mut self) -> Result<()> {
        let Some(mut authenticator) = self.authenticator.take() else {
            return Ok(());
        };
        let result = authenticator.close(self).await;
        self.authenticator = Some(authenticator);
        result
    }

    /// GET `path`.
    ///
    /// # Errors
    ///
    /// See [`Connector::op`].
    pub async fn get(&mut self, path: &str) -> Result<Response> {
        self.op(Method::GET, path, None, OpOptions::default()).await
    }

    /// POST `data` to `path`.
    ///
    /// # Errors
    ///
    /// See [`Connector::op`].
    pub async fn post(&mut self, path: &str, data: Option<&Value>) -> Result<Response> {
        self.op(Method::POST, path, data, OpOptions::default()).await
    }

    /// PATCH `path` with `data`.
    ///
    /// # Errors
    ///
    /// See [`Connector::op`].
    pub async fn patch(&mut self, path: &str, data: Option<&Value>) -> Result<Response> {
        self.op(Method::PATCH, path, data, OpOptions::default()).await
    }

    /// PUT `data` to `path`.
    ///
    /// # Errors
    ///
    /// See [`Connector::op`].
    pub async fn put(&mut self, path: &str, data: Option<&Value>) -> Result<Response> {
        self.op(Method::PUT, path, data, OpOptions::default()).await
    }

    /// DELETE `path`.
    ///
    /// # Errors
    ///
    /// See [`Connector::op`].
    pub async fn delete(&mut self, path: &str) -> Result<Response> {
        self.op(Method::DELETE, path, None, OpOptions::default()).await
    }

    /// Issue a request and return the final response.
    ///
    /// `path` is either an absolute URL or relative to the base URL. A JSON
    /// `data` body is sent with `Content-Type: application/json` unless the
    /// options already carry a content type.
    ///
    /// Failure handling, in order:
    /// 1. An access failure (401/403) with a refreshable session refreshes the
    ///    session once and repeats the request once.
    /// 2. A server-side failure (5xx) on GET sleeps for the retry delay and
    ///    repeats the request while the retry budget lasts.
    /// 3. With `blocking` set, a 202 response is handed to a [`TaskMonitor`]
    ///    and the monitor's final response is classified and returned.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Connection`] for transport failures, a missing
    /// `Location` on a blocking 202, or a task that does not finish in time;
    /// otherwise the classified HTTP error of the final response.
    pub fn op<'a>(
        &'a mut self,
        method: Method,
        path: &'a str,
        data: Option<&'a Value>,
        options: OpOptions,
    ) -> BoxFuture<'a, Result<Response>> {
        Box::pin(async move {
            let url = self.resolve_url(path)?;
            let headers = self.request_headers(options.headers, data.is_some())?;
            let body = data.map(serde_json::to_vec).transpose()?;

            debug!(
                method = %method,
                url = %url,
                headers = ?redact_headers(&self.logged_headers(&headers)),
                body = ?data.map(redact_body),
                blocking = options.blocking,
                timeout_secs = options.timeout.as_secs(),
                "HTTP request"
            );

            let mut retries_left = options
                .server_side_retries
                .unwrap_or(self.config.retry_policy.max_retries);
            let mut allow_reauthentication = true;

            let mut response = loop {
                let response = self.send(&method, &url, &headers, body.as_deref()).await?;
                let error = match classify_response(
                    method.as_str(),
                    url.as_str(),
                    response.status(),
                    response.body(),
                ) {
                    Ok(()) => break response,
                    Err(error) => error,
                };

                match error {
                    Error::Access(ref http) => {
                        if allow_reauthentication && self.can_refresh_session() {
                            allow_reauthentication = false;
                            debug!(%url, status = http.status, "Access failure, refreshing session");
                            if let Err(refresh_error) = self.refresh_session().await {
                                error!(
                                    error = %refresh_error,
                                    "A failure occurred while attempting to refresh the session"
                                );
                                return Err(refresh_error);
                            }
                            debug!("Authentication refreshed successfully, retrying the call");
                            continue;
                        }

                        if method == Method::GET && is_session_service(&url) {
                            debug!(
                                "HTTP GET of SessionService failed, this is expected prior to authentication: {http}"
                            );
                        } else {
                            error!("Authentication error detected. Cannot proceed: {http}");
                        }
                        return Err(error);
                    }
                    Error::ServerSide(ref http) if method == Method::GET && retries_left > 0 => {
                        warn!(
                            %url,
                            status = http.status,
                            retries_left,
                            delay_ms = self.config.retry_policy.delay.as_millis(),
                            "Server side error detected, retrying the call"
                        );
                        retries_left -= 1;
                        tokio::time::sleep(self.config.retry_policy.delay).await;
                    }
                    Error::ServerSide(ref http) => {
                        error!("Server side error: {http}");
                        return Err(error);
                    }
                    other => return Err(other),
                }
            };

            if options.blocking && response.status() == StatusCode::ACCEPTED {
                if !response.has_header(&LOCATION) {
                    return Err(Error::Connection {
                        url: url.to_string(),
                        message: format!(
                            "HTTP response for {method} request to {url} returned status 202, but no Location header"
                        ),
                    });
                }

                let mut monitor = TaskMonitor::from_response(response, path)?;
                monitor.wait(self, options.timeout).await?;
                response = monitor.into_response();
                classify_response(
                    method.as_str(),
                    url.as_str(),
                    response.status(),
                    response.body(),
                )?;
            }

            debug!(
                method = %method,
                url = %url,
                status = response.status().as_u16(),
                "HTTP response"
            );
            Ok(response)
        })
    }

    fn resolve_url(&self, path: &str) -> Result<Url> {
        match Url::parse(path) {
            Ok(url) => Ok(url),
            Err(url::ParseError::RelativeUrlWithoutBase) => Ok(self.base_url.join(path)?),
            Err(err) => Err(err.into()),
        }
    }

    fn request_headers(&self, mut headers: HeaderMap, has_body: bool) -> Result<HeaderMap> {
        if has_body && !headers.contains_key(CONTENT_TYPE) {
            headers.insert(CONTENT_TYPE, HeaderValue::from_static(JSON_CONTENT_TYPE));
        }

        if !headers.contains_key(PROTOCOL_VERSION_HEADER) {
            let version =
                HeaderValue::from_str(&self.config.protocol_version).map_err(|err| {
                    Error::Config(format!(
                        "Invalid protocol version `{}`: {err}",
                        self.config.protocol_version
                    ))
                })?;
            headers.insert(protocol_version_header(), version);
        }

        if self.config.connection_close && !headers.contains_key(CONNECTION) {
            headers.insert(CONNECTION, HeaderValue::from_static("close"));
        }

        Ok(headers)
    }

    fn logged_headers(&self, headers: &HeaderMap) -> HeaderMap {
        let mut merged = self.context.headers.clone();
        if self.context.has_basic_credentials() && !merged.contains_key(AUTHORIZATION) {
            merged.insert(AUTHORIZATION, HeaderValue::from_static("Basic"));
        }
        for (name, value) in headers {
            merged.insert(name.clone(), value.clone());
        }
        merged
    }

    async fn send(
        &self,
        method: &Method,
        url: &Url,
        headers: &HeaderMap,
        body: Option<&[u8]>,
    ) -> Result<Response> {
        let mut request = self
            .http
            .request(method.clone(), url.clone())
            .headers(self.context.headers.clone())
            .headers(headers.clone());

        if let Some(credentials) = &self.context.basic {
            if !headers.contains_key(AUTHORIZATION) {
                request = request.basic_auth(
                    &credentials.username,
                    Some(credentials.password.expose_secret()),
                );
            }
        }

        if let Some(body) = body {
            request = request.body(body.to_vec());
        }

        let response = request.send().await.map_err(|err| Error::Connection {
            url: url.to_string(),
            message: err.to_string(),
        })?;
        let response = Response::read(response).await?;

        if let Some(observer) = &self.observer {
            observer(&response);
        }

        Ok(response)
    }
}

fn is_session_service(url: &Url) -> bool {
    url.path().trim_end_matches('/').ends_with("SessionService")
}

fn is_sensitive_header(name: &HeaderName) -> bool {
    *name == AUTHORIZATION || name.as_str().eq_ignore_ascii_case(SESSION_TOKEN_HEADER)
}

/// Render headers for logging with credentials masked.
#[must_use]
pub fn redact_headers(headers: &HeaderMap) -> Vec<(String, String)> {
    headers
        .iter()
        .map(|(name, value)| {
            let shown = if is_sensitive_header(name) || value.is_sensitive() {
                REDACTED.to_string()
            } else {
                value.to_str().unwrap_or("<binary>").to_string()
            };
            (name.as_str().to_string(), shown)
        })
        .collect()
}

/// Copy a JSON body for logging with every `Password` member masked.
#[must_use]
pub fn redact_body(body: &Value) -> Value {
    match body {
        Value::Object(members) => Value::Object(
            members
                .iter()
                .map(|(key, value)| {
                    let value = if key == SENSITIVE_BODY_FIELD {
                        Value::String(REDACTED.to_string())
                    } else {
                        redact_body(value)
                    };
                    (key.clone(), value)
                })
                .collect::<Map<String, Value>>(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(redact_body).collect()),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::MockAuthenticator;
    use redfish_core::client::RetryPolicy;
    use redfish_core::HttpError;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_connector(server: &MockServer) -> Connector {
        ConnectorBuilder::new(server.uri())
            .unwrap()
            .with_http_config(
                ClientConfig::new()
                    .with_retry_policy(RetryPolicy::new().with_delay(Duration::from_millis(10))),
            )
            .build()
            .unwrap()
    }

    fn refreshable_authenticator() -> MockAuthenticator {
        let mut authenticator = MockAuthenticator::new();
        authenticator.expect_bind().return_const(());
        authenticator.expect_can_refresh_session().return_const(true);
        authenticator
    }

    #[tokio::test]
    async fn test_get_success_returns_response_without_retry() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/redfish/v1/"))
            .and(header("OData-Version", "4.0"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"Id": "RootService"})))
            .expect(1)
            .mount(&server)
            .await;

        let mut connector = test_connector(&server);
        let response = connector.get("/redfish/v1/").await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.json::<Value>().unwrap()["Id"], "RootService");
    }

    #[tokio::test]
    async fn test_post_sends_json_body_with_content_type() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/redfish/v1/Systems/1/Actions/ComputerSystem.Reset"))
            .and(header("Content-Type", "application/json"))
            .and(body_json(json!({"ResetType": "ForceRestart"})))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let mut connector = test_connector(&server);
        let response = connector
            .post(
                "/redfish/v1/Systems/1/Actions/ComputerSystem.Reset",
                Some(&json!({"ResetType": "ForceRestart"})),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn test_caller_headers_override_defaults_case_insensitively() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .and(path("/redfish/v1/Systems/1"))
            .and(header("content-type", "application/merge-patch+json"))
            .and(header("odata-version", "4.01"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let mut headers = HeaderMap::new();
        headers.insert(
            HeaderName::from_static("content-type"),
            HeaderValue::from_static("application/merge-patch+json"),
        );
        headers.insert(
            HeaderName::from_static("odata-version"),
            HeaderValue::from_static("4.01"),
        );

        let mut connector = test_connector(&server);
        let response = connector
            .op(
                Method::PATCH,
                "/redfish/v1/Systems/1",
                Some(&json!({"AssetTag": "rack-4"})),
                OpOptions::new().with_headers(headers),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_absolute_url_is_used_verbatim() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/redfish/v1/Chassis"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let mut connector = Connector::new("http://127.0.0.1:9").unwrap();
        let url = format!("{}/redfish/v1/Chassis", server.uri());
        let response = connector.get(&url).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_get_server_error_retries_until_budget_exhausted() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/redfish/v1/Systems"))
            .respond_with(ResponseTemplate::new(503))
            .expect(3)
            .mount(&server)
            .await;

        let mut connector = test_connector(&server);
        let err = connector
            .op(
                Method::GET,
                "/redfish/v1/Systems",
                None,
                OpOptions::new().with_server_side_retries(2),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, Error::ServerSide(_)));
        assert_eq!(err.status(), Some(503));
    }

    #[tokio::test]
    async fn test_get_server_error_uses_default_budget_of_five() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/redfish/v1/Systems"))
            .respond_with(ResponseTemplate::new(500))
            .expect(6)
            .mount(&server)
            .await;

        let mut connector = test_connector(&server);
        let err = connector.get("/redfish/v1/Systems").await.unwrap_err();
        assert!(err.is_server_side());
    }

    #[tokio::test]
    async fn test_get_server_error_recovers_after_retry() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/redfish/v1/Systems"))
            .respond_with(ResponseTemplate::new(500))
            .up_to_n_times(2)
            .expect(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/redfish/v1/Systems"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let mut connector = test_connector(&server);
        let response = connector.get("/redfish/v1/Systems").await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_non_get_server_error_is_not_retried() {
        let server = MockServer::start().await;
        for verb in ["POST", "PATCH", "PUT", "DELETE"] {
            Mock::given(method(verb))
                .and(path("/redfish/v1/Systems/1"))
                .respond_with(ResponseTemplate::new(500))
                .expect(1)
                .mount(&server)
                .await;
        }

        let mut connector = test_connector(&server);
        let body = json!({});
        assert!(connector
            .post("/redfish/v1/Systems/1", Some(&body))
            .await
            .unwrap_err()
            .is_server_side());
        assert!(connector
            .patch("/redfish/v1/Systems/1", Some(&body))
            .await
            .unwrap_err()
            .is_server_side());
        assert!(connector
            .put("/redfish/v1/Systems/1", Some(&body))
            .await
            .unwrap_err()
            .is_server_side());
        assert!(connector
            .delete("/redfish/v1/Systems/1")
            .await
            .unwrap_err()
            .is_server_side());
    }

    #[tokio::test]
    async fn test_access_error_refreshes_once_and_retries() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/redfish/v1/Systems"))
            .and(header("X-Auth-Token", "fresh-token"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/redfish/v1/Systems"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;

        let mut authenticator = refreshable_authenticator();
        authenticator
            .expect_refresh()
            .times(1)
            .returning(|connector| connector.context_mut().set_session_token("fresh-token"));

        let mut connector = test_connector(&server);
        connector.context_mut().set_session_token("expired-token").unwrap();
        connector.bind(Box::new(authenticator), ServiceRoot::new("/redfish/v1/"));

        let response = connector.get("/redfish/v1/Systems").await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_second_access_failure_propagates_without_another_refresh() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/redfish/v1/Systems"))
            .respond_with(ResponseTemplate::new(403))
            .expect(2)
            .mount(&server)
            .await;

        let mut authenticator = refreshable_authenticator();
        authenticator.expect_refresh().times(1).returning(|_| Ok(()));

        let mut connector = test_connector(&server);
        connector.bind(Box::new(authenticator), ServiceRoot::new("/redfish/v1/"));

        let err = connector.get("/redfish/v1/Systems").await.unwrap_err();
        assert!(err.is_access());
        assert_eq!(err.status(), Some(403));
    }

    #[tokio::test]
    async fn test_refresh_failure_abandons_original_request() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/redfish/v1/Systems"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;

        let mut authenticator = refreshable_authenticator();
        authenticator.expect_refresh().times(1).returning(|_| {
            Err(Error::Access(HttpError::from_response(
                "POST",
                "/redfish/v1/SessionService/Sessions",
                StatusCode::UNAUTHORIZED,
                b"",
            )))
        });

        let mut connector = test_connector(&server);
        connector.bind(Box::new(authenticator), ServiceRoot::new("/redfish/v1/"));

        let err = connector.get("/redfish/v1/Systems").await.unwrap_err();
        let http = err.http_error().unwrap();
        assert_eq!(http.method, "POST");
        assert!(connector.is_bound());
    }

    #[tokio::test]
    async fn test_access_error_without_refreshable_session_propagates() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/redfish/v1/Systems"))
            .respond_with(ResponseTemplate::new(401))
            .expect(2)
            .mount(&server)
            .await;

        let mut connector = test_connector(&server);
        assert!(connector.get("/redfish/v1/Systems").await.unwrap_err().is_access());

        let mut authenticator = MockAuthenticator::new();
        authenticator.expect_bind().return_const(());
        authenticator.expect_can_refresh_session().return_const(false);
        authenticator.expect_refresh().never();
        connector.bind(Box::new(authenticator), ServiceRoot::new("/redfish/v1/"));

        assert!(connector.get("/redfish/v1/Systems").await.unwrap_err().is_access());
    }

    #[tokio::test]
    async fn test_transport_failure_is_connection_error() {
        let uri = "http://127.0.0.1:1";
        let mut connector = Connector::new(uri).unwrap();
        let err = connector.get("/redfish/v1/").await.unwrap_err();
        match err {
            Error::Connection { url, .. } => assert!(url.starts_with(uri)),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_observer_sees_every_response() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/redfish/v1/Systems"))
            .respond_with(ResponseTemplate::new(502))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/redfish/v1/Systems"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let seen = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&seen);
        let mut connector = ConnectorBuilder::new(server.uri())
            .unwrap()
            .with_http_config(
                ClientConfig::new()
                    .with_retry_policy(RetryPolicy::new().with_delay(Duration::from_millis(1))),
            )
            .with_response_observer(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .build()
            .unwrap();

        connector.get("/redfish/v1/Systems").await.unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_blocking_accepted_without_location_is_connection_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/redfish/v1/UpdateService/Actions/UpdateService.SimpleUpdate"))
            .respond_with(ResponseTemplate::new(202))
            .expect(1)
            .mount(&server)
            .await;

        let mut connector = test_connector(&server);
        let err = connector
            .op(
                Method::POST,
                "/redfish/v1/UpdateService/Actions/UpdateService.SimpleUpdate",
                Some(&json!({"ImageURI": "http://images/bios.bin"})),
                OpOptions::new().blocking(Duration::from_secs(5)),
            )
            .await
            .unwrap_err();

        match err {
            Error::Connection { message, .. } => {
                assert!(message.contains("202"));
                assert!(message.contains("Location"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_non_blocking_accepted_is_returned_as_is() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/redfish/v1/Managers/1/Actions/Manager.Reset"))
            .respond_with(ResponseTemplate::new(202).insert_header("Location", "/taskmon/3"))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/taskmon/3"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let mut connector = test_connector(&server);
        let response = connector
            .post("/redfish/v1/Managers/1/Actions/Manager.Reset", None)
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        assert_eq!(response.header(LOCATION), Some("/taskmon/3"));
    }

    #[tokio::test]
    async fn test_blocking_failure_of_task_is_classified() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/redfish/v1/Systems/1/Actions/ComputerSystem.Reset"))
            .respond_with(
                ResponseTemplate::new(202)
                    .insert_header("Location", "/taskmon/9")
                    .insert_header("Retry-After", "0"),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/taskmon/9"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": {"code": "Base.1.8.ActionParameterUnknown", "message": "bad reset type"}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let mut connector = test_connector(&server);
        let err = connector
            .op(
                Method::POST,
                "/redfish/v1/Systems/1/Actions/ComputerSystem.Reset",
                Some(&json!({"ResetType": "Bogus"})),
                OpOptions::new().blocking(Duration::from_secs(5)),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, Error::BadRequest(_)));
        assert_eq!(
            err.http_error().unwrap().code,
            "Base.1.8.ActionParameterUnknown"
        );
    }

    #[tokio::test]
    async fn test_blocking_with_unrepresentable_timeout_completes() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/redfish/v1/Systems/1/Actions/ComputerSystem.Reset"))
            .respond_with(
                ResponseTemplate::new(202)
                    .insert_header("Location", "/taskmon/1")
                    .insert_header("Retry-After", "0"),
            )
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/taskmon/1"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let mut connector = test_connector(&server);
        let response = connector
            .op(
                Method::POST,
                "/redfish/v1/Systems/1/Actions/ComputerSystem.Reset",
                Some(&json!({"ResetType": "GracefulRestart"})),
                OpOptions::new().blocking(Duration::MAX),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn test_close_without_authenticator_is_noop() {
        let mut connector = Connector::new("http://127.0.0.1:9").unwrap();
        assert!(connector.close().await.is_ok());
        assert!(matches!(
            connector.authenticate().await,
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_request_context_session_token() {
        let mut context = RequestContext::default();
        assert_eq!(context.session_token(), None);

        context.set_session_token("abc123").unwrap();
        assert_eq!(context.session_token(), Some("abc123"));
        assert!(context.headers().get("X-Auth-Token").unwrap().is_sensitive());

        context.clear_session_token();
        assert_eq!(context.session_token(), None);
    }

    #[test]
    fn test_request_context_clear_credentials() {
        let mut context = RequestContext::default();
        context.set_session_token("abc123").unwrap();
        context.set_header(AUTHORIZATION, HeaderValue::from_static("Bearer stale"));
        context.set_basic_credentials("admin", SecretString::from("secret".to_string()));
        assert!(context.has_basic_credentials());

        context.clear_credentials();
        assert_eq!(context.session_token(), None);
        assert!(context.headers().get(AUTHORIZATION).is_none());
        assert!(!context.has_basic_credentials());
    }

    #[test]
    fn test_request_context_debug_hides_password() {
        let mut context = RequestContext::default();
        context.set_basic_credentials("admin", SecretString::from("hunter2".to_string()));
        let rendered = format!("{context:?}");
        assert!(rendered.contains("admin"));
        assert!(!rendered.contains("hunter2"));
    }

    #[test]
    fn test_redact_headers_masks_credentials() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic YWRtaW46c2VjcmV0"));
        headers.insert(session_token_header(), HeaderValue::from_static("token"));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let redacted = redact_headers(&headers);
        for (name, value) in &redacted {
            match name.as_str() {
                "authorization" | "x-auth-token" => assert_eq!(value, REDACTED),
                "content-type" => assert_eq!(value, "application/json"),
                other => panic!("unexpected header {other}"),
            }
        }
        assert_eq!(redacted.len(), 3);
    }

    #[test]
    fn test_redact_body_masks_nested_passwords() {
        let body = json!({
            "UserName": "admin",
            "Password": "secret",
            "Accounts": [{"UserName": "op", "Password": "other"}],
            "Oem": {"Vendor": {"Password": "deep"}}
        });

        let redacted = redact_body(&body);
        assert_eq!(redacted["UserName"], "admin");
        assert_eq!(redacted["Password"], REDACTED);
        assert_eq!(redacted["Accounts"][0]["Password"], REDACTED);
        assert_eq!(redacted["Accounts"][0]["UserName"], "op");
        assert_eq!(redacted["Oem"]["Vendor"]["Password"], REDACTED);
        assert_eq!(body["Password"], "secret");
    }

    #[test]
    fn test_session_service_detection() {
        let url = Url::parse("https://bmc/redfish/v1/SessionService").unwrap();
        assert!(is_session_service(&url));
        let url = Url::parse("https://bmc/redfish/v1/SessionService/").unwrap();
        assert!(is_session_service(&url));
        let url = Url::parse("https://bmc/redfish/v1/SessionService/Sessions").unwrap();
        assert!(!is_session_service(&url));
    }
}
