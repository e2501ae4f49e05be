//! Authentication mechanisms.
//!
//! An [`Authenticator`] is bound to a [`Connector`] and writes credentials
//! into the connector's request context. Three mechanisms are provided:
//!
//! - [`BasicAuth`] sends HTTP basic credentials with every request
//! - [`SessionAuth`] creates a session and presents its token
//! - [`SessionOrBasicAuth`] tries a session first and falls back to basic

use crate::connector::Connector;
use crate::models::ServiceRoot;
use crate::Result;
use async_trait::async_trait;
use redfish_core::client::SESSION_TOKEN_HEADER;
use redfish_core::config::{AuthMethod, RedfishConfig};
use redfish_core::Error;
use reqwest::header::{AUTHORIZATION, LOCATION};
use secrecy::{ExposeSecret, SecretString};
use serde_json::json;
use tracing::{debug, info, warn};

/// Credential source for a [`Connector`].
///
/// Implementations are driven by the connector: it binds them to a service
/// root, calls [`Authenticator::authenticate`] once, and calls
/// [`Authenticator::refresh`] when a request fails with an access error and
/// [`Authenticator::can_refresh_session`] is true.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Record the service root used to locate session endpoints.
    fn bind(&mut self, root: ServiceRoot);

    /// Establish credentials on `connector`.
    async fn authenticate(&mut self, connector: &mut Connector) -> Result<()>;

    /// Re-establish expired credentials.
    async fn refresh(&mut self, connector: &mut Connector) -> Result<()>;

    /// Whether a session exists that [`Authenticator::refresh`] can renew.
    fn can_refresh_session(&self) -> bool;

    /// Release any remote state and clear local credentials.
    async fn close(&mut self, connector: &mut Connector) -> Result<()>;
}

/// HTTP basic authentication.
#[derive(Debug)]
pub struct BasicAuth {
    username: String,
    password: SecretString,
}

impl BasicAuth {
    /// Create a basic authenticator.
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: SecretString::from(password.into()),
        }
    }

    /// Username presented to the service.
    #[must_use]
    pub fn username(&self) -> &str {
        &self.username
    }
}

#[async_trait]
impl Authenticator for BasicAuth {
    fn bind(&mut self, _root: ServiceRoot) {}

    async fn authenticate(&mut self, connector: &mut Connector) -> Result<()> {
        debug!(username = %self.username, "Using basic authentication");
        let password = SecretString::from(self.password.expose_secret().to_string());
        connector
            .context_mut()
            .set_basic_credentials(self.username.clone(), password);
        Ok(())
    }

    async fn refresh(&mut self, _connector: &mut Connector) -> Result<()> {
        Ok(())
    }

    fn can_refresh_session(&self) -> bool {
        false
    }

    async fn close(&mut self, _connector: &mut Connector) -> Result<()> {
        Ok(())
    }
}

/// Session based authentication.
///
/// Posts the account credentials to the sessions collection and presents the
/// returned token on every following request. The session resource named by
/// `Location` is deleted on close.
#[derive(Debug)]
pub struct SessionAuth {
    username: String,
    password: SecretString,
    root: Option<ServiceRoot>,
    session_key: Option<SecretString>,
    session_resource_id: Option<String>,
}

impl SessionAuth {
    /// Create a session authenticator.
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: SecretString::from(password.into()),
            root: None,
            session_key: None,
            session_resource_id: None,
        }
    }

    /// URI of the session resource, once established.
    #[must_use]
    pub fn session_resource_id(&self) -> Option<&str> {
        self.session_resource_id.as_deref()
    }

    /// Whether a session token is held.
    #[must_use]
    pub const fn has_session(&self) -> bool {
        self.session_key.is_some()
    }

    /// Forget the session locally and strip its credentials from `connector`.
    pub fn reset(&mut self, connector: &mut Connector) {
        self.session_key = None;
        self.session_resource_id = None;
        let context = connector.context_mut();
        context.clear_session_token();
        context.remove_header(AUTHORIZATION);
    }
}

#[async_trait]
impl Authenticator for SessionAuth {
    fn bind(&mut self, root: ServiceRoot) {
        self.root = Some(root);
    }

    async fn authenticate(&mut self, connector: &mut Connector) -> Result<()> {
        let root = self.root.clone().ok_or_else(|| {
            Error::Config("Session authenticator is not bound to a service root".to_string())
        })?;
        let sessions_path = root.sessions_collection_path(connector).await?;

        let credentials = json!({
            "UserName": self.username,
            "Password": self.password.expose_secret(),
        });
        let response = connector.post(&sessions_path, Some(&credentials)).await?;

        let token = response
            .header(SESSION_TOKEN_HEADER)
            .ok_or_else(|| Error::MissingSessionToken {
                method: "POST".to_string(),
                url: response.url().to_string(),
            })?
            .to_string();

        match response.header(LOCATION) {
            Some(location) => self.session_resource_id = Some(location.to_string()),
            None => warn!(
                url = %response.url(),
                "Session created without a Location header; the session cannot be refreshed or deleted"
            ),
        }

        connector.context_mut().set_session_token(&token)?;
        self.session_key = Some(SecretString::from(token));
        info!(
            username = %self.username,
            session = self.session_resource_id.as_deref().unwrap_or("unknown"),
            "Session established"
        );
        Ok(())
    }

    async fn refresh(&mut self, connector: &mut Connector) -> Result<()> {
        debug!(username = %self.username, "Refreshing session");
        self.reset(connector);
        self.authenticate(connector).await
    }

    fn can_refresh_session(&self) -> bool {
        self.session_key.is_some() && self.session_resource_id.is_some()
    }

    async fn close(&mut self, connector: &mut Connector) -> Result<()> {
        if let Some(resource_id) = self.session_resource_id.clone() {
            match connector.delete(&resource_id).await {
                Ok(_) => info!(session = %resource_id, "Session closed"),
                Err(err) if err.is_access() || err.is_server_side() => {
                    warn!(session = %resource_id, error = %err, "Failed to delete session");
                }
                Err(err) => {
                    self.reset(connector);
                    return Err(err);
                }
            }
        }

        self.reset(connector);
        Ok(())
    }
}

/// Session authentication with a basic authentication fallback.
#[derive(Debug)]
pub struct SessionOrBasicAuth {
    session: SessionAuth,
    basic: BasicAuth,
    using_basic: bool,
}

impl SessionOrBasicAuth {
    /// Create a fallback authenticator for one account.
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        let username = username.into();
        let password = password.into();
        Self {
            session: SessionAuth::new(username.clone(), password.clone()),
            basic: BasicAuth::new(username, password),
            using_basic: false,
        }
    }

    /// Whether authentication fell back to basic credentials.
    #[must_use]
    pub const fn is_using_basic(&self) -> bool {
        self.using_basic
    }
}

#[async_trait]
impl Authenticator for SessionOrBasicAuth {
    fn bind(&mut self, root: ServiceRoot) {
        self.basic.bind(root.clone());
        self.session.bind(root);
    }

    async fn authenticate(&mut self, connector: &mut Connector) -> Result<()> {
        match self.session.authenticate(connector).await {
            Ok(()) => {
                self.using_basic = false;
                Ok(())
            }
            Err(err) => {
                warn!(error = %err, "Session authentication failed, falling back to basic authentication");
                self.session.reset(connector);
                self.using_basic = true;
                self.basic.authenticate(connector).await
            }
        }
    }

    async fn refresh(&mut self, connector: &mut Connector) -> Result<()> {
        if self.session.can_refresh_session() {
            self.session.refresh(connector).await
        } else {
            Ok(())
        }
    }

    fn can_refresh_session(&self) -> bool {
        self.session.can_refresh_session()
    }

    async fn close(&mut self, connector: &mut Connector) -> Result<()> {
        if self.using_basic {
            self.basic.close(connector).await
        } else {
            self.session.close(connector).await
        }
    }
}

/// Select the authenticator described by `config`.
///
/// # Errors
///
/// Returns [`Error::Config`] if the username or password is missing.
pub fn authenticator_for(config: &RedfishConfig) -> Result<Box<dyn Authenticator>> {
    let username = config
        .username
        .clone()
        .ok_or_else(|| Error::Config("A username is required for authentication".to_string()))?;
    let password = config
        .password
        .clone()
        .ok_or_else(|| Error::Config("A password is required for authentication".to_string()))?;

    let authenticator: Box<dyn Authenticator> = match config.auth_method {
        AuthMethod::Basic => Box::new(BasicAuth::new(username, password)),
        AuthMethod::Session => Box::new(SessionAuth::new(username, password)),
        AuthMethod::Auto => Box::new(SessionOrBasicAuth::new(username, password)),
    };
    Ok(authenticator)
}
