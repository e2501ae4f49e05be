//! Redfish resource models used by the connector.

use crate::connector::Connector;
use crate::Result;
use redfish_core::types::ExtendedInfo;
use redfish_core::Error;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

/// Location of the service root and the session endpoints it advertises.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceRoot {
    path: String,
    redfish_version: Option<String>,
    session_service_path: Option<String>,
    sessions_path: Option<String>,
}

impl ServiceRoot {
    /// A service root at `path` with nothing discovered yet.
    #[must_use]
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            redfish_version: None,
            session_service_path: None,
            sessions_path: None,
        }
    }

    /// Use a known sessions collection path.
    #[must_use]
    pub fn with_sessions_path(mut self, path: impl Into<String>) -> Self {
        self.sessions_path = Some(path.into());
        self
    }

    /// Use a known session service path.
    #[must_use]
    pub fn with_session_service_path(mut self, path: impl Into<String>) -> Self {
        self.session_service_path = Some(path.into());
        self
    }

    /// GET the service root at `path` and record the links it advertises.
    ///
    /// The service root is readable without credentials.
    ///
    /// # Errors
    ///
    /// Returns transport or HTTP errors, or [`Error::Parse`] if the document
    /// is not JSON.
    pub async fn fetch(connector: &mut Connector, path: &str) -> Result<Self> {
        let response = connector.get(path).await?;
        let document: Value = response.json()?;

        let root = Self {
            path: path.to_string(),
            redfish_version: document
                .get("RedfishVersion")
                .and_then(Value::as_str)
                .map(str::to_string),
            session_service_path: odata_id(&document, &["SessionService"]),
            sessions_path: odata_id(&document, &["Links", "Sessions"]),
        };
        debug!(?root, "Fetched service root");
        Ok(root)
    }

    /// Service root path.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Advertised Redfish version.
    #[must_use]
    pub fn redfish_version(&self) -> Option<&str> {
        self.redfish_version.as_deref()
    }

    /// Session service path, if advertised.
    #[must_use]
    pub fn session_service_path(&self) -> Option<&str> {
        self.session_service_path.as_deref()
    }

    /// Sessions collection path, if advertised.
    #[must_use]
    pub fn sessions_path(&self) -> Option<&str> {
        self.sessions_path.as_deref()
    }

    /// Resolve the sessions collection path.
    ///
    /// Uses the advertised `Links/Sessions` when present. Otherwise reads
    /// `Sessions` from the session service, which defaults to
    /// `{root}SessionService`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingAttribute`] if the session service does not
    /// link its sessions collection, or any error from reading it.
    pub async fn sessions_collection_path(&self, connector: &mut Connector) -> Result<String> {
        if let Some(path) = &self.sessions_path {
            return Ok(path.clone());
        }

        let service_path = self.session_service_path.clone().unwrap_or_else(|| {
            format!("{}/SessionService", self.path.trim_end_matches('/'))
        });
        let response = connector.get(&service_path).await?;
        let document: Value = response.json()?;

        odata_id(&document, &["Sessions"]).ok_or_else(|| Error::MissingAttribute {
            resource: service_path,
            attribute: "Sessions".to_string(),
        })
    }
}

fn odata_id(document: &Value, members: &[&str]) -> Option<String> {
    members
        .iter()
        .try_fold(document, |value, member| value.get(member))?
        .get("@odata.id")
        .and_then(Value::as_str)
        .map(str::to_string)
}

/// A Redfish Task resource as reported by a task monitor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Task {
    /// Resource URI
    #[serde(rename = "@odata.id", default, skip_serializing_if = "Option::is_none")]
    pub odata_id: Option<String>,

    /// Task identifier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Display name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Lifecycle state, e.g. `Running` or `Completed`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_state: Option<String>,

    /// Health of the task, e.g. `OK` or `Warning`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_status: Option<String>,

    /// Completion percentage, rounded and clamped to 0..=100
    #[serde(
        default,
        deserialize_with = "deserialize_percent",
        skip_serializing_if = "Option::is_none"
    )]
    pub percent_complete: Option<u32>,

    /// Start timestamp
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<String>,

    /// End timestamp
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<String>,

    /// Messages reported by the task
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub messages: Vec<ExtendedInfo>,

    /// Task monitor URI advertised by the task
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_monitor: Option<String>,

    /// Remaining members
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn deserialize_percent<'de, D>(deserializer: D) -> std::result::Result<Option<u32>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(value
        .as_f64()
        .filter(|percent| percent.is_finite())
        .map(|percent| percent.clamp(0.0, 100.0).round() as u32))
}
