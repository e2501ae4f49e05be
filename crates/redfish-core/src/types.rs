//! Wire models for Redfish error bodies.
//!
//! A failing Redfish request answers with a body shaped like
//! `{"error": {"code": ..., "message": ..., "@Message.ExtendedInfo": [...]}}`.
//! The models here are deliberately lenient: every member is optional and
//! unknown members are kept, because controllers disagree on the details.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Severity that outranks every other extended-info entry.
pub const SEVERITY_CRITICAL: &str = "Critical";

/// Severity preferred when no critical entry exists.
pub const SEVERITY_WARNING: &str = "Warning";

/// Top-level error document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// The `error` member
    #[serde(default)]
    pub error: ErrorPayload,
}

/// Contents of the `error` member.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ErrorPayload {
    /// Machine error code, e.g. `Base.1.8.GeneralError`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,

    /// Top-level human readable message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Detailed messages
    #[serde(
        rename = "@Message.ExtendedInfo",
        default,
        deserialize_with = "deserialize_extended_info",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub extended_info: Vec<ExtendedInfo>,
}

/// One entry of `@Message.ExtendedInfo` (a Redfish `Message` object).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ExtendedInfo {
    /// Registry-qualified message identifier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,

    /// Human readable message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// `OK`, `Warning` or `Critical`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<String>,

    /// Suggested resolution
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution: Option<String>,

    /// Substitution arguments for the registry message
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub message_args: Vec<Value>,

    /// Members not modelled above
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ExtendedInfo {
    /// Parse extended info from a JSON value.
    ///
    /// Accepts a list of message objects or a single message object; entries
    /// that are not objects are skipped.
    #[must_use]
    pub fn list_from_value(value: &Value) -> Vec<Self> {
        match value {
            Value::Array(items) => items
                .iter()
                .filter_map(|item| serde_json::from_value(item.clone()).ok())
                .collect(),
            Value::Object(_) => serde_json::from_value(value.clone())
                .map(|info| vec![info])
                .unwrap_or_default(),
            _ => Vec::new(),
        }
    }
}

fn deserialize_extended_info<'de, D>(deserializer: D) -> Result<Vec<ExtendedInfo>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(ExtendedInfo::list_from_value(&value))
}

/// Select the message of the most severe extended-info entry.
///
/// `Critical` wins over `Warning`; without either the first entry's message
/// is used. Returns `None` when no entry carries a message.
#[must_use]
pub fn most_severe_message(extended_info: &[ExtendedInfo]) -> Option<&str> {
    for severity in [SEVERITY_CRITICAL, SEVERITY_WARNING] {
        if let Some(info) = extended_info
            .iter()
            .find(|info| info.severity.as_deref() == Some(severity))
        {
            return info.message.as_deref();
        }
    }

    extended_info.first().and_then(|info| info.message.as_deref())
}
