//! Long-running operation tracking.
//!
//! A service answers some requests with `202 Accepted` and a `Location`
//! header naming a task monitor. [`TaskMonitor`] polls that URI until the
//! operation leaves the accepted state, honouring `Retry-After` between polls.

use crate::connector::Connector;
use crate::models::Task;
use crate::response::Response;
use crate::Result;
use chrono::{DateTime, NaiveDateTime, Utc};
use redfish_core::client::DEFAULT_RETRY_AFTER;
use redfish_core::Error;
use reqwest::header::{ALLOW, LOCATION, RETRY_AFTER};
use reqwest::{Method, StatusCode};
use serde_json::Value;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

const RFC850_DATE_FORMAT: &str = "%A, %d-%b-%y %H:%M:%S GMT";
const ASCTIME_DATE_FORMAT: &str = "%a %b %e %H:%M:%S %Y";

/// Poller for one long-running operation.
#[derive(Debug, Clone)]
pub struct TaskMonitor {
    uri: String,
    response: Response,
    task: Option<Task>,
}

impl TaskMonitor {
    /// Build a monitor from a response already in hand, usually a 202.
    ///
    /// The monitor URI is the `Location` header resolved against the
    /// response URL. If the body carries `@odata.id`, that identifier is
    /// resolved against the `Location` URL instead.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingHeader`] naming `target_uri` if the response
    /// has no usable `Location` header.
    pub fn from_response(response: Response, target_uri: &str) -> Result<Self> {
        let location = response
            .header(LOCATION)
            .ok_or_else(|| Error::MissingHeader {
                target_uri: target_uri.to_string(),
                header: LOCATION.as_str().to_string(),
            })?;
        let mut uri = response.url().join(location)?;

        if let Some(odata_id) = body_odata_id(&response) {
            uri = uri.join(&odata_id)?;
        }

        let task = parse_task(&response);
        Ok(Self {
            uri: uri.to_string(),
            response,
            task,
        })
    }

    /// Build a monitor by fetching `uri`.
    ///
    /// # Errors
    ///
    /// Returns any error from the initial GET.
    pub async fn from_uri(connector: &mut Connector, uri: &str) -> Result<Self> {
        let response = connector.get(uri).await?;
        let task = parse_task(&response);
        Ok(Self {
            uri: uri.to_string(),
            response,
            task,
        })
    }

    /// Monitor URI.
    #[must_use]
    pub fn task_monitor_uri(&self) -> &str {
        &self.uri
    }

    /// Last response observed.
    #[must_use]
    pub const fn response(&self) -> &Response {
        &self.response
    }

    /// Task reported by the last 202 response, if any.
    #[must_use]
    pub const fn task(&self) -> Option<&Task> {
        self.task.as_ref()
    }

    /// Consume the monitor and return the last response.
    #[must_use]
    pub fn into_response(self) -> Response {
        self.response
    }

    /// Poll the monitor URI once.
    ///
    /// # Errors
    ///
    /// Returns any error from the GET.
    pub async fn refresh(&mut self, connector: &mut Connector) -> Result<()> {
        let response = connector.get(&self.uri).await?;
        self.task = parse_task(&response);
        self.response = response;
        Ok(())
    }

    /// Whether the last response says the operation is still running.
    #[must_use]
    pub fn is_processing(&self) -> bool {
        self.response.status() == StatusCode::ACCEPTED
    }

    /// Poll if still processing, then report whether it still is.
    ///
    /// # Errors
    ///
    /// Returns any error from [`TaskMonitor::refresh`].
    pub async fn check_is_processing(&mut self, connector: &mut Connector) -> Result<bool> {
        if !self.is_processing() {
            return Ok(false);
        }
        self.refresh(connector).await?;
        Ok(self.is_processing())
    }

    /// Delay requested by the service before the next poll.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedHeader`] if `Retry-After` is neither a
    /// number of seconds nor an HTTP date.
    pub fn sleep_for(&self) -> Result<Duration> {
        match self.response.header(RETRY_AFTER) {
            None => Ok(Duration::from_secs(DEFAULT_RETRY_AFTER)),
            Some(value) => parse_retry_after(value, Utc::now()),
        }
    }

    /// Whether the service allows the operation to be cancelled with DELETE.
    #[must_use]
    pub fn cancellable(&self) -> bool {
        self.response.header(ALLOW).is_some_and(|allow| {
            allow
                .split(',')
                .any(|method| method.trim().eq_ignore_ascii_case(Method::DELETE.as_str()))
        })
    }

    /// Poll until the operation finishes or `timeout` elapses.
    ///
    /// Timing out does not cancel the remote operation. A timeout too large
    /// to represent as a deadline waits without limit.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Connection`] naming the monitor URI on timeout, or
    /// any polling error.
    pub async fn wait(&mut self, connector: &mut Connector, timeout: Duration) -> Result<()> {
        let deadline = Instant::now().checked_add(timeout);
        info!(uri = %self.uri, timeout_secs = timeout.as_secs(), "Waiting for task monitor");

        while self.check_is_processing(connector).await? {
            let delay = self.sleep_for()?;
            debug!(
                uri = %self.uri,
                delay_secs = delay.as_secs(),
                percent_complete = ?self.task.as_ref().and_then(|task| task.percent_complete),
                "Task still processing"
            );
            tokio::time::sleep(delay).await;

            let expired = deadline.is_some_and(|deadline| Instant::now() >= deadline);
            if expired && self.check_is_processing(connector).await? {
                return Err(Error::Connection {
                    url: self.uri.clone(),
                    message: format!(
                        "Timeout waiting for task monitor {} (timeout = {})",
                        self.uri,
                        timeout.as_secs()
                    ),
                });
            }
        }

        debug!(uri = %self.uri, status = self.response.status().as_u16(), "Task monitor finished");
        Ok(())
    }
}

fn body_odata_id(response: &Response) -> Option<String> {
    if !response.has_content() {
        return None;
    }
    let document: Value = serde_json::from_slice(response.body()).ok()?;
    document
        .get("@odata.id")
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn parse_task(response: &Response) -> Option<Task> {
    if response.status() != StatusCode::ACCEPTED || !response.has_content() {
        return None;
    }
    match response.json() {
        Ok(task) => Some(task),
        Err(err) => {
            warn!(url = %response.url(), error = %err, "Ignoring unreadable task status");
            None
        }
    }
}

fn parse_retry_after(value: &str, now: DateTime<Utc>) -> Result<Duration> {
    let value = value.trim();
    if let Ok(seconds) = value.parse::<u64>() {
        return Ok(Duration::from_secs(seconds));
    }

    let target = parse_http_date(value).ok_or_else(|| Error::MalformedHeader {
        header: RETRY_AFTER.as_str().to_string(),
        value: value.to_string(),
        reason: "expected delay seconds or an HTTP date".to_string(),
    })?;

    let remaining = (target - now).num_seconds();
    Ok(Duration::from_secs(u64::try_from(remaining).unwrap_or(0)))
}

fn parse_http_date(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(date) = DateTime::parse_from_rfc2822(value) {
        return Some(date.with_timezone(&Utc));
    }

    [RFC850_DATE_FORMAT, ASCTIME_DATE_FORMAT]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
        .map(|naive| naive.and_utc())
}
