//! Request dispatch for Redfish services.
//!
//! This crate provides the [`Connector`] that issues requests against a
//! Redfish service, the [`Authenticator`] implementations that supply its
//! credentials, and the [`TaskMonitor`] that follows long-running operations.

#![deny(missing_docs)]

pub mod auth;
pub mod connector;
pub mod models;
pub mod response;
pub mod task_monitor;

pub use auth::{authenticator_for, Authenticator, BasicAuth, SessionAuth, SessionOrBasicAuth};
pub use connector::{Connector, ConnectorBuilder, OpOptions, RequestContext, ResponseObserver};
pub use models::{ServiceRoot, Task};
pub use response::Response;
pub use task_monitor::TaskMonitor;

/// Convenient result alias that reuses the shared Redfish error type.
pub type Result<T> = redfish_core::Result<T>;
