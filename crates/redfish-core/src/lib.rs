//! # redfish-core
//!
//! Core types and utilities for talking to Redfish management controllers.
//!
//! This crate holds the pieces every Redfish client needs regardless of how
//! requests are dispatched: the error taxonomy, the wire error body models,
//! protocol constants and connection configuration.
//!
//! ## Modules
//!
//! - [`error`] - Error types and HTTP status code classification
//! - [`types`] - Wire models for Redfish error bodies
//! - [`client`] - Protocol constants and retry policy
//! - [`config`] - Connection configuration and validation

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod client;
pub mod config;
pub mod error;
pub mod types;

// Re-export commonly used types
pub use error::{classify_response, Error, HttpError, Result};
