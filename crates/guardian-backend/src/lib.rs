//! Backend API client.
//!
//! This crate provides:
//! - The `BackendClient` trait workers report through
//! - A reqwest implementation speaking the backend's REST API
//! - Error mapping from HTTP statuses

pub mod client;
pub mod error;

pub use client::{BackendClient, BackendConfig, HttpBackendClient, API_KEY_HEADER};
pub use error::{BackendError, BackendResult};
