// crates/client/src/lib.rs
//! HTTP client for the Context Pack backend.
//!
//! Provides:
//! - `PackBackend`: the calls the reconciler depends on
//! - `HttpBackend`: reqwest implementation
//! - `ClientConfig`: base URL, token and timeouts

pub mod backend;
pub mod config;
pub mod error;
pub mod http;

pub use backend::PackBackend;
pub use config::ClientConfig;
pub use error::ClientError;
pub use http::HttpBackend;
