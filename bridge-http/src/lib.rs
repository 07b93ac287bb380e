//! HTTP transport abstraction for the drive mirror engine.
//!
//! Every remote call in the workspace goes through the [`HttpClient`] trait so
//! that the request executor and credential pool can be tested against a mock
//! transport. The production implementation, [`ReqwestHttpClient`], wraps a
//! pooled `reqwest` client and honours the standard proxy environment
//! variables.

pub mod client;
pub mod error;
pub mod reqwest_client;

pub use client::{HttpClient, HttpMethod, HttpRequest, HttpResponse};
pub use error::{HttpError, Result};
pub use reqwest_client::ReqwestHttpClient;
