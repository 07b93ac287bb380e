//! # Credential Pool
//!
//! Manages the identities that authenticate remote calls: the single primary
//! account (OAuth refresh-token exchange, cached for its exact reported
//! lifetime) and a rotating pool of service identities selected uniformly at
//! random to spread bursty quota usage without coordination.
//!
//! Service identities that fail to mint a token are evicted for the process
//! lifetime; when the live pool empties, the next fixed-size batch is pulled
//! from the [`IdentityCatalog`]'s unseen tail. An exhausted catalog is fatal
//! to the in-flight operation ([`AuthError::CredentialsExhausted`]). In
//! server mode a timer discards the whole pool every two hours and reloads
//! from the first batch, bounding the staleness of any one batch.

pub mod catalog;
pub mod error;
pub mod exchange;
pub mod pool;
pub mod types;

pub use catalog::{DirCatalog, IdentityCatalog, StaticCatalog};
pub use error::{AuthError, Result};
pub use exchange::TokenExchanger;
pub use pool::CredentialPool;
pub use types::{AccessToken, CachedToken, OAuthCredentials};
