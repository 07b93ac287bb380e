use thiserror::Error;

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("All service identities are exhausted: the identity catalog has no unseen entries")]
    CredentialsExhausted,

    #[error("No primary account credentials configured")]
    PrimaryUnavailable,

    #[error("Token refresh failed for {identity}: {reason}")]
    RefreshFailed { identity: String, reason: String },

    #[error("Identity catalog error: {0}")]
    Catalog(String),

    #[error("HTTP transport error: {0}")]
    Http(#[from] bridge_http::HttpError),
}

pub type Result<T> = std::result::Result<T, AuthError>;
