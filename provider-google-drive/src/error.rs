use thiserror::Error;

/// Classified Drive API failures.
///
/// The executor collapses transport-level detail into this taxonomy so
/// callers can decide between retrying, recording an unfinished listing, or
/// aborting a whole operation.
#[derive(Error, Debug)]
pub enum DriveError {
    /// Rate limit against the primary account. Personal accounts have a hard
    /// daily ceiling that retrying cannot recover, so this is fatal to the
    /// call.
    #[error("Primary account quota exceeded: {message}")]
    QuotaExceeded { message: String },

    /// The destination hit its object/file-count limit. Fatal to the whole
    /// operation; outstanding sibling work must be cancelled.
    #[error("Destination object limit exceeded: {message}")]
    CapacityExceeded { message: String },

    #[error("Object not found")]
    NotFound,

    #[error("Permission denied: {message}")]
    PermissionDenied { message: String },

    /// Non-retryable API error outside the classes above.
    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    /// All attempts failed with retryable errors.
    #[error("Request failed after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: String },

    #[error("Failed to parse API response: {0}")]
    Parse(String),

    #[error(transparent)]
    Auth(#[from] core_auth::AuthError),

    #[error("Transport error: {0}")]
    Transport(#[from] bridge_http::HttpError),
}

impl DriveError {
    /// True when the failure must cancel sibling work in the same pool.
    pub fn is_capacity(&self) -> bool {
        matches!(self, DriveError::CapacityExceeded { .. })
    }

    /// True when a listing caller should record the folder as unfinished
    /// instead of failing the crawl.
    pub fn is_incomplete_listing(&self) -> bool {
        matches!(self, DriveError::RetriesExhausted { .. })
    }
}

pub type Result<T> = std::result::Result<T, DriveError>;
