use core_auth::AuthError;
use core_store::StoreError;
use provider_google_drive::DriveError;
use thiserror::Error;

/// Engine-level failure taxonomy.
///
/// Read paths (crawl, count, dedupe) tolerate partial failure and report
/// unfinished subtrees as data; write paths (create/copy/delete) abort the
/// enclosing task on the first unrecoverable failure and persist an `error`
/// status.
#[derive(Error, Debug)]
pub enum MirrorError {
    #[error("Primary account quota exceeded: {0}")]
    QuotaExceeded(String),

    /// The destination hit its object-count limit. All sibling work in the
    /// same pool is cancelled and the task is marked `error`.
    #[error(
        "The number of objects on the destination drive has exceeded its limit. \
         Move the folders that were not copied to another drive, then run the \
         copy command again to resume the transfer"
    )]
    CapacityExceeded,

    #[error("All service identities are exhausted")]
    CredentialsExhausted,

    #[error(
        "Unable to access {id}; check that the link is valid and the identity \
         has permission: https://drive.google.com/drive/folders/{id}"
    )]
    Inaccessible { id: String },

    /// A copy for this (source, target) pair is already running; the request
    /// is rejected, not queued.
    #[error("A copy task for this source and target is already running (task {task_id})")]
    TaskConflict { task_id: i64 },

    #[error("Destination target is empty and no default target is configured")]
    MissingTarget,

    #[error("Invalid object id: {0}")]
    InvalidId(String),

    #[error("Remote API error: {0}")]
    Api(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<DriveError> for MirrorError {
    fn from(e: DriveError) -> Self {
        match e {
            DriveError::QuotaExceeded { message } => MirrorError::QuotaExceeded(message),
            DriveError::CapacityExceeded { .. } => MirrorError::CapacityExceeded,
            DriveError::Auth(AuthError::CredentialsExhausted) => MirrorError::CredentialsExhausted,
            other => MirrorError::Api(other.to_string()),
        }
    }
}

impl MirrorError {
    /// True when the failure must cancel all other in-flight and queued work
    /// in the same bounded pool.
    pub fn cancels_siblings(&self) -> bool {
        matches!(self, MirrorError::CapacityExceeded)
    }

    /// True when a crawl must abort instead of recording the folder as
    /// unfinished: without quota, capacity, or credentials there is no
    /// forward progress to make.
    pub fn is_fatal_to_crawl(&self) -> bool {
        matches!(
            self,
            MirrorError::QuotaExceeded(_)
                | MirrorError::CapacityExceeded
                | MirrorError::CredentialsExhausted
        )
    }
}

pub type Result<T> = std::result::Result<T, MirrorError>;
