use std::io;
use std::path::PathBuf;
use thiserror::Error;

use crate::model::{ParticipantId, RecordId};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store io error: {0}")]
    Io(#[from] io::Error),

    #[error("failed to encode row: {0}")]
    Encode(String),

    #[error("corrupt frame in {path} at offset {offset}: {reason}")]
    Corrupt { path: PathBuf, offset: u64, reason: String },

    #[error("store unavailable")]
    Unavailable,
}

#[derive(Debug, Error)]
pub enum ChallengeError {
    #[error("roster is empty")]
    EmptyRoster,

    #[error("duration must be positive")]
    ZeroDuration,

    #[error("participant {0} appears more than once in the roster")]
    DuplicateParticipant(ParticipantId),

    #[error("challenge {0} is already present in the index")]
    DuplicateRecord(RecordId),

    #[error("records were already loaded from the store")]
    AlreadyLoaded,

    #[error("poisoned lock")]
    Poisoned,

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ChallengeError {
    /// Caller errors: nothing was mutated and the call may be fixed and retried.
    pub fn is_invalid_input(&self) -> bool {
        matches!(
            self,
            ChallengeError::EmptyRoster | ChallengeError::ZeroDuration | ChallengeError::DuplicateParticipant(_)
        )
    }
}

pub type Result<T, E = ChallengeError> = std::result::Result<T, E>;
