use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::content::ContentError;
use crate::repository::RepositoryError;

/// Coarse classification of a [`ChallengeError`], used by transports to pick a status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    Forbidden,
    Conflict,
    Validation,
    UpstreamFailure,
    ResourceExhausted,
}

/// Errors from challenge operations. Every failure crossing the engine boundary is one of these.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChallengeError {
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Forbidden: {0}")]
    Forbidden(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Invalid request: {0}")]
    Validation(String),
    #[error("Upstream failure: {0}")]
    UpstreamFailure(String),
    #[error("Resource exhausted: {0}")]
    ResourceExhausted(String),
}

impl ChallengeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ChallengeError::NotFound(_) => ErrorKind::NotFound,
            ChallengeError::Forbidden(_) => ErrorKind::Forbidden,
            ChallengeError::Conflict(_) => ErrorKind::Conflict,
            ChallengeError::Validation(_) => ErrorKind::Validation,
            ChallengeError::UpstreamFailure(_) => ErrorKind::UpstreamFailure,
            ChallengeError::ResourceExhausted(_) => ErrorKind::ResourceExhausted,
        }
    }
}

impl From<RepositoryError> for ChallengeError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound => ChallengeError::NotFound("challenge".to_string()),
            RepositoryError::InviteCodeTaken(code) => {
                ChallengeError::Conflict(format!("invite code {} is already in use", code))
            }
            RepositoryError::Database(msg) => ChallengeError::UpstreamFailure(format!("storage: {}", msg)),
            RepositoryError::Serialization(msg) => {
                ChallengeError::UpstreamFailure(format!("stored data: {}", msg))
            }
            RepositoryError::Lock => ChallengeError::UpstreamFailure("storage: internal lock error".to_string()),
        }
    }
}

impl From<ContentError> for ChallengeError {
    fn from(err: ContentError) -> Self {
        ChallengeError::UpstreamFailure(err.to_string())
    }
}
