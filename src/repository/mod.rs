//! Durable storage for challenges.
//!
//! [`ChallengeRepository`] is the single storage seam of the engine. Production uses
//! [`sqlite::SqliteChallengeRepository`]; [`memory::MemoryChallengeRepository`] is a test
//! double with the same atomicity guarantees.
//!
//! Every mutating operation is field-scoped and atomic, so two participants writing to the
//! same challenge never lose each other's updates.

use thiserror::Error;
use uuid::Uuid;

use crate::challenge::{Challenge, ChallengeStatus, Question};

pub mod memory;
pub mod sqlite;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("challenge not found")]
    NotFound,
    #[error("invite code {0} is already active")]
    InviteCodeTaken(String),
    #[error("database error: {0}")]
    Database(String),
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("internal lock error")]
    Lock,
}

impl From<rusqlite::Error> for RepositoryError {
    fn from(err: rusqlite::Error) -> Self {
        match err {
            rusqlite::Error::QueryReturnedNoRows => RepositoryError::NotFound,
            other => RepositoryError::Database(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for RepositoryError {
    fn from(err: serde_json::Error) -> Self {
        RepositoryError::Serialization(err.to_string())
    }
}

/// A single-field write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldUpdate {
    /// Unconditional overwrite. Only the administrative override uses this.
    Status(ChallengeStatus),
    /// Move the status forward; a no-op when the challenge is already there or beyond.
    AdvanceStatus(ChallengeStatus),
    /// Deactivate the invite code while keeping its value.
    RetireInviteCode,
    /// `Waiting -> Expired` plus code retirement; a no-op for any other status.
    ExpireIfWaiting,
}

pub trait ChallengeRepository: Send + Sync {
    /// Store a new challenge. Fails with `InviteCodeTaken` if its active code is held elsewhere.
    fn create(&self, challenge: &Challenge) -> Result<Uuid, RepositoryError>;

    fn get_by_id(&self, id: Uuid) -> Result<Challenge, RepositoryError>;

    /// The challenge holding `code` as active, else the most recent one that ever carried it.
    fn get_by_invite_code(&self, code: &str) -> Result<Challenge, RepositoryError>;

    fn is_invite_code_active(&self, code: &str) -> Result<bool, RepositoryError>;

    /// Apply `update`. Returns whether anything changed.
    fn update_field(&self, id: Uuid, update: FieldUpdate) -> Result<bool, RepositoryError>;

    /// Set the opponent only if none is set yet. On success the status moves forward to
    /// `Ready` and the invite code is retired. Returns whether the claim won.
    fn claim_opponent(&self, id: Uuid, opponent_id: &str) -> Result<bool, RepositoryError>;

    /// Store `questions` only if the challenge has none, then return whatever is stored.
    fn store_questions_if_empty(&self, id: Uuid, questions: &[Question]) -> Result<Vec<Question>, RepositoryError>;

    /// Upsert one ledger cell.
    fn append_answer(
        &self,
        id: Uuid,
        participant_id: &str,
        question_index: usize,
        answer: &str,
    ) -> Result<(), RepositoryError>;

    /// Challenges where `user_id` is creator or opponent, newest first.
    fn list_for_participant(&self, user_id: &str) -> Result<Vec<Challenge>, RepositoryError>;

    /// Ids of `Waiting` challenges created strictly before `cutoff_epoch_secs`.
    fn waiting_created_before(&self, cutoff_epoch_secs: u64) -> Result<Vec<Uuid>, RepositoryError>;

    /// Completed challenges created at or after `since_epoch_secs` in which `user_id` took part.
    fn count_completed_since(&self, user_id: &str, since_epoch_secs: u64) -> Result<usize, RepositoryError>;
}
