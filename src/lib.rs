//! Head-to-head quiz challenges between two users.
//!
//! A creator opens a challenge on a subject and topic, either against a named opponent or with a
//! short invite code that someone else redeems later. Starting the challenge fetches its
//! question set exactly once; both participants then answer independently and the result is
//! scored once each side has submitted something.
//!
//! ## Example usage
//! ```
//! use std::sync::Arc;
//! use quizduel::{
//!     BankContentProvider, ChallengeManager, ChallengeResult, CreateChallengeRequest, Mode,
//!     StartOptions, repository::memory::MemoryChallengeRepository,
//! };
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let manager = ChallengeManager::new(
//!     Arc::new(MemoryChallengeRepository::new()),
//!     Arc::new(BankContentProvider::builtin()),
//! );
//!
//! let created = manager
//!     .create_challenge(CreateChallengeRequest {
//!         creator_id: "ada".into(),
//!         subject: "Science".into(),
//!         topic: "Physics".into(),
//!         subtopic: None,
//!         difficulty: "easy".into(),
//!         opponent_id: None,
//!         mode: Mode::Async,
//!     })
//!     .unwrap();
//! let code = created.invite_code.unwrap();
//! manager.join_challenge(&code, "grace").unwrap();
//!
//! let id = created.challenge_id;
//! let started = manager.start_challenge(id, StartOptions::default()).await.unwrap();
//! for (index, question) in started.questions.iter().enumerate() {
//!     manager.submit_answer(id, "ada", index, &question.correct_answer).unwrap();
//! }
//! manager.submit_answer(id, "grace", 0, "Ohm's Law").unwrap();
//!
//! let result = manager.get_result(id).unwrap();
//! assert_eq!(result.winner(), Some("ada"));
//! assert!(matches!(result, ChallengeResult::Complete { .. }));
//! # });
//! ```

pub mod challenge;
pub mod config;
pub mod content;
pub mod directory;
pub mod error;
pub mod invite;
pub mod manager;
pub mod repository;
pub mod scoring;

#[cfg(feature = "server")]
pub mod http;
#[cfg(feature = "server")]
pub mod openai;
#[cfg(feature = "server")]
pub mod telemetry;

#[cfg(test)]
mod tests;

pub use challenge::{AnswerSheet, Challenge, ChallengeStatus, DRAW, GUEST_PREFIX, Mode, Question, Role};
pub use config::{ConfigError, EngineConfig, ServerConfig};
pub use content::{BankContentProvider, ContentError, ContentProvider, ContentRequest};
pub use directory::{StaticDirectory, UserDirectory};
pub use error::{ChallengeError, ErrorKind};
pub use invite::{InviteCodeGenerator, parse_challenge_ref, short_id_to_uuid, uuid_to_short_id};
pub use manager::{
    ChallengeManager, ChallengeStatusResponse, ChallengeSummary, CreateChallengeRequest, CreateChallengeResponse,
    JoinChallengeResponse, StartChallengeResponse, StartOptions, SubmitAnswerResponse, spawn_expiry_sweeper,
};
pub use repository::{ChallengeRepository, FieldUpdate, RepositoryError};
pub use scoring::{ChallengeResult, resolve, score};
