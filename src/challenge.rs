use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ChallengeError;

/// Identifiers with this prefix are anonymous participants, accepted in async challenges.
pub const GUEST_PREFIX: &str = "guest_";

/// Winner value reported when both participants score the same.
pub const DRAW: &str = "Draw";

/// Answers of one participant, keyed by question index.
pub type AnswerSheet = BTreeMap<usize, String>;

pub fn is_guest_id(user_id: &str) -> bool {
    user_id.len() > GUEST_PREFIX.len() && user_id.starts_with(GUEST_PREFIX)
}

pub fn epoch_secs_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// Opponent is known at creation.
    Sync,
    /// Invite-code matchmaking, guests allowed.
    #[default]
    Async,
}

impl Mode {
    pub fn as_str(self) -> &'static str {
        match self {
            Mode::Sync => "sync",
            Mode::Async => "async",
        }
    }
}

impl FromStr for Mode {
    type Err = ChallengeError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "sync" => Ok(Mode::Sync),
            "async" => Ok(Mode::Async),
            other => Err(ChallengeError::Validation(format!("unknown mode '{}'", other))),
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Lifecycle state of a challenge.
///
/// The normal flow only moves forward: `Waiting -> Ready -> Started -> Completed`, with
/// `Waiting -> Expired` taken by the expiry sweep. Only the administrative override may move
/// a challenge backwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChallengeStatus {
    Waiting,
    Ready,
    Started,
    Completed,
    Expired,
}

impl ChallengeStatus {
    pub const ALL: [ChallengeStatus; 5] = [
        ChallengeStatus::Waiting,
        ChallengeStatus::Ready,
        ChallengeStatus::Started,
        ChallengeStatus::Completed,
        ChallengeStatus::Expired,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ChallengeStatus::Waiting => "waiting",
            ChallengeStatus::Ready => "ready",
            ChallengeStatus::Started => "started",
            ChallengeStatus::Completed => "completed",
            ChallengeStatus::Expired => "expired",
        }
    }

    /// Position in the forward order. Stored alongside the status so forward-only writes can
    /// be expressed as a single conditional update.
    pub fn rank(self) -> i64 {
        match self {
            ChallengeStatus::Waiting => 0,
            ChallengeStatus::Ready => 1,
            ChallengeStatus::Started => 2,
            ChallengeStatus::Completed => 3,
            ChallengeStatus::Expired => 4,
        }
    }

    pub fn can_advance_to(self, next: ChallengeStatus) -> bool {
        next.rank() > self.rank()
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, ChallengeStatus::Completed | ChallengeStatus::Expired)
    }
}

impl FromStr for ChallengeStatus {
    type Err = ChallengeError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        ChallengeStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == wanted)
            .ok_or_else(|| ChallengeError::Validation(format!("unknown status '{}'", s.trim())))
    }
}

impl fmt::Display for ChallengeStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One quiz question. `options` is empty for free-answer questions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    #[serde(alias = "question")]
    pub text: String,
    #[serde(default)]
    pub options: Vec<String>,
    #[serde(alias = "answer", alias = "correctAnswer")]
    pub correct_answer: String,
}

impl Question {
    pub fn new(text: &str, options: &[&str], correct_answer: &str) -> Question {
        Question {
            text: text.to_string(),
            options: options.iter().map(|o| o.to_string()).collect(),
            correct_answer: correct_answer.to_string(),
        }
    }
}

/// The role a user plays in a particular challenge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Creator,
    Opponent,
    Guest,
}

/// A head-to-head quiz duel between two participants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Challenge {
    pub id: Uuid,
    pub creator_id: String,
    pub opponent_id: Option<String>,
    pub subject: String,
    pub topic: String,
    pub subtopic: Option<String>,
    pub difficulty: String,
    pub mode: Mode,
    pub invite_code: Option<String>,
    /// False once the opponent joined or the challenge was retired; the code itself is kept.
    pub invite_active: bool,
    pub status: ChallengeStatus,
    pub questions: Vec<Question>,
    pub answers: HashMap<String, AnswerSheet>,
    pub created_at_epoch_secs: u64,
}

impl Challenge {
    /// Role of `user_id` in this challenge, if any. Guests only count in async mode.
    pub fn role_of(&self, user_id: &str) -> Option<Role> {
        if self.creator_id == user_id {
            return Some(Role::Creator);
        }
        if self.opponent_id.as_deref() == Some(user_id) {
            return Some(Role::Opponent);
        }
        if self.mode == Mode::Async && is_guest_id(user_id) {
            return Some(Role::Guest);
        }
        None
    }

    pub fn answers_of(&self, user_id: &str) -> Option<&AnswerSheet> {
        self.answers.get(user_id)
    }

    pub fn has_answered(&self, user_id: &str) -> bool {
        self.answers_of(user_id).is_some_and(|sheet| !sheet.is_empty())
    }

    /// Both named participants have an answer for every question.
    pub fn all_answers_in(&self) -> bool {
        let Some(opponent) = self.opponent_id.as_deref() else {
            return false;
        };
        if self.questions.is_empty() {
            return false;
        }
        let complete = |user: &str| {
            self.answers_of(user)
                .is_some_and(|sheet| (0..self.questions.len()).all(|i| sheet.contains_key(&i)))
        };
        complete(&self.creator_id) && complete(opponent)
    }

    /// Participants that are not guests, creator first.
    pub fn participants(&self) -> Vec<&str> {
        let mut ids = vec![self.creator_id.as_str()];
        if let Some(opponent) = self.opponent_id.as_deref() {
            ids.push(opponent);
        }
        ids
    }
}
