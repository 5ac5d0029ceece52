use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::instrument;
use uuid::Uuid;

use crate::challenge::{
    Challenge, ChallengeStatus, Mode, Question, Role, epoch_secs_now,
};
use crate::config::EngineConfig;
use crate::content::{ContentProvider, ContentRequest, degraded_question_set, validate_questions};
use crate::directory::{StaticDirectory, UserDirectory};
use crate::error::ChallengeError;
use crate::invite::{InviteCodeGenerator, normalize_invite_code, uuid_to_short_id};
use crate::repository::{ChallengeRepository, FieldUpdate, RepositoryError};
use crate::scoring::{ChallengeResult, resolve};

pub const WEEK_SECS: u64 = 7 * 24 * 60 * 60;

fn default_difficulty() -> String {
    "medium".to_string()
}

/// Parameters for a new challenge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateChallengeRequest {
    pub creator_id: String,
    pub subject: String,
    pub topic: String,
    #[serde(default)]
    pub subtopic: Option<String>,
    #[serde(default = "default_difficulty", alias = "level")]
    pub difficulty: String,
    /// Direct opponent. Without one the challenge gets an invite code.
    #[serde(default)]
    pub opponent_id: Option<String>,
    #[serde(default)]
    pub mode: Mode,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateChallengeResponse {
    pub challenge_id: Uuid,
    pub short_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invite_code: Option<String>,
    pub status: ChallengeStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinChallengeResponse {
    pub challenge_id: Uuid,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartOptions {
    /// Store a placeholder question set instead of failing when generation fails.
    #[serde(default)]
    pub allow_degraded: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartChallengeResponse {
    pub challenge_id: Uuid,
    pub questions: Vec<Question>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitAnswerResponse {
    pub recorded: bool,
    /// How many questions the submitting participant has answered so far.
    pub answered: usize,
}

/// Read-only view of a challenge's state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChallengeStatusResponse {
    pub challenge_id: Uuid,
    pub short_id: String,
    pub status: ChallengeStatus,
    pub mode: Mode,
    pub creator_id: String,
    pub opponent_id: Option<String>,
    pub subject: String,
    pub topic: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subtopic: Option<String>,
    pub difficulty: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invite_code: Option<String>,
    pub invite_active: bool,
    pub question_count: usize,
    /// Participant id to number of answered questions.
    pub answered: BTreeMap<String, usize>,
    pub created_at_epoch_secs: u64,
}

impl ChallengeStatusResponse {
    fn from_challenge(challenge: &Challenge) -> Self {
        ChallengeStatusResponse {
            challenge_id: challenge.id,
            short_id: uuid_to_short_id(challenge.id),
            status: challenge.status,
            mode: challenge.mode,
            creator_id: challenge.creator_id.clone(),
            opponent_id: challenge.opponent_id.clone(),
            subject: challenge.subject.clone(),
            topic: challenge.topic.clone(),
            subtopic: challenge.subtopic.clone(),
            difficulty: challenge.difficulty.clone(),
            invite_code: challenge.invite_code.clone(),
            invite_active: challenge.invite_active,
            question_count: challenge.questions.len(),
            answered: challenge
                .answers
                .iter()
                .map(|(user, sheet)| (user.clone(), sheet.len()))
                .collect(),
            created_at_epoch_secs: challenge.created_at_epoch_secs,
        }
    }
}

/// Entry of a participant's challenge list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChallengeSummary {
    pub challenge_id: Uuid,
    pub short_id: String,
    pub subject: String,
    pub topic: String,
    pub status: ChallengeStatus,
    pub mode: Mode,
    pub role: Role,
}

type StartGate = Arc<tokio::sync::Mutex<()>>;
type StartGates = Arc<Mutex<HashMap<Uuid, StartGate>>>;

/// A caller's hold on a challenge's start gate. The map entry is dropped with the last lease,
/// including when the start future itself is cancelled.
struct GateLease {
    gates: StartGates,
    id: Uuid,
    gate: StartGate,
}

impl Drop for GateLease {
    fn drop(&mut self) {
        let Ok(mut gates) = self.gates.lock() else {
            return;
        };
        let idle = gates
            .get(&self.id)
            .is_some_and(|current| Arc::ptr_eq(current, &self.gate) && Arc::strong_count(&self.gate) <= 2);
        if idle {
            gates.remove(&self.id);
        }
    }
}

fn required(field: &str, value: &str) -> Result<String, ChallengeError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ChallengeError::Validation(format!("{} is required", field)));
    }
    Ok(trimmed.to_string())
}

/// Runs the challenge lifecycle: create, join, start, answer, result.
///
/// Cheap to clone; clones share the repository, the providers and the start gates.
#[derive(Clone)]
pub struct ChallengeManager {
    repository: Arc<dyn ChallengeRepository>,
    content: Arc<dyn ContentProvider>,
    directory: Arc<dyn UserDirectory>,
    invite_codes: InviteCodeGenerator,
    config: EngineConfig,
    start_gates: StartGates,
}

impl ChallengeManager {
    pub fn new(repository: Arc<dyn ChallengeRepository>, content: Arc<dyn ContentProvider>) -> Self {
        let config = EngineConfig::default();
        ChallengeManager {
            repository,
            content,
            directory: Arc::new(StaticDirectory::default()),
            invite_codes: InviteCodeGenerator::new(config.invite_code_attempts),
            config,
            start_gates: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn with_directory(mut self, directory: Arc<dyn UserDirectory>) -> Self {
        self.directory = directory;
        self
    }

    pub fn with_invite_codes(mut self, invite_codes: InviteCodeGenerator) -> Self {
        self.invite_codes = invite_codes;
        self
    }

    /// Replace the engine settings. Also resizes the invite-code attempt budget.
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.invite_codes = InviteCodeGenerator::new(config.invite_code_attempts);
        self.config = config;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn repository(&self) -> &Arc<dyn ChallengeRepository> {
        &self.repository
    }

    /// Create a challenge. With a direct opponent it starts out `Ready`; otherwise it waits
    /// for someone to join with the returned invite code.
    #[instrument(level = "info", skip(self, request), fields(creator_id = %request.creator_id))]
    pub fn create_challenge(
        &self,
        request: CreateChallengeRequest,
    ) -> Result<CreateChallengeResponse, ChallengeError> {
        let creator_id = required("creator_id", &request.creator_id)?;
        let subject = required("subject", &request.subject)?;
        let topic = required("topic", &request.topic)?;
        let difficulty = required("difficulty", &request.difficulty)?;
        let subtopic = request
            .subtopic
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
        let opponent_id = request
            .opponent_id
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());

        if opponent_id.as_deref() == Some(creator_id.as_str()) {
            return Err(ChallengeError::Validation(
                "opponent must differ from creator".to_string(),
            ));
        }
        if request.mode == Mode::Sync && opponent_id.is_none() {
            return Err(ChallengeError::Validation(
                "sync challenges need an opponent".to_string(),
            ));
        }

        let mut challenge = Challenge {
            id: Uuid::new_v4(),
            creator_id,
            opponent_id,
            subject,
            topic,
            subtopic,
            difficulty,
            mode: request.mode,
            invite_code: None,
            invite_active: false,
            status: ChallengeStatus::Waiting,
            questions: Vec::new(),
            answers: HashMap::new(),
            created_at_epoch_secs: epoch_secs_now(),
        };

        if challenge.opponent_id.is_some() {
            challenge.status = ChallengeStatus::Ready;
            self.repository.create(&challenge)?;
        } else {
            let (code, stored) = self.invite_codes.allocate(self.repository.as_ref(), |code| {
                let mut candidate = challenge.clone();
                candidate.invite_code = Some(code.to_string());
                candidate.invite_active = true;
                self.repository.create(&candidate).map(|_| candidate)
            })?;
            tracing::debug!(challenge_id = %stored.id, %code, "invite code assigned");
            challenge = stored;
        }

        tracing::info!(
            challenge_id = %challenge.id,
            mode = %challenge.mode,
            status = %challenge.status,
            "challenge created"
        );
        Ok(CreateChallengeResponse {
            challenge_id: challenge.id,
            short_id: uuid_to_short_id(challenge.id),
            invite_code: challenge.invite_code,
            status: challenge.status,
        })
    }

    /// Claim the opponent slot of the challenge holding `invite_code`.
    #[instrument(level = "info", skip(self))]
    pub fn join_challenge(
        &self,
        invite_code: &str,
        user_id: &str,
    ) -> Result<JoinChallengeResponse, ChallengeError> {
        let user_id = required("user_id", user_id)?;
        let code = normalize_invite_code(invite_code);
        if code.is_empty() {
            return Err(ChallengeError::Validation("invite_code is required".to_string()));
        }

        let challenge = self.repository.get_by_invite_code(&code).map_err(|err| match err {
            RepositoryError::NotFound => ChallengeError::NotFound(format!("invite code {}", code)),
            other => other.into(),
        })?;

        if challenge.status == ChallengeStatus::Expired {
            return Err(ChallengeError::Conflict("challenge has expired".to_string()));
        }
        if challenge.opponent_id.is_some() {
            return Err(ChallengeError::Conflict("challenge already has an opponent".to_string()));
        }
        if challenge.creator_id == user_id {
            return Err(ChallengeError::Validation(
                "creator cannot join their own challenge".to_string(),
            ));
        }

        if !self.repository.claim_opponent(challenge.id, &user_id)? {
            tracing::info!(challenge_id = %challenge.id, "join lost the race for the opponent slot");
            return Err(ChallengeError::Conflict("challenge is no longer open to join".to_string()));
        }

        tracing::info!(challenge_id = %challenge.id, opponent_id = %user_id, "opponent joined");
        Ok(JoinChallengeResponse { challenge_id: challenge.id })
    }

    /// Fetch the question set on first call and move the challenge to `Started`. Later calls
    /// return the stored set without consulting the content provider.
    #[instrument(level = "info", skip(self), fields(challenge_id = %id))]
    pub async fn start_challenge(
        &self,
        id: Uuid,
        options: StartOptions,
    ) -> Result<StartChallengeResponse, ChallengeError> {
        let lease = self.lease_gate(id)?;
        let _guard = lease.gate.lock().await;
        self.start_gated(id, options).await
    }

    async fn start_gated(
        &self,
        id: Uuid,
        options: StartOptions,
    ) -> Result<StartChallengeResponse, ChallengeError> {
        let challenge = self.repository.get_by_id(id)?;
        if challenge.status == ChallengeStatus::Expired {
            return Err(ChallengeError::Conflict("challenge has expired".to_string()));
        }

        let questions = if challenge.questions.is_empty() {
            let generated = self.generate(&challenge, options).await?;
            self.repository.store_questions_if_empty(id, &generated)?
        } else {
            tracing::debug!("questions already present");
            challenge.questions
        };

        if self.repository.update_field(id, FieldUpdate::AdvanceStatus(ChallengeStatus::Started))? {
            tracing::info!(question_count = questions.len(), "challenge started");
        }
        Ok(StartChallengeResponse { challenge_id: id, questions })
    }

    async fn generate(
        &self,
        challenge: &Challenge,
        options: StartOptions,
    ) -> Result<Vec<Question>, ChallengeError> {
        let request = ContentRequest::for_challenge(challenge, self.config.questions_per_challenge);
        let generated = self
            .content
            .generate_questions(&request)
            .await
            .and_then(|questions| validate_questions(&questions).map(|()| questions));
        match generated {
            Ok(questions) => Ok(questions),
            Err(err) if options.allow_degraded => {
                tracing::warn!(error = %err, "question generation failed, storing placeholder set");
                Ok(degraded_question_set(challenge))
            }
            Err(err) => {
                tracing::warn!(error = %err, "question generation failed");
                Err(err.into())
            }
        }
    }

    fn lease_gate(&self, id: Uuid) -> Result<GateLease, ChallengeError> {
        let mut gates = self
            .start_gates
            .lock()
            .map_err(|_| ChallengeError::UpstreamFailure("start gate lock poisoned".to_string()))?;
        let gate = gates.entry(id).or_default().clone();
        Ok(GateLease { gates: self.start_gates.clone(), id, gate })
    }

    #[cfg(test)]
    pub(crate) fn open_gate_count(&self) -> usize {
        self.start_gates.lock().map(|gates| gates.len()).unwrap_or(0)
    }

    /// Record one answer. Resubmitting the same question overwrites the earlier answer.
    #[instrument(level = "info", skip(self, answer), fields(challenge_id = %id))]
    pub fn submit_answer(
        &self,
        id: Uuid,
        user_id: &str,
        question_index: usize,
        answer: &str,
    ) -> Result<SubmitAnswerResponse, ChallengeError> {
        let challenge = self.repository.get_by_id(id)?;
        let Some(role) = challenge.role_of(user_id) else {
            return Err(ChallengeError::Forbidden(format!(
                "{} is not a participant of this challenge",
                user_id
            )));
        };
        if challenge.questions.is_empty() {
            return Err(ChallengeError::Validation("challenge has not been started".to_string()));
        }
        if question_index >= challenge.questions.len() {
            return Err(ChallengeError::Validation(format!(
                "question_index {} out of range (0..{})",
                question_index,
                challenge.questions.len()
            )));
        }

        self.repository.append_answer(id, user_id, question_index, answer)?;
        tracing::debug!(?role, question_index, "answer recorded");

        let updated = self.repository.get_by_id(id)?;
        if updated.all_answers_in()
            && self
                .repository
                .update_field(id, FieldUpdate::AdvanceStatus(ChallengeStatus::Completed))?
        {
            tracing::info!("all answers in, challenge completed");
        }

        Ok(SubmitAnswerResponse {
            recorded: true,
            answered: updated.answers_of(user_id).map_or(0, |sheet| sheet.len()),
        })
    }

    pub fn get_result(&self, id: Uuid) -> Result<ChallengeResult, ChallengeError> {
        let challenge = self.repository.get_by_id(id)?;
        Ok(resolve(&challenge, self.directory.as_ref()))
    }

    pub fn get_status(&self, id: Uuid) -> Result<ChallengeStatusResponse, ChallengeError> {
        let challenge = self.repository.get_by_id(id)?;
        Ok(ChallengeStatusResponse::from_challenge(&challenge))
    }

    /// Administrative override. Writes any status, backwards included.
    #[instrument(level = "info", skip(self), fields(challenge_id = %id))]
    pub fn update_status(&self, id: Uuid, status: &str) -> Result<ChallengeStatusResponse, ChallengeError> {
        let status: ChallengeStatus = status.parse()?;
        self.repository.update_field(id, FieldUpdate::Status(status))?;
        if status.is_terminal() {
            self.repository.update_field(id, FieldUpdate::RetireInviteCode)?;
        }
        tracing::warn!(%status, "status overridden");
        self.get_status(id)
    }

    /// Challenges `user_id` created or joined, newest first.
    pub fn list_challenges_for(&self, user_id: &str) -> Result<Vec<ChallengeSummary>, ChallengeError> {
        let user_id = required("user_id", user_id)?;
        let challenges = self.repository.list_for_participant(&user_id)?;
        Ok(challenges
            .iter()
            .filter_map(|c| {
                let role = c.role_of(&user_id)?;
                Some(ChallengeSummary {
                    challenge_id: c.id,
                    short_id: uuid_to_short_id(c.id),
                    subject: c.subject.clone(),
                    topic: c.topic.clone(),
                    status: c.status,
                    mode: c.mode,
                    role,
                })
            })
            .collect())
    }

    pub fn count_completed_since(&self, user_id: &str, since_epoch_secs: u64) -> Result<usize, ChallengeError> {
        let user_id = required("user_id", user_id)?;
        Ok(self.repository.count_completed_since(&user_id, since_epoch_secs)?)
    }

    pub fn count_completed_last_week(&self, user_id: &str) -> Result<usize, ChallengeError> {
        self.count_completed_since(user_id, epoch_secs_now().saturating_sub(WEEK_SECS))
    }

    /// Expire `Waiting` challenges older than the configured age. Returns how many expired.
    pub fn expire_stale(&self, now_epoch_secs: u64) -> Result<usize, ChallengeError> {
        let cutoff = now_epoch_secs.saturating_sub(self.config.waiting_expiry_secs);
        let mut expired = 0;
        for id in self.repository.waiting_created_before(cutoff)? {
            if self.repository.update_field(id, FieldUpdate::ExpireIfWaiting)? {
                tracing::info!(challenge_id = %id, "challenge expired");
                expired += 1;
            }
        }
        Ok(expired)
    }
}

/// Run [`ChallengeManager::expire_stale`] every `every` on the tokio runtime.
pub fn spawn_expiry_sweeper(manager: ChallengeManager, every: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match manager.expire_stale(epoch_secs_now()) {
                Ok(0) => {}
                Ok(count) => tracing::info!(count, "expiry sweep finished"),
                Err(err) => tracing::error!(error = %err, "expiry sweep failed"),
            }
        }
    })
}
