use std::collections::HashMap;
use std::sync::RwLock;

use uuid::Uuid;

use crate::challenge::{Challenge, ChallengeStatus, Question};
use super::{ChallengeRepository, FieldUpdate, RepositoryError};

#[derive(Default)]
struct MemoryState {
    challenges: HashMap<Uuid, Challenge>,
    active_codes: HashMap<String, Uuid>,
}

impl MemoryState {
    fn get_mut(&mut self, id: Uuid) -> Result<&mut Challenge, RepositoryError> {
        self.challenges.get_mut(&id).ok_or(RepositoryError::NotFound)
    }

    fn retire_code(&mut self, id: Uuid) -> Result<bool, RepositoryError> {
        let challenge = self.challenges.get_mut(&id).ok_or(RepositoryError::NotFound)?;
        if !challenge.invite_active {
            return Ok(false);
        }
        challenge.invite_active = false;
        if let Some(code) = challenge.invite_code.clone() {
            if self.active_codes.get(&code) == Some(&id) {
                self.active_codes.remove(&code);
            }
        }
        Ok(true)
    }
}

/// In-process challenge store. Every operation runs under one write lock, which makes each
/// field update atomic. Intended for tests and local experiments.
#[derive(Default)]
pub struct MemoryChallengeRepository {
    state: RwLock<MemoryState>,
}

impl MemoryChallengeRepository {
    pub fn new() -> Self {
        MemoryChallengeRepository::default()
    }

    pub fn len(&self) -> usize {
        self.state.read().map(|s| s.challenges.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ChallengeRepository for MemoryChallengeRepository {
    fn create(&self, challenge: &Challenge) -> Result<Uuid, RepositoryError> {
        let mut state = self.state.write().map_err(|_| RepositoryError::Lock)?;
        if state.challenges.contains_key(&challenge.id) {
            return Err(RepositoryError::Database(format!("duplicate challenge id {}", challenge.id)));
        }
        if challenge.invite_active {
            if let Some(code) = &challenge.invite_code {
                if state.active_codes.contains_key(code) {
                    return Err(RepositoryError::InviteCodeTaken(code.clone()));
                }
                state.active_codes.insert(code.clone(), challenge.id);
            }
        }
        state.challenges.insert(challenge.id, challenge.clone());
        Ok(challenge.id)
    }

    fn get_by_id(&self, id: Uuid) -> Result<Challenge, RepositoryError> {
        let state = self.state.read().map_err(|_| RepositoryError::Lock)?;
        state.challenges.get(&id).cloned().ok_or(RepositoryError::NotFound)
    }

    fn get_by_invite_code(&self, code: &str) -> Result<Challenge, RepositoryError> {
        let state = self.state.read().map_err(|_| RepositoryError::Lock)?;
        if let Some(id) = state.active_codes.get(code) {
            return state.challenges.get(id).cloned().ok_or(RepositoryError::NotFound);
        }
        state
            .challenges
            .values()
            .filter(|c| c.invite_code.as_deref() == Some(code))
            .max_by_key(|c| c.created_at_epoch_secs)
            .cloned()
            .ok_or(RepositoryError::NotFound)
    }

    fn is_invite_code_active(&self, code: &str) -> Result<bool, RepositoryError> {
        let state = self.state.read().map_err(|_| RepositoryError::Lock)?;
        Ok(state.active_codes.contains_key(code))
    }

    fn update_field(&self, id: Uuid, update: FieldUpdate) -> Result<bool, RepositoryError> {
        let mut state = self.state.write().map_err(|_| RepositoryError::Lock)?;
        match update {
            FieldUpdate::Status(status) => {
                let challenge = state.get_mut(id)?;
                let changed = challenge.status != status;
                challenge.status = status;
                Ok(changed)
            }
            FieldUpdate::AdvanceStatus(status) => {
                let challenge = state.get_mut(id)?;
                if !challenge.status.can_advance_to(status) {
                    return Ok(false);
                }
                challenge.status = status;
                Ok(true)
            }
            FieldUpdate::RetireInviteCode => state.retire_code(id),
            FieldUpdate::ExpireIfWaiting => {
                let challenge = state.get_mut(id)?;
                if challenge.status != ChallengeStatus::Waiting {
                    return Ok(false);
                }
                challenge.status = ChallengeStatus::Expired;
                state.retire_code(id)?;
                Ok(true)
            }
        }
    }

    fn claim_opponent(&self, id: Uuid, opponent_id: &str) -> Result<bool, RepositoryError> {
        let mut state = self.state.write().map_err(|_| RepositoryError::Lock)?;
        let challenge = state.get_mut(id)?;
        if challenge.opponent_id.is_some() || challenge.status == ChallengeStatus::Expired {
            return Ok(false);
        }
        challenge.opponent_id = Some(opponent_id.to_string());
        if challenge.status.can_advance_to(ChallengeStatus::Ready) {
            challenge.status = ChallengeStatus::Ready;
        }
        state.retire_code(id)?;
        Ok(true)
    }

    fn store_questions_if_empty(&self, id: Uuid, questions: &[Question]) -> Result<Vec<Question>, RepositoryError> {
        let mut state = self.state.write().map_err(|_| RepositoryError::Lock)?;
        let challenge = state.get_mut(id)?;
        if challenge.questions.is_empty() {
            challenge.questions = questions.to_vec();
        }
        Ok(challenge.questions.clone())
    }

    fn append_answer(
        &self,
        id: Uuid,
        participant_id: &str,
        question_index: usize,
        answer: &str,
    ) -> Result<(), RepositoryError> {
        let mut state = self.state.write().map_err(|_| RepositoryError::Lock)?;
        let challenge = state.get_mut(id)?;
        challenge
            .answers
            .entry(participant_id.to_string())
            .or_default()
            .insert(question_index, answer.to_string());
        Ok(())
    }

    fn list_for_participant(&self, user_id: &str) -> Result<Vec<Challenge>, RepositoryError> {
        let state = self.state.read().map_err(|_| RepositoryError::Lock)?;
        let mut found: Vec<Challenge> = state
            .challenges
            .values()
            .filter(|c| c.creator_id == user_id || c.opponent_id.as_deref() == Some(user_id))
            .cloned()
            .collect();
        found.sort_by(|a, b| b.created_at_epoch_secs.cmp(&a.created_at_epoch_secs));
        Ok(found)
    }

    fn waiting_created_before(&self, cutoff_epoch_secs: u64) -> Result<Vec<Uuid>, RepositoryError> {
        let state = self.state.read().map_err(|_| RepositoryError::Lock)?;
        Ok(state
            .challenges
            .values()
            .filter(|c| c.status == ChallengeStatus::Waiting && c.created_at_epoch_secs < cutoff_epoch_secs)
            .map(|c| c.id)
            .collect())
    }

    fn count_completed_since(&self, user_id: &str, since_epoch_secs: u64) -> Result<usize, RepositoryError> {
        let state = self.state.read().map_err(|_| RepositoryError::Lock)?;
        Ok(state
            .challenges
            .values()
            .filter(|c| c.status == ChallengeStatus::Completed)
            .filter(|c| c.created_at_epoch_secs >= since_epoch_secs)
            .filter(|c| c.creator_id == user_id || c.opponent_id.as_deref() == Some(user_id))
            .count())
    }
}
