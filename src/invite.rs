use std::fmt;
use std::sync::Arc;

use rand::Rng;
use sqids::Sqids;
use uuid::Uuid;

use crate::error::ChallengeError;
use crate::repository::{ChallengeRepository, RepositoryError};

pub const INVITE_CODE_LEN: usize = 6;
pub const DEFAULT_INVITE_ATTEMPTS: usize = 5;

const INVITE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Draw a fresh random invite code.
pub fn random_invite_code() -> String {
    let mut rng = rand::thread_rng();
    (0..INVITE_CODE_LEN)
        .map(|_| INVITE_ALPHABET[rng.gen_range(0..INVITE_ALPHABET.len())] as char)
        .collect()
}

/// Invite codes are matched case-insensitively and without surrounding whitespace.
pub fn normalize_invite_code(raw: &str) -> String {
    raw.trim().to_uppercase()
}

/// Produces short invite codes that are unique among active challenges.
#[derive(Clone)]
pub struct InviteCodeGenerator {
    max_attempts: usize,
    source: Arc<dyn Fn() -> String + Send + Sync>,
}

impl fmt::Debug for InviteCodeGenerator {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("InviteCodeGenerator")
            .field("max_attempts", &self.max_attempts)
            .finish()
    }
}

impl Default for InviteCodeGenerator {
    fn default() -> Self {
        InviteCodeGenerator::new(DEFAULT_INVITE_ATTEMPTS)
    }
}

impl InviteCodeGenerator {
    pub fn new(max_attempts: usize) -> Self {
        InviteCodeGenerator::with_source(max_attempts, random_invite_code)
    }

    /// Use a custom code source, e.g. a fixed sequence in tests.
    pub fn with_source<F>(max_attempts: usize, source: F) -> Self
    where
        F: Fn() -> String + Send + Sync + 'static,
    {
        InviteCodeGenerator {
            max_attempts: max_attempts.max(1),
            source: Arc::new(source),
        }
    }

    pub fn max_attempts(&self) -> usize {
        self.max_attempts
    }

    /// Return a code not currently active in `repository`.
    pub fn generate(&self, repository: &dyn ChallengeRepository) -> Result<String, ChallengeError> {
        self.allocate(repository, |_| Ok(())).map(|(code, ())| code)
    }

    /// Draw a code and hand it to `store` in one optimistic loop. A code taken by a concurrent
    /// writer between the check and the store counts as a collision and is redrawn.
    pub fn allocate<T, F>(
        &self,
        repository: &dyn ChallengeRepository,
        mut store: F,
    ) -> Result<(String, T), ChallengeError>
    where
        F: FnMut(&str) -> Result<T, RepositoryError>,
    {
        for attempt in 1..=self.max_attempts {
            let code = normalize_invite_code(&(self.source)());
            if repository.is_invite_code_active(&code)? {
                tracing::debug!(%code, attempt, "invite code collision on check");
                continue;
            }
            match store(&code) {
                Ok(value) => return Ok((code, value)),
                Err(RepositoryError::InviteCodeTaken(_)) => {
                    tracing::debug!(%code, attempt, "invite code collision on store");
                    continue;
                }
                Err(err) => return Err(err.into()),
            }
        }
        tracing::error!(attempts = self.max_attempts, "invite code generation exhausted");
        Err(ChallengeError::ResourceExhausted(format!(
            "no unique invite code after {} attempts",
            self.max_attempts
        )))
    }
}

fn sqids_instance() -> Sqids {
    Sqids::builder()
        .min_length(6)
        .build()
        .expect("valid sqids config")
}

/// Shareable short form of a challenge id.
pub fn uuid_to_short_id(uuid: Uuid) -> String {
    let (high, low) = uuid.as_u64_pair();
    sqids_instance()
        .encode(&[high, low])
        .unwrap_or_else(|_| uuid.simple().to_string())
}

pub fn short_id_to_uuid(short_id: &str) -> Option<Uuid> {
    let nums = sqids_instance().decode(short_id);
    if nums.len() != 2 {
        return None;
    }
    Some(Uuid::from_u64_pair(nums[0], nums[1]))
}

/// Accept either a full UUID or its short id.
pub fn parse_challenge_ref(raw: &str) -> Option<Uuid> {
    let raw = raw.trim();
    Uuid::parse_str(raw).ok().or_else(|| short_id_to_uuid(raw))
}
