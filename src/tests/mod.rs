use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use super::challenge::Question;
use super::content::{ContentError, ContentProvider, ContentRequest};
use super::manager::{ChallengeManager, CreateChallengeRequest};
use super::challenge::Mode;
use super::repository::memory::MemoryChallengeRepository;


/// Provider that returns a fixed set (or a fixed failure) and counts its calls.
pub(crate) struct ScriptedProvider {
    questions: Result<Vec<Question>, ContentError>,
    delay: Duration,
    calls: AtomicUsize,
}

impl ScriptedProvider {
    pub(crate) fn returning(questions: Vec<Question>) -> Arc<Self> {
        Arc::new(ScriptedProvider { questions: Ok(questions), delay: Duration::ZERO, calls: AtomicUsize::new(0) })
    }

    pub(crate) fn failing(err: ContentError) -> Arc<Self> {
        Arc::new(ScriptedProvider { questions: Err(err), delay: Duration::ZERO, calls: AtomicUsize::new(0) })
    }

    pub(crate) fn slow(questions: Vec<Question>, delay: Duration) -> Arc<Self> {
        Arc::new(ScriptedProvider { questions: Ok(questions), delay, calls: AtomicUsize::new(0) })
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ContentProvider for ScriptedProvider {
    async fn generate_questions(&self, request: &ContentRequest) -> Result<Vec<Question>, ContentError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.questions
            .clone()
            .map(|questions| questions.into_iter().take(request.count).collect())
    }
}

pub(crate) fn two_questions() -> Vec<Question> {
    vec![
        Question::new("Capital of France?", &["Paris", "Lyon", "Nice", "Lille"], "Paris"),
        Question::new("6 * 7?", &[], "42"),
    ]
}

pub(crate) fn ten_questions() -> Vec<Question> {
    (0..10)
        .map(|i| Question::new(&format!("{} + {}?", i, i), &[], &(i * 2).to_string()))
        .collect()
}

pub(crate) fn memory_manager(provider: Arc<ScriptedProvider>) -> ChallengeManager {
    ChallengeManager::new(Arc::new(MemoryChallengeRepository::new()), provider)
}

pub(crate) fn request(creator: &str, opponent: Option<&str>, mode: Mode) -> CreateChallengeRequest {
    CreateChallengeRequest {
        creator_id: creator.to_string(),
        subject: "Mathematics".to_string(),
        topic: "Algebra".to_string(),
        subtopic: None,
        difficulty: "medium".to_string(),
        opponent_id: opponent.map(String::from),
        mode,
    }
}
