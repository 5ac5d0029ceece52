//! Question content for challenges.
//!
//! The engine never authors questions itself. It asks a [`ContentProvider`] once per challenge
//! and checks the returned set with [`validate_questions`] before storing it.

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

use crate::challenge::{Challenge, Question};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContentError {
    /// The provider could not be reached or refused the request.
    #[error("content provider failed: {0}")]
    Provider(String),
    /// The provider answered with something that is not a usable question set.
    #[error("malformed question set: {0}")]
    Malformed(String),
}

/// What to generate questions about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentRequest {
    pub subject: String,
    pub topic: String,
    pub subtopic: Option<String>,
    pub difficulty: String,
    pub count: usize,
}

impl ContentRequest {
    pub fn for_challenge(challenge: &Challenge, count: usize) -> ContentRequest {
        ContentRequest {
            subject: challenge.subject.clone(),
            topic: challenge.topic.clone(),
            subtopic: challenge.subtopic.clone(),
            difficulty: challenge.difficulty.clone(),
            count,
        }
    }
}

#[async_trait]
pub trait ContentProvider: Send + Sync {
    async fn generate_questions(&self, request: &ContentRequest) -> Result<Vec<Question>, ContentError>;
}

/// Reject question sets the engine cannot score.
pub fn validate_questions(questions: &[Question]) -> Result<(), ContentError> {
    if questions.is_empty() {
        return Err(ContentError::Malformed("empty question set".to_string()));
    }
    for (index, question) in questions.iter().enumerate() {
        if question.text.trim().is_empty() {
            return Err(ContentError::Malformed(format!("question {} has no text", index)));
        }
        if question.correct_answer.trim().is_empty() {
            return Err(ContentError::Malformed(format!("question {} has no correct answer", index)));
        }
        if question.options.is_empty() {
            continue;
        }
        if question.options.iter().any(|o| o.trim().is_empty()) {
            return Err(ContentError::Malformed(format!("question {} has a blank option", index)));
        }
        if !question.options.contains(&question.correct_answer) {
            return Err(ContentError::Malformed(format!(
                "question {} does not list its correct answer among the options",
                index
            )));
        }
    }
    Ok(())
}

/// Placeholder set stored when generation fails and the caller opted into degraded play.
pub fn degraded_question_set(challenge: &Challenge) -> Vec<Question> {
    vec![Question {
        text: format!("Question generation failed for {} - {}", challenge.subject, challenge.topic),
        options: Vec::new(),
        correct_answer: String::new(),
    }]
}

/// A bank entry as written in configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BankEntry {
    pub subject: String,
    pub topic: String,
    #[serde(default)]
    pub questions: Vec<Question>,
}

/// Serves questions from a fixed in-process bank, keyed by subject and topic.
#[derive(Debug, Clone, Default)]
pub struct BankContentProvider {
    entries: Vec<BankEntry>,
}

impl BankContentProvider {
    pub fn from_entries(entries: Vec<BankEntry>) -> Self {
        BankContentProvider { entries }
    }

    /// The sample bank shipped with the engine.
    pub fn builtin() -> Self {
        BankContentProvider::from_entries(vec![
            BankEntry {
                subject: "Mathematics".to_string(),
                topic: "Algebra".to_string(),
                questions: vec![
                    Question::new(
                        "What is the value of x in the equation 3x + 2 = 8?",
                        &["1", "2", "3", "4"],
                        "2",
                    ),
                    Question::new("Simplify the expression: 5y - 2y + 7y", &["9y", "10y", "12y", "14y"], "10y"),
                ],
            },
            BankEntry {
                subject: "Science".to_string(),
                topic: "Physics".to_string(),
                questions: vec![
                    Question::new(
                        "Which law states that energy cannot be created or destroyed?",
                        &[
                            "Newton's First Law",
                            "Newton's Second Law",
                            "Law of Conservation of Energy",
                            "Ohm's Law",
                        ],
                        "Law of Conservation of Energy",
                    ),
                    Question::new("What is the unit of electric current?", &["Volt", "Ohm", "Ampere", "Watt"], "Ampere"),
                ],
            },
        ])
    }

    /// Built-in bank extended with configured entries. Configured entries win on a shared key.
    pub fn with_extra(extra: Vec<BankEntry>) -> Self {
        let mut bank = BankContentProvider::builtin();
        for entry in extra {
            bank.entries.retain(|e| !same_key(e, &entry.subject, &entry.topic));
            bank.entries.push(entry);
        }
        bank
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn same_key(entry: &BankEntry, subject: &str, topic: &str) -> bool {
    entry.subject.eq_ignore_ascii_case(subject.trim()) && entry.topic.eq_ignore_ascii_case(topic.trim())
}

#[async_trait]
impl ContentProvider for BankContentProvider {
    async fn generate_questions(&self, request: &ContentRequest) -> Result<Vec<Question>, ContentError> {
        let entry = self
            .entries
            .iter()
            .find(|e| same_key(e, &request.subject, &request.topic))
            .ok_or_else(|| {
                ContentError::Provider(format!("no questions for {} - {}", request.subject, request.topic))
            })?;
        let count = request.count.max(1);
        Ok(entry.questions.iter().take(count).cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(subject: &str, topic: &str, count: usize) -> ContentRequest {
        ContentRequest {
            subject: subject.to_string(),
            topic: topic.to_string(),
            subtopic: None,
            difficulty: "medium".to_string(),
            count,
        }
    }

    #[test]
    fn validate_accepts_well_formed_sets() {
        let questions = vec![
            Question::new("Capital of France?", &["Paris", "Lyon"], "Paris"),
            Question::new("6 * 7?", &[], "42"),
        ];
        assert_eq!(validate_questions(&questions), Ok(()));
    }

    #[test]
    fn validate_rejects_malformed_sets() {
        assert!(validate_questions(&[]).is_err());
        assert!(validate_questions(&[Question::new("", &[], "x")]).is_err());
        assert!(validate_questions(&[Question::new("Q?", &[], " ")]).is_err());
        assert!(validate_questions(&[Question::new("Q?", &["a", ""], "a")]).is_err());
        assert!(matches!(
            validate_questions(&[Question::new("Q?", &["a", "b"], "c")]),
            Err(ContentError::Malformed(_))
        ));
    }

    #[test]
    fn degraded_set_names_the_topic() {
        let challenge = Challenge {
            id: uuid::Uuid::new_v4(),
            creator_id: "X".into(),
            opponent_id: None,
            subject: "History".into(),
            topic: "Rome".into(),
            subtopic: None,
            difficulty: "easy".into(),
            mode: crate::challenge::Mode::Async,
            invite_code: None,
            invite_active: false,
            status: crate::challenge::ChallengeStatus::Waiting,
            questions: Vec::new(),
            answers: Default::default(),
            created_at_epoch_secs: 0,
        };
        let set = degraded_question_set(&challenge);
        assert_eq!(set.len(), 1);
        assert_eq!(set[0].text, "Question generation failed for History - Rome");
    }

    #[tokio::test]
    async fn bank_serves_builtin_topics_case_insensitively() {
        let bank = BankContentProvider::builtin();
        let questions = bank.generate_questions(&request("mathematics", "ALGEBRA", 10)).await.unwrap();
        assert_eq!(questions.len(), 2);
        assert_eq!(questions[1].correct_answer, "10y");
        assert_eq!(validate_questions(&questions), Ok(()));

        let one = bank.generate_questions(&request("Science", "Physics", 1)).await.unwrap();
        assert_eq!(one.len(), 1);
    }

    #[tokio::test]
    async fn bank_fails_for_unknown_topics() {
        let bank = BankContentProvider::builtin();
        let result = bank.generate_questions(&request("Art", "Baroque", 5)).await;
        assert!(matches!(result, Err(ContentError::Provider(_))));
    }

    #[tokio::test]
    async fn configured_entries_override_builtin_ones() {
        let bank = BankContentProvider::with_extra(vec![BankEntry {
            subject: "Mathematics".into(),
            topic: "Algebra".into(),
            questions: vec![Question::new("1 + 1?", &["1", "2"], "2")],
        }]);
        assert_eq!(bank.len(), 2);
        let questions = bank.generate_questions(&request("Mathematics", "Algebra", 10)).await.unwrap();
        assert_eq!(questions, vec![Question::new("1 + 1?", &["1", "2"], "2")]);
    }
}
