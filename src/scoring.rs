use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::challenge::{AnswerSheet, Challenge, DRAW, Question};
use crate::directory::UserDirectory;

/// Count of questions answered exactly right. Comparison is case and whitespace sensitive,
/// missing answers count as wrong. Questions without an answer key (the degraded placeholder)
/// never score.
pub fn score(questions: &[Question], answers: Option<&AnswerSheet>) -> u32 {
    let Some(answers) = answers else {
        return 0;
    };
    questions
        .iter()
        .enumerate()
        .filter(|(_, question)| !question.correct_answer.is_empty())
        .filter(|(index, question)| answers.get(index).is_some_and(|a| *a == question.correct_answer))
        .count() as u32
}

/// Outcome of a challenge as seen by the result endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ChallengeResult {
    /// At least one side has not answered anything yet.
    Waiting,
    Complete {
        scores: BTreeMap<String, u32>,
        /// Id of the higher scorer, or `"Draw"`.
        winner: String,
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        display_names: BTreeMap<String, String>,
    },
}

impl ChallengeResult {
    pub fn is_complete(&self) -> bool {
        matches!(self, ChallengeResult::Complete { .. })
    }

    pub fn winner(&self) -> Option<&str> {
        match self {
            ChallengeResult::Complete { winner, .. } => Some(winner),
            ChallengeResult::Waiting => None,
        }
    }
}

/// Score both participants once each has at least one recorded answer.
pub fn resolve(challenge: &Challenge, directory: &dyn UserDirectory) -> ChallengeResult {
    let Some(opponent) = challenge.opponent_id.as_deref() else {
        return ChallengeResult::Waiting;
    };
    let creator = challenge.creator_id.as_str();
    if !challenge.has_answered(creator) || !challenge.has_answered(opponent) {
        return ChallengeResult::Waiting;
    }

    let creator_score = score(&challenge.questions, challenge.answers_of(creator));
    let opponent_score = score(&challenge.questions, challenge.answers_of(opponent));
    let winner = if creator_score > opponent_score {
        creator.to_string()
    } else if opponent_score > creator_score {
        opponent.to_string()
    } else {
        DRAW.to_string()
    };

    let scores = BTreeMap::from([
        (creator.to_string(), creator_score),
        (opponent.to_string(), opponent_score),
    ]);
    let display_names = [creator, opponent]
        .into_iter()
        .filter_map(|id| directory.resolve_handle(id).map(|name| (id.to_string(), name)))
        .collect();

    ChallengeResult::Complete { scores, winner, display_names }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::challenge::{ChallengeStatus, Mode};
    use crate::directory::StaticDirectory;
    use std::collections::HashMap;
    use uuid::Uuid;

    fn questions() -> Vec<Question> {
        vec![
            Question::new("Capital of France?", &["Paris", "Lyon"], "Paris"),
            Question::new("6 * 7?", &[], "42"),
        ]
    }

    fn sheet(answers: &[&str]) -> AnswerSheet {
        answers.iter().enumerate().map(|(i, a)| (i, a.to_string())).collect()
    }

    fn challenge_with(answers: &[(&str, &[&str])]) -> Challenge {
        Challenge {
            id: Uuid::new_v4(),
            creator_id: "X".to_string(),
            opponent_id: Some("Y".to_string()),
            subject: "Geography".to_string(),
            topic: "Capitals".to_string(),
            subtopic: None,
            difficulty: "easy".to_string(),
            mode: Mode::Sync,
            invite_code: None,
            invite_active: false,
            status: ChallengeStatus::Started,
            questions: questions(),
            answers: answers
                .iter()
                .map(|(user, given)| (user.to_string(), sheet(given)))
                .collect::<HashMap<_, _>>(),
            created_at_epoch_secs: 0,
        }
    }

    #[test]
    fn score_counts_exact_matches() {
        assert_eq!(score(&questions(), Some(&sheet(&["Paris", "42"]))), 2);
        assert_eq!(score(&questions(), Some(&sheet(&["paris", "42"]))), 1);
        assert_eq!(score(&questions(), Some(&sheet(&[" Paris", "42 "]))), 0);
        assert_eq!(score(&questions(), Some(&sheet(&[]))), 0);
        assert_eq!(score(&questions(), None), 0);
    }

    #[test]
    fn score_ignores_answers_past_the_question_list() {
        let mut answers = sheet(&["Paris"]);
        answers.insert(7, "42".to_string());
        assert_eq!(score(&questions(), Some(&answers)), 1);
    }

    #[test]
    fn score_skips_questions_without_a_key() {
        let placeholder = vec![Question::new("Question generation failed for Art - Baroque", &[], "")];
        assert_eq!(score(&placeholder, Some(&sheet(&[""]))), 0);
        assert_eq!(score(&placeholder, Some(&sheet(&["anything"]))), 0);
    }

    #[test]
    fn resolve_waits_for_both_sides() {
        let directory = StaticDirectory::default();
        assert_eq!(resolve(&challenge_with(&[]), &directory), ChallengeResult::Waiting);
        assert_eq!(
            resolve(&challenge_with(&[("X", &["Paris", "42"])]), &directory),
            ChallengeResult::Waiting
        );

        let mut no_opponent = challenge_with(&[("X", &["Paris"])]);
        no_opponent.opponent_id = None;
        assert_eq!(resolve(&no_opponent, &directory), ChallengeResult::Waiting);
    }

    #[test]
    fn resolve_picks_the_higher_scorer() {
        let directory = StaticDirectory::default();
        let result = resolve(&challenge_with(&[("X", &["Paris", "42"]), ("Y", &["Lyon"])]), &directory);
        assert_eq!(
            result,
            ChallengeResult::Complete {
                scores: BTreeMap::from([("X".to_string(), 2), ("Y".to_string(), 0)]),
                winner: "X".to_string(),
                display_names: BTreeMap::new(),
            }
        );

        let result = resolve(&challenge_with(&[("X", &["Lyon", "41"]), ("Y", &["Lyon", "42"])]), &directory);
        assert_eq!(result.winner(), Some("Y"));
    }

    #[test]
    fn resolve_reports_draw_on_equal_scores() {
        let directory = StaticDirectory::default();
        let result = resolve(&challenge_with(&[("X", &["Paris", "0"]), ("Y", &["Lyon", "42"])]), &directory);
        assert_eq!(result.winner(), Some(DRAW));
        assert!(result.is_complete());
    }

    #[test]
    fn display_names_do_not_change_the_outcome() {
        let mut directory = StaticDirectory::default();
        directory.insert("Y", "Zed");
        let result = resolve(&challenge_with(&[("X", &["Paris", "42"]), ("Y", &["Paris"])]), &directory);
        match result {
            ChallengeResult::Complete { winner, display_names, .. } => {
                assert_eq!(winner, "X");
                assert_eq!(display_names.get("Y").map(String::as_str), Some("Zed"));
                assert!(!display_names.contains_key("X"));
            }
            ChallengeResult::Waiting => panic!("expected a complete result"),
        }
    }

    #[test]
    fn result_serializes_with_status_tag() {
        let json = serde_json::to_value(ChallengeResult::Waiting).unwrap();
        assert_eq!(json, serde_json::json!({"status": "waiting"}));

        let complete = ChallengeResult::Complete {
            scores: BTreeMap::from([("X".to_string(), 1), ("Y".to_string(), 1)]),
            winner: DRAW.to_string(),
            display_names: BTreeMap::new(),
        };
        let json = serde_json::to_value(complete).unwrap();
        assert_eq!(json["status"], "complete");
        assert_eq!(json["winner"], "Draw");
        assert!(json.get("display_names").is_none());
    }
}
