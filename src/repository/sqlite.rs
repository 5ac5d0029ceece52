use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use rusqlite::{Connection, ErrorCode, OptionalExtension, Row, params};
use uuid::Uuid;

use crate::challenge::{AnswerSheet, Challenge, ChallengeStatus, Mode, Question};
use super::{ChallengeRepository, FieldUpdate, RepositoryError};

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS challenges (
        id TEXT PRIMARY KEY,
        creator_id TEXT NOT NULL,
        opponent_id TEXT,
        subject TEXT NOT NULL,
        topic TEXT NOT NULL,
        subtopic TEXT,
        difficulty TEXT NOT NULL,
        mode TEXT NOT NULL,
        invite_code TEXT,
        invite_active INTEGER NOT NULL DEFAULT 0,
        status TEXT NOT NULL,
        status_rank INTEGER NOT NULL,
        questions TEXT,
        created_at INTEGER NOT NULL
    );
    CREATE UNIQUE INDEX IF NOT EXISTS idx_challenges_active_invite
        ON challenges (invite_code) WHERE invite_active = 1;
    CREATE INDEX IF NOT EXISTS idx_challenges_invite ON challenges (invite_code);
    CREATE INDEX IF NOT EXISTS idx_challenges_creator ON challenges (creator_id);
    CREATE INDEX IF NOT EXISTS idx_challenges_opponent ON challenges (opponent_id);
    CREATE TABLE IF NOT EXISTS challenge_answers (
        challenge_id TEXT NOT NULL,
        participant_id TEXT NOT NULL,
        question_index INTEGER NOT NULL,
        answer TEXT NOT NULL,
        PRIMARY KEY (challenge_id, participant_id, question_index)
    );
";

const SELECT_COLUMNS: &str = "id, creator_id, opponent_id, subject, topic, subtopic, difficulty, mode, \
     invite_code, invite_active, status, questions, created_at";

/// Raw column values of one `challenges` row.
struct ChallengeRow {
    id: String,
    creator_id: String,
    opponent_id: Option<String>,
    subject: String,
    topic: String,
    subtopic: Option<String>,
    difficulty: String,
    mode: String,
    invite_code: Option<String>,
    invite_active: bool,
    status: String,
    questions: Option<String>,
    created_at: i64,
}

impl ChallengeRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<ChallengeRow> {
        Ok(ChallengeRow {
            id: row.get(0)?,
            creator_id: row.get(1)?,
            opponent_id: row.get(2)?,
            subject: row.get(3)?,
            topic: row.get(4)?,
            subtopic: row.get(5)?,
            difficulty: row.get(6)?,
            mode: row.get(7)?,
            invite_code: row.get(8)?,
            invite_active: row.get(9)?,
            status: row.get(10)?,
            questions: row.get(11)?,
            created_at: row.get(12)?,
        })
    }

    fn into_challenge(self, answers: HashMap<String, AnswerSheet>) -> Result<Challenge, RepositoryError> {
        let id = Uuid::parse_str(&self.id)
            .map_err(|e| RepositoryError::Serialization(format!("bad challenge id {}: {}", self.id, e)))?;
        let mode: Mode = self
            .mode
            .parse()
            .map_err(|_| RepositoryError::Serialization(format!("bad mode '{}'", self.mode)))?;
        let status: ChallengeStatus = self
            .status
            .parse()
            .map_err(|_| RepositoryError::Serialization(format!("bad status '{}'", self.status)))?;
        let questions: Vec<Question> = match self.questions {
            Some(json) => serde_json::from_str(&json)?,
            None => Vec::new(),
        };
        Ok(Challenge {
            id,
            creator_id: self.creator_id,
            opponent_id: self.opponent_id,
            subject: self.subject,
            topic: self.topic,
            subtopic: self.subtopic,
            difficulty: self.difficulty,
            mode,
            invite_code: self.invite_code,
            invite_active: self.invite_active,
            status,
            questions,
            answers,
            created_at_epoch_secs: self.created_at.max(0) as u64,
        })
    }
}

fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(err, rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation)
}

/// SQLite-backed persistence for challenges.
///
/// The answer ledger lives in its own table with one row per (challenge, participant,
/// question), so each submission is a single-row upsert.
pub struct SqliteChallengeRepository {
    conn: Mutex<Connection>,
}

impl SqliteChallengeRepository {
    /// Open (or create) a SQLite database at the given path. `":memory:"` is accepted.
    pub fn open(path: &str) -> Result<Self, RepositoryError> {
        tracing::info!(%path, "opening challenge storage");
        let conn = Connection::open(path)?;
        conn.execute_batch(SCHEMA)?;
        Ok(SqliteChallengeRepository { conn: Mutex::new(conn) })
    }

    pub fn open_in_memory() -> Result<Self, RepositoryError> {
        SqliteChallengeRepository::open(":memory:")
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, RepositoryError> {
        self.conn.lock().map_err(|_| RepositoryError::Lock)
    }

    fn load_answers(conn: &Connection, id: &str) -> Result<HashMap<String, AnswerSheet>, RepositoryError> {
        let mut stmt = conn.prepare(
            "SELECT participant_id, question_index, answer FROM challenge_answers WHERE challenge_id = ?1",
        )?;
        let rows = stmt.query_map(params![id], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?, row.get::<_, String>(2)?))
        })?;
        let mut answers: HashMap<String, AnswerSheet> = HashMap::new();
        for row in rows {
            let (participant, index, answer) = row?;
            answers.entry(participant).or_default().insert(index.max(0) as usize, answer);
        }
        Ok(answers)
    }

    fn load_where(conn: &Connection, clause: &str, param: &dyn rusqlite::ToSql) -> Result<Option<Challenge>, RepositoryError> {
        let sql = format!("SELECT {} FROM challenges WHERE {} LIMIT 1", SELECT_COLUMNS, clause);
        let row = conn
            .query_row(&sql, params![param], ChallengeRow::from_row)
            .optional()?;
        match row {
            Some(row) => {
                let answers = Self::load_answers(conn, &row.id)?;
                Ok(Some(row.into_challenge(answers)?))
            }
            None => Ok(None),
        }
    }

    fn exists(conn: &Connection, id: &str) -> Result<bool, RepositoryError> {
        let found: Option<i64> = conn
            .query_row("SELECT 1 FROM challenges WHERE id = ?1", params![id], |row| row.get(0))
            .optional()?;
        Ok(found.is_some())
    }

    /// Translate "no row changed" into NotFound or a guarded no-op.
    fn changed_or_missing(conn: &Connection, id: &str, changed: usize) -> Result<bool, RepositoryError> {
        if changed > 0 {
            return Ok(true);
        }
        if Self::exists(conn, id)? {
            Ok(false)
        } else {
            Err(RepositoryError::NotFound)
        }
    }
}

impl ChallengeRepository for SqliteChallengeRepository {
    fn create(&self, challenge: &Challenge) -> Result<Uuid, RepositoryError> {
        let questions = if challenge.questions.is_empty() {
            None
        } else {
            Some(serde_json::to_string(&challenge.questions)?)
        };
        let id = challenge.id.to_string();
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let inserted = tx.execute(
            "INSERT INTO challenges (id, creator_id, opponent_id, subject, topic, subtopic, difficulty, mode,
                 invite_code, invite_active, status, status_rank, questions, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
            params![
                id,
                challenge.creator_id,
                challenge.opponent_id,
                challenge.subject,
                challenge.topic,
                challenge.subtopic,
                challenge.difficulty,
                challenge.mode.as_str(),
                challenge.invite_code,
                challenge.invite_active,
                challenge.status.as_str(),
                challenge.status.rank(),
                questions,
                challenge.created_at_epoch_secs as i64,
            ],
        );
        if let Err(err) = inserted {
            if is_constraint_violation(&err) && challenge.invite_active {
                if let Some(code) = &challenge.invite_code {
                    return Err(RepositoryError::InviteCodeTaken(code.clone()));
                }
            }
            return Err(err.into());
        }
        for (participant, sheet) in &challenge.answers {
            for (index, answer) in sheet {
                tx.execute(
                    "INSERT INTO challenge_answers (challenge_id, participant_id, question_index, answer)
                     VALUES (?1, ?2, ?3, ?4)",
                    params![id, participant, *index as i64, answer],
                )?;
            }
        }
        tx.commit()?;
        tracing::debug!(challenge_id = %challenge.id, "challenge stored");
        Ok(challenge.id)
    }

    fn get_by_id(&self, id: Uuid) -> Result<Challenge, RepositoryError> {
        let conn = self.lock()?;
        Self::load_where(&conn, "id = ?1", &id.to_string())?.ok_or(RepositoryError::NotFound)
    }

    fn get_by_invite_code(&self, code: &str) -> Result<Challenge, RepositoryError> {
        let conn = self.lock()?;
        Self::load_where(
            &conn,
            "invite_code = ?1 ORDER BY invite_active DESC, created_at DESC",
            &code,
        )?
        .ok_or(RepositoryError::NotFound)
    }

    fn is_invite_code_active(&self, code: &str) -> Result<bool, RepositoryError> {
        let conn = self.lock()?;
        let found: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM challenges WHERE invite_code = ?1 AND invite_active = 1",
                params![code],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    fn update_field(&self, id: Uuid, update: FieldUpdate) -> Result<bool, RepositoryError> {
        let id = id.to_string();
        let conn = self.lock()?;
        let changed = match update {
            FieldUpdate::Status(status) => conn.execute(
                "UPDATE challenges SET status = ?2, status_rank = ?3 WHERE id = ?1 AND status <> ?2",
                params![id, status.as_str(), status.rank()],
            )?,
            FieldUpdate::AdvanceStatus(status) => conn.execute(
                "UPDATE challenges SET status = ?2, status_rank = ?3 WHERE id = ?1 AND status_rank < ?3",
                params![id, status.as_str(), status.rank()],
            )?,
            FieldUpdate::RetireInviteCode => conn.execute(
                "UPDATE challenges SET invite_active = 0 WHERE id = ?1 AND invite_active = 1",
                params![id],
            )?,
            FieldUpdate::ExpireIfWaiting => conn.execute(
                "UPDATE challenges SET status = ?2, status_rank = ?3, invite_active = 0
                 WHERE id = ?1 AND status = 'waiting'",
                params![id, ChallengeStatus::Expired.as_str(), ChallengeStatus::Expired.rank()],
            )?,
        };
        Self::changed_or_missing(&conn, &id, changed)
    }

    fn claim_opponent(&self, id: Uuid, opponent_id: &str) -> Result<bool, RepositoryError> {
        let id = id.to_string();
        let conn = self.lock()?;
        let changed = conn.execute(
            "UPDATE challenges
             SET opponent_id = ?2,
                 invite_active = 0,
                 status = CASE WHEN status_rank < ?4 THEN ?3 ELSE status END,
                 status_rank = MAX(status_rank, ?4)
             WHERE id = ?1 AND opponent_id IS NULL AND status <> ?5",
            params![
                id,
                opponent_id,
                ChallengeStatus::Ready.as_str(),
                ChallengeStatus::Ready.rank(),
                ChallengeStatus::Expired.as_str()
            ],
        )?;
        Self::changed_or_missing(&conn, &id, changed)
    }

    fn store_questions_if_empty(&self, id: Uuid, questions: &[Question]) -> Result<Vec<Question>, RepositoryError> {
        let json = serde_json::to_string(questions)?;
        let id = id.to_string();
        let conn = self.lock()?;
        conn.execute(
            "UPDATE challenges SET questions = ?2 WHERE id = ?1 AND questions IS NULL",
            params![id, json],
        )?;
        let stored: Option<Option<String>> = conn
            .query_row("SELECT questions FROM challenges WHERE id = ?1", params![id], |row| row.get(0))
            .optional()?;
        match stored {
            Some(Some(json)) => Ok(serde_json::from_str(&json)?),
            Some(None) => Ok(Vec::new()),
            None => Err(RepositoryError::NotFound),
        }
    }

    fn append_answer(
        &self,
        id: Uuid,
        participant_id: &str,
        question_index: usize,
        answer: &str,
    ) -> Result<(), RepositoryError> {
        let id = id.to_string();
        let conn = self.lock()?;
        if !Self::exists(&conn, &id)? {
            return Err(RepositoryError::NotFound);
        }
        conn.execute(
            "INSERT INTO challenge_answers (challenge_id, participant_id, question_index, answer)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT (challenge_id, participant_id, question_index)
             DO UPDATE SET answer = excluded.answer",
            params![id, participant_id, question_index as i64, answer],
        )?;
        Ok(())
    }

    fn list_for_participant(&self, user_id: &str) -> Result<Vec<Challenge>, RepositoryError> {
        let conn = self.lock()?;
        let sql = format!(
            "SELECT {} FROM challenges WHERE creator_id = ?1 OR opponent_id = ?1 ORDER BY created_at DESC",
            SELECT_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows: Vec<ChallengeRow> = stmt
            .query_map(params![user_id], ChallengeRow::from_row)?
            .collect::<Result<_, _>>()?;
        rows.into_iter()
            .map(|row| {
                let answers = Self::load_answers(&conn, &row.id)?;
                row.into_challenge(answers)
            })
            .collect()
    }

    fn waiting_created_before(&self, cutoff_epoch_secs: u64) -> Result<Vec<Uuid>, RepositoryError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT id FROM challenges WHERE status = 'waiting' AND created_at < ?1")?;
        let ids: Vec<String> = stmt
            .query_map(params![cutoff_epoch_secs as i64], |row| row.get(0))?
            .collect::<Result<_, _>>()?;
        ids.iter()
            .map(|id| {
                Uuid::parse_str(id)
                    .map_err(|e| RepositoryError::Serialization(format!("bad challenge id {}: {}", id, e)))
            })
            .collect()
    }

    fn count_completed_since(&self, user_id: &str, since_epoch_secs: u64) -> Result<usize, RepositoryError> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM challenges
             WHERE status = 'completed' AND created_at >= ?2 AND (creator_id = ?1 OR opponent_id = ?1)",
            params![user_id, since_epoch_secs as i64],
            |row| row.get(0),
        )?;
        Ok(count.max(0) as usize)
    }
}
