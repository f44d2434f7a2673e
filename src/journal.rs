use chrono::{DateTime, Local};
use rusqlite::{params, Connection, Result};
use std::path::{Path, PathBuf};

use crate::app_dirs::AppDirs;
use crate::integrity::Violation;
use crate::model::{QuizId, SubmissionReason};

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS attempts (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        quiz_id INTEGER NOT NULL,
        title TEXT NOT NULL,
        reason TEXT NOT NULL,
        outcome TEXT NOT NULL,
        score REAL,
        correct_answers INTEGER,
        total_questions INTEGER,
        warning_count INTEGER NOT NULL,
        violations TEXT NOT NULL,
        finished_at TEXT NOT NULL,
        created_at DATETIME DEFAULT CURRENT_TIMESTAMP
    )
"#;

/// One finished attempt as recorded locally
#[derive(Debug, Clone, PartialEq)]
pub struct AttemptEntry {
    pub quiz_id: QuizId,
    pub title: String,
    pub reason: SubmissionReason,
    /// `completed` or the submit error message
    pub outcome: String,
    pub score: Option<f64>,
    pub correct_answers: Option<u32>,
    pub total_questions: Option<u32>,
    pub warning_count: u32,
    pub violations: Vec<Violation>,
    pub finished_at: DateTime<Local>,
}

/// Row read back from the journal
#[derive(Debug, Clone, PartialEq)]
pub struct JournalRow {
    pub quiz_id: QuizId,
    pub title: String,
    pub reason: String,
    pub outcome: String,
    pub score: Option<f64>,
    pub warning_count: u32,
    pub violation_count: usize,
    pub finished_at: DateTime<Local>,
}

/// Local sqlite log of finished attempts
#[derive(Debug)]
pub struct Journal {
    conn: Connection,
}

impl Journal {
    /// Open the journal at its default location, creating it if needed
    pub fn open_default() -> Result<Self> {
        let path = AppDirs::journal_path().unwrap_or_else(|| PathBuf::from("proctor_journal.db"));
        Self::open(&path)
    }

    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                rusqlite::Error::SqliteFailure(
                    rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_CANTOPEN),
                    Some(format!("Failed to create directory: {}", e)),
                )
            })?;
        }
        Self::init(Connection::open(path)?)
    }

    pub fn in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute(SCHEMA, [])?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_attempts_quiz ON attempts(quiz_id)",
            [],
        )?;
        Ok(Journal { conn })
    }

    pub fn record(&self, entry: &AttemptEntry) -> Result<()> {
        let violations = serde_json::to_string(&entry.violations)
            .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?;
        let quiz_id = i64::try_from(entry.quiz_id)
            .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?;
        self.conn.execute(
            r#"
            INSERT INTO attempts
            (quiz_id, title, reason, outcome, score, correct_answers, total_questions,
             warning_count, violations, finished_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
            params![
                quiz_id,
                entry.title,
                entry.reason.to_string(),
                entry.outcome,
                entry.score,
                entry.correct_answers,
                entry.total_questions,
                entry.warning_count,
                violations,
                entry.finished_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Most recent attempts first
    pub fn recent(&self, limit: usize) -> Result<Vec<JournalRow>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT quiz_id, title, reason, outcome, score, warning_count, violations, finished_at
            FROM attempts
            ORDER BY id DESC
            LIMIT ?1
            "#,
        )?;

        let rows = stmt.query_map([limit as i64], |row| {
            let finished_str: String = row.get(7)?;
            let finished_at = DateTime::parse_from_rfc3339(&finished_str)
                .map_err(|_| {
                    rusqlite::Error::InvalidColumnType(
                        7,
                        "finished_at".to_string(),
                        rusqlite::types::Type::Text,
                    )
                })?
                .with_timezone(&Local);
            let violations: String = row.get(6)?;
            let violation_count = serde_json::from_str::<Vec<serde_json::Value>>(&violations)
                .map(|v| v.len())
                .unwrap_or(0);

            Ok(JournalRow {
                quiz_id: row.get::<_, i64>(0)? as QuizId,
                title: row.get(1)?,
                reason: row.get(2)?,
                outcome: row.get(3)?,
                score: row.get(4)?,
                warning_count: row.get(5)?,
                violation_count,
                finished_at,
            })
        })?;

        let mut entries = Vec::new();
        for row in rows {
            entries.push(row?);
        }
        Ok(entries)
    }
}
