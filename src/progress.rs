use std::fmt;
use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::types::{FromSql, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::models::{Exercise, TestResult};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS exercises (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL UNIQUE,
    order_num TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'pending',
    attempts INTEGER NOT NULL DEFAULT 0,
    first_passed_at TEXT,
    last_attempt_at TEXT
);

CREATE TABLE IF NOT EXISTS attempts (
    id INTEGER PRIMARY KEY,
    exercise_id INTEGER NOT NULL REFERENCES exercises(id) ON DELETE CASCADE,
    passed INTEGER NOT NULL,
    output TEXT,
    duration_ms INTEGER NOT NULL,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS hints_shown (
    exercise_id INTEGER NOT NULL REFERENCES exercises(id) ON DELETE CASCADE,
    hint_index INTEGER NOT NULL,
    shown_at TEXT NOT NULL,
    PRIMARY KEY (exercise_id, hint_index)
);
";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExerciseStatus {
    #[default]
    Pending,
    Passed,
    Skipped,
}

impl ExerciseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExerciseStatus::Pending => "pending",
            ExerciseStatus::Passed => "passed",
            ExerciseStatus::Skipped => "skipped",
        }
    }

    /// Anything unrecognized in the store reads as pending.
    fn from_db(value: &str) -> Self {
        match value {
            "passed" => ExerciseStatus::Passed,
            "skipped" => ExerciseStatus::Skipped,
            _ => ExerciseStatus::Pending,
        }
    }
}

impl fmt::Display for ExerciseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ToSql for ExerciseStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for ExerciseStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value.as_str().map(ExerciseStatus::from_db)
    }
}

/// Everything the store knows about one exercise.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProgressRecord {
    pub status: ExerciseStatus,
    pub attempts: u32,
    pub first_passed_at: Option<DateTime<Utc>>,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub hints_shown: Vec<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttemptEntry {
    pub passed: bool,
    pub output: String,
    pub duration_ms: u64,
    pub created_at: DateTime<Utc>,
}

/// Durable per-exercise progress, keyed by display name.
///
/// Each public mutation is its own transaction; a crash between runs never
/// leaves an attempt counted without its log entry.
pub struct ProgressStore {
    conn: Connection,
}

impl ProgressStore {
    pub fn open(path: &Path) -> Result<Self> {
        debug!(db = %path.display(), "opening progress store");
        Self::init(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "foreign_keys", true)?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    /// Row id for `exercise`, inserting it as pending on first sight. Safe to
    /// call on every startup; only the stored order is refreshed.
    pub fn ensure(&self, exercise: &Exercise) -> Result<i64> {
        let id = self.conn.query_row(
            "INSERT INTO exercises (name, order_num) VALUES (?1, ?2)
             ON CONFLICT(name) DO UPDATE SET order_num = excluded.order_num
             RETURNING id",
            params![exercise.name, exercise.order_str()],
            |row| row.get(0),
        )?;
        Ok(id)
    }

    fn id_of(&self, name: &str) -> Result<Option<i64>> {
        let id = self
            .conn
            .query_row("SELECT id FROM exercises WHERE name = ?1", [name], |row| row.get(0))
            .optional()?;
        Ok(id)
    }

    pub fn status(&self, exercise: &Exercise) -> Result<ExerciseStatus> {
        let status = self
            .conn
            .query_row(
                "SELECT status FROM exercises WHERE name = ?1",
                [&exercise.name],
                |row| row.get(0),
            )
            .optional()?;
        Ok(status.unwrap_or_default())
    }

    pub fn attempts(&self, exercise: &Exercise) -> Result<u32> {
        let attempts = self
            .conn
            .query_row(
                "SELECT attempts FROM exercises WHERE name = ?1",
                [&exercise.name],
                |row| row.get(0),
            )
            .optional()?;
        Ok(attempts.unwrap_or(0))
    }

    pub fn record(&self, exercise: &Exercise) -> Result<ProgressRecord> {
        let row = self
            .conn
            .query_row(
                "SELECT id, status, attempts, first_passed_at, last_attempt_at
                 FROM exercises WHERE name = ?1",
                [&exercise.name],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        ProgressRecord {
                            status: row.get(1)?,
                            attempts: row.get(2)?,
                            first_passed_at: row.get(3)?,
                            last_attempt_at: row.get(4)?,
                            hints_shown: Vec::new(),
                        },
                    ))
                },
            )
            .optional()?;

        let Some((id, mut record)) = row else {
            return Ok(ProgressRecord::default());
        };
        let mut stmt = self
            .conn
            .prepare("SELECT hint_index FROM hints_shown WHERE exercise_id = ?1 ORDER BY hint_index")?;
        record.hints_shown = stmt
            .query_map([id], |row| row.get(0))?
            .collect::<rusqlite::Result<_>>()?;
        Ok(record)
    }

    /// Attempt history, oldest first.
    pub fn attempt_log(&self, exercise: &Exercise) -> Result<Vec<AttemptEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT a.passed, a.output, a.duration_ms, a.created_at
             FROM attempts a JOIN exercises e ON a.exercise_id = e.id
             WHERE e.name = ?1 ORDER BY a.id",
        )?;
        let entries = stmt
            .query_map([&exercise.name], |row| {
                Ok(AttemptEntry {
                    passed: row.get(0)?,
                    output: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
                    duration_ms: row.get(2)?,
                    created_at: row.get(3)?,
                })
            })?
            .collect::<rusqlite::Result<_>>()?;
        Ok(entries)
    }

    pub fn all_statuses(&self) -> Result<Vec<(String, ExerciseStatus)>> {
        let mut stmt = self.conn.prepare("SELECT name, status FROM exercises ORDER BY id")?;
        let rows = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<rusqlite::Result<_>>()?;
        Ok(rows)
    }

    /// Counts the run and logs it. A passing result marks the exercise passed;
    /// the first pass time is kept across later passes. Failing runs never
    /// touch the status.
    pub fn record_attempt(&self, exercise: &Exercise, result: &TestResult) -> Result<()> {
        let id = self.ensure(exercise)?;
        let now = Utc::now();
        let tx = self.conn.unchecked_transaction()?;

        tx.execute(
            "UPDATE exercises SET attempts = attempts + 1, last_attempt_at = ?1 WHERE id = ?2",
            params![now, id],
        )?;
        if result.passed {
            tx.execute(
                "UPDATE exercises
                 SET status = 'passed', first_passed_at = COALESCE(first_passed_at, ?1)
                 WHERE id = ?2",
                params![now, id],
            )?;
        }
        tx.execute(
            "INSERT INTO attempts (exercise_id, passed, output, duration_ms, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![id, result.passed, result.output, result.duration_ms(), now],
        )?;
        tx.commit()?;

        debug!(exercise = %exercise.name, passed = result.passed, "recorded attempt");
        Ok(())
    }

    pub fn mark_skipped(&self, exercise: &Exercise) -> Result<()> {
        let id = self.ensure(exercise)?;
        self.conn.execute(
            "UPDATE exercises SET status = ?1 WHERE id = ?2",
            params![ExerciseStatus::Skipped, id],
        )?;
        info!(exercise = %exercise.name, "marked skipped");
        Ok(())
    }

    pub fn hints_shown_count(&self, exercise: &Exercise) -> Result<u32> {
        let count = self.conn.query_row(
            "SELECT COUNT(*) FROM hints_shown h JOIN exercises e ON h.exercise_id = e.id
             WHERE e.name = ?1",
            [&exercise.name],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Revealing the same hint twice is a no-op.
    pub fn record_hint_shown(&self, exercise: &Exercise, index: u32) -> Result<()> {
        let id = self.ensure(exercise)?;
        self.conn.execute(
            "INSERT OR IGNORE INTO hints_shown (exercise_id, hint_index, shown_at)
             VALUES (?1, ?2, ?3)",
            params![id, index, Utc::now()],
        )?;
        Ok(())
    }

    /// `Some` resets one exercise, `None` forgets everything.
    pub fn reset(&self, exercise: Option<&Exercise>) -> Result<()> {
        match exercise {
            Some(exercise) => self.reset_exercise(exercise),
            None => self.reset_all(),
        }
    }

    pub fn reset_exercise(&self, exercise: &Exercise) -> Result<()> {
        let id = self
            .id_of(&exercise.name)?
            .ok_or_else(|| Error::ExerciseNotFound(exercise.name.clone()))?;

        let tx = self.conn.unchecked_transaction()?;
        tx.execute("DELETE FROM hints_shown WHERE exercise_id = ?1", [id])?;
        tx.execute("DELETE FROM attempts WHERE exercise_id = ?1", [id])?;
        tx.execute(
            "UPDATE exercises
             SET status = 'pending', attempts = 0, first_passed_at = NULL, last_attempt_at = NULL
             WHERE id = ?1",
            [id],
        )?;
        tx.commit()?;

        info!(exercise = %exercise.name, "progress reset");
        Ok(())
    }

    pub fn reset_all(&self) -> Result<()> {
        self.conn.execute_batch(
            "BEGIN;
             DELETE FROM hints_shown;
             DELETE FROM attempts;
             DELETE FROM exercises;
             COMMIT;",
        )?;
        info!("all progress reset");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    fn exercise(name: &str) -> Exercise {
        Exercise::new(format!("/course/exercises/{name}").into(), name, vec![1])
    }

    fn outcome(passed: bool) -> TestResult {
        TestResult::from_counts(passed, 1, usize::from(!passed), Vec::new(), "out".into(), Duration::from_millis(7))
    }

    #[test]
    fn test_ensure_is_idempotent() {
        let store = ProgressStore::open_in_memory().unwrap();
        let ex = exercise("Intro");
        let first = store.ensure(&ex).unwrap();
        let second = store.ensure(&ex).unwrap();
        assert_eq!(first, second);
        assert_eq!(store.all_statuses().unwrap(), vec![("Intro".to_string(), ExerciseStatus::Pending)]);
    }

    #[test]
    fn test_unknown_exercise_reads_as_fresh() {
        let store = ProgressStore::open_in_memory().unwrap();
        let ex = exercise("Ghost");
        assert_eq!(store.status(&ex).unwrap(), ExerciseStatus::Pending);
        assert_eq!(store.attempts(&ex).unwrap(), 0);
        assert_eq!(store.record(&ex).unwrap(), ProgressRecord::default());
    }

    #[test]
    fn test_failing_attempts_do_not_change_status() {
        let store = ProgressStore::open_in_memory().unwrap();
        let ex = exercise("Loops");
        store.record_attempt(&ex, &outcome(false)).unwrap();
        store.record_attempt(&ex, &outcome(false)).unwrap();

        let record = store.record(&ex).unwrap();
        assert_eq!(record.status, ExerciseStatus::Pending);
        assert_eq!(record.attempts, 2);
        assert!(record.last_attempt_at.is_some());
        assert!(record.first_passed_at.is_none());
        assert_eq!(store.attempt_log(&ex).unwrap().len(), 2);
    }

    #[test]
    fn test_first_passed_at_survives_second_pass() {
        let store = ProgressStore::open_in_memory().unwrap();
        let ex = exercise("Strings");
        store.record_attempt(&ex, &outcome(true)).unwrap();
        let first = store.record(&ex).unwrap().first_passed_at;
        std::thread::sleep(Duration::from_millis(5));
        store.record_attempt(&ex, &outcome(true)).unwrap();

        let record = store.record(&ex).unwrap();
        assert_eq!(record.status, ExerciseStatus::Passed);
        assert_eq!(record.first_passed_at, first);
        assert_eq!(record.attempts, 2);
    }

    #[test]
    fn test_hints_recorded_once() {
        let store = ProgressStore::open_in_memory().unwrap();
        let ex = exercise("Hints");
        store.record_hint_shown(&ex, 0).unwrap();
        store.record_hint_shown(&ex, 0).unwrap();
        store.record_hint_shown(&ex, 1).unwrap();
        assert_eq!(store.hints_shown_count(&ex).unwrap(), 2);
        assert_eq!(store.record(&ex).unwrap().hints_shown, vec![0, 1]);
    }

    #[test]
    fn test_reset_exercise_clears_everything() {
        let store = ProgressStore::open_in_memory().unwrap();
        let ex = exercise("Reset");
        let other = exercise("Other");
        store.record_attempt(&ex, &outcome(true)).unwrap();
        store.record_hint_shown(&ex, 0).unwrap();
        store.mark_skipped(&other).unwrap();

        store.reset(Some(&ex)).unwrap();
        let record = store.record(&ex).unwrap();
        assert_eq!(record.status, ExerciseStatus::Pending);
        assert_eq!(record.attempts, 0);
        assert!(record.first_passed_at.is_none());
        assert!(record.hints_shown.is_empty());
        assert!(store.attempt_log(&ex).unwrap().is_empty());
        assert_eq!(store.status(&other).unwrap(), ExerciseStatus::Skipped);
    }

    #[test]
    fn test_reset_unknown_exercise() {
        let store = ProgressStore::open_in_memory().unwrap();
        let err = store.reset_exercise(&exercise("Nope")).unwrap_err();
        assert!(matches!(err, Error::ExerciseNotFound(name) if name == "Nope"));
    }

    #[test]
    fn test_reset_all_truncates() {
        let store = ProgressStore::open_in_memory().unwrap();
        let ex = exercise("A");
        store.record_attempt(&ex, &outcome(false)).unwrap();
        store.record_hint_shown(&ex, 0).unwrap();
        store.reset(None).unwrap();
        assert!(store.all_statuses().unwrap().is_empty());
        assert_eq!(store.hints_shown_count(&ex).unwrap(), 0);
    }

    #[test]
    fn test_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("progress.db");
        let ex = exercise("Durable");
        ProgressStore::open(&db).unwrap().record_attempt(&ex, &outcome(true)).unwrap();

        let reopened = ProgressStore::open(&db).unwrap();
        assert_eq!(reopened.status(&ex).unwrap(), ExerciseStatus::Passed);
        assert_eq!(reopened.attempts(&ex).unwrap(), 1);
    }
}
