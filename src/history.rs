use chrono::{DateTime, Local, SecondsFormat, Utc};
use rusqlite::{params, Connection, Result, Row};
use serde::Serialize;
use std::io::Write;
use std::path::Path;

use crate::session::{ExamSession, SubmitReason};

/// One submitted attempt, as stored in the history database
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttemptRecord {
    pub exam_id: String,
    pub exam_title: String,
    pub user_email: Option<String>,
    pub score_percent: u8,
    pub correct_count: usize,
    pub total_questions: usize,
    pub passed: bool,
    pub submitted_by: SubmitReason,
    pub time_used_secs: u64,
    pub finished_at: DateTime<Local>,
}

impl AttemptRecord {
    /// Builds a record from a submitted session; `None` while still in progress.
    pub fn from_session(session: &ExamSession, user_email: Option<&str>) -> Option<Self> {
        let result = session.result()?;
        Some(Self {
            exam_id: session.exam().id.clone(),
            exam_title: session.exam().title.clone(),
            user_email: user_email.map(str::to_string),
            score_percent: result.score_percent,
            correct_count: result.correct_count,
            total_questions: result.total_questions,
            passed: result.passed,
            submitted_by: session.submitted_by().unwrap_or(SubmitReason::Manual),
            time_used_secs: session.elapsed_seconds(),
            finished_at: Local::now(),
        })
    }
}

/// Per-exam aggregate over all recorded attempts
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExamHistorySummary {
    pub exam_id: String,
    pub exam_title: String,
    pub attempts: i64,
    pub best_score: u8,
    pub average_score: f64,
    pub passes: i64,
}

/// Database manager for attempt history
#[derive(Debug)]
pub struct AttemptLog {
    conn: Connection,
}

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS attempts (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        exam_id TEXT NOT NULL,
        exam_title TEXT NOT NULL,
        user_email TEXT,
        score_percent INTEGER NOT NULL,
        correct_count INTEGER NOT NULL,
        total_questions INTEGER NOT NULL,
        passed BOOLEAN NOT NULL,
        submitted_by TEXT NOT NULL,
        time_used_secs INTEGER NOT NULL,
        -- RFC 3339 in UTC so text order is time order
        finished_at TEXT NOT NULL,
        created_at DATETIME DEFAULT CURRENT_TIMESTAMP
    );
    CREATE INDEX IF NOT EXISTS idx_attempts_exam ON attempts(exam_id);
    CREATE INDEX IF NOT EXISTS idx_attempts_finished ON attempts(finished_at);
"#;

const SELECT_COLUMNS: &str = "exam_id, exam_title, user_email, score_percent, correct_count, \
     total_questions, passed, submitted_by, time_used_secs, finished_at";

impl AttemptLog {
    /// Open (creating if needed) the database at `path`
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
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

    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(AttemptLog { conn })
    }

    pub fn record(&self, attempt: &AttemptRecord) -> Result<()> {
        self.conn.execute(
            r#"
            INSERT INTO attempts
            (exam_id, exam_title, user_email, score_percent, correct_count,
             total_questions, passed, submitted_by, time_used_secs, finished_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
            params![
                attempt.exam_id,
                attempt.exam_title,
                attempt.user_email,
                attempt.score_percent,
                attempt.correct_count as i64,
                attempt.total_questions as i64,
                attempt.passed,
                attempt.submitted_by.to_string(),
                attempt.time_used_secs as i64,
                attempt
                    .finished_at
                    .with_timezone(&Utc)
                    .to_rfc3339_opts(SecondsFormat::Micros, true),
            ],
        )?;
        tracing::debug!(exam_id = %attempt.exam_id, score = attempt.score_percent, "attempt recorded");
        Ok(())
    }

    /// Most recent attempts first
    pub fn recent(&self, limit: usize) -> Result<Vec<AttemptRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {SELECT_COLUMNS} FROM attempts ORDER BY finished_at DESC, id DESC LIMIT ?1"
        ))?;
        let rows = stmt.query_map([limit as i64], row_to_record)?;
        rows.collect()
    }

    pub fn for_exam(&self, exam_id: &str, limit: usize) -> Result<Vec<AttemptRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {SELECT_COLUMNS} FROM attempts WHERE exam_id = ?1 \
             ORDER BY finished_at DESC, id DESC LIMIT ?2"
        ))?;
        let rows = stmt.query_map(params![exam_id, limit as i64], row_to_record)?;
        rows.collect()
    }

    pub fn summary_by_exam(&self) -> Result<Vec<ExamHistorySummary>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT
                exam_id,
                MAX(exam_title),
                COUNT(*),
                MAX(score_percent),
                AVG(score_percent),
                SUM(CASE WHEN passed = 1 THEN 1 ELSE 0 END)
            FROM attempts
            GROUP BY exam_id
            ORDER BY exam_id
            "#,
        )?;

        let summary_iter = stmt.query_map([], |row| {
            Ok(ExamHistorySummary {
                exam_id: row.get(0)?,
                exam_title: row.get(1)?,
                attempts: row.get(2)?,
                best_score: row.get(3)?,
                average_score: row.get(4)?,
                passes: row.get(5)?,
            })
        })?;

        let mut summary = Vec::new();
        for item in summary_iter {
            summary.push(item?);
        }

        Ok(summary)
    }

    pub fn count(&self) -> Result<i64> {
        self.conn
            .query_row("SELECT COUNT(*) FROM attempts", [], |row| row.get(0))
    }

    /// Clear all history (for testing or reset purposes)
    pub fn clear(&self) -> Result<()> {
        self.conn.execute("DELETE FROM attempts", [])?;
        Ok(())
    }
}

fn row_to_record(row: &Row) -> Result<AttemptRecord> {
    let finished_str: String = row.get(9)?;
    let finished_at = DateTime::parse_from_rfc3339(&finished_str)
        .map_err(|_| {
            rusqlite::Error::InvalidColumnType(9, "finished_at".to_string(), rusqlite::types::Type::Text)
        })?
        .with_timezone(&Local);
    let submitted_by = row
        .get::<_, String>(7)?
        .parse::<SubmitReason>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(7, rusqlite::types::Type::Text, Box::new(e)))?;

    Ok(AttemptRecord {
        exam_id: row.get(0)?,
        exam_title: row.get(1)?,
        user_email: row.get(2)?,
        score_percent: row.get(3)?,
        correct_count: row.get::<_, i64>(4)? as usize,
        total_questions: row.get::<_, i64>(5)? as usize,
        passed: row.get(6)?,
        submitted_by,
        time_used_secs: row.get::<_, i64>(8)? as u64,
        finished_at,
    })
}

/// Write attempts as CSV with a header row
pub fn write_csv<W: Write>(records: &[AttemptRecord], writer: W) -> std::result::Result<(), csv::Error> {
    let mut wtr = csv::Writer::from_writer(writer);
    wtr.write_record([
        "finished_at",
        "exam_id",
        "exam_title",
        "user_email",
        "score_percent",
        "correct_count",
        "total_questions",
        "passed",
        "submitted_by",
        "time_used_secs",
    ])?;
    for r in records {
        wtr.write_record([
            r.finished_at.format("%Y-%m-%d %H:%M:%S").to_string(),
            r.exam_id.clone(),
            r.exam_title.clone(),
            r.user_email.clone().unwrap_or_default(),
            r.score_percent.to_string(),
            r.correct_count.to_string(),
            r.total_questions.to_string(),
            r.passed.to_string(),
            r.submitted_by.to_string(),
            r.time_used_secs.to_string(),
        ])?;
    }
    wtr.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exam::fixtures::exam;
    use chrono::Duration;
    use std::sync::Arc;

    fn attempt(exam_id: &str, score: u8, minutes_ago: i64) -> AttemptRecord {
        AttemptRecord {
            exam_id: exam_id.to_string(),
            exam_title: format!("{exam_id} title"),
            user_email: Some("s@x.io".to_string()),
            score_percent: score,
            correct_count: score as usize / 20,
            total_questions: 5,
            passed: score >= 70,
            submitted_by: SubmitReason::Manual,
            time_used_secs: 120,
            finished_at: Local::now() - Duration::minutes(minutes_ago),
        }
    }

    #[test]
    fn test_record_and_recent_order() {
        let log = AttemptLog::open_in_memory().unwrap();
        log.record(&attempt("math", 60, 30)).unwrap();
        log.record(&attempt("math", 80, 10)).unwrap();
        log.record(&attempt("english", 100, 20)).unwrap();

        let recent = log.recent(10).unwrap();

        let scores: Vec<u8> = recent.iter().map(|r| r.score_percent).collect();
        assert_eq!(scores, vec![80, 100, 60]);
        assert_eq!(log.recent(1).unwrap().len(), 1);
        assert_eq!(log.count().unwrap(), 3);
    }

    #[test]
    fn test_recent_order_across_offset_change() {
        let log = AttemptLog::open_in_memory().unwrap();
        let at = |s: &str| DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Local);
        // clocks go back an hour between these two attempts
        let mut before = attempt("math", 60, 0);
        before.finished_at = at("2026-10-25T02:30:00+02:00");
        let mut after = attempt("english", 80, 0);
        after.finished_at = at("2026-10-25T02:10:00+01:00");
        log.record(&after).unwrap();
        log.record(&before).unwrap();

        let ids: Vec<String> = log.recent(10).unwrap().into_iter().map(|r| r.exam_id).collect();
        assert_eq!(ids, vec!["english", "math"]);
    }

    #[test]
    fn test_unknown_submit_reason_is_an_error() {
        let log = AttemptLog::open_in_memory().unwrap();
        log.record(&attempt("math", 60, 0)).unwrap();
        log.conn
            .execute("UPDATE attempts SET submitted_by = 'teleported'", [])
            .unwrap();

        assert!(matches!(
            log.recent(10),
            Err(rusqlite::Error::FromSqlConversionFailure(7, _, _))
        ));
    }

    #[test]
    fn test_round_trip_fields() {
        let log = AttemptLog::open_in_memory().unwrap();
        let mut a = attempt("science", 50, 1);
        a.submitted_by = SubmitReason::TimeExpired;
        a.user_email = None;
        log.record(&a).unwrap();

        let stored = &log.recent(1).unwrap()[0];

        assert_eq!(stored.exam_id, "science");
        assert_eq!(stored.submitted_by, SubmitReason::TimeExpired);
        assert_eq!(stored.user_email, None);
        assert_eq!(stored.time_used_secs, 120);
        assert_eq!(stored.finished_at.timestamp(), a.finished_at.timestamp());
    }

    #[test]
    fn test_for_exam_filters() {
        let log = AttemptLog::open_in_memory().unwrap();
        log.record(&attempt("math", 60, 3)).unwrap();
        log.record(&attempt("english", 100, 2)).unwrap();
        log.record(&attempt("math", 40, 1)).unwrap();

        let math = log.for_exam("math", 10).unwrap();
        assert_eq!(math.len(), 2);
        assert!(math.iter().all(|r| r.exam_id == "math"));
        assert!(log.for_exam("unknown", 10).unwrap().is_empty());
    }

    #[test]
    fn test_summary_by_exam() {
        let log = AttemptLog::open_in_memory().unwrap();
        log.record(&attempt("math", 60, 3)).unwrap();
        log.record(&attempt("math", 80, 2)).unwrap();
        log.record(&attempt("english", 100, 1)).unwrap();

        let summary = log.summary_by_exam().unwrap();

        assert_eq!(summary.len(), 2);
        let math = summary.iter().find(|s| s.exam_id == "math").unwrap();
        assert_eq!(math.attempts, 2);
        assert_eq!(math.best_score, 80);
        assert_eq!(math.average_score, 70.0);
        assert_eq!(math.passes, 1);
    }

    #[test]
    fn test_clear() {
        let log = AttemptLog::open_in_memory().unwrap();
        log.record(&attempt("math", 60, 3)).unwrap();
        log.clear().unwrap();
        assert!(log.recent(10).unwrap().is_empty());
    }

    #[test]
    fn test_open_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("history.db");
        let log = AttemptLog::open(&path).unwrap();
        log.record(&attempt("math", 60, 0)).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_from_session_requires_submission() {
        let mut session = ExamSession::start(Arc::new(exam(2, 30))).unwrap();
        assert!(AttemptRecord::from_session(&session, None).is_none());

        session.tick();
        session.select_answer(0).unwrap();
        session.submit();

        let record = AttemptRecord::from_session(&session, Some("s@x.io")).unwrap();
        assert_eq!(record.exam_id, "fixture");
        assert_eq!(record.correct_count, 1);
        assert_eq!(record.score_percent, 50);
        assert_eq!(record.time_used_secs, 1);
        assert_eq!(record.user_email.as_deref(), Some("s@x.io"));
    }

    #[test]
    fn test_write_csv() {
        let mut out = Vec::new();
        write_csv(&[attempt("math", 80, 0)], &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();

        let mut lines = text.lines();
        assert!(lines.next().unwrap().starts_with("finished_at,exam_id"));
        let row = lines.next().unwrap();
        assert!(row.contains(",math,math title,s@x.io,80,4,5,true,manual,120"));
    }
}
