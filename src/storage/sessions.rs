//! Session CRUD and lifecycle (spec §3).

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};

use crate::error::Result;
use crate::ids::new_id;
use crate::memory::session::{DisclosureLevel, DisclosureState, Session};
use crate::storage::kernel::Storage;

impl Storage {
    /// Start a new session. Called on first ingest if no session is active.
    pub fn start_session(&self, working_dir: Option<String>) -> Result<Session> {
        let session = Session::new(new_id());
        let mut session = session;
        session.working_dir = working_dir;

        self.with_writer(|conn| {
            conn.execute(
                "INSERT INTO sessions (
                    id, started_at, working_dir, working_file, working_task,
                    event_count, objects_created, objects_accessed,
                    last_checkpoint_at, events_since_checkpoint,
                    injected_memory_ids, last_disclosure_at, error_burst_count,
                    current_disclosure_level, last_topic
                ) VALUES (?1, ?2, ?3, NULL, NULL, 0, 0, 0, NULL, 0, '[]', NULL, 0, 'minimal', NULL)",
                params![session.id, session.started_at.to_rfc3339(), session.working_dir],
            )?;
            Ok(())
        })?;

        Ok(session)
    }

    /// Fetch a session by id.
    pub fn get_session(&self, id: &str) -> Result<Option<Session>> {
        self.with_reader(|conn| {
            let row = conn
                .query_row("SELECT * FROM sessions WHERE id = ?1", params![id], row_to_session)
                .optional()?;
            Ok(row)
        })
    }

    /// End a session. Invariant: once ended, no further events may append.
    pub fn end_session(&self, id: &str) -> Result<()> {
        self.with_writer(|conn| {
            conn.execute(
                "UPDATE sessions SET ended_at = ?2 WHERE id = ?1 AND ended_at IS NULL",
                params![id, Utc::now().to_rfc3339()],
            )?;
            Ok(())
        })
    }

    /// Bump the event counters after an append, and report whether a
    /// checkpoint/disclosure escalation trigger should fire (left to the
    /// caller — the store only tracks the counters here).
    pub fn record_event_on_session(&self, id: &str) -> Result<()> {
        self.with_writer(|conn| {
            conn.execute(
                "UPDATE sessions SET event_count = event_count + 1,
                     events_since_checkpoint = events_since_checkpoint + 1
                 WHERE id = ?1",
                params![id],
            )?;
            Ok(())
        })
    }

    /// Reset the checkpoint counter and stamp the checkpoint time.
    pub fn checkpoint_session(&self, id: &str) -> Result<()> {
        self.with_writer(|conn| {
            conn.execute(
                "UPDATE sessions SET events_since_checkpoint = 0, last_checkpoint_at = ?2 WHERE id = ?1",
                params![id, Utc::now().to_rfc3339()],
            )?;
            Ok(())
        })
    }

    /// Most recently ended session other than `exclude_id`, if any (spec
    /// §4.J: "previousSession block").
    pub fn previous_session(&self, exclude_id: &str) -> Result<Option<Session>> {
        self.with_reader(|conn| {
            let row = conn
                .query_row(
                    "SELECT * FROM sessions WHERE id != ?1 AND ended_at IS NOT NULL
                     ORDER BY ended_at DESC LIMIT 1",
                    params![exclude_id],
                    row_to_session,
                )
                .optional()?;
            Ok(row)
        })
    }

    /// Update the session's progressive-disclosure bookkeeping.
    pub fn update_disclosure_state(&self, id: &str, state: &DisclosureState) -> Result<()> {
        let injected = serde_json::to_string(&state.injected_memory_ids).unwrap_or_else(|_| "[]".into());
        self.with_writer(|conn| {
            conn.execute(
                "UPDATE sessions SET
                     injected_memory_ids = ?2,
                     last_disclosure_at = ?3,
                     error_burst_count = ?4,
                     current_disclosure_level = ?5,
                     last_topic = ?6
                 WHERE id = ?1",
                params![
                    id,
                    injected,
                    state.last_disclosure_at.map(|t| t.to_rfc3339()),
                    state.error_burst_count,
                    state.current_level.as_str(),
                    state.last_topic,
                ],
            )?;
            Ok(())
        })
    }
}

fn row_to_session(row: &rusqlite::Row) -> rusqlite::Result<Session> {
    let started_at: String = row.get("started_at")?;
    let ended_at: Option<String> = row.get("ended_at")?;
    let last_checkpoint_at: Option<String> = row.get("last_checkpoint_at")?;
    let last_disclosure_at: Option<String> = row.get("last_disclosure_at")?;
    let injected_json: String = row.get("injected_memory_ids")?;
    let level: String = row.get("current_disclosure_level")?;

    Ok(Session {
        id: row.get("id")?,
        started_at: parse_dt(&started_at),
        ended_at: ended_at.map(|s| parse_dt(&s)),
        working_dir: row.get("working_dir")?,
        working_file: row.get("working_file")?,
        working_task: row.get("working_task")?,
        event_count: row.get("event_count")?,
        objects_created: row.get("objects_created")?,
        objects_accessed: row.get("objects_accessed")?,
        last_checkpoint_at: last_checkpoint_at.map(|s| parse_dt(&s)),
        events_since_checkpoint: row.get("events_since_checkpoint")?,
        disclosure: DisclosureState {
            injected_memory_ids: serde_json::from_str(&injected_json).unwrap_or_default(),
            last_disclosure_at: last_disclosure_at.map(|s| parse_dt(&s)),
            error_burst_count: row.get("error_burst_count")?,
            current_level: DisclosureLevel::parse(&level).unwrap_or_default(),
            last_topic: row.get("last_topic")?,
        },
    })
}

fn parse_dt(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_and_fetch_session() {
        let storage = Storage::open_in_memory().unwrap();
        let session = storage.start_session(Some("/tmp/proj".into())).unwrap();
        let fetched = storage.get_session(&session.id).unwrap().unwrap();
        assert_eq!(fetched.working_dir.as_deref(), Some("/tmp/proj"));
        assert!(fetched.is_open());
    }

    #[test]
    fn end_session_sets_ended_at() {
        let storage = Storage::open_in_memory().unwrap();
        let session = storage.start_session(None).unwrap();
        storage.end_session(&session.id).unwrap();
        let fetched = storage.get_session(&session.id).unwrap().unwrap();
        assert!(!fetched.is_open());
    }

    #[test]
    fn record_event_increments_counters() {
        let storage = Storage::open_in_memory().unwrap();
        let session = storage.start_session(None).unwrap();
        storage.record_event_on_session(&session.id).unwrap();
        storage.record_event_on_session(&session.id).unwrap();
        let fetched = storage.get_session(&session.id).unwrap().unwrap();
        assert_eq!(fetched.event_count, 2);
        assert_eq!(fetched.events_since_checkpoint, 2);
    }

    #[test]
    fn previous_session_excludes_self_and_open_sessions() {
        let storage = Storage::open_in_memory().unwrap();
        let first = storage.start_session(None).unwrap();
        storage.end_session(&first.id).unwrap();
        let second = storage.start_session(None).unwrap();

        let previous = storage.previous_session(&second.id).unwrap();
        assert_eq!(previous.unwrap().id, first.id);
        assert!(storage.previous_session(&first.id).unwrap().is_none());
    }

    #[test]
    fn checkpoint_resets_counter() {
        let storage = Storage::open_in_memory().unwrap();
        let session = storage.start_session(None).unwrap();
        storage.record_event_on_session(&session.id).unwrap();
        storage.checkpoint_session(&session.id).unwrap();
        let fetched = storage.get_session(&session.id).unwrap().unwrap();
        assert_eq!(fetched.events_since_checkpoint, 0);
        assert!(fetched.last_checkpoint_at.is_some());
    }
}
