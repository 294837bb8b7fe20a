//! Event log + blob pool (spec §4.B).
//!
//! Append-only, content-hashed event records. Large payloads spill into the
//! blob pool and only their id is stored inline on the event row. Events are
//! never mutated or deleted post-append; retention is a collaborator concern.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{AlexandriaError, Result};
use crate::ids::new_id;
use crate::storage::kernel::Storage;

/// Payloads larger than this are written to the blob pool instead of stored
/// inline on the event row (spec §4.B: "recommended ~4 KiB").
pub const BLOB_THRESHOLD_BYTES: usize = 4 * 1024;

/// One of the event kinds named in the spec's glossary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    UserPrompt,
    AssistantResponse,
    ToolCall,
    ToolOutput,
    Turn,
    Diff,
    TestSummary,
    Error,
}

impl EventType {
    pub fn as_str(self) -> &'static str {
        match self {
            EventType::UserPrompt => "user_prompt",
            EventType::AssistantResponse => "assistant_response",
            EventType::ToolCall => "tool_call",
            EventType::ToolOutput => "tool_output",
            EventType::Turn => "turn",
            EventType::Diff => "diff",
            EventType::TestSummary => "test_summary",
            EventType::Error => "error",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        Ok(match s {
            "user_prompt" => EventType::UserPrompt,
            "assistant_response" => EventType::AssistantResponse,
            "tool_call" => EventType::ToolCall,
            "tool_output" => EventType::ToolOutput,
            "turn" => EventType::Turn,
            "diff" => EventType::Diff,
            "test_summary" => EventType::TestSummary,
            "error" => EventType::Error,
            other => {
                return Err(AlexandriaError::InvalidEnum {
                    field: "eventType",
                    value: other.to_string(),
                })
            }
        })
    }
}

/// Caller-supplied fields for [`Storage::append_event`].
#[derive(Debug, Clone, Default)]
pub struct EventInput {
    pub tool_name: Option<String>,
    pub file_path: Option<String>,
    pub exit_code: Option<i32>,
}

/// A logged event, as persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventRecord {
    pub id: String,
    pub session_id: String,
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub content: Option<String>,
    pub blob_id: Option<String>,
    pub tool_name: Option<String>,
    pub file_path: Option<String>,
    pub exit_code: Option<i32>,
    pub content_hash: String,
    pub token_count: i64,
}

/// Stable hash of normalised content bytes (spec §4.B: `contentHash`).
///
/// Normalisation trims surrounding whitespace and collapses line endings so
/// that cosmetically-identical payloads dedup against each other.
pub fn content_hash(content: &str) -> String {
    let normalised = content.replace("\r\n", "\n");
    let normalised = normalised.trim();
    let mut hasher = Sha256::new();
    hasher.update(normalised.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Estimate token count for budgeting purposes (spec §4.B: `ceil(chars/4)`).
pub fn estimate_tokens(content: &str) -> i64 {
    let chars = content.chars().count() as i64;
    (chars + 3) / 4
}

impl Storage {
    /// Append an event to the log. Content longer than
    /// [`BLOB_THRESHOLD_BYTES`] is spilled into the blob pool and only its id
    /// stored inline, per spec §4.B.
    ///
    /// Fails if the session is not open (spec §3: "ended implies no further
    /// events append").
    pub fn append_event(
        &self,
        session_id: &str,
        event_type: EventType,
        content: &str,
        meta: EventInput,
    ) -> Result<EventRecord> {
        let hash = content_hash(content);
        let token_count = estimate_tokens(content);
        let now = Utc::now();
        let id = new_id();

        let (inline_content, blob_id) = if content.len() > BLOB_THRESHOLD_BYTES {
            let blob_id = new_id();
            (None, Some(blob_id))
        } else {
            (Some(content.to_string()), None)
        };

        self.in_transaction(|conn| {
            let open: i64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM sessions WHERE id = ?1 AND ended_at IS NULL",
                    params![session_id],
                    |r| r.get(0),
                )
                .map_err(AlexandriaError::from)?;
            if open == 0 {
                return Err(AlexandriaError::InvalidContent(format!(
                    "session {session_id} is not open; cannot append events"
                )));
            }

            if let Some(blob_id) = &blob_id {
                conn.execute(
                    "INSERT INTO blobs (id, content, byte_length, created_at) VALUES (?1, ?2, ?3, ?4)",
                    params![blob_id, content.as_bytes(), content.len() as i64, now.to_rfc3339()],
                )?;
            }

            conn.execute(
                "INSERT INTO events (
                    id, session_id, timestamp, event_type, content, blob_id,
                    tool_name, file_path, exit_code, content_hash, token_count
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    id,
                    session_id,
                    now.to_rfc3339(),
                    event_type.as_str(),
                    inline_content,
                    blob_id,
                    meta.tool_name,
                    meta.file_path,
                    meta.exit_code,
                    hash,
                    token_count,
                ],
            )?;

            conn.execute(
                "UPDATE sessions SET event_count = event_count + 1,
                     events_since_checkpoint = events_since_checkpoint + 1
                 WHERE id = ?1",
                params![session_id],
            )?;

            Ok(())
        })?;

        Ok(EventRecord {
            id,
            session_id: session_id.to_string(),
            timestamp: now,
            event_type: event_type.as_str().to_string(),
            content: Some(content.to_string()),
            blob_id,
            tool_name: meta.tool_name,
            file_path: meta.file_path,
            exit_code: meta.exit_code,
            content_hash: hash,
            token_count,
        })
    }

    /// Events for a session, ordered by timestamp ascending.
    pub fn events_for_session(&self, session_id: &str) -> Result<Vec<EventRecord>> {
        self.with_reader(|conn| {
            let mut stmt = conn.prepare(
                "SELECT e.id, e.session_id, e.timestamp, e.event_type, e.content, e.blob_id,
                        e.tool_name, e.file_path, e.exit_code, e.content_hash, e.token_count,
                        b.content AS blob_content
                 FROM events e LEFT JOIN blobs b ON b.id = e.blob_id
                 WHERE e.session_id = ?1
                 ORDER BY e.timestamp ASC",
            )?;
            let rows = stmt
                .query_map(params![session_id], row_to_event)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
    }

    /// Events of a given type for a session, ordered by timestamp ascending.
    pub fn events_by_type(&self, session_id: &str, event_type: EventType) -> Result<Vec<EventRecord>> {
        self.with_reader(|conn| {
            let mut stmt = conn.prepare(
                "SELECT e.id, e.session_id, e.timestamp, e.event_type, e.content, e.blob_id,
                        e.tool_name, e.file_path, e.exit_code, e.content_hash, e.token_count,
                        b.content AS blob_content
                 FROM events e LEFT JOIN blobs b ON b.id = e.blob_id
                 WHERE e.session_id = ?1 AND e.event_type = ?2
                 ORDER BY e.timestamp ASC",
            )?;
            let rows = stmt
                .query_map(params![session_id, event_type.as_str()], row_to_event)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
    }

    /// Total event count for a session.
    pub fn event_count(&self, session_id: &str) -> Result<i64> {
        self.with_reader(|conn| {
            let count = conn.query_row(
                "SELECT COUNT(*) FROM events WHERE session_id = ?1",
                params![session_id],
                |r| r.get(0),
            )?;
            Ok(count)
        })
    }

    /// Whether an event with this content hash has already been appended in
    /// the session (spec §4.B dedup-by-hash; detectable, not forbidden).
    pub fn event_exists_by_hash(&self, session_id: &str, hash: &str) -> Result<bool> {
        self.with_reader(|conn| {
            let exists: Option<i64> = conn
                .query_row(
                    "SELECT 1 FROM events WHERE session_id = ?1 AND content_hash = ?2 LIMIT 1",
                    params![session_id, hash],
                    |r| r.get(0),
                )
                .optional()?;
            Ok(exists.is_some())
        })
    }
}

fn row_to_event(row: &rusqlite::Row) -> rusqlite::Result<EventRecord> {
    let timestamp: String = row.get("timestamp")?;
    let inline_content: Option<String> = row.get("content")?;
    let blob_content: Option<Vec<u8>> = row.get("blob_content")?;

    let content = inline_content.or_else(|| blob_content.map(|b| String::from_utf8_lossy(&b).into_owned()));

    Ok(EventRecord {
        id: row.get("id")?,
        session_id: row.get("session_id")?,
        timestamp: DateTime::parse_from_rfc3339(&timestamp)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
        event_type: row.get("event_type")?,
        content,
        blob_id: row.get("blob_id")?,
        tool_name: row.get("tool_name")?,
        file_path: row.get("file_path")?,
        exit_code: row.get("exit_code")?,
        content_hash: row.get("content_hash")?,
        token_count: row.get("token_count")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_inline_event_roundtrips() {
        let storage = Storage::open_in_memory().unwrap();
        let session = storage.start_session(None).unwrap();
        let event = storage
            .append_event(&session.id, EventType::UserPrompt, "fix the bug", EventInput::default())
            .unwrap();
        assert_eq!(event.content.as_deref(), Some("fix the bug"));
        assert!(event.blob_id.is_none());

        let fetched = storage.events_for_session(&session.id).unwrap();
        assert_eq!(fetched.len(), 1);
        assert_eq!(fetched[0].content.as_deref(), Some("fix the bug"));
    }

    #[test]
    fn large_payload_spills_to_blob_pool() {
        let storage = Storage::open_in_memory().unwrap();
        let session = storage.start_session(None).unwrap();
        let big = "x".repeat(BLOB_THRESHOLD_BYTES + 1);
        let event = storage
            .append_event(&session.id, EventType::ToolOutput, &big, EventInput::default())
            .unwrap();
        assert!(event.blob_id.is_some());

        let fetched = storage.events_for_session(&session.id).unwrap();
        assert_eq!(fetched[0].content.as_deref(), Some(big.as_str()));
    }

    #[test]
    fn append_on_closed_session_fails() {
        let storage = Storage::open_in_memory().unwrap();
        let session = storage.start_session(None).unwrap();
        storage.end_session(&session.id).unwrap();
        let result = storage.append_event(&session.id, EventType::Turn, "hi", EventInput::default());
        assert!(result.is_err());
    }

    #[test]
    fn dedup_by_hash_is_detectable() {
        let storage = Storage::open_in_memory().unwrap();
        let session = storage.start_session(None).unwrap();
        storage
            .append_event(&session.id, EventType::Diff, "same content", EventInput::default())
            .unwrap();
        let hash = content_hash("same content");
        assert!(storage.event_exists_by_hash(&session.id, &hash).unwrap());
        assert!(!storage.event_exists_by_hash(&session.id, "deadbeef").unwrap());
    }

    #[test]
    fn token_count_matches_estimate() {
        let content = "a".repeat(40);
        assert_eq!(estimate_tokens(&content), 10);
    }

    #[test]
    fn event_type_roundtrips() {
        for t in [
            EventType::UserPrompt,
            EventType::AssistantResponse,
            EventType::ToolCall,
            EventType::ToolOutput,
            EventType::Turn,
            EventType::Diff,
            EventType::TestSummary,
            EventType::Error,
        ] {
            assert_eq!(EventType::parse(t.as_str()).unwrap().as_str(), t.as_str());
        }
    }
}
