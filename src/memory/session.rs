//! Session: an agent working context (spec §3).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Current progressive-disclosure level for a session (spec §4.J, GLOSSARY).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DisclosureLevel {
    #[default]
    Minimal,
    Task,
    Deep,
}

impl DisclosureLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            DisclosureLevel::Minimal => "minimal",
            DisclosureLevel::Task => "task",
            DisclosureLevel::Deep => "deep",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "minimal" => Some(DisclosureLevel::Minimal),
            "task" => Some(DisclosureLevel::Task),
            "deep" => Some(DisclosureLevel::Deep),
            _ => None,
        }
    }

    /// Escalate one level (minimal -> task -> deep -> deep).
    pub fn escalate(self) -> Self {
        match self {
            DisclosureLevel::Minimal => DisclosureLevel::Task,
            DisclosureLevel::Task => DisclosureLevel::Deep,
            DisclosureLevel::Deep => DisclosureLevel::Deep,
        }
    }
}

/// Progressive-disclosure bookkeeping the session carries between pack
/// compiler invocations (spec §3: "progressive-disclosure state").
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct DisclosureState {
    pub injected_memory_ids: Vec<String>,
    pub last_disclosure_at: Option<DateTime<Utc>>,
    pub error_burst_count: u32,
    pub current_level: DisclosureLevel,
    pub last_topic: Option<String>,
}

/// An agent working context (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub working_dir: Option<String>,
    pub working_file: Option<String>,
    pub working_task: Option<String>,
    pub event_count: i64,
    pub objects_created: i64,
    pub objects_accessed: i64,
    pub last_checkpoint_at: Option<DateTime<Utc>>,
    pub events_since_checkpoint: i64,
    pub disclosure: DisclosureState,
}

impl Session {
    pub fn new(id: String) -> Self {
        let now = Utc::now();
        Self {
            id,
            started_at: now,
            ended_at: None,
            working_dir: None,
            working_file: None,
            working_task: None,
            event_count: 0,
            objects_created: 0,
            objects_accessed: 0,
            last_checkpoint_at: None,
            events_since_checkpoint: 0,
            disclosure: DisclosureState::default(),
        }
    }

    /// Invariant: `ended` implies no further events append.
    pub fn is_open(&self) -> bool {
        self.ended_at.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_session_is_open() {
        let s = Session::new("abc".into());
        assert!(s.is_open());
        assert_eq!(s.disclosure.current_level, DisclosureLevel::Minimal);
    }

    #[test]
    fn disclosure_level_escalates_and_caps_at_deep() {
        assert_eq!(DisclosureLevel::Minimal.escalate(), DisclosureLevel::Task);
        assert_eq!(DisclosureLevel::Task.escalate(), DisclosureLevel::Deep);
        assert_eq!(DisclosureLevel::Deep.escalate(), DisclosureLevel::Deep);
    }
}
