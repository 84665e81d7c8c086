//! Core event types flowing through the detection pipeline
//!
//! A raw log line becomes a [`ParsedLogEntry`], a classifier turns it into a
//! [`ClassifiedCandidate`], and the false-positive reducer decides whether the
//! candidate graduates into a published [`NotificationEvent`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Closed set of structured-record tags understood by the parser.
///
/// Unknown future tags are dropped at parse time, never fatal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineType {
    CommandStart,
    CommandEnd,
    Output,
    AiResponse,
    TaskComplete,
    Build,
    Test,
    /// OSC 9 / OSC 777 terminal notification embedded in a line
    TerminalNotification,
}

impl LineType {
    /// Map a wire tag to a line type. Returns `None` for unrecognized tags.
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "CMD_START" => Some(Self::CommandStart),
            "CMD_END" => Some(Self::CommandEnd),
            "OUTPUT" => Some(Self::Output),
            "AI_RESPONSE" => Some(Self::AiResponse),
            "TASK_COMPLETE" => Some(Self::TaskComplete),
            "BUILD" => Some(Self::Build),
            "TEST" => Some(Self::Test),
            _ => None,
        }
    }

    /// Wire tag for this line type. Terminal notifications have no tag on the
    /// wire; they re-serialize under a synthetic one.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::CommandStart => "CMD_START",
            Self::CommandEnd => "CMD_END",
            Self::Output => "OUTPUT",
            Self::AiResponse => "AI_RESPONSE",
            Self::TaskComplete => "TASK_COMPLETE",
            Self::Build => "BUILD",
            Self::Test => "TEST",
            Self::TerminalNotification => "TERM_NOTIFY",
        }
    }
}

/// One successfully parsed log line. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedLogEntry {
    pub timestamp: DateTime<Utc>,
    pub line_type: LineType,
    /// Session identifier, present on CMD_START / CMD_END records
    pub session_id: Option<String>,
    /// Command text, present on CMD_START records that carry one
    pub command: Option<String>,
    /// Exit code, present on CMD_END records with an integer payload
    pub exit_code: Option<i32>,
    /// Raw payload after the tag field (for terminal notifications this is
    /// `title|message`)
    pub payload: String,
}

impl ParsedLogEntry {
    /// Re-serialize to the wire format: `timestamp|TAG|payload`.
    pub fn to_wire(&self) -> String {
        format!(
            "{}|{}|{}",
            self.timestamp.to_rfc3339(),
            self.line_type.tag(),
            self.payload
        )
    }
}

/// Semantic event categories produced by the classifier chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventCategory {
    /// AI assistant finished producing output
    AiOutput,
    /// A task or long-running operation completed
    TaskComplete,
    /// Build workflow activity
    Build,
    /// Test workflow activity
    Test,
    /// Matched a user-defined custom rule
    Custom,
}

impl EventCategory {
    /// Human title used for notification events of this category.
    pub fn title(&self) -> &'static str {
        match self {
            Self::AiOutput => "AI response ready",
            Self::TaskComplete => "Task completed",
            Self::Build => "Build finished",
            Self::Test => "Tests finished",
            Self::Custom => "Watched pattern matched",
        }
    }
}

/// A classifier hit: an entry plus the pattern that matched it.
#[derive(Debug, Clone)]
pub struct ClassifiedCandidate {
    pub entry: ParsedLogEntry,
    pub category: EventCategory,
    pub matched_pattern: String,
    pub is_regex_match: bool,
}

/// Terminal artifact of the pipeline, published to collaborators.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationEvent {
    pub id: Uuid,
    pub category: EventCategory,
    pub title: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    /// Heuristic reliability estimate in [0, 1]
    pub confidence: f64,
}

impl NotificationEvent {
    pub fn from_candidate(candidate: &ClassifiedCandidate, confidence: f64) -> Self {
        let (title, message) = match candidate.entry.line_type {
            // Terminal notifications carry their own title|message payload
            LineType::TerminalNotification => {
                match candidate.entry.payload.split_once('|') {
                    Some((title, message)) => (title.to_string(), message.to_string()),
                    None => (
                        candidate.category.title().to_string(),
                        candidate.entry.payload.clone(),
                    ),
                }
            }
            _ => (
                candidate.category.title().to_string(),
                candidate.entry.payload.clone(),
            ),
        };

        Self {
            id: Uuid::new_v4(),
            category: candidate.category,
            title,
            message,
            timestamp: candidate.entry.timestamp,
            confidence,
        }
    }
}
