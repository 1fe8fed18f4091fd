//! Transcript entry model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Sender role of a transcript entry.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TranscriptRole {
    /// Text the local user submitted.
    User,
    /// Text streamed back by the conversational backend.
    Agent,
}

impl TranscriptRole {
    /// Stable string form.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Agent => "agent",
        }
    }
}

impl fmt::Display for TranscriptRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for TranscriptRole {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "user" => Ok(Self::User),
            "agent" => Ok(Self::Agent),
            _ => Err(value.to_string()),
        }
    }
}

/// One entry of the transcript.
///
/// Fields are read-only outside the store; content only grows while the
/// entry is open and never changes once it is finalized.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct TranscriptEntry {
    role: TranscriptRole,
    content: String,
    finalized: bool,
    created_at: DateTime<Utc>,
}

impl TranscriptEntry {
    pub(crate) fn user(content: impl Into<String>) -> Self {
        Self::new(TranscriptRole::User, content.into(), true)
    }

    pub(crate) fn open_agent(content: impl Into<String>) -> Self {
        Self::new(TranscriptRole::Agent, content.into(), false)
    }

    pub(crate) fn finalized_agent(content: impl Into<String>) -> Self {
        Self::new(TranscriptRole::Agent, content.into(), true)
    }

    fn new(role: TranscriptRole, content: String, finalized: bool) -> Self {
        Self {
            role,
            content,
            finalized,
            created_at: Utc::now(),
        }
    }

    /// Sender role.
    #[must_use]
    pub const fn role(&self) -> TranscriptRole {
        self.role
    }

    /// Text accumulated so far.
    #[must_use]
    pub fn content(&self) -> &str {
        &self.content
    }

    /// Whether the entry no longer accepts fragments.
    #[must_use]
    pub const fn is_finalized(&self) -> bool {
        self.finalized
    }

    /// When the entry was created.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub(crate) fn push_str(&mut self, text: &str) {
        debug_assert!(!self.finalized, "finalized entries are immutable");
        self.content.push_str(text);
    }

    pub(crate) const fn finalize(&mut self) {
        self.finalized = true;
    }
}
