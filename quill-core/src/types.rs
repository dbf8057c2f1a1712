//! Domain types for the quill intake pipeline.
//!
//! All path fields use `PathBuf`; never `&str` or `String` for filesystem paths.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// Identifier of the chat user who sent a note.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SenderId(pub i64);

impl fmt::Display for SenderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<i64> for SenderId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

/// Filesystem-safe identifier derived from a note's text.
///
/// Construct through `quill_sync::slug::slugify`; the inner string is
/// guaranteed non-empty and restricted to `[a-z0-9_-]` by that function.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Slug(pub String);

impl Slug {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `<slug>.md`
    pub fn file_name(&self) -> String {
        format!("{}.md", self.0)
    }
}

impl fmt::Display for Slug {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for Slug {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

// ---------------------------------------------------------------------------
// Note
// ---------------------------------------------------------------------------

/// One inbound text message, immutable for the duration of a pipeline run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    pub raw_text: String,
    pub received_at: DateTime<Utc>,
    pub sender_id: SenderId,
}

impl Note {
    /// Build a note as it arrives from a transport: surrounding whitespace is
    /// stripped and the receive time is stamped now.
    pub fn received(text: &str, sender_id: impl Into<SenderId>) -> Self {
        Self::received_at(text, sender_id, Utc::now())
    }

    pub fn received_at(
        text: &str,
        sender_id: impl Into<SenderId>,
        received_at: DateTime<Utc>,
    ) -> Self {
        Self {
            raw_text: text.trim().to_owned(),
            received_at,
            sender_id: sender_id.into(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.raw_text.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Sync outcome
// ---------------------------------------------------------------------------

/// Stage of a sync attempt; also names where a failed attempt stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStage {
    Clone,
    Add,
    Commit,
    PullRebase,
    Push,
}

impl fmt::Display for SyncStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncStage::Clone => write!(f, "clone"),
            SyncStage::Add => write!(f, "add"),
            SyncStage::Commit => write!(f, "commit"),
            SyncStage::PullRebase => write!(f, "pull --rebase"),
            SyncStage::Push => write!(f, "push"),
        }
    }
}

/// Prefix of [`SyncResult::detail`] when the commit stage found an empty
/// change set.
pub const NOTHING_TO_COMMIT: &str = "nothing to commit";

/// Outcome of one sync attempt.
///
/// `stage` is the last stage reached: `Push` on success, the failing stage
/// otherwise.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncResult {
    pub ok: bool,
    pub stage: SyncStage,
    pub detail: String,
}

impl SyncResult {
    pub fn success(detail: impl Into<String>) -> Self {
        Self {
            ok: true,
            stage: SyncStage::Push,
            detail: detail.into(),
        }
    }

    pub fn failure(stage: SyncStage, detail: impl Into<String>) -> Self {
        Self {
            ok: false,
            stage,
            detail: detail.into(),
        }
    }

    /// Empty change set at the commit stage: `file_name` is already recorded.
    pub fn nothing_to_commit(file_name: &str) -> Self {
        Self::failure(SyncStage::Commit, format!("{NOTHING_TO_COMMIT}: {file_name}"))
    }

    /// True when this failure only means the artifact was committed before.
    ///
    /// Callers treat it as an already-synced signal rather than an error.
    pub fn is_already_synced(&self) -> bool {
        !self.ok && self.stage == SyncStage::Commit && self.detail.starts_with(NOTHING_TO_COMMIT)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
