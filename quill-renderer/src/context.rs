//! Template context: serializable rendering payload built from a [`Note`].

use chrono::Local;
use serde::{Deserialize, Serialize};

use quill_core::types::{Note, Slug};

use crate::error::RenderError;

/// Characters of note text kept in the level-1 heading.
pub const HEADING_CHARS: usize = 60;

/// `strftime` layout of the timestamp line (local time).
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M";

/// Values exposed to `note.md.tera`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteContext {
    /// First [`HEADING_CHARS`] characters of the note, on one line.
    pub heading: String,
    /// Receive time rendered in the local timezone.
    pub timestamp: String,
    /// Full note text, verbatim.
    pub body: String,
    pub sender_id: i64,
    pub slug: String,
}

impl NoteContext {
    pub fn from_note(note: &Note, slug: &Slug) -> Self {
        Self {
            heading: heading_of(&note.raw_text),
            timestamp: note
                .received_at
                .with_timezone(&Local)
                .format(TIMESTAMP_FORMAT)
                .to_string(),
            body: note.raw_text.clone(),
            sender_id: note.sender_id.0,
            slug: slug.0.clone(),
        }
    }

    pub fn to_tera_context(&self) -> Result<tera::Context, RenderError> {
        tera::Context::from_serialize(self).map_err(RenderError::from)
    }
}

/// Truncate to [`HEADING_CHARS`] characters (not bytes); line breaks become
/// spaces so the heading stays a single Markdown line.
pub fn heading_of(text: &str) -> String {
    text.chars()
        .take(HEADING_CHARS)
        .map(|c| if c == '\n' || c == '\r' { ' ' } else { c })
        .collect()
}
