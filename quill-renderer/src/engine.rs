//! Tera rendering engine for note artifacts.
//!
//! The built-in layout matches what the bot has always written:
//!
//! ```text
//! # <first 60 chars>
//!
//! *🕒 <YYYY-MM-DD HH:MM>*
//!
//! <full text>
//! ```
//!
//! A `note.md.tera` inside a user template directory replaces it.

use std::path::{Path, PathBuf};

use tera::Tera;

use crate::context::NoteContext;
use crate::error::RenderError;

/// Template name registered with Tera (and looked up in a user directory).
pub const NOTE_TEMPLATE: &str = "note.md.tera";

const DEFAULT_NOTE_TEMPLATE: &str = "# {{ heading }}\n\n*🕒 {{ timestamp }}*\n\n{{ body }}";

fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> RenderError {
    RenderError::Io { path: path.into(), source }
}

fn load_user_template(dir: &Path) -> Result<Option<String>, RenderError> {
    let path = dir.join(NOTE_TEMPLATE);
    if !path.is_file() {
        return Ok(None);
    }
    let contents = std::fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
    Ok(Some(contents))
}

fn build_tera(user_template_dir: Option<&Path>) -> Result<Tera, RenderError> {
    let template = match user_template_dir {
        Some(dir) => load_user_template(dir)?.unwrap_or_else(|| DEFAULT_NOTE_TEMPLATE.to_string()),
        None => DEFAULT_NOTE_TEMPLATE.to_string(),
    };

    let mut tera = Tera::default();
    // Markdown output: never HTML-escape note text.
    tera.autoescape_on(vec![]);
    tera.add_raw_template(NOTE_TEMPLATE, &template)?;
    Ok(tera)
}

// ---------------------------------------------------------------------------
// Renderer
// ---------------------------------------------------------------------------

/// Renders a [`NoteContext`] into artifact Markdown.
///
/// Create once and reuse; templates are parsed at construction.
pub struct Renderer {
    tera: Tera,
}

impl Renderer {
    /// Construct a [`Renderer`] with the embedded template only.
    pub fn new() -> Result<Self, RenderError> {
        Self::with_template_dir(None)
    }

    /// Construct a [`Renderer`], preferring `<dir>/note.md.tera` when present.
    pub fn with_template_dir(user_template_dir: Option<&Path>) -> Result<Self, RenderError> {
        Ok(Renderer {
            tera: build_tera(user_template_dir)?,
        })
    }

    pub fn render(&self, ctx: &NoteContext) -> Result<String, RenderError> {
        let tera_ctx = ctx.to_tera_context()?;
        Ok(self.tera.render(NOTE_TEMPLATE, &tera_ctx)?)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(body: &str) -> NoteContext {
        NoteContext {
            heading: crate::context::heading_of(body),
            timestamp: "2024-03-09 17:45".to_string(),
            body: body.to_string(),
            sender_id: 1,
            slug: "slug".to_string(),
        }
    }

    #[test]
    fn renderer_new_succeeds() {
        Renderer::new().expect("Renderer::new should succeed with embedded template");
    }

    #[test]
    fn default_layout_is_exact() {
        let renderer = Renderer::new().unwrap();
        let out = renderer.render(&ctx("Buy milk")).unwrap();
        assert_eq!(out, "# Buy milk\n\n*🕒 2024-03-09 17:45*\n\nBuy milk");
    }

    #[test]
    fn markup_in_body_is_not_escaped() {
        let renderer = Renderer::new().unwrap();
        let body = "<b>bold</b> & {{ not a tag }}";
        let out = renderer.render(&ctx(body)).unwrap();
        assert!(out.ends_with(body), "got: {out}");
    }

    #[test]
    fn missing_user_template_falls_back_to_default() {
        let dir = tempfile::TempDir::new().unwrap();
        let renderer = Renderer::with_template_dir(Some(dir.path())).unwrap();
        let out = renderer.render(&ctx("fallback")).unwrap();
        assert!(out.starts_with("# fallback\n"));
    }
}
