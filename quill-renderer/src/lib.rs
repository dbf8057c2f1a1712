//! # quill-renderer
//!
//! Tera-based rendering of a [`Note`](quill_core::Note) into the Markdown
//! body of its artifact file.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use quill_core::{Note, Slug};
//! use quill_renderer::{NoteContext, Renderer};
//!
//! fn render(note: &Note, slug: &Slug) {
//!     if let Ok(renderer) = Renderer::new() {
//!         if let Ok(markdown) = renderer.render(&NoteContext::from_note(note, slug)) {
//!             println!("{markdown}");
//!         }
//!     }
//! }
//! ```

pub mod context;
pub mod engine;
pub mod error;

pub use context::NoteContext;
pub use engine::{Renderer, NOTE_TEMPLATE};
pub use error::RenderError;
