//! Slug generator: filesystem-safe identifier from free text.
//!
//! 1. Drop every character that is not an ASCII word character, whitespace
//!    or `-`.
//! 2. Lowercase.
//! 3. Split on whitespace, keep the first [`MAX_TOKENS`] tokens.
//! 4. Join with `_`; nothing left → [`FALLBACK_SLUG`].
//! 5. Cut to [`MAX_SLUG_BYTES`], leaving room under the 255-byte file-name
//!    limit for a collision suffix and the `.md.quill.tmp` staging name.

use std::sync::LazyLock;

use regex::Regex;

use quill_core::Slug;

/// Tokens of source text kept in a slug.
pub const MAX_TOKENS: usize = 5;

/// Longest slug, in bytes.
pub const MAX_SLUG_BYTES: usize = 100;

/// Slug used when the text has no usable tokens.
pub const FALLBACK_SLUG: &str = "idea";

static STRIP: LazyLock<Regex> = LazyLock::new(|| {
    // ASCII-only word class keeps file names portable across filesystems.
    Regex::new(r"[^A-Za-z0-9_\s-]").expect("static slug pattern compiles")
});

/// Derive a [`Slug`] from `text`. Total over all inputs, deterministic.
pub fn slugify(text: &str) -> Slug {
    let stripped = STRIP.replace_all(text, "");
    let lowered = stripped.to_ascii_lowercase();
    let tokens: Vec<&str> = lowered.split_whitespace().take(MAX_TOKENS).collect();
    if tokens.is_empty() {
        return Slug(FALLBACK_SLUG.to_string());
    }
    let mut slug = tokens.join("_");
    // ASCII only after STRIP, so every byte index is a char boundary.
    slug.truncate(MAX_SLUG_BYTES);
    Slug(slug)
}
