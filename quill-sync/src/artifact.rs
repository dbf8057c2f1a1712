//! Artifact writer: renders a note and writes `<working_dir>/<slug>.md`.
//!
//! ## Write protocol
//!
//! 1. Create the working directory (idempotent).
//! 2. Render the note through the Tera template.
//! 3. Pick the target name (collision policy).
//! 4. Write to `<path>.quill.tmp`.
//! 5. Rename to the final path; on failure remove the `.tmp`.

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use quill_core::{CollisionPolicy, Config, Note, Slug};
use quill_renderer::{NoteContext, Renderer};

use crate::error::{write_err, PipelineError};

/// Hex characters of the content hash appended on a slug collision.
const SUFFIX_LEN: usize = 8;

/// Renders notes and persists them as Markdown files in one directory.
pub struct ArtifactWriter {
    dir: PathBuf,
    renderer: Renderer,
    collision: CollisionPolicy,
}

impl ArtifactWriter {
    pub fn new(dir: impl Into<PathBuf>, renderer: Renderer, collision: CollisionPolicy) -> Self {
        Self {
            dir: dir.into(),
            renderer,
            collision,
        }
    }

    pub fn from_config(config: &Config) -> Result<Self, PipelineError> {
        let renderer = Renderer::with_template_dir(config.template_dir.as_deref())?;
        Ok(Self::new(&config.working_dir, renderer, config.collision))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write the artifact for `note` and return its full path.
    ///
    /// An existing file of the same name is replaced, unless the policy is
    /// [`CollisionPolicy::Suffix`] and its content differs.
    pub fn write(&self, note: &Note, slug: &Slug) -> Result<PathBuf, PipelineError> {
        std::fs::create_dir_all(&self.dir).map_err(|e| write_err(&self.dir, e))?;

        let content = self.renderer.render(&NoteContext::from_note(note, slug))?;
        let path = self.target_path(slug, &content);

        let tmp = PathBuf::from(format!("{}.quill.tmp", path.display()));
        write_via_tmp(&path, &content, &tmp)?;

        tracing::info!("wrote artifact: {}", path.display());
        Ok(path)
    }

    fn target_path(&self, slug: &Slug, content: &str) -> PathBuf {
        let path = self.dir.join(slug.file_name());
        if self.collision == CollisionPolicy::Overwrite {
            return path;
        }
        match std::fs::read_to_string(&path) {
            Ok(existing) if existing != content => {
                let suffixed = self
                    .dir
                    .join(format!("{}-{}.md", slug, content_suffix(content)));
                tracing::warn!(
                    "slug collision on {}; writing {} instead",
                    path.display(),
                    suffixed.display()
                );
                suffixed
            }
            _ => path,
        }
    }
}

fn content_suffix(content: &str) -> String {
    let digest = {
        let mut h = Sha256::new();
        h.update(content.as_bytes());
        hex::encode(h.finalize())
    };
    digest[..SUFFIX_LEN].to_string()
}

fn write_via_tmp(path: &Path, content: &str, tmp: &Path) -> Result<(), PipelineError> {
    std::fs::write(tmp, content).map_err(|e| write_err(tmp, e))?;
    if let Err(e) = std::fs::rename(tmp, path) {
        let _ = std::fs::remove_file(tmp);
        return Err(write_err(path, e));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    use quill_core::SenderId;

    use crate::slug::slugify;

    fn writer(dir: &Path, collision: CollisionPolicy) -> ArtifactWriter {
        ArtifactWriter::new(dir, Renderer::new().unwrap(), collision)
    }

    fn save(writer: &ArtifactWriter, text: &str) -> PathBuf {
        let note = Note::received(text, SenderId(1));
        writer.write(&note, &slugify(&note.raw_text)).unwrap()
    }

    #[test]
    fn writes_slug_named_markdown() {
        let tmp = TempDir::new().unwrap();
        let path = save(&writer(tmp.path(), CollisionPolicy::Overwrite), "Buy milk today");
        assert_eq!(path, tmp.path().join("buy_milk_today.md"));
        let content = fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("# Buy milk today\n\n*🕒 "));
        assert!(content.ends_with("*\n\nBuy milk today"));
    }

    #[test]
    fn long_text_truncates_heading_only() {
        let tmp = TempDir::new().unwrap();
        let text = "word ".repeat(30).trim().to_string();
        let path = save(&writer(tmp.path(), CollisionPolicy::Overwrite), &text);
        let content = fs::read_to_string(path).unwrap();

        let heading = content.lines().next().unwrap();
        assert_eq!(heading, format!("# {}", &text[..60]));
        assert!(content.ends_with(&text), "body must be verbatim");
    }

    #[test]
    fn creates_missing_directory_and_tolerates_existing() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("nested").join("inbox");
        let w = writer(&dir, CollisionPolicy::Overwrite);
        save(&w, "first");
        save(&w, "second");
        assert!(dir.join("first.md").exists());
        assert!(dir.join("second.md").exists());
    }

    #[test]
    fn tmp_file_removed_after_write() {
        let tmp = TempDir::new().unwrap();
        let path = save(&writer(tmp.path(), CollisionPolicy::Overwrite), "clean up");
        let tmp_path = PathBuf::from(format!("{}.quill.tmp", path.display()));
        assert!(!tmp_path.exists(), ".quill.tmp must be cleaned up");
    }

    #[test]
    fn overwrite_policy_replaces_same_slug() {
        let tmp = TempDir::new().unwrap();
        let w = writer(tmp.path(), CollisionPolicy::Overwrite);
        let a = save(&w, "same five words here now: first");
        let b = save(&w, "same five words here now: second");
        assert_eq!(a, b);
        let content = fs::read_to_string(b).unwrap();
        assert!(content.ends_with("second"));
        assert_eq!(fs::read_dir(tmp.path()).unwrap().count(), 1);
    }

    #[test]
    fn suffix_policy_keeps_both_notes() {
        let tmp = TempDir::new().unwrap();
        let w = writer(tmp.path(), CollisionPolicy::Suffix);
        let a = save(&w, "same five words here now: first");
        let b = save(&w, "same five words here now: second");
        assert_ne!(a, b);
        let name = b.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("same_five_words_here_now-"), "got {name}");
        assert_eq!(name.len(), "same_five_words_here_now-".len() + SUFFIX_LEN + ".md".len());
        assert!(fs::read_to_string(a).unwrap().ends_with("first"));
        assert!(fs::read_to_string(b).unwrap().ends_with("second"));
    }

    #[test]
    fn suffix_policy_reuses_name_for_identical_content() {
        let tmp = TempDir::new().unwrap();
        let w = writer(tmp.path(), CollisionPolicy::Suffix);
        let note = Note::received("identical", SenderId(1));
        let slug = slugify(&note.raw_text);
        let a = w.write(&note, &slug).unwrap();
        let b = w.write(&note, &slug).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn single_long_token_still_saves() {
        let tmp = TempDir::new().unwrap();
        let text = "a".repeat(300);
        let path = save(&writer(tmp.path(), CollisionPolicy::Overwrite), &text);
        assert_eq!(path, tmp.path().join(format!("{}.md", "a".repeat(100))));
        assert!(fs::read_to_string(&path).unwrap().ends_with(&text));
    }

    #[test]
    fn long_token_collision_suffix_still_saves() {
        let tmp = TempDir::new().unwrap();
        let w = writer(tmp.path(), CollisionPolicy::Suffix);
        let first = save(&w, &"b".repeat(250));
        let second = save(&w, &format!("{} again", "b".repeat(250)));
        assert_ne!(first, second);
        assert!(second.exists());
    }

    #[test]
    fn unwritable_directory_is_write_failure() {
        let tmp = TempDir::new().unwrap();
        let blocker = tmp.path().join("not_a_dir");
        fs::write(&blocker, "file in the way").unwrap();

        let w = writer(&blocker.join("inbox"), CollisionPolicy::Overwrite);
        let note = Note::received("lost", SenderId(1));
        let err = w.write(&note, &slugify(&note.raw_text)).unwrap_err();
        assert!(matches!(err, PipelineError::WriteFailure { .. }), "got: {err}");
    }
}
