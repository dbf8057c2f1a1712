//! Process configuration.
//!
//! # Storage layout
//!
//! ```text
//! ~/.quill/
//!   config.yaml   (mode 0600, optional: defaults apply when absent)
//!   inbox/        (default working directory / git clone)
//! ```
//!
//! # Environment overrides
//!
//! | Variable           | Field            |
//! |--------------------|------------------|
//! | `GIT_REPO_URL`     | `remote_url`     |
//! | `GIT_SSH_KEY_PATH` | `ssh_key_path`   |
//! | `ALLOWED_IDS`      | `allowed_ids`    |
//! | `QUILL_WORKDIR`    | `working_dir`    |
//! | `QUILL_BRANCH`     | `branch`         |
//!
//! # API pattern
//!
//! - `fn_at(home: &Path, …)`: explicit home; used in tests with `TempDir`
//! - `fn(…)`: derives home from `dirs::home_dir()`, delegates to `_at`
//!
//! A [`Config`] is built once at startup and passed by reference into the
//! access gate and the pipeline. Nothing mutates it afterwards.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{io_err, ConfigError};
use crate::types::SenderId;

pub const QUILL_DIR: &str = ".quill";
pub const CONFIG_FILE: &str = "config.yaml";
pub const DEFAULT_BRANCH: &str = "main";
pub const DEFAULT_SSH_KEY: &str = "quill_bot_ssh";

// ---------------------------------------------------------------------------
// 1. Types
// ---------------------------------------------------------------------------

/// What the artifact writer does when `<slug>.md` already holds other content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CollisionPolicy {
    /// Replace the existing file.
    #[default]
    Overwrite,
    /// Write `<slug>-<hash>.md` next to it instead.
    Suffix,
}

/// Commit identity passed to git on every invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    pub name: String,
    pub email: String,
}

impl Default for Author {
    fn default() -> Self {
        Self {
            name: "quill-bot".to_string(),
            email: "quill-bot@localhost".to_string(),
        }
    }
}

/// Immutable, process-wide configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Remote repository URL. `None` disables synchronization.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_url: Option<String>,
    /// Local clone where artifacts are written.
    pub working_dir: PathBuf,
    /// Private key handed to ssh for every git invocation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssh_key_path: Option<PathBuf>,
    /// Senders admitted by the access gate. Empty admits nobody.
    #[serde(default)]
    pub allowed_ids: BTreeSet<SenderId>,
    /// Remote branch that receives pushes.
    pub branch: String,
    #[serde(default)]
    pub author: Author,
    #[serde(default)]
    pub collision: CollisionPolicy,
    /// Directory holding a `note.md.tera` that overrides the built-in layout.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_dir: Option<PathBuf>,
}

/// On-disk shape: every field optional so partial files are valid.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    remote_url: Option<String>,
    working_dir: Option<PathBuf>,
    ssh_key_path: Option<PathBuf>,
    allowed_ids: Option<BTreeSet<SenderId>>,
    branch: Option<String>,
    author: Option<Author>,
    collision: Option<CollisionPolicy>,
    template_dir: Option<PathBuf>,
}

impl Config {
    /// Built-in defaults rooted at `home`.
    pub fn defaults_at(home: &Path) -> Self {
        Self {
            remote_url: None,
            working_dir: quill_root(home).join("inbox"),
            ssh_key_path: Some(home.join(".ssh").join(DEFAULT_SSH_KEY)),
            allowed_ids: BTreeSet::new(),
            branch: DEFAULT_BRANCH.to_string(),
            author: Author::default(),
            collision: CollisionPolicy::default(),
            template_dir: None,
        }
    }

    fn from_file(file: ConfigFile, home: &Path) -> Self {
        let defaults = Self::defaults_at(home);
        Self {
            remote_url: file.remote_url.filter(|url| !url.trim().is_empty()),
            working_dir: file.working_dir.unwrap_or(defaults.working_dir),
            ssh_key_path: file.ssh_key_path.or(defaults.ssh_key_path),
            allowed_ids: file.allowed_ids.unwrap_or_default(),
            branch: file.branch.unwrap_or(defaults.branch),
            author: file.author.unwrap_or_default(),
            collision: file.collision.unwrap_or_default(),
            template_dir: file.template_dir,
        }
    }

    /// Apply environment overrides read through `lookup`.
    ///
    /// Empty values are ignored, except `GIT_REPO_URL=""` which clears the
    /// remote and so disables sync.
    pub fn with_env(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(url) = lookup("GIT_REPO_URL") {
            let url = url.trim().to_string();
            self.remote_url = if url.is_empty() { None } else { Some(url) };
        }
        if let Some(key) = lookup("GIT_SSH_KEY_PATH").filter(|v| !v.trim().is_empty()) {
            self.ssh_key_path = Some(PathBuf::from(key.trim()));
        }
        if let Some(raw) = lookup("ALLOWED_IDS") {
            self.allowed_ids = parse_allowed_ids(&raw);
        }
        if let Some(dir) = lookup("QUILL_WORKDIR").filter(|v| !v.trim().is_empty()) {
            self.working_dir = PathBuf::from(dir.trim());
        }
        if let Some(branch) = lookup("QUILL_BRANCH").filter(|v| !v.trim().is_empty()) {
            self.branch = branch.trim().to_string();
        }
        self
    }

    /// True when a remote is configured and notes will be pushed.
    pub fn sync_enabled(&self) -> bool {
        self.remote_url.is_some()
    }
}

/// Parse a comma-separated id list; entries that are not integers are skipped.
pub fn parse_allowed_ids(raw: &str) -> BTreeSet<SenderId> {
    raw.split(',')
        .filter_map(|part| part.trim().parse::<i64>().ok())
        .map(SenderId)
        .collect()
}

// ---------------------------------------------------------------------------
// 2. Path helpers
// ---------------------------------------------------------------------------

/// The user's home directory, or `ConfigError::HomeNotFound`.
pub fn home() -> Result<PathBuf, ConfigError> {
    dirs::home_dir().ok_or(ConfigError::HomeNotFound)
}

/// `<home>/.quill/`
pub fn quill_root(home: &Path) -> PathBuf {
    home.join(QUILL_DIR)
}

/// `<home>/.quill/config.yaml`: pure, no I/O.
pub fn config_path_at(home: &Path) -> PathBuf {
    quill_root(home).join(CONFIG_FILE)
}

// ---------------------------------------------------------------------------
// 3. Load
// ---------------------------------------------------------------------------

/// Load `<home>/.quill/config.yaml` without environment overrides.
///
/// A missing file yields [`Config::defaults_at`]; a malformed one returns
/// `ConfigError::Parse` with path and line context.
pub fn load_file_at(home: &Path) -> Result<Config, ConfigError> {
    let path = config_path_at(home);
    if !path.exists() {
        return Ok(Config::defaults_at(home));
    }
    let contents = std::fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
    if contents.trim().is_empty() {
        return Ok(Config::defaults_at(home));
    }
    let file: ConfigFile =
        serde_yaml::from_str(&contents).map_err(|e| ConfigError::Parse { path, source: e })?;
    Ok(Config::from_file(file, home))
}

/// Load the config file and apply overrides from the process environment.
pub fn load_at(home: &Path) -> Result<Config, ConfigError> {
    Ok(load_file_at(home)?.with_env(|key| std::env::var(key).ok()))
}

/// `load_at` convenience wrapper.
pub fn load() -> Result<Config, ConfigError> {
    load_at(&home()?)
}

// ---------------------------------------------------------------------------
// 4. Save (atomic)
// ---------------------------------------------------------------------------

/// Atomically write `config` to `<home>/.quill/config.yaml`.
///
/// Write flow: serialize → `.yaml.tmp` sibling → `chmod 0600` → `rename`.
pub fn save_at(home: &Path, config: &Config) -> Result<PathBuf, ConfigError> {
    let dir = quill_root(home);
    if !dir.exists() {
        std::fs::create_dir_all(&dir).map_err(|e| io_err(&dir, e))?;
        set_dir_permissions(&dir)?;
    }
    let path = config_path_at(home);
    let tmp_path = path.with_file_name(format!("{CONFIG_FILE}.tmp"));

    let yaml = serde_yaml::to_string(config)?;
    std::fs::write(&tmp_path, yaml).map_err(|e| io_err(&tmp_path, e))?;
    set_file_permissions(&tmp_path)?;
    std::fs::rename(&tmp_path, &path).map_err(|e| io_err(&path, e))?;
    Ok(path)
}

/// `save_at` convenience wrapper.
pub fn save(config: &Config) -> Result<PathBuf, ConfigError> {
    save_at(&home()?, config)
}

// ---------------------------------------------------------------------------
// Private helpers
// ---------------------------------------------------------------------------

#[cfg(unix)]
fn set_dir_permissions(path: &Path) -> Result<(), ConfigError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700))
        .map_err(|e| io_err(path, e))
}
#[cfg(not(unix))]
fn set_dir_permissions(_path: &Path) -> Result<(), ConfigError> {
    Ok(())
}

#[cfg(unix)]
fn set_file_permissions(path: &Path) -> Result<(), ConfigError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
        .map_err(|e| io_err(path, e))
}
#[cfg(not(unix))]
fn set_file_permissions(_path: &Path) -> Result<(), ConfigError> {
    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
