//! Git invocation layer.
//!
//! [`VcsTool`] is the whole version-control surface the pipeline uses; the
//! production implementation [`GitCli`] shells out to `git`. Credentials and
//! commit identity are explicit values applied to each child process, never
//! to the parent's environment.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use quill_core::{Author, Config};

use crate::error::VcsError;

/// The git operations the repository manager and sync engine rely on.
pub trait VcsTool {
    /// `git clone <remote_url> <dest>`
    fn clone_repo(&self, remote_url: &str, dest: &Path) -> Result<(), VcsError>;

    /// `git add -- <file>`
    fn add(&self, workdir: &Path, file: &str) -> Result<(), VcsError>;

    /// True if the index differs from `HEAD`.
    fn has_staged_changes(&self, workdir: &Path) -> Result<bool, VcsError>;

    /// `git commit -m <message>`
    fn commit(&self, workdir: &Path, message: &str) -> Result<(), VcsError>;

    /// `git pull --rebase origin <branch>`
    fn pull_rebase(&self, workdir: &Path, branch: &str) -> Result<(), VcsError>;

    /// `git push origin HEAD:<branch>`
    fn push(&self, workdir: &Path, branch: &str) -> Result<(), VcsError>;
}

// ---------------------------------------------------------------------------
// Credentials
// ---------------------------------------------------------------------------

/// SSH private key used for every remote operation of one [`GitCli`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SshCredential {
    key_path: PathBuf,
}

impl SshCredential {
    pub fn new(key_path: impl Into<PathBuf>) -> Self {
        Self {
            key_path: key_path.into(),
        }
    }

    pub fn key_path(&self) -> &Path {
        &self.key_path
    }

    /// Value for `GIT_SSH_COMMAND` on the child process.
    pub fn ssh_command(&self) -> String {
        let key = self.key_path.display().to_string().replace('\'', r"'\''");
        format!("ssh -i '{key}' -o StrictHostKeyChecking=no")
    }
}

// ---------------------------------------------------------------------------
// GitCli
// ---------------------------------------------------------------------------

/// [`VcsTool`] backed by the `git` executable.
#[derive(Debug, Clone)]
pub struct GitCli {
    credential: Option<SshCredential>,
    author: Author,
}

impl GitCli {
    pub fn new(credential: Option<SshCredential>, author: Author) -> Self {
        Self { credential, author }
    }

    /// Uses the configured SSH key only when the file exists.
    pub fn from_config(config: &Config) -> Self {
        let credential = match config.ssh_key_path.as_deref() {
            Some(key) if key.is_file() => Some(SshCredential::new(key)),
            Some(key) => {
                tracing::debug!("ssh key {} not found; using default ssh setup", key.display());
                None
            }
            None => None,
        };
        Self::new(credential, config.author.clone())
    }

    pub fn credential(&self) -> Option<&SshCredential> {
        self.credential.as_ref()
    }

    fn command(&self, workdir: Option<&Path>, args: &[&str]) -> Command {
        let mut cmd = Command::new("git");
        cmd.arg("-c")
            .arg(format!("user.name={}", self.author.name))
            .arg("-c")
            .arg(format!("user.email={}", self.author.email))
            .args(args)
            // A daemon has no terminal to answer credential prompts.
            .env("GIT_TERMINAL_PROMPT", "0");
        if let Some(credential) = &self.credential {
            cmd.env("GIT_SSH_COMMAND", credential.ssh_command());
        }
        if let Some(dir) = workdir {
            cmd.current_dir(dir);
        }
        cmd
    }

    fn run(&self, workdir: Option<&Path>, args: &[&str]) -> Result<Output, VcsError> {
        tracing::debug!("git {}", args.join(" "));
        self.command(workdir, args)
            .output()
            .map_err(|source| VcsError::Spawn {
                args: args.join(" "),
                source,
            })
    }

    fn run_checked(&self, workdir: Option<&Path>, args: &[&str]) -> Result<Output, VcsError> {
        let output = self.run(workdir, args)?;
        if !output.status.success() {
            return Err(VcsError::Failed {
                args: args.join(" "),
                status: output.status.to_string(),
                output: diagnostic_text(&output),
            });
        }
        Ok(output)
    }
}

impl VcsTool for GitCli {
    fn clone_repo(&self, remote_url: &str, dest: &Path) -> Result<(), VcsError> {
        let dest = dest.to_string_lossy();
        self.run_checked(None, &["clone", remote_url, dest.as_ref()])?;
        Ok(())
    }

    fn add(&self, workdir: &Path, file: &str) -> Result<(), VcsError> {
        self.run_checked(Some(workdir), &["add", "--", file])?;
        Ok(())
    }

    fn has_staged_changes(&self, workdir: &Path) -> Result<bool, VcsError> {
        let out = self.run_checked(Some(workdir), &["diff", "--cached", "--name-only"])?;
        Ok(!String::from_utf8_lossy(&out.stdout).trim().is_empty())
    }

    fn commit(&self, workdir: &Path, message: &str) -> Result<(), VcsError> {
        self.run_checked(Some(workdir), &["commit", "-m", message])?;
        Ok(())
    }

    fn pull_rebase(&self, workdir: &Path, branch: &str) -> Result<(), VcsError> {
        self.run_checked(Some(workdir), &["pull", "--rebase", "origin", branch])?;
        Ok(())
    }

    fn push(&self, workdir: &Path, branch: &str) -> Result<(), VcsError> {
        let refspec = format!("HEAD:{branch}");
        self.run_checked(Some(workdir), &["push", "origin", &refspec])?;
        Ok(())
    }
}

/// stderr, falling back to stdout (git prints some failures there).
fn diagnostic_text(output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let stderr = stderr.trim();
    if !stderr.is_empty() {
        return stderr.to_string();
    }
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ssh_command_quotes_key_path() {
        let credential = SshCredential::new("/keys/my bot's key");
        assert_eq!(
            credential.ssh_command(),
            r"ssh -i '/keys/my bot'\''s key' -o StrictHostKeyChecking=no"
        );
    }

    #[test]
    fn command_scopes_credential_to_child() {
        let git = GitCli::new(Some(SshCredential::new("/keys/bot")), Author::default());
        let cmd = git.command(Some(Path::new("/tmp")), &["status"]);
        let envs: Vec<_> = cmd
            .get_envs()
            .map(|(k, v)| (k.to_string_lossy().into_owned(), v.map(|v| v.to_string_lossy().into_owned())))
            .collect();
        assert!(envs.contains(&(
            "GIT_SSH_COMMAND".to_string(),
            Some("ssh -i '/keys/bot' -o StrictHostKeyChecking=no".to_string())
        )));
    }

    #[test]
    fn command_passes_author_identity() {
        let git = GitCli::new(None, Author::default());
        let cmd = git.command(None, &["commit", "-m", "x"]);
        let args: Vec<_> = cmd.get_args().map(|a| a.to_string_lossy().into_owned()).collect();
        assert_eq!(
            args,
            [
                "-c",
                "user.name=quill-bot",
                "-c",
                "user.email=quill-bot@localhost",
                "commit",
                "-m",
                "x"
            ]
        );
        assert!(cmd.get_envs().all(|(k, _)| k != "GIT_SSH_COMMAND"));
    }

    #[test]
    fn missing_key_file_disables_credential() {
        let mut config = Config::defaults_at(Path::new("/nonexistent-home"));
        config.ssh_key_path = Some(PathBuf::from("/nonexistent-home/.ssh/none"));
        assert!(GitCli::from_config(&config).credential().is_none());
    }
}
