//! Recording [`VcsTool`] double for unit tests.

use std::cell::RefCell;
use std::path::Path;

use quill_core::SyncStage;

use crate::error::VcsError;
use crate::git::VcsTool;

/// Records every call; `fail_at` makes the matching operation fail.
#[derive(Default)]
pub(crate) struct FakeVcs {
    pub calls: RefCell<Vec<String>>,
    pub fail_at: Option<SyncStage>,
    pub staged: RefCell<bool>,
    /// `add` leaves the index untouched, as for an already-committed file.
    pub unchanged: bool,
}

impl FakeVcs {
    pub fn failing_at(stage: SyncStage) -> Self {
        Self {
            fail_at: Some(stage),
            ..Self::default()
        }
    }

    pub fn unchanged() -> Self {
        Self {
            unchanged: true,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }

    pub fn count(&self, op: &str) -> usize {
        self.calls.borrow().iter().filter(|c| c.starts_with(op)).count()
    }

    fn record(&self, stage: SyncStage, call: String) -> Result<(), VcsError> {
        self.calls.borrow_mut().push(call.clone());
        if self.fail_at == Some(stage) {
            return Err(VcsError::Failed {
                args: call,
                status: "exit status: 1".to_string(),
                output: format!("simulated {stage} failure"),
            });
        }
        Ok(())
    }
}

impl VcsTool for FakeVcs {
    fn clone_repo(&self, remote_url: &str, dest: &Path) -> Result<(), VcsError> {
        self.record(SyncStage::Clone, format!("clone {remote_url}"))?;
        std::fs::create_dir_all(dest.join(".git")).map_err(|source| VcsError::Spawn {
            args: "clone".to_string(),
            source,
        })
    }

    fn add(&self, _workdir: &Path, file: &str) -> Result<(), VcsError> {
        self.record(SyncStage::Add, format!("add {file}"))?;
        if !self.unchanged {
            *self.staged.borrow_mut() = true;
        }
        Ok(())
    }

    fn has_staged_changes(&self, _workdir: &Path) -> Result<bool, VcsError> {
        Ok(*self.staged.borrow())
    }

    fn commit(&self, _workdir: &Path, message: &str) -> Result<(), VcsError> {
        self.record(SyncStage::Commit, format!("commit {message}"))?;
        *self.staged.borrow_mut() = false;
        Ok(())
    }

    fn pull_rebase(&self, _workdir: &Path, branch: &str) -> Result<(), VcsError> {
        self.record(SyncStage::PullRebase, format!("pull_rebase {branch}"))
    }

    fn push(&self, _workdir: &Path, branch: &str) -> Result<(), VcsError> {
        self.record(SyncStage::Push, format!("push {branch}"))
    }
}
