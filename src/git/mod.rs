//! Git adapter.
//!
//! The engine talks to git through the [`Git`] trait: a fixed operation set
//! with typed results and classified errors. The production implementation
//! ([`CliGit`]) shells out to the `git` binary; tests inject a scripted
//! in-memory implementation through the same trait. The adapter reports
//! git's own error text verbatim and never panics on command failure.

use std::fmt;
use std::path::{Path, PathBuf};

mod cli;

#[cfg(test)]
mod test;

pub use cli::CliGit;

/// Why a git operation failed. Pull failures drive the engine's
/// abort-or-proceed decision, so the classification matters there; for other
/// operations the kind is usually `Other`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GitErrorKind {
    /// Pull could not merge cleanly (or the working tree blocks it).
    Conflict,
    /// The remote could not be reached (includes timeouts).
    Network,
    /// No remote is configured for the repository.
    NoRemote,
    Other,
}

#[derive(Debug)]
pub struct GitError {
    pub kind: GitErrorKind,
    pub message: String,
}

impl GitError {
    pub fn other(message: impl Into<String>) -> Self {
        GitError {
            kind: GitErrorKind::Other,
            message: message.into(),
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        GitError {
            kind: GitErrorKind::Network,
            message: message.into(),
        }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        GitError {
            kind: GitErrorKind::Conflict,
            message: message.into(),
        }
    }

    pub fn no_remote(message: impl Into<String>) -> Self {
        GitError {
            kind: GitErrorKind::NoRemote,
            message: message.into(),
        }
    }
}

impl fmt::Display for GitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for GitError {}

pub type GitResult<T> = Result<T, GitError>;

/// What a successful pull did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PullOutcome {
    Pulled,
    UpToDate,
    /// Nothing to pull from; local-only repositories are fine.
    NoRemote,
}

/// One entry from `git worktree list` (bare entries filtered out).
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct WorktreeInfo {
    pub path: PathBuf,
    /// `None` for detached HEAD.
    pub branch: Option<String>,
}

/// The operation set the engine needs. All methods take the directory to
/// operate in; implementations must not keep per-call state.
pub trait Git: Send + Sync {
    fn status_porcelain(&self, dir: &Path) -> GitResult<String>;

    fn has_uncommitted(&self, dir: &Path) -> GitResult<bool> {
        Ok(!self.status_porcelain(dir)?.trim().is_empty())
    }

    fn add(&self, dir: &Path, paths: &[&Path]) -> GitResult<()>;

    /// Commit staged changes; returns the new HEAD sha.
    fn commit(&self, dir: &Path, message: &str) -> GitResult<String>;

    /// Pull `branch` from the primary remote. Missing remotes are a normal
    /// outcome, not an error; conflicts and transport failures are errors
    /// with the matching [`GitErrorKind`].
    fn pull(&self, dir: &Path, branch: &str) -> GitResult<PullOutcome>;

    /// Current branch, or `None` for detached HEAD.
    fn current_branch(&self, dir: &Path) -> GitResult<Option<String>>;

    /// Detected default branch: `origin/HEAD`, then `main`, then `master`.
    fn default_branch(&self, dir: &Path) -> GitResult<String>;

    fn branch_exists(&self, dir: &Path, name: &str) -> GitResult<bool>;

    fn checkout(&self, dir: &Path, name: &str) -> GitResult<()>;

    fn create_and_checkout(&self, dir: &Path, name: &str) -> GitResult<()>;

    fn worktree_list(&self, dir: &Path) -> GitResult<Vec<WorktreeInfo>>;

    fn worktree_add(&self, dir: &Path, path: &Path, branch: &str, base: &str) -> GitResult<()>;

    fn worktree_remove(&self, dir: &Path, path: &Path) -> GitResult<()>;

    /// Whether `dir` is inside a linked worktree (as opposed to the main
    /// working tree).
    fn in_worktree(&self, dir: &Path) -> GitResult<bool>;

    /// The main repository directory, resolved from any worktree.
    fn main_repo_dir(&self, dir: &Path) -> GitResult<PathBuf>;
}
