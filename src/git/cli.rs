//! Git adapter backed by the `git` binary.

use std::path::{Path, PathBuf};
use std::time::Duration;

use super::{Git, GitError, GitErrorKind, GitResult, PullOutcome, WorktreeInfo};
use crate::shell_exec::Cmd;

/// Shells out to `git` for every operation. Stateless apart from the pull
/// timeout, so one instance serves the whole process.
#[derive(Debug, Clone)]
pub struct CliGit {
    pull_timeout: Duration,
}

impl CliGit {
    pub fn new() -> Self {
        Self {
            pull_timeout: Duration::from_secs(30),
        }
    }

    pub fn with_pull_timeout(pull_timeout: Duration) -> Self {
        Self { pull_timeout }
    }

    /// Short display name for the logging context ("." for the current dir).
    fn logging_context(dir: &Path) -> String {
        if dir == Path::new(".") {
            return ".".to_string();
        }
        dir.file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| dir.display().to_string())
    }

    fn run_output(
        &self,
        dir: &Path,
        args: &[&str],
        timeout: Option<Duration>,
    ) -> GitResult<std::process::Output> {
        let mut cmd = Cmd::new("git")
            .args(args.iter().copied())
            .current_dir(dir)
            .context(Self::logging_context(dir));
        if let Some(timeout) = timeout {
            cmd = cmd.timeout(timeout);
        }
        cmd.run().map_err(|e| {
            if e.kind() == std::io::ErrorKind::TimedOut {
                GitError::network(e.to_string())
            } else {
                GitError::other(format!("Failed to execute: git {}: {e}", args.join(" ")))
            }
        })
    }

    /// Run a command and return stdout, or the combined error text on
    /// failure. Some git commands print errors to stdout (e.g. `commit` with
    /// nothing to commit), so both streams contribute to the message.
    fn run(&self, dir: &Path, args: &[&str]) -> GitResult<String> {
        let output = self.run_output(dir, args, None)?;
        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).into_owned())
        } else {
            Err(GitError::other(error_text(&output)))
        }
    }
}

impl Default for CliGit {
    fn default() -> Self {
        Self::new()
    }
}

fn error_text(output: &std::process::Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let stdout = String::from_utf8_lossy(&output.stdout);
    [stderr.trim(), stdout.trim()]
        .into_iter()
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Classify pull failure text. Conservative: anything unrecognized is
/// `Other`, which the engine treats like a transport failure.
fn classify_pull_error(text: &str) -> GitErrorKind {
    const CONFLICT: &[&str] = &[
        "CONFLICT",
        "Automatic merge failed",
        "would be overwritten by merge",
        "Not possible to fast-forward",
        "divergent branches",
        "Need to specify how to reconcile",
        "needs merge",
    ];
    const NO_REMOTE: &[&str] = &[
        "does not appear to be a git repository",
        "No such remote",
        "no remote repository specified",
        "There is no tracking information",
    ];
    const NETWORK: &[&str] = &[
        "Could not resolve host",
        "unable to access",
        "Connection refused",
        "Connection timed out",
        "Could not read from remote repository",
        "timed out",
        "early EOF",
    ];

    if CONFLICT.iter().any(|m| text.contains(m)) {
        GitErrorKind::Conflict
    } else if NO_REMOTE.iter().any(|m| text.contains(m)) {
        GitErrorKind::NoRemote
    } else if NETWORK.iter().any(|m| text.contains(m)) {
        GitErrorKind::Network
    } else {
        GitErrorKind::Other
    }
}

/// Parse `git worktree list --porcelain` output. Entries are stanzas
/// separated by blank lines; bare entries are dropped.
fn parse_worktree_list(stdout: &str) -> Vec<WorktreeInfo> {
    let mut worktrees = Vec::new();
    let mut path: Option<PathBuf> = None;
    let mut branch: Option<String> = None;
    let mut bare = false;

    let mut flush = |path: &mut Option<PathBuf>, branch: &mut Option<String>, bare: &mut bool| {
        if let Some(p) = path.take()
            && !*bare
        {
            worktrees.push(WorktreeInfo {
                path: p,
                branch: branch.take(),
            });
        }
        *branch = None;
        *bare = false;
    };

    for line in stdout.lines() {
        if line.is_empty() {
            flush(&mut path, &mut branch, &mut bare);
        } else if let Some(p) = line.strip_prefix("worktree ") {
            flush(&mut path, &mut branch, &mut bare);
            path = Some(PathBuf::from(p));
        } else if let Some(b) = line.strip_prefix("branch ") {
            branch = Some(b.strip_prefix("refs/heads/").unwrap_or(b).to_string());
        } else if line == "bare" {
            bare = true;
        }
        // "HEAD <sha>" and "detached" lines carry nothing we keep
    }
    flush(&mut path, &mut branch, &mut bare);
    worktrees
}

fn path_arg(path: &Path) -> GitResult<&str> {
    path.to_str()
        .ok_or_else(|| GitError::other(format!("Path contains invalid UTF-8: {}", path.display())))
}

impl Git for CliGit {
    fn status_porcelain(&self, dir: &Path) -> GitResult<String> {
        self.run(dir, &["status", "--porcelain"])
    }

    fn add(&self, dir: &Path, paths: &[&Path]) -> GitResult<()> {
        let mut args = vec!["add", "--"];
        for path in paths {
            args.push(path_arg(path)?);
        }
        self.run(dir, &args)?;
        Ok(())
    }

    fn commit(&self, dir: &Path, message: &str) -> GitResult<String> {
        self.run(dir, &["commit", "-m", message])?;
        let sha = self.run(dir, &["rev-parse", "HEAD"])?;
        Ok(sha.trim().to_string())
    }

    fn pull(&self, dir: &Path, branch: &str) -> GitResult<PullOutcome> {
        let output = self.run_output(
            dir,
            &["pull", "origin", branch],
            Some(self.pull_timeout),
        )?;
        if output.status.success() {
            let stdout = String::from_utf8_lossy(&output.stdout);
            if stdout.contains("Already up to date") {
                return Ok(PullOutcome::UpToDate);
            }
            return Ok(PullOutcome::Pulled);
        }
        let text = error_text(&output);
        match classify_pull_error(&text) {
            GitErrorKind::NoRemote => Ok(PullOutcome::NoRemote),
            kind => Err(GitError {
                kind,
                message: text,
            }),
        }
    }

    fn current_branch(&self, dir: &Path) -> GitResult<Option<String>> {
        let stdout = self.run(dir, &["rev-parse", "--abbrev-ref", "HEAD"])?;
        let name = stdout.trim();
        if name == "HEAD" {
            Ok(None)
        } else {
            Ok(Some(name.to_string()))
        }
    }

    fn default_branch(&self, dir: &Path) -> GitResult<String> {
        if let Ok(output) =
            self.run_output(dir, &["symbolic-ref", "--short", "refs/remotes/origin/HEAD"], None)
            && output.status.success()
        {
            let name = String::from_utf8_lossy(&output.stdout).trim().to_string();
            if let Some(branch) = name.strip_prefix("origin/") {
                return Ok(branch.to_string());
            }
        }
        for candidate in ["main", "master"] {
            if self.branch_exists(dir, candidate)? {
                return Ok(candidate.to_string());
            }
        }
        Err(GitError::other(
            "Could not determine default branch (no origin/HEAD, main, or master)",
        ))
    }

    fn branch_exists(&self, dir: &Path, name: &str) -> GitResult<bool> {
        let output = self.run_output(
            dir,
            &["rev-parse", "--verify", "--quiet", &format!("refs/heads/{name}")],
            None,
        )?;
        Ok(output.status.success())
    }

    fn checkout(&self, dir: &Path, name: &str) -> GitResult<()> {
        self.run(dir, &["checkout", name])?;
        Ok(())
    }

    fn create_and_checkout(&self, dir: &Path, name: &str) -> GitResult<()> {
        self.run(dir, &["checkout", "-b", name])?;
        Ok(())
    }

    fn worktree_list(&self, dir: &Path) -> GitResult<Vec<WorktreeInfo>> {
        let stdout = self.run(dir, &["worktree", "list", "--porcelain"])?;
        Ok(parse_worktree_list(&stdout))
    }

    fn worktree_add(&self, dir: &Path, path: &Path, branch: &str, base: &str) -> GitResult<()> {
        let path = path_arg(path)?;
        if self.branch_exists(dir, branch)? {
            self.run(dir, &["worktree", "add", path, branch])?;
        } else {
            self.run(dir, &["worktree", "add", "-b", branch, path, base])?;
        }
        Ok(())
    }

    fn worktree_remove(&self, dir: &Path, path: &Path) -> GitResult<()> {
        self.run(dir, &["worktree", "remove", path_arg(path)?])?;
        Ok(())
    }

    fn in_worktree(&self, dir: &Path) -> GitResult<bool> {
        let git_dir = self.run(dir, &["rev-parse", "--absolute-git-dir"])?;
        let common_dir = self.run(dir, &["rev-parse", "--git-common-dir"])?;
        let git_dir = resolve(dir, git_dir.trim());
        let common_dir = resolve(dir, common_dir.trim());
        Ok(git_dir != common_dir)
    }

    fn main_repo_dir(&self, dir: &Path) -> GitResult<PathBuf> {
        let common_dir = self.run(dir, &["rev-parse", "--git-common-dir"])?;
        let common_dir = resolve(dir, common_dir.trim());
        common_dir
            .parent()
            .map(Path::to_path_buf)
            .ok_or_else(|| GitError::other("Git common directory has no parent"))
    }
}

/// Make a git-reported path absolute and canonical. Git prints paths
/// relative to the working directory it ran in.
fn resolve(dir: &Path, reported: &str) -> PathBuf {
    let path = Path::new(reported);
    let absolute = if path.is_relative() {
        dir.join(path)
    } else {
        path.to_path_buf()
    };
    dunce::canonicalize(&absolute).unwrap_or(absolute)
}
