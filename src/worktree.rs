//! Branch naming and per-story worktree lifecycle.
//!
//! Branches derive from the root task (the story for story children):
//! `<root-id>-<slug(title)>`. Worktree directories sit next to the main
//! repository as `<project>-<slug(title)>`; reuse is keyed on the branch via
//! `git worktree list`, so the path derivation only runs for new worktrees.

use std::path::{Path, PathBuf};

use crate::git::{Git, GitResult, WorktreeInfo};
use crate::model::TaskId;

/// Lowercased, hyphen-normalized form of a title: non-alphanumerics become
/// `-`, runs collapse, ends are trimmed.
pub fn slug(title: &str) -> String {
    let mut out = String::with_capacity(title.len());
    let mut pending_dash = false;
    for c in title.chars() {
        if c.is_alphanumeric() {
            if pending_dash && !out.is_empty() {
                out.push('-');
            }
            pending_dash = false;
            for lower in c.to_lowercase() {
                out.push(lower);
            }
        } else {
            pending_dash = true;
        }
    }
    out
}

/// Branch for working on a task: `<root-id>-<slug>`, where root is the
/// story for story children and the task itself otherwise.
pub fn branch_name(root_id: TaskId, root_title: &str) -> String {
    format!("{root_id}-{}", slug(root_title))
}

/// Directory for a new worktree: `<project>-<slug>`, sibling of the main
/// repository.
pub fn worktree_path(main_repo: &Path, root_title: &str) -> Option<PathBuf> {
    let project = main_repo.file_name()?.to_string_lossy();
    let parent = main_repo.parent()?;
    Some(parent.join(format!("{project}-{}", slug(root_title))))
}

/// Find the worktree currently bound to `branch`, if any.
pub fn find_for_branch(
    git: &dyn Git,
    dir: &Path,
    branch: &str,
) -> GitResult<Option<WorktreeInfo>> {
    let worktrees = git.worktree_list(dir)?;
    Ok(worktrees
        .into_iter()
        .find(|wt| wt.branch.as_deref() == Some(branch)))
}

/// Whether `dir` is the root of the given worktree. Canonicalizes both sides
/// so symlinked temp dirs (macOS `/var` -> `/private/var`) compare equal.
pub fn is_inside(dir: &Path, worktree: &Path) -> bool {
    let dir = dunce::canonicalize(dir).unwrap_or_else(|_| dir.to_path_buf());
    let worktree = dunce::canonicalize(worktree).unwrap_or_else(|_| worktree.to_path_buf());
    dir == worktree
}

/// Outcome of a post-completion worktree cleanup. Failures never fail the
/// completion; they surface as a warning in the reply.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CleanupReport {
    pub removed: Option<PathBuf>,
    pub warning: Option<String>,
}

/// Remove the worktree containing `base_dir` if it is clean. No-op when
/// `base_dir` is the main working tree.
pub fn cleanup(git: &dyn Git, base_dir: &Path) -> CleanupReport {
    let mut report = CleanupReport::default();

    match git.in_worktree(base_dir) {
        Ok(false) => return report,
        Ok(true) => {}
        Err(e) => {
            report.warning = Some(format!("Worktree cleanup skipped: {e}"));
            return report;
        }
    }

    match git.has_uncommitted(base_dir) {
        Ok(false) => {}
        Ok(true) => {
            report.warning = Some(
                "Worktree has uncommitted changes; leaving it in place".to_string(),
            );
            return report;
        }
        Err(e) => {
            report.warning = Some(format!("Worktree cleanup skipped: {e}"));
            return report;
        }
    }

    let main_repo = match git.main_repo_dir(base_dir) {
        Ok(dir) => dir,
        Err(e) => {
            report.warning = Some(format!("Worktree cleanup skipped: {e}"));
            return report;
        }
    };

    let entry = match git.worktree_list(&main_repo) {
        Ok(worktrees) => worktrees.into_iter().find(|wt| is_inside(base_dir, &wt.path)),
        Err(e) => {
            report.warning = Some(format!("Worktree cleanup skipped: {e}"));
            return report;
        }
    };
    let Some(entry) = entry else {
        report.warning = Some(format!(
            "Worktree at {} not found in worktree list; not removed",
            base_dir.display()
        ));
        return report;
    };

    match git.worktree_remove(&main_repo, &entry.path) {
        Ok(()) => report.removed = Some(entry.path),
        Err(e) => {
            report.warning = Some(format!(
                "Failed to remove worktree at {}: {e}",
                entry.path.display()
            ));
        }
    }
    report
}
