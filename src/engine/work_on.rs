//! `work-on`.
//!
//! Marks a task as the one in flight by writing the execution-state file.
//! With branch management enabled, also lands the working copy on the
//! task's branch (`<root-id>-<slug>`, rooted at the story for story
//! children). With worktree management enabled, the branch gets a dedicated
//! worktree next to the main repository, created once and reused across the
//! story's tasks.

use std::path::PathBuf;

use serde::Deserialize;
use serde_json::json;

use super::{Engine, ToolOutcome, ToolResult};
use crate::error::ToolError;
use crate::exec_state::{self, ExecutionState};
use crate::git::{GitError, GitErrorKind, PullOutcome};
use crate::model::TaskId;
use crate::utils::now_iso8601;
use crate::worktree;

#[derive(Debug, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub struct WorkOnParams {
    pub task_id: TaskId,
}

/// What the branch/worktree step actually did.
#[derive(Debug)]
enum Placement {
    /// No branch management configured; state written to the base directory.
    BaseDir,
    AlreadyOnBranch { branch: String },
    SwitchedBranch { branch: String },
    CreatedWorktree { branch: String, path: PathBuf },
    ReusedWorktree { branch: String, path: PathBuf },
    /// A worktree exists elsewhere; the caller must change directory.
    SwitchDirectory { branch: String, path: PathBuf },
}

impl Engine {
    pub fn work_on(&self, params: WorkOnParams) -> ToolResult {
        let store = self.load()?;

        let id = params.task_id;
        let Some(task) = store.get_active(id) else {
            return Err(ToolError::not_found(format!("Task #{id} not found")));
        };
        let (root_id, root_title) = match task.parent_id {
            Some(parent) => {
                let Some(story) = store.get(parent) else {
                    return Err(ToolError::not_found(format!(
                        "Parent story #{parent} of task #{id} not found"
                    )));
                };
                (parent, story.title.clone())
            }
            None => (id, task.title.clone()),
        };
        let story_id = task.parent_id;

        let placement = if self.config().worktree_management {
            self.place_in_worktree(root_id, &root_title)?
        } else if self.config().branch_management() {
            self.place_on_branch(root_id, &root_title)?
        } else {
            Placement::BaseDir
        };

        let state = ExecutionState {
            task_id: id,
            story_id,
            started_at: now_iso8601(),
        };
        let state_dir = match &placement {
            Placement::CreatedWorktree { path, .. }
            | Placement::ReusedWorktree { path, .. }
            | Placement::SwitchDirectory { path, .. } => path.clone(),
            _ => self.base_dir().to_path_buf(),
        };
        exec_state::write(&state_dir, &state)
            .map_err(|e| ToolError::filesystem(format!("{e:#}")))?;

        let title = &task.title;
        let (message, action, branch, wt_path) = match &placement {
            Placement::BaseDir => (
                format!("Working on task #{id}: {title}"),
                "started",
                None,
                None,
            ),
            Placement::AlreadyOnBranch { branch } => (
                format!("Working on task #{id}: {title} (already on branch {branch})"),
                "already-on-branch",
                Some(branch.clone()),
                None,
            ),
            Placement::SwitchedBranch { branch } => (
                format!("Working on task #{id}: {title} on branch {branch}"),
                "switched-branch",
                Some(branch.clone()),
                None,
            ),
            Placement::CreatedWorktree { branch, path } => (
                format!(
                    "Working on task #{id}: {title} in new worktree {}",
                    path.display()
                ),
                "created-worktree",
                Some(branch.clone()),
                Some(path.clone()),
            ),
            Placement::ReusedWorktree { branch, path } => (
                format!(
                    "Working on task #{id}: {title} in worktree {}",
                    path.display()
                ),
                "reused-worktree",
                Some(branch.clone()),
                Some(path.clone()),
            ),
            Placement::SwitchDirectory { branch, path } => (
                format!(
                    "Worktree for branch {branch} is at {}; switch there to work on task #{id}",
                    path.display()
                ),
                "switch-directory",
                Some(branch.clone()),
                Some(path.clone()),
            ),
        };

        Ok(ToolOutcome::new(message).with_data(json!({
            "task-id": id,
            "story-id": story_id,
            "action": action,
            "branch": branch,
            "worktree": wt_path.map(|p| p.display().to_string()),
            "started-at": state.started_at,
        })))
    }

    /// Branch management without worktrees: land the base directory on the
    /// target branch, creating it from the base branch if needed.
    fn place_on_branch(&self, root_id: TaskId, root_title: &str) -> Result<Placement, ToolError> {
        let dir = self.base_dir();
        let target = worktree::branch_name(root_id, root_title);

        let current = self.git().current_branch(dir).map_err(git_state_error)?;
        if current.as_deref() == Some(target.as_str()) {
            return Ok(Placement::AlreadyOnBranch { branch: target });
        }

        let base = self.resolve_base_branch()?;
        if self.git().has_uncommitted(dir).map_err(git_state_error)? {
            return Err(ToolError::state(
                "Working tree has uncommitted changes".to_string(),
                json!({
                    "current-branch": current,
                    "target-branch": target,
                }),
            ));
        }

        self.git().checkout(dir, &base).map_err(git_state_error)?;
        match self.git().pull(dir, &base) {
            Ok(PullOutcome::Pulled | PullOutcome::UpToDate | PullOutcome::NoRemote) => {}
            Err(e) if e.kind == GitErrorKind::Conflict => {
                return Err(ToolError::GitConflict { message: e.message });
            }
            Err(e) => return Err(ToolError::GitNetwork { message: e.message }),
        }

        if self.git().branch_exists(dir, &target).map_err(git_state_error)? {
            self.git().checkout(dir, &target).map_err(git_state_error)?;
        } else {
            self.git()
                .create_and_checkout(dir, &target)
                .map_err(git_state_error)?;
        }
        Ok(Placement::SwitchedBranch { branch: target })
    }

    /// Worktree management: find or create the worktree bound to the target
    /// branch. Reuse requires being inside it; otherwise the reply directs
    /// the caller to switch directories.
    fn place_in_worktree(&self, root_id: TaskId, root_title: &str) -> Result<Placement, ToolError> {
        let dir = self.base_dir();
        let target = worktree::branch_name(root_id, root_title);

        let main_repo = self.git().main_repo_dir(dir).map_err(git_state_error)?;
        if let Some(existing) =
            worktree::find_for_branch(self.git(), &main_repo, &target).map_err(git_state_error)?
        {
            if worktree::is_inside(dir, &existing.path) {
                return Ok(Placement::ReusedWorktree {
                    branch: target,
                    path: existing.path,
                });
            }
            return Ok(Placement::SwitchDirectory {
                branch: target,
                path: existing.path,
            });
        }

        let base = self.resolve_base_branch()?;
        let Some(path) = worktree::worktree_path(&main_repo, root_title) else {
            return Err(ToolError::state(
                format!(
                    "Cannot derive a worktree path next to {}",
                    main_repo.display()
                ),
                json!({ "main-repo": main_repo.display().to_string() }),
            ));
        };
        self.git()
            .worktree_add(&main_repo, &path, &target, &base)
            .map_err(git_state_error)?;
        Ok(Placement::CreatedWorktree {
            branch: target,
            path,
        })
    }

    /// The configured base branch, or auto-detection (`origin/HEAD`, `main`,
    /// `master`). A configured branch must actually exist.
    fn resolve_base_branch(&self) -> Result<String, ToolError> {
        let dir = self.base_dir();
        match &self.config().base_branch {
            Some(base) => {
                let exists = self
                    .git()
                    .branch_exists(dir, base)
                    .map_err(git_state_error)?;
                if !exists {
                    return Err(ToolError::state(
                        format!("Configured base branch {base:?} does not exist"),
                        json!({ "base-branch": base }),
                    ));
                }
                Ok(base.clone())
            }
            None => self.git().default_branch(dir).map_err(git_state_error),
        }
    }
}

/// Branch/worktree git failures are repository-state problems from the
/// tool's point of view; nothing has been mutated when they occur.
fn git_state_error(e: GitError) -> ToolError {
    ToolError::state(e.to_string(), json!({}))
}
