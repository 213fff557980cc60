//! `complete-task`.
//!
//! Regular tasks close and move to the archive. Story children close but
//! stay in `tasks.ednl` until their story completes; completing the story
//! archives it together with all children atomically. Completion also clears
//! the execution-state marker and, inside a worktree, tears the worktree
//! down when it is clean.

use serde::Deserialize;
use serde_json::json;

use super::{Engine, ToolOutcome, ToolResult};
use crate::error::ToolError;
use crate::exec_state;
use crate::model::{Status, Task, TaskId};
use crate::store::TaskStore;
use crate::utils::truncate_title;
use crate::worktree;

#[derive(Debug, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub struct CompleteTaskParams {
    #[serde(default)]
    pub task_id: Option<TaskId>,
    /// Exact title; must be unique among active tasks.
    #[serde(default)]
    pub title: Option<String>,
    /// Appended to the task's description.
    #[serde(default)]
    pub completion_comment: Option<String>,
}

impl Engine {
    pub fn complete_task(&self, params: CompleteTaskParams) -> ToolResult {
        self.sync()?;
        let mut store = self.load()?;

        let id = Self::resolve_task(&store, params.task_id, params.title.as_deref())?;
        let Some(task) = store.get_active(id) else {
            return Err(ToolError::state(
                format!("Task #{id} is already archived"),
                json!({ "task-id": id }),
            ));
        };
        let is_story = task.is_story();

        let (message, commit_message, completed) = if is_story {
            self.complete_story(&mut store, id)?
        } else {
            self.complete_regular(&mut store, id, params.completion_comment.as_deref())?
        };

        self.persist(&store)?;
        let git = self.commit(&commit_message);

        let mut outcome_message = message;
        if completed.parent_id.is_none() {
            let cleanup = self.post_completion_cleanup();
            if let Some(warning) = cleanup {
                outcome_message.push('\n');
                outcome_message.push_str(&warning);
            }
        } else if let Ok(Some(state)) = exec_state::read(self.base_dir())
            && state.task_id == id
        {
            let _ = exec_state::clear(self.base_dir());
        }

        Ok(ToolOutcome::new(outcome_message)
            .with_data(Self::mutation_data(&completed))
            .with_git(git))
    }

    fn complete_regular(
        &self,
        store: &mut TaskStore,
        id: TaskId,
        comment: Option<&str>,
    ) -> Result<(String, String, Task), ToolError> {
        let existing = store.get_active(id).expect("resolved above");
        if existing.status == Status::Closed {
            return Err(ToolError::state(
                format!("Task #{id} is already closed"),
                json!({ "task-id": id }),
            ));
        }

        let mut task = existing.clone();
        task.status = Status::Closed;
        if let Some(comment) = comment
            && !comment.is_empty()
        {
            if task.description.is_empty() {
                task.description = comment.to_string();
            } else {
                task.description = format!("{}\n\n{comment}", task.description);
            }
        }

        let is_child = task.parent_id.is_some();
        store.replace(task.clone());
        if !is_child {
            store.archive(id);
        }

        Ok((
            format!("Completed task #{id}: {}", task.title),
            format!("Complete task #{id}: {}", truncate_title(&task.title)),
            task,
        ))
    }

    /// A story completes only when every child is closed or deleted; then the
    /// story and all children archive together.
    fn complete_story(
        &self,
        store: &mut TaskStore,
        id: TaskId,
    ) -> Result<(String, String, Task), ToolError> {
        let blocking: Vec<TaskId> = store
            .children_of(id)
            .iter()
            .copied()
            .filter(|&child| {
                store
                    .get(child)
                    .is_some_and(|task| !task.status.is_terminal())
            })
            .collect();
        if !blocking.is_empty() {
            let rendered: Vec<String> = blocking.iter().map(|id| format!("#{id}")).collect();
            return Err(ToolError::state(
                format!(
                    "Cannot complete story #{id}: tasks {} are not closed",
                    rendered.join(", ")
                ),
                json!({ "blocking-children": blocking }),
            ));
        }

        let mut story = store.get_active(id).expect("resolved above").clone();
        story.status = Status::Closed;
        store.replace(story.clone());

        let children: Vec<TaskId> = store.children_of(id).to_vec();
        store.archive(id);
        for child in &children {
            store.archive(*child);
        }

        Ok((
            format!(
                "Completed story #{id}: {} ({} tasks archived)",
                story.title,
                children.len()
            ),
            format!(
                "Complete story #{id}: {} (with {} tasks)",
                truncate_title(&story.title),
                children.len()
            ),
            story,
        ))
    }

    /// Post-actions for non-child completions: drop the execution-state
    /// marker and, when worktree management is on and we're inside a clean
    /// worktree, remove it. Failures downgrade to a warning string.
    fn post_completion_cleanup(&self) -> Option<String> {
        let _ = exec_state::clear(self.base_dir());
        if !self.config().worktree_management {
            return None;
        }
        let report = worktree::cleanup(self.git(), self.base_dir());
        report.warning
    }
}
