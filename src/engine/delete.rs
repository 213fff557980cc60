//! `delete-task`.
//!
//! Deletion is terminal: the record moves to `complete.ednl` with
//! `status = deleted` and never transitions again. A task with non-closed
//! children cannot be deleted.

use serde::Deserialize;
use serde_json::json;

use super::{Engine, ToolOutcome, ToolResult};
use crate::error::ToolError;
use crate::model::{Status, TaskId};

#[derive(Debug, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub struct DeleteTaskParams {
    #[serde(default)]
    pub task_id: Option<TaskId>,
    /// Exact title; must be unique among active tasks.
    #[serde(default)]
    pub title: Option<String>,
}

impl Engine {
    pub fn delete_task(&self, params: DeleteTaskParams) -> ToolResult {
        self.sync()?;
        let mut store = self.load()?;

        let id = Self::resolve_task(&store, params.task_id, params.title.as_deref())?;
        let task = store.get(id).expect("resolved above");
        if task.status == Status::Deleted {
            return Err(ToolError::state(
                format!("Task #{id} is already deleted"),
                json!({ "task-id": id }),
            ));
        }

        let non_closed: Vec<TaskId> = store
            .children_of(id)
            .iter()
            .copied()
            .filter(|&child| {
                store
                    .get(child)
                    .is_some_and(|task| !task.status.is_terminal())
            })
            .collect();
        if !non_closed.is_empty() {
            return Err(ToolError::state(
                "Cannot delete task with children".to_string(),
                json!({ "non-closed-children": non_closed }),
            ));
        }

        let mut task = task.clone();
        task.status = Status::Deleted;
        store.replace(task.clone());
        if !store.is_archived(id) {
            store.archive(id);
        }
        // Children are all closed or deleted at this point; they archive
        // together with their story, keeping the family in one file.
        let children: Vec<TaskId> = store.children_of(id).to_vec();
        for child in children {
            store.archive(child);
        }
        self.persist(&store)?;

        let git = self.commit(&self.commit_message("Delete", &task));
        Ok(
            ToolOutcome::new(format!("Deleted task #{id}: {}", task.title))
                .with_data(json!({
                    "deleted": task,
                    "metadata": { "count": 1, "status": "deleted" },
                }))
                .with_git(git),
        )
    }
}
