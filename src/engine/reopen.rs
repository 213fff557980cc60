//! `reopen-task`.
//!
//! Reverses completion: the task goes back to `open`, and if it was
//! archived it returns to `tasks.ednl`. Stories archive as a family (story
//! plus all children), so reopening any member unarchives the whole family;
//! only the reopened task changes status.

use serde::Deserialize;
use serde_json::json;

use super::{Engine, ToolOutcome, ToolResult};
use crate::error::ToolError;
use crate::model::{Status, TaskId};
use crate::store::TaskStore;

#[derive(Debug, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub struct ReopenTaskParams {
    #[serde(default)]
    pub task_id: Option<TaskId>,
    /// Exact title; must be unique among active tasks.
    #[serde(default)]
    pub title: Option<String>,
}

impl Engine {
    pub fn reopen_task(&self, params: ReopenTaskParams) -> ToolResult {
        self.sync()?;
        let mut store = self.load()?;

        let id = Self::resolve_task(&store, params.task_id, params.title.as_deref())?;
        let task = store.get(id).expect("resolved above");
        let parent_id = task.parent_id;
        match task.status {
            Status::Open => {
                return Err(ToolError::state(
                    format!("Task #{id} is already open"),
                    json!({ "task-id": id }),
                ));
            }
            Status::Deleted => {
                return Err(ToolError::state(
                    format!("Task #{id} is deleted and cannot be reopened"),
                    json!({ "task-id": id }),
                ));
            }
            _ => {}
        }

        if store.is_archived(id) {
            unarchive_family(&mut store, id);
        } else if let Some(parent) = parent_id
            && store.is_archived(parent)
        {
            unarchive_family(&mut store, parent);
        }

        let mut task = store.get(id).expect("still present").clone();
        task.status = Status::Open;
        store.replace(task.clone());
        self.persist(&store)?;

        let git = self.commit(&self.commit_message("Reopen", &task));
        Ok(
            ToolOutcome::new(format!("Reopened task #{id}: {}", task.title))
                .with_data(Self::mutation_data(&task))
                .with_git(git),
        )
    }
}

/// Move an archived task back to the active file. For stories (or members of
/// an archived story) the whole family moves together, preserving the
/// invariant that archived stories keep all children archived.
fn unarchive_family(store: &mut TaskStore, id: TaskId) {
    let root = match store.parent_of(id) {
        Some(parent) if store.is_archived(parent) => parent,
        _ => id,
    };
    store.unarchive(root);
    let children: Vec<TaskId> = store.children_of(root).to_vec();
    for child in children {
        if store.is_archived(child) {
            store.unarchive(child);
        }
    }
}
