//! The tool engine.
//!
//! One submodule per tool, each an `impl Engine` block. Every mutating tool
//! runs the same pipeline: sync with the remote (pull-before-write), load
//! both record files, validate the proposed change, rewrite the files
//! atomically, then commit. Pull failures abort before anything is written;
//! commit failures are reported in the reply but never roll back the files.

use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::config::Config;
use crate::error::ToolError;
use crate::git::{Git, GitErrorKind};
use crate::model::{Relation, RelationType, Task, TaskId};
use crate::store::TaskStore;
use crate::utils::truncate_title;

mod add;
mod complete;
mod delete;
mod reopen;
mod select;
mod update;
mod work_on;

pub use add::AddTaskParams;
pub use complete::CompleteTaskParams;
pub use delete::DeleteTaskParams;
pub use reopen::ReopenTaskParams;
pub use select::SelectTasksParams;
pub use update::{SessionEventInput, UpdateTaskParams};
pub use work_on::WorkOnParams;

/// Outcome of the git commit step, reported as the third content item.
#[derive(Debug, Clone, Serialize)]
pub struct GitReport {
    pub status: &'static str,
    pub commit: Option<String>,
    pub error: Option<String>,
}

/// A successful tool reply before shaping into content items.
#[derive(Debug)]
pub struct ToolOutcome {
    pub message: String,
    pub data: Option<serde_json::Value>,
    pub git: Option<GitReport>,
}

impl ToolOutcome {
    pub fn new(message: impl Into<String>) -> Self {
        ToolOutcome {
            message: message.into(),
            data: None,
            git: None,
        }
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn with_git(mut self, git: Option<GitReport>) -> Self {
        self.git = git;
        self
    }
}

pub type ToolResult = Result<ToolOutcome, ToolError>;

/// A relation as supplied in tool parameters. The positional `id` may be
/// omitted; missing ids are filled from the entry's position.
#[derive(Debug, Clone, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub struct RelationInput {
    #[serde(default)]
    pub id: Option<u64>,
    pub relates_to: TaskId,
    pub as_type: RelationType,
}

pub(crate) fn build_relations(inputs: &[RelationInput]) -> Vec<Relation> {
    inputs
        .iter()
        .enumerate()
        .map(|(i, input)| Relation {
            id: input.id.unwrap_or(i as u64 + 1),
            relates_to: input.relates_to,
            as_type: input.as_type,
        })
        .collect()
}

/// Serde helper distinguishing an absent field from an explicit `null`
/// (which clears collections to empty).
pub(crate) fn double_option<'de, T, D>(de: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: serde::Deserializer<'de>,
{
    Option::<T>::deserialize(de).map(Some)
}

/// The task engine: configuration plus an injected git adapter. All tool
/// operations hang off this type, one submodule per tool.
pub struct Engine {
    config: Config,
    git: Box<dyn Git>,
}

impl Engine {
    pub fn new(config: Config, git: Box<dyn Git>) -> Self {
        Engine { config, git }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub(crate) fn git(&self) -> &dyn Git {
        self.git.as_ref()
    }

    pub(crate) fn base_dir(&self) -> &Path {
        &self.config.base_dir
    }

    /// Step 1 of every mutation: pull the data-file branch so local records
    /// are coherent with the remote. Conflicts and transport failures abort
    /// the mutation; a missing remote does not.
    pub(crate) fn sync(&self) -> Result<(), ToolError> {
        if !self.config.use_git {
            return Ok(());
        }
        let dir = self.base_dir();
        let branch = match self.git.current_branch(dir) {
            Ok(Some(branch)) => branch,
            // Detached HEAD: nothing sensible to pull onto.
            Ok(None) => return Ok(()),
            Err(e) => {
                return Err(ToolError::GitNetwork {
                    message: e.to_string(),
                });
            }
        };
        match self.git.pull(dir, &branch) {
            Ok(_) => Ok(()),
            Err(e) if e.kind == GitErrorKind::Conflict => Err(ToolError::GitConflict {
                message: e.message,
            }),
            Err(e) => Err(ToolError::GitNetwork { message: e.message }),
        }
    }

    pub(crate) fn load(&self) -> Result<TaskStore, ToolError> {
        TaskStore::load(&self.config).map_err(|e| ToolError::filesystem(format!("{e:#}")))
    }

    pub(crate) fn persist(&self, store: &TaskStore) -> Result<(), ToolError> {
        store
            .save(&self.config)
            .map_err(|e| ToolError::filesystem(format!("{e:#}")))
    }

    /// Step 5: stage the record files and commit. Failures here do not roll
    /// back the mutation; they ride in the report.
    pub(crate) fn commit(&self, message: &str) -> Option<GitReport> {
        if !self.config.use_git {
            return None;
        }
        let dir = self.base_dir();
        let result = self
            .git
            .add(dir, &Config::data_rel_paths())
            .and_then(|()| self.git.commit(dir, message));
        Some(match result {
            Ok(sha) => GitReport {
                status: "committed",
                commit: Some(sha),
                error: None,
            },
            Err(e) => {
                log::warn!("commit failed after successful mutation: {e}");
                GitReport {
                    status: "error",
                    commit: None,
                    error: Some(e.to_string()),
                }
            }
        })
    }

    pub(crate) fn commit_message(&self, verb: &str, task: &Task) -> String {
        format!("{verb} task #{}: {}", task.id, truncate_title(&task.title))
    }

    /// Resolve a task by id, exact unique title, or both (which must agree).
    /// Searches active tasks; by-id lookups fall back to the archive so
    /// callers can give precise errors about archived tasks.
    pub(crate) fn resolve_task(
        store: &TaskStore,
        task_id: Option<TaskId>,
        title: Option<&str>,
    ) -> Result<TaskId, ToolError> {
        match (task_id, title) {
            (None, None) => Err(ToolError::invalid_input(
                "Must provide task-id or title to identify the task",
            )),
            (Some(id), title) => {
                let Some(task) = store.get(id) else {
                    return Err(ToolError::not_found(format!("Task #{id} not found")));
                };
                if let Some(title) = title
                    && task.title != title
                {
                    return Err(ToolError::invalid_input_with(
                        format!("Task #{id} has title {:?}, not {title:?}", task.title),
                        json!({ "task-id": id, "title": title }),
                    ));
                }
                Ok(id)
            }
            (None, Some(title)) => {
                let matches = store.find_active_by_title(title);
                match matches.len() {
                    0 => Err(ToolError::not_found(format!(
                        "No task found with title {title:?}"
                    ))),
                    1 => Ok(matches[0].id),
                    count => Err(ToolError::Ambiguous {
                        message: format!("Title {title:?} matches {count} tasks"),
                        count,
                    }),
                }
            }
        }
    }

    /// Standard data object for mutating replies.
    pub(crate) fn mutation_data(task: &Task) -> serde_json::Value {
        json!({
            "task": task,
            "modified-files": [".mcp-tasks/tasks.ednl", ".mcp-tasks/complete.ednl"],
        })
    }
}
