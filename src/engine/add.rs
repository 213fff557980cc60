//! `add-task`.

use serde::Deserialize;

use super::{Engine, RelationInput, ToolOutcome, ToolResult, build_relations};
use crate::error::ToolError;
use crate::model::{Task, TaskId, TaskType};
use crate::validate;

#[derive(Debug, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub struct AddTaskParams {
    /// Free-form grouping label.
    pub category: String,
    pub title: String,
    #[serde(rename = "type", default)]
    pub task_type: Option<TaskType>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub design: Option<String>,
    /// Story to attach this task to.
    #[serde(default)]
    pub parent_id: Option<TaskId>,
    #[serde(default)]
    pub relations: Option<Vec<RelationInput>>,
}

impl Engine {
    pub fn add_task(&self, params: AddTaskParams) -> ToolResult {
        if params.title.trim().is_empty() {
            return Err(ToolError::invalid_input("Task title must not be empty"));
        }

        self.sync()?;
        let mut store = self.load()?;

        let id = store.allocate_id();
        let mut task = Task::new(id, params.title, params.task_type.unwrap_or(TaskType::Task));
        task.category = params.category;
        task.description = params.description.unwrap_or_default();
        task.design = params.design.unwrap_or_default();
        task.parent_id = params.parent_id;
        task.relations = build_relations(params.relations.as_deref().unwrap_or_default());

        validate::validate_task(&store, &task)?;

        store.insert(task.clone());
        self.persist(&store)?;

        let git = self.commit(&self.commit_message("Add", &task));
        Ok(
            ToolOutcome::new(format!("Added task #{id}: {}", task.title))
                .with_data(Self::mutation_data(&task))
                .with_git(git),
        )
    }
}
