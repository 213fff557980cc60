//! `select-tasks`.
//!
//! Read-only: filter, project, limit. Returned tasks carrying `blocked-by`
//! relations are enriched with blocked-status computed in one batch.

use serde::Deserialize;
use serde_json::json;

use super::{Engine, ToolOutcome, ToolResult};
use crate::error::ToolError;
use crate::model::{Status, Task, TaskId, TaskType};
use crate::store::TaskStore;
use crate::validate;

const DEFAULT_LIMIT: usize = 5;

#[derive(Debug, Default, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub struct SelectTasksParams {
    /// Exact id; includes archived tasks.
    #[serde(default)]
    pub task_id: Option<TaskId>,
    #[serde(default)]
    pub parent_id: Option<TaskId>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(rename = "type", default)]
    pub task_type: Option<TaskType>,
    /// Status filter; defaults to "open". Pass "all" to disable.
    #[serde(default)]
    pub status: Option<String>,
    /// Exact title match.
    #[serde(default)]
    pub title_pattern: Option<String>,
    /// Maximum tasks returned; defaults to 5 (1 with `unique`).
    #[serde(default)]
    pub limit: Option<i64>,
    /// Require exactly one match.
    #[serde(default)]
    pub unique: Option<bool>,
}

impl Engine {
    pub fn select_tasks(&self, params: SelectTasksParams) -> ToolResult {
        let store = self.load()?;

        let unique = params.unique.unwrap_or(false);
        let limit = match params.limit {
            Some(limit) if limit <= 0 => {
                return Err(ToolError::invalid_input_with(
                    "limit must be a positive integer",
                    json!({ "limit": limit }),
                ));
            }
            Some(limit) if unique && limit > 1 => {
                return Err(ToolError::invalid_input_with(
                    "unique requires limit 1",
                    json!({ "limit": limit, "unique": true }),
                ));
            }
            Some(limit) => limit as usize,
            None if unique => 1,
            None => DEFAULT_LIMIT,
        };

        let status_filter = resolve_status_filter(&params)?;

        // Candidate set: active tasks, except that by-id lookups also reach
        // into the archive.
        let mut candidates: Vec<&Task> = match params.task_id {
            Some(id) => {
                let Some(task) = store.get(id) else {
                    return Err(ToolError::not_found(format!("Task #{id} not found")));
                };
                vec![task]
            }
            None => store.active_tasks().collect(),
        };

        if let Some(parent_id) = params.parent_id {
            if !store.contains(parent_id) {
                return Err(ToolError::not_found(format!(
                    "Parent task #{parent_id} not found"
                )));
            }
            candidates.retain(|task| task.parent_id == Some(parent_id));
        }
        if let Some(category) = &params.category {
            candidates.retain(|task| &task.category == category);
        }
        if let Some(task_type) = params.task_type {
            candidates.retain(|task| task.task_type == task_type);
        }
        if let Some(pattern) = &params.title_pattern {
            candidates.retain(|task| &task.title == pattern);
        }

        if let Some(status) = status_filter {
            candidates.retain(|task| task.status == status);
        }
        let total = candidates.len();
        let open_count = candidates
            .iter()
            .filter(|task| task.status == Status::Open)
            .count();

        if unique && total > 1 {
            return Err(ToolError::Ambiguous {
                message: format!("Expected a unique match, found {total} tasks"),
                count: total,
            });
        }

        let returned: Vec<&Task> = candidates.into_iter().take(limit).collect();
        let tasks = enrich(&store, &returned);

        let mut metadata = json!({
            "open-task-count": open_count,
            "returned-count": returned.len(),
            "total-matches": total,
            "limited?": returned.len() < total,
        });
        if let Some(parent_id) = params.parent_id {
            let completed = store
                .children_of(parent_id)
                .iter()
                .filter(|&&child| {
                    store
                        .get(child)
                        .is_some_and(|task| task.status.is_terminal())
                })
                .count();
            metadata["completed-task-count"] = json!(completed);
        }

        Ok(ToolOutcome::new(format!(
            "Found {total} matching tasks, returning {}",
            returned.len()
        ))
        .with_data(json!({ "tasks": tasks, "metadata": metadata })))
    }
}

fn resolve_status_filter(params: &SelectTasksParams) -> Result<Option<Status>, ToolError> {
    match params.status.as_deref() {
        Some("all") => Ok(None),
        Some(status) => status.parse().map(Some).map_err(|_| {
            ToolError::invalid_input_with(
                format!("Unknown status {status:?}"),
                json!({ "status": status }),
            )
        }),
        // By-id lookups shouldn't be hidden by the default filter.
        None if params.task_id.is_some() => Ok(None),
        None => Ok(Some(Status::Open)),
    }
}

/// Project tasks to JSON, attaching blocked-status to any task that carries
/// `blocked-by` relations. One batch traversal covers the whole page.
fn enrich(store: &TaskStore, tasks: &[&Task]) -> Vec<serde_json::Value> {
    let blocked_ids: Vec<TaskId> = tasks
        .iter()
        .filter(|task| task.blocked_by_ids().next().is_some())
        .map(|task| task.id)
        .collect();
    let statuses = validate::blocked_status_batch(store, &blocked_ids);

    tasks
        .iter()
        .map(|task| {
            let mut value = serde_json::to_value(task).expect("task serializes");
            if let Some(status) = statuses.get(&task.id) {
                let extra = serde_json::to_value(status).expect("status serializes");
                value
                    .as_object_mut()
                    .expect("task is an object")
                    .extend(extra.as_object().expect("status is an object").clone());
            }
            value
        })
        .collect()
}
