//! `update-task`.
//!
//! Fields replace whole: `meta` and `relations` passed as `null` clear to
//! empty, an empty string or empty vector is a no-op for that field.
//! `shared-context` and `session-events` only ever append.

use serde::Deserialize;
use serde_json::json;

use super::{Engine, RelationInput, ToolOutcome, ToolResult, build_relations, double_option};
use crate::error::ToolError;
use crate::exec_state;
use crate::model::{
    SESSION_EVENT_TYPES, SessionEvent, Status, TaskId, TaskType, json_to_edn,
};
use crate::utils::now_iso8601;
use crate::validate;

#[derive(Debug, Clone, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub struct SessionEventInput {
    /// Filled with the current UTC time when omitted.
    #[serde(default)]
    pub timestamp: Option<String>,
    pub event_type: String,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub struct UpdateTaskParams {
    pub task_id: TaskId,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub design: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(rename = "type", default)]
    pub task_type: Option<TaskType>,
    #[serde(default)]
    pub status: Option<Status>,
    /// `null` detaches the task from its story.
    #[serde(default, deserialize_with = "double_option")]
    pub parent_id: Option<Option<TaskId>>,
    /// Replaces the whole map; `null` clears it.
    #[serde(default, deserialize_with = "double_option")]
    pub meta: Option<Option<serde_json::Map<String, serde_json::Value>>>,
    /// Replaces the whole list; `null` clears it.
    #[serde(default, deserialize_with = "double_option")]
    pub relations: Option<Option<Vec<RelationInput>>>,
    /// Entries to append to the story's shared context.
    #[serde(default)]
    pub shared_context: Option<Vec<String>>,
    /// Events to append to the session log.
    #[serde(default)]
    pub session_events: Option<Vec<SessionEventInput>>,
    #[serde(default)]
    pub code_reviewed: Option<String>,
    #[serde(default)]
    pub pr_num: Option<u64>,
}

impl Engine {
    pub fn update_task(&self, params: UpdateTaskParams) -> ToolResult {
        self.sync()?;
        let mut store = self.load()?;

        let id = params.task_id;
        let Some(existing) = store.get(id) else {
            return Err(ToolError::not_found(format!("Task #{id} not found")));
        };
        if existing.status == Status::Deleted {
            return Err(ToolError::state(
                format!("Task #{id} is deleted and cannot be updated"),
                json!({ "task-id": id }),
            ));
        }
        if store.is_archived(id) {
            return Err(ToolError::state(
                format!("Task #{id} is archived; reopen it before updating"),
                json!({ "task-id": id }),
            ));
        }

        let mut task = existing.clone();

        // Simple fields replace whole; empty strings are no-ops.
        for (new, slot) in [
            (&params.title, &mut task.title),
            (&params.description, &mut task.description),
            (&params.design, &mut task.design),
            (&params.category, &mut task.category),
        ] {
            if let Some(value) = new
                && !value.is_empty()
            {
                *slot = value.clone();
            }
        }

        if let Some(task_type) = params.task_type {
            if task.is_story()
                && task_type != TaskType::Story
                && !store.children_of(id).is_empty()
            {
                return Err(ToolError::state(
                    format!("Story #{id} has children and cannot change type"),
                    json!({ "task-id": id, "children": store.children_of(id) }),
                ));
            }
            task.task_type = task_type;
        }

        if let Some(status) = params.status {
            if status == Status::Deleted {
                return Err(ToolError::invalid_input_with(
                    "Use delete-task to delete a task",
                    json!({ "task-id": id, "status": "deleted" }),
                ));
            }
            task.status = status;
        }

        if let Some(parent) = params.parent_id {
            task.parent_id = parent;
        }

        if let Some(meta) = &params.meta {
            match meta {
                None => task.meta.clear(),
                Some(entries) if entries.is_empty() => {}
                Some(entries) => {
                    task.meta.clear();
                    for (key, value) in entries {
                        task.meta.insert(key.clone(), coerce_meta_value(key, value)?);
                    }
                }
            }
        }

        if let Some(relations) = &params.relations {
            match relations {
                None => task.relations.clear(),
                Some(inputs) if inputs.is_empty() => {}
                Some(inputs) => task.relations = build_relations(inputs),
            }
        }

        if let Some(entries) = &params.shared_context {
            let prefix = exec_state::read(self.base_dir())
                .ok()
                .flatten()
                .map(|state| format!("Task {}: ", state.task_id));
            for entry in entries {
                if entry.is_empty() {
                    continue;
                }
                match &prefix {
                    Some(prefix) => task.shared_context.push(format!("{prefix}{entry}")),
                    None => task.shared_context.push(entry.clone()),
                }
            }
        }

        if let Some(events) = &params.session_events {
            for event in events {
                task.session_events.push(build_session_event(event)?);
            }
        }

        if let Some(reviewed) = &params.code_reviewed
            && !reviewed.is_empty()
        {
            task.code_reviewed = Some(reviewed.clone());
        }
        if let Some(pr) = params.pr_num {
            if pr == 0 {
                return Err(ToolError::invalid_input_with(
                    "pr-num must be a positive integer",
                    json!({ "pr-num": pr }),
                ));
            }
            task.pr_num = Some(pr);
        }

        validate::validate_task(&store, &task)?;

        store.replace(task.clone());
        self.persist(&store)?;

        let git = self.commit(&self.commit_message("Update", &task));
        Ok(
            ToolOutcome::new(format!("Updated task #{id}: {}", task.title))
                .with_data(Self::mutation_data(&task))
                .with_git(git),
        )
    }
}

/// `meta` values must be strings; scalars are coerced, structures rejected.
fn coerce_meta_value(key: &str, value: &serde_json::Value) -> Result<String, ToolError> {
    match value {
        serde_json::Value::String(s) => Ok(s.clone()),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        serde_json::Value::Bool(b) => Ok(b.to_string()),
        _ => Err(ToolError::invalid_input_with(
            format!("meta value for {key:?} must be a string"),
            json!({ "key": key, "value": value }),
        )),
    }
}

fn build_session_event(input: &SessionEventInput) -> Result<SessionEvent, ToolError> {
    if !SESSION_EVENT_TYPES.contains(&input.event_type.as_str()) {
        return Err(ToolError::invalid_input_with(
            format!("Invalid session event type {:?}", input.event_type),
            json!({ "event-type": input.event_type, "allowed": SESSION_EVENT_TYPES }),
        ));
    }
    let mut extra = indexmap::IndexMap::new();
    for (key, value) in &input.extra {
        let value = json_to_edn(value).map_err(|e| {
            ToolError::invalid_input_with(
                format!("Invalid session event field {key:?}: {e}"),
                json!({ "field": key }),
            )
        })?;
        extra.insert(key.clone(), value);
    }
    Ok(SessionEvent {
        timestamp: input
            .timestamp
            .clone()
            .filter(|t| !t.is_empty())
            .unwrap_or_else(now_iso8601),
        event_type: input.event_type.clone(),
        extra,
    })
}
