//! Execution-state tracking.
//!
//! A single-record EDN file (`.mcp-tasks-current.edn`) in the base directory
//! of whichever working copy the task is being worked on in. `work-on`
//! writes it, `complete-task` removes it; its presence is the only signal
//! used to auto-prefix `shared-context` entries.

use std::path::{Path, PathBuf};

use anyhow::{Context, anyhow};
use indexmap::IndexMap;
use serde::Serialize;

use crate::edn::{self, Key, Value};
use crate::model::TaskId;

pub const EXECUTION_STATE_FILE: &str = ".mcp-tasks-current.edn";

/// The in-flight task marker.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct ExecutionState {
    pub task_id: TaskId,
    pub story_id: Option<TaskId>,
    pub started_at: String,
}

impl ExecutionState {
    fn to_edn(&self) -> Value {
        let mut entries = IndexMap::new();
        entries.insert(Key::keyword("task-id"), Value::Int(self.task_id as i64));
        entries.insert(
            Key::keyword("story-id"),
            match self.story_id {
                Some(id) => Value::Int(id as i64),
                None => Value::Nil,
            },
        );
        entries.insert(Key::keyword("started-at"), Value::string(&self.started_at));
        Value::Map(entries)
    }

    fn from_edn(value: &Value) -> anyhow::Result<Self> {
        let task_id = value
            .get("task-id")
            .and_then(Value::as_u64)
            .ok_or_else(|| anyhow!("execution state missing :task-id"))?;
        let story_id = value.get("story-id").and_then(Value::as_u64);
        let started_at = value
            .get("started-at")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        Ok(ExecutionState {
            task_id,
            story_id,
            started_at,
        })
    }
}

fn state_path(dir: &Path) -> PathBuf {
    dir.join(EXECUTION_STATE_FILE)
}

/// Read the marker from `dir`, if present. Absence means no task is in
/// progress.
pub fn read(dir: &Path) -> anyhow::Result<Option<ExecutionState>> {
    let path = state_path(dir);
    let text = match std::fs::read_to_string(&path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e).with_context(|| format!("Failed to read {}", path.display())),
    };
    let value = edn::parse(&text)
        .with_context(|| format!("Failed to parse {}", path.display()))?;
    Ok(Some(ExecutionState::from_edn(&value)?))
}

pub fn write(dir: &Path, state: &ExecutionState) -> anyhow::Result<()> {
    let path = state_path(dir);
    std::fs::write(&path, format!("{}\n", state.to_edn()))
        .with_context(|| format!("Failed to write {}", path.display()))
}

/// Remove the marker. Returns whether it existed.
pub fn clear(dir: &Path) -> anyhow::Result<bool> {
    let path = state_path(dir);
    match std::fs::remove_file(&path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e).with_context(|| format!("Failed to remove {}", path.display())),
    }
}
