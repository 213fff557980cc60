//! Semantic validation and dependency analysis.
//!
//! Field-shape problems are caught when records are parsed; this module
//! checks the rules that span tasks: parent references, relation integrity,
//! `blocked-by` acyclicity, collection size caps, and the blocked-status
//! computation used by queries.

use std::collections::HashMap;

use serde::Serialize;
use serde_json::json;

use crate::edn::Value;
use crate::error::ToolError;
use crate::model::{SessionEvent, Task, TaskId};
use crate::store::TaskStore;

/// Serialized cap for `shared-context` and `session-events`: 50 KB of the
/// EDN-serialized collection. Exactly at the cap is accepted.
pub const COLLECTION_SIZE_LIMIT: usize = 50 * 1024;

pub fn shared_context_size(context: &[String]) -> usize {
    let value = Value::Vector(context.iter().map(Value::string).collect());
    value.to_string().len()
}

pub fn session_events_size(events: &[SessionEvent]) -> usize {
    let value = Value::Vector(events.iter().map(SessionEvent::to_edn).collect());
    value.to_string().len()
}

pub fn check_shared_context_size(context: &[String]) -> Result<(), ToolError> {
    let actual = shared_context_size(context);
    if actual > COLLECTION_SIZE_LIMIT {
        return Err(ToolError::SizeLimit {
            field: "shared-context",
            actual,
        });
    }
    Ok(())
}

pub fn check_session_events_size(events: &[SessionEvent]) -> Result<(), ToolError> {
    let actual = session_events_size(events);
    if actual > COLLECTION_SIZE_LIMIT {
        return Err(ToolError::SizeLimit {
            field: "session-events",
            actual,
        });
    }
    Ok(())
}

/// Validate a proposed task state against the store it will join. The store
/// may already contain an older version of the task.
pub fn validate_task(store: &TaskStore, task: &Task) -> Result<(), ToolError> {
    if task.title.is_empty() {
        return Err(ToolError::invalid_input(format!(
            "Task #{} has an empty title",
            task.id
        )));
    }

    if let Some(parent_id) = task.parent_id {
        if task.is_story() {
            return Err(ToolError::Integrity {
                message: format!("Story #{} cannot have a parent", task.id),
                missing_ids: vec![],
            });
        }
        match store.get(parent_id) {
            None => {
                return Err(ToolError::Integrity {
                    message: format!("Parent task #{parent_id} does not exist"),
                    missing_ids: vec![parent_id],
                });
            }
            Some(parent) if !parent.is_story() => {
                return Err(ToolError::Integrity {
                    message: format!(
                        "Parent task #{parent_id} is a {}, not a story",
                        parent.task_type
                    ),
                    missing_ids: vec![],
                });
            }
            Some(_) => {}
        }
    }

    let missing: Vec<TaskId> = task
        .relations
        .iter()
        .map(|r| r.relates_to)
        .filter(|id| !store.contains(*id))
        .collect();
    if !missing.is_empty() {
        let rendered: Vec<String> = missing.iter().map(|id| format!("#{id}")).collect();
        return Err(ToolError::Integrity {
            message: format!("Relations reference missing tasks: {}", rendered.join(", ")),
            missing_ids: missing,
        });
    }

    if !task.shared_context.is_empty() && !task.is_story() {
        return Err(ToolError::invalid_input_with(
            format!("shared-context is only valid on stories; task #{} is a {}",
                task.id, task.task_type),
            json!({ "task-id": task.id }),
        ));
    }
    check_shared_context_size(&task.shared_context)?;
    check_session_events_size(&task.session_events)?;

    check_cycles(store, task)
}

/// Check that the proposed task's `blocked-by` edges don't close a cycle in
/// the union graph. Any new cycle must pass through the task being changed,
/// so the search starts there; the offending path starts and ends with the
/// same id.
pub fn check_cycles(store: &TaskStore, task: &Task) -> Result<(), ToolError> {
    let mut path = vec![task.id];
    for target in task.blocked_by_ids() {
        if let Some(cycle) = find_path_back(store, task, target, task.id, &mut path) {
            return Err(ToolError::Cycle { path: cycle });
        }
    }
    Ok(())
}

/// DFS from `node` through stored `blocked-by` edges, looking for `goal`.
/// Edges of the task under change come from its proposed state, not the
/// store.
fn find_path_back(
    store: &TaskStore,
    changed: &Task,
    node: TaskId,
    goal: TaskId,
    path: &mut Vec<TaskId>,
) -> Option<Vec<TaskId>> {
    if node == goal {
        let mut cycle = path.clone();
        cycle.push(goal);
        return Some(cycle);
    }
    if path.contains(&node) {
        // A pre-existing cycle not involving `goal`; the proposed edges
        // didn't create it, so it isn't this check's failure to report.
        return None;
    }
    path.push(node);
    let targets: Vec<TaskId> = if node == changed.id {
        changed.blocked_by_ids().collect()
    } else {
        match store.get(node) {
            Some(task) => task.blocked_by_ids().collect(),
            None => Vec::new(),
        }
    };
    for next in targets {
        if let Some(cycle) = find_path_back(store, changed, next, goal, path) {
            return Some(cycle);
        }
    }
    path.pop();
    None
}

/// Blocked-status for one task, as attached to query replies.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BlockedStatus {
    #[serde(rename = "blocked?")]
    pub blocked: bool,
    #[serde(rename = "blocking-ids")]
    pub blocking_ids: Vec<TaskId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(rename = "circular-dependency", skip_serializing_if = "Option::is_none")]
    pub circular_dependency: Option<Vec<TaskId>>,
}

/// Per-node traversal result, memoized across the batch.
#[derive(Debug, Clone, Default)]
struct Analysis {
    /// Frontier blockers: transitive `blocked-by` ancestors that are open
    /// and themselves unblocked — the tasks to finish first.
    frontier: Vec<TaskId>,
    cycle: Option<Vec<TaskId>>,
    missing: Vec<TaskId>,
}

/// Compute blocked-status for a batch of tasks in one traversal. Results are
/// identical to computing each task individually; the memo keeps the walk
/// linear in the size of the reachable subgraph.
pub fn blocked_status_batch(
    store: &TaskStore,
    ids: &[TaskId],
) -> HashMap<TaskId, BlockedStatus> {
    let mut memo: HashMap<TaskId, Analysis> = HashMap::new();
    let mut results = HashMap::new();
    for &id in ids {
        let mut stack = Vec::new();
        let analysis = analyze(store, id, &mut memo, &mut stack);
        results.insert(id, status_from(id, analysis));
    }
    results
}

pub fn blocked_status_one(store: &TaskStore, id: TaskId) -> BlockedStatus {
    blocked_status_batch(store, &[id])
        .remove(&id)
        .expect("requested id present in batch result")
}

fn status_from(id: TaskId, analysis: Analysis) -> BlockedStatus {
    let error = if let Some(cycle) = &analysis.cycle {
        let rendered: Vec<String> = cycle.iter().map(|id| format!("#{id}")).collect();
        Some(format!(
            "Circular dependency detected: {}",
            rendered.join(" -> ")
        ))
    } else if !analysis.missing.is_empty() {
        let rendered: Vec<String> =
            analysis.missing.iter().map(|id| format!("#{id}")).collect();
        Some(format!(
            "Task #{id} depends on missing tasks: {}",
            rendered.join(", ")
        ))
    } else {
        None
    };
    BlockedStatus {
        blocked: !analysis.frontier.is_empty() || analysis.cycle.is_some(),
        blocking_ids: analysis.frontier,
        error,
        circular_dependency: analysis.cycle,
    }
}

fn analyze(
    store: &TaskStore,
    id: TaskId,
    memo: &mut HashMap<TaskId, Analysis>,
    stack: &mut Vec<TaskId>,
) -> Analysis {
    if let Some(done) = memo.get(&id) {
        return done.clone();
    }
    if let Some(pos) = stack.iter().position(|&n| n == id) {
        let mut cycle: Vec<TaskId> = stack[pos..].to_vec();
        cycle.push(id);
        return Analysis {
            cycle: Some(cycle),
            ..Analysis::default()
        };
    }

    let Some(task) = store.get(id) else {
        // Caller records the dangling reference.
        return Analysis::default();
    };

    stack.push(id);
    let mut result = Analysis::default();
    for target in task.blocked_by_ids() {
        let Some(target_task) = store.get(target) else {
            result.missing.push(target);
            continue;
        };
        let sub = analyze(store, target, memo, stack);
        if result.cycle.is_none() {
            result.cycle = sub.cycle.clone();
        }
        result.missing.extend(sub.missing.iter().copied());
        if !target_task.status.is_terminal() && sub.frontier.is_empty() && sub.cycle.is_none() {
            // Open and unblocked: the target itself is actionable.
            result.frontier.push(target);
        } else {
            // Closed (satisfied) or itself blocked: its blockers surface.
            result.frontier.extend(sub.frontier.iter().copied());
        }
    }
    stack.pop();

    result.frontier.sort_unstable();
    result.frontier.dedup();
    result.missing.sort_unstable();
    result.missing.dedup();
    if result.cycle.is_none() {
        memo.insert(id, result.clone());
    }
    result
}
