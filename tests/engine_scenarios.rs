//! End-to-end lifecycle scenarios against a temp-directory store, git
//! integration off.

mod common;

use common::{add_child, add_story, add_task, engine, task_id_of};
use mcp_tasks::config::Config;
use mcp_tasks::engine::{
    CompleteTaskParams, DeleteTaskParams, Engine, ReopenTaskParams, SelectTasksParams,
    UpdateTaskParams, WorkOnParams,
};
use mcp_tasks::model::{Status, TaskId};
use mcp_tasks::store::TaskStore;
use serde_json::json;

fn update_params(value: serde_json::Value) -> UpdateTaskParams {
    serde_json::from_value(value).expect("valid update params")
}

fn select_params(value: serde_json::Value) -> SelectTasksParams {
    serde_json::from_value(value).expect("valid select params")
}

fn complete(engine: &Engine, id: TaskId) {
    engine
        .complete_task(CompleteTaskParams {
            task_id: Some(id),
            title: None,
            completion_comment: None,
        })
        .expect("complete-task succeeds");
}

/// Blocked-status of one task as reported by `select-tasks`.
fn blocked_status(engine: &Engine, id: TaskId) -> serde_json::Value {
    let outcome = engine
        .select_tasks(select_params(json!({ "task-id": id })))
        .expect("select-tasks succeeds");
    outcome.data.unwrap()["tasks"][0].clone()
}

#[test]
fn linear_chain_blocking() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine(dir.path());

    let a = add_task(&engine, "Task A");
    let b = add_task(&engine, "Task B");
    let c = add_task(&engine, "Task C");

    engine
        .update_task(update_params(json!({
            "task-id": b,
            "relations": [{ "id": 1, "relates-to": a, "as-type": "blocked-by" }],
        })))
        .unwrap();
    engine
        .update_task(update_params(json!({
            "task-id": c,
            "relations": [{ "id": 1, "relates-to": b, "as-type": "blocked-by" }],
        })))
        .unwrap();

    // A is the actionable blocker at the bottom of the chain.
    let status = blocked_status(&engine, c);
    assert_eq!(status["blocked?"], json!(true));
    assert_eq!(status["blocking-ids"], json!([a]));

    complete(&engine, a);
    let status = blocked_status(&engine, c);
    assert_eq!(status["blocked?"], json!(true));
    assert_eq!(status["blocking-ids"], json!([b]));

    complete(&engine, b);
    let status = blocked_status(&engine, c);
    assert_eq!(status["blocked?"], json!(false));
    assert_eq!(status["blocking-ids"], json!([]));
}

#[test]
fn cycle_rejected_with_path() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine(dir.path());

    let a = add_task(&engine, "Task A");
    let b = add_task(&engine, "Task B");
    let c = add_task(&engine, "Task C");

    engine
        .update_task(update_params(json!({
            "task-id": b,
            "relations": [{ "relates-to": a, "as-type": "blocked-by" }],
        })))
        .unwrap();
    engine
        .update_task(update_params(json!({
            "task-id": c,
            "relations": [{ "relates-to": b, "as-type": "blocked-by" }],
        })))
        .unwrap();

    // Closing the loop A -> C is rejected, and the reported path starts and
    // ends with the same id.
    let err = engine
        .update_task(update_params(json!({
            "task-id": a,
            "relations": [{ "relates-to": c, "as-type": "blocked-by" }],
        })))
        .unwrap_err();
    assert_eq!(err.kind(), "cycle");
    let cycle = err.metadata()["cycle"].as_array().unwrap().clone();
    assert_eq!(cycle.first(), cycle.last());
    assert!(cycle.len() >= 3);

    // Nothing was written: A still has no relations.
    let store = TaskStore::load(&Config::new(dir.path())).unwrap();
    assert!(store.get(a).unwrap().relations.is_empty());
}

#[test]
fn story_archival_is_atomic() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine(dir.path());
    let config = Config::new(dir.path());

    let story = add_story(&engine, "Build the feature");
    let t1 = add_child(&engine, "Part one", story);
    let t2 = add_child(&engine, "Part two", story);

    // Completing the story with open children fails and names them.
    let err = engine
        .complete_task(CompleteTaskParams {
            task_id: Some(story),
            title: None,
            completion_comment: None,
        })
        .unwrap_err();
    assert_eq!(err.kind(), "state");
    let blocking = err.metadata()["blocking-children"].as_array().unwrap().clone();
    assert!(blocking.contains(&json!(t1)));
    assert!(blocking.contains(&json!(t2)));

    // Children close but stay in tasks.ednl until the story archives.
    complete(&engine, t1);
    complete(&engine, t2);
    let store = TaskStore::load(&config).unwrap();
    assert_eq!(store.get_active(t1).unwrap().status, Status::Closed);
    assert_eq!(store.get_active(t2).unwrap().status, Status::Closed);
    assert!(!store.is_archived(t1));

    let outcome = engine
        .complete_task(CompleteTaskParams {
            task_id: Some(story),
            title: None,
            completion_comment: None,
        })
        .unwrap();
    assert!(outcome.message.contains("2 tasks"));

    let store = TaskStore::load(&config).unwrap();
    assert_eq!(store.active_tasks().count(), 0);
    for id in [story, t1, t2] {
        assert!(store.is_archived(id), "#{id} should be archived");
        assert_eq!(store.get(id).unwrap().status, Status::Closed);
    }
}

#[test]
fn delete_with_children_rejected_until_closed() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine(dir.path());
    let config = Config::new(dir.path());

    let story = add_story(&engine, "Doomed story");
    let child = add_child(&engine, "Open child", story);

    let err = engine
        .delete_task(DeleteTaskParams {
            task_id: Some(story),
            title: None,
        })
        .unwrap_err();
    assert_eq!(err.kind(), "state");
    assert_eq!(err.to_string(), "Cannot delete task with children");
    assert_eq!(
        err.metadata()["non-closed-children"].as_array().unwrap().len(),
        1
    );

    complete(&engine, child);
    let outcome = engine
        .delete_task(DeleteTaskParams {
            task_id: Some(story),
            title: None,
        })
        .unwrap();
    assert_eq!(outcome.data.as_ref().unwrap()["metadata"]["count"], 1);
    assert_eq!(
        outcome.data.as_ref().unwrap()["metadata"]["status"],
        "deleted"
    );

    let store = TaskStore::load(&config).unwrap();
    assert_eq!(store.get(story).unwrap().status, Status::Deleted);
    assert_eq!(store.get(child).unwrap().status, Status::Closed);
    assert!(store.is_archived(story));
    assert!(store.is_archived(child));

    // Deleted is terminal.
    let err = engine
        .delete_task(DeleteTaskParams {
            task_id: Some(story),
            title: None,
        })
        .unwrap_err();
    assert_eq!(err.kind(), "state");
    let err = engine
        .reopen_task(ReopenTaskParams {
            task_id: Some(story),
            title: None,
        })
        .unwrap_err();
    assert_eq!(err.kind(), "state");
}

#[test]
fn reopen_restores_archived_task() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine(dir.path());
    let config = Config::new(dir.path());

    let id = add_task(&engine, "Round trip");
    complete(&engine, id);
    assert!(TaskStore::load(&config).unwrap().is_archived(id));

    let outcome = engine
        .reopen_task(ReopenTaskParams {
            task_id: Some(id),
            title: None,
        })
        .unwrap();
    assert!(outcome.message.contains("Reopened task"));

    let store = TaskStore::load(&config).unwrap();
    assert!(!store.is_archived(id));
    assert_eq!(store.get_active(id).unwrap().status, Status::Open);

    // Reopening an open task is a state error.
    let err = engine
        .reopen_task(ReopenTaskParams {
            task_id: Some(id),
            title: None,
        })
        .unwrap_err();
    assert_eq!(err.kind(), "state");
}

#[test]
fn reopen_child_unarchives_story_family() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine(dir.path());
    let config = Config::new(dir.path());

    let story = add_story(&engine, "Family");
    let c1 = add_child(&engine, "Child one", story);
    let c2 = add_child(&engine, "Child two", story);
    complete(&engine, c1);
    complete(&engine, c2);
    complete(&engine, story);

    engine
        .reopen_task(ReopenTaskParams {
            task_id: Some(c1),
            title: None,
        })
        .unwrap();

    let store = TaskStore::load(&config).unwrap();
    // The whole family is back in tasks.ednl; only c1 changed status.
    assert!(!store.is_archived(story));
    assert!(!store.is_archived(c1));
    assert!(!store.is_archived(c2));
    assert_eq!(store.get(c1).unwrap().status, Status::Open);
    assert_eq!(store.get(c2).unwrap().status, Status::Closed);
    assert_eq!(store.get(story).unwrap().status, Status::Closed);
}

#[test]
fn update_replaces_whole_and_nil_clears() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine(dir.path());
    let config = Config::new(dir.path());

    let a = add_task(&engine, "Anchor");
    let id = add_task(&engine, "Updatable");

    engine
        .update_task(update_params(json!({
            "task-id": id,
            "meta": { "reviewer": "pat", "attempt": 2 },
            "relations": [{ "relates-to": a, "as-type": "related" }],
            "status": "in-progress",
        })))
        .unwrap();
    let store = TaskStore::load(&config).unwrap();
    let task = store.get(id).unwrap();
    assert_eq!(task.meta.get("attempt").map(String::as_str), Some("2"));
    assert_eq!(task.relations.len(), 1);
    assert_eq!(task.status, Status::InProgress);

    // Replacing meta drops keys that aren't resupplied.
    engine
        .update_task(update_params(json!({
            "task-id": id,
            "meta": { "reviewer": "alex" },
        })))
        .unwrap();
    let store = TaskStore::load(&config).unwrap();
    let task = store.get(id).unwrap();
    assert_eq!(task.meta.len(), 1);
    assert_eq!(task.meta.get("reviewer").map(String::as_str), Some("alex"));

    // Explicit null clears collections; empty string leaves fields alone.
    engine
        .update_task(update_params(json!({
            "task-id": id,
            "meta": null,
            "relations": null,
            "title": "",
        })))
        .unwrap();
    let store = TaskStore::load(&config).unwrap();
    let task = store.get(id).unwrap();
    assert!(task.meta.is_empty());
    assert!(task.relations.is_empty());
    assert_eq!(task.title, "Updatable");
}

#[test]
fn update_rejects_deleted_status_and_archived_tasks() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine(dir.path());

    let id = add_task(&engine, "Victim");
    let err = engine
        .update_task(update_params(json!({ "task-id": id, "status": "deleted" })))
        .unwrap_err();
    assert_eq!(err.kind(), "invalid-input");

    complete(&engine, id);
    let err = engine
        .update_task(update_params(json!({ "task-id": id, "title": "New" })))
        .unwrap_err();
    assert_eq!(err.kind(), "state");
}

#[test]
fn completion_comment_appends_to_description() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine(dir.path());
    let config = Config::new(dir.path());

    let id = add_task(&engine, "Commented");
    engine
        .update_task(update_params(json!({
            "task-id": id,
            "description": "Original text",
        })))
        .unwrap();
    engine
        .complete_task(CompleteTaskParams {
            task_id: Some(id),
            title: None,
            completion_comment: Some("Done in one sitting".into()),
        })
        .unwrap();

    let store = TaskStore::load(&config).unwrap();
    assert_eq!(
        store.get(id).unwrap().description,
        "Original text\n\nDone in one sitting"
    );
}

#[test]
fn complete_by_title_resolution() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine(dir.path());

    add_task(&engine, "Ambiguous");
    add_task(&engine, "Ambiguous");
    let unique = add_task(&engine, "One of a kind");

    let err = engine
        .complete_task(CompleteTaskParams {
            task_id: None,
            title: Some("Ambiguous".into()),
            completion_comment: None,
        })
        .unwrap_err();
    assert_eq!(err.kind(), "ambiguous");
    assert_eq!(err.metadata()["count"], 2);

    let outcome = engine
        .complete_task(CompleteTaskParams {
            task_id: None,
            title: Some("One of a kind".into()),
            completion_comment: None,
        })
        .unwrap();
    assert_eq!(task_id_of(&outcome), unique);
}

#[test]
fn shared_context_size_boundary() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine(dir.path());

    let story = add_story(&engine, "Sized story");
    // Serialized form is `["<payload>"]`: payload + 4 bytes of framing.
    let limit = 50 * 1024;
    let payload = "x".repeat(limit - 4);
    engine
        .update_task(update_params(json!({
            "task-id": story,
            "shared-context": [payload],
        })))
        .unwrap();

    // One more byte pushes past the cap.
    let story2 = add_story(&engine, "Oversized story");
    let payload = "x".repeat(limit - 3);
    let err = engine
        .update_task(update_params(json!({
            "task-id": story2,
            "shared-context": [payload],
        })))
        .unwrap_err();
    assert_eq!(err.kind(), "size-limit");
    assert_eq!(err.metadata()["actual-bytes"], json!(limit + 1));
}

#[test]
fn shared_context_prefixed_while_task_in_flight() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine(dir.path());
    let config = Config::new(dir.path());

    let story = add_story(&engine, "Context story");
    let task = add_child(&engine, "The work", story);

    // No execution state yet: entries append verbatim.
    engine
        .update_task(update_params(json!({
            "task-id": story,
            "shared-context": ["plain note"],
        })))
        .unwrap();

    engine.work_on(WorkOnParams { task_id: task }).unwrap();
    engine
        .update_task(update_params(json!({
            "task-id": story,
            "shared-context": ["found a gotcha", ""],
        })))
        .unwrap();

    let store = TaskStore::load(&config).unwrap();
    let context = &store.get(story).unwrap().shared_context;
    assert_eq!(
        context,
        &vec![
            "plain note".to_string(),
            format!("Task {task}: found a gotcha"),
        ]
    );
}

#[test]
fn session_events_append_with_timestamp_fill() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine(dir.path());
    let config = Config::new(dir.path());

    let id = add_task(&engine, "Logged");
    engine
        .update_task(update_params(json!({
            "task-id": id,
            "session-events": [
                { "event-type": "session-start" },
                { "event-type": "user-prompt", "prompt": "fix it", "timestamp": "2025-06-01T10:00:00Z" },
            ],
        })))
        .unwrap();

    let err = engine
        .update_task(update_params(json!({
            "task-id": id,
            "session-events": [{ "event-type": "coffee-break" }],
        })))
        .unwrap_err();
    assert_eq!(err.kind(), "invalid-input");

    let store = TaskStore::load(&config).unwrap();
    let events = &store.get(id).unwrap().session_events;
    assert_eq!(events.len(), 2);
    assert!(!events[0].timestamp.is_empty());
    assert_eq!(events[1].timestamp, "2025-06-01T10:00:00Z");
    assert_eq!(
        events[1].extra.get("prompt"),
        Some(&mcp_tasks::edn::Value::string("fix it"))
    );
}

#[test]
fn add_task_validates_parent_and_relations() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine(dir.path());

    let plain = add_task(&engine, "Not a story");

    let err = engine
        .add_task(serde_json::from_value(json!({
            "category": "test",
            "title": "Orphan",
            "parent-id": 99,
        })).unwrap())
        .unwrap_err();
    assert_eq!(err.kind(), "integrity");

    let err = engine
        .add_task(serde_json::from_value(json!({
            "category": "test",
            "title": "Bad parent",
            "parent-id": plain,
        })).unwrap())
        .unwrap_err();
    assert_eq!(err.kind(), "integrity");

    let err = engine
        .add_task(serde_json::from_value(json!({
            "category": "test",
            "title": "Bad relation",
            "relations": [{ "relates-to": 404, "as-type": "blocked-by" }],
        })).unwrap())
        .unwrap_err();
    assert_eq!(err.kind(), "integrity");
    assert_eq!(err.metadata()["missing-ids"], json!([404]));
}

#[test]
fn ids_stay_unique_after_archival() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine(dir.path());
    let config = Config::new(dir.path());

    let a = add_task(&engine, "First");
    complete(&engine, a);
    let b = add_task(&engine, "Second");
    assert!(b > a, "archived ids are never reused");

    let store = TaskStore::load(&config).unwrap();
    assert_eq!(store.next_id(), b + 1);
}
