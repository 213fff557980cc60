//! The task record model.
//!
//! Tasks live in two EDN line-record files (`tasks.ednl` for active work,
//! `complete.ednl` for the archive). This module defines the typed record and
//! its conversions to and from the on-disk EDN form and the JSON form used in
//! tool replies. Unknown record keys read from disk are carried in a sidecar
//! bag and re-emitted on write, so hand-added fields survive a round trip.

use anyhow::{Context, anyhow, bail};
use indexmap::IndexMap;
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};

use crate::edn::{self, Key, Value};

pub type TaskId = u64;

/// Task workflow status.
///
/// `deleted` is terminal: a deleted task never transitions again.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    schemars::JsonSchema,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum Status {
    Open,
    InProgress,
    Blocked,
    Closed,
    Deleted,
}

impl Status {
    /// Whether this status satisfies a `blocked-by` dependency.
    pub fn is_terminal(self) -> bool {
        matches!(self, Status::Closed | Status::Deleted)
    }
}

/// Task kind.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    schemars::JsonSchema,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum TaskType {
    Task,
    Bug,
    Feature,
    Story,
    Chore,
}

/// Relation kind. Only `blocked-by` participates in cycle checking and
/// blocked-status computation.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    schemars::JsonSchema,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum RelationType {
    BlockedBy,
    Related,
    DiscoveredDuring,
}

/// A typed link from one task to another. `id` is a positional tag within
/// the owning task, not a store-wide identifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub struct Relation {
    pub id: u64,
    pub relates_to: TaskId,
    pub as_type: RelationType,
}

/// Session-event types accepted by `update-task`.
pub const SESSION_EVENT_TYPES: &[&str] = &["user-prompt", "session-start", "compaction"];

/// An append-only session log entry on a task.
///
/// `event_type` is stored as written; tool input is validated against
/// [`SESSION_EVENT_TYPES`], but records read from disk are preserved even if
/// hand-edited to something else. Unknown entry fields ride along in `extra`.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionEvent {
    pub timestamp: String,
    pub event_type: String,
    pub extra: IndexMap<String, Value>,
}

impl SessionEvent {
    pub fn to_edn(&self) -> Value {
        let mut entries = IndexMap::new();
        entries.insert(Key::keyword("timestamp"), Value::string(&self.timestamp));
        entries.insert(Key::keyword("event-type"), Value::keyword(&self.event_type));
        for (k, v) in &self.extra {
            entries.insert(Key::keyword(k), v.clone());
        }
        Value::Map(entries)
    }

    pub fn from_edn(value: &Value) -> anyhow::Result<Self> {
        let map = value
            .as_map()
            .ok_or_else(|| anyhow!("session event must be a map, got {value}"))?;
        let mut event = SessionEvent {
            timestamp: String::new(),
            event_type: String::new(),
            extra: IndexMap::new(),
        };
        for (key, val) in map {
            let Key::Keyword(name) = key else {
                bail!("session event keys must be keywords, got {key}");
            };
            match name.as_str() {
                "timestamp" => {
                    event.timestamp = val
                        .as_str()
                        .ok_or_else(|| anyhow!("session event :timestamp must be a string"))?
                        .to_string();
                }
                "event-type" => {
                    event.event_type = match val {
                        Value::Keyword(k) => k.clone(),
                        Value::String(s) => s.clone(),
                        other => bail!("session event :event-type must be a keyword, got {other}"),
                    };
                }
                _ => {
                    event.extra.insert(name.clone(), val.clone());
                }
            }
        }
        if event.event_type.is_empty() {
            bail!("session event missing :event-type");
        }
        Ok(event)
    }
}

impl Serialize for SessionEvent {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(2 + self.extra.len()))?;
        map.serialize_entry("timestamp", &self.timestamp)?;
        map.serialize_entry("event-type", &self.event_type)?;
        for (k, v) in &self.extra {
            map.serialize_entry(k, &edn_to_json(v))?;
        }
        map.end()
    }
}

/// A single work item.
///
/// `shared_context` is meaningful for stories only; both it and
/// `session_events` are append-only and size-limited (see the validator).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct Task {
    pub id: TaskId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<TaskId>,
    pub title: String,
    pub description: String,
    pub design: String,
    pub category: String,
    #[serde(rename = "type")]
    pub task_type: TaskType,
    pub status: Status,
    pub meta: IndexMap<String, String>,
    pub relations: Vec<Relation>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub shared_context: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub session_events: Vec<SessionEvent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code_reviewed: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pr_num: Option<u64>,
    /// Unknown record fields, preserved for forward compatibility.
    #[serde(skip)]
    pub extra: IndexMap<String, Value>,
}

impl Task {
    /// A fresh task with defaults applied (`status = open`, empty strings,
    /// empty collections).
    pub fn new(id: TaskId, title: impl Into<String>, task_type: TaskType) -> Self {
        Task {
            id,
            parent_id: None,
            title: title.into(),
            description: String::new(),
            design: String::new(),
            category: String::new(),
            task_type,
            status: Status::Open,
            meta: IndexMap::new(),
            relations: Vec::new(),
            shared_context: Vec::new(),
            session_events: Vec::new(),
            code_reviewed: None,
            pr_num: None,
            extra: IndexMap::new(),
        }
    }

    pub fn is_story(&self) -> bool {
        self.task_type == TaskType::Story
    }

    /// Ids of tasks this task is `blocked-by`.
    pub fn blocked_by_ids(&self) -> impl Iterator<Item = TaskId> + '_ {
        self.relations
            .iter()
            .filter(|r| r.as_type == RelationType::BlockedBy)
            .map(|r| r.relates_to)
    }

    /// Serialize to the on-disk record form. Known fields are written in
    /// canonical order; unknown fields follow in the order they were read.
    pub fn to_edn(&self) -> Value {
        let mut entries = IndexMap::new();
        entries.insert(Key::keyword("id"), Value::Int(self.id as i64));
        if let Some(parent) = self.parent_id {
            entries.insert(Key::keyword("parent-id"), Value::Int(parent as i64));
        }
        entries.insert(Key::keyword("title"), Value::string(&self.title));
        entries.insert(Key::keyword("description"), Value::string(&self.description));
        entries.insert(Key::keyword("design"), Value::string(&self.design));
        entries.insert(Key::keyword("category"), Value::string(&self.category));
        entries.insert(Key::keyword("type"), Value::keyword(self.task_type.to_string()));
        entries.insert(Key::keyword("status"), Value::keyword(self.status.to_string()));
        let meta = self
            .meta
            .iter()
            .map(|(k, v)| (Key::String(k.clone()), Value::string(v)))
            .collect();
        entries.insert(Key::keyword("meta"), Value::Map(meta));
        let relations = self
            .relations
            .iter()
            .map(|r| {
                let mut rel = IndexMap::new();
                rel.insert(Key::keyword("id"), Value::Int(r.id as i64));
                rel.insert(Key::keyword("relates-to"), Value::Int(r.relates_to as i64));
                rel.insert(Key::keyword("as-type"), Value::keyword(r.as_type.to_string()));
                Value::Map(rel)
            })
            .collect();
        entries.insert(Key::keyword("relations"), Value::Vector(relations));
        if !self.shared_context.is_empty() {
            let items = self.shared_context.iter().map(Value::string).collect();
            entries.insert(Key::keyword("shared-context"), Value::Vector(items));
        }
        if !self.session_events.is_empty() {
            let items = self.session_events.iter().map(SessionEvent::to_edn).collect();
            entries.insert(Key::keyword("session-events"), Value::Vector(items));
        }
        if let Some(reviewed) = &self.code_reviewed {
            entries.insert(Key::keyword("code-reviewed"), Value::string(reviewed));
        }
        if let Some(pr) = self.pr_num {
            entries.insert(Key::keyword("pr-num"), Value::Int(pr as i64));
        }
        for (k, v) in &self.extra {
            entries.insert(Key::keyword(k), v.clone());
        }
        Value::Map(entries)
    }

    /// Parse a record read from disk. Malformed records are fatal to the
    /// load, naming the offending field.
    pub fn from_edn(value: &Value) -> anyhow::Result<Self> {
        let map = value
            .as_map()
            .ok_or_else(|| anyhow!("task record must be a map, got {value}"))?;

        let id = value
            .get("id")
            .and_then(Value::as_u64)
            .filter(|id| *id > 0)
            .ok_or_else(|| anyhow!("task record missing positive :id"))?;

        let mut task = Task::new(id, "", TaskType::Task);
        let mut saw_title = false;
        let mut saw_type = false;
        let mut saw_status = false;

        for (key, val) in map {
            let Key::Keyword(name) = key else {
                bail!("task #{id}: record keys must be keywords, got {key}");
            };
            match name.as_str() {
                "id" => {}
                "parent-id" => {
                    task.parent_id = match val {
                        Value::Nil => None,
                        _ => Some(
                            val.as_u64()
                                .ok_or_else(|| anyhow!("task #{id}: :parent-id must be a positive integer"))?,
                        ),
                    };
                }
                "title" => {
                    task.title = expect_string(id, "title", val)?;
                    saw_title = true;
                }
                "description" => task.description = expect_string(id, "description", val)?,
                "design" => task.design = expect_string(id, "design", val)?,
                "category" => task.category = expect_string(id, "category", val)?,
                "type" => {
                    let kw = val
                        .as_keyword()
                        .ok_or_else(|| anyhow!("task #{id}: :type must be a keyword"))?;
                    task.task_type = kw
                        .parse()
                        .map_err(|_| anyhow!("task #{id}: unknown task type :{kw}"))?;
                    saw_type = true;
                }
                "status" => {
                    let kw = val
                        .as_keyword()
                        .ok_or_else(|| anyhow!("task #{id}: :status must be a keyword"))?;
                    task.status = kw
                        .parse()
                        .map_err(|_| anyhow!("task #{id}: unknown status :{kw}"))?;
                    saw_status = true;
                }
                "meta" => {
                    let entries = val
                        .as_map()
                        .ok_or_else(|| anyhow!("task #{id}: :meta must be a map"))?;
                    for (mk, mv) in entries {
                        let Key::String(mk) = mk else {
                            bail!("task #{id}: :meta keys must be strings, got {mk}");
                        };
                        let mv = mv
                            .as_str()
                            .ok_or_else(|| anyhow!("task #{id}: :meta values must be strings"))?;
                        task.meta.insert(mk.clone(), mv.to_string());
                    }
                }
                "relations" => {
                    let items = val
                        .as_vec()
                        .ok_or_else(|| anyhow!("task #{id}: :relations must be a vector"))?;
                    for item in items {
                        task.relations.push(relation_from_edn(id, item)?);
                    }
                }
                "shared-context" => {
                    let items = val
                        .as_vec()
                        .ok_or_else(|| anyhow!("task #{id}: :shared-context must be a vector"))?;
                    for item in items {
                        task.shared_context.push(
                            item.as_str()
                                .ok_or_else(|| anyhow!("task #{id}: :shared-context entries must be strings"))?
                                .to_string(),
                        );
                    }
                }
                "session-events" => {
                    let items = val
                        .as_vec()
                        .ok_or_else(|| anyhow!("task #{id}: :session-events must be a vector"))?;
                    for item in items {
                        task.session_events.push(
                            SessionEvent::from_edn(item).with_context(|| format!("task #{id}"))?,
                        );
                    }
                }
                "code-reviewed" => {
                    task.code_reviewed = match val {
                        Value::Nil => None,
                        _ => Some(expect_string(id, "code-reviewed", val)?),
                    };
                }
                "pr-num" => {
                    task.pr_num = match val {
                        Value::Nil => None,
                        _ => Some(
                            val.as_u64()
                                .filter(|n| *n > 0)
                                .ok_or_else(|| anyhow!("task #{id}: :pr-num must be a positive integer"))?,
                        ),
                    };
                }
                _ => {
                    task.extra.insert(name.clone(), val.clone());
                }
            }
        }

        if !saw_title || task.title.is_empty() {
            bail!("task #{id}: missing or empty :title");
        }
        if !saw_type {
            bail!("task #{id}: missing :type");
        }
        if !saw_status {
            bail!("task #{id}: missing :status");
        }
        Ok(task)
    }
}

fn expect_string(id: TaskId, field: &str, val: &Value) -> anyhow::Result<String> {
    val.as_str()
        .map(str::to_string)
        .ok_or_else(|| anyhow!("task #{id}: :{field} must be a string"))
}

fn relation_from_edn(task_id: TaskId, value: &Value) -> anyhow::Result<Relation> {
    let id = value
        .get("id")
        .and_then(Value::as_u64)
        .ok_or_else(|| anyhow!("task #{task_id}: relation missing :id"))?;
    let relates_to = value
        .get("relates-to")
        .and_then(Value::as_u64)
        .ok_or_else(|| anyhow!("task #{task_id}: relation missing :relates-to"))?;
    let kw = value
        .get("as-type")
        .and_then(Value::as_keyword)
        .ok_or_else(|| anyhow!("task #{task_id}: relation missing :as-type"))?;
    let as_type = kw
        .parse()
        .map_err(|_| anyhow!("task #{task_id}: unknown relation type :{kw}"))?;
    Ok(Relation { id, relates_to, as_type })
}

/// Convert an EDN value to its JSON reply form. Keywords become strings.
pub fn edn_to_json(value: &Value) -> serde_json::Value {
    match value {
        Value::Nil => serde_json::Value::Null,
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::Int(i) => serde_json::Value::from(*i),
        Value::String(s) => serde_json::Value::String(s.clone()),
        Value::Keyword(k) => serde_json::Value::String(k.clone()),
        Value::Vector(items) => serde_json::Value::Array(items.iter().map(edn_to_json).collect()),
        Value::Map(entries) => {
            let mut obj = serde_json::Map::new();
            for (k, v) in entries {
                let key = match k {
                    Key::Keyword(name) => name.clone(),
                    Key::String(s) => s.clone(),
                };
                obj.insert(key, edn_to_json(v));
            }
            serde_json::Value::Object(obj)
        }
    }
}

/// Convert tool-input JSON to EDN for storage. Floats have no representation
/// in the record format and are rejected.
pub fn json_to_edn(value: &serde_json::Value) -> anyhow::Result<Value> {
    Ok(match value {
        serde_json::Value::Null => Value::Nil,
        serde_json::Value::Bool(b) => Value::Bool(*b),
        serde_json::Value::Number(n) => Value::Int(
            n.as_i64()
                .ok_or_else(|| anyhow!("non-integer number {n} not representable"))?,
        ),
        serde_json::Value::String(s) => Value::string(s),
        serde_json::Value::Array(items) => {
            Value::Vector(items.iter().map(json_to_edn).collect::<anyhow::Result<_>>()?)
        }
        serde_json::Value::Object(obj) => {
            let mut entries = IndexMap::new();
            for (k, v) in obj {
                entries.insert(Key::keyword(k), json_to_edn(v)?);
            }
            Value::Map(entries)
        }
    })
}
