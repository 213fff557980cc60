//! Tool-level error types.
//!
//! Every tool failure is one of these kinds; the server shapes them into an
//! `isError` reply whose first content item is the message and whose second
//! is `{error, metadata}`. Pull-phase git failures abort the mutation;
//! commit-phase failures do not reach this type (they ride in the git-status
//! content item instead).

use std::fmt;

use serde_json::json;

use crate::model::TaskId;
use crate::validate::COLLECTION_SIZE_LIMIT;

#[derive(Debug)]
pub enum ToolError {
    /// Missing identifier, bad enum value, conflicting filters, limit <= 0.
    InvalidInput {
        message: String,
        metadata: serde_json::Value,
    },
    /// Task, parent, or title lookup found nothing.
    NotFound { message: String },
    /// A title lookup matched more than one task.
    Ambiguous { message: String, count: usize },
    /// Referential integrity: parent not a story, relation target missing.
    Integrity {
        message: String,
        missing_ids: Vec<TaskId>,
    },
    /// A proposed `blocked-by` edge closes a cycle. The path starts and ends
    /// with the same id.
    Cycle { path: Vec<TaskId> },
    /// Lifecycle violation: already deleted, already open, children block
    /// the operation, and so on.
    State {
        message: String,
        metadata: serde_json::Value,
    },
    /// `shared-context` or `session-events` grew past the serialized cap.
    SizeLimit { field: &'static str, actual: usize },
    /// Pull reported a merge conflict; the mutation was aborted.
    GitConflict { message: String },
    /// Pull failed to reach the remote; the mutation was aborted.
    GitNetwork { message: String },
    /// Reading or writing the record files failed.
    Filesystem { message: String },
}

impl ToolError {
    pub fn invalid_input(message: impl Into<String>) -> Self {
        ToolError::InvalidInput {
            message: message.into(),
            metadata: json!({}),
        }
    }

    pub fn invalid_input_with(message: impl Into<String>, metadata: serde_json::Value) -> Self {
        ToolError::InvalidInput {
            message: message.into(),
            metadata,
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        ToolError::NotFound {
            message: message.into(),
        }
    }

    pub fn state(message: impl Into<String>, metadata: serde_json::Value) -> Self {
        ToolError::State {
            message: message.into(),
            metadata,
        }
    }

    pub fn filesystem(message: impl Into<String>) -> Self {
        ToolError::Filesystem {
            message: message.into(),
        }
    }

    /// Stable kind tag included in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            ToolError::InvalidInput { .. } => "invalid-input",
            ToolError::NotFound { .. } => "not-found",
            ToolError::Ambiguous { .. } => "ambiguous",
            ToolError::Integrity { .. } => "integrity",
            ToolError::Cycle { .. } => "cycle",
            ToolError::State { .. } => "state",
            ToolError::SizeLimit { .. } => "size-limit",
            ToolError::GitConflict { .. } => "git-conflict",
            ToolError::GitNetwork { .. } => "git-network",
            ToolError::Filesystem { .. } => "filesystem",
        }
    }

    /// Structured details for the second reply item.
    pub fn metadata(&self) -> serde_json::Value {
        match self {
            ToolError::InvalidInput { metadata, .. } | ToolError::State { metadata, .. } => {
                metadata.clone()
            }
            ToolError::NotFound { .. } => json!({}),
            ToolError::Ambiguous { count, .. } => json!({ "count": count }),
            ToolError::Integrity { missing_ids, .. } => json!({ "missing-ids": missing_ids }),
            ToolError::Cycle { path } => json!({ "cycle": path }),
            ToolError::SizeLimit { field, actual } => json!({
                "field": field,
                "limit-bytes": COLLECTION_SIZE_LIMIT,
                "actual-bytes": actual,
            }),
            ToolError::GitConflict { .. }
            | ToolError::GitNetwork { .. }
            | ToolError::Filesystem { .. } => json!({}),
        }
    }

    /// The full `{error, metadata}` object for the second content item.
    pub fn to_reply_json(&self) -> serde_json::Value {
        json!({ "error": self.to_string(), "metadata": self.metadata() })
    }
}

impl fmt::Display for ToolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ToolError::InvalidInput { message, .. }
            | ToolError::NotFound { message }
            | ToolError::Ambiguous { message, .. }
            | ToolError::Integrity { message, .. }
            | ToolError::State { message, .. } => write!(f, "{message}"),
            ToolError::Cycle { path } => {
                let rendered: Vec<String> = path.iter().map(|id| format!("#{id}")).collect();
                write!(f, "Circular dependency detected: {}", rendered.join(" -> "))
            }
            ToolError::SizeLimit { field, actual } => write!(
                f,
                "{field} exceeds the {} KB limit ({actual} bytes serialized)",
                COLLECTION_SIZE_LIMIT / 1024
            ),
            ToolError::GitConflict { message } => {
                write!(f, "Pull failed with a conflict; no changes written: {message}")
            }
            ToolError::GitNetwork { message } => {
                write!(f, "Pull failed to reach the remote; no changes written: {message}")
            }
            ToolError::Filesystem { message } => write!(f, "{message}"),
        }
    }
}

impl std::error::Error for ToolError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycle_display_and_metadata() {
        let err = ToolError::Cycle { path: vec![1, 2, 1] };
        assert_eq!(
            err.to_string(),
            "Circular dependency detected: #1 -> #2 -> #1"
        );
        assert_eq!(err.metadata()["cycle"], json!([1, 2, 1]));
        assert_eq!(err.kind(), "cycle");
    }

    #[test]
    fn test_reply_json_shape() {
        let err = ToolError::state(
            "Cannot delete task with children",
            json!({ "non-closed-children": [21] }),
        );
        let reply = err.to_reply_json();
        assert_eq!(reply["error"], "Cannot delete task with children");
        assert_eq!(reply["metadata"]["non-closed-children"], json!([21]));
    }

    #[test]
    fn test_size_limit_mentions_bytes() {
        let err = ToolError::SizeLimit {
            field: "shared-context",
            actual: 52_000,
        };
        assert!(err.to_string().contains("52000 bytes"));
        assert_eq!(err.metadata()["limit-bytes"], json!(51_200));
    }
}
