//! MCP server surface.
//!
//! Exposes the seven task tools over the Model Context Protocol. Transport
//! framing and JSON-RPC dispatch belong to rmcp; this module starts at
//! "typed parameters in, content list out". Every tool call — including the
//! read-only `select-tasks` — passes through one async mutex around the
//! engine, which is the process-wide single-writer gate: mutations are
//! totally ordered and a reader never observes a half-published store.

use std::sync::Arc;

use rmcp::handler::server::ServerHandler;
use rmcp::handler::server::tool::{ToolCallContext, ToolRouter};
use rmcp::handler::server::wrapper::Parameters;
use rmcp::model::{
    CallToolRequestParam, CallToolResult, Content, Implementation, InitializeResult,
    ListToolsResult, ProtocolVersion, ServerCapabilities,
};
use rmcp::service::{RequestContext, RoleServer};
use rmcp::{ErrorData as McpError, tool, tool_router};
use tokio::sync::Mutex;

use crate::engine::{
    AddTaskParams, CompleteTaskParams, DeleteTaskParams, Engine, ReopenTaskParams,
    SelectTasksParams, ToolResult, UpdateTaskParams, WorkOnParams,
};

/// MCP server for mcp-tasks.
#[derive(Clone)]
pub struct McpTasksServer {
    tool_router: ToolRouter<Self>,
    engine: Arc<Mutex<Engine>>,
}

/// Shape an engine result into MCP content items: `[message]`,
/// `[message, data]`, or `[message, data, git-status]`. Errors become
/// `isError` replies with the message first and `{error, metadata}` second.
fn reply(result: ToolResult) -> CallToolResult {
    match result {
        Ok(outcome) => {
            let mut content = vec![Content::text(outcome.message)];
            if let Some(data) = outcome.data {
                content.push(Content::text(pretty(&data)));
            }
            if let Some(git) = outcome.git {
                let git = serde_json::to_value(&git).expect("git report serializes");
                content.push(Content::text(pretty(&git)));
            }
            CallToolResult::success(content)
        }
        Err(err) => {
            log::debug!("tool error ({}): {err}", err.kind());
            CallToolResult::error(vec![
                Content::text(err.to_string()),
                Content::text(pretty(&err.to_reply_json())),
            ])
        }
    }
}

fn pretty(value: &serde_json::Value) -> String {
    serde_json::to_string_pretty(value).expect("json value renders")
}

#[tool_router]
impl McpTasksServer {
    pub fn new(engine: Engine) -> Self {
        Self {
            tool_router: Self::tool_router(),
            engine: Arc::new(Mutex::new(engine)),
        }
    }

    #[tool(
        name = "add-task",
        description = "Add a task, bug, feature, chore, or story to the catalog"
    )]
    async fn add_task(
        &self,
        Parameters(params): Parameters<AddTaskParams>,
    ) -> Result<CallToolResult, McpError> {
        let engine = self.engine.lock().await;
        Ok(reply(engine.add_task(params)))
    }

    #[tool(
        name = "update-task",
        description = "Update fields of an existing task; meta and relations replace whole, shared-context and session-events append"
    )]
    async fn update_task(
        &self,
        Parameters(params): Parameters<UpdateTaskParams>,
    ) -> Result<CallToolResult, McpError> {
        let engine = self.engine.lock().await;
        Ok(reply(engine.update_task(params)))
    }

    #[tool(
        name = "complete-task",
        description = "Close a task by id or unique title; stories archive together with all of their children"
    )]
    async fn complete_task(
        &self,
        Parameters(params): Parameters<CompleteTaskParams>,
    ) -> Result<CallToolResult, McpError> {
        let engine = self.engine.lock().await;
        Ok(reply(engine.complete_task(params)))
    }

    #[tool(
        name = "delete-task",
        description = "Mark a task deleted and archive it; tasks with open children are rejected"
    )]
    async fn delete_task(
        &self,
        Parameters(params): Parameters<DeleteTaskParams>,
    ) -> Result<CallToolResult, McpError> {
        let engine = self.engine.lock().await;
        Ok(reply(engine.delete_task(params)))
    }

    #[tool(
        name = "reopen-task",
        description = "Reopen a closed task, unarchiving it if necessary"
    )]
    async fn reopen_task(
        &self,
        Parameters(params): Parameters<ReopenTaskParams>,
    ) -> Result<CallToolResult, McpError> {
        let engine = self.engine.lock().await;
        Ok(reply(engine.reopen_task(params)))
    }

    #[tool(
        name = "select-tasks",
        description = "Query tasks by id, parent, category, type, status, or title; returns tasks plus match metadata"
    )]
    async fn select_tasks(
        &self,
        Parameters(params): Parameters<SelectTasksParams>,
    ) -> Result<CallToolResult, McpError> {
        let engine = self.engine.lock().await;
        Ok(reply(engine.select_tasks(params)))
    }

    #[tool(
        name = "work-on",
        description = "Start working on a task: records execution state and, when configured, prepares the branch and worktree"
    )]
    async fn work_on(
        &self,
        Parameters(params): Parameters<WorkOnParams>,
    ) -> Result<CallToolResult, McpError> {
        let engine = self.engine.lock().await;
        Ok(reply(engine.work_on(params)))
    }
}

impl ServerHandler for McpTasksServer {
    fn get_info(&self) -> InitializeResult {
        let capabilities = ServerCapabilities::builder().enable_tools().build();

        InitializeResult {
            protocol_version: ProtocolVersion::LATEST,
            capabilities,
            server_info: Implementation {
                name: "mcp-tasks".into(),
                version: env!("CARGO_PKG_VERSION").into(),
                icons: None,
                title: None,
                website_url: None,
            },
            instructions: Some(
                "Hierarchical task management backed by EDN record files, with optional \
                 git commit-per-mutation and per-story worktrees."
                    .into(),
            ),
        }
    }

    async fn list_tools(
        &self,
        _request: Option<rmcp::model::PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, McpError> {
        Ok(ListToolsResult {
            tools: self.tool_router.list_all(),
            next_cursor: None,
        })
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParam,
        context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        let tool_context = ToolCallContext::new(self, request, context);
        self.tool_router.call(tool_context).await
    }
}
