//! Subprocess execution.
//!
//! All external commands (git, in practice) run through [`Cmd`] so every
//! invocation gets the same debug logging and timing trace:
//!
//! ```text
//! $ git status --porcelain [project]
//! [mcp-tasks-trace] context=project cmd="git status --porcelain" dur=12.3ms ok=true
//! ```

use std::io::Read;
use std::process::{Command, Output, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use wait_timeout::ChildExt;

/// Command builder. The only way external commands are executed.
#[derive(Debug)]
pub struct Cmd {
    program: String,
    args: Vec<String>,
    current_dir: Option<std::path::PathBuf>,
    context: Option<String>,
    timeout: Option<Duration>,
}

impl Cmd {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            current_dir: None,
            context: None,
            timeout: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<std::path::PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    /// Logging context, typically the directory's short name.
    pub fn context(mut self, ctx: impl Into<String>) -> Self {
        self.context = Some(ctx.into());
        self
    }

    /// Kill the command and fail with `TimedOut` if it runs longer than this.
    pub fn timeout(mut self, duration: Duration) -> Self {
        self.timeout = Some(duration);
        self
    }

    /// Execute and capture output.
    pub fn run(self) -> std::io::Result<Output> {
        let cmd_str = if self.args.is_empty() {
            self.program.clone()
        } else {
            format!("{} {}", self.program, self.args.join(" "))
        };
        match &self.context {
            Some(ctx) => log::debug!("$ {cmd_str} [{ctx}]"),
            None => log::debug!("$ {cmd_str}"),
        }

        let mut command = Command::new(&self.program);
        command.args(&self.args).stdin(Stdio::null());
        if let Some(dir) = &self.current_dir {
            command.current_dir(dir);
        }

        let t0 = Instant::now();
        let result = match self.timeout {
            None => command.output(),
            Some(duration) => run_with_timeout(command, duration, &cmd_str),
        };
        let duration_ms = t0.elapsed().as_secs_f64() * 1000.0;

        match (&result, &self.context) {
            (Ok(output), Some(ctx)) => log::debug!(
                "[mcp-tasks-trace] context={ctx} cmd=\"{cmd_str}\" dur={duration_ms:.1}ms ok={}",
                output.status.success()
            ),
            (Ok(output), None) => log::debug!(
                "[mcp-tasks-trace] cmd=\"{cmd_str}\" dur={duration_ms:.1}ms ok={}",
                output.status.success()
            ),
            (Err(e), Some(ctx)) => log::debug!(
                "[mcp-tasks-trace] context={ctx} cmd=\"{cmd_str}\" dur={duration_ms:.1}ms err=\"{e}\""
            ),
            (Err(e), None) => log::debug!(
                "[mcp-tasks-trace] cmd=\"{cmd_str}\" dur={duration_ms:.1}ms err=\"{e}\""
            ),
        }
        result
    }
}

/// Run with piped output and a deadline. Reader threads drain the pipes so a
/// chatty child can't block on a full pipe while we wait on it.
fn run_with_timeout(
    mut command: Command,
    duration: Duration,
    cmd_str: &str,
) -> std::io::Result<Output> {
    command.stdout(Stdio::piped()).stderr(Stdio::piped());
    let mut child = command.spawn()?;

    let mut stdout_pipe = child.stdout.take().expect("stdout was piped");
    let mut stderr_pipe = child.stderr.take().expect("stderr was piped");
    let stdout_handle = thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = stdout_pipe.read_to_end(&mut buf);
        buf
    });
    let stderr_handle = thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = stderr_pipe.read_to_end(&mut buf);
        buf
    });

    match child.wait_timeout(duration)? {
        Some(status) => {
            let stdout = stdout_handle.join().unwrap_or_default();
            let stderr = stderr_handle.join().unwrap_or_default();
            Ok(Output {
                status,
                stdout,
                stderr,
            })
        }
        None => {
            let _ = child.kill();
            let _ = child.wait();
            Err(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                format!("Command timed out after {}s: {cmd_str}", duration.as_secs()),
            ))
        }
    }
}
