//! Shared test support: a scripted in-memory git implementation and engine
//! constructors over temp directories.

#![allow(dead_code)]

use std::collections::{BTreeSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use mcp_tasks::config::Config;
use mcp_tasks::engine::{AddTaskParams, Engine, ToolOutcome};
use mcp_tasks::git::{Git, GitError, GitResult, PullOutcome, WorktreeInfo};
use mcp_tasks::model::{TaskId, TaskType};

/// Scriptable git state. Tests set it up, hand a clone of the fake to the
/// engine, and inspect it afterwards.
#[derive(Debug, Default)]
pub struct GitState {
    pub current_branch: Option<String>,
    pub branches: BTreeSet<String>,
    pub default_branch: Option<String>,
    pub dirty: bool,
    pub worktrees: Vec<WorktreeInfo>,
    /// Results returned by successive `pull` calls; empty means `UpToDate`.
    pub pull_results: VecDeque<GitResult<PullOutcome>>,
    /// When set, `commit` fails with this message.
    pub fail_commit: Option<String>,
    /// Messages of successful commits, in order.
    pub commits: Vec<String>,
    /// Paths staged by `add` calls.
    pub added: Vec<PathBuf>,
    pub main_repo: PathBuf,
}

/// In-memory [`Git`] implementation driven by [`GitState`].
#[derive(Debug, Clone)]
pub struct ScriptedGit {
    state: Arc<Mutex<GitState>>,
}

impl ScriptedGit {
    pub fn new(main_repo: impl Into<PathBuf>) -> Self {
        let mut state = GitState {
            main_repo: main_repo.into(),
            ..GitState::default()
        };
        state.current_branch = Some("main".to_string());
        state.branches.insert("main".to_string());
        state.default_branch = Some("main".to_string());
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    pub fn state(&self) -> MutexGuard<'_, GitState> {
        self.state.lock().unwrap()
    }

    fn is_worktree_dir(&self, dir: &Path) -> bool {
        self.state()
            .worktrees
            .iter()
            .any(|wt| same_path(&wt.path, dir))
    }
}

fn same_path(a: &Path, b: &Path) -> bool {
    let a = dunce::canonicalize(a).unwrap_or_else(|_| a.to_path_buf());
    let b = dunce::canonicalize(b).unwrap_or_else(|_| b.to_path_buf());
    a == b
}

impl Git for ScriptedGit {
    fn status_porcelain(&self, _dir: &Path) -> GitResult<String> {
        Ok(if self.state().dirty {
            " M some-file.rs\n".to_string()
        } else {
            String::new()
        })
    }

    fn add(&self, _dir: &Path, paths: &[&Path]) -> GitResult<()> {
        let mut state = self.state();
        state.added.extend(paths.iter().map(|p| p.to_path_buf()));
        Ok(())
    }

    fn commit(&self, _dir: &Path, message: &str) -> GitResult<String> {
        let mut state = self.state();
        if let Some(error) = &state.fail_commit {
            return Err(GitError::other(error.clone()));
        }
        state.commits.push(message.to_string());
        Ok(format!("{:040x}", state.commits.len()))
    }

    fn pull(&self, _dir: &Path, _branch: &str) -> GitResult<PullOutcome> {
        self.state()
            .pull_results
            .pop_front()
            .unwrap_or(Ok(PullOutcome::UpToDate))
    }

    fn current_branch(&self, _dir: &Path) -> GitResult<Option<String>> {
        Ok(self.state().current_branch.clone())
    }

    fn default_branch(&self, _dir: &Path) -> GitResult<String> {
        self.state()
            .default_branch
            .clone()
            .ok_or_else(|| GitError::other("Could not determine default branch"))
    }

    fn branch_exists(&self, _dir: &Path, name: &str) -> GitResult<bool> {
        Ok(self.state().branches.contains(name))
    }

    fn checkout(&self, _dir: &Path, name: &str) -> GitResult<()> {
        let mut state = self.state();
        if !state.branches.contains(name) {
            return Err(GitError::other(format!(
                "pathspec '{name}' did not match any file(s) known to git"
            )));
        }
        state.current_branch = Some(name.to_string());
        Ok(())
    }

    fn create_and_checkout(&self, _dir: &Path, name: &str) -> GitResult<()> {
        let mut state = self.state();
        state.branches.insert(name.to_string());
        state.current_branch = Some(name.to_string());
        Ok(())
    }

    fn worktree_list(&self, _dir: &Path) -> GitResult<Vec<WorktreeInfo>> {
        Ok(self.state().worktrees.clone())
    }

    fn worktree_add(&self, _dir: &Path, path: &Path, branch: &str, _base: &str) -> GitResult<()> {
        // Real git creates the directory; the fake does too so execution
        // state can be written into it.
        std::fs::create_dir_all(path)
            .map_err(|e| GitError::other(format!("cannot create worktree dir: {e}")))?;
        let mut state = self.state();
        state.branches.insert(branch.to_string());
        state.worktrees.push(WorktreeInfo {
            path: path.to_path_buf(),
            branch: Some(branch.to_string()),
        });
        Ok(())
    }

    fn worktree_remove(&self, _dir: &Path, path: &Path) -> GitResult<()> {
        let mut state = self.state();
        let before = state.worktrees.len();
        state.worktrees.retain(|wt| !same_path(&wt.path, path));
        if state.worktrees.len() == before {
            return Err(GitError::other(format!(
                "'{}' is not a working tree",
                path.display()
            )));
        }
        Ok(())
    }

    fn in_worktree(&self, dir: &Path) -> GitResult<bool> {
        Ok(self.is_worktree_dir(dir))
    }

    fn main_repo_dir(&self, _dir: &Path) -> GitResult<PathBuf> {
        Ok(self.state().main_repo.clone())
    }
}

/// Engine over `dir` with git integration off.
pub fn engine(dir: &Path) -> Engine {
    Engine::new(Config::new(dir), Box::new(ScriptedGit::new(dir)))
}

/// Engine over `dir` with the given config and a handle to the scripted git.
pub fn engine_with(config: Config, git: &ScriptedGit) -> Engine {
    Engine::new(config, Box::new(git.clone()))
}

/// Add a plain task and return its id.
pub fn add_task(engine: &Engine, title: &str) -> TaskId {
    add(engine, title, None, None)
}

/// Add a story and return its id.
pub fn add_story(engine: &Engine, title: &str) -> TaskId {
    add(engine, title, Some(TaskType::Story), None)
}

/// Add a child of a story and return its id.
pub fn add_child(engine: &Engine, title: &str, parent: TaskId) -> TaskId {
    add(engine, title, None, Some(parent))
}

fn add(engine: &Engine, title: &str, task_type: Option<TaskType>, parent: Option<TaskId>) -> TaskId {
    let outcome = engine
        .add_task(AddTaskParams {
            category: "test".into(),
            title: title.into(),
            task_type,
            description: None,
            design: None,
            parent_id: parent,
            relations: None,
        })
        .expect("add-task succeeds");
    task_id_of(&outcome)
}

/// Pull the created/updated task id out of a mutation reply.
pub fn task_id_of(outcome: &ToolOutcome) -> TaskId {
    outcome
        .data
        .as_ref()
        .and_then(|data| data["task"]["id"].as_u64())
        .expect("reply data carries the task")
}
