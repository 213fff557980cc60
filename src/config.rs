//! Configuration and path resolution.
//!
//! The server operates on a base directory (usually the repository root the
//! host launched it in). Task data lives in `<base>/.mcp-tasks/`; an optional
//! `<base>/.mcp-tasks.edn` turns on git integration and branch/worktree
//! management. A missing config file means all defaults; a malformed one is a
//! startup error naming the path.

use std::path::{Path, PathBuf};

use anyhow::{Context, bail};

use crate::edn;

pub const CONFIG_FILE: &str = ".mcp-tasks.edn";
pub const DATA_DIR: &str = ".mcp-tasks";
pub const TASKS_FILE: &str = "tasks.ednl";
pub const COMPLETE_FILE: &str = "complete.ednl";

#[derive(Debug, Clone)]
pub struct Config {
    pub base_dir: PathBuf,
    /// Commit-per-mutation and pull-before-write.
    pub use_git: bool,
    branch_management: bool,
    /// Per-story worktree lifecycle. Implies branch management.
    pub worktree_management: bool,
    /// Overrides default-branch auto-detection.
    pub base_branch: Option<String>,
}

impl Config {
    /// Defaults with everything disabled.
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Config {
            base_dir: base_dir.into(),
            use_git: false,
            branch_management: false,
            worktree_management: false,
            base_branch: None,
        }
    }

    /// Load `<base>/.mcp-tasks.edn` if present.
    pub fn load(base_dir: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let mut config = Config::new(base_dir);
        let path = config.base_dir.join(CONFIG_FILE);
        let text = match std::fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(config),
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read {}", path.display()));
            }
        };

        let value = edn::parse(&text)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        if value.as_map().is_none() {
            bail!("{}: config must be a single map", path.display());
        }

        config.use_git = read_flag(&value, "use-git?", &path)?;
        config.branch_management = read_flag(&value, "branch-management?", &path)?;
        config.worktree_management = read_flag(&value, "worktree-management?", &path)?;
        config.base_branch = match value.get("base-branch") {
            None => None,
            Some(v) => Some(
                v.as_str()
                    .with_context(|| format!("{}: :base-branch must be a string", path.display()))?
                    .to_string(),
            ),
        };
        Ok(config)
    }

    /// Whether `work-on` should derive and check out branches. Worktree
    /// management implies branch management.
    pub fn branch_management(&self) -> bool {
        self.branch_management || self.worktree_management
    }

    pub fn set_branch_management(&mut self, enabled: bool) {
        self.branch_management = enabled;
    }

    pub fn data_dir(&self) -> PathBuf {
        self.base_dir.join(DATA_DIR)
    }

    pub fn tasks_file(&self) -> PathBuf {
        self.data_dir().join(TASKS_FILE)
    }

    pub fn complete_file(&self) -> PathBuf {
        self.data_dir().join(COMPLETE_FILE)
    }

    /// The two record files, relative to the base directory, in the form
    /// passed to `git add`.
    pub fn data_rel_paths() -> [&'static Path; 2] {
        [
            Path::new(".mcp-tasks/tasks.ednl"),
            Path::new(".mcp-tasks/complete.ednl"),
        ]
    }
}

fn read_flag(value: &edn::Value, key: &str, path: &Path) -> anyhow::Result<bool> {
    match value.get(key) {
        None => Ok(false),
        Some(v) => v
            .as_bool()
            .with_context(|| format!("{}: :{key} must be a boolean", path.display())),
    }
}
