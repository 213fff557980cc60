//! In-memory task store.
//!
//! [`TaskStore`] is an owned value indexing the records of both files:
//! `tasks.ednl` (active) and `complete.ednl` (archived). The engine loads a
//! store per mutation, works on a clone, and only persists the clone after
//! validation succeeds, so a failed mutation never leaves partial state in
//! memory or on disk.

use std::collections::HashMap;

use anyhow::bail;
use indexmap::IndexMap;

use crate::config::Config;
use crate::model::{Task, TaskId};

pub mod codec;

#[derive(Debug, Clone, Default)]
pub struct TaskStore {
    active: IndexMap<TaskId, Task>,
    archived: IndexMap<TaskId, Task>,
    /// parent id -> child ids, across both files, in file order.
    children: HashMap<TaskId, Vec<TaskId>>,
    next_id: TaskId,
}

impl TaskStore {
    pub fn empty() -> Self {
        TaskStore {
            next_id: 1,
            ..TaskStore::default()
        }
    }

    /// Parse both record files and rebuild the indices. Ids must be unique
    /// across the union of the two files.
    pub fn load(config: &Config) -> anyhow::Result<Self> {
        let mut store = TaskStore::empty();
        for record in codec::read_records(&config.tasks_file())? {
            let task = Task::from_edn(&record)?;
            if store.active.contains_key(&task.id) {
                bail!("duplicate task id #{} in tasks.ednl", task.id);
            }
            store.active.insert(task.id, task);
        }
        for record in codec::read_records(&config.complete_file())? {
            let task = Task::from_edn(&record)?;
            if store.active.contains_key(&task.id) || store.archived.contains_key(&task.id) {
                bail!("duplicate task id #{} in complete.ednl", task.id);
            }
            store.archived.insert(task.id, task);
        }
        store.reindex();
        Ok(store)
    }

    /// Atomically rewrite both record files from the current state.
    pub fn save(&self, config: &Config) -> anyhow::Result<()> {
        let active: Vec<_> = self.active.values().map(Task::to_edn).collect();
        codec::write_records(&config.tasks_file(), &active)?;
        let archived: Vec<_> = self.archived.values().map(Task::to_edn).collect();
        codec::write_records(&config.complete_file(), &archived)?;
        Ok(())
    }

    fn reindex(&mut self) {
        self.children.clear();
        let mut max_id = 0;
        for task in self.active.values().chain(self.archived.values()) {
            max_id = max_id.max(task.id);
            if let Some(parent) = task.parent_id {
                self.children.entry(parent).or_default().push(task.id);
            }
        }
        self.next_id = max_id + 1;
    }

    /// Next id to assign; strictly exceeds every id ever observed.
    pub fn next_id(&self) -> TaskId {
        self.next_id
    }

    pub fn allocate_id(&mut self) -> TaskId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    pub fn get(&self, id: TaskId) -> Option<&Task> {
        self.active.get(&id).or_else(|| self.archived.get(&id))
    }

    pub fn get_active(&self, id: TaskId) -> Option<&Task> {
        self.active.get(&id)
    }

    pub fn is_archived(&self, id: TaskId) -> bool {
        self.archived.contains_key(&id)
    }

    pub fn contains(&self, id: TaskId) -> bool {
        self.active.contains_key(&id) || self.archived.contains_key(&id)
    }

    pub fn active_tasks(&self) -> impl Iterator<Item = &Task> {
        self.active.values()
    }

    pub fn archived_tasks(&self) -> impl Iterator<Item = &Task> {
        self.archived.values()
    }

    pub fn children_of(&self, id: TaskId) -> &[TaskId] {
        self.children.get(&id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn parent_of(&self, id: TaskId) -> Option<TaskId> {
        self.get(id).and_then(|task| task.parent_id)
    }

    /// Active tasks whose title matches exactly.
    pub fn find_active_by_title(&self, title: &str) -> Vec<&Task> {
        self.active
            .values()
            .filter(|task| task.title == title)
            .collect()
    }

    /// Insert a new active task. The caller assigns ids via
    /// [`allocate_id`](Self::allocate_id).
    pub fn insert(&mut self, task: Task) {
        debug_assert!(!self.contains(task.id), "inserting duplicate id");
        if task.id >= self.next_id {
            self.next_id = task.id + 1;
        }
        self.active.insert(task.id, task);
        self.reindex_parents_only();
    }

    /// Replace an existing task (active or archived) with a new value.
    pub fn replace(&mut self, task: Task) {
        if self.archived.contains_key(&task.id) {
            self.archived.insert(task.id, task);
        } else {
            self.active.insert(task.id, task);
        }
        self.reindex_parents_only();
    }

    /// Move a task from `tasks.ednl` to `complete.ednl`, appending it to the
    /// archive in call order.
    pub fn archive(&mut self, id: TaskId) {
        if let Some(task) = self.active.shift_remove(&id) {
            self.archived.insert(id, task);
        }
    }

    /// Move a task back from the archive, appending to the active file.
    pub fn unarchive(&mut self, id: TaskId) {
        if let Some(task) = self.archived.shift_remove(&id) {
            self.active.insert(id, task);
        }
    }

    /// Rebuild the parent index without touching `next_id`. Cheap enough to
    /// run after every structural change at this store's scale.
    fn reindex_parents_only(&mut self) {
        self.children.clear();
        for task in self.active.values().chain(self.archived.values()) {
            if let Some(parent) = task.parent_id {
                self.children.entry(parent).or_default().push(task.id);
            }
        }
    }
}
