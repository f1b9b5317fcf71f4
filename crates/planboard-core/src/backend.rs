use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::Settings;
use crate::schedule::{Commit, TaskPatch, plan_commit};
use crate::target::{DropPosition, DropTarget};
use crate::task::{Task, TaskList, list_order};

/// Persistence collaborator the engine commits drops to.
///
/// Mutations are fire-and-forget from the engine's side: implementations
/// dispatch the write however they like and surface their own failures.
pub trait TaskBackend {
    /// Current tasks of `list_id`, in any order.
    fn tasks_in_list(&self, list_id: &str) -> Vec<Task>;

    fn reorder_task(&mut self, task_id: &str, list_id: &str, target_task_id: &str, position: DropPosition, patch: &TaskPatch);

    fn move_task(&mut self, task_id: &str, list_id: &str, patch: &TaskPatch);

    fn assign_task_to_day(&mut self, task_id: &str, day: NaiveDate, patch: &TaskPatch);

    fn assign_task_to_slot(&mut self, task_id: &str, day: NaiveDate, hour: u8, patch: &TaskPatch);
}

/// Plans the commit for dropping `task` on `target` and sends it to
/// `backend` as a single mutation call.
pub fn commit_drop<B>(backend: &mut B, task: &Task, target: &DropTarget, settings: &Settings) -> Commit
where
    B: TaskBackend + ?Sized,
{
    let siblings = match target {
        DropTarget::Task { list_id, .. } | DropTarget::List { list_id } => backend.tasks_in_list(list_id),
        DropTarget::Day { .. } | DropTarget::CalendarSlot { .. } => Vec::new(),
    };
    let commit = plan_commit(task, target, &siblings, settings);
    match &commit.target {
        DropTarget::Task {
            list_id,
            task_id,
            position,
        } => backend.reorder_task(&commit.task_id, list_id, task_id, *position, &commit.patch),
        DropTarget::List { list_id } => backend.move_task(&commit.task_id, list_id, &commit.patch),
        DropTarget::Day { day, .. } => backend.assign_task_to_day(&commit.task_id, *day, &commit.patch),
        DropTarget::CalendarSlot { day, hour } => backend.assign_task_to_slot(&commit.task_id, *day, *hour, &commit.patch),
    }
    commit
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum MutationRecord {
    #[serde(rename_all = "camelCase")]
    Reorder {
        task_id: String,
        list_id: String,
        target_task_id: String,
        position: DropPosition,
        patch: TaskPatch,
    },
    #[serde(rename_all = "camelCase")]
    Move {
        task_id: String,
        list_id: String,
        patch: TaskPatch,
    },
    #[serde(rename_all = "camelCase")]
    AssignDay {
        task_id: String,
        day: NaiveDate,
        patch: TaskPatch,
    },
    #[serde(rename_all = "camelCase")]
    AssignSlot {
        task_id: String,
        day: NaiveDate,
        hour: u8,
        patch: TaskPatch,
    },
}

/// Task store held in memory. Applies every patch immediately and keeps a
/// log of the calls it received.
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    tasks: BTreeMap<String, Task>,
    lists: Vec<TaskList>,
    mutations: Vec<MutationRecord>,
    clock: Option<DateTime<Utc>>,
}

impl MemoryBackend {
    pub fn new(tasks: Vec<Task>, lists: Vec<TaskList>) -> Self {
        Self {
            tasks: tasks.into_iter().map(|t| (t.id.clone(), t)).collect(),
            lists,
            mutations: Vec::new(),
            clock: None,
        }
    }

    /// Fixes the timestamp written to `updated_at`; without it the wall
    /// clock is used.
    pub fn with_clock(mut self, now: DateTime<Utc>) -> Self {
        self.clock = Some(now);
        self
    }

    pub fn task(&self, task_id: &str) -> Option<&Task> {
        self.tasks.get(task_id)
    }

    pub fn tasks(&self) -> impl Iterator<Item = &Task> {
        self.tasks.values()
    }

    pub fn lists(&self) -> &[TaskList] {
        &self.lists
    }

    /// The non-deletable system list, if one is known.
    pub fn inbox(&self) -> Option<&TaskList> {
        self.lists.iter().find(|list| list.is_system)
    }

    pub fn mutations(&self) -> &[MutationRecord] {
        &self.mutations
    }

    /// Tasks of `list_id` in display order.
    pub fn ordered_list(&self, list_id: &str) -> Vec<&Task> {
        let mut tasks: Vec<&Task> = self
            .tasks
            .values()
            .filter(|t| t.list_id.as_deref() == Some(list_id))
            .collect();
        tasks.sort_by(|a, b| list_order(a, b));
        tasks
    }

    fn apply(&mut self, task_id: &str, patch: &TaskPatch) {
        let now = self.clock.unwrap_or_else(Utc::now);
        let Some(task) = self.tasks.get_mut(task_id) else {
            warn!(task_id, "mutation for unknown task ignored");
            return;
        };
        patch.apply(task);
        task.updated_at = Some(now);
        for update in &patch.reindexed {
            match self.tasks.get_mut(&update.task_id) {
                Some(sibling) => sibling.sort_index = Some(update.sort_index),
                None => warn!(task_id = %update.task_id, "re-index for unknown task ignored"),
            }
        }
        debug!(task_id, reindexed = patch.reindexed.len(), "applied task patch");
    }

    fn check_list(&self, list_id: &str) {
        if !self.lists.is_empty() && !self.lists.iter().any(|list| list.id == list_id) {
            warn!(list_id, "task moved into a list the store does not know");
        }
    }
}

impl TaskBackend for MemoryBackend {
    fn tasks_in_list(&self, list_id: &str) -> Vec<Task> {
        self.tasks
            .values()
            .filter(|t| t.list_id.as_deref() == Some(list_id))
            .cloned()
            .collect()
    }

    fn reorder_task(&mut self, task_id: &str, list_id: &str, target_task_id: &str, position: DropPosition, patch: &TaskPatch) {
        info!(task_id, list_id, target_task_id, ?position, "reorder task");
        self.check_list(list_id);
        self.apply(task_id, patch);
        self.mutations.push(MutationRecord::Reorder {
            task_id: task_id.to_string(),
            list_id: list_id.to_string(),
            target_task_id: target_task_id.to_string(),
            position,
            patch: patch.clone(),
        });
    }

    fn move_task(&mut self, task_id: &str, list_id: &str, patch: &TaskPatch) {
        info!(task_id, list_id, "move task");
        self.check_list(list_id);
        self.apply(task_id, patch);
        self.mutations.push(MutationRecord::Move {
            task_id: task_id.to_string(),
            list_id: list_id.to_string(),
            patch: patch.clone(),
        });
    }

    fn assign_task_to_day(&mut self, task_id: &str, day: NaiveDate, patch: &TaskPatch) {
        info!(task_id, %day, "assign task to day");
        self.apply(task_id, patch);
        self.mutations.push(MutationRecord::AssignDay {
            task_id: task_id.to_string(),
            day,
            patch: patch.clone(),
        });
    }

    fn assign_task_to_slot(&mut self, task_id: &str, day: NaiveDate, hour: u8, patch: &TaskPatch) {
        info!(task_id, %day, hour, "assign task to slot");
        self.apply(task_id, patch);
        self.mutations.push(MutationRecord::AssignSlot {
            task_id: task_id.to_string(),
            day,
            hour,
            patch: patch.clone(),
        });
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::{MemoryBackend, MutationRecord, TaskBackend};
    use crate::schedule::{SortUpdate, TaskPatch};
    use crate::task::{Task, TaskList};

    fn inbox() -> TaskList {
        TaskList {
            id: "inbox".to_string(),
            name: "Inbox".to_string(),
            sort_index: 0,
            is_system: true,
        }
    }

    #[test]
    fn move_applies_patch_and_reindexes_siblings() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).single().expect("valid instant");
        let mut backend = MemoryBackend::new(
            vec![
                Task::new("a", "A").in_list("inbox", 1),
                Task::new("x", "X").in_list("work", 1),
            ],
            vec![inbox()],
        )
        .with_clock(now);

        let patch = TaskPatch {
            list_id: Some("inbox".to_string()),
            sort_index: Some(1024),
            reindexed: vec![SortUpdate {
                task_id: "a".to_string(),
                sort_index: 2048,
            }],
            ..TaskPatch::default()
        };
        backend.move_task("x", "inbox", &patch);

        let moved = backend.task("x").expect("task x");
        assert_eq!(moved.list_id.as_deref(), Some("inbox"));
        assert_eq!(moved.updated_at, Some(now));
        let order: Vec<&str> = backend.ordered_list("inbox").iter().map(|t| t.id.as_str()).collect();
        assert_eq!(order, vec!["x", "a"]);
        assert_eq!(backend.tasks_in_list("inbox").len(), 2);
        assert!(matches!(backend.mutations(), [MutationRecord::Move { .. }]));
        assert_eq!(backend.inbox().map(|l| l.id.as_str()), Some("inbox"));
    }

    #[test]
    fn unknown_task_is_ignored_but_recorded() {
        let mut backend = MemoryBackend::new(vec![], vec![]);
        backend.move_task("ghost", "inbox", &TaskPatch::default());
        assert_eq!(backend.tasks().count(), 0);
        assert_eq!(backend.mutations().len(), 1);
    }
}
