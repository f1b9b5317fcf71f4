//! Scheduling state of a task and the rules that turn a drop into a patch.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::Settings;
use crate::datetime::{end_of_local_day, local_day, local_minutes_to_utc};
use crate::target::{DropPosition, DropTarget};
use crate::task::{Task, list_order};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum ScheduleState {
    Unscheduled,
    DateOnly,
    Timed,
}

impl ScheduleState {
    pub fn of(task: &Task) -> Self {
        if task.planned_start.is_some() || task.planned_end.is_some() {
            Self::Timed
        } else if task.due_date.is_some() {
            Self::DateOnly
        } else {
            Self::Unscheduled
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SortUpdate {
    pub task_id: String,
    pub sort_index: i64,
}

/// Field changes for the dragged task. Outer `None` leaves a field alone,
/// `Some(None)` clears it.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TaskPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub list_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort_index: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<Option<NaiveDate>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub planned_start: Option<Option<DateTime<Utc>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub planned_end: Option<Option<DateTime<Utc>>>,
    /// Siblings whose sort index changed because the list was re-sequenced.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub reindexed: Vec<SortUpdate>,
}

impl TaskPatch {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    /// Applies the dragged task's own changes. `reindexed` is left to the
    /// caller since it concerns other tasks.
    pub fn apply(&self, task: &mut Task) {
        if let Some(list_id) = &self.list_id {
            task.list_id = Some(list_id.clone());
        }
        if let Some(sort_index) = self.sort_index {
            task.sort_index = Some(sort_index);
        }
        if let Some(due_date) = self.due_date {
            task.due_date = due_date;
        }
        if let Some(planned_start) = self.planned_start {
            task.planned_start = planned_start;
        }
        if let Some(planned_end) = self.planned_end {
            task.planned_end = planned_end;
        }
    }
}

/// A drop translated into a mutation: the target it resolved to (after any
/// fallback) and the patch for the dragged task.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Commit {
    pub task_id: String,
    pub target: DropTarget,
    pub patch: TaskPatch,
}

/// Builds the commit for dropping `task` on `target`.
///
/// `siblings` are the tasks currently in the target list; they are only
/// read for list and task targets and may include `task` itself.
#[tracing::instrument(skip_all, fields(task_id = %task.id, target = target.kind_name()))]
pub fn plan_commit(task: &Task, target: &DropTarget, siblings: &[Task], settings: &Settings) -> Commit {
    let (target, patch) = match target {
        DropTarget::List { list_id } => (target.clone(), list_patch(task, list_id, siblings, None, settings)),
        DropTarget::Task {
            list_id,
            task_id,
            position,
        } => {
            if siblings.iter().any(|t| &t.id == task_id && t.id != task.id) {
                let anchor = Some((task_id.as_str(), *position));
                (target.clone(), list_patch(task, list_id, siblings, anchor, settings))
            } else {
                debug!(anchor = %task_id, "anchor task no longer in list; appending instead");
                let fallback = DropTarget::List {
                    list_id: list_id.clone(),
                };
                (fallback, list_patch(task, list_id, siblings, None, settings))
            }
        }
        DropTarget::Day { day, .. } => (target.clone(), day_patch(task, *day, settings)),
        DropTarget::CalendarSlot { day, hour } => (target.clone(), slot_patch(task, *day, *hour, settings)),
    };
    Commit {
        task_id: task.id.clone(),
        target,
        patch,
    }
}

/// Planned window a calendar slot drop would give `task`.
pub fn slot_window(task: &Task, day: NaiveDate, hour: u8, settings: &Settings) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = local_minutes_to_utc(&settings.timezone, day, i64::from(hour) * 60);
    let end = start + Duration::minutes(slot_duration_minutes(task, settings));
    let day_end = end_of_local_day(&settings.timezone, day);
    (start, end.min(day_end))
}

/// Duration for a calendar slot drop: the task's current planned span,
/// else its estimate, else the configured default, never below the floor.
pub fn slot_duration_minutes(task: &Task, settings: &Settings) -> i64 {
    let base = task
        .planned_minutes()
        .or_else(|| task.estimate_minutes.filter(|m| *m > 0).map(i64::from))
        .unwrap_or_else(|| i64::from(settings.default_duration_minutes));
    base.max(i64::from(settings.min_slot_minutes))
}

fn day_patch(task: &Task, day: NaiveDate, settings: &Settings) -> TaskPatch {
    let mut patch = TaskPatch {
        due_date: Some(Some(day)),
        ..TaskPatch::default()
    };
    if ScheduleState::of(task) == ScheduleState::Timed {
        let planned_day = task
            .planned_start
            .or(task.planned_end)
            .map(|dt| local_day(&settings.timezone, dt));
        if planned_day == Some(day) {
            debug!(%day, "task already timed on this day; keeping planned window");
        } else {
            patch.planned_start = Some(None);
            patch.planned_end = Some(None);
        }
    }
    patch
}

fn slot_patch(task: &Task, day: NaiveDate, hour: u8, settings: &Settings) -> TaskPatch {
    let (start, end) = slot_window(task, day, hour, settings);
    TaskPatch {
        due_date: Some(Some(day)),
        planned_start: Some(Some(start)),
        planned_end: Some(Some(end)),
        ..TaskPatch::default()
    }
}

fn list_patch(
    task: &Task,
    list_id: &str,
    siblings: &[Task],
    anchor: Option<(&str, DropPosition)>,
    settings: &Settings,
) -> TaskPatch {
    let mut ordered: Vec<&Task> = siblings.iter().filter(|t| t.id != task.id).collect();
    ordered.sort_by(|a, b| list_order(a, b));

    let insert_at = anchor
        .and_then(|(anchor_id, position)| {
            let idx = ordered.iter().position(|t| t.id == anchor_id)?;
            Some(match position {
                DropPosition::Before => idx,
                DropPosition::After => idx + 1,
            })
        })
        .unwrap_or(ordered.len());

    let prev = insert_at.checked_sub(1).and_then(|i| ordered.get(i)).map(|t| t.sort_index);
    let next = ordered.get(insert_at).map(|t| t.sort_index);
    let gap = settings.sort_gap;

    let slotted = match (prev, next) {
        (None, None) => Some(gap),
        (Some(Some(p)), None) => p.checked_add(gap),
        (None, Some(Some(n))) => n.checked_sub(gap),
        (Some(Some(p)), Some(Some(n))) => n.checked_sub(p).filter(|span| *span >= 2).map(|span| p + span / 2),
        _ => None,
    };

    let mut patch = TaskPatch {
        list_id: Some(list_id.to_string()),
        ..TaskPatch::default()
    };
    match slotted {
        Some(sort_index) => patch.sort_index = Some(sort_index),
        None => {
            debug!(list_id, siblings = ordered.len(), "no gap between neighbours; re-sequencing list");
            ordered.insert(insert_at, task);
            // Ranks run up to `len * step`, which must stay within i64.
            let len = i64::try_from(ordered.len()).unwrap_or(i64::MAX);
            let step = gap.min(i64::MAX / len.max(1));
            let mut rank = 0_i64;
            for t in &ordered {
                rank = rank.saturating_add(step);
                if t.id == task.id {
                    patch.sort_index = Some(rank);
                } else if t.sort_index != Some(rank) {
                    patch.reindexed.push(SortUpdate {
                        task_id: t.id.clone(),
                        sort_index: rank,
                    });
                }
            }
        }
    }
    patch
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, TimeZone, Utc};

    use super::{ScheduleState, SortUpdate, plan_commit, slot_window};
    use crate::config::Settings;
    use crate::target::{DropPosition, DropTarget};
    use crate::task::{Task, list_order};

    fn day(key: &str) -> NaiveDate {
        NaiveDate::parse_from_str(key, "%Y-%m-%d").expect("valid day")
    }

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0).single().expect("valid instant")
    }

    fn task_target(task_id: &str, position: DropPosition) -> DropTarget {
        DropTarget::Task {
            list_id: "inbox".to_string(),
            task_id: task_id.to_string(),
            position,
        }
    }

    #[test]
    fn state_follows_time_fields() {
        let mut task = Task::new("t", "T");
        assert_eq!(ScheduleState::of(&task), ScheduleState::Unscheduled);
        task.due_date = Some(day("2024-05-01"));
        assert_eq!(ScheduleState::of(&task), ScheduleState::DateOnly);
        task.planned_end = Some(at(2024, 5, 1, 10, 0));
        assert_eq!(ScheduleState::of(&task), ScheduleState::Timed);
    }

    #[test]
    fn slot_uses_estimate_with_floor() {
        let settings = Settings::default();
        let mut task = Task::new("t", "T");
        task.estimate_minutes = Some(90);
        let (start, end) = slot_window(&task, day("2024-05-01"), 9, &settings);
        assert_eq!(start, at(2024, 5, 1, 9, 0));
        assert_eq!(end, at(2024, 5, 1, 10, 30));

        task.estimate_minutes = Some(5);
        let (_, end) = slot_window(&task, day("2024-05-01"), 9, &settings);
        assert_eq!(end, at(2024, 5, 1, 9, 15));

        task.estimate_minutes = None;
        let (_, end) = slot_window(&task, day("2024-05-01"), 9, &settings);
        assert_eq!(end, at(2024, 5, 1, 10, 0));
    }

    #[test]
    fn slot_keeps_existing_planned_span() {
        let mut task = Task::new("t", "T");
        task.estimate_minutes = Some(30);
        task.planned_start = Some(at(2024, 4, 30, 14, 0));
        task.planned_end = Some(at(2024, 4, 30, 16, 0));
        let (start, end) = slot_window(&task, day("2024-05-01"), 8, &Settings::default());
        assert_eq!(start, at(2024, 5, 1, 8, 0));
        assert_eq!(end, at(2024, 5, 1, 10, 0));
    }

    #[test]
    fn slot_end_clamps_to_midnight() {
        let mut task = Task::new("t", "T");
        task.estimate_minutes = Some(120);
        let commit = plan_commit(
            &task,
            &DropTarget::CalendarSlot {
                day: day("2024-05-01"),
                hour: 23,
            },
            &[],
            &Settings::default(),
        );
        assert_eq!(commit.patch.planned_start, Some(Some(at(2024, 5, 1, 23, 0))));
        assert_eq!(commit.patch.planned_end, Some(Some(at(2024, 5, 2, 0, 0))));
        assert_eq!(commit.patch.due_date, Some(Some(day("2024-05-01"))));

        commit.patch.apply(&mut task);
        assert_eq!(ScheduleState::of(&task), ScheduleState::Timed);
    }

    #[test]
    fn slot_respects_configured_timezone() {
        let settings = Settings {
            timezone: chrono_tz::Europe::Berlin,
            ..Settings::default()
        };
        let task = Task::new("t", "T");
        let (start, end) = slot_window(&task, day("2024-07-01"), 9, &settings);
        assert_eq!(start, at(2024, 7, 1, 7, 0));
        assert_eq!(end, at(2024, 7, 1, 8, 0));
    }

    #[test]
    fn day_drop_on_unscheduled_task_sets_date_only() {
        let task = Task::new("t", "T");
        let commit = plan_commit(
            &task,
            &DropTarget::Day {
                day: day("2024-05-01"),
                origin: None,
            },
            &[],
            &Settings::default(),
        );
        let mut dropped = task.clone();
        commit.patch.apply(&mut dropped);
        assert_eq!(ScheduleState::of(&dropped), ScheduleState::DateOnly);
        assert_eq!(dropped.due_date, Some(day("2024-05-01")));
        assert_eq!(dropped.planned_start, None);
        assert_eq!(dropped.planned_end, None);
        assert_eq!(commit.patch.planned_start, None);
        assert_eq!(commit.patch.list_id, None);
    }

    #[test]
    fn day_drop_demotes_timed_task_from_other_day() {
        let mut task = Task::new("t", "T");
        task.due_date = Some(day("2024-04-30"));
        task.planned_start = Some(at(2024, 4, 30, 9, 0));
        task.planned_end = Some(at(2024, 4, 30, 10, 0));
        let commit = plan_commit(
            &task,
            &DropTarget::Day {
                day: day("2024-05-01"),
                origin: None,
            },
            &[],
            &Settings::default(),
        );
        commit.patch.apply(&mut task);
        assert_eq!(ScheduleState::of(&task), ScheduleState::DateOnly);
        assert_eq!(task.due_date, Some(day("2024-05-01")));
    }

    #[test]
    fn day_drop_keeps_timed_task_on_same_day() {
        let mut task = Task::new("t", "T");
        task.planned_start = Some(at(2024, 5, 1, 9, 0));
        task.planned_end = Some(at(2024, 5, 1, 10, 0));
        let commit = plan_commit(
            &task,
            &DropTarget::Day {
                day: day("2024-05-01"),
                origin: None,
            },
            &[],
            &Settings::default(),
        );
        assert_eq!(commit.patch.planned_start, None);
        commit.patch.apply(&mut task);
        assert_eq!(ScheduleState::of(&task), ScheduleState::Timed);
        assert_eq!(task.due_date, Some(day("2024-05-01")));
    }

    #[test]
    fn reorder_takes_midpoint_between_neighbours() {
        let siblings = vec![
            Task::new("a", "A").in_list("inbox", 1024),
            Task::new("b", "B").in_list("inbox", 2048),
            Task::new("c", "C").in_list("inbox", 3072),
        ];
        let dragged = Task::new("x", "X").in_list("work", 5);

        let commit = plan_commit(&dragged, &task_target("b", DropPosition::Before), &siblings, &Settings::default());
        assert_eq!(commit.patch.list_id.as_deref(), Some("inbox"));
        assert_eq!(commit.patch.sort_index, Some(1536));
        assert!(commit.patch.reindexed.is_empty());

        let commit = plan_commit(&dragged, &task_target("c", DropPosition::After), &siblings, &Settings::default());
        assert_eq!(commit.patch.sort_index, Some(3072 + 1024));

        let commit = plan_commit(&dragged, &task_target("a", DropPosition::Before), &siblings, &Settings::default());
        assert_eq!(commit.patch.sort_index, Some(0));
    }

    #[test]
    fn reorder_without_gap_resequences_and_keeps_order() {
        let siblings = vec![
            Task::new("a", "A").in_list("inbox", 1),
            Task::new("b", "B").in_list("inbox", 2),
            Task::new("x", "X").in_list("inbox", 3),
            Task::new("c", "C").in_list("inbox", 4),
        ];
        let dragged = siblings[2].clone();

        let commit = plan_commit(&dragged, &task_target("b", DropPosition::Before), &siblings, &Settings::default());
        assert_eq!(commit.patch.sort_index, Some(2048));
        assert_eq!(
            commit.patch.reindexed,
            vec![
                SortUpdate {
                    task_id: "a".to_string(),
                    sort_index: 1024
                },
                SortUpdate {
                    task_id: "b".to_string(),
                    sort_index: 3072
                },
                SortUpdate {
                    task_id: "c".to_string(),
                    sort_index: 4096
                },
            ]
        );

        let mut applied = siblings.clone();
        for t in &mut applied {
            if t.id == dragged.id {
                commit.patch.apply(t);
            } else if let Some(update) = commit.patch.reindexed.iter().find(|u| u.task_id == t.id) {
                t.sort_index = Some(update.sort_index);
            }
        }
        applied.sort_by(list_order);
        let ids: Vec<&str> = applied.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "x", "b", "c"]);
    }

    #[test]
    fn huge_sort_gap_resequences_within_range() {
        let settings = Settings {
            sort_gap: i64::MAX,
            ..Settings::default()
        };
        let siblings = vec![Task::new("s", "S").in_list("inbox", 1)];
        let dragged = Task::new("x", "X").in_list("work", 7);

        let commit = plan_commit(
            &dragged,
            &DropTarget::List {
                list_id: "inbox".to_string(),
            },
            &siblings,
            &settings,
        );
        let step = i64::MAX / 2;
        assert_eq!(commit.target, DropTarget::List { list_id: "inbox".to_string() });
        assert_eq!(commit.patch.sort_index, Some(step * 2));
        assert_eq!(
            commit.patch.reindexed,
            vec![SortUpdate {
                task_id: "s".to_string(),
                sort_index: step
            }]
        );
    }

    #[test]
    fn append_past_largest_index_resequences() {
        let siblings = vec![
            Task::new("a", "A").in_list("inbox", i64::MAX - 10),
            Task::new("b", "B").in_list("inbox", i64::MAX - 1),
        ];
        let dragged = Task::new("x", "X");
        let commit = plan_commit(
            &dragged,
            &DropTarget::List {
                list_id: "inbox".to_string(),
            },
            &siblings,
            &Settings::default(),
        );
        assert_eq!(commit.patch.sort_index, Some(3 * 1024));
        assert_eq!(commit.patch.reindexed.len(), 2);
    }

    #[test]
    fn reorder_next_to_unindexed_task_resequences() {
        let siblings = vec![Task::new("a", "A"), Task::new("b", "B").in_list("inbox", 10)];
        let dragged = Task::new("x", "X");
        let commit = plan_commit(&dragged, &task_target("a", DropPosition::After), &siblings, &Settings::default());
        assert_eq!(commit.patch.sort_index, Some(2048));
        assert_eq!(commit.patch.reindexed.len(), 2);
    }

    #[test]
    fn list_drop_appends_after_last_task() {
        let siblings = vec![
            Task::new("a", "A").in_list("inbox", 10),
            Task::new("b", "B").in_list("inbox", 20),
        ];
        let dragged = Task::new("x", "X").in_list("work", 1);
        let commit = plan_commit(
            &dragged,
            &DropTarget::List {
                list_id: "inbox".to_string(),
            },
            &siblings,
            &Settings::default(),
        );
        assert_eq!(commit.patch.list_id.as_deref(), Some("inbox"));
        assert_eq!(commit.patch.sort_index, Some(20 + 1024));
        assert_eq!(commit.patch.due_date, None);

        let commit = plan_commit(
            &dragged,
            &DropTarget::List {
                list_id: "empty".to_string(),
            },
            &[],
            &Settings::default(),
        );
        assert_eq!(commit.patch.sort_index, Some(1024));
    }

    #[test]
    fn vanished_anchor_degrades_to_list_drop() {
        let siblings = vec![Task::new("a", "A").in_list("inbox", 10)];
        let dragged = Task::new("x", "X");
        let commit = plan_commit(&dragged, &task_target("gone", DropPosition::Before), &siblings, &Settings::default());
        assert_eq!(
            commit.target,
            DropTarget::List {
                list_id: "inbox".to_string()
            }
        );
        assert_eq!(commit.patch.sort_index, Some(10 + 1024));
    }
}
