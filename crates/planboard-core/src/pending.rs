//! Tap-to-place scheduling: pick a task, then tap a day or an hour slot.
//!
//! Used where dragging is awkward (narrow screens, hosts without geometric
//! hit-testing). Placements go through the same commit rules as drops.

use chrono::NaiveDate;
use tracing::{debug, info, warn};

use crate::backend::{TaskBackend, commit_drop};
use crate::config::Settings;
use crate::schedule::Commit;
use crate::target::{DayOrigin, DropTarget, LAST_HOUR};
use crate::task::Task;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PendingPlacement {
    task: Option<Task>,
}

impl PendingPlacement {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pick(&mut self, task: Task) {
        debug!(task_id = %task.id, "task picked for placement");
        self.task = Some(task);
    }

    pub fn task(&self) -> Option<&Task> {
        self.task.as_ref()
    }

    pub fn clear(&mut self) -> Option<Task> {
        self.task.take()
    }

    pub fn place_on_day<B>(&mut self, backend: &mut B, day: NaiveDate, origin: Option<DayOrigin>, settings: &Settings) -> Option<Commit>
    where
        B: TaskBackend + ?Sized,
    {
        self.place(backend, &DropTarget::Day { day, origin }, settings)
    }

    /// Places the pending task at `hour` of `day`. An hour past 23 is
    /// refused and the task stays pending.
    pub fn place_in_slot<B>(&mut self, backend: &mut B, day: NaiveDate, hour: u8, settings: &Settings) -> Option<Commit>
    where
        B: TaskBackend + ?Sized,
    {
        if hour > LAST_HOUR {
            warn!(hour, "refusing placement outside the calendar day");
            return None;
        }
        self.place(backend, &DropTarget::CalendarSlot { day, hour }, settings)
    }

    /// Places the pending task on the first of the currently visible days.
    pub fn place_at_start<B>(&mut self, backend: &mut B, visible_days: &[NaiveDate], settings: &Settings) -> Option<Commit>
    where
        B: TaskBackend + ?Sized,
    {
        let Some(first) = visible_days.first() else {
            debug!("no visible days to place at");
            return None;
        };
        self.place_on_day(backend, *first, None, settings)
    }

    fn place<B>(&mut self, backend: &mut B, target: &DropTarget, settings: &Settings) -> Option<Commit>
    where
        B: TaskBackend + ?Sized,
    {
        let Some(task) = self.task.take() else {
            debug!(target = target.kind_name(), "tap without a pending task; ignoring");
            return None;
        };
        let commit = commit_drop(backend, &task, target, settings);
        info!(task_id = %commit.task_id, target = commit.target.kind_name(), "pending task placed");
        Some(commit)
    }
}
