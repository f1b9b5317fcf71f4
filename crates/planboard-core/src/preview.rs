//! Live drag feedback fanned out to independent view regions.
//!
//! Each panel registers a [`PreviewSink`] and overrides only the callbacks it
//! renders. The broadcast keeps the day hover, list hover and calendar
//! preview mutually exclusive and only notifies a slot when its value
//! changes.

use std::cell::RefCell;
use std::rc::Rc;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::config::Settings;
use crate::geometry::Point;
use crate::schedule::slot_window;
use crate::target::{DayOrigin, DropPosition, DropTarget};
use crate::task::Task;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum PreviewVariant {
    Backlog,
    Calendar,
    TaskBoard,
}

/// Panel a drag was started from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "camelCase")]
pub enum DragOrigin {
    #[default]
    Backlog,
    TaskBoard,
    Daily,
}

impl DragOrigin {
    pub fn variant(self) -> PreviewVariant {
        match self {
            Self::TaskBoard => PreviewVariant::TaskBoard,
            Self::Backlog | Self::Daily => PreviewVariant::Backlog,
        }
    }
}

impl PreviewVariant {
    /// Ghost style for a drag hovering `target`, or the drag's own origin
    /// style over empty space.
    pub fn for_target(target: Option<&DropTarget>, origin: DragOrigin) -> Self {
        match target {
            Some(DropTarget::Task { .. } | DropTarget::List { .. }) => Self::Backlog,
            Some(DropTarget::CalendarSlot { .. }) => Self::Calendar,
            Some(DropTarget::Day { origin, .. }) => match origin {
                Some(DayOrigin::TaskBoard) => Self::TaskBoard,
                Some(DayOrigin::Daily) => Self::Backlog,
                None => Self::Calendar,
            },
            None => origin.variant(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DragPreview {
    pub task: Task,
    pub pointer: Point,
    pub variant: PreviewVariant,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ListHover {
    #[serde(rename_all = "camelCase")]
    List { list_id: String },
    #[serde(rename_all = "camelCase")]
    Task {
        list_id: String,
        task_id: String,
        position: DropPosition,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CalendarPreview {
    pub task: Task,
    pub day: NaiveDate,
    pub start_minutes: u32,
    pub duration_minutes: u32,
}

/// Receiver for drag feedback. Every callback defaults to doing nothing.
pub trait PreviewSink {
    fn on_drag_preview_change(&mut self, _preview: Option<&DragPreview>) {}
    fn on_day_hover_change(&mut self, _day: Option<NaiveDate>) {}
    fn on_list_hover_change(&mut self, _target: Option<&ListHover>) {}
    fn on_calendar_preview_change(&mut self, _preview: Option<&CalendarPreview>) {}
}

#[derive(Debug, Clone, PartialEq, Default)]
struct HoverState {
    day: Option<NaiveDate>,
    list: Option<ListHover>,
    calendar: Option<CalendarPreview>,
}

#[derive(Default)]
pub struct PreviewBroadcast {
    sinks: Vec<Box<dyn PreviewSink>>,
    drag_shown: bool,
    last: Option<HoverState>,
}

impl std::fmt::Debug for PreviewBroadcast {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreviewBroadcast")
            .field("sinks", &self.sinks.len())
            .field("drag_shown", &self.drag_shown)
            .field("last", &self.last)
            .finish()
    }
}

impl PreviewBroadcast {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, sink: Box<dyn PreviewSink>) {
        self.sinks.push(sink);
    }

    pub fn sink_count(&self) -> usize {
        self.sinks.len()
    }

    pub fn show_drag(&mut self, preview: &DragPreview) {
        self.drag_shown = true;
        for sink in &mut self.sinks {
            sink.on_drag_preview_change(Some(preview));
        }
    }

    /// Publishes the hover state for `target`. At most one of the day,
    /// list and calendar slots ends up set.
    pub fn show_target(&mut self, task: &Task, target: Option<&DropTarget>, settings: &Settings) {
        let next = hover_state(task, target, settings);
        self.publish(next);
    }

    /// Sets every slot to `None`, including ones never shown.
    pub fn clear_hover(&mut self) {
        self.last = None;
        self.publish(HoverState::default());
    }

    /// Clears the drag ghost and every hover slot.
    pub fn clear_all(&mut self) {
        if self.drag_shown {
            trace!("clearing drag preview");
        }
        self.drag_shown = false;
        for sink in &mut self.sinks {
            sink.on_drag_preview_change(None);
        }
        self.clear_hover();
    }

    fn publish(&mut self, next: HoverState) {
        let prev = self.last.take();
        let known = prev.is_some();
        let prev = prev.unwrap_or_default();

        if !known || prev.day != next.day {
            for sink in &mut self.sinks {
                sink.on_day_hover_change(next.day);
            }
        }
        if !known || prev.list != next.list {
            for sink in &mut self.sinks {
                sink.on_list_hover_change(next.list.as_ref());
            }
        }
        if !known || prev.calendar != next.calendar {
            for sink in &mut self.sinks {
                sink.on_calendar_preview_change(next.calendar.as_ref());
            }
        }
        self.last = Some(next);
    }
}

fn hover_state(task: &Task, target: Option<&DropTarget>, settings: &Settings) -> HoverState {
    let mut state = HoverState::default();
    match target {
        Some(DropTarget::Task {
            list_id,
            task_id,
            position,
        }) => {
            state.list = Some(ListHover::Task {
                list_id: list_id.clone(),
                task_id: task_id.clone(),
                position: *position,
            });
        }
        Some(DropTarget::List { list_id }) => {
            state.list = Some(ListHover::List {
                list_id: list_id.clone(),
            });
        }
        Some(DropTarget::Day { day, .. }) => state.day = Some(*day),
        Some(DropTarget::CalendarSlot { day, hour }) => {
            let (start, end) = slot_window(task, *day, *hour, settings);
            let duration = (end - start).num_minutes().max(0);
            state.calendar = Some(CalendarPreview {
                task: task.clone(),
                day: *day,
                start_minutes: u32::from(*hour) * 60,
                duration_minutes: u32::try_from(duration).unwrap_or(u32::MAX),
            });
        }
        None => {}
    }
    state
}

/// Everything a [`RecordingSink`] has been told, in call order per slot.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PreviewLog {
    pub drag: Vec<Option<DragPreview>>,
    pub day_hover: Vec<Option<NaiveDate>>,
    pub list_hover: Vec<Option<ListHover>>,
    pub calendar: Vec<Option<CalendarPreview>>,
}

impl PreviewLog {
    pub fn last_drag(&self) -> Option<&Option<DragPreview>> {
        self.drag.last()
    }

    pub fn last_day_hover(&self) -> Option<&Option<NaiveDate>> {
        self.day_hover.last()
    }

    pub fn last_list_hover(&self) -> Option<&Option<ListHover>> {
        self.list_hover.last()
    }

    pub fn last_calendar(&self) -> Option<&Option<CalendarPreview>> {
        self.calendar.last()
    }

    /// True when every slot was last told `None`.
    pub fn all_cleared(&self) -> bool {
        matches!(self.last_drag(), Some(None))
            && matches!(self.last_day_hover(), Some(None))
            && matches!(self.last_list_hover(), Some(None))
            && matches!(self.last_calendar(), Some(None))
    }
}

/// Sink that records every notification into a shared [`PreviewLog`].
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    log: Rc<RefCell<PreviewLog>>,
}

impl RecordingSink {
    pub fn new() -> (Self, Rc<RefCell<PreviewLog>>) {
        let sink = Self::default();
        let log = Rc::clone(&sink.log);
        (sink, log)
    }
}

impl PreviewSink for RecordingSink {
    fn on_drag_preview_change(&mut self, preview: Option<&DragPreview>) {
        self.log.borrow_mut().drag.push(preview.cloned());
    }

    fn on_day_hover_change(&mut self, day: Option<NaiveDate>) {
        self.log.borrow_mut().day_hover.push(day);
    }

    fn on_list_hover_change(&mut self, target: Option<&ListHover>) {
        self.log.borrow_mut().list_hover.push(target.cloned());
    }

    fn on_calendar_preview_change(&mut self, preview: Option<&CalendarPreview>) {
        self.log.borrow_mut().calendar.push(preview.cloned());
    }
}
