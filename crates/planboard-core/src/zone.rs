//! Drop zones the view layer registers for the current layout.
//!
//! The registry is descriptive only: views tag rendered rows, columns and
//! calendar cells with a kind and metadata, and the resolver asks which of
//! them sit under the pointer. Nesting mirrors the view tree, so a task row
//! registered inside a list row is reported before that list row.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::geometry::{Point, Rect};
use crate::target::DayOrigin;

pub const LIST_HEADER_ELEMENT_PREFIX: &str = "backlog-list-header-";
pub const LIST_BODY_ELEMENT_PREFIX: &str = "backlog-list-zone-";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum ZoneKind {
    /// A task row inside a list, used for reordering.
    TaskRow,
    /// A list header, list entry or the list's empty body.
    ListRow,
    /// A day column on the task board or the daily task panel.
    DayColumn,
    /// One hour cell of the calendar grid.
    CalendarCell,
    /// A whole calendar day whose hour is derived from the pointer offset.
    CalendarDay,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ZoneMetadata {
    #[serde(default)]
    pub list_id: Option<String>,
    #[serde(default)]
    pub task_id: Option<String>,
    #[serde(default)]
    pub day_key: Option<String>,
    #[serde(default)]
    pub hour: Option<i64>,
    #[serde(default)]
    pub origin: Option<DayOrigin>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DropZone {
    pub kind: ZoneKind,
    pub region: Rect,
    #[serde(default)]
    pub metadata: ZoneMetadata,
}

impl DropZone {
    pub fn task_row(list_id: &str, task_id: &str, region: Rect) -> Self {
        Self {
            kind: ZoneKind::TaskRow,
            region,
            metadata: ZoneMetadata {
                list_id: Some(list_id.to_string()),
                task_id: Some(task_id.to_string()),
                ..ZoneMetadata::default()
            },
        }
    }

    pub fn list_row(list_id: &str, region: Rect) -> Self {
        Self {
            kind: ZoneKind::ListRow,
            region,
            metadata: ZoneMetadata {
                list_id: Some(list_id.to_string()),
                ..ZoneMetadata::default()
            },
        }
    }

    pub fn day_column(day_key: &str, origin: Option<DayOrigin>, region: Rect) -> Self {
        Self {
            kind: ZoneKind::DayColumn,
            region,
            metadata: ZoneMetadata {
                day_key: Some(day_key.to_string()),
                origin,
                ..ZoneMetadata::default()
            },
        }
    }

    pub fn calendar_cell(day_key: &str, hour: i64, region: Rect) -> Self {
        Self {
            kind: ZoneKind::CalendarCell,
            region,
            metadata: ZoneMetadata {
                day_key: Some(day_key.to_string()),
                hour: Some(hour),
                ..ZoneMetadata::default()
            },
        }
    }

    pub fn calendar_day(day_key: &str, region: Rect) -> Self {
        Self {
            kind: ZoneKind::CalendarDay,
            region,
            metadata: ZoneMetadata {
                day_key: Some(day_key.to_string()),
                ..ZoneMetadata::default()
            },
        }
    }

    /// Builds a list zone from a list header or list body element id, for
    /// views that identify lists by element id rather than explicit tags.
    pub fn list_from_element_id(element_id: &str, region: Rect) -> Option<Self> {
        let list_id = element_id
            .strip_prefix(LIST_HEADER_ELEMENT_PREFIX)
            .or_else(|| element_id.strip_prefix(LIST_BODY_ELEMENT_PREFIX))?;
        if list_id.is_empty() {
            return None;
        }
        Some(Self::list_row(list_id, region))
    }
}

/// Point query over the current layout, nearest zone first.
pub trait ZoneQuery {
    fn zones_at(&self, point: Point) -> Vec<DropZone>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ZoneId(u64);

#[derive(Debug, Clone)]
struct Entry {
    zone: DropZone,
    parent: Option<ZoneId>,
}

/// Flat list of registered rectangles, each remembering its parent.
///
/// Ids increase with registration order, which doubles as paint order:
/// a parent is painted before its children and a later sibling subtree is
/// painted over an earlier one.
#[derive(Debug, Clone, Default)]
pub struct ZoneRegistry {
    entries: BTreeMap<ZoneId, Entry>,
    next_id: u64,
}

impl ZoneRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn register(&mut self, zone: DropZone) -> ZoneId {
        self.insert(zone, None)
    }

    /// Registers `zone` nested inside `parent`. Returns `None` when the
    /// parent is not registered.
    pub fn register_within(&mut self, parent: ZoneId, zone: DropZone) -> Option<ZoneId> {
        if !self.entries.contains_key(&parent) {
            return None;
        }
        Some(self.insert(zone, Some(parent)))
    }

    pub fn get(&self, id: ZoneId) -> Option<&DropZone> {
        self.entries.get(&id).map(|entry| &entry.zone)
    }

    pub fn set_region(&mut self, id: ZoneId, region: Rect) -> bool {
        match self.entries.get_mut(&id) {
            Some(entry) => {
                entry.zone.region = region;
                true
            }
            None => false,
        }
    }

    /// Removes a zone together with every zone nested inside it.
    pub fn remove(&mut self, id: ZoneId) -> Option<DropZone> {
        let removed = self.entries.remove(&id)?;
        let mut orphans = vec![id];
        while let Some(parent) = orphans.pop() {
            let children: Vec<ZoneId> = self
                .entries
                .iter()
                .filter(|(_, entry)| entry.parent == Some(parent))
                .map(|(child, _)| *child)
                .collect();
            for child in children {
                self.entries.remove(&child);
                orphans.push(child);
            }
        }
        Some(removed.zone)
    }

    pub fn clear(&mut self) {
        debug!(zones = self.entries.len(), "clearing zone registry");
        self.entries.clear();
    }

    /// Nesting depth of a registered zone, 0 for top-level zones.
    pub fn depth(&self, id: ZoneId) -> Option<usize> {
        self.entries.get(&id)?;
        Some(self.ancestry(id).len() - 1)
    }

    /// Ids from the outermost ancestor down to `id` itself.
    fn ancestry(&self, id: ZoneId) -> Vec<ZoneId> {
        let mut path = vec![id];
        let mut current = self.entries.get(&id).and_then(|entry| entry.parent);
        while let Some(parent) = current {
            path.push(parent);
            current = self.entries.get(&parent).and_then(|entry| entry.parent);
        }
        path.reverse();
        path
    }

    fn insert(&mut self, zone: DropZone, parent: Option<ZoneId>) -> ZoneId {
        let id = ZoneId(self.next_id);
        self.next_id += 1;
        self.entries.insert(id, Entry { zone, parent });
        id
    }
}

impl ZoneQuery for ZoneRegistry {
    /// Topmost painted first. Ancestry paths in descending lexicographic
    /// order put later subtrees before earlier ones and children before
    /// their parents.
    fn zones_at(&self, point: Point) -> Vec<DropZone> {
        let mut hits: Vec<(Vec<ZoneId>, &DropZone)> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.zone.region.contains(point))
            .map(|(id, entry)| (self.ancestry(*id), &entry.zone))
            .collect();
        hits.sort_by(|(a, _), (b, _)| b.cmp(a));
        hits.into_iter().map(|(_, zone)| zone.clone()).collect()
    }
}
