use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::config::Settings;
use crate::datetime::parse_day_key;
use crate::geometry::{Point, Rect};
use crate::zone::{DropZone, ZoneKind, ZoneQuery};

pub const LAST_HOUR: u8 = 23;

const FALLBACK_HOUR_HEIGHT: f64 = 60.0;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum DropPosition {
    Before,
    After,
}

/// Which day surface a day target came from. Only affects the preview.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum DayOrigin {
    Daily,
    TaskBoard,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum DropTarget {
    #[serde(rename_all = "camelCase")]
    Task {
        list_id: String,
        task_id: String,
        position: DropPosition,
    },
    #[serde(rename_all = "camelCase")]
    List { list_id: String },
    #[serde(rename_all = "camelCase")]
    Day {
        day: NaiveDate,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        origin: Option<DayOrigin>,
    },
    #[serde(rename_all = "camelCase")]
    CalendarSlot { day: NaiveDate, hour: u8 },
}

impl DropTarget {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Task { .. } => "task",
            Self::List { .. } => "list",
            Self::Day { .. } => "day",
            Self::CalendarSlot { .. } => "calendarSlot",
        }
    }
}

/// Resolves the single drop target under `point`.
///
/// Zones are tried innermost first and the first one that classifies wins,
/// so a task row inside a list row yields the task target. The row of the
/// task being dragged is never a target.
#[tracing::instrument(level = "trace", skip(zones, settings))]
pub fn resolve<Z>(zones: &Z, point: Point, dragging_task_id: Option<&str>, settings: &Settings) -> Option<DropTarget>
where
    Z: ZoneQuery + ?Sized,
{
    zones
        .zones_at(point)
        .iter()
        .find_map(|zone| classify(zone, point, dragging_task_id, settings))
}

fn classify(zone: &DropZone, point: Point, dragging_task_id: Option<&str>, settings: &Settings) -> Option<DropTarget> {
    let meta = &zone.metadata;
    let target = match zone.kind {
        ZoneKind::TaskRow => {
            let list_id = meta.list_id.as_deref()?;
            let task_id = meta.task_id.as_deref()?;
            if Some(task_id) == dragging_task_id {
                trace!(task_id, "skipping row of dragged task");
                return None;
            }
            DropTarget::Task {
                list_id: list_id.to_string(),
                task_id: task_id.to_string(),
                position: position_in_row(&zone.region, point),
            }
        }
        ZoneKind::ListRow => DropTarget::List {
            list_id: meta.list_id.clone()?,
        },
        ZoneKind::DayColumn => DropTarget::Day {
            day: zone_day(zone)?,
            origin: meta.origin,
        },
        ZoneKind::CalendarCell => {
            let day = zone_day(zone)?;
            let Some(hour) = meta.hour.and_then(|h| u8::try_from(h).ok()).filter(|h| *h <= LAST_HOUR) else {
                trace!(hour = ?meta.hour, "calendar cell without a valid hour");
                return None;
            };
            DropTarget::CalendarSlot { day, hour }
        }
        ZoneKind::CalendarDay => DropTarget::CalendarSlot {
            day: zone_day(zone)?,
            hour: hour_at_offset(&zone.region, point, settings.hour_height),
        },
    };
    trace!(kind = target.kind_name(), "classified zone");
    Some(target)
}

fn zone_day(zone: &DropZone) -> Option<NaiveDate> {
    let raw = zone.metadata.day_key.as_deref()?;
    let day = parse_day_key(raw);
    if day.is_none() {
        trace!(day_key = raw, "zone has unparsable day key");
    }
    day
}

fn position_in_row(region: &Rect, point: Point) -> DropPosition {
    if point.y >= region.mid_y() {
        DropPosition::After
    } else {
        DropPosition::Before
    }
}

fn hour_at_offset(region: &Rect, point: Point, hour_height: f64) -> u8 {
    let slot = if hour_height > 0.0 {
        hour_height
    } else {
        FALLBACK_HOUR_HEIGHT
    };
    let hour = ((point.y - region.top()) / slot).floor();
    // Clamped to 0..=23, so the cast cannot truncate.
    hour.clamp(0.0, f64::from(LAST_HOUR)) as u8
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::{DayOrigin, DropPosition, DropTarget, resolve};
    use crate::config::Settings;
    use crate::geometry::{Point, Rect};
    use crate::zone::{DropZone, ZoneRegistry};

    fn day(key: &str) -> NaiveDate {
        NaiveDate::parse_from_str(key, "%Y-%m-%d").expect("valid day")
    }

    fn backlog() -> ZoneRegistry {
        let mut registry = ZoneRegistry::new();
        let list = registry.register(DropZone::list_row("inbox", Rect::new(0.0, 0.0, 200.0, 400.0)));
        registry
            .register_within(list, DropZone::task_row("inbox", "t1", Rect::new(0.0, 40.0, 200.0, 40.0)))
            .expect("list registered");
        registry
            .register_within(list, DropZone::task_row("inbox", "t2", Rect::new(0.0, 80.0, 200.0, 40.0)))
            .expect("list registered");
        registry
    }

    #[test]
    fn upper_half_is_before_lower_half_is_after() {
        let registry = backlog();
        let settings = Settings::default();

        let upper = resolve(&registry, Point::new(10.0, 45.0), Some("x"), &settings);
        assert_eq!(
            upper,
            Some(DropTarget::Task {
                list_id: "inbox".to_string(),
                task_id: "t1".to_string(),
                position: DropPosition::Before,
            })
        );

        let midpoint = resolve(&registry, Point::new(10.0, 60.0), Some("x"), &settings);
        assert!(matches!(
            midpoint,
            Some(DropTarget::Task {
                position: DropPosition::After,
                ..
            })
        ));
    }

    #[test]
    fn dragged_row_falls_through_to_list() {
        let registry = backlog();
        let target = resolve(&registry, Point::new(10.0, 50.0), Some("t1"), &Settings::default());
        assert_eq!(
            target,
            Some(DropTarget::List {
                list_id: "inbox".to_string()
            })
        );
    }

    #[test]
    fn empty_space_resolves_to_nothing() {
        let registry = backlog();
        assert_eq!(resolve(&registry, Point::new(500.0, 500.0), None, &Settings::default()), None);
    }

    #[test]
    fn calendar_cell_uses_tagged_hour() {
        let mut registry = ZoneRegistry::new();
        registry.register(DropZone::calendar_cell("2024-05-01", 9, Rect::new(0.0, 540.0, 100.0, 60.0)));
        let target = resolve(&registry, Point::new(10.0, 560.0), None, &Settings::default());
        assert_eq!(
            target,
            Some(DropTarget::CalendarSlot {
                day: day("2024-05-01"),
                hour: 9
            })
        );
    }

    #[test]
    fn calendar_day_interpolates_and_clamps_hour() {
        let mut registry = ZoneRegistry::new();
        registry.register(DropZone::calendar_day("2024-05-01", Rect::new(0.0, 100.0, 100.0, 2000.0)));
        let settings = Settings {
            hour_height: 48.0,
            ..Settings::default()
        };

        let at = |y: f64| match resolve(&registry, Point::new(10.0, y), None, &settings) {
            Some(DropTarget::CalendarSlot { hour, .. }) => hour,
            other => panic!("unexpected target {other:?}"),
        };
        assert_eq!(at(100.0), 0);
        assert_eq!(at(100.0 + 48.0 * 3.5), 3);
        assert_eq!(at(2099.0), 23);
    }

    #[test]
    fn non_positive_hour_height_falls_back_to_sixty() {
        let mut registry = ZoneRegistry::new();
        registry.register(DropZone::calendar_day("2024-05-01", Rect::new(0.0, 0.0, 100.0, 1440.0)));
        let settings = Settings {
            hour_height: 0.0,
            ..Settings::default()
        };
        let target = resolve(&registry, Point::new(10.0, 130.0), None, &settings);
        assert!(matches!(target, Some(DropTarget::CalendarSlot { hour: 2, .. })));
    }

    #[test]
    fn malformed_zones_are_skipped() {
        let mut registry = ZoneRegistry::new();
        let outer = registry.register(DropZone::day_column("2024-05-01", Some(DayOrigin::TaskBoard), Rect::new(0.0, 0.0, 100.0, 100.0)));
        let mut no_hour = DropZone::calendar_cell("2024-05-01", 0, Rect::new(0.0, 0.0, 100.0, 100.0));
        no_hour.metadata.hour = None;
        let cell = registry.register_within(outer, no_hour).expect("outer registered");
        let bad_hour = registry
            .register_within(cell, DropZone::calendar_cell("2024-05-01", 24, Rect::new(0.0, 0.0, 100.0, 100.0)))
            .expect("cell registered");
        let bad_day = registry
            .register_within(bad_hour, DropZone::calendar_cell("05/01/2024", 3, Rect::new(0.0, 0.0, 100.0, 100.0)))
            .expect("cell registered");
        let mut no_list = DropZone::list_row("x", Rect::new(0.0, 0.0, 100.0, 100.0));
        no_list.metadata.list_id = None;
        registry.register_within(bad_day, no_list).expect("cell registered");

        let target = resolve(&registry, Point::new(5.0, 5.0), None, &Settings::default());
        assert_eq!(
            target,
            Some(DropTarget::Day {
                day: day("2024-05-01"),
                origin: Some(DayOrigin::TaskBoard)
            })
        );
    }

    #[test]
    fn innermost_wins_regardless_of_kind() {
        let mut registry = ZoneRegistry::new();
        let column = registry.register(DropZone::day_column("2024-05-02", Some(DayOrigin::Daily), Rect::new(0.0, 0.0, 300.0, 600.0)));
        let list = registry
            .register_within(column, DropZone::list_row("work", Rect::new(0.0, 0.0, 300.0, 300.0)))
            .expect("column registered");
        registry
            .register_within(list, DropZone::task_row("work", "t9", Rect::new(0.0, 0.0, 300.0, 50.0)))
            .expect("list registered");

        let settings = Settings::default();
        assert!(matches!(
            resolve(&registry, Point::new(10.0, 10.0), Some("t1"), &settings),
            Some(DropTarget::Task { .. })
        ));
        assert!(matches!(
            resolve(&registry, Point::new(10.0, 100.0), Some("t1"), &settings),
            Some(DropTarget::List { .. })
        ));
        assert!(matches!(
            resolve(&registry, Point::new(10.0, 400.0), Some("t1"), &settings),
            Some(DropTarget::Day { .. })
        ));
    }

    #[test]
    fn overlay_painted_later_beats_rows_underneath() {
        let mut registry = ZoneRegistry::new();
        let list = registry.register(DropZone::list_row("inbox", Rect::new(0.0, 0.0, 200.0, 200.0)));
        registry
            .register_within(list, DropZone::task_row("inbox", "a", Rect::new(0.0, 0.0, 200.0, 40.0)))
            .expect("list registered");
        registry.register(DropZone::day_column("2024-05-01", None, Rect::new(0.0, 0.0, 200.0, 200.0)));

        let target = resolve(&registry, Point::new(10.0, 10.0), None, &Settings::default());
        assert_eq!(
            target,
            Some(DropTarget::Day {
                day: day("2024-05-01"),
                origin: None
            })
        );
    }

    #[test]
    fn targets_serialize_with_kind_tag() {
        let target = DropTarget::CalendarSlot {
            day: day("2024-05-01"),
            hour: 9,
        };
        let json = serde_json::to_value(&target).expect("serialize target");
        assert_eq!(json, serde_json::json!({"kind": "calendarSlot", "day": "2024-05-01", "hour": 9}));
    }
}
