use std::cmp::Ordering;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    #[default]
    Todo,
    Doing,
    Done,
    Canceled,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,

    #[serde(default)]
    pub list_id: Option<String>,

    pub title: String,

    #[serde(default)]
    pub status: Status,

    #[serde(default)]
    pub due_date: Option<NaiveDate>,

    #[serde(default)]
    pub planned_start: Option<DateTime<Utc>>,

    #[serde(default)]
    pub planned_end: Option<DateTime<Utc>>,

    #[serde(default)]
    pub estimate_minutes: Option<u32>,

    #[serde(default)]
    pub sort_index: Option<i64>,

    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Task {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            list_id: None,
            title: title.into(),
            status: Status::Todo,
            due_date: None,
            planned_start: None,
            planned_end: None,
            estimate_minutes: None,
            sort_index: None,
            updated_at: None,
        }
    }

    pub fn in_list(mut self, list_id: impl Into<String>, sort_index: i64) -> Self {
        self.list_id = Some(list_id.into());
        self.sort_index = Some(sort_index);
        self
    }

    /// Length of the current planned window, if both ends are set and ordered.
    pub fn planned_minutes(&self) -> Option<i64> {
        let (start, end) = (self.planned_start?, self.planned_end?);
        let minutes = (end - start).num_minutes();
        (minutes > 0).then_some(minutes)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TaskList {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub sort_index: i64,
    #[serde(default)]
    pub is_system: bool,
}

/// Order of tasks inside one list: `sort_index` ascending with missing
/// indices first, then most recently updated first.
pub fn list_order(a: &Task, b: &Task) -> Ordering {
    let by_index = match (a.sort_index, b.sort_index) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(x), Some(y)) => x.cmp(&y),
    };
    by_index.then_with(|| match (a.updated_at, b.updated_at) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(x), Some(y)) => y.cmp(&x),
    })
}
