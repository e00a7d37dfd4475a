//! Internal class catalog the mapping pipeline matches against

use chrono::{DateTime, Datelike, Timelike, Utc, Weekday};
use serde::{Deserialize, Serialize};

/// A class offered by a studio.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogClass {
    pub id: String,
    pub studio_id: String,
    pub name: String,
    pub category: Option<String>,
    pub instructor_id: Option<String>,
    pub instructor_email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogInstructor {
    pub id: String,
    pub studio_id: String,
    pub name: String,
    pub email: Option<String>,
}

/// One scheduled occurrence of a class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassSchedule {
    pub id: String,
    pub class_id: String,
    pub studio_id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub instructor_id: Option<String>,
    pub location: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl ClassSchedule {
    pub fn slot(&self) -> ScheduleSlot {
        ScheduleSlot::of(self.start_time)
    }
}

/// A local schedule edit since the last sync, fed to the export phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleChange {
    pub schedule: ClassSchedule,
    pub class_name: String,
    pub class_description: Option<String>,
    pub deleted: bool,
}

/// Weekly recurrence key of a start time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScheduleSlot {
    pub weekday: Weekday,
    /// Minutes after midnight UTC.
    pub minute_of_day: u32,
}

impl ScheduleSlot {
    pub fn of(start: DateTime<Utc>) -> Self {
        Self { weekday: start.weekday(), minute_of_day: start.hour() * 60 + start.minute() }
    }

    /// 1.0 for the same weekday and start, 0.5 for the same weekday within
    /// an hour, otherwise 0.
    pub fn similarity(&self, other: &Self) -> f64 {
        if self.weekday != other.weekday {
            return 0.0;
        }
        match self.minute_of_day.abs_diff(other.minute_of_day) {
            0 => 1.0,
            1..=60 => 0.5,
            _ => 0.0,
        }
    }
}

/// A studio's catalog snapshot. Sorted by id so scoring never depends on
/// storage order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Catalog {
    pub classes: Vec<CatalogClass>,
    pub instructors: Vec<CatalogInstructor>,
    pub schedules: Vec<ClassSchedule>,
}

impl Catalog {
    pub fn new(
        mut classes: Vec<CatalogClass>,
        mut instructors: Vec<CatalogInstructor>,
        mut schedules: Vec<ClassSchedule>,
    ) -> Self {
        classes.sort_by(|a, b| a.id.cmp(&b.id));
        instructors.sort_by(|a, b| a.id.cmp(&b.id));
        schedules.sort_by(|a, b| a.id.cmp(&b.id));
        Self { classes, instructors, schedules }
    }

    pub fn schedules_for<'a>(&'a self, class_id: &'a str) -> impl Iterator<Item = &'a ClassSchedule> + 'a {
        self.schedules.iter().filter(move |s| s.class_id == class_id)
    }

    pub fn instructor_by_email(&self, email: &str) -> Option<&CatalogInstructor> {
        self.instructors
            .iter()
            .find(|i| i.email.as_deref().is_some_and(|e| e.eq_ignore_ascii_case(email)))
    }

    pub fn class(&self, id: &str) -> Option<&CatalogClass> {
        self.classes.iter().find(|c| c.id == id)
    }
}
