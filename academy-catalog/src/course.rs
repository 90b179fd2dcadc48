use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, Utc};

/// A course track (e.g. "AI", "Scratch"), levels 1..=exit_level.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Subject {
    pub id: String,
    pub name: String,
    pub exit_level: i32,
    pub courses: Vec<Course>,
}

impl Subject {
    /// Courses shown publicly. Negative levels are internal (camps, makeups).
    pub fn listed_courses(&self) -> impl Iterator<Item = &Course> {
        self.courses.iter().filter(|c| c.level >= 0)
    }

    pub fn course_at_level(&self, level: i32) -> Option<&Course> {
        self.courses.iter().find(|c| c.level == level)
    }
}

/// One level of a subject.
///
/// Level 0 is the free or low-cost introductory trial; levels >= 1 are the
/// regular paid curriculum.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Course {
    pub id: String,
    pub subject_id: String,
    pub name: String,
    pub level: i32,
    pub capacity: i32,
    /// Price of the level when bought on its own
    pub price_in_cents: i64,
    /// Per-level price when the whole series is bought at once
    pub series_price_in_cents: Option<i64>,
}

impl Course {
    pub fn is_trial(&self) -> bool {
        self.level == 0
    }

    pub fn is_regular(&self) -> bool {
        self.level > 0
    }

    pub fn is_free(&self) -> bool {
        self.price_in_cents == 0
    }

    pub fn unit_price_in_cents(&self, whole_series: bool) -> i64 {
        if whole_series {
            self.series_price_in_cents.unwrap_or(self.price_in_cents)
        } else {
            self.price_in_cents
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Session {
    pub id: Uuid,
    pub class_id: Uuid,
    pub idx: i32,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
}

/// A scheduled run of a course.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Class {
    pub id: Uuid,
    pub course_id: String,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub active: bool,
    pub sessions: Vec<Session>,
}

impl Class {
    pub fn has_started(&self, now: DateTime<Utc>) -> bool {
        self.start_date < now
    }

    pub fn session(&self, idx: i32) -> Option<&Session> {
        self.sessions.iter().find(|s| s.idx == idx)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClassWithCourse {
    pub class: Class,
    pub course: Course,
}
