use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, NaiveDate, Utc};
use academy_catalog::{Class, ClassWithCourse, PriceBreakdown};
use academy_offer::Buyer;
use academy_shared::Masked;

/// A parent account. Students hang off it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub email: Masked<String>,
    pub first_name: String,
    /// Has paid for at least one class
    pub paid: bool,
    /// Account credit, never negative
    pub balance_in_cents: i64,
    pub referral_code: Option<String>,
    pub is_admin: bool,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn buyer(&self) -> Buyer {
        Buyer {
            id: self.id,
            paid: self.paid,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct StudentDetails {
    pub school: Option<String>,
    pub avatar: Option<String>,
    pub cover: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Student {
    pub id: Uuid,
    pub parent_id: Uuid,
    pub name: String,
    pub year: Option<i32>,
    pub gender: Option<String>,
    pub details: StudentDetails,
    pub created_at: DateTime<Utc>,
}

/// Input for adding or editing a child.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StudentInput {
    pub name: String,
    pub year: Option<i32>,
    pub gender: Option<String>,
    pub school: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Enrollment {
    pub id: Uuid,
    pub student_id: Uuid,
    pub class_id: Uuid,
    /// > 0 once attendance was confirmed
    pub status_code: i32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EnrollmentWithClass {
    pub enrollment: Enrollment,
    pub klass: ClassWithCourse,
}

/// One session taken in `klass` in place of session `idx` of the original class.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Addon {
    pub id: Uuid,
    pub student_id: Uuid,
    pub original_class_id: Uuid,
    pub idx: i32,
    pub klass: Class,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Attendance {
    pub session_id: Uuid,
    pub student_id: Uuid,
    pub attended: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Project {
    pub id: Uuid,
    pub student_id: Uuid,
    pub subject_id: Option<String>,
    pub title: String,
    pub url: Option<String>,
    pub published: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Article {
    pub id: Uuid,
    pub title: String,
    pub url: String,
    pub summary: Option<String>,
    pub published: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ArticleMonth {
    /// Last day of the month
    pub month: NaiveDate,
    pub count: i64,
}

#[derive(Debug, Clone, Default)]
pub struct ArticleQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
    /// Published between these instants; end is clamped to now by the caller
    pub between: Option<(DateTime<Utc>, DateTime<Utc>)>,
    pub before: Option<DateTime<Utc>>,
}

/// Filter for `upcoming_classes`.
#[derive(Debug, Clone, Default)]
pub struct ClassFilter {
    pub course_id: Option<String>,
    /// Only used when `course_id` is not set
    pub course_ids: Option<Vec<String>>,
    pub start_after: Option<DateTime<Utc>>,
}

/// Everything written by one checkout, committed atomically.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewEnrollment {
    pub user_id: Uuid,
    pub student_id: Uuid,
    /// Base class first, then add-ons
    pub class_ids: Vec<Uuid>,
    pub promotion_id: Option<Uuid>,
    pub breakdown: PriceBreakdown,
}

impl NewEnrollment {
    /// A purchase with money due flips the account's `paid` flag.
    pub fn marks_paid(&self) -> bool {
        self.breakdown.price > 0
    }
}
