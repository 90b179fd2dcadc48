use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use chrono::{DateTime, Duration, NaiveTime, Utc};
use uuid::Uuid;
use academy_catalog::{ClassWithCourse, Course};

/// How long after a class ends its student can still claim a level-up coupon.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct EligibilityWindows {
    /// Trial class to first paid level
    pub trial_to_pay_days: i64,
    /// Paid level to the next level (or level 1 of another subject)
    pub levelup_days: i64,
}

impl Default for EligibilityWindows {
    fn default() -> Self {
        Self {
            trial_to_pay_days: 3,
            levelup_days: 14,
        }
    }
}

/// One of the user's earlier enrollments, with its class and course.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PastEnrollment {
    pub enrollment_id: Uuid,
    pub student_id: Uuid,
    /// > 0 once the student showed up
    pub status_code: i32,
    pub klass: ClassWithCourse,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QualifyingRule {
    /// Attended a trial in the same subject
    TrialSameSubject,
    /// Took a lower paid level in the same subject
    LowerLevelSameSubject,
    /// Took any paid level elsewhere and now starts level 1
    CrossSubjectLevelOne,
}

const RULES: [QualifyingRule; 3] = [
    QualifyingRule::TrialSameSubject,
    QualifyingRule::LowerLevelSameSubject,
    QualifyingRule::CrossSubjectLevelOne,
];

#[derive(Debug, Clone, Copy)]
struct Deadlines {
    trial: DateTime<Utc>,
    paid: DateTime<Utc>,
}

/// Decides whether a purchase of `course` follows a recent enrollment that
/// earns a level-up offer.
#[derive(Debug, Clone, Default)]
pub struct EligibilityRules {
    windows: EligibilityWindows,
}

impl EligibilityRules {
    pub fn new(windows: EligibilityWindows) -> Self {
        Self { windows }
    }

    pub fn windows(&self) -> EligibilityWindows {
        self.windows
    }

    /// Classes must have ended after these instants (start of day, UTC).
    fn deadlines(&self, now: DateTime<Utc>) -> Deadlines {
        Deadlines {
            trial: start_of_day(now - Duration::days(self.windows.trial_to_pay_days)),
            paid: start_of_day(now - Duration::days(self.windows.levelup_days)),
        }
    }

    /// First enrollment in `history` that qualifies, in history order.
    pub fn find_qualified_class<'a>(
        &self,
        history: &'a [PastEnrollment],
        course: &Course,
        now: DateTime<Utc>,
    ) -> Option<&'a ClassWithCourse> {
        if !course.is_regular() {
            return None;
        }

        let deadlines = self.deadlines(now);

        history
            .iter()
            .filter(|er| er.klass.class.has_started(now))
            .find(|er| RULES.iter().any(|rule| self.matches(*rule, er, course, deadlines)))
            .map(|er| &er.klass)
    }

    fn matches(&self, rule: QualifyingRule, er: &PastEnrollment, course: &Course, deadlines: Deadlines) -> bool {
        let prior = &er.klass.course;
        let ended = er.klass.class.end_date;
        let same_subject = prior.subject_id == course.subject_id;

        match rule {
            QualifyingRule::TrialSameSubject => {
                prior.is_trial() && same_subject && ended > deadlines.trial && er.status_code > 0
            }
            QualifyingRule::LowerLevelSameSubject => {
                prior.is_regular() && same_subject && prior.level < course.level && ended > deadlines.paid
            }
            QualifyingRule::CrossSubjectLevelOne => {
                prior.is_regular() && !same_subject && course.level == 1 && ended > deadlines.paid
            }
        }
    }
}

fn start_of_day(t: DateTime<Utc>) -> DateTime<Utc> {
    t.date_naive().and_time(NaiveTime::MIN).and_utc()
}

/// Coupon codes granted for level-up conversions, per subject.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LevelUpCoupons {
    #[serde(default)]
    pub trial: HashMap<String, String>,
    #[serde(default)]
    pub regular: HashMap<String, String>,
}

impl LevelUpCoupons {
    /// Code to offer for buying `target` after taking `qualifying`.
    pub fn code_for(&self, qualifying: &Course, target: &Course) -> Option<&str> {
        let table = if qualifying.is_trial() { &self.trial } else { &self.regular };
        table
            .get(&target.subject_id)
            .map(String::as_str)
            .filter(|code| !code.is_empty())
    }
}
