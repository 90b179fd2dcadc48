use serde::Serialize;
use uuid::Uuid;
use chrono::{DateTime, Utc};
use academy_catalog::{Class, ClassWithCourse};

use crate::models::{Addon, Attendance, EnrollmentWithClass};

/// A student's place in one session.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Seat {
    /// Session id and student id concatenated; unique per student
    pub id: String,
    pub idx: i32,
    pub session_id: Uuid,
    pub class: Class,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    /// Taken in another class as an add-on
    pub added: bool,
    pub attended: Option<bool>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Registration {
    pub id: Uuid,
    pub klass: ClassWithCourse,
    pub seats: Vec<Seat>,
}

/// Expand enrollments into per-session seats, swapping in add-on sessions
/// and marking attendance.
pub fn build_registrations(
    student_id: Uuid,
    enrollments: &[EnrollmentWithClass],
    addons: &[Addon],
    attendances: &[Attendance],
) -> Vec<Registration> {
    enrollments
        .iter()
        .map(|er| {
            let mut sessions = er.klass.class.sessions.clone();
            sessions.sort_by_key(|s| s.idx);

            let seats = sessions
                .iter()
                .map(|ses| {
                    let addon = addons
                        .iter()
                        .find(|a| a.original_class_id == ses.class_id && a.idx == ses.idx);

                    let (session, class, added) = match addon {
                        Some(a) => match a.klass.session(ses.idx) {
                            Some(replacement) => (replacement, &a.klass, true),
                            None => (ses, &er.klass.class, false),
                        },
                        None => (ses, &er.klass.class, false),
                    };

                    let attended = attendances
                        .iter()
                        .find(|att| att.session_id == session.id)
                        .map(|att| att.attended);

                    Seat {
                        id: format!("{}{}", session.id, student_id),
                        idx: session.idx,
                        session_id: session.id,
                        class: class.clone(),
                        start_date: session.start_date,
                        end_date: session.end_date,
                        added,
                        attended,
                    }
                })
                .collect();

            Registration {
                id: er.enrollment.id,
                klass: er.klass.clone(),
                seats,
            }
        })
        .collect()
}
