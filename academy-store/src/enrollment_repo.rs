use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;
use academy_catalog::{Class, ClassWithCourse, Course};
use academy_core::models::{Addon, Attendance, Enrollment, NewEnrollment};
use academy_core::repository::EnrollmentRepository;
use academy_offer::{EnrollmentHistory, PastEnrollment};

use crate::catalog_repo::{with_sessions, ClassRow};

pub struct PgEnrollmentRepository {
    pool: PgPool,
}

impl PgEnrollmentRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct EnrollmentRow {
    id: Uuid,
    student_id: Uuid,
    class_id: Uuid,
    status_code: i32,
    created_at: DateTime<Utc>,
}

impl From<EnrollmentRow> for Enrollment {
    fn from(row: EnrollmentRow) -> Self {
        Enrollment {
            id: row.id,
            student_id: row.student_id,
            class_id: row.class_id,
            status_code: row.status_code,
            created_at: row.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct AddonRow {
    id: Uuid,
    student_id: Uuid,
    original_class_id: Uuid,
    class_id: Uuid,
    idx: i32,
}

#[derive(sqlx::FromRow)]
struct HistoryRow {
    enrollment_id: Uuid,
    student_id: Uuid,
    status_code: i32,
    class_id: Uuid,
    course_id: String,
    subject_id: String,
    course_name: String,
    level: i32,
    capacity: i32,
    price_in_cents: i64,
    series_price_in_cents: Option<i64>,
    start_date: DateTime<Utc>,
    end_date: DateTime<Utc>,
    active: bool,
}

impl PgEnrollmentRepository {
    async fn classes_by_id(&self, ids: Vec<Uuid>) -> Result<Vec<Class>, sqlx::Error> {
        let rows = sqlx::query_as::<_, ClassRow>(
            "SELECT id, course_id, start_date, end_date, active FROM classes WHERE id = ANY($1)",
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;

        with_sessions(&self.pool, rows).await
    }
}

#[async_trait]
impl EnrollmentRepository for PgEnrollmentRepository {
    async fn list_for_student(
        &self,
        student_id: Uuid,
    ) -> Result<Vec<(Enrollment, Class)>, Box<dyn std::error::Error + Send + Sync>> {
        let rows = sqlx::query_as::<_, EnrollmentRow>(
            r#"
            SELECT e.id, e.student_id, e.class_id, e.status_code, e.created_at
            FROM enrollments e
            JOIN classes c ON c.id = e.class_id
            WHERE e.student_id = $1
            ORDER BY c.start_date DESC
            "#,
        )
        .bind(student_id)
        .fetch_all(&self.pool)
        .await?;

        let classes = self.classes_by_id(rows.iter().map(|r| r.class_id).collect()).await?;

        Ok(rows
            .into_iter()
            .filter_map(|row| {
                let class = classes.iter().find(|c| c.id == row.class_id)?.clone();
                Some((Enrollment::from(row), class))
            })
            .collect())
    }

    async fn list_addons(&self, student_id: Uuid) -> Result<Vec<Addon>, Box<dyn std::error::Error + Send + Sync>> {
        let rows = sqlx::query_as::<_, AddonRow>(
            "SELECT id, student_id, original_class_id, class_id, idx FROM addons WHERE student_id = $1",
        )
        .bind(student_id)
        .fetch_all(&self.pool)
        .await?;

        let classes = self.classes_by_id(rows.iter().map(|r| r.class_id).collect()).await?;

        Ok(rows
            .into_iter()
            .filter_map(|row| {
                let klass = classes.iter().find(|c| c.id == row.class_id)?.clone();
                Some(Addon {
                    id: row.id,
                    student_id: row.student_id,
                    original_class_id: row.original_class_id,
                    idx: row.idx,
                    klass,
                })
            })
            .collect())
    }

    async fn list_attendances(&self, student_id: Uuid) -> Result<Vec<Attendance>, Box<dyn std::error::Error + Send + Sync>> {
        let rows: Vec<(Uuid, Uuid, bool)> = sqlx::query_as(
            "SELECT session_id, student_id, attended FROM attendances WHERE student_id = $1",
        )
        .bind(student_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(session_id, student_id, attended)| Attendance {
                session_id,
                student_id,
                attended,
            })
            .collect())
    }

    async fn is_enrolled(&self, student_id: Uuid, class_id: Uuid) -> Result<bool, Box<dyn std::error::Error + Send + Sync>> {
        let (exists,): (bool,) = sqlx::query_as(
            "SELECT EXISTS (SELECT 1 FROM enrollments WHERE student_id = $1 AND class_id = $2)",
        )
        .bind(student_id)
        .bind(class_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(exists)
    }

    async fn enroll(&self, plan: &NewEnrollment) -> Result<Vec<Enrollment>, Box<dyn std::error::Error + Send + Sync>> {
        let mut tx = self.pool.begin().await?;
        let mut created = Vec::with_capacity(plan.class_ids.len());

        for class_id in &plan.class_ids {
            let row = sqlx::query_as::<_, EnrollmentRow>(
                r#"
                INSERT INTO enrollments (id, student_id, class_id)
                VALUES ($1, $2, $3)
                RETURNING id, student_id, class_id, status_code, created_at
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(plan.student_id)
            .bind(class_id)
            .fetch_one(&mut *tx)
            .await?;
            created.push(Enrollment::from(row));
        }

        let credit = plan.breakdown.used_credit;
        if credit > 0 {
            let debited = sqlx::query(
                "UPDATE users SET balance_in_cents = balance_in_cents - $2 WHERE id = $1 AND balance_in_cents >= $2",
            )
            .bind(plan.user_id)
            .bind(credit)
            .execute(&mut *tx)
            .await?;

            if debited.rows_affected() != 1 {
                return Err("insufficient account credit".into());
            }
        }

        if let Some(promotion_id) = plan.promotion_id {
            let redeemed = sqlx::query(
                r#"
                UPDATE promotions SET redemption_count = redemption_count + 1
                WHERE id = $1 AND (redemption_limit IS NULL OR redemption_count < redemption_limit)
                "#,
            )
            .bind(promotion_id)
            .execute(&mut *tx)
            .await?;

            if redeemed.rows_affected() != 1 {
                return Err("promotion is no longer available".into());
            }
        }

        if plan.marks_paid() {
            sqlx::query("UPDATE users SET paid = TRUE WHERE id = $1")
                .bind(plan.user_id)
                .execute(&mut *tx)
                .await?;
        }

        sqlx::query(
            r#"
            INSERT INTO purchases (id, user_id, student_id, promotion_id, price_in_cents, used_credit, applied_discount)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(plan.user_id)
        .bind(plan.student_id)
        .bind(plan.promotion_id)
        .bind(plan.breakdown.price)
        .bind(plan.breakdown.used_credit)
        .bind(plan.breakdown.applied_discount)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(created)
    }
}

#[async_trait]
impl EnrollmentHistory for PgEnrollmentRepository {
    async fn past_enrollments(
        &self,
        user_id: Uuid,
        before: DateTime<Utc>,
    ) -> Result<Vec<PastEnrollment>, Box<dyn std::error::Error + Send + Sync>> {
        let rows = sqlx::query_as::<_, HistoryRow>(
            r#"
            SELECT e.id AS enrollment_id, e.student_id, e.status_code,
                   c.id AS class_id, c.start_date, c.end_date, c.active,
                   co.id AS course_id, co.subject_id, co.name AS course_name, co.level,
                   co.capacity, co.price_in_cents, co.series_price_in_cents
            FROM enrollments e
            JOIN students s ON s.id = e.student_id
            JOIN classes c ON c.id = e.class_id
            JOIN courses co ON co.id = c.course_id
            WHERE s.parent_id = $1 AND c.start_date < $2
            ORDER BY c.end_date DESC
            "#,
        )
        .bind(user_id)
        .bind(before)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|r| PastEnrollment {
                enrollment_id: r.enrollment_id,
                student_id: r.student_id,
                status_code: r.status_code,
                klass: ClassWithCourse {
                    class: Class {
                        id: r.class_id,
                        course_id: r.course_id.clone(),
                        start_date: r.start_date,
                        end_date: r.end_date,
                        active: r.active,
                        sessions: vec![],
                    },
                    course: Course {
                        id: r.course_id,
                        subject_id: r.subject_id,
                        name: r.course_name,
                        level: r.level,
                        capacity: r.capacity,
                        price_in_cents: r.price_in_cents,
                        series_price_in_cents: r.series_price_in_cents,
                    },
                },
            })
            .collect())
    }
}
