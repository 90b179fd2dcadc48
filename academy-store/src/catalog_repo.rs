use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;
use academy_catalog::{CatalogSource, Class, Course, Session, Subject};
use academy_core::models::ClassFilter;
use academy_core::repository::ClassRepository;

pub struct PgCatalogRepository {
    pool: PgPool,
}

impl PgCatalogRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct SubjectRow {
    id: String,
    name: String,
    exit_level: i32,
}

#[derive(sqlx::FromRow)]
struct CourseRow {
    id: String,
    subject_id: String,
    name: String,
    level: i32,
    capacity: i32,
    price_in_cents: i64,
    series_price_in_cents: Option<i64>,
}

impl From<CourseRow> for Course {
    fn from(row: CourseRow) -> Self {
        Course {
            id: row.id,
            subject_id: row.subject_id,
            name: row.name,
            level: row.level,
            capacity: row.capacity,
            price_in_cents: row.price_in_cents,
            series_price_in_cents: row.series_price_in_cents,
        }
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct ClassRow {
    pub id: Uuid,
    pub course_id: String,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub active: bool,
}

#[derive(sqlx::FromRow)]
struct SessionRow {
    id: Uuid,
    class_id: Uuid,
    idx: i32,
    start_date: DateTime<Utc>,
    end_date: DateTime<Utc>,
}

/// Attach sessions to class rows, keeping the row order.
pub(crate) async fn with_sessions(
    pool: &PgPool,
    rows: Vec<ClassRow>,
) -> Result<Vec<Class>, sqlx::Error> {
    if rows.is_empty() {
        return Ok(vec![]);
    }

    let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
    let sessions = sqlx::query_as::<_, SessionRow>(
        r#"
        SELECT id, class_id, idx, start_date, end_date
        FROM sessions
        WHERE class_id = ANY($1)
        ORDER BY class_id, idx
        "#,
    )
    .bind(&ids)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| Class {
            id: row.id,
            course_id: row.course_id,
            start_date: row.start_date,
            end_date: row.end_date,
            active: row.active,
            sessions: sessions
                .iter()
                .filter(|s| s.class_id == row.id)
                .map(|s| Session {
                    id: s.id,
                    class_id: s.class_id,
                    idx: s.idx,
                    start_date: s.start_date,
                    end_date: s.end_date,
                })
                .collect(),
        })
        .collect())
}

#[async_trait]
impl CatalogSource for PgCatalogRepository {
    async fn load_subjects(&self) -> Result<Vec<Subject>, Box<dyn std::error::Error + Send + Sync>> {
        let subjects = sqlx::query_as::<_, SubjectRow>(
            "SELECT id, name, exit_level FROM subjects ORDER BY sort_order, id",
        )
        .fetch_all(&self.pool)
        .await?;

        let courses = sqlx::query_as::<_, CourseRow>(
            r#"
            SELECT id, subject_id, name, level, capacity, price_in_cents, series_price_in_cents
            FROM courses
            ORDER BY subject_id, level
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut courses: Vec<Course> = courses.into_iter().map(Course::from).collect();

        Ok(subjects
            .into_iter()
            .map(|row| {
                let (mine, rest): (Vec<Course>, Vec<Course>) =
                    courses.drain(..).partition(|c| c.subject_id == row.id);
                courses = rest;
                Subject {
                    id: row.id,
                    name: row.name,
                    exit_level: row.exit_level,
                    courses: mine,
                }
            })
            .collect())
    }
}

#[async_trait]
impl ClassRepository for PgCatalogRepository {
    async fn get_class(&self, id: Uuid) -> Result<Option<Class>, Box<dyn std::error::Error + Send + Sync>> {
        let row = sqlx::query_as::<_, ClassRow>(
            "SELECT id, course_id, start_date, end_date, active FROM classes WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(with_sessions(&self.pool, vec![row]).await?.pop()),
            None => Ok(None),
        }
    }

    async fn get_classes(&self, ids: &[Uuid]) -> Result<Vec<Class>, Box<dyn std::error::Error + Send + Sync>> {
        let rows = sqlx::query_as::<_, ClassRow>(
            r#"
            SELECT id, course_id, start_date, end_date, active
            FROM classes
            WHERE id = ANY($1)
            ORDER BY start_date
            "#,
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;

        Ok(with_sessions(&self.pool, rows).await?)
    }

    async fn upcoming_classes(
        &self,
        filter: &ClassFilter,
        now: DateTime<Utc>,
    ) -> Result<Vec<Class>, Box<dyn std::error::Error + Send + Sync>> {
        // A single course wins over the subject's course list
        let course_ids: Option<Vec<String>> = match (&filter.course_id, &filter.course_ids) {
            (Some(id), _) => Some(vec![id.clone()]),
            (None, Some(ids)) => Some(ids.clone()),
            (None, None) => None,
        };

        let rows = sqlx::query_as::<_, ClassRow>(
            r#"
            SELECT c.id, c.course_id, c.start_date, c.end_date, c.active
            FROM classes c
            WHERE c.active
              AND c.end_date > $1
              AND c.start_date > $2
              AND ($3::text[] IS NULL OR c.course_id = ANY($3))
              AND EXISTS (SELECT 1 FROM sessions s WHERE s.class_id = c.id)
            ORDER BY c.start_date ASC
            "#,
        )
        .bind(now)
        .bind(filter.start_after.unwrap_or(now))
        .bind(course_ids)
        .fetch_all(&self.pool)
        .await?;

        Ok(with_sessions(&self.pool, rows).await?)
    }

    async fn enrollment_count(&self, class_id: Uuid) -> Result<i64, Box<dyn std::error::Error + Send + Sync>> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM enrollments WHERE class_id = $1")
            .bind(class_id)
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }

    async fn addon_candidates(
        &self,
        course_id: &str,
        idx: i32,
        now: DateTime<Utc>,
    ) -> Result<Vec<Class>, Box<dyn std::error::Error + Send + Sync>> {
        let rows = sqlx::query_as::<_, ClassRow>(
            r#"
            SELECT c.id, c.course_id, c.start_date, c.end_date, c.active
            FROM classes c
            JOIN sessions s ON s.class_id = c.id AND s.idx = $2
            WHERE c.active
              AND c.course_id = $1
              AND s.start_date > $3
              AND EXISTS (SELECT 1 FROM enrollments e WHERE e.class_id = c.id)
            ORDER BY s.start_date ASC
            "#,
        )
        .bind(course_id)
        .bind(idx)
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        Ok(with_sessions(&self.pool, rows).await?)
    }
}
