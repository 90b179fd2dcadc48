use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;
use academy_core::models::{Article, ArticleMonth, ArticleQuery, Project, Student, StudentDetails, StudentInput, User};
use academy_core::repository::{ContentRepository, StudentRepository, UserRepository};
use academy_shared::Masked;

pub struct PgAccountRepository {
    pool: PgPool,
}

impl PgAccountRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct UserRow {
    id: Uuid,
    email: String,
    first_name: String,
    paid: bool,
    balance_in_cents: i64,
    referral_code: Option<String>,
    is_admin: bool,
    created_at: DateTime<Utc>,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        User {
            id: row.id,
            email: Masked(row.email),
            first_name: row.first_name,
            paid: row.paid,
            balance_in_cents: row.balance_in_cents,
            referral_code: row.referral_code,
            is_admin: row.is_admin,
            created_at: row.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct StudentRow {
    id: Uuid,
    parent_id: Uuid,
    name: String,
    year: Option<i32>,
    gender: Option<String>,
    details: Json<StudentDetails>,
    created_at: DateTime<Utc>,
}

impl From<StudentRow> for Student {
    fn from(row: StudentRow) -> Self {
        Student {
            id: row.id,
            parent_id: row.parent_id,
            name: row.name,
            year: row.year,
            gender: row.gender,
            details: row.details.0,
            created_at: row.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct ProjectRow {
    id: Uuid,
    student_id: Uuid,
    subject_id: Option<String>,
    title: String,
    url: Option<String>,
    published: bool,
    created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct ArticleRow {
    id: Uuid,
    title: String,
    url: String,
    summary: Option<String>,
    published: bool,
    created_at: DateTime<Utc>,
}

const USER_COLUMNS: &str =
    "id, email, first_name, paid, balance_in_cents, referral_code, is_admin, created_at";
const STUDENT_COLUMNS: &str = "id, parent_id, name, year, gender, details, created_at";

#[async_trait]
impl UserRepository for PgAccountRepository {
    async fn get_user(&self, id: Uuid) -> Result<Option<User>, Box<dyn std::error::Error + Send + Sync>> {
        let row = sqlx::query_as::<_, UserRow>(&format!("SELECT {} FROM users WHERE id = $1", USER_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(User::from))
    }

    async fn find_by_referral_code(&self, code: &str) -> Result<Option<User>, Box<dyn std::error::Error + Send + Sync>> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {} FROM users WHERE referral_code = $1",
            USER_COLUMNS
        ))
        .bind(code)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(User::from))
    }
}

#[async_trait]
impl StudentRepository for PgAccountRepository {
    async fn get_student(&self, id: Uuid) -> Result<Option<Student>, Box<dyn std::error::Error + Send + Sync>> {
        let row = sqlx::query_as::<_, StudentRow>(&format!(
            "SELECT {} FROM students WHERE id = $1",
            STUDENT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Student::from))
    }

    async fn list_students(&self, parent_id: Uuid) -> Result<Vec<Student>, Box<dyn std::error::Error + Send + Sync>> {
        let rows = sqlx::query_as::<_, StudentRow>(&format!(
            "SELECT {} FROM students WHERE parent_id = $1 ORDER BY created_at",
            STUDENT_COLUMNS
        ))
        .bind(parent_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Student::from).collect())
    }

    async fn create_student(
        &self,
        parent_id: Uuid,
        input: &StudentInput,
    ) -> Result<Option<Student>, Box<dyn std::error::Error + Send + Sync>> {
        let details = StudentDetails {
            school: input.school.clone(),
            ..Default::default()
        };

        // The (parent_id, name) unique key turns a duplicate into no row
        let row = sqlx::query_as::<_, StudentRow>(&format!(
            r#"
            INSERT INTO students (id, parent_id, name, year, gender, details)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (parent_id, name) DO NOTHING
            RETURNING {}
            "#,
            STUDENT_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(parent_id)
        .bind(&input.name)
        .bind(input.year)
        .bind(input.gender.as_deref())
        .bind(Json(&details))
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Student::from))
    }

    async fn update_student(
        &self,
        id: Uuid,
        input: &StudentInput,
        details: &StudentDetails,
    ) -> Result<Student, Box<dyn std::error::Error + Send + Sync>> {
        let row = sqlx::query_as::<_, StudentRow>(&format!(
            r#"
            UPDATE students
            SET name = $2, year = $3, gender = $4, details = $5
            WHERE id = $1
            RETURNING {}
            "#,
            STUDENT_COLUMNS
        ))
        .bind(id)
        .bind(&input.name)
        .bind(input.year)
        .bind(input.gender.as_deref())
        .bind(Json(details))
        .fetch_one(&self.pool)
        .await?;

        Ok(row.into())
    }

    async fn delete_student(&self, id: Uuid) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM attendances WHERE student_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM addons WHERE student_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM enrollments WHERE student_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM projects WHERE student_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM students WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn list_projects(
        &self,
        student_id: Uuid,
        published_only: bool,
    ) -> Result<Vec<Project>, Box<dyn std::error::Error + Send + Sync>> {
        let rows = sqlx::query_as::<_, ProjectRow>(
            r#"
            SELECT id, student_id, subject_id, title, url, published, created_at
            FROM projects
            WHERE student_id = $1 AND (published OR NOT $2)
            ORDER BY created_at DESC
            "#,
        )
        .bind(student_id)
        .bind(published_only)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|r| Project {
                id: r.id,
                student_id: r.student_id,
                subject_id: r.subject_id,
                title: r.title,
                url: r.url,
                published: r.published,
                created_at: r.created_at,
            })
            .collect())
    }
}

#[async_trait]
impl ContentRepository for PgAccountRepository {
    async fn list_articles(&self, query: &ArticleQuery) -> Result<Vec<Article>, Box<dyn std::error::Error + Send + Sync>> {
        let (from, to) = match query.between {
            Some((from, to)) => (Some(from), Some(to)),
            None => (None, None),
        };

        let rows = sqlx::query_as::<_, ArticleRow>(
            r#"
            SELECT id, title, url, summary, published, created_at
            FROM articles
            WHERE published
              AND ($1::timestamptz IS NULL OR created_at >= $1)
              AND ($2::timestamptz IS NULL OR created_at <= $2)
              AND ($3::timestamptz IS NULL OR created_at < $3)
            ORDER BY created_at DESC
            LIMIT $4 OFFSET $5
            "#,
        )
        .bind(from)
        .bind(to)
        .bind(query.before)
        .bind(query.limit)
        .bind(query.offset.unwrap_or(0))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|r| Article {
                id: r.id,
                title: r.title,
                url: r.url,
                summary: r.summary,
                published: r.published,
                created_at: r.created_at,
            })
            .collect())
    }

    async fn article_stats(&self, before: DateTime<Utc>) -> Result<Vec<ArticleMonth>, Box<dyn std::error::Error + Send + Sync>> {
        let rows: Vec<(NaiveDate, i64)> = sqlx::query_as(
            r#"
            SELECT (date_trunc('month', created_at) + interval '1 month - 1 day')::date AS month,
                   COUNT(id) AS count
            FROM articles
            WHERE published AND created_at < $1
            GROUP BY month
            ORDER BY month DESC
            "#,
        )
        .bind(before)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(month, count)| ArticleMonth { month, count })
            .collect())
    }
}
