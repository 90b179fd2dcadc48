use async_trait::async_trait;
use uuid::Uuid;
use chrono::{DateTime, Utc};
use academy_catalog::Class;

use crate::models::{
    Addon, Article, ArticleMonth, ArticleQuery, Attendance, ClassFilter, Enrollment, EnrollmentWithClass,
    NewEnrollment, Project, Student, StudentDetails, StudentInput, User,
};

type RepoResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// Repository trait for parent accounts
#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn get_user(&self, id: Uuid) -> RepoResult<Option<User>>;

    async fn find_by_referral_code(&self, code: &str) -> RepoResult<Option<User>>;
}

/// Repository trait for students and their projects
#[async_trait]
pub trait StudentRepository: Send + Sync {
    async fn get_student(&self, id: Uuid) -> RepoResult<Option<Student>>;

    async fn list_students(&self, parent_id: Uuid) -> RepoResult<Vec<Student>>;

    /// Insert unless the parent already has a child with this (trimmed) name.
    /// Returns `None` on duplicate.
    async fn create_student(&self, parent_id: Uuid, input: &StudentInput) -> RepoResult<Option<Student>>;

    async fn update_student(
        &self,
        id: Uuid,
        input: &StudentInput,
        details: &StudentDetails,
    ) -> RepoResult<Student>;

    /// Deletes the student and dependent rows in one transaction.
    async fn delete_student(&self, id: Uuid) -> RepoResult<()>;

    /// Newest first.
    async fn list_projects(&self, student_id: Uuid, published_only: bool) -> RepoResult<Vec<Project>>;
}

/// Repository trait for scheduled classes
#[async_trait]
pub trait ClassRepository: Send + Sync {
    async fn get_class(&self, id: Uuid) -> RepoResult<Option<Class>>;

    async fn get_classes(&self, ids: &[Uuid]) -> RepoResult<Vec<Class>>;

    /// Active classes that have not ended and start after the filter date
    /// (or now), ordered by start date.
    async fn upcoming_classes(&self, filter: &ClassFilter, now: DateTime<Utc>) -> RepoResult<Vec<Class>>;

    async fn enrollment_count(&self, class_id: Uuid) -> RepoResult<i64>;

    /// Active classes of a course that already have students and whose
    /// session `idx` is still ahead, ordered by that session's start.
    async fn addon_candidates(&self, course_id: &str, idx: i32, now: DateTime<Utc>) -> RepoResult<Vec<Class>>;
}

/// Repository trait for enrollments, add-ons and attendance
#[async_trait]
pub trait EnrollmentRepository: Send + Sync {
    /// Newest class first.
    async fn list_for_student(&self, student_id: Uuid) -> RepoResult<Vec<(Enrollment, Class)>>;

    async fn list_addons(&self, student_id: Uuid) -> RepoResult<Vec<Addon>>;

    async fn list_attendances(&self, student_id: Uuid) -> RepoResult<Vec<Attendance>>;

    async fn is_enrolled(&self, student_id: Uuid, class_id: Uuid) -> RepoResult<bool>;

    /// Writes enrollments, credit debit, promotion redemption and the paid
    /// flag in a single transaction.
    async fn enroll(&self, plan: &NewEnrollment) -> RepoResult<Vec<Enrollment>>;
}

/// Repository trait for blog articles
#[async_trait]
pub trait ContentRepository: Send + Sync {
    async fn list_articles(&self, query: &ArticleQuery) -> RepoResult<Vec<Article>>;

    async fn article_stats(&self, before: DateTime<Utc>) -> RepoResult<Vec<ArticleMonth>>;
}

/// Pairs enrollments with their course. Classes whose course is missing
/// from the catalog are dropped.
pub fn attach_courses(
    rows: Vec<(Enrollment, Class)>,
    catalog: &academy_catalog::CatalogCache,
) -> Vec<EnrollmentWithClass> {
    rows.into_iter()
        .filter_map(|(enrollment, class)| {
            let course = catalog.get_course_by_id(&class.course_id)?.clone();
            Some(EnrollmentWithClass {
                enrollment,
                klass: academy_catalog::ClassWithCourse { class, course },
            })
        })
        .collect()
}
