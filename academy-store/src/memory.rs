//! In-process store implementing every repository trait. Backs the unit
//! and API tests through `Repositories::in_memory`.

use async_trait::async_trait;
use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;
use academy_catalog::{CatalogSource, Class, ClassWithCourse, Course, Subject};
use academy_core::events::EventPublisher;
use academy_core::models::{
    Addon, Article, ArticleMonth, ArticleQuery, Attendance, ClassFilter, Enrollment, NewEnrollment, Project,
    Student, StudentDetails, StudentInput, User,
};
use academy_core::repository::{
    ClassRepository, ContentRepository, EnrollmentRepository, StudentRepository, UserRepository,
};
use academy_offer::{EnrollmentHistory, PastEnrollment, Promotion, PromotionStore};
use academy_shared::models::events::DomainEvent;

type StoreResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

#[derive(Default)]
struct Tables {
    subjects: Vec<Subject>,
    users: Vec<User>,
    students: Vec<Student>,
    classes: Vec<Class>,
    enrollments: Vec<Enrollment>,
    addons: Vec<Addon>,
    attendances: Vec<Attendance>,
    promotions: Vec<Promotion>,
    projects: Vec<Project>,
    articles: Vec<Article>,
    events: Vec<DomainEvent>,
}

impl Tables {
    fn course(&self, id: &str) -> Option<&Course> {
        self.subjects
            .iter()
            .flat_map(|s| s.courses.iter())
            .find(|c| c.id == id)
    }

    fn class(&self, id: Uuid) -> Option<&Class> {
        self.classes.iter().find(|c| c.id == id)
    }
}

#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn insert_subjects(&self, subjects: Vec<Subject>) {
        self.lock().subjects.extend(subjects);
    }

    pub fn insert_user(&self, user: User) {
        self.lock().users.push(user);
    }

    pub fn insert_student(&self, student: Student) {
        self.lock().students.push(student);
    }

    pub fn insert_class(&self, class: Class) {
        self.lock().classes.push(class);
    }

    pub fn insert_enrollment(&self, enrollment: Enrollment) {
        self.lock().enrollments.push(enrollment);
    }

    pub fn insert_addon(&self, addon: Addon) {
        self.lock().addons.push(addon);
    }

    pub fn insert_attendance(&self, attendance: Attendance) {
        self.lock().attendances.push(attendance);
    }

    pub fn insert_promotion(&self, promotion: Promotion) {
        self.lock().promotions.push(promotion);
    }

    pub fn insert_project(&self, project: Project) {
        self.lock().projects.push(project);
    }

    pub fn insert_article(&self, article: Article) {
        self.lock().articles.push(article);
    }

    pub fn user(&self, id: Uuid) -> Option<User> {
        self.lock().users.iter().find(|u| u.id == id).cloned()
    }

    pub fn promotion(&self, id: Uuid) -> Option<Promotion> {
        self.lock().promotions.iter().find(|p| p.id == id).cloned()
    }

    pub fn published_events(&self) -> Vec<DomainEvent> {
        self.lock().events.clone()
    }
}

#[async_trait]
impl CatalogSource for MemoryStore {
    async fn load_subjects(&self) -> StoreResult<Vec<Subject>> {
        Ok(self.lock().subjects.clone())
    }
}

#[async_trait]
impl UserRepository for MemoryStore {
    async fn get_user(&self, id: Uuid) -> StoreResult<Option<User>> {
        Ok(self.user(id))
    }

    async fn find_by_referral_code(&self, code: &str) -> StoreResult<Option<User>> {
        Ok(self
            .lock()
            .users
            .iter()
            .find(|u| u.referral_code.as_deref() == Some(code))
            .cloned())
    }
}

#[async_trait]
impl StudentRepository for MemoryStore {
    async fn get_student(&self, id: Uuid) -> StoreResult<Option<Student>> {
        Ok(self.lock().students.iter().find(|s| s.id == id).cloned())
    }

    async fn list_students(&self, parent_id: Uuid) -> StoreResult<Vec<Student>> {
        Ok(self
            .lock()
            .students
            .iter()
            .filter(|s| s.parent_id == parent_id)
            .cloned()
            .collect())
    }

    async fn create_student(&self, parent_id: Uuid, input: &StudentInput) -> StoreResult<Option<Student>> {
        let mut t = self.lock();
        if t.students.iter().any(|s| s.parent_id == parent_id && s.name == input.name) {
            return Ok(None);
        }

        let student = Student {
            id: Uuid::new_v4(),
            parent_id,
            name: input.name.clone(),
            year: input.year,
            gender: input.gender.clone(),
            details: StudentDetails {
                school: input.school.clone(),
                ..Default::default()
            },
            created_at: Utc::now(),
        };
        t.students.push(student.clone());
        Ok(Some(student))
    }

    async fn update_student(&self, id: Uuid, input: &StudentInput, details: &StudentDetails) -> StoreResult<Student> {
        let mut t = self.lock();
        let student = t
            .students
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or_else(|| format!("student {} not found", id))?;

        student.name = input.name.clone();
        student.year = input.year;
        student.gender = input.gender.clone();
        student.details = details.clone();
        Ok(student.clone())
    }

    async fn delete_student(&self, id: Uuid) -> StoreResult<()> {
        let mut t = self.lock();
        t.attendances.retain(|a| a.student_id != id);
        t.addons.retain(|a| a.student_id != id);
        t.enrollments.retain(|e| e.student_id != id);
        t.projects.retain(|p| p.student_id != id);
        t.students.retain(|s| s.id != id);
        Ok(())
    }

    async fn list_projects(&self, student_id: Uuid, published_only: bool) -> StoreResult<Vec<Project>> {
        let mut projects: Vec<Project> = self
            .lock()
            .projects
            .iter()
            .filter(|p| p.student_id == student_id && (p.published || !published_only))
            .cloned()
            .collect();
        projects.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(projects)
    }
}

#[async_trait]
impl ClassRepository for MemoryStore {
    async fn get_class(&self, id: Uuid) -> StoreResult<Option<Class>> {
        Ok(self.lock().class(id).cloned())
    }

    async fn get_classes(&self, ids: &[Uuid]) -> StoreResult<Vec<Class>> {
        let mut classes: Vec<Class> = self
            .lock()
            .classes
            .iter()
            .filter(|c| ids.contains(&c.id))
            .cloned()
            .collect();
        classes.sort_by_key(|c| c.start_date);
        Ok(classes)
    }

    async fn upcoming_classes(&self, filter: &ClassFilter, now: DateTime<Utc>) -> StoreResult<Vec<Class>> {
        let start_after = filter.start_after.unwrap_or(now);
        let mut classes: Vec<Class> = self
            .lock()
            .classes
            .iter()
            .filter(|c| c.active && c.end_date > now && c.start_date > start_after)
            .filter(|c| !c.sessions.is_empty())
            .filter(|c| match (&filter.course_id, &filter.course_ids) {
                (Some(id), _) => &c.course_id == id,
                (None, Some(ids)) => ids.contains(&c.course_id),
                (None, None) => true,
            })
            .cloned()
            .collect();
        classes.sort_by_key(|c| c.start_date);
        Ok(classes)
    }

    async fn enrollment_count(&self, class_id: Uuid) -> StoreResult<i64> {
        Ok(self.lock().enrollments.iter().filter(|e| e.class_id == class_id).count() as i64)
    }

    async fn addon_candidates(&self, course_id: &str, idx: i32, now: DateTime<Utc>) -> StoreResult<Vec<Class>> {
        let t = self.lock();
        let mut found: Vec<(DateTime<Utc>, Class)> = t
            .classes
            .iter()
            .filter(|c| c.active && c.course_id == course_id)
            .filter(|c| t.enrollments.iter().any(|e| e.class_id == c.id))
            .filter_map(|c| {
                let session = c.session(idx).filter(|s| s.start_date > now)?;
                Some((session.start_date, c.clone()))
            })
            .collect();
        found.sort_by_key(|(start, _)| *start);
        Ok(found.into_iter().map(|(_, c)| c).collect())
    }
}

#[async_trait]
impl EnrollmentRepository for MemoryStore {
    async fn list_for_student(&self, student_id: Uuid) -> StoreResult<Vec<(Enrollment, Class)>> {
        let t = self.lock();
        let mut rows: Vec<(Enrollment, Class)> = t
            .enrollments
            .iter()
            .filter(|e| e.student_id == student_id)
            .filter_map(|e| Some((e.clone(), t.class(e.class_id)?.clone())))
            .collect();
        rows.sort_by(|a, b| b.1.start_date.cmp(&a.1.start_date));
        Ok(rows)
    }

    async fn list_addons(&self, student_id: Uuid) -> StoreResult<Vec<Addon>> {
        Ok(self
            .lock()
            .addons
            .iter()
            .filter(|a| a.student_id == student_id)
            .cloned()
            .collect())
    }

    async fn list_attendances(&self, student_id: Uuid) -> StoreResult<Vec<Attendance>> {
        Ok(self
            .lock()
            .attendances
            .iter()
            .filter(|a| a.student_id == student_id)
            .cloned()
            .collect())
    }

    async fn is_enrolled(&self, student_id: Uuid, class_id: Uuid) -> StoreResult<bool> {
        Ok(self
            .lock()
            .enrollments
            .iter()
            .any(|e| e.student_id == student_id && e.class_id == class_id))
    }

    async fn enroll(&self, plan: &NewEnrollment) -> StoreResult<Vec<Enrollment>> {
        let mut t = self.lock();

        // All checks run before the first write
        let user_idx = t
            .users
            .iter()
            .position(|u| u.id == plan.user_id)
            .ok_or_else(|| format!("user {} not found", plan.user_id))?;
        if t.users[user_idx].balance_in_cents < plan.breakdown.used_credit {
            return Err("insufficient account credit".into());
        }

        let promo_idx = match plan.promotion_id {
            Some(id) => {
                let idx = t
                    .promotions
                    .iter()
                    .position(|p| p.id == id)
                    .ok_or_else(|| format!("promotion {} not found", id))?;
                let promo = &t.promotions[idx];
                if promo.redemption_limit.is_some_and(|limit| promo.redemption_count >= limit) {
                    return Err("promotion is no longer available".into());
                }
                Some(idx)
            }
            None => None,
        };

        if plan
            .class_ids
            .iter()
            .any(|id| t.enrollments.iter().any(|e| e.student_id == plan.student_id && &e.class_id == id))
        {
            return Err("duplicate enrollment".into());
        }

        let created: Vec<Enrollment> = plan
            .class_ids
            .iter()
            .map(|class_id| Enrollment {
                id: Uuid::new_v4(),
                student_id: plan.student_id,
                class_id: *class_id,
                status_code: 0,
                created_at: Utc::now(),
            })
            .collect();
        t.enrollments.extend(created.iter().cloned());

        let user = &mut t.users[user_idx];
        user.balance_in_cents -= plan.breakdown.used_credit;
        if plan.marks_paid() {
            user.paid = true;
        }

        if let Some(idx) = promo_idx {
            t.promotions[idx].redemption_count += 1;
        }

        Ok(created)
    }
}

#[async_trait]
impl EnrollmentHistory for MemoryStore {
    async fn past_enrollments(&self, user_id: Uuid, before: DateTime<Utc>) -> StoreResult<Vec<PastEnrollment>> {
        let t = self.lock();
        let mut history: Vec<PastEnrollment> = t
            .enrollments
            .iter()
            .filter(|e| t.students.iter().any(|s| s.id == e.student_id && s.parent_id == user_id))
            .filter_map(|e| {
                let class = t.class(e.class_id)?;
                if class.start_date >= before {
                    return None;
                }
                let course = t.course(&class.course_id)?;
                Some(PastEnrollment {
                    enrollment_id: e.id,
                    student_id: e.student_id,
                    status_code: e.status_code,
                    klass: ClassWithCourse {
                        class: class.clone(),
                        course: course.clone(),
                    },
                })
            })
            .collect();
        history.sort_by(|a, b| b.klass.class.end_date.cmp(&a.klass.class.end_date));
        Ok(history)
    }
}

#[async_trait]
impl PromotionStore for MemoryStore {
    async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<Promotion>> {
        Ok(self.promotion(id))
    }

    async fn find_by_code(&self, code: &str) -> StoreResult<Option<Promotion>> {
        Ok(self.lock().promotions.iter().find(|p| p.code == code).cloned())
    }
}

#[async_trait]
impl ContentRepository for MemoryStore {
    async fn list_articles(&self, query: &ArticleQuery) -> StoreResult<Vec<Article>> {
        let mut articles: Vec<Article> = self
            .lock()
            .articles
            .iter()
            .filter(|a| a.published)
            .filter(|a| match query.between {
                Some((from, to)) => a.created_at >= from && a.created_at <= to,
                None => true,
            })
            .filter(|a| query.before.map_or(true, |before| a.created_at < before))
            .cloned()
            .collect();
        articles.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let offset = query.offset.unwrap_or(0).max(0) as usize;
        let limit = query.limit.map_or(usize::MAX, |l| l.max(0) as usize);
        Ok(articles.into_iter().skip(offset).take(limit).collect())
    }

    async fn article_stats(&self, before: DateTime<Utc>) -> StoreResult<Vec<ArticleMonth>> {
        let mut months: BTreeMap<NaiveDate, i64> = BTreeMap::new();
        for a in self.lock().articles.iter().filter(|a| a.published && a.created_at < before) {
            if let Some(month) = last_day_of_month(a.created_at.date_naive()) {
                *months.entry(month).or_default() += 1;
            }
        }

        Ok(months
            .into_iter()
            .rev()
            .map(|(month, count)| ArticleMonth { month, count })
            .collect())
    }
}

fn last_day_of_month(date: NaiveDate) -> Option<NaiveDate> {
    let (year, month) = if date.month() == 12 {
        (date.year() + 1, 1)
    } else {
        (date.year(), date.month() + 1)
    };
    NaiveDate::from_ymd_opt(year, month, 1).map(|first| first - Duration::days(1))
}

#[async_trait]
impl EventPublisher for MemoryStore {
    async fn publish(&self, event: &DomainEvent) -> StoreResult<()> {
        self.lock().events.push(event.clone());
        Ok(())
    }
}
