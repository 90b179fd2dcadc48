use async_graphql::{Context, InputObject, Object, ID};
use chrono::{DateTime, NaiveDate, Utc};
use academy_catalog::{self as catalog, Discount};
use academy_core::models::{self, ClassFilter};
use academy_core::registration::{self, build_registrations};
use academy_core::repository::attach_courses;
use academy_offer as offer;
use academy_order::{self as order, CheckoutRequest};

use crate::error::{internal, AppError};
use crate::graphql::{identity, parse_id, state, GqlResultExt};

pub struct User {
    pub inner: models::User,
}

#[Object]
impl User {
    async fn id(&self) -> ID {
        ID(self.inner.id.to_string())
    }

    async fn email(&self) -> &str {
        self.inner.email.expose()
    }

    async fn first_name(&self) -> &str {
        &self.inner.first_name
    }

    async fn paid(&self) -> bool {
        self.inner.paid
    }

    async fn balance_in_cents(&self) -> i64 {
        self.inner.balance_in_cents
    }

    async fn referral_code(&self) -> Option<&str> {
        self.inner.referral_code.as_deref()
    }

    async fn is_admin(&self) -> bool {
        self.inner.is_admin
    }

    async fn created_at(&self) -> DateTime<Utc> {
        self.inner.created_at
    }

    /// Children under this account
    async fn students(&self, ctx: &Context<'_>) -> async_graphql::Result<Vec<Student>> {
        let state = state(ctx)?;
        let students = state
            .repos
            .students
            .list_students(self.inner.id)
            .await
            .map_err(internal)
            .gql()?;

        Ok(students.into_iter().map(Student::owned).collect())
    }
}

/// Public profile behind a referral link.
pub struct Referer {
    pub inner: models::User,
}

#[Object]
impl Referer {
    async fn id(&self) -> ID {
        ID(self.inner.id.to_string())
    }

    async fn first_name(&self) -> &str {
        &self.inner.first_name
    }

    async fn referral_code(&self) -> Option<&str> {
        self.inner.referral_code.as_deref()
    }

    async fn subjects(&self, ctx: &Context<'_>) -> async_graphql::Result<Vec<Subject>> {
        let state = state(ctx)?;
        Ok(state
            .catalog
            .get_subjects(None)
            .into_iter()
            .cloned()
            .map(Subject::from)
            .collect())
    }
}

pub struct Student {
    pub inner: models::Student,
    /// Seen by someone other than the parent: only published work
    pub public: bool,
}

impl Student {
    pub fn owned(inner: models::Student) -> Self {
        Self { inner, public: false }
    }

    pub fn showcase(inner: models::Student) -> Self {
        Self { inner, public: true }
    }
}

#[Object]
impl Student {
    async fn id(&self) -> ID {
        ID(self.inner.id.to_string())
    }

    async fn name(&self) -> &str {
        &self.inner.name
    }

    async fn year(&self) -> Option<i32> {
        self.inner.year
    }

    async fn gender(&self) -> Option<&str> {
        self.inner.gender.as_deref()
    }

    async fn school(&self) -> Option<&str> {
        self.inner.details.school.as_deref()
    }

    async fn avatar(&self) -> Option<&str> {
        self.inner.details.avatar.as_deref()
    }

    async fn cover(&self) -> Option<&str> {
        self.inner.details.cover.as_deref()
    }

    async fn projects(&self, ctx: &Context<'_>) -> async_graphql::Result<Vec<Project>> {
        let state = state(ctx)?;
        let projects = state
            .repos
            .students
            .list_projects(self.inner.id, self.public)
            .await
            .map_err(internal)
            .gql()?;

        Ok(projects.into_iter().map(|inner| Project { inner }).collect())
    }

    /// Enrolled classes expanded into seats, newest class first
    async fn registrations(&self, ctx: &Context<'_>) -> async_graphql::Result<Vec<Registration>> {
        if self.public {
            return Ok(vec![]);
        }

        let state = state(ctx)?;
        let repo = &state.repos.enrollments;
        let student_id = self.inner.id;

        let rows = repo.list_for_student(student_id).await.map_err(internal).gql()?;
        let addons = repo.list_addons(student_id).await.map_err(internal).gql()?;
        let attendances = repo.list_attendances(student_id).await.map_err(internal).gql()?;

        let enrollments = attach_courses(rows, &state.catalog);
        Ok(build_registrations(student_id, &enrollments, &addons, &attendances)
            .into_iter()
            .map(|inner| Registration { inner })
            .collect())
    }
}

pub struct Project {
    pub inner: models::Project,
}

#[Object]
impl Project {
    async fn id(&self) -> ID {
        ID(self.inner.id.to_string())
    }

    async fn title(&self) -> &str {
        &self.inner.title
    }

    async fn url(&self) -> Option<&str> {
        self.inner.url.as_deref()
    }

    async fn published(&self) -> bool {
        self.inner.published
    }

    async fn subject(&self, ctx: &Context<'_>) -> async_graphql::Result<Option<Subject>> {
        let state = state(ctx)?;
        Ok(self
            .inner
            .subject_id
            .as_deref()
            .and_then(|id| state.catalog.get_subject_by_id(id))
            .cloned()
            .map(Subject::from))
    }

    async fn created_at(&self) -> DateTime<Utc> {
        self.inner.created_at
    }
}

pub struct Registration {
    pub inner: registration::Registration,
}

#[Object]
impl Registration {
    async fn id(&self) -> ID {
        ID(self.inner.id.to_string())
    }

    async fn class(&self) -> Class {
        Class::from(self.inner.klass.clone())
    }

    async fn seats(&self) -> Vec<Seat> {
        self.inner.seats.iter().cloned().map(|inner| Seat { inner }).collect()
    }
}

pub struct Seat {
    pub inner: registration::Seat,
}

#[Object]
impl Seat {
    async fn id(&self) -> ID {
        ID(self.inner.id.clone())
    }

    async fn idx(&self) -> i32 {
        self.inner.idx
    }

    async fn class_id(&self) -> ID {
        ID(self.inner.class.id.to_string())
    }

    async fn start_date(&self) -> DateTime<Utc> {
        self.inner.start_date
    }

    async fn end_date(&self) -> DateTime<Utc> {
        self.inner.end_date
    }

    /// Taken in another class in place of the original session
    async fn added(&self) -> bool {
        self.inner.added
    }

    async fn attended(&self) -> Option<bool> {
        self.inner.attended
    }
}

pub struct Subject {
    pub inner: catalog::Subject,
}

impl From<catalog::Subject> for Subject {
    fn from(inner: catalog::Subject) -> Self {
        Self { inner }
    }
}

#[Object]
impl Subject {
    async fn id(&self) -> ID {
        ID(self.inner.id.clone())
    }

    async fn name(&self) -> &str {
        &self.inner.name
    }

    async fn exit_level(&self) -> i32 {
        self.inner.exit_level
    }

    /// Listed courses only
    async fn courses(&self) -> Vec<Course> {
        self.inner.listed_courses().cloned().map(Course::from).collect()
    }
}

pub struct Course {
    pub inner: catalog::Course,
}

impl From<catalog::Course> for Course {
    fn from(inner: catalog::Course) -> Self {
        Self { inner }
    }
}

#[Object]
impl Course {
    async fn id(&self) -> ID {
        ID(self.inner.id.clone())
    }

    async fn subject_id(&self) -> &str {
        &self.inner.subject_id
    }

    async fn name(&self) -> &str {
        &self.inner.name
    }

    async fn level(&self) -> i32 {
        self.inner.level
    }

    async fn capacity(&self) -> i32 {
        self.inner.capacity
    }

    async fn price_in_cents(&self) -> i64 {
        self.inner.price_in_cents
    }

    async fn series_price_in_cents(&self) -> Option<i64> {
        self.inner.series_price_in_cents
    }

    async fn is_trial(&self) -> bool {
        self.inner.is_trial()
    }

    async fn subject(&self, ctx: &Context<'_>) -> async_graphql::Result<Option<Subject>> {
        let state = state(ctx)?;
        Ok(state.catalog.subject_of(&self.inner).cloned().map(Subject::from))
    }

    async fn upcoming_classes(&self, ctx: &Context<'_>) -> async_graphql::Result<Vec<Class>> {
        let state = state(ctx)?;
        let filter = ClassFilter {
            course_id: Some(self.inner.id.clone()),
            ..Default::default()
        };
        let classes = state
            .repos
            .classes
            .upcoming_classes(&filter, Utc::now())
            .await
            .map_err(internal)
            .gql()?;

        Ok(classes
            .into_iter()
            .map(|class| Class::from(catalog::ClassWithCourse { class, course: self.inner.clone() }))
            .collect())
    }

    /// Level-up coupon the signed-in user has earned for this course
    async fn offer(&self, ctx: &Context<'_>) -> async_graphql::Result<Option<Promotion>> {
        let Some(identity) = identity(ctx) else {
            return Ok(None);
        };
        if !self.inner.is_regular() {
            return Ok(None);
        }

        let state = state(ctx)?;
        let promo = state
            .promotions
            .get_upgrade_offer(identity.id, &self.inner, Utc::now())
            .await
            .gql()?;

        Ok(promo.map(Promotion::from))
    }
}

pub struct Class {
    pub inner: catalog::ClassWithCourse,
}

impl From<catalog::ClassWithCourse> for Class {
    fn from(inner: catalog::ClassWithCourse) -> Self {
        Self { inner }
    }
}

#[Object]
impl Class {
    async fn id(&self) -> ID {
        ID(self.inner.class.id.to_string())
    }

    async fn course_id(&self) -> &str {
        &self.inner.class.course_id
    }

    async fn course(&self) -> Course {
        Course::from(self.inner.course.clone())
    }

    async fn start_date(&self) -> DateTime<Utc> {
        self.inner.class.start_date
    }

    async fn end_date(&self) -> DateTime<Utc> {
        self.inner.class.end_date
    }

    async fn active(&self) -> bool {
        self.inner.class.active
    }

    async fn sessions(&self) -> Vec<Session> {
        let mut sessions = self.inner.class.sessions.clone();
        sessions.sort_by_key(|s| s.idx);
        sessions.into_iter().map(|inner| Session { inner }).collect()
    }

    async fn seats_left(&self, ctx: &Context<'_>) -> async_graphql::Result<i64> {
        let state = state(ctx)?;
        let taken = state
            .repos
            .classes
            .enrollment_count(self.inner.class.id)
            .await
            .map_err(internal)
            .gql()?;

        Ok((i64::from(self.inner.course.capacity) - taken).max(0))
    }
}

pub struct Session {
    pub inner: catalog::Session,
}

#[Object]
impl Session {
    async fn id(&self) -> ID {
        ID(self.inner.id.to_string())
    }

    async fn idx(&self) -> i32 {
        self.inner.idx
    }

    async fn start_date(&self) -> DateTime<Utc> {
        self.inner.start_date
    }

    async fn end_date(&self) -> DateTime<Utc> {
        self.inner.end_date
    }
}

/// A session of another class that can stand in for a missed one.
pub struct AddonSession {
    pub session: catalog::Session,
    pub klass: catalog::ClassWithCourse,
}

#[Object]
impl AddonSession {
    async fn id(&self) -> ID {
        ID(self.session.id.to_string())
    }

    async fn idx(&self) -> i32 {
        self.session.idx
    }

    async fn start_date(&self) -> DateTime<Utc> {
        self.session.start_date
    }

    async fn end_date(&self) -> DateTime<Utc> {
        self.session.end_date
    }

    async fn class(&self) -> Class {
        Class::from(self.klass.clone())
    }
}

pub struct Promotion {
    pub inner: offer::Promotion,
}

impl From<offer::Promotion> for Promotion {
    fn from(inner: offer::Promotion) -> Self {
        Self { inner }
    }
}

#[Object]
impl Promotion {
    async fn id(&self) -> ID {
        ID(self.inner.id.to_string())
    }

    async fn code(&self) -> &str {
        &self.inner.code
    }

    async fn description(&self) -> Option<&str> {
        self.inner.description.as_deref()
    }

    /// Whole percent off, for percentage promotions
    async fn percentage(&self) -> Option<i64> {
        match self.inner.discount {
            Discount::Percentage(p) => Some(p),
            Discount::Amount(_) => None,
        }
    }

    /// Cents off, for flat promotions
    async fn amount_in_cents(&self) -> Option<i64> {
        match self.inner.discount {
            Discount::Amount(a) => Some(a),
            Discount::Percentage(_) => None,
        }
    }

    async fn first_timer_only(&self) -> bool {
        self.inner.first_timer_only
    }

    async fn is_level_up(&self) -> bool {
        self.inner.is_level_up
    }

    async fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.inner.expires_at
    }
}

pub struct Article {
    pub inner: models::Article,
}

#[Object]
impl Article {
    async fn id(&self) -> ID {
        ID(self.inner.id.to_string())
    }

    async fn title(&self) -> &str {
        &self.inner.title
    }

    async fn url(&self) -> &str {
        &self.inner.url
    }

    async fn summary(&self) -> Option<&str> {
        self.inner.summary.as_deref()
    }

    async fn created_at(&self) -> DateTime<Utc> {
        self.inner.created_at
    }
}

pub struct ArticleMonth {
    pub inner: models::ArticleMonth,
}

#[Object]
impl ArticleMonth {
    async fn month(&self) -> NaiveDate {
        self.inner.month
    }

    async fn count(&self) -> i64 {
        self.inner.count
    }
}

pub struct Quote {
    pub inner: order::Quote,
}

#[Object]
impl Quote {
    async fn class(&self) -> Class {
        Class::from(self.inner.klass.clone())
    }

    async fn addons(&self) -> Vec<Class> {
        self.inner.addons.iter().cloned().map(Class::from).collect()
    }

    async fn is_bundle(&self) -> bool {
        self.inner.is_bundle
    }

    async fn whole_series(&self) -> bool {
        self.inner.whole_series
    }

    async fn promotion(&self) -> Option<Promotion> {
        self.inner.promotion.clone().map(Promotion::from)
    }

    async fn list_price(&self) -> i64 {
        self.inner.breakdown.list_price()
    }

    async fn applied_discount(&self) -> i64 {
        self.inner.breakdown.applied_discount
    }

    async fn used_credit(&self) -> i64 {
        self.inner.breakdown.used_credit
    }

    /// Amount due, in cents
    async fn price(&self) -> i64 {
        self.inner.breakdown.price
    }

    async fn steps(&self) -> Vec<String> {
        self.inner.steps().into_iter().map(String::from).collect()
    }
}

pub struct EnrollmentReceipt {
    pub inner: order::EnrollmentReceipt,
}

#[Object]
impl EnrollmentReceipt {
    async fn enrollment_ids(&self) -> Vec<ID> {
        self.inner
            .enrollments
            .iter()
            .map(|e| ID(e.id.to_string()))
            .collect()
    }

    async fn class_ids(&self) -> Vec<ID> {
        self.inner
            .enrollments
            .iter()
            .map(|e| ID(e.class_id.to_string()))
            .collect()
    }

    async fn price(&self) -> i64 {
        self.inner.breakdown.price
    }

    async fn used_credit(&self) -> i64 {
        self.inner.breakdown.used_credit
    }

    async fn applied_discount(&self) -> i64 {
        self.inner.breakdown.applied_discount
    }

    async fn promotion_id(&self) -> Option<ID> {
        self.inner.promotion_id.map(|id| ID(id.to_string()))
    }
}

#[derive(InputObject)]
pub struct StudentInput {
    pub child_name: String,
    pub year: Option<i32>,
    pub gender: Option<String>,
    pub school: Option<String>,
}

impl From<StudentInput> for models::StudentInput {
    fn from(input: StudentInput) -> Self {
        models::StudentInput {
            name: input.child_name,
            year: input.year,
            gender: input.gender,
            school: input.school,
        }
    }
}

#[derive(InputObject)]
pub struct EnrollInput {
    pub class_id: ID,
    pub student_id: ID,
    #[graphql(default)]
    pub addon_class_ids: Vec<ID>,
    #[graphql(default)]
    pub whole_series: bool,
    pub promotion_id: Option<ID>,
}

impl TryFrom<EnrollInput> for CheckoutRequest {
    type Error = AppError;

    fn try_from(input: EnrollInput) -> Result<Self, Self::Error> {
        Ok(CheckoutRequest {
            class_id: parse_id(&input.class_id)?,
            student_id: parse_id(&input.student_id)?,
            addon_class_ids: input
                .addon_class_ids
                .iter()
                .map(parse_id)
                .collect::<Result<_, _>>()?,
            whole_series: input.whole_series,
            promotion_id: input.promotion_id.as_ref().map(parse_id).transpose()?,
        })
    }
}
