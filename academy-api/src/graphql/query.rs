use async_graphql::{Context, Object, ID};
use chrono::{Datelike, Duration, NaiveDate, Utc};
use academy_catalog::ClassWithCourse;
use academy_core::events::publish_or_log;
use academy_core::models::{ArticleQuery, ClassFilter};
use academy_offer::CouponError;
use academy_order::CheckoutRequest;
use academy_shared::models::events::{CouponRejectedEvent, DomainEvent};

use crate::error::{internal, AppError};
use crate::graphql::types::{
    AddonSession, Article, ArticleMonth, Class, Course, EnrollInput, Promotion, Quote, Referer, Student, Subject,
    User,
};
use crate::graphql::{identity, parse_id, state, GqlResultExt};
use crate::state::AppState;

pub struct Query;

impl Query {
    /// Pair classes with their course; classes of unknown courses are dropped.
    fn with_courses(state: &AppState, classes: Vec<academy_catalog::Class>) -> Vec<Class> {
        classes
            .into_iter()
            .filter_map(|class| {
                let course = state.catalog.get_course_by_id(&class.course_id)?.clone();
                Some(Class::from(ClassWithCourse { class, course }))
            })
            .collect()
    }
}

/// Published-window for the article list: a past month is clamped to now,
/// anything else falls back to "everything published so far".
fn article_window(selected_month: Option<NaiveDate>, now: chrono::DateTime<Utc>) -> ArticleQuery {
    let month = selected_month.and_then(|d| {
        let start = NaiveDate::from_ymd_opt(d.year(), d.month(), 1)?;
        let next = if d.month() == 12 {
            NaiveDate::from_ymd_opt(d.year() + 1, 1, 1)?
        } else {
            NaiveDate::from_ymd_opt(d.year(), d.month() + 1, 1)?
        };
        let start = start.and_hms_opt(0, 0, 0)?.and_utc();
        let end = next.and_hms_opt(0, 0, 0)?.and_utc() - Duration::milliseconds(1);
        Some((start, end))
    });

    match month {
        Some((start, end)) if start < now => ArticleQuery {
            between: Some((start, end.min(now))),
            ..Default::default()
        },
        _ => ArticleQuery {
            before: Some(now),
            ..Default::default()
        },
    }
}

#[Object]
impl Query {
    /// The signed-in account, or null
    async fn user(&self, ctx: &Context<'_>) -> async_graphql::Result<Option<User>> {
        let Some(identity) = identity(ctx) else {
            return Ok(None);
        };

        let state = state(ctx)?;
        let user = state.repos.users.get_user(identity.id).await.map_err(internal).gql()?;
        Ok(user.map(|inner| User { inner }))
    }

    async fn referer(&self, ctx: &Context<'_>, code: String) -> async_graphql::Result<Referer> {
        let state = state(ctx)?;
        let user = state
            .repos
            .users
            .find_by_referral_code(code.trim())
            .await
            .map_err(internal)
            .gql()?
            .ok_or_else(|| AppError::NotFoundError(format!("referral code {}", code)))
            .gql()?;

        Ok(Referer { inner: user })
    }

    /// One of the caller's children
    async fn student(&self, ctx: &Context<'_>, id: ID) -> async_graphql::Result<Option<Student>> {
        let Some(identity) = identity(ctx) else {
            return Ok(None);
        };

        let state = state(ctx)?;
        let id = parse_id(&id).gql()?;
        let student = state.repos.students.get_student(id).await.map_err(internal).gql()?;

        Ok(student
            .filter(|s| s.parent_id == identity.id)
            .map(Student::owned))
    }

    /// A student's public showcase of published projects
    async fn maker(&self, ctx: &Context<'_>, id: ID) -> async_graphql::Result<Option<Student>> {
        let state = state(ctx)?;
        let id = parse_id(&id).gql()?;
        let student = state.repos.students.get_student(id).await.map_err(internal).gql()?;
        Ok(student.map(Student::showcase))
    }

    async fn class(&self, ctx: &Context<'_>, id: ID) -> async_graphql::Result<Class> {
        let state = state(ctx)?;
        let class_id = parse_id(&id).gql()?;
        let class = state
            .repos
            .classes
            .get_class(class_id)
            .await
            .map_err(internal)
            .gql()?
            .ok_or_else(|| AppError::NotFoundError(format!("class {}", class_id)))
            .gql()?;

        Self::with_courses(state, vec![class])
            .pop()
            .ok_or_else(|| AppError::NotFoundError(format!("course of class {}", class_id)))
            .gql()
    }

    /// Upcoming classes of a course, or of every course in a subject
    async fn classes(
        &self,
        ctx: &Context<'_>,
        course_id: Option<String>,
        subject_id: Option<String>,
        start_date: Option<chrono::DateTime<Utc>>,
    ) -> async_graphql::Result<Vec<Class>> {
        let state = state(ctx)?;

        let course_ids = match (&course_id, subject_id) {
            (None, Some(subject_id)) => Some(
                state
                    .catalog
                    .get_subject_by_id(&subject_id)
                    .map(|s| s.courses.iter().map(|c| c.id.clone()).collect())
                    .unwrap_or_default(),
            ),
            _ => None,
        };

        let filter = ClassFilter {
            course_id,
            course_ids,
            start_after: start_date,
        };

        let classes = state
            .repos
            .classes
            .upcoming_classes(&filter, Utc::now())
            .await
            .map_err(internal)
            .gql()?;

        Ok(Self::with_courses(state, classes))
    }

    /// Future classes of the course that still have room
    async fn reschedule_candidates(&self, ctx: &Context<'_>, course_id: String) -> async_graphql::Result<Vec<Class>> {
        let state = state(ctx)?;
        let course = state
            .catalog
            .get_course_by_id(&course_id)
            .ok_or_else(|| AppError::NotFoundError(format!("course {}", course_id)))
            .gql()?;

        let filter = ClassFilter {
            course_id: Some(course_id.clone()),
            ..Default::default()
        };
        let classes = state
            .repos
            .classes
            .upcoming_classes(&filter, Utc::now())
            .await
            .map_err(internal)
            .gql()?;

        let mut open = Vec::with_capacity(classes.len());
        for class in classes {
            let taken = state
                .repos
                .classes
                .enrollment_count(class.id)
                .await
                .map_err(internal)
                .gql()?;
            if taken < i64::from(course.capacity) {
                open.push(class);
            }
        }

        Ok(Self::with_courses(state, open))
    }

    /// Upcoming sessions at `idx` in running classes of the course, for
    /// making up a missed session
    async fn addon_candidates(
        &self,
        ctx: &Context<'_>,
        course_id: String,
        idx: i32,
    ) -> async_graphql::Result<Vec<AddonSession>> {
        let state = state(ctx)?;
        let classes = state
            .repos
            .classes
            .addon_candidates(&course_id, idx, Utc::now())
            .await
            .map_err(internal)
            .gql()?;

        Ok(Self::with_courses(state, classes)
            .into_iter()
            .filter_map(|class| {
                let session = class.inner.class.session(idx)?.clone();
                Some(AddonSession { session, klass: class.inner })
            })
            .collect())
    }

    /// Check a coupon code typed at checkout. Null when not signed in.
    async fn promotion(
        &self,
        ctx: &Context<'_>,
        code: String,
        course_id: Option<String>,
    ) -> async_graphql::Result<Option<Promotion>> {
        let Some(identity) = identity(ctx) else {
            return Ok(None);
        };

        let state = state(ctx)?;
        let user = state
            .repos
            .users
            .get_user(identity.id)
            .await
            .map_err(internal)
            .gql()?
            .ok_or_else(|| AppError::AuthenticationError("Account not found".to_string()))
            .gql()?;

        let course = course_id.as_deref().and_then(|id| state.catalog.get_course_by_id(id));

        match state.promotions.redeem_code(&code, &user.buyer(), course, Utc::now()).await {
            Ok(promo) => Ok(Some(Promotion::from(promo))),
            Err(CouponError::NotApplicable { promotion, reason }) => {
                publish_or_log(
                    state.repos.events.as_ref(),
                    DomainEvent::CouponRejected(CouponRejectedEvent {
                        user_id: identity.id,
                        email: identity.email.clone(),
                        promotion_id: promotion.id,
                        code: promotion.code.clone(),
                        reason: reason.as_str().to_string(),
                        timestamp: Utc::now().timestamp(),
                    }),
                )
                .await;
                Err(AppError::from(CouponError::NotApplicable { promotion, reason }).into_graphql())
            }
            Err(e) => Err(AppError::from(e).into_graphql()),
        }
    }

    async fn subject(&self, ctx: &Context<'_>, id: String) -> async_graphql::Result<Option<Subject>> {
        let state = state(ctx)?;
        Ok(state.catalog.get_subject_by_id(&id).cloned().map(Subject::from))
    }

    /// Subjects by id, or the listed subjects
    async fn subjects(&self, ctx: &Context<'_>, ids: Option<Vec<String>>) -> async_graphql::Result<Vec<Subject>> {
        let state = state(ctx)?;
        Ok(state
            .catalog
            .get_subjects(ids.as_deref())
            .into_iter()
            .cloned()
            .map(Subject::from)
            .collect())
    }

    async fn course(&self, ctx: &Context<'_>, id: String) -> async_graphql::Result<Option<Course>> {
        let state = state(ctx)?;
        Ok(state.catalog.get_course_by_id(&id).cloned().map(Course::from))
    }

    /// Each subject's course at `level`
    async fn courses(
        &self,
        ctx: &Context<'_>,
        subject_ids: Vec<String>,
        level: i32,
    ) -> async_graphql::Result<Vec<Course>> {
        let state = state(ctx)?;
        Ok(state
            .catalog
            .courses_at_level(&subject_ids, level)
            .into_iter()
            .cloned()
            .map(Course::from)
            .collect())
    }

    /// Published articles, newest first
    async fn articles(
        &self,
        ctx: &Context<'_>,
        limit: Option<i32>,
        offset: Option<i32>,
        selected_month: Option<NaiveDate>,
    ) -> async_graphql::Result<Vec<Article>> {
        let state = state(ctx)?;
        let query = ArticleQuery {
            limit: limit.filter(|l| *l > 0).map(i64::from),
            offset: offset.filter(|o| *o > 0).map(i64::from),
            ..article_window(selected_month, Utc::now())
        };

        let articles = state.repos.content.list_articles(&query).await.map_err(internal).gql()?;
        Ok(articles.into_iter().map(|inner| Article { inner }).collect())
    }

    /// Published article counts per month
    async fn articles_stats(&self, ctx: &Context<'_>) -> async_graphql::Result<Vec<ArticleMonth>> {
        let state = state(ctx)?;
        let months = state
            .repos
            .content
            .article_stats(Utc::now())
            .await
            .map_err(internal)
            .gql()?;

        Ok(months.into_iter().map(|inner| ArticleMonth { inner }).collect())
    }

    /// Price a cart for the signed-in user without enrolling
    async fn quote(&self, ctx: &Context<'_>, input: EnrollInput) -> async_graphql::Result<Quote> {
        let state = state(ctx)?;
        let request = CheckoutRequest::try_from(input).gql()?;
        let quote = state.checkout.quote(identity(ctx), &request).await.gql()?;
        Ok(Quote { inner: quote })
    }
}
