use std::collections::HashSet;
use std::sync::Arc;
use chrono::{DateTime, Utc};
use tracing::{info, warn};
use uuid::Uuid;
use academy_catalog::{CatalogCache, ClassWithCourse, PricingEngine};
use academy_core::events::{publish_or_log, EventPublisher};
use academy_core::identity::Identity;
use academy_core::models::{NewEnrollment, User};
use academy_core::repository::{ClassRepository, EnrollmentRepository, StudentRepository, UserRepository};
use academy_offer::PromotionService;
use academy_shared::models::events::{DomainEvent, EnrollmentCreatedEvent};

use crate::models::{CheckoutRequest, EnrollmentReceipt, Quote};
use crate::CheckoutError;

/// Prices a cart and turns it into enrollments.
#[derive(Clone)]
pub struct CheckoutService {
    catalog: Arc<CatalogCache>,
    pricing: Arc<PricingEngine>,
    promotions: PromotionService,
    users: Arc<dyn UserRepository>,
    students: Arc<dyn StudentRepository>,
    classes: Arc<dyn ClassRepository>,
    enrollments: Arc<dyn EnrollmentRepository>,
    events: Arc<dyn EventPublisher>,
}

impl CheckoutService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        catalog: Arc<CatalogCache>,
        pricing: Arc<PricingEngine>,
        promotions: PromotionService,
        users: Arc<dyn UserRepository>,
        students: Arc<dyn StudentRepository>,
        classes: Arc<dyn ClassRepository>,
        enrollments: Arc<dyn EnrollmentRepository>,
        events: Arc<dyn EventPublisher>,
    ) -> Self {
        Self {
            catalog,
            pricing,
            promotions,
            users,
            students,
            classes,
            enrollments,
            events,
        }
    }

    async fn load_user(&self, identity: Option<&Identity>) -> Result<User, CheckoutError> {
        let identity = identity.ok_or_else(|| CheckoutError::Unauthorized("You must login first".to_string()))?;
        self.users
            .get_user(identity.id)
            .await
            .map_err(CheckoutError::internal)?
            .ok_or_else(|| CheckoutError::Unauthorized("Account not found".to_string()))
    }

    async fn load_class(&self, id: Uuid) -> Result<ClassWithCourse, CheckoutError> {
        let class = self
            .classes
            .get_class(id)
            .await
            .map_err(CheckoutError::internal)?
            .ok_or_else(|| CheckoutError::NotFound(format!("class {}", id)))?;

        let course = self
            .catalog
            .get_course_by_id(&class.course_id)
            .cloned()
            .ok_or_else(|| CheckoutError::NotFound(format!("course {}", class.course_id)))?;

        Ok(ClassWithCourse { class, course })
    }

    /// Only active classes that have not ended can be bought.
    fn ensure_open(klass: &ClassWithCourse, now: DateTime<Utc>) -> Result<(), CheckoutError> {
        if !klass.class.active || klass.class.end_date <= now {
            return Err(CheckoutError::InvalidCart(format!("class {} is not open", klass.class.id)));
        }
        Ok(())
    }

    /// Add-ons must be distinct open classes of the same subject.
    async fn load_addons(
        &self,
        base: &ClassWithCourse,
        ids: &[Uuid],
        now: DateTime<Utc>,
    ) -> Result<Vec<ClassWithCourse>, CheckoutError> {
        let mut seen = HashSet::new();
        seen.insert(base.class.id);

        let mut addons = Vec::with_capacity(ids.len());
        for &id in ids {
            if !seen.insert(id) {
                return Err(CheckoutError::InvalidCart(format!("class {} appears twice", id)));
            }

            let addon = self.load_class(id).await?;
            Self::ensure_open(&addon, now)?;
            if addon.course.subject_id != base.course.subject_id {
                return Err(CheckoutError::InvalidCart(format!(
                    "class {} is not part of the {} series",
                    id, base.course.subject_id
                )));
            }
            addons.push(addon);
        }

        Ok(addons)
    }

    /// Price the cart for the signed-in user. An ineligible promotion is
    /// dropped rather than rejected, and the course's upgrade offer applies
    /// in its place if the user has earned it.
    pub async fn quote(
        &self,
        identity: Option<&Identity>,
        request: &CheckoutRequest,
    ) -> Result<Quote, CheckoutError> {
        let user = self.load_user(identity).await?;
        self.quote_for(&user, request).await
    }

    async fn quote_for(&self, user: &User, request: &CheckoutRequest) -> Result<Quote, CheckoutError> {
        let now = Utc::now();
        let klass = self.load_class(request.class_id).await?;
        Self::ensure_open(&klass, now)?;
        let addons = self.load_addons(&klass, &request.addon_class_ids, now).await?;

        let is_bundle = !request.whole_series && !addons.is_empty();

        let supplied = match request.promotion_id {
            Some(id) => {
                let found = self
                    .promotions
                    .get_promotion_if_qualified(id, &user.buyer(), &klass.course, now)
                    .await?;
                if found.is_none() {
                    warn!(user_id = %user.id, "promotion {} not applicable, trying upgrade offer", id);
                }
                found
            }
            None => None,
        };

        let promotion = match supplied {
            Some(promo) => Some(promo),
            None => self.promotions.get_upgrade_offer(user.id, &klass.course, now).await?,
        };

        let breakdown = self.pricing.price_breakdown(
            &klass,
            &addons,
            user.balance_in_cents,
            promotion.as_ref().map(|p| &p.discount),
            is_bundle,
            request.whole_series,
        );

        Ok(Quote {
            klass,
            addons,
            is_bundle,
            whole_series: request.whole_series,
            promotion,
            breakdown,
        })
    }

    /// Enroll a student in the cart. All writes land in one transaction.
    pub async fn enroll(
        &self,
        identity: Option<&Identity>,
        request: &CheckoutRequest,
    ) -> Result<EnrollmentReceipt, CheckoutError> {
        let user = self.load_user(identity).await?;

        let student = self
            .students
            .get_student(request.student_id)
            .await
            .map_err(CheckoutError::internal)?;
        match student {
            Some(s) if s.parent_id == user.id => {}
            _ => return Err(CheckoutError::Unauthorized("student not under your account".to_string())),
        }

        let quote = self.quote_for(&user, request).await?;

        for c in std::iter::once(&quote.klass).chain(quote.addons.iter()) {
            let already = self
                .enrollments
                .is_enrolled(request.student_id, c.class.id)
                .await
                .map_err(CheckoutError::internal)?;
            if already {
                return Err(CheckoutError::Conflict(format!("Already enrolled in {}", c.course.name)));
            }

            let taken = self
                .classes
                .enrollment_count(c.class.id)
                .await
                .map_err(CheckoutError::internal)?;
            if taken >= i64::from(c.course.capacity) {
                return Err(CheckoutError::Conflict(format!("{} is full", c.course.name)));
            }
        }

        let plan = NewEnrollment {
            user_id: user.id,
            student_id: request.student_id,
            class_ids: quote.class_ids(),
            promotion_id: quote.promotion.as_ref().map(|p| p.id),
            breakdown: quote.breakdown,
        };

        let enrollments = self
            .enrollments
            .enroll(&plan)
            .await
            .map_err(CheckoutError::internal)?;

        info!(
            user_id = %user.id,
            "enrolled student {} in {} class(es), price {} credit {} discount {}",
            plan.student_id,
            plan.class_ids.len(),
            plan.breakdown.price,
            plan.breakdown.used_credit,
            plan.breakdown.applied_discount
        );

        publish_or_log(
            self.events.as_ref(),
            DomainEvent::EnrollmentCreated(EnrollmentCreatedEvent {
                user_id: user.id,
                student_id: plan.student_id,
                class_ids: plan.class_ids.clone(),
                price_in_cents: plan.breakdown.price,
                used_credit: plan.breakdown.used_credit,
                applied_discount: plan.breakdown.applied_discount,
                promotion_id: plan.promotion_id,
                timestamp: Utc::now().timestamp(),
            }),
        )
        .await;

        Ok(EnrollmentReceipt {
            enrollments,
            breakdown: plan.breakdown,
            promotion_id: plan.promotion_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use academy_catalog::{Class, Course, Discount, Subject};
    use academy_core::models::{Enrollment, Student, StudentDetails};
    use academy_offer::{EligibilityRules, LevelUpCoupons, Promotion};
    use academy_shared::Masked;
    use academy_store::memory::MemoryStore;
    use chrono::Duration;

    struct Fixture {
        store: Arc<MemoryStore>,
        service: CheckoutService,
        identity: Identity,
        student_id: Uuid,
        level1: Uuid,
        level2: Uuid,
        promo: Promotion,
        level_up: Promotion,
    }

    fn course(level: i32) -> Course {
        Course {
            id: format!("ai_{}", level),
            subject_id: "ai".to_string(),
            name: format!("AI Level {}", level),
            level,
            capacity: 2,
            price_in_cents: 12900,
            series_price_in_cents: Some(9500),
        }
    }

    fn class(course_id: &str) -> Class {
        let start = Utc::now() + Duration::days(7);
        Class {
            id: Uuid::new_v4(),
            course_id: course_id.to_string(),
            start_date: start,
            end_date: start + Duration::weeks(4),
            active: true,
            sessions: vec![],
        }
    }

    fn fixture(balance: i64) -> Fixture {
        fixture_with(balance, false)
    }

    fn fixture_with(balance: i64, paid: bool) -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let subjects = vec![Subject {
            id: "ai".to_string(),
            name: "AI".to_string(),
            exit_level: 2,
            courses: vec![course(0), course(1), course(2)],
        }];
        store.insert_subjects(subjects.clone());
        let catalog = Arc::new(CatalogCache::new(subjects, vec!["ai".to_string()]));

        let user_id = Uuid::new_v4();
        store.insert_user(User {
            id: user_id,
            email: Masked("parent@example.com".to_string()),
            first_name: "Pat".to_string(),
            paid,
            balance_in_cents: balance,
            referral_code: None,
            is_admin: false,
            created_at: Utc::now(),
        });

        let student_id = Uuid::new_v4();
        store.insert_student(Student {
            id: student_id,
            parent_id: user_id,
            name: "Ada".to_string(),
            year: None,
            gender: None,
            details: StudentDetails::default(),
            created_at: Utc::now(),
        });

        let c1 = class("ai_1");
        let c2 = class("ai_2");
        let (level1, level2) = (c1.id, c2.id);
        store.insert_class(c1);
        store.insert_class(c2);

        let promo = Promotion {
            id: Uuid::new_v4(),
            code: "SAVE20".to_string(),
            description: None,
            discount: Discount::Percentage(20),
            first_timer_only: true,
            is_level_up: false,
            valid_from: None,
            expires_at: None,
            redemption_limit: None,
            redemption_count: 0,
        };
        store.insert_promotion(promo.clone());

        let level_up = Promotion {
            id: Uuid::new_v4(),
            code: "TRIAL2AI".to_string(),
            discount: Discount::Amount(2580),
            first_timer_only: false,
            is_level_up: true,
            ..promo.clone()
        };
        store.insert_promotion(level_up.clone());

        let mut coupons = LevelUpCoupons::default();
        coupons.trial.insert("ai".to_string(), "TRIAL2AI".to_string());

        let promotions = PromotionService::new(store.clone(), store.clone(), EligibilityRules::default(), coupons);

        let service = CheckoutService::new(
            catalog,
            Arc::new(PricingEngine::default()),
            promotions,
            store.clone(),
            store.clone(),
            store.clone(),
            store.clone(),
            store.clone(),
        );

        Fixture {
            store,
            service,
            identity: Identity {
                id: user_id,
                email: Masked("parent@example.com".to_string()),
                is_admin: false,
            },
            student_id,
            level1,
            level2,
            promo,
            level_up,
        }
    }

    /// Trial class the student attended, ending yesterday.
    fn attend_trial(f: &Fixture) {
        let start = Utc::now() - Duration::days(8);
        let trial = Class {
            id: Uuid::new_v4(),
            course_id: "ai_0".to_string(),
            start_date: start,
            end_date: Utc::now() - Duration::days(1),
            active: true,
            sessions: vec![],
        };
        f.store.insert_enrollment(Enrollment {
            id: Uuid::new_v4(),
            student_id: f.student_id,
            class_id: trial.id,
            status_code: 1,
            created_at: start,
        });
        f.store.insert_class(trial);
    }

    fn request(f: &Fixture) -> CheckoutRequest {
        CheckoutRequest {
            class_id: f.level1,
            student_id: f.student_id,
            addon_class_ids: vec![],
            whole_series: false,
            promotion_id: Some(f.promo.id),
        }
    }

    #[tokio::test]
    async fn test_quote_applies_discount_then_credit() {
        let f = fixture(2000);
        let quote = f.service.quote(Some(&f.identity), &request(&f)).await.unwrap();

        assert_eq!(quote.breakdown.applied_discount, 2580);
        assert_eq!(quote.breakdown.used_credit, 2000);
        assert_eq!(quote.breakdown.price, 8320);
        assert_eq!(quote.steps().len(), 3);
    }

    #[tokio::test]
    async fn test_quote_requires_login() {
        let f = fixture(0);
        let err = f.service.quote(None, &request(&f)).await.unwrap_err();
        assert!(matches!(err, CheckoutError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn test_bundle_and_series_flags() {
        let f = fixture(0);
        let mut req = request(&f);
        req.promotion_id = None;
        req.addon_class_ids = vec![f.level2];

        let bundle = f.service.quote(Some(&f.identity), &req).await.unwrap();
        assert!(bundle.is_bundle);
        assert_eq!(bundle.breakdown.price, 25800);

        req.whole_series = true;
        let series = f.service.quote(Some(&f.identity), &req).await.unwrap();
        assert!(!series.is_bundle);
        assert_eq!(series.breakdown.price, 19000);
    }

    #[tokio::test]
    async fn test_duplicate_addon_rejected() {
        let f = fixture(0);
        let mut req = request(&f);
        req.addon_class_ids = vec![f.level1];

        let err = f.service.quote(Some(&f.identity), &req).await.unwrap_err();
        assert!(matches!(err, CheckoutError::InvalidCart(_)));
    }

    #[tokio::test]
    async fn test_enroll_commits_plan() {
        let f = fixture(2000);
        let receipt = f.service.enroll(Some(&f.identity), &request(&f)).await.unwrap();

        assert_eq!(receipt.enrollments.len(), 1);
        assert_eq!(receipt.promotion_id, Some(f.promo.id));

        let user = f.store.user(f.identity.id).unwrap();
        assert_eq!(user.balance_in_cents, 0);
        assert!(user.paid);
        assert_eq!(f.store.promotion(f.promo.id).unwrap().redemption_count, 1);

        // Now a paying customer, the first-timer coupon no longer applies
        let again = CheckoutRequest { class_id: f.level2, ..request(&f) };
        let quote = f.service.quote(Some(&f.identity), &again).await.unwrap();
        assert!(quote.promotion.is_none());
        assert_eq!(quote.breakdown.price, 12900);

        let err = f.service.enroll(Some(&f.identity), &request(&f)).await.unwrap_err();
        assert!(matches!(err, CheckoutError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_enroll_other_parents_student() {
        let f = fixture(0);
        let stranger = Identity {
            id: Uuid::new_v4(),
            ..f.identity.clone()
        };
        f.store.insert_user(User {
            id: stranger.id,
            email: Masked("other@example.com".to_string()),
            first_name: "Sam".to_string(),
            paid: false,
            balance_in_cents: 0,
            referral_code: None,
            is_admin: false,
            created_at: Utc::now(),
        });

        let err = f.service.enroll(Some(&stranger), &request(&f)).await.unwrap_err();
        assert!(matches!(err, CheckoutError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn test_ineligible_coupon_falls_back_to_upgrade_offer() {
        let f = fixture_with(0, true);
        attend_trial(&f);

        let mut req = request(&f);
        req.promotion_id = None;
        let offered = f.service.quote(Some(&f.identity), &req).await.unwrap();
        assert_eq!(offered.promotion.as_ref().map(|p| p.id), Some(f.level_up.id));
        assert_eq!(offered.breakdown.price, 10320);

        // First-timer coupon is refused for a paying customer
        let fallback = f.service.quote(Some(&f.identity), &request(&f)).await.unwrap();
        assert_eq!(fallback.promotion.as_ref().map(|p| p.id), Some(f.level_up.id));
        assert_eq!(fallback.breakdown.price, 10320);
    }

    #[tokio::test]
    async fn test_closed_or_finished_class_rejected() {
        let f = fixture(2000);

        let mut cancelled = class("ai_1");
        cancelled.active = false;
        cancelled.start_date = Utc::now() - Duration::days(60);
        cancelled.end_date = Utc::now() - Duration::days(30);
        let cancelled_id = cancelled.id;
        f.store.insert_class(cancelled);

        let req = CheckoutRequest { class_id: cancelled_id, ..request(&f) };
        let err = f.service.enroll(Some(&f.identity), &req).await.unwrap_err();
        assert!(matches!(err, CheckoutError::InvalidCart(_)));

        let mut finished = class("ai_2");
        finished.start_date = Utc::now() - Duration::days(40);
        finished.end_date = Utc::now() - Duration::days(10);
        let finished_id = finished.id;
        f.store.insert_class(finished);

        let req = CheckoutRequest { class_id: finished_id, ..request(&f) };
        let err = f.service.quote(Some(&f.identity), &req).await.unwrap_err();
        assert!(matches!(err, CheckoutError::InvalidCart(_)));

        let with_addon = CheckoutRequest { addon_class_ids: vec![finished_id], ..request(&f) };
        let err = f.service.enroll(Some(&f.identity), &with_addon).await.unwrap_err();
        assert!(matches!(err, CheckoutError::InvalidCart(_)));

        // Nothing was written
        assert_eq!(f.store.user(f.identity.id).unwrap().balance_in_cents, 2000);
        assert_eq!(f.store.promotion(f.promo.id).unwrap().redemption_count, 0);
    }
}
