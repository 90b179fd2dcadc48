use async_trait::async_trait;
use std::sync::Arc;
use chrono::{DateTime, Utc};
use tracing::{info, warn};
use uuid::Uuid;
use academy_catalog::{ClassWithCourse, Course};

use crate::models::Promotion;
use crate::rules::{EligibilityRules, LevelUpCoupons, PastEnrollment};

/// Promotion lookup, backed by the promotions table.
#[async_trait]
pub trait PromotionStore: Send + Sync {
    async fn find_by_id(
        &self,
        id: Uuid,
    ) -> Result<Option<Promotion>, Box<dyn std::error::Error + Send + Sync>>;

    async fn find_by_code(
        &self,
        code: &str,
    ) -> Result<Option<Promotion>, Box<dyn std::error::Error + Send + Sync>>;
}

/// Enrollments of every student under a parent account.
#[async_trait]
pub trait EnrollmentHistory: Send + Sync {
    /// Enrollments whose class started before `before`.
    async fn past_enrollments(
        &self,
        user_id: Uuid,
        before: DateTime<Utc>,
    ) -> Result<Vec<PastEnrollment>, Box<dyn std::error::Error + Send + Sync>>;
}

/// The part of a user account the coupon rules look at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Buyer {
    pub id: Uuid,
    /// Has paid for at least one class
    pub paid: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    NotFirstTimer,
    NoQualifyingClass,
}

impl RejectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectReason::NotFirstTimer => "first_timer_only",
            RejectReason::NoQualifyingClass => "no_qualifying_class",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CouponError {
    #[error("Coupon not found: {0}")]
    NotFound(String),

    #[error("Coupon expired: {0}")]
    Expired(String),

    #[error("Coupon not applicable: {reason:?}")]
    NotApplicable {
        promotion: Box<Promotion>,
        reason: RejectReason,
    },

    #[error("Promotion lookup failed: {0}")]
    Store(String),
}

impl CouponError {
    /// Message shown next to the coupon input.
    pub fn field_message(&self) -> &'static str {
        match self {
            CouponError::NotFound(_) => "This coupon code is invalid",
            CouponError::Expired(_) => "This coupon code has expired",
            CouponError::NotApplicable { .. } => "This coupon cannot be used for this class",
            CouponError::Store(_) => "Unable to check this coupon right now",
        }
    }

    fn store(err: Box<dyn std::error::Error + Send + Sync>) -> Self {
        CouponError::Store(err.to_string())
    }
}

/// Coupon rules that need the database: code lookup, first-timer check and
/// the level-up enrollment history.
#[derive(Clone)]
pub struct PromotionService {
    promotions: Arc<dyn PromotionStore>,
    history: Arc<dyn EnrollmentHistory>,
    rules: EligibilityRules,
    coupons: LevelUpCoupons,
}

impl PromotionService {
    pub fn new(
        promotions: Arc<dyn PromotionStore>,
        history: Arc<dyn EnrollmentHistory>,
        rules: EligibilityRules,
        coupons: LevelUpCoupons,
    ) -> Self {
        Self {
            promotions,
            history,
            rules,
            coupons,
        }
    }

    /// The earlier class that makes `user_id` eligible for a level-up offer
    /// on `course`, if any.
    pub async fn get_qualified_class(
        &self,
        user_id: Uuid,
        course: &Course,
        now: DateTime<Utc>,
    ) -> Result<Option<ClassWithCourse>, CouponError> {
        if !course.is_regular() {
            return Ok(None);
        }

        let history = self
            .history
            .past_enrollments(user_id, now)
            .await
            .map_err(CouponError::store)?;

        Ok(self.rules.find_qualified_class(&history, course, now).cloned())
    }

    /// Level-up coupon to advertise on a course page.
    pub async fn get_upgrade_offer(
        &self,
        user_id: Uuid,
        course: &Course,
        now: DateTime<Utc>,
    ) -> Result<Option<Promotion>, CouponError> {
        let Some(klass) = self.get_qualified_class(user_id, course, now).await? else {
            return Ok(None);
        };

        info!(
            "{} ending at {} qualifies upgrade offer",
            klass.course.id, klass.class.end_date
        );

        let Some(code) = self.coupons.code_for(&klass.course, course) else {
            return Ok(None);
        };

        let promo = self
            .promotions
            .find_by_code(code)
            .await
            .map_err(CouponError::store)?;

        Ok(promo.filter(|p| p.is_valid_at(now)))
    }

    /// The promotion, if `buyer` may use it on `course`. Used at checkout
    /// where a bad coupon falls back to the upgrade offer.
    pub async fn get_promotion_if_qualified(
        &self,
        promotion_id: Uuid,
        buyer: &Buyer,
        course: &Course,
        now: DateTime<Utc>,
    ) -> Result<Option<Promotion>, CouponError> {
        let promo = self
            .promotions
            .find_by_id(promotion_id)
            .await
            .map_err(CouponError::store)?;

        let Some(promo) = promo.filter(|p| p.is_valid_at(now)) else {
            return Ok(None);
        };

        match self.check_applicable(&promo, buyer, Some(course), now).await? {
            Some(_) => Ok(None),
            None => Ok(Some(promo)),
        }
    }

    /// Validate a code typed by the user, with a reason for each rejection.
    pub async fn redeem_code(
        &self,
        code: &str,
        buyer: &Buyer,
        course: Option<&Course>,
        now: DateTime<Utc>,
    ) -> Result<Promotion, CouponError> {
        let code = code.trim();

        let promo = self
            .promotions
            .find_by_code(code)
            .await
            .map_err(CouponError::store)?;

        let Some(promo) = promo else {
            warn!(user_id = %buyer.id, "coupon not found: {}", code);
            return Err(CouponError::NotFound(code.to_string()));
        };

        info!(user_id = %buyer.id, "coupon found: {} ({})", promo.code, promo.id);

        if !promo.is_valid_at(now) {
            return Err(CouponError::Expired(promo.code));
        }

        if let Some(reason) = self.check_applicable(&promo, buyer, course, now).await? {
            return Err(CouponError::NotApplicable {
                promotion: Box::new(promo),
                reason,
            });
        }

        Ok(promo)
    }

    async fn check_applicable(
        &self,
        promo: &Promotion,
        buyer: &Buyer,
        course: Option<&Course>,
        now: DateTime<Utc>,
    ) -> Result<Option<RejectReason>, CouponError> {
        if promo.first_timer_only && buyer.paid {
            return Ok(Some(RejectReason::NotFirstTimer));
        }

        if promo.is_level_up {
            let qualified = match course {
                Some(course) => self.get_qualified_class(buyer.id, course, now).await?,
                None => None,
            };
            if qualified.is_none() {
                return Ok(Some(RejectReason::NoQualifyingClass));
            }
        }

        Ok(None)
    }
}
