pub mod models;
pub mod rules;
pub mod service;

pub use models::Promotion;
pub use rules::{EligibilityRules, EligibilityWindows, LevelUpCoupons, PastEnrollment};
pub use service::{Buyer, CouponError, EnrollmentHistory, PromotionService, PromotionStore, RejectReason};
